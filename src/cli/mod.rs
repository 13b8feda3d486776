//! CLI module for sessionsight
//!
//! Handles command-line argument parsing and terminal output.

pub mod args;
pub mod display;

pub use args::{Args, Commands, Verbosity};
pub use display::{severity_label, ReportPrinter};
