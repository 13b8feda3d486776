//! sessionsight - Main CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use sessionsight::{
    cli::{Args, Commands, ReportPrinter},
    config::AnalyticsConfig,
    service::AnalyticsService,
    store::{DirectorySessionStore, SessionStore},
    telemetry::init_tracing,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbosity().level());

    let config = AnalyticsConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;

    match &args.command {
        Commands::Analyze { .. } => run_analyze(&args, config).await?,
        Commands::Session {
            id,
            no_recommendations,
            ..
        } => run_session(&args, config, id, !*no_recommendations).await?,
        Commands::Forecast { days, .. } => run_forecast(&args, config, *days).await?,
        Commands::Config => show_config(&args, &config)?,
    }

    Ok(())
}

/// Build a one-shot service over the session directory and initialize it
async fn start_service(args: &Args, mut config: AnalyticsConfig) -> Result<AnalyticsService> {
    let dir = match args.command.data_dir() {
        Some(dir) => dir.clone(),
        None => DirectorySessionStore::default_dir(),
    };
    tracing::info!(dir = %dir.display(), "using session directory");

    // One-shot commands never need the background loops
    config.enable_real_time_analysis = false;

    let store: Arc<dyn SessionStore> = Arc::new(DirectorySessionStore::new(dir));
    let service = AnalyticsService::new(config, store);
    service
        .initialize()
        .await
        .context("Failed to initialize analytics service")?;
    Ok(service)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

async fn run_analyze(args: &Args, config: AnalyticsConfig) -> Result<()> {
    let service = start_service(args, config).await?;
    let snapshot = service.snapshot();

    if args.command.json() {
        print_json(&*snapshot)?;
    } else {
        let printer = ReportPrinter::new(args.verbosity());
        printer.print_snapshot(&snapshot);
        printer.print_status(&service.get_status().await);
    }

    service.shutdown().await;
    Ok(())
}

async fn run_session(
    args: &Args,
    config: AnalyticsConfig,
    session_id: &str,
    include_recommendations: bool,
) -> Result<()> {
    let service = start_service(args, config).await?;
    let analysis = service
        .analyze_stored_session(session_id, include_recommendations)
        .await
        .with_context(|| format!("Failed to analyze session {}", session_id))?;

    if args.command.json() {
        print_json(&analysis)?;
    } else {
        ReportPrinter::new(args.verbosity()).print_session(&analysis);
    }

    service.shutdown().await;
    Ok(())
}

#[derive(Serialize)]
struct ForecastOutput {
    forecast: Option<sessionsight::prediction::ResourceForecast>,
    capacity: Option<sessionsight::prediction::CapacityPlan>,
    trends: Vec<sessionsight::prediction::TrendAnalysis>,
}

async fn run_forecast(args: &Args, config: AnalyticsConfig, days: Option<usize>) -> Result<()> {
    if days == Some(0) {
        anyhow::bail!("--days must be positive");
    }
    let service = start_service(args, config).await?;
    let output = ForecastOutput {
        forecast: service.get_resource_forecast(days),
        capacity: service.get_resource_optimization(),
        trends: service.get_trends(),
    };

    if args.command.json() {
        print_json(&output)?;
    } else {
        let printer = ReportPrinter::new(args.verbosity());
        match &output.forecast {
            Some(forecast) => printer.print_forecast(forecast),
            None => println!(
                "{}: not enough history to forecast",
                "Warning".yellow()
            ),
        }
        if let Some(plan) = &output.capacity {
            printer.print_capacity(plan);
        }
        printer.print_trends(&output.trends);
    }

    service.shutdown().await;
    Ok(())
}

fn show_config(args: &Args, config: &AnalyticsConfig) -> Result<()> {
    let source = args
        .config
        .clone()
        .or_else(|| AnalyticsConfig::default_path().filter(|p| p.exists()));

    println!("{}", "sessionsight Configuration".bold());
    println!("─────────────────────────────────────");
    println!(
        "Source:       {}",
        source
            .as_ref()
            .map(|p: &PathBuf| p.display().to_string())
            .unwrap_or_else(|| "built-in defaults".to_string())
    );
    println!(
        "Sessions:     {}",
        DirectorySessionStore::default_dir().display()
    );
    println!("Verbosity:    {:?}", args.verbosity());
    println!();

    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{}", rendered);
    Ok(())
}
