//! Early-indicator quality prediction
//!
//! A threshold classifier over features of the first messages of a session.
//! Each feature's threshold is its 75th percentile across finished sessions;
//! a session is predicted to fail when at least two features exceed theirs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::stats;
use crate::types::{Message, Session};

/// Messages considered early indicators
pub const EARLY_WINDOW: usize = 5;

/// Finished sessions needed (strictly more than this) to train
pub const MIN_TRAINING_SESSIONS: usize = 10;

/// Features exceeding their threshold needed to predict failure
pub const FAILURE_VOTES: usize = 2;

pub const INDICATOR_NAMES: [&str; 4] = [
    "early_errors",
    "avg_response_ms",
    "avg_message_length",
    "tool_calls",
];

/// Early indicator vector for a message prefix
pub fn early_indicators(messages: &[Message]) -> [f64; 4] {
    let window = &messages[..messages.len().min(EARLY_WINDOW)];
    let durations: Vec<f64> = window.iter().filter_map(Message::duration_ms).collect();
    let lengths: Vec<f64> = window.iter().map(|m| m.content.chars().count() as f64).collect();
    [
        window.iter().filter(|m| m.mentions_error()).count() as f64,
        stats::mean(&durations),
        stats::mean(&lengths),
        window.iter().map(Message::tool_invocations).sum::<usize>() as f64,
    ]
}

/// Trained threshold classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityModel {
    pub thresholds: BTreeMap<String, f64>,
    /// Training-set accuracy
    pub accuracy: f64,
    pub training_sessions: usize,
    pub observed_failure_rate: f64,
    pub predicted_failure_rate: f64,
}

impl QualityModel {
    /// Train on finished sessions; `None` with too little history
    pub fn train(sessions: &[Session]) -> Option<Self> {
        let labeled: Vec<([f64; 4], bool)> = sessions
            .iter()
            .filter(|s| s.is_finished() && !s.messages.is_empty())
            .map(|s| (early_indicators(&s.messages), s.success_score() < 0.5))
            .collect();
        if labeled.len() <= MIN_TRAINING_SESSIONS {
            return None;
        }

        let thresholds: BTreeMap<String, f64> = INDICATOR_NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let column: Vec<f64> = labeled.iter().map(|(f, _)| f[i]).collect();
                (name.to_string(), stats::percentile(&column, 75.0))
            })
            .collect();

        let mut model = Self {
            thresholds,
            accuracy: 0.0,
            training_sessions: labeled.len(),
            observed_failure_rate: 0.0,
            predicted_failure_rate: 0.0,
        };

        let n = labeled.len() as f64;
        let predictions: Vec<bool> = labeled.iter().map(|(f, _)| model.predict_features(f)).collect();
        let correct = predictions
            .iter()
            .zip(&labeled)
            .filter(|(p, (_, failed))| *p == failed)
            .count();
        model.accuracy = correct as f64 / n;
        model.observed_failure_rate = labeled.iter().filter(|(_, failed)| *failed).count() as f64 / n;
        model.predicted_failure_rate = predictions.iter().filter(|p| **p).count() as f64 / n;
        Some(model)
    }

    /// Names of the indicators above their threshold
    pub fn exceeded(&self, messages: &[Message]) -> Vec<&'static str> {
        let features = early_indicators(messages);
        INDICATOR_NAMES
            .iter()
            .zip(features)
            .filter(|(name, value)| {
                self.thresholds
                    .get(**name)
                    .map(|t| *value > *t)
                    .unwrap_or(false)
            })
            .map(|(name, _)| *name)
            .collect()
    }

    pub fn predict_failure(&self, messages: &[Message]) -> bool {
        self.predict_features(&early_indicators(messages))
    }

    fn predict_features(&self, features: &[f64; 4]) -> bool {
        let votes = INDICATOR_NAMES
            .iter()
            .zip(features)
            .filter(|(name, value)| {
                self.thresholds
                    .get(**name)
                    .map(|t| **value > *t)
                    .unwrap_or(false)
            })
            .count();
        votes >= FAILURE_VOTES
    }
}
