//! Per-target regression models
//!
//! Each feature's coefficient is estimated independently as
//! `corr(x, y) * std(y) / std(x)`, with the intercept placing the fit through
//! the means. This is not a joint least-squares solution: correlated features
//! each claim the shared signal.

use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::prediction::types::{ModelState, PredictionModel, TargetMetric, ValidationResults};
use crate::stats;
use crate::types::metrics::metrics_by_session;
use crate::types::session::count_switches;
use crate::types::{Message, PerformanceMetric, Session};

/// Labeled examples required per target
pub const MIN_TRAINING_EXAMPLES: usize = 10;

/// Messages used as early features
pub const EARLY_FEATURE_WINDOW: usize = 5;

pub const FEATURE_NAMES: [&str; 6] = [
    "early_messages",
    "early_errors",
    "early_avg_response_ms",
    "early_switches",
    "early_tool_calls",
    "early_tokens",
];

/// Feature vector from the first messages of a session
pub fn early_features(messages: &[Message]) -> Vec<f64> {
    let window = &messages[..messages.len().min(EARLY_FEATURE_WINDOW)];
    let durations: Vec<f64> = window.iter().filter_map(Message::duration_ms).collect();
    vec![
        window.len() as f64,
        window.iter().filter(|m| m.mentions_error()).count() as f64,
        stats::mean(&durations),
        count_switches(window) as f64,
        window.iter().map(Message::tool_invocations).sum::<usize>() as f64,
        window.iter().filter_map(Message::tokens).sum::<u64>() as f64,
    ]
}

/// Observed value of a target for a finished session
fn target_value(target: TargetMetric, session: &Session, metrics: &[PerformanceMetric]) -> Option<f64> {
    if !session.is_finished() || session.messages.is_empty() {
        return None;
    }
    match target {
        TargetMetric::Quality => Some(session.success_score()),
        TargetMetric::Cost => Some(session.total_cost(metrics)),
        TargetMetric::Duration => session.duration_ms(),
    }
}

/// Fit one target; `None` below the example minimum
pub fn fit_model(target: TargetMetric, examples: &[(Vec<f64>, f64)]) -> Option<PredictionModel> {
    if examples.len() < MIN_TRAINING_EXAMPLES {
        return None;
    }

    let ys: Vec<f64> = examples.iter().map(|(_, y)| *y).collect();
    let target_mean = stats::mean(&ys);
    let std_y = stats::std_dev(&ys);

    let mut coefficients = Vec::with_capacity(FEATURE_NAMES.len());
    let mut feature_means = Vec::with_capacity(FEATURE_NAMES.len());
    for j in 0..FEATURE_NAMES.len() {
        let xs: Vec<f64> = examples.iter().map(|(x, _)| x[j]).collect();
        let std_x = stats::std_dev(&xs);
        let coefficient = if std_x > 0.0 {
            stats::correlation(&xs, &ys) * std_y / std_x
        } else {
            0.0
        };
        coefficients.push(coefficient);
        feature_means.push(stats::mean(&xs));
    }

    let intercept = target_mean
        - coefficients
            .iter()
            .zip(&feature_means)
            .map(|(c, m)| c * m)
            .sum::<f64>();

    let mut model = PredictionModel {
        id: Uuid::new_v4().to_string(),
        target,
        features: FEATURE_NAMES.iter().map(|f| f.to_string()).collect(),
        coefficients,
        intercept,
        feature_means,
        target_mean,
        validation: ValidationResults::default(),
        training_examples: examples.len(),
        trained_at: Utc::now(),
    };
    model.validation = validate(&model, examples);
    Some(model)
}

/// In-sample MSE, MAE and R²
fn validate(model: &PredictionModel, examples: &[(Vec<f64>, f64)]) -> ValidationResults {
    let n = examples.len() as f64;
    let mut squared = 0.0;
    let mut absolute = 0.0;
    let mut total = 0.0;
    for (x, y) in examples {
        let error = y - model.predict(x);
        squared += error * error;
        absolute += error.abs();
        total += (y - model.target_mean).powi(2);
    }
    let r_squared = if total > 0.0 { 1.0 - squared / total } else { 0.0 };
    ValidationResults {
        mse: squared / n,
        mae: absolute / n,
        r_squared,
        accuracy: r_squared.max(0.0),
    }
}

/// The set of trained models
#[derive(Debug, Clone)]
pub struct PredictiveModels {
    state: ModelState,
    models: BTreeMap<TargetMetric, PredictionModel>,
}

impl PredictiveModels {
    pub fn new() -> Self {
        Self {
            state: ModelState::Untrained,
            models: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    /// Retrain every target, replacing the previous set wholesale
    ///
    /// Returns the number of models trained; targets without enough labeled
    /// examples are skipped.
    pub fn train(&mut self, sessions: &[Session], metrics: &[PerformanceMetric]) -> usize {
        let by_session = metrics_by_session(metrics);

        let mut models = BTreeMap::new();
        for target in TargetMetric::all() {
            let examples: Vec<(Vec<f64>, f64)> = sessions
                .iter()
                .filter_map(|s| {
                    let own = by_session.get(&s.id);
                    target_value(target, s, own).map(|y| (early_features(&s.messages), y))
                })
                .collect();

            match fit_model(target, &examples) {
                Some(model) => {
                    debug!(
                        target = %target,
                        examples = examples.len(),
                        r_squared = model.validation.r_squared,
                        "trained model"
                    );
                    models.insert(target, model);
                }
                None => debug!(target = %target, examples = examples.len(), "not enough examples"),
            }
        }

        self.models = models;
        self.state = if self.models.is_empty() {
            ModelState::Untrained
        } else {
            ModelState::Trained
        };
        info!(models = self.models.len(), "prediction models retrained");
        self.models.len()
    }

    pub fn get(&self, target: TargetMetric) -> Option<&PredictionModel> {
        self.models.get(&target)
    }

    pub fn models(&self) -> Vec<PredictionModel> {
        self.models.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn clear_models(&mut self) {
        self.models.clear();
        self.state = ModelState::Untrained;
    }
}

impl Default for PredictiveModels {
    fn default() -> Self {
        Self::new()
    }
}
