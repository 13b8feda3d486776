//! Outcome prediction for in-flight sessions

use crate::anomaly::Severity;
use crate::prediction::models::{early_features, PredictiveModels};
use crate::prediction::types::{OutcomePrediction, RiskFactor, TargetMetric};
use crate::stats;
use crate::types::session::count_switches;
use crate::types::{Message, Session};

/// Early messages needed before an outcome is predicted
pub const MIN_OUTCOME_MESSAGES: usize = 2;

/// First response slower than this is a risk
pub const SLOW_FIRST_RESPONSE_MS: f64 = 10_000.0;

/// Predicted cost or duration above this multiple of the training mean is a risk
const HIGH_PREDICTION_FACTOR: f64 = 2.0;

const CONFIDENCE_FLOOR: f64 = 0.1;
const CONFIDENCE_CAP: f64 = 0.95;

/// Predict quality, cost and duration from the early messages of a session
///
/// Returns `None` with fewer than two early messages. Targets without a
/// trained model are left empty; confidence then sits at its floor.
pub fn predict_outcome(
    models: &PredictiveModels,
    session: &Session,
    early: &[Message],
) -> Option<OutcomePrediction> {
    if early.len() < MIN_OUTCOME_MESSAGES {
        return None;
    }
    let features = early_features(early);

    let mut r_squared = Vec::new();
    let mut predict = |target: TargetMetric| {
        models.get(target).map(|model| {
            r_squared.push(model.validation.r_squared);
            (model.predict(&features), model.target_mean)
        })
    };
    let quality = predict(TargetMetric::Quality);
    let cost = predict(TargetMetric::Cost);
    let duration = predict(TargetMetric::Duration);

    let confidence = if r_squared.is_empty() {
        CONFIDENCE_FLOOR
    } else {
        stats::mean(&r_squared).clamp(CONFIDENCE_FLOOR, CONFIDENCE_CAP)
    };

    let mut risk_factors = Vec::new();

    let early_errors = early.iter().filter(|m| m.is_error() || m.mentions_error()).count();
    if early_errors > 0 {
        risk_factors.push(RiskFactor {
            factor: format!("{} error(s) in the first {} messages", early_errors, early.len()),
            impact: if early_errors >= 2 { Severity::High } else { Severity::Medium },
            mitigation: "Review the initial task and tool setup before continuing".to_string(),
        });
    }

    if let Some(first) = early.iter().find_map(Message::duration_ms) {
        if first > SLOW_FIRST_RESPONSE_MS {
            risk_factors.push(RiskFactor {
                factor: format!("Slow initial response ({:.0} ms)", first),
                impact: Severity::Medium,
                mitigation: "Simplify the opening prompt or check model load".to_string(),
            });
        }
    }

    let agents: Vec<Message> = early.iter().filter(|m| m.role.is_agent()).cloned().collect();
    if agents.len() >= MIN_OUTCOME_MESSAGES && count_switches(&agents) == 0 {
        risk_factors.push(RiskFactor {
            factor: "No alternation between manager and worker".to_string(),
            impact: Severity::Low,
            mitigation: "Hand off to the other agent earlier to validate progress".to_string(),
        });
    }

    if let Some((predicted, mean)) = cost {
        if mean > 0.0 && predicted > HIGH_PREDICTION_FACTOR * mean {
            risk_factors.push(RiskFactor {
                factor: format!("Predicted cost ${:.2} is well above the ${:.2} average", predicted, mean),
                impact: Severity::High,
                mitigation: "Set a spending limit or switch to a cheaper model".to_string(),
            });
        }
    }

    if let Some((predicted, mean)) = duration {
        if mean > 0.0 && predicted > HIGH_PREDICTION_FACTOR * mean {
            risk_factors.push(RiskFactor {
                factor: format!("Predicted duration {:.0} ms is well above average", predicted),
                impact: Severity::Medium,
                mitigation: "Break the task into smaller steps".to_string(),
            });
        }
    }

    let mut suggestions: Vec<String> = Vec::new();
    for risk in &risk_factors {
        if !suggestions.contains(&risk.mitigation) {
            suggestions.push(risk.mitigation.clone());
        }
    }
    if let Some((q, _)) = quality {
        if q < 0.5 {
            suggestions.push("Low predicted quality: add an explicit verification step".to_string());
        }
    }

    Some(OutcomePrediction {
        session_id: session.id.clone(),
        predicted_quality: quality.map(|(q, _)| q.clamp(0.0, 1.0)),
        predicted_cost: cost.map(|(c, _)| c.max(0.0)),
        predicted_duration_ms: duration.map(|(d, _)| d.max(0.0)),
        confidence,
        risk_factors,
        suggestions,
    })
}
