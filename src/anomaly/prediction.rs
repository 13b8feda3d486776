//! Early-signal anomaly prediction
//!
//! Rule-based scores over the first messages of an in-flight session. Each
//! anomaly family is scored independently against the baseline.

use crate::anomaly::types::{AnomalyPrediction, AnomalyType, PredictedAnomaly, Severity};
use crate::baseline::BaselineMetrics;
use crate::stats;
use crate::types::session::count_switches;
use crate::types::{Message, Session};

/// Early messages required before a prediction is attempted
pub const MIN_EARLY_MESSAGES: usize = 2;

/// Predicts performance, behavior and cost anomalies from early messages
#[derive(Debug, Clone, Default)]
pub struct AnomalyPredictor;

impl AnomalyPredictor {
    pub fn new() -> Self {
        Self
    }

    pub fn predict(
        &self,
        session: &Session,
        early_messages: &[Message],
        baseline: &BaselineMetrics,
    ) -> Option<AnomalyPrediction> {
        if early_messages.len() < MIN_EARLY_MESSAGES {
            return None;
        }

        let predictions = vec![
            performance_risk(early_messages, baseline),
            behavior_risk(early_messages),
            cost_risk(early_messages, baseline),
        ];

        let overall_risk = (predictions.iter().map(|p| p.probability).sum::<f64>()
            / predictions.len() as f64)
            .min(1.0);

        let mut recommendations: Vec<String> = Vec::new();
        for prediction in predictions.iter().filter(|p| p.probability >= 0.4) {
            for rec in recommendations_for(prediction.anomaly_type) {
                if !recommendations.iter().any(|r| r == rec) {
                    recommendations.push(rec.to_string());
                }
            }
        }

        Some(AnomalyPrediction {
            session_id: session.id.clone(),
            predictions,
            overall_risk,
            recommendations,
        })
    }
}

fn performance_risk(messages: &[Message], baseline: &BaselineMetrics) -> PredictedAnomaly {
    let mut probability: f64 = 0.0;
    let mut indicators = Vec::new();

    let durations: Vec<f64> = messages.iter().filter_map(Message::duration_ms).collect();
    let expected = baseline.performance.response_time.mean;
    if !durations.is_empty() && expected > 0.0 {
        let ratio = stats::mean(&durations) / expected;
        if ratio > 1.5 {
            probability += ((ratio - 1.0) / 2.0).min(0.6);
            indicators.push(format!("Early responses {:.1}x slower than baseline", ratio));
        }
    }

    let errors = messages.iter().filter(|m| m.is_error()).count();
    if errors > 0 {
        probability += 0.2 * errors as f64;
        indicators.push(format!("{} error(s) in the first {} messages", errors, messages.len()));
    }

    predicted(AnomalyType::Performance, probability, indicators)
}

fn behavior_risk(messages: &[Message]) -> PredictedAnomaly {
    let mut probability: f64 = 0.0;
    let mut indicators = Vec::new();

    let agent_messages = messages.iter().filter(|m| m.role.is_agent()).count();
    if agent_messages >= 3 && count_switches(messages) == 0 {
        probability += 0.4;
        indicators.push("No manager/worker alternation in early messages".to_string());
    }

    let reported = messages.iter().filter(|m| m.mentions_error()).count();
    let share = reported as f64 / messages.len() as f64;
    if share >= 0.5 {
        probability += 0.4;
        indicators.push(format!("{:.0}% of early messages report failures", share * 100.0));
    } else if reported > 0 {
        probability += 0.15;
        indicators.push("Failure reported early in the session".to_string());
    }

    let tool_calls: usize = messages.iter().map(Message::tool_invocations).sum();
    if tool_calls > messages.len() * 2 {
        probability += 0.2;
        indicators.push(format!("{} tool invocations in {} messages", tool_calls, messages.len()));
    }

    predicted(AnomalyType::Behavior, probability, indicators)
}

fn cost_risk(messages: &[Message], baseline: &BaselineMetrics) -> PredictedAnomaly {
    let mut probability: f64 = 0.0;
    let mut indicators = Vec::new();

    let tokens: Vec<f64> = messages.iter().filter_map(Message::tokens).map(|t| t as f64).collect();
    let expected = baseline.cost.tokens_per_message.mean;
    if !tokens.is_empty() && expected > 0.0 {
        let ratio = stats::mean(&tokens) / expected;
        if ratio > 1.3 {
            probability += ((ratio - 1.0) / 2.0).min(0.8);
            indicators.push(format!("Early token usage {:.1}x the per-message baseline", ratio));
        }
    }

    let total_chars: usize = messages.iter().map(|m| m.content.len()).sum();
    if total_chars / messages.len() > 4000 {
        probability += 0.2;
        indicators.push("Very long early messages".to_string());
    }

    predicted(AnomalyType::Cost, probability, indicators)
}

fn predicted(anomaly_type: AnomalyType, probability: f64, indicators: Vec<String>) -> PredictedAnomaly {
    let probability = probability.clamp(0.0, 1.0);
    PredictedAnomaly {
        anomaly_type,
        probability,
        expected_severity: Severity::from_probability(probability),
        indicators,
    }
}

fn recommendations_for(anomaly_type: AnomalyType) -> &'static [&'static str] {
    match anomaly_type {
        AnomalyType::Performance => &[
            "Monitor response times closely for this session",
            "Investigate early errors before continuing",
        ],
        AnomalyType::Behavior => &[
            "Check that the manager is reviewing worker output",
            "Investigate early errors before continuing",
        ],
        AnomalyType::Cost => &["Set a token budget for this session", "Summarize context between turns"],
        _ => &[],
    }
}
