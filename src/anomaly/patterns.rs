//! Pattern table: recurring anomaly signatures
//!
//! Anomalies are keyed by (type, normalized title). Each entry keeps a
//! characteristic feature snapshot; a later session matches the entry when
//! at least 70% of those features fall within 20% of the stored values.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::anomaly::types::{Anomaly, AnomalyPattern, AnomalyType, Severity};
use crate::types::{PerformanceMetric, Session};

/// Occurrences needed before a pattern can be recurring
pub const RECURRENCE_MIN_OCCURRENCES: usize = 3;

/// Occurrences per day a pattern must exceed to be recurring
pub const RECURRENCE_MIN_FREQUENCY: f64 = 0.1;

/// Share of characteristics that must match for a pattern hit
pub const DEFAULT_MATCH_RATIO: f64 = 0.7;

/// Relative tolerance for a single characteristic
pub const DEFAULT_MATCH_TOLERANCE: f64 = 0.2;

/// Characteristic features of a session used for pattern matching
pub fn characteristic_features(
    session: &Session,
    metrics: &[PerformanceMetric],
) -> BTreeMap<String, f64> {
    let mut features = BTreeMap::new();
    features.insert("message_count".to_string(), session.message_count() as f64);
    features.insert("error_count".to_string(), session.error_count() as f64);
    features.insert("tool_calls".to_string(), session.tool_call_count() as f64);
    features.insert("agent_switches".to_string(), session.agent_switches() as f64);
    features.insert("token_usage".to_string(), session.total_tokens(metrics) as f64);
    features.insert("cost".to_string(), session.total_cost(metrics));
    if let Some(avg) = session.avg_response_time(metrics) {
        features.insert("avg_response_time".to_string(), avg);
    }
    if let Some(duration) = session.duration_ms() {
        features.insert("duration_ms".to_string(), duration);
    }
    features
}

/// Whether `actual` lies within `tolerance` (relative) of `reference`
fn within_tolerance(actual: f64, reference: f64, tolerance: f64) -> bool {
    (actual - reference).abs() <= tolerance * reference.abs()
}

/// Share of `characteristics` matched by `features`
pub fn match_ratio(
    characteristics: &BTreeMap<String, f64>,
    features: &BTreeMap<String, f64>,
    tolerance: f64,
) -> f64 {
    if characteristics.is_empty() {
        return 0.0;
    }
    let matched = characteristics
        .iter()
        .filter(|(key, reference)| {
            features
                .get(*key)
                .map(|actual| within_tolerance(*actual, **reference, tolerance))
                .unwrap_or(false)
        })
        .count();
    matched as f64 / characteristics.len() as f64
}

/// A pattern hit for a session
#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub pattern: AnomalyPattern,
    pub ratio: f64,
}

/// Keyed store of anomaly patterns
#[derive(Debug, Clone, Default)]
pub struct PatternTable {
    patterns: HashMap<String, AnomalyPattern>,
}

impl PatternTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an anomaly into the table, creating or updating its pattern
    pub fn record(&mut self, anomaly: &Anomaly) -> &AnomalyPattern {
        let key = anomaly.signature();
        let pattern = self.patterns.entry(key).or_insert_with(|| AnomalyPattern {
            id: Uuid::new_v4().to_string(),
            anomaly_type: anomaly.anomaly_type,
            title: super::types::normalize_title(&anomaly.title),
            occurrences: 0,
            first_seen: anomaly.detected_at,
            last_seen: anomaly.detected_at,
            affected_sessions: Vec::new(),
            frequency: 0.0,
            is_recurring: false,
            severity: anomaly.severity,
            characteristics: anomaly.context.features.clone(),
        });

        pattern.occurrences += 1;
        pattern.first_seen = pattern.first_seen.min(anomaly.detected_at);
        pattern.last_seen = pattern.last_seen.max(anomaly.detected_at);
        pattern.severity = pattern.severity.max(anomaly.severity);
        if pattern.characteristics.is_empty() {
            pattern.characteristics = anomaly.context.features.clone();
        }
        if let Some(session_id) = &anomaly.session_id {
            if !pattern.affected_sessions.contains(session_id) {
                pattern.affected_sessions.push(session_id.clone());
            }
        }

        pattern.frequency = frequency(pattern.occurrences, pattern.first_seen, pattern.last_seen);
        pattern.is_recurring = pattern.occurrences >= RECURRENCE_MIN_OCCURRENCES
            && pattern.frequency > RECURRENCE_MIN_FREQUENCY;

        pattern
    }

    /// Best high/critical pattern matching a session's features
    ///
    /// Patterns already attributed to the session and known-pattern
    /// recurrences themselves are not candidates.
    pub fn find_match(
        &self,
        session_id: &str,
        features: &BTreeMap<String, f64>,
        min_ratio: f64,
        tolerance: f64,
    ) -> Option<PatternMatch> {
        self.patterns
            .values()
            .filter(|p| p.severity >= Severity::High)
            .filter(|p| p.anomaly_type != AnomalyType::Pattern)
            .filter(|p| !p.affected_sessions.iter().any(|s| s == session_id))
            .map(|p| (p, match_ratio(&p.characteristics, features, tolerance)))
            .filter(|(_, ratio)| *ratio >= min_ratio)
            .max_by(|(a, ra), (b, rb)| {
                ra.partial_cmp(rb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.occurrences.cmp(&b.occurrences))
            })
            .map(|(p, ratio)| PatternMatch { pattern: p.clone(), ratio })
    }

    pub fn get(&self, signature: &str) -> Option<&AnomalyPattern> {
        self.patterns.get(signature)
    }

    /// All patterns, most frequent first
    pub fn all(&self) -> Vec<AnomalyPattern> {
        let mut patterns: Vec<AnomalyPattern> = self.patterns.values().cloned().collect();
        patterns.sort_by(|a, b| {
            b.occurrences
                .cmp(&a.occurrences)
                .then_with(|| b.last_seen.cmp(&a.last_seen))
        });
        patterns
    }

    pub fn recurring(&self) -> Vec<AnomalyPattern> {
        self.all().into_iter().filter(|p| p.is_recurring).collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn clear(&mut self) {
        self.patterns.clear();
    }
}

/// Occurrences per day over the observed span (a span under one day counts as one day)
fn frequency(occurrences: usize, first_seen: DateTime<Utc>, last_seen: DateTime<Utc>) -> f64 {
    let span_days = (last_seen - first_seen).num_seconds() as f64 / 86_400.0;
    occurrences as f64 / span_days.max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::types::AnomalyMetrics;
    use chrono::Duration;

    fn anomaly(session: &str, at: DateTime<Utc>, severity: Severity) -> Anomaly {
        let mut features = BTreeMap::new();
        features.insert("message_count".to_string(), 40.0);
        features.insert("error_count".to_string(), 6.0);
        features.insert("tool_calls".to_string(), 12.0);
        Anomaly::new(
            AnomalyType::Error,
            severity,
            "Elevated error rate",
            "too many errors",
            AnomalyMetrics {
                actual_value: 0.15,
                expected_value: 0.1,
                deviation_score: 1.5,
                confidence_level: 0.8,
            },
        )
        .for_session(session)
        .with_features(features)
        .detected_at(at)
    }

    #[test]
    fn test_single_occurrence_not_recurring() {
        let mut table = PatternTable::new();
        let pattern = table.record(&anomaly("s1", Utc::now(), Severity::High));
        assert_eq!(pattern.occurrences, 1);
        assert!(!pattern.is_recurring);
    }

    #[test]
    fn test_three_occurrences_within_ten_days_recur() {
        let mut table = PatternTable::new();
        let start = Utc::now() - Duration::days(10);
        table.record(&anomaly("s1", start, Severity::Medium));
        table.record(&anomaly("s2", start + Duration::days(4), Severity::High));
        let pattern = table.record(&anomaly("s3", start + Duration::days(9), Severity::Medium));

        assert_eq!(pattern.occurrences, 3);
        assert!(pattern.frequency > RECURRENCE_MIN_FREQUENCY);
        assert!(pattern.is_recurring);
        assert_eq!(pattern.severity, Severity::High);
        assert_eq!(pattern.affected_sessions.len(), 3);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_sparse_occurrences_do_not_recur() {
        let mut table = PatternTable::new();
        let start = Utc::now() - Duration::days(60);
        table.record(&anomaly("s1", start, Severity::High));
        table.record(&anomaly("s2", start + Duration::days(30), Severity::High));
        let pattern = table.record(&anomaly("s3", start + Duration::days(60), Severity::High));
        // 3 occurrences over 60 days = 0.05/day
        assert!(!pattern.is_recurring);
    }

    #[test]
    fn test_fuzzy_match_requires_seventy_percent() {
        let mut table = PatternTable::new();
        table.record(&anomaly("s1", Utc::now(), Severity::High));

        let mut close = BTreeMap::new();
        close.insert("message_count".to_string(), 44.0);
        close.insert("error_count".to_string(), 5.0);
        close.insert("tool_calls".to_string(), 30.0);
        // 2 of 3 features within 20% = 0.67
        assert!(table.find_match("s9", &close, DEFAULT_MATCH_RATIO, DEFAULT_MATCH_TOLERANCE).is_none());

        close.insert("tool_calls".to_string(), 13.0);
        let hit = table
            .find_match("s9", &close, DEFAULT_MATCH_RATIO, DEFAULT_MATCH_TOLERANCE)
            .expect("should match");
        assert_eq!(hit.ratio, 1.0);

        // The originating session never matches its own pattern
        assert!(table.find_match("s1", &close, DEFAULT_MATCH_RATIO, DEFAULT_MATCH_TOLERANCE).is_none());
    }

    #[test]
    fn test_low_severity_patterns_are_not_matched() {
        let mut table = PatternTable::new();
        let a = anomaly("s1", Utc::now(), Severity::Medium);
        let features = a.context.features.clone();
        table.record(&a);
        assert!(table.find_match("s2", &features, DEFAULT_MATCH_RATIO, DEFAULT_MATCH_TOLERANCE).is_none());
    }
}
