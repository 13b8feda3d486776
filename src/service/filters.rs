//! Query filters for the service read API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::anomaly::{Anomaly, AnomalyType, Severity};
use crate::insights::{Insight, InsightType};
use crate::recommendations::{Difficulty, Priority, Recommendation, RecommendationCategory};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightFilter {
    pub insight_type: Option<InsightType>,
    pub min_severity: Option<Severity>,
    pub min_confidence: Option<f64>,
    pub limit: Option<usize>,
}

impl InsightFilter {
    pub fn matches(&self, insight: &Insight) -> bool {
        self.insight_type.map_or(true, |t| insight.insight_type == t)
            && self.min_severity.map_or(true, |s| insight.severity >= s)
            && self.min_confidence.map_or(true, |c| insight.confidence >= c)
    }

    pub fn apply(&self, insights: &[Insight]) -> Vec<Insight> {
        take(insights.iter().filter(|i| self.matches(i)), self.limit)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationFilter {
    pub category: Option<RecommendationCategory>,
    pub min_priority: Option<Priority>,
    pub difficulty: Option<Difficulty>,
    pub limit: Option<usize>,
}

impl RecommendationFilter {
    pub fn matches(&self, recommendation: &Recommendation) -> bool {
        self.category.map_or(true, |c| recommendation.category == c)
            && self.min_priority.map_or(true, |p| recommendation.priority >= p)
            && self
                .difficulty
                .map_or(true, |d| recommendation.implementation.difficulty == d)
    }

    pub fn apply(&self, recommendations: &[Recommendation]) -> Vec<Recommendation> {
        take(recommendations.iter().filter(|r| self.matches(r)), self.limit)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFilter {
    pub anomaly_type: Option<AnomalyType>,
    pub min_severity: Option<Severity>,
    pub session_id: Option<String>,
    /// Only anomalies detected at or after this instant
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AnomalyFilter {
    pub fn matches(&self, anomaly: &Anomaly) -> bool {
        self.anomaly_type.map_or(true, |t| anomaly.anomaly_type == t)
            && self.min_severity.map_or(true, |s| anomaly.severity >= s)
            && self
                .session_id
                .as_deref()
                .map_or(true, |id| anomaly.session_id.as_deref() == Some(id))
            && self.since.map_or(true, |t| anomaly.detected_at >= t)
    }

    pub fn apply(&self, anomalies: &[Anomaly]) -> Vec<Anomaly> {
        take(anomalies.iter().filter(|a| self.matches(a)), self.limit)
    }
}

fn take<'a, T: Clone + 'a>(items: impl Iterator<Item = &'a T>, limit: Option<usize>) -> Vec<T> {
    items.take(limit.unwrap_or(usize::MAX)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::AnomalyMetrics;

    #[test]
    fn test_insight_filter() {
        let insights = vec![
            Insight::new(InsightType::Cost, Severity::High, "a", "", 0.9),
            Insight::new(InsightType::Cost, Severity::Low, "b", "", 0.9),
            Insight::new(InsightType::Trend, Severity::High, "c", "", 0.4),
        ];
        let filter = InsightFilter {
            min_severity: Some(Severity::Medium),
            ..Default::default()
        };
        let titles: Vec<String> = filter.apply(&insights).into_iter().map(|i| i.title).collect();
        assert_eq!(titles, vec!["a", "c"]);

        let filter = InsightFilter {
            insight_type: Some(InsightType::Cost),
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(filter.apply(&insights).len(), 1);
        assert_eq!(InsightFilter::default().apply(&insights).len(), 3);
    }

    #[test]
    fn test_anomaly_filter_by_session() {
        let metrics = AnomalyMetrics {
            actual_value: 1.0,
            expected_value: 0.0,
            deviation_score: 5.0,
            confidence_level: 0.9,
        };
        let anomalies = vec![
            Anomaly::new(AnomalyType::Cost, Severity::High, "x", "", metrics.clone()).for_session("s1"),
            Anomaly::new(AnomalyType::Cost, Severity::High, "y", "", metrics).for_session("s2"),
        ];
        let filter = AnomalyFilter {
            session_id: Some("s2".to_string()),
            ..Default::default()
        };
        let found = filter.apply(&anomalies);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "y");
    }
}
