//! Integration tests for the pure analysis pipeline and the directory store

mod common;

use quickcheck_macros::quickcheck;
use std::collections::BTreeSet;
use chrono::Duration;
use std::sync::Arc;
use tempfile::TempDir;

use sessionsight::anomaly::{AnomalyDetector, AnomalyType};
use sessionsight::insights::InsightsEngine;
use sessionsight::recommendations::{
    build_strategies, generate_recommendations, Difficulty, RecommendationInput,
};
use sessionsight::store::{DirectorySessionStore, SessionDocument};
use sessionsight::types::{PerformanceMetric, Session};
use sessionsight::{AnalyticsConfig, AnalyticsService, SessionStore};

fn corpus(size: usize) -> (Vec<Session>, Vec<PerformanceMetric>) {
    let mut sessions = Vec::new();
    let mut metrics = Vec::new();
    for index in 0..size {
        let (session, m, _) = common::recorded_session(index);
        sessions.push(session);
        metrics.extend(m);
    }
    (sessions, metrics)
}

#[quickcheck]
fn prop_recommendations_carry_contract(size: u8) -> bool {
    let (sessions, metrics) = corpus(size as usize % 30);
    let report = InsightsEngine::new(Some(7)).generate_insights(&sessions, &metrics);
    let recommendations = generate_recommendations(&RecommendationInput {
        report: &report,
        anomaly_patterns: &[],
        sessions: &sessions,
        metrics: &metrics,
    });

    recommendations.iter().all(|r| {
        (0.0..=1.0).contains(&r.evidence.confidence)
            && !r.monitoring.metrics.is_empty()
            && !r.monitoring.success_criteria.is_empty()
            && !r.monitoring.timeframe.is_empty()
    })
}

#[quickcheck]
fn prop_clusters_partition_sessions(size: u8) -> bool {
    let (sessions, metrics) = corpus(size as usize % 40);
    let report = InsightsEngine::new(Some(11)).generate_insights(&sessions, &metrics);

    let mut seen = BTreeSet::new();
    let mut total = 0;
    for cluster in &report.clusters {
        for id in &cluster.sessions {
            seen.insert(id.clone());
            total += 1;
        }
    }
    report.clusters.is_empty() || (total == sessions.len() && seen.len() == sessions.len())
}

#[test]
fn test_quick_wins_bundle_only_easy_items() {
    let (sessions, metrics) = corpus(20);
    let report = InsightsEngine::new(Some(3)).generate_insights(&sessions, &metrics);
    let recommendations = generate_recommendations(&RecommendationInput {
        report: &report,
        anomaly_patterns: &[],
        sessions: &sessions,
        metrics: &metrics,
    });

    for strategy in build_strategies(&recommendations) {
        assert!(!strategy.recommendations.is_empty());
        if strategy.name == "Quick Wins" {
            assert!(strategy
                .recommendations
                .iter()
                .all(|r| r.implementation.difficulty == Difficulty::Easy));
        }
        let hours: f64 = strategy
            .recommendations
            .iter()
            .map(|r| r.implementation.estimated_hours)
            .sum();
        assert!((strategy.combined.implementation_hours - hours).abs() < 1e-9);
    }
}

#[test]
fn test_detector_replay_matches_corpus() {
    let mut sessions = Vec::new();
    let mut metrics = Vec::new();
    let mut communications = Vec::new();
    for index in 0..12 {
        let (s, m, c) = common::recorded_session(index);
        sessions.push(s);
        metrics.extend(m);
        communications.extend(c);
    }

    let detector = AnomalyDetector::with_defaults();
    detector.initialize(&sessions, &metrics, &communications);
    let baseline = detector.baseline().unwrap();
    assert_eq!(baseline.session_count, 12);
    assert!(baseline.performance.response_time.mean > 1800.0);
    assert!(baseline.performance.response_time.mean < 2200.0);

    // A corpus member never deviates from its own baseline by a critical margin
    let own = detector.detect_session_anomalies(&sessions[0], &metrics[..8], &communications[..7]);
    assert!(own
        .iter()
        .all(|a| a.severity < sessionsight::anomaly::Severity::Critical));
}

#[test]
fn test_replayed_anomalies_keep_session_time() {
    let mut sessions = Vec::new();
    let mut metrics = Vec::new();
    let mut communications = Vec::new();
    for index in 0..30 {
        let (s, m, c) = common::recorded_session(index);
        sessions.push(s);
        metrics.extend(m);
        communications.extend(c);
    }
    for (n, id) in ["slow-a", "slow-b", "slow-c"].iter().enumerate() {
        let start = common::day_start() + Duration::days(40 * n as i64);
        sessions.push(common::slow_session_at(id, start));
    }

    let detector = AnomalyDetector::with_defaults();
    detector.initialize(&sessions, &metrics, &communications);

    let replayed = detector
        .anomalies()
        .into_iter()
        .find(|a| a.session_id.as_deref() == Some("slow-b") && a.anomaly_type == AnomalyType::Performance)
        .expect("replayed performance anomaly");
    assert_eq!(replayed.detected_at, common::day_start() + Duration::days(40));

    // Three slow sessions spread over eighty days are rare, not recurring
    let pattern = detector
        .patterns()
        .into_iter()
        .find(|p| p.anomaly_type == AnomalyType::Performance && p.affected_sessions.iter().any(|s| s == "slow-a"))
        .expect("performance pattern");
    assert_eq!(pattern.occurrences, 3);
    assert_eq!(pattern.first_seen, common::day_start());
    assert_eq!(pattern.last_seen - pattern.first_seen, Duration::days(80));
    assert!(pattern.frequency < 0.1);
    assert!(!pattern.is_recurring);
}

#[tokio::test]
async fn test_directory_store_feeds_service() {
    let temp = TempDir::new().unwrap();
    let store = DirectorySessionStore::new(temp.path());
    for index in 0..11 {
        let (session, metrics, communications) = common::recorded_session(index);
        store
            .save(&SessionDocument {
                session,
                metrics,
                communications,
            })
            .await
            .unwrap();
    }
    std::fs::write(temp.path().join("session_broken.json"), "{ not json").unwrap();

    let store: Arc<dyn SessionStore> = Arc::new(store);
    let service = AnalyticsService::new(
        AnalyticsConfig {
            enable_real_time_analysis: false,
            ..Default::default()
        },
        store,
    );
    service.initialize().await.unwrap();

    assert_eq!(service.snapshot().sessions_analyzed, 11);
    let analysis = service.analyze_stored_session("session-02", true).await.unwrap();
    assert_eq!(analysis.session_id, "session-02");

    service.shutdown().await;
}
