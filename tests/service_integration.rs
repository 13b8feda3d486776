//! Integration tests for the analytics service lifecycle

mod common;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sessionsight::anomaly::{AnomalyType, DetectorState, Severity};
use sessionsight::service::{AnomalyFilter, InsightFilter, RecommendationFilter};
use sessionsight::types::{AgentCommunication, PerformanceMetric, Session};
use sessionsight::{
    AnalyticsConfig, AnalyticsError, AnalyticsEvent, AnalyticsService, InMemorySessionStore,
    SessionStore,
};

fn one_shot_config() -> AnalyticsConfig {
    AnalyticsConfig {
        enable_real_time_analysis: false,
        cluster_seed: Some(42),
        ..Default::default()
    }
}

async fn service_over(store: InMemorySessionStore, config: AnalyticsConfig) -> (AnalyticsService, Arc<InMemorySessionStore>) {
    let store = Arc::new(store);
    let dyn_store: Arc<dyn SessionStore> = store.clone();
    (AnalyticsService::new(config, dyn_store), store)
}

/// Store whose enumeration stalls once `stall` is set
struct StallingStore {
    inner: InMemorySessionStore,
    stall: AtomicBool,
}

impl StallingStore {
    async fn over(sessions: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: common::populated_store(sessions).await,
            stall: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl SessionStore for StallingStore {
    async fn get_all_sessions(&self) -> sessionsight::Result<Vec<Session>> {
        if self.stall.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        self.inner.get_all_sessions().await
    }

    async fn get_session_metrics(&self, session_id: &str) -> sessionsight::Result<Vec<PerformanceMetric>> {
        self.inner.get_session_metrics(session_id).await
    }

    async fn get_session_communications(
        &self,
        session_id: &str,
    ) -> sessionsight::Result<Vec<AgentCommunication>> {
        self.inner.get_session_communications(session_id).await
    }
}

#[tokio::test]
async fn test_initialize_builds_snapshot() {
    let (service, _) = service_over(common::populated_store(12).await, one_shot_config()).await;
    service.initialize().await.unwrap();

    assert!(service.is_initialized());
    assert_eq!(service.detector().state(), DetectorState::Active);

    let snapshot = service.snapshot();
    assert_eq!(snapshot.sessions_analyzed, 12);
    assert!(snapshot.last_update.is_some());
    assert!(snapshot.resource_forecast.is_some());
    assert!(snapshot.resource_optimization.is_some());
    assert_eq!(
        service.get_resource_forecast(None).map(|f| f.days),
        Some(service.config().forecast_days)
    );
    assert_eq!(service.get_resource_forecast(Some(3)).map(|f| f.days), Some(3));

    let status = service.get_status().await;
    assert!(status.initialized);
    assert!(status.health.store);
    assert!(status.health.anomaly_detector);
    assert!(status.health.insights_engine);
    assert!(!status.health.scheduler);
    assert_eq!(status.telemetry.analyses_completed, 1);

    service.shutdown().await;
}

#[tokio::test]
async fn test_every_recommendation_has_evidence_and_monitoring() {
    let (service, _) = service_over(common::populated_store(15).await, one_shot_config()).await;
    service.initialize().await.unwrap();

    for rec in service.get_recommendations(&RecommendationFilter::default()) {
        assert!((0.0..=1.0).contains(&rec.evidence.confidence), "{}", rec.title);
        assert!(!rec.monitoring.metrics.is_empty(), "{}", rec.title);
        assert!(!rec.monitoring.success_criteria.is_empty(), "{}", rec.title);
        assert!(!rec.monitoring.timeframe.is_empty(), "{}", rec.title);
    }

    let insights = service.get_insights(&InsightFilter::default());
    for pair in insights.windows(2) {
        assert!(pair[0].severity >= pair[1].severity);
    }

    service.shutdown().await;
}

#[tokio::test]
async fn test_empty_history_initializes_and_detects_nothing() {
    let (service, _) = service_over(InMemorySessionStore::new(), one_shot_config()).await;
    service.initialize().await.unwrap();

    assert_eq!(service.detector().state(), DetectorState::Baselined);
    let session = common::slow_session("fresh");
    let analysis = service.analyze_session(&session, true).await.unwrap();
    assert!(analysis.anomalies.is_empty());
    assert!(analysis.anomaly_prediction.is_none());

    let status = service.get_status().await;
    assert!(status.initialized);
    assert!(!status.health.anomaly_detector);
    assert_eq!(status.sessions_analyzed, 0);

    service.shutdown().await;
}

#[tokio::test]
async fn test_enumeration_failure_is_fatal() {
    let store = common::populated_store(12).await;
    store.fail_enumeration(true).await;
    let (service, _) = service_over(store, one_shot_config()).await;

    assert!(matches!(service.initialize().await, Err(AnalyticsError::Store(_))));
    assert!(!service.is_initialized());
    assert!(!service.get_status().await.health.store);
}

#[tokio::test]
async fn test_per_session_failures_are_skipped() {
    let store = common::populated_store(12).await;
    store.fail_session("session-03").await;
    let (service, _) = service_over(store, one_shot_config()).await;

    service.initialize().await.unwrap();
    let status = service.get_status().await;
    assert_eq!(status.sessions_analyzed, 12);
    assert!(status.telemetry.load_failures >= 1);
    assert!(status.health.store);

    service.shutdown().await;
}

#[tokio::test]
async fn test_slow_session_raises_critical_performance_anomaly() {
    let (service, _) = service_over(common::populated_store(12).await, one_shot_config()).await;
    service.initialize().await.unwrap();

    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    service.subscribe(move |event| {
        if let AnalyticsEvent::AnomalyDetected(anomaly) = event {
            if anomaly.anomaly_type == AnomalyType::Performance {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    });

    let session = common::slow_session("slow-1");
    let analysis = service.analyze_session(&session, true).await.unwrap();

    let performance = analysis
        .anomalies
        .iter()
        .find(|a| a.anomaly_type == AnomalyType::Performance)
        .expect("performance anomaly");
    assert_eq!(performance.severity, Severity::Critical);
    assert_eq!(performance.session_id.as_deref(), Some("slow-1"));
    assert_eq!(received.load(Ordering::SeqCst), 1);

    let found = service.get_anomalies(&AnomalyFilter {
        session_id: Some("slow-1".to_string()),
        ..Default::default()
    });
    assert!(!found.is_empty());

    service.shutdown().await;
}

#[tokio::test]
async fn test_failing_subscriber_does_not_block_others() {
    let (service, _) = service_over(common::populated_store(12).await, one_shot_config()).await;
    service.initialize().await.unwrap();

    let delivered = Arc::new(AtomicUsize::new(0));
    service.subscribe(|_| Err(anyhow::anyhow!("subscriber offline")));
    let counter = Arc::clone(&delivered);
    service.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    service
        .analyze_session(&common::slow_session("slow-2"), false)
        .await
        .unwrap();

    assert!(delivered.load(Ordering::SeqCst) >= 1);
    let stats = service.telemetry().stats();
    assert!(stats.subscriber_failures >= 1);

    service.shutdown().await;
}

#[tokio::test]
async fn test_session_analysis_leaves_snapshot_untouched() {
    let (service, _) = service_over(common::populated_store(12).await, one_shot_config()).await;
    service.initialize().await.unwrap();

    let before = service.snapshot();
    service
        .analyze_session(&common::slow_session("slow-3"), true)
        .await
        .unwrap();
    let after = service.snapshot();
    assert!(Arc::ptr_eq(&before, &after));

    service.shutdown().await;
}

#[tokio::test]
async fn test_stored_session_lookup() {
    let (service, _) = service_over(common::populated_store(12).await, one_shot_config()).await;
    service.initialize().await.unwrap();

    let analysis = service.analyze_stored_session("session-04", false).await.unwrap();
    assert_eq!(analysis.session_id, "session-04");
    assert!(analysis.recommendations.is_empty());

    assert!(matches!(
        service.analyze_stored_session("missing", false).await,
        Err(AnalyticsError::SessionNotFound(_))
    ));

    service.shutdown().await;
}

#[tokio::test]
async fn test_full_analysis_picks_up_new_sessions() {
    let (service, store) = service_over(common::populated_store(12).await, one_shot_config()).await;
    service.initialize().await.unwrap();

    let (session, metrics, comms) = common::recorded_session(20);
    store.insert(session, metrics, comms).await;

    let completed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&completed);
    service.subscribe(move |event| {
        if matches!(event, AnalyticsEvent::AnalysisCompleted(_)) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    });

    assert!(service.run_full_analysis().await.unwrap());
    assert_eq!(service.snapshot().sessions_analyzed, 13);
    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert!(service.retrain_models().await.unwrap() <= 3);

    service.shutdown().await;
}

#[tokio::test]
async fn test_status_is_stable_between_analyses() {
    let (service, _) = service_over(common::populated_store(12).await, one_shot_config()).await;
    service.initialize().await.unwrap();

    let first = service.get_status().await;
    let second = service.get_status().await;
    assert_eq!(first, second);

    service.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_clears_state_and_is_idempotent() {
    let config = AnalyticsConfig {
        enable_real_time_analysis: true,
        ..one_shot_config()
    };
    let (service, _) = service_over(common::populated_store(12).await, config).await;
    service.initialize().await.unwrap();
    service.subscribe(|_| Ok(()));
    assert!(service.get_status().await.health.scheduler);

    service.shutdown().await;
    service.shutdown().await;

    let status = service.get_status().await;
    assert!(!status.initialized);
    assert!(!status.health.scheduler);
    assert_eq!(status.subscribers, 0);
    assert_eq!(status.anomalies, 0);
    assert_eq!(status.prediction_models, 0);
    assert!(service.snapshot().last_update.is_none());
    assert!(service.get_insights(&InsightFilter::default()).is_empty());

    // Uninitialized services answer with empty analyses
    let analysis = service
        .analyze_session(&common::slow_session("late"), true)
        .await
        .unwrap();
    assert!(analysis.anomalies.is_empty());
}

#[tokio::test]
async fn test_initialize_twice_is_noop() {
    let (service, _) = service_over(common::populated_store(12).await, one_shot_config()).await;
    service.initialize().await.unwrap();
    service.initialize().await.unwrap();
    assert_eq!(service.telemetry().stats().analyses_completed, 1);
    service.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_discards_in_flight_analysis() {
    let store = StallingStore::over(12).await;
    let dyn_store: Arc<dyn SessionStore> = store.clone();
    let service = Arc::new(AnalyticsService::new(one_shot_config(), dyn_store));
    service.initialize().await.unwrap();

    store.stall.store(true, Ordering::SeqCst);
    let runner = Arc::clone(&service);
    let pending = tokio::spawn(async move { runner.run_full_analysis().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    service.shutdown().await;
    let installed = pending.await.unwrap().unwrap();

    assert!(!installed);
    assert!(!service.is_initialized());
    assert_eq!(service.detector().state(), DetectorState::Uninitialized);
    assert!(service.detector().baseline().is_none());
    assert!(service.snapshot().last_update.is_none());
    assert_eq!(service.snapshot().sessions_analyzed, 0);
    assert_eq!(service.get_status().await.prediction_models, 0);
}

#[tokio::test]
async fn test_overlapping_full_analysis_is_skipped() {
    let store = StallingStore::over(12).await;
    let dyn_store: Arc<dyn SessionStore> = store.clone();
    let service = AnalyticsService::new(one_shot_config(), dyn_store);
    service.initialize().await.unwrap();

    store.stall.store(true, Ordering::SeqCst);
    let (first, second) = tokio::join!(service.run_full_analysis(), service.run_full_analysis());
    let ran = [first.unwrap(), second.unwrap()];

    assert_eq!(ran.iter().filter(|installed| **installed).count(), 1);
    let stats = service.get_status().await.telemetry;
    assert_eq!(stats.analyses_skipped, 1);
    assert_eq!(stats.analyses_completed, 2);

    service.shutdown().await;
}
