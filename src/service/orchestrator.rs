//! Analytics service orchestrator
//!
//! Lifecycle: `initialize` loads the corpus, trains the prediction models
//! and the anomaly baseline in parallel, runs one full analysis and starts
//! the background loops. Full analyses are single-flight; a run that fires
//! while another is in progress is skipped. `shutdown` is idempotent.

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::anomaly::{AnomalyDetector, AnomalyPattern, DetectorState};
use crate::config::AnalyticsConfig;
use crate::errors::{AnalyticsError, Result};
use crate::events::{AnalysisCompleted, AnalyticsEvent, SubscriberRegistry, SubscriptionId};
use crate::insights::{anomaly_insights, rank_insights, Insight, InsightReport, InsightsEngine};
use crate::prediction::models::EARLY_FEATURE_WINDOW;
use crate::prediction::{
    analyze_resource_trends, daily_buckets, forecast_load, forecast_resources, predict_outcome,
    CapacityPlan, ModelState, PredictionModel, PredictiveModels, ResourceForecast, TrendAnalysis,
};
use crate::recommendations::{
    build_strategies, generate_recommendations, Recommendation, RecommendationInput, Strategy,
};
use crate::service::filters::{AnomalyFilter, InsightFilter, RecommendationFilter};
use crate::service::snapshot::{AnalyticsSnapshot, ComponentHealth, ServiceStatus, SessionAnalysis};
use crate::store::SessionStore;
use crate::telemetry::{AnalyticsTelemetry, TelemetryEvent};
use crate::types::{AgentCommunication, PerformanceMetric, Session};

/// Sessions whose metrics and communications load at once
const LOAD_CONCURRENCY: usize = 16;

/// Everything loaded from the store for one analysis
#[derive(Debug, Default)]
struct Corpus {
    sessions: Vec<Session>,
    metrics: Vec<PerformanceMetric>,
    communications: Vec<AgentCommunication>,
}

struct ServiceInner {
    config: AnalyticsConfig,
    store: Arc<dyn SessionStore>,
    detector: AnomalyDetector,
    insights: InsightsEngine,
    models: tokio::sync::RwLock<PredictiveModels>,
    snapshot: RwLock<Arc<AnalyticsSnapshot>>,
    /// Held for the duration of a full analysis
    analysis_lock: tokio::sync::Mutex<()>,
    initialized: AtomicBool,
    store_healthy: AtomicBool,
    events: Arc<SubscriberRegistry<AnalyticsEvent>>,
    detector_subscription: Mutex<Option<SubscriptionId>>,
    telemetry: AnalyticsTelemetry,
}

/// The analytics service
pub struct AnalyticsService {
    inner: Arc<ServiceInner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AnalyticsService {
    pub fn new(config: AnalyticsConfig, store: Arc<dyn SessionStore>) -> Self {
        let inner = ServiceInner {
            detector: AnomalyDetector::new(config.detector_config()),
            insights: InsightsEngine::new(config.cluster_seed),
            models: tokio::sync::RwLock::new(PredictiveModels::new()),
            snapshot: RwLock::new(Arc::new(AnalyticsSnapshot::default())),
            analysis_lock: tokio::sync::Mutex::new(()),
            initialized: AtomicBool::new(false),
            store_healthy: AtomicBool::new(false),
            events: Arc::new(SubscriberRegistry::new()),
            detector_subscription: Mutex::new(None),
            telemetry: AnalyticsTelemetry::new(),
            config,
            store,
        };
        Self {
            inner: Arc::new(inner),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.inner.config
    }

    pub fn telemetry(&self) -> &AnalyticsTelemetry {
        &self.inner.telemetry
    }

    pub fn detector(&self) -> &AnomalyDetector {
        &self.inner.detector
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// Load history, train, analyze once and start the background loops
    ///
    /// Fails only when the store cannot enumerate sessions. Calling it on an
    /// initialized service is a no-op.
    pub async fn initialize(&self) -> Result<()> {
        let inner = &self.inner;
        let _guard = inner.analysis_lock.lock().await;
        if self.is_initialized() {
            debug!("analytics service already initialized");
            return Ok(());
        }

        let started = Instant::now();
        let corpus = Arc::new(inner.load_corpus().await?);

        let train = {
            let corpus = Arc::clone(&corpus);
            tokio::task::spawn_blocking(move || {
                let mut models = PredictiveModels::new();
                models.train(&corpus.sessions, &corpus.metrics);
                models
            })
        };
        let baseline = {
            let inner = Arc::clone(inner);
            let corpus = Arc::clone(&corpus);
            tokio::task::spawn_blocking(move || {
                inner
                    .detector
                    .initialize(&corpus.sessions, &corpus.metrics, &corpus.communications)
            })
        };
        let (models, detector_state) = tokio::try_join!(train, baseline)?;

        let trained = models.len();
        *inner.models.write().await = models;
        inner.telemetry.record(TelemetryEvent::ModelsRetrained {
            models: trained,
            timestamp: Instant::now(),
        });

        self.subscribe_to_detector();
        inner.initialized.store(true, Ordering::SeqCst);
        inner.analyze(corpus).await?;

        if inner.config.enable_real_time_analysis {
            self.spawn_background_loops();
        }

        info!(
            detector = ?detector_state,
            models = trained,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analytics service initialized"
        );
        Ok(())
    }

    /// Run a full analysis now
    ///
    /// Returns `false` when skipped: before initialization or while another
    /// full analysis is in flight.
    pub async fn run_full_analysis(&self) -> Result<bool> {
        self.inner.run_full_analysis().await
    }

    /// Retrain the prediction models from the current store contents
    pub async fn retrain_models(&self) -> Result<usize> {
        self.inner.retrain_models().await
    }

    /// Incremental analysis of one session; never touches the cached snapshot
    pub async fn analyze_session(
        &self,
        session: &Session,
        include_recommendations: bool,
    ) -> Result<SessionAnalysis> {
        let inner = &self.inner;
        if !self.is_initialized() {
            return Ok(SessionAnalysis::empty(session.id.clone()));
        }

        let metrics = inner.session_metrics(&session.id).await;
        let communications = inner.session_communications(&session.id).await;

        let anomalies = inner
            .detector
            .detect_session_anomalies(session, &metrics, &communications);
        let early = session.early_messages(EARLY_FEATURE_WINDOW);
        let anomaly_prediction = inner.detector.predict_anomalies(session, early);
        let outcome = predict_outcome(&*inner.models.read().await, session, early);

        let snapshot = self.snapshot();
        let insights = inner
            .insights
            .session_insights(session, &metrics, Some(&snapshot.collaboration));

        let recommendations = if include_recommendations {
            let patterns: Vec<AnomalyPattern> = inner
                .detector
                .recurring_patterns()
                .into_iter()
                .filter(|p| p.affected_sessions.contains(&session.id))
                .collect();
            let report = InsightReport {
                insights: insights.clone(),
                ..Default::default()
            };
            generate_recommendations(&RecommendationInput {
                report: &report,
                anomaly_patterns: &patterns,
                sessions: std::slice::from_ref(session),
                metrics: &metrics,
            })
        } else {
            Vec::new()
        };

        inner.telemetry.record(TelemetryEvent::SessionAnalyzed {
            session_id: session.id.clone(),
            anomalies: anomalies.len(),
            timestamp: Instant::now(),
        });
        debug!(session = %session.id, anomalies = anomalies.len(), "session analyzed");

        Ok(SessionAnalysis {
            session_id: session.id.clone(),
            anomalies,
            anomaly_prediction,
            outcome,
            insights,
            recommendations,
            analyzed_at: Utc::now(),
        })
    }

    /// Look a session up in the store and analyze it
    pub async fn analyze_stored_session(
        &self,
        session_id: &str,
        include_recommendations: bool,
    ) -> Result<SessionAnalysis> {
        let session = self
            .inner
            .store
            .get_all_sessions()
            .await?
            .into_iter()
            .find(|s| s.id == session_id)
            .ok_or_else(|| AnalyticsError::SessionNotFound(session_id.to_string()))?;
        self.analyze_session(&session, include_recommendations).await
    }

    /// Current snapshot; readers always see a complete analysis
    pub fn snapshot(&self) -> Arc<AnalyticsSnapshot> {
        self.inner.snapshot()
    }

    pub fn get_insights(&self, filter: &InsightFilter) -> Vec<Insight> {
        filter.apply(&self.snapshot().insights)
    }

    pub fn get_recommendations(&self, filter: &RecommendationFilter) -> Vec<Recommendation> {
        filter.apply(&self.snapshot().recommendations)
    }

    pub fn get_optimization_strategies(&self) -> Vec<Strategy> {
        self.snapshot().strategies.clone()
    }

    pub fn get_resource_optimization(&self) -> Option<CapacityPlan> {
        self.snapshot().resource_optimization.clone()
    }

    /// Forecast for `days` ahead, recomputed from cached daily usage when
    /// the horizon differs from the configured one
    pub fn get_resource_forecast(&self, days: Option<usize>) -> Option<ResourceForecast> {
        let snapshot = self.snapshot();
        let cached = snapshot.resource_forecast.as_ref()?;
        match days {
            Some(days) if days != cached.days => {
                Some(forecast_resources(&snapshot.daily_buckets, days))
            }
            _ => Some(cached.clone()),
        }
    }

    pub fn get_trends(&self) -> Vec<TrendAnalysis> {
        self.snapshot().trends.clone()
    }

    /// Anomaly history, newest first
    pub fn get_anomalies(&self, filter: &AnomalyFilter) -> Vec<crate::anomaly::Anomaly> {
        let mut anomalies = self.inner.detector.anomalies();
        anomalies.reverse();
        filter.apply(&anomalies)
    }

    pub fn get_anomaly_patterns(&self) -> Vec<AnomalyPattern> {
        self.inner.detector.patterns()
    }

    pub fn get_anomaly_insights(&self) -> Vec<Insight> {
        self.snapshot().anomaly_insights.clone()
    }

    pub async fn get_prediction_models(&self) -> Vec<PredictionModel> {
        self.inner.models.read().await.models()
    }

    pub async fn get_status(&self) -> ServiceStatus {
        let inner = &self.inner;
        let snapshot = self.snapshot();
        let models = inner.models.read().await;
        let scheduler = {
            let tasks = self.tasks_lock();
            !tasks.is_empty() && tasks.iter().all(|t| !t.is_finished())
        };

        ServiceStatus {
            initialized: self.is_initialized(),
            sessions_analyzed: snapshot.sessions_analyzed,
            insights: snapshot.insights.len(),
            recommendations: snapshot.recommendations.len(),
            anomalies: inner.detector.anomaly_count(),
            anomaly_patterns: inner.detector.patterns().len(),
            prediction_models: models.len(),
            subscribers: inner.events.len(),
            last_analysis: snapshot.last_update,
            health: ComponentHealth {
                store: inner.store_healthy.load(Ordering::SeqCst),
                anomaly_detector: inner.detector.state() == DetectorState::Active,
                insights_engine: snapshot.last_update.is_some(),
                predictive_models: models.state() == ModelState::Trained,
                scheduler,
            },
            telemetry: inner.telemetry.stats(),
        }
    }

    /// Register for anomaly and analysis-completed notifications
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&AnalyticsEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.events.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Cancel background work and clear every cache and subscriber
    ///
    /// Waits for an in-flight full analysis to finish; its result is
    /// discarded.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        let mut was_initialized = inner.initialized.swap(false, Ordering::SeqCst);
        let mut cancelled = self.abort_tasks();

        let _guard = inner.analysis_lock.lock().await;
        // An initialize that held the lock may have re-armed the service
        was_initialized |= inner.initialized.swap(false, Ordering::SeqCst);
        cancelled += self.abort_tasks();

        if let Some(id) = inner
            .detector_subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            inner.detector.unsubscribe(id);
        }
        inner.detector.reset();
        inner.insights.clear_cache();
        inner.models.write().await.clear_models();
        inner.replace_snapshot(AnalyticsSnapshot::default());
        inner.events.clear();

        if was_initialized {
            info!(cancelled_tasks = cancelled, "analytics service shut down");
        }
    }

    fn abort_tasks(&self) -> usize {
        let handles: Vec<JoinHandle<()>> = self.tasks_lock().drain(..).collect();
        for handle in &handles {
            handle.abort();
        }
        handles.len()
    }

    fn subscribe_to_detector(&self) {
        let events = Arc::clone(&self.inner.events);
        let telemetry = self.inner.telemetry.clone();
        let id = self.inner.detector.subscribe(move |anomaly| {
            let report = events.publish(&AnalyticsEvent::AnomalyDetected(anomaly.clone()));
            telemetry.record(TelemetryEvent::AnomalyPublished {
                delivered: report.delivered,
                failed: report.failed,
                timestamp: Instant::now(),
            });
            Ok(())
        });
        *self
            .inner
            .detector_subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(id);
    }

    fn spawn_background_loops(&self) {
        let config = &self.inner.config;

        let analysis = spawn_periodic(
            Arc::downgrade(&self.inner),
            config.insight_interval(),
            |inner| async move {
                if let Err(e) = inner.run_full_analysis().await {
                    warn!(error = %e, "scheduled analysis failed");
                }
            },
        );
        let retrain = spawn_periodic(
            Arc::downgrade(&self.inner),
            config.retrain_interval(),
            |inner| async move {
                if let Err(e) = inner.retrain_models().await {
                    warn!(error = %e, "scheduled retraining failed");
                }
            },
        );

        let mut tasks = self.tasks_lock();
        tasks.push(analysis);
        tasks.push(retrain);
        debug!(
            analysis_interval_ms = config.insight_generation_interval_ms,
            retrain_interval_ms = config.prediction_retrain_interval_ms,
            "background loops started"
        );
    }

    fn tasks_lock(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for AnalyticsService {
    fn drop(&mut self) {
        for handle in self.tasks_lock().drain(..) {
            handle.abort();
        }
    }
}

/// Run `job` every `period`, starting one period from now
///
/// The loop holds only a weak reference and ends once the service is gone.
fn spawn_periodic<F, Fut>(
    inner: Weak<ServiceInner>,
    period: std::time::Duration,
    job: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<ServiceInner>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let period = period.max(std::time::Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else { break };
            job(inner).await;
        }
    })
}

impl ServiceInner {
    fn snapshot(&self) -> Arc<AnalyticsSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn replace_snapshot(&self, snapshot: AnalyticsSnapshot) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }

    /// Enumerate sessions (fatal on failure) and load their metrics and
    /// communications (per-session failures logged and skipped)
    async fn load_corpus(&self) -> Result<Corpus> {
        let sessions = match self.store.get_all_sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                self.store_healthy.store(false, Ordering::SeqCst);
                return Err(match e {
                    AnalyticsError::Store(_) => e,
                    other => AnalyticsError::Store(other.to_string()),
                });
            }
        };
        self.store_healthy.store(true, Ordering::SeqCst);

        let ids: Vec<String> = sessions.iter().map(|s| s.id.clone()).collect();
        let loaded: Vec<(Vec<PerformanceMetric>, Vec<AgentCommunication>)> = stream::iter(ids)
            .map(|id| async move {
                tokio::join!(self.session_metrics(&id), self.session_communications(&id))
            })
            .buffered(LOAD_CONCURRENCY)
            .collect()
            .await;

        let mut corpus = Corpus::default();
        for (metrics, communications) in loaded {
            corpus.metrics.extend(metrics);
            corpus.communications.extend(communications);
        }
        corpus.sessions = sessions;
        debug!(
            sessions = corpus.sessions.len(),
            metrics = corpus.metrics.len(),
            communications = corpus.communications.len(),
            "corpus loaded"
        );
        Ok(corpus)
    }

    async fn session_metrics(&self, session_id: &str) -> Vec<PerformanceMetric> {
        match self.store.get_session_metrics(session_id).await {
            Ok(metrics) => metrics,
            Err(e) => {
                self.record_load_failure(session_id, "metrics", &e);
                Vec::new()
            }
        }
    }

    async fn session_communications(&self, session_id: &str) -> Vec<AgentCommunication> {
        match self.store.get_session_communications(session_id).await {
            Ok(communications) => communications,
            Err(e) => {
                self.record_load_failure(session_id, "communications", &e);
                Vec::new()
            }
        }
    }

    fn record_load_failure(&self, session_id: &str, what: &str, error: &AnalyticsError) {
        warn!(session = %session_id, what, error = %error, "failed to load session data; skipping");
        self.telemetry.record(TelemetryEvent::LoadFailed {
            session_id: session_id.to_string(),
            timestamp: Instant::now(),
        });
    }

    async fn run_full_analysis(self: &Arc<Self>) -> Result<bool> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let Ok(_guard) = self.analysis_lock.try_lock() else {
            info!("full analysis already in progress; skipping");
            self.telemetry.record(TelemetryEvent::AnalysisSkipped {
                timestamp: Instant::now(),
            });
            return Ok(false);
        };

        let corpus = Arc::new(self.load_corpus().await?);
        self.analyze(corpus).await
    }

    async fn retrain_models(self: &Arc<Self>) -> Result<usize> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Ok(0);
        }
        let corpus = self.load_corpus().await?;
        let models = tokio::task::spawn_blocking(move || {
            let mut models = PredictiveModels::new();
            models.train(&corpus.sessions, &corpus.metrics);
            models
        })
        .await?;

        let trained = models.len();
        {
            let mut installed = self.models.write().await;
            if !self.initialized.load(Ordering::SeqCst) {
                debug!("service shut down during retraining; discarding models");
                return Ok(0);
            }
            *installed = models;
        }
        self.telemetry.record(TelemetryEvent::ModelsRetrained {
            models: trained,
            timestamp: Instant::now(),
        });
        Ok(trained)
    }

    /// Compute a full snapshot off the async runtime and swap it in
    ///
    /// Returns `false` when the service was shut down while computing; the
    /// baseline and snapshot are then dropped.
    async fn analyze(self: &Arc<Self>, corpus: Arc<Corpus>) -> Result<bool> {
        let started = Instant::now();
        let inner = Arc::clone(self);
        let (baseline, snapshot) = tokio::task::spawn_blocking(move || {
            let baseline = inner.detector.compute_baseline(
                &corpus.sessions,
                &corpus.metrics,
                &corpus.communications,
            );
            (baseline, inner.compute_snapshot(&corpus))
        })
        .await?;

        if !self.initialized.load(Ordering::SeqCst) {
            debug!("service shut down during analysis; discarding results");
            return Ok(false);
        }

        let completed = AnalysisCompleted {
            completed_at: snapshot.last_update.unwrap_or_else(Utc::now),
            duration_ms: started.elapsed().as_millis() as u64,
            sessions_analyzed: snapshot.sessions_analyzed,
            insights: snapshot.insights.len(),
            recommendations: snapshot.recommendations.len(),
            anomalies: snapshot.anomalies.len(),
        };
        self.detector.set_baseline(baseline);
        self.replace_snapshot(snapshot);

        self.telemetry.record(TelemetryEvent::AnalysisCompleted {
            duration_ms: completed.duration_ms,
            sessions: completed.sessions_analyzed,
            timestamp: Instant::now(),
        });
        info!(
            sessions = completed.sessions_analyzed,
            insights = completed.insights,
            recommendations = completed.recommendations,
            duration_ms = completed.duration_ms,
            "full analysis completed"
        );
        self.events.publish(&AnalyticsEvent::AnalysisCompleted(completed));
        Ok(true)
    }

    fn compute_snapshot(&self, corpus: &Corpus) -> AnalyticsSnapshot {
        let Corpus { sessions, metrics, .. } = corpus;

        let mut report = self.insights.generate_insights(sessions, metrics);

        let anomalies = self.detector.anomalies();
        let anomaly_patterns = self.detector.patterns();
        let anomaly_insights = anomaly_insights(&anomalies, &anomaly_patterns);
        report.insights.extend(anomaly_insights.iter().cloned());
        rank_insights(&mut report.insights);

        let recommendations = generate_recommendations(&RecommendationInput {
            report: &report,
            anomaly_patterns: &anomaly_patterns,
            sessions,
            metrics,
        });
        let strategies = build_strategies(&recommendations);

        let buckets = daily_buckets(sessions, metrics);
        let resource_forecast = forecast_resources(&buckets, self.config.forecast_days);
        let trends = analyze_resource_trends(&buckets);
        let capacity = forecast_load(sessions, metrics, self.config.load_forecast_hours, Utc::now());

        AnalyticsSnapshot {
            insights: report.insights,
            recommendations,
            strategies,
            resource_optimization: Some(capacity),
            resource_forecast: Some(resource_forecast),
            trends,
            anomalies,
            anomaly_patterns,
            anomaly_insights,
            clusters: report.clusters,
            collaboration: report.patterns,
            daily_buckets: buckets,
            sessions_analyzed: sessions.len(),
            last_update: Some(Utc::now()),
        }
    }
}
