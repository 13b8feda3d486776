//! Anomaly detector
//!
//! Lifecycle: Uninitialized -> Baselined -> Active. While active, every call
//! to `detect_session_anomalies` runs six independent detector families
//! (performance, cost, behavior, errors, communication, known patterns),
//! each contributing at most one anomaly. Detected anomalies are stored in a
//! bounded history, merged into the pattern table and, when they pass the
//! severity gate, pushed to subscribers in detection order.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info};

use crate::anomaly::patterns::{
    characteristic_features, PatternTable, DEFAULT_MATCH_RATIO, DEFAULT_MATCH_TOLERANCE,
};
use crate::anomaly::prediction::AnomalyPredictor;
use crate::anomaly::types::{
    Anomaly, AnomalyMetrics, AnomalyPattern, AnomalyPrediction, AnomalyType, DetectorState,
    Sensitivity, SensitivityThresholds, Severity,
};
use crate::baseline::{BaselineCalculator, BaselineMetrics, MetricStats};
use crate::events::{SubscriberRegistry, SubscriptionId};
use crate::stats;
use crate::types::metrics::{
    communications_by_session, coordination_score, handoff_latencies, metrics_by_session,
};
use crate::types::{AgentCommunication, AgentRole, Message, PerformanceMetric, Session};

/// Detector configuration
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub sensitivity: Sensitivity,
    pub thresholds: SensitivityThresholds,
    /// Push medium-severity anomalies to subscribers
    pub report_medium: bool,
    /// Bounded anomaly history size
    pub max_history: usize,
    /// Error-message share that flags a session (strictly above)
    pub error_rate_threshold: f64,
    /// Unique error-text share below which errors count as recurring
    pub error_uniqueness_threshold: f64,
    /// Similarity at which two error texts are near-duplicates
    pub error_similarity: f64,
    pub pattern_match_ratio: f64,
    pub pattern_tolerance: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sensitivity: Sensitivity::High,
            thresholds: SensitivityThresholds::default(),
            report_medium: false,
            max_history: 1000,
            error_rate_threshold: 0.10,
            error_uniqueness_threshold: 0.70,
            error_similarity: 0.8,
            pattern_match_ratio: DEFAULT_MATCH_RATIO,
            pattern_tolerance: DEFAULT_MATCH_TOLERANCE,
        }
    }
}

impl DetectorConfig {
    /// Z-score threshold for the configured sensitivity
    pub fn z_threshold(&self) -> f64 {
        self.thresholds.for_level(self.sensitivity)
    }

    /// Relative-deviation threshold for ratio-based checks
    pub fn ratio_threshold(&self) -> f64 {
        match self.sensitivity {
            Sensitivity::Low => 0.75,
            Sensitivity::Medium => 0.5,
            Sensitivity::High => 0.3,
        }
    }

    /// Severity gate for pushing to subscribers
    pub fn is_reportable(&self, severity: Severity) -> bool {
        match severity {
            Severity::Critical | Severity::High => true,
            Severity::Medium => self.report_medium,
            Severity::Low => false,
        }
    }
}

/// Inputs shared by the detector families for one session
struct SessionContext<'a> {
    session: &'a Session,
    metrics: &'a [PerformanceMetric],
    communications: &'a [AgentCommunication],
    baseline: &'a BaselineMetrics,
    features: BTreeMap<String, f64>,
}

/// How a detection pass was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    /// Fresh session: stamp with the current time and notify subscribers
    Live,
    /// Historical session: stamp with when the session happened, stay silent
    Replay,
}

/// Multi-dimensional anomaly detector
pub struct AnomalyDetector {
    config: DetectorConfig,
    calculator: BaselineCalculator,
    predictor: AnomalyPredictor,
    state: RwLock<DetectorState>,
    baseline: RwLock<Option<Arc<BaselineMetrics>>>,
    history: Mutex<VecDeque<Anomaly>>,
    patterns: Mutex<PatternTable>,
    subscribers: SubscriberRegistry<Anomaly>,
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            calculator: BaselineCalculator::new(),
            predictor: AnomalyPredictor::new(),
            state: RwLock::new(DetectorState::Uninitialized),
            baseline: RwLock::new(None),
            history: Mutex::new(VecDeque::new()),
            patterns: Mutex::new(PatternTable::new()),
            subscribers: SubscriberRegistry::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DetectorConfig::default())
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn state(&self) -> DetectorState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current baseline snapshot, if one has been computed
    pub fn baseline(&self) -> Option<Arc<BaselineMetrics>> {
        self.baseline.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Compute the baseline and replay history once to seed the pattern table
    ///
    /// Below the minimum corpus size the detector stays `Baselined` and
    /// detection returns nothing.
    pub fn initialize(
        &self,
        sessions: &[Session],
        metrics: &[PerformanceMetric],
        communications: &[AgentCommunication],
    ) -> DetectorState {
        let baseline = self.calculator.calculate(sessions, metrics, communications);
        let meaningful = baseline.is_meaningful();
        self.install_baseline(baseline);
        self.set_state(DetectorState::Baselined);

        if !meaningful {
            info!(
                sessions = sessions.len(),
                "insufficient history for anomaly baseline; detection disabled"
            );
            return DetectorState::Baselined;
        }

        let metrics_by_session = metrics_by_session(metrics);
        let comms_by_session = communications_by_session(communications);
        let mut seeded = 0;
        for session in sessions {
            seeded += self
                .run_detection(
                    session,
                    metrics_by_session.get(&session.id),
                    comms_by_session.get(&session.id),
                    Pass::Replay,
                )
                .len();
        }

        self.set_state(DetectorState::Active);
        info!(
            sessions = sessions.len(),
            seeded_anomalies = seeded,
            patterns = self.patterns_lock().len(),
            "anomaly detector active"
        );
        DetectorState::Active
    }

    /// Compute a baseline over a corpus without installing it
    pub fn compute_baseline(
        &self,
        sessions: &[Session],
        metrics: &[PerformanceMetric],
        communications: &[AgentCommunication],
    ) -> BaselineMetrics {
        self.calculator.calculate(sessions, metrics, communications)
    }

    /// Install an externally computed baseline
    pub fn set_baseline(&self, baseline: BaselineMetrics) {
        let meaningful = baseline.is_meaningful();
        self.install_baseline(baseline);
        self.set_state(if meaningful {
            DetectorState::Active
        } else {
            DetectorState::Baselined
        });
    }

    /// Detect anomalies for one session
    ///
    /// Returns an empty list before initialization or when the baseline is
    /// not backed by enough history.
    pub fn detect_session_anomalies(
        &self,
        session: &Session,
        recent_metrics: &[PerformanceMetric],
        communications: &[AgentCommunication],
    ) -> Vec<Anomaly> {
        self.run_detection(session, recent_metrics, communications, Pass::Live)
    }

    /// Predict likely anomalies from the first messages of a session
    pub fn predict_anomalies(
        &self,
        session: &Session,
        early_messages: &[Message],
    ) -> Option<AnomalyPrediction> {
        let baseline = self.baseline()?;
        if !baseline.is_meaningful() {
            return None;
        }
        self.predictor.predict(session, early_messages, &baseline)
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Anomaly) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Anomaly history, oldest first
    pub fn anomalies(&self) -> Vec<Anomaly> {
        self.history_lock().iter().cloned().collect()
    }

    pub fn anomaly_count(&self) -> usize {
        self.history_lock().len()
    }

    pub fn patterns(&self) -> Vec<AnomalyPattern> {
        self.patterns_lock().all()
    }

    pub fn recurring_patterns(&self) -> Vec<AnomalyPattern> {
        self.patterns_lock().recurring()
    }

    /// Drop baseline, history, patterns and subscribers
    pub fn reset(&self) {
        *self.baseline.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.history_lock().clear();
        self.patterns_lock().clear();
        self.subscribers.clear();
        self.set_state(DetectorState::Uninitialized);
    }

    fn run_detection(
        &self,
        session: &Session,
        metrics: &[PerformanceMetric],
        communications: &[AgentCommunication],
        pass: Pass,
    ) -> Vec<Anomaly> {
        if self.state() == DetectorState::Uninitialized {
            return Vec::new();
        }
        let Some(baseline) = self.baseline() else {
            return Vec::new();
        };
        if !baseline.is_meaningful() {
            return Vec::new();
        }

        let ctx = SessionContext {
            session,
            metrics,
            communications,
            baseline: &baseline,
            features: characteristic_features(session, metrics),
        };

        let detected: Vec<Anomaly> = [
            self.detect_performance(&ctx),
            self.detect_cost(&ctx),
            self.detect_behavior(&ctx),
            self.detect_errors(&ctx),
            self.detect_communication(&ctx),
            self.detect_known_pattern(&ctx),
        ]
        .into_iter()
        .flatten()
        .map(|a| a.for_session(session.id.clone()).with_features(ctx.features.clone()))
        .map(|a| match pass {
            Pass::Live => a,
            Pass::Replay => a.observed_at(session.end_time.unwrap_or(session.start_time)),
        })
        .collect();

        for anomaly in &detected {
            self.store(anomaly);
            if pass == Pass::Live && self.config.is_reportable(anomaly.severity) {
                let report = self.subscribers.publish(anomaly);
                debug!(
                    anomaly = %anomaly.title,
                    delivered = report.delivered,
                    failed = report.failed,
                    "published anomaly"
                );
            }
        }

        detected
    }

    fn store(&self, anomaly: &Anomaly) {
        {
            let mut history = self.history_lock();
            history.push_back(anomaly.clone());
            while history.len() > self.config.max_history {
                history.pop_front();
            }
        }
        self.patterns_lock().record(anomaly);
    }

    fn detect_performance(&self, ctx: &SessionContext<'_>) -> Option<Anomaly> {
        let threshold = self.config.z_threshold();
        let mut candidates = Vec::new();

        if let Some(avg) = ctx.session.avg_response_time(ctx.metrics) {
            let stats = ctx.baseline.performance.response_time;
            let z = stats.z_score(avg);
            if let Some(severity) = Severity::from_deviation(z, threshold) {
                let slow = avg > stats.mean;
                let anomaly = if slow {
                    Anomaly::new(
                        AnomalyType::Performance,
                        severity,
                        "Slow response times",
                        format!(
                            "Average response time {:.0}ms versus baseline {:.0}ms (z={:.2})",
                            avg, stats.mean, z
                        ),
                        deviation_metrics(avg, stats.mean, z, threshold),
                    )
                    .with_causes(&[
                        "Model latency spike",
                        "Complex task requiring long reasoning chains",
                        "Tool execution bottleneck",
                    ])
                    .with_recommendations(&[
                        "Review slow tool invocations in this session",
                        "Split the task into smaller delegated steps",
                    ])
                    .with_auto_resolution(
                        "trim_context",
                        "Trim conversation context to lower per-turn latency",
                        false,
                    )
                } else {
                    Anomaly::new(
                        AnomalyType::Performance,
                        severity,
                        "Unusually fast responses",
                        format!(
                            "Average response time {:.0}ms is far below baseline {:.0}ms (z={:.2})",
                            avg, stats.mean, z
                        ),
                        deviation_metrics(avg, stats.mean, z, threshold),
                    )
                    .with_causes(&["Truncated or empty model output", "Cached or skipped work"])
                    .with_recommendations(&["Verify response completeness"])
                };
                candidates.push(anomaly.with_agent(slowest_agent(ctx.metrics)));
            }
        }

        if let Some(rate) = ctx.session.success_rate() {
            let stats = ctx.baseline.performance.success_rate;
            if rate < stats.mean {
                let z = stats.z_score(rate);
                if let Some(severity) = Severity::from_deviation(z, threshold) {
                    candidates.push(
                        Anomaly::new(
                            AnomalyType::Performance,
                            severity,
                            "Success rate below baseline",
                            format!(
                                "Success rate {:.0}% versus baseline {:.0}% (z={:.2})",
                                rate * 100.0,
                                stats.mean * 100.0,
                                z
                            ),
                            deviation_metrics(rate, stats.mean, z, threshold),
                        )
                        .with_causes(&[
                            "Ambiguous task description",
                            "Worker lacked required tools",
                            "Manager instructions diverged from the task",
                        ])
                        .with_recommendations(&[
                            "Clarify the initial task before delegation",
                            "Add verification steps between handoffs",
                        ]),
                    );
                }
            }
        }

        most_severe(candidates)
    }

    fn detect_cost(&self, ctx: &SessionContext<'_>) -> Option<Anomaly> {
        let mut candidates = Vec::new();

        let tokens = ctx.session.total_tokens(ctx.metrics) as f64;
        let per_message = ctx.baseline.cost.tokens_per_message.mean;
        let expected = per_message * ctx.session.message_count() as f64;
        if tokens > expected && expected > 0.0 {
            let threshold = self.config.ratio_threshold();
            let ratio = stats::ratio_deviation(tokens, expected);
            if let Some(severity) = Severity::from_deviation(ratio, threshold) {
                candidates.push(
                    Anomaly::new(
                        AnomalyType::Cost,
                        severity,
                        "Excessive token usage",
                        format!(
                            "{:.0} tokens used versus {:.0} expected for {} messages (+{:.0}%)",
                            tokens,
                            expected,
                            ctx.session.message_count(),
                            ratio * 100.0
                        ),
                        deviation_metrics(tokens, expected, ratio, threshold),
                    )
                    .with_causes(&[
                        "Large context re-sent on every turn",
                        "Verbose tool output fed back to the model",
                    ])
                    .with_recommendations(&[
                        "Summarize context between handoffs",
                        "Truncate tool output before returning it to the agent",
                    ])
                    .with_auto_resolution(
                        "compress_context",
                        "Enable context compression for this session",
                        true,
                    ),
                );
            }
        }

        let cost = ctx.session.total_cost(ctx.metrics);
        let stats = ctx.baseline.cost.session_cost;
        if cost > stats.mean {
            let threshold = self.config.z_threshold();
            let z = stats.z_score(cost);
            if let Some(severity) = Severity::from_deviation(z, threshold) {
                candidates.push(
                    Anomaly::new(
                        AnomalyType::Cost,
                        severity,
                        "Session cost above baseline",
                        format!("Session cost ${:.2} versus baseline ${:.2} (z={:.2})", cost, stats.mean, z),
                        deviation_metrics(cost, stats.mean, z, threshold),
                    )
                    .with_causes(&["Long-running session", "Expensive model selection"])
                    .with_recommendations(&["Set a per-session budget cap"]),
                );
            }
        }

        most_severe(candidates)
    }

    fn detect_behavior(&self, ctx: &SessionContext<'_>) -> Option<Anomaly> {
        let threshold = self.config.z_threshold();
        let behavior = &ctx.baseline.behavior;
        let finished = ctx.session.is_finished();
        let mut candidates = Vec::new();

        let count = ctx.session.message_count() as f64;
        candidates.extend(two_sided(
            count,
            behavior.messages_per_session,
            threshold,
            finished,
            (
                "Excessive message count",
                &["Task complexity higher than usual", "Agents stuck in a clarification loop"],
                &["Check for repeated instructions", "Cap the number of exchanges per task"],
            ),
            (
                "Unusually short session",
                &["Premature termination", "Task abandoned after an early failure"],
                &["Inspect the final messages for an unhandled error"],
            ),
        ));

        let switches = ctx.session.agent_switches() as f64;
        candidates.extend(two_sided(
            switches,
            behavior.agent_switches,
            threshold,
            finished,
            (
                "Excessive agent switching",
                &["Manager micro-managing the worker", "Instructions too granular"],
                &["Delegate larger units of work per handoff"],
            ),
            (
                "Insufficient agent collaboration",
                &["Worker operating without review", "Manager not engaged"],
                &["Add checkpoints where the manager reviews progress"],
            ),
        ));

        let tools = ctx.session.tool_call_count() as f64;
        candidates.extend(two_sided(
            tools,
            behavior.tool_calls,
            threshold,
            finished,
            (
                "Excessive tool usage",
                &["Repeated failing tool calls", "Inefficient exploration strategy"],
                &["Review the tool call sequence for retries", "Provide file locations up front"],
            ),
            (
                "Unusually low tool usage",
                &["Worker answering without verifying", "Tools unavailable"],
                &["Confirm tool availability for the worker"],
            ),
        ));

        most_severe(candidates)
    }

    fn detect_errors(&self, ctx: &SessionContext<'_>) -> Option<Anomaly> {
        let total = ctx.session.message_count();
        if total == 0 {
            return None;
        }

        let error_rate = ctx.session.error_count() as f64 / total as f64;
        let rate_triggered = error_rate > self.config.error_rate_threshold;
        let rate_severity = if error_rate >= 0.3 {
            Severity::Critical
        } else if error_rate >= 0.2 {
            Severity::High
        } else {
            Severity::Medium
        };

        let error_texts: Vec<&str> = ctx
            .session
            .messages
            .iter()
            .filter(|m| m.mentions_error())
            .map(|m| m.content.as_str())
            .collect();
        let uniqueness = unique_error_ratio(&error_texts, self.config.error_similarity);
        let recurring_triggered =
            error_texts.len() >= 3 && uniqueness < self.config.error_uniqueness_threshold;
        let recurring_severity = if uniqueness < 0.3 {
            Severity::High
        } else {
            Severity::Medium
        };

        let anomaly = match (rate_triggered, recurring_triggered) {
            (false, false) => return None,
            (true, false) => Anomaly::new(
                AnomalyType::Error,
                rate_severity,
                "Elevated error rate",
                format!(
                    "{:.0}% of messages are errors (threshold {:.0}%)",
                    error_rate * 100.0,
                    self.config.error_rate_threshold * 100.0
                ),
                deviation_metrics(
                    error_rate,
                    self.config.error_rate_threshold,
                    error_rate / self.config.error_rate_threshold,
                    1.0,
                ),
            )
            .with_causes(&["Unstable tool environment", "Invalid instructions from the manager"])
            .with_recommendations(&["Inspect the first error in the session", "Add input validation before tool calls"]),
            (false, true) => Anomaly::new(
                AnomalyType::Error,
                recurring_severity,
                "Recurring error pattern",
                format!(
                    "{} error reports with only {:.0}% distinct content",
                    error_texts.len(),
                    uniqueness * 100.0
                ),
                deviation_metrics(
                    uniqueness,
                    self.config.error_uniqueness_threshold,
                    1.0 - uniqueness,
                    1.0 - self.config.error_uniqueness_threshold,
                ),
            )
            .with_causes(&["Same failure retried without changing approach", "Persistent environment fault"])
            .with_recommendations(&["Stop retrying identical failing actions", "Escalate repeated failures to the manager"])
            .with_auto_resolution("break_retry_loop", "Interrupt the session after repeated identical errors", false),
            (true, true) => Anomaly::new(
                AnomalyType::Error,
                rate_severity.max(recurring_severity),
                "Elevated error rate with recurring errors",
                format!(
                    "{:.0}% of messages are errors and only {:.0}% of error reports are distinct",
                    error_rate * 100.0,
                    uniqueness * 100.0
                ),
                deviation_metrics(
                    error_rate,
                    self.config.error_rate_threshold,
                    error_rate / self.config.error_rate_threshold,
                    1.0,
                ),
            )
            .with_causes(&["Same failure retried without changing approach", "Unstable tool environment"])
            .with_recommendations(&["Stop retrying identical failing actions", "Inspect the first error in the session"]),
        };

        Some(anomaly.with_agent(most_erroring_agent(ctx.session)))
    }

    fn detect_communication(&self, ctx: &SessionContext<'_>) -> Option<Anomaly> {
        if ctx.communications.len() < 2 {
            return None;
        }
        let threshold = self.config.z_threshold();
        let comm = &ctx.baseline.communication;
        let mut candidates = Vec::new();

        let latencies = handoff_latencies(ctx.communications);
        if !latencies.is_empty() {
            let avg = stats::mean(&latencies);
            if avg > comm.handoff_time.mean {
                let z = comm.handoff_time.z_score(avg);
                if let Some(severity) = Severity::from_deviation(z, threshold) {
                    candidates.push(
                        Anomaly::new(
                            AnomalyType::Communication,
                            severity,
                            "Slow agent handoffs",
                            format!(
                                "Average handoff latency {:.0}ms versus baseline {:.0}ms (z={:.2})",
                                avg, comm.handoff_time.mean, z
                            ),
                            deviation_metrics(avg, comm.handoff_time.mean, z, threshold),
                        )
                        .with_causes(&["Message transport backlog", "Agent waiting on long tool runs before replying"])
                        .with_recommendations(&["Check broker queue depth", "Stream partial progress back to the manager"]),
                    );
                }
            }
        }

        if let Some(score) = coordination_score(ctx.communications) {
            if score < comm.coordination_score.mean {
                let z = comm.coordination_score.z_score(score);
                if let Some(severity) = Severity::from_deviation(z, threshold) {
                    candidates.push(
                        Anomaly::new(
                            AnomalyType::Communication,
                            severity,
                            "Low coordination quality",
                            format!(
                                "Coordination score {:.2} versus baseline {:.2} (z={:.2})",
                                score, comm.coordination_score.mean, z
                            ),
                            deviation_metrics(score, comm.coordination_score.mean, z, threshold),
                        )
                        .with_causes(&["Handoffs skipped or duplicated", "Agents talking past each other"])
                        .with_recommendations(&["Enforce strict turn-taking between agents"]),
                    );
                }
            }
        }

        most_severe(candidates)
    }

    fn detect_known_pattern(&self, ctx: &SessionContext<'_>) -> Option<Anomaly> {
        let hit = self.patterns_lock().find_match(
            &ctx.session.id,
            &ctx.features,
            self.config.pattern_match_ratio,
            self.config.pattern_tolerance,
        )?;

        let mut anomaly = Anomaly::new(
            AnomalyType::Pattern,
            hit.pattern.severity,
            "Known anomaly pattern recurrence",
            format!(
                "Session matches {:.0}% of the characteristics of known pattern '{}' ({} prior occurrences)",
                hit.ratio * 100.0,
                hit.pattern.title,
                hit.pattern.occurrences
            ),
            AnomalyMetrics {
                actual_value: hit.ratio,
                expected_value: self.config.pattern_match_ratio,
                deviation_score: hit.ratio,
                confidence_level: hit.ratio.min(0.99),
            },
        )
        .with_recommendations(&["Apply the remediation used for previous occurrences of this pattern"]);
        anomaly.context.possible_causes = vec![format!("Recurrence of '{}'", hit.pattern.title)];
        anomaly.context.related_pattern = Some(hit.pattern.id.clone());
        Some(anomaly)
    }

    fn install_baseline(&self, baseline: BaselineMetrics) {
        *self.baseline.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(baseline));
    }

    fn set_state(&self, state: DetectorState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn history_lock(&self) -> MutexGuard<'_, VecDeque<Anomaly>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn patterns_lock(&self) -> MutexGuard<'_, PatternTable> {
        self.patterns.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::with_defaults()
    }
}

type Explanation<'a> = (&'a str, &'a [&'a str], &'a [&'a str]);

/// Two-sided z-score test with direction-specific explanations
///
/// Deficiency is only reported for finished sessions, since running sessions
/// are naturally short.
fn two_sided(
    actual: f64,
    stats: MetricStats,
    threshold: f64,
    allow_deficiency: bool,
    excess: Explanation<'_>,
    deficiency: Explanation<'_>,
) -> Option<Anomaly> {
    let z = stats.z_score(actual);
    let severity = Severity::from_deviation(z, threshold)?;
    let above = actual > stats.mean;
    if !above && !allow_deficiency {
        return None;
    }
    let (title, causes, recommendations) = if above { excess } else { deficiency };
    Some(
        Anomaly::new(
            AnomalyType::Behavior,
            severity,
            title,
            format!("Observed {:.1} versus baseline {:.1} (z={:.2})", actual, stats.mean, z),
            deviation_metrics(actual, stats.mean, z, threshold),
        )
        .with_causes(causes)
        .with_recommendations(recommendations),
    )
}

fn deviation_metrics(actual: f64, expected: f64, score: f64, threshold: f64) -> AnomalyMetrics {
    AnomalyMetrics {
        actual_value: actual,
        expected_value: expected,
        deviation_score: score,
        confidence_level: detection_confidence(score, threshold),
    }
}

/// Confidence grows with the deviation, reaching 0.99 at three thresholds
fn detection_confidence(score: f64, threshold: f64) -> f64 {
    if threshold <= 0.0 {
        return 0.5;
    }
    (score / (threshold * 3.0)).clamp(0.5, 0.99)
}

fn most_severe(candidates: Vec<Anomaly>) -> Option<Anomaly> {
    candidates.into_iter().max_by(|a, b| {
        a.severity.cmp(&b.severity).then(
            a.metrics
                .deviation_score
                .partial_cmp(&b.metrics.deviation_score)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    })
}

fn slowest_agent(metrics: &[PerformanceMetric]) -> Option<AgentRole> {
    let mut per_role: HashMap<AgentRole, Vec<f64>> = HashMap::new();
    for metric in metrics {
        per_role.entry(metric.role).or_default().push(metric.response_time_ms);
    }
    per_role
        .into_iter()
        .map(|(role, samples)| (role, stats::mean(&samples)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(role, _)| role)
}

fn most_erroring_agent(session: &Session) -> Option<AgentRole> {
    let mut counts: BTreeMap<AgentRole, usize> = BTreeMap::new();
    for message in session.messages.iter().filter(|m| m.mentions_error()) {
        *counts.entry(message.role).or_default() += 1;
    }
    counts.into_iter().max_by_key(|(_, c)| *c).map(|(role, _)| role)
}

/// Share of distinct error reports after grouping near-duplicates
///
/// Texts are compared by token Dice similarity with digits masked, so
/// "timeout after 3012ms (attempt 1)" and "timeout after 2990ms (attempt 2)"
/// collapse into one group.
pub fn unique_error_ratio(texts: &[&str], similarity: f64) -> f64 {
    if texts.is_empty() {
        return 1.0;
    }
    let mut representatives: Vec<HashSet<String>> = Vec::new();
    for text in texts {
        let tokens = error_tokens(text);
        let duplicate = representatives
            .iter()
            .any(|rep| dice_similarity(rep, &tokens) >= similarity);
        if !duplicate {
            representatives.push(tokens);
        }
    }
    representatives.len() as f64 / texts.len() as f64
}

fn error_tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.chars().map(|c| if c.is_ascii_digit() { '#' } else { c }).collect())
        .collect()
}

fn dice_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(b).count();
    2.0 * shared as f64 / (a.len() + b.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::{
        BehaviorBaseline, CommunicationBaseline, CostBaseline, PerformanceBaseline,
    };
    use crate::types::{MessageKind, SessionStatus};
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn stats(mean: f64, std_dev: f64) -> MetricStats {
        MetricStats { mean, std_dev, samples: 20 }
    }

    fn baseline() -> BaselineMetrics {
        BaselineMetrics {
            performance: PerformanceBaseline {
                response_time: stats(2000.0, 200.0),
                success_rate: stats(0.9, 0.05),
            },
            cost: CostBaseline {
                session_cost: stats(1.0, 0.2),
                tokens_per_message: stats(100.0, 10.0),
            },
            behavior: BehaviorBaseline {
                messages_per_session: stats(10.0, 2.0),
                agent_switches: stats(5.0, 1.0),
                tool_calls: stats(4.0, 1.0),
            },
            communication: CommunicationBaseline {
                handoff_time: stats(1000.0, 100.0),
                coordination_score: stats(0.9, 0.05),
            },
            session_count: 20,
            computed_at: Utc::now(),
        }
    }

    /// A session that sits exactly on every baseline mean
    fn normal_session(id: &str) -> Session {
        let start = Utc::now() - Duration::minutes(30);
        let mut session = Session::new(id, "implement feature").starting_at(start);
        for i in 0..10 {
            let role = if i % 2 == 1 || i >= 6 { AgentRole::Worker } else { AgentRole::Manager };
            let kind = if i == 2 || i == 5 || i == 7 || i == 9 { MessageKind::ToolCall } else { MessageKind::Response };
            session.append_message(
                Message::new(id, role, kind, format!("step {}", i))
                    .at(start + Duration::seconds(i as i64 * 20))
                    .with_tokens(100),
            );
        }
        session
    }

    fn metrics_for(id: &str, response_ms: f64) -> Vec<PerformanceMetric> {
        (0..5)
            .map(|_| PerformanceMetric::new(id, AgentRole::Worker, response_ms))
            .collect()
    }

    fn active_detector() -> AnomalyDetector {
        let detector = AnomalyDetector::with_defaults();
        detector.set_baseline(baseline());
        detector
    }

    #[test]
    fn test_detect_before_initialize_is_empty() {
        let detector = AnomalyDetector::with_defaults();
        let session = normal_session("s1");
        assert_eq!(detector.state(), DetectorState::Uninitialized);
        assert!(detector
            .detect_session_anomalies(&session, &metrics_for("s1", 9000.0), &[])
            .is_empty());
    }

    #[test]
    fn test_normal_session_has_no_anomalies() {
        let detector = active_detector();
        let session = normal_session("s1");
        assert_eq!(session.agent_switches(), 5);
        assert_eq!(session.tool_call_count(), 4);
        let anomalies = detector.detect_session_anomalies(&session, &metrics_for("s1", 2000.0), &[]);
        assert!(anomalies.is_empty(), "unexpected: {:?}", anomalies);
    }

    #[test]
    fn test_response_time_critical_at_three_thresholds() {
        let detector = active_detector();
        let session = normal_session("s1");
        let anomalies = detector.detect_session_anomalies(&session, &metrics_for("s1", 2900.0), &[]);
        let perf = anomalies
            .iter()
            .find(|a| a.anomaly_type == AnomalyType::Performance)
            .expect("performance anomaly");
        assert_eq!(perf.severity, Severity::Critical);
        assert_eq!(perf.metrics.deviation_score, 4.5);
        assert_eq!(perf.session_id.as_deref(), Some("s1"));
        assert_eq!(perf.agent, Some(AgentRole::Worker));
    }

    #[test]
    fn test_response_time_severity_tiers() {
        let detector = active_detector();
        let session = normal_session("s1");
        // threshold 1.5: 2x = z 3.0 -> 2600ms, 1.5x = z 2.25 -> 2450ms, z 1.5 -> 2300ms
        let cases = [(2600.0, Some(Severity::High)), (2450.0, Some(Severity::Medium)), (2300.0, None)];
        for (response, expected) in cases {
            let found = detector
                .detect_session_anomalies(&session, &metrics_for("s1", response), &[])
                .into_iter()
                .find(|a| a.anomaly_type == AnomalyType::Performance)
                .map(|a| a.severity);
            assert_eq!(found, expected, "response {}", response);
        }
    }

    #[test]
    fn test_success_rate_is_one_sided() {
        let detector = active_detector();
        let mut high = normal_session("s1");
        high.finish(SessionStatus::Completed, Utc::now());
        high.backfill_summary(crate::types::SessionSummary {
            success_rate: 1.0,
            total_cost: 1.0,
            tools_used: vec![],
        });
        assert!(detector
            .detect_session_anomalies(&high, &metrics_for("s1", 2000.0), &[])
            .iter()
            .all(|a| a.title != "Success rate below baseline"));

        let mut low = normal_session("s2");
        low.finish(SessionStatus::Completed, Utc::now());
        low.backfill_summary(crate::types::SessionSummary {
            success_rate: 0.5,
            total_cost: 1.0,
            tools_used: vec![],
        });
        let anomalies = detector.detect_session_anomalies(&low, &metrics_for("s2", 2000.0), &[]);
        let perf = anomalies.iter().find(|a| a.anomaly_type == AnomalyType::Performance).unwrap();
        assert_eq!(perf.title, "Success rate below baseline");
        assert_eq!(perf.severity, Severity::Critical);
    }

    #[test]
    fn test_token_excess_flagged() {
        let detector = active_detector();
        let session = normal_session("s1");
        let metrics: Vec<PerformanceMetric> = metrics_for("s1", 2000.0)
            .into_iter()
            .map(|m| m.with_tokens(400))
            .collect();
        let anomalies = detector.detect_session_anomalies(&session, &metrics, &[]);
        let cost = anomalies.iter().find(|a| a.anomaly_type == AnomalyType::Cost).unwrap();
        // 2000 tokens vs 1000 expected: ratio 1.0 >= 3 x 0.3
        assert_eq!(cost.title, "Excessive token usage");
        assert_eq!(cost.severity, Severity::Critical);
        assert!(cost.auto_resolution.is_some());
    }

    #[test]
    fn test_error_rate_threshold_is_exclusive() {
        let detector = active_detector();
        let mut session = normal_session("s1");
        session.messages[3].kind = MessageKind::Error;
        session.messages[3].content = "Error: permission denied".to_string();
        // 1 of 10 = exactly 10%
        let anomalies = detector.detect_session_anomalies(&session, &metrics_for("s1", 2000.0), &[]);
        assert!(anomalies.iter().all(|a| a.anomaly_type != AnomalyType::Error));

        session.messages[4].kind = MessageKind::Error;
        let anomalies = detector.detect_session_anomalies(&session, &metrics_for("s1", 2000.0), &[]);
        let err = anomalies.iter().find(|a| a.anomaly_type == AnomalyType::Error).unwrap();
        assert_eq!(err.title, "Elevated error rate");
    }

    #[test]
    fn test_recurring_errors_fire_without_rate_trigger() {
        let detector = active_detector();
        let mut session = normal_session("s1");
        session.messages[3].kind = MessageKind::Error;
        for (n, idx) in [3usize, 0, 1, 4, 6].iter().enumerate() {
            session.messages[*idx].content =
                format!("Error: connection timeout after {}ms (attempt {})", 3000 + n * 17, n + 1);
        }
        assert_eq!(session.error_count(), 1);

        let anomalies = detector.detect_session_anomalies(&session, &metrics_for("s1", 2000.0), &[]);
        let err = anomalies
            .iter()
            .find(|a| a.anomaly_type == AnomalyType::Error)
            .expect("recurring error anomaly");
        assert_eq!(err.title, "Recurring error pattern");
        // 5 reports collapse into one group: 20% distinct
        assert_eq!(err.severity, Severity::High);
    }

    #[test]
    fn test_initialize_with_empty_history() {
        let detector = AnomalyDetector::with_defaults();
        assert_eq!(detector.initialize(&[], &[], &[]), DetectorState::Baselined);
        assert!(detector
            .detect_session_anomalies(&normal_session("s1"), &metrics_for("s1", 2900.0), &[])
            .is_empty());
        assert!(detector.predict_anomalies(&normal_session("s1"), &[]).is_none());
    }

    #[test]
    fn test_unique_error_ratio_groups_near_duplicates() {
        let texts = [
            "Error: connection timeout after 3012ms (attempt 1)",
            "Error: connection timeout after 2990ms (attempt 2)",
            "Error: connection timeout after 3104ms (attempt 3)",
            "Error: disk quota exceeded",
        ];
        assert_eq!(unique_error_ratio(&texts, 0.8), 0.5);
        assert_eq!(unique_error_ratio(&[], 0.8), 1.0);
    }

    #[test]
    fn test_communication_requires_two_records() {
        let detector = active_detector();
        let session = normal_session("s1");
        let t0 = Utc::now();
        let one = vec![AgentCommunication::new("s1", AgentRole::Manager, AgentRole::Worker, t0)];
        assert!(detector
            .detect_session_anomalies(&session, &metrics_for("s1", 2000.0), &one)
            .iter()
            .all(|a| a.anomaly_type != AnomalyType::Communication));

        let slow = vec![
            AgentCommunication::new("s1", AgentRole::Manager, AgentRole::Worker, t0),
            AgentCommunication::new("s1", AgentRole::Worker, AgentRole::Manager, t0 + Duration::milliseconds(2000)),
        ];
        let anomalies = detector.detect_session_anomalies(&session, &metrics_for("s1", 2000.0), &slow);
        let comm = anomalies.iter().find(|a| a.anomaly_type == AnomalyType::Communication).unwrap();
        assert_eq!(comm.title, "Slow agent handoffs");
        assert_eq!(comm.severity, Severity::Critical);
    }

    #[test]
    fn test_subscribers_gated_by_severity() {
        let detector = active_detector();
        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);
        detector.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        // Low severity: z = 2.0 with threshold 1.5
        let session = normal_session("s1");
        let anomalies = detector.detect_session_anomalies(&session, &metrics_for("s1", 2400.0), &[]);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].severity, Severity::Low);
        assert_eq!(received.load(Ordering::SeqCst), 0);

        detector.detect_session_anomalies(&normal_session("s2"), &metrics_for("s2", 2900.0), &[]);
        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert_eq!(detector.anomaly_count(), 2);
    }

    #[test]
    fn test_history_is_bounded() {
        let detector = AnomalyDetector::new(DetectorConfig { max_history: 3, ..DetectorConfig::default() });
        detector.set_baseline(baseline());
        for i in 0..5 {
            let id = format!("s{}", i);
            detector.detect_session_anomalies(&normal_session(&id), &metrics_for(&id, 2900.0), &[]);
        }
        // Every session after the first also matches the known pattern
        let history = detector.anomalies();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].session_id.as_deref(), Some("s3"));
        assert_eq!(history[2].session_id.as_deref(), Some("s4"));
        assert_eq!(history[2].anomaly_type, AnomalyType::Pattern);
    }

    #[test]
    fn test_known_pattern_recurrence() {
        let detector = active_detector();
        detector.detect_session_anomalies(&normal_session("s1"), &metrics_for("s1", 2900.0), &[]);
        assert_eq!(detector.patterns().len(), 1);

        // Same shape, normal response times: only the pattern detector fires
        let anomalies = detector.detect_session_anomalies(&normal_session("s2"), &metrics_for("s2", 2100.0), &[]);
        let hit = anomalies
            .iter()
            .find(|a| a.anomaly_type == AnomalyType::Pattern)
            .expect("pattern recurrence");
        assert_eq!(hit.severity, Severity::Critical);
        assert!(hit.context.related_pattern.is_some());
    }

    #[test]
    fn test_small_corpus_disables_detection() {
        let detector = AnomalyDetector::with_defaults();
        let sessions: Vec<Session> = (0..5).map(|i| normal_session(&format!("h{}", i))).collect();
        let state = detector.initialize(&sessions, &[], &[]);
        assert_eq!(state, DetectorState::Baselined);
        assert!(detector
            .detect_session_anomalies(&normal_session("s1"), &metrics_for("s1", 99_000.0), &[])
            .is_empty());
    }

    #[test]
    fn test_reset_returns_to_uninitialized() {
        let detector = active_detector();
        detector.detect_session_anomalies(&normal_session("s1"), &metrics_for("s1", 2900.0), &[]);
        detector.reset();
        assert_eq!(detector.state(), DetectorState::Uninitialized);
        assert_eq!(detector.anomaly_count(), 0);
        assert!(detector.patterns().is_empty());
        assert!(detector.baseline().is_none());
    }
}
