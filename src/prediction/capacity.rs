//! Hourly load forecasting and capacity alerts

use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};
use std::collections::BTreeSet;

use crate::anomaly::Severity;
use crate::prediction::types::{CapacityAlert, CapacityPlan, HourlyLoad};
use crate::types::metrics::metrics_by_session;
use crate::types::{PerformanceMetric, Session};

/// Expected sessions per hour above which a capacity alert is raised
pub const PEAK_LOAD_THRESHOLD: f64 = 10.0;

/// Projected spend over the planning window above which an alert is raised
pub const PROJECTED_COST_THRESHOLD: f64 = 100.0;

/// Average sessions started per hour of day, across the observed days
pub fn hourly_profile(sessions: &[Session]) -> [f64; 24] {
    let mut counts = [0usize; 24];
    let mut days = BTreeSet::new();
    for session in sessions {
        counts[session.start_time.hour() as usize] += 1;
        days.insert(session.start_time.date_naive());
    }

    let mut profile = [0.0; 24];
    if days.is_empty() {
        return profile;
    }
    let day_count = days.len() as f64;
    for (slot, count) in profile.iter_mut().zip(counts) {
        *slot = count as f64 / day_count;
    }
    profile
}

/// Plan the next `hours` hours from `now`, assuming the daily profile repeats
pub fn forecast_load(
    sessions: &[Session],
    metrics: &[PerformanceMetric],
    hours: usize,
    now: DateTime<Utc>,
) -> CapacityPlan {
    let profile = hourly_profile(sessions);
    let start = now
        .duration_trunc(Duration::hours(1))
        .unwrap_or(now)
        + Duration::hours(1);

    let hourly: Vec<HourlyLoad> = (0..hours)
        .map(|offset| {
            let at = start + Duration::hours(offset as i64);
            let hour_of_day = at.hour();
            HourlyLoad {
                at,
                hour_of_day,
                expected_sessions: profile[hour_of_day as usize],
            }
        })
        .collect();

    let peak = hourly
        .iter()
        .filter(|h| h.expected_sessions > 0.0)
        .max_by(|a, b| {
            a.expected_sessions
                .partial_cmp(&b.expected_sessions)
                .unwrap_or(std::cmp::Ordering::Equal)
                // Earliest hour wins ties
                .then(b.at.cmp(&a.at))
        });
    let peak_hour = peak.map(|h| h.hour_of_day);
    let peak_load = peak.map(|h| h.expected_sessions).unwrap_or(0.0);

    let expected_sessions: f64 = hourly.iter().map(|h| h.expected_sessions).sum();
    let projected_cost = expected_sessions * cost_per_session(sessions, metrics);

    let mut alerts = Vec::new();
    if peak_load > PEAK_LOAD_THRESHOLD {
        alerts.push(CapacityAlert {
            severity: if peak_load > 2.0 * PEAK_LOAD_THRESHOLD {
                Severity::Critical
            } else {
                Severity::High
            },
            metric: "peak_load".to_string(),
            message: format!(
                "Expected {:.1} sessions per hour at {:02}:00 UTC",
                peak_load,
                peak_hour.unwrap_or(0)
            ),
            value: peak_load,
            threshold: PEAK_LOAD_THRESHOLD,
        });
    }
    if projected_cost > PROJECTED_COST_THRESHOLD {
        alerts.push(CapacityAlert {
            severity: if projected_cost > 2.0 * PROJECTED_COST_THRESHOLD {
                Severity::High
            } else {
                Severity::Medium
            },
            metric: "projected_cost".to_string(),
            message: format!("Projected spend of ${:.2} over the next {} hours", projected_cost, hours),
            value: projected_cost,
            threshold: PROJECTED_COST_THRESHOLD,
        });
    }

    CapacityPlan {
        generated_at: now,
        hourly,
        peak_hour,
        peak_load,
        projected_cost,
        alerts,
    }
}

fn cost_per_session(sessions: &[Session], metrics: &[PerformanceMetric]) -> f64 {
    if sessions.is_empty() {
        return 0.0;
    }
    let by_session = metrics_by_session(metrics);
    let total: f64 = sessions.iter().map(|s| s.total_cost(by_session.get(&s.id))).sum();
    total / sessions.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SessionStatus, SessionSummary};
    use chrono::TimeZone;

    fn session_at(id: &str, at: DateTime<Utc>, cost: f64) -> Session {
        let mut s = Session::new(id, "task").starting_at(at);
        s.finish(SessionStatus::Completed, at + Duration::minutes(2));
        s.backfill_summary(SessionSummary {
            success_rate: 1.0,
            total_cost: cost,
            tools_used: vec![],
        });
        s
    }

    #[test]
    fn test_profile_averages_over_days() {
        let day1 = Utc.with_ymd_and_hms(2024, 3, 4, 9, 15, 0).unwrap();
        let day2 = day1 + Duration::days(1);
        let sessions = vec![
            session_at("a", day1, 1.0),
            session_at("b", day1 + Duration::minutes(10), 1.0),
            session_at("c", day2, 1.0),
            session_at("d", day2 + Duration::hours(5), 1.0),
        ];
        let profile = hourly_profile(&sessions);
        assert_eq!(profile[9], 1.5);
        assert_eq!(profile[14], 0.5);
        assert_eq!(profile[0], 0.0);
    }

    #[test]
    fn test_plan_finds_peak_and_cost() {
        let base = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let sessions: Vec<Session> = (0..4)
            .map(|i| session_at(&format!("s{}", i), base + Duration::minutes(i * 5), 2.5))
            .collect();
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 0, 30, 0).unwrap();
        let plan = forecast_load(&sessions, &[], 24, now);

        assert_eq!(plan.hourly.len(), 24);
        assert_eq!(plan.hourly[0].hour_of_day, 1);
        assert_eq!(plan.peak_hour, Some(9));
        assert_eq!(plan.peak_load, 4.0);
        assert!((plan.projected_cost - 10.0).abs() < 1e-9);
        assert!(plan.alerts.is_empty());
    }

    #[test]
    fn test_alerts_on_heavy_load() {
        let base = Utc.with_ymd_and_hms(2024, 3, 4, 13, 0, 0).unwrap();
        let sessions: Vec<Session> = (0..25)
            .map(|i| session_at(&format!("s{}", i), base + Duration::minutes(i * 2), 10.0))
            .collect();
        let plan = forecast_load(&sessions, &[], 24, base);

        assert_eq!(plan.alerts.len(), 2);
        assert_eq!(plan.alerts[0].metric, "peak_load");
        assert_eq!(plan.alerts[0].severity, Severity::Critical);
        assert_eq!(plan.alerts[1].metric, "projected_cost");
        assert_eq!(plan.alerts[1].severity, Severity::High);
    }

    #[test]
    fn test_empty_history_plans_zero_load() {
        let plan = forecast_load(&[], &[], 12, Utc::now());
        assert_eq!(plan.hourly.len(), 12);
        assert_eq!(plan.peak_hour, None);
        assert_eq!(plan.projected_cost, 0.0);
        assert!(plan.alerts.is_empty());
    }
}
