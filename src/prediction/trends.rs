//! Trend analysis over daily resource series

use chrono::NaiveDate;

use crate::prediction::types::{
    ChangePoint, DailyBucket, ResourceMetric, TrendAnalysis, TrendDirection, TrendScenarios,
};
use crate::stats;

/// Slope magnitude separating a trend from a stable series
pub const TREND_SLOPE_THRESHOLD: f64 = 0.1;

/// Relative mean shift that marks a change point
pub const CHANGE_POINT_SHIFT: f64 = 0.3;

pub const MAX_CHANGE_POINTS: usize = 3;

/// Window on each side of a candidate change point
const WINDOW: usize = 3;

/// Spread of the best/worst next-period scenarios
const SCENARIO_BAND: f64 = 0.2;

/// Trend analysis for every resource metric
pub fn analyze_resource_trends(buckets: &[DailyBucket]) -> Vec<TrendAnalysis> {
    if buckets.is_empty() {
        return Vec::new();
    }
    ResourceMetric::all()
        .into_iter()
        .map(|metric| {
            let series: Vec<(NaiveDate, f64)> = buckets
                .iter()
                .filter_map(|b| b.value(metric).map(|v| (b.date, v)))
                .collect();
            analyze_trend(metric, &series)
        })
        .collect()
}

pub fn analyze_trend(metric: ResourceMetric, series: &[(NaiveDate, f64)]) -> TrendAnalysis {
    let xs: Vec<f64> = (0..series.len()).map(|i| i as f64).collect();
    let ys: Vec<f64> = series.iter().map(|(_, v)| *v).collect();
    let fit = stats::linear_regression(&xs, &ys);

    let direction = if fit.slope > TREND_SLOPE_THRESHOLD {
        TrendDirection::Up
    } else if fit.slope < -TREND_SLOPE_THRESHOLD {
        TrendDirection::Down
    } else {
        TrendDirection::Stable
    };

    let expected = fit.predict(series.len() as f64).max(0.0);
    let (high, low) = (expected * (1.0 + SCENARIO_BAND), expected * (1.0 - SCENARIO_BAND));
    let next_period = if metric.higher_is_better() {
        TrendScenarios { best: high, expected, worst: low }
    } else {
        TrendScenarios { best: low, expected, worst: high }
    };

    TrendAnalysis {
        metric,
        direction,
        slope: fit.slope,
        r_squared: fit.r_squared,
        change_points: change_points(series),
        next_period,
    }
}

/// Up to three strongest mean shifts, at least one window apart
pub fn change_points(series: &[(NaiveDate, f64)]) -> Vec<ChangePoint> {
    if series.len() < WINDOW * 2 {
        return Vec::new();
    }
    let values: Vec<f64> = series.iter().map(|(_, v)| *v).collect();

    let mut candidates: Vec<ChangePoint> = (WINDOW..=values.len() - WINDOW)
        .filter_map(|i| {
            let before = stats::mean(&values[i - WINDOW..i]);
            let after = stats::mean(&values[i..i + WINDOW]);
            let shift = relative_shift(before, after);
            (shift > CHANGE_POINT_SHIFT).then(|| ChangePoint {
                index: i,
                date: series[i].0,
                before_mean: before,
                after_mean: after,
                relative_change: shift,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.relative_change
            .partial_cmp(&a.relative_change)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.index.cmp(&b.index))
    });

    let mut selected: Vec<ChangePoint> = Vec::new();
    for candidate in candidates {
        if selected.len() == MAX_CHANGE_POINTS {
            break;
        }
        if selected.iter().all(|s| s.index.abs_diff(candidate.index) >= WINDOW) {
            selected.push(candidate);
        }
    }
    selected.sort_by_key(|c| c.index);
    selected
}

fn relative_shift(before: f64, after: f64) -> f64 {
    if before.abs() > f64::EPSILON {
        (after - before).abs() / before.abs()
    } else if after.abs() > f64::EPSILON {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn series(values: &[f64]) -> Vec<(NaiveDate, f64)> {
        let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (start + Duration::days(i as i64), *v))
            .collect()
    }

    #[test]
    fn test_direction_thresholds() {
        let up = analyze_trend(ResourceMetric::Cost, &series(&[1.0, 2.0, 3.0, 4.0]));
        assert_eq!(up.direction, TrendDirection::Up);

        let flat = analyze_trend(ResourceMetric::Cost, &series(&[1.0, 1.05, 1.1, 1.15]));
        assert_eq!(flat.direction, TrendDirection::Stable);

        let down = analyze_trend(ResourceMetric::ErrorCount, &series(&[9.0, 6.0, 3.0, 0.0]));
        assert_eq!(down.direction, TrendDirection::Down);
    }

    #[test]
    fn test_scenarios_follow_metric_polarity() {
        let cost = analyze_trend(ResourceMetric::Cost, &series(&[10.0, 10.0, 10.0]));
        assert!((cost.next_period.expected - 10.0).abs() < 1e-9);
        assert!((cost.next_period.best - 8.0).abs() < 1e-9);
        assert!((cost.next_period.worst - 12.0).abs() < 1e-9);

        let perf = analyze_trend(ResourceMetric::AvgPerformance, &series(&[0.5, 0.5, 0.5]));
        assert!(perf.next_period.best > perf.next_period.worst);
    }

    #[test]
    fn test_single_step_change_point() {
        let points = change_points(&series(&[10.0, 10.0, 10.0, 10.0, 20.0, 20.0, 20.0, 20.0]));
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].index, 4);
        assert_eq!(points[0].relative_change, 1.0);
    }

    #[test]
    fn test_change_points_capped_at_three() {
        let mut values = Vec::new();
        for level in [10.0, 30.0, 10.0, 30.0, 10.0] {
            values.extend([level; 4]);
        }
        let points = change_points(&series(&values));
        assert_eq!(points.len(), MAX_CHANGE_POINTS);
        assert!(points.windows(2).all(|w| w[0].index < w[1].index));
    }

    #[test]
    fn test_short_series_has_no_change_points() {
        assert!(change_points(&series(&[1.0, 100.0, 1.0])).is_empty());
    }
}
