//! Resource forecasting
//!
//! Daily usage buckets, a least-squares trend per metric and an optional
//! weekly seasonal factor, extrapolated day by day with a widening
//! uncertainty band.

use chrono::{Datelike, Duration, NaiveDate, Utc};
use std::collections::BTreeMap;

use crate::prediction::types::{
    BudgetProjection, DailyBucket, ForecastPoint, ForecastRange, MetricForecast, ResourceForecast,
    ResourceMetric,
};
use crate::stats;
use crate::types::metrics::metrics_by_session;
use crate::types::{PerformanceMetric, Session};

/// Weekday-mean spread (relative to the overall mean) that counts as seasonal
pub const SEASONALITY_RATIO: f64 = 0.2;

/// Confidence at the first forecast day, and its floor
const CONFIDENCE_START: f64 = 0.9;
const CONFIDENCE_STEP: f64 = 0.05;
const CONFIDENCE_FLOOR: f64 = 0.5;

/// Band growth per day of horizon
const BAND_GROWTH: f64 = 0.15;

/// Aggregate sessions into contiguous daily buckets by start date
///
/// Days without sessions inside the observed span are filled with zero usage.
pub fn daily_buckets(sessions: &[Session], metrics: &[PerformanceMetric]) -> Vec<DailyBucket> {
    let by_session = metrics_by_session(metrics);

    let mut days: BTreeMap<NaiveDate, (DailyBucket, Vec<f64>)> = BTreeMap::new();
    for session in sessions {
        let date = session.start_time.date_naive();
        let own = by_session.get(&session.id);
        let (bucket, scores) = days
            .entry(date)
            .or_insert_with(|| (DailyBucket::empty(date), Vec::new()));
        bucket.tokens += session.total_tokens(own) as f64;
        bucket.cost += session.total_cost(own);
        bucket.sessions += 1;
        bucket.errors += session.error_count();
        scores.push(session.success_score());
    }

    let (Some(first), Some(last)) = (days.keys().next().copied(), days.keys().last().copied()) else {
        return Vec::new();
    };

    let mut buckets = Vec::new();
    let mut date = first;
    while date <= last {
        let bucket = match days.remove(&date) {
            Some((mut bucket, scores)) => {
                bucket.avg_performance = Some(stats::mean(&scores));
                bucket
            }
            None => DailyBucket::empty(date),
        };
        buckets.push(bucket);
        date += Duration::days(1);
    }
    buckets
}

/// Forecast every resource metric `days` ahead of the last bucket
pub fn forecast_resources(buckets: &[DailyBucket], days: usize) -> ResourceForecast {
    let metrics: Vec<MetricForecast> = if buckets.is_empty() {
        Vec::new()
    } else {
        ResourceMetric::all()
            .into_iter()
            .map(|metric| forecast_metric(buckets, metric, days))
            .collect()
    };

    let budget = metrics
        .iter()
        .find(|m| m.metric == ResourceMetric::Cost)
        .map(|m| BudgetProjection {
            expected: m.points.iter().map(|p| p.predicted).sum(),
            conservative: m.points.iter().map(|p| p.range.upper).sum(),
            optimistic: m.points.iter().map(|p| p.range.lower).sum(),
        })
        .unwrap_or_default();

    ResourceForecast {
        generated_at: Utc::now(),
        days,
        metrics,
        budget,
    }
}

/// Per-weekday multiplicative factors when the series is seasonal
pub fn weekly_seasonality(series: &[(NaiveDate, f64)]) -> Option<[f64; 7]> {
    if series.len() < 7 {
        return None;
    }
    let overall = stats::mean(&series.iter().map(|(_, v)| *v).collect::<Vec<_>>());
    if overall <= 0.0 {
        return None;
    }

    let mut per_day: [Vec<f64>; 7] = Default::default();
    for (date, value) in series {
        per_day[date.weekday().num_days_from_monday() as usize].push(*value);
    }
    let weekday_means: Vec<f64> = per_day
        .iter()
        .map(|v| if v.is_empty() { overall } else { stats::mean(v) })
        .collect();

    if stats::std_dev(&weekday_means) / overall <= SEASONALITY_RATIO {
        return None;
    }

    let mut factors = [1.0; 7];
    for (factor, mean) in factors.iter_mut().zip(&weekday_means) {
        *factor = mean / overall;
    }
    Some(factors)
}

fn forecast_metric(buckets: &[DailyBucket], metric: ResourceMetric, days: usize) -> MetricForecast {
    let origin = buckets[0].date;
    let series: Vec<(NaiveDate, f64)> = buckets
        .iter()
        .filter_map(|b| b.value(metric).map(|v| (b.date, v)))
        .collect();
    let xs: Vec<f64> = series
        .iter()
        .map(|(d, _)| (*d - origin).num_days() as f64)
        .collect();
    let ys: Vec<f64> = series.iter().map(|(_, v)| *v).collect();

    let seasonality = weekly_seasonality(&series);
    let deseasonalized: Vec<f64> = match &seasonality {
        Some(factors) => series
            .iter()
            .map(|(d, v)| {
                let f = factors[d.weekday().num_days_from_monday() as usize];
                if f > 0.0 { v / f } else { *v }
            })
            .collect(),
        None => ys.clone(),
    };

    let fit = stats::linear_regression(&xs, &deseasonalized);
    let residuals: Vec<f64> = xs
        .iter()
        .zip(&deseasonalized)
        .map(|(x, y)| y - fit.predict(*x))
        .collect();
    let mean_level = stats::mean(&ys).abs();
    let base_width = stats::std_dev(&residuals).max(0.1 * mean_level);

    let last = buckets[buckets.len() - 1].date;
    let last_x = (last - origin).num_days() as f64;

    let points = (1..=days)
        .map(|horizon| {
            let date = last + Duration::days(horizon as i64);
            let factor = seasonality
                .map(|f| f[date.weekday().num_days_from_monday() as usize])
                .unwrap_or(1.0);
            let predicted = (fit.predict(last_x + horizon as f64) * factor).max(0.0);
            let half_width = base_width * (1.0 + BAND_GROWTH * horizon as f64);
            let lower = (predicted - half_width).max(0.0);
            let step = (horizon - 1) as f64;
            ForecastPoint {
                date,
                horizon,
                predicted,
                range: ForecastRange {
                    lower,
                    upper: lower + 2.0 * half_width,
                },
                confidence: (CONFIDENCE_START - CONFIDENCE_STEP * step).max(CONFIDENCE_FLOOR),
            }
        })
        .collect();

    MetricForecast {
        metric,
        trend_slope: fit.slope,
        seasonal: seasonality.is_some(),
        points,
    }
}
