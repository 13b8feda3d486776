//! Statistics utilities
//!
//! Pure functions shared by every analytics component. All of them guard
//! against empty input and zero variance instead of producing NaN.

use serde::{Deserialize, Serialize};

/// Arithmetic mean, 0.0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Absolute z-score; a zero (or non-finite) deviation means no deviation is detectable
pub fn z_score(actual: f64, expected: f64, std_dev: f64) -> f64 {
    if std_dev <= 0.0 || !std_dev.is_finite() {
        return 0.0;
    }
    (actual - expected).abs() / std_dev
}

/// Relative deviation |actual - expected| / expected, 0.0 when expected is not positive
pub fn ratio_deviation(actual: f64, expected: f64) -> f64 {
    if expected <= 0.0 {
        return 0.0;
    }
    (actual - expected).abs() / expected
}

/// Least-squares line fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl Regression {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Simple linear regression of `ys` on `xs`
///
/// Mismatched or empty input yields a flat line through the mean.
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> Regression {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return Regression { slope: 0.0, intercept: 0.0, r_squared: 0.0 };
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let mx = mean(xs);
    let my = mean(ys);

    let sxx: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum();
    let sxy: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();

    if sxx == 0.0 {
        return Regression { slope: 0.0, intercept: my, r_squared: 0.0 };
    }

    let slope = sxy / sxx;
    let intercept = my - slope * mx;

    let ss_tot: f64 = ys.iter().map(|y| (y - my).powi(2)).sum();
    let ss_res: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (y - (intercept + slope * x)).powi(2))
        .sum();
    let r_squared = if ss_tot == 0.0 { 0.0 } else { (1.0 - ss_res / ss_tot).max(0.0) };

    Regression { slope, intercept, r_squared }
}

/// Percentile with linear interpolation, `p` in [0, 100]
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let weight = rank - lower as f64;
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    }
}

/// Euclidean distance over the common prefix of two vectors
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Pearson correlation, 0.0 when either series is constant
pub fn correlation(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let mx = mean(xs);
    let my = mean(ys);

    let cov: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    let vx: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum();
    let vy: f64 = ys.iter().map(|y| (y - my).powi(2)).sum();

    if vx == 0.0 || vy == 0.0 {
        return 0.0;
    }
    (cov / (vx.sqrt() * vy.sqrt())).clamp(-1.0, 1.0)
}
