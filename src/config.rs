//! Analytics service configuration
//!
//! Loaded from TOML. Missing fields take their defaults, so an empty file is
//! a valid configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::anomaly::{DetectorConfig, Sensitivity};
use crate::errors::{AnalyticsError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Run timer-driven re-analysis and retraining
    pub enable_real_time_analysis: bool,
    pub insight_generation_interval_ms: u64,
    pub anomaly_detection_sensitivity: Sensitivity,
    pub prediction_retrain_interval_ms: u64,
    /// Anomaly history cap
    pub max_insights_history: usize,
    /// Push medium-severity anomalies to subscribers
    pub report_medium_anomalies: bool,
    pub forecast_days: usize,
    pub load_forecast_hours: usize,
    /// Fixed seed for reproducible clustering
    pub cluster_seed: Option<u64>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enable_real_time_analysis: true,
            insight_generation_interval_ms: 300_000,
            anomaly_detection_sensitivity: Sensitivity::High,
            prediction_retrain_interval_ms: 3_600_000,
            max_insights_history: 1000,
            report_medium_anomalies: false,
            forecast_days: 7,
            load_forecast_hours: 24,
            cluster_seed: None,
        }
    }
}

impl AnalyticsConfig {
    /// Load from `path`, else `~/.sessionsight/config.toml`, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Self::default()),
            },
        };

        let contents = fs::read_to_string(&path).map_err(|e| {
            AnalyticsError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: AnalyticsConfig = toml::from_str(&contents).map_err(|e| {
            AnalyticsError::ConfigError(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write as pretty TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| AnalyticsError::ConfigError(format!("failed to serialize config: {}", e)))?;
        fs::write(path, toml_string)?;
        Ok(())
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".sessionsight").join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.insight_generation_interval_ms == 0 {
            return Err(AnalyticsError::ConfigError(
                "insight_generation_interval_ms must be positive".to_string(),
            ));
        }
        if self.prediction_retrain_interval_ms == 0 {
            return Err(AnalyticsError::ConfigError(
                "prediction_retrain_interval_ms must be positive".to_string(),
            ));
        }
        if self.max_insights_history == 0 {
            return Err(AnalyticsError::ConfigError(
                "max_insights_history must be positive".to_string(),
            ));
        }
        if self.forecast_days == 0 {
            return Err(AnalyticsError::ConfigError("forecast_days must be positive".to_string()));
        }
        Ok(())
    }

    pub fn insight_interval(&self) -> Duration {
        Duration::from_millis(self.insight_generation_interval_ms)
    }

    pub fn retrain_interval(&self) -> Duration {
        Duration::from_millis(self.prediction_retrain_interval_ms)
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            sensitivity: self.anomaly_detection_sensitivity,
            report_medium: self.report_medium_anomalies,
            max_history: self.max_insights_history,
            ..DetectorConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AnalyticsConfig::default();
        assert!(config.enable_real_time_analysis);
        assert_eq!(config.insight_generation_interval_ms, 300_000);
        assert_eq!(config.prediction_retrain_interval_ms, 3_600_000);
        assert_eq!(config.anomaly_detection_sensitivity, Sensitivity::High);
        assert_eq!(config.max_insights_history, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "anomaly_detection_sensitivity = \"low\"\nforecast_days = 14\n",
        )
        .unwrap();

        let config = AnalyticsConfig::load(Some(&path)).unwrap();
        assert_eq!(config.anomaly_detection_sensitivity, Sensitivity::Low);
        assert_eq!(config.forecast_days, 14);
        assert_eq!(config.max_insights_history, 1000);
        assert_eq!(config.detector_config().z_threshold(), 3.0);
    }

    #[test]
    fn test_save_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        let config = AnalyticsConfig {
            cluster_seed: Some(7),
            report_medium_anomalies: true,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(AnalyticsConfig::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_rejects_zero_interval() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "insight_generation_interval_ms = 0\n").unwrap();
        assert!(matches!(
            AnalyticsConfig::load(Some(&path)),
            Err(AnalyticsError::ConfigError(_))
        ));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let temp = TempDir::new().unwrap();
        assert!(AnalyticsConfig::load(Some(&temp.path().join("absent.toml"))).is_err());
    }
}
