use std::path::Path;

use serde::Deserialize;

use crate::error::{SegmentError, SegmentResult};
use crate::types::SegmentGroup;

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `AUDIENCE_INSIGHTS__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub recommendations: RecommendationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentationConfig {
    /// Days of inactivity after which a transaction counts as churned.
    #[serde(default = "default_churn_window_days")]
    pub churn_window_days: i64,
    #[serde(default = "default_high_clv_quantile")]
    pub high_clv_quantile: f64,
    #[serde(default = "default_preference_delimiter")]
    pub preference_delimiter: String,
    #[serde(default = "default_histogram_bins")]
    pub histogram_bins: usize,
    #[serde(default = "default_groups")]
    pub groups: Vec<SegmentGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationConfig {
    #[serde(default = "default_recommendations_enabled")]
    pub enabled: bool,
}

// Default functions
fn default_churn_window_days() -> i64 {
    365
}
fn default_high_clv_quantile() -> f64 {
    0.75
}
fn default_preference_delimiter() -> String {
    ",".to_string()
}
fn default_histogram_bins() -> usize {
    30
}
fn default_groups() -> Vec<SegmentGroup> {
    vec![SegmentGroup::Demographic, SegmentGroup::Transactional]
}
fn default_recommendations_enabled() -> bool {
    true
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            churn_window_days: default_churn_window_days(),
            high_clv_quantile: default_high_clv_quantile(),
            preference_delimiter: default_preference_delimiter(),
            histogram_bins: default_histogram_bins(),
            groups: default_groups(),
        }
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            enabled: default_recommendations_enabled(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            segmentation: SegmentationConfig::default(),
            recommendations: RecommendationConfig::default(),
        }
    }
}

impl SegmentationConfig {
    pub fn validate(&self) -> SegmentResult<()> {
        if self.churn_window_days < 0 {
            return Err(SegmentError::Config(format!(
                "churn_window_days must be non-negative, got {}",
                self.churn_window_days
            )));
        }
        if !(0.0..=1.0).contains(&self.high_clv_quantile) {
            return Err(SegmentError::Config(format!(
                "high_clv_quantile must be within [0, 1], got {}",
                self.high_clv_quantile
            )));
        }
        if self.preference_delimiter.is_empty() {
            return Err(SegmentError::Config(
                "preference_delimiter must not be empty".to_string(),
            ));
        }
        if self.histogram_bins == 0 {
            return Err(SegmentError::Config(
                "histogram_bins must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from environment variables only.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from an optional TOML file, overlaid with
    /// environment variables.
    pub fn load_from(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("AUDIENCE_INSIGHTS")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("segmentation.groups"),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config
            .segmentation
            .validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(config)
    }
}
