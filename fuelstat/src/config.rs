//! Pipeline configuration knobs.
//!
//! Defaults are the empirically chosen starting points; a JSON file can
//! override any subset and a handful of `FUELSTAT_*` environment variables
//! override the file. The final value is checked by [`PipelineConfig::validate`]
//! before a run starts.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::validation::validate_config;

pub const ENV_SIMILARITY_THRESHOLD: &str = "FUELSTAT_SIMILARITY_THRESHOLD";
pub const ENV_MIN_COHORT_SIZE: &str = "FUELSTAT_MIN_COHORT_SIZE";
pub const ENV_CONSENSUS_THRESHOLD: &str = "FUELSTAT_CONSENSUS_THRESHOLD";
pub const ENV_CAP_OUTLIERS: &str = "FUELSTAT_CAP_OUTLIERS";

/// Weights of the four quality sub-scores. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub completeness: f64,
    pub consistency: f64,
    pub validity: f64,
    pub outlier: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            completeness: 0.30,
            consistency: 0.25,
            validity: 0.25,
            outlier: 0.20,
        }
    }
}

impl QualityWeights {
    pub fn sum(&self) -> f64 {
        self.completeness + self.consistency + self.validity + self.outlier
    }
}

/// Inclusive range of plausible reporting years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YearRange {
    pub min: i32,
    pub max: i32,
}

impl Default for YearRange {
    fn default() -> Self {
        Self { min: 2000, max: 2100 }
    }
}

impl YearRange {
    pub fn contains(&self, year: i32) -> bool {
        (self.min..=self.max).contains(&year)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Combined similarity at or above which two names join one cluster.
    pub similarity_threshold: f64,
    /// Cohorts smaller than this skip the density-based outlier test.
    pub min_cohort_size: usize,
    /// Votes needed to flag an outlier.
    pub consensus_threshold: usize,
    /// Share of a cohort the density test flags.
    pub contamination: f64,
    pub iqr_multiplier: f64,
    pub robust_z_threshold: f64,
    pub weights: QualityWeights,
    /// Allowed relative deviation between implied and reference density.
    pub density_tolerance: f64,
    pub valid_years: YearRange,
    /// Attach IQR-fence capped volumes to flagged outliers.
    pub cap_outliers: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            min_cohort_size: 5,
            consensus_threshold: 2,
            contamination: 0.05,
            iqr_multiplier: 1.5,
            robust_z_threshold: 3.5,
            weights: QualityWeights::default(),
            density_tolerance: 0.20,
            valid_years: YearRange::default(),
            cap_outliers: true,
        }
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var: var.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}

impl PipelineConfig {
    /// Load a config file, validated against the embedded schema.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        validate_config(&value).map_err(ConfigError::Schema)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Defaults, or the given file, with environment overrides applied and validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FUELSTAT_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|var| std::env::var(var).ok())
    }

    /// Apply overrides using `lookup` as the environment.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_SIMILARITY_THRESHOLD) {
            self.similarity_threshold = parse_env(ENV_SIMILARITY_THRESHOLD, &v)?;
        }
        if let Some(v) = lookup(ENV_MIN_COHORT_SIZE) {
            self.min_cohort_size = parse_env(ENV_MIN_COHORT_SIZE, &v)?;
        }
        if let Some(v) = lookup(ENV_CONSENSUS_THRESHOLD) {
            self.consensus_threshold = parse_env(ENV_CONSENSUS_THRESHOLD, &v)?;
        }
        if let Some(v) = lookup(ENV_CAP_OUTLIERS) {
            self.cap_outliers = parse_bool(ENV_CAP_OUTLIERS, &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(invalid("similarity_threshold", "must be in (0, 1]"));
        }
        if self.min_cohort_size < 3 {
            return Err(invalid("min_cohort_size", "must be at least 3"));
        }
        if !(1..=3).contains(&self.consensus_threshold) {
            return Err(invalid("consensus_threshold", "must be 1, 2 or 3"));
        }
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(invalid("contamination", "must be in (0, 0.5]"));
        }
        if !(self.iqr_multiplier.is_finite() && self.iqr_multiplier > 0.0) {
            return Err(invalid("iqr_multiplier", "must be positive"));
        }
        if !(self.robust_z_threshold.is_finite() && self.robust_z_threshold > 0.0) {
            return Err(invalid("robust_z_threshold", "must be positive"));
        }
        if !(self.density_tolerance.is_finite() && self.density_tolerance > 0.0) {
            return Err(invalid("density_tolerance", "must be positive"));
        }
        let w = &self.weights;
        if [w.completeness, w.consistency, w.validity, w.outlier]
            .iter()
            .any(|x| !x.is_finite() || *x < 0.0)
        {
            return Err(invalid("weights", "must be non-negative"));
        }
        if (w.sum() - 1.0).abs() > 1e-6 {
            return Err(invalid("weights", format!("must sum to 1.0, got {}", w.sum())));
        }
        if self.valid_years.min > self.valid_years.max {
            return Err(invalid("valid_years", "min is after max"));
        }
        Ok(())
    }
}
