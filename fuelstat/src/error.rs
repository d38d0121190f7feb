//! Error types for the Fuelstat standardization pipeline.
//!
//! Errors are split by how far they reach:
//!
//! - Run-fatal: [`ParseError`], [`ReferenceError`], [`ConfigError`] and
//!   [`RegistryError`], all wrapped by [`PipelineError`]. The run aborts
//!   before any record is processed.
//! - Per-record: [`ConversionError`] and [`RecordError`]. The record is
//!   dropped, a [`DropReason`] lands in the dropped-record report and the
//!   run continues.
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// Input Parsing Errors
// =============================================================================

/// Errors while reading the extractor's flat export.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Failed to read file.
    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to decode bytes.
    #[error("Failed to decode input: {0}")]
    Encoding(String),

    /// Invalid CSV structure.
    #[error("Invalid CSV: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid JSON input.
    #[error("Invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),

    /// No header row.
    #[error("Input has no header row")]
    NoHeaders,

    /// A required column is absent from the header row.
    #[error("Missing required column: {0}")]
    MissingColumn(String),
}

// =============================================================================
// Reference Table Errors
// =============================================================================

/// Errors loading or validating reference tables.
///
/// Every record depends on these tables, so all variants are run-fatal.
#[derive(Debug, Error)]
pub enum ReferenceError {
    /// Failed to read a reference file.
    #[error("Failed to read reference table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reference file is not valid JSON or does not match the expected shape.
    #[error("Reference table JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reference file failed schema validation.
    #[error("Reference table '{table}' failed validation: {errors:?}")]
    Schema { table: String, errors: Vec<String> },

    /// No taxonomy rules.
    #[error("Taxonomy has no rules")]
    EmptyTaxonomy,

    /// A taxonomy rule without keywords can never match.
    #[error("Taxonomy rule {index} ('{product}') has no keywords")]
    EmptyKeywords { index: usize, product: String },

    /// Density table without products.
    #[error("Density table has no product densities")]
    EmptyDensityTable,

    /// A density value is zero, negative or not finite.
    #[error("Density for '{key}' must be strictly positive, got {value}")]
    InvalidDensity { key: String, value: f64 },
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors loading or validating [`crate::config::PipelineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config is not valid JSON.
    #[error("Config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Config failed schema validation.
    #[error("Config failed validation: {0:?}")]
    Schema(Vec<String>),

    /// A knob is outside its accepted range.
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// An environment override could not be parsed.
    #[error("Environment variable {var} has unparsable value '{value}'")]
    Env { var: String, value: String },
}

// =============================================================================
// Override Registry Errors
// =============================================================================

/// Errors from the company-name override store.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Override not found.
    #[error("Override not found: {0}")]
    NotFound(String),

    /// Raw or canonical name is blank.
    #[error("Invalid override: {0}")]
    Invalid(String),

    /// Override file failed schema validation.
    #[error("Override file failed validation: {0:?}")]
    Schema(Vec<String>),

    /// IO error.
    #[error("Registry IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("Registry JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Per-record Errors
// =============================================================================

/// Errors from the unit conversion engine. Fatal for one record only.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// Density is zero, negative or not finite.
    #[error("Invalid density {0} kg/L")]
    InvalidDensity(f64),

    /// Unit is neither volume nor mass.
    #[error("Invalid unit '{0}'")]
    InvalidUnit(String),

    /// Raw value is negative or not finite.
    #[error("Invalid value {0}")]
    InvalidValue(f64),
}

/// Why a record was dropped from the canonical set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    UnmappedProduct,
    JunkCompany,
    InvalidUnit,
    InvalidDensity,
    InvalidValue,
}

impl DropReason {
    /// Stable report code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnmappedProduct => "unmapped_product",
            Self::JunkCompany => "junk_company",
            Self::InvalidUnit => "invalid_unit",
            Self::InvalidDensity => "invalid_density",
            Self::InvalidValue => "invalid_value",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recoverable, per-record failure: skip the record, report it, continue.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    /// No taxonomy rule matched the label.
    #[error("Unmapped product label '{0}'")]
    UnmappedProduct(String),

    /// Company name is a header, total row or otherwise not a company.
    #[error("Junk company name '{0}'")]
    JunkCompany(String),

    /// Unit conversion failed.
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl RecordError {
    /// Report code for this failure.
    pub fn reason(&self) -> DropReason {
        match self {
            Self::UnmappedProduct(_) => DropReason::UnmappedProduct,
            Self::JunkCompany(_) => DropReason::JunkCompany,
            Self::Conversion(ConversionError::InvalidDensity(_)) => DropReason::InvalidDensity,
            Self::Conversion(ConversionError::InvalidUnit(_)) => DropReason::InvalidUnit,
            Self::Conversion(ConversionError::InvalidValue(_)) => DropReason::InvalidValue,
        }
    }
}

// =============================================================================
// Pipeline Errors (top-level, run-fatal)
// =============================================================================

/// Top-level, run-fatal errors.
///
/// This is the error type returned by [`crate::transform::pipeline::Pipeline::new`]
/// and [`crate::transform::pipeline::run_files`]. Per-record problems never
/// surface here; they end up in the dropped-record report.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input could not be read.
    #[error("Input error: {0}")]
    Parse(#[from] ParseError),

    /// Reference tables could not be loaded.
    #[error("Reference error: {0}")]
    Reference(#[from] ReferenceError),

    /// Configuration is invalid.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Override store could not be read.
    #[error("Override registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Writing an output artifact failed.
    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for input parsing.
pub type ParseResult<T> = Result<T, ParseError>;

/// Result type for reference table operations.
pub type ReferenceResult<T> = Result<T, ReferenceError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let reference_err = ReferenceError::EmptyTaxonomy;
        let pipeline_err: PipelineError = reference_err.into();
        assert!(pipeline_err.to_string().contains("no rules"));

        let config_err = ConfigError::InvalidValue {
            field: "weights".into(),
            message: "must sum to 1.0".into(),
        };
        let pipeline_err: PipelineError = config_err.into();
        assert!(pipeline_err.to_string().contains("weights"));
    }

    #[test]
    fn test_record_error_reasons() {
        assert_eq!(
            RecordError::UnmappedProduct("XYZ".into()).reason(),
            DropReason::UnmappedProduct
        );
        assert_eq!(
            RecordError::JunkCompany("TOTAL".into()).reason(),
            DropReason::JunkCompany
        );
        let err: RecordError = ConversionError::InvalidDensity(0.0).into();
        assert_eq!(err.reason(), DropReason::InvalidDensity);
        let err: RecordError = ConversionError::InvalidUnit("UNKNOWN".into()).into();
        assert_eq!(err.reason(), DropReason::InvalidUnit);
    }

    #[test]
    fn test_drop_reason_serializes_as_code() {
        let json = serde_json::to_string(&DropReason::UnmappedProduct).unwrap();
        assert_eq!(json, "\"unmapped_product\"");
        assert_eq!(DropReason::JunkCompany.to_string(), "junk_company");
    }
}
