//! # Fuelstat - Standardization and quality pipeline for petroleum volume records
//!
//! Fuelstat takes the flat records produced by the regulator-export extractor
//! (one row per company, product and month) and turns them into a canonical,
//! deduplicated, quality-scored record set for the warehouse.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌─────────────┐   ┌─────────────┐   ┌─────────────┐
//! │ Raw records │──▶│  Taxonomy   │──▶│  Resolver   │──▶│ Units+Stats │──▶│   Dedup     │
//! │ (CSV/JSON)  │   │  (product)  │   │  (company)  │   │ (score/flag)│   │ (canonical) │
//! └─────────────┘   └─────────────┘   └─────────────┘   └─────────────┘   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fuelstat::{Pipeline, parser::load_raw_records};
//!
//! let input = load_raw_records("omc_2021.csv".as_ref())?;
//! let output = Pipeline::with_defaults()?.run(&input.records);
//! println!("{} canonical records", output.records.len());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Run-fatal and per-record error types
//! - [`models`] - Raw, mapped and standardized records
//! - [`parser`] - CSV/JSON input with encoding auto-detection
//! - [`reference`] - Taxonomy and density tables
//! - [`taxonomy`] - Product label mapping
//! - [`resolver`] - Company-name entity resolution
//! - [`overrides`] - Human-curated company-name overrides
//! - [`units`] - Liters / kilograms / metric tons conversion
//! - [`quality`] - Outlier detection and quality scoring
//! - [`transform`] - Pipeline, deduplication and run report
//! - [`validation`] - JSON schema validation of reference and config files
//! - [`config`] - Tunable knobs
//! - [`logs`] - Run log

// Core modules
pub mod config;
pub mod error;
pub mod logs;
pub mod models;

// Input
pub mod parser;

// Reference data
pub mod overrides;
pub mod reference;
pub mod validation;

// Stages
pub mod quality;
pub mod resolver;
pub mod taxonomy;
pub mod units;

// Orchestration
pub mod transform;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    ConversionError,
    DropReason,
    ParseError,
    PipelineError,
    PipelineResult,
    RecordError,
    ReferenceError,
    RegistryError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    CanonicalCompany,
    CompanyType,
    DensitySource,
    Period,
    ProductRef,
    Provenance,
    QualityBreakdown,
    RawRecord,
    StandardizedRecord,
    UnitHint,
};

// =============================================================================
// Re-exports - Stages
// =============================================================================

pub use config::PipelineConfig;
pub use overrides::{OverrideRegistry, OverrideTable, StoredOverride};
pub use quality::{OutlierDetector, QualityScorer};
pub use reference::{DensityTable, ReferenceData, TaxonomyRule};
pub use resolver::{AmbiguousMatch, EntityResolver, ResolvedCompanies};
pub use taxonomy::{ProductMapping, TaxonomyMapper};
pub use units::{convert, Volumes};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{run_files, Pipeline, PipelineOutput, RunOptions};
pub use transform::report::{write_records_csv, DroppedRecord, RunReport, RunSummary};
pub use transform::dedup::{DedupKey, DuplicateAuditEntry};
