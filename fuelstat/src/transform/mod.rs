//! Transformation module.
//!
//! This module turns raw records into the canonical record set:
//! - Pipeline: stage orchestration
//! - Dedup: one record per company, product and period
//! - Report: dropped records, summary and output writers

pub mod dedup;
pub mod pipeline;
pub mod report;

pub use dedup::{deduplicate, source_ranks, DedupKey, DedupResult, DuplicateAuditEntry, Precedence};
pub use pipeline::*;
pub use report::{write_records_csv, DroppedRecord, RunReport, RunSummary};
