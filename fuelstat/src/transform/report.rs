//! Run report and output artifacts.
//!
//! A run produces the canonical record set plus:
//! - a dropped-record report (raw record and reason),
//! - a deduplication audit log,
//! - an ambiguity log for human review,
//! - a summary operators can use to judge whether canonicalisation collapsed
//!   distinct entities or left duplicates behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use uuid::Uuid;

use crate::error::{DropReason, RecordError};
use crate::logs::LogEntry;
use crate::models::{RawRecord, StandardizedRecord};
use crate::parser::RowError;
use crate::resolver::AmbiguousMatch;

use super::dedup::DuplicateAuditEntry;

/// A raw record that did not make it into the canonical set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedRecord {
    /// Position in the input stream.
    pub sequence: usize,
    pub reason: DropReason,
    pub detail: String,
    pub raw: RawRecord,
}

impl DroppedRecord {
    pub fn new(sequence: usize, raw: &RawRecord, error: &RecordError) -> Self {
        Self {
            sequence,
            reason: error.reason(),
            detail: error.to_string(),
            raw: raw.clone(),
        }
    }
}

/// Counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub records_in: usize,
    pub records_out: usize,
    pub dropped_by_reason: BTreeMap<DropReason, usize>,
    pub outliers_flagged: usize,
    pub duplicates_discarded: usize,
    /// Distinct raw company names (junk excluded).
    pub companies_before: usize,
    /// Canonical companies referenced by output records.
    pub companies_after: usize,
    /// Distinct raw product labels that mapped to a product.
    pub products_before: usize,
    /// Canonical products referenced by output records.
    pub products_after: usize,
    pub density_fallbacks: usize,
    pub ambiguous_matches: usize,
}

impl RunSummary {
    pub fn dropped(&self) -> usize {
        self.dropped_by_reason.values().sum()
    }
}

/// Everything a run reports besides the canonical records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: RunSummary,
    pub dropped: Vec<DroppedRecord>,
    pub dedup_audit: Vec<DuplicateAuditEntry>,
    pub ambiguities: Vec<AmbiguousMatch>,
    /// Input rows the parser could not read.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_errors: Vec<RowError>,
    pub log: Vec<LogEntry>,
}

impl RunReport {
    pub fn status(&self) -> &'static str {
        if self.summary.records_out == 0 && self.summary.records_in > 0 {
            "error"
        } else if self.summary.dropped() > 0 || !self.ambiguities.is_empty() || !self.input_errors.is_empty() {
            "warning"
        } else {
            "ready"
        }
    }
}

/// Flat row for the warehouse loader.
#[derive(Debug, Serialize)]
struct FlatRecord<'a> {
    record_id: Uuid,
    company_type: &'a str,
    company: &'a str,
    product: &'a str,
    category: &'a str,
    period: String,
    volume_liters: f64,
    volume_kg: f64,
    volume_mt: f64,
    unit_type_original: &'a str,
    density_kg_per_liter: f64,
    quality_score: f64,
    is_outlier: bool,
    capped_volume_liters: Option<f64>,
    source_file: &'a str,
    sheet_name: &'a str,
    raw_company_name: &'a str,
    raw_product_label: &'a str,
    raw_value: f64,
    supersedes: String,
}

impl<'a> From<&'a StandardizedRecord> for FlatRecord<'a> {
    fn from(r: &'a StandardizedRecord) -> Self {
        Self {
            record_id: r.record_id,
            company_type: r.company.company_type.as_str(),
            company: &r.company.canonical_name,
            product: &r.product.canonical_product,
            category: &r.product.category,
            period: r.period.to_string(),
            volume_liters: r.volume_liters,
            volume_kg: r.volume_kg,
            volume_mt: r.volume_mt,
            unit_type_original: r.unit_type_original.as_str(),
            density_kg_per_liter: r.density_kg_per_liter,
            quality_score: r.quality_score,
            is_outlier: r.is_outlier,
            capped_volume_liters: r.capped_volume_liters,
            source_file: &r.provenance.source_file,
            sheet_name: &r.provenance.sheet_name,
            raw_company_name: &r.provenance.raw_company_name,
            raw_product_label: &r.provenance.raw_product_label,
            raw_value: r.provenance.raw_value,
            supersedes: r
                .provenance
                .supersedes
                .iter()
                .map(Uuid::to_string)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// Write canonical records as CSV.
pub fn write_records_csv<W: Write>(records: &[StandardizedRecord], writer: W) -> Result<(), csv::Error> {
    let mut csv = csv::Writer::from_writer(writer);
    for record in records {
        csv.serialize(FlatRecord::from(record))?;
    }
    csv.flush()?;
    Ok(())
}
