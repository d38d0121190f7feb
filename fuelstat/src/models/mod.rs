//! Domain models for the Fuelstat standardization pipeline.
//!
//! This module contains the core data structures that flow through the stages:
//!
//! - [`RawRecord`] - One row from the upstream extractor, never mutated
//! - [`CanonicalCompany`] - A cluster of raw company names for one real company
//! - [`ProductRef`] - Canonical product and category from the taxonomy
//! - [`MappedRecord`] - A raw record with company, product and unit resolved
//! - [`StandardizedRecord`] - The final, append-only canonical record
//! - [`Provenance`] - Raw values and source identifiers kept for audit

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

// =============================================================================
// Company Type
// =============================================================================

/// Licence class of a company. Entity resolution is scoped per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CompanyType {
    /// Bulk Distribution Company.
    #[serde(rename = "BDC")]
    Bdc,
    /// Oil Marketing Company.
    #[serde(rename = "OMC")]
    Omc,
}

impl CompanyType {
    /// Parse from a code string.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "BDC" | "BULK DISTRIBUTION COMPANY" => Some(Self::Bdc),
            "OMC" | "OIL MARKETING COMPANY" => Some(Self::Omc),
            _ => None,
        }
    }

    /// Infer from a sheet name: sheets mentioning BDC hold BDC rows, everything
    /// else is OMC data.
    pub fn infer_from_sheet(sheet_name: &str) -> Self {
        if sheet_name.to_uppercase().contains("BDC") {
            Self::Bdc
        } else {
            Self::Omc
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bdc => "BDC",
            Self::Omc => "OMC",
        }
    }
}

impl fmt::Display for CompanyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Unit Hint
// =============================================================================

/// Unit the source reported a value in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum UnitHint {
    /// Liters.
    Volume,
    /// Kilograms.
    Mass,
    /// Not stated by the source.
    #[default]
    Unknown,
}

impl UnitHint {
    /// Parse from a unit code as found in exports.
    pub fn from_code(code: &str) -> Option<Self> {
        let normalized = code.trim().to_uppercase();
        match normalized.as_str() {
            "VOLUME" | "L" | "LT" | "LTR" | "LTRS" | "LITER" | "LITERS" | "LITRE" | "LITRES" => {
                Some(Self::Volume)
            }
            "MASS" | "KG" | "KGS" | "KILOGRAM" | "KILOGRAMS" => Some(Self::Mass),
            "UNKNOWN" | "" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Volume => "VOLUME",
            Self::Mass => "MASS",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for UnitHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Period
// =============================================================================

/// Reporting month.
///
/// Not validated on construction: out-of-range months and years are kept and
/// penalised by the quality scorer instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// Parse `YYYY-MM` or `YYYY/MM`.
    pub fn parse(text: &str) -> Option<Self> {
        let (year, month) = text.trim().split_once(['-', '/'])?;
        Some(Self::new(year.trim().parse().ok()?, month.trim().parse().ok()?))
    }

    pub fn has_valid_month(&self) -> bool {
        (1..=12).contains(&self.month)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

// =============================================================================
// Raw Record (input)
// =============================================================================

/// One observation as produced by the upstream extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub source_file: String,
    pub sheet_name: String,
    pub period: Period,
    pub company_type: CompanyType,
    pub raw_company_name: String,
    pub raw_product_label: String,
    pub raw_value: f64,
    #[serde(default)]
    pub unit_hint: UnitHint,
    /// The other-unit measurement, when the export carried both volume and mass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companion_value: Option<f64>,
}

// =============================================================================
// Canonical Company
// =============================================================================

/// A cluster of raw spellings that refer to one real company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalCompany {
    pub canonical_name: String,
    pub company_type: CompanyType,
    pub member_raw_names: BTreeSet<String>,
}

// =============================================================================
// Product
// =============================================================================

/// Canonical product and category assigned by the taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductRef {
    pub canonical_product: String,
    pub category: String,
}

/// Which level of the density table supplied the density.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DensitySource {
    /// Exact canonical product match.
    Exact,
    /// Category-level default.
    Category,
    /// Global `DEFAULT` density.
    Global,
}

impl DensitySource {
    pub fn is_fallback(&self) -> bool {
        !matches!(self, Self::Exact)
    }
}

// =============================================================================
// Mapped Record (intermediate)
// =============================================================================

/// A raw record with company, product and measurement unit resolved.
#[derive(Debug, Clone)]
pub struct MappedRecord {
    /// Position in the input stream.
    pub sequence: usize,
    pub raw: RawRecord,
    pub company: Arc<CanonicalCompany>,
    pub product: ProductRef,
    /// Either `Volume` or `Mass`.
    pub unit: UnitHint,
    /// The unit came from the taxonomy rule rather than the source.
    pub unit_inferred: bool,
}

// =============================================================================
// Quality
// =============================================================================

/// A reason a sub-score was reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Penalty {
    MissingVolume,
    UnitInferred,
    NonPositiveVolume,
    DensityMismatch,
    YearOutOfRange,
    MonthOutOfRange,
    DensityFallbackCategory,
    DensityFallbackGlobal,
    Outlier,
}

/// Composite quality score with its sub-scores, each in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityBreakdown {
    pub score: f64,
    pub completeness: f64,
    pub consistency: f64,
    pub validity: f64,
    pub outlier: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub penalties: Vec<Penalty>,
}

// =============================================================================
// Standardized Record (output)
// =============================================================================

/// Raw values and source identifiers kept next to the canonical values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source_file: String,
    pub sheet_name: String,
    pub raw_company_name: String,
    pub raw_product_label: String,
    pub raw_value: f64,
    pub unit_hint: UnitHint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companion_value: Option<f64>,
    /// Position in the input stream.
    pub sequence: usize,
    /// Records this one replaced during deduplication.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supersedes: Vec<Uuid>,
}

impl Provenance {
    pub fn from_raw(raw: &RawRecord, sequence: usize) -> Self {
        Self {
            source_file: raw.source_file.clone(),
            sheet_name: raw.sheet_name.clone(),
            raw_company_name: raw.raw_company_name.clone(),
            raw_product_label: raw.raw_product_label.clone(),
            raw_value: raw.raw_value,
            unit_hint: raw.unit_hint,
            companion_value: raw.companion_value,
            sequence,
            supersedes: Vec::new(),
        }
    }
}

/// A canonical, unit-consistent, scored record.
///
/// Never mutated once built. Deduplication emits a new value via
/// [`StandardizedRecord::superseding`] instead of editing the winner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizedRecord {
    pub record_id: Uuid,
    pub company: Arc<CanonicalCompany>,
    pub product: ProductRef,
    pub period: Period,
    pub volume_liters: f64,
    pub volume_kg: f64,
    pub volume_mt: f64,
    pub unit_type_original: UnitHint,
    pub density_kg_per_liter: f64,
    pub density_source: DensitySource,
    pub quality_score: f64,
    pub quality: QualityBreakdown,
    pub is_outlier: bool,
    /// Volume clamped to the cohort's IQR fences, for aggregation consumers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capped_volume_liters: Option<f64>,
    pub provenance: Provenance,
}

impl StandardizedRecord {
    /// Deterministic identity derived from the record's origin and raw content.
    pub fn derive_id(mapped: &MappedRecord) -> Uuid {
        let raw = &mapped.raw;
        let key = format!(
            "{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}",
            raw.source_file,
            raw.sheet_name,
            mapped.sequence,
            raw.company_type,
            raw.raw_company_name,
            raw.raw_product_label,
            raw.period,
            raw.raw_value,
        );
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
    }

    /// A copy of this record marked as replacing `discarded`.
    pub fn superseding(&self, discarded: Vec<Uuid>) -> Self {
        let mut next = self.clone();
        next.provenance.supersedes = discarded;
        next
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_company_type_codes() {
        assert_eq!(CompanyType::from_code("bdc"), Some(CompanyType::Bdc));
        assert_eq!(CompanyType::from_code(" OMC "), Some(CompanyType::Omc));
        assert_eq!(CompanyType::from_code("LPGMC"), None);
        assert_eq!(CompanyType::infer_from_sheet("BDC Sales 2021"), CompanyType::Bdc);
        assert_eq!(CompanyType::infer_from_sheet("OMC Sales"), CompanyType::Omc);
    }

    #[test]
    fn test_unit_hint_codes() {
        assert_eq!(UnitHint::from_code("Litres"), Some(UnitHint::Volume));
        assert_eq!(UnitHint::from_code("kg"), Some(UnitHint::Mass));
        assert_eq!(UnitHint::from_code(""), Some(UnitHint::Unknown));
        assert_eq!(UnitHint::from_code("barrels"), None);
    }

    #[test]
    fn test_period_parse_and_display() {
        let period = Period::parse("2021-03").unwrap();
        assert_eq!(period, Period::new(2021, 3));
        assert_eq!(period.to_string(), "2021-03");
        assert!(period.has_valid_month());
        assert!(!Period::new(2021, 13).has_valid_month());
        assert!(Period::parse("March 2021").is_none());
    }

    #[test]
    fn test_raw_record_json_shape() {
        let json = serde_json::json!({
            "source_file": "omc_2021.xlsx",
            "sheet_name": "OMC",
            "period": { "year": 2021, "month": 3 },
            "company_type": "OMC",
            "raw_company_name": "GOIL PLC",
            "raw_product_label": "Gasoil",
            "raw_value": 1200.5,
            "unit_hint": "VOLUME"
        });
        let record: RawRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.company_type, CompanyType::Omc);
        assert_eq!(record.unit_hint, UnitHint::Volume);
        assert!(record.companion_value.is_none());
    }
}
