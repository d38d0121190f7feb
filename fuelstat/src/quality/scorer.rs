//! Composite quality score.
//!
//! ```text
//! score = w_c · completeness + w_k · consistency + w_v · validity + w_o · outlier
//! ```
//!
//! Sub-scores:
//!
//! - **completeness**: share of six expected facts present (liters, kg and mt
//!   finite, company resolved, product resolved, unit declared by the source).
//! - **consistency**: −0.5 when the source claims activity but a converted
//!   volume is not positive; −0.5 when the companion measurement implies a
//!   density more than `density_tolerance` away from the reference density.
//! - **validity**: −0.5 for a year outside the configured range, −0.5 for a
//!   month outside 1–12, −0.25 for a category density, −0.5 for the global one.
//! - **outlier**: 0 for a flagged outlier, 1 otherwise.
//!
//! The score is advisory and never drops a record.

use crate::config::{PipelineConfig, QualityWeights, YearRange};
use crate::models::{DensitySource, MappedRecord, Penalty, QualityBreakdown, UnitHint};
use crate::units::Volumes;

const COMPLETENESS_CHECKS: f64 = 6.0;

/// Conversion facts the scorer needs besides the mapped record.
#[derive(Debug, Clone, Copy)]
pub struct ConversionFacts {
    pub volumes: Volumes,
    pub density: f64,
    pub density_source: DensitySource,
}

#[derive(Debug, Clone)]
pub struct QualityScorer {
    weights: QualityWeights,
    valid_years: YearRange,
    density_tolerance: f64,
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl QualityScorer {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            weights: config.weights,
            valid_years: config.valid_years,
            density_tolerance: config.density_tolerance,
        }
    }

    pub fn score(&self, record: &MappedRecord, facts: &ConversionFacts, is_outlier: bool) -> QualityBreakdown {
        let mut penalties = Vec::new();
        let completeness = self.completeness(record, facts, &mut penalties);
        let consistency = self.consistency(record, facts, &mut penalties);
        let validity = self.validity(record, facts, &mut penalties);
        let outlier = if is_outlier {
            penalties.push(Penalty::Outlier);
            0.0
        } else {
            1.0
        };

        let w = &self.weights;
        let raw = w.completeness * completeness
            + w.consistency * consistency
            + w.validity * validity
            + w.outlier * outlier;
        let score = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) };

        QualityBreakdown { score, completeness, consistency, validity, outlier, penalties }
    }

    fn completeness(&self, record: &MappedRecord, facts: &ConversionFacts, penalties: &mut Vec<Penalty>) -> f64 {
        let v = &facts.volumes;
        let volumes_present = [v.liters, v.kg, v.mt].iter().filter(|x| x.is_finite()).count();
        if volumes_present < 3 {
            penalties.push(Penalty::MissingVolume);
        }
        let company = !record.company.canonical_name.is_empty();
        let product = !record.product.canonical_product.is_empty();
        let unit_declared = !record.unit_inferred;
        if !unit_declared {
            penalties.push(Penalty::UnitInferred);
        }
        let present = volumes_present + company as usize + product as usize + unit_declared as usize;
        present as f64 / COMPLETENESS_CHECKS
    }

    fn consistency(&self, record: &MappedRecord, facts: &ConversionFacts, penalties: &mut Vec<Penalty>) -> f64 {
        let mut score: f64 = 1.0;
        let raw_value = record.raw.raw_value;
        let v = &facts.volumes;

        if raw_value > 0.0 && !(v.liters > 0.0 && v.kg > 0.0 && v.mt > 0.0) {
            penalties.push(Penalty::NonPositiveVolume);
            score -= 0.5;
        }

        if let Some(implied) = implied_density(raw_value, record.raw.companion_value, record.unit) {
            let deviation = (implied - facts.density).abs() / facts.density;
            if deviation > self.density_tolerance {
                penalties.push(Penalty::DensityMismatch);
                score -= 0.5;
            }
        }
        score.max(0.0)
    }

    fn validity(&self, record: &MappedRecord, facts: &ConversionFacts, penalties: &mut Vec<Penalty>) -> f64 {
        let mut score: f64 = 1.0;
        let period = &record.raw.period;
        if !self.valid_years.contains(period.year) {
            penalties.push(Penalty::YearOutOfRange);
            score -= 0.5;
        }
        if !period.has_valid_month() {
            penalties.push(Penalty::MonthOutOfRange);
            score -= 0.5;
        }
        match facts.density_source {
            DensitySource::Exact => {}
            DensitySource::Category => {
                penalties.push(Penalty::DensityFallbackCategory);
                score -= 0.25;
            }
            DensitySource::Global => {
                penalties.push(Penalty::DensityFallbackGlobal);
                score -= 0.5;
            }
        }
        score.max(0.0)
    }
}

/// kg per liter implied by a value and its companion in the other unit.
fn implied_density(value: f64, companion: Option<f64>, unit: UnitHint) -> Option<f64> {
    let companion = companion.filter(|c| c.is_finite() && *c > 0.0)?;
    if !(value.is_finite() && value > 0.0) {
        return None;
    }
    match unit {
        UnitHint::Volume => Some(companion / value),
        UnitHint::Mass => Some(value / companion),
        UnitHint::Unknown => None,
    }
}
