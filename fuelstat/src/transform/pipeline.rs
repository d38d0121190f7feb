//! High-level pipeline API: raw records in, canonical records and report out.
//!
//! Stages, in order:
//!
//! 1. **Resolve** the complete raw-name universe into canonical companies,
//!    including names on rows dropped later. Nothing downstream starts before
//!    this barrier.
//! 2. **Scan** every raw record once: junk company rows, unmapped product
//!    labels and invalid raw values are dropped and reported.
//! 3. **Convert** each record to liters, kilograms and metric tons with the
//!    product density.
//! 4. **Flag outliers** per `(company type, product)` cohort.
//! 5. **Score** each record.
//! 6. **Deduplicate** on `(company type, company, product, period)`.
//!
//! Per-record failures never abort a run; they end up in
//! [`RunReport::dropped`]. Only reference, config, registry and input
//! loading errors are fatal, and they surface before any record is touched.
//!
//! # Example
//!
//! ```rust,ignore
//! use fuelstat::transform::pipeline::{run_files, RunOptions};
//! use std::path::PathBuf;
//!
//! let options = RunOptions {
//!     inputs: vec![PathBuf::from("omc_2021.csv")],
//!     ..Default::default()
//! };
//! let output = run_files(&options)?;
//! println!("{} canonical records", output.records.len());
//! ```

use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{ConversionError, PipelineResult, RecordError};
use crate::logs::RunLog;
use crate::models::{
    CanonicalCompany, CompanyType, MappedRecord, Provenance, RawRecord, StandardizedRecord, UnitHint,
};
use crate::overrides::{OverrideRegistry, OverrideTable};
use crate::parser::{load_raw_records, RowError};
use crate::quality::{ConversionFacts, OutlierDetector, OutlierVerdict, QualityScorer};
use crate::reference::ReferenceData;
use crate::resolver::{EntityResolver, ResolvedCompanies};
use crate::taxonomy::{ProductMapping, TaxonomyMapper};
use crate::units::convert;

use super::dedup::{deduplicate, source_ranks};
use super::report::{DroppedRecord, RunReport, RunSummary};

/// Files and overrides for [`run_files`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Extractor exports, processed as one batch in the given order.
    pub inputs: Vec<PathBuf>,
    pub taxonomy: Option<PathBuf>,
    pub densities: Option<PathBuf>,
    pub overrides: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// Result of a complete run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    /// Canonical records, one per key, ordered by key.
    pub records: Vec<StandardizedRecord>,
    pub report: RunReport,
    /// Every canonical company built this run, including those whose records
    /// were all dropped later.
    pub companies: Vec<Arc<CanonicalCompany>>,
}

/// A record that survived the scan, waiting for conversion.
struct Scanned<'a> {
    sequence: usize,
    raw: &'a RawRecord,
    company: Arc<CanonicalCompany>,
    mapping: ProductMapping,
}

/// A converted record, waiting for its cohort's outlier verdicts.
struct Converted {
    mapped: MappedRecord,
    facts: ConversionFacts,
}

/// The standardization pipeline, bound to one set of reference data.
///
/// Holds only immutable snapshots; one `Pipeline` can run any number of
/// batches and every run derives its mappings from its own input.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    reference: ReferenceData,
    mapper: TaxonomyMapper,
    resolver: EntityResolver,
    detector: OutlierDetector,
    scorer: QualityScorer,
}

impl Pipeline {
    /// Validate config and reference data and build the stages.
    pub fn new(config: PipelineConfig, reference: ReferenceData, overrides: OverrideTable) -> PipelineResult<Self> {
        config.validate()?;
        reference.validate()?;
        Ok(Self {
            mapper: TaxonomyMapper::new(&reference.taxonomy),
            resolver: EntityResolver::new(config.similarity_threshold, overrides),
            detector: OutlierDetector::from_config(&config),
            scorer: QualityScorer::from_config(&config),
            config,
            reference,
        })
    }

    /// Default config, built-in reference tables, no overrides.
    pub fn with_defaults() -> PipelineResult<Self> {
        Self::new(PipelineConfig::default(), ReferenceData::builtin(), OverrideTable::empty())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    pub fn map_product(&self, raw_label: &str) -> ProductMapping {
        self.mapper.map_product(raw_label)
    }

    /// Resolve the company names of a batch without running the other stages.
    pub fn resolve_companies(&self, records: &[RawRecord]) -> ResolvedCompanies {
        self.resolver.resolve(
            records
                .iter()
                .map(|r| (r.company_type, r.raw_company_name.as_str())),
        )
    }

    /// Run every stage over one batch.
    pub fn run(&self, records: &[RawRecord]) -> PipelineOutput {
        let started_at = Utc::now();
        let mut log = RunLog::new();
        let mut dropped: Vec<DroppedRecord> = Vec::new();

        log.info(format!("📖 Standardizing {} raw records", records.len()));

        // Stage 1: resolve (barrier)
        log.info("🔗 Resolving company names...");
        let resolved = self.resolve_companies(records);
        log.success(format!(
            "{} raw names → {} canonical companies",
            resolved.raw_name_count(),
            resolved.companies().len()
        ));
        for ambiguity in resolved.ambiguities() {
            log.warning_indent(
                format!(
                    "Ambiguous: '{}' ({}) matched {} clusters, assigned to '{}'",
                    ambiguity.raw_name,
                    ambiguity.company_type,
                    ambiguity.candidates.len(),
                    ambiguity.chosen
                ),
                1,
            );
        }

        // Stage 2: scan
        let scanned = self.scan(records, &resolved, &mut dropped, &mut log);

        // Stage 3: convert
        log.info("⚖️  Converting units...");
        let converted = self.convert_all(scanned, &mut dropped, &mut log);
        let density_fallbacks = converted
            .iter()
            .filter(|c| c.facts.density_source.is_fallback())
            .count();
        if density_fallbacks > 0 {
            log.warning_indent(format!("{} records used a fallback density", density_fallbacks), 1);
        }

        // Stage 4: outliers
        log.info("📊 Detecting outliers per cohort...");
        let verdicts = self.detect_outliers(&converted, &mut log);
        let outliers_flagged = verdicts.iter().filter(|v| v.is_outlier).count();

        // Stage 5: score
        let standardized: Vec<StandardizedRecord> = converted
            .into_iter()
            .zip(verdicts)
            .map(|(c, verdict)| self.build_record(c, verdict))
            .collect();

        // Stage 6: deduplicate
        log.info("📦 Deduplicating...");
        let ranks = source_ranks(records.iter().map(|r| r.source_file.as_str()));
        let dedup = deduplicate(standardized, &ranks);
        if dedup.audit.is_empty() {
            log.success("No duplicate keys");
        } else {
            log.warning_indent(format!("{} duplicates discarded", dedup.audit.len()), 1);
        }

        let mut summary = RunSummary {
            records_in: records.len(),
            records_out: dedup.records.len(),
            outliers_flagged,
            duplicates_discarded: dedup.audit.len(),
            companies_before: resolved.raw_name_count(),
            products_before: scanned_label_count(records, &self.mapper),
            density_fallbacks,
            ambiguous_matches: resolved.ambiguities().len(),
            ..Default::default()
        };
        for entry in &dropped {
            *summary.dropped_by_reason.entry(entry.reason).or_default() += 1;
        }
        summary.companies_after = dedup
            .records
            .iter()
            .map(|r| (r.company.company_type, r.company.canonical_name.as_str()))
            .collect::<BTreeSet<_>>()
            .len();
        summary.products_after = dedup
            .records
            .iter()
            .map(|r| r.product.canonical_product.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        log.success(format!(
            "{} records in, {} out, {} dropped, {} outliers",
            summary.records_in,
            summary.records_out,
            summary.dropped(),
            summary.outliers_flagged
        ));

        let companies = resolved.companies().to_vec();
        let report = RunReport {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            summary,
            dropped,
            dedup_audit: dedup.audit,
            ambiguities: resolved.into_ambiguities(),
            input_errors: Vec::new(),
            log: log.into_entries(),
        };

        PipelineOutput { records: dedup.records, report, companies }
    }

    fn scan<'a>(
        &self,
        records: &'a [RawRecord],
        resolved: &ResolvedCompanies,
        dropped: &mut Vec<DroppedRecord>,
        log: &mut RunLog,
    ) -> Vec<Scanned<'a>> {
        let mut scanned = Vec::with_capacity(records.len());
        for (sequence, raw) in records.iter().enumerate() {
            match self.check(raw, resolved) {
                Ok((company, mapping)) => scanned.push(Scanned { sequence, raw, company, mapping }),
                Err(error) => dropped.push(DroppedRecord::new(sequence, raw, &error)),
            }
        }
        if dropped.is_empty() {
            log.success(format!("All {} records mapped", records.len()));
        } else {
            log.warning(format!("{} records dropped during scan", dropped.len()));
            let mut reasons: BTreeMap<String, usize> = BTreeMap::new();
            for entry in dropped.iter() {
                *reasons.entry(entry.reason.to_string()).or_default() += 1;
            }
            for (reason, count) in reasons {
                log.warning_indent(format!("• {}: {}", reason, count), 1);
            }
        }
        scanned
    }

    /// Per-record checks. A name the resolver set aside is junk.
    fn check(
        &self,
        raw: &RawRecord,
        resolved: &ResolvedCompanies,
    ) -> Result<(Arc<CanonicalCompany>, ProductMapping), RecordError> {
        let company = resolved
            .lookup(raw.company_type, &raw.raw_company_name)
            .cloned()
            .ok_or_else(|| RecordError::JunkCompany(raw.raw_company_name.clone()))?;
        let mapping = self.mapper.map_product(&raw.raw_product_label);
        if !mapping.is_mapped() {
            return Err(RecordError::UnmappedProduct(raw.raw_product_label.clone()));
        }
        if !(raw.raw_value.is_finite() && raw.raw_value >= 0.0) {
            return Err(ConversionError::InvalidValue(raw.raw_value).into());
        }
        Ok((company, mapping))
    }

    fn convert_all(
        &self,
        scanned: Vec<Scanned<'_>>,
        dropped: &mut Vec<DroppedRecord>,
        log: &mut RunLog,
    ) -> Vec<Converted> {
        let before = dropped.len();
        let mut converted = Vec::with_capacity(scanned.len());
        for item in scanned {
            match self.convert_one(&item) {
                Ok(c) => converted.push(c),
                Err(error) => dropped.push(DroppedRecord::new(item.sequence, item.raw, &error)),
            }
        }
        let failed = dropped.len() - before;
        if failed > 0 {
            log.warning_indent(format!("{} records failed conversion", failed), 1);
        }
        log.success(format!("Converted {} records", converted.len()));
        converted
    }

    fn convert_one(&self, item: &Scanned<'_>) -> Result<Converted, RecordError> {
        let raw = item.raw;

        let (product, default_unit) = match &item.mapping {
            ProductMapping::Mapped { product, default_unit, .. } => (product.clone(), *default_unit),
            ProductMapping::Unmapped => {
                return Err(RecordError::UnmappedProduct(raw.raw_product_label.clone()))
            }
        };

        let (unit, unit_inferred) = match raw.unit_hint {
            UnitHint::Unknown => match default_unit {
                Some(unit) if unit != UnitHint::Unknown => (unit, true),
                _ => return Err(ConversionError::InvalidUnit(UnitHint::Unknown.to_string()).into()),
            },
            declared => (declared, false),
        };

        let (density, density_source) = self
            .reference
            .densities
            .lookup(&product.canonical_product, &product.category);
        let volumes = convert(raw.raw_value, unit, density)?;

        Ok(Converted {
            mapped: MappedRecord {
                sequence: item.sequence,
                raw: raw.clone(),
                company: Arc::clone(&item.company),
                product,
                unit,
                unit_inferred,
            },
            facts: ConversionFacts { volumes, density, density_source },
        })
    }

    /// One verdict per converted record, computed per cohort.
    fn detect_outliers(&self, converted: &[Converted], log: &mut RunLog) -> Vec<OutlierVerdict> {
        let mut cohorts: BTreeMap<(CompanyType, &str), Vec<usize>> = BTreeMap::new();
        for (index, c) in converted.iter().enumerate() {
            let key = (c.mapped.company.company_type, c.mapped.product.canonical_product.as_str());
            cohorts.entry(key).or_default().push(index);
        }

        let mut verdicts: Vec<Option<OutlierVerdict>> = vec![None; converted.len()];
        for ((company_type, product), members) in cohorts {
            let values: Vec<f64> = members
                .iter()
                .map(|i| converted[*i].facts.volumes.liters)
                .collect();
            let result = self.detector.detect(&values);
            let flagged = result.outlier_count();
            if flagged > 0 {
                log.info_indent(
                    format!("{} / {}: {} of {} flagged", company_type, product, flagged, values.len()),
                    1,
                );
            }
            if let Some(stats) = result.stats {
                tracing::debug!(
                    cohort = %format!("{}/{}", company_type, product),
                    size = stats.size,
                    q1 = stats.q1,
                    q3 = stats.q3,
                    median = stats.median,
                    density_test = stats.density_test,
                    "cohort statistics"
                );
            }
            for (index, verdict) in members.into_iter().zip(result.verdicts) {
                verdicts[index] = Some(verdict);
            }
        }
        verdicts
            .into_iter()
            .map(|v| v.unwrap_or_else(OutlierVerdict::exempt))
            .collect()
    }

    fn build_record(&self, converted: Converted, verdict: OutlierVerdict) -> StandardizedRecord {
        let Converted { mapped, facts } = converted;
        let quality = self.scorer.score(&mapped, &facts, verdict.is_outlier);
        StandardizedRecord {
            record_id: StandardizedRecord::derive_id(&mapped),
            company: Arc::clone(&mapped.company),
            product: mapped.product.clone(),
            period: mapped.raw.period,
            volume_liters: facts.volumes.liters,
            volume_kg: facts.volumes.kg,
            volume_mt: facts.volumes.mt,
            unit_type_original: mapped.raw.unit_hint,
            density_kg_per_liter: facts.density,
            density_source: facts.density_source,
            quality_score: quality.score,
            quality,
            is_outlier: verdict.is_outlier,
            capped_volume_liters: verdict.capped_value,
            provenance: Provenance::from_raw(&mapped.raw, mapped.sequence),
        }
    }
}

/// Distinct raw product labels that map to a product.
fn scanned_label_count(records: &[RawRecord], mapper: &TaxonomyMapper) -> usize {
    records
        .iter()
        .map(|r| r.raw_product_label.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|label| mapper.map_product(label).is_mapped())
        .count()
}

/// Load everything from files and run one batch.
pub fn run_files(options: &RunOptions) -> PipelineResult<PipelineOutput> {
    let config = PipelineConfig::load(options.config.as_deref())?;
    let reference = ReferenceData::load(options.taxonomy.as_deref(), options.densities.as_deref())?;
    let overrides = match &options.overrides {
        Some(path) => OverrideRegistry::open(path)?.table(),
        None => OverrideTable::empty(),
    };
    tracing::info!(
        rules = reference.taxonomy.len(),
        overrides = overrides.len(),
        "reference data loaded"
    );

    let mut records: Vec<RawRecord> = Vec::new();
    let mut input_errors: Vec<RowError> = Vec::new();
    for path in &options.inputs {
        let parsed = load_raw_records(path)?;
        tracing::info!(
            path = %path.display(),
            records = parsed.records.len(),
            rejected = parsed.errors.len(),
            "input loaded"
        );
        records.extend(parsed.records);
        input_errors.extend(parsed.errors);
    }

    let pipeline = Pipeline::new(config, reference, overrides)?;
    let mut output = pipeline.run(&records);
    output.report.input_errors = input_errors;
    Ok(output)
}
