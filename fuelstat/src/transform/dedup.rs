//! Collapse standardized records sharing a key into one.
//!
//! # Architecture
//!
//! ```text
//! Standardized records               →  Canonical set + audit
//! ┌──────────────────────────────┐     ┌────────────────────────────────┐
//! │ GOIL / Gasoline / 2021-03 .9 │     │ GOIL / Gasoline / 2021-03 .9   │
//! │ GOIL / Gasoline / 2021-03 .7 │  →  │   supersedes: [id of .7]       │
//! │ GOIL / Gasoil   / 2021-03 .8 │     │ GOIL / Gasoil   / 2021-03 .8   │
//! └──────────────────────────────┘     ├────────────────────────────────┤
//!                                      │ audit: .7 discarded, score     │
//!                                      └────────────────────────────────┘
//! ```
//!
//! # Precedence
//!
//! Within a group the kept record is chosen by, in order:
//!
//! 1. higher quality score
//! 2. not an outlier
//! 3. later source file (order of first appearance in the input)
//! 4. later input position
//!
//! The last rule only exists so the choice is total and deterministic.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::models::{CompanyType, Period, Provenance, StandardizedRecord};

/// Grouping key. Canonical companies are scoped per type, so the type is part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DedupKey {
    pub company_type: CompanyType,
    pub company: String,
    pub product: String,
    pub period: Period,
}

impl DedupKey {
    pub fn of(record: &StandardizedRecord) -> Self {
        Self {
            company_type: record.company.company_type,
            company: record.company.canonical_name.clone(),
            product: record.product.canonical_product.clone(),
            period: record.period,
        }
    }
}

/// Which precedence rule separated the kept record from a discarded one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precedence {
    QualityScore,
    NonOutlier,
    SourceRecency,
    InputOrder,
}

/// A discarded duplicate, kept whole for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateAuditEntry {
    pub key: DedupKey,
    pub discarded: StandardizedRecord,
    pub kept_record_id: Uuid,
    pub kept_provenance: Provenance,
    pub decided_by: Precedence,
}

#[derive(Debug, Clone, Default)]
pub struct DedupResult {
    /// One record per key, ordered by key.
    pub records: Vec<StandardizedRecord>,
    pub audit: Vec<DuplicateAuditEntry>,
}

/// Ranks source files by first appearance; a higher rank is more recent.
pub fn source_ranks<'a, I>(source_files: I) -> HashMap<String, usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut ranks = HashMap::new();
    for file in source_files {
        let next = ranks.len();
        ranks.entry(file.to_string()).or_insert(next);
    }
    ranks
}

struct Ranker<'a> {
    source_rank: &'a HashMap<String, usize>,
}

impl Ranker<'_> {
    fn rank(&self, record: &StandardizedRecord) -> usize {
        self.source_rank
            .get(&record.provenance.source_file)
            .copied()
            .unwrap_or(0)
    }

    /// `Greater` means `a` is preferred, with the rule that decided it.
    fn compare(&self, a: &StandardizedRecord, b: &StandardizedRecord) -> (Ordering, Precedence) {
        let by_score = a.quality_score.total_cmp(&b.quality_score);
        if by_score != Ordering::Equal {
            return (by_score, Precedence::QualityScore);
        }
        let by_outlier = b.is_outlier.cmp(&a.is_outlier);
        if by_outlier != Ordering::Equal {
            return (by_outlier, Precedence::NonOutlier);
        }
        let by_source = self.rank(a).cmp(&self.rank(b));
        if by_source != Ordering::Equal {
            return (by_source, Precedence::SourceRecency);
        }
        (
            a.provenance.sequence.cmp(&b.provenance.sequence),
            Precedence::InputOrder,
        )
    }
}

/// Keep one record per [`DedupKey`].
pub fn deduplicate(records: Vec<StandardizedRecord>, source_rank: &HashMap<String, usize>) -> DedupResult {
    let mut groups: BTreeMap<DedupKey, Vec<StandardizedRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(DedupKey::of(&record)).or_default().push(record);
    }

    let ranker = Ranker { source_rank };
    let mut result = DedupResult::default();

    for (key, mut group) in groups {
        if group.len() == 1 {
            result.records.extend(group);
            continue;
        }

        let mut best = 0;
        for i in 1..group.len() {
            if ranker.compare(&group[i], &group[best]).0 == Ordering::Greater {
                best = i;
            }
        }
        let winner = group.swap_remove(best);
        let discarded_ids: Vec<Uuid> = group.iter().map(|r| r.record_id).collect();
        let kept = winner.superseding(discarded_ids);

        tracing::debug!(
            key = ?key,
            kept = %kept.record_id,
            discarded = group.len(),
            "duplicates collapsed"
        );

        // Keep audit entries in input order.
        group.sort_by_key(|r| r.provenance.sequence);
        for discarded in group {
            let (_, decided_by) = ranker.compare(&kept, &discarded);
            result.audit.push(DuplicateAuditEntry {
                key: key.clone(),
                discarded,
                kept_record_id: kept.record_id,
                kept_provenance: kept.provenance.clone(),
                decided_by,
            });
        }
        result.records.push(kept);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CanonicalCompany, DensitySource, ProductRef, QualityBreakdown, UnitHint,
    };
    use std::collections::{BTreeSet, HashSet};
    use std::sync::Arc;

    fn record(company: &str, product: &str, month: u32, score: f64, file: &str, sequence: usize) -> StandardizedRecord {
        let company = Arc::new(CanonicalCompany {
            canonical_name: company.to_string(),
            company_type: CompanyType::Omc,
            member_raw_names: BTreeSet::from([company.to_string()]),
        });
        StandardizedRecord {
            record_id: Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{file}-{sequence}").as_bytes()),
            company,
            product: ProductRef { canonical_product: product.to_string(), category: product.to_string() },
            period: Period::new(2021, month),
            volume_liters: 1000.0,
            volume_kg: 745.0,
            volume_mt: 0.745,
            unit_type_original: UnitHint::Volume,
            density_kg_per_liter: 0.745,
            density_source: DensitySource::Exact,
            quality_score: score,
            quality: QualityBreakdown {
                score,
                completeness: 1.0,
                consistency: 1.0,
                validity: 1.0,
                outlier: 1.0,
                penalties: Vec::new(),
            },
            is_outlier: false,
            capped_volume_liters: None,
            provenance: Provenance {
                source_file: file.to_string(),
                sheet_name: "OMC".to_string(),
                raw_company_name: "CompanyX".to_string(),
                raw_product_label: product.to_string(),
                raw_value: 1000.0,
                unit_hint: UnitHint::Volume,
                companion_value: None,
                sequence,
                supersedes: Vec::new(),
            },
        }
    }

    fn ranks() -> HashMap<String, usize> {
        source_ranks(["2021_a.csv", "2021_b.csv"])
    }

    #[test]
    fn test_higher_score_wins() {
        let low = record("CompanyX", "Gasoline", 3, 0.7, "2021_b.csv", 1);
        let high = record("CompanyX", "Gasoline", 3, 0.9, "2021_a.csv", 0);
        let low_id = low.record_id;

        let result = deduplicate(vec![low, high], &ranks());
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].quality_score, 0.9);
        assert_eq!(result.records[0].provenance.supersedes, vec![low_id]);

        assert_eq!(result.audit.len(), 1);
        assert_eq!(result.audit[0].discarded.record_id, low_id);
        assert_eq!(result.audit[0].kept_record_id, result.records[0].record_id);
        assert_eq!(result.audit[0].decided_by, Precedence::QualityScore);
    }

    #[test]
    fn test_non_outlier_breaks_score_tie() {
        let mut flagged = record("CompanyX", "Gasoline", 3, 0.8, "2021_b.csv", 1);
        flagged.is_outlier = true;
        let clean = record("CompanyX", "Gasoline", 3, 0.8, "2021_a.csv", 0);

        let result = deduplicate(vec![flagged, clean], &ranks());
        assert!(!result.records[0].is_outlier);
        assert_eq!(result.audit[0].decided_by, Precedence::NonOutlier);
    }

    #[test]
    fn test_later_source_then_later_row() {
        let older = record("CompanyX", "Gasoline", 3, 0.8, "2021_a.csv", 5);
        let newer = record("CompanyX", "Gasoline", 3, 0.8, "2021_b.csv", 2);
        let result = deduplicate(vec![older, newer], &ranks());
        assert_eq!(result.records[0].provenance.source_file, "2021_b.csv");
        assert_eq!(result.audit[0].decided_by, Precedence::SourceRecency);

        let first = record("CompanyX", "Gasoline", 3, 0.8, "2021_a.csv", 1);
        let second = record("CompanyX", "Gasoline", 3, 0.8, "2021_a.csv", 2);
        let result = deduplicate(vec![second, first], &ranks());
        assert_eq!(result.records[0].provenance.sequence, 2);
        assert_eq!(result.audit[0].decided_by, Precedence::InputOrder);
    }

    #[test]
    fn test_keys_unique_after_dedup() {
        let records = vec![
            record("CompanyX", "Gasoline", 3, 0.8, "2021_a.csv", 0),
            record("CompanyX", "Gasoline", 3, 0.6, "2021_a.csv", 1),
            record("CompanyX", "Gasoline", 3, 0.7, "2021_b.csv", 2),
            record("CompanyX", "Gasoil", 3, 0.8, "2021_a.csv", 3),
            record("CompanyX", "Gasoline", 4, 0.8, "2021_a.csv", 4),
            record("CompanyY", "Gasoline", 3, 0.8, "2021_a.csv", 5),
        ];
        let result = deduplicate(records, &ranks());

        assert_eq!(result.records.len(), 4);
        assert_eq!(result.audit.len(), 2);
        let keys: HashSet<DedupKey> = result.records.iter().map(DedupKey::of).collect();
        assert_eq!(keys.len(), result.records.len());
        // Nothing is lost: kept plus discarded equals the input.
        assert_eq!(result.records.len() + result.audit.len(), 6);
    }

    #[test]
    fn test_source_ranks_follow_first_appearance() {
        let ranks = source_ranks(["b.csv", "a.csv", "b.csv", "c.csv"]);
        assert_eq!(ranks["b.csv"], 0);
        assert_eq!(ranks["a.csv"], 1);
        assert_eq!(ranks["c.csv"], 2);
    }
}
