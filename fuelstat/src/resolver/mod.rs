//! Entity resolver: clusters raw company spellings into canonical companies.
//!
//! Resolution is a batch step over the complete raw-name universe of a run,
//! scoped per [`CompanyType`]:
//!
//! 1. Names with an override are assigned to a cluster seeded from the forced
//!    canonical name. Seeded clusters are created first, ordered by name.
//! 2. Junk names (header and total rows) without an override are set aside.
//! 3. Remaining normalised names are visited in lexicographic order. Each is
//!    compared to the anchor of every existing cluster with
//!    [`similarity::combined_score`]. No match creates a new cluster anchored
//!    on the name; one match joins it; several matches pick the highest score,
//!    then the earliest cluster, and are logged as an [`AmbiguousMatch`].
//!
//! A cluster's canonical name is its forced name if seeded, otherwise its
//! shortest cleaned member (ties broken lexicographically). The outcome only
//! depends on the set of names, not on the order they were observed in.

pub mod normalize;
pub mod similarity;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::models::{CanonicalCompany, CompanyType};
use crate::overrides::OverrideTable;

use normalize::{clean_name, is_junk_name, normalize_name};
use similarity::combined_score;

/// A cluster a name could have joined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub canonical_name: String,
    pub score: f64,
}

/// A name that cleared the threshold against more than one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbiguousMatch {
    /// First raw spelling (lexicographically) with this normalised form.
    pub raw_name: String,
    pub normalized: String,
    pub company_type: CompanyType,
    /// Canonical name of the cluster the name was assigned to.
    pub chosen: String,
    /// All qualifying clusters, best first.
    pub candidates: Vec<MatchCandidate>,
}

#[derive(Debug)]
struct Cluster {
    anchor: String,
    forced_name: Option<String>,
    members: BTreeSet<String>,
}

impl Cluster {
    fn new(anchor: String, forced_name: Option<String>) -> Self {
        Self { anchor, forced_name, members: BTreeSet::new() }
    }

    fn canonical_name(&self) -> String {
        if let Some(name) = &self.forced_name {
            return name.clone();
        }
        self.members
            .iter()
            .map(|raw| clean_name(raw))
            .min_by(|a, b| a.chars().count().cmp(&b.chars().count()).then_with(|| a.cmp(b)))
            .unwrap_or_else(|| self.anchor.clone())
    }
}

/// Outcome of resolving one run's company names.
#[derive(Debug, Clone, Default)]
pub struct ResolvedCompanies {
    by_raw: BTreeMap<(CompanyType, String), Arc<CanonicalCompany>>,
    companies: Vec<Arc<CanonicalCompany>>,
    ambiguities: Vec<AmbiguousMatch>,
    raw_name_count: usize,
}

impl ResolvedCompanies {
    /// Canonical company for a raw name, or `None` for junk or unseen names.
    pub fn lookup(&self, company_type: CompanyType, raw_name: &str) -> Option<&Arc<CanonicalCompany>> {
        self.by_raw.get(&(company_type, raw_name.to_string()))
    }

    /// All canonical companies, ordered by type then name.
    pub fn companies(&self) -> &[Arc<CanonicalCompany>] {
        &self.companies
    }

    pub fn ambiguities(&self) -> &[AmbiguousMatch] {
        &self.ambiguities
    }

    pub fn into_ambiguities(self) -> Vec<AmbiguousMatch> {
        self.ambiguities
    }

    /// Distinct raw names resolved (junk excluded).
    pub fn raw_name_count(&self) -> usize {
        self.raw_name_count
    }
}

/// Clusters company names against a fixed similarity threshold and override table.
#[derive(Debug, Clone)]
pub struct EntityResolver {
    threshold: f64,
    overrides: OverrideTable,
}

impl EntityResolver {
    pub fn new(threshold: f64, overrides: OverrideTable) -> Self {
        Self { threshold, overrides }
    }

    /// Junk unless an override claims the name.
    fn is_junk(&self, company_type: CompanyType, raw_name: &str) -> bool {
        self.overrides.lookup(company_type, raw_name).is_none() && is_junk_name(raw_name)
    }

    /// Resolve every distinct `(type, raw name)` pair.
    pub fn resolve<'a, I>(&self, names: I) -> ResolvedCompanies
    where
        I: IntoIterator<Item = (CompanyType, &'a str)>,
    {
        let mut partitions: BTreeMap<CompanyType, BTreeSet<String>> = BTreeMap::new();
        for (company_type, raw) in names {
            partitions.entry(company_type).or_default().insert(raw.to_string());
        }

        let mut resolved = ResolvedCompanies::default();
        for (company_type, raw_names) in partitions {
            self.resolve_partition(company_type, raw_names, &mut resolved);
        }
        resolved
    }

    fn resolve_partition(
        &self,
        company_type: CompanyType,
        raw_names: BTreeSet<String>,
        resolved: &mut ResolvedCompanies,
    ) {
        let mut clusters: Vec<Cluster> = Vec::new();
        let mut forced: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut by_normalized: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for raw in raw_names {
            if self.is_junk(company_type, &raw) {
                tracing::debug!(company_type = %company_type, name = %raw, "junk company name");
                continue;
            }
            resolved.raw_name_count += 1;
            match self.overrides.lookup(company_type, &raw) {
                Some(name) => {
                    forced.entry(name.to_string()).or_default().insert(raw);
                }
                None => {
                    by_normalized.entry(normalize_name(&raw)).or_default().insert(raw);
                }
            }
        }

        for (name, members) in forced {
            let mut cluster = Cluster::new(normalize_name(&name), Some(name));
            cluster.members = members;
            clusters.push(cluster);
        }

        // Ambiguities keep a cluster index until canonical names are final.
        let mut pending: Vec<(String, String, usize, Vec<(usize, f64)>)> = Vec::new();

        for (normalized, members) in by_normalized {
            let mut candidates: Vec<(usize, f64)> = clusters
                .iter()
                .enumerate()
                .map(|(i, c)| (i, combined_score(&normalized, &c.anchor)))
                .filter(|(_, score)| *score >= self.threshold)
                .collect();
            // Highest score first; stable sort keeps creation order among ties.
            candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

            match candidates.first() {
                None => {
                    let mut cluster = Cluster::new(normalized, None);
                    cluster.members = members;
                    clusters.push(cluster);
                }
                Some(&(index, _)) => {
                    if candidates.len() > 1 {
                        let first_raw = members.iter().next().cloned().unwrap_or_default();
                        pending.push((first_raw, normalized, index, candidates.clone()));
                    }
                    clusters[index].members.extend(members);
                }
            }
        }

        let names: Vec<String> = clusters.iter().map(Cluster::canonical_name).collect();

        for (raw_name, normalized, index, candidates) in pending {
            let ambiguity = AmbiguousMatch {
                raw_name,
                normalized,
                company_type,
                chosen: names[index].clone(),
                candidates: candidates
                    .into_iter()
                    .map(|(i, score)| MatchCandidate { canonical_name: names[i].clone(), score })
                    .collect(),
            };
            tracing::warn!(
                company_type = %company_type,
                name = %ambiguity.raw_name,
                chosen = %ambiguity.chosen,
                candidates = ambiguity.candidates.len(),
                "ambiguous cluster membership"
            );
            resolved.ambiguities.push(ambiguity);
        }

        let mut companies: Vec<Arc<CanonicalCompany>> = Vec::with_capacity(clusters.len());
        for (cluster, canonical_name) in clusters.into_iter().zip(names) {
            let company = Arc::new(CanonicalCompany {
                canonical_name,
                company_type,
                member_raw_names: cluster.members,
            });
            for raw in &company.member_raw_names {
                resolved.by_raw.insert((company_type, raw.clone()), Arc::clone(&company));
            }
            companies.push(company);
        }
        companies.sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));
        resolved.companies.extend(companies);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overrides::StoredOverride;

    fn resolver() -> EntityResolver {
        EntityResolver::new(0.85, OverrideTable::empty())
    }

    #[test]
    fn test_goil_variants_collapse() {
        let names = ["GOIL COMPANY LIMITED", "Goil Company Ltd", "GOIL PLC"];
        let resolved = resolver().resolve(names.iter().map(|n| (CompanyType::Omc, *n)));

        assert_eq!(resolved.companies().len(), 1);
        let company = resolved.lookup(CompanyType::Omc, "Goil Company Ltd").unwrap();
        assert_eq!(company.canonical_name, "GOIL PLC");
        assert_eq!(company.member_raw_names.len(), 3);
    }

    #[test]
    fn test_partitions_are_separate_namespaces() {
        let names = [(CompanyType::Bdc, "STAR OIL"), (CompanyType::Omc, "STAR OIL")];
        let resolved = resolver().resolve(names);
        assert_eq!(resolved.companies().len(), 2);
        let bdc = resolved.lookup(CompanyType::Bdc, "STAR OIL").unwrap();
        let omc = resolved.lookup(CompanyType::Omc, "STAR OIL").unwrap();
        assert!(!Arc::ptr_eq(bdc, omc));
    }

    #[test]
    fn test_distinct_companies_stay_apart() {
        let names = ["PUMA ENERGY", "STAR OIL", "ZEN PETROLEUM", "GOIL"];
        let resolved = resolver().resolve(names.iter().map(|n| (CompanyType::Omc, *n)));
        assert_eq!(resolved.companies().len(), 4);
        assert!(resolved.ambiguities().is_empty());
    }

    #[test]
    fn test_junk_names_excluded() {
        let names = ["TOTAL", "Grand Total", "GOIL", "12"];
        let resolved = resolver().resolve(names.iter().map(|n| (CompanyType::Omc, *n)));
        assert_eq!(resolved.companies().len(), 1);
        assert!(resolved.lookup(CompanyType::Omc, "TOTAL").is_none());
        assert!(resolved.lookup(CompanyType::Omc, "12").is_none());
        assert_eq!(resolved.raw_name_count(), 1);
    }

    #[test]
    fn test_override_rescues_junk_looking_name() {
        let overrides = OverrideTable::from_entries(&[StoredOverride::new(
            "TOTAL",
            "TOTALENERGIES MARKETING",
            Some(CompanyType::Omc),
        )]);
        let resolver = EntityResolver::new(0.85, overrides);
        let names = ["TOTAL", "Grand Total"];
        let resolved = resolver.resolve(names.iter().map(|n| (CompanyType::Omc, *n)));

        let company = resolved.lookup(CompanyType::Omc, "TOTAL").unwrap();
        assert_eq!(company.canonical_name, "TOTALENERGIES MARKETING");
        assert!(resolved.lookup(CompanyType::Omc, "Grand Total").is_none());
        // The override is type-scoped.
        let bdc = resolver.resolve([(CompanyType::Bdc, "TOTAL")]);
        assert!(bdc.lookup(CompanyType::Bdc, "TOTAL").is_none());
    }

    #[test]
    fn test_resolution_is_order_independent() {
        let names = vec!["STAR OIL GH", "STAR OIL", "Star Oil Co. Ltd", "PUMA", "PUMA ENERGY"];
        let forward = resolver().resolve(names.iter().map(|n| (CompanyType::Omc, *n)));
        let backward = resolver().resolve(names.iter().rev().map(|n| (CompanyType::Omc, *n)));

        for name in &names {
            assert_eq!(
                forward.lookup(CompanyType::Omc, name).unwrap().canonical_name,
                backward.lookup(CompanyType::Omc, name).unwrap().canonical_name
            );
        }
    }

    #[test]
    fn test_every_raw_name_maps_to_one_company() {
        let names = ["GOIL", "GOIL PLC", "G OIL", "STAR OIL", "STAR OIL GH", "STAR OILS"];
        let resolved = resolver().resolve(names.iter().map(|n| (CompanyType::Omc, *n)));
        for name in names {
            let owners = resolved
                .companies()
                .iter()
                .filter(|c| c.member_raw_names.contains(name))
                .count();
            assert_eq!(owners, 1, "{name}");
        }
    }

    #[test]
    fn test_override_wins_over_similarity() {
        let overrides = OverrideTable::from_entries(&[StoredOverride::new(
            "Blue Ocean",
            "BLUE OCEAN INVESTMENTS",
            Some(CompanyType::Omc),
        )]);
        let resolver = EntityResolver::new(0.85, overrides);
        let names = ["BLUE OCEAN LTD", "Blue Ocean Investments Ltd", "BLUE OCEANS"];
        let resolved = resolver.resolve(names.iter().map(|n| (CompanyType::Omc, *n)));

        let forced = resolved.lookup(CompanyType::Omc, "BLUE OCEAN LTD").unwrap();
        assert_eq!(forced.canonical_name, "BLUE OCEAN INVESTMENTS");
        // Similar spellings join the seeded cluster through its anchor.
        let joined = resolved.lookup(CompanyType::Omc, "Blue Ocean Investments Ltd").unwrap();
        assert!(Arc::ptr_eq(forced, joined));
    }

    #[test]
    fn test_ambiguous_membership_is_logged() {
        // "AX" scores 0.5 against both seeded anchors; the tie goes to the
        // first cluster created.
        let overrides = OverrideTable::from_entries(&[
            StoredOverride::new("AB", "AB", None),
            StoredOverride::new("AC", "AC", None),
        ]);
        let resolver = EntityResolver::new(0.3, overrides);
        let resolved = resolver.resolve(
            ["AB", "AC", "AX"].iter().map(|n| (CompanyType::Bdc, *n)),
        );

        let ambiguity = &resolved.ambiguities()[0];
        assert_eq!(ambiguity.raw_name, "AX");
        assert_eq!(ambiguity.candidates.len(), 2);
        assert_eq!(ambiguity.chosen, "AB");
        assert_eq!(
            resolved.lookup(CompanyType::Bdc, "AX").unwrap().canonical_name,
            "AB"
        );
    }

    #[test]
    fn test_ambiguous_membership_prefers_higher_score() {
        // "ABYY" scores 0.5 against the first seeded anchor and 0.75 against
        // the second; the higher score wins over creation order.
        let overrides = OverrideTable::from_entries(&[
            StoredOverride::new("ABXX", "ABXX", None),
            StoredOverride::new("ABYZ", "ABYZ", None),
        ]);
        let resolver = EntityResolver::new(0.4, overrides);
        let resolved = resolver.resolve(
            ["ABXX", "ABYZ", "ABYY"].iter().map(|n| (CompanyType::Omc, *n)),
        );

        let ambiguity = &resolved.ambiguities()[0];
        assert_eq!(ambiguity.raw_name, "ABYY");
        assert_eq!(ambiguity.chosen, "ABYZ");
        assert_eq!(ambiguity.candidates[0].canonical_name, "ABYZ");
        assert!((ambiguity.candidates[0].score - 0.75).abs() < 1e-12);
        assert!((ambiguity.candidates[1].score - 0.5).abs() < 1e-12);
        assert_eq!(
            resolved.lookup(CompanyType::Omc, "ABYY").unwrap().canonical_name,
            "ABYZ"
        );
    }
}
