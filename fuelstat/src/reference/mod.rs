//! Reference tables: product taxonomy rules and densities.
//!
//! Both tables are external, read-only configuration. A run takes an immutable
//! [`ReferenceData`] snapshot; nothing edits it while records are processed.
//!
//! Built-in tables cover the downstream petroleum products found in the
//! monthly industry returns. Files supplied on the command line replace them
//! and are validated strictly: a table that fails to load aborts the run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{ReferenceError, ReferenceResult};
use crate::models::{DensitySource, UnitHint};
use crate::validation::{validate_density_table, validate_taxonomy};

// =============================================================================
// Taxonomy
// =============================================================================

/// One ordered keyword rule. Rule order is part of the contract: the first
/// matching rule wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyRule {
    pub match_keywords: Vec<String>,
    pub canonical_product: String,
    pub category: String,
    /// Unit to assume when the source did not say.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_unit: Option<UnitHint>,
}

impl TaxonomyRule {
    pub fn new(keywords: &[&str], canonical_product: &str, category: &str) -> Self {
        Self {
            match_keywords: keywords.iter().map(|k| k.to_string()).collect(),
            canonical_product: canonical_product.to_string(),
            category: category.to_string(),
            default_unit: None,
        }
    }

    pub fn with_default_unit(mut self, unit: UnitHint) -> Self {
        self.default_unit = Some(unit);
        self
    }
}

/// Default rule list. Specific products come before the general family they
/// would otherwise be swallowed by (Premix before Gasoline, Marine Gasoil
/// before Gasoil).
pub fn builtin_taxonomy() -> Vec<TaxonomyRule> {
    vec![
        TaxonomyRule::new(&["LPG", "LIQUEFIED PETROLEUM", "BUTANE"], "LPG", "LPG")
            .with_default_unit(UnitHint::Mass),
        TaxonomyRule::new(&["ATK", "AVIATION", "JET A1", "JET FUEL"], "ATK", "Kerosene")
            .with_default_unit(UnitHint::Volume),
        TaxonomyRule::new(&["PREMIX"], "Premix", "Gasoline")
            .with_default_unit(UnitHint::Volume),
        TaxonomyRule::new(&["MGO", "MARINE GASOIL", "GASOIL MARINE", "MARINE DIESEL"], "Marine Gasoil", "Gasoil")
            .with_default_unit(UnitHint::Volume),
        TaxonomyRule::new(&["GASOIL", "GAS OIL", "DIESEL", "AGO"], "Gasoil", "Gasoil")
            .with_default_unit(UnitHint::Volume),
        TaxonomyRule::new(&["RFO", "HFO", "RESIDUAL FUEL", "FUEL OIL"], "RFO", "Fuel Oil")
            .with_default_unit(UnitHint::Mass),
        TaxonomyRule::new(&["KEROSENE", "DPK"], "Kerosene", "Kerosene")
            .with_default_unit(UnitHint::Volume),
        TaxonomyRule::new(&["GASOLINE", "PREMIUM", "=PETROL", "PMS"], "Gasoline", "Gasoline")
            .with_default_unit(UnitHint::Volume),
        TaxonomyRule::new(&["NAPHTHA"], "Naphtha", "Naphtha")
            .with_default_unit(UnitHint::Volume),
    ]
}

// =============================================================================
// Densities
// =============================================================================

/// Densities in kg per liter.
///
/// Lookup precedence: exact canonical product, then category default, then
/// the global `default`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityTable {
    pub products: BTreeMap<String, f64>,
    #[serde(default)]
    pub categories: BTreeMap<String, f64>,
    pub default: f64,
}

impl DensityTable {
    /// Density for a product, and which level of the table supplied it.
    pub fn lookup(&self, canonical_product: &str, category: &str) -> (f64, DensitySource) {
        if let Some(&density) = self.products.get(canonical_product) {
            return (density, DensitySource::Exact);
        }
        if let Some(&density) = self.categories.get(category) {
            return (density, DensitySource::Category);
        }
        (self.default, DensitySource::Global)
    }

    /// Check every density is strictly positive and finite.
    pub fn validate(&self) -> ReferenceResult<()> {
        if self.products.is_empty() {
            return Err(ReferenceError::EmptyDensityTable);
        }
        let entries = self
            .products
            .iter()
            .chain(self.categories.iter())
            .map(|(k, v)| (k.as_str(), *v))
            .chain(std::iter::once(("DEFAULT", self.default)));
        for (key, value) in entries {
            if !(value.is_finite() && value > 0.0) {
                return Err(ReferenceError::InvalidDensity {
                    key: key.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Default densities, kg/L at 15 °C.
pub fn builtin_densities() -> DensityTable {
    let products = [
        ("LPG", 0.54),
        ("ATK", 0.79),
        ("Premix", 0.74),
        ("Marine Gasoil", 0.86),
        ("Gasoil", 0.845),
        ("RFO", 0.95),
        ("Kerosene", 0.80),
        ("Gasoline", 0.745),
        ("Naphtha", 0.70),
    ];
    let categories = [
        ("LPG", 0.54),
        ("Kerosene", 0.80),
        ("Gasoil", 0.85),
        ("Fuel Oil", 0.95),
        ("Gasoline", 0.74),
    ];
    DensityTable {
        products: products.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        categories: categories.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        default: 0.80,
    }
}

// =============================================================================
// Reference snapshot
// =============================================================================

/// Immutable snapshot of the reference tables for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    pub taxonomy: Vec<TaxonomyRule>,
    pub densities: DensityTable,
}

impl ReferenceData {
    pub fn builtin() -> Self {
        Self {
            taxonomy: builtin_taxonomy(),
            densities: builtin_densities(),
        }
    }

    /// Load tables from files, falling back to built-ins for any table not given.
    pub fn load(taxonomy: Option<&Path>, densities: Option<&Path>) -> ReferenceResult<Self> {
        let taxonomy = match taxonomy {
            Some(path) => load_taxonomy(path)?,
            None => builtin_taxonomy(),
        };
        let densities = match densities {
            Some(path) => load_density_table(path)?,
            None => builtin_densities(),
        };
        let data = Self {
            taxonomy,
            densities,
        };
        data.validate()?;
        Ok(data)
    }

    /// Structural checks that the schema cannot express.
    pub fn validate(&self) -> ReferenceResult<()> {
        if self.taxonomy.is_empty() {
            return Err(ReferenceError::EmptyTaxonomy);
        }
        for (index, rule) in self.taxonomy.iter().enumerate() {
            if rule.match_keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(ReferenceError::EmptyKeywords {
                    index,
                    product: rule.canonical_product.clone(),
                });
            }
        }
        self.densities.validate()
    }
}

fn read_json(path: &Path) -> ReferenceResult<Value> {
    let content = fs::read_to_string(path).map_err(|source| ReferenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Load and validate an ordered taxonomy rule file.
pub fn load_taxonomy(path: &Path) -> ReferenceResult<Vec<TaxonomyRule>> {
    let value = read_json(path)?;
    validate_taxonomy(&value).map_err(|errors| ReferenceError::Schema {
        table: "taxonomy".to_string(),
        errors,
    })?;
    Ok(serde_json::from_value(value)?)
}

/// Load and validate a density table file.
pub fn load_density_table(path: &Path) -> ReferenceResult<DensityTable> {
    let value = read_json(path)?;
    validate_density_table(&value).map_err(|errors| ReferenceError::Schema {
        table: "densities".to_string(),
        errors,
    })?;
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builtin_is_valid() {
        let data = ReferenceData::builtin();
        assert!(data.validate().is_ok());
        // Every built-in product has an exact density.
        for rule in &data.taxonomy {
            let (_, source) = data.densities.lookup(&rule.canonical_product, &rule.category);
            assert_eq!(source, DensitySource::Exact, "{}", rule.canonical_product);
        }
    }

    #[test]
    fn test_density_fallback_order() {
        let table = DensityTable {
            products: BTreeMap::from([("Gasoil".to_string(), 0.845)]),
            categories: BTreeMap::from([("Gasoil".to_string(), 0.85)]),
            default: 0.8,
        };
        assert_eq!(table.lookup("Gasoil", "Gasoil"), (0.845, DensitySource::Exact));
        assert_eq!(table.lookup("Marine Gasoil", "Gasoil"), (0.85, DensitySource::Category));
        assert_eq!(table.lookup("Bitumen", "Asphalt"), (0.8, DensitySource::Global));
    }

    #[test]
    fn test_non_positive_density_rejected() {
        let mut table = builtin_densities();
        table.categories.insert("Gasoil".to_string(), 0.0);
        assert!(matches!(
            table.validate(),
            Err(ReferenceError::InvalidDensity { .. })
        ));
    }

    #[test]
    fn test_load_from_files() {
        let mut taxonomy = NamedTempFile::new().unwrap();
        write!(
            taxonomy,
            r#"[{{"match_keywords": ["LPG"], "canonical_product": "LPG", "category": "LPG", "default_unit": "MASS"}}]"#
        )
        .unwrap();
        let mut densities = NamedTempFile::new().unwrap();
        write!(densities, r#"{{"products": {{"LPG": 0.54}}, "default": 0.8}}"#).unwrap();

        let data = ReferenceData::load(Some(taxonomy.path()), Some(densities.path())).unwrap();
        assert_eq!(data.taxonomy.len(), 1);
        assert_eq!(data.taxonomy[0].default_unit, Some(UnitHint::Mass));
        assert!(data.densities.categories.is_empty());
    }

    #[test]
    fn test_load_failures_are_reported() {
        let missing = ReferenceData::load(Some(Path::new("/nonexistent/taxonomy.json")), None);
        assert!(matches!(missing, Err(ReferenceError::Io { .. })));

        let mut densities = NamedTempFile::new().unwrap();
        write!(densities, r#"{{"products": {{}}, "default": 0.8}}"#).unwrap();
        let result = ReferenceData::load(None, Some(densities.path()));
        assert!(matches!(result, Err(ReferenceError::Schema { .. })));
    }
}
