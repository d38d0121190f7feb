//! JSON Schema validation for reference tables and configuration.
//!
//! Reference tables are supplied by people, not programs, so they are checked
//! against a schema before being deserialised. A table that fails here aborts
//! the run: every record depends on it.
//!
//! # Embedded Schemas
//!
//! Schemas are embedded at compile time from the `schemas/` directory:
//! - `taxonomy.json` - ordered product keyword rules
//! - `densities.json` - product/category/default densities
//! - `overrides.json` - company-name override entries
//! - `config.json` - pipeline knobs
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use fuelstat::validation::validate_density_table;
//!
//! let table = json!({ "products": { "LPG": 0.54 }, "default": 0.8 });
//! assert!(validate_density_table(&table).is_ok());
//! ```

use once_cell::sync::Lazy;
use serde_json::Value;

static TAXONOMY_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/taxonomy.json"))
        .expect("Invalid embedded schema")
});

static DENSITY_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/densities.json"))
        .expect("Invalid embedded schema")
});

static OVERRIDES_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/overrides.json"))
        .expect("Invalid embedded schema")
});

static CONFIG_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/config.json"))
        .expect("Invalid embedded schema")
});

/// Validate a JSON value against a JSON schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with every violation otherwise
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate an ordered taxonomy rule list.
pub fn validate_taxonomy(data: &Value) -> Result<(), Vec<String>> {
    validate(&TAXONOMY_SCHEMA, data)
}

/// Validate a density table.
pub fn validate_density_table(data: &Value) -> Result<(), Vec<String>> {
    validate(&DENSITY_SCHEMA, data)
}

/// Validate a company override file.
pub fn validate_overrides(data: &Value) -> Result<(), Vec<String>> {
    validate(&OVERRIDES_SCHEMA, data)
}

/// Validate a pipeline config file.
pub fn validate_config(data: &Value) -> Result<(), Vec<String>> {
    validate(&CONFIG_SCHEMA, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_taxonomy() {
        let rules = json!([
            { "match_keywords": ["LPG"], "canonical_product": "LPG", "category": "LPG", "default_unit": "MASS" },
            { "match_keywords": ["GASOIL", "DIESEL"], "canonical_product": "Gasoil", "category": "Gasoil" }
        ]);
        assert!(validate_taxonomy(&rules).is_ok());
    }

    #[test]
    fn test_invalid_taxonomy() {
        assert!(validate_taxonomy(&json!([])).is_err());
        let rules = json!([{ "match_keywords": [], "canonical_product": "LPG", "category": "LPG" }]);
        assert!(validate_taxonomy(&rules).is_err());
        let rules = json!([{ "match_keywords": ["LPG"], "canonical_product": "LPG" }]);
        assert!(validate_taxonomy(&rules).is_err());
    }

    #[test]
    fn test_density_table_requires_positive_default() {
        let ok = json!({ "products": { "LPG": 0.54 }, "categories": { "LPG": 0.54 }, "default": 0.8 });
        assert!(validate_density_table(&ok).is_ok());

        let missing_default = json!({ "products": { "LPG": 0.54 } });
        assert!(validate_density_table(&missing_default).is_err());

        let zero = json!({ "products": { "LPG": 0.0 }, "default": 0.8 });
        let errors = validate_density_table(&zero).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_overrides_and_config() {
        let overrides = json!([
            { "raw_name": "G.O.I.L", "canonical_name": "GOIL PLC", "company_type": "OMC" }
        ]);
        assert!(validate_overrides(&overrides).is_ok());
        assert!(validate_overrides(&json!([{ "raw_name": "X" }])).is_err());

        assert!(validate_config(&json!({ "similarity_threshold": 0.9 })).is_ok());
        assert!(validate_config(&json!({ "similarity_treshold": 0.9 })).is_err());
        assert!(validate_config(&json!({})).is_ok());
    }
}
