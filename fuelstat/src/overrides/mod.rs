//! Company override registry.
//!
//! Human-curated `raw_name → canonical_name` assignments. They are the only
//! resolver state that survives between runs, kept in one JSON file:
//!
//! ```json
//! [
//!   { "raw_name": "G.O.I.L", "canonical_name": "GOIL PLC", "company_type": "OMC" }
//! ]
//! ```
//!
//! An entry without `company_type` applies to both BDC and OMC names. A run
//! never edits the registry; it takes an [`OverrideTable`] snapshot instead.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RegistryError, RegistryResult};
use crate::models::CompanyType;
use crate::resolver::normalize::normalize_name;
use crate::validation::validate_overrides;

/// Default override file (relative to current dir).
pub const DEFAULT_OVERRIDES_PATH: &str = ".fuelstat/overrides.json";

/// A stored override with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOverride {
    /// Raw spelling as it appears in exports.
    pub raw_name: String,
    /// Canonical name every matching spelling resolves to.
    pub canonical_name: String,
    /// Restrict to one partition; `None` applies to both.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_type: Option<CompanyType>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl StoredOverride {
    pub fn new(raw_name: &str, canonical_name: &str, company_type: Option<CompanyType>) -> Self {
        Self {
            raw_name: raw_name.trim().to_string(),
            canonical_name: canonical_name.trim().to_string(),
            company_type,
            created_at: chrono::Utc::now().to_rfc3339(),
            note: None,
        }
    }

    fn same_key(&self, raw_name: &str, company_type: Option<CompanyType>) -> bool {
        self.company_type == company_type
            && normalize_name(&self.raw_name) == normalize_name(raw_name)
    }
}

/// File-backed override store.
pub struct OverrideRegistry {
    path: PathBuf,
    entries: Vec<StoredOverride>,
}

impl OverrideRegistry {
    /// Open the registry at the default path.
    pub fn open_default() -> RegistryResult<Self> {
        Self::open(DEFAULT_OVERRIDES_PATH)
    }

    /// Open a registry file. A missing file is an empty registry.
    pub fn open(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let value: serde_json::Value = serde_json::from_str(&content)?;
            validate_overrides(&value).map_err(RegistryError::Schema)?;
            serde_json::from_value(value)?
        } else {
            Vec::new()
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All overrides, in insertion order.
    pub fn list(&self) -> &[StoredOverride] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add an override and persist. Replaces an entry with the same raw name and type.
    pub fn add(&mut self, entry: StoredOverride) -> RegistryResult<()> {
        if normalize_name(&entry.raw_name).is_empty() {
            return Err(RegistryError::Invalid(format!(
                "raw name '{}' is empty after normalisation",
                entry.raw_name
            )));
        }
        if entry.canonical_name.trim().is_empty() {
            return Err(RegistryError::Invalid("canonical name is blank".to_string()));
        }
        self.entries
            .retain(|e| !e.same_key(&entry.raw_name, entry.company_type));
        self.entries.push(entry);
        self.save()
    }

    /// Remove an override and persist.
    pub fn remove(&mut self, raw_name: &str, company_type: Option<CompanyType>) -> RegistryResult<StoredOverride> {
        let index = self
            .entries
            .iter()
            .position(|e| e.same_key(raw_name, company_type))
            .ok_or_else(|| RegistryError::NotFound(raw_name.to_string()))?;
        let removed = self.entries.remove(index);
        self.save()?;
        Ok(removed)
    }

    /// Write the registry to disk.
    pub fn save(&self) -> RegistryResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    /// Immutable lookup table for one run.
    pub fn table(&self) -> OverrideTable {
        OverrideTable::from_entries(&self.entries)
    }
}

/// Read-only override lookup, keyed by normalised raw name.
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    typed: HashMap<(CompanyType, String), String>,
    untyped: HashMap<String, String>,
}

impl OverrideTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from entries. A later entry for the same key replaces an earlier one.
    pub fn from_entries(entries: &[StoredOverride]) -> Self {
        let mut table = Self::default();
        for entry in entries {
            let key = normalize_name(&entry.raw_name);
            if key.is_empty() {
                continue;
            }
            let canonical = entry.canonical_name.trim().to_string();
            match entry.company_type {
                Some(company_type) => {
                    table.typed.insert((company_type, key), canonical);
                }
                None => {
                    table.untyped.insert(key, canonical);
                }
            }
        }
        table
    }

    /// Forced canonical name for a raw name. Type-specific entries win.
    pub fn lookup(&self, company_type: CompanyType, raw_name: &str) -> Option<&str> {
        let key = normalize_name(raw_name);
        self.typed
            .get(&(company_type, key.clone()))
            .or_else(|| self.untyped.get(&key))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.typed.len() + self.untyped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_path_is_under_dot_dir() {
        assert_eq!(
            Path::new(DEFAULT_OVERRIDES_PATH).parent(),
            Some(Path::new(".fuelstat"))
        );
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let registry = OverrideRegistry::open(dir.path().join("overrides.json")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_add_persists_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("overrides.json");

        let mut registry = OverrideRegistry::open(&path).unwrap();
        registry
            .add(StoredOverride::new("G.O.I.L", "GOIL PLC", Some(CompanyType::Omc)))
            .unwrap();
        registry
            .add(StoredOverride::new("goil ltd", "GOIL PLC", None))
            .unwrap();
        // Same normalised raw name and type: replaces the first entry.
        registry
            .add(StoredOverride::new("G O I L", "GOIL", Some(CompanyType::Omc)))
            .unwrap();

        let reopened = OverrideRegistry::open(&path).unwrap();
        assert_eq!(reopened.path(), path.as_path());
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.list()[1].canonical_name, "GOIL");
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("overrides.json");
        let mut registry = OverrideRegistry::open(&path).unwrap();
        registry
            .add(StoredOverride::new("Star Oil Co", "STAR OIL", None))
            .unwrap();

        assert!(matches!(
            registry.remove("Star Oil Co", Some(CompanyType::Bdc)),
            Err(RegistryError::NotFound(_))
        ));
        let removed = registry.remove("STAR OIL COMPANY LTD", None).unwrap();
        assert_eq!(removed.canonical_name, "STAR OIL");
        assert!(OverrideRegistry::open(&path).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_entries_rejected() {
        let dir = TempDir::new().unwrap();
        let mut registry = OverrideRegistry::open(dir.path().join("o.json")).unwrap();
        assert!(matches!(
            registry.add(StoredOverride::new("Ltd.", "X", None)),
            Err(RegistryError::Invalid(_))
        ));
        assert!(matches!(
            registry.add(StoredOverride::new("GOIL", "  ", None)),
            Err(RegistryError::Invalid(_))
        ));

        let path = dir.path().join("bad.json");
        fs::write(&path, r#"[{"raw_name": "GOIL"}]"#).unwrap();
        assert!(matches!(OverrideRegistry::open(&path), Err(RegistryError::Schema(_))));
    }

    #[test]
    fn test_table_lookup_prefers_typed_entry() {
        let entries = vec![
            StoredOverride::new("Zen", "ZEN PETROLEUM", None),
            StoredOverride::new("Zen", "ZEN GAS", Some(CompanyType::Bdc)),
        ];
        let table = OverrideTable::from_entries(&entries);
        assert_eq!(table.lookup(CompanyType::Bdc, "ZEN LIMITED"), Some("ZEN GAS"));
        assert_eq!(table.lookup(CompanyType::Omc, "zen"), Some("ZEN PETROLEUM"));
        assert_eq!(table.lookup(CompanyType::Omc, "Puma"), None);
    }
}
