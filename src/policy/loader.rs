use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::domain::{FieldValue, RulesFile};
use crate::rules::{RuleError, RuleSet};
use crate::sets::{MapInfo, MemorySetStore, SetSpec, SetStore, StoreError};

/// Errors that can occur while loading rules or sets.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Set error: {0}")]
    Store(#[from] StoreError),
}

/// Contents of a sets file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetsFile {
    #[serde(default)]
    pub sets: Vec<SetDecl>,
}

/// One set plus the entries it starts with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDecl {
    #[serde(flatten)]
    pub spec: SetSpec,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<SeedEntry>,
}

/// An entry present from startup, typically carrying map info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedEntry {
    /// Key fields written as `{addr: 10.0.0.2}` rather than YAML tags
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub key: Vec<FieldValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<MapInfo>,
}

/// Load a rules file from YAML.
pub fn load_rules(path: impl AsRef<Path>) -> Result<RulesFile, LoaderError> {
    let content = fs::read_to_string(path)?;
    let file: RulesFile = serde_yaml::from_str(&content)?;

    if file.version.is_empty() {
        return Err(LoaderError::Validation(
            "Ruleset version cannot be empty".to_string(),
        ));
    }

    Ok(file)
}

/// Load a sets file from YAML.
pub fn load_sets(path: impl AsRef<Path>) -> Result<SetsFile, LoaderError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Create every declared set and its seed entries.
pub fn build_store(file: &SetsFile) -> Result<MemorySetStore, LoaderError> {
    let store = MemorySetStore::new();

    for decl in &file.sets {
        store.create_set(decl.spec.clone())?;
        for entry in &decl.entries {
            let key = entry.key.iter().cloned().collect();
            store.add_entry(&decl.spec.name, key, entry.timeout, entry.map)?;
        }
        info!(
            set = %decl.spec.name,
            seeded = decl.entries.len(),
            "Loaded set"
        );
    }

    Ok(store)
}

/// Loads the rules file and compiles it against a set store.
pub struct RulesLoader {
    rules_path: PathBuf,
    store: Arc<dyn SetStore>,
}

impl RulesLoader {
    pub fn new(rules_path: impl Into<PathBuf>, store: Arc<dyn SetStore>) -> Self {
        RulesLoader {
            rules_path: rules_path.into(),
            store,
        }
    }

    /// Load and compile the rules, reusing unchanged rules from `previous`.
    pub fn load(&self, previous: Option<&RuleSet>) -> Result<RuleSet, LoaderError> {
        let file = self.load_file()?;
        Ok(RuleSet::from_file(&file, &self.store, previous)?)
    }

    /// Load only the rules file (without installing rules).
    pub fn load_file(&self) -> Result<RulesFile, LoaderError> {
        load_rules(&self.rules_path)
    }

    pub fn rules_path(&self) -> &Path {
        &self.rules_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sets_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
sets:
  - name: seen
    dimension: 1
    max_entries: 128
  - name: qos
    dimension: 1
    entries:
      - key: [{{addr: 10.0.0.2}}]
        map:
          mark: [10, 15]
          priority: 6
"#
        )
        .unwrap();
        file
    }

    #[test]
    fn test_load_sets_and_build_store() {
        let file = sets_file();
        let sets = load_sets(file.path()).unwrap();
        assert_eq!(sets.sets.len(), 2);
        assert_eq!(sets.sets[0].spec.max_entries, 128);
        assert_eq!(sets.sets[1].spec.max_entries, 65536);

        let store = build_store(&sets).unwrap();
        assert_eq!(store.len("qos").unwrap(), 1);

        let entries = store.entries("qos").unwrap();
        assert_eq!(entries[0].key, "10.0.0.2");
        assert_eq!(entries[0].map.unwrap().priority, Some(6));
    }

    #[test]
    fn test_seed_keys_in_map_form() {
        let sets: SetsFile = serde_yaml::from_str(
            r#"
sets:
  - name: flows
    dimension: 2
    entries:
      - key: [{addr: 192.168.1.1}, {port: 443}]
        timeout: 30
      - key:
          - iface: eth0
          - number: 7
"#,
        )
        .unwrap();

        let entries = &sets.sets[0].entries;
        assert_eq!(
            entries[0].key,
            vec![
                FieldValue::Addr("192.168.1.1".parse().unwrap()),
                FieldValue::Port(443)
            ]
        );
        assert_eq!(entries[0].timeout, Some(30));
        assert_eq!(
            entries[1].key,
            vec![FieldValue::Iface("eth0".to_string()), FieldValue::Number(7)]
        );

        let store = build_store(&sets).unwrap();
        assert_eq!(store.len("flows").unwrap(), 2);

        // JSON keeps the plain externally tagged form
        let json = serde_json::to_string(&entries[0].key[1]).unwrap();
        assert_eq!(json, r#"{"port":443}"#);
    }

    #[test]
    fn test_seed_entry_dimension_checked() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
sets:
  - name: pairs
    dimension: 2
    entries:
      - key: [{{port: 80}}]
"#
        )
        .unwrap();

        let sets = load_sets(file.path()).unwrap();
        let err = build_store(&sets).err().unwrap();
        assert!(matches!(
            err,
            LoaderError::Store(StoreError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_load_rules() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
ruleset_version: "test-1.0"
rules:
  - id: track
    add_set: {{name: seen, dirs: src}}
    timeout: 600
    match: true
    probability: 0.25
"#
        )
        .unwrap();

        let rules = load_rules(file.path()).unwrap();

        assert_eq!(rules.version, "test-1.0");
        assert_eq!(rules.rules.len(), 1);
        assert!(rules.rules[0].classify);
        assert_eq!(rules.rules[0].probability.unwrap().raw(), 0x2000_0000);
    }

    #[test]
    fn test_rules_validation_empty_version() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
ruleset_version: ""
rules: []
"#
        )
        .unwrap();

        let result = load_rules(file.path());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("version"));
    }

    #[test]
    fn test_rules_loader() {
        let sets = build_store(&load_sets(sets_file().path()).unwrap()).unwrap();
        let store: Arc<dyn SetStore> = Arc::new(sets);

        let mut rules_file = NamedTempFile::new().unwrap();
        writeln!(
            rules_file,
            r#"
ruleset_version: "v1"
rules:
  - id: track
    add_set: {{name: seen, dirs: src}}
  - id: track
    del_set: {{name: seen, dirs: dst}}
"#
        )
        .unwrap();

        let loader = RulesLoader::new(rules_file.path(), store);
        let err = loader.load(None).err().unwrap();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_rules_loader_unknown_set() {
        let sets = build_store(&load_sets(sets_file().path()).unwrap()).unwrap();
        let store: Arc<dyn SetStore> = Arc::new(sets);

        let mut rules_file = NamedTempFile::new().unwrap();
        writeln!(
            rules_file,
            r#"
ruleset_version: "v1"
rules:
  - id: track
    add_set: {{name: nope, dirs: src}}
"#
        )
        .unwrap();

        let loader = RulesLoader::new(rules_file.path(), store);
        assert!(matches!(
            loader.load(None),
            Err(LoaderError::Rule(RuleError::Invalid { .. }))
        ));
    }
}
