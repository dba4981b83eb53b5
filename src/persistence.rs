//! On-disk snapshot of a trained policy.
//!
//! One JSON file per model directory:
//!
//! ```json
//! {
//!   "priority": 5,
//!   "max_history": null,
//!   "lookup": { "|intent_greet prev_action_listen": 5 },
//!   "negative_lookup": { "*|prev_action_listen|...": "no_active_form" }
//! }
//! ```

use crate::config::PolicyConfig;
use crate::error::PolicyError;
use crate::key::FeatureKey;
use crate::trainer::{NegativeRule, RuleTables};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const MEMORIZED_FILE_NAME: &str = "memorized_turns.json";

/// Serialized form of `RulePolicy` state. Keys are written in their text form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub priority: i32,
    pub max_history: Option<usize>,
    pub lookup: BTreeMap<FeatureKey, usize>,
    pub negative_lookup: BTreeMap<FeatureKey, NegativeRule>,
}

impl PolicySnapshot {
    pub fn new(config: &PolicyConfig, tables: &RuleTables) -> Self {
        Self {
            priority: config.priority,
            max_history: config.max_history,
            lookup: tables.lookup.clone(),
            negative_lookup: tables.negative_lookup.clone(),
        }
    }

    /// Path of the snapshot file inside a model directory.
    pub fn file_in(dir: &Path) -> PathBuf {
        dir.join(MEMORIZED_FILE_NAME)
    }

    pub fn write(&self, dir: &Path) -> Result<PathBuf, PolicyError> {
        std::fs::create_dir_all(dir).map_err(|e| PolicyError::io(dir, e))?;
        let path = Self::file_in(dir);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| PolicyError::io(&path, e))?;
        Ok(path)
    }

    /// `Ok(None)` when the directory holds no snapshot.
    pub fn read(dir: &Path) -> Result<Option<Self>, PolicyError> {
        let path = Self::file_in(dir);
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| PolicyError::io(&path, e))?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn config(&self) -> PolicyConfig {
        PolicyConfig {
            priority: self.priority,
            max_history: self.max_history,
            ..PolicyConfig::default()
        }
    }

    pub fn into_tables(self) -> RuleTables {
        RuleTables {
            lookup: self.lookup,
            negative_lookup: self.negative_lookup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_missing_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(PolicySnapshot::read(dir.path()).unwrap(), None);
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let mut tables = RuleTables::default();
        tables
            .lookup
            .insert("|prev_action_listen".parse().unwrap(), 5);
        tables
            .negative_lookup
            .insert("*|prev_action_listen".parse().unwrap(), NegativeRule::NoValidation);

        let snapshot = PolicySnapshot::new(&PolicyConfig::default(), &tables);
        let path = snapshot.write(&dir.path().join("model")).unwrap();
        assert!(path.ends_with(MEMORIZED_FILE_NAME));

        let loaded = PolicySnapshot::read(&dir.path().join("model"))
            .unwrap()
            .unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.into_tables(), tables);
    }

    #[test]
    fn negative_rules_serialize_snake_case() {
        let mut tables = RuleTables::default();
        tables
            .negative_lookup
            .insert("prev_x".parse().unwrap(), NegativeRule::NoActiveForm);
        let json =
            serde_json::to_string(&PolicySnapshot::new(&PolicyConfig::default(), &tables)).unwrap();
        assert!(json.contains(r#""prev_x":"no_active_form""#));
        assert!(json.contains(r#""max_history":null"#));
    }

    #[test]
    fn keys_are_parsed_on_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            PolicySnapshot::file_in(dir.path()),
            r#"{"priority": 5, "max_history": null,
                "lookup": {"*|intent_chitchat prev_action_listen": 6},
                "negative_lookup": {}}"#,
        )
        .unwrap();

        let tables = PolicySnapshot::read(dir.path()).unwrap().unwrap().into_tables();
        let (key, index) = tables.lookup.iter().next().unwrap();
        assert!(key.turns()[0].is_wildcard());
        assert_eq!(key.len(), 2);
        assert_eq!(*index, 6);
    }

    #[test]
    fn malformed_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(PolicySnapshot::file_in(dir.path()), "{ not json").unwrap();
        let err = PolicySnapshot::read(dir.path()).unwrap_err();
        assert_eq!(err.code(), "SERIALIZATION");
    }
}
