//! Policy and domain YAML configuration.
//!
//! ```yaml
//! # policy config
//! priority: 5
//! enabled: true
//! max_history: null
//! ```
//!
//! ```yaml
//! # domain
//! actions:
//!   - utter_greet
//! forms:
//!   - ask_name_form
//! ```

use crate::error::PolicyError;
use dialogue_types::Domain;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Priority of form-handling policies; rules share it.
pub const FORM_POLICY_PRIORITY: i32 = 5;

/// Runtime configuration of a `RulePolicy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Higher wins when several policies predict with equal confidence.
    #[serde(default = "default_priority")]
    pub priority: i32,

    /// A disabled policy always predicts nothing.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// History window of the state encoder. `None` keeps the whole
    /// conversation so rule lengths are preserved.
    #[serde(default)]
    pub max_history: Option<usize>,
}

fn default_priority() -> i32 {
    FORM_POLICY_PRIORITY
}

fn default_enabled() -> bool {
    true
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            enabled: default_enabled(),
            max_history: None,
        }
    }
}

impl PolicyConfig {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| PolicyError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Load configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, PolicyError> {
        // An empty document is a blank config, not an error.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: PolicyConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `RULE_POLICY_ENABLED` / `RULE_POLICY_PRIORITY` overrides.
    pub fn with_env_overrides(mut self) -> Result<Self, PolicyError> {
        self.enabled = env_bool("RULE_POLICY_ENABLED", self.enabled);
        if let Ok(raw) = std::env::var("RULE_POLICY_PRIORITY") {
            self.priority = raw.trim().parse().map_err(|_| {
                PolicyError::InvalidConfig(format!(
                    "RULE_POLICY_PRIORITY must be an integer, got '{raw}'"
                ))
            })?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_history == Some(0) {
            return Err(PolicyError::InvalidConfig(
                "max_history must be at least 1 (or null for unbounded)".into(),
            ));
        }
        Ok(())
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}

/// Domain file: declared actions and forms.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainConfig {
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub forms: Vec<String>,
}

impl DomainConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| PolicyError::io(path, e))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, PolicyError> {
        let config: DomainConfig = serde_yaml::from_str(yaml)?;
        if let Some(name) = config
            .actions
            .iter()
            .chain(&config.forms)
            .find(|name| name.trim().is_empty() || name.contains(char::is_whitespace))
        {
            return Err(PolicyError::InvalidConfig(format!(
                "action names must be non-empty and contain no whitespace: '{name}'"
            )));
        }
        Ok(config)
    }

    pub fn into_domain(self) -> Domain {
        Domain::new(self.actions, self.forms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_config_is_default() {
        let config = PolicyConfig::from_yaml("").unwrap();
        assert_eq!(config, PolicyConfig::default());
        assert_eq!(config.priority, FORM_POLICY_PRIORITY);
        assert!(config.enabled);
        assert_eq!(config.max_history, None);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config = PolicyConfig::from_yaml("enabled: false\n").unwrap();
        assert!(!config.enabled);
        assert_eq!(config.priority, FORM_POLICY_PRIORITY);
    }

    #[test]
    fn invalid_yaml_rejected() {
        let err = PolicyConfig::from_yaml("priority: [5").unwrap_err();
        assert_eq!(err.code(), "SERIALIZATION");
    }

    #[test]
    fn unknown_field_rejected() {
        let err = PolicyConfig::from_yaml("prority: 3\n").unwrap_err();
        assert!(err.to_string().contains("prority"));
    }

    #[test]
    fn zero_max_history_rejected() {
        let err = PolicyConfig::from_yaml("max_history: 0\n").unwrap_err();
        assert!(matches!(err, PolicyError::InvalidConfig(_)));
    }

    #[test]
    fn domain_config_builds_domain() {
        let yaml = r#"
actions:
  - utter_greet
  - utter_goodbye
forms:
  - ask_name_form
"#;
        let domain = DomainConfig::from_yaml(yaml).unwrap().into_domain();
        assert!(domain.index_for_action("utter_goodbye").is_some());
        assert!(domain.index_for_action("ask_name_form").is_some());
        assert!(domain.index_for_action("action_listen").is_some());
    }

    #[test]
    fn domain_config_rejects_whitespace_names() {
        let err = DomainConfig::from_yaml("actions: ['utter greet']\n").unwrap_err();
        assert!(matches!(err, PolicyError::InvalidConfig(_)));
    }
}
