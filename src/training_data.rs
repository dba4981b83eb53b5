//! YAML input files for the CLI: training traces and a live conversation.
//!
//! Turns are written as feature lists; every listed feature gets weight 1.0.
//!
//! ```yaml
//! traces:
//!   - name: greet
//!     kind: rule
//!     steps:
//!       - features: []
//!         action: action_listen
//!       - features: [prev_action_listen, intent_greet]
//!         action: utter_greet
//! ```

use anyhow::{Context, Result};
use dialogue_types::{DialogueTracker, TraceKind, TrainingTrace, Turn};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingDataFile {
    pub traces: Vec<TraceSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TraceSpec {
    pub name: String,
    pub kind: TraceKind,
    #[serde(default)]
    pub augmented: bool,
    pub steps: Vec<StepSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepSpec {
    #[serde(default)]
    pub features: Vec<String>,
    pub action: String,
}

impl TrainingDataFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading training data {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn into_traces(self) -> Vec<TrainingTrace> {
        self.traces
            .into_iter()
            .map(|spec| {
                let trace = TrainingTrace::new(spec.name, spec.kind);
                let trace = if spec.augmented { trace.augmented() } else { trace };
                spec.steps.into_iter().fold(trace, |trace, step| {
                    trace.step(Turn::from_features(step.features), step.action)
                })
            })
            .collect()
    }
}

/// A conversation to predict on.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversationFile {
    #[serde(default)]
    pub turns: Vec<Vec<String>>,
    #[serde(default)]
    pub latest_action: Option<String>,
    #[serde(default)]
    pub latest_intent: Option<String>,
    #[serde(default)]
    pub active_form: Option<String>,
    #[serde(default)]
    pub rejected: bool,
}

impl ConversationFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading conversation {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.turns
            .iter()
            .map(|features| Turn::from_features(features.iter().cloned()))
            .collect()
    }

    pub fn tracker(&self, sender_id: &str) -> DialogueTracker {
        let mut tracker = DialogueTracker::new(sender_id);
        if let Some(form) = &self.active_form {
            tracker = tracker.with_active_form(form.clone());
            if self.rejected {
                tracker = tracker.with_rejected_form();
            }
        }
        if let Some(intent) = &self.latest_intent {
            tracker = tracker.with_intent(intent.clone());
        }
        if let Some(action) = &self.latest_action {
            tracker = tracker.with_action(action.clone());
        }
        tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialogue_types::ConversationTracker;

    #[test]
    fn traces_from_yaml() {
        let yaml = r#"
traces:
  - name: greet
    kind: rule
    steps:
      - action: action_listen
      - features: [prev_action_listen, intent_greet]
        action: utter_greet
  - name: stitched
    kind: freeform
    augmented: true
    steps: []
"#;
        let traces = TrainingDataFile::from_yaml(yaml).unwrap().into_traces();
        assert_eq!(traces.len(), 2);
        assert!(traces[0].is_rule());
        assert_eq!(traces[0].steps.len(), 2);
        assert!(traces[0].steps[0].turn.is_empty());
        assert_eq!(traces[0].actions(), vec!["action_listen", "utter_greet"]);
        assert!(traces[1].is_augmented);
    }

    #[test]
    fn unknown_kind_rejected() {
        let yaml = "traces:\n  - name: x\n    kind: story\n    steps: []\n";
        assert!(TrainingDataFile::from_yaml(yaml).is_err());
    }

    #[test]
    fn conversation_builds_tracker() {
        let yaml = r#"
turns:
  - []
  - [prev_action_listen, intent_chitchat, active_form_ask_name_form]
latest_action: action_listen
latest_intent: chitchat
active_form: ask_name_form
rejected: true
"#;
        let conversation = ConversationFile::from_yaml(yaml).unwrap();
        assert_eq!(conversation.turns().len(), 2);
        let tracker = conversation.tracker("cli");
        assert_eq!(tracker.latest_action_name(), Some("action_listen"));
        assert_eq!(tracker.latest_intent_name(), Some("chitchat"));
        assert!(tracker.active_form().is_some_and(|f| f.rejected));
    }
}
