//! Dialogue Types - Level 1 Foundation Types
//!
//! Plain data structures shared between the state encoder, the rule policy and
//! whatever owns the live conversation. Nothing in here knows about rules.
//!
//! ## Contents
//!
//! - Feature symbol conventions (`prev_`, `active_form_`, `slot_`, `_None`)
//! - `Turn`: one encoded conversation snapshot
//! - `Domain`: action name <-> index vocabulary
//! - `ConversationTracker`: the facts the policy reads from a live tracker,
//!   plus the event sink it writes to
//! - `TrainingTrace`: labeled `(Turn, action)` sequences produced by the encoder
//!
//! ## Critical Rules
//!
//! 1. **NO POLICY LOGIC** - Only data structures and accessors
//! 2. **NO WORKSPACE DEPENDENCIES** - Cannot depend on other workspace crates
//! 3. **SERIALIZABLE** - All types must support serde

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// RESERVED NAMES AND FEATURE SYMBOLS
// ============================================================================

/// Action that waits for the next user message.
pub const ACTION_LISTEN_NAME: &str = "action_listen";
/// Action that resets the conversation.
pub const ACTION_RESTART_NAME: &str = "action_restart";
/// Action that undoes the last user turn.
pub const ACTION_BACK_NAME: &str = "action_back";
/// Action that opens a new session.
pub const ACTION_SESSION_START_NAME: &str = "action_session_start";
/// Placeholder action used in rule snippets: "any unspecified action".
pub const RULE_SNIPPET_ACTION_NAME: &str = "...";

/// Reserved user intents that map onto built-in actions.
pub const USER_INTENT_RESTART: &str = "restart";
pub const USER_INTENT_BACK: &str = "back";
pub const USER_INTENT_SESSION_START: &str = "session_start";

/// Actions every domain carries, in index order.
pub const DEFAULT_ACTION_NAMES: &[&str] = &[
    ACTION_LISTEN_NAME,
    ACTION_RESTART_NAME,
    ACTION_BACK_NAME,
    ACTION_SESSION_START_NAME,
    RULE_SNIPPET_ACTION_NAME,
];

/// Prefix of the "previous action" feature.
pub const PREV_PREFIX: &str = "prev_";
/// Prefix of the "active form" feature.
pub const ACTIVE_FORM_PREFIX: &str = "active_form_";
/// Prefix of slot features.
pub const SLOT_PREFIX: &str = "slot";
/// Suffix marking a feature that must be absent.
pub const NONE_SUFFIX: &str = "_None";

/// `prev_<action>`
pub fn prev_action_feature(action: &str) -> String {
    format!("{PREV_PREFIX}{action}")
}

/// `active_form_<name>`
pub fn active_form_feature(form: &str) -> String {
    format!("{ACTIVE_FORM_PREFIX}{form}")
}

/// Base name of a feature symbol: everything up to its last `_`.
///
/// `slot_name_0` -> `slot_name`, `active_form_None` -> `active_form`.
/// A symbol without `_` is its own base.
pub fn feature_base(feature: &str) -> &str {
    match feature.rfind('_') {
        Some(idx) => &feature[..idx],
        None => feature,
    }
}

// ============================================================================
// TURN
// ============================================================================

/// One encoded conversation snapshot: feature symbol -> weight.
///
/// Ordered by symbol so that iteration (and everything derived from it) is
/// deterministic. A weight of zero or less means the feature is inactive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Turn {
    features: BTreeMap<String, f32>,
}

impl Turn {
    /// Empty turn (no features).
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn with every listed feature at weight 1.0.
    pub fn from_features<I, S>(features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            features: features.into_iter().map(|f| (f.into(), 1.0)).collect(),
        }
    }

    /// Turn from explicit `(feature, weight)` pairs.
    pub fn from_weighted<I, S>(features: I) -> Self
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        Self {
            features: features.into_iter().map(|(f, w)| (f.into(), w)).collect(),
        }
    }

    /// Builder: add one feature.
    pub fn with_feature(mut self, feature: impl Into<String>, weight: f32) -> Self {
        self.features.insert(feature.into(), weight);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the symbol is present, regardless of weight.
    pub fn contains(&self, feature: &str) -> bool {
        self.features.contains_key(feature)
    }

    pub fn weight(&self, feature: &str) -> Option<f32> {
        self.features.get(feature).copied()
    }

    /// Whether the symbol is present with a positive weight.
    pub fn is_active(&self, feature: &str) -> bool {
        self.weight(feature).is_some_and(|w| w > 0.0)
    }

    /// Feature symbols in canonical order.
    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.features.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Name of the active form, if the turn carries one.
    ///
    /// `active_form_None` and zero-weight entries do not count. By
    /// construction a turn carries at most one active form.
    pub fn active_form_name(&self) -> Option<&str> {
        self.iter()
            .filter(|(_, w)| *w > 0.0)
            .filter_map(|(f, _)| f.strip_prefix(ACTIVE_FORM_PREFIX))
            .find(|name| *name != "None")
    }

    /// Whether `prev_<action>` is active in this turn.
    pub fn has_prev_action(&self, action: &str) -> bool {
        self.is_active(&prev_action_feature(action))
    }

    /// Only the active `prev_*` features of this turn.
    pub fn prev_action_features(&self) -> Turn {
        Turn {
            features: self
                .features
                .iter()
                .filter(|(f, w)| f.starts_with(PREV_PREFIX) && **w > 0.0)
                .map(|(f, w)| (f.clone(), *w))
                .collect(),
        }
    }
}

impl<S: Into<String>> FromIterator<S> for Turn {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Turn::from_features(iter)
    }
}

// ============================================================================
// DOMAIN VOCABULARY
// ============================================================================

/// Action vocabulary: the index of an action is its position.
///
/// The built-in actions always occupy the first slots, followed by user
/// actions and form names in declaration order. Duplicates are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    action_names: Vec<String>,
}

impl Domain {
    pub fn new<A, F, S, T>(actions: A, forms: F) -> Self
    where
        A: IntoIterator<Item = S>,
        F: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        let mut action_names: Vec<String> =
            DEFAULT_ACTION_NAMES.iter().map(|s| s.to_string()).collect();
        let declared = actions
            .into_iter()
            .map(Into::into)
            .chain(forms.into_iter().map(Into::into));
        for name in declared {
            if !action_names.contains(&name) {
                action_names.push(name);
            }
        }
        Self { action_names }
    }

    pub fn action_names(&self) -> &[String] {
        &self.action_names
    }

    pub fn num_actions(&self) -> usize {
        self.action_names.len()
    }

    pub fn index_for_action(&self, name: &str) -> Option<usize> {
        self.action_names.iter().position(|a| a == name)
    }

    pub fn action_name(&self, index: usize) -> Option<&str> {
        self.action_names.get(index).map(String::as_str)
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self::new(Vec::<String>::new(), Vec::<String>::new())
    }
}

// ============================================================================
// TRACKER CONTRACT
// ============================================================================

/// The form currently collecting values from the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveForm {
    pub name: String,
    /// The form refused to handle the last user message.
    #[serde(default)]
    pub rejected: bool,
}

impl ActiveForm {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rejected: false,
        }
    }

    pub fn rejected(mut self) -> Self {
        self.rejected = true;
        self
    }
}

/// Events applied to a conversation tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackerEvent {
    /// An action finished executing.
    ActionExecuted { name: String },
    /// A user message was parsed into an intent.
    UserUttered { intent: Option<String> },
    /// A form was activated, or deactivated with `None`.
    ActiveFormChanged { name: Option<String> },
    /// The active form rejected the last message.
    FormRejected,
    /// Whether the active form should validate the requested slot this turn.
    FormValidation { validate: bool },
}

/// What the policy reads from, and writes to, a live conversation.
pub trait ConversationTracker {
    fn latest_action_name(&self) -> Option<&str>;
    fn latest_intent_name(&self) -> Option<&str>;
    fn active_form(&self) -> Option<&ActiveForm>;
    fn update(&mut self, event: TrackerEvent);
}

/// In-memory tracker that keeps the applied event log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DialogueTracker {
    pub sender_id: String,
    latest_action_name: Option<String>,
    latest_intent_name: Option<String>,
    active_form: Option<ActiveForm>,
    /// Cleared by `FormValidation { validate: false }`, reset on form change.
    validate_form: bool,
    events: Vec<TrackerEvent>,
}

impl DialogueTracker {
    pub fn new(sender_id: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            validate_form: true,
            ..Self::default()
        }
    }

    /// Builder: record that `action` ran.
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.update(TrackerEvent::ActionExecuted {
            name: action.into(),
        });
        self
    }

    /// Builder: record a user message with `intent`.
    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.update(TrackerEvent::UserUttered {
            intent: Some(intent.into()),
        });
        self
    }

    /// Builder: activate `form`.
    pub fn with_active_form(mut self, form: impl Into<String>) -> Self {
        self.update(TrackerEvent::ActiveFormChanged {
            name: Some(form.into()),
        });
        self
    }

    /// Builder: mark the active form as rejected.
    pub fn with_rejected_form(mut self) -> Self {
        self.update(TrackerEvent::FormRejected);
        self
    }

    pub fn events(&self) -> &[TrackerEvent] {
        &self.events
    }

    pub fn validate_form(&self) -> bool {
        self.validate_form
    }
}

impl ConversationTracker for DialogueTracker {
    fn latest_action_name(&self) -> Option<&str> {
        self.latest_action_name.as_deref()
    }

    fn latest_intent_name(&self) -> Option<&str> {
        self.latest_intent_name.as_deref()
    }

    fn active_form(&self) -> Option<&ActiveForm> {
        self.active_form.as_ref()
    }

    fn update(&mut self, event: TrackerEvent) {
        match &event {
            TrackerEvent::ActionExecuted { name } => {
                self.latest_action_name = Some(name.clone());
            }
            TrackerEvent::UserUttered { intent } => {
                self.latest_intent_name = intent.clone();
            }
            TrackerEvent::ActiveFormChanged { name } => {
                self.active_form = name.as_ref().map(ActiveForm::new);
                self.validate_form = true;
            }
            TrackerEvent::FormRejected => {
                if let Some(form) = self.active_form.as_mut() {
                    form.rejected = true;
                }
            }
            TrackerEvent::FormValidation { validate } => {
                self.validate_form = *validate;
            }
        }
        self.events.push(event);
    }
}

// ============================================================================
// TRAINING TRACES
// ============================================================================

/// Where a trace came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    /// Authored as a rule; memorized verbatim.
    Rule,
    /// Ordinary story; only mined for unhappy-path negative rules.
    Freeform,
}

/// One encoded turn and the action taken at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub turn: Turn,
    pub action: String,
}

/// A labeled conversation as produced by the state encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingTrace {
    pub name: String,
    pub kind: TraceKind,
    /// Synthetically stitched from other traces.
    #[serde(default)]
    pub is_augmented: bool,
    #[serde(default)]
    pub steps: Vec<TraceStep>,
}

impl TrainingTrace {
    pub fn new(name: impl Into<String>, kind: TraceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            is_augmented: false,
            steps: Vec::new(),
        }
    }

    pub fn rule(name: impl Into<String>) -> Self {
        Self::new(name, TraceKind::Rule)
    }

    pub fn freeform(name: impl Into<String>) -> Self {
        Self::new(name, TraceKind::Freeform)
    }

    /// Builder: append a step.
    pub fn step(mut self, turn: Turn, action: impl Into<String>) -> Self {
        self.steps.push(TraceStep {
            turn,
            action: action.into(),
        });
        self
    }

    /// Builder: mark as augmented.
    pub fn augmented(mut self) -> Self {
        self.is_augmented = true;
        self
    }

    pub fn is_rule(&self) -> bool {
        self.kind == TraceKind::Rule
    }

    /// Turns in chronological order.
    pub fn turns(&self) -> Vec<Turn> {
        self.steps.iter().map(|s| s.turn.clone()).collect()
    }

    /// Actions in chronological order, aligned with `turns()`.
    pub fn actions(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.action.as_str()).collect()
    }
}
