//! Next-action prediction over three priority tiers.
//!
//! ```text
//! enabled? ──no──► nothing
//!    │
//!    ▼
//! listen + reserved intent ──► restart / back / session start   (absolute)
//!    │
//!    ▼
//! active, non-rejected form ──► form (or listen right after it)
//!    │
//!    ▼
//! rule matching ──► longest surviving key
//!    │               ├─ general listen rule inside a form ──► form
//!    │               │    unless a NoActiveForm rule survived ──► nothing
//!    │               └─ NoValidation rule survived ──► FormValidation(false)
//!    ▼
//! recalled action or nothing
//! ```

use crate::key::FeatureKey;
use crate::matching::rule_accepts;
use crate::trainer::{NegativeRule, RuleTables};
use dialogue_types::{
    ConversationTracker, Domain, TrackerEvent, Turn, ACTION_BACK_NAME, ACTION_LISTEN_NAME,
    ACTION_RESTART_NAME, ACTION_SESSION_START_NAME, USER_INTENT_BACK, USER_INTENT_RESTART,
    USER_INTENT_SESSION_START,
};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Built-in actions that overrule everything at any time.
pub const DEFAULT_ACTION_MAPPINGS: &[(&str, &str)] = &[
    (USER_INTENT_RESTART, ACTION_RESTART_NAME),
    (USER_INTENT_BACK, ACTION_BACK_NAME),
    (USER_INTENT_SESSION_START, ACTION_SESSION_START_NAME),
];

/// Why the predictor chose what it chose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictionReason {
    Disabled,
    /// A reserved intent right after listening.
    DefaultAction,
    /// The active form did not run yet and is forced.
    ActiveForm,
    /// The active form just ran; wait for the user.
    ListenAfterForm,
    /// A memorized rule matched.
    Rule(FeatureKey),
    /// A general rule predicted listen inside a form; the form takes over.
    FormOverGeneralRule(FeatureKey),
    /// A general listen rule inside a form was vetoed by a negative rule.
    Suppressed(FeatureKey),
    NoRule,
}

/// Result of one prediction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    /// Index of the chosen action, if any.
    pub action: Option<usize>,
    pub reason: PredictionReason,
    /// A `NoValidation` rule matched and the tracker was told so.
    pub skipped_validation: bool,
}

impl Prediction {
    fn new(action: Option<usize>, reason: PredictionReason) -> Self {
        Self {
            action,
            reason,
            skipped_validation: false,
        }
    }

    pub fn nothing(reason: PredictionReason) -> Self {
        Self::new(None, reason)
    }

    /// One-hot vector over the domain's actions, or all zeros.
    pub fn probabilities(&self, num_actions: usize) -> Vec<f32> {
        let mut result = vec![0.0; num_actions];
        if let Some(slot) = self.action.and_then(|index| result.get_mut(index)) {
            *slot = 1.0;
        }
        result
    }
}

/// Reserved intent -> built-in action, if the tracker just listened.
pub fn default_action_for<T: ConversationTracker + ?Sized>(tracker: &T) -> Option<&'static str> {
    if tracker.latest_action_name() != Some(ACTION_LISTEN_NAME) {
        return None;
    }
    let intent = tracker.latest_intent_name()?;
    DEFAULT_ACTION_MAPPINGS
        .iter()
        .find(|(reserved, _)| *reserved == intent)
        .map(|(_, action)| *action)
}

/// Reads rule tables; never mutates them.
pub struct Predictor<'a> {
    tables: &'a RuleTables,
    domain: &'a Domain,
}

impl<'a> Predictor<'a> {
    pub fn new(tables: &'a RuleTables, domain: &'a Domain) -> Self {
        Self { tables, domain }
    }

    /// Predict the next action for `turns` (chronological) and `tracker`.
    pub fn predict<T: ConversationTracker + ?Sized>(
        &self,
        turns: &[Turn],
        tracker: &mut T,
    ) -> Prediction {
        if let Some(action) = default_action_for(tracker) {
            match self.domain.index_for_action(action) {
                Some(index) => {
                    debug!("Predicted default action '{}'.", action);
                    return Prediction::new(Some(index), PredictionReason::DefaultAction);
                }
                None => warn!("Default action '{}' is not in the domain", action),
            }
        }

        let active_form = tracker
            .active_form()
            .map(|form| (form.name.clone(), form.rejected));

        // A form has priority over any rule unless it rejected the message.
        if let Some((form, false)) = &active_form {
            let form_just_ran = tracker.latest_action_name() == Some(form.as_str());
            let (action, reason) = if form_just_ran {
                (ACTION_LISTEN_NAME, PredictionReason::ListenAfterForm)
            } else {
                (form.as_str(), PredictionReason::ActiveForm)
            };
            match self.domain.index_for_action(action) {
                Some(index) => {
                    debug!("Predicted '{}' for active form '{}'.", action, form);
                    return Prediction::new(Some(index), reason);
                }
                None => warn!("Form action '{}' is not in the domain", action),
            }
        }

        debug!("Current tracker state: {:?}", turns);
        let best = self.best_rule(turns);
        let negatives: Vec<NegativeRule> = surviving(&self.tables.negative_lookup, turns)
            .into_iter()
            .map(|(_, rule)| *rule)
            .collect();

        let mut prediction = match &best {
            Some((key, index)) => {
                Prediction::new(Some(*index), PredictionReason::Rule((*key).clone()))
            }
            None => Prediction::nothing(PredictionReason::NoRule),
        };

        if let Some((form, _)) = &active_form {
            // Rule snippets and stories inside the form only hold unhappy
            // paths, so the form must not validate the answer to a different
            // question.
            if negatives.contains(&NegativeRule::NoValidation) {
                debug!("Added `FormValidation(false)` event.");
                tracker.update(TrackerEvent::FormValidation { validate: false });
                prediction.skipped_validation = true;
            }

            // Rules do not have to switch back to the form explicitly.
            if let Some((key, index)) = &best {
                let general_listen = self.domain.action_name(*index) == Some(ACTION_LISTEN_NAME)
                    && !key.references_active_form(form);
                if general_listen {
                    if negatives.contains(&NegativeRule::NoActiveForm) {
                        debug!("Suppressed '{}' predicted by general rule.", ACTION_LISTEN_NAME);
                        prediction.action = None;
                        prediction.reason = PredictionReason::Suppressed((*key).clone());
                    } else if let Some(form_index) = self.domain.index_for_action(form) {
                        debug!(
                            "Predicted form '{}' by overwriting '{}' predicted by general rule.",
                            form, ACTION_LISTEN_NAME
                        );
                        prediction.action = Some(form_index);
                        prediction.reason = PredictionReason::FormOverGeneralRule((*key).clone());
                    }
                }
            }
        }

        match prediction.action.and_then(|index| self.domain.action_name(index)) {
            Some(name) => debug!("There is a rule for next action '{}'.", name),
            None => debug!("There is no applicable rule."),
        }
        prediction
    }

    /// Surviving positive rule with the greatest specificity.
    ///
    /// Ties go to the lexicographically smallest textual key.
    fn best_rule(&self, turns: &[Turn]) -> Option<(&'a FeatureKey, usize)> {
        let tables: &'a RuleTables = self.tables;
        surviving(&tables.lookup, turns)
            .into_iter()
            .map(|(key, index)| ((key.specificity(), Reverse(key.to_string())), key, *index))
            .max_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, key, index)| (key, index))
    }
}

/// Keys of `table` that accept every turn of `turns`, walking backwards.
fn surviving<'t, V>(
    table: &'t BTreeMap<FeatureKey, V>,
    turns: &[Turn],
) -> Vec<(&'t FeatureKey, &'t V)> {
    let mut candidates: Vec<(&FeatureKey, &V)> = table.iter().collect();
    for (i, turn) in turns.iter().rev().enumerate() {
        candidates.retain(|(key, _)| rule_accepts(key, i, turn));
    }
    candidates
}
