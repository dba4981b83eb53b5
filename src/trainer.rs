//! Rule memorization.
//!
//! Rule traces are memorized verbatim as full-history keys. All traces, rule
//! and freeform alike, are mined for unhappy paths inside active forms, which
//! become negative rules.

use crate::key::{is_key_symbol, FeatureKey};
use dialogue_types::{Domain, TrainingTrace, Turn, ACTION_LISTEN_NAME, RULE_SNIPPET_ACTION_NAME};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Positive rules: key -> action index.
pub type Lookup = BTreeMap<FeatureKey, usize>;

/// Negative rules: key -> suppression marker.
pub type NegativeLookup = BTreeMap<FeatureKey, NegativeRule>;

/// Outcome of a negative rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativeRule {
    /// The form was re-entered straight from user input on an unhappy path;
    /// it must not validate the requested slot this turn.
    NoValidation,
    /// An unrelated action ran inside the form; a general rule must not hand
    /// control back to the form.
    NoActiveForm,
}

impl NegativeRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegativeRule::NoValidation => "no_validation",
            NegativeRule::NoActiveForm => "no_active_form",
        }
    }
}

/// Both rule tables produced by one training run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleTables {
    pub lookup: Lookup,
    pub negative_lookup: NegativeLookup,
}

/// A key that was memorized with two different actions. The later one won.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contradiction {
    pub key: String,
    pub previous: String,
    pub replacement: String,
}

/// Summary of a training run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrainingReport {
    pub rule_traces: usize,
    pub freeform_traces: usize,
    pub augmented_skipped: usize,
    pub rules: usize,
    pub negative_rules: usize,
    /// Keys silently overwritten with a different action.
    pub contradictions: Vec<Contradiction>,
    /// Actions that appeared in rule traces but not in the domain.
    pub unknown_actions: Vec<String>,
    /// Traces skipped because a feature symbol has no key text form.
    pub invalid_traces: Vec<String>,
}

/// Builds rule tables from labeled traces against one domain.
pub struct Trainer<'a> {
    domain: &'a Domain,
}

impl<'a> Trainer<'a> {
    pub fn new(domain: &'a Domain) -> Self {
        Self { domain }
    }

    pub fn train(&self, traces: &[TrainingTrace]) -> (RuleTables, TrainingReport) {
        let mut report = TrainingReport::default();

        // only consider original traces (no augmented ones)
        let (augmented, original): (Vec<&TrainingTrace>, Vec<&TrainingTrace>) =
            traces.iter().partition(|t| t.is_augmented);
        report.augmented_skipped = augmented.len();

        let mut accepted = Vec::with_capacity(original.len());
        for trace in original {
            let invalid = trace
                .steps
                .iter()
                .flat_map(|step| step.turn.features())
                .find(|symbol| !is_key_symbol(symbol));
            match invalid {
                Some(symbol) => {
                    warn!(
                        "Trace '{}' has feature '{}' that cannot be part of a rule key, skipping",
                        trace.name, symbol
                    );
                    report.invalid_traces.push(trace.name.clone());
                }
                None => accepted.push(trace),
            }
        }

        let (rule_traces, freeform_traces): (Vec<&TrainingTrace>, Vec<&TrainingTrace>) =
            accepted.into_iter().partition(|t| t.is_rule());
        report.rule_traces = rule_traces.len();
        report.freeform_traces = freeform_traces.len();

        let rule_samples = samples(&rule_traces);
        let freeform_samples = samples(&freeform_traces);

        let mut lookup = Lookup::new();
        for (turns, action) in &rule_samples {
            let Some(index) = self.domain.index_for_action(action) else {
                warn!("Rule action '{}' is not in the domain, skipping", action);
                if !report.unknown_actions.iter().any(|a| a == action) {
                    report.unknown_actions.push(action.to_string());
                }
                continue;
            };
            let key = FeatureKey::from_turns(turns);
            self.insert_rule(&mut lookup, key, index, &mut report);
        }
        let lookup = self.clean_lookup(lookup, &mut report);

        let mut negative_lookup = NegativeLookup::new();
        for (turns, action) in rule_samples.iter().chain(&freeform_samples) {
            if let Some((key, rule)) = mine_negative_rule(turns, action) {
                negative_lookup.insert(key, rule);
            }
        }
        let negative_lookup = clean_feature_keys(negative_lookup, |_| false, |_, _, _| {});

        report.rules = lookup.len();
        report.negative_rules = negative_lookup.len();
        debug!("Memorized {} unique examples.", lookup.len());

        (
            RuleTables {
                lookup,
                negative_lookup,
            },
            report,
        )
    }

    /// Last write wins; a different action under the same key is reported.
    fn insert_rule(
        &self,
        lookup: &mut Lookup,
        key: FeatureKey,
        index: usize,
        report: &mut TrainingReport,
    ) {
        if let Some(previous) = lookup.insert(key.clone(), index) {
            if previous != index {
                self.record_contradiction(&key, previous, index, report);
            }
        }
    }

    fn clean_lookup(&self, lookup: Lookup, report: &mut TrainingReport) -> Lookup {
        let snippet_index = self.domain.index_for_action(RULE_SNIPPET_ACTION_NAME);
        clean_feature_keys(
            lookup,
            |index| Some(*index) == snippet_index,
            |key, previous, replacement| {
                self.record_contradiction(key, *previous, *replacement, report)
            },
        )
    }

    fn record_contradiction(
        &self,
        key: &FeatureKey,
        previous: usize,
        replacement: usize,
        report: &mut TrainingReport,
    ) {
        let name = |index: usize| {
            self.domain
                .action_name(index)
                .map(String::from)
                .unwrap_or_else(|| index.to_string())
        };
        let contradiction = Contradiction {
            key: key.to_string(),
            previous: name(previous),
            replacement: name(replacement),
        };
        warn!(
            "Rule '{}' predicted '{}' and is now overwritten with '{}'",
            contradiction.key, contradiction.previous, contradiction.replacement
        );
        report.contradictions.push(contradiction);
    }
}

/// Every `(history, action)` point of the given traces.
fn samples<'t>(traces: &[&'t TrainingTrace]) -> Vec<(Vec<Turn>, &'t str)> {
    let mut out = Vec::new();
    for &trace in traces {
        let turns = trace.turns();
        for (i, step) in trace.steps.iter().enumerate() {
            out.push((turns[..=i].to_vec(), step.action.as_str()));
        }
    }
    out
}

/// Negative rule for one training point inside an active form, if any.
fn mine_negative_rule(turns: &[Turn], action: &str) -> Option<(FeatureKey, NegativeRule)> {
    let last = turns.last()?;
    // even if two points share a key, the `active_form_*` feature pins the form
    let form = last.active_form_name()?;
    let key = FeatureKey::negative_window(turns);
    let listened = last.has_prev_action(ACTION_LISTEN_NAME);

    if listened && action == form {
        // form re-entered after user input on an unhappy path
        Some((key, NegativeRule::NoValidation))
    } else if !listened && action != ACTION_LISTEN_NAME && action != form {
        // something other than listen or the form ran inside the form
        Some((key, NegativeRule::NoActiveForm))
    } else {
        None
    }
}

/// Drop meaningless keys and generalize placeholder keys.
///
/// - keys with no `prev_*` condition are dropped;
/// - keys whose value is the placeholder action are dropped;
/// - keys carrying `prev_...` are replaced by their generalized form.
///
/// `on_overwrite(key, previous, replacement)` fires when a generalized key
/// replaces a different value.
fn clean_feature_keys<V, P, O>(
    table: BTreeMap<FeatureKey, V>,
    predicts_placeholder: P,
    mut on_overwrite: O,
) -> BTreeMap<FeatureKey, V>
where
    V: Copy + PartialEq,
    P: Fn(&V) -> bool,
    O: FnMut(&FeatureKey, &V, &V),
{
    let mut kept = BTreeMap::new();
    let mut generalized = Vec::new();

    for (key, value) in table {
        if !key.has_prev_action_marker() || predicts_placeholder(&value) {
            continue;
        }
        if key.has_rule_snippet() {
            // anything can match the placeholder turn and what came before it
            if let Some(general) = key.generalized() {
                generalized.push((general, value));
            }
            continue;
        }
        kept.insert(key, value);
    }

    for (key, value) in generalized {
        if let Some(previous) = kept.insert(key.clone(), value) {
            if previous != value {
                on_overwrite(&key, &previous, &value);
            }
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn turn(features: &[&str]) -> Turn {
        Turn::from_features(features.iter().copied())
    }

    fn domain() -> Domain {
        Domain::new(["utter_greet", "utter_chitchat"], ["ask_name_form"])
    }

    fn key(text: &str) -> FeatureKey {
        text.parse().unwrap()
    }

    #[test]
    fn rule_trace_is_memorized_with_full_history() {
        let domain = domain();
        let trace = TrainingTrace::rule("greet")
            .step(Turn::new(), ACTION_LISTEN_NAME)
            .step(turn(&["prev_action_listen", "intent_greet"]), "utter_greet");

        let (tables, report) = Trainer::new(&domain).train(&[trace]);

        // the first point has no previous action and is dropped
        assert_eq!(tables.lookup.len(), 1);
        assert_eq!(
            tables.lookup.get(&key("|intent_greet prev_action_listen")),
            domain.index_for_action("utter_greet").as_ref()
        );
        assert_eq!(report.rules, 1);
        assert_eq!(report.rule_traces, 1);
    }

    #[test]
    fn augmented_traces_are_ignored() {
        let domain = domain();
        let trace = TrainingTrace::rule("aug")
            .augmented()
            .step(turn(&["prev_action_listen"]), "utter_greet");

        let (tables, report) = Trainer::new(&domain).train(&[trace]);
        assert!(tables.lookup.is_empty());
        assert_eq!(report.augmented_skipped, 1);
    }

    #[test]
    fn freeform_traces_do_not_add_positive_rules() {
        let domain = domain();
        let trace = TrainingTrace::freeform("story")
            .step(turn(&["prev_action_listen", "intent_greet"]), "utter_greet");

        let (tables, report) = Trainer::new(&domain).train(&[trace]);
        assert!(tables.lookup.is_empty());
        assert_eq!(report.freeform_traces, 1);
    }

    #[test]
    fn placeholder_rules_are_generalized() {
        let domain = domain();
        let trace = TrainingTrace::rule("chitchat anywhere")
            .step(Turn::new(), RULE_SNIPPET_ACTION_NAME)
            .step(turn(&["prev_..."]), ACTION_LISTEN_NAME)
            .step(turn(&["prev_action_listen", "intent_chitchat"]), "utter_chitchat");

        let (tables, _) = Trainer::new(&domain).train(&[trace]);

        // the listen right after the placeholder generalizes to nothing
        let keys: Vec<String> = tables.lookup.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["*|intent_chitchat prev_action_listen".to_string()]);
        assert_eq!(
            tables.lookup.values().next().copied(),
            domain.index_for_action("utter_chitchat")
        );
    }

    #[test]
    fn placeholder_followed_by_turn_keeps_the_tail() {
        let domain = domain();
        let trace = TrainingTrace::rule("chitchat then listen")
            .step(turn(&["intent_greet"]), RULE_SNIPPET_ACTION_NAME)
            .step(turn(&["prev_...", "intent_chitchat"]), "utter_chitchat")
            .step(turn(&["prev_utter_chitchat", "intent_chitchat"]), ACTION_LISTEN_NAME);

        let (tables, _) = Trainer::new(&domain).train(&[trace]);

        assert_eq!(tables.lookup.len(), 1);
        let (key, index) = tables.lookup.iter().next().unwrap();
        assert_eq!(key.to_string(), "*|intent_chitchat prev_utter_chitchat");
        assert_eq!(domain.action_name(*index), Some(ACTION_LISTEN_NAME));
    }

    #[test]
    fn contradicting_rules_overwrite_and_are_reported() {
        let domain = domain();
        let first = TrainingTrace::rule("a").step(turn(&["prev_action_listen"]), "utter_greet");
        let second =
            TrainingTrace::rule("b").step(turn(&["prev_action_listen"]), "utter_chitchat");

        let (tables, report) = Trainer::new(&domain).train(&[first, second]);

        assert_eq!(
            tables.lookup.get(&key("prev_action_listen")),
            domain.index_for_action("utter_chitchat").as_ref()
        );
        assert_eq!(
            report.contradictions,
            vec![Contradiction {
                key: "prev_action_listen".into(),
                previous: "utter_greet".into(),
                replacement: "utter_chitchat".into(),
            }]
        );
    }

    #[test]
    fn unknown_actions_are_skipped() {
        let domain = domain();
        let trace = TrainingTrace::rule("x").step(turn(&["prev_action_listen"]), "utter_missing");
        let (tables, report) = Trainer::new(&domain).train(&[trace]);
        assert!(tables.lookup.is_empty());
        assert_eq!(report.unknown_actions, vec!["utter_missing".to_string()]);
    }

    #[test]
    fn unhappy_path_mines_no_validation() {
        let domain = domain();
        let form_turn = |prev: &str, intent: &str| {
            turn(&[prev, intent, "active_form_ask_name_form"])
        };
        let story = TrainingTrace::freeform("unhappy")
            .step(form_turn("prev_ask_name_form", "intent_inform"), ACTION_LISTEN_NAME)
            .step(form_turn("prev_action_listen", "intent_chitchat"), "utter_chitchat")
            .step(form_turn("prev_utter_chitchat", "intent_chitchat"), "ask_name_form");

        // no point of this story is an unhappy-path re-entry
        let (tables, _) = Trainer::new(&domain).train(&[story]);
        assert!(tables.negative_lookup.is_empty());

        let rule = TrainingTrace::rule("re-enter")
            .step(form_turn("prev_utter_chitchat", "intent_chitchat"), ACTION_LISTEN_NAME)
            .step(form_turn("prev_action_listen", "intent_inform"), "ask_name_form");
        let (tables, _) = Trainer::new(&domain).train(&[rule]);

        let expected =
            key("*|prev_utter_chitchat|active_form_ask_name_form intent_inform prev_action_listen");
        assert_eq!(
            tables.negative_lookup.get(&expected),
            Some(&NegativeRule::NoValidation)
        );
    }

    #[test]
    fn unrelated_action_mines_no_active_form() {
        let domain = domain();
        let story = TrainingTrace::freeform("unhappy")
            .step(
                turn(&["prev_action_listen", "intent_chitchat", "active_form_ask_name_form"]),
                "utter_chitchat",
            )
            .step(
                turn(&["prev_utter_chitchat", "intent_chitchat", "active_form_ask_name_form"]),
                "utter_greet",
            );

        let (tables, _) = Trainer::new(&domain).train(&[story]);

        let expected = key(
            "*|prev_action_listen|active_form_ask_name_form intent_chitchat prev_utter_chitchat",
        );
        assert_eq!(
            tables.negative_lookup.get(&expected),
            Some(&NegativeRule::NoActiveForm)
        );
        assert_eq!(tables.negative_lookup.len(), 1);
    }

    #[test]
    fn traces_with_unrepresentable_features_are_skipped() {
        let domain = domain();
        let wildcard_feature = TrainingTrace::rule("star")
            .step(turn(&["prev_action_listen", "*"]), "utter_greet");
        let spaced = TrainingTrace::freeform("spaced")
            .step(turn(&["prev_action_listen", "intent hello"]), "utter_greet");
        let fine = TrainingTrace::rule("fine")
            .step(turn(&["prev_action_listen", "intent_greet"]), "utter_greet");

        let (tables, report) = Trainer::new(&domain).train(&[wildcard_feature, spaced, fine]);

        assert_eq!(report.invalid_traces, vec!["star".to_string(), "spaced".to_string()]);
        assert_eq!(report.rule_traces, 1);
        assert_eq!(report.freeform_traces, 0);
        assert_eq!(
            tables.lookup.keys().map(|k| k.to_string()).collect::<Vec<_>>(),
            vec!["intent_greet prev_action_listen".to_string()]
        );
    }

    #[test]
    fn clean_drops_keys_without_prev_marker() {
        let mut table = BTreeMap::new();
        table.insert(key("intent_greet"), 5usize);
        table.insert(key("prev_action_listen"), 6usize);
        let cleaned = clean_feature_keys(table, |_| false, |_, _, _| {});
        assert_eq!(cleaned.len(), 1);
        assert!(cleaned.contains_key(&key("prev_action_listen")));
    }
}
