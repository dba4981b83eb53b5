//! Turn-level rule matching.
//!
//! A key is checked against a live conversation one position at a time,
//! walking backwards from the most recent turn. Key turns older than the
//! key's own start are exhausted and always match; live turns older than the
//! conversation's start are never visited.

use crate::key::{FeatureKey, KeyTurn};
use dialogue_types::{feature_base, Turn, NONE_SUFFIX, SLOT_PREFIX};
use std::collections::{BTreeMap, BTreeSet};

/// Whether `key` accepts `turn` at reverse index `turn_index`.
pub fn rule_accepts(key: &FeatureKey, turn_index: usize, turn: &Turn) -> bool {
    match key.turn_at_reversed(turn_index) {
        // rule is shorter than the current turn index
        None => true,
        Some(KeyTurn::Wildcard) => true,
        // an empty rule turn only matches an empty state turn
        Some(KeyTurn::Features(tokens)) if tokens.is_empty() => turn.is_empty(),
        Some(KeyTurn::Features(tokens)) => !turn.is_empty() && features_in_state(tokens, turn),
    }
}

/// Whether `key` accepts every turn of `turns` (chronological order).
pub fn matches_conversation(key: &FeatureKey, turns: &[Turn]) -> bool {
    turns
        .iter()
        .rev()
        .enumerate()
        .all(|(i, turn)| rule_accepts(key, i, turn))
}

/// Whether the rule tokens of one key turn hold in a live turn.
///
/// - `<base>_None` requires that no live feature other than `<base>_None`
///   itself starts with `<base>`.
/// - Every other token must be present.
/// - Slot tokens, grouped by slot base name, must equal the live turn's slot
///   features for that base exactly; a subset is not enough.
pub fn features_in_state(tokens: &BTreeSet<String>, turn: &Turn) -> bool {
    let mut required_slots: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

    for token in tokens {
        if token.ends_with(NONE_SUFFIX) {
            let base = feature_base(token);
            if turn.features().any(|f| f != token.as_str() && f.starts_with(base)) {
                return false;
            }
        } else if !turn.contains(token) {
            return false;
        } else if token.starts_with(SLOT_PREFIX) {
            required_slots
                .entry(feature_base(token))
                .or_default()
                .insert(token.as_str());
        }
    }

    if required_slots.is_empty() {
        return true;
    }

    let live_slots = slot_groups(turn);
    required_slots
        .iter()
        .all(|(base, required)| live_slots.get(base) == Some(required))
}

fn slot_groups(turn: &Turn) -> BTreeMap<&str, BTreeSet<&str>> {
    let mut groups: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for feature in turn.features().filter(|f| f.starts_with(SLOT_PREFIX)) {
        groups.entry(feature_base(feature)).or_default().insert(feature);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(features: &[&str]) -> Turn {
        Turn::from_features(features.iter().copied())
    }

    fn tokens(features: &[&str]) -> BTreeSet<String> {
        features.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn all_tokens_must_be_present() {
        let live = turn(&["prev_action_listen", "intent_greet"]);
        assert!(features_in_state(&tokens(&["prev_action_listen"]), &live));
        assert!(!features_in_state(&tokens(&["prev_action_listen", "intent_bye"]), &live));
    }

    #[test]
    fn none_token_requires_absence() {
        let rule = tokens(&["prev_action_listen", "active_form_None"]);
        assert!(features_in_state(&rule, &turn(&["prev_action_listen"])));
        assert!(!features_in_state(
            &rule,
            &turn(&["prev_action_listen", "active_form_ask_name_form"])
        ));
    }

    #[test]
    fn none_token_accepts_its_own_symbol() {
        let rule = tokens(&["prev_action_listen", "active_form_None", "slot_name_None"]);
        let live = turn(&["prev_action_listen", "active_form_None", "slot_name_None"]);
        assert!(features_in_state(&rule, &live));
        assert!(!features_in_state(
            &rule,
            &turn(&["prev_action_listen", "active_form_None", "slot_name_0"])
        ));
    }

    #[test]
    fn slot_sets_match_exactly() {
        let rule = tokens(&["slot_cuisine_0"]);
        assert!(features_in_state(&rule, &turn(&["slot_cuisine_0"])));
        // the live slot carries an extra bucket the rule did not ask for
        assert!(!features_in_state(
            &rule,
            &turn(&["slot_cuisine_0", "slot_cuisine_1"])
        ));
        // other slots do not matter
        assert!(features_in_state(
            &rule,
            &turn(&["slot_cuisine_0", "slot_people_0", "slot_people_1"])
        ));
    }

    #[test]
    fn empty_rule_turn_only_matches_empty_turn() {
        let key: FeatureKey = "|prev_action_listen".parse().unwrap();
        assert!(rule_accepts(&key, 1, &Turn::new()));
        assert!(!rule_accepts(&key, 1, &turn(&["prev_action_listen"])));
    }

    #[test]
    fn non_empty_rule_turn_rejects_empty_turn() {
        let key: FeatureKey = "prev_action_listen".parse().unwrap();
        assert!(!rule_accepts(&key, 0, &Turn::new()));
    }

    #[test]
    fn exhausted_and_wildcard_turns_match() {
        let key: FeatureKey = "*|prev_action_listen".parse().unwrap();
        let anything = turn(&["intent_whatever", "prev_utter_x"]);
        assert!(rule_accepts(&key, 1, &anything));
        assert!(rule_accepts(&key, 1, &Turn::new()));
        assert!(rule_accepts(&key, 2, &anything));
    }

    #[test]
    fn conversation_match_walks_backwards() {
        let key: FeatureKey = "|prev_action_listen intent_greet".parse().unwrap();
        let conversation = [Turn::new(), turn(&["prev_action_listen", "intent_greet"])];
        assert!(matches_conversation(&key, &conversation));

        let swapped = [turn(&["prev_action_listen", "intent_greet"]), Turn::new()];
        assert!(!matches_conversation(&key, &swapped));
    }
}
