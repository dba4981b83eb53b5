//! Canonical rule keys built from encoded turn histories.
//!
//! A `FeatureKey` is an ordered list of key turns, oldest first. Each key
//! turn is either the sorted set of feature symbols of one turn (possibly
//! empty) or a `Wildcard` that accepts any turn.
//!
//! Textual form, used for persistence and logging:
//!
//! ```text
//! *|prev_action_listen|active_form_ask_name_form prev_action_listen
//! ^ wildcard turn       ^ one turn per segment, tokens space-separated
//! ```
//!
//! A symbol containing whitespace or `|`, or a bare `*`, has no faithful text
//! form; see [`is_key_symbol`]. The trainer refuses traces that carry one.

use dialogue_types::{
    active_form_feature, prev_action_feature, Turn, PREV_PREFIX, RULE_SNIPPET_ACTION_NAME,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

const TURN_SEPARATOR: char = '|';
const WILDCARD_SEGMENT: &str = "*";

/// Whether `symbol` renders and parses back as the same token.
pub fn is_key_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol != WILDCARD_SEGMENT
        && !symbol.contains(|c: char| c == TURN_SEPARATOR || c.is_whitespace())
}

/// One position in a rule key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyTurn {
    /// Matches any turn, including an empty one.
    Wildcard,
    /// Feature symbols required at this position. Empty means "empty turn".
    Features(BTreeSet<String>),
}

impl KeyTurn {
    pub fn from_turn(turn: &Turn) -> Self {
        KeyTurn::Features(turn.features().map(String::from).collect())
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, KeyTurn::Wildcard)
    }

    pub fn tokens(&self) -> Option<&BTreeSet<String>> {
        match self {
            KeyTurn::Wildcard => None,
            KeyTurn::Features(tokens) => Some(tokens),
        }
    }

    pub fn contains(&self, feature: &str) -> bool {
        self.tokens().is_some_and(|t| t.contains(feature))
    }

    /// Length of the rendered segment; wildcards count for nothing.
    fn rendered_len(&self) -> usize {
        match self {
            KeyTurn::Wildcard => 0,
            KeyTurn::Features(tokens) => {
                tokens.iter().map(String::len).sum::<usize>() + tokens.len().saturating_sub(1)
            }
        }
    }
}

impl fmt::Display for KeyTurn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyTurn::Wildcard => f.write_str(WILDCARD_SEGMENT),
            KeyTurn::Features(tokens) => {
                for (i, token) in tokens.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    f.write_str(token)?;
                }
                Ok(())
            }
        }
    }
}

/// Canonical, comparable encoding of a turn history.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureKey {
    turns: Vec<KeyTurn>,
}

impl FeatureKey {
    pub fn new(turns: Vec<KeyTurn>) -> Self {
        Self { turns }
    }

    /// Full-history key: one key turn per turn, empty turns kept in place.
    pub fn from_turns(turns: &[Turn]) -> Self {
        Self {
            turns: turns.iter().map(KeyTurn::from_turn).collect(),
        }
    }

    /// Two-turn window used to mine negative rules.
    ///
    /// The older turn is reduced to its `prev_*` features, so only "what ran
    /// before" conditions the rule. A placeholder-prior turn (`prev_...`) is
    /// prepended unless the older turn already carries one; cleaning later
    /// turns it into a wildcard.
    pub fn negative_window(turns: &[Turn]) -> Self {
        match turns {
            [] => Self::default(),
            [only] => Self::new(vec![KeyTurn::from_turn(only)]),
            [.., older, last] => {
                let snippet = prev_action_feature(RULE_SNIPPET_ACTION_NAME);
                let before = older.prev_action_features();
                let mut key_turns = Vec::with_capacity(3);
                if !before.contains(&snippet) {
                    key_turns.push(KeyTurn::Features(BTreeSet::from([snippet])));
                }
                key_turns.push(KeyTurn::from_turn(&before));
                key_turns.push(KeyTurn::from_turn(last));
                Self::new(key_turns)
            }
        }
    }

    /// Generalize at the most recent placeholder turn.
    ///
    /// Everything older than the turn whose previous action was the rule
    /// snippet placeholder is dropped and that turn becomes a wildcard.
    /// `None` if there is no placeholder, or if only wildcards would remain.
    pub fn generalized(&self) -> Option<FeatureKey> {
        let snippet = prev_action_feature(RULE_SNIPPET_ACTION_NAME);
        let pos = self.turns.iter().rposition(|t| t.contains(&snippet))?;

        let mut turns = Vec::with_capacity(self.turns.len() - pos);
        turns.push(KeyTurn::Wildcard);
        turns.extend(self.turns[pos + 1..].iter().cloned());

        if turns.iter().all(KeyTurn::is_wildcard) {
            return None;
        }
        Some(Self::new(turns))
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Key turns, oldest first.
    pub fn turns(&self) -> &[KeyTurn] {
        &self.turns
    }

    /// Key turn at reverse index `i` (0 = most recent).
    pub fn turn_at_reversed(&self, i: usize) -> Option<&KeyTurn> {
        self.turns.iter().rev().nth(i)
    }

    pub fn contains_feature(&self, feature: &str) -> bool {
        self.turns.iter().any(|t| t.contains(feature))
    }

    /// Whether any turn is conditioned on a previous action.
    pub fn has_prev_action_marker(&self) -> bool {
        self.turns
            .iter()
            .filter_map(KeyTurn::tokens)
            .flatten()
            .any(|token| token.starts_with(PREV_PREFIX))
    }

    pub fn has_rule_snippet(&self) -> bool {
        self.contains_feature(&prev_action_feature(RULE_SNIPPET_ACTION_NAME))
    }

    pub fn references_active_form(&self, form: &str) -> bool {
        self.contains_feature(&active_form_feature(form))
    }

    /// Raw key length used for longest-match precedence.
    ///
    /// Rendered length of the non-wildcard turns plus one separator between
    /// each consecutive pair of them.
    pub fn specificity(&self) -> usize {
        let segments: Vec<usize> = self
            .turns
            .iter()
            .filter(|t| !t.is_wildcard())
            .map(KeyTurn::rendered_len)
            .collect();
        segments.iter().sum::<usize>() + segments.len().saturating_sub(1)
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, turn) in self.turns.iter().enumerate() {
            if i > 0 {
                write!(f, "{TURN_SEPARATOR}")?;
            }
            write!(f, "{turn}")?;
        }
        Ok(())
    }
}

impl FromStr for FeatureKey {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(parse_key(s))
    }
}

fn parse_key(s: &str) -> FeatureKey {
    let turns = s
        .split(TURN_SEPARATOR)
        .map(|segment| {
            if segment.trim() == WILDCARD_SEGMENT {
                KeyTurn::Wildcard
            } else {
                KeyTurn::Features(segment.split_whitespace().map(String::from).collect())
            }
        })
        .collect();
    FeatureKey { turns }
}

impl Serialize for FeatureKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FeatureKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(parse_key(&raw))
    }
}
