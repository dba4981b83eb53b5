//! Rule Policy - memorized-rule next-action prediction for dialogue agents
//!
//! Rules are memorized conversation histories. At prediction time the live
//! history is matched against every memorized key; the most specific survivor
//! wins. Two overlays take precedence over any rule: built-in default actions
//! (restart, back, session start) and an active slot-filling form.
//!
//! # Architecture
//!
//! ```text
//! TrainingTrace (encoded turns + actions)
//!       │
//!       ▼
//! ┌─────────────────────────────────────────┐
//! │  Trainer                                │
//! │  rule traces  → Lookup (key → action)   │
//! │  all traces   → NegativeLookup          │
//! │  cleaning     → wildcard generalization │
//! └─────────────────────────────────────────┘
//!       │
//!       ▼
//! ┌─────────────────────────────────────────┐
//! │  Predictor                              │
//! │  default action ► active form ► rules   │
//! └─────────────────────────────────────────┘
//!       │
//!       ├──► one-hot probabilities over the domain's actions
//!       └──► FormValidation(false) on the tracker
//! ```
//!
//! # Example
//!
//! ```
//! use rule_policy::RulePolicy;
//! use dialogue_types::{DialogueTracker, Domain, TrainingTrace, Turn, ACTION_LISTEN_NAME};
//!
//! let domain = Domain::new(["utter_greet"], Vec::<String>::new());
//! let greet = Turn::from_features(["prev_action_listen", "intent_greet"]);
//!
//! let mut policy = RulePolicy::default();
//! policy.train(
//!     &[TrainingTrace::rule("greet").step(greet.clone(), "utter_greet")],
//!     &domain,
//! );
//!
//! let mut tracker = DialogueTracker::new("user").with_action(ACTION_LISTEN_NAME);
//! let probs = policy.predict_action_probabilities(&[greet], &mut tracker, &domain);
//! assert_eq!(probs[domain.index_for_action("utter_greet").unwrap()], 1.0);
//! ```

pub mod config;
pub mod error;
pub mod key;
pub mod matching;
pub mod persistence;
pub mod policy;
pub mod predictor;
pub mod trainer;
pub mod training_data;

pub use config::{DomainConfig, PolicyConfig, FORM_POLICY_PRIORITY};
pub use error::PolicyError;
pub use key::{is_key_symbol, FeatureKey, KeyTurn};
pub use persistence::{PolicySnapshot, MEMORIZED_FILE_NAME};
pub use policy::RulePolicy;
pub use predictor::{Prediction, PredictionReason, Predictor, DEFAULT_ACTION_MAPPINGS};
pub use trainer::{
    Contradiction, Lookup, NegativeLookup, NegativeRule, RuleTables, Trainer, TrainingReport,
};
