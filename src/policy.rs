//! `RulePolicy`: owns the configuration and both rule tables.

use crate::config::PolicyConfig;
use crate::error::PolicyError;
use crate::persistence::PolicySnapshot;
use crate::predictor::{Prediction, PredictionReason, Predictor};
use crate::trainer::{Lookup, NegativeLookup, RuleTables, Trainer, TrainingReport};
use dialogue_types::{ConversationTracker, Domain, TrainingTrace, Turn};
use std::path::Path;
use tracing::{info, instrument, warn};

/// Memorized-rule policy.
///
/// Training takes `&mut self` and prediction `&self`; the tables have no
/// internal synchronization, so sharing a policy across threads needs an
/// outer lock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RulePolicy {
    config: PolicyConfig,
    tables: RuleTables,
}

impl RulePolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            config,
            tables: RuleTables::default(),
        }
    }

    pub fn with_tables(config: PolicyConfig, tables: RuleTables) -> Self {
        Self { config, tables }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn priority(&self) -> i32 {
        self.config.priority
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn tables(&self) -> &RuleTables {
        &self.tables
    }

    pub fn lookup(&self) -> &Lookup {
        &self.tables.lookup
    }

    pub fn negative_lookup(&self) -> &NegativeLookup {
        &self.tables.negative_lookup
    }

    /// Replace both tables with rules memorized from `traces`.
    #[instrument(skip_all, fields(traces = traces.len()))]
    pub fn train(&mut self, traces: &[TrainingTrace], domain: &Domain) -> TrainingReport {
        let (tables, report) = Trainer::new(domain).train(traces);
        self.tables = tables;
        info!(
            rules = report.rules,
            negative_rules = report.negative_rules,
            contradictions = report.contradictions.len(),
            "Trained rule policy"
        );
        report
    }

    /// Predict the next action, reporting why.
    pub fn predict<T: ConversationTracker + ?Sized>(
        &self,
        turns: &[Turn],
        tracker: &mut T,
        domain: &Domain,
    ) -> Prediction {
        if !self.is_enabled() {
            return Prediction::nothing(PredictionReason::Disabled);
        }
        Predictor::new(&self.tables, domain).predict(turns, tracker)
    }

    /// One-hot vector over `domain`'s actions, or all zeros.
    pub fn predict_action_probabilities<T: ConversationTracker + ?Sized>(
        &self,
        turns: &[Turn],
        tracker: &mut T,
        domain: &Domain,
    ) -> Vec<f32> {
        self.predict(turns, tracker, domain)
            .probabilities(domain.num_actions())
    }

    pub fn persist(&self, dir: &Path) -> Result<(), PolicyError> {
        let path = PolicySnapshot::new(&self.config, &self.tables).write(dir)?;
        info!("Persisted rule policy to '{}'", path.display());
        Ok(())
    }

    /// Load a persisted policy. Never fails: a missing or broken snapshot
    /// yields an empty policy, leaving only the priority overlays active.
    pub fn load(dir: &Path) -> Self {
        match PolicySnapshot::read(dir) {
            Ok(Some(snapshot)) => {
                let config = snapshot.config();
                Self::with_tables(config, snapshot.into_tables())
            }
            Ok(None) => {
                info!(
                    "Couldn't load memoization for policy. File '{}' doesn't exist. \
                     Falling back to empty turn memory.",
                    PolicySnapshot::file_in(dir).display()
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    code = err.code(),
                    "Couldn't load memoization for policy: {}. Falling back to empty turn memory.",
                    err
                );
                Self::default()
            }
        }
    }
}
