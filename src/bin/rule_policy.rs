//! rule_policy - train, inspect and query a memorized-rule policy
//!
//! Usage:
//!   cargo run --features cli --bin rule_policy -- train \
//!     --domain domain.yml --traces rules.yml --out models/rules
//!
//!   cargo run --features cli --bin rule_policy -- inspect --model models/rules
//!
//!   cargo run --features cli --bin rule_policy -- predict \
//!     --model models/rules --domain domain.yml --state conversation.yml
//!
//! Logging follows `RUST_LOG` (default: warn).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use rule_policy::training_data::{ConversationFile, TrainingDataFile};
use rule_policy::{DomainConfig, PolicyConfig, PolicyError, RulePolicy};

#[derive(Parser)]
#[command(name = "rule_policy")]
#[command(about = "Memorized-rule dialogue policy")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Memorize rules from training traces and persist the model
    Train {
        /// Domain YAML (actions, forms)
        #[arg(long)]
        domain: PathBuf,
        /// Training traces YAML
        #[arg(long)]
        traces: PathBuf,
        /// Model output directory
        #[arg(long)]
        out: PathBuf,
        /// Policy config YAML
        #[arg(long, env = "RULE_POLICY_CONFIG")]
        config: Option<PathBuf>,
        /// Fail instead of skipping rules whose action is not in the domain
        #[arg(long)]
        strict: bool,
    },

    /// List memorized rules and negative rules
    Inspect {
        /// Model directory
        #[arg(long)]
        model: PathBuf,
    },

    /// Predict the next action for a conversation
    Predict {
        /// Model directory
        #[arg(long)]
        model: PathBuf,
        /// Domain YAML (actions, forms)
        #[arg(long)]
        domain: PathBuf,
        /// Conversation YAML
        #[arg(long)]
        state: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            domain,
            traces,
            out,
            config,
            strict,
        } => {
            let config = match config {
                Some(path) => PolicyConfig::load(&path)
                    .with_context(|| format!("loading policy config {}", path.display()))?,
                None => PolicyConfig::default(),
            }
            .with_env_overrides()?;
            let domain = DomainConfig::load(&domain)?.into_domain();
            let traces = TrainingDataFile::load(&traces)?.into_traces();

            let mut policy = RulePolicy::new(config);
            let report = policy.train(&traces, &domain);
            if strict && !report.unknown_actions.is_empty() {
                return Err(PolicyError::UnknownAction(report.unknown_actions.join(", ")).into());
            }
            policy.persist(&out)?;

            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Inspect { model } => {
            let policy = RulePolicy::load(&model);
            println!(
                "priority: {}  max_history: {}",
                policy.priority(),
                policy
                    .config()
                    .max_history
                    .map(|h| h.to_string())
                    .unwrap_or_else(|| "unbounded".into())
            );
            println!("rules ({}):", policy.lookup().len());
            for (key, index) in policy.lookup() {
                println!("  [{}] => {}", key, index);
            }
            println!("negative rules ({}):", policy.negative_lookup().len());
            for (key, rule) in policy.negative_lookup() {
                println!("  [{}] => {}", key, rule.as_str());
            }
        }

        Command::Predict {
            model,
            domain,
            state,
        } => {
            let policy = RulePolicy::load(&model);
            let domain = DomainConfig::load(&domain)?.into_domain();
            let conversation = ConversationFile::load(&state)?;
            let mut tracker = conversation.tracker("cli");

            let prediction = policy.predict(&conversation.turns(), &mut tracker, &domain);
            let action = prediction
                .action
                .and_then(|index| domain.action_name(index))
                .unwrap_or("<none>");
            println!("action: {}", action);
            println!("reason: {:?}", prediction.reason);
            for event in tracker.events() {
                println!("event: {}", serde_json::to_string(event)?);
            }
        }
    }

    Ok(())
}
