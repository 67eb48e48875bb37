//! firepit decision-engine binary.
//!
//! Reads newline-delimited JSON message events from stdin, routes them
//! through per-channel workers, and writes approved reply directives as
//! newline-delimited JSON to stdout.
//!
//! # Environment Variables
//!
//! - `FIREPIT_RULES` — path to the rules JSON (default: `conversation_rules.json`)
//! - `FIREPIT_SEED` — optional u64 seed for deterministic replays
//! - `RUST_LOG` — tracing filter (default: "info")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin engine < events.jsonl
//! ```

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use firepit::engine::sampler::{DecisionSampler, SeededSampler, ThreadSampler};
use firepit::{ChannelRouter, DecisionEngine, InboundMessage, NoopOracle, Rules};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,firepit=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let rules_path =
        std::env::var("FIREPIT_RULES").unwrap_or_else(|_| "conversation_rules.json".to_string());
    let rules = Arc::new(Rules::load(&rules_path).context("loading rules configuration")?);
    tracing::info!(
        rules = %rules_path,
        agents = rules.agent_ids().count(),
        "firepit engine starting"
    );

    let sampler: Arc<dyn DecisionSampler> = match std::env::var("FIREPIT_SEED") {
        Ok(seed) => {
            let seed: u64 = seed.parse().context("FIREPIT_SEED must be a u64")?;
            tracing::info!(seed, "using seeded sampler");
            Arc::new(SeededSampler::new(seed))
        }
        Err(_) => Arc::new(ThreadSampler),
    };

    let (directive_tx, mut directive_rx) = mpsc::channel(256);
    let engine = DecisionEngine::new(rules, Arc::new(NoopOracle), sampler, directive_tx);
    let router = ChannelRouter::new(engine);

    // Directives stream to stdout as they are approved.
    let printer = tokio::spawn(async move {
        while let Some(directive) = directive_rx.recv().await {
            match serde_json::to_string(&directive) {
                Ok(line) => println!("{line}"),
                Err(err) => tracing::error!(error = %err, "failed to serialize directive"),
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<InboundMessage>(&line) {
            Ok(msg) => {
                if let Err(err) = router.dispatch(msg).await {
                    tracing::warn!(error = %err, "dropping message");
                }
            }
            Err(err) => tracing::warn!(error = %err, "skipping malformed event line"),
        }
    }

    tracing::info!("stdin closed, draining workers");
    router.shutdown().await;
    // The router holds the last directive sender; dropping it lets the
    // printer task finish.
    drop(router);
    printer.await.ok();
    Ok(())
}
