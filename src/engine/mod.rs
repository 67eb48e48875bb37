//! The reply-decision engine.
//!
//! One [`DecisionEngine::process_message`] call is a full evaluation
//! cycle for one inbound message: fold the message into channel state,
//! arm special triggers, run the hard rule filter per agent, score the
//! survivors, refine high scores through the judgment oracle, then
//! sample and dispatch decisions serially.

pub mod dispatcher;
pub mod hard_rules;
pub mod oracle;
pub mod sampler;
pub mod triggers;
pub mod vibe;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;

use crate::config::Rules;
use crate::message::{Decision, InboundMessage, MessageRecord, ReplyDirective};
use crate::state::ConversationState;

use dispatcher::Candidate;
use oracle::{JudgmentOracle, JudgmentRequest};
use sampler::DecisionSampler;
use vibe::VibeScore;

/// How many trailing messages the oracle sees as context.
const EXCERPT_LINES: usize = 10;

/// The per-channel decision pipeline. Cheap to clone; all parts are
/// shared and immutable except the state passed into each call.
#[derive(Clone)]
pub struct DecisionEngine {
    rules: Arc<Rules>,
    oracle: Arc<dyn JudgmentOracle>,
    sampler: Arc<dyn DecisionSampler>,
    outbound: mpsc::Sender<ReplyDirective>,
}

impl DecisionEngine {
    pub fn new(
        rules: Arc<Rules>,
        oracle: Arc<dyn JudgmentOracle>,
        sampler: Arc<dyn DecisionSampler>,
        outbound: mpsc::Sender<ReplyDirective>,
    ) -> Self {
        Self {
            rules,
            oracle,
            sampler,
            outbound,
        }
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// Run one full evaluation cycle. Returns every agent's decision in
    /// deterministic agent order; approved decisions have already been
    /// emitted as directives.
    ///
    /// All time arithmetic uses the message timestamp, so replaying an
    /// ordered sequence against fresh state with a seeded sampler yields
    /// identical decisions.
    pub async fn process_message(
        &self,
        state: &mut ConversationState,
        msg: &InboundMessage,
    ) -> Vec<Decision> {
        let now = msg.timestamp;
        let author_is_agent = self.rules.is_agent(&msg.author_id);

        for mention in &msg.mentioned_agent_ids {
            if !self.rules.is_agent(mention) {
                tracing::debug!(channel_id = %msg.channel_id, mention, "mention of unknown agent ignored");
            }
        }

        let record = MessageRecord::from_inbound(msg, author_is_agent);
        state.observe(record.clone(), &self.rules);
        triggers::arm(&self.rules, state, &record, now);
        let boosts = triggers::active_boosts(&self.rules, state, now);

        // Hard rule filter, then vibe scoring for the survivors.
        let mut blocked: HashMap<String, Decision> = HashMap::new();
        let mut scored: Vec<(String, VibeScore)> = Vec::new();
        let agent_ids: Vec<String> = self.rules.agent_ids().map(str::to_string).collect();
        for agent_id in &agent_ids {
            match hard_rules::check(&self.rules, state, agent_id, now) {
                Err(rule) => {
                    blocked.insert(agent_id.clone(), Decision::blocked(agent_id, rule));
                }
                Ok(()) => {
                    if let Some(profile) = self.rules.profile(agent_id) {
                        let score = vibe::score(&self.rules, state, profile, &record, &boosts, now);
                        scored.push((agent_id.clone(), score));
                    }
                }
            }
        }

        // Oracle refinement for scores past the threshold. The calls run
        // concurrently; nothing is mutated until dispatch.
        let excerpt = state.excerpt(EXCERPT_LINES);
        let adjustments: Vec<f64> = join_all(scored.iter().map(|(agent_id, score)| {
            let oracle = Arc::clone(&self.oracle);
            let request = JudgmentRequest {
                agent_id: agent_id.clone(),
                conversation_excerpt: excerpt.clone(),
                computed_probability: score.value,
            };
            let consult = score.value > self.rules.oracle_threshold;
            let timeout = self.rules.oracle_timeout;
            async move {
                if consult {
                    oracle::bounded_adjustment(oracle.as_ref(), request, timeout).await
                } else {
                    0.0
                }
            }
        }))
        .await;

        let candidates: Vec<Candidate> = scored
            .into_iter()
            .zip(adjustments)
            .map(|((agent_id, score), adjustment)| Candidate {
                agent_id,
                probability: (score.value + adjustment).clamp(0.0, 1.0),
                fired_triggers: score.fired,
                oracle_adjustment: adjustment,
            })
            .collect();

        let sampled = dispatcher::dispatch(
            &self.rules,
            state,
            candidates,
            msg,
            now,
            self.sampler.as_ref(),
            &self.outbound,
        )
        .await;

        // A third agent speaking moves the conversation on: waiters are
        // released now that this message's evaluation is complete.
        state.release_bystanders(&msg.author_id, author_is_agent);

        let mut by_agent: HashMap<String, Decision> = blocked;
        for decision in sampled {
            by_agent.insert(decision.agent_id.clone(), decision);
        }

        let mut decisions = Vec::with_capacity(agent_ids.len());
        for agent_id in &agent_ids {
            if let Some(decision) = by_agent.remove(agent_id) {
                tracing::info!(
                    channel_id = %msg.channel_id,
                    agent_id,
                    reason = decision.reason.as_str(),
                    probability = decision.probability,
                    triggers = ?decision.fired_triggers,
                    "reply decision"
                );
                decisions.push(decision);
            }
        }
        decisions
    }
}
