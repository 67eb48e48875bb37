//! The decision dispatcher: final sampling, serialized state mutation,
//! and directive emission.
//!
//! Candidates from one message cycle are dispatched strictly in order so
//! that an earlier agent's affirmative state update is visible to every
//! later agent in the same batch — hard rules are re-checked here against
//! the mutated state before each draw.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::Rules;
use crate::engine::{hard_rules, sampler::DecisionSampler};
use crate::message::{Decision, InboundMessage, ReasonCode, ReplyDirective};
use crate::state::ConversationState;

/// An agent that survived the hard rule filter, with its final computed
/// probability.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub agent_id: String,
    /// Probability after vibe scoring and oracle adjustment, in [0, 1].
    pub probability: f64,
    pub fired_triggers: Vec<String>,
    /// The oracle adjustment that was applied (0.0 when none).
    pub oracle_adjustment: f64,
}

/// Sample and finalize each candidate in order, mutating state on every
/// affirmative decision and emitting a directive for it.
pub async fn dispatch(
    rules: &Rules,
    state: &mut ConversationState,
    candidates: Vec<Candidate>,
    trigger: &InboundMessage,
    now: DateTime<Utc>,
    sampler: &dyn DecisionSampler,
    outbound: &mpsc::Sender<ReplyDirective>,
) -> Vec<Decision> {
    let mut decisions = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        // Earlier approvals in this batch may have changed eligibility.
        if let Err(rule) = hard_rules::check(rules, state, &candidate.agent_id, now) {
            decisions.push(Decision {
                decision_id: Uuid::new_v4(),
                agent_id: candidate.agent_id,
                probability: candidate.probability,
                fired_triggers: candidate.fired_triggers,
                reason: ReasonCode::HardRuleBlocked(rule),
                approved: false,
            });
            continue;
        }

        let draw = sampler.draw();
        let approved = draw < candidate.probability;

        let reason = if !approved {
            ReasonCode::BelowThreshold
        } else if candidate.oracle_adjustment != 0.0 {
            ReasonCode::ApprovedOracleAdjusted
        } else if candidate.fired_triggers.is_empty() {
            ReasonCode::ApprovedBase
        } else {
            ReasonCode::ApprovedTriggered
        };

        let decision = Decision {
            decision_id: Uuid::new_v4(),
            agent_id: candidate.agent_id.clone(),
            probability: candidate.probability,
            fired_triggers: candidate.fired_triggers,
            reason,
            approved,
        };

        if approved {
            let agent = state.agent_mut(&candidate.agent_id);
            agent.note_reply(now);
            // Anyone holding the floor for this replier gets it back: the
            // awaited answer is on its way.
            state.clear_waiters_on(&candidate.agent_id);

            let directive = ReplyDirective {
                channel_id: trigger.channel_id.clone(),
                agent_id: candidate.agent_id.clone(),
                decision_id: decision.decision_id,
                triggering_message: trigger.clone(),
                reason_code: reason,
                probability: candidate.probability,
            };
            if outbound.send(directive).await.is_err() {
                tracing::warn!(
                    agent_id = %candidate.agent_id,
                    "directive sink closed, dropping approved decision signal"
                );
            }
        }

        decisions.push(decision);
    }

    decisions
}
