//! The deterministic eligibility gate.
//!
//! Four binary rules, checked in a fixed order with short-circuit on the
//! first failure. The filter never mutates turn-taking state; the only
//! write it performs is the lazy pruning of the rate window, which is a
//! derived count and cannot change any verdict ordering.

use chrono::{DateTime, Utc};

use crate::config::{Rules, RATE_WINDOW};
use crate::message::HardRule;
use crate::state::{AgentPhase, ConversationState};

/// Check whether `agent_id` is even eligible for probability evaluation
/// against the latest message. `now` is the triggering message's
/// timestamp, so replaying a message sequence is deterministic.
pub fn check(
    rules: &Rules,
    state: &mut ConversationState,
    agent_id: &str,
    now: DateTime<Utc>,
) -> Result<(), HardRule> {
    // Rule 1: no double reply. If the agent authored the most recent
    // message, it cannot immediately speak again.
    if let Some(last) = state.last_message() {
        if last.author_id == agent_id {
            return Err(HardRule::SelfReply);
        }
    }

    // Rule 2: wait for response. Release edges were already processed at
    // ingestion; a still-armed edge means this message did not qualify.
    if let Some(agent) = state.agent(agent_id) {
        if matches!(agent.phase, AgentPhase::Waiting { .. }) {
            return Err(HardRule::WaitForResponse);
        }
    }

    let agent = state.agent_mut(agent_id);

    // Rule 3: cooldown.
    if let Some(last_reply) = agent.last_reply_time {
        let elapsed = (now - last_reply).to_std().unwrap_or_default();
        if elapsed < rules.cooldown {
            return Err(HardRule::Cooldown);
        }
    }

    // Rule 4: hourly rate cap, over the lazily-pruned trailing window.
    if agent.replies_within(now, RATE_WINDOW) >= rules.max_replies_per_hour as usize {
        return Err(HardRule::RateLimited);
    }

    Ok(())
}
