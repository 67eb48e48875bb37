//! Per-channel conversation state.
//!
//! One [`ConversationState`] exists per channel, owned exclusively by that
//! channel's worker task. Every inbound message is folded in through
//! [`ConversationState::observe`] before any agent is evaluated, so hard
//! rules and vibe triggers always see the current turn order.

pub mod agent;

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};

use crate::config::Rules;
use crate::message::MessageRecord;

pub use agent::{AgentPhase, AgentState};

/// Size bound of the recent-message window.
pub const MESSAGE_WINDOW: usize = 20;

/// Phrases that mark a topic pivot and reset the exchange counter.
const PIVOT_PHRASES: [&str; 4] = ["what if", "actually", "real talk", "anyway"];

/// Linear per-minute decay applied to message heat when computing energy.
const HEAT_DECAY_PER_MINUTE: f64 = 0.1;

/// The state of one conversation channel.
#[derive(Debug, Default)]
pub struct ConversationState {
    /// Last [`MESSAGE_WINDOW`] messages, oldest first. Eviction never
    /// reorders.
    recent: VecDeque<MessageRecord>,
    /// Active special triggers: name → absolute expiry. Pruned lazily.
    pub active_triggers: HashMap<String, DateTime<Utc>>,
    /// Messages since the last detected topic pivot.
    pub topic_exchange_count: u32,
    /// Conversation energy in [0, 1], recomputed on each message.
    pub energy: f64,
    agents: HashMap<String, AgentState>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an inbound message into the state: waiting-edge transitions,
    /// author bookkeeping, window eviction, topic tracking, and energy.
    ///
    /// Special-trigger arming is handled separately by the trigger manager
    /// so its matches can be logged alongside the evaluation.
    pub fn observe(&mut self, record: MessageRecord, rules: &Rules) {
        // A message from an awaited target releases its waiters right
        // away: the answer they were holding the floor for has arrived,
        // so they are eligible for this very message. Third-party agent
        // messages also release waiters, but only once this message's
        // evaluation is over (see `release_bystanders`).
        for (agent_id, state) in self.agents.iter_mut() {
            if agent_id == &record.author_id {
                continue;
            }
            if let AgentPhase::Waiting { targets } = &state.phase {
                if targets.contains(&record.author_id) {
                    tracing::debug!(agent_id, author = %record.author_id, "waiting edge answered");
                    state.clear_waiting();
                }
            }
        }

        // An agent-authored message is ground truth that the agent spoke;
        // its mention set arms fresh waiting edges, one per addressed agent.
        if record.is_agent {
            let targets: HashSet<String> = record
                .mentions
                .iter()
                .filter(|m| rules.is_agent(m) && *m != &record.author_id)
                .cloned()
                .collect();
            let author = self.agent_mut(&record.author_id);
            author.last_reply_time = Some(record.timestamp);
            author.clear_waiting();
            author.enter_waiting(targets);
        }

        // Topic tracking: pivots reset the exchange counter.
        if PIVOT_PHRASES.iter().any(|p| record.text_lower.contains(p)) {
            self.topic_exchange_count = 0;
        } else {
            self.topic_exchange_count = self.topic_exchange_count.saturating_add(1);
        }

        self.recent.push_back(record);
        while self.recent.len() > MESSAGE_WINDOW {
            self.recent.pop_front();
        }

        self.energy = self.compute_energy(rules, self.last_timestamp().unwrap_or_else(Utc::now));
    }

    /// Heat-style energy: each recent message contributes base heat plus
    /// boosts for roast vocabulary, mentions, and exclamations, linearly
    /// decayed by age, normalised into [0, 1].
    fn compute_energy(&self, rules: &Rules, now: DateTime<Utc>) -> f64 {
        let mut heat = 0.0;
        for msg in &self.recent {
            let mut msg_heat = 1.0;
            if rules.roast_matcher.is_match(&msg.text_lower) {
                msg_heat += 2.0;
            }
            if !msg.mentions.is_empty() {
                msg_heat += 1.0;
            }
            msg_heat += msg.text.matches('!').count() as f64 * 0.5;

            let age_minutes = (now - msg.timestamp).num_seconds().max(0) as f64 / 60.0;
            let decay = (1.0 - age_minutes * HEAT_DECAY_PER_MINUTE).max(0.0);
            heat += msg_heat * decay;
        }
        (heat / (2.0 * MESSAGE_WINDOW as f64)).min(1.0)
    }

    /// Release every waiting agent other than the author after a message
    /// from some *other* agent has been fully evaluated: a third
    /// participant spoke, so the conversation moved on without the
    /// awaited answer. Takes effect for the next message, not the one
    /// that triggered it.
    pub fn release_bystanders(&mut self, author_id: &str, author_is_agent: bool) {
        if !author_is_agent {
            return;
        }
        for (agent_id, state) in self.agents.iter_mut() {
            if agent_id != author_id && matches!(state.phase, AgentPhase::Waiting { .. }) {
                tracing::debug!(agent_id, author = %author_id, "waiting edge released, conversation moved on");
                state.clear_waiting();
            }
        }
    }

    /// Release every agent whose waiting edge targets `replier_id`. Used
    /// when a reply from that agent has just been approved: the awaited
    /// answer is on its way.
    pub fn clear_waiters_on(&mut self, replier_id: &str) {
        for (agent_id, state) in self.agents.iter_mut() {
            if agent_id == replier_id {
                continue;
            }
            if let AgentPhase::Waiting { targets } = &state.phase {
                if targets.contains(replier_id) {
                    tracing::debug!(agent_id, replier_id, "waiting edge released by approval");
                    state.clear_waiting();
                }
            }
        }
    }

    /// Lazily create and return the agent's state.
    pub fn agent_mut(&mut self, agent_id: &str) -> &mut AgentState {
        self.agents.entry(agent_id.to_string()).or_default()
    }

    pub fn agent(&self, agent_id: &str) -> Option<&AgentState> {
        self.agents.get(agent_id)
    }

    pub fn recent_messages(&self) -> impl DoubleEndedIterator<Item = &MessageRecord> {
        self.recent.iter()
    }

    pub fn last_message(&self) -> Option<&MessageRecord> {
        self.recent.back()
    }

    fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.recent.back().map(|m| m.timestamp)
    }

    /// Render the last `n` messages as `author: text` lines for the
    /// judgment oracle's conversation excerpt.
    pub fn excerpt(&self, n: usize) -> String {
        let skip = self.recent.len().saturating_sub(n);
        self.recent
            .iter()
            .skip(skip)
            .map(|m| format!("{}: {}", m.author_id, m.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Whether the last five messages are exactly two authors alternating.
    /// A channel this tidy is a standing invitation for a disruptive agent.
    pub fn is_orderly(&self) -> bool {
        if self.recent.len() < 5 {
            return false;
        }
        let authors: Vec<&str> = self
            .recent
            .iter()
            .rev()
            .take(5)
            .map(|m| m.author_id.as_str())
            .collect();
        let unique: HashSet<&str> = authors.iter().copied().collect();
        unique.len() == 2 && authors[0] != authors[1]
    }
}
