//! Per-agent, per-channel state.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// The turn-taking phase of one agent in one channel.
///
/// Cooldown and rate-limit conditions are derived from timestamps rather
/// than stored as phases, so they can never go stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentPhase {
    /// No outstanding direct address; eligible subject to the other rules.
    Free,
    /// The agent directly addressed the named agents and yields the floor
    /// until one of them (or any third agent) speaks.
    Waiting { targets: HashSet<String> },
}

/// Mutable state for one agent within one channel. Created lazily on the
/// agent's first evaluation in that channel.
#[derive(Debug, Clone)]
pub struct AgentState {
    /// Timestamp of this agent's most recent reply, if any.
    pub last_reply_time: Option<DateTime<Utc>>,
    /// Reply timestamps inside the trailing rate window, oldest first.
    reply_timestamps: VecDeque<DateTime<Utc>>,
    pub phase: AgentPhase,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            last_reply_time: None,
            reply_timestamps: VecDeque::new(),
            phase: AgentPhase::Free,
        }
    }
}

impl AgentState {
    /// Record an approved (or observed) reply at `now`.
    pub fn note_reply(&mut self, now: DateTime<Utc>) {
        self.last_reply_time = Some(now);
        self.reply_timestamps.push_back(now);
    }

    /// Count replies within the trailing `window` ending at `now`,
    /// discarding entries that have aged out. No background sweep.
    pub fn replies_within(&mut self, now: DateTime<Utc>, window: Duration) -> usize {
        let cutoff =
            now - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
        while let Some(front) = self.reply_timestamps.front() {
            if *front < cutoff {
                self.reply_timestamps.pop_front();
            } else {
                break;
            }
        }
        self.reply_timestamps.len()
    }

    /// Time since this agent last spoke, if it ever has.
    pub fn quiet_duration(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_reply_time
            .map(|t| (now - t).to_std().unwrap_or(Duration::ZERO))
    }

    /// Arm waiting edges toward each addressed agent. A later address
    /// replaces any earlier unanswered one.
    pub fn enter_waiting(&mut self, targets: HashSet<String>) {
        if !targets.is_empty() {
            self.phase = AgentPhase::Waiting { targets };
        }
    }

    /// Release the agent back to `Free`.
    pub fn clear_waiting(&mut self) {
        self.phase = AgentPhase::Free;
    }
}
