//! Wire-facing message and decision types.
//!
//! An [`InboundMessage`] arrives from the chat-transport collaborator, is
//! folded into channel state as a [`MessageRecord`], and each evaluation
//! cycle produces one [`Decision`] per agent. Affirmative decisions are
//! emitted to the response-generation collaborator as [`ReplyDirective`]s.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message event received from the chat transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Conversation context this message belongs to.
    pub channel_id: String,
    /// Author id; may be a configured agent or a human participant.
    pub author_id: String,
    /// Raw message text.
    pub text: String,
    /// When the message was posted.
    pub timestamp: DateTime<Utc>,
    /// Agent ids directly addressed by this message.
    #[serde(default)]
    pub mentioned_agent_ids: Vec<String>,
}

/// The stored form of a message inside a channel's recent-message window.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub author_id: String,
    pub text: String,
    /// Lowercased text, cached once so every keyword scan is cheap.
    pub text_lower: String,
    pub timestamp: DateTime<Utc>,
    pub mentions: HashSet<String>,
    /// Whether the author is one of the configured agents.
    pub is_agent: bool,
}

impl MessageRecord {
    /// Build a record from an inbound event, tagging agent authorship.
    pub fn from_inbound(msg: &InboundMessage, is_agent: bool) -> Self {
        Self {
            author_id: msg.author_id.clone(),
            text_lower: msg.text.to_lowercase(),
            text: msg.text.clone(),
            timestamp: msg.timestamp,
            mentions: msg.mentioned_agent_ids.iter().cloned().collect(),
            is_agent,
        }
    }
}

/// The hard rule that blocked an evaluation, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardRule {
    /// The agent authored the most recent message in the window.
    SelfReply,
    /// The agent is still waiting on a directly-addressed agent to answer.
    WaitForResponse,
    /// The agent replied less than the cooldown period ago.
    Cooldown,
    /// The agent hit the hourly reply cap.
    RateLimited,
}

impl HardRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            HardRule::SelfReply => "self_reply",
            HardRule::WaitForResponse => "wait_for_response",
            HardRule::Cooldown => "cooldown",
            HardRule::RateLimited => "rate_limited",
        }
    }
}

/// Why a decision came out the way it did.
///
/// The wire form (see [`ReasonCode::as_str`]) is stable and consumed by the
/// response-generation collaborator and by tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    /// A hard rule blocked the agent before any probability was computed.
    HardRuleBlocked(HardRule),
    /// The sampled draw fell above the computed probability.
    BelowThreshold,
    /// Approved with no triggers fired: pure base probability.
    ApprovedBase,
    /// Approved with at least one vibe or special trigger contributing.
    ApprovedTriggered,
    /// Approved with a non-zero oracle adjustment applied.
    ApprovedOracleAdjusted,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::HardRuleBlocked(HardRule::SelfReply) => "hard_rule_blocked:self_reply",
            ReasonCode::HardRuleBlocked(HardRule::WaitForResponse) => {
                "hard_rule_blocked:wait_for_response"
            }
            ReasonCode::HardRuleBlocked(HardRule::Cooldown) => "hard_rule_blocked:cooldown",
            ReasonCode::HardRuleBlocked(HardRule::RateLimited) => "hard_rule_blocked:rate_limited",
            ReasonCode::BelowThreshold => "below_threshold",
            ReasonCode::ApprovedBase => "approved:base",
            ReasonCode::ApprovedTriggered => "approved:triggered",
            ReasonCode::ApprovedOracleAdjusted => "approved:oracle_adjusted",
        }
    }

    /// Whether this code represents an affirmative decision.
    pub fn is_approved(&self) -> bool {
        matches!(
            self,
            ReasonCode::ApprovedBase
                | ReasonCode::ApprovedTriggered
                | ReasonCode::ApprovedOracleAdjusted
        )
    }
}

impl Serialize for ReasonCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// The full per-agent evaluation record for one message cycle.
///
/// Ephemeral: produced, logged, and (when affirmative) turned into a
/// [`ReplyDirective`] within a single cycle.
#[derive(Debug, Clone)]
pub struct Decision {
    pub decision_id: Uuid,
    pub agent_id: String,
    /// Final probability the sample was drawn against, in [0, 1].
    pub probability: f64,
    /// Vibe and special triggers that fired, for observability and tests.
    pub fired_triggers: Vec<String>,
    pub reason: ReasonCode,
    /// Whether the agent may reply.
    pub approved: bool,
}

impl Decision {
    /// A decision blocked by a hard rule; no probability was computed.
    pub fn blocked(agent_id: &str, rule: HardRule) -> Self {
        Self {
            decision_id: Uuid::new_v4(),
            agent_id: agent_id.to_string(),
            probability: 0.0,
            fired_triggers: Vec::new(),
            reason: ReasonCode::HardRuleBlocked(rule),
            approved: false,
        }
    }
}

/// The "agent X may reply" signal sent to the response generator.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyDirective {
    pub channel_id: String,
    pub agent_id: String,
    pub decision_id: Uuid,
    /// The message that triggered this directive.
    pub triggering_message: InboundMessage,
    pub reason_code: ReasonCode,
    /// Final probability, carried for observability.
    pub probability: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_code_wire_names() {
        assert_eq!(
            ReasonCode::HardRuleBlocked(HardRule::WaitForResponse).as_str(),
            "hard_rule_blocked:wait_for_response"
        );
        assert_eq!(ReasonCode::BelowThreshold.as_str(), "below_threshold");
        assert_eq!(ReasonCode::ApprovedBase.as_str(), "approved:base");
        assert_eq!(
            ReasonCode::ApprovedOracleAdjusted.as_str(),
            "approved:oracle_adjusted"
        );
    }

    #[test]
    fn approved_predicate() {
        assert!(ReasonCode::ApprovedTriggered.is_approved());
        assert!(!ReasonCode::BelowThreshold.is_approved());
        assert!(!ReasonCode::HardRuleBlocked(HardRule::Cooldown).is_approved());
    }

    #[test]
    fn inbound_deserializes_without_mentions() {
        let msg: InboundMessage = serde_json::from_str(
            r#"{"channel_id":"c1","author_id":"u1","text":"hi","timestamp":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(msg.mentioned_agent_ids.is_empty());
    }
}
