//! The vibe scorer: content-trigger detection and weighted probability.
//!
//! Starts from the agent's base reply probability, adds the modifier of
//! every trigger that fires (additive and stackable — independent pieces
//! of evidence), adds pairwise dynamics keyed by the triggering author,
//! adds any still-active special-trigger boosts, and clamps to [0, 1].
//! Every fired trigger is recorded for observability and deterministic
//! testing.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{AgentProfile, Rules, TriggerKind};
use crate::message::MessageRecord;
use crate::state::ConversationState;

/// Energy above which the channel counts as heated.
pub const ENERGY_HIGH: f64 = 0.7;
/// Energy below which the channel counts as flat.
pub const ENERGY_LOW: f64 = 0.3;
/// Message length under which a lively channel reads as a setup line.
const SHORT_MESSAGE_CHARS: usize = 100;

static SETUP_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:setup|but|however)\b").expect("static pattern compiles"));

/// A computed vibe score with its fired-trigger trace.
#[derive(Debug, Clone)]
pub struct VibeScore {
    /// Clamped probability in [0, 1].
    pub value: f64,
    /// Names of triggers that contributed, in evaluation order.
    pub fired: Vec<String>,
}

/// Score one agent against the latest message.
///
/// `active_boosts` is the pruned list of (special trigger name, boost)
/// pairs for this message cycle; `now` is the message timestamp.
pub fn score(
    rules: &Rules,
    state: &ConversationState,
    profile: &AgentProfile,
    message: &MessageRecord,
    active_boosts: &[(String, f64)],
    now: DateTime<Utc>,
) -> VibeScore {
    let mut value = profile.base_reply_probability;
    let mut fired = Vec::new();

    for (kind, delta) in &profile.trigger_modifiers {
        if trigger_fires(kind, rules, state, profile, message, now) {
            value += delta;
            fired.push(kind.name());
        }
    }

    // Agent-to-agent dynamics: keyed by the author of the triggering
    // message when that author is another agent.
    if message.is_agent && message.author_id != profile.agent_id {
        if let Some(delta) = profile.pairwise_dynamics.get(&message.author_id) {
            value += delta;
            fired.push(format!("dynamics:{}", message.author_id));
        }
    }

    for (name, boost) in active_boosts {
        value += boost;
        fired.push(format!("special:{name}"));
    }

    VibeScore {
        value: value.clamp(0.0, 1.0),
        fired,
    }
}

fn trigger_fires(
    kind: &TriggerKind,
    rules: &Rules,
    state: &ConversationState,
    profile: &AgentProfile,
    message: &MessageRecord,
    now: DateTime<Utc>,
) -> bool {
    match kind {
        TriggerKind::Mentioned => message.mentions.contains(&profile.agent_id),
        TriggerKind::Roasted => {
            rules.roast_matcher.is_match(&message.text_lower)
                && (message.mentions.contains(&profile.agent_id)
                    || message.text_lower.contains(&profile.agent_id.to_lowercase()))
        }
        TriggerKind::Keyword(category) => rules
            .category_matcher(category)
            .is_some_and(|m| m.is_match(&message.text_lower)),
        TriggerKind::Quiet => state
            .agent(&profile.agent_id)
            .and_then(|a| a.quiet_duration(now))
            .is_some_and(|d| d >= rules.quiet_after),
        TriggerKind::JustReplied => state
            .agent(&profile.agent_id)
            .and_then(|a| a.quiet_duration(now))
            .is_some_and(|d| d < rules.just_replied_within),
        TriggerKind::EnergyHigh => state.energy > ENERGY_HIGH,
        TriggerKind::EnergyLow => state.energy < ENERGY_LOW,
        TriggerKind::Orderly => state.is_orderly(),
        TriggerKind::GoodTiming => good_timing(state, message),
    }
}

/// A setup just landed: a question, a contrast word, or a short message
/// into a lively channel.
fn good_timing(state: &ConversationState, message: &MessageRecord) -> bool {
    if message.text.trim_end().ends_with('?') {
        return true;
    }
    if SETUP_WORDS.is_match(&message.text_lower) {
        return true;
    }
    state.energy > 0.5 && message.text.chars().count() < SHORT_MESSAGE_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures::SAMPLE_RULES;
    use crate::message::InboundMessage;
    use chrono::TimeZone;

    fn rules() -> Rules {
        Rules::from_json(SAMPLE_RULES).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(author: &str, text: &str, secs: i64, mentions: &[&str], is_agent: bool) -> MessageRecord {
        let inbound = InboundMessage {
            channel_id: "c1".into(),
            author_id: author.into(),
            text: text.into(),
            timestamp: at(secs),
            mentioned_agent_ids: mentions.iter().map(|s| s.to_string()).collect(),
        };
        MessageRecord::from_inbound(&inbound, is_agent)
    }

    #[test]
    fn no_triggers_means_exactly_base_probability() {
        let rules = rules();
        let state = ConversationState::new();
        let ford = rules.profile("ford").unwrap();
        let msg = record("human_1", "nothing notable here", 0, &[], false);
        let score = score(&rules, &state, ford, &msg, &[], at(0));
        assert_eq!(score.value, ford.base_reply_probability);
        assert!(score.fired.is_empty());
    }

    #[test]
    fn overlapping_triggers_stack_before_clamp() {
        let rules = rules();
        let mut state = ConversationState::new();
        state.observe(
            record("human_1", "ford, what is the meaning of life?", 0, &["ford"], false),
            &rules,
        );
        let ford = rules.profile("ford").unwrap();
        let msg = state.last_message().unwrap().clone();
        let result = score(&rules, &state, ford, &msg, &[], at(0));
        // 0.15 base + 0.8 mentioned + 0.4 philosophy = 1.35, clamped.
        assert_eq!(result.value, 1.0);
        assert!(result.fired.contains(&"mentioned".to_string()));
        assert!(result.fired.contains(&"keyword:philosophy".to_string()));
    }

    #[test]
    fn quiet_and_just_replied_are_mutually_exclusive() {
        let rules = rules();
        let mut state = ConversationState::new();
        state.agent_mut("ford").note_reply(at(0));
        let ford = rules.profile("ford").unwrap();
        let msg = record("human_1", "hello", 30, &[], false);

        let fresh = score(&rules, &state, ford, &msg, &[], at(30));
        assert!(fresh.fired.contains(&"just_replied".to_string()));
        assert!(!fresh.fired.contains(&"quiet".to_string()));
        // Negative modifier pulls below base.
        assert!(fresh.value < ford.base_reply_probability);

        let stale = score(&rules, &state, ford, &msg, &[], at(700));
        assert!(stale.fired.contains(&"quiet".to_string()));
        assert!(!stale.fired.contains(&"just_replied".to_string()));
    }

    #[test]
    fn pairwise_dynamics_key_on_triggering_author() {
        let rules = rules();
        let mut state = ConversationState::new();
        let msg = record("ford", "wisdom flows", 0, &[], true);
        state.observe(msg.clone(), &rules);
        let april = rules.profile("april").unwrap();
        let result = score(&rules, &state, april, &msg, &[], at(0));
        assert!(result.fired.contains(&"dynamics:ford".to_string()));

        // Same content from a human: no dynamics contribution.
        let human_msg = record("human_1", "wisdom flows", 1, &[], false);
        let result = score(&rules, &state, april, &human_msg, &[], at(1));
        assert!(!result.fired.iter().any(|t| t.starts_with("dynamics:")));
    }

    #[test]
    fn roasted_requires_vocabulary_aimed_at_agent() {
        let rules = rules();
        let state = ConversationState::new();
        let april = rules.profile("april").unwrap();

        let aimed = record("human_1", "april just got destroyed", 0, &[], false);
        assert!(score(&rules, &state, april, &aimed, &[], at(0))
            .fired
            .contains(&"roasted".to_string()));

        let stray = record("human_1", "that movie got destroyed by critics", 0, &[], false);
        assert!(!score(&rules, &state, april, &stray, &[], at(0))
            .fired
            .contains(&"roasted".to_string()));
    }

    #[test]
    fn special_boosts_are_added_and_traced() {
        let rules = rules();
        let state = ConversationState::new();
        let ford = rules.profile("ford").unwrap();
        let msg = record("human_1", "plain text", 0, &[], false);
        let result = score(
            &rules,
            &state,
            ford,
            &msg,
            &[("fire_alarm".to_string(), 0.3)],
            at(0),
        );
        assert!((result.value - (ford.base_reply_probability + 0.3)).abs() < 1e-9);
        assert!(result.fired.contains(&"special:fire_alarm".to_string()));
    }

    #[test]
    fn good_timing_detects_questions_and_setups() {
        let rules = rules();
        let state = ConversationState::new();
        let adam = rules.profile("adam").unwrap();

        let question = record("human_1", "so what happened next?", 0, &[], false);
        assert!(score(&rules, &state, adam, &question, &[], at(0))
            .fired
            .contains(&"good_timing".to_string()));

        let setup = record("human_1", "i was going to agree, but", 0, &[], false);
        assert!(score(&rules, &state, adam, &setup, &[], at(0))
            .fired
            .contains(&"good_timing".to_string()));

        let flat = record("human_1", "long neutral statement with no hooks at all today", 0, &[], false);
        assert!(!score(&rules, &state, adam, &flat, &[], at(0))
            .fired
            .contains(&"good_timing".to_string()));
    }
}
