//! Special triggers: time-boxed, channel-wide probability boosts.
//!
//! A recognized phrase arms a trigger for its configured duration; every
//! agent's vibe score picks up the boost while the trigger is active.
//! Expiry is checked lazily on read — no background timers.

use chrono::{DateTime, Utc};

use crate::config::Rules;
use crate::message::MessageRecord;
use crate::state::ConversationState;

/// Arm (or refresh) every trigger whose keywords match the message.
/// The expiry is absolute: `now + duration`.
pub fn arm(rules: &Rules, state: &mut ConversationState, message: &MessageRecord, now: DateTime<Utc>) {
    for def in &rules.special_triggers {
        if def.matcher.is_match(&message.text_lower) {
            let expiry =
                now + chrono::Duration::from_std(def.duration).unwrap_or_else(|_| chrono::Duration::zero());
            tracing::info!(trigger = %def.name, %expiry, "special trigger armed");
            state.active_triggers.insert(def.name.clone(), expiry);
        }
    }
}

/// Prune expired triggers and return the still-active (name, boost) pairs
/// in definition order. A trigger applies strictly before its expiry.
pub fn active_boosts(
    rules: &Rules,
    state: &mut ConversationState,
    now: DateTime<Utc>,
) -> Vec<(String, f64)> {
    state.active_triggers.retain(|name, expiry| {
        let live = now < *expiry;
        if !live {
            tracing::debug!(trigger = %name, "special trigger expired");
        }
        live
    });

    rules
        .special_triggers
        .iter()
        .filter(|def| state.active_triggers.contains_key(&def.name))
        .map(|def| (def.name.clone(), def.boost))
        .collect()
}
