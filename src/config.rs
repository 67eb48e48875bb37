//! Rules configuration: loaded once from JSON at startup, validated
//! eagerly, then compiled into an immutable, strongly-typed form.
//!
//! The raw schema mirrors the external contract:
//!
//! ```json
//! {
//!   "hard_rules": { "cooldown_seconds": 30, "max_replies_per_hour": 20 },
//!   "engine": { "oracle_threshold": 0.3, "oracle_timeout_seconds": 2 },
//!   "keyword_categories": { "philosophy": ["meaning", "wisdom"] },
//!   "vibe_rules": {
//!     "ford": {
//!       "base_reply_probability": 0.15,
//!       "trigger_modifiers": { "mentioned": 0.8, "keyword:philosophy": 0.4 }
//!     }
//!   },
//!   "interaction_dynamics": { "april->ford": 0.2 },
//!   "special_triggers": {
//!     "fire_alarm": { "keywords": ["fire"], "boost": 0.3, "duration_seconds": 300 }
//!   }
//! }
//! ```
//!
//! Malformed configuration fails fast with a [`ConfigError`] before any
//! channel is served.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::error::ConfigError;

/// Default cooldown after an approved reply.
pub const DEFAULT_COOLDOWN_SECONDS: u64 = 30;
/// Default hourly reply cap per agent.
pub const DEFAULT_MAX_REPLIES_PER_HOUR: u32 = 20;
/// The trailing window the hourly cap is evaluated over.
pub const RATE_WINDOW: Duration = Duration::from_secs(3600);
/// Default vibe score above which the judgment oracle is consulted.
pub const DEFAULT_ORACLE_THRESHOLD: f64 = 0.3;
/// Default oracle call timeout.
pub const DEFAULT_ORACLE_TIMEOUT_SECONDS: u64 = 2;
/// Default silence span after which the `quiet` trigger fires.
pub const DEFAULT_QUIET_AFTER_SECONDS: u64 = 600;
/// Default recency span within which the `just_replied` trigger fires.
pub const DEFAULT_JUST_REPLIED_SECONDS: u64 = 120;
/// Default lifetime of a special trigger once armed.
pub const DEFAULT_TRIGGER_DURATION_SECONDS: u64 = 300;

/// Fallback roast vocabulary when no `roast` keyword category is configured.
const DEFAULT_ROAST_WORDS: [&str; 3] = ["roast", "burn", "destroyed"];

// ---------------------------------------------------------------------------
// Raw (serde) schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RawRules {
    pub hard_rules: RawHardRules,
    #[serde(default)]
    pub engine: RawEngineTuning,
    #[serde(default)]
    pub keyword_categories: HashMap<String, Vec<String>>,
    pub vibe_rules: HashMap<String, RawVibeRules>,
    #[serde(default)]
    pub interaction_dynamics: HashMap<String, f64>,
    #[serde(default)]
    pub special_triggers: HashMap<String, RawSpecialTrigger>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawHardRules {
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,
    #[serde(default = "default_max_replies")]
    pub max_replies_per_hour: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RawEngineTuning {
    pub oracle_threshold: f64,
    pub oracle_timeout_seconds: u64,
    pub quiet_after_seconds: u64,
    pub just_replied_seconds: u64,
}

impl Default for RawEngineTuning {
    fn default() -> Self {
        Self {
            oracle_threshold: DEFAULT_ORACLE_THRESHOLD,
            oracle_timeout_seconds: DEFAULT_ORACLE_TIMEOUT_SECONDS,
            quiet_after_seconds: DEFAULT_QUIET_AFTER_SECONDS,
            just_replied_seconds: DEFAULT_JUST_REPLIED_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawVibeRules {
    pub base_reply_probability: f64,
    #[serde(default)]
    pub trigger_modifiers: HashMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSpecialTrigger {
    pub keywords: Vec<String>,
    pub boost: f64,
    #[serde(default = "default_trigger_duration")]
    pub duration_seconds: u64,
}

fn default_cooldown() -> u64 {
    DEFAULT_COOLDOWN_SECONDS
}
fn default_max_replies() -> u32 {
    DEFAULT_MAX_REPLIES_PER_HOUR
}
fn default_trigger_duration() -> u64 {
    DEFAULT_TRIGGER_DURATION_SECONDS
}

// ---------------------------------------------------------------------------
// Trigger kinds
// ---------------------------------------------------------------------------

/// A named vibe trigger condition, parsed from a `trigger_modifiers` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    /// The agent appears in the message's mention set.
    Mentioned,
    /// Roast vocabulary aimed at the agent.
    Roasted,
    /// Any word of the named keyword category appears in the message.
    Keyword(String),
    /// The agent has been silent past the configured quiet span.
    Quiet,
    /// The agent replied within the configured recency span.
    JustReplied,
    /// Channel energy above 0.7.
    EnergyHigh,
    /// Channel energy below 0.3.
    EnergyLow,
    /// Two participants alternating with nobody else chiming in.
    Orderly,
    /// A setup line just landed: question, contrast word, or a short
    /// message into a lively channel.
    GoodTiming,
}

impl TriggerKind {
    /// Parse a config key; `None` for unrecognized names (tolerated for
    /// forward compatibility, logged at load).
    pub fn parse(key: &str) -> Option<Self> {
        if let Some(category) = key.strip_prefix("keyword:") {
            return Some(TriggerKind::Keyword(category.to_string()));
        }
        match key {
            "mentioned" => Some(TriggerKind::Mentioned),
            "roasted" => Some(TriggerKind::Roasted),
            "quiet" => Some(TriggerKind::Quiet),
            "just_replied" => Some(TriggerKind::JustReplied),
            "energy_high" => Some(TriggerKind::EnergyHigh),
            "energy_low" => Some(TriggerKind::EnergyLow),
            "orderly" => Some(TriggerKind::Orderly),
            "good_timing" => Some(TriggerKind::GoodTiming),
            _ => None,
        }
    }

    /// The canonical config-key form, also used in fired-trigger traces.
    pub fn name(&self) -> String {
        match self {
            TriggerKind::Mentioned => "mentioned".into(),
            TriggerKind::Roasted => "roasted".into(),
            TriggerKind::Keyword(c) => format!("keyword:{c}"),
            TriggerKind::Quiet => "quiet".into(),
            TriggerKind::JustReplied => "just_replied".into(),
            TriggerKind::EnergyHigh => "energy_high".into(),
            TriggerKind::EnergyLow => "energy_low".into(),
            TriggerKind::Orderly => "orderly".into(),
            TriggerKind::GoodTiming => "good_timing".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Compiled configuration
// ---------------------------------------------------------------------------

/// One agent's personality, read-only to the engine.
#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub agent_id: String,
    pub base_reply_probability: f64,
    /// Parsed trigger modifiers, order-stable for deterministic traces.
    pub trigger_modifiers: Vec<(TriggerKind, f64)>,
    /// Additive modifier applied when the keyed agent authored the
    /// triggering message.
    pub pairwise_dynamics: HashMap<String, f64>,
}

/// A compiled special trigger definition.
#[derive(Debug, Clone)]
pub struct SpecialTriggerDef {
    pub name: String,
    pub matcher: Regex,
    pub boost: f64,
    pub duration: Duration,
}

/// The immutable, validated engine configuration.
///
/// Built once via [`Rules::load`] or [`Rules::from_json`]; shared across
/// channel workers behind an `Arc`.
#[derive(Debug)]
pub struct Rules {
    pub cooldown: Duration,
    pub max_replies_per_hour: u32,
    pub oracle_threshold: f64,
    pub oracle_timeout: Duration,
    pub quiet_after: Duration,
    pub just_replied_within: Duration,
    /// Word-boundary matchers per keyword category.
    categories: HashMap<String, Regex>,
    /// Matcher for roast vocabulary (the `roast` category or a default).
    pub roast_matcher: Regex,
    /// Agent profiles in deterministic (sorted) evaluation order.
    agents: BTreeMap<String, AgentProfile>,
    pub special_triggers: Vec<SpecialTriggerDef>,
}

impl Rules {
    /// Load and compile rules from a JSON file. Fatal on any error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parse, validate, and compile rules from a JSON string.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: RawRules = serde_json::from_str(text)?;
        Self::compile(raw)
    }

    fn compile(raw: RawRules) -> Result<Self, ConfigError> {
        if raw.hard_rules.max_replies_per_hour == 0 {
            return Err(ConfigError::NonPositive {
                field: "hard_rules.max_replies_per_hour".into(),
                value: 0,
            });
        }
        check_unit_interval("engine.oracle_threshold", raw.engine.oracle_threshold)?;

        // Keyword categories compile to one word-boundary alternation each.
        let mut categories = HashMap::new();
        for (name, words) in &raw.keyword_categories {
            if words.is_empty() {
                return Err(ConfigError::EmptyKeywords {
                    name: format!("keyword_categories.{name}"),
                });
            }
            categories.insert(name.clone(), word_matcher(words));
        }
        let roast_matcher = categories.get("roast").cloned().unwrap_or_else(|| {
            word_matcher(&DEFAULT_ROAST_WORDS.map(String::from))
        });

        // Agent profiles.
        let mut agents = BTreeMap::new();
        for (agent_id, vibe) in &raw.vibe_rules {
            check_unit_interval(
                &format!("vibe_rules.{agent_id}.base_reply_probability"),
                vibe.base_reply_probability,
            )?;
            let mut modifiers = Vec::new();
            let mut keys: Vec<&String> = vibe.trigger_modifiers.keys().collect();
            keys.sort();
            for key in keys {
                let delta = vibe.trigger_modifiers[key];
                check_signed_unit(&format!("vibe_rules.{agent_id}.trigger_modifiers.{key}"), delta)?;
                match TriggerKind::parse(key) {
                    Some(TriggerKind::Keyword(category)) => {
                        if !categories.contains_key(&category) {
                            return Err(ConfigError::EmptyKeywords {
                                name: format!("keyword_categories.{category} (referenced by {agent_id})"),
                            });
                        }
                        modifiers.push((TriggerKind::Keyword(category), delta));
                    }
                    Some(kind) => modifiers.push((kind, delta)),
                    None => {
                        tracing::warn!(agent_id, key, "ignoring unknown trigger modifier");
                    }
                }
            }
            agents.insert(
                agent_id.clone(),
                AgentProfile {
                    agent_id: agent_id.clone(),
                    base_reply_probability: vibe.base_reply_probability,
                    trigger_modifiers: modifiers,
                    pairwise_dynamics: HashMap::new(),
                },
            );
        }

        // Interaction dynamics: "responder->author" directed keys.
        for (pair, delta) in &raw.interaction_dynamics {
            check_signed_unit(&format!("interaction_dynamics.{pair}"), *delta)?;
            let (responder, author) = pair.split_once("->").ok_or_else(|| ConfigError::UnknownAgent {
                agent_id: pair.clone(),
                section: "interaction_dynamics (expected `responder->author`)".into(),
            })?;
            if !agents.contains_key(author) {
                return Err(ConfigError::UnknownAgent {
                    agent_id: author.to_string(),
                    section: "interaction_dynamics".into(),
                });
            }
            let profile = agents.get_mut(responder).ok_or_else(|| ConfigError::UnknownAgent {
                agent_id: responder.to_string(),
                section: "interaction_dynamics".into(),
            })?;
            profile.pairwise_dynamics.insert(author.to_string(), *delta);
        }

        // Special triggers.
        let mut special_triggers = Vec::new();
        let mut trigger_names: Vec<&String> = raw.special_triggers.keys().collect();
        trigger_names.sort();
        for name in trigger_names {
            let def = &raw.special_triggers[name];
            if def.keywords.is_empty() {
                return Err(ConfigError::EmptyKeywords {
                    name: format!("special_triggers.{name}"),
                });
            }
            check_signed_unit(&format!("special_triggers.{name}.boost"), def.boost)?;
            if def.duration_seconds == 0 {
                return Err(ConfigError::NonPositive {
                    field: format!("special_triggers.{name}.duration_seconds"),
                    value: 0,
                });
            }
            special_triggers.push(SpecialTriggerDef {
                name: name.clone(),
                matcher: word_matcher(&def.keywords),
                boost: def.boost,
                duration: Duration::from_secs(def.duration_seconds),
            });
        }

        Ok(Self {
            cooldown: Duration::from_secs(raw.hard_rules.cooldown_seconds),
            max_replies_per_hour: raw.hard_rules.max_replies_per_hour,
            oracle_threshold: raw.engine.oracle_threshold,
            oracle_timeout: Duration::from_secs(raw.engine.oracle_timeout_seconds),
            quiet_after: Duration::from_secs(raw.engine.quiet_after_seconds),
            just_replied_within: Duration::from_secs(raw.engine.just_replied_seconds),
            categories,
            roast_matcher,
            agents,
            special_triggers,
        })
    }

    /// Whether the id belongs to a configured agent.
    pub fn is_agent(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    /// Agent ids in deterministic evaluation order.
    pub fn agent_ids(&self) -> impl Iterator<Item = &str> {
        self.agents.keys().map(String::as_str)
    }

    pub fn profile(&self, agent_id: &str) -> Option<&AgentProfile> {
        self.agents.get(agent_id)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &AgentProfile> {
        self.agents.values()
    }

    /// The compiled matcher for a keyword category, if configured.
    pub fn category_matcher(&self, category: &str) -> Option<&Regex> {
        self.categories.get(category)
    }
}

/// Compile a case-insensitive word-boundary alternation over `words`.
fn word_matcher(words: &[String]) -> Regex {
    let alternation = words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&format!(r"\b(?:{alternation})\b"))
        .case_insensitive(true)
        .build()
        .expect("escaped keyword alternation always compiles")
}

fn check_unit_interval(field: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) || !value.is_finite() {
        return Err(ConfigError::OutOfRange {
            field: field.to_string(),
            value,
            expected: "[0, 1]",
        });
    }
    Ok(())
}

fn check_signed_unit(field: &str, value: f64) -> Result<(), ConfigError> {
    if !(-1.0..=1.0).contains(&value) || !value.is_finite() {
        return Err(ConfigError::OutOfRange {
            field: field.to_string(),
            value,
            expected: "[-1, 1]",
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Shared rules fixture used across the crate's test modules.

    pub(crate) const SAMPLE_RULES: &str = r#"{
        "hard_rules": { "cooldown_seconds": 30, "max_replies_per_hour": 20 },
        "keyword_categories": {
            "philosophy": ["meaning", "philosophy", "wisdom", "life"],
            "music": ["music", "beat", "rhythm", "song", "drum"],
            "roast": ["roast", "burn", "destroyed"]
        },
        "vibe_rules": {
            "ford": {
                "base_reply_probability": 0.15,
                "trigger_modifiers": {
                    "mentioned": 0.8,
                    "keyword:philosophy": 0.4,
                    "quiet": 0.2,
                    "just_replied": -0.3
                }
            },
            "april": {
                "base_reply_probability": 0.1,
                "trigger_modifiers": {
                    "mentioned": 0.8,
                    "orderly": 0.3,
                    "energy_low": 0.2,
                    "roasted": 0.5
                }
            },
            "adam": {
                "base_reply_probability": 0.12,
                "trigger_modifiers": {
                    "mentioned": 0.8,
                    "keyword:music": 0.5,
                    "good_timing": 0.25
                }
            }
        },
        "interaction_dynamics": { "april->ford": 0.25, "adam->april": 0.1 },
        "special_triggers": {
            "fire_alarm": { "keywords": ["fire", "alarm"], "boost": 0.3, "duration_seconds": 300 }
        }
    }"#;
}

#[cfg(test)]
mod tests {
    use super::fixtures::SAMPLE_RULES;
    use super::*;
    use std::io::Write;

    #[test]
    fn sample_rules_compile() {
        let rules = Rules::from_json(SAMPLE_RULES).unwrap();
        assert_eq!(rules.cooldown, Duration::from_secs(30));
        assert_eq!(rules.max_replies_per_hour, 20);
        let ids: Vec<&str> = rules.agent_ids().collect();
        assert_eq!(ids, vec!["adam", "april", "ford"]);
        let april = rules.profile("april").unwrap();
        assert_eq!(april.pairwise_dynamics.get("ford"), Some(&0.25));
        assert_eq!(rules.special_triggers.len(), 1);
        assert!(rules.roast_matcher.is_match("that was a BURN"));
    }

    #[test]
    fn defaults_fill_engine_section() {
        let rules = Rules::from_json(SAMPLE_RULES).unwrap();
        assert_eq!(rules.oracle_threshold, DEFAULT_ORACLE_THRESHOLD);
        assert_eq!(rules.oracle_timeout, Duration::from_secs(2));
        assert_eq!(rules.quiet_after, Duration::from_secs(600));
    }

    #[test]
    fn base_probability_out_of_range_is_fatal() {
        let text = r#"{
            "hard_rules": {},
            "vibe_rules": { "x": { "base_reply_probability": 1.5 } }
        }"#;
        let err = Rules::from_json(text).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
    }

    #[test]
    fn dynamics_with_unknown_agent_is_fatal() {
        let text = r#"{
            "hard_rules": {},
            "vibe_rules": { "x": { "base_reply_probability": 0.1 } },
            "interaction_dynamics": { "x->ghost": 0.2 }
        }"#;
        let err = Rules::from_json(text).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownAgent { .. }));
    }

    #[test]
    fn empty_special_trigger_keywords_is_fatal() {
        let text = r#"{
            "hard_rules": {},
            "vibe_rules": { "x": { "base_reply_probability": 0.1 } },
            "special_triggers": { "dud": { "keywords": [], "boost": 0.1 } }
        }"#;
        let err = Rules::from_json(text).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyKeywords { .. }));
    }

    #[test]
    fn missing_vibe_rules_is_a_parse_error() {
        let err = Rules::from_json(r#"{ "hard_rules": {} }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn keyword_modifier_without_category_is_fatal() {
        let text = r#"{
            "hard_rules": {},
            "vibe_rules": {
                "x": {
                    "base_reply_probability": 0.1,
                    "trigger_modifiers": { "keyword:nope": 0.2 }
                }
            }
        }"#;
        assert!(Rules::from_json(text).is_err());
    }

    #[test]
    fn word_matcher_respects_boundaries() {
        let m = word_matcher(&["burn".to_string()]);
        assert!(m.is_match("sick burn, dude"));
        assert!(!m.is_match("burnish the brass"));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_RULES.as_bytes()).unwrap();
        let rules = Rules::load(file.path()).unwrap();
        assert!(rules.is_agent("ford"));
        assert!(!rules.is_agent("human_1"));
    }
}
