//! # Firepit
//!
//! An autonomous reply-decision engine for multi-agent conversations.
//!
//! For every inbound message and every participating personality agent,
//! the engine decides whether that agent may speak next. Deterministic
//! hard rules (no self-interruption, turn-taking after direct address,
//! cooldowns, hourly rate caps) gate a probabilistic vibe model that
//! reacts to conversation content and agent-to-agent dynamics, optionally
//! refined by an external judgment oracle.
//!
//! The engine produces *permissions*, not text: approved decisions are
//! emitted as [`ReplyDirective`]s to an external response generator.
//! Message transport, text generation, and persistence are collaborators,
//! not parts of this crate.

pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod message;
pub mod state;

pub use channel::ChannelRouter;
pub use config::{Rules, TriggerKind};
pub use engine::oracle::{JudgmentOracle, JudgmentRequest, JudgmentResponse, NoopOracle};
pub use engine::sampler::{DecisionSampler, SeededSampler, ThreadSampler};
pub use engine::DecisionEngine;
pub use error::{ConfigError, EngineError};
pub use message::{Decision, HardRule, InboundMessage, ReasonCode, ReplyDirective};
pub use state::ConversationState;
