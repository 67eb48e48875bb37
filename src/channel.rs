//! Per-channel workers and the router that owns them.
//!
//! Every channel is an independent unit of state. The router lazily
//! spawns one worker task per channel; the worker owns that channel's
//! [`ConversationState`] exclusively and consumes its message queue
//! strictly in arrival order, so message N's full evaluation (including
//! the serialized dispatch step) completes before N+1 begins. Channels
//! never share state, so they process fully in parallel.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::engine::DecisionEngine;
use crate::error::EngineError;
use crate::message::InboundMessage;
use crate::state::ConversationState;

/// Queue depth per channel worker.
const CHANNEL_QUEUE_DEPTH: usize = 256;

struct ChannelHandle {
    queue: mpsc::Sender<InboundMessage>,
    worker: JoinHandle<()>,
}

/// Routes inbound messages to their channel's worker, spawning workers
/// lazily on a channel's first message.
pub struct ChannelRouter {
    engine: DecisionEngine,
    channels: DashMap<String, ChannelHandle>,
}

impl ChannelRouter {
    pub fn new(engine: DecisionEngine) -> Self {
        Self {
            engine,
            channels: DashMap::new(),
        }
    }

    /// Enqueue a message for its channel, creating the channel worker if
    /// this is the channel's first message.
    pub async fn dispatch(&self, msg: InboundMessage) -> Result<(), EngineError> {
        let channel_id = msg.channel_id.clone();
        let queue = {
            let handle = self
                .channels
                .entry(channel_id.clone())
                .or_insert_with(|| spawn_worker(channel_id.clone(), self.engine.clone()));
            handle.queue.clone()
        };

        queue
            .send(msg)
            .await
            .map_err(|_| EngineError::ChannelClosed { channel_id })
    }

    /// Tear down one channel. Outstanding work — including any in-flight
    /// oracle call — is dropped with the worker; no decision for a
    /// torn-down channel is ever finalized.
    pub fn close_channel(&self, channel_id: &str) {
        if let Some((_, handle)) = self.channels.remove(channel_id) {
            handle.worker.abort();
            tracing::info!(channel_id, "channel closed");
        }
    }

    /// Graceful shutdown: stop accepting messages and let every worker
    /// drain its queue.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, handle)) = self.channels.remove(&id) {
                drop(handle.queue);
                if let Err(err) = handle.worker.await {
                    if !err.is_cancelled() {
                        tracing::error!(channel_id = %id, error = %err, "worker ended abnormally");
                    }
                }
            }
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

fn spawn_worker(channel_id: String, engine: DecisionEngine) -> ChannelHandle {
    let (queue, mut rx) = mpsc::channel::<InboundMessage>(CHANNEL_QUEUE_DEPTH);
    tracing::info!(channel_id, "channel worker started");

    let worker = tokio::spawn(async move {
        let mut state = ConversationState::new();
        while let Some(msg) = rx.recv().await {
            let decisions = engine.process_message(&mut state, &msg).await;
            let approved = decisions.iter().filter(|d| d.approved).count();
            tracing::debug!(
                channel_id = %msg.channel_id,
                evaluated = decisions.len(),
                approved,
                "message cycle complete"
            );
        }
        tracing::info!(channel_id, "channel worker drained");
    });

    ChannelHandle { queue, worker }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures::SAMPLE_RULES;
    use crate::config::Rules;
    use crate::engine::oracle::NoopOracle;
    use crate::engine::sampler::SeededSampler;
    use crate::message::ReplyDirective;
    use tokio_test::assert_ok;
    use chrono::{TimeZone, Utc};

    fn router(seed: u64) -> (ChannelRouter, mpsc::Receiver<ReplyDirective>) {
        let rules = Arc::new(Rules::from_json(SAMPLE_RULES).unwrap());
        // Roomy enough that directives never backpressure the worker
        // before the test drains them.
        let (tx, rx) = mpsc::channel(256);
        let engine = DecisionEngine::new(
            rules,
            Arc::new(NoopOracle),
            Arc::new(SeededSampler::new(seed)),
            tx,
        );
        (ChannelRouter::new(engine), rx)
    }

    fn msg(channel: &str, author: &str, text: &str, secs: i64, mentions: &[&str]) -> InboundMessage {
        InboundMessage {
            channel_id: channel.into(),
            author_id: author.into(),
            text: text.into(),
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            mentioned_agent_ids: mentions.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn workers_spawn_lazily_per_channel() {
        let (router, _rx) = router(1);
        assert_eq!(router.channel_count(), 0);
        router.dispatch(msg("c1", "human_1", "hello", 0, &[])).await.unwrap();
        router.dispatch(msg("c2", "human_1", "hello", 0, &[])).await.unwrap();
        router.dispatch(msg("c1", "human_1", "again", 5, &[])).await.unwrap();
        assert_eq!(router.channel_count(), 2);
        router.shutdown().await;
    }

    #[tokio::test]
    async fn directives_only_name_configured_agents() {
        let (router, mut rx) = router(3);
        // A barrage of mention-heavy messages makes approvals likely.
        for i in 0..30 {
            router
                .dispatch(msg("c1", "human_1", "ford you hearing this?", i * 60, &["ford"]))
                .await
                .unwrap();
        }
        router.shutdown().await;
        while let Ok(directive) = rx.try_recv() {
            assert!(["ford", "april", "adam"].contains(&directive.agent_id.as_str()));
            assert_eq!(directive.channel_id, "c1");
        }
    }

    #[tokio::test]
    async fn closed_channel_is_recreated_on_next_dispatch() {
        let (router, _rx) = router(5);
        tokio_test::assert_ok!(router.dispatch(msg("c1", "human_1", "hello", 0, &[])).await);
        router.close_channel("c1");
        assert_eq!(router.channel_count(), 0);
        // A fresh dispatch simply re-creates the channel.
        tokio_test::assert_ok!(router.dispatch(msg("c1", "human_1", "anyone?", 5, &[])).await);
        assert_eq!(router.channel_count(), 1);
        router.shutdown().await;
    }

    #[tokio::test]
    async fn in_order_processing_within_a_channel() {
        // The same seed and script through the router must match a direct
        // sequential engine run, which can only hold if the worker
        // preserves arrival order.
        let script: Vec<InboundMessage> = (0..10)
            .map(|i| msg("c1", "human_1", "ford, wisdom please?", i * 45, &["ford"]))
            .collect();

        let (router, mut rx_router) = router(9);
        for m in &script {
            router.dispatch(m.clone()).await.unwrap();
        }
        router.shutdown().await;
        let mut via_router = Vec::new();
        while let Ok(d) = rx_router.try_recv() {
            via_router.push((d.agent_id, d.reason_code));
        }

        let rules = Arc::new(Rules::from_json(SAMPLE_RULES).unwrap());
        let (tx, mut rx_direct) = mpsc::channel(256);
        let engine = DecisionEngine::new(
            rules,
            Arc::new(NoopOracle),
            Arc::new(SeededSampler::new(9)),
            tx,
        );
        let mut state = ConversationState::new();
        for m in &script {
            engine.process_message(&mut state, m).await;
        }
        drop(engine);
        let mut direct = Vec::new();
        while let Ok(d) = rx_direct.try_recv() {
            direct.push((d.agent_id, d.reason_code));
        }

        assert_eq!(via_router, direct);
    }
}
