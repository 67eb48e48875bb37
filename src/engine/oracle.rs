//! The external judgment oracle seam.
//!
//! When a vibe score crosses the evaluation threshold, the engine asks an
//! external reasoning service whether the timing is right, whether the
//! response would add value, and whether the conversation needs this
//! agent's energy. The answer is a bounded probability adjustment.
//!
//! The call is always wrapped in a timeout and fails open: on timeout or
//! error the adjustment is zero and the decision proceeds unrefined.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The oracle may shift a probability by at most this much either way.
pub const MAX_ADJUSTMENT: f64 = 0.3;

/// A request for judgment on one agent's pending decision.
#[derive(Debug, Clone, Serialize)]
pub struct JudgmentRequest {
    pub agent_id: String,
    /// Recent conversation rendered as `author: text` lines.
    pub conversation_excerpt: String,
    /// The vibe score the oracle is refining.
    pub computed_probability: f64,
}

/// The oracle's bounded adjustment.
#[derive(Debug, Clone, Deserialize)]
pub struct JudgmentResponse {
    /// Additive shift; values outside ±[`MAX_ADJUSTMENT`] are clamped.
    pub adjustment: f64,
}

/// An error from the oracle backend. All variants are non-fatal.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle call failed: {0}")]
    Failed(String),

    #[error("oracle returned an unusable response: {0}")]
    Malformed(String),
}

/// External judgment service. Implementations wrap whatever reasoning
/// backend the deployment provides; the engine only sees this seam.
#[async_trait]
pub trait JudgmentOracle: Send + Sync {
    async fn judge(&self, request: JudgmentRequest) -> Result<JudgmentResponse, OracleError>;
}

/// An oracle that never adjusts anything. Used when no reasoning backend
/// is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOracle;

#[async_trait]
impl JudgmentOracle for NoopOracle {
    async fn judge(&self, _request: JudgmentRequest) -> Result<JudgmentResponse, OracleError> {
        Ok(JudgmentResponse { adjustment: 0.0 })
    }
}

/// Ask the oracle with a hard timeout. Timeout and errors both yield a
/// zero adjustment; in-range answers are clamped to ±[`MAX_ADJUSTMENT`].
pub async fn bounded_adjustment(
    oracle: &dyn JudgmentOracle,
    request: JudgmentRequest,
    timeout: std::time::Duration,
) -> f64 {
    let agent_id = request.agent_id.clone();
    match tokio::time::timeout(timeout, oracle.judge(request)).await {
        Ok(Ok(response)) => {
            let adjustment = response.adjustment.clamp(-MAX_ADJUSTMENT, MAX_ADJUSTMENT);
            if !adjustment.is_finite() {
                tracing::warn!(agent_id, "oracle returned a non-finite adjustment, ignoring");
                return 0.0;
            }
            tracing::debug!(agent_id, adjustment, "oracle adjustment applied");
            adjustment
        }
        Ok(Err(err)) => {
            tracing::warn!(agent_id, error = %err, "oracle error, proceeding unadjusted");
            0.0
        }
        Err(_) => {
            tracing::warn!(agent_id, ?timeout, "oracle timed out, proceeding unadjusted");
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Test oracle returning a fixed result, optionally after a delay.
    pub(crate) struct FixedOracle {
        pub adjustment: f64,
        pub delay: Duration,
    }

    #[async_trait]
    impl JudgmentOracle for FixedOracle {
        async fn judge(&self, _request: JudgmentRequest) -> Result<JudgmentResponse, OracleError> {
            tokio::time::sleep(self.delay).await;
            Ok(JudgmentResponse {
                adjustment: self.adjustment,
            })
        }
    }

    struct FailingOracle;

    #[async_trait]
    impl JudgmentOracle for FailingOracle {
        async fn judge(&self, _request: JudgmentRequest) -> Result<JudgmentResponse, OracleError> {
            Err(OracleError::Failed("backend unavailable".into()))
        }
    }

    fn request() -> JudgmentRequest {
        JudgmentRequest {
            agent_id: "ford".into(),
            conversation_excerpt: "human_1: hello".into(),
            computed_probability: 0.5,
        }
    }

    #[tokio::test]
    async fn in_range_adjustment_passes_through() {
        let oracle = FixedOracle {
            adjustment: 0.2,
            delay: Duration::ZERO,
        };
        let adj = bounded_adjustment(&oracle, request(), Duration::from_secs(1)).await;
        assert_eq!(adj, 0.2);
    }

    #[tokio::test]
    async fn out_of_range_adjustment_is_clamped() {
        let oracle = FixedOracle {
            adjustment: 0.9,
            delay: Duration::ZERO,
        };
        let adj = bounded_adjustment(&oracle, request(), Duration::from_secs(1)).await;
        assert_eq!(adj, MAX_ADJUSTMENT);
    }

    #[tokio::test]
    async fn timeout_fails_open_to_zero() {
        let oracle = FixedOracle {
            adjustment: 0.3,
            delay: Duration::from_secs(30),
        };
        let adj = bounded_adjustment(&oracle, request(), Duration::from_millis(10)).await;
        assert_eq!(adj, 0.0);
    }

    #[tokio::test]
    async fn backend_error_fails_open_to_zero() {
        let adj = bounded_adjustment(&FailingOracle, request(), Duration::from_secs(1)).await;
        assert_eq!(adj, 0.0);
    }
}
