//! Injectable randomness for decision sampling.
//!
//! The final reply decision is a single uniform draw in [0, 1) compared
//! against the computed probability. The draw sits behind a trait so
//! deterministic tests (and reproducible replays) can supply a seeded or
//! scripted sequence.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of uniform draws in [0, 1).
pub trait DecisionSampler: Send + Sync {
    fn draw(&self) -> f64;
}

/// Production sampler backed by the thread RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSampler;

impl DecisionSampler for ThreadSampler {
    fn draw(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Seeded sampler for reproducible runs: the same seed and the same
/// ordered message sequence yield the same decision sequence.
#[derive(Debug)]
pub struct SeededSampler {
    rng: Mutex<StdRng>,
}

impl SeededSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl DecisionSampler for SeededSampler {
    fn draw(&self) -> f64 {
        self.rng.lock().gen::<f64>()
    }
}

/// Scripted sampler: replays a fixed sequence of draws, then repeats the
/// last one. Test-only.
#[cfg(test)]
pub(crate) struct ScriptedSampler {
    draws: Mutex<std::collections::VecDeque<f64>>,
    last: f64,
}

#[cfg(test)]
impl ScriptedSampler {
    pub(crate) fn new(draws: &[f64]) -> Self {
        Self {
            draws: Mutex::new(draws.iter().copied().collect()),
            last: *draws.last().unwrap_or(&0.5),
        }
    }
}

#[cfg(test)]
impl DecisionSampler for ScriptedSampler {
    fn draw(&self) -> f64 {
        self.draws.lock().pop_front().unwrap_or(self.last)
    }
}
