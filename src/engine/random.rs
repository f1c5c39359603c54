//! Seedable randomness for bonus draws and game outcomes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of uniform integer draws.
pub trait RandomSource: Send {
    /// Draws uniformly from `low..=high`.
    fn draw(&mut self, low: i64, high: i64) -> i64;
}

/// Pseudo-random source backed by `StdRng`.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    /// Seeds from the operating system.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible sequence for a fixed seed.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandom {
    fn draw(&mut self, low: i64, high: i64) -> i64 {
        if low >= high {
            return low;
        }
        self.rng.gen_range(low..=high)
    }
}

/// Replays a fixed list of draws, clamped into the requested range.
///
/// Once the list is exhausted every draw returns the range's lower bound.
#[derive(Debug, Clone, Default)]
pub struct FixedSequence {
    values: VecDeque<i64>,
}

impl FixedSequence {
    #[must_use]
    pub fn new(values: impl IntoIterator<Item = i64>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }
}

impl RandomSource for FixedSequence {
    fn draw(&mut self, low: i64, high: i64) -> i64 {
        self.values
            .pop_front()
            .map_or(low, |v| v.clamp(low, high.max(low)))
    }
}

/// Cloneable handle to a shared random source.
#[derive(Clone)]
pub struct SharedRandom {
    source: Arc<Mutex<Box<dyn RandomSource>>>,
}

impl SharedRandom {
    #[must_use]
    pub fn new(source: impl RandomSource + 'static) -> Self {
        Self {
            source: Arc::new(Mutex::new(Box::new(source))),
        }
    }

    /// Draws uniformly from `low..=high`.
    #[must_use]
    pub fn draw(&self, low: i64, high: i64) -> i64 {
        self.source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .draw(low, high)
    }
}

impl std::fmt::Debug for SharedRandom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRandom").finish_non_exhaustive()
    }
}
