//! Simulated Environment with a virtual clock and seeded RNG.
//!
//! Same seed, same temporary ids and same timestamps: a failing run replays
//! exactly. The clock only moves when the harness advances it; the simulated
//! backend ticks it once per persisted message so server timestamps are
//! strictly increasing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use parley_core::env::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Simulated clock origin (2026-09-21).
const DEFAULT_START_SECS: i64 = 1_790_000_000;

#[derive(Debug)]
struct SimState {
    rng: ChaCha8Rng,
    now: DateTime<Utc>,
}

/// Deterministic environment for simulation.
///
/// Clones share the clock and the RNG.
#[derive(Debug, Clone)]
pub struct SimEnv {
    state: Arc<Mutex<SimState>>,
}

impl SimEnv {
    /// Environment seeded with `seed`, clock at the default origin.
    pub fn with_seed(seed: u64) -> Self {
        let start = DateTime::from_timestamp(DEFAULT_START_SECS, 0).unwrap_or_default();
        Self::with_start(seed, start)
    }

    /// Environment seeded with `seed`, clock at `start`.
    pub fn with_start(seed: u64, start: DateTime<Utc>) -> Self {
        let state = SimState { rng: ChaCha8Rng::seed_from_u64(seed), now: start };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: TimeDelta) {
        let mut state = self.state();
        state.now += by;
    }

    /// Advance one second and return the new time.
    pub fn tick(&self) -> DateTime<Utc> {
        let mut state = self.state();
        state.now += TimeDelta::seconds(1);
        state.now
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Environment for SimEnv {
    fn now(&self) -> DateTime<Utc> {
        self.state().now
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.state().rng.fill_bytes(buffer);
    }
}
