//! Production Environment implementation using the system clock and OS RNG.
//!
//! `SystemEnv` is non-deterministic: time is the real wall clock and
//! randomness comes from the operating system. Simulation uses
//! `parley_harness::SimEnv` instead.

use chrono::{DateTime, Utc};
use parley_core::env::Environment;

/// Production environment using the wall clock and getrandom.
///
/// # Panics
///
/// Panics if the OS RNG fails. Temporary message ids must not repeat, and an
/// OS without a working RNG cannot provide that.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
