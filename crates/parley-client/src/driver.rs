//! Driver trait for abstracting the presentation layer.
//!
//! The [`Driver`] trait decouples the runtime from a specific frontend. Each
//! frontend implements it to supply user intents and to draw the session,
//! while the generic [`crate::Runtime`] handles all orchestration.

use std::future::Future;

use parley_core::{SyncError, env::Environment};

use crate::{Session, SessionEvent};

/// Abstracts user input and rendering for the runtime.
///
/// # Implementations
///
/// - **Simulation**: `parley_harness::SimDriver` replays scripted intents
///   and checks invariants on every render
/// - **GUI / terminal**: any frontend that can turn user actions into
///   [`SessionEvent`]s and draw a [`Session`]
pub trait Driver: Send {
    /// Frontend-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Wait for the next user intent.
    ///
    /// Must be cancel-safe: the runtime races it against backend completions.
    /// Returns `None` once the frontend has closed.
    fn next_input(&mut self) -> impl Future<Output = Option<SessionEvent>> + Send;

    /// Draw the current state.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails; the runtime stops.
    fn render<E: Environment>(&mut self, session: &Session<E>) -> Result<(), Self::Error>;

    /// Show a surfaced error to the user.
    ///
    /// # Errors
    ///
    /// Returns an error if the frontend cannot display it.
    fn notify(&mut self, error: &SyncError) -> Result<(), Self::Error>;

    /// Release frontend resources.
    fn stop(&mut self);
}
