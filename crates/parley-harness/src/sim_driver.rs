//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` stands in for a frontend. It implements [`Driver`] so the same
//! [`parley_client::Runtime`] orchestration code runs in production and in
//! simulation. Intents are scripted through a [`SimHandle`]; every render is
//! published as a [`SessionSnapshot`] and checked against the invariant
//! registry.

use parley_client::{Attachment, Driver, Session, SessionEvent};
use parley_core::{ContactId, SyncError, env::Environment};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::invariants::{InvariantRegistry, SessionSnapshot, Violation};

/// Error type for simulation driver.
#[derive(Error, Debug, Clone)]
pub enum SimDriverError {
    /// A render broke one or more invariants.
    #[error("invariant violation after render {render}: {}", format_violations(.violations))]
    Invariant {
        /// Render count at the failing render.
        render: u64,
        /// Every violated invariant.
        violations: Vec<Violation>,
    },
}

fn format_violations(violations: &[Violation]) -> String {
    violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Simulation driver for deterministic testing.
pub struct SimDriver {
    inputs: mpsc::UnboundedReceiver<SessionEvent>,
    snapshots: watch::Sender<SessionSnapshot>,
    invariants: Option<InvariantRegistry>,
    notifications: Vec<SyncError>,
    renders: u64,
}

/// Test-side handle of a [`SimDriver`].
///
/// Dropping (or [`SimHandle::close`]-ing) the handle closes the frontend,
/// which signs the session out.
#[derive(Debug)]
pub struct SimHandle {
    inputs: mpsc::UnboundedSender<SessionEvent>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SimDriver {
    /// Create a driver and its scripting handle.
    pub fn new() -> (Self, SimHandle) {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::empty());
        let driver = Self {
            inputs: input_rx,
            snapshots: snapshot_tx,
            invariants: None,
            notifications: Vec::new(),
            renders: 0,
        };
        (driver, SimHandle { inputs: input_tx, snapshots: snapshot_rx })
    }

    /// Enable invariant checking.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = Some(registry);
        self
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;

    async fn next_input(&mut self) -> Option<SessionEvent> {
        self.inputs.recv().await
    }

    fn render<E: Environment>(&mut self, session: &Session<E>) -> Result<(), Self::Error> {
        self.renders += 1;

        let mut snapshot = SessionSnapshot::capture(session);
        snapshot.notifications.clone_from(&self.notifications);
        snapshot.renders = self.renders;

        if let Some(registry) = &self.invariants
            && let Err(violations) = registry.check_all(&snapshot)
        {
            tracing::error!(render = self.renders, ?violations, "invariant violation");
            return Err(SimDriverError::Invariant { render: self.renders, violations });
        }

        self.snapshots.send_replace(snapshot);
        Ok(())
    }

    fn notify(&mut self, error: &SyncError) -> Result<(), Self::Error> {
        tracing::debug!(%error, "notification");
        self.notifications.push(error.clone());
        self.snapshots.send_modify(|s| s.notifications.push(error.clone()));
        Ok(())
    }

    fn stop(&mut self) {
        self.inputs.close();
    }
}

impl SimHandle {
    /// Deliver a user intent. Ignored once the runtime has stopped.
    pub fn send(&self, event: SessionEvent) {
        if self.inputs.send(event).is_err() {
            tracing::debug!("runtime stopped, intent dropped");
        }
    }

    /// Open `contact_id`'s conversation.
    pub fn select(&self, contact_id: impl Into<ContactId>) {
        self.send(SessionEvent::Select { contact_id: contact_id.into() });
    }

    /// Send `text` to the selected conversation.
    pub fn compose(&self, text: &str) {
        self.send(SessionEvent::Compose { text: Some(text.to_owned()), attachment: None });
    }

    /// Send an attachment (and optional caption) to the selected conversation.
    pub fn compose_attachment(&self, caption: Option<&str>, attachment: Attachment) {
        self.send(SessionEvent::Compose {
            text: caption.map(str::to_owned),
            attachment: Some(attachment),
        });
    }

    /// Latest published snapshot.
    pub fn latest(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Wait until a published snapshot satisfies `predicate`.
    ///
    /// Returns the last snapshot if the runtime stops first.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        if let Ok(snapshot) = self.snapshots.wait_for(predicate).await {
            return snapshot.clone();
        }
        self.latest()
    }

    /// Close the frontend.
    pub fn close(self) {}
}
