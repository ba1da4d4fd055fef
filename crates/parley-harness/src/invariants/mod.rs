//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties that must hold after every render, whatever
//! order fetches, sends and push events resolved in.
//!
//! # Architecture
//!
//! [`crate::SimDriver`] captures a [`SessionSnapshot`] on every render and runs
//! the registered [`Invariant`] checks against it. A violation fails the
//! render, which stops the runtime with the violation as its error.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let snapshot = SessionSnapshot::capture(&session);
//! registry.check_all(&snapshot)?;
//! ```

mod checks;
mod snapshot;

pub use checks::{
    ConversationIsolation, MessagesOrdered, PlaceholdersTracked, SubscriptionFollowsSelection,
    UniqueMessageIds,
};
pub use snapshot::SessionSnapshot;

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// An invariant that can be checked against a session snapshot.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against the snapshot.
    ///
    /// Returns `Ok(())` if the invariant holds, or a [`Violation`]
    /// describing what went wrong.
    fn check(&self, state: &SessionSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InvariantRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.invariants.iter().map(|i| i.name())).finish()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Create a registry with every sync invariant.
    ///
    /// Includes:
    /// - [`MessagesOrdered`]: thread is strictly ascending by `(created_at, id)`
    /// - [`UniqueMessageIds`]: no id appears twice
    /// - [`ConversationIsolation`]: thread holds only the loaded conversation
    /// - [`SubscriptionFollowsSelection`]: subscription topic is the selection
    /// - [`PlaceholdersTracked`]: every placeholder belongs to an in-flight send
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(MessagesOrdered);
        registry.add(UniqueMessageIds);
        registry.add(ConversationIsolation);
        registry.add(SubscriptionFollowsSelection);
        registry.add(PlaceholdersTracked);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants against the given state.
    ///
    /// Returns `Ok(())` if all invariants hold, or all violations found.
    pub fn check_all(&self, state: &SessionSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
