//! Deterministic simulation harness for the Parley sync core.
//!
//! In-memory implementations of the Environment, Backend and Driver seams so
//! the production [`parley_client::Runtime`] can be driven through
//! reproducible conversation-switch, send and push-delivery races.
//!
//! # Components
//!
//! - [`SimEnv`]: Seeded RNG and virtual clock
//! - [`SimBackend`]: Message API, object store and change feed with fault
//!   injection and duplicate delivery
//! - [`SimDriver`]: Scripted frontend publishing a snapshot per render
//!
//! # Invariant Testing
//!
//! The `invariants` module checks behavioral properties on every render. Use
//! [`InvariantRegistry::standard()`] for the full set of sync invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_backend;
pub mod sim_driver;
pub mod sim_env;

pub use invariants::{
    ConversationIsolation, Invariant, InvariantRegistry, InvariantResult, MessagesOrdered,
    PlaceholdersTracked, SessionSnapshot, SubscriptionFollowsSelection, UniqueMessageIds,
    Violation,
};
pub use sim_backend::{BackendCall, Fault, SimBackend};
pub use sim_driver::{SimDriver, SimDriverError, SimHandle};
pub use sim_env::SimEnv;
