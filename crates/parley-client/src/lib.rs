//! Parley client
//!
//! Real-time conversation sync for the Parley messaging client: a pure
//! [`Session`] state machine plus a generic async [`Runtime`] that executes its
//! actions against the backend, so the same orchestration code runs in
//! production and in deterministic simulation.
//!
//! # Components
//!
//! - [`Session`]: Sync orchestrator (selection, paging, push routing, sends)
//! - [`SubscriptionManager`]: Single change-feed subscription per selection
//! - [`Composer`]: Optimistic send pipeline with placeholder reconciliation
//! - [`backend`]: Message API, object storage and change-feed contracts
//! - [`Driver`]: Trait for the presentation layer
//! - [`Runtime`]: Generic orchestration loop using Driver and Backend

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod backend;
mod composer;
pub mod config;
mod driver;
mod event;
#[cfg(feature = "http")]
pub mod http;
mod runtime;
mod session;
mod subscription;
mod system_env;

pub use composer::Composer;
pub use config::{ClientConfig, SelfEcho, SessionConfig};
pub use driver::Driver;
pub use event::{Attachment, SessionAction, SessionEvent};
pub use runtime::Runtime;
pub use session::{SearchResults, Session};
pub use subscription::{Inbound, SubscriptionManager, SubscriptionState};
pub use system_env::SystemEnv;
