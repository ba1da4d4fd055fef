//! Parley core
//!
//! Local view of a direct-messaging session: the contact roster, the current
//! selection and the ordered message thread of the active conversation.
//!
//! # Architecture
//!
//! Everything in this crate is synchronous and free of I/O. Three independent
//! producers (initial page fetch, optimistic local sends and the push feed)
//! write into one [`ConversationStore`], which is the serialization point for
//! ordering and deduplication. Async orchestration lives in `parley-client`.
//!
//! # Components
//!
//! - [`ConversationStore`]: Ordered, deduplicated messages of one conversation
//! - [`ContactStore`]: Roster and the single active selection
//! - [`SyncError`]: Error taxonomy shared by every layer
//! - [`env::Environment`]: Time and randomness abstraction for simulation

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod contacts;
mod conversation;
pub mod env;
mod error;
mod types;

pub use contacts::{ContactStore, Selection};
pub use conversation::{AppendOutcome, ConversationStore, DayGroup, DayGroups, ReplaceOutcome};
pub use error::{FetchResource, SyncError};
pub use types::{Contact, ContactId, ContactPatch, ConversationId, Message, MessageId, UserId};
