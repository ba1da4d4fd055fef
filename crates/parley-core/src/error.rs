//! Error taxonomy for the synchronization core.
//!
//! Every condition here is recoverable by user retry (re-select, reload,
//! resend). [`SyncError::StaleEvent`] is the expected outcome of a
//! conversation-switch race and is dropped rather than shown.

use std::fmt;

use thiserror::Error;

use crate::{ConversationId, MessageId};

/// What a failed fetch was trying to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResource {
    /// The full contact roster.
    Roster,
    /// Remote contact search.
    Search {
        /// Query that was searched.
        query: String,
    },
    /// A page of messages for one conversation.
    Messages {
        /// Conversation whose page was requested.
        conversation_id: ConversationId,
    },
}

impl fmt::Display for FetchResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Roster => f.write_str("contacts"),
            Self::Search { query } => write!(f, "contact search {query:?}"),
            Self::Messages { conversation_id } => write!(f, "messages of {conversation_id}"),
        }
    }
}

/// Errors surfaced by the synchronization core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Roster, search or message page fetch failed (or timed out).
    #[error("failed to fetch {resource}: {reason}")]
    FetchFailed {
        /// What was being fetched
        resource: FetchResource,
        /// Transport-level description
        reason: String,
    },

    /// Backend rejected the message or the request failed in flight.
    #[error("failed to send message {temp_id}: {reason}")]
    SendFailed {
        /// Placeholder id of the abandoned send
        temp_id: MessageId,
        /// Transport-level description
        reason: String,
    },

    /// Attachment upload failed; the send was aborted.
    #[error("failed to upload attachment for {temp_id}: {reason}")]
    UploadFailed {
        /// Placeholder id of the abandoned send
        temp_id: MessageId,
        /// Storage-level description
        reason: String,
    },

    /// Nothing to send, or no conversation to send it to.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// What was wrong with the input
        reason: &'static str,
    },

    /// Event or completion for a conversation that is no longer active.
    #[error("stale event for conversation {conversation_id}")]
    StaleEvent {
        /// Conversation the event belonged to
        conversation_id: ConversationId,
    },

    /// Change-feed subscription could not be opened.
    #[error("failed to subscribe to {topic}: {reason}")]
    SubscriptionFailed {
        /// Conversation topic
        topic: ConversationId,
        /// Transport-level description
        reason: String,
    },
}

impl SyncError {
    /// Returns true if the error should be shown to the user.
    ///
    /// Stale events are an expected race between a conversation switch and
    /// in-flight work; they are logged and dropped.
    pub fn is_surfaced(&self) -> bool {
        !matches!(self, Self::StaleEvent { .. })
    }
}
