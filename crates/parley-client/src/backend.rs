//! Backend collaborator contracts.
//!
//! The synchronization core consumes three collaborators: the REST-style
//! message API, binary object storage for attachments, and the push change
//! feed. Only request/response shapes are specified here; transport mechanics
//! (and timeouts) belong to the implementations.
//!
//! # Implementations
//!
//! - **HTTP** (`http` feature): [`crate::http::HttpApi`] for the message API
//! - **Simulation**: `parley_harness::SimBackend` implements all three
//!   in memory, with failure injection and duplicate delivery

use std::future::Future;

use bytes::Bytes;
use parley_core::{Contact, ConversationId, Message, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Default page number (pages are 1-based).
pub const DEFAULT_PAGE: u32 = 1;

/// Default page size.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Errors reported by backend collaborators.
///
/// The core treats every variant (and a timeout inside the transport)
/// identically: the request failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// Backend answered with a non-success status.
    #[error("backend returned {status}: {reason}")]
    Status {
        /// HTTP-like status code
        status: u16,
        /// Status text or body excerpt
        reason: String,
    },

    /// Response body did not match the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),

    /// Backend refused the operation.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Channel or connection was closed.
    #[error("connection closed")]
    Closed,
}

/// Page selector for message fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: u32,
    /// Maximum messages per page.
    pub limit: u32,
}

impl PageRequest {
    /// First page with `limit` messages.
    pub fn first(limit: u32) -> Self {
        Self { page: DEFAULT_PAGE, limit }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first(DEFAULT_PAGE_LIMIT)
    }
}

/// Body of `POST messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// Local user.
    pub sender_id: UserId,
    /// Text body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Public URL of the uploaded attachment.
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Opaque reference to an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef(pub String);

/// Row-level notification delivered on a change-feed topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum FeedEvent {
    /// A message was persisted.
    Insert {
        /// The persisted message.
        message: Message,
    },
}

impl FeedEvent {
    /// Message carried by the event.
    pub fn message(&self) -> &Message {
        match self {
            Self::Insert { message } => message,
        }
    }

    /// Take the carried message.
    pub fn into_message(self) -> Message {
        match self {
            Self::Insert { message } => message,
        }
    }
}

/// Open subscription to one topic.
///
/// Events arrive at least once; duplicates and reordering relative to the
/// fetch and send paths are expected. Dropping the receiver stops local
/// delivery but does not release server-side resources; call
/// [`ChangeFeed::unsubscribe`] for that.
#[derive(Debug)]
pub struct FeedSubscription {
    /// Topic (conversation) the subscription is scoped to.
    pub topic: ConversationId,
    /// Inbound events.
    pub events: mpsc::Receiver<FeedEvent>,
}

/// Roster, page and send operations.
pub trait MessageApi: Send + Sync + 'static {
    /// `GET contacts`
    fn fetch_contacts(&self) -> impl Future<Output = Result<Vec<Contact>, BackendError>> + Send;

    /// `GET contacts/search?q=`
    fn search_contacts(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Vec<Contact>, BackendError>> + Send;

    /// `GET messages/{conversation_id}?page&limit`, ascending by creation time.
    fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        page: PageRequest,
    ) -> impl Future<Output = Result<Vec<Message>, BackendError>> + Send;

    /// `POST messages`. The backend assigns the final id and timestamp.
    fn send_message(
        &self,
        request: SendRequest,
    ) -> impl Future<Output = Result<Message, BackendError>> + Send;
}

/// Binary object storage for attachments.
pub trait ObjectStore: Send + Sync + 'static {
    /// Store `bytes` under `name`.
    fn upload(
        &self,
        bytes: Bytes,
        name: &str,
    ) -> impl Future<Output = Result<ObjectRef, BackendError>> + Send;

    /// Public URI of a stored object.
    fn public_url(&self, object: &ObjectRef) -> String;
}

/// Push-based change feed scoped by topic.
pub trait ChangeFeed: Send + Sync + 'static {
    /// Open a subscription. Resolves once the backend acknowledged it.
    fn subscribe(
        &self,
        topic: &ConversationId,
    ) -> impl Future<Output = Result<FeedSubscription, BackendError>> + Send;

    /// Release the server-side resources of `topic`.
    fn unsubscribe(
        &self,
        topic: &ConversationId,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// Every collaborator the runtime needs.
pub trait Backend: MessageApi + ObjectStore + ChangeFeed {}

impl<T: MessageApi + ObjectStore + ChangeFeed> Backend for T {}
