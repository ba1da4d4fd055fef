//! Client configuration.

use crate::backend::DEFAULT_PAGE_LIMIT;

/// Default base URL of the message API.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3001";

/// Default object-storage bucket for attachments.
pub const DEFAULT_ATTACHMENT_BUCKET: &str = "message-images";

/// Default capacity of a change-feed subscription's event buffer.
pub const DEFAULT_FEED_BUFFER: usize = 64;

/// What to do with push events authored by the local user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelfEcho {
    /// Drop them; the optimistic path already shows the message.
    #[default]
    Drop,
    /// Merge them through the idempotent append like any other event.
    ///
    /// Covers sends the backend persisted although the client saw a failure,
    /// at the cost of a brief double bubble while the placeholder is pending.
    Merge,
}

/// Behavior of the sync orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Messages requested per page fetch.
    pub page_size: u32,
    /// Handling of self-authored push events.
    pub self_echo: SelfEcho,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { page_size: DEFAULT_PAGE_LIMIT, self_echo: SelfEcho::Drop }
    }
}

/// Configuration for a client process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the message API.
    pub api_base_url: String,
    /// Object-storage bucket for attachments.
    pub attachment_bucket: String,
    /// Buffer size of change-feed subscriptions.
    pub feed_buffer: usize,
    /// Orchestrator configuration.
    pub session: SessionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
            attachment_bucket: DEFAULT_ATTACHMENT_BUCKET.to_owned(),
            feed_buffer: DEFAULT_FEED_BUFFER,
            session: SessionConfig::default(),
        }
    }
}
