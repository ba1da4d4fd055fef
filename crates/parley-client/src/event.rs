//! Session events and actions.
//!
//! [`SessionEvent`]s drive the [`crate::Session`] state machine. They come from
//! two distinct sources:
//! - User intents forwarded by the presentation layer (select, compose, ...).
//! - Completions of asynchronous work started by earlier [`SessionAction`]s.
//!
//! Completions carry the conversation, topic or placeholder id they belong to,
//! so staleness is judged when they resolve rather than when they were issued.

use bytes::Bytes;
use parley_core::{Contact, ContactId, ConversationId, Message, MessageId, SyncError};

use crate::backend::{FeedEvent, PageRequest, SendRequest};

/// File picked for sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Original file name (used for the stored object's extension).
    pub name: String,
    /// File contents.
    pub bytes: Bytes,
}

impl Attachment {
    /// Attachment with the given name and contents.
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self { name: name.into(), bytes: bytes.into() }
    }

    /// Check if there is nothing to upload.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Events processed by the Session state machine.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// User opened a contact's conversation.
    Select {
        /// Contact to open.
        contact_id: ContactId,
    },

    /// User closed the conversation view.
    ClearSelection,

    /// User searched the directory.
    Search {
        /// Search text.
        query: String,
    },

    /// User pressed send.
    Compose {
        /// Typed text, possibly blank.
        text: Option<String>,
        /// Picked file, if any.
        attachment: Option<Attachment>,
    },

    /// User asked to retry loading the open conversation.
    Reload,

    /// Session is ending.
    SignOut,

    /// Roster fetch succeeded.
    RosterLoaded {
        /// Full roster.
        contacts: Vec<Contact>,
    },

    /// Roster fetch failed.
    RosterFailed {
        /// Failure description.
        reason: String,
    },

    /// Remote search succeeded.
    SearchCompleted {
        /// Query the results belong to.
        query: String,
        /// Matching contacts.
        contacts: Vec<Contact>,
    },

    /// Remote search failed.
    SearchFailed {
        /// Query that failed.
        query: String,
        /// Failure description.
        reason: String,
    },

    /// Message page arrived.
    MessagesLoaded {
        /// Conversation the page was requested for.
        conversation_id: ConversationId,
        /// Page contents, ascending.
        messages: Vec<Message>,
    },

    /// Message page fetch failed.
    MessagesFailed {
        /// Conversation the page was requested for.
        conversation_id: ConversationId,
        /// Failure description.
        reason: String,
    },

    /// Backend acknowledged a subscription.
    SubscriptionAcknowledged {
        /// Subscribed topic.
        topic: ConversationId,
    },

    /// Subscription could not be opened.
    SubscriptionFailed {
        /// Requested topic.
        topic: ConversationId,
        /// Failure description.
        reason: String,
    },

    /// Push notification arrived.
    Feed {
        /// Topic of the subscription that delivered it.
        topic: ConversationId,
        /// The notification.
        event: FeedEvent,
    },

    /// Attachment stored.
    UploadCompleted {
        /// Placeholder of the send waiting for it.
        temp_id: MessageId,
        /// Public URL of the stored object.
        url: String,
    },

    /// Attachment upload failed.
    UploadFailed {
        /// Placeholder of the send waiting for it.
        temp_id: MessageId,
        /// Failure description.
        reason: String,
    },

    /// Backend persisted a sent message.
    SendCompleted {
        /// Placeholder to swap out.
        temp_id: MessageId,
        /// Confirmed copy with final id and timestamp.
        message: Message,
    },

    /// Send request failed.
    SendFailed {
        /// Placeholder to roll back.
        temp_id: MessageId,
        /// Failure description.
        reason: String,
    },
}

/// Actions produced by the Session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Redraw from the current state.
    Render,

    /// Show an error to the user.
    Notify(SyncError),

    /// Stop the runtime.
    Quit,

    /// Load the roster.
    FetchRoster,

    /// Search the remote directory.
    SearchContacts {
        /// Search text.
        query: String,
    },

    /// Load a page of messages.
    FetchMessages {
        /// Conversation to load.
        conversation_id: ConversationId,
        /// Page to load.
        page: PageRequest,
    },

    /// Open the change-feed subscription for `topic`.
    ///
    /// Always preceded by the [`SessionAction::Unsubscribe`] of any previous
    /// topic within the same batch.
    Subscribe {
        /// Conversation topic.
        topic: ConversationId,
    },

    /// Tear down the subscription for `topic`.
    Unsubscribe {
        /// Conversation topic.
        topic: ConversationId,
    },

    /// Upload an attachment before sending.
    Upload {
        /// Placeholder of the pending send.
        temp_id: MessageId,
        /// Object name in storage.
        object_name: String,
        /// File contents.
        bytes: Bytes,
    },

    /// Issue the send request.
    Send {
        /// Placeholder of the pending send.
        temp_id: MessageId,
        /// Request body.
        request: SendRequest,
    },
}
