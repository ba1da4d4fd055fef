//! Identifiers, contacts and messages.
//!
//! Field names follow the backend's JSON shape (camelCase, `name`, `content`,
//! `imageUrl`) so the same types travel over the wire and through the stores.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix reserved for client-generated placeholder ids.
const LOCAL_ID_PREFIX: &str = "local-";

/// Preview shown for messages without text.
const ATTACHMENT_PREVIEW: &str = "Image";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id! {
    /// Opaque contact identifier assigned by the backend.
    ContactId
}

string_id! {
    /// Conversation identifier. A conversation is keyed by the contact's id.
    ConversationId
}

string_id! {
    /// Message identifier, unique within a conversation.
    MessageId
}

string_id! {
    /// Stable identity of a user (the local user or a message sender).
    UserId
}

impl From<&ContactId> for ConversationId {
    fn from(contact: &ContactId) -> Self {
        Self(contact.0.clone())
    }
}

impl ConversationId {
    /// Contact this conversation is held with.
    pub fn contact_id(&self) -> ContactId {
        ContactId(self.0.clone())
    }
}

impl MessageId {
    /// Temporary id for an optimistic placeholder.
    ///
    /// Backend-assigned ids never carry the local prefix, so a placeholder can
    /// not collide with a confirmed or pushed copy.
    pub fn local(nonce: u64) -> Self {
        Self(format!("{LOCAL_ID_PREFIX}{nonce:016x}"))
    }

    /// Whether this id was generated locally for a placeholder.
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }
}

/// Entry in the contact roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Contact identity.
    pub id: ContactId,
    /// Name shown in the roster.
    #[serde(rename = "name")]
    pub display_name: String,
    /// Avatar image URI.
    #[serde(default, rename = "avatar", skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
    /// Free-form presence text ("Online", "Away", ...).
    #[serde(default, rename = "status", skip_serializing_if = "Option::is_none")]
    pub presence_status: Option<String>,
    /// Preview of the latest message in the conversation.
    #[serde(default, rename = "lastMessage", skip_serializing_if = "Option::is_none")]
    pub last_message_preview: Option<String>,
    /// Timestamp of the latest message in the conversation.
    #[serde(default, rename = "lastMessageTime", skip_serializing_if = "Option::is_none")]
    pub last_message_timestamp: Option<DateTime<Utc>>,
    /// Unread message count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<u32>,
}

impl Contact {
    /// Contact with only identity and display name set.
    pub fn new(id: impl Into<ContactId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_ref: None,
            presence_status: None,
            last_message_preview: None,
            last_message_timestamp: None,
            unread_count: None,
        }
    }

    /// Conversation held with this contact.
    pub fn conversation_id(&self) -> ConversationId {
        ConversationId::from(&self.id)
    }
}

/// Partial update merged into a [`Contact`]. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactPatch {
    /// New display name.
    pub display_name: Option<String>,
    /// New avatar URI.
    pub avatar_ref: Option<String>,
    /// New presence text.
    pub presence_status: Option<String>,
    /// New last-message preview.
    pub last_message_preview: Option<String>,
    /// New last-message timestamp.
    pub last_message_timestamp: Option<DateTime<Utc>>,
    /// New unread count.
    pub unread_count: Option<u32>,
}

impl ContactPatch {
    /// Patch refreshing the last-message preview from `message`.
    pub fn last_message(message: &Message) -> Self {
        Self {
            last_message_preview: Some(message.preview()),
            last_message_timestamp: Some(message.created_at),
            ..Self::default()
        }
    }

    /// Merge the set fields into `contact`.
    pub fn apply(&self, contact: &mut Contact) {
        if let Some(name) = &self.display_name {
            contact.display_name.clone_from(name);
        }
        if let Some(avatar) = &self.avatar_ref {
            contact.avatar_ref = Some(avatar.clone());
        }
        if let Some(status) = &self.presence_status {
            contact.presence_status = Some(status.clone());
        }
        if let Some(preview) = &self.last_message_preview {
            contact.last_message_preview = Some(preview.clone());
        }
        if let Some(at) = self.last_message_timestamp {
            contact.last_message_timestamp = Some(at);
        }
        if let Some(count) = self.unread_count {
            contact.unread_count = Some(count);
        }
    }
}

/// A message in a conversation.
///
/// A message carries text, an attachment or both. The composer enforces this;
/// storage does not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Backend-assigned id, or a local id while the message is a placeholder.
    pub id: MessageId,
    /// Conversation the message belongs to.
    pub conversation_id: ConversationId,
    /// Author.
    pub sender_id: UserId,
    /// Text body.
    #[serde(default, rename = "content", skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    /// Public URI of the attached image.
    #[serde(default, rename = "imageUrl", skip_serializing_if = "Option::is_none")]
    pub attachment_ref: Option<String>,
    /// Creation time (server time once confirmed).
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Total-order key: creation time, then id for equal timestamps.
    pub fn order_key(&self) -> (DateTime<Utc>, &MessageId) {
        (self.created_at, &self.id)
    }

    /// Whether the message has text or an attachment.
    pub fn has_content(&self) -> bool {
        self.text_content.as_deref().is_some_and(|t| !t.trim().is_empty())
            || self.attachment_ref.is_some()
    }

    /// Whether this is an optimistic placeholder awaiting confirmation.
    pub fn is_placeholder(&self) -> bool {
        self.id.is_local()
    }

    /// Short roster preview: the text, or a marker for attachment-only messages.
    pub fn preview(&self) -> String {
        match self.text_content.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text.to_owned(),
            _ => ATTACHMENT_PREVIEW.to_owned(),
        }
    }
}
