//! Message composer and send pipeline.
//!
//! A send is optimistic: a placeholder with a local id lands in the store
//! immediately, then the attachment (if any) is uploaded, then the send request
//! is issued. The confirmed copy replaces the placeholder; any failure removes
//! it. Because the placeholder id and the backend id differ, a push event for
//! the same message can arrive before or after the swap without leaving two
//! bubbles.
//!
//! Placeholders are kept here as well as in the store. A send composed while
//! its conversation is still loading shows up once the page lands, through
//! [`Composer::restore`].

use std::{collections::HashMap, path::Path};

use parley_core::{
    AppendOutcome, ConversationId, ConversationStore, Message, MessageId, ReplaceOutcome,
    SyncError, UserId, env::Environment,
};

use crate::{Attachment, SessionAction, backend::SendRequest};

/// Extension used when the picked file has none.
const DEFAULT_EXTENSION: &str = "bin";

/// Scheme of the attachment reference shown while the upload is in flight.
const PENDING_ATTACHMENT_SCHEME: &str = "pending:";

/// A send that has not resolved yet.
#[derive(Debug, Clone)]
struct PendingSend {
    placeholder: Message,
}

/// Tracks in-flight sends of the local user.
#[derive(Debug, Clone)]
pub struct Composer {
    user_id: UserId,
    pending: HashMap<MessageId, PendingSend>,
    /// Confirmed sends whose conversation was not loaded when they resolved.
    unlanded: Vec<Message>,
}

impl Composer {
    /// Composer sending as `user_id`.
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, pending: HashMap::new(), unlanded: Vec::new() }
    }

    /// Start sending `text` and/or `attachment` to `conversation_id`.
    ///
    /// Appends the placeholder to `store` and returns its temporary id along
    /// with the first I/O step: [`SessionAction::Upload`] when there is an
    /// attachment, [`SessionAction::Send`] otherwise.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidInput`] if there is no conversation, or if the
    /// trimmed text is empty and no attachment was given. Nothing is mutated.
    pub fn compose<E: Environment>(
        &mut self,
        env: &E,
        store: &mut ConversationStore,
        conversation_id: Option<&ConversationId>,
        text: Option<String>,
        attachment: Option<Attachment>,
    ) -> Result<(MessageId, SessionAction), SyncError> {
        let conversation_id = conversation_id
            .cloned()
            .ok_or(SyncError::InvalidInput { reason: "no conversation selected" })?;
        let text = text.filter(|t| !t.trim().is_empty());
        let attachment = attachment.filter(|a| !a.is_empty());
        if text.is_none() && attachment.is_none() {
            return Err(SyncError::InvalidInput { reason: "message is empty" });
        }

        let now = env.now();
        let temp_id = MessageId::local(env.random_u64());
        let object_name = attachment
            .as_ref()
            .map(|a| object_name(&self.user_id, now.timestamp_millis(), &a.name));

        let placeholder = Message {
            id: temp_id.clone(),
            conversation_id: conversation_id.clone(),
            sender_id: self.user_id.clone(),
            text_content: text.clone(),
            attachment_ref: object_name.as_ref().map(|n| format!("{PENDING_ATTACHMENT_SCHEME}{n}")),
            created_at: now,
        };
        if !store.append(placeholder.clone()).is_inserted() {
            tracing::debug!(
                temp_id = %temp_id,
                conversation_id = %conversation_id,
                "placeholder held until conversation loads"
            );
        }

        let action = match (attachment, object_name) {
            (Some(file), Some(object_name)) => {
                SessionAction::Upload { temp_id: temp_id.clone(), object_name, bytes: file.bytes }
            },
            _ => SessionAction::Send {
                temp_id: temp_id.clone(),
                request: self.request(&conversation_id, text, None),
            },
        };

        tracing::debug!(temp_id = %temp_id, conversation_id = %conversation_id, "send started");
        self.pending.insert(temp_id.clone(), PendingSend { placeholder });
        Ok((temp_id, action))
    }

    /// The attachment of `temp_id` is stored at `url`; issue the send.
    ///
    /// Returns `None` for an unknown send.
    pub fn upload_completed(&self, temp_id: &MessageId, url: String) -> Option<SessionAction> {
        let placeholder = &self.pending.get(temp_id)?.placeholder;
        Some(SessionAction::Send {
            temp_id: temp_id.clone(),
            request: self.request(
                &placeholder.conversation_id,
                placeholder.text_content.clone(),
                Some(url),
            ),
        })
    }

    /// Swap the placeholder of `temp_id` for the confirmed copy.
    ///
    /// A confirmation for a conversation the store does not hold yet is kept
    /// for [`restore`](Self::restore). Returns `None` for an unknown send.
    pub fn send_completed(
        &mut self,
        store: &mut ConversationStore,
        temp_id: &MessageId,
        message: Message,
    ) -> Option<ReplaceOutcome> {
        self.pending.remove(temp_id)?;
        let outcome = store.replace(temp_id, Some(message.clone()));
        if outcome.appended == Some(AppendOutcome::WrongConversation) {
            tracing::debug!(temp_id = %temp_id, message_id = %message.id, "confirmation held");
            self.unlanded.push(message);
        }
        Some(outcome)
    }

    /// Put in-flight placeholders and held confirmations of the conversation
    /// `store` now holds back into the thread.
    ///
    /// Held confirmations of other conversations are discarded; a later page
    /// fetch of their conversation carries them. Returns how many messages
    /// were added.
    pub fn restore(&mut self, store: &mut ConversationStore) -> usize {
        let Some(current) = store.conversation_id().cloned() else {
            return 0;
        };

        let placeholders = self
            .pending
            .values()
            .filter(|p| p.placeholder.conversation_id == current)
            .map(|p| p.placeholder.clone());
        let confirmed = std::mem::take(&mut self.unlanded)
            .into_iter()
            .filter(|m| m.conversation_id == current);

        placeholders
            .chain(confirmed)
            .map(|m| store.append(m))
            .filter(|o| o.is_inserted())
            .count()
    }

    /// Roll back `temp_id` after its upload or send failed.
    ///
    /// Returns `false` for an unknown send.
    pub fn abort(&mut self, store: &mut ConversationStore, temp_id: &MessageId) -> bool {
        if self.pending.remove(temp_id).is_none() {
            return false;
        }
        let _ = store.replace(temp_id, None);
        true
    }

    /// Whether `temp_id` is still in flight.
    pub fn is_pending(&self, temp_id: &MessageId) -> bool {
        self.pending.contains_key(temp_id)
    }

    /// Number of sends in flight.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Sends in flight with their target conversation, in no particular order.
    pub fn pending(&self) -> impl Iterator<Item = (&MessageId, &ConversationId)> {
        self.pending.iter().map(|(id, p)| (id, &p.placeholder.conversation_id))
    }

    fn request(
        &self,
        conversation_id: &ConversationId,
        content: Option<String>,
        image_url: Option<String>,
    ) -> SendRequest {
        SendRequest {
            conversation_id: conversation_id.clone(),
            sender_id: self.user_id.clone(),
            content,
            image_url,
        }
    }
}

/// Storage name of an attachment: `{user}-{unix_millis}.{ext}`.
fn object_name(user_id: &UserId, unix_millis: i64, file_name: &str) -> String {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .unwrap_or(DEFAULT_EXTENSION);
    format!("{user_id}-{unix_millis}.{ext}")
}
