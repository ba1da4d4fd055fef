//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture what a frontend could observe of a session at one
//! render. Invariants operate on snapshots rather than live state so a check
//! sees one consistent view.

use std::collections::HashMap;

use parley_client::{Session, SubscriptionState};
use parley_core::{
    Contact, ConversationId, Message, MessageId, SyncError, UserId, env::Environment,
};

/// Snapshot of one session.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    /// Local user.
    pub user_id: Option<UserId>,
    /// Conversation of the selected contact. `None` if nothing is selected.
    pub selected: Option<ConversationId>,
    /// Conversation the thread belongs to. `None` if nothing is loaded.
    pub loaded: Option<ConversationId>,
    /// Thread in display order.
    pub messages: Vec<Message>,
    /// Subscription lifecycle.
    pub subscription: SubscriptionState,
    /// In-flight sends by temporary id, with their target conversation.
    pub pending_sends: HashMap<MessageId, ConversationId>,
    /// Roster.
    pub contacts: Vec<Contact>,
    /// Whether a page fetch is in flight.
    pub loading: bool,
    /// Errors shown to the user so far, oldest first.
    pub notifications: Vec<SyncError>,
    /// Renders so far.
    pub renders: u64,
}

impl SessionSnapshot {
    /// Create an empty snapshot (nothing rendered yet).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture the observable state of `session`.
    pub fn capture<E: Environment>(session: &Session<E>) -> Self {
        Self {
            user_id: Some(session.user_id().clone()),
            selected: session.selected_conversation(),
            loaded: session.conversation().conversation_id().cloned(),
            messages: session.conversation().messages().to_vec(),
            subscription: session.subscription().state().clone(),
            pending_sends: session
                .composer()
                .pending()
                .map(|(id, conversation)| (id.clone(), conversation.clone()))
                .collect(),
            contacts: session.contacts().contacts().to_vec(),
            loading: session.is_loading(),
            notifications: Vec::new(),
            renders: 0,
        }
    }

    /// Set the thread (for hand-built snapshots).
    #[must_use]
    pub fn with_messages(mut self, loaded: Option<ConversationId>, messages: Vec<Message>) -> Self {
        self.loaded = loaded;
        self.messages = messages;
        self
    }

    /// Set selection and subscription (for hand-built snapshots).
    #[must_use]
    pub fn with_selection(
        mut self,
        selected: Option<ConversationId>,
        subscription: SubscriptionState,
    ) -> Self {
        self.selected = selected;
        self.subscription = subscription;
        self
    }

    /// Ids of the thread, in display order.
    pub fn message_ids(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.id.as_str()).collect()
    }

    /// Whether the subscription for `topic` is acknowledged.
    pub fn is_subscribed_to(&self, topic: &ConversationId) -> bool {
        self.subscription == SubscriptionState::Active(topic.clone())
    }
}
