//! Sync orchestrator.
//!
//! [`Session`] is a pure state machine over the contact store, the
//! conversation store, the subscription manager and the composer. It reacts to
//! selection changes by fetching a page and rebuilding the subscription, and
//! routes every asynchronous completion into the stores.
//!
//! Completions are checked against the selection at the time they resolve: a
//! page or acknowledgement for a conversation that is no longer selected is a
//! stale event and changes nothing.

use parley_core::{
    AppendOutcome, Contact, ContactId, ContactPatch, ContactStore, ConversationId,
    ConversationStore, FetchResource, Message, MessageId, Selection, SyncError, UserId,
    env::Environment,
};

use crate::{
    Attachment, Composer, SessionAction, SessionEvent, SubscriptionManager,
    backend::{FeedEvent, PageRequest},
    config::SessionConfig,
    subscription::Inbound,
};

/// Results of the latest remote contact search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResults {
    /// Query the results belong to.
    pub query: String,
    /// Matching contacts in backend order.
    pub contacts: Vec<Contact>,
}

/// Sync orchestrator state machine.
///
/// Pure state machine that processes events and produces actions.
/// No I/O dependencies, so it runs unchanged in simulation.
#[derive(Debug, Clone)]
pub struct Session<E: Environment> {
    env: E,
    user_id: UserId,
    config: SessionConfig,
    contacts: ContactStore,
    conversation: ConversationStore,
    subscription: SubscriptionManager,
    composer: Composer,
    /// Conversation whose page fetch is in flight.
    loading: Option<ConversationId>,
    /// Query whose remote search is in flight.
    pending_search: Option<String>,
    search: Option<SearchResults>,
    last_error: Option<SyncError>,
}

impl<E: Environment> Session<E> {
    /// Session for the signed-in `user_id`.
    pub fn new(env: E, user_id: UserId, config: SessionConfig) -> Self {
        Self {
            subscription: SubscriptionManager::new(user_id.clone(), config.self_echo),
            composer: Composer::new(user_id.clone()),
            env,
            user_id,
            config,
            contacts: ContactStore::new(),
            conversation: ConversationStore::new(),
            loading: None,
            pending_search: None,
            search: None,
            last_error: None,
        }
    }

    /// Actions to run once at startup.
    pub fn start(&self) -> Vec<SessionAction> {
        vec![SessionAction::FetchRoster, SessionAction::Render]
    }

    /// Process an event and return actions.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<SessionAction> {
        match event {
            SessionEvent::Select { contact_id } => self.select(contact_id),
            SessionEvent::ClearSelection => self.clear_selection(),
            SessionEvent::Search { query } => self.search(query),
            SessionEvent::Compose { text, attachment } => match self.send(text, attachment) {
                Ok(actions) => actions,
                Err(error) => self.surface(error),
            },
            SessionEvent::Reload => self.reload(),
            SessionEvent::SignOut => {
                tracing::info!(user_id = %self.user_id, "signing out");
                let mut actions = self.subscription.close();
                actions.push(SessionAction::Quit);
                actions
            },
            SessionEvent::RosterLoaded { contacts } => {
                tracing::debug!(count = contacts.len(), "roster loaded");
                self.contacts.set_roster(contacts);
                vec![SessionAction::Render]
            },
            SessionEvent::RosterFailed { reason } => {
                self.surface(SyncError::FetchFailed { resource: FetchResource::Roster, reason })
            },
            SessionEvent::SearchCompleted { query, contacts } => {
                if !self.take_search(&query) {
                    return vec![];
                }
                self.search = Some(SearchResults { query, contacts });
                vec![SessionAction::Render]
            },
            SessionEvent::SearchFailed { query, reason } => {
                if !self.take_search(&query) {
                    return vec![];
                }
                self.surface(SyncError::FetchFailed {
                    resource: FetchResource::Search { query },
                    reason,
                })
            },
            SessionEvent::MessagesLoaded { conversation_id, messages } => {
                self.messages_loaded(conversation_id, messages)
            },
            SessionEvent::MessagesFailed { conversation_id, reason } => {
                if !self.is_current(&conversation_id) {
                    return vec![];
                }
                self.loading = None;
                self.surface(SyncError::FetchFailed {
                    resource: FetchResource::Messages { conversation_id },
                    reason,
                })
            },
            SessionEvent::SubscriptionAcknowledged { topic } => {
                if self.subscription.acknowledge(&topic) {
                    return vec![SessionAction::Render];
                }
                drop_stale(&topic, "acknowledgement");
                vec![SessionAction::Unsubscribe { topic }]
            },
            SessionEvent::SubscriptionFailed { topic, reason } => {
                if !self.subscription.fail(&topic) {
                    drop_stale(&topic, "subscription failure");
                    return vec![];
                }
                self.surface(SyncError::SubscriptionFailed { topic, reason })
            },
            SessionEvent::Feed { topic, event } => self.inbound(&topic, event),
            SessionEvent::UploadCompleted { temp_id, url } => {
                match self.composer.upload_completed(&temp_id, url) {
                    Some(send) => vec![send],
                    None => {
                        tracing::debug!(temp_id = %temp_id, "upload for unknown send");
                        vec![]
                    },
                }
            },
            SessionEvent::UploadFailed { temp_id, reason } => {
                if !self.composer.abort(&mut self.conversation, &temp_id) {
                    return vec![];
                }
                self.surface(SyncError::UploadFailed { temp_id, reason })
            },
            SessionEvent::SendCompleted { temp_id, message } => {
                self.send_completed(&temp_id, message)
            },
            SessionEvent::SendFailed { temp_id, reason } => {
                if !self.composer.abort(&mut self.conversation, &temp_id) {
                    return vec![];
                }
                self.surface(SyncError::SendFailed { temp_id, reason })
            },
        }
    }

    /// Start sending to the selected conversation.
    ///
    /// The placeholder is in the store when this returns; the actions carry
    /// the upload or send request.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidInput`] for an empty message or when nothing is
    /// selected. The stores are untouched.
    pub fn send(
        &mut self,
        text: Option<String>,
        attachment: Option<Attachment>,
    ) -> Result<Vec<SessionAction>, SyncError> {
        let conversation_id = self.selected_conversation();
        let (_, action) = self.composer.compose(
            &self.env,
            &mut self.conversation,
            conversation_id.as_ref(),
            text,
            attachment,
        )?;
        Ok(vec![SessionAction::Render, action])
    }

    fn select(&mut self, contact_id: ContactId) -> Vec<SessionAction> {
        let Selection::Changed { previous } = self.contacts.select(contact_id.clone()) else {
            return vec![];
        };
        tracing::info!(
            contact_id = %contact_id,
            previous = ?previous.as_ref().map(ContactId::as_str),
            "selection changed"
        );

        let mut actions = self.subscription.close();
        actions.extend(self.fetch_page(ConversationId::from(&contact_id)));
        actions
    }

    fn clear_selection(&mut self) -> Vec<SessionAction> {
        if self.contacts.clear_selection().is_none() {
            return vec![];
        }
        let mut actions = self.subscription.close();
        self.conversation.clear();
        self.loading = None;
        actions.push(SessionAction::Render);
        actions
    }

    fn reload(&mut self) -> Vec<SessionAction> {
        match self.selected_conversation() {
            Some(conversation_id) => self.fetch_page(conversation_id),
            None => vec![],
        }
    }

    fn fetch_page(&mut self, conversation_id: ConversationId) -> Vec<SessionAction> {
        self.loading = Some(conversation_id.clone());
        vec![
            SessionAction::FetchMessages {
                conversation_id,
                page: PageRequest::first(self.config.page_size),
            },
            SessionAction::Render,
        ]
    }

    fn search(&mut self, query: String) -> Vec<SessionAction> {
        if query.trim().is_empty() {
            self.pending_search = None;
            self.search = None;
            return vec![SessionAction::Render];
        }
        self.pending_search = Some(query.clone());
        vec![SessionAction::SearchContacts { query }]
    }

    /// Clear the in-flight search if it is `query`. Results for a superseded
    /// query return `false`.
    fn take_search(&mut self, query: &str) -> bool {
        if self.pending_search.as_deref() != Some(query) {
            tracing::debug!(query, "dropping superseded search result");
            return false;
        }
        self.pending_search = None;
        true
    }

    fn messages_loaded(
        &mut self,
        conversation_id: ConversationId,
        messages: Vec<Message>,
    ) -> Vec<SessionAction> {
        if !self.is_current(&conversation_id) {
            return vec![];
        }
        self.loading = None;
        let count = messages.len();
        if self.conversation.conversation_id() == Some(&conversation_id) {
            // Keep what the feed and confirmed sends delivered meanwhile.
            let added = self.conversation.merge(messages);
            tracing::debug!(conversation_id = %conversation_id, count, added, "page merged");
        } else {
            self.conversation.reset(conversation_id.clone(), messages);
            tracing::debug!(conversation_id = %conversation_id, count, "page loaded");
        }
        let restored = self.composer.restore(&mut self.conversation);
        if restored > 0 {
            tracing::debug!(conversation_id = %conversation_id, restored, "pending sends restored");
        }

        let mut actions = self.subscription.open(conversation_id);
        actions.push(SessionAction::Render);
        actions
    }

    fn inbound(&mut self, topic: &ConversationId, event: FeedEvent) -> Vec<SessionAction> {
        let message = event.into_message();
        match self.subscription.route(topic, &message) {
            Inbound::Deliver => {},
            Inbound::StaleTopic | Inbound::ForeignConversation => {
                drop_stale(&message.conversation_id, "push event");
                return vec![];
            },
            Inbound::SelfEcho => {
                tracing::debug!(message_id = %message.id, "dropping self-authored push event");
                return vec![];
            },
        }

        let patch = ContactPatch::last_message(&message);
        let message_id = message.id.clone();
        match self.conversation.append(message) {
            AppendOutcome::Inserted { .. } => {
                self.contacts.update_contact(&topic.contact_id(), &patch);
                vec![SessionAction::Render]
            },
            AppendOutcome::Duplicate => {
                tracing::debug!(message_id = %message_id, "duplicate push event");
                vec![]
            },
            AppendOutcome::WrongConversation => {
                drop_stale(topic, "push event");
                vec![]
            },
        }
    }

    fn send_completed(&mut self, temp_id: &MessageId, message: Message) -> Vec<SessionAction> {
        let contact_id = message.conversation_id.contact_id();
        let patch = ContactPatch::last_message(&message);
        match self.composer.send_completed(&mut self.conversation, temp_id, message) {
            Some(outcome) => {
                tracing::debug!(temp_id = %temp_id, removed = outcome.removed, "send confirmed");
                self.contacts.update_contact(&contact_id, &patch);
                vec![SessionAction::Render]
            },
            None => {
                tracing::debug!(temp_id = %temp_id, "confirmation for unknown send");
                vec![]
            },
        }
    }

    /// Whether `conversation_id` is still the selected conversation. Logs the
    /// stale completion otherwise.
    fn is_current(&self, conversation_id: &ConversationId) -> bool {
        if self.selected_conversation().as_ref() == Some(conversation_id) {
            return true;
        }
        drop_stale(conversation_id, "page");
        false
    }

    fn surface(&mut self, error: SyncError) -> Vec<SessionAction> {
        tracing::warn!(error = %error, "sync error");
        self.last_error = Some(error.clone());
        vec![SessionAction::Notify(error), SessionAction::Render]
    }

    /// Conversation of the selected contact.
    pub fn selected_conversation(&self) -> Option<ConversationId> {
        self.contacts.selected().map(ConversationId::from)
    }

    /// Local user.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Roster and selection.
    pub fn contacts(&self) -> &ContactStore {
        &self.contacts
    }

    /// Thread of the loaded conversation.
    pub fn conversation(&self) -> &ConversationStore {
        &self.conversation
    }

    /// Change-feed subscription lifecycle.
    pub fn subscription(&self) -> &SubscriptionManager {
        &self.subscription
    }

    /// In-flight sends.
    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// Results of the latest completed remote search.
    pub fn search_results(&self) -> Option<&SearchResults> {
        self.search.as_ref()
    }

    /// Whether a page fetch for the selection is in flight.
    pub fn is_loading(&self) -> bool {
        self.loading.is_some()
    }

    /// Most recently surfaced error.
    pub fn last_error(&self) -> Option<&SyncError> {
        self.last_error.as_ref()
    }
}

fn drop_stale(conversation_id: &ConversationId, what: &'static str) {
    let stale = SyncError::StaleEvent { conversation_id: conversation_id.clone() };
    tracing::debug!(error = %stale, what, "dropping stale event");
}
