//! In-memory backend for simulation.
//!
//! `SimBackend` implements all three collaborator contracts (message API,
//! object storage, change feed) over shared in-memory state. Persisting a
//! message fans it out to the conversation's subscriber, including the
//! sender's own subscription, exactly like the real feed.
//!
//! # Fault injection
//!
//! - [`Fault`]: make a class of requests fail until cleared
//! - [`SimBackend::set_duplicate_delivery`]: deliver every push event twice
//! - [`SimBackend::delay_fetch`]: hold one conversation's page response back so
//!   a later selection or push can overtake it

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use bytes::Bytes;
use parley_client::{
    backend::{
        BackendError, ChangeFeed, FeedEvent, FeedSubscription, MessageApi, ObjectRef, ObjectStore,
        PageRequest, SendRequest,
    },
    config::{DEFAULT_ATTACHMENT_BUCKET, DEFAULT_FEED_BUFFER},
};
use parley_core::{Contact, ConversationId, Message, MessageId, UserId};
use tokio::sync::mpsc;

use crate::SimEnv;

/// Class of requests to fail.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fault {
    /// `fetch_contacts`
    FetchContacts,
    /// `search_contacts`
    SearchContacts,
    /// `fetch_messages` for one conversation
    FetchMessages(ConversationId),
    /// `send_message`
    SendMessage,
    /// `upload`
    Upload,
    /// `subscribe`
    Subscribe,
}

/// Request observed by the backend, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    /// Roster fetch.
    FetchContacts,
    /// Directory search.
    SearchContacts(String),
    /// Page fetch.
    FetchMessages(ConversationId),
    /// Attachment upload.
    Upload(String),
    /// Message send.
    SendMessage(ConversationId),
    /// Feed subscription.
    Subscribe(ConversationId),
    /// Feed teardown.
    Unsubscribe(ConversationId),
}

#[derive(Debug, Default)]
struct BackendState {
    contacts: Vec<Contact>,
    messages: HashMap<ConversationId, Vec<Message>>,
    objects: HashMap<String, Bytes>,
    subscribers: HashMap<ConversationId, mpsc::Sender<FeedEvent>>,
    faults: HashSet<Fault>,
    fetch_delays: HashMap<ConversationId, Duration>,
    duplicate_delivery: bool,
    next_id: u64,
    calls: Vec<BackendCall>,
}

/// In-memory message API, object store and change feed.
///
/// Clones share state, so a test can keep a handle while the runtime owns
/// another.
#[derive(Debug, Clone)]
pub struct SimBackend {
    env: SimEnv,
    bucket: String,
    feed_buffer: usize,
    state: Arc<Mutex<BackendState>>,
}

impl SimBackend {
    /// Empty backend stamping messages with `env`'s clock.
    pub fn new(env: SimEnv) -> Self {
        Self {
            env,
            bucket: DEFAULT_ATTACHMENT_BUCKET.to_owned(),
            feed_buffer: DEFAULT_FEED_BUFFER,
            state: Arc::new(Mutex::new(BackendState::default())),
        }
    }

    /// Use `bucket` in public attachment URLs.
    #[must_use]
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Capacity of each subscription's event buffer.
    #[must_use]
    pub fn with_feed_buffer(mut self, feed_buffer: usize) -> Self {
        self.feed_buffer = feed_buffer.max(1);
        self
    }

    /// Replace the roster.
    #[must_use]
    pub fn with_contacts(self, contacts: Vec<Contact>) -> Self {
        self.state().contacts = contacts;
        self
    }

    /// Persist `count` messages from `sender` into `conversation_id`.
    #[must_use]
    pub fn with_history(self, conversation_id: &ConversationId, sender: &UserId, count: usize) -> Self {
        for n in 0..count {
            let _ = self.persist(conversation_id, sender, Some(format!("message {n}")), None, false);
        }
        self
    }

    /// Make requests of `fault`'s class fail.
    pub fn inject(&self, fault: Fault) {
        self.state().faults.insert(fault);
    }

    /// Stop failing requests of `fault`'s class.
    pub fn heal(&self, fault: &Fault) {
        self.state().faults.remove(fault);
    }

    /// Deliver every push event twice.
    pub fn set_duplicate_delivery(&self, enabled: bool) {
        self.state().duplicate_delivery = enabled;
    }

    /// Hold responses to page fetches of `conversation_id` back by `delay`.
    ///
    /// The page itself is read when the request arrives, so it goes stale
    /// while held.
    pub fn delay_fetch(&self, conversation_id: ConversationId, delay: Duration) {
        self.state().fetch_delays.insert(conversation_id, delay);
    }

    /// A peer writes into `conversation_id`; the message is persisted and
    /// pushed to subscribers.
    pub fn peer_message(
        &self,
        conversation_id: &ConversationId,
        sender: &UserId,
        text: &str,
    ) -> Message {
        self.persist(conversation_id, sender, Some(text.to_owned()), None, true)
    }

    /// Push an already persisted `message` again (late or replayed delivery).
    pub fn redeliver(&self, message: &Message) {
        let state = self.state();
        deliver(&state, message);
    }

    /// Persisted messages of `conversation_id`, ascending.
    pub fn messages(&self, conversation_id: &ConversationId) -> Vec<Message> {
        self.state().messages.get(conversation_id).cloned().unwrap_or_default()
    }

    /// Topics with an open subscription.
    pub fn active_topics(&self) -> Vec<ConversationId> {
        let mut topics: Vec<_> = self.state().subscribers.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Every request received so far.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state().calls.clone()
    }

    /// Stored attachment `name`.
    pub fn object(&self, name: &str) -> Option<Bytes> {
        self.state().objects.get(name).cloned()
    }

    fn state(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `call` and check the fault set.
    fn begin(&self, call: BackendCall, fault: &Fault) -> Result<(), BackendError> {
        let mut state = self.state();
        state.calls.push(call);
        if state.faults.contains(fault) {
            return Err(BackendError::Transport(format!("injected fault: {fault:?}")));
        }
        Ok(())
    }

    fn persist(
        &self,
        conversation_id: &ConversationId,
        sender: &UserId,
        text_content: Option<String>,
        attachment_ref: Option<String>,
        push: bool,
    ) -> Message {
        let created_at = self.env.tick();
        let mut state = self.state();
        state.next_id += 1;

        let message = Message {
            id: MessageId::new(format!("srv-{}", state.next_id)),
            conversation_id: conversation_id.clone(),
            sender_id: sender.clone(),
            text_content,
            attachment_ref,
            created_at,
        };
        state.messages.entry(conversation_id.clone()).or_default().push(message.clone());
        if push {
            deliver(&state, &message);
        }
        message
    }
}

/// Push `message` to its conversation's subscriber.
fn deliver(state: &BackendState, message: &Message) {
    let Some(subscriber) = state.subscribers.get(&message.conversation_id) else {
        return;
    };
    let copies = if state.duplicate_delivery { 2 } else { 1 };
    for _ in 0..copies {
        let event = FeedEvent::Insert { message: message.clone() };
        if subscriber.try_send(event).is_err() {
            tracing::warn!(message_id = %message.id, "feed buffer full, event dropped");
        }
    }
}

impl MessageApi for SimBackend {
    async fn fetch_contacts(&self) -> Result<Vec<Contact>, BackendError> {
        self.begin(BackendCall::FetchContacts, &Fault::FetchContacts)?;
        Ok(self.state().contacts.clone())
    }

    async fn search_contacts(&self, query: &str) -> Result<Vec<Contact>, BackendError> {
        self.begin(BackendCall::SearchContacts(query.to_owned()), &Fault::SearchContacts)?;
        let needle = query.to_lowercase();
        Ok(self
            .state()
            .contacts
            .iter()
            .filter(|c| c.display_name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        page: PageRequest,
    ) -> Result<Vec<Message>, BackendError> {
        self.begin(
            BackendCall::FetchMessages(conversation_id.clone()),
            &Fault::FetchMessages(conversation_id.clone()),
        )?;

        let skip = page.page.saturating_sub(1) as usize * page.limit as usize;
        let (messages, delay) = {
            let state = self.state();
            let messages: Vec<Message> = state
                .messages
                .get(conversation_id)
                .map(|all| all.iter().skip(skip).take(page.limit as usize).cloned().collect())
                .unwrap_or_default();
            (messages, state.fetch_delays.get(conversation_id).copied())
        };

        // The page is read now; anything persisted during the delay is missing.
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(messages)
    }

    async fn send_message(&self, request: SendRequest) -> Result<Message, BackendError> {
        self.begin(BackendCall::SendMessage(request.conversation_id.clone()), &Fault::SendMessage)?;

        let content = request.content.filter(|c| !c.trim().is_empty());
        if content.is_none() && request.image_url.is_none() {
            return Err(BackendError::Rejected("message has no content".into()));
        }
        Ok(self.persist(&request.conversation_id, &request.sender_id, content, request.image_url, true))
    }
}

impl ObjectStore for SimBackend {
    async fn upload(&self, bytes: Bytes, name: &str) -> Result<ObjectRef, BackendError> {
        self.begin(BackendCall::Upload(name.to_owned()), &Fault::Upload)?;
        self.state().objects.insert(name.to_owned(), bytes);
        Ok(ObjectRef(name.to_owned()))
    }

    fn public_url(&self, object: &ObjectRef) -> String {
        format!("sim://{}/{}", self.bucket, object.0)
    }
}

impl ChangeFeed for SimBackend {
    async fn subscribe(&self, topic: &ConversationId) -> Result<FeedSubscription, BackendError> {
        self.begin(BackendCall::Subscribe(topic.clone()), &Fault::Subscribe)?;

        let (tx, events) = mpsc::channel(self.feed_buffer);
        if self.state().subscribers.insert(topic.clone(), tx).is_some() {
            tracing::warn!(conversation_id = %topic, "replaced existing subscriber");
        }
        Ok(FeedSubscription { topic: topic.clone(), events })
    }

    async fn unsubscribe(&self, topic: &ConversationId) -> Result<(), BackendError> {
        let mut state = self.state();
        state.calls.push(BackendCall::Unsubscribe(topic.clone()));
        state.subscribers.remove(topic);
        Ok(())
    }
}
