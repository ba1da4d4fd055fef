//! Generic runtime for session orchestration.
//!
//! The Runtime drives the client event loop, coordinating between:
//! - [`Session`]: Sync state machine
//! - [`Backend`]: Message API, object storage and change feed
//! - [`Driver`]: Frontend input and rendering
//!
//! It is the single logical owner of the session. Fetches, uploads and sends
//! run as spawned tasks whose completions come back through one channel, so
//! every store mutation happens on the loop, one event at a time.
//! Subscribe and unsubscribe are awaited in place, which keeps teardown of the
//! previous topic strictly ahead of the next subscription.

use std::{future::Future, sync::Arc};

use parley_core::{ConversationId, UserId, env::Environment};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    Driver, Session, SessionAction, SessionEvent,
    backend::{Backend, FeedSubscription},
    config::SessionConfig,
};

/// Generic runtime that orchestrates Session, Backend, and Driver.
///
/// # Type Parameters
///
/// - `B`: Backend collaborators
/// - `D`: Frontend driver
/// - `E`: Environment for time and randomness
pub struct Runtime<B, D, E>
where
    B: Backend,
    D: Driver,
    E: Environment,
{
    backend: Arc<B>,
    driver: D,
    session: Session<E>,
    completions_tx: mpsc::UnboundedSender<SessionEvent>,
    completions_rx: mpsc::UnboundedReceiver<SessionEvent>,
    /// Forwarder of the open subscription. `None` if nothing is subscribed.
    feed: Option<(ConversationId, JoinHandle<()>)>,
}

impl<B, D, E> Runtime<B, D, E>
where
    B: Backend,
    D: Driver,
    E: Environment,
{
    /// Create a runtime for `user_id`.
    pub fn new(backend: Arc<B>, driver: D, env: E, user_id: UserId, config: SessionConfig) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            driver,
            session: Session::new(env, user_id, config),
            completions_tx,
            completions_rx,
            feed: None,
        }
    }

    /// Run the main event loop until sign-out or until the frontend closes.
    ///
    /// Backend completions are preferred over new input so that a burst of
    /// intents cannot starve in-flight results.
    ///
    /// Returns the final session state.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to render or notify.
    pub async fn run(mut self) -> Result<Session<E>, D::Error> {
        tracing::info!(user_id = %self.session.user_id(), "runtime started");

        let actions = self.session.start();
        let mut quit = self.process_actions(actions).await?;

        while !quit {
            let event = tokio::select! {
                biased;

                Some(event) = self.completions_rx.recv() => event,
                input = self.driver.next_input() => match input {
                    Some(event) => event,
                    None => {
                        tracing::info!("frontend closed");
                        SessionEvent::SignOut
                    },
                },
            };

            let actions = self.session.handle(event);
            quit = self.process_actions(actions).await?;
        }

        if let Some((topic, forwarder)) = self.feed.take() {
            tracing::debug!(conversation_id = %topic, "aborting feed forwarder");
            forwarder.abort();
        }
        self.driver.stop();
        tracing::info!("runtime stopped");
        Ok(self.session)
    }

    /// Execute actions returned by the Session.
    ///
    /// Returns `true` if the runtime should quit.
    async fn process_actions(
        &mut self,
        initial_actions: Vec<SessionAction>,
    ) -> Result<bool, D::Error> {
        let mut pending_actions = initial_actions;

        while !pending_actions.is_empty() {
            let actions = std::mem::take(&mut pending_actions);

            for action in actions {
                match action {
                    SessionAction::Render => self.driver.render(&self.session)?,
                    SessionAction::Notify(error) => self.driver.notify(&error)?,
                    SessionAction::Quit => return Ok(true),

                    SessionAction::FetchRoster => {
                        let backend = Arc::clone(&self.backend);
                        self.spawn(async move {
                            match backend.fetch_contacts().await {
                                Ok(contacts) => SessionEvent::RosterLoaded { contacts },
                                Err(e) => SessionEvent::RosterFailed { reason: e.to_string() },
                            }
                        });
                    },
                    SessionAction::SearchContacts { query } => {
                        let backend = Arc::clone(&self.backend);
                        self.spawn(async move {
                            match backend.search_contacts(&query).await {
                                Ok(contacts) => SessionEvent::SearchCompleted { query, contacts },
                                Err(e) => SessionEvent::SearchFailed { query, reason: e.to_string() },
                            }
                        });
                    },
                    SessionAction::FetchMessages { conversation_id, page } => {
                        let backend = Arc::clone(&self.backend);
                        self.spawn(async move {
                            match backend.fetch_messages(&conversation_id, page).await {
                                Ok(messages) => {
                                    SessionEvent::MessagesLoaded { conversation_id, messages }
                                },
                                Err(e) => SessionEvent::MessagesFailed {
                                    conversation_id,
                                    reason: e.to_string(),
                                },
                            }
                        });
                    },
                    SessionAction::Upload { temp_id, object_name, bytes } => {
                        let backend = Arc::clone(&self.backend);
                        self.spawn(async move {
                            match backend.upload(bytes, &object_name).await {
                                Ok(object) => {
                                    let url = backend.public_url(&object);
                                    SessionEvent::UploadCompleted { temp_id, url }
                                },
                                Err(e) => SessionEvent::UploadFailed { temp_id, reason: e.to_string() },
                            }
                        });
                    },
                    SessionAction::Send { temp_id, request } => {
                        let backend = Arc::clone(&self.backend);
                        self.spawn(async move {
                            match backend.send_message(request).await {
                                Ok(message) => SessionEvent::SendCompleted { temp_id, message },
                                Err(e) => SessionEvent::SendFailed { temp_id, reason: e.to_string() },
                            }
                        });
                    },

                    // Subscription changes complete before the next action runs
                    SessionAction::Subscribe { topic } => {
                        let event = self.subscribe(topic).await;
                        pending_actions.extend(self.session.handle(event));
                    },
                    SessionAction::Unsubscribe { topic } => self.unsubscribe(&topic).await,
                }
            }
        }
        Ok(false)
    }

    /// Run `task` in the background and feed its result back to the loop.
    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = SessionEvent> + Send + 'static,
    {
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let event = task.await;
            // Receiver only closes once the loop has exited.
            let _ = completions.send(event);
        });
    }

    async fn subscribe(&mut self, topic: ConversationId) -> SessionEvent {
        match self.backend.subscribe(&topic).await {
            Ok(subscription) => {
                self.attach_feed(subscription);
                SessionEvent::SubscriptionAcknowledged { topic }
            },
            Err(e) => SessionEvent::SubscriptionFailed { topic, reason: e.to_string() },
        }
    }

    /// Forward events of `subscription` into the completion channel.
    fn attach_feed(&mut self, subscription: FeedSubscription) {
        let FeedSubscription { topic, mut events } = subscription;

        if let Some((previous, forwarder)) = self.feed.take() {
            tracing::warn!(conversation_id = %previous, "replacing feed that was not torn down");
            forwarder.abort();
        }

        let completions = self.completions_tx.clone();
        let forwarded_topic = topic.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let event = SessionEvent::Feed { topic: forwarded_topic.clone(), event };
                if completions.send(event).is_err() {
                    break;
                }
            }
        });
        self.feed = Some((topic, forwarder));
    }

    async fn unsubscribe(&mut self, topic: &ConversationId) {
        if let Some((_, forwarder)) = self.feed.take_if(|(active, _)| *active == *topic) {
            forwarder.abort();
        }
        if let Err(error) = self.backend.unsubscribe(topic).await {
            tracing::warn!(conversation_id = %topic, %error, "unsubscribe failed");
        }
    }
}
