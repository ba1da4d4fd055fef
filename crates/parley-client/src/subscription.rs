//! Change-feed subscription manager.
//!
//! Maintains exactly one live subscription, scoped to the selected
//! conversation, and decides which inbound push events may reach the store.
//!
//! # State machine
//!
//! ```text
//! Idle ──open(c)──▶ Subscribing(c) ──ack(c)──▶ Active(c)
//!  ▲                    │                          │
//!  └──── close / fail ──┘◀──────── close ──────────┘
//! ```
//!
//! `open(c)` from any non-idle state first closes the current topic, so the
//! emitted actions always tear down before they subscribe.

use parley_core::{ConversationId, Message, UserId};

use crate::{SessionAction, config::SelfEcho};

/// Lifecycle of the single change-feed subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SubscriptionState {
    /// No subscription requested.
    #[default]
    Idle,
    /// Subscription requested, acknowledgement pending.
    Subscribing(ConversationId),
    /// Subscription acknowledged; events are delivered.
    Active(ConversationId),
}

impl SubscriptionState {
    /// Topic requested or active. `None` when idle.
    pub fn topic(&self) -> Option<&ConversationId> {
        match self {
            Self::Idle => None,
            Self::Subscribing(topic) | Self::Active(topic) => Some(topic),
        }
    }
}

/// Verdict on an inbound push event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// Append to the store.
    Deliver,
    /// Topic is not the active subscription.
    StaleTopic,
    /// Message names a different conversation than its topic.
    ForeignConversation,
    /// Authored by the local user and self-echo is dropped.
    SelfEcho,
}

/// Owns the subscription lifecycle and the inbound event filter.
#[derive(Debug, Clone)]
pub struct SubscriptionManager {
    user_id: UserId,
    self_echo: SelfEcho,
    state: SubscriptionState,
}

impl SubscriptionManager {
    /// Idle manager filtering on behalf of `user_id`.
    pub fn new(user_id: UserId, self_echo: SelfEcho) -> Self {
        Self { user_id, self_echo, state: SubscriptionState::Idle }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &SubscriptionState {
        &self.state
    }

    /// Topic of the acknowledged subscription.
    pub fn active_topic(&self) -> Option<&ConversationId> {
        match &self.state {
            SubscriptionState::Active(topic) => Some(topic),
            _ => None,
        }
    }

    /// Switch the subscription to `topic`.
    ///
    /// Opening the topic that is already requested or active emits nothing.
    pub fn open(&mut self, topic: ConversationId) -> Vec<SessionAction> {
        if self.state.topic() == Some(&topic) {
            return vec![];
        }

        let mut actions = self.close();
        tracing::info!(conversation_id = %topic, "subscribing");
        self.state = SubscriptionState::Subscribing(topic.clone());
        actions.push(SessionAction::Subscribe { topic });
        actions
    }

    /// Tear down the current subscription, if any.
    pub fn close(&mut self) -> Vec<SessionAction> {
        match std::mem::take(&mut self.state) {
            SubscriptionState::Idle => vec![],
            SubscriptionState::Subscribing(topic) | SubscriptionState::Active(topic) => {
                tracing::info!(conversation_id = %topic, "unsubscribing");
                vec![SessionAction::Unsubscribe { topic }]
            },
        }
    }

    /// Record the backend's acknowledgement of `topic`.
    ///
    /// Returns `false` for an acknowledgement that no longer matches the
    /// requested topic; the caller must release that subscription.
    pub fn acknowledge(&mut self, topic: &ConversationId) -> bool {
        match &self.state {
            SubscriptionState::Subscribing(pending) if pending == topic => {
                tracing::info!(conversation_id = %topic, "subscription active");
                self.state = SubscriptionState::Active(topic.clone());
                true
            },
            SubscriptionState::Active(active) => active == topic,
            _ => false,
        }
    }

    /// Record that subscribing to `topic` failed.
    ///
    /// Returns `false` if the failure belongs to an abandoned topic.
    pub fn fail(&mut self, topic: &ConversationId) -> bool {
        if self.state == SubscriptionState::Subscribing(topic.clone()) {
            self.state = SubscriptionState::Idle;
            return true;
        }
        false
    }

    /// Decide whether `message`, delivered on `topic`, reaches the store.
    pub fn route(&self, topic: &ConversationId, message: &Message) -> Inbound {
        if self.active_topic() != Some(topic) {
            return Inbound::StaleTopic;
        }
        if &message.conversation_id != topic {
            return Inbound::ForeignConversation;
        }
        if message.sender_id == self.user_id && self.self_echo == SelfEcho::Drop {
            return Inbound::SelfEcho;
        }
        Inbound::Deliver
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn manager() -> SubscriptionManager {
        SubscriptionManager::new("me".into(), SelfEcho::Drop)
    }

    fn message(conversation: &str, sender: &str) -> Message {
        Message {
            id: "m1".into(),
            conversation_id: conversation.into(),
            sender_id: sender.into(),
            text_content: Some("hello".into()),
            attachment_ref: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn switch_unsubscribes_before_subscribing() {
        let mut subs = manager();
        let _ = subs.open("a".into());
        assert!(subs.acknowledge(&"a".into()));

        let actions = subs.open("b".into());

        assert_eq!(
            actions,
            vec![
                SessionAction::Unsubscribe { topic: "a".into() },
                SessionAction::Subscribe { topic: "b".into() },
            ]
        );
        assert_eq!(subs.state(), &SubscriptionState::Subscribing("b".into()));
    }

    #[test]
    fn reopening_same_topic_is_noop() {
        let mut subs = manager();
        let _ = subs.open("a".into());

        assert!(subs.open("a".into()).is_empty());
        assert!(subs.acknowledge(&"a".into()));
        assert!(subs.open("a".into()).is_empty());
    }

    #[test]
    fn stale_acknowledgement_is_rejected() {
        let mut subs = manager();
        let _ = subs.open("a".into());
        let _ = subs.open("b".into());

        assert!(!subs.acknowledge(&"a".into()));
        assert_eq!(subs.state(), &SubscriptionState::Subscribing("b".into()));
    }

    #[test]
    fn failure_returns_to_idle() {
        let mut subs = manager();
        let _ = subs.open("a".into());

        assert!(!subs.fail(&"z".into()));
        assert!(subs.fail(&"a".into()));
        assert_eq!(subs.state(), &SubscriptionState::Idle);
        assert!(subs.close().is_empty());
    }

    #[test]
    fn events_only_flow_on_active_topic() {
        let mut subs = manager();
        let _ = subs.open("a".into());

        // Not yet acknowledged.
        assert_eq!(subs.route(&"a".into(), &message("a", "peer")), Inbound::StaleTopic);

        assert!(subs.acknowledge(&"a".into()));
        assert_eq!(subs.route(&"a".into(), &message("a", "peer")), Inbound::Deliver);
        assert_eq!(subs.route(&"b".into(), &message("b", "peer")), Inbound::StaleTopic);
        assert_eq!(subs.route(&"a".into(), &message("b", "peer")), Inbound::ForeignConversation);
    }

    #[test]
    fn self_echo_policy() {
        let mut dropping = manager();
        let _ = dropping.open("a".into());
        let _ = dropping.acknowledge(&"a".into());
        assert_eq!(dropping.route(&"a".into(), &message("a", "me")), Inbound::SelfEcho);

        let mut merging = SubscriptionManager::new("me".into(), SelfEcho::Merge);
        let _ = merging.open("a".into());
        let _ = merging.acknowledge(&"a".into());
        assert_eq!(merging.route(&"a".into(), &message("a", "me")), Inbound::Deliver);
    }
}
