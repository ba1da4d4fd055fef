//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use std::collections::HashSet;

use super::{Invariant, InvariantResult, SessionSnapshot, Violation};

/// Thread must be strictly ascending by `(created_at, id)`.
pub struct MessagesOrdered;

impl Invariant for MessagesOrdered {
    fn name(&self) -> &'static str {
        "MessagesOrdered"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        for (i, window) in state.messages.windows(2).enumerate() {
            if window[0].order_key() >= window[1].order_key() {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "position {}: {} at {} not before {} at {}",
                        i, window[0].id, window[0].created_at, window[1].id, window[1].created_at
                    ),
                });
            }
        }
        Ok(())
    }
}

/// No message id may appear twice in the thread.
///
/// A duplicate means two producers (page, send, push) both landed the same
/// logical message.
pub struct UniqueMessageIds;

impl Invariant for UniqueMessageIds {
    fn name(&self) -> &'static str {
        "UniqueMessageIds"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        let mut seen = HashSet::with_capacity(state.messages.len());
        for message in &state.messages {
            if !seen.insert(&message.id) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("message {} appears twice", message.id),
                });
            }
        }
        Ok(())
    }
}

/// Every message in the thread belongs to the loaded conversation.
pub struct ConversationIsolation;

impl Invariant for ConversationIsolation {
    fn name(&self) -> &'static str {
        "ConversationIsolation"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        let Some(loaded) = &state.loaded else {
            if state.messages.is_empty() {
                return Ok(());
            }
            return Err(Violation {
                invariant: self.name(),
                message: format!("{} messages with no conversation loaded", state.messages.len()),
            });
        };

        match state.messages.iter().find(|m| &m.conversation_id != loaded) {
            Some(foreign) => Err(Violation {
                invariant: self.name(),
                message: format!(
                    "message {} of {} in thread of {}",
                    foreign.id, foreign.conversation_id, loaded
                ),
            }),
            None => Ok(()),
        }
    }
}

/// A requested or active subscription is always for the selection.
///
/// A topic outliving its selection would leak events of the previous
/// conversation into the new one.
pub struct SubscriptionFollowsSelection;

impl Invariant for SubscriptionFollowsSelection {
    fn name(&self) -> &'static str {
        "SubscriptionFollowsSelection"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        let Some(topic) = state.subscription.topic() else {
            return Ok(());
        };
        if state.selected.as_ref() == Some(topic) {
            return Ok(());
        }
        Err(Violation {
            invariant: self.name(),
            message: format!("subscribed to {topic} while {:?} is selected", state.selected),
        })
    }
}

/// Placeholders and in-flight sends match up.
///
/// Every placeholder in the thread belongs to an in-flight send, and every
/// in-flight send to the loaded conversation shows its placeholder. An
/// orphaned placeholder is a bubble that is never confirmed or removed; a
/// missing one is a send the user gets no feedback for.
pub struct PlaceholdersTracked;

impl Invariant for PlaceholdersTracked {
    fn name(&self) -> &'static str {
        "PlaceholdersTracked"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        if let Some(orphan) = state
            .messages
            .iter()
            .find(|m| m.is_placeholder() && !state.pending_sends.contains_key(&m.id))
        {
            return Err(Violation {
                invariant: self.name(),
                message: format!("placeholder {} has no pending send", orphan.id),
            });
        }

        let shown: HashSet<_> = state.messages.iter().map(|m| &m.id).collect();
        match state.pending_sends.iter().find(|(id, conversation)| {
            state.loaded.as_ref() == Some(*conversation) && !shown.contains(id)
        }) {
            Some((missing, conversation)) => Err(Violation {
                invariant: self.name(),
                message: format!("pending send {missing} not shown in {conversation}"),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use parley_client::SubscriptionState;
    use parley_core::{Message, MessageId};

    use super::*;

    fn message(id: &str, conversation: &str, secs: i64) -> Message {
        Message {
            id: MessageId::new(id),
            conversation_id: conversation.into(),
            sender_id: "peer".into(),
            text_content: Some("x".into()),
            attachment_ref: None,
            created_at: DateTime::<Utc>::from_timestamp(secs, 0).unwrap(),
        }
    }

    #[test]
    fn out_of_order_thread_violates() {
        let state = SessionSnapshot::empty()
            .with_messages(Some("a".into()), vec![message("2", "a", 20), message("1", "a", 10)]);

        assert!(MessagesOrdered.check(&state).is_err());
    }

    #[test]
    fn duplicate_id_violates() {
        let state = SessionSnapshot::empty()
            .with_messages(Some("a".into()), vec![message("1", "a", 10), message("1", "a", 10)]);

        assert!(UniqueMessageIds.check(&state).is_err());
        assert!(MessagesOrdered.check(&state).is_err());
    }

    #[test]
    fn foreign_message_violates() {
        let state = SessionSnapshot::empty()
            .with_messages(Some("a".into()), vec![message("1", "a", 10), message("2", "b", 20)]);

        let violation = ConversationIsolation.check(&state).unwrap_err();
        assert_eq!(violation.invariant, "ConversationIsolation");
    }

    #[test]
    fn stale_subscription_violates() {
        let state = SessionSnapshot::empty()
            .with_selection(Some("b".into()), SubscriptionState::Active("a".into()));
        assert!(SubscriptionFollowsSelection.check(&state).is_err());

        let idle = SessionSnapshot::empty().with_selection(Some("b".into()), SubscriptionState::Idle);
        assert!(SubscriptionFollowsSelection.check(&idle).is_ok());
    }

    #[test]
    fn orphaned_placeholder_violates() {
        let temp = MessageId::local(1);
        let mut state = SessionSnapshot::empty()
            .with_messages(Some("a".into()), vec![message(temp.as_str(), "a", 10)]);
        assert!(PlaceholdersTracked.check(&state).is_err());

        state.pending_sends.insert(temp, "a".into());
        assert!(PlaceholdersTracked.check(&state).is_ok());
    }

    #[test]
    fn hidden_pending_send_violates() {
        let temp = MessageId::local(1);
        let mut state = SessionSnapshot::empty().with_messages(Some("a".into()), vec![]);
        state.pending_sends.insert(temp.clone(), "a".into());

        let violation = PlaceholdersTracked.check(&state).unwrap_err();
        assert!(violation.message.contains(temp.as_str()));

        // Sends to a conversation that is not loaded have nowhere to show.
        state.pending_sends.insert(temp, "b".into());
        assert!(PlaceholdersTracked.check(&state).is_ok());
    }
}
