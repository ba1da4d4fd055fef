//! Conversation store.
//!
//! Holds the ordered message list of the active conversation. The initial page
//! fetch, optimistic sends and the push feed all write here, so ordering and
//! deduplication are enforced in exactly one place.
//!
//! # Invariants
//!
//! - Every stored message carries the store's conversation id.
//! - Messages are sorted ascending by `(created_at, id)`.
//! - No two messages share an id.
//! - The conversation id only changes through [`ConversationStore::reset`] or
//!   [`ConversationStore::clear`], never by filtering in place.

use std::collections::HashSet;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};

use crate::{ConversationId, Message, MessageId};

/// Result of [`ConversationStore::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum AppendOutcome {
    /// Message was inserted at `index`.
    Inserted {
        /// Position in the ordered sequence.
        index: usize,
    },
    /// A message with the same id is already stored. Nothing changed.
    Duplicate,
    /// Message belongs to another conversation. Nothing changed.
    WrongConversation,
}

impl AppendOutcome {
    /// Whether the store changed.
    pub fn is_inserted(self) -> bool {
        matches!(self, Self::Inserted { .. })
    }
}

/// Result of [`ConversationStore::replace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct ReplaceOutcome {
    /// Whether the placeholder was still present and got removed.
    pub removed: bool,
    /// Outcome of appending the confirmed copy, if one was given.
    pub appended: Option<AppendOutcome>,
}

/// Ordered, deduplicated messages of one conversation.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    /// Active conversation. `None` when nothing is selected.
    conversation_id: Option<ConversationId>,
    /// Messages sorted by `(created_at, id)`.
    messages: Vec<Message>,
    /// Ids of `messages`, for O(1) duplicate checks.
    ids: HashSet<MessageId>,
}

impl ConversationStore {
    /// Create an empty store with no conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole state with `conversation_id` and its first page.
    ///
    /// The page is expected ascending by creation time but is re-sorted by
    /// `(created_at, id)` regardless. Messages of other conversations and
    /// repeated ids are dropped.
    pub fn reset(&mut self, conversation_id: ConversationId, initial: Vec<Message>) {
        let mut messages: Vec<Message> = initial
            .into_iter()
            .filter(|m| {
                let belongs = m.conversation_id == conversation_id;
                if !belongs {
                    tracing::warn!(
                        conversation_id = %conversation_id,
                        message_id = %m.id,
                        "dropping foreign message from page"
                    );
                }
                belongs
            })
            .collect();
        messages.sort_by(|a, b| a.order_key().cmp(&b.order_key()));

        let mut ids = HashSet::with_capacity(messages.len());
        messages.retain(|m| ids.insert(m.id.clone()));

        self.conversation_id = Some(conversation_id);
        self.messages = messages;
        self.ids = ids;
    }

    /// Discard all state; no conversation is active afterwards.
    pub fn clear(&mut self) {
        self.conversation_id = None;
        self.messages.clear();
        self.ids.clear();
    }

    /// Insert `message` at its ordered position.
    ///
    /// Idempotent on id: appending an already-stored id is a no-op. Messages of
    /// another conversation (stale events after a switch) are rejected.
    pub fn append(&mut self, message: Message) -> AppendOutcome {
        if self.conversation_id.as_ref() != Some(&message.conversation_id) {
            return AppendOutcome::WrongConversation;
        }
        if self.ids.contains(&message.id) {
            return AppendOutcome::Duplicate;
        }

        let index = self.messages.partition_point(|m| m.order_key() < message.order_key());
        self.ids.insert(message.id.clone());
        self.messages.insert(index, message);
        AppendOutcome::Inserted { index }
    }

    /// Fold a re-fetched page of the active conversation into the thread.
    ///
    /// Unlike [`reset`](Self::reset) nothing already stored is dropped, so
    /// pushed copies and placeholders that landed while the page was in
    /// flight survive. Returns how many messages were new.
    pub fn merge(&mut self, page: Vec<Message>) -> usize {
        page.into_iter().map(|m| self.append(m)).filter(|o| o.is_inserted()).count()
    }

    /// Swap the placeholder `temporary_id` for its confirmed copy.
    ///
    /// An absent placeholder is tolerated. With `confirmed == None` this only
    /// removes the placeholder, which is how failed sends are rolled back.
    pub fn replace(
        &mut self,
        temporary_id: &MessageId,
        confirmed: Option<Message>,
    ) -> ReplaceOutcome {
        let removed = self.remove(temporary_id);
        let appended = confirmed.map(|m| self.append(m));
        ReplaceOutcome { removed, appended }
    }

    fn remove(&mut self, id: &MessageId) -> bool {
        if !self.ids.remove(id) {
            return false;
        }
        if let Some(pos) = self.messages.iter().position(|m| &m.id == id) {
            self.messages.remove(pos);
        }
        true
    }

    /// Active conversation. `None` if nothing is loaded.
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.conversation_id.as_ref()
    }

    /// Messages in ascending `(created_at, id)` order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Whether a message with `id` is stored.
    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    /// Message with `id`, if stored.
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        if !self.contains(id) {
            return None;
        }
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if no messages are stored.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages partitioned by calendar day in the viewer's local zone.
    pub fn grouped_by_day(&self) -> DayGroups<'_, Local> {
        self.grouped_by_day_in(Local)
    }

    /// Messages partitioned by calendar day in `tz`.
    ///
    /// Groups come out in chronological order and each group is itself
    /// ascending. The iterator is lazy, finite and cheap to clone; calling
    /// this again restarts from the first day.
    pub fn grouped_by_day_in<Tz: TimeZone>(&self, tz: Tz) -> DayGroups<'_, Tz> {
        DayGroups { remaining: &self.messages, tz }
    }
}

/// Messages of one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayGroup<'a> {
    /// Calendar date in the grouping zone.
    pub date: NaiveDate,
    /// Messages of that day, ascending.
    pub messages: &'a [Message],
}

impl DayGroup<'_> {
    /// Heading for the group: `"Today"` or the ISO date.
    pub fn label(&self, today: NaiveDate) -> String {
        if self.date == today { "Today".to_owned() } else { self.date.to_string() }
    }
}

/// Lazy iterator over [`DayGroup`]s.
///
/// Yields maximal runs of consecutive messages sharing a local date, borrowing
/// slices of the store without copying.
#[derive(Clone)]
pub struct DayGroups<'a, Tz: TimeZone> {
    remaining: &'a [Message],
    tz: Tz,
}

impl<Tz: TimeZone> DayGroups<'_, Tz> {
    fn local_date(&self, at: &DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.tz).date_naive()
    }
}

impl<'a, Tz: TimeZone> Iterator for DayGroups<'a, Tz> {
    type Item = DayGroup<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.remaining.first()?;
        let date = self.local_date(&first.created_at);
        let len = self
            .remaining
            .iter()
            .take_while(|m| self.local_date(&m.created_at) == date)
            .count();

        let (messages, rest) = self.remaining.split_at(len);
        self.remaining = rest;
        Some(DayGroup { date, messages })
    }
}
