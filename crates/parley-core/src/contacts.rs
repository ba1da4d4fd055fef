//! Contact store.
//!
//! Holds the roster and the identity of the selected conversation. A change of
//! selection is the single trigger for fetching a page and rebuilding the
//! change-feed subscription.

use crate::{Contact, ContactId, ContactPatch};

/// Result of [`ContactStore::select`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Selection {
    /// Selection moved to a different contact.
    Changed {
        /// Previously selected contact. `None` if nothing was selected.
        previous: Option<ContactId>,
    },
    /// The contact was already selected.
    Unchanged,
}

/// Roster plus the single active selection.
#[derive(Debug, Clone, Default)]
pub struct ContactStore {
    contacts: Vec<Contact>,
    selected: Option<ContactId>,
}

impl ContactStore {
    /// Create an empty store with nothing selected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole roster.
    ///
    /// The selection is kept even if the selected contact is no longer
    /// listed, so a transient roster refresh does not disrupt an open thread.
    pub fn set_roster(&mut self, contacts: Vec<Contact>) {
        self.contacts = contacts;
    }

    /// Select a contact's conversation.
    ///
    /// Selecting the current selection again is reported as
    /// [`Selection::Unchanged`] and must not rebuild anything.
    pub fn select(&mut self, contact_id: ContactId) -> Selection {
        if self.selected.as_ref() == Some(&contact_id) {
            return Selection::Unchanged;
        }
        let previous = self.selected.replace(contact_id);
        Selection::Changed { previous }
    }

    /// Drop the selection. Returns the previously selected contact.
    pub fn clear_selection(&mut self) -> Option<ContactId> {
        self.selected.take()
    }

    /// Merge `patch` into the contact with `id`.
    ///
    /// Returns `false` (and changes nothing) if no such contact exists.
    pub fn update_contact(&mut self, id: &ContactId, patch: &ContactPatch) -> bool {
        match self.contacts.iter_mut().find(|c| &c.id == id) {
            Some(contact) => {
                patch.apply(contact);
                true
            },
            None => false,
        }
    }

    /// Contacts whose display name contains `query`, ignoring case.
    ///
    /// An empty query matches everyone. Purely derived; the roster is not
    /// touched.
    pub fn filtered_by<'a>(&'a self, query: &str) -> impl Iterator<Item = &'a Contact> + use<'a> {
        let needle = query.to_lowercase();
        self.contacts.iter().filter(move |c| c.display_name.to_lowercase().contains(&needle))
    }

    /// Currently selected contact id. `None` if nothing is selected.
    pub fn selected(&self) -> Option<&ContactId> {
        self.selected.as_ref()
    }

    /// Roster entry of the selection. `None` if nothing is selected or the
    /// selected contact is not in the roster.
    pub fn selected_contact(&self) -> Option<&Contact> {
        self.selected.as_ref().and_then(|id| self.get(id))
    }

    /// Contact with `id`, if listed.
    pub fn get(&self, id: &ContactId) -> Option<&Contact> {
        self.contacts.iter().find(|c| &c.id == id)
    }

    /// Full roster in backend order.
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Number of contacts in the roster.
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    /// Check if the roster is empty.
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}
