use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use quiz_core::model::UserId;

use super::Session;

/// A user's single session slot. Holding the lock makes a read-modify-write
/// of that user's session atomic with respect to their other events.
pub type SessionSlot = Arc<tokio::sync::Mutex<Option<Session>>>;

/// Holds at most one active session per user.
///
/// Create, replace and clear happen through the locked slot: assigning
/// `Some(session)` replaces whatever was there, `take()` clears it.
pub trait SessionStore: Send + Sync {
    /// The slot for `user_id`, created empty on first use.
    fn slot(&self, user_id: UserId) -> SessionSlot;

    /// Forget `user_id`'s slot if it is empty and `held` is the only handle
    /// outside the store.
    fn release(&self, user_id: UserId, held: &SessionSlot);

    /// Number of users that currently own a slot.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local session store; slots for different users never contend.
#[derive(Default)]
pub struct InMemorySessionStore {
    slots: Mutex<HashMap<UserId, SessionSlot>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn slot(&self, user_id: UserId) -> SessionSlot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(user_id).or_default())
    }

    fn release(&self, user_id: UserId, held: &SessionSlot) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = slots.get(&user_id) else {
            return;
        };
        // Handles are only cloned under the map lock: the map's copy plus
        // `held` means nobody else can be waiting on this slot.
        let unshared = Arc::ptr_eq(entry, held) && Arc::strong_count(held) == 2;
        let vacant = held.try_lock().is_ok_and(|guard| guard.is_none());
        if unshared && vacant {
            slots.remove(&user_id);
        }
    }

    fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A user's slot, checked out for one operation.
///
/// On drop the slot goes back to the store, which forgets it if the
/// operation left it empty.
pub struct SlotLease<'a> {
    store: &'a dyn SessionStore,
    user_id: UserId,
    slot: SessionSlot,
}

impl<'a> SlotLease<'a> {
    #[must_use]
    pub fn new(store: &'a dyn SessionStore, user_id: UserId) -> Self {
        Self {
            store,
            user_id,
            slot: store.slot(user_id),
        }
    }

    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, Option<Session>> {
        self.slot.lock().await
    }
}

impl Drop for SlotLease<'_> {
    fn drop(&mut self) {
        self.store.release(self.user_id, &self.slot);
    }
}
