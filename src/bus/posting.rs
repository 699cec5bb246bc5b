//! Per-thread posting state.
//!
//! A thread is *posting* while it has an entry in the [`PostingTable`].
//! The first `post` on an idle thread creates the entry and receives a
//! [`DrainGuard`]; nested posts from handlers on the same thread only
//! append to the entry. Dropping the guard tears the entry down, so a
//! thread always returns to idle even if the drain loop unwinds.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::domain::Payload;

/// An event waiting in a thread's posting queue.
#[derive(Debug, Clone)]
pub(crate) struct PendingEvent {
    pub(crate) event_type: Arc<str>,
    pub(crate) payload: Arc<Payload>,
}

impl PendingEvent {
    pub(crate) fn new(event_type: &str, payload: Payload) -> Self {
        Self {
            event_type: Arc::from(event_type),
            payload: Arc::new(payload),
        }
    }
}

/// Thread-keyed table of posting queues.
#[derive(Debug, Default)]
pub(crate) struct PostingTable {
    queues: Mutex<HashMap<ThreadId, VecDeque<PendingEvent>>>,
}

impl PostingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends `event` to the calling thread's queue.
    ///
    /// Returns a guard if the thread was idle and must now drain; `None`
    /// if a drain loop further up the stack will pick the event up.
    pub(crate) fn enqueue(&self, event: PendingEvent) -> Option<DrainGuard<'_>> {
        let thread = thread::current().id();
        match self.queues.lock().entry(thread) {
            Entry::Occupied(mut queue) => {
                queue.get_mut().push_back(event);
                None
            }
            Entry::Vacant(slot) => {
                slot.insert(VecDeque::from([event]));
                Some(DrainGuard {
                    table: self,
                    thread,
                })
            }
        }
    }

    /// Returns `true` if the calling thread is inside a drain loop.
    #[cfg(test)]
    pub(crate) fn is_posting(&self) -> bool {
        self.queues.lock().contains_key(&thread::current().id())
    }
}

/// Exclusive right to drain one thread's queue.
#[derive(Debug)]
pub(crate) struct DrainGuard<'a> {
    table: &'a PostingTable,
    thread: ThreadId,
}

impl DrainGuard<'_> {
    /// Pops the head of the queue, including events appended while
    /// draining.
    pub(crate) fn next_event(&self) -> Option<PendingEvent> {
        self.table
            .queues
            .lock()
            .get_mut(&self.thread)
            .and_then(VecDeque::pop_front)
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.table.queues.lock().remove(&self.thread);
    }
}
