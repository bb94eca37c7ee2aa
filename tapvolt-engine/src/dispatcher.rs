//! Action bookkeeping
//!
//! A pending action holds its timeout timer; resolved ids move into a
//! bounded FIFO window that suppresses duplicate host results. The two sets
//! are disjoint: an id is pending or completed, never both.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::clock::epoch_millis;
use crate::timer::TimerHandle;

/// Bounded FIFO of recently resolved action ids.
#[derive(Debug)]
pub(crate) struct CompletedWindow {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
}

impl CompletedWindow {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            capacity,
        }
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    /// Records `id`, evicting the oldest entries past capacity.
    pub(crate) fn record(&mut self, id: String) {
        if !self.members.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }
}

/// Mints action ids and tracks in-flight actions.
#[derive(Debug)]
pub(crate) struct ActionTracker {
    nonce: u64,
    pending: HashMap<String, TimerHandle>,
    completed: CompletedWindow,
}

impl ActionTracker {
    pub(crate) fn new(completed_capacity: usize) -> Self {
        Self {
            nonce: 0,
            pending: HashMap::new(),
            completed: CompletedWindow::new(completed_capacity),
        }
    }

    /// `<epochMillis>-<nonce>`; unique for the life of this engine.
    pub(crate) fn mint_id(&mut self) -> String {
        self.nonce += 1;
        format!("{}-{}", epoch_millis(), self.nonce)
    }

    pub(crate) fn insert_pending(&mut self, id: String, timer: TimerHandle) {
        // replacing an entry drops (and thereby cancels) the old timer
        self.pending.insert(id, timer);
    }

    /// Removes and cancels the pending entry; true when one existed.
    pub(crate) fn take_pending(&mut self, id: &str) -> bool {
        match self.pending.remove(id) {
            Some(timer) => {
                timer.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_completed(&self, id: &str) -> bool {
        self.completed.contains(id)
    }

    pub(crate) fn mark_completed(&mut self, id: String) {
        self.completed.record(id);
    }

    /// Cancels every pending timer and forgets the entries.
    pub(crate) fn clear_pending(&mut self) {
        for (_, timer) in self.pending.drain() {
            timer.cancel();
        }
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub(crate) fn completed_len(&self) -> usize {
        self.completed.len()
    }
}
