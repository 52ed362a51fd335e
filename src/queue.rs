//! Deadline queue with lazy cancellation
//!
//! A BinaryHeap of (deadline, seq, id) keys plus a HashMap of live entries.
//! Cancelling only touches the map; stale heap keys are skipped on peek/pop.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

#[derive(Clone, Copy, Debug)]
struct Slot {
    deadline: f64,
    seq: u64,
    id: u64,
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Slot {}

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// total_cmp keeps float ordering deterministic; seq breaks ties in insertion order.
impl Ord for Slot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .total_cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
            .then(self.id.cmp(&other.id))
    }
}

/// An entry popped from the queue.
#[derive(Debug)]
pub struct Due<M> {
    pub id: u64,
    pub deadline: f64,
    pub meta: M,
}

/// Min-queue of one-shot entries keyed by a unique id.
pub struct DeadlineQueue<M> {
    heap: BinaryHeap<Reverse<Slot>>,
    live: HashMap<u64, (Slot, M)>,
}

impl<M> Default for DeadlineQueue<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> DeadlineQueue<M> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashMap::new(),
        }
    }

    /// Insert an entry. Returns false (and leaves the queue alone) if `id` is live.
    pub fn push(&mut self, id: u64, deadline: f64, seq: u64, meta: M) -> bool {
        if self.live.contains_key(&id) {
            return false;
        }
        let slot = Slot { deadline, seq, id };
        self.live.insert(id, (slot, meta));
        self.heap.push(Reverse(slot));
        true
    }

    /// Cancel an entry. Unknown or already popped ids return None.
    pub fn cancel(&mut self, id: u64) -> Option<M> {
        self.live.remove(&id).map(|(_, m)| m)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.live.contains_key(&id)
    }

    /// Earliest live deadline.
    pub fn peek_deadline(&mut self) -> Option<f64> {
        self.drop_stale();
        self.heap.peek().map(|Reverse(s)| s.deadline)
    }

    /// Pop the earliest entry.
    pub fn pop(&mut self) -> Option<Due<M>> {
        self.drop_stale();
        let Reverse(slot) = self.heap.pop()?;
        let (_, meta) = self.live.remove(&slot.id)?;
        Some(Due {
            id: slot.id,
            deadline: slot.deadline,
            meta,
        })
    }

    /// Pop the earliest entry if its deadline is at or before `t`.
    pub fn pop_due(&mut self, t: f64) -> Option<Due<M>> {
        match self.peek_deadline() {
            Some(d) if d <= t => self.pop(),
            _ => None,
        }
    }

    fn drop_stale(&mut self) {
        while let Some(Reverse(top)) = self.heap.peek() {
            match self.live.get(&top.id) {
                Some((live, _)) if live.seq == top.seq => break,
                _ => {
                    self.heap.pop();
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }
}
