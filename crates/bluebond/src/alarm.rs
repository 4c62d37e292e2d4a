//! One-shot deadline timers driven by the owning context
//!
//! Nothing here runs on its own thread. The owner schedules an alarm, keeps the
//! returned token next to the state the alarm guards, and calls
//! [`AlarmQueue::poll_expired`] from its `process_timeouts`. A token whose alarm
//! has been cancelled, replaced or already fired is simply no longer armed, so a
//! late expiry can be compared against the owner's current token and dropped.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

/// Handle to a scheduled alarm; generations are never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlarmToken(u64);

impl AlarmToken {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
pub struct AlarmQueue<T> {
    next_generation: u64,
    pending: BTreeMap<(Instant, u64), T>,
    deadlines: HashMap<u64, Instant>,
}

impl<T> Default for AlarmQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AlarmQueue<T> {
    pub fn new() -> Self {
        Self {
            next_generation: 1,
            pending: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    pub fn schedule(&mut self, deadline: Instant, payload: T) -> AlarmToken {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.pending.insert((deadline, generation), payload);
        self.deadlines.insert(generation, deadline);
        AlarmToken(generation)
    }

    /// Returns false if the alarm already fired or was cancelled before
    pub fn cancel(&mut self, token: AlarmToken) -> bool {
        match self.deadlines.remove(&token.0) {
            Some(deadline) => self.pending.remove(&(deadline, token.0)).is_some(),
            None => false,
        }
    }

    pub fn is_armed(&self, token: AlarmToken) -> bool {
        self.deadlines.contains_key(&token.0)
    }

    /// Removes and returns every alarm whose deadline is at or before `now`,
    /// earliest first
    pub fn poll_expired(&mut self, now: Instant) -> Vec<(AlarmToken, T)> {
        let mut fired = Vec::new();
        while let Some(entry) = self.pending.first_entry() {
            let (deadline, generation) = *entry.key();
            if deadline > now {
                break;
            }
            let payload = entry.remove();
            self.deadlines.remove(&generation);
            fired.push((AlarmToken(generation), payload));
        }
        fired
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.keys().next().map(|(deadline, _)| *deadline)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.deadlines.clear();
    }
}
