//! Work queue
//!
//! Deduplicating, delay-aware queue of job names. A name is handed out to
//! at most one reconcile at a time; scheduling it while it is in flight
//! parks the request until the running reconcile finishes.

use std::collections::{HashMap, HashSet};
use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct WorkQueue {
    /// Names waiting to be reconciled, with the earliest time they are due
    scheduled: HashMap<String, Instant>,

    /// Names currently being reconciled
    in_flight: HashSet<String>,

    /// Requests that arrived while their name was in flight
    deferred: HashMap<String, Instant>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a name to be reconciled at `at`
    ///
    /// An earlier request for the same name wins over a later one.
    pub fn schedule(&mut self, name: &str, at: Instant) {
        let slot = if self.in_flight.contains(name) {
            &mut self.deferred
        } else {
            &mut self.scheduled
        };

        slot.entry(name.to_string())
            .and_modify(|due| *due = (*due).min(at))
            .or_insert(at);
    }

    /// Takes up to `limit` names that are due at `now`, earliest first,
    /// and marks them in flight
    pub fn pop_due(&mut self, now: Instant, limit: usize) -> Vec<String> {
        let mut due: Vec<(Instant, String)> = self
            .scheduled
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(name, at)| (*at, name.clone()))
            .collect();
        due.sort();
        due.truncate(limit);

        due.into_iter()
            .map(|(_, name)| {
                self.scheduled.remove(&name);
                self.in_flight.insert(name.clone());
                name
            })
            .collect()
    }

    /// Marks a reconcile as finished, releasing any request parked meanwhile
    pub fn done(&mut self, name: &str) {
        self.in_flight.remove(name);
        if let Some(at) = self.deferred.remove(name) {
            self.schedule(name, at);
        }
    }

    /// Earliest instant at which something becomes due
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduled.values().min().copied()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty() && self.in_flight.is_empty() && self.deferred.is_empty()
    }
}
