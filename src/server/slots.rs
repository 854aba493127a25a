use slab::Slab;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use crate::http::connection::{Connection, Transport};

/// Bounded set of live connections with their expiry deadlines.
///
/// A key is stable for the life of its connection, so the worker uses it as
/// the poll token. Deadlines live in a min-heap; entries go stale when a
/// connection makes progress or its key is reused, and are checked against
/// the live connection when they come due.
pub struct ConnectionTable<S> {
    entries: Slab<Entry<S>>,
    max: usize,
    idle_timeout: Option<Duration>,
    deadlines: BinaryHeap<Reverse<(Instant, u64, usize)>>,
    next_serial: u64,
}

struct Entry<S> {
    serial: u64,
    conn: Connection<S>,
}

impl<S: Transport> ConnectionTable<S> {
    pub fn new(max: usize, idle_timeout: Option<Duration>) -> Self {
        Self {
            entries: Slab::with_capacity(max),
            max,
            idle_timeout,
            deadlines: BinaryHeap::new(),
            next_serial: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max
    }

    /// Stores `conn` and returns its key, or hands it back when full.
    pub fn insert(&mut self, conn: Connection<S>) -> Result<usize, Connection<S>> {
        if self.is_full() {
            return Err(conn);
        }

        let serial = self.next_serial;
        self.next_serial += 1;
        let key = self.entries.insert(Entry { serial, conn });
        self.watch(key);
        Ok(key)
    }

    pub fn get_mut(&mut self, key: usize) -> Option<&mut Connection<S>> {
        self.entries.get_mut(key).map(|entry| &mut entry.conn)
    }

    pub fn remove(&mut self, key: usize) -> Option<Connection<S>> {
        self.entries.try_remove(key).map(|entry| entry.conn)
    }

    /// Schedules the current deadline of `key`. Called after a change that
    /// can bring the deadline forward, such as entering the drain phase.
    pub fn watch(&mut self, key: usize) {
        let Some(entry) = self.entries.get(key) else {
            return;
        };
        if let Some(at) = entry.conn.deadline(self.idle_timeout) {
            self.deadlines.push(Reverse((at, entry.serial, key)));
        }
    }

    /// Earliest scheduled deadline. May be stale, in which case the wait
    /// simply ends early.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.peek().map(|Reverse((at, _, _))| *at)
    }

    /// Keys whose connection is due at `now`. Entries that were pushed back
    /// by later activity are rescheduled.
    pub fn expired(&mut self, now: Instant) -> Vec<usize> {
        let mut due = Vec::new();

        while let Some(Reverse((at, serial, key))) = self.deadlines.peek().copied() {
            if at > now {
                break;
            }
            self.deadlines.pop();

            let Some(entry) = self.entries.get(key) else {
                continue;
            };
            if entry.serial != serial {
                continue;
            }
            match entry.conn.deadline(self.idle_timeout) {
                Some(current) if current > now => {
                    self.deadlines.push(Reverse((current, serial, key)));
                }
                Some(_) if !due.contains(&key) => due.push(key),
                _ => {}
            }
        }
        due
    }

    /// Keys currently in use.
    pub fn indices(&self) -> Vec<usize> {
        self.entries.iter().map(|(key, _)| key).collect()
    }
}
