// Request Coalescing Module
//
// Deduplicates concurrent requests that share a fingerprint.
// When several callers ask for the same fingerprint at the same time:
// - First caller (leader): does the work, then settles the entry with its outcome
// - Later callers (followers): wait for the leader and receive a clone of that outcome
// - Callers arriving shortly after settlement (grace window) get the outcome immediately
//
// Per-fingerprint lifecycle: absent -> running -> settled -> absent.
// The table lock is a parking_lot mutex and is never held across an await.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;

/// Why a caller did not get an outcome from the coalescer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoalesceError {
    /// The leader went away (panic, cancellation) without settling
    #[error("leader abandoned the request before settling it")]
    LeaderAbandoned,

    /// Starting another distinct request would exceed the in-flight limit
    #[error("in-flight limit of {limit} reached")]
    Saturated { limit: usize },
}

struct Entry<V> {
    generation: u64,
    sender: watch::Sender<Option<V>>,
    /// Set once the leader settles; the value is served during the grace window
    settled: Option<(Instant, V)>,
    waiters: usize,
}

struct Table<V> {
    entries: HashMap<String, Entry<V>>,
    next_generation: u64,
}

struct Inner<V> {
    table: Mutex<Table<V>>,
    grace: Duration,
    max_in_flight: Option<usize>,
}

/// Request coalescing manager
#[derive(Clone)]
pub struct RequestCoalescer<V> {
    inner: Arc<Inner<V>>,
}

impl<V> RequestCoalescer<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a coalescer whose settled entries serve late arrivals for `grace`
    pub fn new(grace: Duration) -> Self {
        Self::with_limit(grace, None)
    }

    /// Create a coalescer that refuses new fingerprints beyond `max_in_flight`
    pub fn with_limit(grace: Duration, max_in_flight: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Inner {
                table: Mutex::new(Table {
                    entries: HashMap::new(),
                    next_generation: 0,
                }),
                grace,
                max_in_flight,
            }),
        }
    }

    /// Join or lead the work for `key`.
    ///
    /// Returns `Slot::Leader` when nobody is working on `key`; the leader must
    /// do the work and call [`LeaderGuard::settle`]. Otherwise waits for the
    /// running leader (or takes a value settled within the grace window) and
    /// returns `Slot::Follower` with a clone of the leader's outcome.
    pub async fn begin(&self, key: &str) -> Result<Slot<V>, CoalesceError> {
        let (mut receiver, generation) = {
            let mut table = self.inner.table.lock();
            let grace = self.inner.grace;

            let joinable = match table.entries.get_mut(key) {
                Some(entry) => match &entry.settled {
                    None => {
                        entry.waiters += 1;
                        Some((entry.sender.subscribe(), entry.generation))
                    }
                    Some((at, value)) if at.elapsed() < grace => {
                        return Ok(Slot::Follower(value.clone()));
                    }
                    // Settled past grace: replaced by a new leader below
                    Some(_) => None,
                },
                None => None,
            };

            match joinable {
                Some(join) => join,
                None => return self.lead(&mut table, key),
            }
        };

        let _waiter = WaiterGuard {
            inner: &self.inner,
            key,
            generation,
        };

        let outcome = receiver
            .wait_for(Option::is_some)
            .await
            .map(|value| value.clone())
            .map_err(|_| CoalesceError::LeaderAbandoned)?;

        outcome.ok_or(CoalesceError::LeaderAbandoned).map(Slot::Follower)
    }

    fn lead(&self, table: &mut Table<V>, key: &str) -> Result<Slot<V>, CoalesceError> {
        if let Some(limit) = self.inner.max_in_flight {
            let running = table
                .entries
                .values()
                .filter(|e| e.settled.is_none())
                .count();
            if running >= limit {
                return Err(CoalesceError::Saturated { limit });
            }
        }

        let generation = table.next_generation;
        table.next_generation += 1;

        let (sender, _) = watch::channel(None);
        table.entries.insert(
            key.to_string(),
            Entry {
                generation,
                sender,
                settled: None,
                waiters: 0,
            },
        );

        Ok(Slot::Leader(LeaderGuard {
            key: key.to_string(),
            generation,
            inner: Arc::clone(&self.inner),
            settled: false,
        }))
    }

    /// Number of fingerprints currently running (not yet settled)
    pub fn in_flight_count(&self) -> usize {
        self.inner
            .table
            .lock()
            .entries
            .values()
            .filter(|e| e.settled.is_none())
            .count()
    }

    /// Number of followers waiting on `key`
    pub fn waiter_count(&self, key: &str) -> usize {
        self.inner
            .table
            .lock()
            .entries
            .get(key)
            .map_or(0, |e| e.waiters)
    }
}

/// Result of [`RequestCoalescer::begin`]
pub enum Slot<V> {
    /// Do the work, then settle the guard
    Leader(LeaderGuard<V>),
    /// The leader's outcome
    Follower(V),
}

impl<V> Slot<V> {
    pub fn is_leader(&self) -> bool {
        matches!(self, Slot::Leader(_))
    }

    pub fn is_follower(&self) -> bool {
        matches!(self, Slot::Follower(_))
    }
}

/// Guard held by the leader.
///
/// Dropping it without settling removes the entry and wakes followers with
/// `CoalesceError::LeaderAbandoned`.
pub struct LeaderGuard<V> {
    key: String,
    generation: u64,
    inner: Arc<Inner<V>>,
    settled: bool,
}

impl<V> LeaderGuard<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Publish the outcome to all followers and start the grace window
    pub fn settle(mut self, value: V) {
        self.settled = true;
        let grace = self.inner.grace;

        {
            let mut table = self.inner.table.lock();
            let Some(entry) = table.entries.get_mut(&self.key) else {
                return;
            };
            if entry.generation != self.generation {
                return;
            }

            entry.sender.send_replace(Some(value.clone()));
            if grace.is_zero() {
                table.entries.remove(&self.key);
                return;
            }
            entry.settled = Some((Instant::now(), value));
        }

        let inner = Arc::clone(&self.inner);
        let key = std::mem::take(&mut self.key);
        let generation = self.generation;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let mut table = inner.table.lock();
            if table
                .entries
                .get(&key)
                .is_some_and(|e| e.generation == generation && e.settled.is_some())
            {
                table.entries.remove(&key);
            }
        });
    }
}

impl<V> Drop for LeaderGuard<V> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut table = self.inner.table.lock();
        if table
            .entries
            .get(&self.key)
            .is_some_and(|e| e.generation == self.generation)
        {
            // Dropping the sender closes every follower's receiver
            table.entries.remove(&self.key);
        }
    }
}

/// Decrements the waiter count when a follower stops waiting, however it stops
struct WaiterGuard<'a, V> {
    inner: &'a Inner<V>,
    key: &'a str,
    generation: u64,
}

impl<V> Drop for WaiterGuard<'_, V> {
    fn drop(&mut self) {
        let mut table = self.inner.table.lock();
        if let Some(entry) = table.entries.get_mut(self.key) {
            if entry.generation == self.generation {
                entry.waiters = entry.waiters.saturating_sub(1);
            }
        }
    }
}
