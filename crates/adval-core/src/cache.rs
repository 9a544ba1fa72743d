//! Validation cache: canonical keys, TTL'd results, and in-flight
//! deduplication.
//!
//! Positive and negative results are stored with different lifetimes.
//! Concurrent identical requests share one underlying execution through
//! the in-flight table; at most one provider round-trip is outstanding
//! per canonical key at any time.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::{NormalizedResult, ValidationInput};

/// Failure propagated when an executor fails instead of resolving.
/// Nothing is cached for a failed execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation executor failed: {message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Normalized string key for cache and in-flight lookups.
///
/// Case and incidental whitespace never change the key: street, secondary
/// and city lines are uppercased with internal whitespace collapsed, the
/// state code is uppercased, and the postal code keeps only digits and
/// hyphens. Non-empty fields are joined with a fixed separator.
pub fn canonical_key(input: &ValidationInput) -> String {
    let mut parts = Vec::with_capacity(5);

    let street = squash(&input.street);
    if !street.is_empty() {
        parts.push(street);
    }
    if let Some(secondary) = input.secondary.as_deref() {
        let secondary = squash(secondary);
        if !secondary.is_empty() {
            parts.push(secondary);
        }
    }
    if let Some(city) = input.city.as_deref() {
        let city = squash(city);
        if !city.is_empty() {
            parts.push(city);
        }
    }
    parts.push(input.state.to_ascii_uppercase());
    if let Some(postal) = input.postal_code.as_deref() {
        let postal: String = postal
            .chars()
            .filter(|ch| ch.is_ascii_digit() || *ch == '-')
            .collect();
        if !postal.is_empty() {
            parts.push(postal);
        }
    }

    parts.join("|")
}

fn squash(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

/// Read-only occupancy snapshot for health introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub in_flight: usize,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: NormalizedResult,
    stored_at: Instant,
    ttl: Duration,
    seq: u64,
}

#[derive(Debug, Default)]
struct EntryTable {
    map: HashMap<String, CacheEntry>,
    /// Insertion order as (sequence, key); stale pairs are skipped during
    /// eviction because overwrites bump the sequence.
    order: VecDeque<(u64, String)>,
    next_seq: u64,
}

impl EntryTable {
    fn lookup(&mut self, key: &str) -> Option<NormalizedResult> {
        match self.map.get(key) {
            Some(entry) if entry.stored_at.elapsed() <= entry.ttl => Some(entry.result.clone()),
            Some(_) => {
                // Expired: drop lazily on read.
                self.map.remove(key);
                None
            }
            None => None,
        }
    }

    fn insert(&mut self, key: String, result: NormalizedResult, ttl: Duration, capacity: usize) {
        if !self.map.contains_key(&key) {
            while self.map.len() >= capacity {
                if !self.evict_oldest() {
                    break;
                }
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.push_back((seq, key.clone()));
        self.map.insert(
            key,
            CacheEntry {
                result,
                stored_at: Instant::now(),
                ttl,
                seq,
            },
        );
    }

    fn evict_oldest(&mut self) -> bool {
        while let Some((seq, key)) = self.order.pop_front() {
            let live = self
                .map
                .get(&key)
                .map(|entry| entry.seq == seq)
                .unwrap_or(false);
            if live {
                self.map.remove(&key);
                debug!(key = %key, "evicted oldest cache entry at capacity");
                return true;
            }
        }
        false
    }

    fn purge_expired(&mut self) -> usize {
        let before = self.map.len();
        self.map
            .retain(|_, entry| entry.stored_at.elapsed() <= entry.ttl);
        self.order.retain(|(seq, key)| {
            self.map
                .get(key)
                .map(|entry| entry.seq == *seq)
                .unwrap_or(false)
        });
        before - self.map.len()
    }
}

type SharedExecution = Shared<BoxFuture<'static, Result<NormalizedResult, ExecutionError>>>;

#[derive(Debug)]
struct CacheShared {
    entries: Mutex<EntryTable>,
    in_flight: Mutex<HashMap<String, SharedExecutionSlot>>,
    capacity: usize,
}

// Shared futures are not Debug; wrap so CacheShared can derive it.
struct SharedExecutionSlot(SharedExecution);

impl std::fmt::Debug for SharedExecutionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedExecutionSlot")
    }
}

/// Thread-safe validation cache with in-flight deduplication.
#[derive(Debug, Clone)]
pub struct ValidationCache {
    shared: Arc<CacheShared>,
}

impl ValidationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                entries: Mutex::new(EntryTable::default()),
                in_flight: Mutex::new(HashMap::new()),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Return the cached result for `input` if present and within TTL, or
    /// run `executor` exactly once across all concurrent callers.
    ///
    /// Cache hits come back with `latency_ms` reset to zero: a cached
    /// answer reports no new network time. A successful execution is
    /// stored with `positive_ttl` when valid, `negative_ttl` otherwise.
    /// A failed execution is removed from the in-flight table and
    /// propagated without caching.
    pub async fn get_or_execute<F>(
        &self,
        input: &ValidationInput,
        executor: F,
        positive_ttl: Duration,
        negative_ttl: Duration,
    ) -> Result<NormalizedResult, ExecutionError>
    where
        F: Future<Output = Result<NormalizedResult, ExecutionError>> + Send + 'static,
    {
        let key = canonical_key(input);

        if let Some(result) = self.lookup(&key) {
            trace!(key = %key, "validation cache hit");
            return Ok(result.with_latency(0));
        }

        let execution = {
            let mut in_flight = self
                .shared
                .in_flight
                .lock()
                .expect("in-flight table lock is not poisoned");
            if let Some(slot) = in_flight.get(&key) {
                trace!(key = %key, "joining in-flight validation");
                slot.0.clone()
            } else {
                let execution = Self::drive(
                    Arc::clone(&self.shared),
                    key.clone(),
                    executor,
                    positive_ttl,
                    negative_ttl,
                )
                .boxed()
                .shared();
                in_flight.insert(key.clone(), SharedExecutionSlot(execution.clone()));
                execution
            }
        };

        execution.await
    }

    /// Runs the executor and settles the shared tables. The in-flight
    /// entry is removed unconditionally, success or failure.
    async fn drive<F>(
        shared: Arc<CacheShared>,
        key: String,
        executor: F,
        positive_ttl: Duration,
        negative_ttl: Duration,
    ) -> Result<NormalizedResult, ExecutionError>
    where
        F: Future<Output = Result<NormalizedResult, ExecutionError>> + Send + 'static,
    {
        let outcome = executor.await;

        shared
            .in_flight
            .lock()
            .expect("in-flight table lock is not poisoned")
            .remove(&key);

        if let Ok(result) = &outcome {
            let ttl = if result.is_valid {
                positive_ttl
            } else {
                negative_ttl
            };
            shared
                .entries
                .lock()
                .expect("cache entry lock is not poisoned")
                .insert(key, result.clone(), ttl, shared.capacity);
        }

        outcome
    }

    fn lookup(&self, key: &str) -> Option<NormalizedResult> {
        self.shared
            .entries
            .lock()
            .expect("cache entry lock is not poisoned")
            .lookup(key)
    }

    /// Remove entries whose TTL has elapsed, independent of access.
    pub fn purge_expired(&self) -> usize {
        self.shared
            .entries
            .lock()
            .expect("cache entry lock is not poisoned")
            .purge_expired()
    }

    pub fn stats(&self) -> CacheStats {
        let size = self
            .shared
            .entries
            .lock()
            .expect("cache entry lock is not poisoned")
            .map
            .len();
        let in_flight = self
            .shared
            .in_flight
            .lock()
            .expect("in-flight table lock is not poisoned")
            .len();
        CacheStats {
            size,
            capacity: self.shared.capacity,
            in_flight,
        }
    }

    /// Spawn the periodic expiry sweep. The task holds only a weak handle
    /// and exits once the cache is dropped.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let weak: Weak<CacheShared> = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let removed = shared
                    .entries
                    .lock()
                    .expect("cache entry lock is not poisoned")
                    .purge_expired();
                if removed > 0 {
                    debug!(removed, "cache sweep removed expired entries");
                }
            }
        })
    }
}
