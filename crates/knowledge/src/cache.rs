//! Response cache keyed by index version.
//!
//! The live index version is part of every key, so a publish needs no
//! flush: new queries produce keys that old entries cannot match, and the
//! old entries age out through TTL and LRU eviction.

use crate::config::CacheConfig;
use crate::types::IndexVersionId;
use docent_prompt::HistoryTurn;
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::OwnedMutexGuard;

/// Everything that can change an answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query: String,
    top_k: usize,
    rerank: bool,
    temperature_bits: u32,
    max_tokens: u32,
    template: String,
    language: String,
    history: Option<String>,
    index_version: IndexVersionId,
}

impl CacheKey {
    pub fn new(query: &str, index_version: IndexVersionId) -> Self {
        Self {
            query: normalize_query(query),
            top_k: 0,
            rerank: false,
            temperature_bits: 0,
            max_tokens: 0,
            template: String::new(),
            language: String::new(),
            history: None,
            index_version,
        }
    }

    pub fn with_retrieval(mut self, top_k: usize, rerank: bool) -> Self {
        self.top_k = top_k;
        self.rerank = rerank;
        self
    }

    pub fn with_generation(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature_bits = temperature.to_bits();
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_template(mut self, identity: impl Into<String>, language: impl Into<String>) -> Self {
        self.template = identity.into();
        self.language = language.into();
        self
    }

    pub fn with_history(mut self, turns: &[HistoryTurn]) -> Self {
        self.history = history_signature(turns);
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn index_version(&self) -> &IndexVersionId {
        &self.index_version
    }
}

/// Lowercase, collapse runs of whitespace, trim.
pub fn normalize_query(query: &str) -> String {
    query
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 over the history turns; `None` for an empty history.
pub fn history_signature(turns: &[HistoryTurn]) -> Option<String> {
    if turns.is_empty() {
        return None;
    }

    let mut hasher = Sha256::new();
    for turn in turns {
        hasher.update(turn.role.as_bytes());
        hasher.update([0u8]);
        hasher.update(turn.content.as_bytes());
        hasher.update([0u8]);
    }
    Some(format!("{:x}", hasher.finalize()))
}

struct Entry<V> {
    value: V,
    inserted: Instant,
}

type FlightMap = Mutex<HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>;

/// Bounded LRU cache with per-entry TTL and in-flight coalescing.
pub struct ResponseCache<V> {
    entries: Mutex<LruCache<CacheKey, Entry<V>>>,
    ttl: Duration,
    in_flight: FlightMap,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity, config.ttl())
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let mut entries = self.lock_entries();

        let expired = entries
            .peek(key)
            .is_some_and(|entry| entry.inserted.elapsed() >= self.ttl);
        if expired {
            entries.pop(key);
            tracing::debug!(query = %key.query, "Cache entry expired");
            return None;
        }

        let hit = entries.get(key).map(|entry| entry.value.clone());
        tracing::debug!(
            query = %key.query,
            version = %key.index_version,
            hit = hit.is_some(),
            "Cache lookup"
        );
        hit
    }

    pub fn put(&self, key: CacheKey, value: V) {
        self.lock_entries().put(
            key,
            Entry {
                value,
                inserted: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until no other caller is computing `key`, then claim it.
    ///
    /// Callers should check the cache again after this returns: the caller
    /// they waited on has usually filled it.
    pub async fn begin(&self, key: &CacheKey) -> FlightGuard<'_> {
        let slot = {
            let mut flights = lock(&self.in_flight);
            flights
                .entry(key.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };

        let permit = slot.lock_owned().await;
        FlightGuard {
            key: key.clone(),
            flights: &self.in_flight,
            permit,
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, LruCache<CacheKey, Entry<V>>> {
        lock(&self.entries)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Exclusive claim on computing one key. Dropping it lets the next waiter in.
pub struct FlightGuard<'a> {
    key: CacheKey,
    flights: &'a FlightMap,
    permit: OwnedMutexGuard<()>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut flights = lock(self.flights);
        let idle = flights.get(&self.key).is_some_and(|slot| {
            // The map and this guard hold the only references when nobody waits
            Arc::ptr_eq(slot, OwnedMutexGuard::mutex(&self.permit)) && Arc::strong_count(slot) <= 2
        });
        if idle {
            flights.remove(&self.key);
        }
    }
}
