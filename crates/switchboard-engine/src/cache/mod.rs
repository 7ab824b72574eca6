// Response cache
//
// De-duplicates concurrent or repeated invocations of the same cacheable
// endpoint call and fans the eventual result out to every caller that arrived
// while the result was still being produced. All mutations go through a single
// write lock, which keeps the "at most one live entry per key" invariant.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use switchboard_error::{CacheError, CacheResult, EngineResult};
use switchboard_types::EventId;

use crate::adaptor::{InvokeResponse, ObserverResumer};

/// Default ceiling on concurrent observer resumptions per batch
pub const DEFAULT_OBSERVER_BATCH: usize = 10;

/// How long a cache entry lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheLifetime {
    /// Deleted once the TTL (milliseconds) has elapsed
    Ttl(i64),
    /// Deleted once the resolved response has been consumed
    ReadOnce,
}

/// One live entry per cache key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Unique cache key
    pub key: String,
    /// Stored response; may itself still be pending
    pub response: InvokeResponse,
    /// Callers awaiting this entry while it is unresolved
    pub observer_ids: Vec<EventId>,
    /// Creation metadata
    pub created_at: DateTime<Utc>,
    /// Expiry policy
    pub lifetime: CacheLifetime,
}

impl CacheEntry {
    fn new(key: impl Into<String>, response: InvokeResponse, lifetime: CacheLifetime) -> Self {
        CacheEntry {
            key: key.into(),
            response,
            observer_ids: Vec::new(),
            created_at: Utc::now(),
            lifetime,
        }
    }

    /// Whether a TTL entry has outlived its TTL
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.lifetime {
            CacheLifetime::Ttl(ttl_ms) => {
                (now - self.created_at).num_milliseconds() > ttl_ms
            }
            CacheLifetime::ReadOnce => false,
        }
    }
}

/// Outcome of an atomic check-and-create
#[derive(Debug, Clone)]
pub enum WriteOutcome {
    /// No live entry existed; the caller's placeholder is now the entry
    Created,
    /// A live entry already existed; the caller sees its current state
    Existing(CacheEntry),
}

/// Response cache with observer fan-out
#[derive(Debug)]
pub struct ResponseCache {
    /// Live entries indexed by cache key
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// Ceiling on concurrent observer resumptions per batch
    batch_size: usize,
}

impl ResponseCache {
    /// Create a cache with the given observer batch size
    pub fn new(batch_size: usize) -> Self {
        ResponseCache {
            entries: RwLock::new(HashMap::new()),
            batch_size: batch_size.max(1),
        }
    }

    /// Read the entry for `key`, honoring expiry.
    ///
    /// An expired TTL entry is removed and treated as a miss before the read
    /// returns. A resolved read-once entry with no observers left is consumed
    /// by the read.
    pub fn try_read(&self, key: &str) -> CacheResult<Option<InvokeResponse>> {
        let mut entries = self.entries.write().map_err(|_| {
            CacheError::SyncError("Failed to acquire write lock on cache entries".to_string())
        })?;

        let entry = match entries.get(key) {
            Some(entry) => entry,
            None => return Ok(None),
        };

        if entry.is_expired(Utc::now()) {
            debug!(key, "cache entry expired on read");
            entries.remove(key);
            return Ok(None);
        }

        let consumed = entry.lifetime == CacheLifetime::ReadOnce
            && !entry.response.is_pending()
            && entry.observer_ids.is_empty();

        if consumed {
            let entry = entries.remove(key).map(|e| e.response);
            return Ok(entry);
        }

        Ok(Some(entry.response.clone()))
    }

    /// Create a new entry for `key`. At most one live entry may exist per key;
    /// a duplicate create is a programmer error upstream.
    pub fn write(
        &self,
        key: &str,
        response: InvokeResponse,
        lifetime: CacheLifetime,
    ) -> CacheResult<()> {
        let mut entries = self.entries.write().map_err(|_| {
            CacheError::SyncError("Failed to acquire write lock on cache entries".to_string())
        })?;

        if let Some(existing) = entries.get(key) {
            if !existing.is_expired(Utc::now()) {
                return Err(CacheError::DuplicateEntry(key.to_string()));
            }
        }

        entries.insert(key.to_string(), CacheEntry::new(key, response, lifetime));
        Ok(())
    }

    /// Atomic check-and-create: return the live entry for `key`, or install
    /// `placeholder` and report that this caller won the key.
    ///
    /// Expired entries are removed first, and a resolved read-once entry with
    /// no observers is consumed by the read, exactly as in [`try_read`].
    ///
    /// [`try_read`]: ResponseCache::try_read
    pub fn read_or_create(
        &self,
        key: &str,
        placeholder: InvokeResponse,
        lifetime: CacheLifetime,
    ) -> CacheResult<WriteOutcome> {
        let mut entries = self.entries.write().map_err(|_| {
            CacheError::SyncError("Failed to acquire write lock on cache entries".to_string())
        })?;

        if let Some(entry) = entries.get(key) {
            if entry.is_expired(Utc::now()) {
                debug!(key, "cache entry expired on read");
                entries.remove(key);
            } else if entry.lifetime == CacheLifetime::ReadOnce
                && !entry.response.is_pending()
                && entry.observer_ids.is_empty()
            {
                let consumed = entries.remove(key);
                return Ok(WriteOutcome::Existing(consumed.ok_or_else(|| {
                    CacheError::NotFound(key.to_string())
                })?));
            } else {
                return Ok(WriteOutcome::Existing(entry.clone()));
            }
        }

        entries.insert(key.to_string(), CacheEntry::new(key, placeholder, lifetime));
        Ok(WriteOutcome::Created)
    }

    /// Overwrite an existing entry's response and return the entry together
    /// with its accumulated observer list.
    pub fn update(&self, key: &str, response: InvokeResponse) -> CacheResult<CacheEntry> {
        let mut entries = self.entries.write().map_err(|_| {
            CacheError::SyncError("Failed to acquire write lock on cache entries".to_string())
        })?;

        let entry = entries
            .get_mut(key)
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;

        entry.response = response;
        Ok(entry.clone())
    }

    /// Register a caller as an observer of the entry for `key`.
    /// Duplicate registrations are coalesced.
    pub fn add_observer(&self, key: &str, observer: EventId) -> CacheResult<()> {
        let mut entries = self.entries.write().map_err(|_| {
            CacheError::SyncError("Failed to acquire write lock on cache entries".to_string())
        })?;

        let entry = entries
            .get_mut(key)
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;

        if !entry.observer_ids.contains(&observer) {
            entry.observer_ids.push(observer);
        }
        Ok(())
    }

    /// Take the observer list for `key`, leaving it empty
    fn take_observers(&self, key: &str) -> CacheResult<Vec<EventId>> {
        let mut entries = self.entries.write().map_err(|_| {
            CacheError::SyncError("Failed to acquire write lock on cache entries".to_string())
        })?;

        let entry = entries
            .get_mut(key)
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;

        Ok(std::mem::take(&mut entry.observer_ids))
    }

    /// Resume every distinct observer of `key` with the resolved response.
    ///
    /// Observers are resumed in batches no larger than the configured batch
    /// size, each taken once (the list is drained). Returns the number of
    /// observers resumed.
    pub async fn notify_observers(
        &self,
        key: &str,
        response: &Value,
        resumer: &dyn ObserverResumer,
    ) -> EngineResult<usize> {
        let observers = self.take_observers(key)?;
        if observers.is_empty() {
            return Ok(0);
        }

        debug!(key, count = observers.len(), "notifying cache observers");

        let mut resumed = 0;
        for batch in observers.chunks(self.batch_size) {
            let results =
                futures::future::join_all(batch.iter().map(|id| resumer.resume(id, response)))
                    .await;

            for (id, result) in batch.iter().zip(results) {
                match result {
                    Ok(()) => resumed += 1,
                    Err(err) => {
                        warn!(key, observer = %id, %err, "observer resumption failed");
                    }
                }
            }
        }

        Ok(resumed)
    }

    /// Remove the entry for `key` regardless of its state, returning any
    /// parked observers so the caller can fail or re-route them. Used when
    /// the caller that installed a pending placeholder cannot resolve it;
    /// the next arrival for the key starts fresh.
    pub fn discard(&self, key: &str) -> CacheResult<Vec<EventId>> {
        let mut entries = self.entries.write().map_err(|_| {
            CacheError::SyncError("Failed to acquire write lock on cache entries".to_string())
        })?;

        Ok(entries
            .remove(key)
            .map(|entry| entry.observer_ids)
            .unwrap_or_default())
    }

    /// Delete the entry for `key` if it is stale: a TTL entry whose TTL has
    /// elapsed, or a read-once entry whose call is no longer pending.
    /// Returns whether the entry was removed.
    pub fn expire_if_stale(&self, key: &str) -> CacheResult<bool> {
        let mut entries = self.entries.write().map_err(|_| {
            CacheError::SyncError("Failed to acquire write lock on cache entries".to_string())
        })?;

        let entry = match entries.get(key) {
            Some(entry) => entry,
            None => return Ok(false),
        };

        let stale = match entry.lifetime {
            CacheLifetime::Ttl(_) => entry.is_expired(Utc::now()),
            CacheLifetime::ReadOnce => !entry.response.is_pending(),
        };

        if stale {
            entries.remove(key);
        }
        Ok(stale)
    }

    /// Number of live entries
    pub fn len(&self) -> CacheResult<usize> {
        let entries = self.entries.read().map_err(|_| {
            CacheError::SyncError("Failed to acquire read lock on cache entries".to_string())
        })?;

        Ok(entries.len())
    }

    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Observer batch size this cache was configured with
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[cfg(test)]
    fn backdate(&self, key: &str, by_ms: i64) {
        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.get_mut(key) {
            entry.created_at = entry.created_at - chrono::Duration::milliseconds(by_ms);
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        ResponseCache::new(DEFAULT_OBSERVER_BATCH)
    }
}
