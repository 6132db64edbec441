//! In-memory checksum cache.
//!
//! Maps a token fingerprint to a checksum fetched from the remote source.
//! Entries carry an absolute expiry and are evicted lazily on read; there is
//! no sweeper task. Nothing is persisted across restarts.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use dashmap::DashMap;
use relay_core::{Clock, Fingerprint, SystemClock};

/// How long a fetched checksum stays valid.
pub const CHECKSUM_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: DateTime<FixedOffset>,
}

/// Shared, TTL-bound fingerprint → checksum map.
///
/// Safe to share across tasks; concurrent writers to the same key resolve
/// last-writer-wins.
pub struct ChecksumCache {
    entries: DashMap<Fingerprint, CacheEntry>,
    clock: Arc<dyn Clock>,
}

impl Default for ChecksumCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl ChecksumCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Cached value for `key`, unless absent or expired.
    pub fn get(&self, key: &Fingerprint) -> Option<String> {
        let now = self.clock.now();
        let expired = match self.entries.get(key) {
            Some(entry) if now <= entry.expires_at => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            // Re-check under the write lock; a fresh put may have landed.
            self.entries.remove_if(key, |_, entry| now > entry.expires_at);
            tracing::trace!(fingerprint = ?key, "cached checksum expired");
        }
        None
    }

    /// Store `value` until now + `ttl`.
    pub fn put(&self, key: Fingerprint, value: impl Into<String>, ttl: Duration) {
        let now = self.clock.now();
        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or_else(|| DateTime::<Utc>::MAX_UTC.fixed_offset());
        self.entries.insert(
            key,
            CacheEntry {
                value: value.into(),
                expires_at,
            },
        );
    }

    /// Number of stored entries, expired ones included until they are read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now <= entry.expires_at);
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
