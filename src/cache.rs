use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::debug;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};

use crate::clock::{Clock, SystemClock};
use crate::flag::FlagDefinition;
use crate::overrides::OverrideSet;

/// How long a snapshot stays fresh unless configured otherwise.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Settings for a [FlagCache], fixed for the lifetime of the cache.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Maximum age of a snapshot. A snapshot exactly this old is still returned.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "ttlSeconds", default = "default_ttl")]
    pub ttl: Duration,
}

fn default_ttl() -> Duration {
    DEFAULT_TTL
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL }
    }
}

/// A snapshot of a flag and all of its overrides, as stored in a [FlagCache].
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub flag: FlagDefinition,
    pub overrides: OverrideSet,
    pub cached_at: DateTime<Utc>,
}

/// FlagCache keeps recently loaded flag snapshots in memory so evaluations can skip storage.
///
/// Snapshots expire after the configured TTL. Every method takes `&self` and may be called from
/// any number of threads at once; concurrent writes to the same key resolve as last write wins.
///
/// The cache is local to the process. Writers in other processes are only observed once the
/// snapshot cached here expires, so the TTL bounds how stale a read can be.
pub struct FlagCache<C: Clock = SystemClock> {
    entries: DashMap<String, Arc<CacheEntry>>,
    ttl: Duration,
    clock: C,
}

impl FlagCache<SystemClock> {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl Default for FlagCache<SystemClock> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl<C: Clock> FlagCache<C> {
    pub fn with_clock(config: CacheConfig, clock: C) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: config.ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The time source used to stamp snapshots.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Returns the snapshot for `key` if there is one and it has not expired.
    ///
    /// An expired snapshot is evicted on the way out.
    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        // Clone the Arc out so the shard lock is released before any eviction below.
        let entry = match self.entries.get(key) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                debug!("flag cache miss for {}", key);
                return None;
            }
        };

        if self.is_fresh(&entry) {
            debug!("flag cache hit for {}", key);
            return Some(entry);
        }

        debug!("flag cache entry for {} expired at age {:?}", key, self.age(&entry));
        // A concurrent set may already have replaced the expired snapshot; leave that one alone.
        self.entries.remove_if(key, |_, current| Arc::ptr_eq(current, &entry));
        None
    }

    /// Stores a complete snapshot for `key`, replacing whatever was cached before.
    pub fn set(&self, key: impl Into<String>, flag: FlagDefinition, overrides: OverrideSet) {
        let entry = CacheEntry {
            flag,
            overrides,
            cached_at: self.clock.now(),
        };
        self.entries.insert(key.into(), Arc::new(entry));
    }

    /// Removes any snapshot for `key`. Invalidating a missing key does nothing.
    pub fn invalidate(&self, key: &str) {
        if self.entries.remove(key).is_some() {
            debug!("invalidated flag cache entry for {}", key);
        }
    }

    /// Removes every snapshot.
    pub fn clear(&self) {
        self.entries.clear();
        debug!("cleared flag cache");
    }

    /// The number of snapshots held, including expired ones that have not been evicted yet.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn age(&self, entry: &CacheEntry) -> chrono::Duration {
        self.clock.now() - entry.cached_at
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        // A negative age means the clock stepped back since the snapshot was taken, so its real
        // age is unknown.
        match self.age(entry).to_std() {
            Ok(age) => age <= self.ttl,
            Err(_) => false,
        }
    }
}
