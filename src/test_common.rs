#![cfg(test)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, TimeZone, Utc};
use maplit::hashmap;

use crate::clock::Clock;
use crate::flag::{FlagDefinition, FlagRecord, FlagUpdate};
use crate::overrides::{OverrideLayer, OverrideSet};
use crate::store::{FlagStore, StoreError};

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

/// The instant every [ManualClock] starts at.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(epoch()),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

struct StoredFlag {
    flag: FlagRecord,
    overrides: OverrideSet,
}

fn seeded(key: &str, global_enabled: bool, description: &str, age_days: i64) -> FlagRecord {
    FlagRecord {
        definition: FlagDefinition::new(key, global_enabled),
        description: Some(description.to_string()),
        created_at: epoch() - chrono::Duration::days(age_days),
    }
}

/// An in-memory [FlagStore] that counts reads, so tests can tell cache hits from misses.
pub struct TestStore {
    flags: RwLock<HashMap<String, StoredFlag>>,
    reads: AtomicUsize,
    failing: bool,
}

impl TestStore {
    pub fn new() -> Self {
        Self {
            flags: RwLock::new(hashmap! {
                "dark-mode".to_string() => StoredFlag {
                    flag: seeded("dark-mode", false, "Dark colour scheme", 2),
                    overrides: OverrideSet::new()
                        .with_user("user-1", true)
                        .with_group("beta-testers", true)
                        .with_group("employees", false)
                        .with_region("eu", true),
                },
                "new-checkout".to_string() => StoredFlag {
                    flag: seeded("new-checkout", true, "Redesigned checkout flow", 1),
                    overrides: OverrideSet::new(),
                },
            }),
            reads: AtomicUsize::new(0),
            failing: false,
        }
    }

    /// A store whose every operation fails.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }

    /// The number of flag reads served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing {
            return Err("connection refused".into());
        }
        Ok(())
    }
}

impl FlagStore for TestStore {
    fn flag(&self, flag_key: &str) -> Result<Option<FlagRecord>, StoreError> {
        self.check()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        let flags = self.flags.read().unwrap();
        Ok(flags.get(flag_key).map(|stored| stored.flag.clone()))
    }

    fn flags(&self) -> Result<Vec<FlagRecord>, StoreError> {
        self.check()?;
        let flags = self.flags.read().unwrap();
        Ok(flags.values().map(|stored| stored.flag.clone()).collect())
    }

    fn overrides(&self, flag_key: &str) -> Result<OverrideSet, StoreError> {
        self.check()?;
        let flags = self.flags.read().unwrap();
        Ok(flags
            .get(flag_key)
            .map(|stored| stored.overrides.clone())
            .unwrap_or_default())
    }

    fn insert_flag(&self, flag: FlagRecord) -> Result<bool, StoreError> {
        self.check()?;
        let mut flags = self.flags.write().unwrap();
        if flags.contains_key(flag.key()) {
            return Ok(false);
        }
        flags.insert(
            flag.key().to_string(),
            StoredFlag {
                flag,
                overrides: OverrideSet::new(),
            },
        );
        Ok(true)
    }

    fn update_flag(
        &self,
        flag_key: &str,
        update: &FlagUpdate,
    ) -> Result<Option<FlagRecord>, StoreError> {
        self.check()?;
        let mut flags = self.flags.write().unwrap();
        Ok(flags.get_mut(flag_key).map(|stored| {
            update.apply_to(&mut stored.flag);
            stored.flag.clone()
        }))
    }

    fn delete_flag(&self, flag_key: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.flags.write().unwrap().remove(flag_key).is_some())
    }

    fn upsert_override(
        &self,
        flag_key: &str,
        layer: OverrideLayer,
        identity: &str,
        enabled: bool,
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut flags = self.flags.write().unwrap();
        let stored = flags
            .get_mut(flag_key)
            .ok_or_else(|| format!("no flag {}", flag_key))?;
        stored.overrides.upsert(layer, identity, enabled);
        Ok(())
    }

    fn delete_override(
        &self,
        flag_key: &str,
        layer: OverrideLayer,
        identity: &str,
    ) -> Result<bool, StoreError> {
        self.check()?;
        let mut flags = self.flags.write().unwrap();
        Ok(flags
            .get_mut(flag_key)
            .and_then(|stored| stored.overrides.remove(layer, identity))
            .is_some())
    }
}
