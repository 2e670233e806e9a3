use log::{debug, warn};
use thiserror::Error;

use crate::cache::{CacheConfig, FlagCache};
use crate::clock::{Clock, SystemClock};
use crate::context::EvaluationContext;
use crate::eval::{evaluate, EvaluationResult};
use crate::flag::{FlagDefinition, FlagRecord, FlagUpdate, InvalidFlagKey};
use crate::overrides::{OverrideLayer, OverrideSet};
use crate::store::{FlagStore, StoreError};

/// Error is returned by [FlagService] operations that could not be completed.
#[derive(Debug, Error)]
pub enum Error {
    /// FlagNotFound indicates that no flag with the given key exists in storage.
    #[error("feature flag \"{0}\" not found")]
    FlagNotFound(String),
    /// FlagAlreadyExists indicates an attempt to create a flag whose key is taken.
    #[error("feature flag \"{0}\" already exists")]
    FlagAlreadyExists(String),
    /// InvalidFlagKey indicates that a new flag's key does not satisfy
    /// [crate::is_valid_flag_key].
    #[error(transparent)]
    InvalidFlagKey(#[from] InvalidFlagKey),
    /// OverrideNotFound indicates an attempt to remove an override that does not exist.
    #[error("no {layer} override found for \"{identity}\" on flag \"{flag_key}\"")]
    OverrideNotFound {
        flag_key: String,
        layer: OverrideLayer,
        identity: String,
    },
    /// Store indicates that the underlying [FlagStore] failed.
    #[error("flag store error")]
    Store(#[source] StoreError),
}

fn store_failure(operation: &'static str) -> impl FnOnce(StoreError) -> Error {
    move |e| {
        warn!("flag store failed to {}: {}", operation, e);
        Error::Store(e)
    }
}

/// FlagService evaluates and administers flags held in a [FlagStore], fronting reads with a
/// [FlagCache].
///
/// Evaluations are served from the cache when a fresh snapshot exists, and otherwise load the
/// flag and its overrides from the store and cache them. Every successful mutation invalidates the
/// flag's snapshot before returning, so later evaluations in this process see the change.
pub struct FlagService<S: FlagStore, C: Clock = SystemClock> {
    store: S,
    cache: FlagCache<C>,
}

impl<S: FlagStore> FlagService<S, SystemClock> {
    pub fn new(store: S, config: CacheConfig) -> Self {
        Self::with_cache(store, FlagCache::new(config))
    }
}

impl<S: FlagStore, C: Clock> FlagService<S, C> {
    pub fn with_cache(store: S, cache: FlagCache<C>) -> Self {
        Self { store, cache }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The cache in front of the store, e.g. to [FlagCache::clear] it after a bulk reload.
    pub fn cache(&self) -> &FlagCache<C> {
        &self.cache
    }

    /// Evaluate the flag `flag_key` for `context`.
    pub fn evaluate(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<EvaluationResult, Error> {
        if let Some(entry) = self.cache.get(flag_key) {
            return Ok(evaluate(&entry.flag, &entry.overrides, context));
        }

        let (flag, overrides) = self.load(flag_key)?;
        let result = evaluate(&flag, &overrides, context);
        self.cache.set(flag_key, flag, overrides);
        Ok(result)
    }

    /// Returns the stored record and overrides of `flag_key`, bypassing the cache.
    pub fn flag(&self, flag_key: &str) -> Result<(FlagRecord, OverrideSet), Error> {
        let flag = self.ensure_flag_exists(flag_key)?;
        let overrides = self
            .store
            .overrides(flag_key)
            .map_err(store_failure("read overrides"))?;
        Ok((flag, overrides))
    }

    /// Returns every stored flag, most recently created first.
    pub fn flags(&self) -> Result<Vec<FlagRecord>, Error> {
        let mut flags = self.store.flags().map_err(store_failure("list flags"))?;
        flags.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.key().cmp(b.key()))
        });
        Ok(flags)
    }

    /// Create a new flag with no overrides.
    pub fn create_flag(
        &self,
        flag_key: &str,
        global_enabled: bool,
        description: Option<String>,
    ) -> Result<FlagRecord, Error> {
        let flag = FlagRecord {
            definition: FlagDefinition::try_new(flag_key, global_enabled)?,
            description,
            created_at: self.cache.clock().now(),
        };
        if !self
            .store
            .insert_flag(flag.clone())
            .map_err(store_failure("insert flag"))?
        {
            return Err(Error::FlagAlreadyExists(flag.definition.key));
        }
        debug!("created flag {}", flag.key());
        Ok(flag)
    }

    /// Change the global value and/or description of `flag_key`, returning the updated record.
    pub fn update_flag(&self, flag_key: &str, update: FlagUpdate) -> Result<FlagRecord, Error> {
        let flag = self
            .store
            .update_flag(flag_key, &update)
            .map_err(store_failure("update flag"))?
            .ok_or_else(|| Error::FlagNotFound(flag_key.to_string()))?;
        self.cache.invalidate(flag_key);
        Ok(flag)
    }

    /// Delete `flag_key` and all of its overrides.
    pub fn delete_flag(&self, flag_key: &str) -> Result<(), Error> {
        if !self
            .store
            .delete_flag(flag_key)
            .map_err(store_failure("delete flag"))?
        {
            return Err(Error::FlagNotFound(flag_key.to_string()));
        }
        self.cache.invalidate(flag_key);
        Ok(())
    }

    /// Set the override for `identity` at `layer` of `flag_key`, replacing any existing one.
    pub fn set_override(
        &self,
        flag_key: &str,
        layer: OverrideLayer,
        identity: &str,
        enabled: bool,
    ) -> Result<(), Error> {
        self.ensure_flag_exists(flag_key)?;
        self.store
            .upsert_override(flag_key, layer, identity, enabled)
            .map_err(store_failure("upsert override"))?;
        self.cache.invalidate(flag_key);
        Ok(())
    }

    /// Remove the override for `identity` at `layer` of `flag_key`.
    pub fn remove_override(
        &self,
        flag_key: &str,
        layer: OverrideLayer,
        identity: &str,
    ) -> Result<(), Error> {
        self.ensure_flag_exists(flag_key)?;
        if !self
            .store
            .delete_override(flag_key, layer, identity)
            .map_err(store_failure("delete override"))?
        {
            return Err(Error::OverrideNotFound {
                flag_key: flag_key.to_string(),
                layer,
                identity: identity.to_string(),
            });
        }
        self.cache.invalidate(flag_key);
        Ok(())
    }

    fn load(&self, flag_key: &str) -> Result<(FlagDefinition, OverrideSet), Error> {
        let (flag, overrides) = self.flag(flag_key)?;
        Ok((flag.definition, overrides))
    }

    fn ensure_flag_exists(&self, flag_key: &str) -> Result<FlagRecord, Error> {
        self.store
            .flag(flag_key)
            .map_err(store_failure("read flag"))?
            .ok_or_else(|| Error::FlagNotFound(flag_key.to_string()))
    }
}
