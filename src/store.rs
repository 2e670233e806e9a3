use crate::flag::{FlagRecord, FlagUpdate};
use crate::overrides::{OverrideLayer, OverrideSet};

/// The error type returned by [FlagStore] implementations.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// FlagStore is an interface for the persistent storage that holds flag definitions and their
/// overrides.
///
/// The crate does not ship a production implementation; callers adapt whatever database they use.
/// Implementations are shared between threads by [crate::FlagService], so mutation goes through
/// `&self`.
pub trait FlagStore {
    /// Retrieve the flag with key `flag_key`.
    fn flag(&self, flag_key: &str) -> Result<Option<FlagRecord>, StoreError>;

    /// Retrieve every stored flag, in no particular order.
    fn flags(&self) -> Result<Vec<FlagRecord>, StoreError>;

    /// Retrieve every override configured for the flag with key `flag_key`. A flag without
    /// overrides yields an empty set.
    fn overrides(&self, flag_key: &str) -> Result<OverrideSet, StoreError>;

    /// Store a new flag. Returns false without changing anything if a flag with the same key
    /// already exists.
    fn insert_flag(&self, flag: FlagRecord) -> Result<bool, StoreError>;

    /// Apply `update` to an existing flag and return the flag as stored afterwards, or None if
    /// there is no such flag.
    fn update_flag(
        &self,
        flag_key: &str,
        update: &FlagUpdate,
    ) -> Result<Option<FlagRecord>, StoreError>;

    /// Delete a flag together with all of its overrides. Returns false if there is no such flag.
    fn delete_flag(&self, flag_key: &str) -> Result<bool, StoreError>;

    /// Insert or replace the override for `identity` at `layer` of the flag `flag_key`, which is
    /// known to exist.
    fn upsert_override(
        &self,
        flag_key: &str,
        layer: OverrideLayer,
        identity: &str,
        enabled: bool,
    ) -> Result<(), StoreError>;

    /// Delete the override for `identity` at `layer` of the flag `flag_key`. Returns false if there
    /// was no such override.
    fn delete_override(
        &self,
        flag_key: &str,
        layer: OverrideLayer,
        identity: &str,
    ) -> Result<bool, StoreError>;
}
