// src/sets/traits.rs
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::SetKey;

/// Largest entry lifetime, in seconds, a store can represent.
///
/// Matches the classic kernel limit of `(u32::MAX >> 1) / HZ` with HZ=1000.
pub const MAX_TIMEOUT_SECS: u32 = 2_147_483;

/// Identifier of a resolved set inside a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SetId(pub u32);

/// Errors reported by a set store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("set not found: {0}")]
    NotFound(String),

    #[error("set is full")]
    CapacityExhausted,

    #[error("element already exists")]
    AlreadyExists,

    #[error("element does not exist")]
    NoSuchElement,

    #[error("key has {got} fields, set expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("set {0} is referenced and cannot be destroyed")]
    InUse(String),

    #[error("store error: {0}")]
    Other(String),
}

/// Options for a membership test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestOptions {
    /// Only match entries whose hit counter is greater than this value
    pub count_gt: Option<u64>,

    /// Do not bump the hit counter of a matching entry
    pub skip_counter_update: bool,
}

/// Options for an insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOptions {
    /// Entry lifetime in seconds, `None` for no expiry
    pub timeout: Option<u32>,

    /// Refresh an existing entry instead of failing
    pub overwrite_if_exists: bool,

    /// Annotation byte stored with the entry
    pub annotation: Option<u8>,
}

/// Per-entry metadata used to remap packet fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapInfo {
    /// Mark value and mask: `mark = (mark & !mask) ^ value`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mark: Option<(u32, u32)>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<u16>,
}

/// Associative set storage used by set rules.
///
/// Implementations must be safe to call concurrently; the engine issues
/// independent calls and never relies on atomicity across them.
pub trait SetStore: Send + Sync {
    // Reference lifecycle (install/teardown only)
    fn resolve(&self, name: &str) -> Result<SetId, StoreError>;
    fn release(&self, id: SetId);

    /// Key dimension of a set, `None` if the store does not track it.
    fn dimension(&self, id: SetId) -> Option<usize>;

    // Per-packet operations
    fn test(&self, id: SetId, key: &SetKey, opts: &TestOptions) -> Result<bool, StoreError>;
    fn insert(&self, id: SetId, key: &SetKey, opts: &InsertOptions) -> Result<(), StoreError>;
    fn remove(&self, id: SetId, key: &SetKey) -> Result<(), StoreError>;
    fn lookup_map(&self, id: SetId, key: &SetKey) -> Result<Option<MapInfo>, StoreError>;

    /// Largest timeout this store can represent.
    fn max_timeout(&self) -> u32 {
        MAX_TIMEOUT_SECS
    }
}
