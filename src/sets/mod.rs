// src/sets/mod.rs
pub mod handle;
pub mod memory;
pub mod traits;

#[cfg(test)]
pub mod mock;

pub use handle::SetHandle;
pub use memory::{EntrySnapshot, MemorySetStore, SetSpec, SetSummary};
pub use traits::{
    InsertOptions, MapInfo, SetId, SetStore, StoreError, TestOptions, MAX_TIMEOUT_SECS,
};
