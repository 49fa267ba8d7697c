use std::fmt;
use std::sync::Arc;

use crate::domain::SetKey;

use super::traits::{InsertOptions, MapInfo, SetId, SetStore, StoreError, TestOptions};

/// Owned reference to a resolved set.
///
/// Holds one store reference for its whole life and releases it exactly once
/// on drop, so a set cannot be destroyed while a rule still points at it.
pub struct SetHandle {
    store: Arc<dyn SetStore>,
    id: SetId,
    name: String,
}

impl SetHandle {
    /// Resolve a set by name, taking a reference on it.
    pub fn acquire(store: Arc<dyn SetStore>, name: &str) -> Result<Self, StoreError> {
        let id = store.resolve(name)?;
        Ok(SetHandle {
            store,
            id,
            name: name.to_string(),
        })
    }

    pub fn id(&self) -> SetId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key dimension of the underlying set, if the store knows it.
    pub fn dimension(&self) -> Option<usize> {
        self.store.dimension(self.id)
    }

    pub fn max_timeout(&self) -> u32 {
        self.store.max_timeout()
    }

    #[inline]
    pub fn test(&self, key: &SetKey, opts: &TestOptions) -> Result<bool, StoreError> {
        self.store.test(self.id, key, opts)
    }

    #[inline]
    pub fn insert(&self, key: &SetKey, opts: &InsertOptions) -> Result<(), StoreError> {
        self.store.insert(self.id, key, opts)
    }

    #[inline]
    pub fn remove(&self, key: &SetKey) -> Result<(), StoreError> {
        self.store.remove(self.id, key)
    }

    #[inline]
    pub fn lookup_map(&self, key: &SetKey) -> Result<Option<MapInfo>, StoreError> {
        self.store.lookup_map(self.id, key)
    }
}

impl Drop for SetHandle {
    fn drop(&mut self) {
        self.store.release(self.id);
    }
}

impl fmt::Debug for SetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}
