// src/sets/mock.rs
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::domain::SetKey;

use super::traits::{InsertOptions, MapInfo, SetId, SetStore, StoreError, TestOptions};

/// A call observed by the mock store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Test { set: SetId, opts: TestOptions },
    Insert { set: SetId, opts: InsertOptions },
    Remove { set: SetId },
    LookupMap { set: SetId },
}

/// Entry held by the mock store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockEntry {
    pub packets: u64,
    pub timeout: Option<u32>,
    pub annotation: Option<u8>,
    pub map: Option<MapInfo>,
}

#[derive(Debug, Default)]
struct MockSet {
    name: String,
    dimension: Option<usize>,
    refs: usize,
    entries: HashMap<SetKey, MockEntry>,
}

/// Scripted set store for testing.
///
/// Hit counters are static: tests set them explicitly and the mock never
/// bumps them, so gating decisions stay predictable.
#[derive(Debug, Default)]
pub struct MockSetStore {
    sets: Mutex<Vec<MockSet>>,
    calls: Mutex<Vec<StoreCall>>,
    insert_error: Mutex<Option<StoreError>>,
    test_error: Mutex<Option<StoreError>>,
}

impl MockSetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty set that accepts keys of any dimension (for testing).
    pub fn add_set(&self, name: &str) -> SetId {
        self.push_set(name, None)
    }

    /// Create an empty set with a fixed key dimension (for testing).
    pub fn add_set_with_dimension(&self, name: &str, dimension: usize) -> SetId {
        self.push_set(name, Some(dimension))
    }

    fn push_set(&self, name: &str, dimension: Option<usize>) -> SetId {
        let mut sets = self.sets.lock();
        sets.push(MockSet {
            name: name.to_string(),
            dimension,
            ..Default::default()
        });
        SetId((sets.len() - 1) as u32)
    }

    /// Put an entry into a set (for testing).
    pub fn put(&self, set: &str, key: SetKey, entry: MockEntry) {
        let mut sets = self.sets.lock();
        if let Some(s) = sets.iter_mut().find(|s| s.name == set) {
            s.entries.insert(key, entry);
        }
    }

    /// Get an entry (for assertions).
    pub fn get(&self, set: &str, key: &SetKey) -> Option<MockEntry> {
        let sets = self.sets.lock();
        sets.iter()
            .find(|s| s.name == set)
            .and_then(|s| s.entries.get(key).cloned())
    }

    /// Number of entries in a set (for assertions).
    pub fn len(&self, set: &str) -> usize {
        let sets = self.sets.lock();
        sets.iter()
            .find(|s| s.name == set)
            .map(|s| s.entries.len())
            .unwrap_or(0)
    }

    /// Live reference count of a set (for assertions).
    pub fn refcount(&self, set: &str) -> usize {
        let sets = self.sets.lock();
        sets.iter()
            .find(|s| s.name == set)
            .map(|s| s.refs)
            .unwrap_or(0)
    }

    /// Make every following insert fail with `err`.
    pub fn fail_inserts(&self, err: Option<StoreError>) {
        *self.insert_error.lock() = err;
    }

    /// Make every following test fail with `err`.
    pub fn fail_tests(&self, err: Option<StoreError>) {
        *self.test_error.lock() = err;
    }

    /// Get recorded calls (for assertions).
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    /// Number of inserts issued so far.
    pub fn insert_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, StoreCall::Insert { .. }))
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

impl SetStore for MockSetStore {
    fn resolve(&self, name: &str) -> Result<SetId, StoreError> {
        let mut sets = self.sets.lock();
        match sets.iter_mut().enumerate().find(|(_, s)| s.name == name) {
            Some((idx, set)) => {
                set.refs += 1;
                Ok(SetId(idx as u32))
            }
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }

    fn release(&self, id: SetId) {
        if let Some(set) = self.sets.lock().get_mut(id.0 as usize) {
            set.refs = set.refs.saturating_sub(1);
        }
    }

    fn dimension(&self, id: SetId) -> Option<usize> {
        self.sets.lock().get(id.0 as usize).and_then(|s| s.dimension)
    }

    fn test(&self, id: SetId, key: &SetKey, opts: &TestOptions) -> Result<bool, StoreError> {
        self.calls.lock().push(StoreCall::Test { set: id, opts: *opts });
        if let Some(err) = self.test_error.lock().clone() {
            return Err(err);
        }

        let sets = self.sets.lock();
        let set = sets
            .get(id.0 as usize)
            .ok_or_else(|| StoreError::Other(format!("bad set id {}", id.0)))?;

        Ok(match set.entries.get(key) {
            Some(entry) => opts.count_gt.map_or(true, |gt| entry.packets > gt),
            None => false,
        })
    }

    fn insert(&self, id: SetId, key: &SetKey, opts: &InsertOptions) -> Result<(), StoreError> {
        self.calls.lock().push(StoreCall::Insert { set: id, opts: *opts });
        if let Some(err) = self.insert_error.lock().clone() {
            return Err(err);
        }

        let mut sets = self.sets.lock();
        let set = sets
            .get_mut(id.0 as usize)
            .ok_or_else(|| StoreError::Other(format!("bad set id {}", id.0)))?;

        match set.entries.get_mut(key) {
            Some(_) if !opts.overwrite_if_exists => Err(StoreError::AlreadyExists),
            Some(entry) => {
                entry.timeout = opts.timeout;
                entry.annotation = opts.annotation;
                Ok(())
            }
            None => {
                set.entries.insert(
                    key.clone(),
                    MockEntry {
                        timeout: opts.timeout,
                        annotation: opts.annotation,
                        ..Default::default()
                    },
                );
                Ok(())
            }
        }
    }

    fn remove(&self, id: SetId, key: &SetKey) -> Result<(), StoreError> {
        self.calls.lock().push(StoreCall::Remove { set: id });

        let mut sets = self.sets.lock();
        let set = sets
            .get_mut(id.0 as usize)
            .ok_or_else(|| StoreError::Other(format!("bad set id {}", id.0)))?;

        set.entries
            .remove(key)
            .map(|_| ())
            .ok_or(StoreError::NoSuchElement)
    }

    fn lookup_map(&self, id: SetId, key: &SetKey) -> Result<Option<MapInfo>, StoreError> {
        self.calls.lock().push(StoreCall::LookupMap { set: id });

        let sets = self.sets.lock();
        Ok(sets
            .get(id.0 as usize)
            .and_then(|s| s.entries.get(key))
            .map(|e| e.map.unwrap_or_default()))
    }
}
