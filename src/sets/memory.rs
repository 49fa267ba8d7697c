use ahash::{AHashMap, RandomState};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::domain::packet::format_key;
use crate::domain::{SetKey, MAX_DIMENSION};

use super::traits::{InsertOptions, MapInfo, SetId, SetStore, StoreError, TestOptions};

/// Default capacity of a set when none is configured.
const DEFAULT_MAX_ENTRIES: usize = 65536;

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

/// Definition of a set, as read from the sets file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetSpec {
    pub name: String,

    /// Number of key fields
    pub dimension: usize,

    /// Capacity; inserts of new keys fail once reached
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl SetSpec {
    pub fn new(name: impl Into<String>, dimension: usize, max_entries: usize) -> Self {
        SetSpec {
            name: name.into(),
            dimension,
            max_entries,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    expires_at: Option<Instant>,
    packets: u64,
    annotation: Option<u8>,
    map: Option<MapInfo>,
    added_at: DateTime<Utc>,
}

impl Entry {
    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }
}

fn expiry(timeout: Option<u32>, now: Instant) -> Option<Instant> {
    // A zero timeout means the entry is permanent
    match timeout {
        Some(0) | None => None,
        Some(secs) => Some(now + Duration::from_secs(u64::from(secs))),
    }
}

struct MemorySet {
    spec: SetSpec,
    refs: AtomicUsize,
    entries: Mutex<HashMap<SetKey, Entry, RandomState>>,
}

impl MemorySet {
    fn new(spec: SetSpec) -> Self {
        MemorySet {
            spec,
            refs: AtomicUsize::new(0),
            entries: Mutex::new(HashMap::default()),
        }
    }

    fn check_key(&self, key: &SetKey) -> Result<(), StoreError> {
        if key.len() != self.spec.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.spec.dimension,
                got: key.len(),
            });
        }
        Ok(())
    }
}

/// Summary of one set.
#[derive(Debug, Clone, Serialize)]
pub struct SetSummary {
    pub name: String,
    pub dimension: usize,
    pub max_entries: usize,
    pub entries: usize,
    pub references: usize,
}

/// Point-in-time copy of one entry.
#[derive(Debug, Clone, Serialize)]
pub struct EntrySnapshot {
    pub key: String,
    pub packets: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<MapInfo>,
    pub added_at: DateTime<Utc>,
}

/// In-memory set store.
///
/// Sets are addressed by a stable slot index; each set guards its entries
/// with its own mutex so that traffic against different sets never contends.
#[derive(Default)]
pub struct MemorySetStore {
    names: RwLock<AHashMap<String, SetId>>,
    slots: RwLock<Vec<Option<Arc<MemorySet>>>>,
}

impl MemorySetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with the given sets.
    pub fn with_sets(specs: impl IntoIterator<Item = SetSpec>) -> Result<Self, StoreError> {
        let store = Self::new();
        for spec in specs {
            store.create_set(spec)?;
        }
        Ok(store)
    }

    /// Create a new empty set.
    pub fn create_set(&self, spec: SetSpec) -> Result<SetId, StoreError> {
        if spec.dimension == 0 || spec.dimension > MAX_DIMENSION {
            return Err(StoreError::Other(format!(
                "set {} has invalid dimension {}",
                spec.name, spec.dimension
            )));
        }

        let mut names = self.names.write();
        if names.contains_key(&spec.name) {
            return Err(StoreError::AlreadyExists);
        }

        let mut slots = self.slots.write();
        let name = spec.name.clone();
        let set = Some(Arc::new(MemorySet::new(spec)));

        // Reuse a freed slot if there is one
        let id = match slots.iter().position(|s| s.is_none()) {
            Some(idx) => {
                slots[idx] = set;
                SetId(idx as u32)
            }
            None => {
                slots.push(set);
                SetId((slots.len() - 1) as u32)
            }
        };

        info!(set = %name, id = id.0, "Created set");
        names.insert(name, id);
        Ok(id)
    }

    /// Destroy a set. Fails while any rule holds a reference on it.
    pub fn destroy_set(&self, name: &str) -> Result<(), StoreError> {
        let mut names = self.names.write();
        let id = *names
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;

        let mut slots = self.slots.write();
        if let Some(Some(set)) = slots.get(id.0 as usize) {
            if set.refs.load(Ordering::Acquire) > 0 {
                return Err(StoreError::InUse(name.to_string()));
            }
        }

        slots[id.0 as usize] = None;
        names.remove(name);
        info!(set = %name, "Destroyed set");
        Ok(())
    }

    /// Add an entry directly, optionally carrying map info.
    pub fn add_entry(
        &self,
        name: &str,
        key: SetKey,
        timeout: Option<u32>,
        map: Option<MapInfo>,
    ) -> Result<(), StoreError> {
        let set = self.by_name(name)?;
        set.check_key(&key)?;

        let now = Instant::now();
        let mut entries = set.entries.lock();
        if !entries.contains_key(&key) && entries.len() >= set.spec.max_entries {
            return Err(StoreError::CapacityExhausted);
        }

        entries.insert(
            key,
            Entry {
                expires_at: expiry(timeout, now),
                packets: 0,
                annotation: None,
                map,
                added_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// List every set.
    pub fn list(&self) -> Vec<SetSummary> {
        let slots = self.slots.read();
        let mut out: Vec<SetSummary> = slots
            .iter()
            .flatten()
            .map(|set| SetSummary {
                name: set.spec.name.clone(),
                dimension: set.spec.dimension,
                max_entries: set.spec.max_entries,
                entries: set.entries.lock().len(),
                references: set.refs.load(Ordering::Relaxed),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Snapshot the live entries of a set.
    pub fn entries(&self, name: &str) -> Result<Vec<EntrySnapshot>, StoreError> {
        let set = self.by_name(name)?;
        let now = Instant::now();

        let entries = set.entries.lock();
        let mut out: Vec<EntrySnapshot> = entries
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(key, e)| EntrySnapshot {
                key: format_key(key),
                packets: e.packets,
                expires_in_secs: e.expires_at.map(|at| at.duration_since(now).as_secs()),
                annotation: e.annotation,
                map: e.map,
                added_at: e.added_at,
            })
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    /// Number of live entries in a set.
    pub fn len(&self, name: &str) -> Result<usize, StoreError> {
        let set = self.by_name(name)?;
        let now = Instant::now();
        let entries = set.entries.lock();
        Ok(entries.values().filter(|e| !e.is_expired(now)).count())
    }

    /// Drop expired entries from every set.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    /// Drop entries that are expired as of `now`.
    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let slots = self.slots.read();
        let mut purged = 0;

        for set in slots.iter().flatten() {
            let mut entries = set.entries.lock();
            let before = entries.len();
            entries.retain(|_, e| !e.is_expired(now));
            purged += before - entries.len();
        }

        if purged > 0 {
            debug!(purged, "Purged expired set entries");
        }
        purged
    }

    fn by_name(&self, name: &str) -> Result<Arc<MemorySet>, StoreError> {
        let id = *self
            .names
            .read()
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        self.by_id(id)
    }

    #[inline]
    fn by_id(&self, id: SetId) -> Result<Arc<MemorySet>, StoreError> {
        self.slots
            .read()
            .get(id.0 as usize)
            .and_then(|s| s.clone())
            .ok_or_else(|| StoreError::NotFound(format!("#{}", id.0)))
    }
}

impl SetStore for MemorySetStore {
    fn resolve(&self, name: &str) -> Result<SetId, StoreError> {
        let names = self.names.read();
        let id = *names
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;

        // Names lock held so the set cannot be destroyed in between
        let set = self.by_id(id)?;
        set.refs.fetch_add(1, Ordering::AcqRel);
        Ok(id)
    }

    fn release(&self, id: SetId) {
        if let Ok(set) = self.by_id(id) {
            let _ = set
                .refs
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| r.checked_sub(1));
        }
    }

    fn dimension(&self, id: SetId) -> Option<usize> {
        self.by_id(id).ok().map(|s| s.spec.dimension)
    }

    fn test(&self, id: SetId, key: &SetKey, opts: &TestOptions) -> Result<bool, StoreError> {
        let set = self.by_id(id)?;
        set.check_key(key)?;

        let now = Instant::now();
        let mut entries = set.entries.lock();
        match entries.get(key).map(|e| e.is_expired(now)) {
            None => return Ok(false),
            Some(true) => {
                entries.remove(key);
                return Ok(false);
            }
            Some(false) => {}
        }
        let Some(entry) = entries.get_mut(key) else {
            return Ok(false);
        };

        if !opts.skip_counter_update {
            entry.packets = entry.packets.saturating_add(1);
        }

        Ok(opts.count_gt.map_or(true, |gt| entry.packets > gt))
    }

    fn insert(&self, id: SetId, key: &SetKey, opts: &InsertOptions) -> Result<(), StoreError> {
        let set = self.by_id(id)?;
        set.check_key(key)?;

        let now = Instant::now();
        let mut entries = set.entries.lock();

        if let Some(entry) = entries.get_mut(key) {
            if !entry.is_expired(now) {
                if !opts.overwrite_if_exists {
                    return Err(StoreError::AlreadyExists);
                }
                entry.expires_at = expiry(opts.timeout, now);
                entry.annotation = opts.annotation;
                return Ok(());
            }
            entries.remove(key);
        }

        if entries.len() >= set.spec.max_entries {
            entries.retain(|_, e| !e.is_expired(now));
            if entries.len() >= set.spec.max_entries {
                return Err(StoreError::CapacityExhausted);
            }
        }

        entries.insert(
            key.clone(),
            Entry {
                expires_at: expiry(opts.timeout, now),
                packets: 0,
                annotation: opts.annotation,
                map: None,
                added_at: Utc::now(),
            },
        );
        Ok(())
    }

    fn remove(&self, id: SetId, key: &SetKey) -> Result<(), StoreError> {
        let set = self.by_id(id)?;
        set.check_key(key)?;

        let now = Instant::now();
        let removed = set.entries.lock().remove(key);
        match removed {
            Some(e) if !e.is_expired(now) => Ok(()),
            _ => Err(StoreError::NoSuchElement),
        }
    }

    fn lookup_map(&self, id: SetId, key: &SetKey) -> Result<Option<MapInfo>, StoreError> {
        let set = self.by_id(id)?;
        set.check_key(key)?;

        let now = Instant::now();
        let entries = set.entries.lock();
        Ok(entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.map.unwrap_or_default()))
    }
}
