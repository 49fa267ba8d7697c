use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{Hook, Probability, RuleDef, SetTarget, Table, MAX_DIMENSION};
use crate::sets::{SetHandle, SetStore, StoreError};

use super::backoff::Backoff;
use super::config::{Configuration, InsertFlags, MapFlags, Mode, SetRef};

/// Which of a rule's set references an error concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetRole {
    Add,
    Del,
    Map,
}

impl fmt::Display for SetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetRole::Add => write!(f, "add_set"),
            SetRole::Del => write!(f, "del_set"),
            SetRole::Map => write!(f, "map_set"),
        }
    }
}

/// Errors that reject a rule at install time.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot find {role} {name}: {source}")]
    UnknownSet {
        role: SetRole,
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("{role} dimension {dimension} out of range 1..={max}", max = MAX_DIMENSION)]
    DimensionOutOfRange { role: SetRole, dimension: usize },

    #[error("{role} {name} has dimension {set}, rule uses {rule}")]
    DimensionMismatch {
        role: SetRole,
        name: String,
        rule: usize,
        set: usize,
    },

    #[error("timeout {0} out of range 0..={max}", max = u32::MAX - 1)]
    TimeoutOutOfRange(u32),

    #[error("one of add_set, del_set or map_set is required")]
    MissingAction,

    #[error("invalid option combination: {0}")]
    InvalidModeCombination(String),

    #[error("invalid install context: {0}")]
    InvalidContext(String),
}

/// Validate a rule definition and resolve its sets.
///
/// On success the returned configuration holds one reference on every set
/// it names. On failure every reference taken so far has been released.
pub fn validate(def: &RuleDef, store: &Arc<dyn SetStore>) -> Result<Configuration, ConfigError> {
    if def.add_set.is_none() && def.del_set.is_none() && def.map_set.is_none() {
        return Err(ConfigError::MissingAction);
    }

    check_add_only_options(def)?;
    check_map_options(def)?;

    // u32::MAX is reserved for "no timeout"
    if let Some(timeout @ u32::MAX) = def.timeout {
        return Err(ConfigError::TimeoutOutOfRange(timeout));
    }

    for (role, target) in [
        (SetRole::Add, &def.add_set),
        (SetRole::Del, &def.del_set),
        (SetRole::Map, &def.map_set),
    ] {
        if let Some(target) = target {
            let dimension = target.dirs.dimension();
            if dimension == 0 || dimension > MAX_DIMENSION {
                return Err(ConfigError::DimensionOutOfRange { role, dimension });
            }
        }
    }

    // Handles already acquired drop, and release, if a later one fails
    let add_set = resolve(store, SetRole::Add, def.add_set.as_ref())?;
    let del_set = resolve(store, SetRole::Del, def.del_set.as_ref())?;
    let map_set = resolve(store, SetRole::Map, def.map_set.as_ref())?;

    let config = Configuration {
        add_set,
        del_set,
        map_set,
        insert_flags: InsertFlags {
            overwrite_existing: def.exist,
        },
        timeout: def.timeout,
        mode: Mode {
            classify: def.classify,
            invert: def.invert,
            no_create: def.nocreate,
            annotate: def.flag.is_some(),
        },
        probability: def.probability.unwrap_or(Probability::ALWAYS),
        // A zero threshold disables the gate
        packets_gt: def.packets_gt.filter(|&n| n > 0),
        annotation: def.flag.unwrap_or(0),
        map: MapFlags {
            mark: def.map_mark,
            priority: def.map_prio,
            queue: def.map_queue,
        },
        backoff: Backoff::inactive(),
    };

    info!(rule_id = %def.id, "Validated set rule");
    Ok(config)
}

fn resolve(
    store: &Arc<dyn SetStore>,
    role: SetRole,
    target: Option<&SetTarget>,
) -> Result<Option<SetRef>, ConfigError> {
    let Some(target) = target else {
        return Ok(None);
    };

    let handle = SetHandle::acquire(store.clone(), &target.name).map_err(|source| {
        ConfigError::UnknownSet {
            role,
            name: target.name.clone(),
            source,
        }
    })?;

    let dimension = target.dirs.dimension();
    if let Some(set) = handle.dimension().filter(|&d| d != dimension) {
        return Err(ConfigError::DimensionMismatch {
            role,
            name: target.name.clone(),
            rule: dimension,
            set,
        });
    }

    debug!(role = %role, set = %target.name, "Resolved set reference");
    Ok(Some(SetRef {
        handle,
        roles: target.dirs.clone(),
    }))
}

fn check_add_only_options(def: &RuleDef) -> Result<(), ConfigError> {
    if def.add_set.is_some() {
        return Ok(());
    }

    let mut offending = Vec::new();
    if def.exist {
        offending.push("exist");
    }
    if def.timeout.is_some() {
        offending.push("timeout");
    }
    if def.classify {
        offending.push("match");
    }
    if def.nocreate {
        offending.push("nocreate");
    }
    if def.probability.is_some_and(|p| p.is_sampling()) {
        offending.push("probability");
    }
    if def.packets_gt.is_some() {
        offending.push("packets_gt");
    }
    if def.flag.is_some() {
        offending.push("flag");
    }

    if offending.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::InvalidModeCombination(format!(
            "{} can be used with add_set only",
            offending.join(", ")
        )))
    }
}

fn check_map_options(def: &RuleDef) -> Result<(), ConfigError> {
    let wants_map = def.map_mark || def.map_prio || def.map_queue;

    if def.map_set.is_none() {
        if wants_map {
            return Err(ConfigError::InvalidModeCombination(
                "map_mark, map_prio and map_queue can be used with map_set only".to_string(),
            ));
        }
        return Ok(());
    }

    if def.table != Table::Mangle {
        return Err(ConfigError::InvalidContext(
            "map_set only usable from the mangle table".to_string(),
        ));
    }

    if def.map_prio || def.map_queue {
        let allowed = [Hook::Forward, Hook::LocalOut, Hook::PostRouting];
        if def.hooks.iter().any(|h| !allowed.contains(h)) {
            return Err(ConfigError::InvalidContext(
                "mapping of prio or queue is allowed only from FORWARD, LOCAL_OUT or POST_ROUTING"
                    .to_string(),
            ));
        }
    }

    Ok(())
}
