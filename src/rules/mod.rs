pub mod backoff;
pub mod config;
pub mod engine;
pub mod map;
pub mod render;
pub mod sampling;
pub mod validate;

pub use backoff::{Backoff, Clock, MonotonicClock, DEFAULT_BACKOFF_INTERVAL};
pub use config::{Configuration, InsertFlags, MapFlags, Mode, SetRef};
pub use engine::Engine;
pub use sampling::{RandomSource, SeededRandom, ThreadRandom};
pub use validate::{validate, ConfigError, SetRole};

use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::domain::{RuleDef, RulesFile};
use crate::sets::SetStore;

/// Errors building a rule set.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("duplicate rule id: {0}")]
    DuplicateId(String),

    #[error("rule {id}: {source}")]
    Invalid {
        id: String,
        #[source]
        source: ConfigError,
    },
}

/// One installed rule: its raw definition and validated configuration.
#[derive(Debug)]
pub struct SetRule {
    pub def: RuleDef,
    pub config: Configuration,
}

impl SetRule {
    /// Validate a definition against the store.
    pub fn install(def: RuleDef, store: &Arc<dyn SetStore>) -> Result<Self, ConfigError> {
        let config = validate(&def, store)?;
        Ok(SetRule { def, config })
    }

    pub fn id(&self) -> &str {
        &self.def.id
    }
}

/// Ordered collection of installed rules.
pub struct RuleSet {
    pub rules: Vec<Arc<SetRule>>,
    pub version: String,
}

impl RuleSet {
    /// Build rules from a rules file.
    ///
    /// Rules whose definition is unchanged from `previous` are carried over
    /// as-is, keeping their set references and backoff state.
    pub fn from_file(
        file: &RulesFile,
        store: &Arc<dyn SetStore>,
        previous: Option<&RuleSet>,
    ) -> Result<Self, RuleError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(file.rules.len());

        for def in &file.rules {
            if !seen.insert(def.id.as_str()) {
                return Err(RuleError::DuplicateId(def.id.clone()));
            }

            let carried = previous
                .and_then(|p| p.get(&def.id))
                .filter(|rule| rule.def == *def);

            let rule = match carried {
                Some(rule) => {
                    debug!(rule_id = %def.id, "Keeping unchanged rule");
                    rule.clone()
                }
                None => Arc::new(SetRule::install(def.clone(), store).map_err(|source| {
                    RuleError::Invalid {
                        id: def.id.clone(),
                        source,
                    }
                })?),
            };
            rules.push(rule);
        }

        Ok(RuleSet {
            rules,
            version: file.version.clone(),
        })
    }

    /// Create an empty rule set.
    pub fn empty() -> Self {
        RuleSet {
            rules: Vec::new(),
            version: "0".to_string(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<SetRule>> {
        self.rules.iter().find(|r| r.id() == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
