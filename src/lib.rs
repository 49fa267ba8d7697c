pub mod api;
pub mod config;
pub mod domain;
pub mod observability;
pub mod policy;
pub mod rules;
pub mod sets;

pub use config::Config;
pub use domain::{Packet, RuleDef, Verdict};
pub use rules::{Configuration, Engine, RuleSet};
pub use sets::{MemorySetStore, SetStore};
