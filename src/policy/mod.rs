pub mod hot_reload;
pub mod loader;

pub use hot_reload::RulesWatcher;
pub use loader::{build_store, load_rules, load_sets, LoaderError, RulesLoader, SetsFile};
