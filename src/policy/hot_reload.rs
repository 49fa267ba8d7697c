use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::observability::EngineMetrics;
use crate::rules::RuleSet;

use super::loader::{LoaderError, RulesLoader};

/// Shortest reload check interval; `tokio::time::interval` rejects zero.
const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(1);

/// Watch the rules file and publish rebuilt rule sets.
pub struct RulesWatcher {
    loader: RulesLoader,
    check_interval: Duration,
    metrics: Arc<EngineMetrics>,
    last_version: Option<String>,
}

impl RulesWatcher {
    pub fn new(
        loader: RulesLoader,
        check_interval: Duration,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        RulesWatcher {
            loader,
            check_interval: check_interval.max(MIN_CHECK_INTERVAL),
            metrics,
            last_version: None,
        }
    }

    /// Start watching for rule changes.
    ///
    /// Returns a receiver that always holds the current rule set. A file
    /// that fails to load or validate leaves the current rules in place.
    pub fn start(mut self) -> (watch::Receiver<Arc<RuleSet>>, tokio::task::JoinHandle<()>) {
        let initial = match self.loader.load(None) {
            Ok(ruleset) => {
                info!(
                    version = %ruleset.version,
                    rules = ruleset.len(),
                    "Loaded initial rules"
                );
                self.last_version = Some(ruleset.version.clone());
                Arc::new(ruleset)
            }
            Err(e) => {
                error!(
                    path = %self.loader.rules_path().display(),
                    error = %e,
                    "Failed to load initial rules"
                );
                Arc::new(RuleSet::empty())
            }
        };

        let (tx, rx) = watch::channel(initial);

        let handle = tokio::spawn(async move {
            let mut interval = interval(self.check_interval);

            loop {
                interval.tick().await;

                match self.check_for_updates(&tx) {
                    Ok(true) => {
                        self.metrics.record_rule_reload(true);
                        info!("Rules reloaded successfully");
                    }
                    Ok(false) => {}
                    Err(e) => {
                        self.metrics.record_rule_reload(false);
                        warn!(error = %e, "Error checking for rule updates");
                    }
                }
            }
        });

        (rx, handle)
    }

    /// Reload and publish if the ruleset version changed.
    fn check_for_updates(
        &mut self,
        tx: &watch::Sender<Arc<RuleSet>>,
    ) -> Result<bool, LoaderError> {
        let file = self.loader.load_file()?;

        if self.last_version.as_ref() == Some(&file.version) {
            return Ok(false);
        }

        let current = tx.borrow().clone();
        let ruleset = self.loader.load(Some(&current))?;

        info!(
            from = ?self.last_version,
            to = %ruleset.version,
            "Ruleset version changed"
        );

        self.last_version = Some(ruleset.version.clone());
        let _ = tx.send(Arc::new(ruleset));

        Ok(true)
    }
}
