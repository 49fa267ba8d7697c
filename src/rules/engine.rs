use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::{Effects, Packet, SetKey, Verdict, WriteOutcome};
use crate::observability::{EngineMetrics, LogLimiter};
use crate::sets::{InsertOptions, StoreError, TestOptions};

use super::backoff::{Clock, MonotonicClock, DEFAULT_BACKOFF_INTERVAL};
use super::config::{Configuration, SetRef};
use super::map;
use super::sampling::{RandomSource, ThreadRandom};

/// Per-packet decision engine for set rules.
///
/// Stateless apart from its time and randomness sources; all per-rule state
/// lives in the rule's `Configuration`. Safe to share across threads.
pub struct Engine {
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    backoff_interval: Duration,
    metrics: Arc<EngineMetrics>,
    store_errors: LogLimiter,
}

impl Engine {
    pub fn new(metrics: Arc<EngineMetrics>) -> Self {
        Engine {
            clock: Arc::new(MonotonicClock::new()),
            random: Arc::new(ThreadRandom),
            backoff_interval: DEFAULT_BACKOFF_INTERVAL,
            metrics,
            store_errors: LogLimiter::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn with_backoff_interval(mut self, interval: Duration) -> Self {
        self.backoff_interval = interval;
        self
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    /// Run one packet through a rule.
    ///
    /// Store failures never abort evaluation: a failed test counts as no
    /// match, failed writes and deletes are dropped.
    pub fn evaluate(&self, packet: &mut Packet, config: &Configuration) -> Verdict {
        let mut effects = Effects::default();

        let add = config
            .add_set
            .as_ref()
            .map(|set| (set, self.derive_key(packet, set)));

        // Test phase
        let mut matched: Option<bool> = None;
        let mut should_write = true;
        if let Some((set, key)) = &add {
            if config.runs_test_phase() {
                let gated = TestOptions {
                    count_gt: config.packets_gt,
                    skip_counter_update: false,
                };
                let hit = key.as_ref().map_or(false, |k| self.test(set, k, &gated));
                effects.tested = Some(hit);
                matched = Some(hit);
                should_write = hit;

                if !config.mode.no_create {
                    should_write = true;
                } else if !hit && config.packets_gt.is_some() {
                    // Does the entry exist at all, regardless of its counter?
                    let exists_opts = TestOptions {
                        count_gt: None,
                        skip_counter_update: true,
                    };
                    let exists = key.as_ref().map_or(false, |k| self.test(set, k, &exists_opts));
                    effects.retested = Some(exists);
                    should_write = exists;
                }
            }
        }

        // Sampling, backoff and write
        if let Some((set, Some(key))) = &add {
            if should_write {
                effects.write = self.write(set, key, config);
            }
        }

        // Delete phase
        if matched.unwrap_or(true) {
            if let Some(del) = &config.del_set {
                if let Some(key) = self.derive_key(packet, del) {
                    match del.handle.remove(&key) {
                        Ok(()) => effects.deleted = true,
                        Err(e) => {
                            debug!(set = del.handle.name(), error = %e, "Delete ignored");
                        }
                    }
                }
            }
        }

        // Map phase, independent of the verdict
        if let Some(map_set) = &config.map_set {
            effects.mapped = self.apply_map(packet, map_set, config);
        }

        let matched = if config.mode.classify {
            matched.unwrap_or(true)
        } else {
            true
        };
        let matched = if config.mode.invert { !matched } else { matched };

        let verdict = Verdict::new(matched, effects);
        self.metrics.record_verdict(&verdict);
        verdict
    }

    fn derive_key(&self, packet: &Packet, set: &SetRef) -> Option<SetKey> {
        let key = packet.derive_key(set.roles());
        if key.is_none() {
            self.metrics.record_key_failure();
        }
        key
    }

    fn test(&self, set: &SetRef, key: &SetKey, opts: &TestOptions) -> bool {
        match set.handle.test(key, opts) {
            Ok(hit) => hit,
            Err(e) => {
                self.metrics.record_test_error();
                self.log_store_error(set, "test", &e);
                false
            }
        }
    }

    fn write(&self, set: &SetRef, key: &SetKey, config: &Configuration) -> WriteOutcome {
        if config.probability.is_sampling() && !config.probability.admits(self.random.next_u31()) {
            return WriteOutcome::SampledOut;
        }

        let now = self.clock.now_nanos();
        if config.backoff.is_active(now) {
            return WriteOutcome::BackedOff;
        }

        // The count threshold gates whether to write, never what is written
        let opts = InsertOptions {
            timeout: config.timeout.map(|t| t.min(set.handle.max_timeout())),
            overwrite_if_exists: true,
            annotation: config.mode.annotate.then_some(config.annotation),
        };

        match set.handle.insert(key, &opts) {
            Ok(()) => WriteOutcome::Written,
            Err(StoreError::CapacityExhausted) => {
                if config.backoff.engage(now, self.backoff_interval) {
                    self.metrics.record_backoff_engaged();
                    if let Some(suppressed) = self.store_errors.check() {
                        warn!(
                            set = set.handle.name(),
                            backoff_ms = self.backoff_interval.as_millis() as u64,
                            suppressed,
                            "Set is full, backing off inserts"
                        );
                    }
                }
                WriteOutcome::CapacityExhausted
            }
            Err(e) => {
                self.log_store_error(set, "insert", &e);
                WriteOutcome::Failed
            }
        }
    }

    fn apply_map(&self, packet: &mut Packet, set: &SetRef, config: &Configuration) -> bool {
        let Some(key) = self.derive_key(packet, set) else {
            return false;
        };

        match set.handle.lookup_map(&key) {
            Ok(Some(info)) => {
                map::apply(&mut packet.meta, packet.egress_tx_queues, &info, config.map);
                true
            }
            Ok(None) => false,
            Err(e) => {
                self.log_store_error(set, "map lookup", &e);
                false
            }
        }
    }

    fn log_store_error(&self, set: &SetRef, op: &'static str, err: &StoreError) {
        if let Some(suppressed) = self.store_errors.check() {
            warn!(
                set = set.handle.name(),
                op,
                error = %err,
                suppressed,
                "Set store call failed"
            );
        }
    }
}
