use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::domain::{Verdict, WriteOutcome};

/// Counters for the set engine.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Packets run through a rule
    pub packets_total: AtomicU64,
    /// Verdicts that matched (after inversion)
    pub packets_matched: AtomicU64,

    /// Add-set tests, including no-create re-tests
    pub tests_total: AtomicU64,
    pub test_errors: AtomicU64,

    /// Packets whose fields could not be projected onto a set key
    pub key_derivation_failures: AtomicU64,

    /// Write path outcomes
    pub writes_sampled_out: AtomicU64,
    pub writes_backed_off: AtomicU64,
    pub inserts_total: AtomicU64,
    pub insert_errors: AtomicU64,
    pub insert_capacity_errors: AtomicU64,
    pub backoff_engaged: AtomicU64,

    pub deletes_total: AtomicU64,
    pub map_hits: AtomicU64,

    /// Evaluation latency buckets
    pub latency_under_1us: AtomicU64,
    pub latency_1_10us: AtomicU64,
    pub latency_10_100us: AtomicU64,
    pub latency_over_100us: AtomicU64,

    /// Rule reloads
    pub rule_reloads_total: AtomicU64,
    pub rule_reload_errors: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        EngineMetrics::default()
    }

    /// Record the outcome of one packet evaluation.
    pub fn record_verdict(&self, verdict: &Verdict) {
        self.packets_total.fetch_add(1, Ordering::Relaxed);
        if verdict.matched {
            self.packets_matched.fetch_add(1, Ordering::Relaxed);
        }

        let effects = &verdict.effects;
        if effects.tested.is_some() {
            self.tests_total.fetch_add(1, Ordering::Relaxed);
        }
        if effects.retested.is_some() {
            self.tests_total.fetch_add(1, Ordering::Relaxed);
        }

        match effects.write {
            WriteOutcome::Skipped => {}
            WriteOutcome::SampledOut => {
                self.writes_sampled_out.fetch_add(1, Ordering::Relaxed);
            }
            WriteOutcome::BackedOff => {
                self.writes_backed_off.fetch_add(1, Ordering::Relaxed);
            }
            WriteOutcome::Written => {
                self.inserts_total.fetch_add(1, Ordering::Relaxed);
            }
            WriteOutcome::Failed => {
                self.inserts_total.fetch_add(1, Ordering::Relaxed);
                self.insert_errors.fetch_add(1, Ordering::Relaxed);
            }
            WriteOutcome::CapacityExhausted => {
                self.inserts_total.fetch_add(1, Ordering::Relaxed);
                self.insert_capacity_errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        if effects.deleted {
            self.deletes_total.fetch_add(1, Ordering::Relaxed);
        }
        if effects.mapped {
            self.map_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_test_error(&self) {
        self.test_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_key_failure(&self) {
        self.key_derivation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backoff_engaged(&self) {
        self.backoff_engaged.fetch_add(1, Ordering::Relaxed);
    }

    /// Record evaluation latency.
    pub fn record_latency(&self, start: Instant) {
        let nanos = start.elapsed().as_nanos() as u64;

        if nanos < 1_000 {
            self.latency_under_1us.fetch_add(1, Ordering::Relaxed);
        } else if nanos < 10_000 {
            self.latency_1_10us.fetch_add(1, Ordering::Relaxed);
        } else if nanos < 100_000 {
            self.latency_10_100us.fetch_add(1, Ordering::Relaxed);
        } else {
            self.latency_over_100us.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a rule reload.
    pub fn record_rule_reload(&self, success: bool) {
        self.rule_reloads_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.rule_reload_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        format!(
            r#"# HELP setset_packets_total Packets evaluated by set rules
# TYPE setset_packets_total counter
setset_packets_total {}

# HELP setset_packets_matched_total Packets whose final verdict matched
# TYPE setset_packets_matched_total counter
setset_packets_matched_total {}

# HELP setset_tests_total Add-set membership tests issued
# TYPE setset_tests_total counter
setset_tests_total {}

# HELP setset_test_errors_total Add-set tests that failed in the store
# TYPE setset_test_errors_total counter
setset_test_errors_total {}

# HELP setset_key_derivation_failures_total Packets too short for a set key
# TYPE setset_key_derivation_failures_total counter
setset_key_derivation_failures_total {}

# HELP setset_writes_skipped_total Writes not attempted, by reason
# TYPE setset_writes_skipped_total counter
setset_writes_skipped_total{{reason="sampled_out"}} {}
setset_writes_skipped_total{{reason="backoff"}} {}

# HELP setset_inserts_total Inserts issued to the store
# TYPE setset_inserts_total counter
setset_inserts_total {}

# HELP setset_insert_errors_total Failed inserts, by kind
# TYPE setset_insert_errors_total counter
setset_insert_errors_total{{kind="capacity"}} {}
setset_insert_errors_total{{kind="other"}} {}

# HELP setset_backoff_engaged_total Backoff windows opened after a full set
# TYPE setset_backoff_engaged_total counter
setset_backoff_engaged_total {}

# HELP setset_deletes_total Entries removed from del-sets
# TYPE setset_deletes_total counter
setset_deletes_total {}

# HELP setset_map_hits_total Packets whose metadata was remapped
# TYPE setset_map_hits_total counter
setset_map_hits_total {}

# HELP setset_evaluate_latency_bucket Evaluation latency histogram
# TYPE setset_evaluate_latency_bucket counter
setset_evaluate_latency_bucket{{le="0.000001"}} {}
setset_evaluate_latency_bucket{{le="0.00001"}} {}
setset_evaluate_latency_bucket{{le="0.0001"}} {}
setset_evaluate_latency_bucket{{le="+Inf"}} {}

# HELP setset_rule_reloads_total Rule file reloads
# TYPE setset_rule_reloads_total counter
setset_rule_reloads_total {}

# HELP setset_rule_reload_errors_total Rule file reload errors
# TYPE setset_rule_reload_errors_total counter
setset_rule_reload_errors_total {}
"#,
            self.packets_total.load(Ordering::Relaxed),
            self.packets_matched.load(Ordering::Relaxed),
            self.tests_total.load(Ordering::Relaxed),
            self.test_errors.load(Ordering::Relaxed),
            self.key_derivation_failures.load(Ordering::Relaxed),
            self.writes_sampled_out.load(Ordering::Relaxed),
            self.writes_backed_off.load(Ordering::Relaxed),
            self.inserts_total.load(Ordering::Relaxed),
            self.insert_capacity_errors.load(Ordering::Relaxed),
            self.insert_errors.load(Ordering::Relaxed),
            self.backoff_engaged.load(Ordering::Relaxed),
            self.deletes_total.load(Ordering::Relaxed),
            self.map_hits.load(Ordering::Relaxed),
            self.latency_under_1us.load(Ordering::Relaxed),
            self.latency_1_10us.load(Ordering::Relaxed),
            self.latency_10_100us.load(Ordering::Relaxed),
            self.latency_over_100us.load(Ordering::Relaxed),
            self.rule_reloads_total.load(Ordering::Relaxed),
            self.rule_reload_errors.load(Ordering::Relaxed),
        )
    }
}

/// Guard for timing operations.
pub struct TimingGuard<'a> {
    metrics: &'a EngineMetrics,
    start: Instant,
}

impl<'a> TimingGuard<'a> {
    pub fn new(metrics: &'a EngineMetrics) -> Self {
        TimingGuard {
            metrics,
            start: Instant::now(),
        }
    }
}

impl<'a> Drop for TimingGuard<'a> {
    fn drop(&mut self) {
        self.metrics.record_latency(self.start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Effects, Verdict};

    #[test]
    fn test_record_verdict() {
        let metrics = EngineMetrics::new();

        metrics.record_verdict(&Verdict::new(
            true,
            Effects {
                tested: Some(false),
                retested: Some(true),
                write: WriteOutcome::Written,
                ..Default::default()
            },
        ));
        metrics.record_verdict(&Verdict::new(
            false,
            Effects {
                write: WriteOutcome::CapacityExhausted,
                deleted: true,
                ..Default::default()
            },
        ));

        assert_eq!(metrics.packets_total.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.packets_matched.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.tests_total.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.inserts_total.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.insert_capacity_errors.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.deletes_total.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_timing_guard() {
        let metrics = EngineMetrics::new();
        {
            let _guard = TimingGuard::new(&metrics);
        }

        let total = metrics.latency_under_1us.load(Ordering::Relaxed)
            + metrics.latency_1_10us.load(Ordering::Relaxed)
            + metrics.latency_10_100us.load(Ordering::Relaxed)
            + metrics.latency_over_100us.load(Ordering::Relaxed);
        assert_eq!(total, 1);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = EngineMetrics::new();
        metrics.record_verdict(&Verdict::new(
            true,
            Effects {
                write: WriteOutcome::SampledOut,
                ..Default::default()
            },
        ));

        let output = metrics.to_prometheus();

        assert!(output.contains("setset_packets_total 1"));
        assert!(output.contains("setset_writes_skipped_total{reason=\"sampled_out\"} 1"));
        assert!(output.contains("setset_inserts_total 0"));
    }
}
