use serde::Serialize;

/// What happened to the add-set write for one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    /// No add-set, or the test phase decided not to write
    Skipped,
    /// Sampling gate rejected the packet
    SampledOut,
    /// A backoff window was active
    BackedOff,
    /// Entry created or refreshed
    Written,
    /// Store rejected the write for a reason other than capacity
    Failed,
    /// Store was full; a backoff window was opened
    CapacityExhausted,
}

impl WriteOutcome {
    /// Returns true if an insert was actually issued to the store.
    #[inline]
    pub fn attempted(&self) -> bool {
        matches!(
            self,
            WriteOutcome::Written | WriteOutcome::Failed | WriteOutcome::CapacityExhausted
        )
    }
}

/// Side effects performed while evaluating one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Effects {
    /// Result of the add-set test, `None` if the test phase was skipped
    pub tested: Option<bool>,

    /// Result of the unrestricted re-test (no-create mode only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retested: Option<bool>,

    pub write: WriteOutcome,

    /// An entry was removed from the del-set
    pub deleted: bool,

    /// Map-set entry matched and metadata was rewritten
    pub mapped: bool,
}

impl Default for Effects {
    fn default() -> Self {
        Effects {
            tested: None,
            retested: None,
            write: WriteOutcome::Skipped,
            deleted: false,
            mapped: false,
        }
    }
}

/// Result of running one packet through a set rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    /// Final match result, after inversion
    pub matched: bool,

    pub effects: Effects,
}

impl Verdict {
    pub fn new(matched: bool, effects: Effects) -> Self {
        Verdict { matched, effects }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_attempted() {
        assert!(!WriteOutcome::Skipped.attempted());
        assert!(!WriteOutcome::SampledOut.attempted());
        assert!(!WriteOutcome::BackedOff.attempted());
        assert!(WriteOutcome::Written.attempted());
        assert!(WriteOutcome::Failed.attempted());
        assert!(WriteOutcome::CapacityExhausted.attempted());
    }

    #[test]
    fn test_verdict_serialization() {
        let verdict = Verdict::new(
            true,
            Effects {
                tested: Some(false),
                write: WriteOutcome::CapacityExhausted,
                ..Default::default()
            },
        );

        let json = serde_json::to_string(&verdict).unwrap();
        assert!(json.contains("\"matched\":true"));
        assert!(json.contains("\"capacity_exhausted\""));
        assert!(!json.contains("retested"));
    }
}
