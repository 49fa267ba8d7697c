use crate::domain::{FieldRole, FieldRoles, Probability};
use crate::sets::SetHandle;

use super::backoff::Backoff;

/// Independent behavior toggles of a set rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mode {
    /// Use the add-set test as the match verdict
    pub classify: bool,
    /// Negate the final verdict
    pub invert: bool,
    /// Never create entries, only update existing ones
    pub no_create: bool,
    /// Attach the annotation byte to written entries
    pub annotate: bool,
}

/// Insert behavior flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertFlags {
    pub overwrite_existing: bool,
}

/// Which packet metadata the map phase may rewrite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapFlags {
    pub mark: bool,
    pub priority: bool,
    pub queue: bool,
}

/// A resolved set plus the key projection used against it.
#[derive(Debug)]
pub struct SetRef {
    pub handle: SetHandle,
    pub roles: FieldRoles,
}

impl SetRef {
    pub fn dimension(&self) -> usize {
        self.roles.dimension()
    }

    #[inline]
    pub fn roles(&self) -> &[FieldRole] {
        self.roles.as_slice()
    }
}

/// Validated configuration of one installed set rule.
///
/// Immutable after validation except for the backoff deadline, which only
/// the engine writes.
#[derive(Debug)]
pub struct Configuration {
    pub add_set: Option<SetRef>,
    pub del_set: Option<SetRef>,
    pub map_set: Option<SetRef>,

    pub insert_flags: InsertFlags,

    /// Requested entry lifetime in seconds, `None` for no expiry
    pub timeout: Option<u32>,

    pub mode: Mode,
    pub probability: Probability,

    /// Hit counter the add-set entry must exceed to count as a match
    pub packets_gt: Option<u64>,

    pub annotation: u8,
    pub map: MapFlags,

    pub(crate) backoff: Backoff,
}

impl Configuration {
    /// Read-only view of the backoff state.
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Whether the add-set test phase runs for this rule.
    #[inline]
    pub fn runs_test_phase(&self) -> bool {
        self.add_set.is_some() && (self.mode.classify || self.mode.no_create)
    }
}
