use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::packet::{FieldRole, MAX_DIMENSION};

/// Fixed-point scale of a sampling probability (2^31).
pub const PROBABILITY_SCALE: u32 = 0x8000_0000;

/// Errors parsing the textual rule surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid direction {0:?}: expected a comma separated list of 'src' or 'dst'")]
    Direction(String),

    #[error("probability {0} out of range [0, 1)")]
    Probability(Decimal),
}

/// Ordered per-dimension src/dst selection, written as `src,dst,...`.
///
/// Parsing accepts any length; the validator enforces the dimension limit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldRoles(SmallVec<[FieldRole; MAX_DIMENSION]>);

impl FieldRoles {
    pub fn new(roles: impl IntoIterator<Item = FieldRole>) -> Self {
        FieldRoles(roles.into_iter().collect())
    }

    /// Number of key fields.
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[FieldRole] {
        &self.0
    }
}

impl FromStr for FieldRoles {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let roles = s
            .split(',')
            .map(|part| match part.trim() {
                "src" => Ok(FieldRole::Src),
                "dst" => Ok(FieldRole::Dst),
                _ => Err(ParseError::Direction(s.to_string())),
            })
            .collect::<Result<SmallVec<_>, _>>()?;
        Ok(FieldRoles(roles))
    }
}

impl TryFrom<String> for FieldRoles {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FieldRoles> for String {
    fn from(roles: FieldRoles) -> Self {
        roles.to_string()
    }
}

impl fmt::Display for FieldRoles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, role) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(role.as_str())?;
        }
        Ok(())
    }
}

/// Sampling probability as a 31-bit fixed-point fraction of 2^31.
///
/// Zero is the "no sampling" sentinel: every packet proceeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Probability(u32);

impl Probability {
    pub const ALWAYS: Probability = Probability(0);

    /// Build from a raw fixed-point value, clamped below 2^31.
    pub fn from_raw(raw: u32) -> Self {
        Probability(raw.min(PROBABILITY_SCALE - 1))
    }

    /// Convert a decimal in [0, 1), rounding half away from zero.
    pub fn from_decimal(p: Decimal) -> Result<Self, ParseError> {
        if p.is_sign_negative() || p >= Decimal::ONE {
            return Err(ParseError::Probability(p));
        }

        let scaled = (p * Decimal::from(PROBABILITY_SCALE))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        let raw = scaled.to_u32().ok_or(ParseError::Probability(p))?;
        Ok(Probability::from_raw(raw))
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Returns true when sampling is in effect.
    #[inline]
    pub fn is_sampling(&self) -> bool {
        self.0 != 0
    }

    /// Whether a uniform 31-bit draw passes the gate.
    #[inline]
    pub fn admits(&self, draw: u32) -> bool {
        self.0 == 0 || draw < self.0
    }

    pub fn as_decimal(&self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(PROBABILITY_SCALE)
    }
}

impl TryFrom<Decimal> for Probability {
    type Error = ParseError;

    fn try_from(p: Decimal) -> Result<Self, Self::Error> {
        Probability::from_decimal(p)
    }
}

impl From<Probability> for Decimal {
    fn from(p: Probability) -> Self {
        p.as_decimal()
    }
}

impl fmt::Display for Probability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.11}", f64::from(self.0) / f64::from(PROBABILITY_SCALE))
    }
}

/// Reference to a named set plus the key projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetTarget {
    pub name: String,
    pub dirs: FieldRoles,
}

impl SetTarget {
    pub fn new(name: impl Into<String>, dirs: &str) -> Result<Self, ParseError> {
        Ok(SetTarget {
            name: name.into(),
            dirs: dirs.parse()?,
        })
    }
}

/// Netfilter table a rule is installed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Raw,
    Mangle,
    Nat,
    #[default]
    Filter,
    Security,
}

/// Hook a rule's chain is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Hook {
    PreRouting,
    LocalIn,
    Forward,
    LocalOut,
    PostRouting,
}

/// Raw definition of one set rule, as written in the rules file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDef {
    /// Unique rule identifier
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_set: Option<SetTarget>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub del_set: Option<SetTarget>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_set: Option<SetTarget>,

    /// Allow overwriting an existing entry
    #[serde(default)]
    pub exist: bool,

    /// Entry lifetime in seconds; absent means no expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,

    /// Use the add-set test as the match verdict
    #[serde(default, rename = "match")]
    pub classify: bool,

    #[serde(default)]
    pub invert: bool,

    /// Only update existing entries, never create
    #[serde(default)]
    pub nocreate: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<Probability>,

    /// Only count the add-set test as a hit above this many packets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packets_gt: Option<u64>,

    /// Annotation byte stored with written entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<u8>,

    #[serde(default)]
    pub map_mark: bool,

    #[serde(default)]
    pub map_prio: bool,

    #[serde(default)]
    pub map_queue: bool,

    #[serde(default)]
    pub table: Table,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<Hook>,
}

impl RuleDef {
    pub fn new(id: impl Into<String>) -> Self {
        RuleDef {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Contents of a rules file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesFile {
    #[serde(rename = "ruleset_version")]
    pub version: String,

    #[serde(default)]
    pub rules: Vec<RuleDef>,
}
