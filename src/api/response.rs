use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Effects, PacketMeta};
use crate::sets::{EntrySnapshot, SetSummary};

/// Response from an evaluation.
#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub request_id: Uuid,

    /// Ruleset version used for this evaluation
    pub ruleset_version: String,

    /// One verdict per evaluated rule, in rule order
    pub results: Vec<RuleVerdict>,

    /// Packet metadata after every rule ran
    pub meta: PacketMeta,
}

/// Verdict of one rule.
#[derive(Debug, Serialize)]
pub struct RuleVerdict {
    pub rule_id: String,
    pub matched: bool,
    pub effects: Effects,
}

/// One installed rule and its save form.
#[derive(Debug, Serialize)]
pub struct RuleInfo {
    pub id: String,
    pub rule: String,
}

#[derive(Debug, Serialize)]
pub struct RulesResponse {
    pub ruleset_version: String,
    pub rules: Vec<RuleInfo>,
}

#[derive(Debug, Serialize)]
pub struct SetsResponse {
    pub sets: Vec<SetSummary>,
}

#[derive(Debug, Serialize)]
pub struct SetEntriesResponse {
    pub name: String,
    pub entries: Vec<EntrySnapshot>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub ruleset_version: String,
    pub uptime_secs: u64,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub ruleset_version: String,
    pub rules: usize,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        ErrorResponse {
            error: error.into(),
            code: code.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ErrorResponse::new(message, "NOT_FOUND")
    }
}
