use serde::{Deserialize, Serialize};

use crate::domain::Packet;

/// Request to run a packet through the installed rules.
#[derive(Debug, Serialize, Deserialize)]
pub struct EvaluateRequest {
    /// Classified packet fields and metadata
    pub packet: Packet,

    /// Evaluate only this rule (all rules, in order, if absent)
    #[serde(default)]
    pub rule_id: Option<String>,
}
