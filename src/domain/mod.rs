pub mod packet;
pub mod rule;
pub mod verdict;

pub use packet::{FieldPair, FieldRole, FieldValue, Packet, PacketMeta, SetKey, MAX_DIMENSION};
pub use rule::{FieldRoles, Hook, Probability, RuleDef, RulesFile, SetTarget, Table};
pub use verdict::{Effects, Verdict, WriteOutcome};
