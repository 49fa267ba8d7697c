use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::net::IpAddr;

/// Maximum number of packet fields a set key can be built from.
pub const MAX_DIMENSION: usize = 6;

/// A single packet field value usable as one component of a set key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Addr(IpAddr),
    Port(u16),
    Mac([u8; 6]),
    Iface(String),
    Number(u64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Addr(addr) => write!(f, "{}", addr),
            FieldValue::Port(port) => write!(f, "{}", port),
            FieldValue::Mac(mac) => write!(
                f,
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
            ),
            FieldValue::Iface(name) => write!(f, "{}", name),
            FieldValue::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Source and destination value for one dimension of a packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPair {
    pub src: FieldValue,
    pub dst: FieldValue,
}

impl FieldPair {
    pub fn new(src: FieldValue, dst: FieldValue) -> Self {
        FieldPair { src, dst }
    }
}

/// Which side of a packet a dimension reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldRole {
    Src,
    Dst,
}

impl FieldRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldRole::Src => "src",
            FieldRole::Dst => "dst",
        }
    }
}

/// Lookup key projected from a packet: one value per dimension.
pub type SetKey = SmallVec<[FieldValue; MAX_DIMENSION]>;

/// Render a key the way set entries are usually written (`a,b,c`).
pub fn format_key(key: &SetKey) -> String {
    key.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Mutable per-packet metadata that the map phase may rewrite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketMeta {
    #[serde(default)]
    pub mark: u32,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub queue_mapping: u16,
}

/// A classified packet as seen by the set engine.
///
/// Field extraction happens upstream; the engine only projects the
/// already-classified fields onto set keys and rewrites metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Per-dimension field pairs, outermost first
    #[serde(default)]
    pub fields: SmallVec<[FieldPair; MAX_DIMENSION]>,

    /// Metadata rewritten by the map phase
    #[serde(default)]
    pub meta: PacketMeta,

    /// Number of TX queues on the egress device, if the packet has one
    #[serde(default)]
    pub egress_tx_queues: Option<u16>,
}

impl Packet {
    pub fn new(fields: impl IntoIterator<Item = FieldPair>) -> Self {
        Packet {
            fields: fields.into_iter().collect(),
            meta: PacketMeta::default(),
            egress_tx_queues: None,
        }
    }

    /// Convenience constructor for the common address/port packet.
    pub fn from_flow(src: IpAddr, dst: IpAddr, src_port: u16, dst_port: u16) -> Self {
        Packet::new([
            FieldPair::new(FieldValue::Addr(src), FieldValue::Addr(dst)),
            FieldPair::new(FieldValue::Port(src_port), FieldValue::Port(dst_port)),
        ])
    }

    pub fn with_egress_queues(mut self, queues: u16) -> Self {
        self.egress_tx_queues = Some(queues);
        self
    }

    /// Project the packet onto a key using one role per dimension.
    ///
    /// Returns `None` when the packet carries fewer fields than roles.
    pub fn derive_key(&self, roles: &[FieldRole]) -> Option<SetKey> {
        if roles.len() > self.fields.len() {
            return None;
        }

        Some(
            roles
                .iter()
                .zip(self.fields.iter())
                .map(|(role, pair)| match role {
                    FieldRole::Src => pair.src.clone(),
                    FieldRole::Dst => pair.dst.clone(),
                })
                .collect(),
        )
    }
}
