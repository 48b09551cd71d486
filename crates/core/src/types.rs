//! Core types

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

/// 128-bit mesh-wide unique network address of a node.
///
/// Flows are keyed by the full address; the 16-bit [`MeshAddress::node_id`]
/// only exists as a compact wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeshAddress(Ipv6Addr);

impl MeshAddress {
    /// Unspecified address (`::`)
    pub const UNSPECIFIED: MeshAddress = MeshAddress(Ipv6Addr::UNSPECIFIED);

    /// Wrap an IPv6 address
    pub const fn new(addr: Ipv6Addr) -> Self {
        Self(addr)
    }

    /// Build an address from its 16 network-order octets
    pub const fn from_octets(octets: [u8; 16]) -> Self {
        Self(Ipv6Addr::new(
            u16::from_be_bytes([octets[0], octets[1]]),
            u16::from_be_bytes([octets[2], octets[3]]),
            u16::from_be_bytes([octets[4], octets[5]]),
            u16::from_be_bytes([octets[6], octets[7]]),
            u16::from_be_bytes([octets[8], octets[9]]),
            u16::from_be_bytes([octets[10], octets[11]]),
            u16::from_be_bytes([octets[12], octets[13]]),
            u16::from_be_bytes([octets[14], octets[15]]),
        ))
    }

    /// The 16 network-order octets
    pub fn octets(&self) -> [u8; 16] {
        self.0.octets()
    }

    /// Short node identifier: the last two octets of the interface identifier
    pub fn node_id(&self) -> u16 {
        let octets = self.0.octets();
        u16::from_be_bytes([octets[14], octets[15]])
    }

    /// Underlying IPv6 address
    pub fn ip(&self) -> Ipv6Addr {
        self.0
    }
}

impl From<Ipv6Addr> for MeshAddress {
    fn from(addr: Ipv6Addr) -> Self {
        Self(addr)
    }
}

impl From<MeshAddress> for Ipv6Addr {
    fn from(addr: MeshAddress) -> Self {
        addr.0
    }
}

impl FromStr for MeshAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<Ipv6Addr>()
            .map(Self)
            .map_err(|_| CoreError::InvalidAddress(s.to_string()))
    }
}

impl fmt::Display for MeshAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Export role of a node, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Leaf node exporting its own flow table
    Standard,
    /// Merges children's compact reports into one upstream message
    Aggregator,
    /// Transcodes compact mesh messages for the collector
    Gateway,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Standard => "standard",
            Role::Aggregator => "aggregator",
            Role::Gateway => "gateway",
        };
        f.write_str(name)
    }
}

/// Wire encoding of exported messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Collector-facing IPFIX encoding
    Full,
    /// Reduced-overhead encoding for constrained hops
    Compact,
}
