//! Flow-table vocabulary: matches, actions and southbound messages

use crate::MacAddr;
use serde::{Deserialize, Serialize};

/// EtherType for IPv4
pub const ETH_TYPE_IPV4: u16 = 0x0800;
/// EtherType for ARP
pub const ETH_TYPE_ARP: u16 = 0x0806;
/// IP protocol number for UDP
pub const IP_PROTO_UDP: u8 = 17;

/// Rule priorities. Higher wins on overlapping matches.
pub mod priority {
    /// Match-all default drop
    pub const DEFAULT_DROP: u16 = 0;
    /// ARP handling scoped to the lower slice
    pub const ARP: u16 = 100;
    /// Standard class toward the non-video path
    pub const STANDARD: u16 = 200;
    /// Same-switch host-to-host shortcut
    pub const STANDARD_LOCAL: u16 = 210;
    /// Slice override rewritten on every state flip
    pub const OVERRIDE: u16 = 250;
    /// Monitored (video) class toward the video path
    pub const MONITORED: u16 = 300;
    /// Monitored same-switch shortcut
    pub const MONITORED_LOCAL: u16 = 310;
}

/// Match predicate. `None` fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowMatch {
    /// Ingress physical port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_port: Option<u32>,
    /// EtherType
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_type: Option<u16>,
    /// Source hardware address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_src: Option<MacAddr>,
    /// Destination hardware address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_dst: Option<MacAddr>,
    /// IP protocol number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_proto: Option<u8>,
    /// UDP destination port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udp_dst: Option<u16>,
}

impl FlowMatch {
    /// Match everything
    pub fn any() -> Self {
        Self::default()
    }

    /// Match ARP frames
    pub fn arp() -> Self {
        Self {
            eth_type: Some(ETH_TYPE_ARP),
            ..Self::default()
        }
    }

    /// Match IPv4 packets
    pub fn ipv4() -> Self {
        Self {
            eth_type: Some(ETH_TYPE_IPV4),
            ..Self::default()
        }
    }

    /// Match IPv4/UDP packets destined to `port`
    pub fn udp_dst(port: u16) -> Self {
        Self {
            eth_type: Some(ETH_TYPE_IPV4),
            ip_proto: Some(IP_PROTO_UDP),
            udp_dst: Some(port),
            ..Self::default()
        }
    }

    /// Restrict to an ingress port
    pub fn with_in_port(mut self, port: u32) -> Self {
        self.in_port = Some(port);
        self
    }

    /// Restrict to a source address
    pub fn with_eth_src(mut self, mac: MacAddr) -> Self {
        self.eth_src = Some(mac);
        self
    }

    /// Restrict to a destination address
    pub fn with_eth_dst(mut self, mac: MacAddr) -> Self {
        self.eth_dst = Some(mac);
        self
    }

    /// Whether this match selects the monitored class on `port`.
    /// A missing `udp_dst` field never counts as monitored.
    #[inline]
    pub fn is_monitored(&self, port: u16) -> bool {
        self.udp_dst == Some(port)
    }
}

/// Rule action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Output to a physical port
    Output(u32),
    /// Flood to every port except the ingress one
    Flood,
}

/// Install-or-overwrite rule instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowMod {
    /// Rule priority
    pub priority: u16,
    /// Match predicate
    #[serde(rename = "match")]
    pub matcher: FlowMatch,
    /// Actions. Empty means drop.
    pub actions: Vec<Action>,
}

impl FlowMod {
    /// Create new flow mod
    pub fn new(priority: u16, matcher: FlowMatch, actions: Vec<Action>) -> Self {
        Self {
            priority,
            matcher,
            actions,
        }
    }

    /// Whether the rule drops matching traffic
    pub fn is_drop(&self) -> bool {
        self.actions.is_empty()
    }
}

/// One record of a flow-stats reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStatsEntry {
    /// Rule priority
    pub priority: u16,
    /// Rule match
    #[serde(rename = "match")]
    pub matcher: FlowMatch,
    /// Cumulative bytes matched
    pub byte_count: u64,
    /// Cumulative packets matched
    pub packet_count: u64,
}

/// Controller-to-switch message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SouthboundMessage {
    /// Install or overwrite a rule
    FlowMod(FlowMod),
    /// Ask for per-rule counters
    FlowStatsRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitored_match() {
        assert!(FlowMatch::udp_dst(9999).with_in_port(1).is_monitored(9999));
        assert!(!FlowMatch::udp_dst(5000).is_monitored(9999));
        assert!(!FlowMatch::ipv4().with_in_port(3).is_monitored(9999));
    }

    #[test]
    fn test_empty_actions_is_drop() {
        assert!(FlowMod::new(priority::DEFAULT_DROP, FlowMatch::any(), vec![]).is_drop());
        assert!(!FlowMod::new(priority::ARP, FlowMatch::arp(), vec![Action::Flood]).is_drop());
    }

    #[test]
    fn test_match_json_omits_wildcards() {
        let m = FlowMatch::ipv4().with_in_port(2);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json, serde_json::json!({"in_port": 2, "eth_type": 2048}));
    }
}
