//! Slice Common - Shared types for the dynamic slice controller
//!
//! This crate provides the vocabulary shared by the controller core and
//! its southbound collaborators:
//! - Hardware addresses and device identifiers
//! - Flow matches, actions and flow-table messages
//! - Topology and controller configuration
//! - Error handling
//!
//! # Slices
//!
//! ```text
//!             ┌──────── s2 (upper) ────────┐
//!  h1 ─┐      │                            │      ┌─ h3
//!      ├──── s1 (ingress)            s4 (egress) ──┤
//!  h2 ─┘      │                            │      └─ h4
//!             └──────── s3 (lower) ────────┘
//! ```
//!
//! Monitored (video) traffic always rides the upper slice. Standard traffic
//! is steered onto whichever slice the controller's [`SliceState`] names.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod flow;

pub use config::*;
pub use error::*;
pub use flow::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Datapath (switch) identifier
pub type Dpid = u64;

/// Ethernet hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// Create from raw octets
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Raw octets
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = SliceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');

        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .filter(|p| p.len() == 2 && p.bytes().all(|b| b.is_ascii_hexdigit()))
                .ok_or_else(|| SliceError::InvalidMac(s.to_string()))?;
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| SliceError::InvalidMac(s.to_string()))?;
        }

        if parts.next().is_some() {
            return Err(SliceError::InvalidMac(s.to_string()));
        }

        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = SliceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

/// Which slice currently carries standard (non-monitored) traffic
/// between the far-apart host pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceState {
    /// Standard traffic steered through the lower transit switch
    Lower,
    /// Standard traffic steered through the upper transit switch
    Upper,
}

impl Default for SliceState {
    fn default() -> Self {
        Self::Upper
    }
}

impl fmt::Display for SliceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lower => f.write_str("LOWER"),
            Self::Upper => f.write_str("UPPER"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mac_parse_display() {
        let mac: MacAddr = "00:00:00:00:00:0A".parse().unwrap();
        assert_eq!(mac.octets(), [0, 0, 0, 0, 0, 10]);
        assert_eq!(mac.to_string(), "00:00:00:00:00:0a");
    }

    #[test]
    fn test_mac_rejects_garbage() {
        assert!("00:00:00:00:00".parse::<MacAddr>().is_err());
        assert!("00:00:00:00:00:01:02".parse::<MacAddr>().is_err());
        assert!("00:00:00:00:00:zz".parse::<MacAddr>().is_err());
        assert!("0:0:0:0:0:1".parse::<MacAddr>().is_err());
        assert!("00:00:00:00:00:+1".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_mac_serde_as_string() {
        let mac = MacAddr::new([0, 0, 0, 0, 0, 3]);
        let json = serde_json::to_string(&mac).unwrap();
        assert_eq!(json, "\"00:00:00:00:00:03\"");
        let back: MacAddr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mac);
    }

    #[test]
    fn test_initial_slice_state() {
        assert_eq!(SliceState::default(), SliceState::Upper);
    }

    proptest! {
        #[test]
        fn prop_mac_parse_is_canonical(s in "[0-9a-fA-F:+]{0,20}") {
            if let Ok(mac) = s.parse::<MacAddr>() {
                prop_assert_eq!(mac.to_string(), s.to_lowercase());
            }
        }
    }
}
