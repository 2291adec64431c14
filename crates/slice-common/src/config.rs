//! Controller and topology configuration

use crate::{Dpid, MacAddr, SliceError, SliceResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Stats polling interval
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
    /// Trip threshold in bytes/second. Release is half of it.
    #[serde(default = "default_congestion_threshold")]
    pub congestion_threshold: f64,
    /// UDP destination port identifying the monitored class
    #[serde(default = "default_monitored_udp_port")]
    pub monitored_udp_port: u16,
    /// Static topology
    #[serde(default)]
    pub topology: TopologyConfig,
}

fn default_monitor_interval_ms() -> u64 {
    2000
}

fn default_congestion_threshold() -> f64 {
    // 1 Mbit/s
    1_000_000.0 / 8.0
}

fn default_monitored_udp_port() -> u16 {
    9999
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            monitor_interval_ms: default_monitor_interval_ms(),
            congestion_threshold: default_congestion_threshold(),
            monitored_udp_port: default_monitored_udp_port(),
            topology: TopologyConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Load from file
    pub fn load(path: &str) -> SliceResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file if it exists. A missing file is `Ok(None)`; a file that
    /// is unreadable, malformed or inconsistent is an error.
    pub fn load_optional(path: &str) -> SliceResult<Option<Self>> {
        match Self::load(path) {
            Ok(config) => Ok(Some(config)),
            Err(SliceError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Save to file
    pub fn save(&self, path: &str) -> SliceResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Polling interval
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    /// Polling interval in seconds, the divisor of every rate
    pub fn interval_secs(&self) -> f64 {
        self.monitor_interval_ms as f64 / 1000.0
    }

    /// Check internal consistency
    pub fn validate(&self) -> SliceResult<()> {
        if self.monitor_interval_ms == 0 {
            return Err(SliceError::Config("monitor_interval_ms must be positive".into()));
        }
        if !self.congestion_threshold.is_finite() || self.congestion_threshold <= 0.0 {
            return Err(SliceError::Config(format!(
                "congestion_threshold must be a positive number, got {}",
                self.congestion_threshold
            )));
        }
        self.topology.validate()
    }
}

/// Switch role in the slice topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchRole {
    /// Edge switch on the source side
    Ingress,
    /// Intermediate switch carrying one slice
    Transit,
    /// Edge switch on the far side
    Egress,
}

impl SwitchRole {
    /// Edge switches carry hosts, monitored flows and override rules
    pub fn is_edge(&self) -> bool {
        matches!(self, Self::Ingress | Self::Egress)
    }
}

/// Per-switch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchConfig {
    /// Logical name, used by neighbors' port tables
    pub name: String,
    /// Role
    pub role: SwitchRole,
    /// Neighbor or host name -> physical port
    pub ports: BTreeMap<String, u32>,
}

impl SwitchConfig {
    /// Port toward a named neighbor
    pub fn port(&self, neighbor: &str) -> Option<u32> {
        self.ports.get(neighbor).copied()
    }
}

/// A host as seen from one switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPort {
    /// Host name
    pub name: String,
    /// Hardware address
    pub mac: MacAddr,
    /// Attachment port, `None` for hosts behind another switch
    pub port: Option<u32>,
}

/// Static topology knowledge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Host name -> hardware address
    pub hosts: BTreeMap<String, MacAddr>,
    /// Switches by dpid
    pub switches: BTreeMap<Dpid, SwitchConfig>,
    /// Name of the transit switch on the upper (video) slice
    pub upper_path: String,
    /// Name of the transit switch on the lower slice
    pub lower_path: String,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        let hosts = (1..=4u8)
            .map(|i| (format!("h{}", i), MacAddr::new([0, 0, 0, 0, 0, i])))
            .collect();

        let switch = |name: &str, role: SwitchRole, ports: &[(&str, u32)]| SwitchConfig {
            name: name.into(),
            role,
            ports: ports.iter().map(|(n, p)| (n.to_string(), *p)).collect(),
        };

        let mut switches = BTreeMap::new();
        switches.insert(1, switch("s1", SwitchRole::Ingress, &[("h1", 1), ("h2", 2), ("s2", 3), ("s3", 4)]));
        switches.insert(2, switch("s2", SwitchRole::Transit, &[("s1", 1), ("s4", 2)]));
        switches.insert(3, switch("s3", SwitchRole::Transit, &[("s1", 1), ("s4", 2)]));
        switches.insert(4, switch("s4", SwitchRole::Egress, &[("s2", 1), ("s3", 2), ("h3", 3), ("h4", 4)]));

        Self {
            hosts,
            switches,
            upper_path: "s2".into(),
            lower_path: "s3".into(),
        }
    }
}

impl TopologyConfig {
    /// Switch config by dpid
    pub fn switch(&self, dpid: Dpid) -> Option<&SwitchConfig> {
        self.switches.get(&dpid)
    }

    /// Role of a dpid, if configured
    pub fn role(&self, dpid: Dpid) -> Option<SwitchRole> {
        self.switch(dpid).map(|s| s.role)
    }

    /// First switch with the given role
    pub fn switch_by_role(&self, role: SwitchRole) -> Option<&SwitchConfig> {
        self.switches.values().find(|s| s.role == role)
    }

    /// Dpids whose stats feed the rate estimator
    pub fn monitored_dpids(&self) -> Vec<Dpid> {
        self.switches
            .iter()
            .filter(|(_, s)| s.role.is_edge())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Hosts attached directly to a switch, in name order
    pub fn local_hosts(&self, switch: &SwitchConfig) -> Vec<HostPort> {
        self.hosts
            .iter()
            .filter_map(|(name, mac)| {
                switch.port(name).map(|port| HostPort {
                    name: name.clone(),
                    mac: *mac,
                    port: Some(port),
                })
            })
            .collect()
    }

    /// Hosts reachable only across a slice, in name order
    pub fn far_hosts(&self, switch: &SwitchConfig) -> Vec<HostPort> {
        self.hosts
            .iter()
            .filter(|(name, _)| switch.port(name).is_none())
            .map(|(name, mac)| HostPort {
                name: name.clone(),
                mac: *mac,
                port: None,
            })
            .collect()
    }

    /// Check that every name the rule templates rely on resolves
    pub fn validate(&self) -> SliceResult<()> {
        let count = |role: SwitchRole| self.switches.values().filter(|s| s.role == role).count();
        if count(SwitchRole::Ingress) != 1 || count(SwitchRole::Egress) != 1 {
            return Err(SliceError::Config(
                "topology needs exactly one ingress and one egress switch".into(),
            ));
        }

        for path in [&self.upper_path, &self.lower_path] {
            let found = self
                .switches
                .values()
                .any(|s| &s.name == path && s.role == SwitchRole::Transit);
            if !found {
                return Err(SliceError::Config(format!("no transit switch named {}", path)));
            }
        }
        if self.upper_path == self.lower_path {
            return Err(SliceError::Config("upper and lower path must differ".into()));
        }

        let ingress = self.switch_by_role(SwitchRole::Ingress).map(|s| s.name.as_str());
        let egress = self.switch_by_role(SwitchRole::Egress).map(|s| s.name.as_str());

        for (dpid, switch) in &self.switches {
            let required: Vec<&str> = match switch.role {
                SwitchRole::Ingress | SwitchRole::Egress => {
                    vec![self.upper_path.as_str(), self.lower_path.as_str()]
                }
                SwitchRole::Transit => ingress.into_iter().chain(egress).collect(),
            };
            for neighbor in required {
                if switch.port(neighbor).is_none() {
                    return Err(SliceError::Config(format!(
                        "switch {} (dpid {}) has no port toward {}",
                        switch.name, dpid, neighbor
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.monitor_interval_ms, 2000);
        assert_eq!(config.congestion_threshold, 125_000.0);
        assert_eq!(config.interval_secs(), 2.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_monitored_dpids() {
        let topo = TopologyConfig::default();
        assert_eq!(topo.monitored_dpids(), vec![1, 4]);
    }

    #[test]
    fn test_local_and_far_hosts() {
        let topo = TopologyConfig::default();
        let s1 = topo.switch(1).unwrap();

        let local: Vec<_> = topo.local_hosts(s1).into_iter().map(|h| (h.name, h.port)).collect();
        assert_eq!(local, vec![("h1".to_string(), Some(1)), ("h2".to_string(), Some(2))]);

        let far: Vec<_> = topo.far_hosts(s1).into_iter().map(|h| h.name).collect();
        assert_eq!(far, vec!["h3", "h4"]);
    }

    #[test]
    fn test_validate_missing_port() {
        let mut topo = TopologyConfig::default();
        topo.switches.get_mut(&4).unwrap().ports.remove("s3");
        assert!(matches!(topo.validate(), Err(SliceError::Config(_))));
    }

    #[test]
    fn test_validate_unknown_path() {
        let mut topo = TopologyConfig::default();
        topo.lower_path = "s9".into();
        assert!(topo.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = ControllerConfig {
            monitor_interval_ms: 0,
            ..ControllerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_defaults_and_dpid_keys() {
        let json = r#"{
            "topology": {
                "hosts": {"h1": "00:00:00:00:00:01"},
                "switches": {
                    "7": {"name": "edge", "role": "ingress", "ports": {"h1": 1}}
                },
                "upper_path": "up",
                "lower_path": "down"
            }
        }"#;
        let config: ControllerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.monitor_interval_ms, 2000);
        assert_eq!(config.monitored_udp_port, 9999);
        assert_eq!(config.topology.role(7), Some(SwitchRole::Ingress));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("slice-config-{}.json", std::process::id()));
        let path = path.to_str().unwrap();

        let config = ControllerConfig {
            congestion_threshold: 50_000.0,
            ..ControllerConfig::default()
        };
        config.save(path).unwrap();

        let loaded = ControllerConfig::load(path).unwrap();
        assert_eq!(loaded.congestion_threshold, 50_000.0);
        assert_eq!(loaded.topology.switches.len(), 4);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_load_optional_missing_file() {
        let path = std::env::temp_dir().join(format!("slice-missing-{}.json", std::process::id()));
        let loaded = ControllerConfig::load_optional(path.to_str().unwrap()).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_optional_rejects_bad_file() {
        let dir = std::env::temp_dir();
        let invalid = dir.join(format!("slice-invalid-{}.json", std::process::id()));
        let garbage = dir.join(format!("slice-garbage-{}.json", std::process::id()));
        let invalid = invalid.to_str().unwrap();
        let garbage = garbage.to_str().unwrap();

        ControllerConfig {
            monitor_interval_ms: 0,
            ..ControllerConfig::default()
        }
        .save(invalid)
        .unwrap();
        std::fs::write(garbage, "{ not json").unwrap();

        assert!(matches!(ControllerConfig::load_optional(invalid), Err(SliceError::Config(_))));
        assert!(matches!(ControllerConfig::load_optional(garbage), Err(SliceError::Json(_))));

        std::fs::remove_file(invalid).unwrap();
        std::fs::remove_file(garbage).unwrap();
    }
}
