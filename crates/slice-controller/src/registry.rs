//! Switch registry

use crate::southbound::DatapathHandle;
use chrono::{DateTime, Utc};
use slice_common::{Dpid, SwitchRole};
use std::collections::HashMap;
use std::fmt;

/// A connected switch
#[derive(Clone)]
pub struct Device {
    /// Switch identifier
    pub dpid: Dpid,
    /// Session handle
    pub handle: DatapathHandle,
    /// Role from the topology configuration
    pub role: SwitchRole,
    /// When the session came up
    pub connected_at: DateTime<Utc>,
}

impl Device {
    /// Create new device entry
    pub fn new(handle: DatapathHandle, role: SwitchRole) -> Self {
        Self {
            dpid: handle.dpid(),
            handle,
            role,
            connected_at: Utc::now(),
        }
    }

    /// Whether its stats feed the rate estimator
    pub fn is_monitored(&self) -> bool {
        self.role.is_edge()
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("dpid", &self.dpid)
            .field("role", &self.role)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

/// Currently connected switches
#[derive(Debug, Default)]
pub struct SwitchRegistry {
    devices: HashMap<Dpid, Device>,
}

impl SwitchRegistry {
    /// Create empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device, returning the stale entry it replaced
    pub fn on_connect(&mut self, device: Device) -> Option<Device> {
        self.devices.insert(device.dpid, device)
    }

    /// Remove a device. Unknown ids are a no-op.
    pub fn on_disconnect(&mut self, dpid: Dpid) -> Option<Device> {
        self.devices.remove(&dpid)
    }

    /// Look up a device
    pub fn get(&self, dpid: Dpid) -> Option<&Device> {
        self.devices.get(&dpid)
    }

    /// Snapshot of all devices in dpid order
    pub fn connected(&self) -> Vec<Device> {
        let mut devices: Vec<_> = self.devices.values().cloned().collect();
        devices.sort_by_key(|d| d.dpid);
        devices
    }

    /// Snapshot of monitored devices in dpid order
    pub fn monitored(&self) -> Vec<Device> {
        self.connected().into_iter().filter(Device::is_monitored).collect()
    }

    /// Whether `dpid` is connected and monitored
    pub fn is_monitored(&self, dpid: Dpid) -> bool {
        self.get(dpid).map(Device::is_monitored).unwrap_or(false)
    }

    /// Number of connected devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether nothing is connected
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
