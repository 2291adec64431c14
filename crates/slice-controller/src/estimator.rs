//! Monitored-class rate estimation
//!
//! Turns consecutive cumulative byte counters into bytes/second.
//!
//! - A previous sample of [`COLD_START`] yields delta 0, so the first reply
//!   after startup or reconnect never reports a spurious rate.
//! - A counter lower than the previous one is a hardware reset and also
//!   yields delta 0.

use slice_common::{priority, Dpid, FlowStatsEntry};
use std::collections::{BTreeMap, HashMap};

/// Counter value meaning "no sample yet"
pub const COLD_START: u64 = 0;

/// Outcome of one observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateUpdate {
    /// Device observed
    pub dpid: Dpid,
    /// Cumulative monitored bytes reported
    pub bytes: u64,
    /// Bytes attributed to this interval
    pub delta: u64,
    /// Bytes/second over the interval
    pub rate: f64,
    /// Counter went backwards
    pub counter_reset: bool,
}

/// Per-device counter and rate samples
#[derive(Debug)]
pub struct RateEstimator {
    interval_secs: f64,
    monitored_port: u16,
    counters: HashMap<Dpid, u64>,
    rates: HashMap<Dpid, f64>,
    counter_resets: u64,
}

impl RateEstimator {
    /// Create estimator with every monitored device at [`COLD_START`]
    pub fn new(interval_secs: f64, monitored_port: u16, monitored: &[Dpid]) -> Self {
        Self {
            interval_secs,
            monitored_port,
            counters: monitored.iter().map(|id| (*id, COLD_START)).collect(),
            rates: HashMap::new(),
            counter_resets: 0,
        }
    }

    /// Sum of byte counters over monitored-class entries
    pub fn monitored_bytes(&self, entries: &[FlowStatsEntry]) -> u64 {
        entries
            .iter()
            .filter(|e| e.priority == priority::MONITORED && e.matcher.is_monitored(self.monitored_port))
            .fold(0u64, |acc, e| acc.saturating_add(e.byte_count))
    }

    /// Feed one stats reply
    pub fn record_reply(&mut self, dpid: Dpid, entries: &[FlowStatsEntry]) -> RateUpdate {
        let bytes = self.monitored_bytes(entries);
        self.observe(dpid, bytes)
    }

    /// Feed one cumulative counter value
    pub fn observe(&mut self, dpid: Dpid, bytes: u64) -> RateUpdate {
        let previous = self.counter(dpid);

        let (delta, counter_reset) = if previous == COLD_START {
            (0, false)
        } else {
            match bytes.checked_sub(previous) {
                Some(delta) => (delta, false),
                None => (0, true),
            }
        };

        if counter_reset {
            self.counter_resets += 1;
        }

        let rate = delta as f64 / self.interval_secs;
        self.counters.insert(dpid, bytes);
        self.rates.insert(dpid, rate);

        RateUpdate {
            dpid,
            bytes,
            delta,
            rate,
            counter_reset,
        }
    }

    /// Return a device to cold start and drop its rate from the maximum
    pub fn reset(&mut self, dpid: Dpid) {
        self.counters.insert(dpid, COLD_START);
        self.rates.remove(&dpid);
    }

    /// Last counter sample
    pub fn counter(&self, dpid: Dpid) -> u64 {
        self.counters.get(&dpid).copied().unwrap_or(COLD_START)
    }

    /// Last rate sample
    pub fn rate(&self, dpid: Dpid) -> Option<f64> {
        self.rates.get(&dpid).copied()
    }

    /// Maximum rate across devices with a sample, 0 when none
    pub fn max_rate(&self) -> f64 {
        self.rates.values().copied().fold(0.0, f64::max)
    }

    /// All rate samples in dpid order
    pub fn rates(&self) -> BTreeMap<Dpid, f64> {
        self.rates.iter().map(|(id, rate)| (*id, *rate)).collect()
    }

    /// Counter resets seen so far
    pub fn counter_resets(&self) -> u64 {
        self.counter_resets
    }
}
