//! Traffic monitor
//!
//! Each tick sends one FlowStatsRequest to every monitored switch and moves
//! on. Replies come back as separate events.

use crate::registry::SwitchRegistry;
use slice_common::SouthboundMessage;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{trace, warn};

/// Periodic stats poller
#[derive(Debug)]
pub struct TrafficMonitor {
    period: Duration,
    requests_sent: u64,
}

impl TrafficMonitor {
    /// Create new monitor
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            requests_sent: 0,
        }
    }

    /// Polling period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Tick source. A late tick delays the schedule rather than bursting.
    pub fn ticker(&self) -> Interval {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Request stats from every monitored switch, returning how many
    /// requests went out
    pub async fn poll(&mut self, registry: &SwitchRegistry) -> usize {
        let mut sent = 0;

        for device in registry.monitored() {
            match device.handle.send(SouthboundMessage::FlowStatsRequest).await {
                Ok(()) => {
                    trace!("stats request -> dpid {}", device.dpid);
                    sent += 1;
                }
                Err(e) => warn!("Stats request to dpid {} failed: {}", device.dpid, e),
            }
        }

        self.requests_sent += sent as u64;
        sent
    }

    /// Requests sent so far
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent
    }
}
