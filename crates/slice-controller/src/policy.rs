//! Policy applicator
//!
//! Rewrites the priority-250 override rules on every edge switch after a
//! slice flip.
//!
//! # Consistency
//!
//! The update is a sequence of independent FlowMods, one per (switch, far
//! host). There is no multi-switch transaction: if a send fails or the
//! process dies mid-sequence, switches disagree about the active slice until
//! the next flip reprograms them. Switches that reconnect receive the override
//! for the current state with their static rules.

use crate::{programmer::FlowProgrammer, registry::SwitchRegistry, templates::RuleTemplates};
use slice_common::{Dpid, SliceState};
use tracing::{debug, warn};

/// Outcome of one apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    /// State that was programmed
    pub target: SliceState,
    /// FlowMods sent
    pub installed: usize,
    /// Switches left (partly) on the previous state
    pub failed: Vec<Dpid>,
}

impl ApplyReport {
    /// Whether every edge switch was reprogrammed
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Translates a slice state into override installs
#[derive(Debug, Clone)]
pub struct PolicyApplicator {
    templates: RuleTemplates,
}

impl PolicyApplicator {
    /// Create new applicator
    pub fn new(templates: RuleTemplates) -> Self {
        Self { templates }
    }

    /// Program every connected edge switch for `target`. A failing switch is
    /// skipped; the rest are still programmed.
    pub async fn apply(
        &self,
        target: SliceState,
        registry: &SwitchRegistry,
        programmer: &mut FlowProgrammer,
    ) -> ApplyReport {
        let mut report = ApplyReport {
            target,
            installed: 0,
            failed: Vec::new(),
        };

        for device in registry.connected().iter().filter(|d| d.role.is_edge()) {
            let rules = self.templates.override_rules(device.dpid, target);
            if rules.is_empty() {
                continue;
            }

            match programmer.install_all(device, rules).await {
                Ok(n) => {
                    debug!("dpid {} steered to {} ({} rules)", device.dpid, target, n);
                    report.installed += n;
                }
                Err(e) => {
                    warn!("dpid {} not moved to {}: {}", device.dpid, target, e);
                    report.failed.push(device.dpid);
                }
            }
        }

        report
    }
}
