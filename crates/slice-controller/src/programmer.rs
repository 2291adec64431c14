//! Flow table programmer
//!
//! One `install` call emits exactly one FlowMod. Replacement of an existing
//! (priority, match) entry is the switch's job; nothing is batched.

use crate::registry::Device;
use slice_common::{Action, FlowMatch, FlowMod, SliceResult, SouthboundMessage};
use tracing::{trace, warn};

/// Issues install-or-overwrite instructions
#[derive(Debug, Default)]
pub struct FlowProgrammer {
    sent: u64,
    failed: u64,
}

impl FlowProgrammer {
    /// Create new programmer
    pub fn new() -> Self {
        Self::default()
    }

    /// Install one rule. Empty `actions` means drop.
    pub async fn install(
        &mut self,
        device: &Device,
        priority: u16,
        matcher: FlowMatch,
        actions: Vec<Action>,
    ) -> SliceResult<()> {
        self.install_rule(device, FlowMod::new(priority, matcher, actions)).await
    }

    /// Install one prebuilt rule
    pub async fn install_rule(&mut self, device: &Device, rule: FlowMod) -> SliceResult<()> {
        trace!(dpid = device.dpid, priority = rule.priority, matcher = ?rule.matcher, "flow mod");

        match device.handle.send(SouthboundMessage::FlowMod(rule)).await {
            Ok(()) => {
                self.sent += 1;
                Ok(())
            }
            Err(e) => {
                self.failed += 1;
                warn!("Flow mod to dpid {} failed: {}", device.dpid, e);
                Err(e)
            }
        }
    }

    /// Install rules in order, returning how many were sent. Stops at the
    /// first failure since the session is most likely gone.
    pub async fn install_all(&mut self, device: &Device, rules: Vec<FlowMod>) -> SliceResult<usize> {
        let mut installed = 0;
        for rule in rules {
            self.install_rule(device, rule).await?;
            installed += 1;
        }
        Ok(installed)
    }

    /// Flow mods sent successfully
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Flow mods that failed to send
    pub fn failed(&self) -> u64 {
        self.failed
    }
}
