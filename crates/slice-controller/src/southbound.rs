//! Southbound seam
//!
//! The controller depends on [`Datapath`] handles for outbound messages and
//! receives lifecycle and stats events through its own queue. Wire codecs and
//! session setup live outside this crate.

use async_trait::async_trait;
use parking_lot::Mutex;
use slice_common::{
    Action, Dpid, FlowMatch, FlowMod, FlowStatsEntry, SliceError, SliceResult, SouthboundMessage,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Session to one switch
///
/// `send` must only enqueue; it is awaited from the controller task and must
/// not wait on the switch.
#[async_trait]
pub trait Datapath: Send + Sync {
    /// Switch identifier
    fn dpid(&self) -> Dpid;

    /// Send one message
    async fn send(&self, msg: SouthboundMessage) -> SliceResult<()>;
}

/// Shared connection handle
pub type DatapathHandle = Arc<dyn Datapath>;

type RuleKey = (u16, FlowMatch);

/// In-memory switch
///
/// Keeps a flow table keyed by (priority, match) with overwrite-on-install
/// semantics, per-rule counters and a log of everything it was sent.
pub struct MemoryDatapath {
    dpid: Dpid,
    table: Mutex<BTreeMap<RuleKey, Vec<Action>>>,
    counters: Mutex<BTreeMap<RuleKey, (u64, u64)>>,
    log: Mutex<Vec<SouthboundMessage>>,
    stats_requests: AtomicU64,
    unreachable: AtomicBool,
}

impl MemoryDatapath {
    /// Create new in-memory switch
    pub fn new(dpid: Dpid) -> Self {
        Self {
            dpid,
            table: Mutex::new(BTreeMap::new()),
            counters: Mutex::new(BTreeMap::new()),
            log: Mutex::new(Vec::new()),
            stats_requests: AtomicU64::new(0),
            unreachable: AtomicBool::new(false),
        }
    }

    /// Make every following send fail
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Installed rules, highest priority first
    pub fn flow_table(&self) -> Vec<FlowMod> {
        self.table
            .lock()
            .iter()
            .rev()
            .map(|((priority, matcher), actions)| FlowMod::new(*priority, matcher.clone(), actions.clone()))
            .collect()
    }

    /// Rules installed at one priority
    pub fn rules_at(&self, priority: u16) -> Vec<FlowMod> {
        self.flow_table()
            .into_iter()
            .filter(|r| r.priority == priority)
            .collect()
    }

    /// Actions of an exact (priority, match) entry
    pub fn rule(&self, priority: u16, matcher: &FlowMatch) -> Option<Vec<Action>> {
        self.table.lock().get(&(priority, matcher.clone())).cloned()
    }

    /// Actions the switch would apply to a packet with the given headers.
    /// Rules match when every field they constrain equals the packet's.
    /// No matching rule means drop.
    pub fn forward(&self, packet: &FlowMatch) -> Vec<Action> {
        let covers = |rule: &FlowMatch| {
            fn field<T: PartialEq>(rule: &Option<T>, pkt: &Option<T>) -> bool {
                rule.is_none() || rule == pkt
            }
            field(&rule.in_port, &packet.in_port)
                && field(&rule.eth_type, &packet.eth_type)
                && field(&rule.eth_src, &packet.eth_src)
                && field(&rule.eth_dst, &packet.eth_dst)
                && field(&rule.ip_proto, &packet.ip_proto)
                && field(&rule.udp_dst, &packet.udp_dst)
        };

        self.table
            .lock()
            .iter()
            .filter(|((_, matcher), _)| covers(matcher))
            .max_by_key(|((priority, _), _)| *priority)
            .map(|(_, actions)| actions.clone())
            .unwrap_or_default()
    }

    /// Set cumulative counters of an installed rule
    pub fn set_counters(&self, priority: u16, matcher: &FlowMatch, bytes: u64, packets: u64) {
        self.counters
            .lock()
            .insert((priority, matcher.clone()), (bytes, packets));
    }

    /// Build a stats reply from the current table and counters
    pub fn stats_reply(&self) -> Vec<FlowStatsEntry> {
        let counters = self.counters.lock();
        self.table
            .lock()
            .keys()
            .map(|key| {
                let (byte_count, packet_count) = counters.get(key).copied().unwrap_or((0, 0));
                FlowStatsEntry {
                    priority: key.0,
                    matcher: key.1.clone(),
                    byte_count,
                    packet_count,
                }
            })
            .collect()
    }

    /// Everything sent so far
    pub fn sent(&self) -> Vec<SouthboundMessage> {
        self.log.lock().clone()
    }

    /// Number of flow mods received
    pub fn flow_mods_received(&self) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|m| matches!(m, SouthboundMessage::FlowMod(_)))
            .count()
    }

    /// Number of stats requests received
    pub fn stats_requests(&self) -> u64 {
        self.stats_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Datapath for MemoryDatapath {
    fn dpid(&self) -> Dpid {
        self.dpid
    }

    async fn send(&self, msg: SouthboundMessage) -> SliceResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SliceError::Transport {
                dpid: self.dpid,
                reason: "switch unreachable".into(),
            });
        }

        match &msg {
            SouthboundMessage::FlowMod(flow_mod) => {
                self.table.lock().insert(
                    (flow_mod.priority, flow_mod.matcher.clone()),
                    flow_mod.actions.clone(),
                );
            }
            SouthboundMessage::FlowStatsRequest => {
                self.stats_requests.fetch_add(1, Ordering::SeqCst);
            }
        }

        self.log.lock().push(msg);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slice_common::{priority, MacAddr};

    #[tokio::test]
    async fn test_install_overwrites_same_key() {
        let dp = MemoryDatapath::new(1);
        let m = FlowMatch::ipv4().with_eth_dst(MacAddr::new([0, 0, 0, 0, 0, 3]));

        dp.send(SouthboundMessage::FlowMod(FlowMod::new(250, m.clone(), vec![Action::Output(3)])))
            .await
            .unwrap();
        dp.send(SouthboundMessage::FlowMod(FlowMod::new(250, m.clone(), vec![Action::Output(4)])))
            .await
            .unwrap();

        assert_eq!(dp.rules_at(250).len(), 1);
        assert_eq!(dp.rule(250, &m), Some(vec![Action::Output(4)]));
        assert_eq!(dp.flow_mods_received(), 2);
    }

    #[tokio::test]
    async fn test_forward_highest_priority_wins() {
        let dp = MemoryDatapath::new(1);
        let h3 = MacAddr::new([0, 0, 0, 0, 0, 3]);

        for (prio, m, port) in [
            (priority::STANDARD, FlowMatch::ipv4().with_eth_dst(h3), 4),
            (priority::OVERRIDE, FlowMatch::ipv4().with_eth_dst(h3), 3),
        ] {
            dp.send(SouthboundMessage::FlowMod(FlowMod::new(prio, m, vec![Action::Output(port)])))
                .await
                .unwrap();
        }

        let packet = FlowMatch::ipv4().with_in_port(1).with_eth_dst(h3);
        assert_eq!(dp.forward(&packet), vec![Action::Output(3)]);

        // unmatched traffic is dropped
        assert!(dp.forward(&FlowMatch::arp()).is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_send_fails() {
        let dp = MemoryDatapath::new(9);
        dp.set_unreachable(true);

        let err = dp.send(SouthboundMessage::FlowStatsRequest).await.unwrap_err();
        assert!(matches!(err, SliceError::Transport { dpid: 9, .. }));
        assert_eq!(dp.stats_requests(), 0);
        assert!(dp.sent().is_empty());
    }

    #[tokio::test]
    async fn test_stats_reply_reports_counters() {
        let dp = MemoryDatapath::new(1);
        let video = FlowMatch::udp_dst(9999).with_in_port(1);
        dp.send(SouthboundMessage::FlowMod(FlowMod::new(300, video.clone(), vec![Action::Output(3)])))
            .await
            .unwrap();
        dp.set_counters(300, &video, 4096, 4);

        let reply = dp.stats_reply();
        assert_eq!(reply.len(), 1);
        assert_eq!(reply[0].byte_count, 4096);
        assert_eq!(reply[0].packet_count, 4);
    }
}
