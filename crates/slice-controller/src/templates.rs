//! Rule templates
//!
//! Every rule a switch ever receives is derived here from the topology
//! configuration. Static rules go out once per connection; override rules are
//! rewritten on every slice flip.
//!
//! | Priority | Purpose |
//! |----------|---------|
//! | 0   | default drop |
//! | 100 | ARP, kept inside the lower slice |
//! | 200 | standard class toward the lower slice |
//! | 210 | same-switch standard shortcut |
//! | 250 | slice override |
//! | 300 | monitored class toward the upper slice |
//! | 310 | same-switch monitored shortcut |

use slice_common::{
    priority, Action, ControllerConfig, Dpid, FlowMatch, FlowMod, SliceState, SwitchConfig,
    SwitchRole, TopologyConfig,
};

/// Rule set generator for one topology
#[derive(Debug, Clone)]
pub struct RuleTemplates {
    topology: TopologyConfig,
    monitored_port: u16,
}

impl RuleTemplates {
    /// Create from controller configuration
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            topology: config.topology.clone(),
            monitored_port: config.monitored_udp_port,
        }
    }

    /// Rules installed once when `dpid` connects. Unknown switches get only
    /// the default drop.
    pub fn static_rules(&self, dpid: Dpid) -> Vec<FlowMod> {
        let mut rules = vec![FlowMod::new(priority::DEFAULT_DROP, FlowMatch::any(), vec![])];

        match self.topology.switch(dpid) {
            Some(switch) if switch.role.is_edge() => rules.extend(self.edge_rules(switch)),
            Some(switch) => rules.extend(self.transit_rules(switch)),
            None => {}
        }

        rules
    }

    /// Priority-250 rules steering standard traffic toward far hosts onto
    /// the slice named by `state`. Empty for non-edge switches.
    pub fn override_rules(&self, dpid: Dpid, state: SliceState) -> Vec<FlowMod> {
        let Some(switch) = self.topology.switch(dpid).filter(|s| s.role.is_edge()) else {
            return Vec::new();
        };

        let path = match state {
            SliceState::Lower => &self.topology.lower_path,
            SliceState::Upper => &self.topology.upper_path,
        };
        let Some(out) = switch.port(path) else {
            return Vec::new();
        };

        self.topology
            .far_hosts(switch)
            .into_iter()
            .map(|host| {
                FlowMod::new(
                    priority::OVERRIDE,
                    FlowMatch::ipv4().with_eth_dst(host.mac),
                    vec![Action::Output(out)],
                )
            })
            .collect()
    }

    fn edge_rules(&self, switch: &SwitchConfig) -> Vec<FlowMod> {
        let mut rules = Vec::new();
        let (Some(upper), Some(lower)) = (
            switch.port(&self.topology.upper_path),
            switch.port(&self.topology.lower_path),
        ) else {
            return rules;
        };

        let local: Vec<_> = self
            .topology
            .local_hosts(switch)
            .into_iter()
            .filter_map(|h| h.port.map(|port| (h.mac, port)))
            .collect();
        let far = self.topology.far_hosts(switch);

        // ARP reaches local hosts and the lower slice only
        let mut arp_out: Vec<_> = local.iter().map(|(_, port)| Action::Output(*port)).collect();
        arp_out.push(Action::Output(lower));
        rules.push(FlowMod::new(priority::ARP, FlowMatch::arp(), arp_out));

        for (_, port) in &local {
            rules.push(FlowMod::new(
                priority::MONITORED,
                FlowMatch::udp_dst(self.monitored_port).with_in_port(*port),
                vec![Action::Output(upper)],
            ));
        }

        for (src, _) in &local {
            for (dst, dst_port) in local.iter().filter(|(mac, _)| mac != src) {
                rules.push(FlowMod::new(
                    priority::MONITORED_LOCAL,
                    FlowMatch::udp_dst(self.monitored_port)
                        .with_eth_src(*src)
                        .with_eth_dst(*dst),
                    vec![Action::Output(*dst_port)],
                ));
            }
        }

        for (mac, port) in &local {
            rules.push(FlowMod::new(
                priority::STANDARD_LOCAL,
                FlowMatch::ipv4().with_eth_dst(*mac),
                vec![Action::Output(*port)],
            ));
        }

        for host in &far {
            rules.push(FlowMod::new(
                priority::STANDARD,
                FlowMatch::ipv4().with_eth_dst(host.mac),
                vec![Action::Output(lower)],
            ));
        }

        // return traffic arriving over either slice
        for (mac, port) in &local {
            rules.push(FlowMod::new(
                priority::MONITORED,
                FlowMatch::ipv4().with_in_port(upper).with_eth_dst(*mac),
                vec![Action::Output(*port)],
            ));
            rules.push(FlowMod::new(
                priority::STANDARD,
                FlowMatch::ipv4().with_in_port(lower).with_eth_dst(*mac),
                vec![Action::Output(*port)],
            ));
        }

        rules
    }

    fn transit_rules(&self, switch: &SwitchConfig) -> Vec<FlowMod> {
        let prio = if switch.name == self.topology.upper_path {
            priority::MONITORED
        } else if switch.name == self.topology.lower_path {
            priority::STANDARD
        } else {
            return Vec::new();
        };

        let neighbor = |role| {
            self.topology
                .switch_by_role(role)
                .and_then(|edge| switch.port(&edge.name))
        };
        let (Some(ingress), Some(egress)) = (neighbor(SwitchRole::Ingress), neighbor(SwitchRole::Egress)) else {
            return Vec::new();
        };

        let mut rules = Vec::new();

        // ARP on the upper slice falls through to the default drop
        if prio == priority::STANDARD {
            rules.push(FlowMod::new(priority::ARP, FlowMatch::arp(), vec![Action::Flood]));
        }

        rules.push(FlowMod::new(prio, FlowMatch::ipv4().with_in_port(ingress), vec![Action::Output(egress)]));
        rules.push(FlowMod::new(prio, FlowMatch::ipv4().with_in_port(egress), vec![Action::Output(ingress)]));

        rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slice_common::MacAddr;

    fn templates() -> RuleTemplates {
        RuleTemplates::new(&ControllerConfig::default())
    }

    fn mac(i: u8) -> MacAddr {
        MacAddr::new([0, 0, 0, 0, 0, i])
    }

    fn find(rules: &[FlowMod], prio: u16, m: &FlowMatch) -> Option<Vec<Action>> {
        rules
            .iter()
            .find(|r| r.priority == prio && &r.matcher == m)
            .map(|r| r.actions.clone())
    }

    #[test]
    fn test_ingress_static_rules() {
        let rules = templates().static_rules(1);

        assert_eq!(find(&rules, 0, &FlowMatch::any()), Some(vec![]));
        assert_eq!(
            find(&rules, 100, &FlowMatch::arp()),
            Some(vec![Action::Output(1), Action::Output(2), Action::Output(4)])
        );
        assert_eq!(
            find(&rules, 300, &FlowMatch::udp_dst(9999).with_in_port(2)),
            Some(vec![Action::Output(3)])
        );
        assert_eq!(
            find(&rules, 310, &FlowMatch::udp_dst(9999).with_eth_src(mac(2)).with_eth_dst(mac(1))),
            Some(vec![Action::Output(1)])
        );
        assert_eq!(
            find(&rules, 210, &FlowMatch::ipv4().with_eth_dst(mac(2))),
            Some(vec![Action::Output(2)])
        );
        assert_eq!(
            find(&rules, 200, &FlowMatch::ipv4().with_eth_dst(mac(4))),
            Some(vec![Action::Output(4)])
        );
        assert_eq!(
            find(&rules, 300, &FlowMatch::ipv4().with_in_port(3).with_eth_dst(mac(1))),
            Some(vec![Action::Output(1)])
        );
        assert_eq!(
            find(&rules, 200, &FlowMatch::ipv4().with_in_port(4).with_eth_dst(mac(2))),
            Some(vec![Action::Output(2)])
        );

        // 1 drop + 1 arp + 2 video + 2 local video + 2 local + 2 far + 4 return
        assert_eq!(rules.len(), 14);
        assert!(rules.iter().all(|r| r.priority != priority::OVERRIDE));
    }

    #[test]
    fn test_egress_static_rules() {
        let rules = templates().static_rules(4);

        assert_eq!(
            find(&rules, 100, &FlowMatch::arp()),
            Some(vec![Action::Output(3), Action::Output(4), Action::Output(2)])
        );
        assert_eq!(
            find(&rules, 300, &FlowMatch::udp_dst(9999).with_in_port(3)),
            Some(vec![Action::Output(1)])
        );
        assert_eq!(
            find(&rules, 200, &FlowMatch::ipv4().with_eth_dst(mac(1))),
            Some(vec![Action::Output(2)])
        );
    }

    #[test]
    fn test_transit_rules() {
        let t = templates();

        let upper = t.static_rules(2);
        assert!(find(&upper, 100, &FlowMatch::arp()).is_none());
        assert_eq!(
            find(&upper, 300, &FlowMatch::ipv4().with_in_port(1)),
            Some(vec![Action::Output(2)])
        );
        assert_eq!(
            find(&upper, 300, &FlowMatch::ipv4().with_in_port(2)),
            Some(vec![Action::Output(1)])
        );

        let lower = t.static_rules(3);
        assert_eq!(find(&lower, 100, &FlowMatch::arp()), Some(vec![Action::Flood]));
        assert_eq!(
            find(&lower, 200, &FlowMatch::ipv4().with_in_port(1)),
            Some(vec![Action::Output(2)])
        );
    }

    #[test]
    fn test_unknown_switch_gets_drop_only() {
        let rules = templates().static_rules(99);
        assert_eq!(rules.len(), 1);
        assert!(rules[0].is_drop());
    }

    #[test]
    fn test_override_rules_follow_state() {
        let t = templates();

        let lower = t.override_rules(1, SliceState::Lower);
        assert_eq!(lower.len(), 2);
        assert!(lower.iter().all(|r| r.priority == 250 && r.actions == vec![Action::Output(4)]));

        let upper = t.override_rules(4, SliceState::Upper);
        let dsts: Vec<_> = upper.iter().map(|r| r.matcher.eth_dst).collect();
        assert_eq!(dsts, vec![Some(mac(1)), Some(mac(2))]);
        assert!(upper.iter().all(|r| r.actions == vec![Action::Output(1)]));

        assert!(t.override_rules(2, SliceState::Lower).is_empty());
    }

    #[test]
    fn test_custom_monitored_port() {
        let config = ControllerConfig {
            monitored_udp_port: 5004,
            ..ControllerConfig::default()
        };
        let rules = RuleTemplates::new(&config).static_rules(1);
        assert!(find(&rules, 300, &FlowMatch::udp_dst(5004).with_in_port(1)).is_some());
        assert!(find(&rules, 300, &FlowMatch::udp_dst(9999).with_in_port(1)).is_none());
    }
}
