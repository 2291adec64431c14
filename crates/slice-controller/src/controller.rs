//! Controller task
//!
//! One task owns the registry, samples and slice state. Southbound events and
//! status queries arrive on a single queue and are handled one at a time,
//! interleaved with monitor ticks, so a disconnect and a late stats reply for
//! the same switch can never race.
//!
//! The slice decision is re-evaluated after every accepted stats reply and
//! after a monitored switch disconnects, since dropping its rate can move
//! the maximum below the release threshold.

use crate::{
    decision::{HysteresisEngine, SliceTransition},
    estimator::RateEstimator,
    monitor::TrafficMonitor,
    policy::PolicyApplicator,
    programmer::FlowProgrammer,
    registry::{Device, SwitchRegistry},
    southbound::DatapathHandle,
    templates::RuleTemplates,
};
use serde::Serialize;
use slice_common::{ControllerConfig, Dpid, FlowStatsEntry, SliceError, SliceResult, SliceState, SwitchRole};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EVENT_QUEUE_DEPTH: usize = 1024;

/// Input to the controller task
pub enum ControllerEvent {
    /// Switch session came up
    Connected {
        /// Session handle
        handle: DatapathHandle,
    },
    /// Switch session went away
    Disconnected {
        /// Switch identifier
        dpid: Dpid,
    },
    /// Per-rule counters from one switch
    FlowStatsReply {
        /// Reporting switch
        dpid: Dpid,
        /// Reply body
        entries: Vec<FlowStatsEntry>,
    },
    /// Snapshot request
    Status(oneshot::Sender<ControllerStatus>),
}

/// Point-in-time controller view
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    /// Active slice for standard traffic
    pub slice_state: SliceState,
    /// Maximum monitored rate, bytes/second
    pub max_rate: f64,
    /// Latest rate per monitored switch
    pub rates: BTreeMap<Dpid, f64>,
    /// Latest cumulative monitored bytes per monitored switch
    pub counters: BTreeMap<Dpid, u64>,
    /// Connected switches
    pub connected: Vec<Dpid>,
    /// Stats replies accepted
    pub stats_replies: u64,
    /// Stats requests sent
    pub stats_requests: u64,
    /// Counter resets detected
    pub counter_resets: u64,
    /// Slice flips
    pub transitions: u64,
    /// FlowMods sent
    pub flow_mods_sent: u64,
    /// FlowMods that failed
    pub flow_mods_failed: u64,
    /// Most recent flip
    pub last_transition: Option<SliceTransition>,
}

/// Client side of a running controller
#[derive(Clone)]
pub struct ControllerHandle {
    events: mpsc::Sender<ControllerEvent>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl ControllerHandle {
    /// Deliver any event
    pub async fn send(&self, event: ControllerEvent) -> SliceResult<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| SliceError::ChannelClosed)
    }

    /// Report a new switch session
    pub async fn connect(&self, handle: DatapathHandle) -> SliceResult<()> {
        self.send(ControllerEvent::Connected { handle }).await
    }

    /// Report a lost switch session
    pub async fn disconnect(&self, dpid: Dpid) -> SliceResult<()> {
        self.send(ControllerEvent::Disconnected { dpid }).await
    }

    /// Deliver a flow-stats reply
    pub async fn flow_stats_reply(&self, dpid: Dpid, entries: Vec<FlowStatsEntry>) -> SliceResult<()> {
        self.send(ControllerEvent::FlowStatsReply { dpid, entries }).await
    }

    /// Snapshot the controller. Resolves after every earlier event was handled.
    pub async fn status(&self) -> SliceResult<ControllerStatus> {
        let (tx, rx) = oneshot::channel();
        self.send(ControllerEvent::Status(tx)).await?;
        rx.await.map_err(|_| SliceError::ChannelClosed)
    }

    /// Ask the task to stop. It exits before its next monitor tick.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Dynamic slice controller
pub struct SliceController {
    config: ControllerConfig,
    templates: RuleTemplates,
    registry: SwitchRegistry,
    estimator: RateEstimator,
    engine: HysteresisEngine,
    programmer: FlowProgrammer,
    applicator: PolicyApplicator,
    monitor: TrafficMonitor,
    stats_replies: u64,
    transitions: u64,
    last_transition: Option<SliceTransition>,
}

impl SliceController {
    /// Create controller in its initial state. Rejects an inconsistent config.
    pub fn new(config: ControllerConfig) -> SliceResult<Self> {
        config.validate()?;
        let templates = RuleTemplates::new(&config);

        Ok(Self {
            estimator: RateEstimator::new(
                config.interval_secs(),
                config.monitored_udp_port,
                &config.topology.monitored_dpids(),
            ),
            engine: HysteresisEngine::new(config.congestion_threshold),
            monitor: TrafficMonitor::new(config.monitor_interval()),
            applicator: PolicyApplicator::new(templates.clone()),
            registry: SwitchRegistry::new(),
            programmer: FlowProgrammer::new(),
            stats_replies: 0,
            transitions: 0,
            last_transition: None,
            templates,
            config,
        })
    }

    /// Start the controller task
    pub fn spawn(config: ControllerConfig) -> SliceResult<(ControllerHandle, JoinHandle<()>)> {
        let controller = Self::new(config)?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(controller.run(events_rx, shutdown_rx));

        let handle = ControllerHandle {
            events: events_tx,
            shutdown: Arc::new(shutdown_tx),
        };
        Ok((handle, task))
    }

    /// Event loop. Returns on shutdown or once every handle is dropped.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<ControllerEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            "Slice controller started: interval {:?}, threshold {} B/s, release {} B/s",
            self.monitor.period(),
            self.engine.threshold(),
            self.engine.release_threshold()
        );

        let mut ticker = self.monitor.ticker();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => break,

                event = events.recv() => match event {
                    Some(event) => self.dispatch(event).await,
                    None => break,
                },

                _ = ticker.tick() => {
                    self.monitor.poll(&self.registry).await;
                }
            }
        }

        info!("Slice controller stopped in state {}", self.engine.state());
    }

    /// Route one event to its handler
    pub async fn dispatch(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::Connected { handle } => self.on_connect(handle).await,
            ControllerEvent::Disconnected { dpid } => self.on_disconnect(dpid).await,
            ControllerEvent::FlowStatsReply { dpid, entries } => self.on_flow_stats(dpid, &entries).await,
            ControllerEvent::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
    }

    async fn on_connect(&mut self, handle: DatapathHandle) {
        let dpid = handle.dpid();
        let role = self.config.topology.role(dpid).unwrap_or_else(|| {
            warn!("dpid {} is not in the topology, treating as unmanaged transit", dpid);
            SwitchRole::Transit
        });

        let device = Device::new(handle, role);
        if self.registry.on_connect(device.clone()).is_some() {
            info!("dpid {} reconnected, replacing stale session", dpid);
            self.estimator.reset(dpid);
        } else {
            info!("dpid {} connected ({:?})", dpid, role);
        }

        // static rules plus the override matching the current slice
        let state = self.engine.state();
        let mut rules = self.templates.static_rules(dpid);
        rules.extend(self.templates.override_rules(dpid, state));

        match self.programmer.install_all(&device, rules).await {
            Ok(n) => debug!("dpid {} programmed with {} rules for {}", dpid, n, state),
            Err(e) => warn!("dpid {} only partly programmed: {}", dpid, e),
        }
    }

    async fn on_disconnect(&mut self, dpid: Dpid) {
        let Some(device) = self.registry.on_disconnect(dpid) else {
            debug!("disconnect for unknown dpid {}", dpid);
            return;
        };
        info!("dpid {} disconnected", dpid);

        if device.is_monitored() {
            self.estimator.reset(dpid);
            self.reevaluate().await;
        }
    }

    async fn on_flow_stats(&mut self, dpid: Dpid, entries: &[FlowStatsEntry]) {
        if !self.registry.is_monitored(dpid) {
            debug!("ignoring stats reply from dpid {}", dpid);
            return;
        }
        self.stats_replies += 1;

        let update = self.estimator.record_reply(dpid, entries);
        if update.counter_reset {
            info!("dpid {} counter reset detected ({} bytes), delta clamped to 0", dpid, update.bytes);
        }
        debug!("dpid {} monitored rate {:.0} B/s", dpid, update.rate);

        self.reevaluate().await;
    }

    async fn reevaluate(&mut self) {
        let max_rate = self.estimator.max_rate();
        let Some(transition) = self.engine.evaluate(max_rate) else {
            return;
        };

        match transition.to {
            SliceState::Lower => info!(
                "*** Video detected ({:.2} Mbps). Standard traffic -> LOWER",
                mbps(max_rate)
            ),
            SliceState::Upper => info!(
                "*** Video ended ({:.2} Mbps). Standard traffic -> UPPER",
                mbps(max_rate)
            ),
        }

        let report = self
            .applicator
            .apply(transition.to, &self.registry, &mut self.programmer)
            .await;
        if !report.is_complete() {
            warn!(
                "Slice {} applied partially, switches {:?} keep the previous override",
                report.target, report.failed
            );
        }

        self.transitions += 1;
        self.last_transition = Some(transition);
    }

    /// Current status
    pub fn status(&self) -> ControllerStatus {
        let rates = self.estimator.rates();
        let counters = self
            .config
            .topology
            .monitored_dpids()
            .into_iter()
            .map(|id| (id, self.estimator.counter(id)))
            .collect();

        ControllerStatus {
            slice_state: self.engine.state(),
            max_rate: self.estimator.max_rate(),
            rates,
            counters,
            connected: self.registry.connected().iter().map(|d| d.dpid).collect(),
            stats_replies: self.stats_replies,
            stats_requests: self.monitor.requests_sent(),
            counter_resets: self.estimator.counter_resets(),
            transitions: self.transitions,
            flow_mods_sent: self.programmer.sent(),
            flow_mods_failed: self.programmer.failed(),
            last_transition: self.last_transition.clone(),
        }
    }
}

fn mbps(bytes_per_sec: f64) -> f64 {
    bytes_per_sec * 8.0 / 1e6
}
