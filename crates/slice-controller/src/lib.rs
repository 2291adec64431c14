//! Slice Controller - Congestion-responsive dynamic slicing
//!
//! Watches the monitored (video) traffic class at the edge switches and
//! moves standard traffic between the upper and lower slices when the
//! monitored rate crosses a hysteresis band.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    SliceController task                      │
//! │                                                              │
//! │  events ──► SwitchRegistry ──► FlowProgrammer ◄── RuleTemplates
//! │    │                               ▲                         │
//! │    │ stats reply                   │                         │
//! │    ▼                               │                         │
//! │  RateEstimator ──► HysteresisEngine ──► PolicyApplicator     │
//! │                                                              │
//! │  tick ──► TrafficMonitor ──► FlowStatsRequest                │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ Datapath
//!                        ┌───────┴───────┐
//!                        │ s1  s2  s3  s4│
//!                        └───────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod controller;
pub mod decision;
pub mod estimator;
pub mod monitor;
pub mod policy;
pub mod programmer;
pub mod registry;
pub mod southbound;
pub mod templates;

pub use controller::{ControllerEvent, ControllerHandle, ControllerStatus, SliceController};
pub use decision::{HysteresisEngine, SliceTransition};
pub use estimator::{RateEstimator, RateUpdate};
pub use monitor::TrafficMonitor;
pub use policy::{ApplyReport, PolicyApplicator};
pub use programmer::FlowProgrammer;
pub use registry::{Device, SwitchRegistry};
pub use southbound::{Datapath, DatapathHandle, MemoryDatapath};
pub use templates::RuleTemplates;
