//! Zero-touch provisioning for Netvisor leaf/spine fabrics.
//!
//! This crate takes switches from factory state to a configured fabric by
//! driving the switch CLI. A run has two halves:
//!
//! - [`phases`]: per-switch setup (EULA, naming, fabric join, ports, in-band
//!   address), one [`PhaseRunner`] per switch, all in parallel
//! - [`orchestrator`]: fabric-wide configuration issued through one anchor
//!   switch once every switch has joined (clusters, trunks and vLAGs in L2;
//!   vRouters, link addressing and eBGP/OSPF in L3; VRRP and VXLAN from the
//!   CSV inputs)
//!
//! Every write is guarded by a read, so a second run against a configured
//! fabric changes nothing.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use netvisor_cli_common::LocalTransport;
//! use netvisor_ztp::{FabricPlan, Provisioner, ZtpConfig};
//!
//! let plan = FabricPlan::from_config(ZtpConfig::from_file("ztp.toml")?)?;
//! let summary = Provisioner::new(plan, Arc::new(LocalTransport)).run().await;
//! for envelope in summary.report.envelopes() {
//!     println!("{}", serde_json::to_string(&envelope)?);
//! }
//! ```

pub mod address;
pub mod commands;
pub mod config;
pub mod error;
pub mod facts;
pub mod inputs;
pub mod naming;
pub mod ops;
pub mod orchestrator;
pub mod phases;
pub mod plan;
pub mod report;
pub mod run;
pub mod split40g;
pub mod topology;
pub mod types;

pub use config::{TransportKind, ZtpConfig};
pub use error::{ErrorKind, ZtpError, ZtpResult};
pub use orchestrator::{FabricOrchestrator, Topology};
pub use phases::{Phase, PhaseContext, PhaseRunner};
pub use plan::FabricPlan;
pub use report::{Envelope, RunReport, TaskRecord};
pub use run::{Provisioner, RunSummary};
pub use types::{FabricMode, Outcome, RoutingProtocol};
