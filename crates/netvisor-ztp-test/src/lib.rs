//! Integration test infrastructure for Netvisor provisioning
//!
//! Provides:
//! - A simulated multi-switch fabric implementing `CliTransport`
//! - Topology fixtures for common cabling patterns
//! - Call-log verification helpers

pub mod fixtures;
mod handlers;
mod sim;
mod verification;

pub use fixtures::*;
pub use sim::{
    SimBgpNeighbor, SimCall, SimCluster, SimFabric, SimFabricBuilder, SimInterface, SimOspfNetwork,
    SimPort, SimSwitch, SimTunnel, SimVlag, SimVlan, SimVrouter,
};
pub use verification::*;
