//! Common Netvisor types for fabric provisioning.
//!
//! This crate provides type-safe representations of the primitives that
//! appear in Netvisor CLI arguments and provisioning inputs:
//!
//! - [`VlanId`]: VLAN identifiers usable on a Netvisor fabric (2-4092)
//! - [`VlanScope`]: replication scope of a VLAN
//! - [`PortId`], [`PortList`]: front-panel ports and CLI port lists
//! - [`NetworkType`]: mgmt vs in-band fabric planes

mod network;
mod port;
mod vlan;

pub use network::NetworkType;
pub use port::{PortId, PortList};
pub use vlan::{VlanId, VlanScope};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid VLAN ID: {0} (must be 2-4092)")]
    InvalidVlanId(u16),

    #[error("invalid VLAN ID: {0}")]
    MalformedVlanId(String),

    #[error("invalid VLAN scope: {0}")]
    InvalidVlanScope(String),

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("invalid port list: {0}")]
    InvalidPortList(String),

    #[error("invalid network type: {0} (expected mgmt or in-band)")]
    InvalidNetworkType(String),
}
