//! VLAN ID and scope types with validation.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// VLAN identifier usable on a Netvisor fabric (2-4092).
///
/// VLAN 0 and 1 are reserved (priority tagging, default VLAN).
/// VLANs 4093-4095 are reserved for internal fabric use.
///
/// # Examples
///
/// ```
/// use netvisor_types::VlanId;
///
/// let vlan = VlanId::new(100).unwrap();
/// assert_eq!(vlan.as_u16(), 100);
///
/// assert!(VlanId::new(1).is_err());
/// assert!(VlanId::new(4093).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct VlanId(u16);

impl VlanId {
    /// Minimum usable VLAN ID.
    pub const MIN: u16 = 2;

    /// Maximum usable VLAN ID.
    pub const MAX: u16 = 4092;

    /// Creates a new VLAN ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the VLAN ID is reserved (0, 1, 4093-4095) or out of range.
    pub const fn new(id: u16) -> Result<Self, ParseError> {
        if id >= Self::MIN && id <= Self::MAX {
            Ok(VlanId(id))
        } else {
            Err(ParseError::InvalidVlanId(id))
        }
    }

    /// Returns the VLAN ID as a u16.
    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// Returns true if `id` is one of the reserved VLAN ids.
    pub const fn is_reserved(id: u16) -> bool {
        id < Self::MIN || id > Self::MAX
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VlanId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: u16 = s
            .trim()
            .parse()
            .map_err(|_| ParseError::MalformedVlanId(s.to_string()))?;
        VlanId::new(id)
    }
}

impl TryFrom<u16> for VlanId {
    type Error = ParseError;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        VlanId::new(id)
    }
}

impl From<VlanId> for u16 {
    fn from(vlan: VlanId) -> u16 {
        vlan.0
    }
}

/// Replication scope of a VLAN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VlanScope {
    /// Visible on the creating switch only.
    Local,
    /// Replicated to both members of the switch's cluster.
    Cluster,
    /// Replicated to every fabric member.
    Fabric,
}

impl VlanScope {
    pub const fn as_str(&self) -> &'static str {
        match self {
            VlanScope::Local => "local",
            VlanScope::Cluster => "cluster",
            VlanScope::Fabric => "fabric",
        }
    }
}

impl fmt::Display for VlanScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VlanScope {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(VlanScope::Local),
            "cluster" => Ok(VlanScope::Cluster),
            "fabric" => Ok(VlanScope::Fabric),
            _ => Err(ParseError::InvalidVlanScope(s.to_string())),
        }
    }
}
