//! Provisioning domain types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use netvisor_cli_common::MutationOutcome;
use netvisor_types::PortId;

use crate::error::{ZtpError, ZtpResult};

/// Role a switch plays in the leaf/spine fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Spine,
    Leaf,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Spine => f.write_str("spine"),
            Role::Leaf => f.write_str("leaf"),
        }
    }
}

/// One inventory switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Switch {
    pub name: String,
    pub role: Role,
    /// 0-based position within its role list.
    pub index: usize,
    /// 1-based position in `spines ++ leaves`; drives in-band and loopback
    /// allocation.
    pub global_index: u32,
}

/// Ordered spine and leaf lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    spines: Vec<Switch>,
    leaves: Vec<Switch>,
}

impl Inventory {
    /// Builds the inventory; names must be non-empty and unique across roles.
    pub fn new(spines: &[String], leaves: &[String]) -> ZtpResult<Self> {
        let mut seen = BTreeSet::new();
        for name in spines.iter().chain(leaves) {
            if name.trim().is_empty() {
                return Err(ZtpError::invalid_config("spine_list/leaf_list", "empty switch name"));
            }
            if !seen.insert(name.as_str()) {
                return Err(ZtpError::invalid_config(
                    "spine_list/leaf_list",
                    format!("switch '{}' listed more than once", name),
                ));
            }
        }

        let build = |names: &[String], role: Role, offset: usize| -> Vec<Switch> {
            names
                .iter()
                .enumerate()
                .map(|(index, name)| Switch {
                    name: name.clone(),
                    role,
                    index,
                    global_index: (offset + index + 1) as u32,
                })
                .collect()
        };

        Ok(Self {
            spines: build(spines, Role::Spine, 0),
            leaves: build(leaves, Role::Leaf, spines.len()),
        })
    }

    pub fn spines(&self) -> &[Switch] {
        &self.spines
    }

    pub fn leaves(&self) -> &[Switch] {
        &self.leaves
    }

    /// Spines then leaves.
    pub fn all(&self) -> impl Iterator<Item = &Switch> {
        self.spines.iter().chain(self.leaves.iter())
    }

    pub fn get(&self, name: &str) -> Option<&Switch> {
        self.all().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_spine(&self, name: &str) -> bool {
        self.spines.iter().any(|s| s.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.spines.is_empty() && self.leaves.is_empty()
    }

    pub fn len(&self) -> usize {
        self.spines.len() + self.leaves.len()
    }

    pub fn spine_names(&self) -> Vec<String> {
        self.spines.iter().map(|s| s.name.clone()).collect()
    }

    pub fn leaf_names(&self) -> Vec<String> {
        self.leaves.iter().map(|s| s.name.clone()).collect()
    }
}

/// Fabric-wide provisioning mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FabricMode {
    /// Clusters, trunks and vLAGs.
    #[default]
    L2,
    /// Routed links, vRouters and a routing overlay.
    L3,
}

/// Routing overlay used in L3 mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingProtocol {
    #[default]
    Ebgp,
    Ospf,
}

/// BGP redistribution applied to every vRouter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Redistribute {
    None,
    Static,
    #[default]
    Connected,
    Rip,
    Ospf,
}

impl Redistribute {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Redistribute::None => "none",
            Redistribute::Static => "static",
            Redistribute::Connected => "connected",
            Redistribute::Rip => "rip",
            Redistribute::Ospf => "ospf",
        }
    }
}

/// Result of an idempotent operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    /// An existing entity was brought in line through a documented modify path.
    Modified,
    Removed,
    AlreadyPresent,
}

impl Outcome {
    pub fn changed(&self) -> bool {
        !matches!(self, Outcome::AlreadyPresent)
    }

    /// Combines two outcomes; any change wins.
    pub fn merge(self, other: Outcome) -> Outcome {
        match (self, other) {
            (Outcome::AlreadyPresent, o) => o,
            (s, _) => s,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::Modified => "modified",
            Outcome::Removed => "removed",
            Outcome::AlreadyPresent => "already present",
        }
    }
}

impl From<MutationOutcome> for Outcome {
    fn from(outcome: MutationOutcome) -> Self {
        match outcome {
            MutationOutcome::Applied => Outcome::Created,
            MutationOutcome::AlreadyApplied => Outcome::AlreadyPresent,
        }
    }
}

/// Unordered pair of switches, stored as `(min, max)` by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterPair {
    pub first: String,
    pub second: String,
}

impl ClusterPair {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.first == name || self.second == name
    }

    pub fn partner_of(&self, name: &str) -> Option<&str> {
        if self.first == name {
            Some(&self.second)
        } else if self.second == name {
            Some(&self.first)
        } else {
            None
        }
    }

    pub fn members(&self) -> [&str; 2] {
        [&self.first, &self.second]
    }
}

/// One LLDP adjacency as seen from `local_switch`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LldpEdge {
    pub local_switch: String,
    pub local_port: PortId,
    pub peer_switch: String,
    pub peer_port: PortId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_inventory_indices() {
        let inv = Inventory::new(&names(&["spine1", "spine2"]), &names(&["leaf1", "leaf2"])).unwrap();
        assert_eq!(inv.len(), 4);
        let leaf2 = inv.get("leaf2").unwrap();
        assert_eq!(leaf2.role, Role::Leaf);
        assert_eq!(leaf2.index, 1);
        assert_eq!(leaf2.global_index, 4);
        assert_eq!(inv.get("spine1").unwrap().global_index, 1);
        assert!(inv.is_spine("spine2"));
        assert!(!inv.is_spine("leaf1"));
    }

    #[test]
    fn test_inventory_rejects_duplicates() {
        let err = Inventory::new(&names(&["s1"]), &names(&["s1"])).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_cluster_pair_is_ordered() {
        let pair = ClusterPair::new("leaf2", "leaf1");
        assert_eq!(pair.first, "leaf1");
        assert_eq!(pair.partner_of("leaf1"), Some("leaf2"));
        assert_eq!(pair.partner_of("leaf3"), None);
        assert_eq!(pair, ClusterPair::new("leaf1", "leaf2"));
    }

    #[test]
    fn test_outcome_merge() {
        assert_eq!(
            Outcome::AlreadyPresent.merge(Outcome::Created),
            Outcome::Created
        );
        assert_eq!(
            Outcome::Modified.merge(Outcome::AlreadyPresent),
            Outcome::Modified
        );
        assert!(!Outcome::AlreadyPresent.changed());
        assert!(Outcome::Removed.changed());
    }
}
