//! Entity naming.
//!
//! Names are part of the on-switch state that later runs compare against,
//! so they must stay stable across releases: cluster, trunk and vLAG names are
//! cut to 59 characters from the right.

use tracing::warn;

/// Longest cluster/trunk/vLAG name accepted by the CLI.
pub const MAX_NAME_LEN: usize = 59;

/// Trunk that carries VXLAN loopback ports on every switch.
pub const VXLAN_LOOPBACK_TRUNK: &str = "vxlan-loopback-trunk";

fn trim(name: String) -> String {
    if name.chars().count() <= MAX_NAME_LEN {
        return name;
    }
    let trimmed: String = name.chars().take(MAX_NAME_LEN).collect();
    warn!("Name {} truncated to {}", name, trimmed);
    trimmed
}

/// `<a>-to-<b>-cluster`
pub fn cluster_name(a: &str, b: &str) -> String {
    trim(format!("{}-to-{}-cluster", a, b))
}

/// `<a>-to-<b>-trunk`
pub fn trunk_name(a: &str, b: &str) -> String {
    trim(format!("{}-to-{}-trunk", a, b))
}

/// `<a>-<b>-to-<c>-vlag`
pub fn vlag_name(a: &str, b: &str, c: &str) -> String {
    trim(format!("{}-{}-to-{}-vlag", a, b, c))
}

/// `spine-to-<leaf>`
pub fn spine_trunk_name(leaf: &str) -> String {
    trim(format!("spine-to-{}", leaf))
}

pub fn vrouter_name(switch: &str) -> String {
    format!("{}-vrouter", switch)
}

pub fn vnet_name(fabric: &str) -> String {
    format!("{}-global", fabric)
}

pub fn tunnel_name(local: &str, remote: &str) -> String {
    trim(format!("{}-to-{}-tunnel", local, remote))
}

/// Names in `names` that are equal after truncation, which would make two
/// entities share one name on the switch.
pub fn collisions<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    let mut dups = Vec::new();
    for name in names {
        if !seen.insert(name) {
            dups.push(name.to_string());
        }
    }
    dups
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_short_names() {
        assert_eq!(cluster_name("leaf1", "leaf2"), "leaf1-to-leaf2-cluster");
        assert_eq!(trunk_name("leaf1", "spine1"), "leaf1-to-spine1-trunk");
        assert_eq!(vlag_name("leaf1", "leaf2", "spine1"), "leaf1-leaf2-to-spine1-vlag");
        assert_eq!(spine_trunk_name("leaf1"), "spine-to-leaf1");
        assert_eq!(vrouter_name("spine1"), "spine1-vrouter");
        assert_eq!(vnet_name("f1"), "f1-global");
        assert_eq!(tunnel_name("spine1", "leaf1"), "spine1-to-leaf1-tunnel");
    }

    #[test]
    fn test_long_names_are_cut_from_the_right() {
        let a = "datacenter-east-row-12-rack-04-leaf-a";
        let b = "datacenter-east-row-12-rack-04-leaf-b";
        let name = cluster_name(a, b);
        assert_eq!(name.len(), MAX_NAME_LEN);
        assert_eq!(name, "datacenter-east-row-12-rack-04-leaf-a-to-datacenter-east-ro");
    }

    #[test]
    fn test_truncation_collisions() {
        let a = cluster_name(
            "datacenter-east-row-12-rack-04-leaf-a",
            "datacenter-east-row-12-rack-04-leaf-b",
        );
        let b = cluster_name(
            "datacenter-east-row-12-rack-04-leaf-a",
            "datacenter-east-row-12-rack-04-leaf-c",
        );
        assert_eq!(collisions([a.as_str(), b.as_str()]), vec![a.clone()]);
        assert!(collisions(["x", "y"]).is_empty());
    }
}
