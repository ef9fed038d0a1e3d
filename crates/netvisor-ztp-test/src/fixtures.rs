//! Cabling fixtures.
//!
//! Spines use ports 1.. toward leaves in leaf order; leaves use ports 1..
//! toward spines in spine order. Cluster pairs are cabled on port 10.

use crate::sim::{SimFabric, SimFabricBuilder, SimSwitch};

/// Port used for spine-spine and leaf-leaf cluster links.
pub const CLUSTER_LINK_PORT: u16 = 10;

/// Default password used by fixture configurations.
pub const FIXTURE_PASSWORD: &str = "test123";

fn full_mesh(builder: SimFabricBuilder, spines: &[&str], leaves: &[&str]) -> SimFabricBuilder {
    let mut builder = builder;
    for (s_idx, spine) in spines.iter().enumerate() {
        for (l_idx, leaf) in leaves.iter().enumerate() {
            builder = builder.link(spine, l_idx as u16 + 1, leaf, s_idx as u16 + 1);
        }
    }
    builder
}

fn with_switches(names: &[&str]) -> SimFabricBuilder {
    names
        .iter()
        .fold(SimFabric::builder(), |b, name| b.switch(name))
}

/// spine1, spine2, leaf1, leaf2 fully meshed, no cluster links.
pub fn two_spine_two_leaf() -> SimFabric {
    let spines = ["spine1", "spine2"];
    let leaves = ["leaf1", "leaf2"];
    full_mesh(with_switches(&["spine1", "spine2", "leaf1", "leaf2"]), &spines, &leaves).build()
}

/// spine1 cabled to leaf1 on port 1.
pub fn one_spine_one_leaf() -> SimFabric {
    full_mesh(with_switches(&["spine1", "leaf1"]), &["spine1"], &["leaf1"]).build()
}

/// Fully meshed with spine1-spine2 and leaf1-leaf2 cabled for clustering.
pub fn two_spine_two_leaf_mesh() -> SimFabric {
    let spines = ["spine1", "spine2"];
    let leaves = ["leaf1", "leaf2"];
    full_mesh(with_switches(&["spine1", "spine2", "leaf1", "leaf2"]), &spines, &leaves)
        .link("spine1", CLUSTER_LINK_PORT, "spine2", CLUSTER_LINK_PORT)
        .link("leaf1", CLUSTER_LINK_PORT, "leaf2", CLUSTER_LINK_PORT)
        .build()
}

/// Fully meshed with only the leaves cabled for clustering.
pub fn two_spine_clustered_leaves() -> SimFabric {
    let spines = ["spine1", "spine2"];
    let leaves = ["leaf1", "leaf2"];
    full_mesh(with_switches(&["spine1", "spine2", "leaf1", "leaf2"]), &spines, &leaves)
        .link("leaf1", CLUSTER_LINK_PORT, "leaf2", CLUSTER_LINK_PORT)
        .build()
}

/// The fully clustered mesh plus `leaf3`, which has no cables.
pub fn mesh_with_isolated_leaf() -> SimFabric {
    let spines = ["spine1", "spine2"];
    let leaves = ["leaf1", "leaf2"];
    full_mesh(
        with_switches(&["spine1", "spine2", "leaf1", "leaf2", "leaf3"]),
        &spines,
        &leaves,
    )
    .link("spine1", CLUSTER_LINK_PORT, "spine2", CLUSTER_LINK_PORT)
    .link("leaf1", CLUSTER_LINK_PORT, "leaf2", CLUSTER_LINK_PORT)
    .build()
}

/// One standalone switch.
pub fn single_switch(host: &str) -> SimFabric {
    SimFabric::builder().switch(host).build()
}

/// Two switches with no cable between them.
pub fn unconnected_pair() -> SimFabric {
    with_switches(&["spine1", "leaf1"]).build()
}

/// One switch with a pending EULA and a factory host name.
pub fn factory_fresh_switch(host: &str) -> SimFabric {
    SimFabric::builder()
        .switch_with(SimSwitch::new(host).named("ONVL-0001").with_pending_eula())
        .build()
}

/// spine1 cabled to leaf1 on port 1; leaf1 has an uncabled 40g port 49
/// (bezel `1`, sub-ports 50-52 labelled `1.2`-`1.4`) and a 40g
/// port 53 (bezel `2`) cabled to `edge1`, which is outside the inventory.
pub fn split_candidate() -> SimFabric {
    SimFabric::builder()
        .switch("spine1")
        .switch_with(
            SimSwitch::new("leaf1")
                .with_40g_port(49, "1")
                .with_40g_port(53, "2"),
        )
        .switch("edge1")
        .link("spine1", 1, "leaf1", 1)
        .link("edge1", 1, "leaf1", 53)
        .build()
}
