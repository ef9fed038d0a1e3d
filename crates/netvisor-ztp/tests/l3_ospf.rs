mod common;

use pretty_assertions::assert_eq;

use common::{plan, provision_ok};
use netvisor_ztp_test::{
    one_spine_one_leaf, two_spine_clustered_leaves, two_spine_two_leaf, CallVerifier, SimFabric,
};

const SPINES: &[&str] = &["spine1", "spine2"];
const LEAVES: &[&str] = &["leaf1", "leaf2"];
const OSPF: &str = "mode = \"l3\"\nrouting_protocol = \"ospf\"";

fn networks(fabric: &SimFabric, switch: &str) -> Vec<(String, String)> {
    let vr = fabric.vrouter(&format!("{}-vrouter", switch)).unwrap();
    let mut found: Vec<_> = vr
        .ospf
        .iter()
        .map(|n| (n.network.clone(), n.area.clone()))
        .collect();
    found.sort();
    found
}

fn net(network: &str, area: &str) -> (String, String) {
    (network.to_string(), area.to_string())
}

#[tokio::test]
async fn test_each_leaf_group_gets_its_own_area() {
    let fabric = two_spine_two_leaf();
    provision_ok(&fabric, plan(SPINES, LEAVES, OSPF)).await;

    assert_eq!(
        networks(&fabric, "spine1"),
        vec![net("10.0.0.0/30", "1"), net("10.0.0.4/30", "2")]
    );
    assert_eq!(
        networks(&fabric, "leaf1"),
        vec![net("10.0.0.0/30", "1"), net("10.0.0.8/30", "1")]
    );
    assert_eq!(
        networks(&fabric, "leaf2"),
        vec![net("10.0.0.12/30", "2"), net("10.0.0.4/30", "2")]
    );

    let calls = CallVerifier::mutations(&fabric);
    calls.assert_count("vrouter-bgp-add", 0).unwrap();
    calls.assert_count("vrouter-ospf-add", 8).unwrap();
    let spine2 = fabric.vrouter("spine2-vrouter").unwrap();
    assert_eq!(spine2.attrs["ospf-redistribute"], "static,connected");
}

#[tokio::test]
async fn test_clustered_leaves_run_iospf_over_the_overlay_vlan() {
    let fabric = two_spine_clustered_leaves();
    provision_ok(&fabric, plan(SPINES, LEAVES, OSPF)).await;

    for switch in ["leaf1", "leaf2"] {
        let found = networks(&fabric, switch);
        assert!(found.contains(&net("75.75.75.0/30", "1")), "{}: {:?}", switch, found);
        assert!(found.iter().all(|(_, area)| area == "1"), "{}", switch);
    }
    let leaf2 = fabric.vrouter("leaf2-vrouter").unwrap();
    assert_eq!(leaf2.interface_with_ip("75.75.75.2/30").unwrap().vlan, Some(4040));

    let local: Vec<_> = fabric
        .vlans()
        .into_iter()
        .filter(|v| v.id == 4040)
        .map(|v| v.scope)
        .collect();
    assert_eq!(local, vec!["local".to_string(), "local".to_string()]);
}

#[tokio::test]
async fn test_ospf_bfd_is_enabled_per_link_interface() {
    let fabric = two_spine_two_leaf();
    provision_ok(&fabric, plan(SPINES, LEAVES, "mode = \"l3\"\nrouting_protocol = \"ospf\"\nbfd = true")).await;

    let leaf1 = fabric.vrouter("leaf1-vrouter").unwrap();
    let nic = &leaf1.interface_with_ip("10.0.0.2/30").unwrap().nic;
    assert_eq!(leaf1.interface_config[nic]["ospf-bfd"], "enable");
}

#[tokio::test]
async fn test_third_party_spines_get_leaf_side_areas() {
    let fabric = two_spine_two_leaf();
    let extra = format!("{}\nthird_party_spines = true", OSPF);
    provision_ok(&fabric, plan(SPINES, LEAVES, &extra)).await;

    assert!(CallVerifier::new(&fabric)
        .calls()
        .iter()
        .all(|c| c.target != "spine1" && c.target != "spine2"));
    assert_eq!(
        networks(&fabric, "leaf1"),
        vec![net("10.0.0.0/30", "1"), net("10.0.0.8/30", "1")]
    );
    assert_eq!(
        networks(&fabric, "leaf2"),
        vec![net("10.0.0.12/30", "2"), net("10.0.0.4/30", "2")]
    );
    CallVerifier::mutations(&fabric)
        .assert_count("vrouter-ospf-add", 4)
        .unwrap();
}

#[tokio::test]
async fn test_single_leaf_under_third_party_spine_joins_ospf() {
    let fabric = one_spine_one_leaf();
    let extra = format!("{}\nthird_party_spines = true", OSPF);
    provision_ok(&fabric, plan(&["spine1"], &["leaf1"], &extra)).await;

    assert!(fabric.vrouter("spine1-vrouter").is_none());
    assert_eq!(networks(&fabric, "leaf1"), vec![net("10.0.0.0/30", "1")]);
}
