mod common;

use pretty_assertions::assert_eq;

use common::{plan_with_inputs, provision, provision_ok};
use netvisor_ztp::ErrorKind;
use netvisor_ztp_test::{two_spine_clustered_leaves, two_spine_two_leaf, two_spine_two_leaf_mesh, CallVerifier};

const SPINES: &[&str] = &["spine1", "spine2"];
const LEAVES: &[&str] = &["leaf1", "leaf2"];
const L3: &str = "mode = \"l3\"";

#[tokio::test]
async fn test_leaf_pair_gateway_prefers_the_active_switch() {
    let fabric = two_spine_clustered_leaves();
    let (_dir, plan) = plan_with_inputs(
        SPINES,
        LEAVES,
        L3,
        &[("vrrp_csv", "101, 10.9.1.0/24, leaf1, leaf2, 25, leaf2\n")],
    );
    provision_ok(&fabric, plan).await;

    let vlan = fabric.vlans().into_iter().find(|v| v.id == 101).unwrap();
    assert_eq!(vlan.scope, "cluster");
    assert_eq!(vlan.created_on, "leaf2");

    let leaf2 = fabric.vrouter("leaf2-vrouter").unwrap();
    assert_eq!(leaf2.hw_vrrp_id, Some(25));
    let data = leaf2.interface_with_ip("10.9.1.2/24").unwrap();
    let vip = leaf2.interface_with_ip("10.9.1.1/24").unwrap();
    assert_eq!(vip.vrrp_id, Some(25));
    assert_eq!(vip.vrrp_priority, Some(110));
    assert_eq!(vip.vrrp_primary.as_deref(), Some(data.nic.as_str()));

    let leaf1 = fabric.vrouter("leaf1-vrouter").unwrap();
    assert_eq!(leaf1.hw_vrrp_id, Some(25));
    assert!(leaf1.interface_with_ip("10.9.1.3/24").is_some());
    assert_eq!(leaf1.interface_with_ip("10.9.1.1/24").unwrap().vrrp_priority, Some(109));

    // Spines keep the configured id.
    assert_eq!(fabric.vrouter("spine1-vrouter").unwrap().hw_vrrp_id, Some(18));
}

#[tokio::test]
async fn test_standalone_leaf_gets_a_plain_gateway() {
    let fabric = two_spine_two_leaf();
    let (_dir, plan) = plan_with_inputs(SPINES, LEAVES, L3, &[("vrrp_csv", "102, 10.9.2.0/24, leaf1\n")]);
    provision_ok(&fabric, plan).await;

    let vlan = fabric.vlans().into_iter().find(|v| v.id == 102).unwrap();
    assert_eq!(vlan.scope, "local");
    let gateway = fabric
        .vrouter("leaf1-vrouter")
        .unwrap()
        .interface_with_ip("10.9.2.1/24")
        .cloned()
        .unwrap();
    assert_eq!(gateway.vlan, Some(102));
    assert_eq!(gateway.vrrp_id, None);
}

#[tokio::test]
async fn test_leaf_pair_row_needs_a_leaf_cluster() {
    let fabric = two_spine_two_leaf();
    let (_dir, plan) = plan_with_inputs(
        SPINES,
        LEAVES,
        L3,
        &[("vrrp_csv", "101, 10.9.1.0/24, leaf1, leaf2, 25, leaf1\n")],
    );
    let summary = provision(&fabric, plan).await;

    assert_eq!(summary.error.as_ref().map(|e| e.kind()), Some(ErrorKind::TopologyInvalid));
    let leaf1 = summary
        .report
        .envelopes()
        .into_iter()
        .find(|e| e.switch == "leaf1")
        .unwrap();
    assert!(leaf1.failed);
    assert_eq!(leaf1.task, "Configure VRRP");
    assert_eq!(leaf1.msg, "Configure VRRP failed: TopologyInvalid");
    CallVerifier::mutations(&fabric)
        .assert_not_called("leaf1", "vlan-create id 101")
        .unwrap();
}

#[tokio::test]
async fn test_l2_gateway_lives_on_the_spine_cluster() {
    let fabric = two_spine_two_leaf_mesh();
    let (_dir, plan) = plan_with_inputs(SPINES, LEAVES, "", &[("vrrp_csv", "10.9.3.0/24, 103, spine2\n")]);
    provision_ok(&fabric, plan).await;

    let vlan = fabric.vlans().into_iter().find(|v| v.id == 103).unwrap();
    assert_eq!(vlan.scope, "fabric");

    let spine2 = fabric.vrouter("spine2-vrouter").unwrap();
    assert!(spine2.interface_with_ip("10.9.3.2/24").is_some());
    let vip = spine2.interface_with_ip("10.9.3.1/24").unwrap();
    assert_eq!(vip.vrrp_priority, Some(110));
    assert_eq!(vip.vrrp_id, Some(18));

    let spine1 = fabric.vrouter("spine1-vrouter").unwrap();
    assert!(spine1.interface_with_ip("10.9.3.3/24").is_some());
    assert!(fabric.vrouter("leaf1-vrouter").is_none());
}

#[tokio::test]
async fn test_l2_gateway_with_active_outside_the_cluster() {
    let fabric = two_spine_two_leaf_mesh();
    let (_dir, plan) = plan_with_inputs(SPINES, LEAVES, "", &[("vrrp_csv", "10.0.1.0/24, 100, leaf1\n")]);
    provision_ok(&fabric, plan).await;

    let vlans: Vec<_> = fabric.vlans().into_iter().filter(|v| v.id == 100).collect();
    assert_eq!(vlans.len(), 1);
    CallVerifier::mutations(&fabric)
        .assert_sequence(&[
            ("spine1", "vrouter-interface-add vrouter-name spine1-vrouter ip 10.0.1.2/24"),
            ("spine1", "vrouter-interface-add vrouter-name spine1-vrouter ip 10.0.1.1/24"),
        ])
        .unwrap();

    let spine1 = fabric.vrouter("spine1-vrouter").unwrap();
    assert_eq!(spine1.interface_with_ip("10.0.1.1/24").unwrap().vrrp_priority, Some(110));
    let spine2 = fabric.vrouter("spine2-vrouter").unwrap();
    assert!(spine2.interface_with_ip("10.0.1.3/24").is_some());
    assert_eq!(spine2.interface_with_ip("10.0.1.1/24").unwrap().vrrp_priority, Some(109));
}
