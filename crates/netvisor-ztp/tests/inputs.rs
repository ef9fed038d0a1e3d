mod common;

use pretty_assertions::assert_eq;

use common::{config_with_inputs, plan_with_inputs, provision_ok};
use netvisor_ztp::ErrorKind;
use netvisor_ztp_test::{two_spine_two_leaf, two_spine_two_leaf_mesh, CallVerifier};

const SPINES: &[&str] = &["spine1", "spine2"];
const LEAVES: &[&str] = &["leaf1", "leaf2"];

#[tokio::test]
async fn test_vxlan_tunnels_between_spine_and_leaf() {
    let fabric = two_spine_two_leaf();
    let (_dir, plan) = plan_with_inputs(
        SPINES,
        LEAVES,
        "mode = \"l3\"",
        &[("vxlan_csv", "100, spine1, 5000, 47\n100, leaf1, 5000, 47\n")],
    );
    provision_ok(&fabric, plan).await;

    let vlans: Vec<_> = fabric.vlans().into_iter().filter(|v| v.id == 100).collect();
    assert_eq!(vlans.len(), 1);
    assert_eq!(vlans[0].scope, "fabric");
    assert_eq!(vlans[0].vxlan, Some(5000));

    let spine1 = fabric.switch("spine1").unwrap();
    let tunnel = &spine1.tunnels["spine1-to-leaf1-tunnel"];
    assert_eq!(tunnel.local_ip, "109.109.109.1");
    assert_eq!(tunnel.remote_ip, "109.109.109.3");
    assert!(tunnel.vxlans.contains(&5000));

    let leaf1 = fabric.switch("leaf1").unwrap();
    let tunnel = &leaf1.tunnels["leaf1-to-spine1-tunnel"];
    assert_eq!(tunnel.remote_ip, "109.109.109.1");
    assert!(tunnel.vxlans.contains(&5000));

    for sw in [&spine1, &leaf1] {
        assert_eq!(sw.trunk_of(47), Some("vxlan-loopback-trunk"));
    }
    assert!(fabric.switch("spine2").unwrap().tunnels.is_empty());
}

#[tokio::test]
async fn test_bgp_row_routes_a_port() {
    let fabric = two_spine_two_leaf_mesh();
    let (_dir, plan) = plan_with_inputs(
        SPINES,
        LEAVES,
        "",
        &[("bgp_csv", "leaf1, 20, 192.168.50.1/30, 65101, 192.168.50.2, 65200\n")],
    );
    provision_ok(&fabric, plan).await;

    let vrouter = fabric.vrouter("leaf1-vrouter").unwrap();
    assert_eq!(vrouter.attrs.get("bgp-as").map(String::as_str), Some("65101"));
    let interface = vrouter.interface_with_ip("192.168.50.1/30").unwrap();
    assert_eq!(interface.l3_port, Some(20));
    assert_eq!(vrouter.bgp.len(), 1);
    assert_eq!(vrouter.bgp[0].neighbor, "192.168.50.2");
    assert_eq!(vrouter.bgp[0].remote_as, "65200");
    assert!(fabric.vrouter("leaf2-vrouter").is_none());
}

#[tokio::test]
async fn test_ospf_rows_apply_to_the_named_switch() {
    let fabric = two_spine_two_leaf_mesh();
    let (_dir, plan) = config_with_inputs(
        SPINES,
        LEAVES,
        "",
        "ospf_switch = \"leaf2\"",
        &[("ospf_csv", "30, 192.168.60.1/30, 192.168.60.0/30, 0\n")],
    );
    provision_ok(&fabric, plan.unwrap()).await;

    let vrouter = fabric.vrouter("leaf2-vrouter").unwrap();
    assert_eq!(
        vrouter.interface_with_ip("192.168.60.1/30").unwrap().l3_port,
        Some(30)
    );
    assert_eq!(vrouter.ospf.len(), 1);
    assert_eq!(vrouter.ospf[0].network, "192.168.60.0/30");
    assert_eq!(vrouter.ospf[0].area, "0");
    CallVerifier::mutations(&fabric)
        .assert_not_called("leaf1", "vrouter-ospf-add")
        .unwrap();
}

#[test]
fn test_bad_row_rejects_the_plan() {
    let (_dir, plan) = config_with_inputs(
        SPINES,
        LEAVES,
        "",
        "",
        &[("bgp_csv", "leaf1, 20, 192.168.50.1/30, 65101, 192.168.50.2, 65200\nleaf9, 21, 192.168.51.1/30, 65101, 192.168.51.2, 65200\n")],
    );
    let err = plan.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputInvalid);
    assert!(err.to_string().contains("line 2: unknown switch 'leaf9'"));
}

#[test]
fn test_l2_tunnels_without_vrrp_rows_reject_the_plan() {
    let (_dir, plan) = config_with_inputs(
        SPINES,
        LEAVES,
        "",
        "",
        &[("vxlan_csv", "100, spine1, 5000, 47\n100, leaf1, 5000, 47\n")],
    );
    let err = plan.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputInvalid);
    assert!(err.to_string().contains("inputs.vxlan_csv"));
}
