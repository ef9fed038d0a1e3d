//! CLI request builders
//!
//! One function per CLI verb used by provisioning. Queries always ask for an
//! explicit column list with `no-show-headers` so that the parsers in
//! [`crate::facts`] can rely on column order.

use ipnet::IpNet;
use std::fmt;
use std::net::IpAddr;

use netvisor_cli_common::CliRequest;
use netvisor_types::{NetworkType, PortId, PortList, VlanId, VlanScope};

/// Router type for every vRouter created by provisioning.
pub const ROUTER_TYPE: &str = "hardware";

/// Speed split 40g ports are set to.
pub const SPLIT_SPEED: &str = "10g";

/// Columns of [`build_interface_show`], in order.
pub const INTERFACE_COLUMNS: &[&str] = &["nic", "ip", "vlan", "l3-port", "vrrp-primary"];

/// Where a vRouter interface is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    Vlan(VlanId),
    L3Port(PortId),
}

impl Attachment {
    /// CLI argument name.
    pub const fn key(&self) -> &'static str {
        match self {
            Attachment::Vlan(_) => "vlan",
            Attachment::L3Port(_) => "l3-port",
        }
    }

    pub fn value(&self) -> String {
        match self {
            Attachment::Vlan(vlan) => vlan.to_string(),
            Attachment::L3Port(port) => port.to_string(),
        }
    }
}

impl fmt::Display for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.key(), self.value())
    }
}

/// VRRP settings of a VIP interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VrrpSettings {
    pub id: u16,
    /// NIC of the data interface the VIP rides on.
    pub primary_nic: String,
    pub priority: u16,
}

/// Optional knobs of a BGP neighbor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BgpNeighborFlags {
    pub next_hop_self: bool,
    pub weight: Option<u32>,
    pub allowas_in: bool,
    pub bfd: bool,
}

// Setup

/// Build EULA query; fails with stderr while the EULA is pending
pub fn build_eula_show() -> CliRequest {
    CliRequest::new("eula-show").setup().may_fail()
}

/// Build EULA acceptance through the setup CLI
pub fn build_eula_accept(password: &str) -> CliRequest {
    CliRequest::new("switch-setup-modify")
        .arg("password", password)
        .arg("eula-accepted", "true")
        .setup()
        .script_password()
}

/// Build switch-setup query for the given keys (`key: value` output)
pub fn build_switch_setup_show(keys: &[&str]) -> CliRequest {
    CliRequest::new("switch-setup-show").format(keys)
}

/// Build switch-setup modification with `(key, value)` pairs in order
pub fn build_switch_setup_modify(values: &[(&str, String)]) -> CliRequest {
    values
        .iter()
        .fold(CliRequest::new("switch-setup-modify"), |req, (key, value)| {
            req.arg(key, value)
        })
}

// Fabric

/// Build fabric-info query; fails with stderr outside a fabric
pub fn build_fabric_info() -> CliRequest {
    CliRequest::new("fabric-info").may_fail()
}

/// Build list of fabrics visible on the network
pub fn build_fabric_show() -> CliRequest {
    CliRequest::new("fabric-show")
        .format(&["name"])
        .no_show_headers()
}

pub fn build_fabric_create(
    name: &str,
    fabric_network: NetworkType,
    control_network: NetworkType,
) -> CliRequest {
    CliRequest::new("fabric-create")
        .arg("name", name)
        .arg("fabric-network", fabric_network)
        .arg("control-network", control_network)
}

pub fn build_fabric_join(name: &str) -> CliRequest {
    CliRequest::new("fabric-join").arg("name", name)
}

pub fn build_control_network_modify(network: NetworkType) -> CliRequest {
    CliRequest::new("fabric-local-modify").arg("control-network", network)
}

pub fn build_fabric_network_modify(network: NetworkType) -> CliRequest {
    CliRequest::new("fabric-local-modify").arg("fabric-network", network)
}

/// Build fabric member count query (`Count: N`)
pub fn build_fabric_node_count() -> CliRequest {
    CliRequest::new("fabric-node-show").count_output()
}

// Switch services

pub fn build_web_show() -> CliRequest {
    CliRequest::new("admin-service-show")
        .arg("if", "mgmt")
        .format(&["web"])
        .no_show_headers()
}

pub fn build_web_enable() -> CliRequest {
    CliRequest::new("admin-service-modify")
        .arg("if", "mgmt")
        .flag("web")
}

pub fn build_stp_show() -> CliRequest {
    CliRequest::new("stp-show")
        .format(&["enable"])
        .no_show_headers()
}

pub fn build_stp_modify(enable: bool) -> CliRequest {
    CliRequest::new("stp-modify").flag(if enable { "enable" } else { "disable" })
}

pub fn build_auto_trunk_show() -> CliRequest {
    CliRequest::new("system-settings-show")
        .format(&["auto-trunk"])
        .no_show_headers()
}

pub fn build_auto_trunk_modify(enable: bool) -> CliRequest {
    CliRequest::new("system-settings-modify").flag(if enable {
        "enable-auto-trunk"
    } else {
        "disable-auto-trunk"
    })
}

// Ports

/// Build port state query (`port enable speed` rows)
pub fn build_port_config_show() -> CliRequest {
    CliRequest::new("port-config-show")
        .format(&["port", "enable", "speed"])
        .no_show_headers()
}

/// Build enable/disable of a port list, rendered as a range when contiguous
pub fn build_port_enable(ports: &PortList, enable: bool) -> CliRequest {
    CliRequest::new("port-config-modify")
        .arg("port", ports.to_range_string())
        .flag(if enable { "enable" } else { "disable" })
}

pub fn build_port_speed(port: PortId, speed: &str) -> CliRequest {
    CliRequest::new("port-config-modify")
        .arg("port", port)
        .arg("speed", speed)
}

/// Build front-panel label query for one port; absent ports fail
pub fn build_port_bezel(port: PortId) -> CliRequest {
    CliRequest::new("port-show")
        .arg("port", port)
        .format(&["bezel-port"])
        .no_show_headers()
        .may_fail()
}

/// Build LLDP query (`local-port switch port` rows)
pub fn build_lldp_show() -> CliRequest {
    CliRequest::new("lldp-show")
        .format(&["local-port", "switch", "port"])
        .no_show_headers()
}

// VLANs

pub fn build_vlan_show() -> CliRequest {
    CliRequest::new("vlan-show")
        .format(&["id", "scope"])
        .no_show_headers()
}

pub fn build_vlan_create(
    id: VlanId,
    scope: VlanScope,
    vxlan: Option<u32>,
    untagged_ports: Option<&PortList>,
) -> CliRequest {
    CliRequest::new("vlan-create")
        .arg("id", id)
        .arg("scope", scope)
        .arg_opt("vxlan", vxlan)
        .arg_opt("untagged-ports", untagged_ports)
}

// vRouters

/// Build vRouter listing (`name location vnet router-type` rows)
pub fn build_vrouter_list() -> CliRequest {
    CliRequest::new("vrouter-show")
        .format(&["name", "location", "vnet", "router-type"])
        .no_show_headers()
}

/// Build single-attribute vRouter query (`<name> <value>`)
pub fn build_vrouter_attr(name: &str, attr: &str) -> CliRequest {
    CliRequest::new("vrouter-show")
        .arg("name", name)
        .format(&[attr])
        .no_show_headers()
        .may_fail()
}

pub fn build_vrouter_create(name: &str, vnet: &str, hw_vrrp_id: Option<u16>) -> CliRequest {
    CliRequest::new("vrouter-create")
        .arg("name", name)
        .arg("vnet", vnet)
        .arg("router-type", ROUTER_TYPE)
        .arg_opt("hw-vrrp-id", hw_vrrp_id)
        .flag("enable")
}

/// Build vRouter modification with `(attribute, value)` pairs in order
pub fn build_vrouter_modify(name: &str, values: &[(&str, String)]) -> CliRequest {
    values
        .iter()
        .fold(CliRequest::new("vrouter-modify").arg("name", name), |req, (key, value)| {
            req.arg(key, value)
        })
}

/// Build interface listing with [`INTERFACE_COLUMNS`]
pub fn build_interface_show(vrouter: &str) -> CliRequest {
    CliRequest::new("vrouter-interface-show")
        .arg("vrouter-name", vrouter)
        .format(INTERFACE_COLUMNS)
        .no_show_headers()
}

pub fn build_interface_add(
    vrouter: &str,
    ip: &IpNet,
    attachment: Attachment,
    vrrp: Option<&VrrpSettings>,
) -> CliRequest {
    let req = CliRequest::new("vrouter-interface-add")
        .arg("vrouter-name", vrouter)
        .arg("ip", ip)
        .arg(attachment.key(), attachment.value());
    match vrrp {
        Some(vrrp) => req
            .arg("vrrp-id", vrrp.id)
            .arg("vrrp-primary", &vrrp.primary_nic)
            .arg("vrrp-priority", vrrp.priority),
        None => req,
    }
}

pub fn build_interface_config_show(vrouter: &str, nic: &str, keys: &[&str]) -> CliRequest {
    CliRequest::new("vrouter-interface-config-show")
        .arg("vrouter-name", vrouter)
        .arg("nic", nic)
        .format(keys)
        .no_show_headers()
}

/// Build interface config add (`create`) or modify
pub fn build_interface_config_set(
    vrouter: &str,
    nic: &str,
    values: &[(&str, String)],
    create: bool,
) -> CliRequest {
    let command = if create {
        "vrouter-interface-config-add"
    } else {
        "vrouter-interface-config-modify"
    };
    values.iter().fold(
        CliRequest::new(command)
            .arg("vrouter-name", vrouter)
            .arg("nic", nic),
        |req, (key, value)| req.arg(key, value),
    )
}

pub fn build_loopback_show(vrouter: &str) -> CliRequest {
    CliRequest::new("vrouter-loopback-interface-show")
        .arg("vrouter-name", vrouter)
        .format(&["ip"])
        .no_show_headers()
}

pub fn build_loopback_add(vrouter: &str, ip: IpAddr) -> CliRequest {
    CliRequest::new("vrouter-loopback-interface-add")
        .arg("vrouter-name", vrouter)
        .arg("ip", ip)
}

/// Build BGP neighbor listing (`neighbor remote-as` rows)
pub fn build_bgp_show(vrouter: &str) -> CliRequest {
    CliRequest::new("vrouter-bgp-show")
        .arg("vrouter-name", vrouter)
        .format(&["neighbor", "remote-as"])
        .no_show_headers()
}

pub fn build_bgp_add(
    vrouter: &str,
    neighbor: IpAddr,
    remote_as: u32,
    flags: &BgpNeighborFlags,
) -> CliRequest {
    CliRequest::new("vrouter-bgp-add")
        .arg("vrouter-name", vrouter)
        .arg("neighbor", neighbor)
        .arg("remote-as", remote_as)
        .flag_if("next-hop-self", flags.next_hop_self)
        .arg_opt("weight", flags.weight)
        .flag_if("allowas-in", flags.allowas_in)
        .flag_if("bfd", flags.bfd)
}

/// Build OSPF network listing (`network area` rows)
pub fn build_ospf_show(vrouter: &str) -> CliRequest {
    CliRequest::new("vrouter-ospf-show")
        .arg("vrouter-name", vrouter)
        .format(&["network", "ospf-area"])
        .no_show_headers()
}

pub fn build_ospf_add(vrouter: &str, network: &IpNet, area: u32) -> CliRequest {
    CliRequest::new("vrouter-ospf-add")
        .arg("vrouter-name", vrouter)
        .arg("network", network)
        .arg("ospf-area", area)
}

// Clusters, trunks and vLAGs

/// Build cluster listing (`name node1 node2` rows)
pub fn build_cluster_show() -> CliRequest {
    CliRequest::new("cluster-show")
        .format(&["name", "cluster-node-1", "cluster-node-2"])
        .no_show_headers()
}

pub fn build_cluster_create(name: &str, first: &str, second: &str) -> CliRequest {
    CliRequest::new("cluster-create")
        .arg("name", name)
        .arg("cluster-node-1", first)
        .arg("cluster-node-2", second)
}

/// Build trunk listing (`name ports` rows; empty trunks print only the name)
pub fn build_trunk_show() -> CliRequest {
    CliRequest::new("trunk-show")
        .format(&["name", "ports"])
        .no_show_headers()
}

pub fn build_trunk_create(name: &str, ports: &PortList) -> CliRequest {
    CliRequest::new("trunk-create")
        .arg("name", name)
        .arg("ports", ports)
}

pub fn build_trunk_modify(name: &str, ports: &PortList) -> CliRequest {
    CliRequest::new("trunk-modify")
        .arg("name", name)
        .arg("ports", ports)
}

pub fn build_trunk_delete(name: &str) -> CliRequest {
    CliRequest::new("trunk-delete").arg("name", name)
}

pub fn build_vlag_show() -> CliRequest {
    CliRequest::new("vlag-show")
        .format(&["name"])
        .no_show_headers()
}

pub fn build_vlag_create(
    name: &str,
    local_trunk: &str,
    peer_switch: &str,
    peer_trunk: &str,
) -> CliRequest {
    CliRequest::new("vlag-create")
        .arg("name", name)
        .arg("port", local_trunk)
        .arg("peer-port", peer_trunk)
        .arg("peer-switch", peer_switch)
        .arg("mode", "active-active")
}

// Tunnels

/// Build tunnel listing (`name local-ip remote-ip` rows)
pub fn build_tunnel_show() -> CliRequest {
    CliRequest::new("tunnel-show")
        .format(&["name", "local-ip", "remote-ip"])
        .no_show_headers()
}

pub fn build_tunnel_create(name: &str, vrouter: &str, local_ip: IpAddr, remote_ip: IpAddr) -> CliRequest {
    CliRequest::new("tunnel-create")
        .arg("scope", "local")
        .arg("name", name)
        .arg("vrouter-name", vrouter)
        .arg("local-ip", local_ip)
        .arg("remote-ip", remote_ip)
}

pub fn build_tunnel_vxlan_show(name: &str) -> CliRequest {
    CliRequest::new("tunnel-vxlan-show")
        .arg("name", name)
        .format(&["vxlan"])
        .no_show_headers()
}

pub fn build_tunnel_vxlan_add(name: &str, vxlan: u32) -> CliRequest {
    CliRequest::new("tunnel-vxlan-add")
        .arg("name", name)
        .arg("vxlan", vxlan)
}
