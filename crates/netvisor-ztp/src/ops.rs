//! Idempotent provisioning primitives.
//!
//! Every `ensure_*` reads the relevant facts first and mutates only on
//! divergence, returning [`Outcome::AlreadyPresent`] when the switch already
//! matches. An existing entity whose attributes conflict with the request is
//! reported as [`ZtpError::IdempotencyDrift`]; the only attributes rewritten in
//! place are the documented modify paths (vRouter `hw-vrrp-id` and settable
//! vRouter attributes, interface config, trunk membership).

use ipnet::IpNet;
use std::net::IpAddr;
use tracing::{debug, info, instrument};

use netvisor_types::{NetworkType, PortId, PortList, VlanId, VlanScope};

use crate::commands::*;
use crate::error::{ZtpError, ZtpResult};
use crate::facts::{FabricFacts, FactKind, InterfaceFilter};
use crate::naming::{cluster_name, VXLAN_LOOPBACK_TRUNK};
use crate::types::{ClusterPair, Outcome};

/// Desired VLAN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlanSpec {
    pub id: VlanId,
    pub scope: VlanScope,
    pub vxlan: Option<u32>,
    pub untagged_ports: Option<PortList>,
}

impl VlanSpec {
    pub fn new(id: VlanId, scope: VlanScope) -> Self {
        Self {
            id,
            scope,
            vxlan: None,
            untagged_ports: None,
        }
    }

    pub fn with_vxlan(mut self, vxlan: u32) -> Self {
        self.vxlan = Some(vxlan);
        self
    }
}

/// Desired vRouter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VrouterSpec {
    pub name: String,
    pub vnet: String,
    pub hw_vrrp_id: Option<u16>,
}

#[instrument(skip(facts))]
pub async fn ensure_vlan(facts: &mut FabricFacts, switch: &str, spec: &VlanSpec) -> ZtpResult<Outcome> {
    if facts.store(switch).has_vlan(spec.id).await? {
        return Ok(Outcome::AlreadyPresent);
    }
    let request = build_vlan_create(spec.id, spec.scope, spec.vxlan, spec.untagged_ports.as_ref());
    let outcome = facts.mutate(switch, &request, FactKind::Vlans).await?;
    info!("Created VLAN {} scope {} on {}", spec.id, spec.scope, switch);
    Ok(outcome)
}

#[instrument(skip(facts))]
pub async fn ensure_vrouter(facts: &mut FabricFacts, switch: &str, spec: &VrouterSpec) -> ZtpResult<Outcome> {
    let store = facts.store(switch);
    let Some(existing) = store.vrouter_on(switch).await? else {
        let request = build_vrouter_create(&spec.name, &spec.vnet, spec.hw_vrrp_id);
        let outcome = facts.mutate(switch, &request, FactKind::Vrouters).await?;
        info!("Created vRouter {} on {}", spec.name, switch);
        return Ok(outcome);
    };

    if existing.name != spec.name {
        return Err(ZtpError::drift("vrouter on", switch, "name", &spec.name, existing.name));
    }
    if existing.vnet != spec.vnet {
        return Err(ZtpError::drift("vrouter", &spec.name, "vnet", &spec.vnet, existing.vnet));
    }
    if existing.router_type != ROUTER_TYPE {
        return Err(ZtpError::drift(
            "vrouter",
            &spec.name,
            "router-type",
            ROUTER_TYPE,
            existing.router_type,
        ));
    }

    let Some(hw_vrrp_id) = spec.hw_vrrp_id else {
        return Ok(Outcome::AlreadyPresent);
    };
    let current = store.vrouter_attr(&spec.name, "hw-vrrp-id").await?;
    if current.as_deref() == Some(hw_vrrp_id.to_string().as_str()) {
        return Ok(Outcome::AlreadyPresent);
    }
    let request = build_vrouter_modify(&spec.name, &[("hw-vrrp-id", hw_vrrp_id.to_string())]);
    facts.mutate(switch, &request, FactKind::Vrouters).await?;
    info!("Set hw-vrrp-id {} on vRouter {}", hw_vrrp_id, spec.name);
    Ok(Outcome::Modified)
}

/// Brings vRouter attributes in line with `values`, in one modify.
///
/// A differing `bgp-as` is drift: neighbors on other switches were built
/// against the old AS.
#[instrument(skip(facts))]
pub async fn ensure_vrouter_attrs(
    facts: &mut FabricFacts,
    switch: &str,
    vrouter: &str,
    values: &[(&str, String)],
) -> ZtpResult<Outcome> {
    let store = facts.store(switch);
    let mut changes = Vec::new();
    for (key, wanted) in values {
        let current = store.vrouter_attr(vrouter, key).await?;
        match current {
            Some(found) if found == *wanted => {}
            Some(found) if *key == "bgp-as" => {
                return Err(ZtpError::drift("vrouter", vrouter, "bgp-as", wanted, found));
            }
            _ => changes.push((*key, wanted.clone())),
        }
    }
    if changes.is_empty() {
        return Ok(Outcome::AlreadyPresent);
    }
    facts
        .mutate(switch, &build_vrouter_modify(vrouter, &changes), FactKind::Vrouters)
        .await?;
    info!("Modified vRouter {}: {:?}", vrouter, changes);
    Ok(Outcome::Modified)
}

/// Ensures an interface with `ip` on `attachment`; returns its nic.
#[instrument(skip(facts))]
pub async fn ensure_vrouter_interface(
    facts: &mut FabricFacts,
    switch: &str,
    vrouter: &str,
    ip: &IpNet,
    attachment: Attachment,
    vrrp: Option<&VrrpSettings>,
) -> ZtpResult<(Outcome, String)> {
    let store = facts.store(switch);
    let mut filter = InterfaceFilter::default().ip(ip).attachment(attachment);
    if let Some(vrrp) = vrrp {
        filter = filter.vrrp_primary(&vrrp.primary_nic);
    }
    if let Some(existing) = store.interface_on(vrouter, &filter).await? {
        return Ok((Outcome::AlreadyPresent, existing.nic));
    }
    if let Some(other) = store
        .interface_on(vrouter, &InterfaceFilter::default().ip(ip))
        .await?
    {
        let found = match (other.vlan, other.l3_port) {
            (Some(vlan), _) => format!("vlan {}", vlan),
            (_, Some(port)) => format!("l3-port {}", port),
            _ => "-".to_string(),
        };
        return Err(ZtpError::drift(
            "vrouter interface",
            ip.to_string(),
            "attachment",
            attachment.to_string(),
            found,
        ));
    }

    let request = build_interface_add(vrouter, ip, attachment, vrrp);
    facts.mutate(switch, &request, FactKind::Interfaces).await?;
    let created = facts
        .store(switch)
        .interface_on(vrouter, &filter)
        .await?
        .ok_or_else(|| ZtpError::internal(format!("interface {} not listed after add", ip)))?;
    info!("Added interface {} ({}) to {} as {}", ip, attachment, vrouter, created.nic);
    Ok((Outcome::Created, created.nic))
}

/// Data interface with `ip` plus the VIP interface riding on its nic.
#[allow(clippy::too_many_arguments)]
#[instrument(skip(facts))]
pub async fn ensure_vrrp_interface(
    facts: &mut FabricFacts,
    switch: &str,
    vrouter: &str,
    vlan: VlanId,
    ip: &IpNet,
    vip: &IpNet,
    vrrp_id: u16,
    priority: u16,
) -> ZtpResult<Outcome> {
    let attachment = Attachment::Vlan(vlan);
    let (data, nic) = ensure_vrouter_interface(facts, switch, vrouter, ip, attachment, None).await?;
    let vrrp = VrrpSettings {
        id: vrrp_id,
        primary_nic: nic,
        priority,
    };
    let (virt, _) = ensure_vrouter_interface(facts, switch, vrouter, vip, attachment, Some(&vrrp)).await?;
    Ok(data.merge(virt))
}

/// Sets interface config `values` on `nic`, adding the config when absent.
#[instrument(skip(facts))]
pub async fn ensure_interface_config(
    facts: &mut FabricFacts,
    switch: &str,
    vrouter: &str,
    nic: &str,
    values: &[(&str, String)],
) -> ZtpResult<Outcome> {
    let keys: Vec<&str> = values.iter().map(|(k, _)| *k).collect();
    let current = facts.store(switch).interface_config(vrouter, nic, &keys).await?;
    let (request, outcome) = match current {
        None => (build_interface_config_set(vrouter, nic, values, true), Outcome::Created),
        Some(current) => {
            let changes: Vec<(&str, String)> = values
                .iter()
                .filter(|(k, v)| current.get(*k) != Some(v))
                .cloned()
                .collect();
            if changes.is_empty() {
                return Ok(Outcome::AlreadyPresent);
            }
            (build_interface_config_set(vrouter, nic, &changes, false), Outcome::Modified)
        }
    };
    facts.mutate(switch, &request, FactKind::InterfaceConfig).await?;
    info!("Configured {} on {}: {:?}", nic, vrouter, values);
    Ok(outcome)
}

#[instrument(skip(facts))]
pub async fn ensure_loopback(
    facts: &mut FabricFacts,
    switch: &str,
    vrouter: &str,
    ip: IpAddr,
) -> ZtpResult<Outcome> {
    let existing = facts.store(switch).loopback_interfaces(vrouter).await?;
    if existing.iter().any(|l| l.split('/').next() == Some(ip.to_string().as_str())) {
        return Ok(Outcome::AlreadyPresent);
    }
    facts
        .mutate(switch, &build_loopback_add(vrouter, ip), FactKind::Loopbacks)
        .await?;
    info!("Added loopback {} to {}", ip, vrouter);
    Ok(Outcome::Created)
}

/// Creates the cluster for `pair`, issued on its first member.
#[instrument(skip(facts))]
pub async fn ensure_cluster(facts: &mut FabricFacts, pair: &ClusterPair) -> ZtpResult<Outcome> {
    let name = cluster_name(&pair.first, &pair.second);
    let clusters = facts.store(&pair.first).list_clusters().await?;
    if let Some(existing) = clusters.iter().find(|c| c.name == name) {
        if pair.contains(&existing.first) && pair.contains(&existing.second) {
            return Ok(Outcome::AlreadyPresent);
        }
        return Err(ZtpError::drift(
            "cluster",
            &name,
            "members",
            format!("{},{}", pair.first, pair.second),
            format!("{},{}", existing.first, existing.second),
        ));
    }
    for member in pair.members() {
        if let Some(other) = clusters.iter().find(|c| c.partner_of(member).is_some()) {
            return Err(ZtpError::drift("switch", member, "cluster", &name, &other.name));
        }
    }
    let request = build_cluster_create(&name, &pair.first, &pair.second);
    let outcome = facts.mutate(&pair.first, &request, FactKind::Clusters).await?;
    info!("Created cluster {}", name);
    Ok(outcome)
}

#[instrument(skip(facts))]
pub async fn ensure_trunk(
    facts: &mut FabricFacts,
    switch: &str,
    name: &str,
    ports: &PortList,
) -> ZtpResult<Outcome> {
    let trunks = facts.store(switch).list_trunks().await?;
    if let Some(existing) = trunks.iter().find(|t| t.name == name) {
        if existing.ports == *ports {
            return Ok(Outcome::AlreadyPresent);
        }
        return Err(ZtpError::drift(
            "trunk",
            name,
            "ports",
            ports.to_string(),
            existing.ports.to_string(),
        ));
    }
    for trunk in &trunks {
        if let Some(port) = ports.iter().find(|p| trunk.ports.contains(*p)) {
            return Err(ZtpError::drift("port", port.to_string(), "trunk", name, &trunk.name));
        }
    }
    let outcome = facts
        .mutate(switch, &build_trunk_create(name, ports), FactKind::Trunks)
        .await?;
    info!("Created trunk {} on {} with ports {}", name, switch, ports);
    Ok(outcome)
}

/// Removes the trunk owning `port` so the port can carry an L3 interface.
#[instrument(skip(facts))]
pub async fn delete_trunk_on_port(facts: &mut FabricFacts, switch: &str, port: PortId) -> ZtpResult<Outcome> {
    let ports: PortList = std::iter::once(port).collect();
    let Some(trunk) = facts.store(switch).trunk_of_ports(&ports).await? else {
        return Ok(Outcome::AlreadyPresent);
    };
    if trunk.name == VXLAN_LOOPBACK_TRUNK {
        debug!("Port {} on {} is a VXLAN loopback port", port, switch);
        return Ok(Outcome::AlreadyPresent);
    }
    facts
        .mutate(switch, &build_trunk_delete(&trunk.name), FactKind::Trunks)
        .await?;
    info!("Deleted trunk {} on {} to free port {}", trunk.name, switch, port);
    Ok(Outcome::Removed)
}

/// Adds `port` to trunk `trunk`, creating the trunk when missing.
#[instrument(skip(facts))]
pub async fn ensure_trunk_member(
    facts: &mut FabricFacts,
    switch: &str,
    trunk: &str,
    port: PortId,
) -> ZtpResult<Outcome> {
    let existing = facts.store(switch).trunk_named(trunk).await?;
    let (request, outcome) = match existing {
        Some(t) if t.ports.contains(port) => return Ok(Outcome::AlreadyPresent),
        Some(t) => {
            let mut ports = t.ports;
            ports.insert(port);
            (build_trunk_modify(trunk, &ports), Outcome::Modified)
        }
        None => {
            let ports: PortList = std::iter::once(port).collect();
            (build_trunk_create(trunk, &ports), Outcome::Created)
        }
    };
    facts.mutate(switch, &request, FactKind::Trunks).await?;
    info!("Added port {} to trunk {} on {}", port, trunk, switch);
    Ok(outcome)
}

#[instrument(skip(facts))]
pub async fn ensure_vlag(
    facts: &mut FabricFacts,
    switch: &str,
    peer: &str,
    local_trunk: &str,
    peer_trunk: &str,
    name: &str,
) -> ZtpResult<Outcome> {
    if facts.store(switch).vlags().await?.iter().any(|v| v == name) {
        return Ok(Outcome::AlreadyPresent);
    }
    let request = build_vlag_create(name, local_trunk, peer, peer_trunk);
    let outcome = facts.mutate(switch, &request, FactKind::Vlags).await?;
    info!("Created vLAG {} on {}", name, switch);
    Ok(outcome)
}

#[instrument(skip(facts))]
pub async fn ensure_bgp_neighbor(
    facts: &mut FabricFacts,
    switch: &str,
    vrouter: &str,
    neighbor: IpAddr,
    remote_as: u32,
    flags: &BgpNeighborFlags,
) -> ZtpResult<Outcome> {
    let neighbors = facts.store(switch).bgp_neighbors(vrouter).await?;
    if let Some(existing) = neighbors.iter().find(|n| n.neighbor == neighbor.to_string()) {
        if existing.remote_as == remote_as.to_string() {
            return Ok(Outcome::AlreadyPresent);
        }
        return Err(ZtpError::drift(
            "bgp neighbor",
            neighbor.to_string(),
            "remote-as",
            remote_as.to_string(),
            &existing.remote_as,
        ));
    }
    let request = build_bgp_add(vrouter, neighbor, remote_as, flags);
    let outcome = facts.mutate(switch, &request, FactKind::Bgp).await?;
    info!("Added BGP neighbor {} AS {} to {}", neighbor, remote_as, vrouter);
    Ok(outcome)
}

#[instrument(skip(facts))]
pub async fn ensure_ospf_network(
    facts: &mut FabricFacts,
    switch: &str,
    vrouter: &str,
    network: &IpNet,
    area: u32,
) -> ZtpResult<Outcome> {
    let networks = facts.store(switch).ospf_networks(vrouter).await?;
    if let Some(existing) = networks.iter().find(|n| n.network == network.to_string()) {
        if existing.area == area.to_string() {
            return Ok(Outcome::AlreadyPresent);
        }
        return Err(ZtpError::drift(
            "ospf network",
            network.to_string(),
            "area",
            area.to_string(),
            &existing.area,
        ));
    }
    let outcome = facts
        .mutate(switch, &build_ospf_add(vrouter, network, area), FactKind::Ospf)
        .await?;
    info!("Added OSPF network {} area {} to {}", network, area, vrouter);
    Ok(outcome)
}

#[instrument(skip(facts))]
pub async fn ensure_auto_trunk(facts: &mut FabricFacts, switch: &str, enabled: bool) -> ZtpResult<Outcome> {
    if facts.store(switch).auto_trunk().await? == enabled {
        return Ok(Outcome::AlreadyPresent);
    }
    facts
        .mutate(switch, &build_auto_trunk_modify(enabled), FactKind::Services)
        .await?;
    info!("Set auto-trunk {} on {}", if enabled { "on" } else { "off" }, switch);
    Ok(Outcome::Modified)
}

#[instrument(skip(facts))]
pub async fn ensure_fabric_network(
    facts: &mut FabricFacts,
    switch: &str,
    network: NetworkType,
) -> ZtpResult<Outcome> {
    let info = facts.store(switch).fabric_info().await?;
    if info.as_ref().map(|i| i.fabric_network.as_str()) == Some(network.as_str()) {
        return Ok(Outcome::AlreadyPresent);
    }
    facts
        .mutate(switch, &build_fabric_network_modify(network), FactKind::Fabric)
        .await?;
    info!("Set fabric-network {} on {}", network, switch);
    Ok(Outcome::Modified)
}

#[instrument(skip(facts))]
pub async fn ensure_tunnel(
    facts: &mut FabricFacts,
    switch: &str,
    name: &str,
    vrouter: &str,
    local_ip: IpAddr,
    remote_ip: IpAddr,
) -> ZtpResult<Outcome> {
    let tunnels = facts.store(switch).tunnels().await?;
    if let Some(existing) = tunnels.iter().find(|t| t.name == name) {
        if existing.local_ip != local_ip.to_string() {
            return Err(ZtpError::drift("tunnel", name, "local-ip", local_ip.to_string(), &existing.local_ip));
        }
        if existing.remote_ip != remote_ip.to_string() {
            return Err(ZtpError::drift("tunnel", name, "remote-ip", remote_ip.to_string(), &existing.remote_ip));
        }
        return Ok(Outcome::AlreadyPresent);
    }
    let request = build_tunnel_create(name, vrouter, local_ip, remote_ip);
    let outcome = facts.mutate(switch, &request, FactKind::Tunnels).await?;
    info!("Created tunnel {} on {} ({} -> {})", name, switch, local_ip, remote_ip);
    Ok(outcome)
}

#[instrument(skip(facts))]
pub async fn ensure_tunnel_vxlan(
    facts: &mut FabricFacts,
    switch: &str,
    tunnel: &str,
    vxlan: u32,
) -> ZtpResult<Outcome> {
    if facts.store(switch).tunnel_vxlans(tunnel).await?.contains(&vxlan) {
        return Ok(Outcome::AlreadyPresent);
    }
    let outcome = facts
        .mutate(switch, &build_tunnel_vxlan_add(tunnel, vxlan), FactKind::Tunnels)
        .await?;
    info!("Mapped VXLAN {} on tunnel {}", vxlan, tunnel);
    Ok(outcome)
}
