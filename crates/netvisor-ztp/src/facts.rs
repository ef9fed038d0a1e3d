//! Typed, cached view of switch state.
//!
//! Every read of switch state goes through a [`FactStore`]. Raw rows are
//! cached per `(kind, request)` so that repeating a question inside one phase
//! never reaches the wire twice and always returns the same answer. Mutations
//! invalidate only the kind they touched; fabric-replicated kinds are
//! invalidated on every store of a [`FabricFacts`].

use std::collections::BTreeMap;
use tracing::trace;

use netvisor_cli_common::{parser, CliRequest, CliSession, Scope};
use netvisor_types::{PortId, PortList, VlanId};

use crate::commands::*;
use crate::error::ZtpResult;
use crate::types::{LldpEdge, Outcome};

/// Kinds of cached facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FactKind {
    Setup,
    Fabric,
    Services,
    Ports,
    Lldp,
    Vlans,
    Vrouters,
    Interfaces,
    InterfaceConfig,
    Loopbacks,
    Bgp,
    Ospf,
    Clusters,
    Trunks,
    Vlags,
    Tunnels,
}

impl FactKind {
    /// Kinds the fabric replicates to every member.
    pub const fn is_fabric_scoped(&self) -> bool {
        matches!(
            self,
            FactKind::Vlans
                | FactKind::Vrouters
                | FactKind::Interfaces
                | FactKind::InterfaceConfig
                | FactKind::Loopbacks
                | FactKind::Bgp
                | FactKind::Ospf
                | FactKind::Clusters
                | FactKind::Vlags
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FabricInfo {
    pub name: String,
    pub control_network: String,
    pub fabric_network: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlanFact {
    pub id: u16,
    pub scope: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VrouterFact {
    pub name: String,
    pub location: String,
    pub vnet: String,
    pub router_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceFact {
    pub nic: String,
    pub ip: String,
    pub vlan: Option<u16>,
    pub l3_port: Option<u16>,
    pub vrrp_primary: Option<String>,
}

/// Selects vRouter interfaces; unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceFilter {
    pub ip: Option<String>,
    pub vlan: Option<u16>,
    pub l3_port: Option<u16>,
    pub vrrp_primary: Option<String>,
}

impl InterfaceFilter {
    pub fn ip(mut self, ip: impl ToString) -> Self {
        self.ip = Some(ip.to_string());
        self
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        match attachment {
            Attachment::Vlan(vlan) => self.vlan = Some(vlan.as_u16()),
            Attachment::L3Port(port) => self.l3_port = Some(port.as_u16()),
        }
        self
    }

    pub fn vrrp_primary(mut self, nic: impl Into<String>) -> Self {
        self.vrrp_primary = Some(nic.into());
        self
    }

    fn matches(&self, fact: &InterfaceFact) -> bool {
        self.ip.as_ref().map_or(true, |ip| *ip == fact.ip)
            && self.vlan.map_or(true, |vlan| fact.vlan == Some(vlan))
            && self.l3_port.map_or(true, |port| fact.l3_port == Some(port))
            && self
                .vrrp_primary
                .as_ref()
                .map_or(true, |nic| fact.vrrp_primary.as_ref() == Some(nic))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrunkFact {
    pub name: String,
    pub ports: PortList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterFact {
    pub name: String,
    pub first: String,
    pub second: String,
}

impl ClusterFact {
    pub fn partner_of(&self, switch: &str) -> Option<&str> {
        if self.first == switch {
            Some(&self.second)
        } else if self.second == switch {
            Some(&self.first)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortFact {
    pub port: PortId,
    pub enabled: bool,
    pub speed: String,
}

/// Port selection for [`FactStore::ports`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortFilter<'a> {
    All,
    Enabled(bool),
    Speed(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgpNeighborFact {
    pub neighbor: String,
    pub remote_as: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OspfNetworkFact {
    pub network: String,
    pub area: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelFact {
    pub name: String,
    pub local_ip: String,
    pub remote_ip: String,
}

/// `-` marks an unset column.
fn optional(token: Option<&String>) -> Option<String> {
    token.filter(|t| t.as_str() != "-").cloned()
}

fn truthy(value: Option<String>) -> bool {
    matches!(value.as_deref(), Some("on" | "yes" | "true" | "enable"))
}

/// Cached facts of one switch, read through one session.
#[derive(Debug)]
pub struct FactStore {
    switch: String,
    session: CliSession,
    cache: BTreeMap<(FactKind, String), Vec<Vec<String>>>,
}

impl FactStore {
    pub fn new(switch: impl Into<String>, session: CliSession) -> Self {
        Self {
            switch: switch.into(),
            session,
            cache: BTreeMap::new(),
        }
    }

    pub fn switch(&self) -> &str {
        &self.switch
    }

    pub fn session(&self) -> &CliSession {
        &self.session
    }

    /// Drops every cached entry of `kind`.
    pub fn invalidate(&mut self, kind: FactKind) {
        self.cache.retain(|(k, _), _| *k != kind);
    }

    /// Drops the whole cache.
    pub fn refresh(&mut self) {
        self.cache.clear();
    }

    async fn query(&mut self, kind: FactKind, request: &CliRequest) -> ZtpResult<Vec<Vec<String>>> {
        let key = (kind, request.tokens().join(" "));
        if let Some(rows) = self.cache.get(&key) {
            trace!(switch = %self.switch, query = %key.1, "Fact cache hit");
            return Ok(rows.clone());
        }
        let rows = self.session.rows(request).await?;
        self.cache.insert(key, rows.clone());
        Ok(rows)
    }

    /// Issues a mutation and invalidates `kind`.
    pub async fn mutate(&mut self, request: &CliRequest, kind: FactKind) -> ZtpResult<Outcome> {
        let outcome = self.session.mutate(request).await;
        self.invalidate(kind);
        Ok(outcome?.into())
    }

    // Setup and services

    pub async fn eula_accepted(&mut self) -> ZtpResult<bool> {
        Ok(!self.query(FactKind::Setup, &build_eula_show()).await?.is_empty())
    }

    pub async fn setup_values(&mut self, keys: &[&str]) -> ZtpResult<BTreeMap<String, String>> {
        let rows = self.query(FactKind::Setup, &build_switch_setup_show(keys)).await?;
        Ok(parser::key_values(&rows))
    }

    pub async fn web_enabled(&mut self) -> ZtpResult<bool> {
        let rows = self.query(FactKind::Services, &build_web_show()).await?;
        Ok(truthy(parser::value(&rows)))
    }

    pub async fn stp_enabled(&mut self) -> ZtpResult<bool> {
        let rows = self.query(FactKind::Services, &build_stp_show()).await?;
        Ok(truthy(parser::value(&rows)))
    }

    pub async fn auto_trunk(&mut self) -> ZtpResult<bool> {
        let rows = self.query(FactKind::Services, &build_auto_trunk_show()).await?;
        Ok(truthy(parser::value(&rows)))
    }

    // Fabric

    /// Fabric membership, or `None` outside a fabric.
    pub async fn fabric_info(&mut self) -> ZtpResult<Option<FabricInfo>> {
        let rows = self.query(FactKind::Fabric, &build_fabric_info()).await?;
        let values = parser::key_values(&rows);
        Ok(values.get("name").map(|name| FabricInfo {
            name: name.clone(),
            control_network: values.get("control-network").cloned().unwrap_or_default(),
            fabric_network: values.get("fabric-network").cloned().unwrap_or_default(),
        }))
    }

    /// Fabrics visible on the network.
    pub async fn fabric_names(&mut self) -> ZtpResult<Vec<String>> {
        let rows = self.query(FactKind::Fabric, &build_fabric_show()).await?;
        Ok(parser::column(&rows, 0))
    }

    pub async fn fabric_node_count(&mut self) -> ZtpResult<usize> {
        let rows = self.query(FactKind::Fabric, &build_fabric_node_count()).await?;
        Ok(parser::count(&rows).unwrap_or(0))
    }

    // Ports and LLDP

    pub async fn ports(&mut self, filter: PortFilter<'_>) -> ZtpResult<Vec<PortFact>> {
        let rows = self.query(FactKind::Ports, &build_port_config_show()).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(PortFact {
                    port: row.first()?.parse().ok()?,
                    enabled: truthy(row.get(1).cloned()),
                    speed: row.get(2).cloned().unwrap_or_default(),
                })
            })
            .filter(|p| match filter {
                PortFilter::All => true,
                PortFilter::Enabled(enabled) => p.enabled == enabled,
                PortFilter::Speed(speed) => p.speed == speed,
            })
            .collect())
    }

    /// Front-panel label of `port`.
    pub async fn bezel(&mut self, port: PortId) -> ZtpResult<Option<String>> {
        let rows = self.query(FactKind::Ports, &build_port_bezel(port)).await?;
        Ok(parser::attribute(&rows))
    }

    pub async fn lldp_neighbors(&mut self) -> ZtpResult<Vec<LldpEdge>> {
        let rows = self.query(FactKind::Lldp, &build_lldp_show()).await?;
        let mut edges: Vec<LldpEdge> = rows
            .iter()
            .filter_map(|row| {
                Some(LldpEdge {
                    local_switch: self.switch.clone(),
                    local_port: row.first()?.parse().ok()?,
                    peer_switch: row.get(1)?.clone(),
                    peer_port: row.get(2)?.parse().ok()?,
                })
            })
            .collect();
        edges.sort();
        Ok(edges)
    }

    /// Local ports whose LLDP peer is `peer`.
    pub async fn ports_facing(&mut self, peer: &str) -> ZtpResult<PortList> {
        Ok(self
            .lldp_neighbors()
            .await?
            .into_iter()
            .filter(|e| e.peer_switch == peer)
            .map(|e| e.local_port)
            .collect())
    }

    /// Port on the far end of `local_port`.
    pub async fn remote_port(&mut self, local_port: PortId) -> ZtpResult<Option<PortId>> {
        Ok(self
            .lldp_neighbors()
            .await?
            .into_iter()
            .find(|e| e.local_port == local_port)
            .map(|e| e.peer_port))
    }

    // VLANs

    pub async fn list_vlans(&mut self) -> ZtpResult<Vec<VlanFact>> {
        let rows = self.query(FactKind::Vlans, &build_vlan_show()).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(VlanFact {
                    id: row.first()?.parse().ok()?,
                    scope: row.get(1).cloned().unwrap_or_default(),
                })
            })
            .collect())
    }

    pub async fn has_vlan(&mut self, id: VlanId) -> ZtpResult<bool> {
        Ok(self
            .list_vlans()
            .await?
            .iter()
            .any(|v| v.id == id.as_u16()))
    }

    // vRouters

    pub async fn list_vrouters(&mut self) -> ZtpResult<Vec<VrouterFact>> {
        let rows = self.query(FactKind::Vrouters, &build_vrouter_list()).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(VrouterFact {
                    name: row.first()?.clone(),
                    location: row.get(1)?.clone(),
                    vnet: row.get(2).cloned().unwrap_or_default(),
                    router_type: row.get(3).cloned().unwrap_or_default(),
                })
            })
            .collect())
    }

    /// The vRouter hosted on `switch`.
    pub async fn vrouter_on(&mut self, switch: &str) -> ZtpResult<Option<VrouterFact>> {
        Ok(self
            .list_vrouters()
            .await?
            .into_iter()
            .find(|v| v.location == switch))
    }

    /// One attribute of vRouter `name`; `None` when unset or the vRouter is absent.
    pub async fn vrouter_attr(&mut self, name: &str, attr: &str) -> ZtpResult<Option<String>> {
        let rows = self
            .query(FactKind::Vrouters, &build_vrouter_attr(name, attr))
            .await?;
        Ok(parser::attribute(&rows))
    }

    pub async fn list_interfaces(&mut self, vrouter: &str) -> ZtpResult<Vec<InterfaceFact>> {
        let rows = self
            .query(FactKind::Interfaces, &build_interface_show(vrouter))
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(InterfaceFact {
                    nic: row.first()?.clone(),
                    ip: row.get(1)?.clone(),
                    vlan: optional(row.get(2)).and_then(|v| v.parse().ok()),
                    l3_port: optional(row.get(3)).and_then(|p| p.parse().ok()),
                    vrrp_primary: optional(row.get(4)),
                })
            })
            .collect())
    }

    pub async fn interface_on(
        &mut self,
        vrouter: &str,
        filter: &InterfaceFilter,
    ) -> ZtpResult<Option<InterfaceFact>> {
        Ok(self
            .list_interfaces(vrouter)
            .await?
            .into_iter()
            .find(|i| filter.matches(i)))
    }

    /// Interface config values for `keys`; `None` when the nic has no config.
    pub async fn interface_config(
        &mut self,
        vrouter: &str,
        nic: &str,
        keys: &[&str],
    ) -> ZtpResult<Option<BTreeMap<String, String>>> {
        let rows = self
            .query(
                FactKind::InterfaceConfig,
                &build_interface_config_show(vrouter, nic, keys),
            )
            .await?;
        let Some(row) = rows.first().filter(|row| row.len() > 1) else {
            return Ok(None);
        };
        Ok(Some(
            keys.iter()
                .zip(row.iter().skip(1))
                .filter(|(_, value)| value.as_str() != "-")
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
        ))
    }

    pub async fn loopback_interfaces(&mut self, vrouter: &str) -> ZtpResult<Vec<String>> {
        let rows = self
            .query(FactKind::Loopbacks, &build_loopback_show(vrouter))
            .await?;
        Ok(parser::column(&rows, 0))
    }

    pub async fn bgp_neighbors(&mut self, vrouter: &str) -> ZtpResult<Vec<BgpNeighborFact>> {
        let rows = self.query(FactKind::Bgp, &build_bgp_show(vrouter)).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(BgpNeighborFact {
                    neighbor: row.first()?.clone(),
                    remote_as: row.get(1).cloned().unwrap_or_default(),
                })
            })
            .collect())
    }

    pub async fn ospf_networks(&mut self, vrouter: &str) -> ZtpResult<Vec<OspfNetworkFact>> {
        let rows = self.query(FactKind::Ospf, &build_ospf_show(vrouter)).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(OspfNetworkFact {
                    network: row.first()?.clone(),
                    area: row.get(1).cloned().unwrap_or_default(),
                })
            })
            .collect())
    }

    // Clusters, trunks and vLAGs

    pub async fn list_clusters(&mut self) -> ZtpResult<Vec<ClusterFact>> {
        let rows = self.query(FactKind::Clusters, &build_cluster_show()).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(ClusterFact {
                    name: row.first()?.clone(),
                    first: row.get(1)?.clone(),
                    second: row.get(2)?.clone(),
                })
            })
            .collect())
    }

    pub async fn cluster_partner(&mut self, switch: &str) -> ZtpResult<Option<String>> {
        Ok(self
            .list_clusters()
            .await?
            .iter()
            .find_map(|c| c.partner_of(switch).map(str::to_string)))
    }

    pub async fn list_trunks(&mut self) -> ZtpResult<Vec<TrunkFact>> {
        let rows = self.query(FactKind::Trunks, &build_trunk_show()).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let ports = match row.get(1) {
                    Some(list) => list.parse().ok()?,
                    None => PortList::new(),
                };
                Some(TrunkFact {
                    name: row.first()?.clone(),
                    ports,
                })
            })
            .collect())
    }

    pub async fn trunk_named(&mut self, name: &str) -> ZtpResult<Option<TrunkFact>> {
        Ok(self
            .list_trunks()
            .await?
            .into_iter()
            .find(|t| t.name == name))
    }

    /// The first trunk owning any of `ports`.
    pub async fn trunk_of_ports(&mut self, ports: &PortList) -> ZtpResult<Option<TrunkFact>> {
        Ok(self
            .list_trunks()
            .await?
            .into_iter()
            .find(|t| ports.iter().any(|p| t.ports.contains(p))))
    }

    pub async fn vlags(&mut self) -> ZtpResult<Vec<String>> {
        let rows = self.query(FactKind::Vlags, &build_vlag_show()).await?;
        Ok(parser::column(&rows, 0))
    }

    // Tunnels

    pub async fn tunnels(&mut self) -> ZtpResult<Vec<TunnelFact>> {
        let rows = self.query(FactKind::Tunnels, &build_tunnel_show()).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(TunnelFact {
                    name: row.first()?.clone(),
                    local_ip: row.get(1)?.clone(),
                    remote_ip: row.get(2)?.clone(),
                })
            })
            .collect())
    }

    pub async fn tunnel_vxlans(&mut self, tunnel: &str) -> ZtpResult<Vec<u32>> {
        let rows = self
            .query(FactKind::Tunnels, &build_tunnel_vxlan_show(tunnel))
            .await?;
        Ok(parser::column(&rows, 0)
            .iter()
            .filter_map(|v| v.parse().ok())
            .collect())
    }
}

/// Fact stores for every switch, all reached through one anchor switch.
#[derive(Debug)]
pub struct FabricFacts {
    anchor: CliSession,
    stores: BTreeMap<String, FactStore>,
}

impl FabricFacts {
    pub fn new(anchor: CliSession) -> Self {
        Self {
            anchor,
            stores: BTreeMap::new(),
        }
    }

    /// Transport host all fabric-wide commands are sent to.
    pub fn anchor_host(&self) -> &str {
        self.anchor.host()
    }

    /// Store for `switch`, created on first use.
    pub fn store(&mut self, switch: &str) -> &mut FactStore {
        let anchor = &self.anchor;
        self.stores
            .entry(switch.to_string())
            .or_insert_with(|| FactStore::new(switch, anchor.scoped(Scope::Switch(switch.to_string()))))
    }

    /// Issues `request` on `switch` and invalidates `kind` where it is visible.
    pub async fn mutate(
        &mut self,
        switch: &str,
        request: &CliRequest,
        kind: FactKind,
    ) -> ZtpResult<Outcome> {
        let outcome = self.store(switch).mutate(request, kind).await;
        if kind.is_fabric_scoped() {
            for store in self.stores.values_mut() {
                store.invalidate(kind);
            }
        }
        outcome
    }

    /// Drops every cached fact; called at phase boundaries.
    pub fn refresh(&mut self) {
        for store in self.stores.values_mut() {
            store.refresh();
        }
    }
}
