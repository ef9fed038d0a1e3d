//! In-memory Netvisor fabric.
//!
//! Each switch is addressed by its transport host name. Fabric-replicated
//! entities (fabric-scoped VLANs, clusters, vLAGs, vRouters and everything
//! hanging off a vRouter) live in shared tables and are visible from every
//! member of the same fabric; trunks, ports, tunnels and settings are local.
//! LLDP adjacencies are derived from the declared cabling and only reported
//! while both ends are enabled.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use netvisor_cli_common::{CliOutput, CliResult, CliTransport};

use crate::handlers;

/// One front-panel port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimPort {
    pub port: u16,
    pub enabled: bool,
    pub speed: String,
    pub bezel: String,
}

impl SimPort {
    fn new(port: u16) -> Self {
        Self {
            port,
            enabled: true,
            speed: "10g".to_string(),
            bezel: port.to_string(),
        }
    }
}

/// One simulated switch.
#[derive(Debug, Clone)]
pub struct SimSwitch {
    pub host: String,
    pub switch_name: String,
    pub eula_accepted: bool,
    pub setup: BTreeMap<String, String>,
    pub fabric: Option<String>,
    pub control_network: String,
    pub fabric_network: String,
    pub web_enabled: bool,
    pub stp_enabled: bool,
    pub auto_trunk: bool,
    pub ports: BTreeMap<u16, SimPort>,
    pub trunks: BTreeMap<String, BTreeSet<u16>>,
    pub tunnels: BTreeMap<String, SimTunnel>,
}

/// Name of the trunk that always exists for VXLAN loopback ports.
pub const VXLAN_LOOPBACK_TRUNK: &str = "vxlan-loopback-trunk";

impl SimSwitch {
    /// Switch with ports 1-48 at 10g, EULA accepted, not in a fabric.
    pub fn new(host: impl Into<String>) -> Self {
        let host = host.into();
        let mut setup = BTreeMap::new();
        setup.insert("switch-name".to_string(), host.clone());
        let mut trunks = BTreeMap::new();
        trunks.insert(VXLAN_LOOPBACK_TRUNK.to_string(), BTreeSet::new());
        Self {
            switch_name: host.clone(),
            host,
            eula_accepted: true,
            setup,
            fabric: None,
            control_network: "mgmt".to_string(),
            fabric_network: "mgmt".to_string(),
            web_enabled: false,
            stp_enabled: true,
            auto_trunk: true,
            ports: (1..=48).map(|p| (p, SimPort::new(p))).collect(),
            trunks,
            tunnels: BTreeMap::new(),
        }
    }

    /// Factory hostname shown before the rename phase.
    pub fn named(mut self, switch_name: &str) -> Self {
        self.switch_name = switch_name.to_string();
        self.setup
            .insert("switch-name".to_string(), switch_name.to_string());
        self
    }

    pub fn with_pending_eula(mut self) -> Self {
        self.eula_accepted = false;
        self
    }

    pub fn with_disabled_ports(mut self, ports: &[u16]) -> Self {
        for port in ports {
            if let Some(p) = self.ports.get_mut(port) {
                p.enabled = false;
            }
        }
        self
    }

    /// Adds a 40g parent port `port` whose sub-ports are `port+1..=port+3`.
    ///
    /// Bezel labels are `<group>`, `<group>.2`, `<group>.3`, `<group>.4`;
    /// the sub-ports start disabled.
    pub fn with_40g_port(mut self, port: u16, group: &str) -> Self {
        self.ports.insert(
            port,
            SimPort {
                port,
                enabled: true,
                speed: "40g".to_string(),
                bezel: group.to_string(),
            },
        );
        for (offset, lane) in [(1u16, 2u8), (2, 3), (3, 4)] {
            let sub = port + offset;
            self.ports.insert(
                sub,
                SimPort {
                    port: sub,
                    enabled: false,
                    speed: "10g".to_string(),
                    bezel: format!("{}.{}", group, lane),
                },
            );
        }
        self
    }

    pub fn with_trunk(mut self, name: &str, ports: &[u16]) -> Self {
        self.trunks
            .insert(name.to_string(), ports.iter().copied().collect());
        self
    }

    pub fn with_web(mut self, enabled: bool) -> Self {
        self.web_enabled = enabled;
        self
    }

    pub fn with_stp(mut self, enabled: bool) -> Self {
        self.stp_enabled = enabled;
        self
    }

    pub fn port_enabled(&self, port: u16) -> bool {
        self.ports.get(&port).map(|p| p.enabled).unwrap_or(false)
    }

    pub fn trunk_of(&self, port: u16) -> Option<&str> {
        self.trunks
            .iter()
            .find(|(_, ports)| ports.contains(&port))
            .map(|(name, _)| name.as_str())
    }
}

/// A physical cable between two switch ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimLink {
    pub a: String,
    pub a_port: u16,
    pub b: String,
    pub b_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimVlan {
    pub id: u16,
    pub scope: String,
    pub vxlan: Option<u32>,
    pub untagged_ports: Option<String>,
    /// Hosts the VLAN is visible on; empty for fabric scope.
    pub members: BTreeSet<String>,
    pub fabric: Option<String>,
    /// Host the create was issued against.
    pub created_on: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimCluster {
    pub name: String,
    pub node1: String,
    pub node2: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimVlag {
    pub name: String,
    pub switch: String,
    pub port: String,
    pub peer_port: String,
    pub peer_switch: String,
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimInterface {
    pub nic: String,
    pub ip: String,
    pub vlan: Option<u16>,
    pub l3_port: Option<u16>,
    pub vrrp_id: Option<u16>,
    pub vrrp_primary: Option<String>,
    pub vrrp_priority: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimBgpNeighbor {
    pub neighbor: String,
    pub remote_as: String,
    pub next_hop_self: bool,
    pub weight: Option<String>,
    pub allowas_in: bool,
    pub bfd: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimOspfNetwork {
    pub network: String,
    pub area: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimVrouter {
    pub name: String,
    pub location: String,
    pub vnet: String,
    pub router_type: String,
    pub hw_vrrp_id: Option<u16>,
    pub attrs: BTreeMap<String, String>,
    pub interfaces: Vec<SimInterface>,
    pub interface_config: BTreeMap<String, BTreeMap<String, String>>,
    pub loopbacks: Vec<String>,
    pub bgp: Vec<SimBgpNeighbor>,
    pub ospf: Vec<SimOspfNetwork>,
    pub next_nic: u32,
}

impl SimVrouter {
    pub fn interface_with_ip(&self, ip: &str) -> Option<&SimInterface> {
        self.interfaces.iter().find(|i| i.ip == ip)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimTunnel {
    pub name: String,
    pub local_ip: String,
    pub remote_ip: String,
    pub vrouter: String,
    pub vxlans: BTreeSet<u32>,
}

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimCall {
    /// Transport host the invocation was sent to.
    pub host: String,
    /// Host the command was applied to after scoping.
    pub target: String,
    /// Command tokens, starting with the command name.
    pub tokens: Vec<String>,
    pub setup: bool,
}

const MUTATION_SUFFIXES: &[&str] = &["-create", "-add", "-modify", "-delete", "-join"];

impl SimCall {
    pub fn command(&self) -> &str {
        self.tokens.first().map(String::as_str).unwrap_or_default()
    }

    pub fn is_mutation(&self) -> bool {
        let command = self.command();
        MUTATION_SUFFIXES.iter().any(|s| command.ends_with(s))
    }

    /// Command tokens joined by spaces.
    pub fn line(&self) -> String {
        self.tokens.join(" ")
    }

    /// Value following `key`.
    pub fn arg(&self, key: &str) -> Option<&str> {
        handlers::arg(&self.tokens, key)
    }
}

#[derive(Debug, Default)]
pub(crate) struct State {
    pub switches: BTreeMap<String, SimSwitch>,
    pub links: Vec<SimLink>,
    pub vlans: Vec<SimVlan>,
    pub clusters: Vec<SimCluster>,
    pub vlags: Vec<SimVlag>,
    pub vrouters: BTreeMap<String, SimVrouter>,
    pub calls: Vec<SimCall>,
    pub failures: Vec<(String, String, String)>,
}

impl State {
    /// Host key for a switch name or host.
    pub fn resolve(&self, name: &str) -> Option<String> {
        if self.switches.contains_key(name) {
            return Some(name.to_string());
        }
        self.switches
            .values()
            .find(|s| s.switch_name == name)
            .map(|s| s.host.clone())
    }

    pub fn fabric_of(&self, host: &str) -> Option<String> {
        self.switches.get(host).and_then(|s| s.fabric.clone())
    }

    /// True when `a` and `b` are members of the same fabric.
    pub fn same_fabric(&self, a: &str, b: &str) -> bool {
        match (self.fabric_of(a), self.fabric_of(b)) {
            (Some(fa), Some(fb)) => fa == fb,
            _ => false,
        }
    }

    /// Hosts sharing `host`'s fabric, or just `host` when standalone.
    pub fn fabric_peers(&self, host: &str) -> BTreeSet<String> {
        match self.fabric_of(host) {
            Some(fabric) => self
                .switches
                .values()
                .filter(|s| s.fabric.as_deref() == Some(fabric.as_str()))
                .map(|s| s.host.clone())
                .collect(),
            None => std::iter::once(host.to_string()).collect(),
        }
    }

    /// LLDP view from `host`: (local port, peer host, peer port).
    pub fn lldp(&self, host: &str) -> Vec<(u16, String, u16)> {
        let enabled = |h: &str, p: u16| {
            self.switches
                .get(h)
                .map(|s| s.port_enabled(p))
                .unwrap_or(false)
        };
        let mut rows = Vec::new();
        for link in &self.links {
            if !enabled(&link.a, link.a_port) || !enabled(&link.b, link.b_port) {
                continue;
            }
            if link.a == host {
                rows.push((link.a_port, link.b.clone(), link.b_port));
            } else if link.b == host {
                rows.push((link.b_port, link.a.clone(), link.a_port));
            }
        }
        rows.sort();
        rows
    }

    pub fn lldp_connected(&self, a: &str, b: &str) -> bool {
        self.lldp(a).iter().any(|(_, peer, _)| peer == b)
    }

    pub fn cluster_of(&self, host: &str) -> Option<&SimCluster> {
        self.clusters
            .iter()
            .find(|c| c.node1 == host || c.node2 == host)
    }

    pub fn cluster_partner(&self, host: &str) -> Option<String> {
        self.cluster_of(host).map(|c| {
            if c.node1 == host {
                c.node2.clone()
            } else {
                c.node1.clone()
            }
        })
    }

    pub fn vlan_visible(&self, vlan: &SimVlan, host: &str) -> bool {
        if vlan.scope == "fabric" {
            vlan.fabric.is_some() && vlan.fabric == self.fabric_of(host)
        } else {
            vlan.members.contains(host)
        }
    }

    pub fn display_name(&self, host: &str) -> String {
        self.switches
            .get(host)
            .map(|s| s.switch_name.clone())
            .unwrap_or_else(|| host.to_string())
    }
}

/// Builder for a [`SimFabric`].
#[derive(Debug, Default)]
pub struct SimFabricBuilder {
    switches: Vec<SimSwitch>,
    links: Vec<SimLink>,
}

impl SimFabricBuilder {
    /// Adds a switch with default settings.
    pub fn switch(self, host: &str) -> Self {
        self.switch_with(SimSwitch::new(host))
    }

    pub fn switch_with(mut self, switch: SimSwitch) -> Self {
        self.switches.push(switch);
        self
    }

    /// Cables `a:a_port` to `b:b_port`.
    pub fn link(mut self, a: &str, a_port: u16, b: &str, b_port: u16) -> Self {
        self.links.push(SimLink {
            a: a.to_string(),
            a_port,
            b: b.to_string(),
            b_port,
        });
        self
    }

    pub fn build(self) -> SimFabric {
        let state = State {
            switches: self
                .switches
                .into_iter()
                .map(|s| (s.host.clone(), s))
                .collect(),
            links: self.links,
            ..State::default()
        };
        SimFabric {
            state: Arc::new(Mutex::new(state)),
        }
    }
}

/// Shared handle to the simulated fabric.
#[derive(Debug, Clone)]
pub struct SimFabric {
    state: Arc<Mutex<State>>,
}

impl SimFabric {
    pub fn builder() -> SimFabricBuilder {
        SimFabricBuilder::default()
    }

    /// Makes every `command` addressed to `host` fail with `stderr`.
    pub fn fail_command(&self, host: &str, command: &str, stderr: &str) {
        self.state
            .lock()
            .failures
            .push((host.to_string(), command.to_string(), stderr.to_string()));
    }

    /// Enables or disables a port, e.g. to change LLDP visibility.
    pub fn set_port_enabled(&self, host: &str, port: u16, enabled: bool) {
        if let Some(p) = self
            .state
            .lock()
            .switches
            .get_mut(host)
            .and_then(|s| s.ports.get_mut(&port))
        {
            p.enabled = enabled;
        }
    }

    /// Places every switch in fabric `name` without issuing commands.
    pub fn join_all(&self, name: &str) {
        for sw in self.state.lock().switches.values_mut() {
            sw.fabric = Some(name.to_string());
        }
    }

    pub fn calls(&self) -> Vec<SimCall> {
        self.state.lock().calls.clone()
    }

    pub fn mutations(&self) -> Vec<SimCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn switch(&self, host: &str) -> Option<SimSwitch> {
        self.state.lock().switches.get(host).cloned()
    }

    pub fn vlans(&self) -> Vec<SimVlan> {
        self.state.lock().vlans.clone()
    }

    pub fn clusters(&self) -> Vec<SimCluster> {
        self.state.lock().clusters.clone()
    }

    pub fn vlags(&self) -> Vec<SimVlag> {
        self.state.lock().vlags.clone()
    }

    pub fn vrouter(&self, name: &str) -> Option<SimVrouter> {
        self.state.lock().vrouters.get(name).cloned()
    }

    pub fn vrouters(&self) -> Vec<SimVrouter> {
        self.state.lock().vrouters.values().cloned().collect()
    }
}

#[async_trait]
impl CliTransport for SimFabric {
    async fn invoke(&self, host: &str, argv: &[String]) -> CliResult<CliOutput> {
        let mut state = self.state.lock();
        let output = handlers::dispatch(&mut state, host, argv);
        debug!(
            host,
            command = %argv.join(" "),
            exit_code = output.exit_code,
            "Simulated CLI"
        );
        Ok(output)
    }
}
