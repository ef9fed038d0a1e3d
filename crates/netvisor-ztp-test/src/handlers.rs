//! Command handlers for the simulated CLI.

use std::collections::{BTreeMap, BTreeSet};

use netvisor_cli_common::CliOutput;
use netvisor_types::PortList;

use crate::sim::{
    SimBgpNeighbor, SimCall, SimCluster, SimInterface, SimOspfNetwork, SimTunnel, SimVlag,
    SimVlan, SimVrouter, State,
};

/// Value following `key` in `tokens`.
pub(crate) fn arg<'a>(tokens: &'a [String], key: &str) -> Option<&'a str> {
    tokens
        .iter()
        .position(|t| t == key)
        .and_then(|i| tokens.get(i + 1))
        .map(String::as_str)
}

fn has(tokens: &[String], keyword: &str) -> bool {
    tokens.iter().any(|t| t == keyword)
}

fn format_columns(tokens: &[String]) -> Vec<String> {
    arg(tokens, "format")
        .map(|f| f.split(',').map(str::to_string).collect())
        .unwrap_or_default()
}

/// `key value` pairs after the command, excluding output options and `skip` keys.
fn pairs(tokens: &[String], skip: &[&str]) -> Vec<(String, String)> {
    let body: Vec<&String> = tokens
        .iter()
        .skip(1)
        .take_while(|t| *t != "format" && *t != "no-show-headers" && *t != "count-output")
        .collect();
    body.chunks(2)
        .filter_map(|pair| match pair {
            [k, v] if !skip.contains(&k.as_str()) => Some((k.to_string(), v.to_string())),
            _ => None,
        })
        .collect()
}

fn ok_lines(lines: Vec<String>) -> CliOutput {
    CliOutput::ok(lines.join("\n"))
}

fn done() -> CliOutput {
    CliOutput::ok("")
}

fn err(message: impl Into<String>) -> CliOutput {
    CliOutput::failed(message)
}

macro_rules! required {
    ($tokens:expr, $key:expr) => {
        match arg($tokens, $key) {
            Some(value) => value,
            None => return err(format!("missing required argument {}", $key)),
        }
    };
}

pub(crate) fn dispatch(state: &mut State, host: &str, argv: &[String]) -> CliOutput {
    if !state.switches.contains_key(host) {
        return CliOutput {
            exit_code: 255,
            stdout: String::new(),
            stderr: format!("ssh: Could not resolve hostname {}", host),
        };
    }

    let mut idx = 1;
    let mut setup = false;
    while let Some(token) = argv.get(idx).filter(|t| t.starts_with("--")) {
        match token.as_str() {
            "--skip-setup" => setup = true,
            "--user" => idx += 1,
            _ => {}
        }
        idx += 1;
    }

    let mut target = host.to_string();
    match argv.get(idx).map(String::as_str) {
        Some("switch-local") => idx += 1,
        Some("switch") => {
            let name = argv.get(idx + 1).cloned().unwrap_or_default();
            idx += 2;
            match state.resolve(&name) {
                Some(resolved) if resolved == host || state.same_fabric(host, &resolved) => {
                    target = resolved
                }
                _ => return err(format!("switch {} is not in the fabric", name)),
            }
        }
        _ => {}
    }

    let tokens: Vec<String> = argv.get(idx..).map(<[String]>::to_vec).unwrap_or_default();
    state.calls.push(SimCall {
        host: host.to_string(),
        target: target.clone(),
        tokens: tokens.clone(),
        setup,
    });

    let Some(command) = tokens.first().cloned() else {
        return err("no command given");
    };
    if let Some((_, _, stderr)) = state
        .failures
        .iter()
        .find(|(h, c, _)| *h == target && *c == command)
    {
        return err(stderr.clone());
    }

    let eula_accepted = state
        .switches
        .get(&target)
        .map(|s| s.eula_accepted)
        .unwrap_or(false);
    if !setup && !eula_accepted {
        return err("EULA has not been accepted");
    }

    let t = target.as_str();
    let tokens = tokens.as_slice();
    match command.as_str() {
        "eula-show" => eula_show(state, t),
        "switch-setup-modify" => switch_setup_modify(state, t, tokens),
        "switch-setup-show" => switch_setup_show(state, t, tokens),
        "fabric-info" => fabric_info(state, t),
        "fabric-show" => fabric_show(state),
        "fabric-create" => fabric_create(state, t, tokens),
        "fabric-join" => fabric_join(state, t, tokens),
        "fabric-local-modify" => fabric_local_modify(state, t, tokens),
        "fabric-node-show" => fabric_node_show(state, t, tokens),
        "admin-service-show" => admin_service_show(state, t),
        "admin-service-modify" => admin_service_modify(state, t, tokens),
        "stp-show" => stp_show(state, t),
        "stp-modify" => stp_modify(state, t, tokens),
        "port-config-show" => port_config_show(state, t),
        "port-config-modify" => port_config_modify(state, t, tokens),
        "port-show" => port_show(state, t, tokens),
        "lldp-show" => lldp_show(state, t),
        "vlan-show" => vlan_show(state, t),
        "vlan-create" => vlan_create(state, t, tokens),
        "vrouter-show" => vrouter_show(state, t, tokens),
        "vrouter-create" => vrouter_create(state, t, tokens),
        "vrouter-modify" => vrouter_modify(state, tokens),
        "vrouter-interface-show" => interface_show(state, tokens),
        "vrouter-interface-add" => interface_add(state, tokens),
        "vrouter-interface-config-show" => interface_config_show(state, tokens),
        "vrouter-interface-config-add" => interface_config_set(state, tokens, true),
        "vrouter-interface-config-modify" => interface_config_set(state, tokens, false),
        "vrouter-loopback-interface-show" => loopback_show(state, tokens),
        "vrouter-loopback-interface-add" => loopback_add(state, tokens),
        "vrouter-bgp-show" => bgp_show(state, tokens),
        "vrouter-bgp-add" => bgp_add(state, tokens),
        "vrouter-ospf-show" => ospf_show(state, tokens),
        "vrouter-ospf-add" => ospf_add(state, tokens),
        "cluster-show" => cluster_show(state, t),
        "cluster-create" => cluster_create(state, t, tokens),
        "trunk-show" => trunk_show(state, t),
        "trunk-create" => trunk_create(state, t, tokens),
        "trunk-delete" => trunk_delete(state, t, tokens),
        "trunk-modify" => trunk_modify(state, t, tokens),
        "vlag-show" => vlag_show(state, t),
        "vlag-create" => vlag_create(state, t, tokens),
        "system-settings-show" => system_settings_show(state, t),
        "system-settings-modify" => system_settings_modify(state, t, tokens),
        "tunnel-show" => tunnel_show(state, t),
        "tunnel-create" => tunnel_create(state, t, tokens),
        "tunnel-vxlan-show" => tunnel_vxlan_show(state, t, tokens),
        "tunnel-vxlan-add" => tunnel_vxlan_add(state, t, tokens),
        other => err(format!("unknown command {}", other)),
    }
}

// Setup and fabric membership

fn eula_show(state: &State, t: &str) -> CliOutput {
    match state.switches.get(t) {
        Some(sw) if sw.eula_accepted => ok_lines(vec!["eula-accepted: yes".to_string()]),
        _ => err("switch setup has not been completed"),
    }
}

fn switch_setup_modify(state: &mut State, t: &str, tokens: &[String]) -> CliOutput {
    let values = pairs(tokens, &[]);
    let Some(sw) = state.switches.get_mut(t) else {
        return err("unknown switch");
    };
    let accept = values
        .iter()
        .any(|(k, v)| k == "eula-accepted" && v == "true");
    if accept {
        if !values.iter().any(|(k, _)| k == "password") {
            return err("password required to accept the EULA");
        }
        sw.eula_accepted = true;
    }
    for (key, value) in values {
        match key.as_str() {
            "password" | "eula-accepted" => {}
            "switch-name" => {
                sw.switch_name = value.clone();
                sw.setup.insert(key, value);
            }
            _ => {
                sw.setup.insert(key, value);
            }
        }
    }
    done()
}

fn switch_setup_show(state: &State, t: &str, tokens: &[String]) -> CliOutput {
    let Some(sw) = state.switches.get(t) else {
        return err("unknown switch");
    };
    let columns = format_columns(tokens);
    let lines = sw
        .setup
        .iter()
        .filter(|(k, _)| columns.is_empty() || columns.contains(k))
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect();
    ok_lines(lines)
}

fn fabric_info(state: &State, t: &str) -> CliOutput {
    match state.switches.get(t) {
        Some(sw) => match &sw.fabric {
            Some(name) => ok_lines(vec![
                format!("name: {}", name),
                format!("control-network: {}", sw.control_network),
                format!("fabric-network: {}", sw.fabric_network),
            ]),
            None => err("switch is not part of a fabric"),
        },
        None => err("unknown switch"),
    }
}

fn fabric_show(state: &State) -> CliOutput {
    let names: BTreeSet<String> = state
        .switches
        .values()
        .filter_map(|s| s.fabric.clone())
        .collect();
    ok_lines(names.into_iter().collect())
}

fn fabric_create(state: &mut State, t: &str, tokens: &[String]) -> CliOutput {
    let name = required!(tokens, "name").to_string();
    if state.switches.values().any(|s| s.fabric.as_deref() == Some(name.as_str())) {
        return err(format!("fabric {} already exists", name));
    }
    let fabric_network = arg(tokens, "fabric-network").unwrap_or("mgmt").to_string();
    let control_network = arg(tokens, "control-network").unwrap_or("mgmt").to_string();
    let Some(sw) = state.switches.get_mut(t) else {
        return err("unknown switch");
    };
    if let Some(existing) = &sw.fabric {
        return err(format!("switch is already in fabric {}", existing));
    }
    sw.fabric = Some(name);
    sw.fabric_network = fabric_network;
    sw.control_network = control_network;
    done()
}

fn fabric_join(state: &mut State, t: &str, tokens: &[String]) -> CliOutput {
    let name = required!(tokens, "name").to_string();
    let Some(member) = state
        .switches
        .values()
        .find(|s| s.fabric.as_deref() == Some(name.as_str()))
        .cloned()
    else {
        return err(format!("fabric {} not found", name));
    };
    let Some(sw) = state.switches.get_mut(t) else {
        return err("unknown switch");
    };
    if let Some(existing) = &sw.fabric {
        return err(format!("switch is already in fabric {}", existing));
    }
    sw.fabric = Some(name);
    sw.fabric_network = member.fabric_network;
    sw.control_network = member.control_network;
    done()
}

fn fabric_local_modify(state: &mut State, t: &str, tokens: &[String]) -> CliOutput {
    let Some(sw) = state.switches.get_mut(t) else {
        return err("unknown switch");
    };
    if sw.fabric.is_none() {
        return err("switch is not part of a fabric");
    }
    if let Some(net) = arg(tokens, "control-network") {
        sw.control_network = net.to_string();
    }
    if let Some(net) = arg(tokens, "fabric-network") {
        sw.fabric_network = net.to_string();
    }
    done()
}

fn fabric_node_show(state: &State, t: &str, tokens: &[String]) -> CliOutput {
    let peers = state.fabric_peers(t);
    if has(tokens, "count-output") {
        return ok_lines(vec![format!("Count: {}", peers.len())]);
    }
    ok_lines(peers.iter().map(|h| state.display_name(h)).collect())
}

// Switch services and ports

fn admin_service_show(state: &State, t: &str) -> CliOutput {
    match state.switches.get(t) {
        Some(sw) => ok_lines(vec![format!(
            "mgmt {}",
            if sw.web_enabled { "on" } else { "off" }
        )]),
        None => err("unknown switch"),
    }
}

fn admin_service_modify(state: &mut State, t: &str, tokens: &[String]) -> CliOutput {
    let Some(sw) = state.switches.get_mut(t) else {
        return err("unknown switch");
    };
    if has(tokens, "web") {
        sw.web_enabled = true;
    } else if has(tokens, "no-web") {
        sw.web_enabled = false;
    }
    done()
}

fn stp_show(state: &State, t: &str) -> CliOutput {
    match state.switches.get(t) {
        Some(sw) => ok_lines(vec![if sw.stp_enabled { "yes" } else { "no" }.to_string()]),
        None => err("unknown switch"),
    }
}

fn stp_modify(state: &mut State, t: &str, tokens: &[String]) -> CliOutput {
    let Some(sw) = state.switches.get_mut(t) else {
        return err("unknown switch");
    };
    if has(tokens, "enable") {
        sw.stp_enabled = true;
    } else if has(tokens, "disable") {
        sw.stp_enabled = false;
    } else {
        return err("stp-modify requires enable or disable");
    }
    done()
}

fn port_config_show(state: &State, t: &str) -> CliOutput {
    match state.switches.get(t) {
        Some(sw) => ok_lines(
            sw.ports
                .values()
                .map(|p| {
                    format!(
                        "{} {} {}",
                        p.port,
                        if p.enabled { "on" } else { "off" },
                        p.speed
                    )
                })
                .collect(),
        ),
        None => err("unknown switch"),
    }
}

fn port_config_modify(state: &mut State, t: &str, tokens: &[String]) -> CliOutput {
    let spec = required!(tokens, "port");
    let Ok(list) = spec.parse::<PortList>() else {
        return err(format!("invalid port list {}", spec));
    };
    let Some(sw) = state.switches.get_mut(t) else {
        return err("unknown switch");
    };
    if let Some(missing) = list.iter().find(|p| !sw.ports.contains_key(&p.as_u16())) {
        return err(format!("port {} not found", missing));
    }
    let speed = arg(tokens, "speed").map(str::to_string);
    for port in list.iter() {
        if let Some(p) = sw.ports.get_mut(&port.as_u16()) {
            if has(tokens, "enable") {
                p.enabled = true;
            }
            if has(tokens, "disable") {
                p.enabled = false;
            }
            if let Some(speed) = &speed {
                p.speed = speed.clone();
            }
        }
    }
    done()
}

fn port_show(state: &State, t: &str, tokens: &[String]) -> CliOutput {
    let port: u16 = match required!(tokens, "port").parse() {
        Ok(port) => port,
        Err(_) => return err("invalid port"),
    };
    match state.switches.get(t).and_then(|sw| sw.ports.get(&port)) {
        Some(p) => ok_lines(vec![format!("{} {}", p.port, p.bezel)]),
        None => err(format!("port {} not found", port)),
    }
}

fn lldp_show(state: &State, t: &str) -> CliOutput {
    ok_lines(
        state
            .lldp(t)
            .into_iter()
            .map(|(local, peer, peer_port)| {
                format!("{} {} {}", local, state.display_name(&peer), peer_port)
            })
            .collect(),
    )
}

// VLANs

fn vlan_show(state: &State, t: &str) -> CliOutput {
    let mut rows: Vec<(u16, String)> = state
        .vlans
        .iter()
        .filter(|v| state.vlan_visible(v, t))
        .map(|v| (v.id, v.scope.clone()))
        .collect();
    rows.sort();
    ok_lines(
        rows.into_iter()
            .map(|(id, scope)| format!("{} {}", id, scope))
            .collect(),
    )
}

fn vlan_create(state: &mut State, t: &str, tokens: &[String]) -> CliOutput {
    let id: u16 = match required!(tokens, "id").parse() {
        Ok(id) if (2..=4092).contains(&id) => id,
        _ => return err("vlan id must be between 2 and 4092"),
    };
    let scope = required!(tokens, "scope").to_string();
    if state
        .vlans
        .iter()
        .any(|v| v.id == id && state.vlan_visible(v, t))
    {
        return err(format!("vlan {} already exists", id));
    }
    let mut members = BTreeSet::new();
    let fabric = state.fabric_of(t);
    match scope.as_str() {
        "fabric" => {
            if fabric.is_none() {
                return err("fabric scope requires fabric membership");
            }
        }
        "cluster" => match state.cluster_partner(t) {
            Some(partner) => {
                members.insert(t.to_string());
                members.insert(partner);
            }
            None => return err("cluster scope requires a cluster"),
        },
        "local" => {
            members.insert(t.to_string());
        }
        other => return err(format!("invalid scope {}", other)),
    }
    let vxlan = arg(tokens, "vxlan").and_then(|v| v.parse().ok());
    state.vlans.push(SimVlan {
        id,
        scope,
        vxlan,
        untagged_ports: arg(tokens, "untagged-ports").map(str::to_string),
        members,
        fabric,
        created_on: t.to_string(),
    });
    CliOutput::ok(format!("Vlan {} created", id))
}

// vRouters

fn vrouter_visible(state: &State, vrouter: &SimVrouter, t: &str) -> bool {
    vrouter.location == t || state.same_fabric(&vrouter.location, t)
}

fn vrouter_show(state: &State, t: &str, tokens: &[String]) -> CliOutput {
    if let Some(name) = arg(tokens, "name") {
        let Some(vr) = state
            .vrouters
            .get(name)
            .filter(|vr| vrouter_visible(state, vr, t))
        else {
            return err(format!("vrouter {} not found", name));
        };
        let mut row = vec![vr.name.clone()];
        for column in format_columns(tokens) {
            let value = match column.as_str() {
                "location" => Some(state.display_name(&vr.location)),
                "vnet" => Some(vr.vnet.clone()),
                "router-type" => Some(vr.router_type.clone()),
                "hw-vrrp-id" => vr.hw_vrrp_id.map(|id| id.to_string()),
                other => vr.attrs.get(other).cloned(),
            };
            if let Some(value) = value {
                row.push(value);
            }
        }
        return ok_lines(vec![row.join(" ")]);
    }
    ok_lines(
        state
            .vrouters
            .values()
            .filter(|vr| vrouter_visible(state, vr, t))
            .map(|vr| {
                format!(
                    "{} {} {} {}",
                    vr.name,
                    state.display_name(&vr.location),
                    vr.vnet,
                    vr.router_type
                )
            })
            .collect(),
    )
}

fn vrouter_create(state: &mut State, t: &str, tokens: &[String]) -> CliOutput {
    let name = required!(tokens, "name").to_string();
    let vnet = required!(tokens, "vnet").to_string();
    if state.vrouters.contains_key(&name) {
        return err(format!("vrouter {} already exists", name));
    }
    if let Some(existing) = state.vrouters.values().find(|vr| vr.location == t) {
        return err(format!("switch already hosts vrouter {}", existing.name));
    }
    let hw_vrrp_id = match arg(tokens, "hw-vrrp-id").map(str::parse::<u16>) {
        Some(Ok(id)) => Some(id),
        Some(Err(_)) => return err("invalid hw-vrrp-id"),
        None => None,
    };
    state.vrouters.insert(
        name.clone(),
        SimVrouter {
            name,
            location: t.to_string(),
            vnet,
            router_type: arg(tokens, "router-type").unwrap_or("software").to_string(),
            hw_vrrp_id,
            attrs: BTreeMap::new(),
            interfaces: Vec::new(),
            interface_config: BTreeMap::new(),
            loopbacks: Vec::new(),
            bgp: Vec::new(),
            ospf: Vec::new(),
            next_nic: 0,
        },
    );
    done()
}

fn vrouter_modify(state: &mut State, tokens: &[String]) -> CliOutput {
    let name = required!(tokens, "name").to_string();
    let Some(vr) = state.vrouters.get_mut(&name) else {
        return err(format!("vrouter {} not found", name));
    };
    for (key, value) in pairs(tokens, &["name"]) {
        if key == "hw-vrrp-id" {
            match value.parse() {
                Ok(id) => vr.hw_vrrp_id = Some(id),
                Err(_) => return err("invalid hw-vrrp-id"),
            }
        } else {
            vr.attrs.insert(key, value);
        }
    }
    done()
}

fn vrouter_mut<'a>(state: &'a mut State, tokens: &[String]) -> Result<&'a mut SimVrouter, CliOutput> {
    let Some(name) = arg(tokens, "vrouter-name") else {
        return Err(err("missing required argument vrouter-name"));
    };
    state
        .vrouters
        .get_mut(name)
        .ok_or_else(|| err(format!("vrouter {} not found", name)))
}

fn vrouter_ref<'a>(state: &'a State, tokens: &[String]) -> Result<&'a SimVrouter, CliOutput> {
    let Some(name) = arg(tokens, "vrouter-name") else {
        return Err(err("missing required argument vrouter-name"));
    };
    state
        .vrouters
        .get(name)
        .ok_or_else(|| err(format!("vrouter {} not found", name)))
}

fn interface_column(iface: &SimInterface, column: &str) -> String {
    let value = match column {
        "nic" => Some(iface.nic.clone()),
        "ip" => Some(iface.ip.clone()),
        "vlan" => iface.vlan.map(|v| v.to_string()),
        "l3-port" => iface.l3_port.map(|p| p.to_string()),
        "vrrp-id" => iface.vrrp_id.map(|v| v.to_string()),
        "vrrp-primary" => iface.vrrp_primary.clone(),
        "vrrp-priority" => iface.vrrp_priority.map(|v| v.to_string()),
        _ => None,
    };
    value.unwrap_or_else(|| "-".to_string())
}

fn interface_show(state: &State, tokens: &[String]) -> CliOutput {
    let vr = match vrouter_ref(state, tokens) {
        Ok(vr) => vr,
        Err(out) => return out,
    };
    let ip = arg(tokens, "ip");
    let vlan = arg(tokens, "vlan").and_then(|v| v.parse::<u16>().ok());
    let l3_port = arg(tokens, "l3-port").and_then(|p| p.parse::<u16>().ok());
    let primary = arg(tokens, "vrrp-primary");
    let mut columns = format_columns(tokens);
    if columns.is_empty() {
        columns = vec!["nic".to_string(), "ip".to_string()];
    }
    let rows = vr
        .interfaces
        .iter()
        .filter(|i| ip.map_or(true, |ip| i.ip == ip))
        .filter(|i| vlan.map_or(true, |v| i.vlan == Some(v)))
        .filter(|i| l3_port.map_or(true, |p| i.l3_port == Some(p)))
        .filter(|i| primary.map_or(true, |p| i.vrrp_primary.as_deref() == Some(p)))
        .map(|i| {
            columns
                .iter()
                .map(|c| interface_column(i, c))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();
    ok_lines(rows)
}

fn interface_add(state: &mut State, tokens: &[String]) -> CliOutput {
    let ip = required!(tokens, "ip").to_string();
    let vlan = arg(tokens, "vlan").and_then(|v| v.parse::<u16>().ok());
    let l3_port = arg(tokens, "l3-port").and_then(|p| p.parse::<u16>().ok());
    let location = match vrouter_ref(state, tokens) {
        Ok(vr) => vr.location.clone(),
        Err(out) => return out,
    };
    match (vlan, l3_port) {
        (Some(vlan), None) => {
            if !state
                .vlans
                .iter()
                .any(|v| v.id == vlan && state.vlan_visible(v, &location))
            {
                return err(format!("vlan {} not found", vlan));
            }
        }
        (None, Some(port)) => {
            let Some(sw) = state.switches.get(&location) else {
                return err("unknown switch");
            };
            if !sw.ports.contains_key(&port) {
                return err(format!("port {} not found", port));
            }
            if let Some(trunk) = sw.trunk_of(port) {
                return err(format!("port {} is a member of trunk {}", port, trunk));
            }
        }
        _ => return err("exactly one of vlan or l3-port is required"),
    }
    let vrrp_id = arg(tokens, "vrrp-id").and_then(|v| v.parse::<u16>().ok());
    let vrrp_primary = arg(tokens, "vrrp-primary").map(str::to_string);
    let vrrp_priority = arg(tokens, "vrrp-priority").and_then(|v| v.parse::<u16>().ok());

    let vr = match vrouter_mut(state, tokens) {
        Ok(vr) => vr,
        Err(out) => return out,
    };
    if vr.interface_with_ip(&ip).is_some() {
        return err(format!("ip {} already configured on {}", ip, vr.name));
    }
    if let Some(id) = vrrp_id {
        if vr.hw_vrrp_id != Some(id) {
            return err(format!("vrrp-id {} does not match hw-vrrp-id", id));
        }
        match &vrrp_primary {
            Some(nic) if vr.interfaces.iter().any(|i| &i.nic == nic) => {}
            _ => return err("vrrp-primary must name an existing interface"),
        }
    }
    let nic = format!("eth{}.{}", vr.next_nic, vlan.unwrap_or(0));
    vr.next_nic += 1;
    vr.interfaces.push(SimInterface {
        nic,
        ip,
        vlan,
        l3_port,
        vrrp_id,
        vrrp_primary,
        vrrp_priority,
    });
    done()
}

fn interface_config_show(state: &State, tokens: &[String]) -> CliOutput {
    let vr = match vrouter_ref(state, tokens) {
        Ok(vr) => vr,
        Err(out) => return out,
    };
    let nic = required!(tokens, "nic");
    if !vr.interfaces.iter().any(|i| i.nic == nic) {
        return err(format!("nic {} not found", nic));
    }
    // Unconfigured nics print only the key; configured ones pad unset columns.
    let mut row = vec![nic.to_string()];
    if let Some(config) = vr.interface_config.get(nic) {
        for column in format_columns(tokens) {
            row.push(config.get(&column).cloned().unwrap_or_else(|| "-".to_string()));
        }
    }
    ok_lines(vec![row.join(" ")])
}

fn interface_config_set(state: &mut State, tokens: &[String], create: bool) -> CliOutput {
    let nic = required!(tokens, "nic").to_string();
    let values = pairs(tokens, &["vrouter-name", "nic"]);
    let vr = match vrouter_mut(state, tokens) {
        Ok(vr) => vr,
        Err(out) => return out,
    };
    if !vr.interfaces.iter().any(|i| i.nic == nic) {
        return err(format!("nic {} not found", nic));
    }
    let exists = vr.interface_config.contains_key(&nic);
    if create && exists {
        return err(format!("interface config for {} already exists", nic));
    }
    if !create && !exists {
        return err(format!("interface config for {} not found", nic));
    }
    vr.interface_config.entry(nic).or_default().extend(values);
    done()
}

fn loopback_show(state: &State, tokens: &[String]) -> CliOutput {
    match vrouter_ref(state, tokens) {
        Ok(vr) => ok_lines(vr.loopbacks.clone()),
        Err(out) => out,
    }
}

fn loopback_add(state: &mut State, tokens: &[String]) -> CliOutput {
    let ip = required!(tokens, "ip").to_string();
    let vr = match vrouter_mut(state, tokens) {
        Ok(vr) => vr,
        Err(out) => return out,
    };
    if vr.loopbacks.contains(&ip) {
        return err(format!("loopback {} already exists", ip));
    }
    vr.loopbacks.push(ip);
    done()
}

fn bgp_show(state: &State, tokens: &[String]) -> CliOutput {
    match vrouter_ref(state, tokens) {
        Ok(vr) => ok_lines(
            vr.bgp
                .iter()
                .map(|n| format!("{} {}", n.neighbor, n.remote_as))
                .collect(),
        ),
        Err(out) => out,
    }
}

fn bgp_add(state: &mut State, tokens: &[String]) -> CliOutput {
    let neighbor = required!(tokens, "neighbor").to_string();
    let remote_as = required!(tokens, "remote-as").to_string();
    let vr = match vrouter_mut(state, tokens) {
        Ok(vr) => vr,
        Err(out) => return out,
    };
    if !vr.attrs.contains_key("bgp-as") {
        return err(format!("vrouter {} has no bgp-as", vr.name));
    }
    if vr.bgp.iter().any(|n| n.neighbor == neighbor) {
        return err(format!("bgp neighbor {} already exists", neighbor));
    }
    vr.bgp.push(SimBgpNeighbor {
        neighbor,
        remote_as,
        next_hop_self: has(tokens, "next-hop-self"),
        weight: arg(tokens, "weight").map(str::to_string),
        allowas_in: has(tokens, "allowas-in"),
        bfd: has(tokens, "bfd"),
    });
    done()
}

fn ospf_show(state: &State, tokens: &[String]) -> CliOutput {
    match vrouter_ref(state, tokens) {
        Ok(vr) => ok_lines(
            vr.ospf
                .iter()
                .map(|n| format!("{} {}", n.network, n.area))
                .collect(),
        ),
        Err(out) => out,
    }
}

fn ospf_add(state: &mut State, tokens: &[String]) -> CliOutput {
    let network = required!(tokens, "network").to_string();
    let area = required!(tokens, "ospf-area").to_string();
    let vr = match vrouter_mut(state, tokens) {
        Ok(vr) => vr,
        Err(out) => return out,
    };
    if vr.ospf.iter().any(|n| n.network == network) {
        return err(format!("ospf network {} already exists", network));
    }
    vr.ospf.push(SimOspfNetwork { network, area });
    done()
}

// Clusters, trunks and vLAGs

fn cluster_show(state: &State, t: &str) -> CliOutput {
    let peers = state.fabric_peers(t);
    ok_lines(
        state
            .clusters
            .iter()
            .filter(|c| peers.contains(&c.node1))
            .map(|c| {
                format!(
                    "{} {} {}",
                    c.name,
                    state.display_name(&c.node1),
                    state.display_name(&c.node2)
                )
            })
            .collect(),
    )
}

fn cluster_create(state: &mut State, t: &str, tokens: &[String]) -> CliOutput {
    let name = required!(tokens, "name").to_string();
    let (Some(node1), Some(node2)) = (
        state.resolve(required!(tokens, "cluster-node-1")),
        state.resolve(required!(tokens, "cluster-node-2")),
    ) else {
        return err("unknown cluster node");
    };
    if state.clusters.iter().any(|c| c.name == name) {
        return err(format!("cluster {} already exists", name));
    }
    for node in [&node1, &node2] {
        if !(node.as_str() == t || state.same_fabric(node, t)) {
            return err(format!("{} is not in the fabric", node));
        }
        if state.cluster_of(node).is_some() {
            return err(format!("{} is already in a cluster", node));
        }
    }
    if !state.lldp_connected(&node1, &node2) {
        return err(format!("{} and {} are not connected", node1, node2));
    }
    state.clusters.push(SimCluster { name, node1, node2 });
    done()
}

fn trunk_show(state: &State, t: &str) -> CliOutput {
    match state.switches.get(t) {
        Some(sw) => ok_lines(
            sw.trunks
                .iter()
                .map(|(name, ports)| {
                    if ports.is_empty() {
                        name.clone()
                    } else {
                        let list: Vec<String> = ports.iter().map(u16::to_string).collect();
                        format!("{} {}", name, list.join(","))
                    }
                })
                .collect(),
        ),
        None => err("unknown switch"),
    }
}

fn parse_ports(tokens: &[String]) -> Result<BTreeSet<u16>, CliOutput> {
    let spec = arg(tokens, "ports").unwrap_or_default();
    spec.parse::<PortList>()
        .map(|list| list.iter().map(|p| p.as_u16()).collect())
        .map_err(|_| err(format!("invalid port list {}", spec)))
}

fn trunk_create(state: &mut State, t: &str, tokens: &[String]) -> CliOutput {
    let name = required!(tokens, "name").to_string();
    let ports = match parse_ports(tokens) {
        Ok(ports) => ports,
        Err(out) => return out,
    };
    let Some(sw) = state.switches.get_mut(t) else {
        return err("unknown switch");
    };
    if sw.trunks.contains_key(&name) {
        return err(format!("trunk {} already exists", name));
    }
    if let Some(port) = ports.iter().find(|p| sw.trunk_of(**p).is_some()) {
        return err(format!("port {} is already a trunk member", port));
    }
    sw.trunks.insert(name, ports);
    done()
}

fn trunk_delete(state: &mut State, t: &str, tokens: &[String]) -> CliOutput {
    let name = required!(tokens, "name");
    match state.switches.get_mut(t).and_then(|sw| sw.trunks.remove(name)) {
        Some(_) => done(),
        None => err(format!("trunk {} not found", name)),
    }
}

fn trunk_modify(state: &mut State, t: &str, tokens: &[String]) -> CliOutput {
    let name = required!(tokens, "name").to_string();
    let ports = match parse_ports(tokens) {
        Ok(ports) => ports,
        Err(out) => return out,
    };
    match state.switches.get_mut(t) {
        Some(sw) if sw.trunks.contains_key(&name) => {
            sw.trunks.insert(name, ports);
            done()
        }
        _ => err(format!("trunk {} not found", name)),
    }
}

fn vlag_show(state: &State, t: &str) -> CliOutput {
    let peers = state.fabric_peers(t);
    ok_lines(
        state
            .vlags
            .iter()
            .filter(|v| peers.contains(&v.switch))
            .map(|v| v.name.clone())
            .collect(),
    )
}

fn vlag_create(state: &mut State, t: &str, tokens: &[String]) -> CliOutput {
    let name = required!(tokens, "name").to_string();
    let port = required!(tokens, "port").to_string();
    let peer_port = required!(tokens, "peer-port").to_string();
    let Some(peer) = state.resolve(required!(tokens, "peer-switch")) else {
        return err("unknown peer-switch");
    };
    if state.vlags.iter().any(|v| v.name == name) {
        return err(format!("vlag {} already exists", name));
    }
    if state.cluster_partner(t).as_deref() != Some(peer.as_str()) {
        return err(format!("no cluster between {} and {}", t, peer));
    }
    let has_trunk = |host: &str, trunk: &str| {
        state
            .switches
            .get(host)
            .map(|s| s.trunks.contains_key(trunk))
            .unwrap_or(false)
    };
    if !has_trunk(t, &port) {
        return err(format!("trunk {} not found", port));
    }
    if !has_trunk(&peer, &peer_port) {
        return err(format!("peer trunk {} not found", peer_port));
    }
    state.vlags.push(SimVlag {
        name,
        switch: t.to_string(),
        port,
        peer_port,
        peer_switch: peer,
        mode: arg(tokens, "mode").unwrap_or("active-standby").to_string(),
    });
    done()
}

// Settings and tunnels

fn system_settings_show(state: &State, t: &str) -> CliOutput {
    match state.switches.get(t) {
        Some(sw) => ok_lines(vec![if sw.auto_trunk { "on" } else { "off" }.to_string()]),
        None => err("unknown switch"),
    }
}

fn system_settings_modify(state: &mut State, t: &str, tokens: &[String]) -> CliOutput {
    let Some(sw) = state.switches.get_mut(t) else {
        return err("unknown switch");
    };
    if has(tokens, "enable-auto-trunk") {
        sw.auto_trunk = true;
    } else if has(tokens, "disable-auto-trunk") {
        sw.auto_trunk = false;
    }
    done()
}

fn tunnel_show(state: &State, t: &str) -> CliOutput {
    match state.switches.get(t) {
        Some(sw) => ok_lines(
            sw.tunnels
                .values()
                .map(|tn| format!("{} {} {}", tn.name, tn.local_ip, tn.remote_ip))
                .collect(),
        ),
        None => err("unknown switch"),
    }
}

fn tunnel_create(state: &mut State, t: &str, tokens: &[String]) -> CliOutput {
    let name = required!(tokens, "name").to_string();
    let local_ip = required!(tokens, "local-ip").to_string();
    let remote_ip = required!(tokens, "remote-ip").to_string();
    let vrouter = required!(tokens, "vrouter-name").to_string();
    if !state.vrouters.contains_key(&vrouter) {
        return err(format!("vrouter {} not found", vrouter));
    }
    let Some(sw) = state.switches.get_mut(t) else {
        return err("unknown switch");
    };
    if sw.tunnels.contains_key(&name) {
        return err(format!("tunnel {} already exists", name));
    }
    sw.tunnels.insert(
        name.clone(),
        SimTunnel {
            name,
            local_ip,
            remote_ip,
            vrouter,
            vxlans: BTreeSet::new(),
        },
    );
    done()
}

fn tunnel_vxlan_show(state: &State, t: &str, tokens: &[String]) -> CliOutput {
    let name = required!(tokens, "name");
    match state.switches.get(t).and_then(|sw| sw.tunnels.get(name)) {
        Some(tn) => ok_lines(tn.vxlans.iter().map(u32::to_string).collect()),
        None => err(format!("tunnel {} not found", name)),
    }
}

fn tunnel_vxlan_add(state: &mut State, t: &str, tokens: &[String]) -> CliOutput {
    let name = required!(tokens, "name").to_string();
    let vxlan: u32 = match required!(tokens, "vxlan").parse() {
        Ok(v) => v,
        Err(_) => return err("invalid vxlan"),
    };
    match state
        .switches
        .get_mut(t)
        .and_then(|sw| sw.tunnels.get_mut(&name))
    {
        Some(tn) => {
            if !tn.vxlans.insert(vxlan) {
                return err(format!("vxlan {} already mapped", vxlan));
            }
            done()
        }
        None => err(format!("tunnel {} not found", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimSwitch;
    use pretty_assertions::assert_eq;

    fn argv(line: &str) -> Vec<String> {
        std::iter::once("/usr/bin/cli".to_string())
            .chain(line.split_whitespace().map(str::to_string))
            .collect()
    }

    fn state() -> State {
        let mut state = State::default();
        for host in ["s1", "s2"] {
            state.switches.insert(host.to_string(), SimSwitch::new(host));
        }
        state.links.push(crate::sim::SimLink {
            a: "s1".to_string(),
            a_port: 1,
            b: "s2".to_string(),
            b_port: 1,
        });
        state
    }

    #[test]
    fn test_fabric_create_then_join() {
        let mut state = state();
        let out = dispatch(&mut state, "s1", &argv("--quiet switch-local fabric-create name f1 fabric-network mgmt control-network in-band"));
        assert!(out.success());
        let out = dispatch(&mut state, "s2", &argv("--quiet switch-local fabric-join name f1"));
        assert!(out.success());
        let info = dispatch(&mut state, "s2", &argv("--quiet fabric-info"));
        assert_eq!(
            info.stdout,
            "name: f1\ncontrol-network: in-band\nfabric-network: mgmt"
        );
    }

    #[test]
    fn test_switch_scope_requires_shared_fabric() {
        let mut state = state();
        let out = dispatch(&mut state, "s1", &argv("--quiet switch s2 vlan-show"));
        assert!(!out.success());
        assert_eq!(state.calls.len(), 0);
    }

    #[test]
    fn test_lldp_hides_disabled_ports() {
        let mut state = state();
        assert_eq!(dispatch(&mut state, "s1", &argv("lldp-show")).stdout, "1 s2 1");
        dispatch(&mut state, "s2", &argv("port-config-modify port 1 disable"));
        assert_eq!(dispatch(&mut state, "s1", &argv("lldp-show")).stdout, "");
    }

    #[test]
    fn test_eula_gate() {
        let mut state = state();
        if let Some(sw) = state.switches.get_mut("s1") {
            sw.eula_accepted = false;
        }
        assert!(!dispatch(&mut state, "s1", &argv("--quiet vlan-show")).success());
        assert!(!dispatch(&mut state, "s1", &argv("--quiet --skip-setup eula-show")).success());
        let accept = dispatch(
            &mut state,
            "s1",
            &argv("--quiet --skip-setup --script-password switch-setup-modify password pw eula-accepted true"),
        );
        assert!(accept.success());
        assert!(dispatch(&mut state, "s1", &argv("--quiet vlan-show")).success());
    }

    #[test]
    fn test_trunk_member_blocks_l3_port() {
        let mut state = state();
        dispatch(&mut state, "s1", &argv("fabric-create name f1"));
        dispatch(&mut state, "s1", &argv("trunk-create name t1 ports 1,2"));
        dispatch(&mut state, "s1", &argv("vrouter-create name s1-vrouter vnet f1-global router-type hardware enable"));
        let out = dispatch(
            &mut state,
            "s1",
            &argv("vrouter-interface-add vrouter-name s1-vrouter ip 10.0.0.1/30 l3-port 1"),
        );
        assert_eq!(out.stderr, "port 1 is a member of trunk t1");
        dispatch(&mut state, "s1", &argv("trunk-delete name t1"));
        let out = dispatch(
            &mut state,
            "s1",
            &argv("vrouter-interface-add vrouter-name s1-vrouter ip 10.0.0.1/30 l3-port 1"),
        );
        assert!(out.success());
        let shown = dispatch(
            &mut state,
            "s1",
            &argv("vrouter-interface-show vrouter-name s1-vrouter l3-port 1 format nic,ip no-show-headers"),
        );
        assert_eq!(shown.stdout, "eth0.0 10.0.0.1/30");
    }

    #[test]
    fn test_vrouter_attribute_query() {
        let mut state = state();
        dispatch(&mut state, "s1", &argv("fabric-create name f1"));
        dispatch(&mut state, "s1", &argv("vrouter-create name s1-vrouter vnet f1-global router-type hardware hw-vrrp-id 18 enable"));
        let out = dispatch(&mut state, "s1", &argv("vrouter-show name s1-vrouter format bgp-as no-show-headers"));
        assert_eq!(out.stdout, "s1-vrouter");
        dispatch(&mut state, "s1", &argv("vrouter-modify name s1-vrouter bgp-as 65000"));
        let out = dispatch(&mut state, "s1", &argv("vrouter-show name s1-vrouter format bgp-as no-show-headers"));
        assert_eq!(out.stdout, "s1-vrouter 65000");
        let out = dispatch(&mut state, "s1", &argv("vrouter-show name s1-vrouter format hw-vrrp-id no-show-headers"));
        assert_eq!(out.stdout, "s1-vrouter 18");
    }
}
