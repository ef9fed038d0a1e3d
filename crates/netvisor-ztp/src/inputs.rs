//! Typed decoders for the CSV inputs.
//!
//! Files carry no header row; `#` starts a comment line. Each decoder returns
//! every valid row together with every row error so that operators can fix a
//! file in one pass. Nothing reaches a switch unless `errors` is empty.

use csv::{ReaderBuilder, StringRecord, Trim};
use ipnet::IpNet;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::net::IpAddr;

use netvisor_types::{PortId, VlanId};

use crate::types::{ClusterPair, FabricMode, Inventory};

/// Largest AS number accepted in inputs.
pub const MAX_AS: u32 = 42_949_672;

/// Largest VXLAN network identifier (24 bits).
pub const MAX_VXLAN: u32 = 0x00ff_ffff;

/// One rejected row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub line: u64,
    pub message: String,
}

/// Decoder result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded<T> {
    pub rows: Vec<T>,
    pub errors: Vec<RowError>,
}

impl<T> Default for Decoded<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl<T> Decoded<T> {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Manually specified eBGP link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgpRow {
    pub switch: String,
    pub local_port: PortId,
    pub interface_ip: IpNet,
    pub bgp_as: u32,
    pub remote_ip: IpAddr,
    pub remote_as: u32,
}

/// Row of the VRRP input; the form follows the fabric mode and field count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VrrpRow {
    /// `vrrp_ip/cidr, vlan_id, active_switch` on the spine cluster.
    L2 {
        vip: IpNet,
        vlan: VlanId,
        active_switch: String,
    },
    /// `vlan_id, gateway_ip, primary_ip, secondary_ip, active_switch`.
    Cluster {
        vlan: VlanId,
        gateway: IpNet,
        primary: IpNet,
        secondary: IpNet,
        active_switch: String,
    },
    /// `vlan_id, vrrp_ip/cidr, leaf`: plain gateway on a standalone leaf.
    L3Single {
        vlan: VlanId,
        gateway: IpNet,
        leaf: String,
    },
    /// `vlan_id, vrrp_ip/cidr, leaf1, leaf2, vrrp_id, active_switch`.
    L3Pair {
        vlan: VlanId,
        vip: IpNet,
        pair: ClusterPair,
        vrrp_id: u16,
        active_switch: String,
    },
}

/// `vlan_id, switch_name, vxlan_id, loopback_port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VxlanRow {
    pub vlan: VlanId,
    pub switch: String,
    pub vxlan: u32,
    pub loopback_port: PortId,
}

/// `l3_port, interface_ip, ospf_network, area_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OspfRow {
    pub l3_port: PortId,
    pub interface_ip: IpNet,
    pub network: IpNet,
    pub area: u32,
}

fn records(reader: impl Read) -> impl Iterator<Item = (u64, Result<StringRecord, String>)> {
    ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader)
        .into_records()
        .map(|result| match result {
            Ok(record) => {
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                (line, Ok(record))
            }
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or_default();
                (line, Err(e.to_string()))
            }
        })
}

fn fields(record: &StringRecord) -> Vec<&str> {
    record.iter().collect()
}

fn expect_fields(fields: &[&str], allowed: &[usize]) -> Result<(), String> {
    if allowed.contains(&fields.len()) {
        return Ok(());
    }
    let wanted: Vec<String> = allowed.iter().map(usize::to_string).collect();
    Err(format!(
        "expected {} fields, found {}",
        wanted.join(" or "),
        fields.len()
    ))
}

fn vlan(value: &str) -> Result<VlanId, String> {
    value
        .parse()
        .map_err(|_| format!("invalid VLAN id '{}'", value))
}

fn port(value: &str) -> Result<PortId, String> {
    let port: PortId = value
        .parse()
        .map_err(|_| format!("invalid port '{}'", value))?;
    if !port.in_input_range() {
        return Err(format!("port {} out of range [1, {}]", port, PortId::MAX_INPUT));
    }
    Ok(port)
}

fn cidr(value: &str) -> Result<IpNet, String> {
    value
        .parse()
        .map_err(|_| format!("invalid address/prefix '{}'", value))
}

/// Host address, inheriting `prefix` when no prefix is given.
fn host_in(value: &str, prefix: u8) -> Result<IpNet, String> {
    if value.contains('/') {
        return cidr(value);
    }
    let ip: IpAddr = value
        .parse()
        .map_err(|_| format!("invalid address '{}'", value))?;
    IpNet::new(ip, prefix).map_err(|e| e.to_string())
}

fn ip(value: &str) -> Result<IpAddr, String> {
    value
        .parse()
        .map_err(|_| format!("invalid address '{}'", value))
}

fn as_number(value: &str) -> Result<u32, String> {
    match value.parse::<u32>() {
        Ok(n) if (1..=MAX_AS).contains(&n) => Ok(n),
        _ => Err(format!("AS '{}' out of range [1, {}]", value, MAX_AS)),
    }
}

fn switch(value: &str, inventory: &Inventory) -> Result<String, String> {
    if inventory.contains(value) {
        Ok(value.to_string())
    } else {
        Err(format!("unknown switch '{}'", value))
    }
}

fn decode<T>(
    reader: impl Read,
    mut row: impl FnMut(&[&str]) -> Result<T, String>,
) -> Decoded<T> {
    let mut decoded = Decoded::default();
    for (line, record) in records(reader) {
        let result = record.and_then(|r| row(&fields(&r)));
        match result {
            Ok(value) => decoded.rows.push(value),
            Err(message) => decoded.errors.push(RowError { line, message }),
        }
    }
    decoded
}

/// Decodes `switch, local_port, interface_ip/cidr, bgp_as, remote_ip, remote_as`.
pub fn decode_bgp(reader: impl Read, inventory: &Inventory) -> Decoded<BgpRow> {
    let mut interface_ips = BTreeSet::new();
    let mut remote_ips = BTreeSet::new();
    decode(reader, |f| {
        expect_fields(f, &[6])?;
        let row = BgpRow {
            switch: switch(f[0], inventory)?,
            local_port: port(f[1])?,
            interface_ip: cidr(f[2])?,
            bgp_as: as_number(f[3])?,
            remote_ip: ip(f[4])?,
            remote_as: as_number(f[5])?,
        };
        let addr = row.interface_ip.addr();
        if !interface_ips.insert(addr) {
            return Err(format!("duplicate interface ip {}", addr));
        }
        if !remote_ips.insert(row.remote_ip) {
            return Err(format!("duplicate remote ip {}", row.remote_ip));
        }
        Ok(row)
    })
}

/// Decodes the VRRP input for `mode`.
pub fn decode_vrrp(reader: impl Read, mode: FabricMode, inventory: &Inventory) -> Decoded<VrrpRow> {
    let mut cluster_ids: BTreeMap<ClusterPair, u16> = BTreeMap::new();
    decode(reader, |f| {
        let allowed: &[usize] = match mode {
            FabricMode::L2 => &[3, 5],
            FabricMode::L3 => &[3, 5, 6],
        };
        expect_fields(f, allowed)?;
        match (mode, f.len()) {
            (FabricMode::L2, 3) => Ok(VrrpRow::L2 {
                vip: cidr(f[0])?,
                vlan: vlan(f[1])?,
                active_switch: switch(f[2], inventory)?,
            }),
            (_, 5) => {
                let gateway = cidr(f[1])?;
                Ok(VrrpRow::Cluster {
                    vlan: vlan(f[0])?,
                    gateway,
                    primary: host_in(f[2], gateway.prefix_len())?,
                    secondary: host_in(f[3], gateway.prefix_len())?,
                    active_switch: switch(f[4], inventory)?,
                })
            }
            (_, 3) => Ok(VrrpRow::L3Single {
                vlan: vlan(f[0])?,
                gateway: cidr(f[1])?,
                leaf: switch(f[2], inventory)?,
            }),
            _ => {
                let pair = ClusterPair::new(switch(f[2], inventory)?, switch(f[3], inventory)?);
                let vrrp_id: u16 = f[4]
                    .parse()
                    .map_err(|_| format!("invalid vrrp id '{}'", f[4]))?;
                let active_switch = switch(f[5], inventory)?;
                if !pair.contains(&active_switch) {
                    return Err(format!(
                        "active switch {} is not {} or {}",
                        active_switch, pair.first, pair.second
                    ));
                }
                match cluster_ids.get(&pair) {
                    Some(id) if *id != vrrp_id => {
                        return Err(format!(
                            "vrrp id {} conflicts with {} used for {} and {}",
                            vrrp_id, id, pair.first, pair.second
                        ));
                    }
                    _ => {
                        cluster_ids.insert(pair.clone(), vrrp_id);
                    }
                }
                Ok(VrrpRow::L3Pair {
                    vlan: vlan(f[0])?,
                    vip: cidr(f[1])?,
                    pair,
                    vrrp_id,
                    active_switch,
                })
            }
        }
    })
}

/// Decodes `vlan_id, switch_name, vxlan_id, loopback_port`.
pub fn decode_vxlan(reader: impl Read, inventory: &Inventory) -> Decoded<VxlanRow> {
    decode(reader, |f| {
        expect_fields(f, &[4])?;
        let vxlan = match f[2].parse::<u32>() {
            Ok(v) if (1..=MAX_VXLAN).contains(&v) => v,
            _ => return Err(format!("vxlan id '{}' out of range [1, {}]", f[2], MAX_VXLAN)),
        };
        Ok(VxlanRow {
            vlan: vlan(f[0])?,
            switch: switch(f[1], inventory)?,
            vxlan,
            loopback_port: port(f[3])?,
        })
    })
}

/// Decodes `l3_port, interface_ip, ospf_network, area_id`.
pub fn decode_ospf(reader: impl Read) -> Decoded<OspfRow> {
    let mut interface_ips = BTreeSet::new();
    decode(reader, |f| {
        expect_fields(f, &[4])?;
        let row = OspfRow {
            l3_port: port(f[0])?,
            interface_ip: cidr(f[1])?,
            network: cidr(f[2])?.trunc(),
            area: f[3]
                .parse()
                .map_err(|_| format!("invalid area '{}'", f[3]))?,
        };
        let addr = row.interface_ip.addr();
        if !interface_ips.insert(addr) {
            return Err(format!("duplicate interface ip {}", addr));
        }
        Ok(row)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn inventory() -> Inventory {
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Inventory::new(&names(&["spine1", "spine2"]), &names(&["leaf1", "leaf2", "leaf3"])).unwrap()
    }

    #[test]
    fn test_bgp_rows_and_errors() {
        let input = "\
leaf1, 49, 192.168.1.1/30, 65001, 192.168.1.2, 65100
leaf2, 49, 192.168.1.1/30, 65002, 192.168.1.6, 65100
leaf3, 105, 192.168.1.9/30, 65003, 192.168.1.10, 65100
leaf9, 49, 192.168.1.13/30, 65003, 192.168.1.14, 65100
leaf1, 50, 192.168.1.17/30, 0, 192.168.1.18, 65100
leaf1, 51, 192.168.1.21/30
";
        let decoded = decode_bgp(input.as_bytes(), &inventory());
        assert_eq!(decoded.rows.len(), 1);
        assert_eq!(decoded.rows[0].local_port, PortId::new(49).unwrap());
        let lines: Vec<u64> = decoded.errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![2, 3, 4, 5, 6]);
        assert!(decoded.errors[0].message.contains("duplicate interface ip"));
        assert!(decoded.errors[1].message.contains("out of range"));
        assert!(decoded.errors[2].message.contains("unknown switch"));
        assert!(decoded.errors[4].message.contains("expected 6 fields"));
    }

    #[test]
    fn test_vrrp_forms_follow_mode() {
        let l2 = decode_vrrp("10.0.1.0/24, 100, spine1\n".as_bytes(), FabricMode::L2, &inventory());
        assert!(l2.is_valid());
        assert!(matches!(&l2.rows[0], VrrpRow::L2 { active_switch, .. } if active_switch == "spine1"));

        let l3 = decode_vrrp(
            "101, 10.0.2.1/24, leaf3\n102, 10.0.3.1/24, leaf2, leaf1, 18, leaf1\n".as_bytes(),
            FabricMode::L3,
            &inventory(),
        );
        assert!(l3.is_valid());
        assert!(matches!(&l3.rows[0], VrrpRow::L3Single { leaf, .. } if leaf == "leaf3"));
        match &l3.rows[1] {
            VrrpRow::L3Pair { pair, vrrp_id, .. } => {
                assert_eq!(*pair, ClusterPair::new("leaf1", "leaf2"));
                assert_eq!(*vrrp_id, 18);
            }
            other => panic!("unexpected row {:?}", other),
        }

        let six_in_l2 = decode_vrrp(
            "102, 10.0.3.1/24, leaf2, leaf1, 18, leaf1\n".as_bytes(),
            FabricMode::L2,
            &inventory(),
        );
        assert!(!six_in_l2.is_valid());
    }

    #[test]
    fn test_vrrp_id_consistent_per_cluster() {
        let input = "\
102, 10.0.3.1/24, leaf1, leaf2, 18, leaf1
103, 10.0.4.1/24, leaf2, leaf1, 19, leaf2
104, 10.0.5.1/24, leaf1, leaf2, 18, leaf3
";
        let decoded = decode_vrrp(input.as_bytes(), FabricMode::L3, &inventory());
        assert_eq!(decoded.rows.len(), 1);
        assert_eq!(decoded.errors[0].line, 2);
        assert!(decoded.errors[0].message.contains("conflicts"));
        assert!(decoded.errors[1].message.contains("active switch"));
    }

    #[test]
    fn test_cluster_row_inherits_prefix() {
        let decoded = decode_vrrp(
            "100, 10.0.1.1/24, 10.0.1.2, 10.0.1.3, leaf1\n".as_bytes(),
            FabricMode::L3,
            &inventory(),
        );
        match &decoded.rows[0] {
            VrrpRow::Cluster { primary, secondary, .. } => {
                assert_eq!(primary.to_string(), "10.0.1.2/24");
                assert_eq!(secondary.to_string(), "10.0.1.3/24");
            }
            other => panic!("unexpected row {:?}", other),
        }
    }

    #[test]
    fn test_vxlan_and_ospf() {
        let vxlan = decode_vxlan(
            "100, leaf1, 10000, 47\n4095, leaf1, 10001, 47\n101, leaf2, 16777216, 47\n".as_bytes(),
            &inventory(),
        );
        assert_eq!(vxlan.rows.len(), 1);
        assert_eq!(vxlan.errors.len(), 2);

        let ospf = decode_ospf("49, 10.1.1.1/30, 10.1.1.0/30, 0\n50, 10.1.1.1/30, 10.1.1.4/30, 0\n".as_bytes());
        assert_eq!(ospf.rows[0].network.to_string(), "10.1.1.0/30");
        assert_eq!(ospf.errors.len(), 1);
    }
}
