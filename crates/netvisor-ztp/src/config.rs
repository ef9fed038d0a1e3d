//! Configuration file support for provisioning runs
//!
//! A run is described by one TOML file. Every key has a default except the
//! fabric name and the switch lists. CSV input paths are resolved relative
//! to the directory holding the configuration file.

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use netvisor_cli_common::Credentials;
use netvisor_types::{NetworkType, VlanId};

use crate::address;
use crate::error::{ZtpError, ZtpResult};
use crate::inputs::MAX_AS;
use crate::types::{FabricMode, Redistribute, RoutingProtocol};

/// How CLI invocations reach the switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Run `/usr/bin/cli` on this host.
    #[default]
    Local,
    /// Run `/usr/bin/cli` on each switch over ssh.
    Ssh,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(TransportKind::Local),
            "ssh" => Ok(TransportKind::Ssh),
            other => Err(format!("unknown transport '{}' (expected local or ssh)", other)),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Local => f.write_str("local"),
            TransportKind::Ssh => f.write_str("ssh"),
        }
    }
}

/// Transport configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,

    /// Remote login for ssh; the local user when unset
    #[serde(default)]
    pub ssh_user: Option<String>,

    /// Extra ssh options, passed through verbatim
    #[serde(default)]
    pub ssh_options: Vec<String>,
}

/// CSV inputs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputFiles {
    #[serde(default)]
    pub bgp_csv: Option<PathBuf>,

    #[serde(default)]
    pub vrrp_csv: Option<PathBuf>,

    #[serde(default)]
    pub vxlan_csv: Option<PathBuf>,

    #[serde(default)]
    pub ospf_csv: Option<PathBuf>,

    /// Switch the OSPF CSV rows apply to
    #[serde(default)]
    pub ospf_switch: Option<String>,
}

/// Complete provisioning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZtpConfig {
    /// Fabric to create or join
    pub fabric_name: String,

    #[serde(default)]
    pub fabric_network: NetworkType,

    #[serde(default)]
    pub control_network: NetworkType,

    #[serde(default)]
    pub spine_list: Vec<String>,

    #[serde(default)]
    pub leaf_list: Vec<String>,

    /// Spines are not Netvisor switches and are left untouched
    #[serde(default)]
    pub third_party_spines: bool,

    #[serde(default)]
    pub mode: FabricMode,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_inband_ip")]
    pub inband_ip: Ipv4Net,

    /// Base of the L3 link block
    #[serde(default = "default_net_address")]
    pub net_address: IpAddr,

    #[serde(default = "default_cidr")]
    pub cidr: u8,

    /// Point-to-point subnet size for links
    #[serde(default = "default_supernet")]
    pub supernet: u8,

    #[serde(default = "default_loopback_ip")]
    pub loopback_ip: Ipv4Net,

    #[serde(default = "default_bgp_as_range")]
    pub bgp_as_range: u32,

    #[serde(default)]
    pub bgp_redistribute: Redistribute,

    #[serde(default = "default_bgp_max_paths")]
    pub bgp_max_paths: u32,

    #[serde(default)]
    pub bfd: bool,

    #[serde(default = "default_bfd_min_rx")]
    pub bfd_min_rx: u32,

    #[serde(default = "default_bfd_multiplier")]
    pub bfd_multiplier: u32,

    #[serde(default = "default_overlay_range")]
    pub ibgp_ip_range: Ipv4Net,

    #[serde(default = "default_overlay_vlan")]
    pub ibgp_vlan: VlanId,

    #[serde(default = "default_overlay_range")]
    pub iospf_ip_range: Ipv4Net,

    #[serde(default = "default_overlay_vlan")]
    pub iospf_vlan: VlanId,

    #[serde(default)]
    pub ospf_area_id: u32,

    /// Hardware VRRP id shared by vRouter pairs
    #[serde(default = "default_vrrp_id")]
    pub vrrp_id: u16,

    #[serde(default)]
    pub routing_protocol: RoutingProtocol,

    /// Split unused 40g ports into 4x10g
    #[serde(default = "default_true")]
    pub toggle_40g: bool,

    /// Re-enable STP after port changes
    #[serde(default)]
    pub stp: bool,

    #[serde(default)]
    pub static_setup: bool,

    #[serde(default)]
    pub mgmt_ip: Option<String>,

    #[serde(default)]
    pub gateway_ip: Option<String>,

    #[serde(default)]
    pub dns_ip: Option<String>,

    #[serde(default)]
    pub dns_secondary_ip: Option<String>,

    #[serde(default)]
    pub domain_name: Option<String>,

    #[serde(default)]
    pub ntp_server: Option<String>,

    /// Move the fabric network to in-band after L2 provisioning
    #[serde(default)]
    pub update_fabric_to_inband: bool,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Delay after a 40g split batch while nvOSd restarts
    #[serde(default = "default_split_settle")]
    pub split_settle_secs: u64,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub inputs: InputFiles,

    /// Directory relative input paths are resolved against
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

// Default functions
fn default_inband_ip() -> Ipv4Net {
    Ipv4Net::new(Ipv4Addr::new(172, 16, 0, 0), 24).expect("Invalid default prefix")
}

fn default_net_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, 0))
}

fn default_cidr() -> u8 {
    24
}

fn default_supernet() -> u8 {
    30
}

fn default_loopback_ip() -> Ipv4Net {
    Ipv4Net::new(Ipv4Addr::new(109, 109, 109, 0), 24).expect("Invalid default prefix")
}

fn default_bgp_as_range() -> u32 {
    65000
}

fn default_bgp_max_paths() -> u32 {
    16
}

fn default_bfd_min_rx() -> u32 {
    200
}

fn default_bfd_multiplier() -> u32 {
    3
}

fn default_overlay_range() -> Ipv4Net {
    Ipv4Net::new(Ipv4Addr::new(75, 75, 75, 0), 24).expect("Invalid default prefix")
}

fn default_overlay_vlan() -> VlanId {
    VlanId::new(4040).expect("Invalid default VLAN")
}

fn default_vrrp_id() -> u16 {
    18
}

fn default_true() -> bool {
    true
}

fn default_command_timeout() -> u64 {
    120
}

fn default_split_settle() -> u64 {
    10
}

impl ZtpConfig {
    /// Loads and validates configuration from `path`.
    pub fn from_file(path: impl AsRef<Path>) -> ZtpResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ZtpError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: ZtpConfig = toml::from_str(&content).map_err(|source| ZtpError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration text; relative inputs resolve against `base_dir`.
    pub fn from_toml_str(content: &str, base_dir: Option<&Path>) -> ZtpResult<Self> {
        let mut config: ZtpConfig = toml::from_str(content).map_err(|source| ZtpError::Toml {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.base_dir = base_dir.map(Path::to_path_buf);
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> ZtpResult<()> {
        if self.fabric_name.trim().is_empty() {
            return Err(ZtpError::invalid_config("fabric_name", "must not be empty"));
        }
        if address::usable_hosts(self.supernet).is_none() {
            return Err(ZtpError::invalid_config(
                "supernet",
                format!("{} is not one of 27, 28, 29, 30", self.supernet),
            ));
        }
        let link_prefix = self.link_prefix();
        if self.cidr > link_prefix {
            return Err(ZtpError::invalid_config(
                "cidr",
                format!("/{} cannot hold /{} links", self.cidr, link_prefix),
            ));
        }
        // Every leaf may form its own group, each one AS and one area above
        // the base.
        let groups = self.leaf_list.len() as u32;
        if !(1..=MAX_AS).contains(&self.bgp_as_range) {
            return Err(ZtpError::invalid_config(
                "bgp_as_range",
                format!("{} out of range [1, {}]", self.bgp_as_range, MAX_AS),
            ));
        }
        if self.bgp_as_range.saturating_add(groups) > MAX_AS {
            return Err(ZtpError::invalid_config(
                "bgp_as_range",
                format!("{} leaves no room for {} leaf AS numbers", self.bgp_as_range, groups),
            ));
        }
        if self.ospf_area_id.checked_add(groups).is_none() {
            return Err(ZtpError::invalid_config(
                "ospf_area_id",
                format!("{} leaves no room for {} leaf areas", self.ospf_area_id, groups),
            ));
        }
        if self.third_party_spines && self.spine_list.is_empty() {
            return Err(ZtpError::invalid_config(
                "third_party_spines",
                "set without any spines",
            ));
        }
        if self.inputs.ospf_csv.is_some() && self.inputs.ospf_switch.is_none() {
            return Err(ZtpError::invalid_config(
                "inputs.ospf_switch",
                "required when inputs.ospf_csv is set",
            ));
        }
        if self.command_timeout_secs == 0 {
            return Err(ZtpError::invalid_config(
                "command_timeout_secs",
                "must be > 0",
            ));
        }
        Ok(())
    }

    /// Prefix length of one link subnet; IPv6 blocks keep the IPv4 host bits.
    pub fn link_prefix(&self) -> u8 {
        address::link_prefix(self.supernet, self.net_address.is_ipv6())
    }

    pub fn credentials(&self) -> Option<Credentials> {
        Credentials::from_parts(self.username.clone(), self.password.clone())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn split_settle(&self) -> Duration {
        Duration::from_secs(self.split_settle_secs)
    }

    /// Resolves an input path against the configuration directory.
    pub fn resolve_input(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// `switch-setup-modify` fields for static setup, in CLI order.
    pub fn static_setup_fields(&self) -> Vec<(&'static str, String)> {
        [
            ("mgmt-ip", &self.mgmt_ip),
            ("gateway-ip", &self.gateway_ip),
            ("dns-ip", &self.dns_ip),
            ("dns-secondary-ip", &self.dns_secondary_ip),
            ("domain-name", &self.domain_name),
            ("ntp-server", &self.ntp_server),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| (key, v.clone())))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MINIMAL: &str = r#"
        fabric_name = "f1"
        spine_list = ["spine1", "spine2"]
        leaf_list = ["leaf1", "leaf2"]
    "#;

    #[test]
    fn test_defaults() {
        let config = ZtpConfig::from_toml_str(MINIMAL, None).unwrap();
        assert_eq!(config.fabric_network, NetworkType::Mgmt);
        assert_eq!(config.mode, FabricMode::L2);
        assert_eq!(config.inband_ip.to_string(), "172.16.0.0/24");
        assert_eq!(config.net_address.to_string(), "10.0.0.0");
        assert_eq!(config.cidr, 24);
        assert_eq!(config.supernet, 30);
        assert_eq!(config.loopback_ip.to_string(), "109.109.109.0/24");
        assert_eq!(config.bgp_as_range, 65000);
        assert_eq!(config.bgp_redistribute, Redistribute::Connected);
        assert_eq!(config.bgp_max_paths, 16);
        assert_eq!(config.ibgp_vlan.as_u16(), 4040);
        assert_eq!(config.ibgp_ip_range.to_string(), "75.75.75.0/24");
        assert_eq!(config.vrrp_id, 18);
        assert_eq!(config.routing_protocol, RoutingProtocol::Ebgp);
        assert!(config.toggle_40g);
        assert!(!config.stp);
        assert_eq!(config.command_timeout(), Duration::from_secs(120));
        assert_eq!(config.split_settle(), Duration::from_secs(10));
        assert_eq!(config.transport.kind, TransportKind::Local);
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_full_l3_config() {
        let config = ZtpConfig::from_toml_str(
            r#"
            fabric_name = "f1"
            fabric_network = "in-band"
            control_network = "in-band"
            spine_list = ["spine1"]
            leaf_list = ["leaf1"]
            mode = "l3"
            routing_protocol = "ospf"
            bgp_redistribute = "static"
            username = "network-admin"
            password = "pw"
            net_address = "2001:db8::"
            cidr = 112
            supernet = 30
            ibgp_vlan = 4000

            [transport]
            kind = "ssh"
            ssh_user = "admin"
            ssh_options = ["-o", "StrictHostKeyChecking=no"]
            "#,
            None,
        )
        .unwrap();
        assert_eq!(config.control_network, NetworkType::InBand);
        assert_eq!(config.routing_protocol, RoutingProtocol::Ospf);
        assert_eq!(config.bgp_redistribute.as_str(), "static");
        assert!(config.net_address.is_ipv6());
        assert_eq!(config.ibgp_vlan.as_u16(), 4000);
        assert_eq!(config.transport.kind, TransportKind::Ssh);
        assert_eq!(config.transport.ssh_options.len(), 2);
        assert!(config.credentials().is_some());
    }

    #[test]
    fn test_rejects_reserved_overlay_vlan() {
        let text = format!("{}\nibgp_vlan = 4094\n", MINIMAL);
        assert!(ZtpConfig::from_toml_str(&text, None).is_err());
    }

    #[test]
    fn test_validate_supernet_and_cidr() {
        let text = format!("{}\nsupernet = 31\n", MINIMAL);
        let err = ZtpConfig::from_toml_str(&text, None).unwrap_err();
        assert!(err.to_string().contains("supernet"));

        let text = format!("{}\ncidr = 29\nsupernet = 28\n", MINIMAL);
        let err = ZtpConfig::from_toml_str(&text, None).unwrap_err();
        assert!(err.to_string().contains("cidr"));
    }

    #[test]
    fn test_validate_as_base_and_area_room() {
        let text = format!("{}\nbgp_as_range = 0\n", MINIMAL);
        let err = ZtpConfig::from_toml_str(&text, None).unwrap_err();
        assert!(err.to_string().contains("bgp_as_range"));

        let text = format!("{}\nbgp_as_range = 4294967295\n", MINIMAL);
        assert!(ZtpConfig::from_toml_str(&text, None).is_err());

        // Two leaves need two AS numbers above the base.
        let text = format!("{}\nbgp_as_range = 42949671\n", MINIMAL);
        let err = ZtpConfig::from_toml_str(&text, None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InputInvalid);
        let text = format!("{}\nbgp_as_range = 42949670\n", MINIMAL);
        assert!(ZtpConfig::from_toml_str(&text, None).is_ok());

        let text = format!("{}\nospf_area_id = 4294967294\n", MINIMAL);
        let err = ZtpConfig::from_toml_str(&text, None).unwrap_err();
        assert!(err.to_string().contains("ospf_area_id"));
    }

    #[test]
    fn test_ospf_csv_requires_switch() {
        let text = format!("{}\n[inputs]\nospf_csv = \"ospf.csv\"\n", MINIMAL);
        assert!(ZtpConfig::from_toml_str(&text, None).is_err());
    }

    #[test]
    fn test_resolve_input_and_static_fields() {
        let text = format!(
            "{}\nstatic_setup = true\ndns_ip = \"8.8.8.8\"\nntp_server = \"pool.ntp.org\"\n",
            MINIMAL
        );
        let config = ZtpConfig::from_toml_str(&text, Some(Path::new("/etc/ztp"))).unwrap();
        assert_eq!(
            config.resolve_input(Path::new("vrrp.csv")),
            PathBuf::from("/etc/ztp/vrrp.csv")
        );
        assert_eq!(
            config.resolve_input(Path::new("/tmp/vrrp.csv")),
            PathBuf::from("/tmp/vrrp.csv")
        );
        assert_eq!(
            config.static_setup_fields(),
            vec![
                ("dns-ip", "8.8.8.8".to_string()),
                ("ntp-server", "pool.ntp.org".to_string())
            ]
        );
    }

    #[test]
    fn test_transport_kind_from_str() {
        assert_eq!("SSH".parse::<TransportKind>().unwrap(), TransportKind::Ssh);
        assert!("telnet".parse::<TransportKind>().is_err());
    }
}
