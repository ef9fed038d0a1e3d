//! Validated provisioning plan.
//!
//! A [`FabricPlan`] is the configuration plus the decoded CSV inputs and the
//! role inventory. Building it is the last step that may reject inputs; after
//! that every failure comes from a switch.

use std::fs::File;
use std::path::Path;
use tracing::{info, warn};

use crate::config::ZtpConfig;
use crate::error::{ZtpError, ZtpResult};
use crate::inputs::{self, BgpRow, Decoded, OspfRow, VrrpRow, VxlanRow};
use crate::types::{FabricMode, Inventory, Switch};

/// Everything a run needs, validated.
#[derive(Debug, Clone)]
pub struct FabricPlan {
    pub config: ZtpConfig,
    pub inventory: Inventory,
    pub bgp_rows: Vec<BgpRow>,
    pub vrrp_rows: Vec<VrrpRow>,
    pub vxlan_rows: Vec<VxlanRow>,
    pub ospf_rows: Vec<OspfRow>,
}

fn load<T>(
    config: &ZtpConfig,
    path: Option<&Path>,
    decode: impl FnOnce(File) -> Decoded<T>,
) -> ZtpResult<Vec<T>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let resolved = config.resolve_input(path);
    let file = File::open(&resolved).map_err(|source| ZtpError::Io {
        path: resolved.clone(),
        source,
    })?;
    let decoded = decode(file);
    let source_name = resolved.display().to_string();
    for extra in decoded.errors.iter().skip(1) {
        warn!("{} line {}: {}", source_name, extra.line, extra.message);
    }
    match decoded.errors.into_iter().next() {
        Some(first) => Err(ZtpError::input_invalid(source_name, first.line, first.message)),
        None => {
            info!("Loaded {} rows from {}", decoded.rows.len(), source_name);
            Ok(decoded.rows)
        }
    }
}

impl FabricPlan {
    /// Builds the inventory and decodes every configured input.
    pub fn from_config(config: ZtpConfig) -> ZtpResult<Self> {
        let inventory = Inventory::new(&config.spine_list, &config.leaf_list)?;
        if let Some(switch) = &config.inputs.ospf_switch {
            if !inventory.contains(switch) {
                return Err(ZtpError::UnknownSwitch {
                    name: switch.clone(),
                });
            }
        }
        let files = config.inputs.clone();
        let bgp_rows = load(&config, files.bgp_csv.as_deref(), |f| {
            inputs::decode_bgp(f, &inventory)
        })?;
        let vrrp_rows = load(&config, files.vrrp_csv.as_deref(), |f| {
            inputs::decode_vrrp(f, config.mode, &inventory)
        })?;
        let vxlan_rows = load(&config, files.vxlan_csv.as_deref(), |f| {
            inputs::decode_vxlan(f, &inventory)
        })?;
        let ospf_rows = load(&config, files.ospf_csv.as_deref(), inputs::decode_ospf)?;
        let plan = Self {
            config,
            inventory,
            bgp_rows,
            vrrp_rows,
            vxlan_rows,
            ospf_rows,
        };
        plan.check_tunnel_endpoints()?;
        Ok(plan)
    }

    /// Switches that terminate VXLAN tunnels: managed VXLAN switches, when
    /// at least two of them and one is a spine.
    pub fn tunnel_switches(&self) -> Vec<&str> {
        let mut switches: Vec<&str> = Vec::new();
        for row in self.vxlan_rows.iter().filter(|r| self.is_managed(&r.switch)) {
            if !switches.contains(&row.switch.as_str()) {
                switches.push(&row.switch);
            }
        }
        if switches.len() < 2 || !switches.iter().any(|s| self.inventory.is_spine(s)) {
            return Vec::new();
        }
        switches
    }

    /// Tunnels start on vRouters; an L2 fabric only gets them from VRRP input.
    fn check_tunnel_endpoints(&self) -> ZtpResult<()> {
        if self.config.mode == FabricMode::L2
            && self.vrrp_rows.is_empty()
            && !self.tunnel_switches().is_empty()
        {
            return Err(ZtpError::invalid_config(
                "inputs.vxlan_csv",
                "VXLAN tunnels in an L2 fabric need vRouters from inputs.vrrp_csv",
            ));
        }
        Ok(())
    }

    /// Switches provisioning configures; third-party spines are left alone.
    pub fn managed_switches(&self) -> Vec<&Switch> {
        self.inventory
            .all()
            .filter(|s| self.is_managed(&s.name))
            .collect()
    }

    pub fn managed_names(&self) -> Vec<String> {
        self.managed_switches()
            .into_iter()
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn is_managed(&self, name: &str) -> bool {
        self.inventory.contains(name)
            && !(self.config.third_party_spines && self.inventory.is_spine(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const BASE: &str = r#"
        fabric_name = "f1"
        spine_list = ["spine1", "spine2"]
        leaf_list = ["leaf1", "leaf2"]
    "#;

    #[test]
    fn test_third_party_spines_are_unmanaged() {
        let toml = format!("{}\nthird_party_spines = true\n", BASE);
        let plan = FabricPlan::from_config(ZtpConfig::from_toml_str(&toml, None).unwrap()).unwrap();
        assert_eq!(plan.managed_names(), vec!["leaf1".to_string(), "leaf2".to_string()]);
        assert!(!plan.is_managed("spine1"));
    }

    #[test]
    fn test_first_row_error_is_input_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = File::create(dir.path().join("vrrp.csv")).unwrap();
        writeln!(file, "10.0.1.0/24, 100, spine1").unwrap();
        writeln!(file, "10.0.2.0/24, 1, spine1").unwrap();
        writeln!(file, "10.0.3.0/24, 102, spine9").unwrap();

        let toml = format!("{}\n[inputs]\nvrrp_csv = \"vrrp.csv\"\n", BASE);
        let config = ZtpConfig::from_toml_str(&toml, Some(dir.path())).unwrap();
        let err = FabricPlan::from_config(config).unwrap_err();
        match err {
            ZtpError::InputInvalid { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("VLAN"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_l2_tunnels_need_vrrp_input() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vxlan.csv"), "100, spine1, 10000, 47\n100, leaf1, 10000, 47\n").unwrap();
        let toml = format!("{}\n[inputs]\nvxlan_csv = \"vxlan.csv\"\n", BASE);
        let config = ZtpConfig::from_toml_str(&toml, Some(dir.path())).unwrap();
        let err = FabricPlan::from_config(config).unwrap_err();
        assert!(err.to_string().contains("inputs.vxlan_csv"));

        let toml = format!("mode = \"l3\"\n{}\n[inputs]\nvxlan_csv = \"vxlan.csv\"\n", BASE);
        let config = ZtpConfig::from_toml_str(&toml, Some(dir.path())).unwrap();
        let plan = FabricPlan::from_config(config).unwrap();
        assert_eq!(plan.tunnel_switches(), vec!["spine1", "leaf1"]);
    }

    #[test]
    fn test_loads_rows_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vxlan.csv"), "100, leaf1, 10000, 47\n").unwrap();
        let toml = format!("{}\n[inputs]\nvxlan_csv = \"vxlan.csv\"\n", BASE);
        let config = ZtpConfig::from_toml_str(&toml, Some(dir.path())).unwrap();
        let plan = FabricPlan::from_config(config).unwrap();
        assert_eq!(plan.vxlan_rows.len(), 1);
        assert_eq!(plan.vxlan_rows[0].vxlan, 10000);
    }
}
