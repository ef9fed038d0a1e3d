//! VRRP gateways from the VRRP input.

use ipnet::IpNet;
use tracing::{info, warn};

use netvisor_types::{VlanId, VlanScope};

use super::{vrouter_spec, OnSwitch, StepError, StepResult, Tally, Topology};
use crate::address::nth_host;
use crate::commands::Attachment;
use crate::error::ZtpError;
use crate::facts::FabricFacts;
use crate::inputs::VrrpRow;
use crate::naming::vrouter_name;
use crate::ops::{self, VlanSpec};
use crate::plan::FabricPlan;
use crate::types::{ClusterPair, FabricMode};

const ACTIVE_PRIORITY: u16 = 110;
const STANDBY_PRIORITY: u16 = 109;

/// Hardware VRRP id of the vRouter on `switch`.
///
/// Leaf pairs named in the VRRP input carry their own id; everything else
/// uses the configured one.
pub(super) fn hw_vrrp_id(plan: &FabricPlan, switch: &str) -> u16 {
    plan.vrrp_rows
        .iter()
        .find_map(|row| match row {
            VrrpRow::L3Pair { pair, vrrp_id, .. } if pair.contains(switch) => Some(*vrrp_id),
            _ => None,
        })
        .unwrap_or(plan.config.vrrp_id)
}

/// One redundant gateway on a cluster pair.
struct Gateway<'a> {
    pair: &'a ClusterPair,
    active: &'a str,
    vlan: VlanId,
    scope: VlanScope,
    vip: IpNet,
    active_ip: IpNet,
    standby_ip: IpNet,
}

/// `active` when it belongs to `pair`, else the pair's first member.
fn active_member<'a>(pair: &'a ClusterPair, active: &'a str) -> &'a str {
    if pair.contains(active) {
        return active;
    }
    warn!(
        "Active switch {} is not in cluster {}-{}; using {}",
        active, pair.first, pair.second, pair.first
    );
    &pair.first
}

async fn redundant(
    plan: &FabricPlan,
    facts: &mut FabricFacts,
    tally: &mut Tally,
    gateway: Gateway<'_>,
) -> StepResult<()> {
    let spec = VlanSpec::new(gateway.vlan, gateway.scope);
    let outcome = ops::ensure_vlan(facts, gateway.active, &spec)
        .await
        .on(gateway.active)?;
    tally.add(gateway.active, outcome, format!("VLAN {} ({})", gateway.vlan, gateway.scope));

    for member in gateway.pair.members() {
        if !plan.is_managed(member) {
            continue;
        }
        let spec = vrouter_spec(plan, member);
        let outcome = ops::ensure_vrouter(facts, member, &spec).await.on(member)?;
        tally.add(member, outcome, format!("vRouter {}", spec.name));

        let (ip, priority) = if member == gateway.active {
            (gateway.active_ip, ACTIVE_PRIORITY)
        } else {
            (gateway.standby_ip, STANDBY_PRIORITY)
        };
        let outcome = ops::ensure_vrrp_interface(
            facts,
            member,
            &spec.name,
            gateway.vlan,
            &ip,
            &gateway.vip,
            hw_vrrp_id(plan, member),
            priority,
        )
        .await
        .on(member)?;
        tally.add(
            member,
            outcome,
            format!("VRRP {} via {} priority {}", gateway.vip, ip, priority),
        );
    }
    info!(
        "VIP {} on vlan {} served by {} and {}",
        gateway.vip, gateway.vlan, gateway.pair.first, gateway.pair.second
    );
    Ok(())
}

/// `.1`, `.2` and `.3` of `net`: VIP, active and standby addresses.
fn triple(switch: &str, net: IpNet) -> StepResult<(IpNet, IpNet, IpNet)> {
    let host = |n| nth_host(net.trunc(), n).on(switch);
    Ok((host(1)?, host(2)?, host(3)?))
}

pub(super) async fn provision(
    plan: &FabricPlan,
    topology: &Topology,
    facts: &mut FabricFacts,
    tally: &mut Tally,
) -> StepResult<()> {
    for row in &plan.vrrp_rows {
        match row {
            VrrpRow::L2 {
                vip,
                vlan,
                active_switch,
            } => {
                let Some(pair) = topology.spines.pairs.first() else {
                    let message = format!("VRRP on vlan {} needs a spine cluster", vlan);
                    return Err(StepError::new(active_switch, ZtpError::topology(message)));
                };
                let active = active_member(pair, active_switch);
                let (vip, active_ip, standby_ip) = triple(active, *vip)?;
                let gateway = Gateway {
                    pair,
                    active,
                    vlan: *vlan,
                    scope: VlanScope::Fabric,
                    vip,
                    active_ip,
                    standby_ip,
                };
                redundant(plan, facts, tally, gateway).await?;
            }
            VrrpRow::Cluster {
                vlan,
                gateway,
                primary,
                secondary,
                active_switch,
            } => {
                let Some(pair) = topology.cluster_of(active_switch) else {
                    let message = format!("{} is not in a cluster", active_switch);
                    return Err(StepError::new(active_switch, ZtpError::topology(message)));
                };
                let scope = match plan.config.mode {
                    FabricMode::L3 => VlanScope::Cluster,
                    FabricMode::L2 => VlanScope::Fabric,
                };
                let gateway = Gateway {
                    pair,
                    active: active_switch,
                    vlan: *vlan,
                    scope,
                    vip: *gateway,
                    active_ip: *primary,
                    standby_ip: *secondary,
                };
                redundant(plan, facts, tally, gateway).await?;
            }
            VrrpRow::L3Single {
                vlan,
                gateway,
                leaf,
            } => {
                let address = if gateway.addr() == gateway.network() {
                    nth_host(*gateway, 1).on(leaf)?
                } else {
                    *gateway
                };
                let spec = VlanSpec::new(*vlan, VlanScope::Local);
                let outcome = ops::ensure_vlan(facts, leaf, &spec).await.on(leaf)?;
                tally.add(leaf, outcome, format!("VLAN {}", vlan));
                let spec = vrouter_spec(plan, leaf);
                let outcome = ops::ensure_vrouter(facts, leaf, &spec).await.on(leaf)?;
                tally.add(leaf, outcome, format!("vRouter {}", spec.name));
                let (outcome, _) = ops::ensure_vrouter_interface(
                    facts,
                    leaf,
                    &vrouter_name(leaf),
                    &address,
                    Attachment::Vlan(*vlan),
                    None,
                )
                .await
                .on(leaf)?;
                tally.add(leaf, outcome, format!("gateway {} on vlan {}", address, vlan));
            }
            VrrpRow::L3Pair {
                vlan,
                vip,
                pair,
                active_switch,
                ..
            } => {
                let Some(pair) = topology.leaves.pairs.iter().find(|p| *p == pair) else {
                    let message = format!("{} and {} are not a leaf cluster", pair.first, pair.second);
                    return Err(StepError::new(&pair.first, ZtpError::topology(message)));
                };
                let active = active_member(pair, active_switch);
                let (vip, active_ip, standby_ip) = triple(active, *vip)?;
                let gateway = Gateway {
                    pair,
                    active,
                    vlan: *vlan,
                    scope: VlanScope::Cluster,
                    vip,
                    active_ip,
                    standby_ip,
                };
                redundant(plan, facts, tally, gateway).await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZtpConfig;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hw_vrrp_id_prefers_pair_rows() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vrrp.csv"), "101, 10.9.1.0/24, leaf1, leaf2, 25, leaf1\n").unwrap();
        let toml = r#"
            fabric_name = "f1"
            spine_list = ["spine1"]
            leaf_list = ["leaf1", "leaf2", "leaf3"]
            mode = "l3"
            [inputs]
            vrrp_csv = "vrrp.csv"
        "#;
        let config = ZtpConfig::from_toml_str(toml, Some(dir.path())).unwrap();
        let plan = FabricPlan::from_config(config).unwrap();
        assert_eq!(hw_vrrp_id(&plan, "leaf2"), 25);
        assert_eq!(hw_vrrp_id(&plan, "leaf3"), 18);
        assert_eq!(hw_vrrp_id(&plan, "spine1"), 18);
    }

    #[test]
    fn test_triple_uses_first_three_hosts() {
        let (vip, active, standby) = triple("spine1", "10.0.1.77/24".parse().unwrap()).unwrap();
        assert_eq!(vip.to_string(), "10.0.1.1/24");
        assert_eq!(active.to_string(), "10.0.1.2/24");
        assert_eq!(standby.to_string(), "10.0.1.3/24");
    }

    #[test]
    fn test_active_member_falls_back_to_first() {
        let pair = ClusterPair::new("spine1", "spine2");
        assert_eq!(active_member(&pair, "spine2"), "spine2");
        assert_eq!(active_member(&pair, "leaf1"), "spine1");
    }
}
