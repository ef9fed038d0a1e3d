//! VXLAN VLANs, spine tunnels and loopback trunk ports.

use ipnet::IpNet;
use std::net::IpAddr;
use tracing::{debug, warn};

use netvisor_types::VlanScope;

use super::{OnSwitch, StepError, StepResult, Tally};
use crate::address;
use crate::commands::Attachment;
use crate::error::ZtpError;
use crate::facts::{FabricFacts, InterfaceFilter};
use crate::naming::{tunnel_name, vrouter_name, VXLAN_LOOPBACK_TRUNK};
use crate::ops::{self, VlanSpec};
use crate::plan::FabricPlan;

/// Tunnel endpoint of `switch`: its vRouter interface on the first VXLAN
/// VLAN it serves, else its loopback.
async fn vtep(plan: &FabricPlan, facts: &mut FabricFacts, switch: &str) -> StepResult<IpAddr> {
    let Some(vrouter) = facts.store(switch).vrouter_on(switch).await.on(switch)? else {
        let message = format!("{} has no vRouter to terminate VXLAN tunnels", switch);
        return Err(StepError::new(switch, ZtpError::topology(message)));
    };
    if let Some(row) = plan.vxlan_rows.iter().find(|r| r.switch == switch) {
        let filter = InterfaceFilter::default().attachment(Attachment::Vlan(row.vlan));
        let found = facts
            .store(switch)
            .interface_on(&vrouter.name, &filter)
            .await
            .on(switch)?;
        if let Some(ip) = found.and_then(|i| i.ip.parse::<IpNet>().ok()) {
            return Ok(ip.addr());
        }
    }
    let index = plan
        .inventory
        .get(switch)
        .map(|s| s.global_index)
        .ok_or_else(|| StepError::new(switch, ZtpError::UnknownSwitch { name: switch.to_string() }))?;
    let ip = address::loopback(plan.config.loopback_ip, index).on(switch)?;
    debug!("{} has no interface on its VXLAN VLAN; using loopback {}", switch, ip);
    Ok(IpAddr::V4(ip))
}

pub(super) async fn provision(plan: &FabricPlan, facts: &mut FabricFacts, tally: &mut Tally) -> StepResult<()> {
    for row in &plan.vxlan_rows {
        if !plan.is_managed(&row.switch) {
            warn!("Skipping VXLAN {} on unmanaged switch {}", row.vxlan, row.switch);
            continue;
        }
        let spec = VlanSpec::new(row.vlan, VlanScope::Fabric).with_vxlan(row.vxlan);
        let outcome = ops::ensure_vlan(facts, &row.switch, &spec).await.on(&row.switch)?;
        tally.add(&row.switch, outcome, format!("VLAN {} with VXLAN {}", row.vlan, row.vxlan));
    }

    let switches = plan.tunnel_switches();
    for &local in &switches {
        let vxlans: Vec<u32> = plan
            .vxlan_rows
            .iter()
            .filter(|r| r.switch == local)
            .map(|r| r.vxlan)
            .collect();
        for &remote in &switches {
            if local == remote
                || !(plan.inventory.is_spine(local) || plan.inventory.is_spine(remote))
            {
                continue;
            }
            let local_ip = vtep(plan, facts, local).await?;
            let remote_ip = vtep(plan, facts, remote).await?;
            let name = tunnel_name(local, remote);
            let outcome = ops::ensure_tunnel(facts, local, &name, &vrouter_name(local), local_ip, remote_ip)
                .await
                .on(local)?;
            tally.add(local, outcome, format!("tunnel {} ({} -> {})", name, local_ip, remote_ip));
            for &vxlan in &vxlans {
                let outcome = ops::ensure_tunnel_vxlan(facts, local, &name, vxlan)
                    .await
                    .on(local)?;
                tally.add(local, outcome, format!("VXLAN {} on {}", vxlan, name));
            }
        }
    }

    for row in plan.vxlan_rows.iter().filter(|r| plan.is_managed(&r.switch)) {
        let outcome = ops::ensure_trunk_member(facts, &row.switch, VXLAN_LOOPBACK_TRUNK, row.loopback_port)
            .await
            .on(&row.switch)?;
        tally.add(
            &row.switch,
            outcome,
            format!("port {} in {}", row.loopback_port, VXLAN_LOOPBACK_TRUNK),
        );
    }
    Ok(())
}
