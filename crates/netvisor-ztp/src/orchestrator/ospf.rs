//! OSPF between spines and leaves, iOSPF inside leaf clusters.

use ipnet::IpNet;
use tracing::info;

use super::{overlay_link, FabricLink, OnSwitch, StepError, StepResult, Tally, Topology};
use crate::address;
use crate::error::ZtpError;
use crate::facts::FabricFacts;
use crate::naming::vrouter_name;
use crate::ops;
use crate::plan::FabricPlan;

/// Area of the leaf group holding `leaf`; area `ospf_area_id` itself is left
/// for the spines' backbone.
fn area_of(plan: &FabricPlan, topology: &Topology, leaf: &str) -> StepResult<u32> {
    let group = topology.group_index(leaf).ok_or_else(|| {
        StepError::new(leaf, ZtpError::internal(format!("{} is in no leaf group", leaf)))
    })?;
    let base = plan.config.ospf_area_id;
    u32::try_from(group)
        .ok()
        .and_then(|g| base.checked_add(1)?.checked_add(g))
        .ok_or_else(|| {
            let message = format!("no area above {} for leaf group {}", base, group + 1);
            StepError::new(leaf, ZtpError::invalid_config("ospf_area_id", message))
        })
}

async fn network(
    facts: &mut FabricFacts,
    tally: &mut Tally,
    switch: &str,
    network: &IpNet,
    area: u32,
) -> StepResult<()> {
    let outcome = ops::ensure_ospf_network(facts, switch, &vrouter_name(switch), network, area)
        .await
        .on(switch)?;
    tally.add(switch, outcome, format!("OSPF network {} area {}", network, area));
    Ok(())
}

async fn bfd(facts: &mut FabricFacts, tally: &mut Tally, switch: &str, nic: &str) -> StepResult<()> {
    let values = [("ospf-bfd", "enable".to_string())];
    let outcome = ops::ensure_interface_config(facts, switch, &vrouter_name(switch), nic, &values)
        .await
        .on(switch)?;
    tally.add(switch, outcome, format!("OSPF BFD on {}", nic));
    Ok(())
}

pub(super) async fn provision(
    plan: &FabricPlan,
    topology: &Topology,
    links: &[FabricLink],
    facts: &mut FabricFacts,
    tally: &mut Tally,
) -> StepResult<()> {
    let config = &plan.config;
    for switch in plan.managed_names() {
        let values = [("ospf-redistribute", "static,connected".to_string())];
        let outcome = ops::ensure_vrouter_attrs(facts, &switch, &vrouter_name(&switch), &values)
            .await
            .on(&switch)?;
        tally.add(&switch, outcome, "OSPF redistribution");
    }

    for fabric_link in links {
        let link = &fabric_link.link;
        let area = area_of(plan, topology, &link.leaf)?;
        let subnet = fabric_link.ips.network();
        if let Some(nic) = &fabric_link.spine_nic {
            network(facts, tally, &link.spine, &subnet, area).await?;
            if config.bfd {
                bfd(facts, tally, &link.spine, nic).await?;
            }
        }
        network(facts, tally, &link.leaf, &subnet, area).await?;
        if config.bfd {
            bfd(facts, tally, &link.leaf, &fabric_link.leaf_nic).await?;
        }
    }

    for (k, pair) in topology.leaves.pairs.iter().enumerate() {
        let overlay = address::overlay_pair(config.iospf_ip_range, k).on(&pair.first)?;
        overlay_link(facts, tally, pair, config.iospf_vlan, &overlay).await?;
        let area = area_of(plan, topology, &pair.first)?;
        let subnet = IpNet::V4(overlay.network);
        network(facts, tally, &pair.first, &subnet, area).await?;
        network(facts, tally, &pair.second, &subnet, area).await?;
        info!("iOSPF between {} and {} in area {}", pair.first, pair.second, area);
    }
    Ok(())
}
