//! L3 fabric: vRouters, addressed spine-leaf links and loopbacks.

use ipnet::IpNet;
use std::net::IpAddr;
use tracing::{debug, info, warn};

use netvisor_types::PortId;

use super::{vrouter_spec, OnSwitch, StepResult, Tally};
use crate::address::{self, LinkPair};
use crate::commands::Attachment;
use crate::facts::{FabricFacts, InterfaceFilter};
use crate::naming::vrouter_name;
use crate::ops;
use crate::plan::FabricPlan;
use crate::topology::{self, SpineLeafLink};

/// An addressed spine-leaf link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FabricLink {
    pub link: SpineLeafLink,
    pub ips: LinkPair,
    /// `None` when the spine is not managed.
    pub spine_nic: Option<String>,
    pub leaf_nic: String,
}

pub(super) async fn vrouters(plan: &FabricPlan, facts: &mut FabricFacts, tally: &mut Tally) -> StepResult<()> {
    for switch in plan.managed_names() {
        let spec = vrouter_spec(plan, &switch);
        let outcome = ops::ensure_vrouter(facts, &switch, &spec).await.on(&switch)?;
        tally.add(&switch, outcome, format!("vRouter {}", spec.name));
    }
    Ok(())
}

/// Whether `switch` still lacks the interface `ip` on `port`.
async fn missing_interface(
    facts: &mut FabricFacts,
    switch: &str,
    ip: IpNet,
    port: PortId,
) -> StepResult<bool> {
    let filter = InterfaceFilter::default()
        .ip(ip)
        .attachment(Attachment::L3Port(port));
    let found = facts
        .store(switch)
        .interface_on(&vrouter_name(switch), &filter)
        .await
        .on(switch)?;
    Ok(found.is_none())
}

async fn set_auto_trunk(
    plan: &FabricPlan,
    facts: &mut FabricFacts,
    tally: &mut Tally,
    enabled: bool,
) -> StepResult<()> {
    for switch in plan.managed_names() {
        let outcome = ops::ensure_auto_trunk(facts, &switch, enabled).await.on(&switch)?;
        let state = if enabled { "on" } else { "off" };
        tally.add(&switch, outcome, format!("auto-trunk {}", state));
    }
    Ok(())
}

/// Adds one link end: frees the port, then adds the interface and BFD timers.
async fn link_end(
    plan: &FabricPlan,
    facts: &mut FabricFacts,
    tally: &mut Tally,
    switch: &str,
    port: PortId,
    ip: IpNet,
) -> StepResult<String> {
    let vrouter = vrouter_name(switch);
    let outcome = ops::delete_trunk_on_port(facts, switch, port).await.on(switch)?;
    tally.add(switch, outcome, format!("trunk on port {}", port));

    let (outcome, nic) = ops::ensure_vrouter_interface(
        facts,
        switch,
        &vrouter,
        &ip,
        Attachment::L3Port(port),
        None,
    )
    .await
    .on(switch)?;
    tally.add(switch, outcome, format!("interface {} on port {}", ip, port));

    if plan.config.bfd {
        let values = [
            ("bfd-min-rx", plan.config.bfd_min_rx.to_string()),
            ("bfd-multiplier", plan.config.bfd_multiplier.to_string()),
        ];
        let outcome = ops::ensure_interface_config(facts, switch, &vrouter, &nic, &values)
            .await
            .on(switch)?;
        tally.add(switch, outcome, format!("BFD timers on {}", nic));
    }
    Ok(nic)
}

async fn address_links(
    plan: &FabricPlan,
    facts: &mut FabricFacts,
    tally: &mut Tally,
    found: Vec<SpineLeafLink>,
    ips: Vec<LinkPair>,
) -> StepResult<Vec<FabricLink>> {
    let mut addressed = Vec::with_capacity(found.len());
    for (link, pair) in found.into_iter().zip(ips) {
        let spine_nic = if plan.is_managed(&link.spine) {
            Some(link_end(plan, facts, tally, &link.spine, link.spine_port, pair.first).await?)
        } else {
            None
        };
        let leaf_nic = link_end(plan, facts, tally, &link.leaf, link.leaf_port, pair.second).await?;
        addressed.push(FabricLink {
            link,
            ips: pair,
            spine_nic,
            leaf_nic,
        });
    }
    Ok(addressed)
}

/// Numbers every spine-leaf link from the link block.
///
/// Auto-trunk is held off while ports move from trunks to L3 interfaces so
/// the switch does not re-bundle them.
pub(super) async fn links(
    plan: &FabricPlan,
    facts: &mut FabricFacts,
    tally: &mut Tally,
) -> StepResult<Vec<FabricLink>> {
    let config = &plan.config;
    let anchor = facts.anchor_host().to_string();
    let found = topology::spine_leaf_links(facts, &plan.inventory, config.third_party_spines)
        .await
        .on(&anchor)?;
    let pairs = address::plan_link_ips(config.net_address, config.cidr, config.supernet).on(&anchor)?;
    let ips = address::allocate_links(pairs, found.len()).on(&anchor)?;

    let mut pending = false;
    for (link, pair) in found.iter().zip(&ips) {
        if plan.is_managed(&link.spine)
            && missing_interface(facts, &link.spine, pair.first, link.spine_port).await?
        {
            pending = true;
            break;
        }
        if missing_interface(facts, &link.leaf, pair.second, link.leaf_port).await? {
            pending = true;
            break;
        }
    }
    if pending {
        set_auto_trunk(plan, facts, tally, false).await?;
    } else {
        debug!("All {} links already addressed", found.len());
    }
    let result = address_links(plan, facts, tally, found, ips).await;
    if pending {
        // Turned back on even when a link failed.
        let restored = set_auto_trunk(plan, facts, tally, true).await;
        match (&result, restored) {
            (Ok(_), restored) => restored?,
            (Err(_), Err(e)) => warn!("Auto-trunk left off on {}: {}", e.switch, e.error),
            (Err(_), Ok(())) => {}
        }
    }
    let addressed = result?;
    info!("{} spine-leaf links addressed", addressed.len());
    Ok(addressed)
}

/// Loopback per vRouter; it doubles as the router-id.
pub(super) async fn loopbacks(plan: &FabricPlan, facts: &mut FabricFacts, tally: &mut Tally) -> StepResult<()> {
    for switch in plan.managed_switches() {
        let name = switch.name.as_str();
        let ip = address::loopback(plan.config.loopback_ip, switch.global_index).on(name)?;
        let vrouter = vrouter_name(name);
        let outcome = ops::ensure_loopback(facts, name, &vrouter, IpAddr::V4(ip))
            .await
            .on(name)?;
        tally.add(name, outcome, format!("loopback {}", ip));
        let outcome = ops::ensure_vrouter_attrs(facts, name, &vrouter, &[("router-id", ip.to_string())])
            .await
            .on(name)?;
        tally.add(name, outcome, format!("router-id {}", ip));
    }
    Ok(())
}
