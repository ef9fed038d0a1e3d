//! Operator-supplied BGP and OSPF rows.

use ipnet::IpNet;
use tracing::warn;

use netvisor_types::PortId;

use super::{vrouter_spec, OnSwitch, StepResult, Tally};
use crate::commands::{Attachment, BgpNeighborFlags};
use crate::facts::FabricFacts;
use crate::ops;
use crate::plan::FabricPlan;

/// vRouter plus an interface on `port`, freed from any trunk first.
async fn routed_port(
    plan: &FabricPlan,
    facts: &mut FabricFacts,
    tally: &mut Tally,
    switch: &str,
    port: PortId,
    ip: &IpNet,
) -> StepResult<String> {
    let spec = vrouter_spec(plan, switch);
    let outcome = ops::ensure_vrouter(facts, switch, &spec).await.on(switch)?;
    tally.add(switch, outcome, format!("vRouter {}", spec.name));
    let outcome = ops::delete_trunk_on_port(facts, switch, port).await.on(switch)?;
    tally.add(switch, outcome, format!("trunk on port {}", port));
    let (outcome, _) = ops::ensure_vrouter_interface(facts, switch, &spec.name, ip, Attachment::L3Port(port), None)
        .await
        .on(switch)?;
    tally.add(switch, outcome, format!("interface {} on port {}", ip, port));
    Ok(spec.name)
}

pub(super) async fn bgp(plan: &FabricPlan, facts: &mut FabricFacts, tally: &mut Tally) -> StepResult<()> {
    for row in &plan.bgp_rows {
        let switch = row.switch.as_str();
        if !plan.is_managed(switch) {
            warn!("Skipping BGP row for unmanaged switch {}", switch);
            continue;
        }
        let vrouter = routed_port(plan, facts, tally, switch, row.local_port, &row.interface_ip).await?;
        let values = [("bgp-as", row.bgp_as.to_string())];
        let outcome = ops::ensure_vrouter_attrs(facts, switch, &vrouter, &values)
            .await
            .on(switch)?;
        tally.add(switch, outcome, format!("bgp-as {}", row.bgp_as));
        let flags = BgpNeighborFlags {
            bfd: plan.config.bfd,
            ..Default::default()
        };
        let outcome = ops::ensure_bgp_neighbor(facts, switch, &vrouter, row.remote_ip, row.remote_as, &flags)
            .await
            .on(switch)?;
        tally.add(
            switch,
            outcome,
            format!("BGP neighbor {} AS {}", row.remote_ip, row.remote_as),
        );
    }
    Ok(())
}

/// Applies the OSPF rows to the one switch they are bound to.
pub(super) async fn ospf(plan: &FabricPlan, facts: &mut FabricFacts, tally: &mut Tally) -> StepResult<()> {
    let Some(switch) = plan.config.inputs.ospf_switch.as_deref() else {
        warn!("OSPF input given without ospf_switch; skipping {} rows", plan.ospf_rows.len());
        return Ok(());
    };
    if !plan.is_managed(switch) {
        warn!("Skipping OSPF rows for unmanaged switch {}", switch);
        return Ok(());
    }
    for row in &plan.ospf_rows {
        let vrouter = routed_port(plan, facts, tally, switch, row.l3_port, &row.interface_ip).await?;
        let outcome = ops::ensure_ospf_network(facts, switch, &vrouter, &row.network, row.area)
            .await
            .on(switch)?;
        tally.add(
            switch,
            outcome,
            format!("OSPF network {} area {}", row.network, row.area),
        );
    }
    Ok(())
}
