//! L2 fabric: trunks toward the spines and vLAGs across cluster pairs.

use tracing::{debug, warn};

use netvisor_types::PortList;

use super::{OnSwitch, StepResult, Tally, Topology};
use crate::facts::FabricFacts;
use crate::naming::{self, spine_trunk_name, trunk_name, vlag_name};
use crate::ops;
use crate::plan::FabricPlan;

/// Union of the ports on `switch` facing any of `peers`.
async fn ports_toward(facts: &mut FabricFacts, switch: &str, peers: &[String]) -> StepResult<PortList> {
    let mut ports = PortList::new();
    for peer in peers {
        for port in facts.store(switch).ports_facing(peer).await.on(switch)?.iter() {
            ports.insert(port);
        }
    }
    Ok(ports)
}

pub(super) async fn provision(
    plan: &FabricPlan,
    topology: &Topology,
    facts: &mut FabricFacts,
    tally: &mut Tally,
) -> StepResult<()> {
    let spines = plan.inventory.spine_names();
    let Some(first_spine) = spines.first() else {
        debug!("No spines; no trunks to build");
        return Ok(());
    };
    let mut names = Vec::new();

    for group in &topology.leaf_groups {
        let Some(head) = group.first() else {
            continue;
        };

        let mut leaf_trunks = Vec::new();
        for leaf in group {
            let ports = ports_toward(facts, leaf, &spines).await?;
            if ports.is_empty() {
                debug!("{} has no LLDP neighbor among the spines", leaf);
                continue;
            }
            let name = trunk_name(leaf, first_spine);
            let outcome = ops::ensure_trunk(facts, leaf, &name, &ports).await.on(leaf)?;
            tally.add(leaf, outcome, format!("trunk {} ({})", name, ports));
            names.push(name.clone());
            leaf_trunks.push((leaf.clone(), name));
        }
        if let [(a, a_trunk), (b, b_trunk)] = leaf_trunks.as_slice() {
            let name = vlag_name(a, b, first_spine);
            let outcome = ops::ensure_vlag(facts, a, b, a_trunk, b_trunk, &name)
                .await
                .on(a)?;
            tally.add(a, outcome, format!("vLAG {}", name));
            names.push(name);
        }

        if plan.config.third_party_spines {
            continue;
        }
        let trunk = spine_trunk_name(head);
        let mut trunked = Vec::new();
        for spine in &spines {
            let ports = ports_toward(facts, spine, group).await?;
            if ports.is_empty() {
                continue;
            }
            let outcome = ops::ensure_trunk(facts, spine, &trunk, &ports).await.on(spine)?;
            tally.add(spine, outcome, format!("trunk {} ({})", trunk, ports));
            trunked.push(spine.as_str());
        }
        if trunked.is_empty() {
            continue;
        }
        names.push(trunk.clone());
        if let Some(pair) = topology.spines.pairs.first() {
            if pair.members().iter().all(|s| trunked.contains(s)) {
                let name = vlag_name(&pair.first, &pair.second, head);
                let outcome = ops::ensure_vlag(facts, &pair.first, &pair.second, &trunk, &trunk, &name)
                    .await
                    .on(&pair.first)?;
                tally.add(&pair.first, outcome, format!("vLAG {}", name));
                names.push(name);
            }
        }
    }

    for name in naming::collisions(names.iter().map(String::as_str)) {
        warn!("Trunk/vLAG name {} is shared by more than one entity", name);
    }
    Ok(())
}
