//! eBGP between spines and leaves, iBGP inside leaf clusters.

use std::collections::BTreeMap;
use std::net::IpAddr;
use tracing::info;

use super::{overlay_link, FabricLink, OnSwitch, StepError, StepResult, Tally, Topology};
use crate::address;
use crate::commands::BgpNeighborFlags;
use crate::error::ZtpError;
use crate::facts::FabricFacts;
use crate::inputs::MAX_AS;
use crate::naming::vrouter_name;
use crate::ops;
use crate::plan::FabricPlan;
use crate::types::Redistribute;

/// Spines share the base AS; each leaf group gets the next one up.
pub(crate) fn as_numbers(plan: &FabricPlan, topology: &Topology) -> StepResult<BTreeMap<String, u32>> {
    let base = plan.config.bgp_as_range;
    let mut numbers: BTreeMap<String, u32> = plan
        .inventory
        .spine_names()
        .into_iter()
        .map(|spine| (spine, base))
        .collect();
    for (g, group) in topology.leaf_groups.iter().enumerate() {
        let number = u32::try_from(g)
            .ok()
            .and_then(|g| base.checked_add(1)?.checked_add(g))
            .filter(|n| *n <= MAX_AS);
        for leaf in group {
            let Some(number) = number else {
                let message = format!("no AS number above {} for leaf group {}", base, g + 1);
                return Err(StepError::new(leaf, ZtpError::invalid_config("bgp_as_range", message)));
            };
            numbers.insert(leaf.clone(), number);
        }
    }
    Ok(numbers)
}

fn as_of(numbers: &BTreeMap<String, u32>, switch: &str) -> StepResult<u32> {
    numbers.get(switch).copied().ok_or_else(|| {
        StepError::new(
            switch,
            ZtpError::internal(format!("no AS number assigned to {}", switch)),
        )
    })
}

async fn neighbor(
    facts: &mut FabricFacts,
    tally: &mut Tally,
    switch: &str,
    peer: IpAddr,
    remote_as: u32,
    flags: &BgpNeighborFlags,
) -> StepResult<()> {
    let outcome = ops::ensure_bgp_neighbor(facts, switch, &vrouter_name(switch), peer, remote_as, flags)
        .await
        .on(switch)?;
    tally.add(switch, outcome, format!("BGP neighbor {} AS {}", peer, remote_as));
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
    let numbers = as_numbers(plan, topology)?;

    for switch in plan.managed_names() {
        let mut values = vec![("bgp-as", as_of(&numbers, &switch)?.to_string())];
        if config.bgp_redistribute != Redistribute::None {
            values.push(("bgp-redistribute", config.bgp_redistribute.as_str().to_string()));
        }
        values.push(("bgp-max-paths", config.bgp_max_paths.to_string()));
        let outcome = ops::ensure_vrouter_attrs(facts, &switch, &vrouter_name(&switch), &values)
            .await
            .on(&switch)?;
        tally.add(&switch, outcome, format!("BGP settings {:?}", values));
    }

    for fabric_link in links {
        let link = &fabric_link.link;
        let spine_as = as_of(&numbers, &link.spine)?;
        let leaf_as = as_of(&numbers, &link.leaf)?;
        if fabric_link.spine_nic.is_some() {
            let flags = BgpNeighborFlags {
                bfd: config.bfd,
                ..Default::default()
            };
            let peer = fabric_link.ips.second.addr();
            neighbor(facts, tally, &link.spine, peer, leaf_as, &flags).await?;
        }
        let clustered = topology.leaves.pair_of(&link.leaf).is_some();
        let flags = BgpNeighborFlags {
            weight: clustered.then_some(100),
            allowas_in: clustered,
            bfd: config.bfd,
            ..Default::default()
        };
        let peer = fabric_link.ips.first.addr();
        neighbor(facts, tally, &link.leaf, peer, spine_as, &flags).await?;
    }

    let flags = BgpNeighborFlags {
        next_hop_self: true,
        bfd: config.bfd,
        ..Default::default()
    };
    for (k, pair) in topology.leaves.pairs.iter().enumerate() {
        let overlay = address::overlay_pair(config.ibgp_ip_range, k).on(&pair.first)?;
        overlay_link(facts, tally, pair, config.ibgp_vlan, &overlay).await?;
        let cluster_as = as_of(&numbers, &pair.first)?;
        let first = IpAddr::V4(overlay.first.addr());
        let second = IpAddr::V4(overlay.second.addr());
        neighbor(facts, tally, &pair.first, second, cluster_as, &flags).await?;
        neighbor(facts, tally, &pair.second, first, cluster_as, &flags).await?;
        info!("iBGP between {} and {} over {}", pair.first, pair.second, overlay.network);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZtpConfig;
    use crate::topology::ClusterPlan;
    use crate::types::ClusterPair;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_as_numbers_per_leaf_group() {
        let toml = r#"
            fabric_name = "f1"
            spine_list = ["spine1", "spine2"]
            leaf_list = ["leaf1", "leaf2", "leaf3"]
            mode = "l3"
            bgp_as_range = 65000
        "#;
        let plan = FabricPlan::from_config(ZtpConfig::from_toml_str(toml, None).unwrap()).unwrap();
        let topology = Topology {
            spines: ClusterPlan::default(),
            leaves: ClusterPlan {
                pairs: vec![ClusterPair::new("leaf1", "leaf2")],
                singletons: vec!["leaf3".to_string()],
            },
            leaf_groups: vec![
                vec!["leaf1".to_string(), "leaf2".to_string()],
                vec!["leaf3".to_string()],
            ],
        };
        let numbers = as_numbers(&plan, &topology).unwrap();
        assert_eq!(numbers["spine1"], 65000);
        assert_eq!(numbers["spine2"], 65000);
        assert_eq!(numbers["leaf1"], 65001);
        assert_eq!(numbers["leaf2"], 65001);
        assert_eq!(numbers["leaf3"], 65002);
        assert!(as_of(&numbers, "leaf9").is_err());
    }

    #[test]
    fn test_as_numbers_past_the_range() {
        let toml = r#"
            fabric_name = "f1"
            spine_list = ["spine1"]
            leaf_list = ["leaf1"]
            mode = "l3"
        "#;
        let mut plan = FabricPlan::from_config(ZtpConfig::from_toml_str(toml, None).unwrap()).unwrap();
        plan.config.bgp_as_range = MAX_AS;
        let topology = Topology {
            spines: ClusterPlan::default(),
            leaves: ClusterPlan {
                pairs: Vec::new(),
                singletons: vec!["leaf1".to_string()],
            },
            leaf_groups: vec![vec!["leaf1".to_string()]],
        };
        let err = as_numbers(&plan, &topology).unwrap_err();
        assert_eq!(err.switch, "leaf1");
        assert_eq!(err.error.kind(), crate::error::ErrorKind::InputInvalid);

        plan.config.bgp_as_range = u32::MAX;
        assert!(as_numbers(&plan, &topology).is_err());
    }
}
