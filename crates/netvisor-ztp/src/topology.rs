//! Physical topology derived from LLDP.
//!
//! LLDP is the only source of truth for cabling. Every resolver call re-reads
//! the LLDP facts of the switches it looks at, so adjacencies that appeared
//! after an earlier phase are picked up.

use tracing::{debug, instrument};

use netvisor_types::PortId;

use crate::error::ZtpResult;
use crate::facts::{FabricFacts, FactKind};
use crate::types::{ClusterPair, Inventory};

/// Cluster pairing of one role list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterPlan {
    /// Pairs in discovery order.
    pub pairs: Vec<ClusterPair>,
    /// Unpaired switches in list order.
    pub singletons: Vec<String>,
}

impl ClusterPlan {
    pub fn pair_of(&self, switch: &str) -> Option<&ClusterPair> {
        self.pairs.iter().find(|p| p.contains(switch))
    }

    pub fn partner_of(&self, switch: &str) -> Option<&str> {
        self.pairs.iter().find_map(|p| p.partner_of(switch))
    }

    /// Groups in `order`: a pair counts once, at its first member's position.
    pub fn groups(&self, order: &[String]) -> Vec<Vec<String>> {
        let mut seen = Vec::<&str>::new();
        let mut groups = Vec::new();
        for name in order {
            if seen.contains(&name.as_str()) {
                continue;
            }
            match self.pair_of(name) {
                Some(pair) => {
                    seen.extend(pair.members());
                    groups.push(vec![pair.first.clone(), pair.second.clone()]);
                }
                None => {
                    seen.push(name);
                    groups.push(vec![name.clone()]);
                }
            }
        }
        groups
    }
}

/// Pairs each switch of `members` with its first unpaired LLDP neighbor from
/// the same list.
#[instrument(skip(facts))]
pub async fn cluster_pairs(facts: &mut FabricFacts, members: &[String]) -> ZtpResult<ClusterPlan> {
    let mut plan = ClusterPlan::default();
    for switch in members {
        if plan.pair_of(switch).is_some() {
            continue;
        }
        let store = facts.store(switch);
        store.invalidate(FactKind::Lldp);
        let neighbors = store.lldp_neighbors().await?;
        let peer = neighbors.iter().map(|e| &e.peer_switch).find(|peer| {
            *peer != switch && members.contains(peer) && plan.pair_of(peer).is_none()
        });
        match peer {
            Some(peer) => {
                debug!("Pairing {} with {}", switch, peer);
                plan.pairs.push(ClusterPair::new(switch.clone(), peer.clone()));
            }
            None => debug!("No cluster peer for {}", switch),
        }
    }
    plan.singletons = members
        .iter()
        .filter(|m| plan.pair_of(m).is_none())
        .cloned()
        .collect();
    Ok(plan)
}

/// One cabled spine-leaf port pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineLeafLink {
    pub spine: String,
    pub spine_port: PortId,
    pub leaf: String,
    pub leaf_port: PortId,
}

/// Every spine-leaf port pair, ordered by spine, leaf, then spine port.
///
/// With third-party spines only the leaf side is readable, so the links are
/// taken from leaf LLDP.
#[instrument(skip(facts, inventory))]
pub async fn spine_leaf_links(
    facts: &mut FabricFacts,
    inventory: &Inventory,
    third_party_spines: bool,
) -> ZtpResult<Vec<SpineLeafLink>> {
    let mut links = Vec::new();
    if third_party_spines {
        for leaf in inventory.leaves() {
            facts.store(&leaf.name).invalidate(FactKind::Lldp);
        }
        for spine in inventory.spines() {
            for leaf in inventory.leaves() {
                let mut edges: Vec<_> = facts
                    .store(&leaf.name)
                    .lldp_neighbors()
                    .await?
                    .into_iter()
                    .filter(|e| e.peer_switch == spine.name)
                    .collect();
                edges.sort_by_key(|e| e.peer_port);
                links.extend(edges.into_iter().map(|e| SpineLeafLink {
                    spine: spine.name.clone(),
                    spine_port: e.peer_port,
                    leaf: leaf.name.clone(),
                    leaf_port: e.local_port,
                }));
            }
        }
    } else {
        for spine in inventory.spines() {
            let store = facts.store(&spine.name);
            store.invalidate(FactKind::Lldp);
            let edges = store.lldp_neighbors().await?;
            for leaf in inventory.leaves() {
                links.extend(edges.iter().filter(|e| e.peer_switch == leaf.name).map(|e| {
                    SpineLeafLink {
                        spine: spine.name.clone(),
                        spine_port: e.local_port,
                        leaf: leaf.name.clone(),
                        leaf_port: e.peer_port,
                    }
                }));
            }
        }
    }
    debug!("Found {} spine-leaf links", links.len());
    Ok(links)
}

/// Port on the far end of `switch:port`.
pub async fn rport(facts: &mut FabricFacts, switch: &str, port: PortId) -> ZtpResult<Option<PortId>> {
    facts.store(switch).remote_port(port).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use netvisor_cli_common::{CliSession, Scope};
    use netvisor_ztp_test::{mesh_with_isolated_leaf, two_spine_two_leaf, two_spine_two_leaf_mesh, SimFabric};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn facts(fabric: &SimFabric) -> FabricFacts {
        fabric.join_all("f1");
        FabricFacts::new(CliSession::new("spine1", Arc::new(fabric.clone())).with_scope(Scope::Local))
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn inventory(leaves: &[&str]) -> Inventory {
        Inventory::new(&names(&["spine1", "spine2"]), &names(leaves)).unwrap()
    }

    #[tokio::test]
    async fn test_cluster_pairs_on_mesh() {
        let fabric = two_spine_two_leaf_mesh();
        let mut facts = facts(&fabric);
        let leaves = cluster_pairs(&mut facts, &names(&["leaf1", "leaf2"])).await.unwrap();
        assert_eq!(leaves.pairs, vec![ClusterPair::new("leaf1", "leaf2")]);
        assert!(leaves.singletons.is_empty());
        let spines = cluster_pairs(&mut facts, &names(&["spine1", "spine2"])).await.unwrap();
        assert_eq!(spines.partner_of("spine2"), Some("spine1"));
    }

    #[tokio::test]
    async fn test_uncabled_switches_stay_single() {
        let fabric = mesh_with_isolated_leaf();
        let mut facts = facts(&fabric);
        let plan = cluster_pairs(&mut facts, &names(&["leaf1", "leaf2", "leaf3"]))
            .await
            .unwrap();
        assert_eq!(plan.pairs.len(), 1);
        assert_eq!(plan.singletons, names(&["leaf3"]));
        assert_eq!(
            plan.groups(&names(&["leaf1", "leaf2", "leaf3"])),
            vec![names(&["leaf1", "leaf2"]), names(&["leaf3"])]
        );
    }

    #[tokio::test]
    async fn test_spine_leaf_links_order() {
        let fabric = two_spine_two_leaf();
        let mut facts = facts(&fabric);
        let links = spine_leaf_links(&mut facts, &inventory(&["leaf1", "leaf2"]), false)
            .await
            .unwrap();
        let summary: Vec<(String, u16, String, u16)> = links
            .iter()
            .map(|l| (l.spine.clone(), l.spine_port.as_u16(), l.leaf.clone(), l.leaf_port.as_u16()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("spine1".to_string(), 1, "leaf1".to_string(), 1),
                ("spine1".to_string(), 2, "leaf2".to_string(), 1),
                ("spine2".to_string(), 1, "leaf1".to_string(), 2),
                ("spine2".to_string(), 2, "leaf2".to_string(), 2),
            ]
        );
        let leaf_view = spine_leaf_links(&mut facts, &inventory(&["leaf1", "leaf2"]), true)
            .await
            .unwrap();
        assert_eq!(leaf_view, links);
    }

    #[tokio::test]
    async fn test_isolated_leaf_has_no_links() {
        let fabric = mesh_with_isolated_leaf();
        let mut facts = facts(&fabric);
        let links = spine_leaf_links(&mut facts, &inventory(&["leaf1", "leaf2", "leaf3"]), false)
            .await
            .unwrap();
        assert!(links.iter().all(|l| l.leaf != "leaf3"));
        assert_eq!(links.len(), 4);
    }

    #[tokio::test]
    async fn test_rport() {
        let fabric = two_spine_two_leaf();
        let mut facts = facts(&fabric);
        let far = rport(&mut facts, "spine2", PortId::new(2).unwrap()).await.unwrap();
        assert_eq!(far, Some(PortId::new(2).unwrap()));
    }
}
