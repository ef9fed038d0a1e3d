//! Fabric-wide provisioning.
//!
//! Runs once every managed switch has joined the fabric. All commands go
//! through one anchor switch, scoped to their target switch, and are issued
//! one at a time. Each stage records one task per switch it touched.

mod ebgp;
mod l2;
mod l3;
mod manual;
mod ospf;
mod vrrp;
mod vxlan;

pub use l3::FabricLink;

use ipnet::IpNet;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use netvisor_cli_common::CliSession;
use netvisor_types::{NetworkType, VlanId, VlanScope};

use crate::address::OverlayPair;
use crate::commands::Attachment;
use crate::error::{ZtpError, ZtpResult};
use crate::facts::FabricFacts;
use crate::naming::{vnet_name, vrouter_name};
use crate::ops::{self, VlanSpec, VrouterSpec};
use crate::plan::FabricPlan;
use crate::report::RunReport;
use crate::topology::{self, ClusterPlan};
use crate::types::{ClusterPair, FabricMode, Outcome, RoutingProtocol};

const TASK_MEMBERSHIP: &str = "Verify fabric membership";
const TASK_CLUSTERS: &str = "Create clusters";
const TASK_TRUNKS: &str = "Configure trunks and vLAGs";
const TASK_FABRIC_NETWORK: &str = "Move fabric network to in-band";
const TASK_VROUTERS: &str = "Create vRouters";
const TASK_LINKS: &str = "Configure L3 links";
const TASK_LOOPBACKS: &str = "Assign loopbacks";
const TASK_EBGP: &str = "Configure eBGP";
const TASK_OSPF: &str = "Configure OSPF";
const TASK_VRRP: &str = "Configure VRRP";
const TASK_VXLAN: &str = "Configure VXLAN";
const TASK_MANUAL_BGP: &str = "Apply BGP input";
const TASK_MANUAL_OSPF: &str = "Apply OSPF input";

/// A failed fabric-wide step and the switch it was aimed at.
#[derive(Debug)]
pub(crate) struct StepError {
    switch: String,
    error: ZtpError,
}

impl StepError {
    pub(crate) fn new(switch: &str, error: ZtpError) -> Self {
        Self {
            switch: switch.to_string(),
            error,
        }
    }
}

pub(crate) type StepResult<T> = Result<T, StepError>;

/// Attaches the target switch to a step failure.
pub(crate) trait OnSwitch<T> {
    fn on(self, switch: &str) -> StepResult<T>;
}

impl<T> OnSwitch<T> for ZtpResult<T> {
    fn on(self, switch: &str) -> StepResult<T> {
        self.map_err(|error| StepError::new(switch, error))
    }
}

/// Per-switch outcome of one fabric-wide task.
#[derive(Debug)]
pub(crate) struct Tally {
    task: &'static str,
    switches: BTreeMap<String, (Outcome, Vec<String>)>,
}

impl Tally {
    fn new(task: &'static str) -> Self {
        Self {
            task,
            switches: BTreeMap::new(),
        }
    }

    /// Notes the outcome of one step on `switch`; only changes are listed.
    pub(crate) fn add(&mut self, switch: &str, outcome: Outcome, what: impl Into<String>) {
        let entry = self
            .switches
            .entry(switch.to_string())
            .or_insert((Outcome::AlreadyPresent, Vec::new()));
        entry.0 = entry.0.merge(outcome);
        if outcome.changed() {
            entry.1.push(format!("{} {}", outcome.as_str(), what.into()));
        }
    }

    fn flush(self, report: &RunReport) {
        for (switch, (outcome, changes)) in self.switches {
            let output = if changes.is_empty() {
                "No changes".to_string()
            } else {
                changes.join("; ")
            };
            report.record(&switch, self.task, output, outcome);
        }
    }
}

/// Cluster layout discovered from LLDP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    /// Spine cluster; only formed in L2 fabrics.
    pub spines: ClusterPlan,
    pub leaves: ClusterPlan,
    /// Leaf clusters and standalone leaves in leaf-list order.
    pub leaf_groups: Vec<Vec<String>>,
}

impl Topology {
    /// Position of the group holding `leaf`.
    pub fn group_index(&self, leaf: &str) -> Option<usize> {
        self.leaf_groups
            .iter()
            .position(|g| g.iter().any(|m| m == leaf))
    }

    /// The spine or leaf cluster containing `switch`.
    pub fn cluster_of(&self, switch: &str) -> Option<&ClusterPair> {
        self.spines
            .pair_of(switch)
            .or_else(|| self.leaves.pair_of(switch))
    }
}

/// vRouter wanted on `switch`.
pub(crate) fn vrouter_spec(plan: &FabricPlan, switch: &str) -> VrouterSpec {
    VrouterSpec {
        name: vrouter_name(switch),
        vnet: vnet_name(&plan.config.fabric_name),
        hw_vrrp_id: Some(vrrp::hw_vrrp_id(plan, switch)),
    }
}

/// Local VLAN plus one interface per cluster member for an iBGP/iOSPF link.
pub(crate) async fn overlay_link(
    facts: &mut FabricFacts,
    tally: &mut Tally,
    pair: &ClusterPair,
    vlan: VlanId,
    overlay: &OverlayPair,
) -> StepResult<()> {
    for (member, ip) in [(&pair.first, overlay.first), (&pair.second, overlay.second)] {
        let spec = VlanSpec::new(vlan, VlanScope::Local);
        let outcome = ops::ensure_vlan(facts, member, &spec).await.on(member)?;
        tally.add(member, outcome, format!("VLAN {}", vlan));
        let (outcome, _) = ops::ensure_vrouter_interface(
            facts,
            member,
            &vrouter_name(member),
            &IpNet::V4(ip),
            Attachment::Vlan(vlan),
            None,
        )
        .await
        .on(member)?;
        tally.add(member, outcome, format!("interface {} on vlan {}", ip, vlan));
    }
    Ok(())
}

/// Drives the fabric-wide stages through one anchor switch.
#[derive(Debug)]
pub struct FabricOrchestrator {
    plan: Arc<FabricPlan>,
    report: RunReport,
    facts: FabricFacts,
    cancel: CancellationToken,
}

impl FabricOrchestrator {
    /// `anchor` must address a fabric member (`switch-local`).
    pub fn new(plan: Arc<FabricPlan>, report: RunReport, anchor: CliSession) -> Self {
        let cancel = anchor.cancellation().clone();
        Self {
            plan,
            report,
            facts: FabricFacts::new(anchor),
            cancel,
        }
    }

    fn checkpoint(&mut self, task: &'static str) -> ZtpResult<Tally> {
        if self.cancel.is_cancelled() {
            let err = ZtpError::Cancelled;
            self.report.fail(self.facts.anchor_host(), task, &err);
            return Err(err);
        }
        self.facts.refresh();
        info!("Starting {}", task);
        Ok(Tally::new(task))
    }

    fn finish<T>(&self, tally: Tally, result: StepResult<T>) -> ZtpResult<T> {
        let task = tally.task;
        tally.flush(&self.report);
        result.map_err(|StepError { switch, error }| {
            error!("{} failed on {}: {}", task, switch, error);
            self.report.fail(&switch, task, &error);
            error
        })
    }

    /// Runs every fabric-wide stage the plan calls for.
    #[instrument(skip(self), fields(fabric = %self.plan.config.fabric_name))]
    pub async fn run(mut self) -> ZtpResult<()> {
        // Third-party spines still count: their links are configured from
        // the leaf side.
        let managed = self.plan.managed_names();
        if managed.is_empty() || self.plan.inventory.len() < 2 {
            debug!(
                "{} switch(es), {} managed; nothing fabric-wide to do",
                self.plan.inventory.len(),
                managed.len()
            );
            return Ok(());
        }
        let plan = Arc::clone(&self.plan);

        let tally = self.checkpoint(TASK_MEMBERSHIP)?;
        let result = check_membership(&plan, &managed, &mut self.facts).await;
        self.finish(tally, result)?;

        let mut tally = self.checkpoint(TASK_CLUSTERS)?;
        let result = clusters(&plan, &mut self.facts, &mut tally).await;
        let topology = self.finish(tally, result)?;

        match plan.config.mode {
            FabricMode::L2 => {
                let mut tally = self.checkpoint(TASK_TRUNKS)?;
                let result = l2::provision(&plan, &topology, &mut self.facts, &mut tally).await;
                self.finish(tally, result)?;

                if plan.config.update_fabric_to_inband {
                    let mut tally = self.checkpoint(TASK_FABRIC_NETWORK)?;
                    let result = fabric_network(&plan, &mut self.facts, &mut tally).await;
                    self.finish(tally, result)?;
                }
            }
            FabricMode::L3 => {
                let mut tally = self.checkpoint(TASK_VROUTERS)?;
                let result = l3::vrouters(&plan, &mut self.facts, &mut tally).await;
                self.finish(tally, result)?;

                let mut tally = self.checkpoint(TASK_LINKS)?;
                let result = l3::links(&plan, &mut self.facts, &mut tally).await;
                let links = self.finish(tally, result)?;

                let mut tally = self.checkpoint(TASK_LOOPBACKS)?;
                let result = l3::loopbacks(&plan, &mut self.facts, &mut tally).await;
                self.finish(tally, result)?;

                match plan.config.routing_protocol {
                    RoutingProtocol::Ebgp => {
                        let mut tally = self.checkpoint(TASK_EBGP)?;
                        let result =
                            ebgp::provision(&plan, &topology, &links, &mut self.facts, &mut tally).await;
                        self.finish(tally, result)?;
                    }
                    RoutingProtocol::Ospf => {
                        let mut tally = self.checkpoint(TASK_OSPF)?;
                        let result =
                            ospf::provision(&plan, &topology, &links, &mut self.facts, &mut tally).await;
                        self.finish(tally, result)?;
                    }
                }
            }
        }

        if !plan.vrrp_rows.is_empty() {
            let mut tally = self.checkpoint(TASK_VRRP)?;
            let result = vrrp::provision(&plan, &topology, &mut self.facts, &mut tally).await;
            self.finish(tally, result)?;
        }
        if !plan.vxlan_rows.is_empty() {
            let mut tally = self.checkpoint(TASK_VXLAN)?;
            let result = vxlan::provision(&plan, &mut self.facts, &mut tally).await;
            self.finish(tally, result)?;
        }
        if !plan.bgp_rows.is_empty() {
            let mut tally = self.checkpoint(TASK_MANUAL_BGP)?;
            let result = manual::bgp(&plan, &mut self.facts, &mut tally).await;
            self.finish(tally, result)?;
        }
        if !plan.ospf_rows.is_empty() {
            let mut tally = self.checkpoint(TASK_MANUAL_OSPF)?;
            let result = manual::ospf(&plan, &mut self.facts, &mut tally).await;
            self.finish(tally, result)?;
        }
        info!("Fabric {} provisioned", plan.config.fabric_name);
        Ok(())
    }
}

/// Every managed switch must report the configured fabric.
async fn check_membership(
    plan: &FabricPlan,
    managed: &[String],
    facts: &mut FabricFacts,
) -> StepResult<()> {
    let wanted = plan.config.fabric_name.as_str();
    for switch in managed {
        let info = facts.store(switch).fabric_info().await.on(switch)?;
        match info {
            Some(info) if info.name == wanted => {}
            Some(info) => {
                let message = format!("{} is in fabric {}, expected {}", switch, info.name, wanted);
                return Err(StepError::new(switch, ZtpError::topology(message)));
            }
            None => {
                let message = format!("{} has not joined fabric {}", switch, wanted);
                return Err(StepError::new(switch, ZtpError::topology(message)));
            }
        }
    }
    let anchor = facts.anchor_host().to_string();
    let nodes = facts.store(&anchor).fabric_node_count().await.on(&anchor)?;
    if nodes < managed.len() {
        let message = format!(
            "fabric {} reports {} nodes, expected at least {}",
            wanted,
            nodes,
            managed.len()
        );
        return Err(StepError::new(&anchor, ZtpError::topology(message)));
    }
    debug!("Fabric {} has {} nodes", wanted, nodes);
    Ok(())
}

/// Pairs spines (L2 only) and leaves over LLDP and creates their clusters.
async fn clusters(plan: &FabricPlan, facts: &mut FabricFacts, tally: &mut Tally) -> StepResult<Topology> {
    let spines: Vec<String> = plan
        .inventory
        .spine_names()
        .into_iter()
        .filter(|s| plan.is_managed(s))
        .collect();
    let leaves = plan.inventory.leaf_names();

    let spine_plan = match spines.first() {
        Some(first) if plan.config.mode == FabricMode::L2 && spines.len() >= 2 => {
            let found = topology::cluster_pairs(facts, &spines).await.on(first)?;
            if spines.len() == 2 && found.pairs.is_empty() {
                let message = format!(
                    "{} and {} are not connected and cannot form a cluster",
                    spines[0], spines[1]
                );
                return Err(StepError::new(first, ZtpError::topology(message)));
            }
            found
        }
        _ => ClusterPlan::default(),
    };
    let leaf_plan = match leaves.first() {
        Some(first) => topology::cluster_pairs(facts, &leaves).await.on(first)?,
        None => ClusterPlan::default(),
    };

    for pair in spine_plan.pairs.iter().chain(&leaf_plan.pairs) {
        let outcome = ops::ensure_cluster(facts, pair).await.on(&pair.first)?;
        tally.add(
            &pair.first,
            outcome,
            format!("cluster with {}", pair.second),
        );
    }
    let leaf_groups = leaf_plan.groups(&leaves);
    Ok(Topology {
        spines: spine_plan,
        leaves: leaf_plan,
        leaf_groups,
    })
}

async fn fabric_network(plan: &FabricPlan, facts: &mut FabricFacts, tally: &mut Tally) -> StepResult<()> {
    for switch in plan.managed_names() {
        let outcome = ops::ensure_fabric_network(facts, &switch, NetworkType::InBand)
            .await
            .on(&switch)?;
        tally.add(&switch, outcome, "fabric-network in-band");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tally_lists_changes_only() {
        let report = RunReport::new();
        let mut tally = Tally::new(TASK_TRUNKS);
        tally.add("leaf1", Outcome::AlreadyPresent, "trunk leaf1-to-spine1-trunk");
        tally.add("leaf1", Outcome::Created, "vLAG leaf1-leaf2-to-spine1-vlag");
        tally.add("leaf2", Outcome::AlreadyPresent, "trunk leaf2-to-spine1-trunk");
        tally.flush(&report);

        let leaf1 = report.tasks("leaf1");
        assert_eq!(leaf1.len(), 1);
        assert!(leaf1[0].changed);
        assert_eq!(leaf1[0].output, "created vLAG leaf1-leaf2-to-spine1-vlag");
        assert_eq!(report.tasks("leaf2")[0].output, "No changes");
        assert!(!report.changed("leaf2"));
    }

    #[test]
    fn test_topology_lookups() {
        let topology = Topology {
            spines: ClusterPlan {
                pairs: vec![ClusterPair::new("spine1", "spine2")],
                singletons: vec![],
            },
            leaves: ClusterPlan {
                pairs: vec![ClusterPair::new("leaf2", "leaf1")],
                singletons: vec!["leaf3".to_string()],
            },
            leaf_groups: vec![
                vec!["leaf1".to_string(), "leaf2".to_string()],
                vec!["leaf3".to_string()],
            ],
        };
        assert_eq!(topology.group_index("leaf2"), Some(0));
        assert_eq!(topology.group_index("leaf3"), Some(1));
        assert_eq!(topology.group_index("spine1"), None);
        assert_eq!(topology.cluster_of("spine2").map(|p| p.first.as_str()), Some("spine1"));
        assert!(topology.cluster_of("leaf3").is_none());
    }
}
