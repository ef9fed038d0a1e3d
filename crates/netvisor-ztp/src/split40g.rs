//! Splitting unused 40g ports into four 10g ports.
//!
//! A 40g parent `P` owns sub-ports `P+1..=P+3`. Ports that already carry an
//! LLDP adjacency work at their current speed and are never touched.

use std::time::Duration;
use tracing::{debug, info, instrument};

use netvisor_types::{PortId, PortList};

use crate::commands::{build_port_enable, build_port_speed, SPLIT_SPEED};
use crate::error::ZtpResult;
use crate::facts::{FactKind, FactStore, PortFilter};
use crate::types::Outcome;

const FORTY_G: &str = "40g";

/// Bezel marker of the second lane of a splittable parent.
const SECOND_LANE: &str = ".2";

/// Sub-ports of parent `port`.
pub fn sub_ports(port: PortId) -> PortList {
    PortList::range(port.offset(1), port.offset(3))
}

/// 40g ports without an LLDP neighbor whose second lane is labelled `.2`.
#[instrument(skip(store), fields(switch = %store.switch()))]
pub async fn split_candidates(store: &mut FactStore) -> ZtpResult<Vec<PortId>> {
    let lldp_local: PortList = store
        .lldp_neighbors()
        .await?
        .into_iter()
        .map(|e| e.local_port)
        .collect();
    let forty: Vec<PortId> = store
        .ports(PortFilter::Speed(FORTY_G))
        .await?
        .into_iter()
        .map(|p| p.port)
        .filter(|p| !lldp_local.contains(*p))
        .collect();

    let mut candidates = Vec::new();
    for port in forty {
        let label = store.bezel(port.offset(1)).await?;
        if label.as_deref().is_some_and(|l| l.contains(SECOND_LANE)) {
            candidates.push(port);
        } else {
            debug!("Port {} is not splittable (bezel {:?})", port, label);
        }
    }
    Ok(candidates)
}

/// Sub-ports of every split candidate; the port-enable phase leaves these alone.
pub async fn reserved_sub_ports(store: &mut FactStore) -> ZtpResult<PortList> {
    let mut reserved = PortList::new();
    for port in split_candidates(store).await? {
        for sub in sub_ports(port).iter() {
            reserved.insert(sub);
        }
    }
    Ok(reserved)
}

/// Splits every candidate, then waits `settle` once for nvOSd to restart.
#[instrument(skip(store), fields(switch = %store.switch()))]
pub async fn split_ports(store: &mut FactStore, settle: Duration) -> ZtpResult<Outcome> {
    let candidates = split_candidates(store).await?;
    if candidates.is_empty() {
        return Ok(Outcome::AlreadyPresent);
    }
    for port in &candidates {
        let parent: PortList = std::iter::once(*port).collect();
        store.mutate(&build_port_enable(&parent, false), FactKind::Ports).await?;
        store
            .mutate(&build_port_speed(*port, SPLIT_SPEED), FactKind::Ports)
            .await?;
        let lanes = PortList::range(*port, port.offset(3));
        store.mutate(&build_port_enable(&lanes, true), FactKind::Ports).await?;
        info!("Split port {} into {}", port, lanes.to_range_string());
    }
    debug!("Waiting {:?} for nvOSd to settle", settle);
    tokio::time::sleep(settle).await;
    store.invalidate(FactKind::Lldp);
    Ok(Outcome::Modified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use netvisor_cli_common::{CliSession, Scope};
    use netvisor_ztp_test::{split_candidate, CallVerifier};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn store(fabric: &netvisor_ztp_test::SimFabric) -> FactStore {
        let session = CliSession::new("leaf1", Arc::new(fabric.clone())).with_scope(Scope::Local);
        FactStore::new("leaf1", session)
    }

    #[test]
    fn test_sub_ports() {
        assert_eq!(sub_ports(PortId::new(49).unwrap()).to_range_string(), "50-52");
    }

    #[tokio::test]
    async fn test_lldp_port_is_not_a_candidate() {
        let fabric = split_candidate();
        let mut store = store(&fabric);
        let candidates = split_candidates(&mut store).await.unwrap();
        assert_eq!(candidates, vec![PortId::new(49).unwrap()]);
        assert_eq!(reserved_sub_ports(&mut store).await.unwrap().to_string(), "50,51,52");
    }

    #[tokio::test(start_paused = true)]
    async fn test_split_sequence() {
        let fabric = split_candidate();
        let mut store = store(&fabric);
        let start = tokio::time::Instant::now();
        let outcome = split_ports(&mut store, Duration::from_secs(10)).await.unwrap();
        assert_eq!(outcome, Outcome::Modified);
        assert!(start.elapsed() >= Duration::from_secs(10));

        CallVerifier::mutations(&fabric)
            .assert_sequence(&[
                ("leaf1", "port-config-modify port 49 disable"),
                ("leaf1", "port-config-modify port 49 speed 10g"),
                ("leaf1", "port-config-modify port 49-52 enable"),
            ])
            .unwrap();
        let leaf1 = fabric.switch("leaf1").unwrap();
        assert!(leaf1.port_enabled(51));
        assert_eq!(leaf1.ports[&49].speed, "10g");
        assert_eq!(leaf1.ports[&53].speed, "40g");

        // Nothing left at 40g outside LLDP.
        assert_eq!(split_ports(&mut store, Duration::from_secs(10)).await.unwrap(), Outcome::AlreadyPresent);
    }
}
