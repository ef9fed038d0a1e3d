//! Per-switch phase sequence.
//!
//! A [`PhaseRunner`] owns one switch's session and fact store and walks
//! [`Phase::ALL`] in order. Each phase reads its facts fresh, mutates only on
//! divergence and records one task in the run report. The first error stops
//! the switch; the report keeps every task that completed before it.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

use netvisor_cli_common::CliSession;
use netvisor_types::PortList;

use crate::address;
use crate::commands::*;
use crate::error::{ZtpError, ZtpResult};
use crate::facts::{FactKind, FactStore, PortFilter};
use crate::plan::FabricPlan;
use crate::report::RunReport;
use crate::split40g;
use crate::types::{Outcome, Switch};

/// Per-switch phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Eula,
    Rename,
    StaticSetup,
    Fabric,
    ControlNetwork,
    WebApi,
    StpOff,
    PortsUp,
    Split40g,
    InbandIp,
    StpOn,
}

impl Phase {
    pub const ALL: [Phase; 11] = [
        Phase::Eula,
        Phase::Rename,
        Phase::StaticSetup,
        Phase::Fabric,
        Phase::ControlNetwork,
        Phase::WebApi,
        Phase::StpOff,
        Phase::PortsUp,
        Phase::Split40g,
        Phase::InbandIp,
        Phase::StpOn,
    ];

    /// Task name used in the report.
    pub const fn name(&self) -> &'static str {
        match self {
            Phase::Eula => "Accept EULA",
            Phase::Rename => "Rename switch",
            Phase::StaticSetup => "Static setup",
            Phase::Fabric => "Create or join fabric",
            Phase::ControlNetwork => "Configure control network",
            Phase::WebApi => "Enable web API",
            Phase::StpOff => "Disable STP",
            Phase::PortsUp => "Enable ports",
            Phase::Split40g => "Split 40g ports",
            Phase::InbandIp => "Assign in-band IP",
            Phase::StpOn => "Enable STP",
        }
    }
}

/// State shared by the runners of one run.
#[derive(Debug, Clone)]
pub struct PhaseContext {
    pub plan: Arc<FabricPlan>,
    pub report: RunReport,
    /// Serializes fabric create/join so only one switch creates the fabric.
    fabric_gate: Arc<Mutex<()>>,
}

impl PhaseContext {
    pub fn new(plan: Arc<FabricPlan>, report: RunReport) -> Self {
        Self {
            plan,
            report,
            fabric_gate: Arc::new(Mutex::new(())),
        }
    }
}

/// Port changes still pending on a switch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PortWork {
    enable: PortList,
    split: bool,
}

impl PortWork {
    fn is_empty(&self) -> bool {
        self.enable.is_empty() && !self.split
    }
}

type PhaseResult = ZtpResult<(Outcome, String)>;

/// Runs the phase sequence on one switch.
#[derive(Debug)]
pub struct PhaseRunner {
    switch: Switch,
    store: FactStore,
    ctx: PhaseContext,
}

impl PhaseRunner {
    /// `session` must address the switch itself (`switch-local`).
    pub fn new(switch: Switch, session: CliSession, ctx: PhaseContext) -> Self {
        let store = FactStore::new(switch.name.clone(), session);
        Self { switch, store, ctx }
    }

    pub fn switch(&self) -> &str {
        &self.switch.name
    }

    /// Runs every phase; stops at the first error.
    #[instrument(skip(self), fields(switch = %self.switch.name))]
    pub async fn run(mut self) -> ZtpResult<()> {
        for phase in Phase::ALL {
            let result = if self.store.session().cancellation().is_cancelled() {
                Err(ZtpError::Cancelled)
            } else {
                self.store.refresh();
                debug!("Starting phase {}", phase.name());
                self.run_phase(phase).await
            };
            match result {
                Ok((outcome, output)) => {
                    self.ctx
                        .report
                        .record(&self.switch.name, phase.name(), output, outcome);
                }
                Err(err) => {
                    error!("Phase {} failed on {}: {}", phase.name(), self.switch.name, err);
                    self.ctx.report.fail(&self.switch.name, phase.name(), &err);
                    return Err(err);
                }
            }
        }
        info!("Switch {} completed all phases", self.switch.name);
        Ok(())
    }

    async fn run_phase(&mut self, phase: Phase) -> PhaseResult {
        match phase {
            Phase::Eula => self.accept_eula().await,
            Phase::Rename => self.rename().await,
            Phase::StaticSetup => self.static_setup().await,
            Phase::Fabric => self.create_or_join_fabric().await,
            Phase::ControlNetwork => self.control_network().await,
            Phase::WebApi => self.enable_web_api().await,
            Phase::StpOff => self.disable_stp().await,
            Phase::PortsUp => self.enable_ports().await,
            Phase::Split40g => self.split_40g().await,
            Phase::InbandIp => self.assign_inband_ip().await,
            Phase::StpOn => self.enable_stp().await,
        }
    }

    async fn accept_eula(&mut self) -> PhaseResult {
        if self.store.eula_accepted().await? {
            return Ok((Outcome::AlreadyPresent, "EULA already accepted".to_string()));
        }
        let password = self
            .ctx
            .plan
            .config
            .password
            .as_deref()
            .ok_or_else(|| ZtpError::invalid_config("password", "required to accept the EULA"))?;
        self.store
            .mutate(&build_eula_accept(password), FactKind::Setup)
            .await?;
        info!("Accepted EULA on {}", self.switch.name);
        Ok((Outcome::Created, "EULA accepted".to_string()))
    }

    async fn rename(&mut self) -> PhaseResult {
        let values = self.store.setup_values(&["switch-name"]).await?;
        let current = values.get("switch-name").cloned().unwrap_or_default();
        if current == self.switch.name {
            return Ok((Outcome::AlreadyPresent, format!("Switch already named {}", current)));
        }
        let request = build_switch_setup_modify(&[("switch-name", self.switch.name.clone())]);
        self.store.mutate(&request, FactKind::Setup).await?;
        info!("Renamed {} to {}", current, self.switch.name);
        Ok((Outcome::Modified, format!("Renamed {} to {}", current, self.switch.name)))
    }

    async fn static_setup(&mut self) -> PhaseResult {
        let config = &self.ctx.plan.config;
        if !config.static_setup {
            return Ok((Outcome::AlreadyPresent, "Static setup not requested".to_string()));
        }
        let wanted = config.static_setup_fields();
        let keys: Vec<&str> = wanted.iter().map(|(k, _)| *k).collect();
        let current: BTreeMap<String, String> = self.store.setup_values(&keys).await?;
        let changes: Vec<(&str, String)> = wanted
            .iter()
            .filter(|(k, v)| current.get(*k) != Some(v))
            .cloned()
            .collect();
        if changes.is_empty() {
            return Ok((Outcome::AlreadyPresent, "Static setup already applied".to_string()));
        }
        self.store
            .mutate(&build_switch_setup_modify(&changes), FactKind::Setup)
            .await?;
        let fields: Vec<&str> = changes.iter().map(|(k, _)| *k).collect();
        info!("Applied static setup on {}: {}", self.switch.name, fields.join(", "));
        Ok((Outcome::Modified, format!("Set {}", fields.join(", "))))
    }

    async fn create_or_join_fabric(&mut self) -> PhaseResult {
        let gate = Arc::clone(&self.ctx.fabric_gate);
        let _guard = gate.lock().await;
        let plan = Arc::clone(&self.ctx.plan);
        let name = plan.config.fabric_name.as_str();

        // Another runner may have created the fabric while we waited.
        self.store.invalidate(FactKind::Fabric);
        if let Some(info) = self.store.fabric_info().await? {
            if info.name == name {
                return Ok((Outcome::AlreadyPresent, format!("Already in fabric {}", name)));
            }
            return Err(ZtpError::topology(format!(
                "{} is in fabric {}, expected {}",
                self.switch.name, info.name, name
            )));
        }

        if self.store.fabric_names().await?.iter().any(|f| f == name) {
            self.store
                .mutate(&build_fabric_join(name), FactKind::Fabric)
                .await?;
            info!("{} joined fabric {}", self.switch.name, name);
            return Ok((Outcome::Created, format!("Joined fabric {}", name)));
        }

        let managed = plan.managed_names();
        if managed.len() == 2 {
            if let Some(other) = managed.iter().find(|m| **m != self.switch.name) {
                let connected = self
                    .store
                    .lldp_neighbors()
                    .await?
                    .iter()
                    .any(|e| e.peer_switch == *other);
                if !connected {
                    return Err(ZtpError::SwitchesNotConnected {
                        first: self.switch.name.clone(),
                        second: other.clone(),
                    });
                }
            }
        }
        let request = build_fabric_create(
            name,
            plan.config.fabric_network,
            plan.config.control_network,
        );
        self.store.mutate(&request, FactKind::Fabric).await?;
        info!("{} created fabric {}", self.switch.name, name);
        Ok((Outcome::Created, format!("Created fabric {}", name)))
    }

    async fn control_network(&mut self) -> PhaseResult {
        let wanted = self.ctx.plan.config.control_network;
        let info = self.store.fabric_info().await?.ok_or_else(|| {
            ZtpError::topology(format!("{} is not in a fabric", self.switch.name))
        })?;
        if info.control_network == wanted.as_str() {
            return Ok((Outcome::AlreadyPresent, format!("Control network already {}", wanted)));
        }
        self.store
            .mutate(&build_control_network_modify(wanted), FactKind::Fabric)
            .await?;
        info!("Set control network {} on {}", wanted, self.switch.name);
        Ok((Outcome::Modified, format!("Control network set to {}", wanted)))
    }

    async fn enable_web_api(&mut self) -> PhaseResult {
        if self.store.web_enabled().await? {
            return Ok((Outcome::AlreadyPresent, "Web API already enabled".to_string()));
        }
        self.store
            .mutate(&build_web_enable(), FactKind::Services)
            .await?;
        info!("Enabled web API on {}", self.switch.name);
        Ok((Outcome::Modified, "Web API enabled".to_string()))
    }

    async fn port_work(&mut self) -> ZtpResult<PortWork> {
        let reserved = if self.ctx.plan.config.toggle_40g {
            split40g::reserved_sub_ports(&mut self.store).await?
        } else {
            PortList::new()
        };
        let disabled: PortList = self
            .store
            .ports(PortFilter::Enabled(false))
            .await?
            .into_iter()
            .map(|p| p.port)
            .collect();
        Ok(PortWork {
            enable: disabled.difference(&reserved),
            split: !reserved.is_empty(),
        })
    }

    async fn disable_stp(&mut self) -> PhaseResult {
        if self.port_work().await?.is_empty() {
            return Ok((Outcome::AlreadyPresent, "No port changes pending".to_string()));
        }
        if !self.store.stp_enabled().await? {
            return Ok((Outcome::AlreadyPresent, "STP already disabled".to_string()));
        }
        self.store
            .mutate(&build_stp_modify(false), FactKind::Services)
            .await?;
        info!("Disabled STP on {}", self.switch.name);
        Ok((Outcome::Modified, "STP disabled".to_string()))
    }

    async fn enable_ports(&mut self) -> PhaseResult {
        let work = self.port_work().await?;
        if work.enable.is_empty() {
            return Ok((Outcome::AlreadyPresent, "All ports enabled".to_string()));
        }
        self.store
            .mutate(&build_port_enable(&work.enable, true), FactKind::Ports)
            .await?;
        self.store.invalidate(FactKind::Lldp);
        info!("Enabled ports {} on {}", work.enable, self.switch.name);
        Ok((Outcome::Modified, format!("Enabled ports {}", work.enable)))
    }

    async fn split_40g(&mut self) -> PhaseResult {
        let config = &self.ctx.plan.config;
        if !config.toggle_40g {
            return Ok((Outcome::AlreadyPresent, "40g split not requested".to_string()));
        }
        let settle = config.split_settle();
        let outcome = split40g::split_ports(&mut self.store, settle).await?;
        let output = match outcome {
            Outcome::AlreadyPresent => "No 40g ports to split",
            _ => "Split 40g ports to 10g",
        };
        Ok((outcome, output.to_string()))
    }

    async fn assign_inband_ip(&mut self) -> PhaseResult {
        let ip = address::inband(self.ctx.plan.config.inband_ip, self.switch.global_index)?;
        let current = self.store.setup_values(&["in-band-ip"]).await?;
        if current.get("in-band-ip") == Some(&ip.to_string()) {
            return Ok((Outcome::AlreadyPresent, format!("In-band IP already {}", ip)));
        }
        let request = build_switch_setup_modify(&[("in-band-ip", ip.to_string())]);
        self.store.mutate(&request, FactKind::Setup).await?;
        info!("Assigned in-band IP {} to {}", ip, self.switch.name);
        Ok((Outcome::Modified, format!("In-band IP set to {}", ip)))
    }

    async fn enable_stp(&mut self) -> PhaseResult {
        if !self.ctx.plan.config.stp {
            return Ok((Outcome::AlreadyPresent, "STP re-enable not requested".to_string()));
        }
        if self.store.stp_enabled().await? {
            return Ok((Outcome::AlreadyPresent, "STP already enabled".to_string()));
        }
        self.store
            .mutate(&build_stp_modify(true), FactKind::Services)
            .await?;
        info!("Enabled STP on {}", self.switch.name);
        Ok((Outcome::Modified, "STP enabled".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZtpConfig;
    use netvisor_cli_common::Scope;
    use netvisor_ztp_test::{factory_fresh_switch, single_switch, unconnected_pair, CallVerifier, SimFabric};
    use pretty_assertions::assert_eq;

    fn context(spines: &[&str], leaves: &[&str], extra: &str) -> PhaseContext {
        let quote = |list: &[&str]| {
            list.iter()
                .map(|s| format!("\"{}\"", s))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let toml = format!(
            "fabric_name = \"f1\"\npassword = \"test123\"\nsplit_settle_secs = 0\nspine_list = [{}]\nleaf_list = [{}]\n{}",
            quote(spines),
            quote(leaves),
            extra
        );
        let config = ZtpConfig::from_toml_str(&toml, None).unwrap();
        PhaseContext::new(Arc::new(FabricPlan::from_config(config).unwrap()), RunReport::new())
    }

    fn runner(fabric: &SimFabric, ctx: &PhaseContext, host: &str) -> PhaseRunner {
        let switch = ctx.plan.inventory.get(host).unwrap().clone();
        let session = CliSession::new(host, Arc::new(fabric.clone())).with_scope(Scope::Local);
        PhaseRunner::new(switch, session, ctx.clone())
    }

    #[tokio::test]
    async fn test_factory_switch_full_sequence() {
        let fabric = factory_fresh_switch("leaf1");
        let ctx = context(&[], &["leaf1"], "");
        runner(&fabric, &ctx, "leaf1").run().await.unwrap();

        CallVerifier::mutations(&fabric)
            .assert_sequence(&[
                ("leaf1", "switch-setup-modify password test123 eula-accepted true"),
                ("leaf1", "switch-setup-modify switch-name leaf1"),
                ("leaf1", "fabric-create name f1"),
                ("leaf1", "admin-service-modify if mgmt web"),
                ("leaf1", "switch-setup-modify in-band-ip 172.16.0.1/24"),
            ])
            .unwrap();
        let sw = fabric.switch("leaf1").unwrap();
        assert_eq!(sw.fabric.as_deref(), Some("f1"));
        assert_eq!(sw.switch_name, "leaf1");
        let tasks = ctx.report.tasks("leaf1");
        assert_eq!(tasks.len(), Phase::ALL.len());
        assert!(ctx.report.changed("leaf1"));
    }

    #[tokio::test]
    async fn test_second_run_changes_nothing() {
        let fabric = single_switch("spine1");
        let ctx = context(&["spine1"], &[], "");
        runner(&fabric, &ctx, "spine1").run().await.unwrap();
        fabric.clear_calls();

        let again = context(&["spine1"], &[], "");
        runner(&fabric, &again, "spine1").run().await.unwrap();
        CallVerifier::new(&fabric).assert_no_mutations().unwrap();
        assert!(!again.report.changed("spine1"));
    }

    #[tokio::test]
    async fn test_missing_password_stops_at_eula() {
        let fabric = factory_fresh_switch("leaf1");
        let toml = "fabric_name = \"f1\"\nleaf_list = [\"leaf1\"]\n";
        let config = ZtpConfig::from_toml_str(toml, None).unwrap();
        let ctx = PhaseContext::new(Arc::new(FabricPlan::from_config(config).unwrap()), RunReport::new());
        let err = runner(&fabric, &ctx, "leaf1").run().await.unwrap_err();
        assert!(matches!(err, ZtpError::InvalidConfig { .. }));
        let envelopes = ctx.report.envelopes();
        assert!(envelopes[0].failed);
        assert_eq!(envelopes[0].task, "Accept EULA");
    }

    #[tokio::test]
    async fn test_unconnected_pair_is_refused() {
        let fabric = unconnected_pair();
        let ctx = context(&["spine1"], &["leaf1"], "");
        let err = runner(&fabric, &ctx, "spine1").run().await.unwrap_err();
        assert!(matches!(err, ZtpError::SwitchesNotConnected { .. }));
        CallVerifier::new(&fabric)
            .assert_not_called("spine1", "fabric-create")
            .unwrap();
    }

    #[tokio::test]
    async fn test_foreign_fabric_is_topology_error() {
        let fabric = single_switch("spine1");
        fabric.join_all("other");
        let ctx = context(&["spine1"], &[], "");
        let err = runner(&fabric, &ctx, "spine1").run().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TopologyInvalid);
    }

    #[tokio::test]
    async fn test_disabled_ports_are_enabled_under_stp_off() {
        let fabric = SimFabric::builder()
            .switch_with(netvisor_ztp_test::SimSwitch::new("leaf1").with_disabled_ports(&[5, 6, 7]))
            .build();
        let ctx = context(&[], &["leaf1"], "stp = true\n");
        runner(&fabric, &ctx, "leaf1").run().await.unwrap();
        CallVerifier::mutations(&fabric)
            .assert_sequence(&[
                ("leaf1", "stp-modify disable"),
                ("leaf1", "port-config-modify port 5-7 enable"),
                ("leaf1", "stp-modify enable"),
            ])
            .unwrap();
    }

    #[tokio::test]
    async fn test_static_setup_sends_only_diverging_fields() {
        let fabric = single_switch("leaf1");
        let ctx = context(
            &[],
            &["leaf1"],
            "static_setup = true\ndns_ip = \"10.1.1.53\"\nntp_server = \"10.1.1.123\"\n",
        );
        runner(&fabric, &ctx, "leaf1").run().await.unwrap();
        CallVerifier::mutations(&fabric)
            .assert_called("leaf1", "switch-setup-modify dns-ip 10.1.1.53 ntp-server 10.1.1.123")
            .unwrap();
    }
}
