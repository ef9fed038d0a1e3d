//! One provisioning run: per-switch phases in parallel, then the fabric-wide
//! stages through a single anchor switch.

use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use netvisor_cli_common::{CliSession, CliTransport, Scope};

use crate::error::{ZtpError, ZtpResult};
use crate::orchestrator::FabricOrchestrator;
use crate::phases::{PhaseContext, PhaseRunner};
use crate::plan::FabricPlan;
use crate::report::RunReport;

/// Outcome of [`Provisioner::run`].
#[derive(Debug)]
pub struct RunSummary {
    pub report: RunReport,
    /// First error of the run, if any.
    pub error: Option<ZtpError>,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Drives a [`FabricPlan`] over a transport.
pub struct Provisioner {
    plan: Arc<FabricPlan>,
    transport: Arc<dyn CliTransport>,
    cancel: CancellationToken,
}

impl Provisioner {
    pub fn new(plan: FabricPlan, transport: Arc<dyn CliTransport>) -> Self {
        Self {
            plan: Arc::new(plan),
            transport,
            cancel: CancellationToken::new(),
        }
    }

    /// Runs under `cancel` instead of a private token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn plan(&self) -> &FabricPlan {
        &self.plan
    }

    /// Session addressing `host` itself.
    fn session(&self, host: &str) -> CliSession {
        let config = &self.plan.config;
        CliSession::new(host, Arc::clone(&self.transport))
            .with_scope(Scope::Local)
            .with_credentials(config.credentials())
            .with_timeout(config.command_timeout())
            .with_cancellation(self.cancel.clone())
    }

    /// Runs the whole plan and returns the report.
    ///
    /// Fabric-wide stages start only once every managed switch finished its
    /// phases; a single failed switch skips them.
    #[instrument(skip(self), fields(fabric = %self.plan.config.fabric_name))]
    pub async fn run(&self) -> RunSummary {
        let report = RunReport::new();
        let error = self.run_inner(&report).await.err();
        RunSummary { report, error }
    }

    async fn run_inner(&self, report: &RunReport) -> ZtpResult<()> {
        let managed: Vec<_> = self.plan.managed_switches().into_iter().cloned().collect();
        let Some(anchor) = managed.first().map(|s| s.name.clone()) else {
            warn!("No managed switches; nothing to do");
            return Ok(());
        };
        info!("Provisioning {} switches", managed.len());

        let ctx = PhaseContext::new(Arc::clone(&self.plan), report.clone());
        let mut runners = JoinSet::new();
        for switch in managed {
            let session = self.session(&switch.name);
            let runner = PhaseRunner::new(switch, session, ctx.clone());
            runners.spawn(runner.run());
        }

        let mut first_error = None;
        while let Some(joined) = runners.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(ZtpError::internal(format!("phase task failed: {}", e))));
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }
        if let Some(err) = first_error {
            error!("Per-switch phases failed; skipping fabric-wide stages");
            return Err(err);
        }

        let orchestrator = FabricOrchestrator::new(Arc::clone(&self.plan), report.clone(), self.session(&anchor));
        orchestrator.run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZtpConfig;
    use netvisor_ztp_test::factory_fresh_switch;

    fn plan(toml: &str) -> FabricPlan {
        FabricPlan::from_config(ZtpConfig::from_toml_str(toml, None).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_single_switch_skips_fabric_stages() {
        let fabric = factory_fresh_switch("leaf1");
        let provisioner = Provisioner::new(
            plan("fabric_name = \"f1\"\npassword = \"test123\"\nsplit_settle_secs = 0\nleaf_list = [\"leaf1\"]\n"),
            Arc::new(fabric.clone()),
        );
        let summary = provisioner.run().await;
        assert!(summary.succeeded(), "{:?}", summary.error);
        assert!(summary.report.changed("leaf1"));
        assert!(summary
            .report
            .tasks("leaf1")
            .iter()
            .all(|t| !t.task.starts_with("Verify")));
    }

    #[tokio::test]
    async fn test_cancelled_run_reports_cancellation() {
        let fabric = factory_fresh_switch("leaf1");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let provisioner = Provisioner::new(
            plan("fabric_name = \"f1\"\npassword = \"test123\"\nsplit_settle_secs = 0\nleaf_list = [\"leaf1\"]\n"),
            Arc::new(fabric),
        )
        .with_cancellation(cancel);
        let summary = provisioner.run().await;
        assert!(matches!(summary.error, Some(ZtpError::Cancelled)));
        let envelopes = summary.report.envelopes();
        assert_eq!(envelopes.len(), 1);
        assert!(envelopes[0].failed);
        assert_eq!(envelopes[0].task, "Accept EULA");
    }
}
