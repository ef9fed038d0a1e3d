//! Shared helpers for the provisioning integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use tempfile::TempDir;

use netvisor_ztp::{FabricPlan, Provisioner, RunSummary, TaskRecord, ZtpConfig, ZtpResult};
use netvisor_ztp_test::{SimFabric, FIXTURE_PASSWORD};

fn quote(list: &[&str]) -> String {
    list.iter()
        .map(|s| format!("\"{}\"", s))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Configuration text for fabric `f1`; `extra` holds top-level keys only.
pub fn config_text(spines: &[&str], leaves: &[&str], extra: &str) -> String {
    format!(
        "fabric_name = \"f1\"\npassword = \"{}\"\nsplit_settle_secs = 0\nspine_list = [{}]\nleaf_list = [{}]\n{}\n",
        FIXTURE_PASSWORD,
        quote(spines),
        quote(leaves),
        extra
    )
}

pub fn plan(spines: &[&str], leaves: &[&str], extra: &str) -> FabricPlan {
    let config = ZtpConfig::from_toml_str(&config_text(spines, leaves, extra), None).unwrap();
    FabricPlan::from_config(config).unwrap()
}

/// Configuration text plus an `[inputs]` section whose CSV files are
/// written to a temporary directory.
///
/// `inputs` pairs an `[inputs]` key (`vrrp_csv`) with the file content;
/// `section` holds further `[inputs]` keys such as `ospf_switch`.
pub fn config_with_inputs(
    spines: &[&str],
    leaves: &[&str],
    extra: &str,
    section: &str,
    inputs: &[(&str, &str)],
) -> (TempDir, ZtpResult<FabricPlan>) {
    let dir = tempfile::tempdir().unwrap();
    let mut text = config_text(spines, leaves, extra);
    text.push_str("[inputs]\n");
    text.push_str(section);
    text.push('\n');
    for (key, content) in inputs {
        let file = format!("{}.csv", key);
        std::fs::write(dir.path().join(&file), content).unwrap();
        text.push_str(&format!("{} = \"{}\"\n", key, file));
    }
    let plan = ZtpConfig::from_toml_str(&text, Some(dir.path())).and_then(FabricPlan::from_config);
    (dir, plan)
}

/// Like [`config_with_inputs`] without extra `[inputs]` keys; fails the
/// test on invalid input.
pub fn plan_with_inputs(
    spines: &[&str],
    leaves: &[&str],
    extra: &str,
    inputs: &[(&str, &str)],
) -> (TempDir, FabricPlan) {
    let (dir, plan) = config_with_inputs(spines, leaves, extra, "", inputs);
    (dir, plan.unwrap())
}

pub async fn provision(fabric: &SimFabric, plan: FabricPlan) -> RunSummary {
    Provisioner::new(plan, Arc::new(fabric.clone())).run().await
}

/// Like [`provision`] but fails the test on any error.
pub async fn provision_ok(fabric: &SimFabric, plan: FabricPlan) -> RunSummary {
    let summary = provision(fabric, plan).await;
    assert!(summary.succeeded(), "run failed: {:?}", summary.error);
    summary
}

pub fn task(summary: &RunSummary, switch: &str, task: &str) -> Option<TaskRecord> {
    summary
        .report
        .tasks(switch)
        .into_iter()
        .find(|t| t.task == task)
}
