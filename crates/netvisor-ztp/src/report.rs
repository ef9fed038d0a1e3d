//! Per-switch run report.
//!
//! Phases and fabric-wide steps append one [`TaskRecord`] per task. The
//! report is shared by every runner of a run; writes go through one lock.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ZtpError;
use crate::types::Outcome;

/// One completed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRecord {
    pub task: String,
    pub output: String,
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Failure {
    task: String,
    msg: String,
    exception: String,
    unreachable: bool,
}

#[derive(Debug, Clone, Default)]
struct SwitchReport {
    tasks: Vec<TaskRecord>,
    failure: Option<Failure>,
}

/// Result envelope of one switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    pub switch: String,
    pub output: Vec<String>,
    pub changed: bool,
    pub failed: bool,
    pub unreachable: bool,
    pub task: String,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    pub summary: Vec<TaskRecord>,
}

/// Shared report of a run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    switches: Arc<Mutex<BTreeMap<String, SwitchReport>>>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a task outcome for `switch`.
    pub fn record(&self, switch: &str, task: &str, output: impl Into<String>, outcome: Outcome) {
        self.switches
            .lock()
            .entry(switch.to_string())
            .or_default()
            .tasks
            .push(TaskRecord {
                task: task.to_string(),
                output: output.into(),
                changed: outcome.changed(),
            });
    }

    /// Marks `switch` failed in `task`. Only the first failure is kept.
    pub fn fail(&self, switch: &str, task: &str, error: &ZtpError) {
        let mut switches = self.switches.lock();
        let entry = switches.entry(switch.to_string()).or_default();
        if entry.failure.is_some() {
            return;
        }
        entry.failure = Some(Failure {
            task: task.to_string(),
            msg: format!("{} failed: {}", task, error.kind().as_str()),
            exception: error.detail(),
            unreachable: error.is_unreachable(),
        });
    }

    /// True when any task on `switch` changed state.
    pub fn changed(&self, switch: &str) -> bool {
        self.switches
            .lock()
            .get(switch)
            .is_some_and(|r| r.tasks.iter().any(|t| t.changed))
    }

    pub fn has_failures(&self) -> bool {
        self.switches.lock().values().any(|r| r.failure.is_some())
    }

    /// Tasks recorded for `switch`, in order.
    pub fn tasks(&self, switch: &str) -> Vec<TaskRecord> {
        self.switches
            .lock()
            .get(switch)
            .map(|r| r.tasks.clone())
            .unwrap_or_default()
    }

    /// One envelope per switch, ordered by switch name.
    pub fn envelopes(&self) -> Vec<Envelope> {
        self.switches
            .lock()
            .iter()
            .map(|(switch, report)| {
                let changed = report.tasks.iter().any(|t| t.changed);
                let output = report
                    .tasks
                    .iter()
                    .filter(|t| t.changed)
                    .map(|t| format!("{}: {}", switch, t.output))
                    .collect();
                match &report.failure {
                    Some(failure) => Envelope {
                        switch: switch.clone(),
                        output,
                        changed,
                        failed: true,
                        unreachable: failure.unreachable,
                        task: failure.task.clone(),
                        msg: failure.msg.clone(),
                        exception: Some(failure.exception.clone()),
                        summary: report.tasks.clone(),
                    },
                    None => Envelope {
                        switch: switch.clone(),
                        output,
                        changed,
                        failed: false,
                        unreachable: false,
                        task: report
                            .tasks
                            .last()
                            .map(|t| t.task.clone())
                            .unwrap_or_default(),
                        msg: if changed {
                            "Provisioning completed".to_string()
                        } else {
                            "Nothing to change".to_string()
                        },
                        exception: None,
                        summary: report.tasks.clone(),
                    },
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netvisor_cli_common::CliError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_changed_is_or_of_tasks() {
        let report = RunReport::new();
        report.record("leaf1", "Accept EULA", "EULA already accepted", Outcome::AlreadyPresent);
        assert!(!report.changed("leaf1"));
        report.record("leaf1", "Create VLAN", "Created VLAN 100", Outcome::Created);
        assert!(report.changed("leaf1"));
        assert!(!report.changed("leaf2"));
    }

    #[test]
    fn test_failure_envelope_keeps_prior_steps() {
        let report = RunReport::new();
        report.record("leaf1", "Rename", "Renamed to leaf1", Outcome::Modified);
        let err = ZtpError::from(CliError::CommandFailed {
            host: "leaf1".into(),
            command: "fabric-join".into(),
            exit_code: 1,
            stderr: "fabric f1 not found".into(),
        });
        report.fail("leaf1", "Fabric", &err);
        report.fail("leaf1", "Later", &ZtpError::Cancelled);

        let envelopes = report.envelopes();
        assert_eq!(envelopes.len(), 1);
        let env = &envelopes[0];
        assert!(env.failed);
        assert!(env.changed);
        assert_eq!(env.task, "Fabric");
        assert_eq!(env.exception.as_deref(), Some("fabric f1 not found"));
        assert_eq!(env.summary.len(), 1);
        assert_eq!(env.output, vec!["leaf1: Renamed to leaf1".to_string()]);
    }

    #[test]
    fn test_envelope_json_shape() {
        let report = RunReport::new();
        report.record("spine1", "Fabric", "Created fabric f1", Outcome::Created);
        let json = serde_json::to_value(report.envelopes()).unwrap();
        assert_eq!(json[0]["switch"], "spine1");
        assert_eq!(json[0]["changed"], true);
        assert_eq!(json[0]["failed"], false);
        assert!(json[0].get("exception").is_none());
        assert_eq!(json[0]["summary"][0]["task"], "Fabric");
    }
}
