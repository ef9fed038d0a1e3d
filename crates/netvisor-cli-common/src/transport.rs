//! Transports that execute one CLI argv on one switch.
//!
//! A transport never retries and never interprets output; classification
//! belongs to [`crate::parser`].

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{CliError, CliResult};

/// Path to the Netvisor CLI on the switch.
pub const CLI_PATH: &str = "/usr/bin/cli";

/// Path to the `ssh` client used by [`SshTransport`].
pub const SSH_CMD: &str = "ssh";

/// Regex for characters that need escaping in shell double-quotes.
/// Matches: $, `, ", \, and newline
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Quotes a string for safe use on a remote shell command line.
///
/// ```
/// use netvisor_cli_common::transport::shellquote;
///
/// assert_eq!(shellquote("spine1"), "\"spine1\"");
/// assert_eq!(shellquote("pa$$"), "\"pa\\$\\$\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Raw result of one CLI invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOutput {
    /// Exit code (0 = success, -1 when killed by a signal).
    pub exit_code: i32,
    /// Trimmed stdout.
    pub stdout: String,
    /// Trimmed stderr.
    pub stderr: String,
}

impl CliOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns true when the CLI exited zero and wrote nothing to stderr.
    pub fn success(&self) -> bool {
        self.exit_code == 0 && self.stderr.is_empty()
    }
}

/// Executes a single CLI invocation against a switch.
///
/// `host` names the switch the invocation is addressed to; `argv` is the
/// complete command line starting with [`CLI_PATH`].
#[async_trait]
pub trait CliTransport: Send + Sync {
    async fn invoke(&self, host: &str, argv: &[String]) -> CliResult<CliOutput>;
}

async fn run(host: &str, mut command: Command) -> CliResult<CliOutput> {
    let output = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| CliError::Spawn {
            host: host.to_string(),
            source: e,
        })?;

    Ok(CliOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Runs the CLI on the local machine, for provisioning executed on the switch itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTransport;

#[async_trait]
impl CliTransport for LocalTransport {
    async fn invoke(&self, host: &str, argv: &[String]) -> CliResult<CliOutput> {
        let Some((program, args)) = argv.split_first() else {
            return Ok(CliOutput::failed("empty command line"));
        };
        let mut command = Command::new(program);
        command.args(args);
        run(host, command).await
    }
}

/// Runs the CLI on a remote switch through the system `ssh` client.
#[derive(Debug, Clone, Default)]
pub struct SshTransport {
    /// Login user; when unset ssh picks its configured default.
    pub user: Option<String>,
    /// Extra options passed before the destination (e.g. `-o BatchMode=yes`).
    pub options: Vec<String>,
}

impl SshTransport {
    pub fn new(user: Option<String>, options: Vec<String>) -> Self {
        Self { user, options }
    }

    /// Destination argument for `host`.
    pub fn destination(&self, host: &str) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, host),
            None => host.to_string(),
        }
    }

    /// Remote command line with every token quoted.
    pub fn remote_command(argv: &[String]) -> String {
        argv.iter()
            .map(|token| shellquote(token))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl CliTransport for SshTransport {
    async fn invoke(&self, host: &str, argv: &[String]) -> CliResult<CliOutput> {
        let mut command = Command::new(SSH_CMD);
        command
            .args(&self.options)
            .arg(self.destination(host))
            .arg(Self::remote_command(argv));
        run(host, command).await
    }
}
