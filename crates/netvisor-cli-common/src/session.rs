//! Per-switch CLI sessions.
//!
//! A [`CliSession`] carries everything needed to address one switch:
//! transport host, scoping prefix, credentials, per-command deadline and the
//! run's cancellation token. Requests are built with [`CliRequest`] and the
//! session turns them into a full argv:
//!
//! ```text
//! /usr/bin/cli --quiet [--user u:p] [switch <name> | switch-local] <command> <args...>
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{CliError, CliResult};
use crate::parser::{self, MutationOutcome, Response};
use crate::transport::{CliTransport, CLI_PATH};

/// Default per-command deadline.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Argument names whose values are never logged.
const SECRET_KEYS: &[&str] = &["password", "--user"];

/// Scoping prefix placed before the command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Scope {
    /// No prefix; the command runs wherever the CLI defaults it.
    #[default]
    Unscoped,
    /// `switch-local`
    Local,
    /// `switch <name>`, routed through the fabric to another member.
    Switch(String),
}

impl Scope {
    fn tokens(&self) -> Vec<String> {
        match self {
            Scope::Unscoped => Vec::new(),
            Scope::Local => vec!["switch-local".to_string()],
            Scope::Switch(name) => vec!["switch".to_string(), name.clone()],
        }
    }
}

/// CLI login credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Credentials are only used when both parts are supplied.
    pub fn from_parts(username: Option<String>, password: Option<String>) -> Option<Self> {
        match (username, password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some(Self { username, password })
            }
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// One CLI command with its arguments and output options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliRequest {
    command: String,
    args: Vec<String>,
    format: Vec<String>,
    no_show_headers: bool,
    count_output: bool,
    may_fail: bool,
    setup: bool,
    script_password: bool,
}

impl CliRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Appends `key value`.
    pub fn arg(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.args.push(key.to_string());
        self.args.push(value.to_string());
        self
    }

    /// Appends `key value` when `value` is present.
    pub fn arg_opt<V: fmt::Display>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.arg(key, value),
            None => self,
        }
    }

    /// Appends a bare keyword such as `enable` or `next-hop-self`.
    pub fn flag(mut self, keyword: &str) -> Self {
        self.args.push(keyword.to_string());
        self
    }

    /// Appends `keyword` when `on` is true.
    pub fn flag_if(self, keyword: &str, on: bool) -> Self {
        if on {
            self.flag(keyword)
        } else {
            self
        }
    }

    /// Requests the given output columns, in order.
    pub fn format(mut self, columns: &[&str]) -> Self {
        self.format = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn no_show_headers(mut self) -> Self {
        self.no_show_headers = true;
        self
    }

    pub fn count_output(mut self) -> Self {
        self.count_output = true;
        self
    }

    /// Marks the request as expected to fail when the entity is absent;
    /// stderr then yields [`Response::Error`] instead of an error.
    pub fn may_fail(mut self) -> Self {
        self.may_fail = true;
        self
    }

    /// Runs through the setup CLI (`--skip-setup`), without scope or login.
    pub fn setup(mut self) -> Self {
        self.setup = true;
        self
    }

    /// Adds `--script-password` to a setup request.
    pub fn script_password(mut self) -> Self {
        self.script_password = true;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn is_may_fail(&self) -> bool {
        self.may_fail
    }

    pub fn is_setup(&self) -> bool {
        self.setup
    }

    /// Command tokens without the CLI prefix.
    pub fn tokens(&self) -> Vec<String> {
        let mut tokens = Vec::with_capacity(self.args.len() + 4);
        tokens.push(self.command.clone());
        tokens.extend(self.args.iter().cloned());
        if !self.format.is_empty() {
            tokens.push("format".to_string());
            tokens.push(self.format.join(","));
        }
        if self.no_show_headers {
            tokens.push("no-show-headers".to_string());
        }
        if self.count_output {
            tokens.push("count-output".to_string());
        }
        tokens
    }
}

/// Renders an argv for logs with secret values masked.
pub fn redact(argv: &[String]) -> String {
    let mut out = Vec::with_capacity(argv.len());
    let mut mask_next = None;
    for token in argv {
        match mask_next.take() {
            Some("--user") => {
                let user = token.split(':').next().unwrap_or_default();
                out.push(format!("{}:****", user));
            }
            Some(_) => out.push("****".to_string()),
            None => {
                mask_next = SECRET_KEYS.iter().copied().find(|k| *k == token.as_str());
                out.push(token.clone());
            }
        }
    }
    out.join(" ")
}

/// A CLI session bound to one switch.
#[derive(Clone)]
pub struct CliSession {
    host: String,
    scope: Scope,
    credentials: Option<Credentials>,
    timeout: Duration,
    cancel: CancellationToken,
    transport: Arc<dyn CliTransport>,
}

impl fmt::Debug for CliSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CliSession")
            .field("host", &self.host)
            .field("scope", &self.scope)
            .field("credentials", &self.credentials)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CliSession {
    pub fn new(host: impl Into<String>, transport: Arc<dyn CliTransport>) -> Self {
        Self {
            host: host.into(),
            scope: Scope::Unscoped,
            credentials: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
            cancel: CancellationToken::new(),
            transport,
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Same transport host and settings, different scope.
    pub fn scoped(&self, scope: Scope) -> Self {
        self.clone().with_scope(scope)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Builds the full argv for `request`.
    pub fn argv(&self, request: &CliRequest) -> Vec<String> {
        let mut argv = vec![CLI_PATH.to_string(), "--quiet".to_string()];
        if request.is_setup() {
            argv.push("--skip-setup".to_string());
            if request.script_password {
                argv.push("--script-password".to_string());
            }
        } else {
            if let Some(credentials) = &self.credentials {
                argv.push("--user".to_string());
                argv.push(format!("{}:{}", credentials.username, credentials.password));
            }
            argv.extend(self.scope.tokens());
        }
        argv.extend(request.tokens());
        argv
    }

    /// Invokes `request` and classifies the output.
    ///
    /// Non-empty stderr is an error unless the request is marked
    /// [`CliRequest::may_fail`], in which case [`Response::Error`] is returned.
    pub async fn invoke(&self, request: &CliRequest) -> CliResult<Response> {
        if self.cancel.is_cancelled() {
            return Err(CliError::Cancelled);
        }

        let argv = self.argv(request);
        let rendered = redact(&argv);
        debug!(host = %self.host, command = %rendered, "Invoking CLI");

        let output = match tokio::time::timeout(
            self.timeout,
            self.transport.invoke(&self.host, &argv),
        )
        .await
        {
            Ok(output) => output?,
            Err(_) => {
                return Err(CliError::Timeout {
                    host: self.host.clone(),
                    command: rendered,
                    timeout: self.timeout,
                })
            }
        };

        let response = parser::classify(&output);
        match response {
            Response::Error(stderr) if !request.is_may_fail() => Err(CliError::CommandFailed {
                host: self.host.clone(),
                command: rendered,
                exit_code: output.exit_code,
                stderr,
            }),
            Response::Error(stderr) => {
                trace!(host = %self.host, command = %request.command(), %stderr, "Entity absent");
                Ok(Response::Error(stderr))
            }
            other => Ok(other),
        }
    }

    /// Invokes a query and returns its rows (none when absent).
    pub async fn rows(&self, request: &CliRequest) -> CliResult<Vec<Vec<String>>> {
        Ok(self.invoke(request).await?.into_rows())
    }

    /// Invokes a mutation and interprets its output.
    pub async fn mutate(&self, request: &CliRequest) -> CliResult<MutationOutcome> {
        let response = self.invoke(request).await?;
        parser::mutation_outcome(&response).ok_or_else(|| {
            let output = response
                .rows()
                .iter()
                .map(|row| row.join(" "))
                .collect::<Vec<_>>()
                .join("\n");
            CliError::unexpected_output(request.command(), output)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::CliOutput;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    /// Transport that replays canned outputs and records argv.
    #[derive(Default)]
    struct ScriptedTransport {
        outputs: Mutex<Vec<CliOutput>>,
        calls: Mutex<Vec<(String, Vec<String>)>>,
        delay: Option<Duration>,
    }

    impl ScriptedTransport {
        fn with_outputs(outputs: Vec<CliOutput>) -> Arc<Self> {
            let mut outputs = outputs;
            outputs.reverse();
            Arc::new(Self {
                outputs: Mutex::new(outputs),
                ..Self::default()
            })
        }
    }

    #[async_trait]
    impl CliTransport for ScriptedTransport {
        async fn invoke(&self, host: &str, argv: &[String]) -> CliResult<CliOutput> {
            self.calls.lock().push((host.to_string(), argv.to_vec()));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.outputs.lock().pop().unwrap_or_default())
        }
    }

    fn creds() -> Option<Credentials> {
        Credentials::from_parts(Some("network-admin".into()), Some("s3cret".into()))
    }

    #[test]
    fn test_argv_with_credentials_and_switch_scope() {
        let session = CliSession::new("spine1", ScriptedTransport::with_outputs(vec![]))
            .with_credentials(creds())
            .with_scope(Scope::Switch("leaf1".into()));
        let request = CliRequest::new("vrouter-show")
            .arg("name", "leaf1-vrouter")
            .format(&["bgp-as"])
            .no_show_headers();
        assert_eq!(
            session.argv(&request).join(" "),
            "/usr/bin/cli --quiet --user network-admin:s3cret switch leaf1 vrouter-show name leaf1-vrouter format bgp-as no-show-headers"
        );
    }

    #[test]
    fn test_argv_without_credentials() {
        let session = CliSession::new("leaf1", ScriptedTransport::with_outputs(vec![]))
            .with_credentials(Credentials::from_parts(Some("admin".into()), None))
            .with_scope(Scope::Local);
        let request = CliRequest::new("fabric-node-show").count_output();
        assert_eq!(
            session.argv(&request).join(" "),
            "/usr/bin/cli --quiet switch-local fabric-node-show count-output"
        );
    }

    #[test]
    fn test_setup_argv_skips_scope_and_login() {
        let session = CliSession::new("leaf1", ScriptedTransport::with_outputs(vec![]))
            .with_credentials(creds())
            .with_scope(Scope::Local);
        let request = CliRequest::new("switch-setup-modify")
            .arg("password", "s3cret")
            .arg("eula-accepted", "true")
            .setup()
            .script_password();
        let argv = session.argv(&request);
        assert_eq!(
            argv.join(" "),
            "/usr/bin/cli --quiet --skip-setup --script-password switch-setup-modify password s3cret eula-accepted true"
        );
        assert_eq!(
            redact(&argv),
            "/usr/bin/cli --quiet --skip-setup --script-password switch-setup-modify password **** eula-accepted true"
        );
    }

    #[test]
    fn test_redact_user() {
        let argv: Vec<String> = ["/usr/bin/cli", "--quiet", "--user", "admin:pw", "vlan-show"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(redact(&argv), "/usr/bin/cli --quiet --user admin:**** vlan-show");
        assert!(!format!("{:?}", creds()).contains("s3cret"));
    }

    #[tokio::test]
    async fn test_stderr_is_fatal_by_default() {
        let transport = ScriptedTransport::with_outputs(vec![CliOutput::failed("no such vrouter")]);
        let session = CliSession::new("spine1", transport);
        let result = session.invoke(&CliRequest::new("vrouter-show")).await;
        match result {
            Err(CliError::CommandFailed { host, stderr, .. }) => {
                assert_eq!(host, "spine1");
                assert_eq!(stderr, "no such vrouter");
            }
            other => panic!("expected CommandFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_may_fail_converts_stderr_to_absence() {
        let transport =
            ScriptedTransport::with_outputs(vec![CliOutput::failed("switch not in a fabric")]);
        let session = CliSession::new("leaf1", transport);
        let response = session
            .invoke(&CliRequest::new("fabric-info").may_fail())
            .await
            .unwrap();
        assert!(response.is_error());
        assert!(response.rows().is_empty());
    }

    #[tokio::test]
    async fn test_mutate_outcomes() {
        let transport = ScriptedTransport::with_outputs(vec![
            CliOutput::ok(""),
            CliOutput::ok("trunk already exists"),
            CliOutput::ok("garbage"),
        ]);
        let session = CliSession::new("leaf1", transport.clone());
        let request = CliRequest::new("trunk-create").arg("name", "t1");
        assert_eq!(session.mutate(&request).await.unwrap(), MutationOutcome::Applied);
        assert_eq!(
            session.mutate(&request).await.unwrap(),
            MutationOutcome::AlreadyApplied
        );
        assert!(matches!(
            session.mutate(&request).await,
            Err(CliError::UnexpectedOutput { .. })
        ));
        assert_eq!(transport.calls.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_session_does_not_invoke() {
        let transport = ScriptedTransport::with_outputs(vec![CliOutput::ok("x")]);
        let cancel = CancellationToken::new();
        let session = CliSession::new("leaf1", transport.clone()).with_cancellation(cancel.clone());
        cancel.cancel();
        let result = session.invoke(&CliRequest::new("vlan-show")).await;
        assert!(matches!(result, Err(CliError::Cancelled)));
        assert!(transport.calls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_becomes_timeout_error() {
        let transport = Arc::new(ScriptedTransport {
            delay: Some(Duration::from_secs(30)),
            ..ScriptedTransport::default()
        });
        let session = CliSession::new("leaf1", transport).with_timeout(Duration::from_secs(5));
        let result = session.invoke(&CliRequest::new("port-config-show")).await;
        assert!(matches!(result, Err(CliError::Timeout { .. })));
    }
}
