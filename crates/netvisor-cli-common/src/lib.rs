//! Common infrastructure for driving the Netvisor switch CLI.
//!
//! Every provisioning step talks to a switch through `/usr/bin/cli`. This
//! crate owns that boundary:
//!
//! - [`transport`]: execute one argv on one switch ([`CliTransport`])
//! - [`session`]: per-switch argv construction, scoping, credentials and deadlines
//! - [`parser`]: the only place that understands the CLI's text output
//! - [`error`]: error types for CLI operations
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use netvisor_cli_common::{CliRequest, CliSession, LocalTransport, Scope};
//!
//! let session = CliSession::new("spine1", Arc::new(LocalTransport)).with_scope(Scope::Local);
//! let request = CliRequest::new("vlan-show").format(&["id", "scope"]).no_show_headers();
//! let rows = session.rows(&request).await?;
//! ```

pub mod error;
pub mod parser;
pub mod session;
pub mod transport;

pub use error::{CliError, CliResult};
pub use parser::{MutationOutcome, Response};
pub use session::{CliRequest, CliSession, Credentials, Scope};
pub use transport::{CliOutput, CliTransport, LocalTransport, SshTransport, CLI_PATH};
