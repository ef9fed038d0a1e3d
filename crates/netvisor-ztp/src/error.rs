//! Error types for provisioning runs.
//!
//! Every failure maps onto one [`ErrorKind`], which is what operators see in
//! the report envelope. CLI failures are wrapped unchanged so the switch,
//! command and stderr survive up to the report.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use netvisor_cli_common::CliError;

/// Result type alias for provisioning operations.
pub type ZtpResult<T> = Result<T, ZtpError>;

/// Broad classes of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The CLI invocation failed or timed out.
    Transport,
    /// Configuration or CSV input failed validation.
    InputInvalid,
    /// Switches are not cabled or joined the way the plan requires.
    TopologyInvalid,
    /// An existing entity conflicts with the desired one.
    IdempotencyDrift,
    /// The run was cancelled.
    Cancelled,
}

impl ErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "TransportError",
            ErrorKind::InputInvalid => "InputInvalid",
            ErrorKind::TopologyInvalid => "TopologyInvalid",
            ErrorKind::IdempotencyDrift => "IdempotencyDrift",
            ErrorKind::Cancelled => "Cancelled",
        }
    }
}

/// Errors that can occur while planning or provisioning a fabric.
#[derive(Debug, Error)]
pub enum ZtpError {
    /// CLI invocation failed.
    #[error(transparent)]
    Cli(#[from] CliError),

    /// A CSV row failed validation.
    #[error("Invalid input in {source_name} line {line}: {message}")]
    InputInvalid {
        source_name: String,
        line: u64,
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse '{}': {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Fabric create on a two-switch inventory without a cable between them.
    #[error("Switches {first} and {second} are not connected")]
    SwitchesNotConnected { first: String, second: String },

    #[error("Invalid topology: {message}")]
    TopologyInvalid { message: String },

    #[error("Switch '{name}' is not in the inventory")]
    UnknownSwitch { name: String },

    /// An existing entity has attributes that differ from the plan.
    #[error("{entity} '{name}' exists with {attribute} '{found}', expected '{expected}'")]
    IdempotencyDrift {
        entity: String,
        name: String,
        attribute: String,
        expected: String,
        found: String,
    },

    #[error("Insufficient link IPs: {required} links need addresses, {available} pairs available")]
    InsufficientLinkIps { required: usize, available: usize },

    #[error("Address block {block} has no address at index {index}")]
    AddressExhausted { block: String, index: u32 },

    #[error("Provisioning cancelled")]
    Cancelled,

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ZtpError {
    /// Creates an input error for row `line` of `source_name`.
    pub fn input_invalid(
        source_name: impl Into<String>,
        line: u64,
        message: impl Into<String>,
    ) -> Self {
        Self::InputInvalid {
            source_name: source_name.into(),
            line,
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn topology(message: impl Into<String>) -> Self {
        Self::TopologyInvalid {
            message: message.into(),
        }
    }

    /// Creates a drift error for `entity` `name`.
    pub fn drift(
        entity: impl Into<String>,
        name: impl Into<String>,
        attribute: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::IdempotencyDrift {
            entity: entity.into(),
            name: name.into(),
            attribute: attribute.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ZtpError::Cli(CliError::Cancelled) | ZtpError::Cancelled => ErrorKind::Cancelled,
            ZtpError::Cli(_) | ZtpError::Internal { .. } => ErrorKind::Transport,
            ZtpError::InputInvalid { .. }
            | ZtpError::InvalidConfig { .. }
            | ZtpError::Io { .. }
            | ZtpError::Toml { .. }
            | ZtpError::UnknownSwitch { .. }
            | ZtpError::InsufficientLinkIps { .. }
            | ZtpError::AddressExhausted { .. } => ErrorKind::InputInvalid,
            ZtpError::SwitchesNotConnected { .. } | ZtpError::TopologyInvalid { .. } => {
                ErrorKind::TopologyInvalid
            }
            ZtpError::IdempotencyDrift { .. } => ErrorKind::IdempotencyDrift,
        }
    }

    /// True when the switch itself could not be reached.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            ZtpError::Cli(CliError::Spawn { .. }) | ZtpError::Cli(CliError::Timeout { .. })
        )
    }

    /// Text for the `exception` field of a report envelope.
    pub fn detail(&self) -> String {
        match self {
            ZtpError::Cli(err) => err.detail(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn test_kinds() {
        assert_eq!(
            ZtpError::from(CliError::Cancelled).kind(),
            ErrorKind::Cancelled
        );
        assert_eq!(
            ZtpError::from(CliError::unexpected_output("vlan-create", "?")).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            ZtpError::InsufficientLinkIps {
                required: 5,
                available: 4
            }
            .kind(),
            ErrorKind::InputInvalid
        );
        assert_eq!(
            ZtpError::SwitchesNotConnected {
                first: "spine1".into(),
                second: "leaf1".into()
            }
            .kind(),
            ErrorKind::TopologyInvalid
        );
        assert_eq!(
            ZtpError::drift("vrouter", "leaf1-vrouter", "vnet", "f1-global", "f2-global").kind(),
            ErrorKind::IdempotencyDrift
        );
    }

    #[test]
    fn test_drift_display() {
        let err = ZtpError::drift("vrouter", "leaf1-vrouter", "vnet", "f1-global", "f2-global");
        assert_eq!(
            err.to_string(),
            "vrouter 'leaf1-vrouter' exists with vnet 'f2-global', expected 'f1-global'"
        );
    }

    #[test]
    fn test_unreachable_and_detail() {
        let timeout = ZtpError::from(CliError::Timeout {
            host: "leaf1".into(),
            command: "lldp-show".into(),
            timeout: Duration::from_secs(1),
        });
        assert!(timeout.is_unreachable());

        let failed = ZtpError::from(CliError::CommandFailed {
            host: "leaf1".into(),
            command: "trunk-create".into(),
            exit_code: 1,
            stderr: "port 1 is already a trunk member".into(),
        });
        assert!(!failed.is_unreachable());
        assert_eq!(failed.detail(), "port 1 is already a trunk member");
    }
}
