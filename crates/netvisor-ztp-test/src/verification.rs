//! Verification helpers over the simulated call log
//!
//! Calls are matched by target host and a substring of the command line
//! (`"trunk-create name leaf1-to-spine1-trunk"`).

use thiserror::Error;

use crate::sim::{SimCall, SimFabric};

/// Verification error types
#[derive(Error, Debug, PartialEq, Eq)]
pub enum VerificationError {
    #[error("No call on '{target}' matching '{pattern}'")]
    CallNotFound { target: String, pattern: String },

    #[error("Unexpected call on '{target}': {line}")]
    UnexpectedCall { target: String, line: String },

    #[error("Expected {expected} calls matching '{pattern}', found {actual}")]
    CallCountMismatch {
        pattern: String,
        expected: usize,
        actual: usize,
    },

    #[error("'{later}' was issued before '{earlier}'")]
    OutOfOrder { earlier: String, later: String },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Call-log verifier for a snapshot of a [`SimFabric`].
pub struct CallVerifier {
    calls: Vec<SimCall>,
}

impl CallVerifier {
    /// Snapshot the current call log
    pub fn new(fabric: &SimFabric) -> Self {
        Self {
            calls: fabric.calls(),
        }
    }

    /// Only mutating calls
    pub fn mutations(fabric: &SimFabric) -> Self {
        Self {
            calls: fabric.mutations(),
        }
    }

    pub fn calls(&self) -> &[SimCall] {
        &self.calls
    }

    /// Calls on `target` whose line contains `pattern`
    pub fn matching<'a>(&'a self, target: &'a str, pattern: &'a str) -> impl Iterator<Item = &'a SimCall> + 'a {
        self.calls
            .iter()
            .filter(move |c| c.target == target && c.line().contains(pattern))
    }

    /// Calls with command name `command` on any switch
    pub fn commands_named<'a>(&'a self, command: &'a str) -> impl Iterator<Item = &'a SimCall> + 'a {
        self.calls.iter().filter(move |c| c.command() == command)
    }

    /// Index of the first matching call
    pub fn position(&self, target: &str, pattern: &str) -> Option<usize> {
        self.calls
            .iter()
            .position(|c| c.target == target && c.line().contains(pattern))
    }

    /// Verify that at least one matching call was issued
    pub fn assert_called(&self, target: &str, pattern: &str) -> VerifyResult<()> {
        match self.position(target, pattern) {
            Some(_) => Ok(()),
            None => Err(VerificationError::CallNotFound {
                target: target.to_string(),
                pattern: pattern.to_string(),
            }),
        }
    }

    /// Verify that no matching call was issued
    pub fn assert_not_called(&self, target: &str, pattern: &str) -> VerifyResult<()> {
        match self.matching(target, pattern).next() {
            None => Ok(()),
            Some(call) => Err(VerificationError::UnexpectedCall {
                target: target.to_string(),
                line: call.line(),
            }),
        }
    }

    /// Verify the number of matching calls across all switches
    pub fn assert_count(&self, pattern: &str, expected: usize) -> VerifyResult<()> {
        let actual = self
            .calls
            .iter()
            .filter(|c| c.line().contains(pattern))
            .count();
        if actual != expected {
            return Err(VerificationError::CallCountMismatch {
                pattern: pattern.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Verify that the first match of each `(target, pattern)` step occurs
    /// after the first match of the previous step
    pub fn assert_sequence(&self, steps: &[(&str, &str)]) -> VerifyResult<()> {
        let mut previous: Option<(usize, String)> = None;
        for (target, pattern) in steps {
            let index = self
                .position(target, pattern)
                .ok_or_else(|| VerificationError::CallNotFound {
                    target: target.to_string(),
                    pattern: pattern.to_string(),
                })?;
            if let Some((prev_index, prev_pattern)) = &previous {
                if index < *prev_index {
                    return Err(VerificationError::OutOfOrder {
                        earlier: prev_pattern.clone(),
                        later: pattern.to_string(),
                    });
                }
            }
            previous = Some((index, pattern.to_string()));
        }
        Ok(())
    }

    /// Verify that nothing mutated the fabric
    pub fn assert_no_mutations(&self) -> VerifyResult<()> {
        match self.calls.iter().find(|c| c.is_mutation()) {
            None => Ok(()),
            Some(call) => Err(VerificationError::UnexpectedCall {
                target: call.target.clone(),
                line: call.line(),
            }),
        }
    }
}
