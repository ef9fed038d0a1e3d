//! Front-panel port identifiers and CLI port lists.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A front-panel port number as printed by the switch CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct PortId(u16);

impl PortId {
    /// Highest port number accepted in provisioning inputs.
    pub const MAX_INPUT: u16 = 104;

    pub const fn new(port: u16) -> Result<Self, ParseError> {
        if port == 0 {
            return Err(ParseError::InvalidPort(String::new()));
        }
        Ok(PortId(port))
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// Returns the port `n` positions after this one.
    pub const fn offset(&self, n: u16) -> PortId {
        PortId(self.0 + n)
    }

    /// Returns true if the port lies in the range accepted by CSV inputs (1-104).
    pub const fn in_input_range(&self) -> bool {
        self.0 <= Self::MAX_INPUT
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PortId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let port: u16 = s
            .trim()
            .parse()
            .map_err(|_| ParseError::InvalidPort(s.to_string()))?;
        PortId::new(port).map_err(|_| ParseError::InvalidPort(s.to_string()))
    }
}

impl TryFrom<u16> for PortId {
    type Error = ParseError;

    fn try_from(port: u16) -> Result<Self, Self::Error> {
        PortId::new(port)
    }
}

impl From<PortId> for u16 {
    fn from(port: PortId) -> u16 {
        port.0
    }
}

/// An ordered, de-duplicated set of ports.
///
/// Parses the CLI list syntax (`1,2,5-8`) and renders back as a plain
/// comma-separated list, or as `a-b` when the set is one contiguous run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PortList(BTreeSet<PortId>);

impl PortList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contiguous range `first..=last`.
    pub fn range(first: PortId, last: PortId) -> Self {
        (first.as_u16()..=last.as_u16())
            .filter_map(|p| PortId::new(p).ok())
            .collect()
    }

    pub fn insert(&mut self, port: PortId) -> bool {
        self.0.insert(port)
    }

    pub fn contains(&self, port: PortId) -> bool {
        self.0.contains(&port)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = PortId> + '_ {
        self.0.iter().copied()
    }

    pub fn first(&self) -> Option<PortId> {
        self.0.first().copied()
    }

    /// Ports in `self` that are not in `other`.
    pub fn difference(&self, other: &PortList) -> PortList {
        self.0.difference(&other.0).copied().collect()
    }

    fn is_contiguous(&self) -> bool {
        match (self.0.first(), self.0.last()) {
            (Some(first), Some(last)) => {
                usize::from(last.as_u16() - first.as_u16()) + 1 == self.0.len()
            }
            _ => false,
        }
    }

    /// Renders a contiguous multi-port set as `first-last`, otherwise as a list.
    pub fn to_range_string(&self) -> String {
        match (self.0.first(), self.0.last()) {
            (Some(first), Some(last)) if self.0.len() > 1 && self.is_contiguous() => {
                format!("{}-{}", first, last)
            }
            _ => self.to_string(),
        }
    }
}

impl FromIterator<PortId> for PortList {
    fn from_iter<I: IntoIterator<Item = PortId>>(iter: I) -> Self {
        PortList(iter.into_iter().collect())
    }
}

impl fmt::Display for PortList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for port in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}", port)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for PortList {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut ports = PortList::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once('-') {
                Some((lo, hi)) => {
                    let lo: PortId = lo
                        .parse()
                        .map_err(|_| ParseError::InvalidPortList(s.to_string()))?;
                    let hi: PortId = hi
                        .parse()
                        .map_err(|_| ParseError::InvalidPortList(s.to_string()))?;
                    if hi < lo {
                        return Err(ParseError::InvalidPortList(s.to_string()));
                    }
                    ports.0.extend(PortList::range(lo, hi).0);
                }
                None => {
                    let port: PortId = part
                        .parse()
                        .map_err(|_| ParseError::InvalidPortList(s.to_string()))?;
                    ports.insert(port);
                }
            }
        }
        Ok(ports)
    }
}
