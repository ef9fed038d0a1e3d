//! Fabric plane selection.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Network a fabric uses for its control plane or member discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NetworkType {
    /// Out-of-band management network.
    #[default]
    #[serde(rename = "mgmt")]
    Mgmt,
    /// Data-plane in-band network.
    #[serde(rename = "in-band")]
    InBand,
}

impl NetworkType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            NetworkType::Mgmt => "mgmt",
            NetworkType::InBand => "in-band",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mgmt" => Ok(NetworkType::Mgmt),
            "in-band" | "inband" => Ok(NetworkType::InBand),
            _ => Err(ParseError::InvalidNetworkType(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("mgmt".parse::<NetworkType>().unwrap(), NetworkType::Mgmt);
        assert_eq!("in-band".parse::<NetworkType>().unwrap(), NetworkType::InBand);
        assert_eq!("inband".parse::<NetworkType>().unwrap(), NetworkType::InBand);
        assert!("oob".parse::<NetworkType>().is_err());
    }

    #[test]
    fn test_display_matches_cli() {
        assert_eq!(NetworkType::InBand.to_string(), "in-band");
        assert_eq!(NetworkType::default().to_string(), "mgmt");
    }
}
