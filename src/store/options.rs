//! Read options forwarded to the store with every aggregation

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Replica-set member preference for reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadPreference {
    Primary,
    PrimaryPreferred,
    Secondary,
    #[default]
    SecondaryPreferred,
    Nearest,
}

impl ReadPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadPreference::Primary => "primary",
            ReadPreference::PrimaryPreferred => "primaryPreferred",
            ReadPreference::Secondary => "secondary",
            ReadPreference::SecondaryPreferred => "secondaryPreferred",
            ReadPreference::Nearest => "nearest",
        }
    }
}

impl fmt::Display for ReadPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(ReadPreference::Primary),
            "primaryPreferred" => Ok(ReadPreference::PrimaryPreferred),
            "secondary" => Ok(ReadPreference::Secondary),
            "secondaryPreferred" => Ok(ReadPreference::SecondaryPreferred),
            "nearest" => Ok(ReadPreference::Nearest),
            other => Err(format!("unknown read preference '{}'", other)),
        }
    }
}

/// Isolation level for reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadConcern {
    Local,
    #[default]
    Majority,
}

impl ReadConcern {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadConcern::Local => "local",
            ReadConcern::Majority => "majority",
        }
    }
}

impl fmt::Display for ReadConcern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadConcern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(ReadConcern::Local),
            "majority" => Ok(ReadConcern::Majority),
            other => Err(format!("unknown read concern '{}'", other)),
        }
    }
}

/// Options attached to an `aggregate` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateOptions {
    pub allow_disk_use: bool,
    pub read_preference: ReadPreference,
    pub read_concern: ReadConcern,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_favor_secondaries() {
        let opts = AggregateOptions::default();
        assert!(!opts.allow_disk_use);
        assert_eq!(opts.read_preference, ReadPreference::SecondaryPreferred);
        assert_eq!(opts.read_concern, ReadConcern::Majority);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&ReadPreference::PrimaryPreferred).unwrap(),
            "\"primaryPreferred\""
        );
        assert_eq!("nearest".parse::<ReadPreference>(), Ok(ReadPreference::Nearest));
        assert!("any".parse::<ReadConcern>().is_err());
    }
}
