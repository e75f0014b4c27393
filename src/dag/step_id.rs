// src/dag/step_id.rs

//! Step identifiers of the form `<channel>://<namespace>/<version>/<short_name>`.

use std::fmt;
use std::str::FromStr;

use crate::errors::{EtlDagError, Result};

const CHANNEL_SEPARATOR: &str = "://";

/// Pipeline stage tag embedded in a step id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    /// External, immutable raw-data resource. Always a graph leaf.
    Snapshot,
    Meadow,
    Garden,
    Grapher,
    Explorers,
    Export,
    /// Any other channel, kept verbatim.
    Other(String),
}

impl Channel {
    pub fn as_str(&self) -> &str {
        match self {
            Channel::Snapshot => "snapshot",
            Channel::Meadow => "meadow",
            Channel::Garden => "garden",
            Channel::Grapher => "grapher",
            Channel::Explorers => "explorers",
            Channel::Export => "export",
            Channel::Other(s) => s.as_str(),
        }
    }

    /// Whether ids in this channel are resolved outside the pipeline.
    pub fn is_external(&self) -> bool {
        matches!(self, Channel::Snapshot)
    }
}

impl From<&str> for Channel {
    fn from(s: &str) -> Self {
        match s {
            "snapshot" => Channel::Snapshot,
            "meadow" => Channel::Meadow,
            "garden" => Channel::Garden,
            "grapher" => Channel::Grapher,
            "explorers" => Channel::Explorers,
            "export" => Channel::Export,
            other => Channel::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed step identifier.
///
/// ```
/// use etldag::dag::{Channel, StepId};
///
/// let id = StepId::parse("garden://wid/2023-08-24/world_inequality_database").unwrap();
/// assert_eq!(id.channel(), &Channel::Garden);
/// assert_eq!(id.namespace(), "wid");
/// assert_eq!(id.version(), "2023-08-24");
/// assert_eq!(id.short_name(), "world_inequality_database");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId {
    channel: Channel,
    namespace: String,
    version: String,
    short_name: String,
}

impl StepId {
    /// Parse a step id, failing with [`EtlDagError::MalformedIdentifier`]
    /// when the string does not follow the grammar.
    pub fn parse(raw: &str) -> Result<Self> {
        let malformed = |reason: &str| EtlDagError::MalformedIdentifier {
            id: raw.to_string(),
            reason: reason.to_string(),
        };

        let (channel, path) = raw
            .split_once(CHANNEL_SEPARATOR)
            .ok_or_else(|| malformed("missing `://` after the channel"))?;

        if channel.is_empty() {
            return Err(malformed("empty channel"));
        }
        if channel.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(malformed("channel contains whitespace or `/`"));
        }

        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() != 3 {
            return Err(malformed(&format!(
                "expected `namespace/version/short_name` after `://`, found {} segment(s)",
                segments.len()
            )));
        }

        for (name, value) in ["namespace", "version", "short_name"].iter().zip(&segments) {
            if value.is_empty() {
                return Err(malformed(&format!("empty {name}")));
            }
            if value.chars().any(char::is_whitespace) {
                return Err(malformed(&format!("{name} contains whitespace")));
            }
        }

        Ok(Self {
            channel: Channel::from(channel),
            namespace: segments[0].to_string(),
            version: segments[1].to_string(),
            short_name: segments[2].to_string(),
        })
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Snapshot ids are external leaves, never pipeline steps.
    pub fn is_external(&self) -> bool {
        self.channel.is_external()
    }
}

impl FromStr for StepId {
    type Err = EtlDagError;

    fn from_str(s: &str) -> Result<Self> {
        StepId::parse(s)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}/{}/{}",
            self.channel, CHANNEL_SEPARATOR, self.namespace, self.version, self.short_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason_of(raw: &str) -> String {
        match StepId::parse(raw) {
            Err(EtlDagError::MalformedIdentifier { id, reason }) => {
                assert_eq!(id, raw);
                reason
            }
            other => panic!("expected MalformedIdentifier for {raw:?}, got {other:?}"),
        }
    }

    #[test]
    fn parses_all_four_segments() {
        let id = StepId::parse("meadow://lis/2023-08-30/luxembourg_income_study").unwrap();
        assert_eq!(id.channel(), &Channel::Meadow);
        assert_eq!(id.namespace(), "lis");
        assert_eq!(id.version(), "2023-08-30");
        assert_eq!(id.short_name(), "luxembourg_income_study");
        assert!(!id.is_external());
    }

    #[test]
    fn snapshot_short_name_keeps_extension() {
        let id = StepId::parse("snapshot://wb/2024-03-27/world_bank_pip.csv").unwrap();
        assert!(id.is_external());
        assert_eq!(id.short_name(), "world_bank_pip.csv");
    }

    #[test]
    fn unknown_channel_is_kept_verbatim() {
        let id = StepId::parse("backport://owid/latest/dataset_1").unwrap();
        assert_eq!(id.channel(), &Channel::Other("backport".to_string()));
        assert_eq!(id.to_string(), "backport://owid/latest/dataset_1");
    }

    #[test]
    fn display_matches_input() {
        let raw = "garden://ophi/2023-07-05/multidimensional_poverty_index";
        assert_eq!(StepId::parse(raw).unwrap().to_string(), raw);
        let parsed: StepId = raw.parse().unwrap();
        assert_eq!(parsed.to_string(), raw);
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(reason_of("garden/wid/2023-08-24/wid").contains("://"));
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert!(reason_of("garden://wid/2023-08-24").contains("2 segment"));
        assert!(reason_of("garden://wid/2023-08-24/a/b").contains("4 segment"));
    }

    #[test]
    fn rejects_empty_segments() {
        assert_eq!(reason_of("://wid/2023-08-24/wid"), "empty channel");
        assert_eq!(reason_of("garden:///2023-08-24/wid"), "empty namespace");
        assert_eq!(reason_of("garden://wid//wid"), "empty version");
        assert_eq!(reason_of("garden://wid/2023-08-24/"), "empty short_name");
    }

    #[test]
    fn rejects_whitespace() {
        assert!(reason_of("garden://wid/2023-08-24/world inequality").contains("whitespace"));
    }
}
