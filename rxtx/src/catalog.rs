//! Connection catalog: a TOML file with one `[[connection]]` table per remote endpoint
//!
//! ```toml
//! [[connection]]
//! id = 1
//! name = "prod"
//! address = "prod-host"
//!
//! [[connection.transmit]]
//! source_dir = "/data/out"
//! target_dir = "/upload"
//! archive_dir = "/data/sent"
//! transport = "sftp"
//!
//! [[connection.receive]]
//! source_dir = "/download"
//! target_dir = "/data/in"
//! transport = "scp"
//! ```

use common::{
    ConnectionConfig, ConnectionTarget, ReceiveRule, RuleError, TransferRule, TransportKind,
};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot read connection catalog {path:?}: {source}")]
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("malformed connection catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no connection matches {0}")]
    NoMatch(Selector),
    #[error("connection {target}: invalid {direction} rule #{index}: {source}")]
    InvalidRule {
        target: ConnectionTarget,
        direction: &'static str,
        index: usize,
        source: RuleError,
    },
}

/// How the connection to run is picked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Id(i64),
    /// SQL `LIKE` pattern matched against the connection name
    Pattern(String),
}

impl Selector {
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().parse::<i64>() {
            Ok(id) => Selector::Id(id),
            Err(_) => Selector::Pattern(value.to_string()),
        }
    }

    fn matches(&self, connection: &RawConnection) -> bool {
        match self {
            Selector::Id(id) => connection.id == *id,
            Selector::Pattern(pattern) => like_match(pattern, &connection.name),
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Selector::Id(id) => write!(f, "id {id}"),
            Selector::Pattern(pattern) => write!(f, "name '{pattern}'"),
        }
    }
}

/// Case-insensitive (ASCII) `LIKE`: `%` matches any run, `_` any single character
#[must_use]
pub fn like_match(pattern: &str, value: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();
    // classic wildcard matching with backtracking to the last `%`
    let (mut p, mut v) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while v < value.len() {
        if p < pattern.len() && pattern[p] == '%' {
            star = Some((p, v));
            p += 1;
        } else if p < pattern.len()
            && (pattern[p] == '_' || pattern[p].eq_ignore_ascii_case(&value[v]))
        {
            p += 1;
            v += 1;
        } else if let Some((star_p, star_v)) = star {
            p = star_p + 1;
            v = star_v + 1;
            star = Some((star_p, star_v + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TransportSpec {
    Named(TransportKind),
    /// Legacy flag: 0 means scp, anything else sftp
    Flag(i64),
}

impl TransportSpec {
    fn kind(&self) -> TransportKind {
        match self {
            TransportSpec::Named(kind) => *kind,
            TransportSpec::Flag(0) => TransportKind::RemoteCopy,
            TransportSpec::Flag(_) => TransportKind::Session,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTransmit {
    source_dir: std::path::PathBuf,
    target_dir: std::path::PathBuf,
    archive_dir: std::path::PathBuf,
    transport: TransportSpec,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawReceive {
    source_dir: std::path::PathBuf,
    target_dir: std::path::PathBuf,
    transport: TransportSpec,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConnection {
    id: i64,
    name: String,
    address: Option<String>,
    #[serde(default)]
    transmit: Vec<RawTransmit>,
    #[serde(default)]
    receive: Vec<RawReceive>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCatalog {
    #[serde(default)]
    connection: Vec<RawConnection>,
}

/// Every connection defined in a catalog file, in file order
#[derive(Debug)]
pub struct Catalog {
    connections: Vec<RawConnection>,
}

impl Catalog {
    pub async fn load(path: &std::path::Path) -> Result<Self, Error> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| Error::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        let raw: RawCatalog = toml::from_str(text)?;
        Ok(Self {
            connections: raw.connection,
        })
    }

    /// Build the configuration of the first connection matching `selector`
    ///
    /// Every rule is validated; one bad rule makes the whole connection unusable.
    pub fn resolve(&self, selector: &Selector) -> Result<ConnectionConfig, Error> {
        let raw = self
            .connections
            .iter()
            .find(|connection| selector.matches(connection))
            .ok_or_else(|| Error::NoMatch(selector.clone()))?;
        let target = ConnectionTarget {
            id: raw.id,
            name: raw.name.clone(),
            address: raw.address.clone().unwrap_or_else(|| raw.name.clone()),
        };
        let mut transmit_rules = Vec::with_capacity(raw.transmit.len());
        for (index, rule) in raw.transmit.iter().enumerate() {
            let rule = TransferRule {
                source_dir: rule.source_dir.clone(),
                target_dir: rule.target_dir.clone(),
                archive_dir: rule.archive_dir.clone(),
                transport: rule.transport.kind(),
            };
            rule.validate().map_err(|source| Error::InvalidRule {
                target: target.clone(),
                direction: "transmit",
                index,
                source,
            })?;
            transmit_rules.push(rule);
        }
        let mut receive_rules = Vec::with_capacity(raw.receive.len());
        for (index, rule) in raw.receive.iter().enumerate() {
            let rule = ReceiveRule {
                source_dir: rule.source_dir.clone(),
                target_dir: rule.target_dir.clone(),
                transport: rule.transport.kind(),
            };
            rule.validate().map_err(|source| Error::InvalidRule {
                target: target.clone(),
                direction: "receive",
                index,
                source,
            })?;
            receive_rules.push(rule);
        }
        Ok(ConnectionConfig {
            target,
            transmit_rules,
            receive_rules,
        })
    }
}
