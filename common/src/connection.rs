//! Connection definitions shared by the transports and the sync engine
//!
//! A [`ConnectionConfig`] is resolved once at startup and is never mutated afterwards; every
//! component receives it (or a piece of it) by reference.

use serde::Deserialize;

/// Mechanism used to move or remove one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum TransportKind {
    /// One `scp` command per file, `ssh` for remove and list
    #[serde(rename = "scp", alias = "remote-copy")]
    RemoteCopy,
    /// One short-lived `sftp -b` batch session per operation
    #[serde(rename = "sftp", alias = "session")]
    Session,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TransportKind::RemoteCopy => write!(f, "scp"),
            TransportKind::Session => write!(f, "sftp"),
        }
    }
}

/// Remote endpoint of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub id: i64,
    pub name: String,
    /// Whatever the transport needs to reach the endpoint, typically a host alias from
    /// `~/.ssh/config`
    pub address: String,
}

impl std::fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "#{} '{}' ({})", self.id, self.name, self.address)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("{0} must not be empty")]
    EmptyPath(&'static str),
    #[error("archive directory {0:?} is the same as the source directory")]
    ArchiveIsSource(std::path::PathBuf),
    #[error("archive directory {archive:?} is inside the source directory {source_dir:?}")]
    ArchiveInsideSource {
        archive: std::path::PathBuf,
        source_dir: std::path::PathBuf,
    },
}

/// Outbound mapping: local `source_dir` is pushed to remote `target_dir`, completed files are
/// moved to local `archive_dir`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRule {
    pub source_dir: std::path::PathBuf,
    pub target_dir: std::path::PathBuf,
    pub archive_dir: std::path::PathBuf,
    pub transport: TransportKind,
}

impl TransferRule {
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.source_dir.as_os_str().is_empty() {
            return Err(RuleError::EmptyPath("source_dir"));
        }
        if self.target_dir.as_os_str().is_empty() {
            return Err(RuleError::EmptyPath("target_dir"));
        }
        if self.archive_dir.as_os_str().is_empty() {
            return Err(RuleError::EmptyPath("archive_dir"));
        }
        if self.archive_dir == self.source_dir {
            return Err(RuleError::ArchiveIsSource(self.archive_dir.clone()));
        }
        // archived files would be walked again on the next tick
        if self.archive_dir.starts_with(&self.source_dir) {
            return Err(RuleError::ArchiveInsideSource {
                archive: self.archive_dir.clone(),
                source_dir: self.source_dir.clone(),
            });
        }
        Ok(())
    }
}

/// Inbound mapping: remote `source_dir` is pulled into local `target_dir`, received files are
/// removed from the remote side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRule {
    pub source_dir: std::path::PathBuf,
    pub target_dir: std::path::PathBuf,
    pub transport: TransportKind,
}

impl ReceiveRule {
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.source_dir.as_os_str().is_empty() {
            return Err(RuleError::EmptyPath("source_dir"));
        }
        if self.target_dir.as_os_str().is_empty() {
            return Err(RuleError::EmptyPath("target_dir"));
        }
        Ok(())
    }
}

/// Full unit of work for one scheduler tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub target: ConnectionTarget,
    pub transmit_rules: Vec<TransferRule>,
    pub receive_rules: Vec<ReceiveRule>,
}

impl ConnectionConfig {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transmit_rules.is_empty() && self.receive_rules.is_empty()
    }
}
