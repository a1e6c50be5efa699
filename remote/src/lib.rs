//! Transport clients used to move files between the local host and a remote endpoint
//!
//! Every transport operation shells out to an OpenSSH client binary with an explicit argument
//! vector (no local shell is involved) and reports a [`TransferOutcome`]. Two strategies exist:
//!
//! - [`scp::RemoteCopy`]: one `scp` per file, `ssh <host> rm`/`ls` for remove and list
//! - [`sftp::Session`]: one `sftp -b <batchfile>` session per operation
//!
//! Both implement [`Transport`]; [`Transports`] holds one of each and hands out the one a rule
//! asks for. [`reach::Pinger`] reuses the same `ssh` plumbing to check whether hosts answer.

use common::{ConnectionTarget, TransportKind};
use std::sync::Arc;

pub mod batch;
mod command;
pub mod outcome;
pub mod reach;
pub mod scp;
pub mod sftp;

pub use outcome::{NO_EXIT_CODE, RemoteListing, TransferOutcome};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to start {program:?}: {source}")]
    Spawn {
        program: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("cannot create batch file in {dir:?}: {source}")]
    BatchCreate {
        dir: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write batch file {path:?}: {source}")]
    BatchWrite {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("path {0:?} cannot be passed to the remote side (not UTF-8 or contains a line break)")]
    UnsupportedPath(std::path::PathBuf),
}

/// Settings shared by both transport strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub scp_bin: std::path::PathBuf,
    pub sftp_bin: std::path::PathBuf,
    pub ssh_bin: std::path::PathBuf,
    /// Directory for `sftp` batch files, shared by all rules and ticks
    pub scratch_dir: std::path::PathBuf,
    /// Passed to every client as `-o ConnectTimeout=<seconds>`
    pub connect_timeout: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            scp_bin: "/usr/bin/scp".into(),
            sftp_bin: "/usr/bin/sftp".into(),
            ssh_bin: "/usr/bin/ssh".into(),
            scratch_dir: std::env::temp_dir(),
            connect_timeout: None,
        }
    }
}

impl TransportConfig {
    /// Options common to `scp` and `ssh`; both must never prompt for a password
    fn ssh_options(&self) -> Vec<std::ffi::OsString> {
        let mut options = vec!["-o".into(), "BatchMode=yes".into()];
        options.extend(self.timeout_options());
        options
    }

    fn timeout_options(&self) -> Vec<std::ffi::OsString> {
        match self.connect_timeout {
            Some(seconds) => vec!["-o".into(), format!("ConnectTimeout={seconds}").into()],
            None => vec![],
        }
    }
}

/// Moves one file at a time between the local host and a connection target
#[async_trait::async_trait]
pub trait Transport: std::fmt::Debug + Send + Sync {
    fn kind(&self) -> TransportKind;

    async fn push(
        &self,
        target: &ConnectionTarget,
        local_path: &std::path::Path,
        remote_path: &std::path::Path,
    ) -> TransferOutcome;

    async fn pull(
        &self,
        target: &ConnectionTarget,
        remote_path: &std::path::Path,
        local_path: &std::path::Path,
    ) -> TransferOutcome;

    async fn remove_remote(
        &self,
        target: &ConnectionTarget,
        remote_path: &std::path::Path,
    ) -> TransferOutcome;

    async fn list_remote_dir(
        &self,
        target: &ConnectionTarget,
        remote_dir: &std::path::Path,
    ) -> RemoteListing;
}

/// One transport per [`TransportKind`]
#[derive(Debug, Clone)]
pub struct Transports {
    remote_copy: Arc<dyn Transport>,
    session: Arc<dyn Transport>,
}

impl Transports {
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        let config = Arc::new(config);
        Self::with(
            Arc::new(scp::RemoteCopy::new(config.clone())),
            Arc::new(sftp::Session::new(config)),
        )
    }

    /// Use the given implementations, e.g. test doubles
    #[must_use]
    pub fn with(remote_copy: Arc<dyn Transport>, session: Arc<dyn Transport>) -> Self {
        Self {
            remote_copy,
            session,
        }
    }

    #[must_use]
    pub fn get(&self, kind: TransportKind) -> &dyn Transport {
        match kind {
            TransportKind::RemoteCopy => self.remote_copy.as_ref(),
            TransportKind::Session => self.session.as_ref(),
        }
    }
}

/// `<address>:<path>` argument understood by `scp`
fn remote_spec(target: &ConnectionTarget, path: &std::path::Path) -> std::ffi::OsString {
    let mut spec = std::ffi::OsString::from(&target.address);
    spec.push(":");
    spec.push(path);
    spec
}

/// Last path component of a listing token, `None` for directory references
fn entry_name(token: &str) -> Option<String> {
    let name = token.trim().rsplit('/').next()?;
    match name {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}
