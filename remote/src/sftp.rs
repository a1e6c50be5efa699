//! Session strategy: every operation is a one-command `sftp -b <batchfile> <address>` session.

use common::{ConnectionTarget, TransportKind};
use std::sync::Arc;

use crate::batch::{BatchCommand, BatchFile};
use crate::command::Invocation;
use crate::{RemoteListing, TransferOutcome, TransportConfig};

#[derive(Debug, Clone)]
pub struct Session {
    config: Arc<TransportConfig>,
}

impl Session {
    #[must_use]
    pub fn new(config: Arc<TransportConfig>) -> Self {
        Self { config }
    }

    /// Run one batch session; the batch file is gone when this returns, whatever happened
    async fn run_batch(
        &self,
        target: &ConnectionTarget,
        command: &BatchCommand,
    ) -> (TransferOutcome, String) {
        let batch = match BatchFile::create(&self.config.scratch_dir, command) {
            Ok(batch) => batch,
            Err(error) => {
                tracing::error!(
                    "Could not write temporary file to directory {:?}: {}",
                    self.config.scratch_dir,
                    &error
                );
                return (TransferOutcome::not_run(&error), String::new());
            }
        };
        tracing::debug!("---> sftp_cmd='{}'", batch.line());
        let mut args = self.config.timeout_options();
        args.push("-b".into());
        args.push(batch.path().as_os_str().to_owned());
        args.push(target.address.as_str().into());
        let result = Invocation::new(&self.config.sftp_bin, args).capture().await;
        batch.remove();
        result
    }
}

/// Flatten `sftp` listing output into bare file names
///
/// The session echoes each command (`sftp> ls /dir`) and prints the names in columns, possibly
/// prefixed with the listed directory.
fn parse_listing(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| !line.trim_start().starts_with("sftp>"))
        .flat_map(str::split_whitespace)
        .filter_map(crate::entry_name)
        .collect()
}

#[async_trait::async_trait]
impl crate::Transport for Session {
    fn kind(&self) -> TransportKind {
        TransportKind::Session
    }

    async fn push(
        &self,
        target: &ConnectionTarget,
        local_path: &std::path::Path,
        remote_path: &std::path::Path,
    ) -> TransferOutcome {
        let command = BatchCommand::Put {
            local: local_path.to_path_buf(),
            remote: remote_path.to_path_buf(),
        };
        self.run_batch(target, &command).await.0
    }

    async fn pull(
        &self,
        target: &ConnectionTarget,
        remote_path: &std::path::Path,
        local_path: &std::path::Path,
    ) -> TransferOutcome {
        let command = BatchCommand::Get {
            remote: remote_path.to_path_buf(),
            local: local_path.to_path_buf(),
        };
        self.run_batch(target, &command).await.0
    }

    async fn remove_remote(
        &self,
        target: &ConnectionTarget,
        remote_path: &std::path::Path,
    ) -> TransferOutcome {
        let command = BatchCommand::Rm {
            remote: remote_path.to_path_buf(),
        };
        self.run_batch(target, &command).await.0
    }

    async fn list_remote_dir(
        &self,
        target: &ConnectionTarget,
        remote_dir: &std::path::Path,
    ) -> RemoteListing {
        let command = BatchCommand::Ls {
            dir: remote_dir.to_path_buf(),
        };
        let (outcome, stdout) = self.run_batch(target, &command).await;
        if !outcome.success {
            return RemoteListing::failed(outcome);
        }
        tracing::debug!("<--- {}", stdout.trim_end());
        RemoteListing {
            outcome,
            entries: parse_listing(&stdout),
        }
    }
}
