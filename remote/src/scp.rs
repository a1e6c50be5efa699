//! Remote-copy strategy: `scp` moves files, `ssh` removes and lists them.

use common::{ConnectionTarget, TransportKind};
use std::ffi::OsString;
use std::sync::Arc;

use crate::command::Invocation;
use crate::{Error, RemoteListing, TransferOutcome, TransportConfig};

#[derive(Debug, Clone)]
pub struct RemoteCopy {
    config: Arc<TransportConfig>,
}

impl RemoteCopy {
    #[must_use]
    pub fn new(config: Arc<TransportConfig>) -> Self {
        Self { config }
    }

    fn scp(&self, from: OsString, to: OsString) -> Invocation<'_> {
        let mut args = self.config.ssh_options();
        args.push("--".into());
        args.push(from);
        args.push(to);
        Invocation::new(&self.config.scp_bin, args)
    }

    /// `ssh <address> <program> -- '<path>'`; the path is quoted for the remote shell
    fn ssh(
        &self,
        target: &ConnectionTarget,
        program: &str,
        path: &std::path::Path,
    ) -> Result<Invocation<'_>, Error> {
        let mut args = self.config.ssh_options();
        args.push(target.address.as_str().into());
        args.push(program.into());
        args.push("--".into());
        args.push(shell_quote(path)?.into());
        Ok(Invocation::new(&self.config.ssh_bin, args))
    }
}

/// Single-quote `path` for a POSIX shell
fn shell_quote(path: &std::path::Path) -> Result<String, Error> {
    let text = path
        .to_str()
        .ok_or_else(|| Error::UnsupportedPath(path.to_path_buf()))?;
    Ok(format!("'{}'", text.replace('\'', r"'\''")))
}

/// `ls` prints one entry per line when its output is not a terminal
fn parse_listing(output: &str) -> Vec<String> {
    output.lines().filter_map(crate::entry_name).collect()
}

#[async_trait::async_trait]
impl crate::Transport for RemoteCopy {
    fn kind(&self) -> TransportKind {
        TransportKind::RemoteCopy
    }

    async fn push(
        &self,
        target: &ConnectionTarget,
        local_path: &std::path::Path,
        remote_path: &std::path::Path,
    ) -> TransferOutcome {
        self.scp(
            local_path.as_os_str().to_owned(),
            crate::remote_spec(target, remote_path),
        )
        .outcome()
        .await
    }

    async fn pull(
        &self,
        target: &ConnectionTarget,
        remote_path: &std::path::Path,
        local_path: &std::path::Path,
    ) -> TransferOutcome {
        self.scp(
            crate::remote_spec(target, remote_path),
            local_path.as_os_str().to_owned(),
        )
        .outcome()
        .await
    }

    async fn remove_remote(
        &self,
        target: &ConnectionTarget,
        remote_path: &std::path::Path,
    ) -> TransferOutcome {
        match self.ssh(target, "rm", remote_path) {
            Ok(invocation) => invocation.outcome().await,
            Err(error) => {
                tracing::error!("{}", &error);
                TransferOutcome::not_run(&error)
            }
        }
    }

    async fn list_remote_dir(
        &self,
        target: &ConnectionTarget,
        remote_dir: &std::path::Path,
    ) -> RemoteListing {
        let invocation = match self.ssh(target, "ls", remote_dir) {
            Ok(invocation) => invocation,
            Err(error) => {
                tracing::error!("{}", &error);
                return RemoteListing::failed(TransferOutcome::not_run(&error));
            }
        };
        let (outcome, stdout) = invocation.capture().await;
        if !outcome.success {
            return RemoteListing::failed(outcome);
        }
        tracing::debug!("<- {:?}", stdout.lines().collect::<Vec<_>>());
        RemoteListing {
            outcome,
            entries: parse_listing(&stdout),
        }
    }
}
