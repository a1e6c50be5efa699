//! Reachability check: run one command on a host over `ssh` and time it
//!
//! `ssh` itself fails with status 255 when it cannot connect or authenticate; any other status
//! comes from the remote command, so the host answered.

use std::sync::Arc;

use crate::command::Invocation;
use crate::{NO_EXIT_CODE, TransportConfig};

/// Status `ssh` uses for its own failures
const SSH_FAILURE: i32 = 255;

/// Result of checking one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The remote command ran; a nonzero `exit_code` is the command's, not the connection's
    Answered {
        exit_code: i32,
        stdout: String,
        elapsed: std::time::Duration,
    },
    Unreachable { reason: String },
}

/// Runs a fixed command as a fixed user on any number of hosts
#[derive(Debug, Clone)]
pub struct Pinger {
    config: Arc<TransportConfig>,
    user: String,
    command: String,
    deadline: std::time::Duration,
}

impl Pinger {
    /// `deadline` bounds the whole exchange; `config.connect_timeout` only bounds the TCP connect
    #[must_use]
    pub fn new(
        config: Arc<TransportConfig>,
        user: &str,
        command: &str,
        deadline: std::time::Duration,
    ) -> Self {
        Self {
            config,
            user: user.to_string(),
            command: command.to_string(),
            deadline,
        }
    }

    fn args(&self, host: &str) -> Vec<std::ffi::OsString> {
        let mut args = self.config.ssh_options();
        args.extend(
            ["-l", self.user.as_str(), "--", host, self.command.as_str()]
                .into_iter()
                .map(std::ffi::OsString::from),
        );
        args
    }

    pub async fn ping(&self, host: &str) -> Reply {
        let start = std::time::Instant::now();
        let args = self.args(host);
        let invocation = Invocation::new(&self.config.ssh_bin, args);
        // dropping the invocation on timeout kills the client
        let (outcome, stdout) = match tokio::time::timeout(self.deadline, invocation.capture()).await {
            Ok(captured) => captured,
            Err(_) => {
                tracing::debug!("{host}: no answer within {:?}", self.deadline);
                return Reply::Unreachable {
                    reason: format!("no answer within {:?}", self.deadline),
                };
            }
        };
        let elapsed = start.elapsed();
        match outcome.exit_code {
            SSH_FAILURE | NO_EXIT_CODE => {
                tracing::debug!("{host}: {outcome}");
                Reply::Unreachable {
                    reason: outcome.to_string(),
                }
            }
            exit_code => Reply::Answered {
                exit_code,
                stdout,
                elapsed,
            },
        }
    }
}
