use tracing::instrument;

use crate::{Error, NO_EXIT_CODE, TransferOutcome};

/// One external client invocation
#[derive(Debug)]
pub(crate) struct Invocation<'a> {
    program: &'a std::path::Path,
    args: Vec<std::ffi::OsString>,
}

#[derive(Debug)]
struct Completed {
    status: std::process::ExitStatus,
    stdout: String,
    stderr: String,
}

impl<'a> Invocation<'a> {
    pub fn new(program: &'a std::path::Path, args: Vec<std::ffi::OsString>) -> Self {
        Self { program, args }
    }

    async fn run(&self) -> Result<Completed, Error> {
        let output = tokio::process::Command::new(self.program)
            .args(&self.args)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| Error::Spawn {
                program: self.program.to_path_buf(),
                source,
            })?;
        Ok(Completed {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run to completion and interpret the exit status
    pub async fn outcome(&self) -> TransferOutcome {
        self.capture().await.0
    }

    /// Like [`Invocation::outcome`], also returning stdout (empty unless the client ran)
    #[instrument(skip(self), fields(command = %self))]
    pub async fn capture(&self) -> (TransferOutcome, String) {
        tracing::debug!("---> {}", self);
        let completed = match self.run().await {
            Ok(completed) => completed,
            Err(error) => {
                tracing::error!("{}", &error);
                return (TransferOutcome::not_run(&error), String::new());
            }
        };
        if !completed.stderr.trim().is_empty() {
            tracing::debug!("<--- stderr: {}", completed.stderr.trim());
        }
        let stderr = match completed.stderr.trim() {
            "" => None,
            stderr => Some(stderr.to_string()),
        };
        let outcome = match completed.status.code() {
            Some(0) => TransferOutcome::succeeded(),
            Some(code) => {
                tracing::info!("---> using '{}' returned {}", self, code);
                TransferOutcome::exited(code, stderr)
            }
            None => {
                tracing::error!("'{}' was terminated by a signal", self);
                TransferOutcome {
                    success: false,
                    exit_code: NO_EXIT_CODE,
                    error_detail: Some(format!("terminated by signal: {}", completed.status)),
                }
            }
        };
        (outcome, completed.stdout)
    }
}

impl std::fmt::Display for Invocation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}
