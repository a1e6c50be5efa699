//! Unattended, periodic file exchange with one remote endpoint
//!
//! Every tick pushes the files found in each transmit rule's local directory (archiving them
//! locally once sent) and pulls the files found in each receive rule's remote directory
//! (deleting them remotely once received). Transfers are done by the OpenSSH clients, see
//! [`remote::Transport`].

pub mod catalog;
pub mod inbound;
pub mod outbound;
pub mod scheduler;
pub mod summary;
pub mod walk;

#[cfg(test)]
mod testutils;

pub use summary::Summary;

/// Process exit statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Single tick requested with `--once` completed
    Completed,
    NoConfigSource,
    NoSelector,
    ConfigNotFound,
    ConfigUnresolvable,
    StartupFailed,
    Interrupted,
}

impl Exit {
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Exit::Completed => 0,
            Exit::NoConfigSource | Exit::Interrupted => 1,
            Exit::NoSelector => 2,
            Exit::ConfigNotFound => 3,
            Exit::ConfigUnresolvable => 4,
            Exit::StartupFailed => 5,
        }
    }
}

/// Log file used once the connection is known: `rxtx.<name>.log` in `dir`
///
/// Characters that would escape `dir` or upset a shell are replaced with `_`.
#[must_use]
pub fn connection_log_path(dir: &std::path::Path, connection_name: &str) -> std::path::PathBuf {
    let name: String = connection_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let name = name.trim_matches('.');
    if name.is_empty() {
        dir.join("rxtx.log")
    } else {
        dir.join(format!("rxtx.{name}.log"))
    }
}
