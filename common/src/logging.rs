//! Log sinks
//!
//! Two layers are installed: stderr, filtered by `-v`/`-q`, and a log file whose target can be
//! switched while the process runs (the daemon starts logging to a generic file and moves to a
//! per-connection file once the connection is resolved). Until a file is opened, records for
//! the file layer are dropped.

use anyhow::Context;
use chrono::Datelike;
use std::io::Write;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::OutputConfig;

const FILE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Backups kept by [`Rotation::default`], three years of monthly files
pub const DEFAULT_BACKUPS: usize = 36;

/// When a log file is moved aside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Never,
    /// On the first record of a new month the file is renamed to `<name>.YYYY-MM` (the month it
    /// covers) and a fresh one is started; only the newest `keep` backups are kept.
    Monthly { keep: usize },
}

impl Default for Rotation {
    fn default() -> Self {
        Rotation::Monthly {
            keep: DEFAULT_BACKUPS,
        }
    }
}

/// Calendar month, as `(year, month)`
type Period = (i32, u32);

fn period_of(time: &chrono::DateTime<chrono::Local>) -> Period {
    (time.year(), time.month())
}

/// `<dir>/<name>.YYYY-MM`
fn backup_path(path: &std::path::Path, period: Period) -> std::path::PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{:04}-{:02}", period.0, period.1));
    path.with_file_name(name)
}

fn is_backup_suffix(suffix: &str) -> bool {
    let bytes = suffix.as_bytes();
    bytes.len() == 7
        && bytes[4] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(index, byte)| index == 4 || byte.is_ascii_digit())
}

/// Remove all but the newest `keep` backups of `path`
fn prune_backups(path: &std::path::Path, keep: usize) -> std::io::Result<()> {
    let Some(prefix) = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| format!("{name}."))
    else {
        return Ok(());
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => std::path::Path::new("."),
    };
    let mut backups = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let is_backup = name
            .to_str()
            .and_then(|name| name.strip_prefix(&prefix))
            .is_some_and(is_backup_suffix);
        if is_backup {
            backups.push(entry.path());
        }
    }
    // YYYY-MM sorts chronologically
    backups.sort();
    let excess = backups.len().saturating_sub(keep);
    for backup in &backups[..excess] {
        std::fs::remove_file(backup)?;
    }
    Ok(())
}

/// Switchable append-only log file, usable as a `tracing_subscriber` writer
#[derive(Debug, Clone, Default)]
pub struct LogFile {
    inner: std::sync::Arc<std::sync::Mutex<LogState>>,
}

#[derive(Debug, Default)]
struct LogState {
    rotation: Rotation,
    open: Option<OpenLogFile>,
}

#[derive(Debug)]
struct OpenLogFile {
    path: std::path::PathBuf,
    file: std::fs::File,
    period: Period,
}

impl LogState {
    /// Move the open file aside if `now` falls in a later month than its records
    fn rotate_at(&mut self, now: &chrono::DateTime<chrono::Local>) -> std::io::Result<()> {
        let Rotation::Monthly { keep } = self.rotation else {
            return Ok(());
        };
        let Some(open) = self.open.as_mut() else {
            return Ok(());
        };
        let period = period_of(now);
        if open.period == period {
            return Ok(());
        }
        // a failed attempt is not retried on every record
        let covered = std::mem::replace(&mut open.period, period);
        std::fs::rename(&open.path, backup_path(&open.path, covered))?;
        open.file = open_append(&open.path)?;
        prune_backups(&open.path, keep)
    }
}

fn open_append(path: &std::path::Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}

impl LogFile {
    /// Log file rotated monthly, see [`Rotation::default`]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_rotation(rotation: Rotation) -> Self {
        Self {
            inner: std::sync::Arc::new(std::sync::Mutex::new(LogState {
                rotation,
                open: None,
            })),
        }
    }

    /// Start writing to `path` (created if missing, appended otherwise)
    ///
    /// The previously opened file, if any, is closed. On error the previous file stays active.
    /// An existing file is attributed to the month it was last modified in, so a file left over
    /// from an earlier month is rotated by the first record written.
    pub fn open(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let file = open_append(path).with_context(|| format!("cannot open log file {:?}", path))?;
        let modified = file
            .metadata()
            .and_then(|metadata| metadata.modified())
            .map(chrono::DateTime::<chrono::Local>::from)
            .unwrap_or_else(|_| chrono::Local::now());
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("log file lock poisoned"))?;
        guard.open = Some(OpenLogFile {
            path: path.to_path_buf(),
            file,
            period: period_of(&modified),
        });
        Ok(())
    }

    /// Path of the file currently written to
    #[must_use]
    pub fn path(&self) -> Option<std::path::PathBuf> {
        self.inner
            .lock()
            .ok()
            .and_then(|guard| guard.open.as_ref().map(|open| open.path.clone()))
    }
}

/// Writer handed out to the fmt layer for a single record
#[derive(Debug)]
pub struct LogFileWriter {
    inner: std::sync::Arc<std::sync::Mutex<LogState>>,
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| std::io::Error::other("log file lock poisoned"))?;
        // the subscriber cannot log about its own sink
        if let Err(error) = guard.rotate_at(&chrono::Local::now()) {
            eprintln!("cannot rotate log file: {error}");
        }
        match guard.open.as_mut() {
            Some(open) => open.file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| std::io::Error::other("log file lock poisoned"))?;
        match guard.open.as_mut() {
            Some(open) => open.file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogFile {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileWriter {
            inner: self.inner.clone(),
        }
    }
}

/// Install the global subscriber
///
/// `RUST_LOG`, when set, overrides the stderr level derived from `output`.
pub fn init(output: &OutputConfig, log_file: Option<&LogFile>) -> anyhow::Result<()> {
    let stderr_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(output.stderr_level().into())
        .from_env_lossy();
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter);
    let file_layer = log_file.map(|log_file| {
        tracing_subscriber::fmt::layer()
            .with_writer(log_file.clone())
            .with_ansi(false)
            .with_target(false)
            .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new(
                FILE_TIME_FORMAT.to_string(),
            ))
            .with_filter(output.file_level())
    });
    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(())
}
