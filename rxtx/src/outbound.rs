//! Outbound sync step: push every file found below a rule's source directory, archive on success

use anyhow::Context;
use common::{ConnectionTarget, TransferRule};
use remote::Transport;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::summary::Summary;
use crate::walk;

pub(crate) async fn is_dir(path: &std::path::Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false)
}

/// Run one transmit rule
///
/// Files are handled one at a time and independently: a failed push leaves the file in place for
/// the next tick, a failed archive move leaves it in place as well (it will be sent again). Once
/// `cancel` fires the file in flight is finished and the rest is left for the next run.
#[instrument(skip_all, fields(source_dir = ?rule.source_dir, transport = %transport.kind()))]
pub async fn transmit(
    transport: &dyn Transport,
    target: &ConnectionTarget,
    rule: &TransferRule,
    cancel: &CancellationToken,
) -> Summary {
    if !is_dir(&rule.source_dir).await {
        tracing::debug!("{:?} is not a directory, nothing to transmit", rule.source_dir);
        return Summary::default();
    }
    if !is_dir(&rule.archive_dir).await {
        tracing::error!(
            "Archive directory {:?} is not usable, skipping transmissions from {:?}",
            rule.archive_dir,
            rule.source_dir
        );
        return Summary {
            rules_skipped: 1,
            ..Default::default()
        };
    }
    let files = match walk::regular_files(&rule.source_dir).await {
        Ok(files) => files,
        Err(error) => {
            tracing::error!("{:#}", error);
            return Summary {
                rules_skipped: 1,
                ..Default::default()
            };
        }
    };
    if files.is_empty() {
        tracing::debug!("---→ {:?} found empty", rule.source_dir);
        return Summary::default();
    }
    let mut summary = Summary::default();
    for file in &files {
        if cancel.is_cancelled() {
            tracing::info!("Shutdown requested, leaving remaining files in {:?}", rule.source_dir);
            break;
        }
        summary += transmit_one(transport, target, rule, file).await;
    }
    summary
}

async fn transmit_one(
    transport: &dyn Transport,
    target: &ConnectionTarget,
    rule: &TransferRule,
    file: &std::path::Path,
) -> Summary {
    let Some(name) = file.file_name() else {
        return Summary::default();
    };
    let remote_path = rule.target_dir.join(name);
    let outcome = transport.push(target, file, &remote_path).await;
    if !outcome.success {
        tracing::debug!("{:?} left in place: {}", file, outcome);
        return Summary {
            transmit_failures: 1,
            ..Default::default()
        };
    }
    tracing::info!(
        "-> {} => {}:{}",
        file.display(),
        target.address,
        remote_path.display()
    );
    let archive_path = rule.archive_dir.join(name);
    match archive(file, &archive_path).await {
        Ok(()) => {
            tracing::debug!("{:?} moved to {:?}", file, archive_path);
            Summary {
                files_transmitted: 1,
                files_archived: 1,
                ..Default::default()
            }
        }
        Err(error) => {
            tracing::error!(
                "Could not move {:?} to {:?}: {:#}",
                file,
                rule.archive_dir,
                error
            );
            Summary {
                files_transmitted: 1,
                archive_failures: 1,
                ..Default::default()
            }
        }
    }
}

/// Move `src` to `dst`, falling back to copy + remove across filesystems
async fn archive(src: &std::path::Path, dst: &std::path::Path) -> anyhow::Result<()> {
    match tokio::fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::CrossesDevices => {
            tokio::fs::copy(src, dst)
                .await
                .with_context(|| format!("failed copying {:?} to {:?}", src, dst))?;
            tokio::fs::remove_file(src)
                .await
                .with_context(|| format!("failed removing {:?} after copying it", src))
        }
        Err(error) => {
            Err(error).with_context(|| format!("failed moving {:?} to {:?}", src, dst))
        }
    }
}
