//! Inbound sync step: pull every entry of a rule's remote directory, delete it remotely on success

use common::{ConnectionTarget, ReceiveRule};
use remote::Transport;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::outbound::is_dir;
use crate::summary::Summary;

/// Run one receive rule
///
/// A remote file is removed only after, and only if, its pull succeeded; on failure it stays on
/// the remote side and shows up in the next listing. A failed, empty or unparsable listing means
/// there is nothing to do.
#[instrument(skip_all, fields(source_dir = ?rule.source_dir, transport = %transport.kind()))]
pub async fn receive(
    transport: &dyn Transport,
    target: &ConnectionTarget,
    rule: &ReceiveRule,
    cancel: &CancellationToken,
) -> Summary {
    if !is_dir(&rule.target_dir).await {
        tracing::error!(
            "Target directory {:?} is not usable, skipping receptions from {}:{}",
            rule.target_dir,
            target.address,
            rule.source_dir.display()
        );
        return Summary {
            rules_skipped: 1,
            ..Default::default()
        };
    }
    let listing = transport.list_remote_dir(target, &rule.source_dir).await;
    if !listing.outcome.success {
        tracing::info!(
            "Cannot list {}:{}: {}",
            target.address,
            rule.source_dir.display(),
            listing.outcome
        );
        return Summary::default();
    }
    if listing.entries.is_empty() {
        tracing::debug!("---→ {:?} found empty.", rule.source_dir);
        return Summary::default();
    }
    tracing::debug!("<- {:?}", listing.entries);
    let mut summary = Summary::default();
    for entry in &listing.entries {
        if cancel.is_cancelled() {
            tracing::info!(
                "Shutdown requested, leaving remaining files in {}:{}",
                target.address,
                rule.source_dir.display()
            );
            break;
        }
        summary += receive_one(transport, target, rule, entry).await;
    }
    summary
}

async fn receive_one(
    transport: &dyn Transport,
    target: &ConnectionTarget,
    rule: &ReceiveRule,
    entry: &str,
) -> Summary {
    let remote_path = rule.source_dir.join(entry);
    let local_path = rule.target_dir.join(entry);
    let outcome = transport.pull(target, &remote_path, &local_path).await;
    if !outcome.success {
        tracing::debug!(
            "{}:{} left in place: {}",
            target.address,
            remote_path.display(),
            outcome
        );
        return Summary {
            receive_failures: 1,
            ..Default::default()
        };
    }
    tracing::info!(
        "<- {}:{} => {}",
        target.address,
        remote_path.display(),
        local_path.display()
    );
    let removed = transport.remove_remote(target, &remote_path).await;
    if removed.success {
        tracing::debug!("{}:{} removed", target.address, remote_path.display());
        Summary {
            files_received: 1,
            files_removed: 1,
            ..Default::default()
        }
    } else {
        tracing::error!(
            "Could not remove {}:{}: {}",
            target.address,
            remote_path.display(),
            removed
        );
        Summary {
            files_received: 1,
            remove_failures: 1,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{self, Call, FakeTransport};
    use common::TransportKind;
    use tracing_test::traced_test;

    fn rule(target_dir: &std::path::Path) -> ReceiveRule {
        ReceiveRule {
            source_dir: "/download".into(),
            target_dir: target_dir.to_path_buf(),
            transport: TransportKind::RemoteCopy,
        }
    }

    fn removes(calls: &[Call]) -> Vec<std::path::PathBuf> {
        calls
            .iter()
            .filter_map(|call| match call {
                Call::Remove { remote } => Some(remote.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    #[traced_test]
    async fn received_files_are_removed_exactly_once() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let rule = rule(tmp_dir.path());
        let transport =
            FakeTransport::new(TransportKind::RemoteCopy).with_remote(&["a.txt", "b.txt"]);
        let summary = receive(
            &transport,
            &testutils::target(),
            &rule,
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(summary.files_received, 2);
        assert_eq!(summary.files_removed, 2);
        assert_eq!(
            transport.calls(),
            vec![
                Call::List {
                    dir: "/download".into()
                },
                Call::Pull {
                    remote: "/download/a.txt".into(),
                    local: tmp_dir.path().join("a.txt"),
                },
                Call::Remove {
                    remote: "/download/a.txt".into()
                },
                Call::Pull {
                    remote: "/download/b.txt".into(),
                    local: tmp_dir.path().join("b.txt"),
                },
                Call::Remove {
                    remote: "/download/b.txt".into()
                },
            ]
        );
        assert!(tmp_dir.path().join("a.txt").exists());
        assert!(transport.remote_entries().is_empty());
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_pull_is_never_removed() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let rule = rule(tmp_dir.path());
        let transport = FakeTransport::new(TransportKind::RemoteCopy)
            .with_remote(&["b.txt"])
            .fail("b.txt", 2);
        let cancel = CancellationToken::new();
        let summary = receive(&transport, &testutils::target(), &rule, &cancel).await;
        assert_eq!(summary.receive_failures, 1);
        assert_eq!(summary.files_removed, 0);
        assert!(removes(&transport.calls()).is_empty());
        // still there on the next tick
        receive(&transport, &testutils::target(), &rule, &cancel).await;
        let calls = transport.calls();
        assert_eq!(
            calls
                .iter()
                .filter(|call| matches!(call, Call::Pull { .. }))
                .count(),
            2
        );
        assert!(removes(&calls).is_empty());
        assert_eq!(transport.remote_entries(), vec!["b.txt"]);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_remove_is_reported() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let rule = rule(tmp_dir.path());
        let transport = FakeTransport::new(TransportKind::RemoteCopy)
            .with_remote(&["c.txt"])
            .fail_remove("c.txt", 1);
        let summary = receive(
            &transport,
            &testutils::target(),
            &rule,
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(summary.files_received, 1);
        assert_eq!(summary.remove_failures, 1);
        assert_eq!(removes(&transport.calls()).len(), 1);
        assert!(logs_contain("Could not remove prod-host:/download/c.txt"));
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn empty_listing_does_nothing() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let rule = rule(tmp_dir.path());
        let transport = FakeTransport::new(TransportKind::Session);
        let summary = receive(
            &transport,
            &testutils::target(),
            &rule,
            &CancellationToken::new(),
        )
        .await;
        assert!(summary.is_idle());
        assert_eq!(
            transport.calls(),
            vec![Call::List {
                dir: "/download".into()
            }]
        );
        assert_eq!(testutils::count_entries(tmp_dir.path()), 0);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_listing_is_not_an_error() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let rule = rule(tmp_dir.path());
        let transport = FakeTransport::new(TransportKind::Session)
            .with_remote(&["a.txt"])
            .fail_list(2);
        let summary = receive(
            &transport,
            &testutils::target(),
            &rule,
            &CancellationToken::new(),
        )
        .await;
        assert!(summary.is_idle());
        assert_eq!(transport.calls().len(), 1);
        assert!(logs_contain("Cannot list prod-host:/download"));
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_target_dir_skips_rule() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let rule = rule(&tmp_dir.path().join("missing"));
        let transport = FakeTransport::new(TransportKind::Session).with_remote(&["a.txt"]);
        let summary = receive(
            &transport,
            &testutils::target(),
            &rule,
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(summary.rules_skipped, 1);
        assert!(transport.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn outcome_depends_only_on_own_result() -> anyhow::Result<()> {
        let names = ["a.txt", "b.txt", "c.txt", "d.txt"];
        let mut remaining = vec![];
        for order in [names, [names[3], names[1], names[0], names[2]]] {
            let tmp_dir = tempfile::tempdir()?;
            let transport = FakeTransport::new(TransportKind::Session)
                .with_remote(&order)
                .fail("b.txt", 1)
                .fail("d.txt", 3);
            receive(
                &transport,
                &testutils::target(),
                &rule(tmp_dir.path()),
                &CancellationToken::new(),
            )
            .await;
            let mut left = transport.remote_entries();
            left.sort();
            remaining.push(left);
        }
        assert_eq!(remaining[0], vec!["b.txt", "d.txt"]);
        assert_eq!(remaining[0], remaining[1]);
        Ok(())
    }
}
