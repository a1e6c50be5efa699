//! Endless sync loop for one resolved connection

use std::sync::Arc;

use common::ConnectionConfig;
use remote::Transports;
use tokio_util::sync::CancellationToken;

use crate::summary::Summary;
use crate::{inbound, outbound};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Running,
    Terminated,
}

#[derive(Debug)]
pub struct Scheduler {
    config: Arc<ConnectionConfig>,
    transports: Transports,
    wait: std::time::Duration,
    cancel: CancellationToken,
    state: State,
}

impl Scheduler {
    pub fn new(
        config: Arc<ConnectionConfig>,
        transports: Transports,
        wait: std::time::Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            transports,
            wait,
            cancel,
            state: State::Running,
        }
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// One pass over every transmit rule and then every receive rule, in declared order
    pub async fn tick(&self) -> Summary {
        let target = &self.config.target;
        let mut summary = Summary::default();
        for rule in &self.config.transmit_rules {
            if self.cancel.is_cancelled() {
                return summary;
            }
            summary +=
                outbound::transmit(self.transports.get(rule.transport), target, rule, &self.cancel)
                    .await;
        }
        for rule in &self.config.receive_rules {
            if self.cancel.is_cancelled() {
                return summary;
            }
            summary +=
                inbound::receive(self.transports.get(rule.transport), target, rule, &self.cancel)
                    .await;
        }
        summary
    }

    /// Tick, sleep, repeat until cancelled
    ///
    /// The sleep starts after the tick completes, so the period is the tick duration plus the
    /// wait.
    pub async fn run(&mut self) -> State {
        while self.state == State::Running {
            report(&self.tick().await);
            tokio::select! {
                () = self.cancel.cancelled() => {
                    self.state = State::Terminated;
                }
                () = tokio::time::sleep(self.wait) => {
                    tracing::debug!("---→ Waking up after {}", humantime::format_duration(self.wait));
                }
            }
        }
        self.state
    }

    /// A single tick without the loop; `Terminated` if cancellation arrived during the tick
    pub async fn run_once(&mut self) -> State {
        report(&self.tick().await);
        if self.cancel.is_cancelled() {
            self.state = State::Terminated;
        }
        self.state
    }
}

fn report(summary: &Summary) {
    match summary.failures() {
        _ if summary.is_idle() => tracing::debug!("tick: nothing to do"),
        0 => tracing::info!("tick: {}", summary),
        failures => tracing::info!("tick: {}; {} file(s) left for the next tick", summary, failures),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{self, Call, FakeTransport};
    use common::{ReceiveRule, TransferRule, TransportKind};
    use tracing_test::traced_test;

    fn config(
        transmit_rules: Vec<TransferRule>,
        receive_rules: Vec<ReceiveRule>,
    ) -> Arc<ConnectionConfig> {
        Arc::new(ConnectionConfig {
            target: testutils::target(),
            transmit_rules,
            receive_rules,
        })
    }

    #[tokio::test]
    #[traced_test]
    async fn empty_tick_is_idle() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let source_dir = tmp_dir.path().join("out");
        let archive_dir = tmp_dir.path().join("sent");
        let inbox = tmp_dir.path().join("in");
        for dir in [&source_dir, &archive_dir, &inbox] {
            tokio::fs::create_dir(dir).await?;
        }
        let remote_copy = Arc::new(FakeTransport::new(TransportKind::RemoteCopy));
        let session = Arc::new(FakeTransport::new(TransportKind::Session));
        let scheduler = Scheduler::new(
            config(
                vec![TransferRule {
                    source_dir,
                    target_dir: "/upload".into(),
                    archive_dir: archive_dir.clone(),
                    transport: TransportKind::RemoteCopy,
                }],
                vec![ReceiveRule {
                    source_dir: "/download".into(),
                    target_dir: inbox.clone(),
                    transport: TransportKind::Session,
                }],
            ),
            Transports::with(remote_copy.clone(), session.clone()),
            std::time::Duration::from_secs(1),
            CancellationToken::new(),
        );
        for _ in 0..2 {
            assert!(scheduler.tick().await.is_idle());
        }
        assert!(remote_copy.calls().is_empty());
        assert_eq!(
            session.calls(),
            vec![
                Call::List {
                    dir: "/download".into()
                };
                2
            ]
        );
        assert_eq!(testutils::count_entries(&archive_dir), 0);
        assert_eq!(testutils::count_entries(&inbox), 0);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn rules_use_their_own_transport() -> anyhow::Result<()> {
        let tmp_dir = testutils::setup_source_dir().await?;
        let archive_dir = tmp_dir.path().join("sent");
        let inbox = tmp_dir.path().join("in");
        tokio::fs::create_dir(&archive_dir).await?;
        tokio::fs::create_dir(&inbox).await?;
        let remote_copy = Arc::new(FakeTransport::new(TransportKind::RemoteCopy));
        let session = Arc::new(FakeTransport::new(TransportKind::Session).with_remote(&["x.txt"]));
        let scheduler = Scheduler::new(
            config(
                vec![TransferRule {
                    source_dir: tmp_dir.path().join("out"),
                    target_dir: "/upload".into(),
                    archive_dir: archive_dir.clone(),
                    transport: TransportKind::RemoteCopy,
                }],
                vec![ReceiveRule {
                    source_dir: "/download".into(),
                    target_dir: inbox.clone(),
                    transport: TransportKind::Session,
                }],
            ),
            Transports::with(remote_copy.clone(), session.clone()),
            std::time::Duration::from_secs(1),
            CancellationToken::new(),
        );
        let summary = scheduler.tick().await;
        assert_eq!(summary.files_archived, 4);
        assert_eq!(summary.files_received, 1);
        assert!(
            remote_copy
                .calls()
                .iter()
                .all(|call| matches!(call, Call::Push { .. }))
        );
        assert!(
            session
                .calls()
                .iter()
                .all(|call| !matches!(call, Call::Push { .. }))
        );
        assert!(inbox.join("x.txt").exists());
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn cancellation_terminates_the_loop() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let cancel = CancellationToken::new();
        let session = Arc::new(
            FakeTransport::new(TransportKind::Session).cancel_on_list(3, cancel.clone()),
        );
        let mut scheduler = Scheduler::new(
            config(
                vec![],
                vec![ReceiveRule {
                    source_dir: "/download".into(),
                    target_dir: tmp_dir.path().to_path_buf(),
                    transport: TransportKind::Session,
                }],
            ),
            Transports::with(
                Arc::new(FakeTransport::new(TransportKind::RemoteCopy)),
                session.clone(),
            ),
            std::time::Duration::from_millis(10),
            cancel,
        );
        assert_eq!(scheduler.state(), State::Running);
        assert_eq!(scheduler.run().await, State::Terminated);
        assert_eq!(scheduler.state(), State::Terminated);
        assert_eq!(session.calls().len(), 3);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn cancellation_cuts_the_sleep_short() -> anyhow::Result<()> {
        let cancel = CancellationToken::new();
        let mut scheduler = Scheduler::new(
            config(vec![], vec![]),
            Transports::with(
                Arc::new(FakeTransport::new(TransportKind::RemoteCopy)),
                Arc::new(FakeTransport::new(TransportKind::Session)),
            ),
            std::time::Duration::from_secs(3600),
            cancel.clone(),
        );
        let handle = tokio::spawn(async move { scheduler.run().await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();
        let state = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await??;
        assert_eq!(state, State::Terminated);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn single_tick_reports_failures_left_for_retry() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let session = Arc::new(
            FakeTransport::new(TransportKind::Session)
                .with_remote(&["a.txt", "b.txt"])
                .fail("b.txt", 1),
        );
        let mut scheduler = Scheduler::new(
            config(
                vec![],
                vec![ReceiveRule {
                    source_dir: "/download".into(),
                    target_dir: tmp_dir.path().to_path_buf(),
                    transport: TransportKind::Session,
                }],
            ),
            Transports::with(
                Arc::new(FakeTransport::new(TransportKind::RemoteCopy)),
                session.clone(),
            ),
            std::time::Duration::from_secs(3600),
            CancellationToken::new(),
        );
        assert_eq!(scheduler.run_once().await, State::Running);
        assert!(logs_contain("1 file(s) left for the next tick"));
        assert_eq!(session.remote_entries(), vec!["b.txt"]);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn single_tick_cancelled_midway_is_terminated() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let cancel = CancellationToken::new();
        let session = Arc::new(
            FakeTransport::new(TransportKind::Session)
                .with_remote(&["a.txt"])
                .cancel_on_list(1, cancel.clone()),
        );
        let mut scheduler = Scheduler::new(
            config(
                vec![],
                vec![ReceiveRule {
                    source_dir: "/download".into(),
                    target_dir: tmp_dir.path().to_path_buf(),
                    transport: TransportKind::Session,
                }],
            ),
            Transports::with(
                Arc::new(FakeTransport::new(TransportKind::RemoteCopy)),
                session,
            ),
            std::time::Duration::from_secs(3600),
            cancel,
        );
        assert_eq!(scheduler.run_once().await, State::Terminated);
        assert_eq!(scheduler.state(), State::Terminated);
        Ok(())
    }
}
