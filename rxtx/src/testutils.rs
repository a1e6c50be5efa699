use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use common::{ConnectionTarget, TransportKind};
use remote::{RemoteListing, TransferOutcome, Transport};
use tokio_util::sync::CancellationToken;

pub async fn setup_source_dir() -> anyhow::Result<tempfile::TempDir> {
    let tmp_dir = tempfile::tempdir()?;
    // out
    // |- 0.txt
    // |- bar
    //    |- 1.txt
    //    |- 2.txt
    // |- baz
    //    |- 3.txt
    //    |- link.txt -> ../0.txt
    let out_path = tmp_dir.path().join("out");
    tokio::fs::create_dir(&out_path).await?;
    tokio::fs::write(out_path.join("0.txt"), "0").await?;
    let bar_path = out_path.join("bar");
    tokio::fs::create_dir(&bar_path).await?;
    tokio::fs::write(bar_path.join("1.txt"), "1").await?;
    tokio::fs::write(bar_path.join("2.txt"), "2").await?;
    let baz_path = out_path.join("baz");
    tokio::fs::create_dir(&baz_path).await?;
    tokio::fs::write(baz_path.join("3.txt"), "3").await?;
    tokio::fs::symlink("../0.txt", baz_path.join("link.txt")).await?;
    Ok(tmp_dir)
}

pub fn target() -> ConnectionTarget {
    ConnectionTarget {
        id: 1,
        name: "prod".to_string(),
        address: "prod-host".to_string(),
    }
}

pub fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Push { local: PathBuf, remote: PathBuf },
    Pull { remote: PathBuf, local: PathBuf },
    Remove { remote: PathBuf },
    List { dir: PathBuf },
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<Call>,
    remote: Vec<String>,
    lists: usize,
}

/// In-memory transport recording every call
///
/// The remote side is a flat list of names shared by all directories. Pulls write the name into
/// the local path so that callers can check what landed.
#[derive(Debug)]
pub struct FakeTransport {
    kind: TransportKind,
    failures: HashMap<String, i32>,
    remove_failures: HashMap<String, i32>,
    list_failure: Option<i32>,
    cancel_on_list: Option<(usize, CancellationToken)>,
    state: Mutex<State>,
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn outcome(code: Option<&i32>) -> TransferOutcome {
    match code {
        Some(&code) => TransferOutcome::exited(code, Some("simulated failure".to_string())),
        None => TransferOutcome::succeeded(),
    }
}

impl FakeTransport {
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            failures: HashMap::new(),
            remove_failures: HashMap::new(),
            list_failure: None,
            cancel_on_list: None,
            state: Mutex::new(State::default()),
        }
    }

    /// Fail pushes and pulls of files with this base name
    pub fn fail(mut self, name: &str, exit_code: i32) -> Self {
        self.failures.insert(name.to_string(), exit_code);
        self
    }

    pub fn fail_remove(mut self, name: &str, exit_code: i32) -> Self {
        self.remove_failures.insert(name.to_string(), exit_code);
        self
    }

    pub fn fail_list(mut self, exit_code: i32) -> Self {
        self.list_failure = Some(exit_code);
        self
    }

    pub fn with_remote(self, names: &[&str]) -> Self {
        self.state.lock().unwrap().remote = names.iter().map(|name| name.to_string()).collect();
        self
    }

    /// Cancel `token` while serving the `count`-th listing
    pub fn cancel_on_list(mut self, count: usize, token: CancellationToken) -> Self {
        self.cancel_on_list = Some((count, token));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn remote_entries(&self) -> Vec<String> {
        self.state.lock().unwrap().remote.clone()
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn push(
        &self,
        _target: &ConnectionTarget,
        local_path: &Path,
        remote_path: &Path,
    ) -> TransferOutcome {
        self.state.lock().unwrap().calls.push(Call::Push {
            local: local_path.to_path_buf(),
            remote: remote_path.to_path_buf(),
        });
        outcome(self.failures.get(&base_name(local_path)))
    }

    async fn pull(
        &self,
        _target: &ConnectionTarget,
        remote_path: &Path,
        local_path: &Path,
    ) -> TransferOutcome {
        self.state.lock().unwrap().calls.push(Call::Pull {
            remote: remote_path.to_path_buf(),
            local: local_path.to_path_buf(),
        });
        let name = base_name(remote_path);
        let outcome = outcome(self.failures.get(&name));
        if outcome.success {
            std::fs::write(local_path, &name).unwrap();
        }
        outcome
    }

    async fn remove_remote(&self, _target: &ConnectionTarget, remote_path: &Path) -> TransferOutcome {
        let name = base_name(remote_path);
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Remove {
            remote: remote_path.to_path_buf(),
        });
        let outcome = outcome(self.remove_failures.get(&name));
        if outcome.success {
            state.remote.retain(|entry| *entry != name);
        }
        outcome
    }

    async fn list_remote_dir(&self, _target: &ConnectionTarget, remote_dir: &Path) -> RemoteListing {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::List {
            dir: remote_dir.to_path_buf(),
        });
        state.lists += 1;
        if let Some((_, token)) = self
            .cancel_on_list
            .as_ref()
            .filter(|(count, _)| state.lists >= *count)
        {
            token.cancel();
        }
        match self.list_failure {
            Some(code) => RemoteListing::failed(outcome(Some(&code))),
            None => RemoteListing {
                outcome: TransferOutcome::succeeded(),
                entries: state.remote.clone(),
            },
        }
    }
}
