//! Application layer: the four relay jobs and the machinery that drives them.
//!
//! Three jobs ([`scanner`], [`recovery`], [`notifier`]) work branch by branch
//! through [`run_branches`]; the [`worker`] is driven by the queue instead.

pub mod ledger;
pub mod notifier;
pub mod recovery;
pub mod scanner;
pub mod scheduler;
pub mod worker;

use crate::domain::branch::{BranchPaths, join};
use crate::domain::ports::RemoteStore;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::ops::AddAssign;
use std::time::Duration;
use tracing::{error, info, warn};

/// A job that runs once per allow-listed branch on every tick.
#[async_trait]
pub trait BranchJob: Send + Sync {
    /// Per-branch counters, summed over a tick.
    type Report: Default + AddAssign + Debug + Send;

    const NAME: &'static str;

    async fn run_branch(&self, branch: &BranchPaths) -> Result<Self::Report>;
}

/// Which branches a tick visits and how long each may take.
#[derive(Debug, Clone)]
pub struct BranchSet {
    pub inbox_root: String,
    pub allow_list: Vec<String>,
    pub timeout: Duration,
}

/// Sub-directories of the inbox root whose name is on the allow-list, ignoring case.
pub async fn discover_branches(
    store: &dyn RemoteStore,
    inbox_root: &str,
    allow_list: &[String],
) -> Result<Vec<BranchPaths>> {
    let branches = store
        .list_dirs(inbox_root)
        .await?
        .into_iter()
        .filter(|entry| {
            allow_list
                .iter()
                .any(|allowed| allowed.trim().eq_ignore_ascii_case(&entry.name))
        })
        .map(|entry| BranchPaths::new(join(inbox_root, &entry.name)))
        .collect();
    Ok(branches)
}

/// Runs `job` over every discovered branch, one at a time.
///
/// A branch that fails or exceeds the timeout is logged and skipped. Only a
/// failure to list the inbox root or a fatal error aborts the tick.
pub async fn run_branches<J: BranchJob>(
    job: &J,
    store: &dyn RemoteStore,
    set: &BranchSet,
) -> Result<J::Report> {
    let branches = discover_branches(store, &set.inbox_root, &set.allow_list).await?;
    if branches.is_empty() {
        warn!(job = J::NAME, inbox = %set.inbox_root, "no allow-listed branch directories found");
    }

    let mut total = J::Report::default();
    for branch in branches {
        match tokio::time::timeout(set.timeout, job.run_branch(&branch)).await {
            Ok(Ok(report)) => {
                info!(job = J::NAME, branch = branch.name(), ?report, "branch done");
                total += report;
            }
            Ok(Err(e)) if e.is_fatal() => return Err(e),
            Ok(Err(e)) => {
                error!(job = J::NAME, branch = branch.name(), error = %e, "branch failed");
            }
            Err(_) => {
                warn!(
                    job = J::NAME,
                    branch = branch.name(),
                    timeout_secs = set.timeout.as_secs(),
                    "branch timed out, moving on"
                );
            }
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use crate::infrastructure::in_memory::InMemoryStore;
    use std::sync::Mutex;

    #[derive(Debug, Default, PartialEq)]
    struct Visits(Vec<String>);

    impl AddAssign for Visits {
        fn add_assign(&mut self, other: Self) {
            self.0.extend(other.0);
        }
    }

    struct RecordingJob {
        fail_on: Option<&'static str>,
        fatal: bool,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BranchJob for RecordingJob {
        type Report = Visits;
        const NAME: &'static str = "recording";

        async fn run_branch(&self, branch: &BranchPaths) -> Result<Visits> {
            self.seen.lock().unwrap().push(branch.name().to_string());
            if self.fail_on == Some(branch.name()) {
                return Err(if self.fatal {
                    RelayError::Auth("denied".to_string())
                } else {
                    RelayError::Connectivity("gone".to_string())
                });
            }
            Ok(Visits(vec![branch.root().to_string()]))
        }
    }

    fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        for dir in ["/inbox/BR01", "/inbox/br02", "/inbox/BR03", "/inbox/other"] {
            store.seed_dir(dir);
        }
        store
    }

    fn set() -> BranchSet {
        BranchSet {
            inbox_root: "/inbox".to_string(),
            allow_list: vec!["br01".to_string(), "BR02".to_string(), "BR03".to_string()],
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_discovery_is_case_insensitive() {
        let store = store();
        let branches = discover_branches(&store, "/inbox", &set().allow_list)
            .await
            .unwrap();
        let roots: Vec<_> = branches.iter().map(|b| b.root().to_string()).collect();
        assert_eq!(roots, vec!["/inbox/BR01", "/inbox/BR03", "/inbox/br02"]);
    }

    #[tokio::test]
    async fn test_failed_branch_does_not_stop_the_tick() {
        let store = store();
        let job = RecordingJob {
            fail_on: Some("BR03"),
            fatal: false,
            seen: Mutex::new(Vec::new()),
        };
        let report = run_branches(&job, &store, &set()).await.unwrap();
        assert_eq!(report.0, vec!["/inbox/BR01", "/inbox/br02"]);
        assert_eq!(job.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_the_tick() {
        let store = store();
        let job = RecordingJob {
            fail_on: Some("BR01"),
            fatal: true,
            seen: Mutex::new(Vec::new()),
        };
        let result = run_branches(&job, &store, &set()).await;
        assert!(matches!(result, Err(RelayError::Auth(_))));
        assert_eq!(job.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_inbox_is_an_error() {
        let store = store();
        store.set_offline(true);
        let job = RecordingJob {
            fail_on: None,
            fatal: false,
            seen: Mutex::new(Vec::new()),
        };
        assert!(run_branches(&job, &store, &set()).await.is_err());
    }
}
