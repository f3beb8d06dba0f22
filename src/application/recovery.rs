use super::BranchJob;
use super::ledger::StatusLedger;
use crate::domain::branch::BranchPaths;
use crate::domain::ports::RemoteStoreRef;
use crate::domain::transaction::TransactionStatus;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::ops::AddAssign;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Quarantined files moved back to the branch root.
    pub readmitted: usize,
    /// Quarantined files that hit the retry cap.
    pub dead_lettered: usize,
    /// Failed-ledger files moved to the holding directory.
    pub logs_moved: usize,
    pub failed: usize,
}

impl AddAssign for RecoveryReport {
    fn add_assign(&mut self, other: Self) {
        self.readmitted += other.readmitted;
        self.dead_lettered += other.dead_lettered;
        self.logs_moved += other.logs_moved;
        self.failed += other.failed;
    }
}

/// Daily job that gives quarantined files another pass through the scanner.
pub struct RetryMover {
    store: RemoteStoreRef,
    ledger: StatusLedger,
    /// 0 means files are retried forever.
    max_attempts: u32,
}

impl RetryMover {
    pub fn new(store: RemoteStoreRef, ledger: StatusLedger, max_attempts: u32) -> Self {
        Self {
            store,
            ledger,
            max_attempts,
        }
    }

    /// Failed-ledger rows per source file name, over the live and held failed ledgers.
    async fn failure_counts(&self, branch: &BranchPaths) -> Result<HashMap<String, u32>> {
        let mut counts = HashMap::new();
        for dir in [branch.failed_logs(), branch.to_be_deleted()] {
            for entry in self.store.list_files(&dir).await? {
                let rows = match self.ledger.rows(&entry.path).await {
                    Ok(rows) => rows,
                    Err(e) => {
                        warn!(file = %entry.path, error = %e, "unreadable failed ledger, not counted");
                        continue;
                    }
                };
                for row in rows {
                    if row.status() == Some(TransactionStatus::Failed) {
                        *counts.entry(row.file_name).or_insert(0) += 1;
                    }
                }
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl BranchJob for RetryMover {
    type Report = RecoveryReport;
    const NAME: &'static str = "retry";

    async fn run_branch(&self, branch: &BranchPaths) -> Result<RecoveryReport> {
        for dir in [
            branch.root().to_string(),
            branch.quarantine(),
            branch.failed_logs(),
        ] {
            if !self.store.exists(&dir).await? {
                info!(branch = branch.name(), %dir, "directory missing, nothing to recover");
                return Ok(RecoveryReport::default());
            }
        }
        self.store
            .create_dir_if_missing(&branch.to_be_deleted())
            .await?;

        let mut report = RecoveryReport::default();
        let quarantined = self.store.list_files(&branch.quarantine()).await?;
        let counts = if self.max_attempts > 0 && !quarantined.is_empty() {
            self.failure_counts(branch).await?
        } else {
            HashMap::new()
        };

        let exhausted = |name: &str| {
            self.max_attempts > 0
                && counts.get(name).copied().unwrap_or(0) >= self.max_attempts
        };
        let mut dead_letter_ready = true;
        if quarantined.iter().any(|entry| exhausted(entry.name.as_str()))
            && let Err(e) = self
                .store
                .create_dir_if_missing(&branch.dead_letter())
                .await
        {
            warn!(branch = branch.name(), error = %e, "cannot create dead-letter directory");
            dead_letter_ready = false;
        }

        for entry in quarantined {
            let attempts = counts.get(&entry.name).copied().unwrap_or(0);
            let dead_letter = exhausted(entry.name.as_str());
            if dead_letter && !dead_letter_ready {
                warn!(file = %entry.path, attempts, "retry limit reached, left in quarantine");
                report.failed += 1;
                continue;
            }
            let destination = if dead_letter {
                branch.dead_letter()
            } else {
                branch.root().to_string()
            };

            match self.store.move_to_dir(&entry.path, &destination).await {
                Ok(_) if dead_letter => {
                    warn!(
                        branch = branch.name(),
                        file = %entry.name,
                        attempts,
                        "retry limit reached, file dead-lettered"
                    );
                    report.dead_lettered += 1;
                }
                Ok(_) => report.readmitted += 1,
                Err(e) => {
                    warn!(file = %entry.path, error = %e, "could not move quarantined file");
                    report.failed += 1;
                }
            }
        }

        for entry in self.store.list_files(&branch.failed_logs()).await? {
            match self
                .store
                .move_to_dir(&entry.path, &branch.to_be_deleted())
                .await
            {
                Ok(_) => report.logs_moved += 1,
                Err(e) => {
                    warn!(file = %entry.path, error = %e, "could not move failed ledger");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}
