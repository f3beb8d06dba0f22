use super::BranchJob;
use super::ledger::{LedgerKind, StatusLedger};
use crate::domain::branch::BranchPaths;
use crate::domain::clock::ClockRef;
use crate::domain::ports::{RemoteEntry, RemoteStoreRef, WorkQueueRef};
use crate::domain::transaction::{Classification, LedgerRow, TransactionStatus, WorkUnit};
use crate::error::{RelayError, Result};
use crate::interfaces::json::order_reader::{OrderTransformer, Transformed};
use async_trait::async_trait;
use std::ops::AddAssign;
use std::slice;
use tracing::{debug, info, warn};

/// Counters for one scanner tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub seen: usize,
    pub queued: usize,
    pub blocked: usize,
    /// Outside the target month; left in place.
    pub skipped: usize,
    /// Unreadable or unparseable; left in place.
    pub failed: usize,
}

impl AddAssign for ScanReport {
    fn add_assign(&mut self, other: Self) {
        self.seen += other.seen;
        self.queued += other.queued;
        self.blocked += other.blocked;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ingested {
    Queued,
    Blocked,
    OutOfRange,
}

fn is_json(name: &str) -> bool {
    name.rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("json"))
}

/// Picks up new branch files, records them and hands them to the submission worker.
pub struct IngestionScanner {
    store: RemoteStoreRef,
    queue: WorkQueueRef,
    ledger: StatusLedger,
    transformer: OrderTransformer,
    clock: ClockRef,
}

impl IngestionScanner {
    pub fn new(
        store: RemoteStoreRef,
        queue: WorkQueueRef,
        ledger: StatusLedger,
        transformer: OrderTransformer,
        clock: ClockRef,
    ) -> Self {
        Self {
            store,
            queue,
            ledger,
            transformer,
            clock,
        }
    }

    async fn ingest(&self, branch: &BranchPaths, entry: &RemoteEntry) -> Result<Ingested> {
        let payload = self.store.read(&entry.path).await?;
        let order = match self.transformer.transform(&payload)? {
            Transformed::OutOfRange { sysdate } => {
                debug!(file = %entry.path, %sysdate, "outside the target month, skipping");
                return Ok(Ingested::OutOfRange);
            }
            Transformed::Order(order) => order,
        };

        let classification = Classification::from_filename(&entry.name);
        let transaction_id = order.transaction_id().to_string();
        let now = self.clock.now();
        let today = now.date_naive();
        let details = serde_json::to_string(&order)?;
        let main_log = LedgerKind::Main.file_for(branch, today);

        let outcome = if classification == Classification::Blocked {
            let row = LedgerRow::new(
                now,
                &entry.name,
                &transaction_id,
                details,
                String::new(),
                TransactionStatus::Blocked,
            );
            let blocked_log = LedgerKind::Blocked.file_for(branch, today);
            self.ledger
                .append_rows(&blocked_log, slice::from_ref(&row))
                .await?;
            self.ledger
                .append_rows(&main_log, slice::from_ref(&row))
                .await?;
            Ingested::Blocked
        } else {
            let row = LedgerRow::new(
                now,
                &entry.name,
                &transaction_id,
                details,
                String::new(),
                TransactionStatus::Processing,
            );
            let mut kinds = vec![LedgerKind::Main];
            if classification == Classification::Void {
                kinds.push(LedgerKind::Void);
            }
            // A row left by a tick whose enqueue failed is reused, not duplicated.
            for kind in kinds {
                let recent = kind.recent_files(branch, now);
                if self
                    .ledger
                    .has_pending(&recent, &transaction_id, &entry.name)
                    .await?
                {
                    debug!(file = %entry.path, ?kind, "processing row already recorded");
                    continue;
                }
                self.ledger
                    .append_rows(&kind.file_for(branch, today), slice::from_ref(&row))
                    .await?;
            }

            let unit = WorkUnit {
                root: branch.root().to_string(),
                filename: entry.name.clone(),
                order_details: order,
            };
            self.queue.send(unit.encode()?).await?;
            Ingested::Queued
        };

        self.store.move_to_dir(&entry.path, &branch.archive()).await?;
        info!(
            branch = branch.name(),
            file = %entry.name,
            %transaction_id,
            ?classification,
            "file ingested"
        );
        Ok(outcome)
    }
}

#[async_trait]
impl BranchJob for IngestionScanner {
    type Report = ScanReport;
    const NAME: &'static str = "scanner";

    async fn run_branch(&self, branch: &BranchPaths) -> Result<ScanReport> {
        if !self.store.exists(branch.root()).await? {
            return Err(RelayError::Connectivity(format!(
                "branch root {} does not exist",
                branch.root()
            )));
        }
        for dir in branch.scanner_dirs() {
            if self.store.create_dir_if_missing(&dir).await? {
                info!(branch = branch.name(), %dir, "created branch directory");
            }
        }

        let mut report = ScanReport::default();
        let files = self.store.list_files(branch.root()).await?;
        for entry in files.iter().filter(|entry| is_json(&entry.name)) {
            report.seen += 1;
            match self.ingest(branch, entry).await {
                Ok(Ingested::Queued) => report.queued += 1,
                Ok(Ingested::Blocked) => report.blocked += 1,
                Ok(Ingested::OutOfRange) => report.skipped += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(RelayError::Parse(reason)) => {
                    warn!(file = %entry.path, %reason, "unparseable order file, leaving it in place");
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(file = %entry.path, error = %e, "could not ingest file");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}
