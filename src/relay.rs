//! Wires configuration, adapters and jobs together for each command.

use crate::application::ledger::StatusLedger;
use crate::application::notifier::{FailureNotifier, NotifyReport};
use crate::application::recovery::{RecoveryReport, RetryMover};
use crate::application::scanner::{IngestionScanner, ScanReport};
use crate::application::scheduler::{Schedule, run_periodic};
use crate::application::worker::{DrainReport, SubmissionWorker};
use crate::application::{BranchJob, BranchSet, run_branches};
use crate::config::Config;
use crate::domain::clock::{BranchClock, ClockRef};
use crate::domain::ports::{AccountingApiRef, MailerRef, RemoteStoreRef, WorkQueueRef};
use crate::error::Result;
use crate::infrastructure::business_central::BusinessCentralClient;
use crate::infrastructure::local_fs::LocalFsStore;
use crate::infrastructure::smtp::SmtpMailer;
use crate::infrastructure::spool_queue::SpoolQueue;
use crate::interfaces::json::order_reader::OrderTransformer;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct Relay {
    config: Config,
    store: RemoteStoreRef,
    clock: ClockRef,
}

impl Relay {
    /// Opens the store mounted at `STORE_ROOT`.
    pub async fn connect(config: Config) -> Result<Self> {
        let store: RemoteStoreRef = Arc::new(LocalFsStore::open(&config.store_root).await?);
        Ok(Self::new(config, store, Arc::new(BranchClock)))
    }

    pub fn new(config: Config, store: RemoteStoreRef, clock: ClockRef) -> Self {
        Self {
            config,
            store,
            clock,
        }
    }

    fn ledger(&self) -> StatusLedger {
        StatusLedger::new(self.store.clone(), self.config.ledger_match)
    }

    fn branch_set(&self) -> BranchSet {
        BranchSet {
            inbox_root: self.config.inbox_root.clone(),
            allow_list: self.config.branches.clone(),
            timeout: self.config.branch_timeout,
        }
    }

    async fn open_queue(&self) -> Result<WorkQueueRef> {
        let queue = SpoolQueue::open(
            &self.config.queue_dir,
            &self.config.queue_name,
            self.config.queue_lease_timeout,
        )
        .await?;
        Ok(Arc::new(queue))
    }

    fn accounting_api(&self) -> Result<AccountingApiRef> {
        let client = BusinessCentralClient::new(self.config.accounting()?.clone())?;
        Ok(Arc::new(client))
    }

    fn notifier(&self) -> Result<FailureNotifier> {
        let notification = self.config.notification()?;
        let mailer: MailerRef = Arc::new(SmtpMailer::new(&notification.smtp)?);
        Ok(FailureNotifier::new(
            self.store.clone(),
            mailer,
            notification.template.clone(),
        ))
    }

    fn scanner(&self, queue: WorkQueueRef) -> IngestionScanner {
        IngestionScanner::new(
            self.store.clone(),
            queue,
            self.ledger(),
            OrderTransformer::new(self.config.target_month),
            self.clock.clone(),
        )
    }

    fn worker(&self, queue: WorkQueueRef, api: AccountingApiRef) -> SubmissionWorker {
        SubmissionWorker::new(
            self.store.clone(),
            queue,
            api,
            self.ledger(),
            self.clock.clone(),
        )
    }

    fn retry_mover(&self) -> RetryMover {
        RetryMover::new(
            self.store.clone(),
            self.ledger(),
            self.config.retry_max_attempts,
        )
    }

    async fn tick<J: BranchJob>(&self, job: &J) -> Result<J::Report> {
        let report = run_branches(job, self.store.as_ref(), &self.branch_set()).await?;
        info!(job = J::NAME, ?report, "tick complete");
        Ok(report)
    }

    pub async fn scan(&self) -> Result<ScanReport> {
        let queue = self.open_queue().await?;
        self.tick(&self.scanner(queue)).await
    }

    pub async fn submit(&self) -> Result<DrainReport> {
        let api = self.accounting_api()?;
        let queue = self.open_queue().await?;
        let report = self.worker(queue, api).drain().await?;
        info!(job = "worker", ?report, "queue drained");
        Ok(report)
    }

    pub async fn retry(&self) -> Result<RecoveryReport> {
        self.tick(&self.retry_mover()).await
    }

    pub async fn notify(&self) -> Result<NotifyReport> {
        self.tick(&self.notifier()?).await
    }

    /// Runs all four jobs on their schedules until `shutdown` is cancelled or one
    /// of them hits a fatal error.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let api = self.accounting_api()?;
        let notifier = Arc::new(self.notifier()?);
        let queue = self.open_queue().await?;
        let scanner = Arc::new(self.scanner(queue.clone()));
        let worker = Arc::new(self.worker(queue, api));
        let retry_mover = Arc::new(self.retry_mover());

        let mut tasks = JoinSet::new();
        tasks.spawn(periodic_branch_job(
            scanner,
            Schedule::Every {
                interval: self.config.scan_interval,
                hours: Some(self.config.scan_hours),
            },
            self,
            shutdown.clone(),
        ));
        tasks.spawn(periodic_branch_job(
            retry_mover,
            Schedule::DailyAt(self.config.retry_hour),
            self,
            shutdown.clone(),
        ));
        tasks.spawn(periodic_branch_job(
            notifier,
            Schedule::Every {
                interval: self.config.notify_interval,
                hours: None,
            },
            self,
            shutdown.clone(),
        ));
        tasks.spawn(run_periodic(
            "worker",
            Schedule::Every {
                interval: self.config.worker_poll,
                hours: None,
            },
            self.clock.clone(),
            shutdown.clone(),
            move || {
                let worker = worker.clone();
                async move {
                    let report = worker.drain().await?;
                    if report.received > 0 {
                        info!(job = "worker", ?report, "queue drained");
                    }
                    Ok(())
                }
            },
        ));
        info!(jobs = tasks.len(), "relay running, press Ctrl-C to stop");

        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    error!(error = %e, "job task panicked");
                    shutdown.cancel();
                }
            }
        }
        info!("relay stopped");
        failure.map_or(Ok(()), Err)
    }
}

/// Builds the periodic task for a branch job. Everything it needs is cloned out
/// of `relay` so the task owns its state.
fn periodic_branch_job<J: BranchJob + 'static>(
    job: Arc<J>,
    schedule: Schedule,
    relay: &Relay,
    shutdown: CancellationToken,
) -> impl Future<Output = Result<()>> + Send + 'static {
    let store = relay.store.clone();
    let set = relay.branch_set();
    run_periodic(J::NAME, schedule, relay.clock.clone(), shutdown, move || {
        let job = job.clone();
        let store = store.clone();
        let set = set.clone();
        async move {
            let report = run_branches(job.as_ref(), store.as_ref(), &set).await?;
            info!(job = J::NAME, ?report, "tick complete");
            Ok(())
        }
    })
}
