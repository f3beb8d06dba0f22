use super::ledger::{LedgerKind, StatusLedger};
use crate::domain::branch::BranchPaths;
use crate::domain::clock::ClockRef;
use crate::domain::ports::{AccountingApiRef, Endpoint, RemoteStoreRef, WorkQueueRef};
use crate::domain::transaction::{
    Classification, LedgerRow, SubmissionRequest, TransactionStatus, WorkUnit,
};
use crate::error::{RelayError, Result};
use crate::interfaces::json::odata::extract_value;
use chrono::{DateTime, FixedOffset};
use std::ops::AddAssign;
use std::slice;
use tracing::{debug, error, info, warn};

/// What happened to one work unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Submitted and the pending ledger row now carries this status.
    Resolved(TransactionStatus),
    /// Submitted, but no pending ledger row was found to record it in.
    Unrecorded(TransactionStatus),
    /// Already resolved by an earlier delivery; nothing was submitted.
    Duplicate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub received: usize,
    pub succeeded: usize,
    pub voided: usize,
    pub failed: usize,
    pub duplicates: usize,
    pub unrecorded: usize,
    /// Malformed messages acknowledged without processing.
    pub dropped: usize,
    /// Messages put back on the queue after a transient error.
    pub released: usize,
}

impl DrainReport {
    fn record(&mut self, outcome: Outcome) {
        let status = match outcome {
            Outcome::Duplicate => {
                self.duplicates += 1;
                return;
            }
            Outcome::Unrecorded(status) => {
                self.unrecorded += 1;
                status
            }
            Outcome::Resolved(status) => status,
        };
        match status {
            TransactionStatus::Void => self.voided += 1,
            TransactionStatus::Failed => self.failed += 1,
            _ => self.succeeded += 1,
        }
    }
}

impl AddAssign for DrainReport {
    fn add_assign(&mut self, other: Self) {
        self.received += other.received;
        self.succeeded += other.succeeded;
        self.voided += other.voided;
        self.failed += other.failed;
        self.duplicates += other.duplicates;
        self.unrecorded += other.unrecorded;
        self.dropped += other.dropped;
        self.released += other.released;
    }
}

/// Consumes work units, posts them to the accounting API and records the result.
pub struct SubmissionWorker {
    store: RemoteStoreRef,
    queue: WorkQueueRef,
    api: AccountingApiRef,
    ledger: StatusLedger,
    clock: ClockRef,
}

impl SubmissionWorker {
    pub fn new(
        store: RemoteStoreRef,
        queue: WorkQueueRef,
        api: AccountingApiRef,
        ledger: StatusLedger,
        clock: ClockRef,
    ) -> Self {
        Self {
            store,
            queue,
            api,
            ledger,
            clock,
        }
    }

    /// Receives until the queue is empty.
    ///
    /// A transient error releases the message and ends the drain so it is retried
    /// on the next poll. An auth or config error releases it and is returned.
    pub async fn drain(&self) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        while let Some(delivery) = self.queue.receive().await? {
            report.received += 1;

            let unit = match WorkUnit::decode(&delivery.body) {
                Ok(unit) => unit,
                Err(e) => {
                    error!(message_id = %delivery.id, error = %e, "dropping malformed queue message");
                    self.queue.ack(&delivery).await?;
                    report.dropped += 1;
                    continue;
                }
            };

            match self.process(&unit).await {
                Ok(outcome) => {
                    self.queue.ack(&delivery).await?;
                    report.record(outcome);
                }
                Err(e) => {
                    self.queue.release(&delivery).await?;
                    report.released += 1;
                    if e.is_fatal() {
                        return Err(e);
                    }
                    warn!(
                        message_id = %delivery.id,
                        transaction_id = unit.transaction_id(),
                        error = %e,
                        "submission interrupted, message will be redelivered"
                    );
                    break;
                }
            }
        }
        Ok(report)
    }

    /// Submits one unit and records the outcome in the branch ledgers.
    ///
    /// Errors returned here mean nothing was submitted, so a redelivery is safe.
    /// Bookkeeping after the API call is best-effort and only logged.
    pub async fn process(&self, unit: &WorkUnit) -> Result<Outcome> {
        let branch = BranchPaths::new(unit.root.clone());
        let transaction_id = unit.transaction_id();
        let classification = unit.classification();
        let now = self.clock.now();
        let main_logs = LedgerKind::Main.recent_files(&branch, now);

        if self.already_resolved(&main_logs, transaction_id).await? {
            info!(
                branch = branch.name(),
                transaction_id, "transaction already resolved, skipping duplicate delivery"
            );
            return Ok(Outcome::Duplicate);
        }

        let endpoint = match classification {
            Classification::Void => Endpoint::CreditMemo,
            _ => Endpoint::SalesInvoice,
        };
        let request = SubmissionRequest::for_order(&unit.order_details)?;
        let response = self.api.submit(endpoint, &request).await?;

        let (status, response_text) = match response.into_result() {
            Ok(body) => {
                let text = extract_value(&body).unwrap_or_else(|e| {
                    warn!(transaction_id, error = %e, "unexpected response envelope, keeping raw body");
                    body
                });
                let status = if classification == Classification::Void {
                    TransactionStatus::Void
                } else {
                    TransactionStatus::Success
                };
                (status, text)
            }
            Err(RelayError::Submission { status, body }) => {
                error!(
                    branch = branch.name(),
                    transaction_id,
                    status,
                    %body,
                    "accounting API rejected the transaction"
                );
                self.quarantine(&branch, unit, &body, now).await;
                (TransactionStatus::Failed, body)
            }
            Err(e) => return Err(e),
        };

        let recorded = self
            .resolve(&main_logs, transaction_id, &response_text, status)
            .await;
        if classification == Classification::Void {
            let void_logs = LedgerKind::Void.recent_files(&branch, now);
            self.resolve(&void_logs, transaction_id, &response_text, status)
                .await;
        }

        info!(
            branch = branch.name(),
            file = %unit.filename,
            transaction_id,
            %status,
            "transaction submitted"
        );
        Ok(if recorded {
            Outcome::Resolved(status)
        } else {
            Outcome::Unrecorded(status)
        })
    }

    async fn already_resolved(&self, files: &[String], transaction_id: &str) -> Result<bool> {
        let mut pending = 0;
        let mut resolved = 0;
        for file in files {
            let state = self.ledger.state_of(file, transaction_id).await?;
            pending += state.pending;
            resolved += state.resolved.len();
        }
        Ok(pending == 0 && resolved > 0)
    }

    async fn resolve(
        &self,
        files: &[String],
        transaction_id: &str,
        response: &str,
        status: TransactionStatus,
    ) -> bool {
        match self
            .ledger
            .resolve_in_any(files, transaction_id, response, status)
            .await
        {
            Ok((file, _)) => {
                debug!(file = %file, transaction_id, %status, "ledger row resolved");
                true
            }
            Err(e @ RelayError::TransactionNotFound(_)) => {
                warn!(error = %e, "no pending ledger row to resolve");
                false
            }
            Err(e) => {
                error!(transaction_id, error = %e, "could not update ledger");
                false
            }
        }
    }

    /// Moves the archived file to quarantine and appends a row to the failed ledger.
    async fn quarantine(
        &self,
        branch: &BranchPaths,
        unit: &WorkUnit,
        response: &str,
        now: DateTime<FixedOffset>,
    ) {
        let archived = branch.archived_file(&unit.filename);
        if let Err(e) = self.store.move_to_dir(&archived, &branch.quarantine()).await {
            error!(file = %archived, error = %e, "could not quarantine file");
        }

        let details = match serde_json::to_string(&unit.order_details) {
            Ok(details) => details,
            Err(e) => {
                error!(error = %e, "could not serialize order for the failed ledger");
                return;
            }
        };
        let row = LedgerRow::new(
            now,
            &unit.filename,
            unit.transaction_id(),
            details,
            response.to_string(),
            TransactionStatus::Failed,
        );
        let failed_log = LedgerKind::Failed.file_for(branch, now.date_naive());
        if let Err(e) = self
            .ledger
            .append_rows(&failed_log, slice::from_ref(&row))
            .await
        {
            error!(file = %failed_log, error = %e, "could not append to failed ledger");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_report_counts_by_status() {
        let mut report = DrainReport::default();
        report.record(Outcome::Resolved(TransactionStatus::Success));
        report.record(Outcome::Resolved(TransactionStatus::Void));
        report.record(Outcome::Unrecorded(TransactionStatus::Failed));
        report.record(Outcome::Duplicate);

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.voided, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.unrecorded, 1);
        assert_eq!(report.duplicates, 1);
    }
}
