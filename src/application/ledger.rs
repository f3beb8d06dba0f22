use crate::domain::branch::{BranchPaths, join};
use crate::domain::ports::RemoteStoreRef;
use crate::domain::transaction::{LedgerRow, TransactionStatus};
use crate::error::{RelayError, Result};
use crate::interfaces::csv::ledger_codec::{decode_rows, encode_rows};
use chrono::{DateTime, Days, FixedOffset, NaiveDate};
use std::str::FromStr;
use tracing::{debug, warn};

/// The four daily ledgers kept per branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerKind {
    Main,
    Void,
    Blocked,
    Failed,
}

impl LedgerKind {
    fn category(&self) -> &'static str {
        match self {
            LedgerKind::Main => "SFTPReader",
            LedgerKind::Void => "SFTPReader-voided",
            LedgerKind::Blocked => "SFTPReader-blocked",
            LedgerKind::Failed => "SFTPReader-error",
        }
    }

    pub fn directory(&self, branch: &BranchPaths) -> String {
        match self {
            LedgerKind::Main => branch.logs(),
            LedgerKind::Void => branch.void_logs(),
            LedgerKind::Blocked => branch.blocked_logs(),
            LedgerKind::Failed => branch.failed_logs(),
        }
    }

    /// `<dir>/<category>-log-<YYYY-MM-DD>.csv`
    pub fn file_for(&self, branch: &BranchPaths, date: NaiveDate) -> String {
        join(
            &self.directory(branch),
            &format!("{}-log-{}.csv", self.category(), date.format("%Y-%m-%d")),
        )
    }

    /// Today's file followed by yesterday's, for lookups that may straddle midnight.
    pub fn recent_files(&self, branch: &BranchPaths, now: DateTime<FixedOffset>) -> Vec<String> {
        let today = now.date_naive();
        let mut files = vec![self.file_for(branch, today)];
        if let Some(yesterday) = today.checked_sub_days(Days::new(1)) {
            files.push(self.file_for(branch, yesterday));
        }
        files
    }
}

/// How a resolution finds the row it updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    /// Substring match on both the id and the status column, first hit wins.
    #[default]
    Contains,
    /// Exact equality on both columns, first hit wins.
    Exact,
}

impl MatchPolicy {
    fn is_pending(&self, row: &LedgerRow, transaction_id: &str) -> bool {
        let processing = TransactionStatus::Processing.as_str();
        match self {
            MatchPolicy::Contains => {
                row.transaction_id.contains(transaction_id) && row.status.contains(processing)
            }
            MatchPolicy::Exact => is_same_id(row, transaction_id) && is_processing(row),
        }
    }
}

fn is_same_id(row: &LedgerRow, transaction_id: &str) -> bool {
    row.transaction_id.trim() == transaction_id.trim()
}

fn is_processing(row: &LedgerRow) -> bool {
    row.status() == Some(TransactionStatus::Processing)
}

impl FromStr for MatchPolicy {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contains" => Ok(MatchPolicy::Contains),
            "exact" => Ok(MatchPolicy::Exact),
            other => Err(RelayError::Config(format!(
                "LEDGER_MATCH must be 'contains' or 'exact', got '{other}'"
            ))),
        }
    }
}

/// What one ledger file says about a transaction. Ids are compared exactly,
/// whatever the match policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionState {
    /// Rows still waiting for the submission worker.
    pub pending: usize,
    /// Terminal statuses already recorded, in file order.
    pub resolved: Vec<TransactionStatus>,
}

/// Append/update record keeper over CSV files in the shared store.
#[derive(Clone)]
pub struct StatusLedger {
    store: RemoteStoreRef,
    policy: MatchPolicy,
}

impl StatusLedger {
    pub fn new(store: RemoteStoreRef, policy: MatchPolicy) -> Self {
        Self { store, policy }
    }

    /// Creates `file` with the header row if it does not exist, then appends `rows`.
    pub async fn append_rows(&self, file: &str, rows: &[LedgerRow]) -> Result<()> {
        let is_new = !self.store.exists(file).await?;
        let bytes = encode_rows(rows, is_new)?;
        self.store.append(file, &bytes).await?;
        debug!(file, rows = rows.len(), created = is_new, "ledger rows appended");
        Ok(())
    }

    /// All data rows of `file`; a missing file has none.
    pub async fn rows(&self, file: &str) -> Result<Vec<LedgerRow>> {
        if !self.store.exists(file).await? {
            return Ok(Vec::new());
        }
        let contents = self.store.read(file).await?;
        decode_rows(&contents)
    }

    /// Replaces the response and status of the first pending row for `transaction_id`
    /// and rewrites the file. Returns the updated row.
    pub async fn resolve_row(
        &self,
        file: &str,
        transaction_id: &str,
        response: &str,
        status: TransactionStatus,
    ) -> Result<LedgerRow> {
        if transaction_id.trim().is_empty() {
            return Err(RelayError::TransactionNotFound(transaction_id.to_string()));
        }

        let mut rows = self.rows(file).await?;
        let candidates: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| self.policy.is_pending(row, transaction_id))
            .map(|(index, _)| index)
            .collect();

        // A row carrying exactly this id wins over earlier substring hits.
        let Some(index) = candidates
            .iter()
            .copied()
            .find(|&index| is_same_id(&rows[index], transaction_id))
            .or_else(|| candidates.first().copied())
        else {
            return Err(RelayError::TransactionNotFound(transaction_id.to_string()));
        };
        if candidates.len() > 1 {
            warn!(
                file,
                transaction_id,
                extra_matches = candidates.len() - 1,
                "ambiguous ledger resolution, updating one pending row only"
            );
        }

        rows[index].response = response.to_string();
        rows[index].status = status.to_string();
        let updated = rows[index].clone();

        let bytes = encode_rows(&rows, true)?;
        self.store.write(file, &bytes).await?;
        Ok(updated)
    }

    pub async fn state_of(&self, file: &str, transaction_id: &str) -> Result<TransactionState> {
        let mut state = TransactionState::default();
        for row in self.rows(file).await? {
            if !is_same_id(&row, transaction_id) {
                continue;
            }
            match row.status() {
                Some(status) if status.is_terminal() => state.resolved.push(status),
                Some(_) => state.pending += 1,
                None => {}
            }
        }
        Ok(state)
    }

    /// `true` when one of `files` already holds a Processing row for this exact
    /// transaction id and source file.
    pub async fn has_pending(
        &self,
        files: &[String],
        transaction_id: &str,
        file_name: &str,
    ) -> Result<bool> {
        for file in files {
            let found = self.rows(file).await?.iter().any(|row| {
                is_same_id(row, transaction_id)
                    && row.file_name.trim() == file_name
                    && is_processing(row)
            });
            if found {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Resolves the row in the first of `files` that holds a pending entry.
    pub async fn resolve_in_any(
        &self,
        files: &[String],
        transaction_id: &str,
        response: &str,
        status: TransactionStatus,
    ) -> Result<(String, LedgerRow)> {
        for file in files {
            match self
                .resolve_row(file, transaction_id, response, status)
                .await
            {
                Ok(row) => return Ok((file.clone(), row)),
                Err(RelayError::TransactionNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(RelayError::TransactionNotFound(transaction_id.to_string()))
    }
}
