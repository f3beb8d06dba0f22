use super::order::OrderDetails;
use crate::error::{RelayError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Filename-derived category that decides routing and which ledgers get a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Normal,
    Void,
    Blocked,
}

impl Classification {
    /// `"sv"` anywhere in the name blocks the transaction, otherwise any `"v"` voids it.
    pub fn from_filename(filename: &str) -> Self {
        let lowered = filename.to_lowercase();
        if lowered.contains("sv") {
            Classification::Blocked
        } else if lowered.contains('v') {
            Classification::Void
        } else {
            Classification::Normal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    Processing,
    Success,
    Failed,
    Void,
    Blocked,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Processing => "Processing",
            TransactionStatus::Success => "Success",
            TransactionStatus::Failed => "Failed",
            TransactionStatus::Void => "Void",
            TransactionStatus::Blocked => "Blocked",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Processing)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "Processing" => Ok(TransactionStatus::Processing),
            "Success" => Ok(TransactionStatus::Success),
            "Failed" => Ok(TransactionStatus::Failed),
            "Void" => Ok(TransactionStatus::Void),
            "Blocked" => Ok(TransactionStatus::Blocked),
            other => Err(RelayError::Parse(format!("unknown status '{other}'"))),
        }
    }
}

/// Ledger timestamp layout, e.g. `03/15/2024 02:05:09 PM`.
pub const LEDGER_TIMESTAMP_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";

/// One row of a status ledger.
///
/// Status is kept as text so rows written by older tooling survive a rewrite
/// untouched; use [`LedgerRow::status`] for the typed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    #[serde(rename = "Date")]
    pub timestamp: String,
    #[serde(rename = "File Name")]
    pub file_name: String,
    #[serde(rename = "Transaction ID")]
    pub transaction_id: String,
    #[serde(rename = "Transaction Details")]
    pub details: String,
    #[serde(rename = "Business Central Response")]
    pub response: String,
    #[serde(rename = "Status")]
    pub status: String,
}

impl LedgerRow {
    pub fn new(
        at: DateTime<FixedOffset>,
        file_name: &str,
        transaction_id: &str,
        details: String,
        response: String,
        status: TransactionStatus,
    ) -> Self {
        Self {
            timestamp: at.format(LEDGER_TIMESTAMP_FORMAT).to_string(),
            file_name: file_name.to_string(),
            transaction_id: transaction_id.to_string(),
            details,
            response,
            status: status.to_string(),
        }
    }

    pub fn status(&self) -> Option<TransactionStatus> {
        self.status.parse().ok()
    }
}

/// Request body expected by the accounting endpoints: the order serialized as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    #[serde(rename = "jsonData")]
    pub json_data: String,
}

impl SubmissionRequest {
    pub fn for_order(order: &OrderDetails) -> Result<Self> {
        Ok(Self {
            json_data: serde_json::to_string(order)?,
        })
    }
}

/// A self-contained unit of work travelling from the scanner to the submission worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub root: String,
    pub filename: String,
    pub order_details: OrderDetails,
}

impl WorkUnit {
    pub fn transaction_id(&self) -> &str {
        self.order_details.transaction_id()
    }

    pub fn classification(&self) -> Classification {
        Classification::from_filename(&self.filename)
    }

    /// Queue wire format: base64 over the JSON document.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(STANDARD.encode(json))
    }

    pub fn decode(message: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(message.trim())
            .map_err(|e| RelayError::Parse(format!("queue message is not base64: {e}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
