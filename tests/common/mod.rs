#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone};
use order_relay::application::BranchSet;
use order_relay::application::ledger::{MatchPolicy, StatusLedger};
use order_relay::application::scanner::IngestionScanner;
use order_relay::application::worker::SubmissionWorker;
use order_relay::domain::clock::{ClockRef, FixedClock, branch_offset};
use order_relay::domain::ports::{
    AccountingApi, EmailMessage, Endpoint, Mailer, SubmissionResponse,
};
use order_relay::domain::transaction::{LedgerRow, SubmissionRequest};
use order_relay::error::{RelayError, Result};
use order_relay::infrastructure::in_memory::{InMemoryQueue, InMemoryStore};
use order_relay::interfaces::json::order_reader::OrderTransformer;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const INBOX: &str = "/inbox";
pub const BRANCH: &str = "/inbox/BR01";

/// A branch payload for `transaction_id` with business date `sysdate`.
pub fn payload(transaction_id: &str, sysdate: &str) -> String {
    format!(
        r#"{{
            "stat": {{"branch_code": "001", "company_code": "KTI", "sysdate": "{sysdate}", "record": 1}},
            "hdr": {{
                "branch_cd": "001",
                "sys_trans_num": "{transaction_id}",
                "cd_first_name": "Juan",
                "cd_last_name": "Dela Cruz",
                "cd_addr": "12 Rizal St, Makati",
                "cd_mobilenumber": "09170000000"
            }},
            "detail": [
                {{"sys_trans_num": "{transaction_id}", "seq_num": 1, "item_code": "SKU1", "qty": 2,
                 "sell_uom": "PC", "cost": "10.50", "net_retail": "25.00"}}
            ],
            "payment": [
                {{"sys_trans_num": "{transaction_id}", "ref_num": "R1", "tender_type_code": "CASH",
                 "conv_pay_amount_due": "500", "conv_change_amount": 50}}
            ]
        }}"#
    )
}

/// `2024-03-<day> <hour>:<minute>` at the branch offset.
pub fn at(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
    branch_offset()
        .with_ymd_and_hms(2024, 3, day, hour, minute, 0)
        .unwrap()
}

pub fn clock_at(now: DateTime<FixedOffset>) -> ClockRef {
    Arc::new(FixedClock(now))
}

pub fn main_log(date: &str) -> String {
    format!("{BRANCH}/logs/SFTPReader-log-{date}.csv")
}

pub fn void_log(date: &str) -> String {
    format!("{BRANCH}/logs/void/SFTPReader-voided-log-{date}.csv")
}

pub fn blocked_log(date: &str) -> String {
    format!("{BRANCH}/logs/blocked/SFTPReader-blocked-log-{date}.csv")
}

pub fn failed_log(date: &str) -> String {
    format!("{BRANCH}/logs/failed/SFTPReader-error-log-{date}.csv")
}

pub fn branch_set() -> BranchSet {
    BranchSet {
        inbox_root: INBOX.to_string(),
        allow_list: vec!["br01".to_string()],
        timeout: Duration::from_secs(10),
    }
}

/// In-memory store and queue with one branch directory.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub queue: Arc<InMemoryQueue>,
    pub ledger: StatusLedger,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        store.seed_dir(BRANCH);
        Self {
            ledger: StatusLedger::new(store.clone(), MatchPolicy::Contains),
            store,
            queue: Arc::new(InMemoryQueue::new()),
        }
    }

    pub fn drop_file(&self, name: &str, contents: &str) {
        self.store
            .seed_file(&format!("{BRANCH}/{name}"), contents.as_bytes());
    }

    pub fn scanner(&self, target_month: u32, clock: ClockRef) -> IngestionScanner {
        IngestionScanner::new(
            self.store.clone(),
            self.queue.clone(),
            self.ledger.clone(),
            OrderTransformer::new(target_month),
            clock,
        )
    }

    pub fn worker(&self, api: Arc<StubApi>, clock: ClockRef) -> SubmissionWorker {
        SubmissionWorker::new(
            self.store.clone(),
            self.queue.clone(),
            api,
            self.ledger.clone(),
            clock,
        )
    }

    pub async fn rows(&self, file: &str) -> Vec<LedgerRow> {
        self.ledger.rows(file).await.unwrap()
    }
}

/// Accounting API double: answers from a script, then with a fixed response.
pub struct StubApi {
    script: Mutex<VecDeque<Result<SubmissionResponse>>>,
    fallback: SubmissionResponse,
    calls: Mutex<Vec<(Endpoint, SubmissionRequest)>>,
}

impl StubApi {
    pub fn responding(status: u16, body: &str) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: SubmissionResponse {
                status,
                body: body.to_string(),
            },
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn accepting(value: &str) -> Arc<Self> {
        Self::responding(
            200,
            &format!(r#"{{"@odata.context":"https://bc/$metadata#Edm.String","value":"{value}"}}"#),
        )
    }

    pub fn failing_once(error: RelayError) -> Arc<Self> {
        let api = Self::accepting("SI-0001");
        api.script.lock().unwrap().push_back(Err(error));
        api
    }

    pub fn calls(&self) -> Vec<(Endpoint, SubmissionRequest)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountingApi for StubApi {
    async fn submit(
        &self,
        endpoint: Endpoint,
        request: &SubmissionRequest,
    ) -> Result<SubmissionResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((endpoint, request.clone()));
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<EmailMessage>>,
    pub fail: bool,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: EmailMessage) -> Result<()> {
        if self.fail {
            return Err(RelayError::Email("relay refused the message".to_string()));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}
