use super::branch::{file_name, join};
use super::transaction::SubmissionRequest;
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// One entry of a store directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
}

/// The shared file store branches deposit their orders into.
///
/// Paths are `/`-separated store paths. `rename` replaces an existing
/// destination; `create_dir` fails if the directory already exists.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool>;
    async fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>>;
    async fn read(&self, path: &str) -> Result<Vec<u8>>;
    async fn write(&self, path: &str, contents: &[u8]) -> Result<()>;
    /// Appends to `path`, creating the file if it does not exist.
    async fn append(&self, path: &str, contents: &[u8]) -> Result<()>;
    async fn rename(&self, from: &str, to: &str) -> Result<()>;
    async fn create_dir(&self, path: &str) -> Result<()>;

    async fn list_files(&self, dir: &str) -> Result<Vec<RemoteEntry>> {
        Ok(self
            .list(dir)
            .await?
            .into_iter()
            .filter(|entry| !entry.is_dir)
            .collect())
    }

    async fn list_dirs(&self, dir: &str) -> Result<Vec<RemoteEntry>> {
        Ok(self
            .list(dir)
            .await?
            .into_iter()
            .filter(|entry| entry.is_dir && entry.name != "." && entry.name != "..")
            .collect())
    }

    /// Returns `true` when the directory had to be created.
    async fn create_dir_if_missing(&self, path: &str) -> Result<bool> {
        if self.exists(path).await? {
            return Ok(false);
        }
        self.create_dir(path).await?;
        Ok(true)
    }

    /// Moves `source` into `dest_dir`, keeping its file name. Returns the new path.
    async fn move_to_dir(&self, source: &str, dest_dir: &str) -> Result<String> {
        let destination = join(dest_dir, file_name(source));
        self.rename(source, &destination).await?;
        Ok(destination)
    }
}

/// A message leased from a [`WorkQueue`]; it stays invisible until acked or released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: String,
    pub body: String,
}

/// At-least-once message queue between the scanner and the submission worker.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn send(&self, body: String) -> Result<()>;
    async fn receive(&self) -> Result<Option<Delivery>>;
    /// Removes a processed message for good.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;
    /// Puts a leased message back so it is delivered again.
    async fn release(&self, delivery: &Delivery) -> Result<()>;
}

/// Accounting endpoint selected by the transaction's classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    SalesInvoice,
    CreditMemo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionResponse {
    pub status: u16,
    pub body: String,
}

impl SubmissionResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the body of a 2xx response, or a `Submission` error carrying it.
    pub fn into_result(self) -> Result<String> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(RelayError::Submission {
                status: self.status,
                body: self.body,
            })
        }
    }
}

#[async_trait]
pub trait AccountingApi: Send + Sync {
    /// Posts one order. A non-success response is returned, not raised;
    /// only transport and authentication problems are errors.
    async fn submit(
        &self,
        endpoint: Endpoint,
        request: &SubmissionRequest,
    ) -> Result<SubmissionResponse>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<()>;
}

pub type RemoteStoreRef = Arc<dyn RemoteStore>;
pub type WorkQueueRef = Arc<dyn WorkQueue>;
pub type AccountingApiRef = Arc<dyn AccountingApi>;
pub type MailerRef = Arc<dyn Mailer>;
