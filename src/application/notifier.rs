use super::BranchJob;
use crate::domain::branch::BranchPaths;
use crate::domain::ports::{Attachment, EmailMessage, MailerRef, RemoteStoreRef};
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use std::ops::AddAssign;
use tracing::{debug, info};

/// Subject and body text of the failure email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailTemplate {
    pub subject: String,
    pub body: String,
}

impl EmailTemplate {
    fn render(&self, branch: &BranchPaths, attachments: Vec<Attachment>) -> EmailMessage {
        let mut body = self.body.clone();
        body.push_str(&format!("\n\nBranch: {}\nAttached files:\n", branch.name()));
        for attachment in &attachments {
            body.push_str(&format!("- {}\n", attachment.name));
        }
        EmailMessage {
            subject: self.subject.clone(),
            body,
            attachments,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub emails_sent: usize,
    pub attachments: usize,
}

impl AddAssign for NotifyReport {
    fn add_assign(&mut self, other: Self) {
        self.emails_sent += other.emails_sent;
        self.attachments += other.attachments;
    }
}

/// Mails the branch's failed ledgers to operations. Leaves the files where they are.
pub struct FailureNotifier {
    store: RemoteStoreRef,
    mailer: MailerRef,
    template: EmailTemplate,
}

impl FailureNotifier {
    pub fn new(store: RemoteStoreRef, mailer: MailerRef, template: EmailTemplate) -> Self {
        Self {
            store,
            mailer,
            template,
        }
    }
}

#[async_trait]
impl BranchJob for FailureNotifier {
    type Report = NotifyReport;
    const NAME: &'static str = "notifier";

    async fn run_branch(&self, branch: &BranchPaths) -> Result<NotifyReport> {
        if !self.store.exists(branch.root()).await? {
            return Err(RelayError::Connectivity(format!(
                "branch root {} does not exist",
                branch.root()
            )));
        }
        let failed_logs = branch.failed_logs();
        if !self.store.exists(&failed_logs).await? {
            return Ok(NotifyReport::default());
        }

        let mut attachments = Vec::new();
        for entry in self.store.list_files(&failed_logs).await? {
            let content = self.store.read(&entry.path).await?;
            attachments.push(Attachment {
                name: entry.name,
                content,
            });
        }
        if attachments.is_empty() {
            debug!(branch = branch.name(), "no failed ledgers, nothing to send");
            return Ok(NotifyReport::default());
        }

        let count = attachments.len();
        self.mailer
            .send(self.template.render(branch, attachments))
            .await?;
        info!(branch = branch.name(), attachments = count, "failure notification sent");
        Ok(NotifyReport {
            emails_sent: 1,
            attachments: count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_lists_attached_files() {
        let template = EmailTemplate {
            subject: "Failed".to_string(),
            body: "Please review.".to_string(),
        };
        let message = template.render(
            &BranchPaths::new("/inbox/BR01"),
            vec![
                Attachment {
                    name: "a.csv".to_string(),
                    content: Vec::new(),
                },
                Attachment {
                    name: "b.csv".to_string(),
                    content: Vec::new(),
                },
            ],
        );
        assert_eq!(message.subject, "Failed");
        assert_eq!(
            message.body,
            "Please review.\n\nBranch: BR01\nAttached files:\n- a.csv\n- b.csv\n"
        );
        assert_eq!(message.attachments.len(), 2);
    }
}
