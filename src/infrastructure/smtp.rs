use crate::config::SmtpConfig;
use crate::domain::ports::{EmailMessage, Mailer};
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

const IMPLICIT_TLS_PORT: u16 = 465;

/// Sends notification mail through an authenticated SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let builder = if config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| RelayError::Email(format!("invalid SMTP relay {}: {e}", config.host)))?;

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| RelayError::Email(format!("invalid EMAIL_FROM: {e}")))?;
        let to: Mailbox = config
            .to
            .parse()
            .map_err(|e| RelayError::Email(format!("invalid EMAIL_TO: {e}")))?;

        Ok(Self { transport, from, to })
    }

    fn build(&self, message: EmailMessage) -> Result<Message> {
        let csv = ContentType::parse("text/csv")
            .map_err(|e| RelayError::Email(format!("content type: {e}")))?;

        let mut body = MultiPart::mixed().singlepart(SinglePart::plain(message.body));
        for attachment in message.attachments {
            body = body
                .singlepart(Attachment::new(attachment.name).body(attachment.content, csv.clone()));
        }

        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(message.subject)
            .multipart(body)
            .map_err(|e| RelayError::Email(format!("cannot build message: {e}")))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: EmailMessage) -> Result<()> {
        let attachments = message.attachments.len();
        let email = self.build(message)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| RelayError::Email(format!("SMTP delivery failed: {e}")))?;
        info!(to = %self.to, attachments, "notification email sent");
        Ok(())
    }
}
