use crate::config::MailConfig;
use crate::error::TollgateError;
use async_trait::async_trait;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), TollgateError>;
}

/// Delivers through an SMTP relay with STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(host: &str, user: &str, pass: &str, from: &str) -> Result<Self, TollgateError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| TollgateError::Mail(format!("invalid SMTP relay '{host}': {e}")))?
            .credentials(Credentials::new(user.to_string(), pass.to_string()))
            .build();
        let from = from
            .parse::<Mailbox>()
            .map_err(|e| TollgateError::Mail(format!("invalid from address: {e}")))?;
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), TollgateError> {
        let to = mail
            .to
            .parse::<Mailbox>()
            .map_err(|e| TollgateError::Mail(format!("invalid recipient: {e}")))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body)
            .map_err(|e| TollgateError::Mail(e.to_string()))?;
        self.transport
            .send(message)
            .await
            .map_err(|e| TollgateError::Mail(e.to_string()))?;
        Ok(())
    }
}

/// Used when no SMTP relay is configured. The body may carry a live token, so
/// it only appears at debug level.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), TollgateError> {
        info!(to = %mail.to, subject = %mail.subject, "mail delivery disabled; not sent");
        debug!(body = %mail.body, "undelivered mail body");
        Ok(())
    }
}

/// Keeps every message in memory.
#[derive(Default, Clone)]
pub struct MemoryMailer {
    outbox: Arc<Mutex<Vec<OutgoingMail>>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.outbox.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), TollgateError> {
        self.outbox
            .lock()
            .map_err(|_| TollgateError::Mail("outbox poisoned".to_string()))?
            .push(mail);
        Ok(())
    }
}

/// SMTP when a relay host is configured, otherwise the logging mailer.
pub fn mailer_from_config(cfg: &MailConfig) -> Result<Arc<dyn Mailer>, TollgateError> {
    match cfg.smtp_host.as_deref() {
        Some(host) if !host.is_empty() => Ok(Arc::new(SmtpMailer::new(
            host,
            cfg.smtp_user.as_deref().unwrap_or_default(),
            cfg.smtp_pass.as_deref().unwrap_or_default(),
            &cfg.from_address,
        )?)),
        _ => Ok(Arc::new(LogMailer)),
    }
}
