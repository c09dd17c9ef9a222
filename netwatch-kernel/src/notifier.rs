//! Outbound notifications.
//!
//! [`SmtpNotifier`] mails the text through a STARTTLS relay described by
//! `email.yaml`; [`LogNotifier`] stands in when no mail setup exists so
//! alerts still land in the log.

use crate::config::SmtpConf;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

const SUBJECT: &str = "Network Alert";

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("email build error: {0}")]
    Build(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

pub struct SmtpNotifier {
    conf: SmtpConf,
}

impl SmtpNotifier {
    pub fn new(conf: SmtpConf) -> Self {
        if conf.password.is_none() {
            tracing::warn!("EMAIL_PASSWORD not set, sending without SMTP authentication");
        }
        Self { conf }
    }

    fn build_message(&self, text: &str) -> Result<Message, NotifyError> {
        Message::builder()
            .from(self.conf.sender.parse()?)
            .to(self.conf.recipient.parse()?)
            .subject(SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(text.to_string())
            .map_err(|e| NotifyError::Build(e.to_string()))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let email = self.build_message(text)?;

        let mut transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.conf.server)?
            .port(self.conf.port);
        if let Some(password) = &self.conf.password {
            transport = transport.credentials(Credentials::new(self.conf.sender.clone(), password.clone()));
        }

        tracing::debug!(server = %self.conf.server, port = self.conf.port, "connecting to SMTP relay");
        transport.build().send(email).await?;
        tracing::info!(to = %self.conf.recipient, "alert email sent");
        Ok(())
    }
}

/// Writes notifications to the log only.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        tracing::warn!(message = %text, "notification (no email configured)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf(sender: &str) -> SmtpConf {
        SmtpConf {
            server: "smtp.example.org".into(),
            port: 587,
            sender: sender.into(),
            recipient: "noc@example.org".into(),
            password: Some("secret".into()),
        }
    }

    #[test]
    fn message_carries_subject_and_body() {
        let notifier = SmtpNotifier::new(conf("monitor@example.org"));
        let message = notifier.build_message("Device nas is unreachable").unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Network Alert"));
        assert!(raw.contains("To: noc@example.org"));
        assert!(raw.contains("Device nas is unreachable"));
    }

    #[test]
    fn bad_sender_address_is_reported() {
        let notifier = SmtpNotifier::new(conf("not-an-email"));
        let err = notifier.build_message("x").unwrap_err();
        assert!(matches!(err, NotifyError::Address(_)));
    }

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        assert!(LogNotifier.send("Device nas is unreachable").await.is_ok());
    }
}
