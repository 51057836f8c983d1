// email_sender.rs
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{error, info};

use crate::config::SmtpSettings;
use crate::error::{AppError, Result};

/// Outbound mail seam; the queue worker only talks to this.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_html(&self, sender: &str, receiver: &str, subject: &str, html: &str) -> Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// TLS relay using the configured credentials.
    pub fn new(settings: &SmtpSettings) -> Result<Self> {
        let creds = Credentials::new(settings.username.clone(), settings.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
            .map_err(|e| AppError::Email(format!("Invalid SMTP relay {}: {}", settings.host, e)))?
            .credentials(creds)
            .port(settings.port)
            .build();
        Ok(Self { transport })
    }
}

pub fn build_message(sender: &str, receiver: &str, subject: &str, html: &str) -> Result<Message> {
    let sender: Mailbox = sender
        .parse()
        .map_err(|e| AppError::Email(format!("Invalid sender address {}: {}", sender, e)))?;
    let receiver: Mailbox = receiver
        .parse()
        .map_err(|e| AppError::Email(format!("Invalid recipient address {}: {}", receiver, e)))?;

    Message::builder()
        .from(sender)
        .to(receiver)
        .subject(subject)
        .header(ContentType::TEXT_HTML)
        .body(html.to_string())
        .map_err(|e| AppError::Email(format!("Failed to build email: {}", e)))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_html(&self, sender: &str, receiver: &str, subject: &str, html: &str) -> Result<()> {
        let email = build_message(sender, receiver, subject, html)?;

        match self.transport.send(email).await {
            Ok(_) => {
                info!("Email sent to {}", receiver);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send email to {}: {}", receiver, e);
                Err(AppError::Email(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_message_rejects_bad_addresses() {
        assert!(build_message("no-reply@flexfit.local", "bob", "Hi", "<p>x</p>").is_err());
        assert!(build_message("", "bob@example.com", "Hi", "<p>x</p>").is_err());
    }

    #[test]
    fn build_message_is_html() {
        let message = build_message("no-reply@flexfit.local", "bob@example.com", "Welcome", "<p>x</p>").unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Welcome"));
        assert!(raw.contains("text/html"));
    }
}
