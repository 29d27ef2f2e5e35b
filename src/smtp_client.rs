use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;
use std::time;

use crate::config::SmtpSettings;
use crate::domain::subscriber_email::SubscriberEmail;
use crate::email_client::FallbackTransport;
use crate::error_chain_fmt;

#[derive(thiserror::Error)]
pub enum SmtpError {
    #[error("Email address is not accepted by the SMTP client.")]
    Address(#[from] lettre::address::AddressError),
    #[error("Failed to build the email message.")]
    Message(#[from] lettre::error::Error),
    #[error("SMTP relay refused or failed the delivery.")]
    Transport(#[from] lettre::transport::smtp::Error),
}

impl std::fmt::Debug for SmtpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Sends email through an SMTP relay with STARTTLS.
pub struct SmtpClient {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl SmtpClient {
    pub fn new(
        settings: &SmtpSettings,
        sender: &SubscriberEmail,
        sender_name: String,
        timeout: time::Duration,
    ) -> Result<SmtpClient, SmtpError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.expose_secret().clone(),
            ))
            .timeout(Some(timeout))
            .build();
        let sender = Mailbox::new(Some(sender_name), sender.as_ref().parse()?);

        Ok(SmtpClient { transport, sender })
    }
}

#[async_trait]
impl FallbackTransport for SmtpClient {
    #[tracing::instrument(name = "Send an email over SMTP", skip(self, html_content))]
    async fn send(
        &self,
        recipient: &SubscriberEmail,
        subject: &str,
        html_content: &str,
    ) -> Result<(), SmtpError> {
        let message = Message::builder()
            .from(self.sender.clone())
            .to(Mailbox::new(None, recipient.as_ref().parse()?))
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_content.to_string())?;

        self.transport.send(message).await?;

        Ok(())
    }
}
