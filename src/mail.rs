use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType, transport::smtp::authentication::Credentials,
};
use tokio::sync::Mutex;

use crate::config::{AppConfig, SmtpSettings};

/// A plain-text message ready to hand to a `Mailer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("smtp transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("mail delivery disabled: {0}")]
    Rejected(String),
}

// 1. Mailer Contract
/// Mailer
///
/// Outbound email. Production uses `SmtpMailer`, local development `LogMailer`, and
/// tests `MockMailer`, without the handlers knowing which.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError>;
}

pub type MailerState = Arc<dyn Mailer>;

// 2. The Real Implementation
/// SmtpMailer
///
/// STARTTLS relay through lettre's pooled async transport.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings, from: &str) -> Result<Self, MailError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            from: from.to_string(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.parse()?)
            .to(email.to.parse()?)
            .subject(email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)?;

        self.transport.send(message).await?;
        Ok(())
    }
}

/// LogMailer
///
/// Local development: the message goes to the log instead of an SMTP server, so
/// verification and reset links can be copied from the console.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        tracing::info!(to = %email.to, subject = %email.subject, body = %email.body, "email (not sent)");
        Ok(())
    }
}

// 3. The Mock Implementation (for testing)
/// MockMailer
///
/// Records every message. With `failing()` every send errors, to prove that a mail
/// outage never fails the user's request.
#[derive(Clone, Default)]
pub struct MockMailer {
    sent: Arc<Mutex<Vec<OutgoingEmail>>>,
    should_fail: bool,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Arc::default(),
            should_fail: true,
        }
    }

    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_to(&self, to: &str) -> Vec<OutgoingEmail> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|email| email.to == to)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        if self.should_fail {
            return Err(MailError::Rejected("mock mailer set to fail".into()));
        }
        self.sent.lock().await.push(email);
        Ok(())
    }
}

/// deliver
///
/// Sends and swallows the outcome. Email is a side effect of the request, never a
/// reason for it to fail, and there are no retries.
pub async fn deliver(mailer: &MailerState, email: OutgoingEmail) {
    let to = email.to.clone();
    let subject = email.subject.clone();
    match mailer.send(email).await {
        Ok(()) => tracing::debug!(%to, %subject, "email sent"),
        Err(e) => tracing::error!(%to, %subject, error = %e, "email delivery failed"),
    }
}

// --- Message builders ---

pub fn verification_email(config: &AppConfig, to: &str, name: &str, token: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: "Verify your Know My Patient account".to_string(),
        body: format!(
            "Hello {name},\n\n\
             Please confirm your email address by opening the link below:\n\n\
             {base}/verify-email/{token}\n\n\
             If you did not create an account you can ignore this message.\n",
            base = config.base_url,
        ),
    }
}

pub fn password_reset_email(config: &AppConfig, to: &str, name: &str, token: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: "Reset your Know My Patient password".to_string(),
        body: format!(
            "Hello {name},\n\n\
             We received a request to reset your password. The link below is valid for 60 minutes:\n\n\
             {base}/password/reset?token={token}\n\n\
             If you did not ask for this, no action is needed.\n",
            base = config.base_url,
        ),
    }
}

pub fn support_acknowledgement(to: &str, name: &str, subject: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: format!("We received your message: {subject}"),
        body: format!(
            "Hello {name},\n\n\
             Thank you for contacting Know My Patient support. A member of the team will reply shortly.\n"
        ),
    }
}

pub fn admin_new_enquiry(to: &str, organisation: &str, contact: &str, email: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: format!("New onboarding enquiry from {organisation}"),
        body: format!("Organisation: {organisation}\nContact: {contact} <{email}>\n"),
    }
}

pub fn admin_new_ticket(to: &str, from_name: &str, from_email: &str, subject: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: format!("New support ticket: {subject}"),
        body: format!("From: {from_name} <{from_email}>\nSubject: {subject}\n"),
    }
}

pub fn card_dispatched_email(to: &str, name: &str, quantity: i32) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: "Your Know My Patient cards are on their way".to_string(),
        body: format!(
            "Hello {name},\n\n\
             {quantity} Know My Patient card(s) have been dispatched to the address you gave us.\n"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deliver_swallows_failures() {
        let mailer: MailerState = Arc::new(MockMailer::failing());
        deliver(&mailer, support_acknowledgement("a@b.com", "A", "Help")).await;
    }

    #[tokio::test]
    async fn mock_records_messages() {
        let mock = MockMailer::new();
        let mailer: MailerState = Arc::new(mock.clone());
        deliver(&mailer, card_dispatched_email("a@b.com", "A", 2)).await;

        let sent = mock.sent_to("a@b.com").await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("2 Know My Patient card(s)"));
    }

    #[test]
    fn links_use_the_public_base_url() {
        let config = AppConfig::default();
        let email = verification_email(&config, "a@b.com", "A", "tok123");
        assert!(email.body.contains("http://localhost:3000/verify-email/tok123"));

        let reset = password_reset_email(&config, "a@b.com", "A", "tok456");
        assert!(reset.body.contains("/password/reset?token=tok456"));
    }
}
