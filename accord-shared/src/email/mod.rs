/// Outbound email
///
/// Mail is handed to an [`EmailSender`]. Two senders exist:
///
/// - [`HttpEmailSender`]: posts JSON to a transactional email API with a
///   bearer key
/// - [`LogEmailSender`]: writes the message to the log instead of sending it,
///   used when no email API is configured
///
/// # Example
///
/// ```no_run
/// use accord_shared::email::{verification_email, EmailSender, LogEmailSender};
///
/// # async fn example() -> Result<(), accord_shared::email::EmailError> {
/// let sender = LogEmailSender::new("no-reply@accord.local");
/// let message = verification_email("ada@example.com", "Ada", "https://accord.example/v1/auth/verify?token=abc");
/// sender.send(message).await?;
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Error type for email delivery
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// Message rejected before sending
    #[error("Invalid email message: {0}")]
    InvalidMessage(String),

    /// Request could not be sent
    #[error("Email transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Provider answered with a non-success status
    #[error("Email provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Message to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
}

impl EmailMessage {
    fn validate(&self) -> Result<(), EmailError> {
        if !self.to.contains('@') {
            return Err(EmailError::InvalidMessage(format!(
                "invalid recipient address '{}'",
                self.to
            )));
        }
        if self.subject.trim().is_empty() {
            return Err(EmailError::InvalidMessage("empty subject".to_string()));
        }
        Ok(())
    }
}

/// Delivers email messages
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), EmailError>;
}

/// Builds the signup verification message
pub fn verification_email(to: &str, first_name: &str, verification_url: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Verify your email address".to_string(),
        text_body: format!(
            "Hi {},\n\nPlease confirm your email address by opening the link below:\n\n{}\n\nThe link expires in 48 hours.\n",
            first_name, verification_url
        ),
        html_body: Some(format!(
            "<p>Hi {},</p><p>Please confirm your email address:</p><p><a href=\"{}\">Verify email</a></p><p>The link expires in 48 hours.</p>",
            first_name, verification_url
        )),
    }
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
}

/// Sender for an HTTP email API
#[derive(Debug, Clone)]
pub struct HttpEmailSender {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl HttpEmailSender {
    /// Creates a sender with a 10 second request timeout
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        from: impl Into<String>,
    ) -> Result<Self, EmailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            from: from.into(),
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, message: EmailMessage) -> Result<(), EmailError> {
        message.validate()?;
        debug!(to = %message.to, endpoint = %self.endpoint, "Sending email");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&SendRequest {
                from: &self.from,
                to: &message.to,
                subject: &message.subject,
                text: &message.text_body,
                html: message.html_body.as_deref(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(to = %message.to, status = status.as_u16(), "Email provider rejected message");
            return Err(EmailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(to = %message.to, subject = %message.subject, "Email sent");
        Ok(())
    }
}

/// Sender that only logs
#[derive(Debug, Clone)]
pub struct LogEmailSender {
    from: String,
}

impl LogEmailSender {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: EmailMessage) -> Result<(), EmailError> {
        message.validate()?;
        info!(
            from = %self.from,
            to = %message.to,
            subject = %message.subject,
            body = %message.text_body,
            "Email delivery not configured, logging message"
        );
        Ok(())
    }
}
