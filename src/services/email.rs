//! Email composition and delivery

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};
use serde_json::{json, Value};

use crate::{
    config::{EmailConfig, EmailProvider},
    error::{AppError, AppResult},
    models::notification::BorrowNotification,
};

use super::notifications::DeliveryError;

/// A rendered email ready for a provider
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Transactional email provider. Returns the provider's response payload.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<Value, DeliveryError>;
}

/// Render the email telling an owner that someone wants to borrow their book
pub fn borrow_request_email(
    to: &str,
    notification: &BorrowNotification,
    sender_name: &str,
) -> OutgoingEmail {
    let class = if notification.requester_class.trim().is_empty() {
        String::new()
    } else {
        format!(" (Class: {})", escape_html(notification.requester_class.trim()))
    };

    let html = format!(
        r#"
<p>Hi {owner},</p>
<p><strong>{requester}{class}</strong> has requested to borrow your book: <strong>{title}</strong>.</p>
<p>Please log in to your account to approve or decline the request.</p>
<p>Thanks,<br/>{sender}</p>
"#,
        owner = escape_html(&notification.owner_name),
        requester = escape_html(&notification.requester_name),
        class = class,
        title = escape_html(&notification.book_title),
        sender = escape_html(sender_name),
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: format!("New Borrow Request: {}", notification.book_title),
        html,
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn sender_mailbox(config: &EmailConfig) -> String {
    format!("{} <{}>", config.from_name, config.from_address)
}

/// Build the mailer selected by `email.provider`
pub fn build_mailer(config: &EmailConfig) -> AppResult<std::sync::Arc<dyn Mailer>> {
    Ok(match config.provider {
        EmailProvider::Resend => std::sync::Arc::new(ResendMailer::new(config)?),
        EmailProvider::Smtp => std::sync::Arc::new(SmtpMailer::new(config.clone())),
    })
}

/// HTTP email API (`POST {api_url}/emails`)
pub struct ResendMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
}

impl ResendMailer {
    pub fn new(config: &EmailConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        if config.api_key.is_none() {
            tracing::warn!("email.api_key is not set; borrow request emails will not be sent");
        }

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            from: sender_mailbox(config),
        })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<Value, DeliveryError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| DeliveryError::NotConfigured("email API key".to_string()))?;

        let response = self
            .client
            .post(format!("{}/emails", self.api_url))
            .bearer_auth(api_key)
            .json(&json!({
                "from": self.from,
                "to": email.to,
                "subject": email.subject,
                "html": email.html,
            }))
            .send()
            .await
            .map_err(|e| DeliveryError::Unavailable(format!("Email provider unreachable: {}", e)))?;

        let status = response.status();
        let data: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            return Err(DeliveryError::Provider {
                message: format!("Email provider returned {}", status),
                details: Some(data),
            });
        }

        Ok(data)
    }
}

/// SMTP relay
pub struct SmtpMailer {
    config: EmailConfig,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn transport(&self) -> Result<SmtpTransport, DeliveryError> {
        let builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host).map_err(|e| {
                DeliveryError::NotConfigured(format!("SMTP transport: {}", e))
            })?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port)
        .timeout(Some(Duration::from_secs(self.config.timeout_secs)));

        let builder = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            builder.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            builder
        };

        Ok(builder.build())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<Value, DeliveryError> {
        let from = Mailbox::from_str(&sender_mailbox(&self.config))
            .map_err(|e| DeliveryError::NotConfigured(format!("Invalid from address: {}", e)))?;
        let to = Mailbox::from_str(&email.to).map_err(|e| DeliveryError::Provider {
            message: format!("Invalid recipient address: {}", e),
            details: None,
        })?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(email.subject.clone())
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(email.html.clone()),
            )
            .map_err(|e| DeliveryError::Provider {
                message: format!("Failed to build email: {}", e),
                details: None,
            })?;

        let transport = self.transport()?;

        // lettre's SMTP transport is blocking
        let response = tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| DeliveryError::Unavailable(format!("SMTP task failed: {}", e)))?
            .map_err(|e| DeliveryError::Unavailable(format!("Failed to send email: {}", e)))?;

        Ok(json!({
            "code": response.code().to_string(),
            "message": response.message().collect::<Vec<_>>(),
        }))
    }
}
