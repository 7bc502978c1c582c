//! Borrow request notifications.
//!
//! The workflow never waits on delivery: notifications go onto a bounded queue
//! drained by a background worker that owns the retry policy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{
    config::NotificationsConfig,
    error::{AppError, AppResult},
    models::notification::{BorrowNotification, BorrowNotificationPayload, NotificationFailed},
};

use super::{
    directory::ContactDirectory,
    email::{borrow_request_email, Mailer},
};

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("{0}")]
    InvalidPayload(String),

    #[error("Owner email not found")]
    RecipientNotFound,

    #[error("Failed to send email: {message}")]
    Provider {
        message: String,
        details: Option<Value>,
    },

    #[error("Notification rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Delivery unavailable: {0}")]
    Unavailable(String),

    #[error("Notification delivery is not configured: {0}")]
    NotConfigured(String),
}

impl DeliveryError {
    /// Whether a later attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DeliveryError::Provider { .. } | DeliveryError::Unavailable(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            DeliveryError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            DeliveryError::RecipientNotFound => StatusCode::NOT_FOUND,
            DeliveryError::Rejected { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            DeliveryError::Provider { .. }
            | DeliveryError::Unavailable(_)
            | DeliveryError::NotConfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Response body of the notification endpoint
    pub fn to_body(&self) -> NotificationFailed {
        match self {
            DeliveryError::Provider { details, .. } => NotificationFailed {
                error: "Failed to send email".to_string(),
                details: details.clone(),
            },
            other => NotificationFailed {
                error: other.to_string(),
                details: None,
            },
        }
    }
}

/// Delivers a borrow request notification on behalf of the requester
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &BorrowNotification, bearer: &str) -> Result<(), DeliveryError>;
}

/// Resolves the owner's address and sends the email
#[derive(Clone)]
pub struct NotificationService {
    directory: Arc<dyn ContactDirectory>,
    mailer: Arc<dyn Mailer>,
    sender_name: String,
}

impl NotificationService {
    pub fn new(
        directory: Arc<dyn ContactDirectory>,
        mailer: Arc<dyn Mailer>,
        sender_name: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            mailer,
            sender_name: sender_name.into(),
        }
    }

    /// Send the email for `notification`, returning the provider's response
    pub async fn deliver(&self, notification: &BorrowNotification) -> Result<Value, DeliveryError> {
        let to = self
            .directory
            .email_for(notification.owner_id)
            .await?
            .ok_or(DeliveryError::RecipientNotFound)?;

        let email = borrow_request_email(&to, notification, &self.sender_name);
        let data = self.mailer.send(&email).await?;

        tracing::info!(
            owner_id = %notification.owner_id,
            book_title = %notification.book_title,
            "Borrow request email sent"
        );

        Ok(data)
    }

    /// Handle a raw notification endpoint body
    pub async fn deliver_payload(&self, body: &[u8]) -> Result<Value, DeliveryError> {
        let payload: BorrowNotificationPayload = serde_json::from_slice(body)
            .map_err(|e| DeliveryError::InvalidPayload(format!("Invalid JSON body: {}", e)))?;
        let notification = payload
            .into_notification()
            .map_err(|e| DeliveryError::InvalidPayload(e.to_string()))?;

        self.deliver(&notification).await
    }
}

#[async_trait]
impl Notifier for NotificationService {
    async fn notify(&self, notification: &BorrowNotification, _bearer: &str) -> Result<(), DeliveryError> {
        self.deliver(notification).await.map(|_| ())
    }
}

/// Posts notifications to a separately deployed notification endpoint
pub struct RemoteNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteNotifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Notifier for RemoteNotifier {
    async fn notify(&self, notification: &BorrowNotification, bearer: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(bearer)
            .json(notification)
            .send()
            .await
            .map_err(|e| DeliveryError::Unavailable(format!("Notification endpoint unreachable: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();

        if status.is_server_error() {
            Err(DeliveryError::Unavailable(format!(
                "Notification endpoint returned {}: {}",
                status, message
            )))
        } else {
            Err(DeliveryError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Retry policy of the notification worker
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before attempt `n + 1` is `backoff * n`
    pub backoff: Duration,
}

impl From<&NotificationsConfig> for RetryPolicy {
    fn from(config: &NotificationsConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

#[derive(Debug)]
struct QueuedNotification {
    notification: BorrowNotification,
    bearer: String,
}

/// Handle for enqueueing notifications; cheap to clone
#[derive(Clone)]
pub struct NotificationQueue {
    sender: Option<mpsc::Sender<QueuedNotification>>,
}

impl NotificationQueue {
    /// Spawn the delivery worker. Must be called within a Tokio runtime.
    pub fn start(notifier: Arc<dyn Notifier>, capacity: usize, policy: RetryPolicy) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_worker(receiver, notifier, policy));
        Self {
            sender: Some(sender),
        }
    }

    /// A queue that drops everything
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Enqueue without waiting. Returns false when the notification was dropped.
    pub fn enqueue(&self, notification: BorrowNotification, bearer: String) -> bool {
        let Some(sender) = &self.sender else {
            tracing::debug!(
                owner_id = %notification.owner_id,
                "Notifications disabled, dropping borrow request notification"
            );
            return false;
        };

        match sender.try_send(QueuedNotification {
            notification,
            bearer,
        }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(
                    owner_id = %job.notification.owner_id,
                    "Notification queue full, dropping borrow request notification"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::error!(
                    owner_id = %job.notification.owner_id,
                    "Notification worker stopped, dropping borrow request notification"
                );
                false
            }
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<QueuedNotification>,
    notifier: Arc<dyn Notifier>,
    policy: RetryPolicy,
) {
    while let Some(job) = receiver.recv().await {
        if let Err(e) = deliver_with_retry(notifier.as_ref(), &job.notification, &job.bearer, policy).await {
            tracing::warn!(
                owner_id = %job.notification.owner_id,
                book_title = %job.notification.book_title,
                "Borrow request notification not delivered: {}",
                e
            );
        }
    }
    tracing::debug!("Notification worker stopped");
}

/// Attempt delivery, retrying transient failures. Returns the number of attempts made.
pub async fn deliver_with_retry(
    notifier: &dyn Notifier,
    notification: &BorrowNotification,
    bearer: &str,
    policy: RetryPolicy,
) -> Result<u32, DeliveryError> {
    let mut attempt = 1;
    loop {
        match notifier.notify(notification, bearer).await {
            Ok(()) => return Ok(attempt),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                tracing::debug!(attempt, "Notification attempt failed, retrying: {}", e);
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
