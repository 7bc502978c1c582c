//! Administrative identity lookup: resolves a user id to a contact address

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    config::IdentityConfig,
    error::{AppError, AppResult},
};

use super::notifications::DeliveryError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Email address of `user_id`, `None` when the user is unknown or has none
    async fn email_for(&self, user_id: Uuid) -> Result<Option<String>, DeliveryError>;
}

/// Build the directory selected by configuration: the identity provider's
/// admin API when `identity.admin_url` is set, the static table otherwise.
pub fn build_directory(config: &IdentityConfig, timeout: Duration) -> AppResult<Arc<dyn ContactDirectory>> {
    match (&config.admin_url, &config.service_role_key) {
        (Some(url), Some(key)) => Ok(Arc::new(AdminIdentityClient::new(url, key, timeout)?)),
        (Some(_), None) => Err(AppError::Internal(
            "identity.admin_url requires identity.service_role_key".to_string(),
        )),
        _ => Ok(Arc::new(StaticDirectory::from_config(&config.contacts))),
    }
}

/// Client for the identity provider's admin users endpoint
pub struct AdminIdentityClient {
    client: reqwest::Client,
    admin_url: String,
    service_role_key: String,
}

impl AdminIdentityClient {
    pub fn new(admin_url: &str, service_role_key: &str, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            admin_url: admin_url.trim_end_matches('/').to_string(),
            service_role_key: service_role_key.to_string(),
        })
    }
}

#[async_trait]
impl ContactDirectory for AdminIdentityClient {
    async fn email_for(&self, user_id: Uuid) -> Result<Option<String>, DeliveryError> {
        let response = self
            .client
            .get(format!("{}/admin/users/{}", self.admin_url, user_id))
            .bearer_auth(&self.service_role_key)
            .header("apikey", &self.service_role_key)
            .send()
            .await
            .map_err(|e| DeliveryError::Unavailable(format!("Identity lookup failed: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if !status.is_success() => {
                return Err(DeliveryError::Unavailable(format!(
                    "Identity lookup returned {}",
                    status
                )))
            }
            _ => {}
        }

        let user: Value = response
            .json()
            .await
            .map_err(|e| DeliveryError::Unavailable(format!("Invalid identity response: {}", e)))?;

        Ok(user
            .get("email")
            .or_else(|| user.pointer("/user/email"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string))
    }
}

/// Fixed id -> email table
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    contacts: HashMap<Uuid, String>,
}

impl StaticDirectory {
    pub fn from_config(contacts: &HashMap<String, String>) -> Self {
        let contacts = contacts
            .iter()
            .filter_map(|(id, email)| match Uuid::parse_str(id) {
                Ok(id) => Some((id, email.clone())),
                Err(_) => {
                    tracing::warn!("Ignoring identity contact with invalid user id {:?}", id);
                    None
                }
            })
            .collect();
        Self { contacts }
    }
}

#[async_trait]
impl ContactDirectory for StaticDirectory {
    async fn email_for(&self, user_id: Uuid) -> Result<Option<String>, DeliveryError> {
        Ok(self.contacts.get(&user_id).cloned())
    }
}
