//! Borrow request notification payload

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Notification sent to a book owner when someone asks to borrow a book.
/// Serializes to the JSON body accepted by the notification endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BorrowNotification {
    pub owner_id: Uuid,
    pub owner_name: String,
    pub book_title: String,
    pub requester_name: String,
    pub requester_class: String,
}

/// Raw notification body, before required fields are checked
#[derive(Debug, Default, Deserialize)]
pub struct BorrowNotificationPayload {
    pub owner_id: Option<String>,
    pub owner_name: Option<String>,
    pub book_title: Option<String>,
    pub requester_name: Option<String>,
    pub requester_class: Option<String>,
}

impl BorrowNotificationPayload {
    /// Check required fields: `owner_id`, `book_title` and `requester_name`
    pub fn into_notification(self) -> Result<BorrowNotification, &'static str> {
        let required = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        let (Some(owner_id), Some(book_title), Some(requester_name)) = (
            required(self.owner_id),
            required(self.book_title),
            required(self.requester_name),
        ) else {
            return Err("Missing required fields");
        };

        let owner_id = Uuid::parse_str(owner_id.trim()).map_err(|_| "Invalid owner_id")?;

        Ok(BorrowNotification {
            owner_id,
            owner_name: self.owner_name.unwrap_or_default(),
            book_title,
            requester_name,
            requester_class: self.requester_class.unwrap_or_default(),
        })
    }
}

/// Success body of the notification endpoint
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSent {
    pub success: bool,
    /// Provider response for the sent email
    #[schema(value_type = Object)]
    pub email_data: serde_json::Value,
}

/// Error body of the notification endpoint
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationFailed {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}
