//! Borrow request email endpoint

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::models::notification::{NotificationFailed, NotificationSent};

use super::AuthenticatedUser;

/// Email a book owner about a new borrow request
#[utoipa::path(
    post,
    path = "/send_borrow_request_email",
    tag = "notifications",
    security(("bearer_auth" = [])),
    request_body = crate::models::notification::BorrowNotification,
    responses(
        (status = 200, description = "Email sent", body = NotificationSent),
        (status = 400, description = "Missing required fields", body = NotificationFailed),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Owner email not found", body = NotificationFailed),
        (status = 500, description = "Email provider failure", body = NotificationFailed)
    )
)]
pub async fn send_borrow_request_email(
    State(state): State<crate::AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    body: Bytes,
) -> Response {
    match state.services.notifications.deliver_payload(&body).await {
        Ok(email_data) => (
            StatusCode::OK,
            Json(NotificationSent {
                success: true,
                email_data,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(requester_id = %actor.id, "Borrow request email not sent: {}", e);
            (e.status_code(), Json(e.to_body())).into_response()
        }
    }
}
