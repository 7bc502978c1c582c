//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, borrow_requests, health, notifications, profiles};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bookshare API",
        version = "1.0.0",
        description = "Peer-to-peer book lending REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Books
        books::browse_books,
        books::my_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::audit_consistency,
        // Profiles
        profiles::get_my_profile,
        profiles::update_my_profile,
        profiles::get_profile,
        // Borrow requests
        borrow_requests::create_borrow_request,
        borrow_requests::list_borrow_requests,
        borrow_requests::approve_borrow_request,
        borrow_requests::reject_borrow_request,
        borrow_requests::return_borrow_request,
    ),
    components(
        schemas(
            // Books
            crate::models::book::Book,
            crate::models::book::BookStatus,
            crate::models::book::BookWithOwner,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            // Profiles
            crate::models::profile::Profile,
            crate::models::profile::UpsertProfile,
            // Borrow requests
            crate::models::borrow_request::BorrowRequest,
            crate::models::borrow_request::BorrowStatus,
            crate::models::borrow_request::Role,
            crate::models::borrow_request::CreateBorrowRequest,
            crate::models::borrow_request::BorrowRequestView,
            crate::models::borrow_request::StatusMismatch,
            crate::models::borrow_request::MismatchKind,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "books", description = "Book listings"),
        (name = "profiles", description = "User display profiles"),
        (name = "borrow-requests", description = "Borrow request workflow")
    )
)]
pub struct ApiDoc;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bookshare notification functions",
        version = "1.0.0",
        description = "Endpoints called with the requester's session token"
    ),
    servers(
        (url = "/functions/v1", description = "Functions v1")
    ),
    paths(notifications::send_borrow_request_email),
    components(
        schemas(
            crate::models::notification::BorrowNotification,
            crate::models::notification::NotificationSent,
            crate::models::notification::NotificationFailed,
        )
    ),
    tags(
        (name = "notifications", description = "Borrow request emails")
    )
)]
pub struct FunctionsDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new().merge(
        SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi())
            .url("/api-docs/functions.json", FunctionsDoc::openapi()),
    )
}
