//! API handlers for Bookshare REST endpoints

pub mod books;
pub mod borrow_requests;
pub mod health;
pub mod notifications;
pub mod openapi;
pub mod profiles;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        request::Parts,
        HeaderName, Method,
    },
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::AppError, models::session::{Actor, SessionClaims}, AppState};

/// Extractor for the authenticated user of a session token
pub struct AuthenticatedUser(pub Actor);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = SessionClaims::from_token(token, &state.config.auth.jwt_secret, &state.config.auth.audience)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedUser(Actor::new(claims.sub, claims.email, token)))
    }
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Books
        .route("/books", get(books::browse_books).post(books::create_book))
        .route("/books/mine", get(books::my_books))
        .route("/books/consistency", get(books::audit_consistency))
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        // Profiles
        .route("/profile", get(profiles::get_my_profile).put(profiles::update_my_profile))
        .route("/profiles/:id", get(profiles::get_profile))
        // Borrow requests
        .route(
            "/borrow-requests",
            get(borrow_requests::list_borrow_requests).post(borrow_requests::create_borrow_request),
        )
        .route("/borrow-requests/:id/approve", post(borrow_requests::approve_borrow_request))
        .route("/borrow-requests/:id/reject", post(borrow_requests::reject_borrow_request))
        .route("/borrow-requests/:id/return", post(borrow_requests::return_borrow_request))
        .layer(cors)
        .with_state(state.clone());

    // Notification endpoint called by browsers directly
    let functions_cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ]);

    let functions_v1 = Router::new()
        .route(
            "/send_borrow_request_email",
            post(notifications::send_borrow_request_email),
        )
        .layer(functions_cors)
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .nest("/functions/v1", functions_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
}
