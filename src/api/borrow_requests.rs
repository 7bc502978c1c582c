//! Borrow request endpoints

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::borrow_request::{
        BorrowRequest, BorrowRequestQuery, BorrowRequestView, CreateBorrowRequest,
    },
};

use super::AuthenticatedUser;

/// Ask to borrow a book
#[utoipa::path(
    post,
    path = "/borrow-requests",
    tag = "borrow-requests",
    security(("bearer_auth" = [])),
    request_body = CreateBorrowRequest,
    responses(
        (status = 201, description = "Request created, owner notified in the background", body = BorrowRequest),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Book not available, own book, or request already open")
    )
)]
pub async fn create_borrow_request(
    State(state): State<crate::AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Json(request): Json<CreateBorrowRequest>,
) -> AppResult<(StatusCode, Json<BorrowRequest>)> {
    let created = state
        .services
        .borrows
        .create_request(&actor, request.book_id)
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// List the caller's borrow requests, as owner or as borrower
#[utoipa::path(
    get,
    path = "/borrow-requests",
    tag = "borrow-requests",
    security(("bearer_auth" = [])),
    params(
        ("role" = String, Query, description = "`owner` for incoming requests, `borrower` for outgoing ones"),
        ("status" = Option<String>, Query, description = "Only requests in this status")
    ),
    responses(
        (status = 200, description = "Requests newest first, joined with book and counterparty", body = Vec<BorrowRequestView>),
        (status = 400, description = "Invalid role or status")
    )
)]
pub async fn list_borrow_requests(
    State(state): State<crate::AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    query: Result<Query<BorrowRequestQuery>, QueryRejection>,
) -> AppResult<Json<Vec<BorrowRequestView>>> {
    let Query(query) = query?;
    let requests = state
        .services
        .borrows
        .list_for_user(actor.id, query.role, query.status)
        .await?;

    Ok(Json(requests))
}

/// Approve a pending request for one of the caller's books
#[utoipa::path(
    post,
    path = "/borrow-requests/{id}/approve",
    tag = "borrow-requests",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrow request ID")
    ),
    responses(
        (status = 200, description = "Request approved, book marked borrowed", body = BorrowRequest),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Not the owner, request not pending, or book already lent"),
        (status = 502, description = "Request approved but book status could not be updated")
    )
)]
pub async fn approve_borrow_request(
    State(state): State<crate::AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BorrowRequest>> {
    let request = state.services.borrows.approve(&actor, id).await?;
    Ok(Json(request))
}

/// Reject a pending request for one of the caller's books
#[utoipa::path(
    post,
    path = "/borrow-requests/{id}/reject",
    tag = "borrow-requests",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrow request ID")
    ),
    responses(
        (status = 200, description = "Request rejected", body = BorrowRequest),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Not the owner or request not pending")
    )
)]
pub async fn reject_borrow_request(
    State(state): State<crate::AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BorrowRequest>> {
    let request = state.services.borrows.reject(&actor, id).await?;
    Ok(Json(request))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/borrow-requests/{id}/return",
    tag = "borrow-requests",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrow request ID")
    ),
    responses(
        (status = 200, description = "Request returned, book available again", body = BorrowRequest),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Not the borrower or request not approved"),
        (status = 502, description = "Request returned but book status could not be updated")
    )
)]
pub async fn return_borrow_request(
    State(state): State<crate::AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BorrowRequest>> {
    let request = state.services.borrows.return_book(&actor, id).await?;
    Ok(Json(request))
}
