//! Book endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookWithOwner, CreateBook, UpdateBook},
        borrow_request::StatusMismatch,
    },
};

use super::AuthenticatedUser;

/// Browse books owned by other users, newest first
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Books of other users with their owner's profile", body = Vec<BookWithOwner>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn browse_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
) -> AppResult<Json<Vec<BookWithOwner>>> {
    let books = state.services.books.browse(actor.id).await?;
    Ok(Json(books))
}

/// List the caller's own books
#[utoipa::path(
    get,
    path = "/books/mine",
    tag = "books",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller's books", body = Vec<Book>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn my_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
) -> AppResult<Json<Vec<Book>>> {
    let books = state.services.books.my_books(actor.id).await?;
    Ok(Json(books))
}

/// Get a book with its owner's profile
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = BookWithOwner),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_actor): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BookWithOwner>> {
    let book = state.services.books.get(id).await?;
    Ok(Json(book))
}

/// List a book owned by the caller
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid input")
    )
)]
pub async fn create_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Json(book): Json<CreateBook>,
) -> AppResult<(StatusCode, Json<Book>)> {
    let book = book.normalized();
    book.validate()?;

    let created = state.services.books.create(actor.id, book).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Edit a book's descriptive fields
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Book ID")
    ),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn update_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(update): Json<UpdateBook>,
) -> AppResult<Json<Book>> {
    let update = update.normalized();
    update.validate()?;

    let book = state.services.books.update(actor.id, id, update).await?;
    Ok(Json(book))
}

/// Delete a book
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Book ID")
    ),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Book is currently borrowed")
    )
)]
pub async fn delete_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.services.books.delete(actor.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Report the caller's books whose status disagrees with the borrow ledger
#[utoipa::path(
    get,
    path = "/books/consistency",
    tag = "books",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Inconsistent books, empty when none", body = Vec<StatusMismatch>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn audit_consistency(
    State(state): State<crate::AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
) -> AppResult<Json<Vec<StatusMismatch>>> {
    let mismatches = state.services.borrows.audit_consistency(actor.id).await?;
    Ok(Json(mismatches))
}
