//! Repository layer: store traits and their implementations

pub mod books;
pub mod borrow_requests;
pub mod memory;
pub mod profiles;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookFilter, BookStatus, CreateBook, UpdateBook},
        borrow_request::{BorrowRequest, BorrowStatus, LedgerFilter, NewBorrowRequest},
        profile::Profile,
    },
};

/// Book records. Listings are ordered newest first.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Book>;

    async fn list(&self, filter: BookFilter) -> AppResult<Vec<Book>>;

    async fn create(&self, owner_id: Uuid, book: &CreateBook) -> AppResult<Book>;

    /// Edit descriptive fields; never touches `status`
    async fn update(&self, id: Uuid, update: &UpdateBook) -> AppResult<Book>;

    async fn set_status(&self, id: Uuid, status: BookStatus) -> AppResult<()>;

    async fn delete(&self, id: Uuid) -> AppResult<()>;

    /// Connectivity check for readiness probes
    async fn ping(&self) -> AppResult<()>;
}

/// Borrow request ledger. Rows are never deleted. Listings are ordered newest first.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BorrowLedger: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<BorrowRequest>;

    /// Insert a `pending` request
    async fn insert(&self, request: &NewBorrowRequest) -> AppResult<BorrowRequest>;

    /// Move a request from `from` to `to`. Fails with `InvalidState` when the
    /// stored status is no longer `from`.
    async fn set_status(&self, id: Uuid, from: BorrowStatus, to: BorrowStatus) -> AppResult<BorrowRequest>;

    async fn list(&self, filter: LedgerFilter) -> AppResult<Vec<BorrowRequest>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, id: Uuid) -> AppResult<Option<Profile>>;

    async fn get_many(&self, ids: Vec<Uuid>) -> AppResult<Vec<Profile>>;

    async fn upsert(&self, profile: &Profile) -> AppResult<Profile>;
}

/// Error for a conditional status write that lost a race
pub(crate) fn status_changed(current: &BorrowRequest, expected: BorrowStatus) -> AppError {
    AppError::InvalidState(format!(
        "Borrow request {} is {}, expected {}",
        current.id, current.status, expected
    ))
}

/// Main repository struct holding the stores
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn BookStore>,
    pub borrow_requests: Arc<dyn BorrowLedger>,
    pub profiles: Arc<dyn ProfileStore>,
}

impl Repository {
    /// Create a repository backed by PostgreSQL
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(books::BooksRepository::new(pool.clone())),
            borrow_requests: Arc::new(borrow_requests::BorrowRequestsRepository::new(pool.clone())),
            profiles: Arc::new(profiles::ProfilesRepository::new(pool)),
        }
    }

    /// Create a repository backed by a process-local store
    pub fn in_memory() -> Self {
        let store = Arc::new(memory::MemoryStore::new());
        Self {
            books: store.clone(),
            borrow_requests: store.clone(),
            profiles: store,
        }
    }
}
