//! Process-local store for development and tests.
//! Rows live in insertion order; listings return newest first.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookFilter, BookStatus, CreateBook, UpdateBook},
        borrow_request::{BorrowRequest, BorrowStatus, LedgerFilter, NewBorrowRequest},
        profile::Profile,
    },
};

use super::{status_changed, BookStore, BorrowLedger, ProfileStore};

pub struct MemoryStore {
    books: RwLock<Vec<Book>>,
    requests: RwLock<Vec<BorrowRequest>>,
    profiles: RwLock<HashMap<Uuid, Profile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            books: RwLock::new(Vec::new()),
            requests: RwLock::new(Vec::new()),
            profiles: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn book_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Book with id {} not found", id))
}

fn request_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Borrow request with id {} not found", id))
}

/// Newest first; later insertions win ties on `created_at`
fn newest_first<T: Clone>(rows: &[T], created_at: impl Fn(&T) -> chrono::DateTime<Utc>) -> Vec<T> {
    let mut rows: Vec<T> = rows.iter().rev().cloned().collect();
    rows.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    rows
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Book> {
        let books = self.books.read().await;
        books
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(|| book_not_found(id))
    }

    async fn list(&self, filter: BookFilter) -> AppResult<Vec<Book>> {
        let books = self.books.read().await;
        let matching: Vec<Book> = books.iter().filter(|b| filter.matches(b)).cloned().collect();
        Ok(newest_first(&matching, |b| b.created_at))
    }

    async fn create(&self, owner_id: Uuid, book: &CreateBook) -> AppResult<Book> {
        let created = Book {
            id: Uuid::new_v4(),
            owner_id,
            title: book.title.clone(),
            author: book.author.clone(),
            genre: book.genre.clone(),
            synopsis: book.synopsis.clone(),
            cover_url: book.cover_url.clone(),
            status: BookStatus::Available,
            created_at: Utc::now(),
        };
        self.books.write().await.push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: Uuid, update: &UpdateBook) -> AppResult<Book> {
        let mut books = self.books.write().await;
        let book = books
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| book_not_found(id))?;
        update.apply_to(book);
        Ok(book.clone())
    }

    async fn set_status(&self, id: Uuid, status: BookStatus) -> AppResult<()> {
        let mut books = self.books.write().await;
        let book = books
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| book_not_found(id))?;
        book.status = status;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut books = self.books.write().await;
        let before = books.len();
        books.retain(|b| b.id != id);
        if books.len() == before {
            return Err(book_not_found(id));
        }
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl BorrowLedger for MemoryStore {
    async fn get_by_id(&self, id: Uuid) -> AppResult<BorrowRequest> {
        let requests = self.requests.read().await;
        requests
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| request_not_found(id))
    }

    async fn insert(&self, request: &NewBorrowRequest) -> AppResult<BorrowRequest> {
        let created = BorrowRequest {
            id: Uuid::new_v4(),
            book_id: request.book_id,
            owner_id: request.owner_id,
            borrower_id: request.borrower_id,
            status: BorrowStatus::Pending,
            created_at: Utc::now(),
        };
        self.requests.write().await.push(created.clone());
        Ok(created)
    }

    async fn set_status(&self, id: Uuid, from: BorrowStatus, to: BorrowStatus) -> AppResult<BorrowRequest> {
        let mut requests = self.requests.write().await;
        let request = requests
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| request_not_found(id))?;
        if request.status != from {
            return Err(status_changed(request, from));
        }
        request.status = to;
        Ok(request.clone())
    }

    async fn list(&self, filter: LedgerFilter) -> AppResult<Vec<BorrowRequest>> {
        let requests = self.requests.read().await;
        let matching: Vec<BorrowRequest> =
            requests.iter().filter(|r| filter.matches(r)).cloned().collect();
        Ok(newest_first(&matching, |r| r.created_at))
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get(&self, id: Uuid) -> AppResult<Option<Profile>> {
        Ok(self.profiles.read().await.get(&id).cloned())
    }

    async fn get_many(&self, ids: Vec<Uuid>) -> AppResult<Vec<Profile>> {
        let profiles = self.profiles.read().await;
        Ok(ids.iter().filter_map(|id| profiles.get(id).cloned()).collect())
    }

    async fn upsert(&self, profile: &Profile) -> AppResult<Profile> {
        self.profiles
            .write()
            .await
            .insert(profile.id, profile.clone());
        Ok(profile.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_book(title: &str) -> CreateBook {
        CreateBook {
            title: title.to_string(),
            author: None,
            genre: None,
            synopsis: None,
            cover_url: None,
        }
    }

    #[tokio::test]
    async fn test_books_listed_newest_first() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let first = store.create(owner, &create_book("First")).await.unwrap();
        let second = store.create(owner, &create_book("Second")).await.unwrap();

        let books = BookStore::list(&store, BookFilter::default()).await.unwrap();
        assert_eq!(books[0].id, second.id);
        assert_eq!(books[1].id, first.id);

        let others = BookStore::list(
            &store,
            BookFilter {
                exclude_owner_id: Some(owner),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(others.is_empty());
    }

    #[tokio::test]
    async fn test_delete_keeps_requests() {
        let store = MemoryStore::new();
        let book = store.create(Uuid::new_v4(), &create_book("Momo")).await.unwrap();
        let request = store
            .insert(&NewBorrowRequest {
                book_id: book.id,
                owner_id: book.owner_id,
                borrower_id: Uuid::new_v4(),
            })
            .await
            .unwrap();

        BookStore::delete(&store, book.id).await.unwrap();

        let kept = BorrowLedger::get_by_id(&store, request.id).await.unwrap();
        assert_eq!(kept.status, BorrowStatus::Pending);
        assert!(matches!(
            BookStore::get_by_id(&store, book.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            BookStore::delete(&store, book.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_request_status_compare_and_swap() {
        let store = MemoryStore::new();
        let request = store
            .insert(&NewBorrowRequest {
                book_id: Uuid::new_v4(),
                owner_id: Uuid::new_v4(),
                borrower_id: Uuid::new_v4(),
            })
            .await
            .unwrap();
        assert_eq!(request.status, BorrowStatus::Pending);

        let updated = BorrowLedger::set_status(&store, request.id, BorrowStatus::Pending, BorrowStatus::Approved)
            .await
            .unwrap();
        assert_eq!(updated.status, BorrowStatus::Approved);

        // A concurrent reject read the request while it was still pending
        let stale = BorrowLedger::set_status(&store, request.id, BorrowStatus::Pending, BorrowStatus::Rejected).await;
        assert!(matches!(stale, Err(AppError::InvalidState(_))));
        assert_eq!(
            BorrowLedger::get_by_id(&store, request.id).await.unwrap().status,
            BorrowStatus::Approved
        );

        let missing = BorrowLedger::set_status(&store, Uuid::new_v4(), BorrowStatus::Pending, BorrowStatus::Approved).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }
}
