//! Book catalog service

use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookFilter, BookStatus, BookWithOwner, CreateBook, UpdateBook},
    repository::Repository,
};

#[derive(Clone)]
pub struct BooksService {
    repository: Repository,
}

impl BooksService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Books owned by other users, newest first
    pub async fn browse(&self, user_id: Uuid) -> AppResult<Vec<BookWithOwner>> {
        let books = self
            .repository
            .books
            .list(BookFilter {
                exclude_owner_id: Some(user_id),
                ..Default::default()
            })
            .await?;

        self.with_owners(books).await
    }

    /// The user's own books, newest first
    pub async fn my_books(&self, user_id: Uuid) -> AppResult<Vec<Book>> {
        self.repository
            .books
            .list(BookFilter {
                owner_id: Some(user_id),
                ..Default::default()
            })
            .await
    }

    pub async fn get(&self, id: Uuid) -> AppResult<BookWithOwner> {
        let book = self.repository.books.get_by_id(id).await?;
        let owner = self.repository.profiles.get(book.owner_id).await?;
        Ok(BookWithOwner { book, owner })
    }

    pub async fn create(&self, owner_id: Uuid, book: CreateBook) -> AppResult<Book> {
        let book = book.normalized();
        let created = self.repository.books.create(owner_id, &book).await?;
        tracing::info!(book_id = %created.id, owner_id = %owner_id, "Book created");
        Ok(created)
    }

    /// Edit descriptive fields of a book the user owns
    pub async fn update(&self, user_id: Uuid, id: Uuid, update: UpdateBook) -> AppResult<Book> {
        let book = self.repository.books.get_by_id(id).await?;
        ensure_owner(&book, user_id)?;

        self.repository.books.update(id, &update.normalized()).await
    }

    /// Delete a book the user owns. Lent books cannot be deleted.
    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> AppResult<()> {
        let book = self.repository.books.get_by_id(id).await?;
        ensure_owner(&book, user_id)?;

        if book.status == BookStatus::Borrowed {
            return Err(AppError::InvalidState(
                "Cannot delete a book that is currently borrowed".to_string(),
            ));
        }

        self.repository.books.delete(id).await?;
        tracing::info!(book_id = %id, owner_id = %user_id, "Book deleted");
        Ok(())
    }

    async fn with_owners(&self, books: Vec<Book>) -> AppResult<Vec<BookWithOwner>> {
        let mut owner_ids: Vec<Uuid> = books.iter().map(|b| b.owner_id).collect();
        owner_ids.sort();
        owner_ids.dedup();

        let owners: HashMap<Uuid, _> = self
            .repository
            .profiles
            .get_many(owner_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        Ok(books
            .into_iter()
            .map(|book| {
                let owner = owners.get(&book.owner_id).cloned();
                BookWithOwner { book, owner }
            })
            .collect())
    }
}

fn ensure_owner(book: &Book, user_id: Uuid) -> AppResult<()> {
    if book.owner_id != user_id {
        return Err(AppError::Authorization(
            "Only the owner may modify this book".to_string(),
        ));
    }
    Ok(())
}
