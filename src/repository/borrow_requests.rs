//! Borrow request ledger backed by PostgreSQL

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::borrow_request::{BorrowRequest, BorrowStatus, LedgerFilter, NewBorrowRequest},
};

use super::{status_changed, BorrowLedger};

#[derive(Clone)]
pub struct BorrowRequestsRepository {
    pool: Pool<Postgres>,
}

impl BorrowRequestsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BorrowLedger for BorrowRequestsRepository {
    async fn get_by_id(&self, id: Uuid) -> AppResult<BorrowRequest> {
        sqlx::query_as::<_, BorrowRequest>("SELECT * FROM borrow_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrow request with id {} not found", id)))
    }

    async fn insert(&self, request: &NewBorrowRequest) -> AppResult<BorrowRequest> {
        let created = sqlx::query_as::<_, BorrowRequest>(
            r#"
            INSERT INTO borrow_requests (id, book_id, owner_id, borrower_id, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.book_id)
        .bind(request.owner_id)
        .bind(request.borrower_id)
        .bind(BorrowStatus::Pending)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn set_status(&self, id: Uuid, from: BorrowStatus, to: BorrowStatus) -> AppResult<BorrowRequest> {
        let updated = sqlx::query_as::<_, BorrowRequest>(
            "UPDATE borrow_requests SET status = $3 WHERE id = $1 AND status = $2 RETURNING *",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(request) => Ok(request),
            None => {
                let current = self.get_by_id(id).await?;
                Err(status_changed(&current, from))
            }
        }
    }

    async fn list(&self, filter: LedgerFilter) -> AppResult<Vec<BorrowRequest>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM borrow_requests WHERE TRUE");

        if let Some(owner_id) = filter.owner_id {
            query.push(" AND owner_id = ").push_bind(owner_id);
        }
        if let Some(borrower_id) = filter.borrower_id {
            query.push(" AND borrower_id = ").push_bind(borrower_id);
        }
        if let Some(book_id) = filter.book_id {
            query.push(" AND book_id = ").push_bind(book_id);
        }
        if let Some(book_ids) = filter.book_ids {
            query.push(" AND book_id = ANY(").push_bind(book_ids).push(")");
        }
        if let Some(statuses) = filter.statuses {
            let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
            query.push(" AND status = ANY(").push_bind(statuses).push(")");
        }
        query.push(" ORDER BY created_at DESC");

        let requests = query
            .build_query_as::<BorrowRequest>()
            .fetch_all(&self.pool)
            .await?;

        Ok(requests)
    }
}
