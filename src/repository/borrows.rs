//! Borrow ledger repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::BorrowLedger;
use crate::{
    error::{AppError, AppResult},
    models::{borrow::BorrowRow, BorrowRecord, NewLoan},
};

/// Partial unique index on open (borrower, book) pairs
const ONE_OPEN_LOAN_INDEX: &str = "borrows_one_open_per_borrower_book";

#[derive(Clone)]
pub struct BorrowsRepository {
    pool: Pool<Postgres>,
}

impl BorrowsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn fetch_records(&self, query: &str, bind: Option<Uuid>) -> AppResult<Vec<BorrowRecord>> {
        let mut q = sqlx::query_as::<_, BorrowRow>(query);
        if let Some(id) = bind {
            q = q.bind(id);
        }
        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(BorrowRecord::from).collect())
    }
}

fn is_open_loan_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some("23505")
                && db.constraint().map_or(true, |c| c == ONE_OPEN_LOAN_INDEX)
        }
        _ => false,
    }
}

#[async_trait]
impl BorrowLedger for BorrowsRepository {
    async fn create_open_loan(&self, loan: NewLoan) -> AppResult<Uuid> {
        let id = Uuid::new_v4();

        // The share lock makes a concurrent book delete wait for this insert
        let inserted = sqlx::query(
            r#"
            INSERT INTO borrows (
                id, borrower_id, borrower_name, borrower_email,
                book_id, book_title, book_author,
                price, borrowed_at, due_at, returned_at, fine, notified
            )
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NULL, 0, FALSE
            WHERE EXISTS (SELECT 1 FROM books WHERE id = $5 FOR SHARE)
            "#,
        )
        .bind(id)
        .bind(loan.borrower.id)
        .bind(&loan.borrower.name)
        .bind(&loan.borrower.email)
        .bind(loan.book.id)
        .bind(&loan.book.title)
        .bind(&loan.book.author)
        .bind(loan.price)
        .bind(loan.borrowed_at)
        .bind(loan.due_at)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(done) if done.rows_affected() == 1 => Ok(id),
            Ok(_) => Err(AppError::NotFound(format!("Book {} not found", loan.book.id))),
            Err(e) if is_open_loan_conflict(&e) => Err(AppError::AlreadyBorrowed(format!(
                "You already have an open loan of \"{}\"",
                loan.book.title
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, record_id: Uuid) -> AppResult<BorrowRecord> {
        sqlx::query_as::<_, BorrowRow>("SELECT * FROM borrows WHERE id = $1")
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?
            .map(BorrowRecord::from)
            .ok_or_else(|| AppError::NotFound(format!("Borrow record {} not found", record_id)))
    }

    async fn find_open_loan(&self, borrower_id: Uuid, book_id: Uuid) -> AppResult<Option<BorrowRecord>> {
        let row = sqlx::query_as::<_, BorrowRow>(
            "SELECT * FROM borrows WHERE borrower_id = $1 AND book_id = $2 AND returned_at IS NULL",
        )
        .bind(borrower_id)
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(BorrowRecord::from))
    }

    async fn find_open_loan_by_record_id(&self, record_id: Uuid) -> AppResult<Option<BorrowRecord>> {
        let row = sqlx::query_as::<_, BorrowRow>(
            "SELECT * FROM borrows WHERE id = $1 AND returned_at IS NULL",
        )
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(BorrowRecord::from))
    }

    async fn find_latest_loan(&self, borrower_id: Uuid, book_id: Uuid) -> AppResult<Option<BorrowRecord>> {
        let row = sqlx::query_as::<_, BorrowRow>(
            r#"
            SELECT * FROM borrows
            WHERE borrower_id = $1 AND book_id = $2
            ORDER BY borrowed_at DESC
            LIMIT 1
            "#,
        )
        .bind(borrower_id)
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(BorrowRecord::from))
    }

    async fn close_loan(
        &self,
        record_id: Uuid,
        returned_at: DateTime<Utc>,
        fine: Decimal,
    ) -> AppResult<BorrowRecord> {
        let closed = sqlx::query_as::<_, BorrowRow>(
            r#"
            UPDATE borrows
            SET returned_at = $2, fine = $3
            WHERE id = $1 AND returned_at IS NULL
            RETURNING *
            "#,
        )
        .bind(record_id)
        .bind(returned_at)
        .bind(fine)
        .fetch_optional(&self.pool)
        .await?;

        match closed {
            Some(row) => Ok(row.into()),
            None => {
                // Either someone closed it first or it never existed
                let record = self.get(record_id).await?;
                Err(AppError::AlreadyReturned(format!(
                    "\"{}\" was already returned",
                    record.book.title
                )))
            }
        }
    }

    async fn mark_notified(&self, record_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE borrows SET notified = TRUE WHERE id = $1 AND returned_at IS NULL AND notified = FALSE",
        )
        .bind(record_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_open_loans(&self) -> AppResult<Vec<BorrowRecord>> {
        self.fetch_records(
            "SELECT * FROM borrows WHERE returned_at IS NULL ORDER BY due_at",
            None,
        )
        .await
    }

    async fn list_all_loans(&self) -> AppResult<Vec<BorrowRecord>> {
        self.fetch_records("SELECT * FROM borrows ORDER BY borrowed_at DESC", None)
            .await
    }

    async fn list_loans_for_borrower(&self, borrower_id: Uuid) -> AppResult<Vec<BorrowRecord>> {
        self.fetch_records(
            "SELECT * FROM borrows WHERE borrower_id = $1 ORDER BY borrowed_at DESC",
            Some(borrower_id),
        )
        .await
    }
}
