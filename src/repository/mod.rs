//! Repository layer for catalog and ledger storage
//!
//! Both stores expose only single-statement mutations. Every mutation that
//! guards an invariant is a conditional update, so callers never need a
//! transaction spanning more than one call.

pub mod books;
pub mod borrows;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Book, BorrowRecord, NewLoan},
};

/// Catalog store: book records and their copy count
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Current snapshot, or `NotFound`
    async fn get(&self, id: Uuid) -> AppResult<Book>;

    async fn list(&self) -> AppResult<Vec<Book>>;

    async fn create(&self, book: Book) -> AppResult<Book>;

    /// Remove a book. `Conflict` while any loan of it is open.
    async fn delete(&self, id: Uuid) -> AppResult<()>;

    /// Take one copy off the shelf. `NotFound` or `OutOfStock` on failure.
    async fn decrement_stock(&self, id: Uuid) -> AppResult<Book>;

    /// Put one copy back on the shelf
    async fn increment_stock(&self, id: Uuid) -> AppResult<Book>;
}

/// Borrow ledger: one record per loan, open until returned
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BorrowLedger: Send + Sync {
    /// Insert an open loan. `AlreadyBorrowed` if the pair already has one,
    /// `NotFound` if the book left the catalog.
    async fn create_open_loan(&self, loan: NewLoan) -> AppResult<Uuid>;

    async fn get(&self, record_id: Uuid) -> AppResult<BorrowRecord>;

    async fn find_open_loan(&self, borrower_id: Uuid, book_id: Uuid) -> AppResult<Option<BorrowRecord>>;

    async fn find_open_loan_by_record_id(&self, record_id: Uuid) -> AppResult<Option<BorrowRecord>>;

    /// Most recent loan of the pair, open or not
    async fn find_latest_loan(&self, borrower_id: Uuid, book_id: Uuid) -> AppResult<Option<BorrowRecord>>;

    /// Close an open loan. `AlreadyReturned` if closed, `NotFound` if absent.
    async fn close_loan(
        &self,
        record_id: Uuid,
        returned_at: DateTime<Utc>,
        fine: Decimal,
    ) -> AppResult<BorrowRecord>;

    /// Flag an open loan as reminded. Returns false if it was already flagged or closed.
    async fn mark_notified(&self, record_id: Uuid) -> AppResult<bool>;

    async fn list_open_loans(&self) -> AppResult<Vec<BorrowRecord>>;

    async fn list_all_loans(&self) -> AppResult<Vec<BorrowRecord>>;

    async fn list_loans_for_borrower(&self, borrower_id: Uuid) -> AppResult<Vec<BorrowRecord>>;
}

/// Main repository struct holding the two stores
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn BookStore>,
    pub borrows: Arc<dyn BorrowLedger>,
}

impl Repository {
    /// Create a Postgres-backed repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(books::BooksRepository::new(pool.clone())),
            borrows: Arc::new(borrows::BorrowsRepository::new(pool)),
        }
    }

    /// Create a repository that keeps everything in process memory
    pub fn in_memory() -> Self {
        let (books, borrows) = memory::linked();
        Self {
            books: Arc::new(books),
            borrows: Arc::new(borrows),
        }
    }

    pub fn from_parts(books: Arc<dyn BookStore>, borrows: Arc<dyn BorrowLedger>) -> Self {
        Self { books, borrows }
    }
}
