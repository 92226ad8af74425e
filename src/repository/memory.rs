//! In-process store backend
//!
//! Each operation takes the store's lock once, so the conditional updates
//! behave exactly like their SQL counterparts under concurrent callers.
//! Stores built by [`linked`] share their maps; any operation holding both
//! locks takes the catalog lock first.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BookStore, BorrowLedger};
use crate::{
    error::{AppError, AppResult},
    models::{Book, BorrowRecord, NewLoan},
};

type Catalog = Arc<RwLock<HashMap<Uuid, Book>>>;
type Records = Arc<RwLock<HashMap<Uuid, BorrowRecord>>>;

#[derive(Default)]
pub struct MemoryBookStore {
    books: Catalog,
    /// Ledger consulted before a delete
    loans: Option<Records>,
}

/// Catalog and ledger sharing state, so deletes and new loans see each other
pub fn linked() -> (MemoryBookStore, MemoryBorrowLedger) {
    let books = Catalog::default();
    let records = Records::default();
    (
        MemoryBookStore {
            books: books.clone(),
            loans: Some(records.clone()),
        },
        MemoryBorrowLedger {
            records,
            catalog: Some(books),
        },
    )
}

fn book_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Book {} not found", id))
}

#[async_trait]
impl BookStore for MemoryBookStore {
    async fn get(&self, id: Uuid) -> AppResult<Book> {
        self.books
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| book_not_found(id))
    }

    async fn list(&self) -> AppResult<Vec<Book>> {
        let mut books: Vec<Book> = self.books.read().await.values().cloned().collect();
        books.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.author.cmp(&b.author)));
        Ok(books)
    }

    async fn create(&self, mut book: Book) -> AppResult<Book> {
        if book.quantity < 0 {
            return Err(AppError::Validation("Quantity cannot be negative".to_string()));
        }
        book.availability = book.quantity > 0;

        let mut books = self.books.write().await;
        if books.contains_key(&book.id) {
            return Err(AppError::Conflict(format!("Book {} already exists", book.id)));
        }
        books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut books = self.books.write().await;
        let book = books.get(&id).ok_or_else(|| book_not_found(id))?;

        if let Some(loans) = &self.loans {
            let on_loan = loans
                .read()
                .await
                .values()
                .any(|r| r.is_open() && r.book.id == id);
            if on_loan {
                return Err(AppError::Conflict(format!(
                    "\"{}\" still has copies on loan",
                    book.title
                )));
            }
        }

        books.remove(&id);
        Ok(())
    }

    async fn decrement_stock(&self, id: Uuid) -> AppResult<Book> {
        let mut books = self.books.write().await;
        let book = books.get_mut(&id).ok_or_else(|| book_not_found(id))?;
        if book.quantity <= 0 {
            return Err(AppError::OutOfStock(format!("\"{}\" is not available", book.title)));
        }
        book.quantity -= 1;
        book.availability = book.quantity > 0;
        book.updated_at = Utc::now();
        Ok(book.clone())
    }

    async fn increment_stock(&self, id: Uuid) -> AppResult<Book> {
        let mut books = self.books.write().await;
        let book = books.get_mut(&id).ok_or_else(|| book_not_found(id))?;
        book.quantity += 1;
        book.availability = true;
        book.updated_at = Utc::now();
        Ok(book.clone())
    }
}

#[derive(Default)]
pub struct MemoryBorrowLedger {
    records: Records,
    /// Catalog a new loan's book must still be in
    catalog: Option<Catalog>,
}

impl MemoryBorrowLedger {
    async fn collect<F>(&self, keep: F) -> Vec<BorrowRecord>
    where
        F: Fn(&BorrowRecord) -> bool,
    {
        let mut records: Vec<BorrowRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| keep(*r))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.borrowed_at.cmp(&a.borrowed_at).then_with(|| a.id.cmp(&b.id)));
        records
    }
}

#[async_trait]
impl BorrowLedger for MemoryBorrowLedger {
    async fn create_open_loan(&self, loan: NewLoan) -> AppResult<Uuid> {
        let catalog = match &self.catalog {
            Some(books) => Some(books.read().await),
            None => None,
        };
        if let Some(books) = &catalog {
            if !books.contains_key(&loan.book.id) {
                return Err(book_not_found(loan.book.id));
            }
        }

        let mut records = self.records.write().await;
        let duplicate = records
            .values()
            .any(|r| r.is_open() && r.borrower.id == loan.borrower.id && r.book.id == loan.book.id);
        if duplicate {
            return Err(AppError::AlreadyBorrowed(format!(
                "You already have an open loan of \"{}\"",
                loan.book.title
            )));
        }

        let id = Uuid::new_v4();
        records.insert(id, loan.into_record(id));
        Ok(id)
    }

    async fn get(&self, record_id: Uuid) -> AppResult<BorrowRecord> {
        self.records
            .read()
            .await
            .get(&record_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Borrow record {} not found", record_id)))
    }

    async fn find_open_loan(&self, borrower_id: Uuid, book_id: Uuid) -> AppResult<Option<BorrowRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.is_open() && r.borrower.id == borrower_id && r.book.id == book_id)
            .cloned())
    }

    async fn find_open_loan_by_record_id(&self, record_id: Uuid) -> AppResult<Option<BorrowRecord>> {
        Ok(self
            .records
            .read()
            .await
            .get(&record_id)
            .filter(|r| r.is_open())
            .cloned())
    }

    async fn find_latest_loan(&self, borrower_id: Uuid, book_id: Uuid) -> AppResult<Option<BorrowRecord>> {
        Ok(self
            .collect(|r| r.borrower.id == borrower_id && r.book.id == book_id)
            .await
            .into_iter()
            .next())
    }

    async fn close_loan(
        &self,
        record_id: Uuid,
        returned_at: DateTime<Utc>,
        fine: Decimal,
    ) -> AppResult<BorrowRecord> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&record_id)
            .ok_or_else(|| AppError::NotFound(format!("Borrow record {} not found", record_id)))?;

        if !record.is_open() {
            return Err(AppError::AlreadyReturned(format!(
                "\"{}\" was already returned",
                record.book.title
            )));
        }
        record.returned_at = Some(returned_at);
        record.fine = fine;
        Ok(record.clone())
    }

    async fn mark_notified(&self, record_id: Uuid) -> AppResult<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(&record_id) {
            Some(record) if record.is_open() && !record.notified => {
                record.notified = true;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(AppError::NotFound(format!("Borrow record {} not found", record_id))),
        }
    }

    async fn list_open_loans(&self) -> AppResult<Vec<BorrowRecord>> {
        let mut open = self.collect(|r| r.is_open()).await;
        open.sort_by_key(|r| r.due_at);
        Ok(open)
    }

    async fn list_all_loans(&self) -> AppResult<Vec<BorrowRecord>> {
        Ok(self.collect(|_| true).await)
    }

    async fn list_loans_for_borrower(&self, borrower_id: Uuid) -> AppResult<Vec<BorrowRecord>> {
        Ok(self.collect(|r| r.borrower.id == borrower_id).await)
    }
}
