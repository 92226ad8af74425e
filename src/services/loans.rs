//! Borrow lifecycle service
//!
//! The only code path that touches both the catalog stock and the ledger.
//! Stock is taken before a loan is written and given back only after the
//! loan is closed, so an interrupted sequence can under-count the shelf but
//! never over-count it. A copy taken for a loan is only put back when the
//! ledger definitely refused the loan.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    config::LoansConfig,
    error::{AppError, AppResult},
    models::{BorrowReceipt, BorrowRecord, Identity, NewLoan, ReturnSummary},
    repository::Repository,
};

use super::fines::FinePolicy;

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    fines: FinePolicy,
    loan_period: Duration,
}

impl LoansService {
    pub fn new(repository: Repository, config: &LoansConfig) -> Self {
        Self {
            repository,
            fines: FinePolicy::new(config.fine_per_day),
            loan_period: Duration::days(config.loan_period_days),
        }
    }

    /// Borrow one copy of a book for `borrower`
    pub async fn borrow_book(
        &self,
        borrower: &Identity,
        book_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowReceipt> {
        let book = self.repository.books.get(book_id).await?;

        if book.quantity <= 0 {
            return Err(AppError::OutOfStock(format!("\"{}\" is not available", book.title)));
        }

        if self
            .repository
            .borrows
            .find_open_loan(borrower.id, book_id)
            .await?
            .is_some()
        {
            return Err(AppError::AlreadyBorrowed(format!(
                "You already have an open loan of \"{}\"",
                book.title
            )));
        }

        // Conditional update; losing a race to the last copy lands here
        let book = self.repository.books.decrement_stock(book_id).await?;

        let due_at = now + self.loan_period;
        let loan = NewLoan {
            borrower: borrower.snapshot(),
            book: book.snapshot(),
            price: book.price,
            borrowed_at: now,
            due_at,
        };

        let record_id = match self.repository.borrows.create_open_loan(loan).await {
            Ok(id) => id,
            Err(e @ AppError::AlreadyBorrowed(_)) => {
                self.restore_stock(book_id).await;
                return Err(e);
            }
            Err(e) => {
                // The insert may have committed; keep the copy off the shelf
                tracing::error!(
                    "Borrow of book {} by {} has an unknown ledger outcome, stock left decremented: {}",
                    book_id,
                    borrower.id,
                    e
                );
                return Err(e);
            }
        };

        tracing::info!(
            "Borrow recorded: record={} book={} borrower={} due={}",
            record_id,
            book_id,
            borrower.id,
            due_at
        );

        Ok(BorrowReceipt {
            record_id,
            book_id,
            due_at,
        })
    }

    /// Return the caller's open loan of `book_id`
    pub async fn return_book(
        &self,
        borrower: &Identity,
        book_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<ReturnSummary> {
        let book = self.repository.books.get(book_id).await?;

        let loan = match self
            .repository
            .borrows
            .find_open_loan(borrower.id, book_id)
            .await?
        {
            Some(loan) => loan,
            None => {
                let previous = self
                    .repository
                    .borrows
                    .find_latest_loan(borrower.id, book_id)
                    .await?;
                return Err(match previous {
                    Some(_) => AppError::AlreadyReturned(format!(
                        "\"{}\" was already returned",
                        book.title
                    )),
                    None => AppError::NotBorrowed(format!(
                        "You have not borrowed \"{}\"",
                        book.title
                    )),
                });
            }
        };

        self.close(loan, now).await
    }

    /// Return a loan identified by its record id (admin desk)
    ///
    /// The record id decides which loan is closed. `borrower_email` is only
    /// compared for logging.
    pub async fn return_by_record(
        &self,
        record_id: Uuid,
        borrower_email: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<ReturnSummary> {
        let loan = match self
            .repository
            .borrows
            .find_open_loan_by_record_id(record_id)
            .await?
        {
            Some(loan) => loan,
            None => {
                let record = self.repository.borrows.get(record_id).await?;
                return Err(AppError::AlreadyReturned(format!(
                    "\"{}\" was already returned",
                    record.book.title
                )));
            }
        };

        if let Some(email) = borrower_email {
            if !email.trim().eq_ignore_ascii_case(&loan.borrower.email) {
                tracing::warn!(
                    "Return of record {}: supplied email {} differs from borrower {}, using record",
                    record_id,
                    email,
                    loan.borrower.email
                );
            }
        }

        self.close(loan, now).await
    }

    async fn close(&self, loan: BorrowRecord, now: DateTime<Utc>) -> AppResult<ReturnSummary> {
        let fine = self.fines.compute_fine(loan.due_at, now);

        let closed = self.repository.borrows.close_loan(loan.id, now, fine).await?;

        if let Err(e) = self.repository.books.increment_stock(closed.book.id).await {
            // The loan is closed and its fine frozen; a lost increment only under-counts the shelf
            tracing::error!(
                "Loan {} closed but stock of book {} was not restored: {}",
                closed.id,
                closed.book.id,
                e
            );
        }

        tracing::info!(
            "Return recorded: record={} book={} fine={}",
            closed.id,
            closed.book.id,
            fine
        );

        Ok(ReturnSummary {
            record_id: closed.id,
            borrower_email: closed.borrower.email,
            returned_at: now,
            price: closed.price,
            fine,
            total: closed.price + fine,
            book: closed.book,
        })
    }

    async fn restore_stock(&self, book_id: Uuid) {
        if let Err(e) = self.repository.books.increment_stock(book_id).await {
            tracing::error!("Failed to restore stock of book {} after aborted borrow: {}", book_id, e);
        }
    }

    /// Every borrow record, open and closed
    pub async fn list_all(&self) -> AppResult<Vec<BorrowRecord>> {
        self.repository.borrows.list_all_loans().await
    }

    pub async fn list_for_borrower(&self, borrower_id: Uuid) -> AppResult<Vec<BorrowRecord>> {
        self.repository.borrows.list_loans_for_borrower(borrower_id).await
    }

    /// Open loans past their due date at `now`
    pub async fn list_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<BorrowRecord>> {
        let open = self.repository.borrows.list_open_loans().await?;
        Ok(open.into_iter().filter(|r| r.is_overdue(now)).collect())
    }
}
