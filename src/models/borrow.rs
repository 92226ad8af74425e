//! Borrow record model and related types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::book::BookSnapshot;

/// Lifecycle state of a borrow record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Open,
    Returned,
}

/// Denormalized borrower fields stored on a borrow record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BorrowerSnapshot {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// One loan of one book to one borrower
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BorrowRecord {
    pub id: Uuid,
    pub borrower: BorrowerSnapshot,
    pub book: BookSnapshot,
    pub price: Decimal,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub fine: Decimal,
    /// Set once the overdue reminder went out
    pub notified: bool,
}

impl BorrowRecord {
    pub fn status(&self) -> LoanStatus {
        if self.returned_at.is_some() {
            LoanStatus::Returned
        } else {
            LoanStatus::Open
        }
    }

    pub fn is_open(&self) -> bool {
        self.returned_at.is_none()
    }

    /// Open and past its due date at `now`
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.due_at < now
    }
}

/// Borrow record as stored in the `borrows` table
#[derive(Debug, Clone, FromRow)]
pub struct BorrowRow {
    pub id: Uuid,
    pub borrower_id: Uuid,
    pub borrower_name: String,
    pub borrower_email: String,
    pub book_id: Uuid,
    pub book_title: String,
    pub book_author: String,
    pub price: Decimal,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub fine: Decimal,
    pub notified: bool,
}

impl From<BorrowRow> for BorrowRecord {
    fn from(row: BorrowRow) -> Self {
        Self {
            id: row.id,
            borrower: BorrowerSnapshot {
                id: row.borrower_id,
                name: row.borrower_name,
                email: row.borrower_email,
            },
            book: BookSnapshot {
                id: row.book_id,
                title: row.book_title,
                author: row.book_author,
            },
            price: row.price,
            borrowed_at: row.borrowed_at,
            due_at: row.due_at,
            returned_at: row.returned_at,
            fine: row.fine,
            notified: row.notified,
        }
    }
}

/// Data for a new open loan
#[derive(Debug, Clone, PartialEq)]
pub struct NewLoan {
    pub borrower: BorrowerSnapshot,
    pub book: BookSnapshot,
    pub price: Decimal,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

impl NewLoan {
    pub fn into_record(self, id: Uuid) -> BorrowRecord {
        BorrowRecord {
            id,
            borrower: self.borrower,
            book: self.book,
            price: self.price,
            borrowed_at: self.borrowed_at,
            due_at: self.due_at,
            returned_at: None,
            fine: Decimal::ZERO,
            notified: false,
        }
    }
}

/// Confirmation of a successful borrow
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BorrowReceipt {
    pub record_id: Uuid,
    pub book_id: Uuid,
    pub due_at: DateTime<Utc>,
}

/// Charges due after a return
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReturnSummary {
    pub record_id: Uuid,
    pub book: BookSnapshot,
    pub borrower_email: String,
    pub returned_at: DateTime<Utc>,
    pub price: Decimal,
    pub fine: Decimal,
    pub total: Decimal,
}

impl ReturnSummary {
    /// Human-readable charge line, amounts prefixed by `currency`
    pub fn message(&self, currency: &str) -> String {
        if self.fine.is_zero() {
            format!("Returned successfully. Total charges: {} {}", currency, self.price)
        } else {
            format!(
                "Returned successfully. Total charges including fine: {} {}",
                currency, self.total
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(returned_at: Option<DateTime<Utc>>, due_at: DateTime<Utc>) -> BorrowRecord {
        BorrowRecord {
            id: Uuid::new_v4(),
            borrower: BorrowerSnapshot {
                id: Uuid::new_v4(),
                name: "Ada".into(),
                email: "ada@example.org".into(),
            },
            book: BookSnapshot {
                id: Uuid::new_v4(),
                title: "Dune".into(),
                author: "Frank Herbert".into(),
            },
            price: Decimal::from(50),
            borrowed_at: due_at - Duration::days(7),
            due_at,
            returned_at,
            fine: Decimal::ZERO,
            notified: false,
        }
    }

    #[test]
    fn status_follows_return_timestamp() {
        let now = Utc::now();
        assert_eq!(record(None, now).status(), LoanStatus::Open);
        assert_eq!(record(Some(now), now).status(), LoanStatus::Returned);
    }

    #[test]
    fn returned_loans_are_never_overdue() {
        let now = Utc::now();
        let due = now - Duration::days(3);
        assert!(record(None, due).is_overdue(now));
        assert!(!record(Some(now), due).is_overdue(now));
    }

    #[test]
    fn message_mentions_fine_only_when_charged() {
        let summary = ReturnSummary {
            record_id: Uuid::new_v4(),
            book: record(None, Utc::now()).book,
            borrower_email: "ada@example.org".into(),
            returned_at: Utc::now(),
            price: Decimal::from(50),
            fine: Decimal::ZERO,
            total: Decimal::from(50),
        };
        assert_eq!(summary.message("Nrs"), "Returned successfully. Total charges: Nrs 50");

        let fined = ReturnSummary {
            fine: Decimal::from(30),
            total: Decimal::from(80),
            ..summary
        };
        assert_eq!(
            fined.message("Nrs"),
            "Returned successfully. Total charges including fine: Nrs 80"
        );
    }
}
