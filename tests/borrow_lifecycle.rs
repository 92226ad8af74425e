//! Borrow lifecycle scenarios against the in-memory store

use std::sync::Arc;

use async_trait::async_trait;
use bibliotheca_server::{
    config::LoansConfig,
    models::{Book, BorrowRecord, CreateBook, Identity, LoanStatus, NewLoan, Role},
    repository::{memory, BorrowLedger, Repository},
    services::{catalog::CatalogService, loans::LoansService},
    AppError, AppResult,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

fn reader(name: &str) -> Identity {
    Identity {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: format!("{}@example.org", name.to_lowercase()),
        role: Role::User,
    }
}

async fn setup(quantity: i32) -> (Repository, LoansService, Uuid) {
    let repository = Repository::in_memory();
    let book = repository
        .books
        .create(Book::new(
            CreateBook {
                title: "The Left Hand of Darkness".into(),
                author: "Ursula K. Le Guin".into(),
                description: Some("Winter".into()),
                price: Decimal::from(50),
                quantity,
                category: None,
                published_year: Some(1969),
            },
            Utc::now(),
        ))
        .await
        .unwrap();
    let loans = LoansService::new(repository.clone(), &LoansConfig::default());
    (repository, loans, book.id)
}

async fn assert_stock(repository: &Repository, book_id: Uuid, expected: i32) {
    let book = repository.books.get(book_id).await.unwrap();
    assert_eq!(book.quantity, expected);
    assert_eq!(book.availability, expected > 0);
}

#[tokio::test]
async fn single_copy_scenario() {
    let (repository, loans, book_id) = setup(1).await;
    let (alice, bob) = (reader("Alice"), reader("Bob"));
    let now = Utc::now();

    let receipt = loans.borrow_book(&alice, book_id, now).await.unwrap();
    assert_eq!(receipt.due_at, now + Duration::days(7));
    assert_stock(&repository, book_id, 0).await;

    let open = repository.borrows.list_open_loans().await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].borrower.email, "alice@example.org");
    assert_eq!(open[0].book.title, "The Left Hand of Darkness");

    let err = loans.borrow_book(&bob, book_id, now).await.unwrap_err();
    assert!(matches!(err, AppError::OutOfStock(_)));
    assert_eq!(repository.borrows.list_all_loans().await.unwrap().len(), 1);

    // Three days before the due date
    let summary = loans
        .return_book(&alice, book_id, now + Duration::days(4))
        .await
        .unwrap();
    assert_eq!(summary.fine, Decimal::ZERO);
    assert_eq!(summary.total, Decimal::from(50));
    assert_stock(&repository, book_id, 1).await;

    let record = repository.borrows.get(receipt.record_id).await.unwrap();
    assert_eq!(record.status(), LoanStatus::Returned);
    assert_eq!(record.fine, Decimal::ZERO);

    let err = loans
        .return_book(&alice, book_id, now + Duration::days(4))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyReturned(_)));
    assert_stock(&repository, book_id, 1).await;
}

#[tokio::test]
async fn ten_days_late_is_fined_per_day() {
    let (repository, loans, book_id) = setup(2).await;
    let alice = reader("Alice");
    let borrowed_at = Utc::now() - Duration::days(17);

    let receipt = loans.borrow_book(&alice, book_id, borrowed_at).await.unwrap();
    let returned_at = receipt.due_at + Duration::days(10);

    let summary = loans.return_book(&alice, book_id, returned_at).await.unwrap();
    assert_eq!(summary.fine, Decimal::from(100));
    assert_eq!(summary.total, Decimal::from(150));
    assert_eq!(
        summary.message("Nrs"),
        "Returned successfully. Total charges including fine: Nrs 150"
    );
    assert_eq!(
        repository.borrows.get(receipt.record_id).await.unwrap().fine,
        Decimal::from(100)
    );
}

#[tokio::test]
async fn borrow_then_return_restores_stock() {
    let (repository, loans, book_id) = setup(3).await;
    let alice = reader("Alice");
    let now = Utc::now();

    loans.borrow_book(&alice, book_id, now).await.unwrap();
    assert_stock(&repository, book_id, 2).await;

    let summary = loans.return_book(&alice, book_id, now).await.unwrap();
    assert_eq!(summary.fine, Decimal::ZERO);
    assert_stock(&repository, book_id, 3).await;
}

#[tokio::test]
async fn same_borrower_cannot_hold_two_copies() {
    let (repository, loans, book_id) = setup(3).await;
    let alice = reader("Alice");
    let now = Utc::now();

    loans.borrow_book(&alice, book_id, now).await.unwrap();
    let err = loans.borrow_book(&alice, book_id, now).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyBorrowed(_)));
    assert_stock(&repository, book_id, 2).await;

    // Allowed again once returned
    loans.return_book(&alice, book_id, now).await.unwrap();
    loans.borrow_book(&alice, book_id, now).await.unwrap();
    assert_stock(&repository, book_id, 2).await;
}

#[tokio::test]
async fn returning_a_book_never_borrowed() {
    let (_, loans, book_id) = setup(1).await;

    let err = loans
        .return_book(&reader("Carol"), book_id, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotBorrowed(_)));

    let err = loans
        .return_book(&reader("Carol"), Uuid::new_v4(), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn unknown_book_cannot_be_borrowed() {
    let (repository, loans, _) = setup(1).await;
    let err = loans
        .borrow_book(&reader("Alice"), Uuid::new_v4(), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(repository.borrows.list_all_loans().await.unwrap().is_empty());
}

#[tokio::test]
async fn admin_return_uses_record_id() {
    let (repository, loans, book_id) = setup(1).await;
    let alice = reader("Alice");
    let now = Utc::now();

    let receipt = loans.borrow_book(&alice, book_id, now).await.unwrap();

    // A mismatched email does not redirect the return
    let summary = loans
        .return_by_record(receipt.record_id, Some("someone.else@example.org"), now + Duration::hours(25) + Duration::days(7))
        .await
        .unwrap();
    assert_eq!(summary.record_id, receipt.record_id);
    assert_eq!(summary.borrower_email, "alice@example.org");
    assert_eq!(summary.fine, Decimal::from(20));
    assert_stock(&repository, book_id, 1).await;

    let err = loans
        .return_by_record(receipt.record_id, None, now)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyReturned(_)));
    assert_stock(&repository, book_id, 1).await;

    let err = loans
        .return_by_record(Uuid::new_v4(), None, now)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn records_keep_their_snapshot_after_catalog_changes() {
    let (repository, loans, book_id) = setup(1).await;
    let alice = reader("Alice");
    let now = Utc::now();

    loans.borrow_book(&alice, book_id, now).await.unwrap();
    loans.return_book(&alice, book_id, now).await.unwrap();
    repository.books.delete(book_id).await.unwrap();

    let history = loans.list_for_borrower(alice.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].book.title, "The Left Hand of Darkness");
    assert_eq!(history[0].borrower.name, "Alice");
}

#[tokio::test]
async fn overdue_listing_only_contains_late_open_loans() {
    let (_, loans, book_id) = setup(3).await;
    let (alice, bob, carol) = (reader("Alice"), reader("Bob"), reader("Carol"));
    let now = Utc::now();

    loans.borrow_book(&alice, book_id, now - Duration::days(10)).await.unwrap();
    loans.borrow_book(&bob, book_id, now - Duration::days(9)).await.unwrap();
    loans.borrow_book(&carol, book_id, now).await.unwrap();
    loans.return_book(&bob, book_id, now).await.unwrap();

    let overdue = loans.list_overdue(now).await.unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].borrower.id, alice.id);

    assert_eq!(loans.list_all().await.unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_concurrent_borrowers_one_copy() {
    let (repository, loans, book_id) = setup(1).await;
    let loans = Arc::new(loans);

    let handles: Vec<_> = ["Alice", "Bob"]
        .into_iter()
        .map(|name| {
            let loans = loans.clone();
            let who = reader(name);
            tokio::spawn(async move { loans.borrow_book(&who, book_id, Utc::now()).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert!(matches!(e, AppError::OutOfStock(_)), "unexpected error: {e}"),
        }
    }

    assert_eq!(successes, 1);
    assert_stock(&repository, book_id, 0).await;
    assert_eq!(repository.borrows.list_open_loans().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stock_never_goes_negative_under_contention() {
    let (repository, loans, book_id) = setup(5).await;
    let loans = Arc::new(loans);

    let handles: Vec<_> = (0..25)
        .map(|i| {
            let loans = loans.clone();
            let who = reader(&format!("Reader{}", i));
            tokio::spawn(async move { loans.borrow_book(&who, book_id, Utc::now()).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }

    assert_eq!(successes, 5);
    assert_stock(&repository, book_id, 0).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_returns_increment_stock_once() {
    let (repository, loans, book_id) = setup(1).await;
    let alice = reader("Alice");
    let receipt = loans.borrow_book(&alice, book_id, Utc::now()).await.unwrap();
    let loans = Arc::new(loans);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let loans = loans.clone();
            tokio::spawn(async move {
                loans
                    .return_by_record(receipt.record_id, None, Utc::now())
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert!(matches!(e, AppError::AlreadyReturned(_)), "unexpected error: {e}"),
        }
    }

    assert_eq!(successes, 1);
    assert_stock(&repository, book_id, 1).await;
}

/// Ledger whose inserts commit but report a pool timeout
struct TimeoutAfterCommit(memory::MemoryBorrowLedger);

#[async_trait]
impl BorrowLedger for TimeoutAfterCommit {
    async fn create_open_loan(&self, loan: NewLoan) -> AppResult<Uuid> {
        self.0.create_open_loan(loan).await?;
        Err(AppError::StorageUnavailable(sqlx::Error::PoolTimedOut))
    }

    async fn get(&self, record_id: Uuid) -> AppResult<BorrowRecord> {
        self.0.get(record_id).await
    }

    async fn find_open_loan(&self, borrower_id: Uuid, book_id: Uuid) -> AppResult<Option<BorrowRecord>> {
        self.0.find_open_loan(borrower_id, book_id).await
    }

    async fn find_open_loan_by_record_id(&self, record_id: Uuid) -> AppResult<Option<BorrowRecord>> {
        self.0.find_open_loan_by_record_id(record_id).await
    }

    async fn find_latest_loan(&self, borrower_id: Uuid, book_id: Uuid) -> AppResult<Option<BorrowRecord>> {
        self.0.find_latest_loan(borrower_id, book_id).await
    }

    async fn close_loan(
        &self,
        record_id: Uuid,
        returned_at: DateTime<Utc>,
        fine: Decimal,
    ) -> AppResult<BorrowRecord> {
        self.0.close_loan(record_id, returned_at, fine).await
    }

    async fn mark_notified(&self, record_id: Uuid) -> AppResult<bool> {
        self.0.mark_notified(record_id).await
    }

    async fn list_open_loans(&self) -> AppResult<Vec<BorrowRecord>> {
        self.0.list_open_loans().await
    }

    async fn list_all_loans(&self) -> AppResult<Vec<BorrowRecord>> {
        self.0.list_all_loans().await
    }

    async fn list_loans_for_borrower(&self, borrower_id: Uuid) -> AppResult<Vec<BorrowRecord>> {
        self.0.list_loans_for_borrower(borrower_id).await
    }
}

#[tokio::test]
async fn ambiguous_ledger_failure_never_overbooks() {
    let (books, ledger) = memory::linked();
    let repository = Repository::from_parts(Arc::new(books), Arc::new(TimeoutAfterCommit(ledger)));
    let book = repository
        .books
        .create(Book::new(
            CreateBook {
                title: "Solaris".into(),
                author: "Stanislaw Lem".into(),
                description: None,
                price: Decimal::from(30),
                quantity: 1,
                category: None,
                published_year: None,
            },
            Utc::now(),
        ))
        .await
        .unwrap();
    let loans = LoansService::new(repository.clone(), &LoansConfig::default());
    let now = Utc::now();

    let err = loans.borrow_book(&reader("Alice"), book.id, now).await.unwrap_err();
    assert!(matches!(err, AppError::StorageUnavailable(_)));
    assert_eq!(repository.borrows.list_open_loans().await.unwrap().len(), 1);
    assert_stock(&repository, book.id, 0).await;

    let err = loans.borrow_book(&reader("Bob"), book.id, now).await.unwrap_err();
    assert!(matches!(err, AppError::OutOfStock(_)));
    assert_eq!(repository.borrows.list_open_loans().await.unwrap().len(), 1);
}

#[tokio::test]
async fn book_on_loan_cannot_leave_the_catalog() {
    let (repository, loans, book_id) = setup(1).await;
    let catalog = CatalogService::new(repository.clone());
    let alice = reader("Alice");
    let now = Utc::now();

    loans.borrow_book(&alice, book_id, now).await.unwrap();
    let err = catalog.delete_book(book_id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_stock(&repository, book_id, 0).await;

    loans.return_book(&alice, book_id, now).await.unwrap();
    catalog.delete_book(book_id).await.unwrap();

    let err = loans.borrow_book(&alice, book_id, now).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
