//! Data models for Bibliotheca

pub mod book;
pub mod borrow;
pub mod user;

pub use book::{Book, BookSnapshot, CreateBook};
pub use borrow::{BorrowReceipt, BorrowRecord, BorrowerSnapshot, LoanStatus, NewLoan, ReturnSummary};
pub use user::{Identity, Role, UserClaims};
