//! Bibliotheca Library Borrowing Server
//!
//! A REST JSON API over a book catalog and its borrow ledger: borrowing,
//! returning with late fines, loan reporting and overdue reminders.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
