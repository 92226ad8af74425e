//! Catalog management service

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{Book, CreateBook},
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn list_books(&self) -> AppResult<Vec<Book>> {
        self.repository.books.list().await
    }

    pub async fn get_book(&self, id: Uuid) -> AppResult<Book> {
        self.repository.books.get(id).await
    }

    /// Add a title to the catalog
    pub async fn create_book(&self, data: CreateBook) -> AppResult<Book> {
        let data = data.trimmed();
        data.validate()?;
        if data.price.is_sign_negative() {
            return Err(AppError::Validation("Price cannot be negative".to_string()));
        }

        let book = self.repository.books.create(Book::new(data, Utc::now())).await?;
        tracing::info!("Catalog: added book id={} \"{}\" ({} copies)", book.id, book.title, book.quantity);
        Ok(book)
    }

    /// Remove a title. Refused while any copy is out on loan.
    pub async fn delete_book(&self, id: Uuid) -> AppResult<()> {
        self.repository.books.delete(id).await?;
        tracing::info!("Catalog: deleted book id={}", id);
        Ok(())
    }
}
