//! Book (catalog entry) model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Book record from the catalog
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub description: String,
    /// Charge for one borrow
    pub price: Decimal,
    /// Copies currently on the shelf
    pub quantity: i32,
    /// Always `quantity > 0`
    pub availability: bool,
    pub category: String,
    pub published_year: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Build a new catalog entry from an admin request
    pub fn new(data: CreateBook, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: data.title.trim().to_string(),
            author: data.author.trim().to_string(),
            description: data.description.unwrap_or_default(),
            price: data.price,
            quantity: data.quantity,
            availability: data.quantity > 0,
            category: data
                .category
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "General".to_string()),
            published_year: data.published_year,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fields copied into a borrow record
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            id: self.id,
            title: self.title.clone(),
            author: self.author.clone(),
        }
    }
}

/// Denormalized book fields stored on a borrow record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BookSnapshot {
    pub id: Uuid,
    pub title: String,
    pub author: String,
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Author is required"))]
    pub author: String,
    pub description: Option<String>,
    pub price: Decimal,
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub quantity: i32,
    pub category: Option<String>,
    pub published_year: Option<i32>,
}

impl CreateBook {
    /// Strip surrounding whitespace so validation sees what gets stored
    pub fn trimmed(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.author = self.author.trim().to_string();
        self
    }
}
