//! Borrowing endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{BorrowRecord, LoanStatus, ReturnSummary},
};

use super::AuthenticatedUser;

/// Borrow confirmation
#[derive(Serialize, ToSchema)]
pub struct BorrowResponse {
    /// Borrow record ID
    pub id: Uuid,
    pub book_id: Uuid,
    /// Due date (ISO 8601 format)
    pub due_date: DateTime<Utc>,
    /// Status message
    pub message: String,
}

/// Return confirmation with charges
#[derive(Serialize, ToSchema)]
pub struct ReturnResponse {
    pub id: Uuid,
    pub book_id: Uuid,
    pub book_title: String,
    pub borrower_email: String,
    pub price: Decimal,
    pub fine: Decimal,
    pub total: Decimal,
    pub message: String,
}

impl ReturnResponse {
    fn from_summary(summary: ReturnSummary, currency: &str) -> Self {
        let message = summary.message(currency);
        Self {
            id: summary.record_id,
            book_id: summary.book.id,
            book_title: summary.book.title,
            borrower_email: summary.borrower_email,
            price: summary.price,
            fine: summary.fine,
            total: summary.total,
            message,
        }
    }
}

/// Admin return request
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ReturnByRecordRequest {
    /// Borrower email, for display only
    pub borrower_email: Option<String>,
}

/// Borrow record with its derived status
#[derive(Serialize, ToSchema)]
pub struct BorrowRecordView {
    #[serde(flatten)]
    pub record: BorrowRecord,
    pub status: LoanStatus,
}

impl From<BorrowRecord> for BorrowRecordView {
    fn from(record: BorrowRecord) -> Self {
        Self {
            status: record.status(),
            record,
        }
    }
}

/// Borrow records listing
#[derive(Serialize, ToSchema)]
pub struct BorrowListResponse {
    pub borrowed_books: Vec<BorrowRecordView>,
}

impl From<Vec<BorrowRecord>> for BorrowListResponse {
    fn from(records: Vec<BorrowRecord>) -> Self {
        Self {
            borrowed_books: records.into_iter().map(BorrowRecordView::from).collect(),
        }
    }
}

/// Borrow one copy of a book
#[utoipa::path(
    post,
    path = "/borrows/books/{book_id}",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("book_id" = Uuid, Path, description = "Book ID")
    ),
    responses(
        (status = 201, description = "Book borrowed", body = BorrowResponse),
        (status = 400, description = "Out of stock or already borrowed", body = crate::error::ErrorResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn borrow_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<BorrowResponse>)> {
    let identity = claims.identity();

    let receipt = state
        .services
        .loans
        .borrow_book(&identity, book_id, Utc::now())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(BorrowResponse {
            id: receipt.record_id,
            book_id: receipt.book_id,
            due_date: receipt.due_at,
            message: "Book borrowed successfully.".to_string(),
        }),
    ))
}

/// Return the caller's borrowed copy of a book
#[utoipa::path(
    put,
    path = "/borrows/books/{book_id}/return",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("book_id" = Uuid, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = ReturnResponse),
        (status = 400, description = "Not borrowed or already returned", body = crate::error::ErrorResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<Uuid>,
) -> AppResult<Json<ReturnResponse>> {
    let identity = claims.identity();

    let summary = state
        .services
        .loans
        .return_book(&identity, book_id, Utc::now())
        .await?;

    Ok(Json(ReturnResponse::from_summary(summary, &state.config.loans.currency)))
}

/// Return a loan by its record ID
#[utoipa::path(
    put,
    path = "/borrows/{record_id}/return",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("record_id" = Uuid, Path, description = "Borrow record ID")
    ),
    request_body = ReturnByRecordRequest,
    responses(
        (status = 200, description = "Book returned", body = ReturnResponse),
        (status = 400, description = "Already returned", body = crate::error::ErrorResponse),
        (status = 403, description = "Admin only", body = crate::error::ErrorResponse),
        (status = 404, description = "Record not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_by_record(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(record_id): Path<Uuid>,
    request: Option<Json<ReturnByRecordRequest>>,
) -> AppResult<Json<ReturnResponse>> {
    claims.identity().require_admin()?;

    let request = request.map(|Json(r)| r).unwrap_or_default();

    let summary = state
        .services
        .loans
        .return_by_record(record_id, request.borrower_email.as_deref(), Utc::now())
        .await?;

    Ok(Json(ReturnResponse::from_summary(summary, &state.config.loans.currency)))
}

/// All borrow records, open and closed
#[utoipa::path(
    get,
    path = "/borrows",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All borrow records", body = BorrowListResponse),
        (status = 403, description = "Admin only", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_all_borrows(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<BorrowListResponse>> {
    claims.identity().require_admin()?;

    let records = state.services.loans.list_all().await?;
    Ok(Json(records.into()))
}

/// The caller's borrow records
#[utoipa::path(
    get,
    path = "/borrows/me",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller's borrow records", body = BorrowListResponse)
    )
)]
pub async fn list_my_borrows(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<BorrowListResponse>> {
    let records = state.services.loans.list_for_borrower(claims.sub).await?;
    Ok(Json(records.into()))
}

/// Open loans past their due date
#[utoipa::path(
    get,
    path = "/borrows/overdue",
    tag = "borrows",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Overdue loans", body = BorrowListResponse),
        (status = 403, description = "Admin only", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_overdue_borrows(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<BorrowListResponse>> {
    claims.identity().require_admin()?;

    let records = state.services.loans.list_overdue(Utc::now()).await?;
    Ok(Json(records.into()))
}
