//! Error types for Lendit server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::user::UserStatus;

/// Stable error codes exposed to API clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchUser = 4,
    NoSuchEquipment = 5,
    NoSuchRecord = 6,
    UserNotActive = 7,
    Duplicate = 8,
    MaxBorrowsReached = 9,
    NotBorrowable = 10,
    InsufficientQuantity = 11,
    AlreadyReturned = 12,
    HasReferences = 13,
    ConcurrentModification = 14,
    BadValue = 15,
}

/// Business-rule outcomes of the borrow/return engine and the referential guards.
///
/// None of these are fatal: they are handed back to the calling layer, which
/// decides how to present them. Only [`LendingError::ConcurrentModification`]
/// is retryable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LendingError {
    #[error("User {0} not found")]
    UserNotFound(i32),

    #[error("User {id} is not active (status: {status})")]
    UserNotActive { id: i32, status: UserStatus },

    #[error("Borrowing limit reached ({0} item(s))")]
    QuotaExceeded(u32),

    #[error("Equipment {0} not found")]
    EquipmentNotFound(i32),

    #[error("Equipment {0} is not borrowable")]
    NotBorrowable(i32),

    #[error("Insufficient equipment quantity ({0} available)")]
    InsufficientQuantity(i32),

    #[error("Borrow record {0} not found")]
    RecordNotFound(i32),

    #[error("Borrow record {0} has already been returned")]
    AlreadyReturned(i32),

    #[error("{entity} {id} is still referenced by borrow records")]
    HasActiveReferences { entity: &'static str, id: i32 },

    #[error("Concurrent modification detected, please retry")]
    ConcurrentModification,

    #[error("Quantity must be positive (got {0})")]
    InvalidQuantity(i32),

    #[error("Expected return date must be in the future")]
    ReturnDateNotInFuture,

    #[error("Returning these units would exceed the stock limit of equipment {0}")]
    QuantityOverflow(i32),
}

impl LendingError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LendingError::ConcurrentModification)
    }

    fn status_and_code(&self) -> (StatusCode, ErrorCode) {
        match self {
            LendingError::UserNotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchUser),
            LendingError::UserNotActive { .. } => (StatusCode::FORBIDDEN, ErrorCode::UserNotActive),
            LendingError::QuotaExceeded(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::MaxBorrowsReached)
            }
            LendingError::EquipmentNotFound(_) => {
                (StatusCode::NOT_FOUND, ErrorCode::NoSuchEquipment)
            }
            LendingError::NotBorrowable(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::NotBorrowable)
            }
            LendingError::InsufficientQuantity(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::InsufficientQuantity)
            }
            LendingError::QuantityOverflow(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::BadValue)
            }
            LendingError::RecordNotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchRecord),
            LendingError::AlreadyReturned(_) => (StatusCode::CONFLICT, ErrorCode::AlreadyReturned),
            LendingError::HasActiveReferences { .. } => {
                (StatusCode::CONFLICT, ErrorCode::HasReferences)
            }
            LendingError::ConcurrentModification => {
                (StatusCode::CONFLICT, ErrorCode::ConcurrentModification)
            }
            LendingError::InvalidQuantity(_) | LendingError::ReturnDateNotInFuture => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue)
            }
        }
    }
}

/// Non-fatal conditions reported alongside a successful operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LendingWarning {
    /// The record was closed but its equipment row no longer exists, so no
    /// quantity was credited back
    OrphanedEquipment { equipment_id: i32 },
}

impl std::fmt::Display for LendingWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LendingWarning::OrphanedEquipment { equipment_id } => write!(
                f,
                "Equipment {} no longer exists; no quantity was credited",
                equipment_id
            ),
        }
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Lending(#[from] LendingError),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::Authorization(msg) => {
                (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::DbFailure,
                    "Database error".to_string(),
                )
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ErrorCode::Duplicate, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
            }
            AppError::Lending(e) => {
                let (status, code) = e.status_and_code();
                (status, code, e.to_string())
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
