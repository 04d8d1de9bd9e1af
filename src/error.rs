use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::migrate::MigrateError;
use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Pledge error: {0}")]
    Pledge(#[from] PledgeError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External error: {0}")]
    ExternalError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Pledge lifecycle errors, rejected synchronously at the API edge
/// rather than inside a settlement run
#[derive(Error, Debug)]
pub enum PledgeError {
    #[error("Pledge not found: {0}")]
    NotFound(Uuid),

    #[error("Pledge amount {amount} outside allowed range {min}..={max}")]
    AmountOutOfRange {
        amount: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("Server is at pledge capacity ({max_people} pledgers)")]
    ServerFull { max_people: usize },

    #[error("User already has an active pledge on this server")]
    DuplicatePledge,

    #[error("Server is not accepting pledges")]
    ServerInactive,

    #[error("Account is not chargeable: {0}")]
    AccountNotChargeable(String),

    #[error("Pledge in invalid state: {current}, expected: {expected}")]
    InvalidState { current: String, expected: String },
}

/// Settlement run errors
#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Withdrawal already recorded for server {server_id} on {scheduled_date}")]
    DuplicateRun {
        server_id: Uuid,
        scheduled_date: NaiveDate,
    },

    #[error("Server {server_id} is already being settled by another worker")]
    RunInProgress { server_id: Uuid },

    #[error("Failed to persist withdrawal for server {server_id}: {message}")]
    WithdrawalPersist { server_id: Uuid, message: String },
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            AppError::Pledge(PledgeError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                "PLEDGE_NOT_FOUND",
                format!("Pledge not found: {}", id),
                None,
            ),
            AppError::Pledge(PledgeError::AmountOutOfRange { amount, min, max }) => (
                StatusCode::BAD_REQUEST,
                "PLEDGE_AMOUNT_OUT_OF_RANGE",
                format!("Pledge amount {} outside allowed range", amount),
                Some(serde_json::json!({
                    "amount": amount.to_string(),
                    "min": min.to_string(),
                    "max": max.to_string(),
                })),
            ),
            AppError::Pledge(PledgeError::ServerFull { max_people }) => (
                StatusCode::CONFLICT,
                "SERVER_FULL",
                "Server is at pledge capacity".to_string(),
                Some(serde_json::json!({ "max_people": max_people })),
            ),
            AppError::Pledge(PledgeError::DuplicatePledge) => (
                StatusCode::CONFLICT,
                "DUPLICATE_PLEDGE",
                "User already has an active pledge on this server".to_string(),
                None,
            ),
            AppError::Pledge(PledgeError::ServerInactive) => (
                StatusCode::BAD_REQUEST,
                "SERVER_INACTIVE",
                "Server is not accepting pledges".to_string(),
                None,
            ),
            AppError::Pledge(PledgeError::AccountNotChargeable(reason)) => (
                StatusCode::BAD_REQUEST,
                "ACCOUNT_NOT_CHARGEABLE",
                format!("Account is not chargeable: {}", reason),
                None,
            ),
            AppError::Pledge(PledgeError::InvalidState { current, expected }) => (
                StatusCode::CONFLICT,
                "PLEDGE_INVALID_STATE",
                format!("Pledge in state {}, expected {}", current, expected),
                None,
            ),
            AppError::Settlement(SettlementError::DuplicateRun {
                server_id,
                scheduled_date,
            }) => (
                StatusCode::CONFLICT,
                "RUN_ALREADY_RECORDED",
                format!(
                    "Withdrawal already recorded for server {} on {}",
                    server_id, scheduled_date
                ),
                Some(serde_json::json!({
                    "server_id": server_id,
                    "scheduled_date": scheduled_date,
                })),
            ),
            AppError::Settlement(SettlementError::RunInProgress { server_id }) => (
                StatusCode::CONFLICT,
                "RUN_IN_PROGRESS",
                format!("Server {} is already being settled", server_id),
                None,
            ),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Not found: {}", what),
                None,
            ),
            AppError::InvalidInput(msg) | AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg, None)
            }
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
                None,
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("Error converting: {:?}", error))
    }
}

impl From<rust_decimal::Error> for AppError {
    fn from(error: rust_decimal::Error) -> Self {
        AppError::InvalidInput(format!("Decimal conversion error: {:?}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::ExternalError(format!("HTTP request error: {:?}", error))
    }
}

impl From<MigrateError> for AppError {
    fn from(error: MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
