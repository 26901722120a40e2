use thiserror::Error;

use crate::domain::entities::payment_intent_status::PaymentIntentStatus;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found")]
    NotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: PaymentIntentStatus,
        to: PaymentIntentStatus,
    },

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Concurrent modification, retry")]
    ConcurrencyConflict,

    #[error("Gateway signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("Unknown external payment id: {0}")]
    UnknownExternalId(String),

    #[error(
        "Amount mismatch for payment {external_id}: expected {expected} {expected_currency}, got {reported} {reported_currency}"
    )]
    AmountMismatch {
        external_id: String,
        expected: i64,
        expected_currency: String,
        reported: i64,
        reported_currency: String,
    },

    #[error("Payment gateway temporarily unavailable: {0}")]
    TransientGateway(String),

    #[error("Payment rejected: {0}")]
    PaymentRejected(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Errors worth another attempt after a pause.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Database(_) | AppError::TransientGateway(_) | AppError::ConcurrencyConflict
        )
    }
}

#[derive(Clone, Copy, Debug)]
pub enum ErrorCode {
    DatabaseError,
    InvalidCredentials,
    InvalidInput,
    NotFound,
    UserNotFound,
    InvalidTransition,
    InsufficientFunds,
    ConcurrencyConflict,
    SignatureInvalid,
    UnknownPayment,
    AmountMismatch,
    GatewayUnavailable,
    PaymentRejected,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InvalidCredentials => "INVALID_CREDENTIALS",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::UserNotFound => "USER_NOT_FOUND",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
            ErrorCode::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ErrorCode::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            ErrorCode::SignatureInvalid => "SIGNATURE_INVALID",
            ErrorCode::UnknownPayment => "UNKNOWN_PAYMENT",
            ErrorCode::AmountMismatch => "AMOUNT_MISMATCH",
            ErrorCode::GatewayUnavailable => "GATEWAY_UNAVAILABLE",
            ErrorCode::PaymentRejected => "PAYMENT_REJECTED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
