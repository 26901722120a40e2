use crate::app_error::{AppError, ErrorCode};
use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the error before it gets converted into a status response.
        match &self {
            AppError::SignatureInvalid(reason) => {
                tracing::warn!(security_review = true, reason = %reason, "Request failed")
            }
            AppError::InvalidInput(_)
            | AppError::InvalidCredentials
            | AppError::NotFound
            | AppError::UserNotFound
            | AppError::InvalidTransition { .. }
            | AppError::InsufficientFunds
            | AppError::PaymentRejected(_) => tracing::info!(error = ?self, "Request failed"),
            _ => tracing::error!(error = ?self, "Request failed"),
        }

        match self {
            AppError::Database(_) => {
                error_resp(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::DatabaseError, None)
            }
            AppError::InvalidCredentials => {
                error_resp(StatusCode::UNAUTHORIZED, ErrorCode::InvalidCredentials, None)
            }
            AppError::InvalidInput(msg) => {
                error_resp(StatusCode::BAD_REQUEST, ErrorCode::InvalidInput, Some(msg))
            }
            AppError::NotFound => error_resp(StatusCode::NOT_FOUND, ErrorCode::NotFound, None),
            AppError::UserNotFound => {
                error_resp(StatusCode::NOT_FOUND, ErrorCode::UserNotFound, None)
            }
            AppError::InvalidTransition { from, to } => error_resp(
                StatusCode::CONFLICT,
                ErrorCode::InvalidTransition,
                Some(format!("payment is {from} and cannot become {to}")),
            ),
            AppError::InsufficientFunds => {
                error_resp(StatusCode::PAYMENT_REQUIRED, ErrorCode::InsufficientFunds, None)
            }
            AppError::ConcurrencyConflict => error_resp(
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::ConcurrencyConflict,
                None,
            ),
            AppError::SignatureInvalid(_) => {
                error_resp(StatusCode::UNAUTHORIZED, ErrorCode::SignatureInvalid, None)
            }
            AppError::UnknownExternalId(_) => {
                error_resp(StatusCode::NOT_FOUND, ErrorCode::UnknownPayment, None)
            }
            AppError::AmountMismatch { .. } => error_resp(
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorCode::AmountMismatch,
                None,
            ),
            AppError::TransientGateway(_) => error_resp(
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::GatewayUnavailable,
                None,
            ),
            AppError::PaymentRejected(msg) => {
                error_resp(StatusCode::PAYMENT_REQUIRED, ErrorCode::PaymentRejected, Some(msg))
            }
            AppError::Internal(_) => {
                error_resp(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::InternalError, None)
            }
        }
    }
}

fn error_resp(status: StatusCode, code: ErrorCode, message: Option<String>) -> Response {
    let body = match message {
        Some(msg) => serde_json::json!({ "code": code.as_str(), "message": msg }),
        None => serde_json::json!({ "code": code.as_str() }),
    };
    (status, Json(body)).into_response()
}
