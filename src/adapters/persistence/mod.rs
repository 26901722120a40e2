use sqlx::PgPool;

use crate::app_error::AppError;

pub mod balance;
pub mod cart;
pub mod payment_intent;
pub mod subscription;

/// Postgres implementation of every repository trait.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    pub fn new(pool: PgPool) -> Self {
        PostgresPersistence { pool }
    }
}

const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const NOT_NULL_VIOLATION: &str = "23502";

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = err {
            return AppError::NotFound;
        }

        let code = err
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .map(|code| code.into_owned());

        match code.as_deref() {
            // Another writer inserted the same key first
            Some(UNIQUE_VIOLATION) => {
                tracing::debug!(error = %err, "Unique constraint raced");
                AppError::ConcurrencyConflict
            }
            // balances_amount_non_negative is the only check a valid request can hit
            Some(CHECK_VIOLATION) => {
                tracing::warn!(error = %err, "Check constraint rejected write");
                AppError::InsufficientFunds
            }
            Some(FOREIGN_KEY_VIOLATION) | Some(NOT_NULL_VIOLATION) => {
                tracing::warn!(error = %err, "Integrity constraint rejected write");
                AppError::InvalidInput("payment record is incomplete".into())
            }
            _ => {
                // Log the actual error, but don't expose details
                tracing::error!(error = ?err, "Database error");
                AppError::Database("Database operation failed".into())
            }
        }
    }
}
