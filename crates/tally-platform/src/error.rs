use tally_core::LedgerError;
use tally_finance::InvoiceError;
use tally_inventory::StockError;
use thiserror::Error;

use crate::token::TokenError;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Invalid(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Stock(#[from] StockError),
    #[error(transparent)]
    Invoice(#[from] InvoiceError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    has_code(err, UNIQUE_VIOLATION)
}

pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    has_code(err, FOREIGN_KEY_VIOLATION)
}

fn has_code(err: &sqlx::Error, code: &str) -> bool {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .is_some_and(|found| found == code)
}

/// Maps a unique violation to a conflict with `message`; anything else stays a
/// database error.
pub(crate) fn unique_or(err: sqlx::Error, message: impl Into<String>) -> ServiceError {
    if is_unique_violation(&err) {
        ServiceError::Conflict(message.into())
    } else {
        ServiceError::Database(err)
    }
}

/// Maps a foreign-key violation to a conflict with `message`.
pub(crate) fn in_use_or(err: sqlx::Error, message: impl Into<String>) -> ServiceError {
    if is_foreign_key_violation(&err) {
        ServiceError::Conflict(message.into())
    } else {
        ServiceError::Database(err)
    }
}
