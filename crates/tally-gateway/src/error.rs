use axum::{
    Json,
    extract::{FromRequest, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tally_core::LedgerError;
use tally_platform::ServiceError;
use tracing::{error, warn};

/// Response body shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;
pub type Created<T> = Result<(StatusCode, Json<Envelope<T>>), ApiError>;

pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope {
        success: true,
        data: Some(data),
        message: None,
    }))
}

pub fn created<T: Serialize>(data: T) -> Created<T> {
    Ok((
        StatusCode::CREATED,
        Json(Envelope {
            success: true,
            data: Some(data),
            message: None,
        }),
    ))
}

pub fn done(message: impl Into<String>) -> ApiResult<()> {
    Ok(Json(Envelope {
        success: true,
        data: None,
        message: Some(message.into()),
    }))
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(entity: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{entity} not found"))
    }

    fn internal<E: std::fmt::Display>(err: E) -> Self {
        error!(error = %err, "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Envelope::<()> {
            success: false,
            data: None,
            message: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidField { .. }
            | LedgerError::EmptyEntry
            | LedgerError::NegativeAmount { .. }
            | LedgerError::ExcessPrecision { .. }
            | LedgerError::AmountOutOfRange { .. }
            | LedgerError::Unbalanced { .. }
            | LedgerError::AccountNotFound(_) => Self::bad_request(err.to_string()),
            LedgerError::EntryNotFound(_) => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            LedgerError::AlreadyPosted(_)
            | LedgerError::DuplicateEntryNumber(_)
            | LedgerError::DuplicateAccountCode(_)
            | LedgerError::AccountInUse(_) => Self::new(StatusCode::CONFLICT, err.to_string()),
            LedgerError::Storage(err) => Self::internal(format!("{err:#}")),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Invalid(message) => Self::bad_request(message),
            ServiceError::NotFound(entity) => Self::not_found(entity),
            ServiceError::Conflict(message) => Self::new(StatusCode::CONFLICT, message),
            ServiceError::Unauthorized(message) => {
                warn!(reason = %message, "request rejected");
                Self::unauthorized(message)
            }
            ServiceError::Ledger(err) => err.into(),
            ServiceError::Stock(err) => Self::bad_request(err.to_string()),
            ServiceError::Invoice(err) => Self::bad_request(err.to_string()),
            ServiceError::Token(err) => {
                warn!(reason = %err, "token rejected");
                Self::unauthorized(err.to_string())
            }
            ServiceError::Database(err) => Self::internal(err),
            ServiceError::Internal(err) => Self::internal(format!("{err:#}")),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

/// `Json` whose rejections render as the error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use tally_finance::InvoiceError;
    use tally_inventory::StockError;

    use super::*;

    #[test]
    fn unstorable_amounts_are_client_errors() {
        for err in [
            LedgerError::ExcessPrecision { line: 1 },
            LedgerError::AmountOutOfRange { line: 2 },
            LedgerError::Unbalanced {
                debit: Decimal::ONE,
                credit: Decimal::ZERO,
            },
        ] {
            assert_eq!(ApiError::from(err).status, StatusCode::BAD_REQUEST);
        }
        assert_eq!(
            ApiError::from(ServiceError::Invoice(InvoiceError::AmountOutOfRange)).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ServiceError::Stock(StockError::ExcessPrecision)).status,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn storage_failures_hide_their_cause() {
        let err = ApiError::from(LedgerError::Storage(anyhow::anyhow!("numeric field overflow")));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "internal server error");
    }
}
