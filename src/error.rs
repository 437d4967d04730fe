// =============================================================================
// Application error taxonomy — one enum, stable codes, consistent JSON shape
// =============================================================================
//
// Every HTTP error response has the shape:
//
//   { "error": { "code": "ORDER_ERROR", "message": "...", "detail": {...} } }
//
// The `detail` object is optional and carries structured context (the offending
// parameter, the broker response code, etc.). Codes are stable and part of the
// API contract.
// =============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Business error raised anywhere in the engine.
#[derive(Debug, Error)]
pub enum AppError {
    /// Rejected before any I/O (bad symbol, quantity, exchange tag, price).
    #[error("{message}")]
    Validation { message: String, detail: Option<Value> },

    /// Broker token failure (401 or explicit token rejection).
    #[error("{message}")]
    Auth { message: String, detail: Option<Value> },

    /// Broker API failure: non-zero response code, HTTP 5xx, network error.
    #[error("{message}")]
    Broker { message: String, detail: Option<Value> },

    /// The broker rejected the order itself (funds, halted symbol, limits).
    #[error("{message}")]
    Order { message: String, detail: Option<Value> },

    /// A market-data or news source failed.
    #[error("{message}")]
    DataCollection { message: String, detail: Option<Value> },

    /// Strategy-level stop, e.g. the daily-loss breaker tripped.
    #[error("{message}")]
    Strategy { message: String, detail: Option<Value> },
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), detail: None }
    }

    pub fn validation_with(message: impl Into<String>, detail: Value) -> Self {
        Self::Validation { message: message.into(), detail: Some(detail) }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth { message: message.into(), detail: None }
    }

    pub fn auth_with(message: impl Into<String>, detail: Value) -> Self {
        Self::Auth { message: message.into(), detail: Some(detail) }
    }

    pub fn broker(message: impl Into<String>) -> Self {
        Self::Broker { message: message.into(), detail: None }
    }

    pub fn broker_with(message: impl Into<String>, detail: Value) -> Self {
        Self::Broker { message: message.into(), detail: Some(detail) }
    }

    pub fn order(message: impl Into<String>) -> Self {
        Self::Order { message: message.into(), detail: None }
    }

    pub fn order_with(message: impl Into<String>, detail: Value) -> Self {
        Self::Order { message: message.into(), detail: Some(detail) }
    }

    pub fn data_collection(message: impl Into<String>) -> Self {
        Self::DataCollection { message: message.into(), detail: None }
    }

    pub fn strategy(message: impl Into<String>) -> Self {
        Self::Strategy { message: message.into(), detail: None }
    }

    pub fn strategy_with(message: impl Into<String>, detail: Value) -> Self {
        Self::Strategy { message: message.into(), detail: Some(detail) }
    }

    /// Stable machine-readable code for the API contract.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Auth { .. } => "BROKER_AUTH_ERROR",
            Self::Broker { .. } => "BROKER_ERROR",
            Self::Order { .. } => "ORDER_ERROR",
            Self::DataCollection { .. } => "DATA_COLLECTION_ERROR",
            Self::Strategy { .. } => "STRATEGY_ERROR",
        }
    }

    /// HTTP status for the API layer.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Auth { .. } => StatusCode::UNAUTHORIZED,
            Self::Broker { .. } => StatusCode::BAD_GATEWAY,
            Self::Order { .. } => StatusCode::BAD_REQUEST,
            Self::DataCollection { .. } => StatusCode::BAD_GATEWAY,
            Self::Strategy { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> Option<&Value> {
        match self {
            Self::Validation { detail, .. }
            | Self::Auth { detail, .. }
            | Self::Broker { detail, .. }
            | Self::Order { detail, .. }
            | Self::DataCollection { detail, .. }
            | Self::Strategy { detail, .. } => detail.as_ref(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut error = serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let Some(detail) = self.detail() {
            error["detail"] = detail.clone();
        }
        let body = serde_json::json!({ "error": error });
        (self.status_code(), Json(body)).into_response()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(AppError::validation("x").code(), "VALIDATION_ERROR");
        assert_eq!(AppError::auth("x").code(), "BROKER_AUTH_ERROR");
        assert_eq!(AppError::broker("x").code(), "BROKER_ERROR");
        assert_eq!(AppError::order("x").code(), "ORDER_ERROR");
        assert_eq!(AppError::data_collection("x").code(), "DATA_COLLECTION_ERROR");
        assert_eq!(AppError::strategy("x").code(), "STRATEGY_ERROR");
    }

    #[test]
    fn status_codes_match_contract() {
        assert_eq!(AppError::validation("x").status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(AppError::auth("x").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::broker("x").status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(AppError::order("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::strategy("x").status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn detail_is_preserved() {
        let err = AppError::validation_with("bad code", serde_json::json!({"code": "XYZ"}));
        assert_eq!(err.detail().unwrap()["code"], "XYZ");
        assert_eq!(err.to_string(), "bad code");
    }
}
