use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::responses::RequestMeta;

pub const E_UNAUTHENTICATED: &str = "UNAUTHENTICATED";
pub const E_MISSING_EMAIL: &str = "MISSING_EMAIL";
pub const E_NOT_ADMIN: &str = "NOT_ADMIN";
pub const E_UNKNOWN_PACKAGE: &str = "UNKNOWN_PACKAGE";
pub const E_SESSION_NOT_FOUND: &str = "SESSION_NOT_FOUND";
pub const E_STORE_FAILURE: &str = "STORE_FAILURE";

/// Contract violations at the edges of the ledger arithmetic.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("referral code must be 2-64 characters of [A-Za-z0-9_-]")]
    InvalidReferralCode,
    #[error("commission rate must be between 0 and {max} basis points, got {0}", max = u32::MAX)]
    InvalidCommissionRate(i64),
    #[error("payment amount must be non-negative, got {0}")]
    NegativeAmount(i64),
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Internal(anyhow::Error),
}

#[derive(Debug)]
pub struct ApiErrorWithMeta {
    error: ApiError,
    meta: RequestMeta,
    code: Option<String>,
}

impl ApiError {
    pub fn with_meta(self, meta: RequestMeta) -> ApiErrorWithMeta {
        ApiErrorWithMeta {
            error: self,
            meta,
            code: None,
        }
    }
}

impl ApiErrorWithMeta {
    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }
}

impl IntoResponse for ApiErrorWithMeta {
    fn into_response(self) -> Response {
        let (status, error_message) = match self.error {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(e) => {
                error!(request_id = %self.meta.request_id, "internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let mut body = json!({
            "request_id": self.meta.request_id,
            "error": error_message,
        });
        if let Some(code) = self.code {
            body["code"] = json!(code);
        }

        (status, Json(body)).into_response()
    }
}
