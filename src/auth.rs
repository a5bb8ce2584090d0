//! Identity handed to us by the upstream auth layer.
//!
//! Authentication itself happens before requests reach this service; the
//! proxy forwards the verified subject, email and display name as headers.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};

use crate::error::{ApiError, ApiErrorWithMeta, E_MISSING_EMAIL, E_UNAUTHENTICATED};
use crate::responses::{RequestMeta, new_meta};

pub const SUBJECT_HEADER: &str = "x-auth-subject";
pub const EMAIL_HEADER: &str = "x-auth-email";
pub const NAME_HEADER: &str = "x-auth-name";

/// The signed-in user. Rejects with 401 when no subject is present.
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn request_meta(parts: &Parts) -> RequestMeta {
    parts
        .extensions
        .get::<RequestMeta>()
        .cloned()
        .unwrap_or_else(new_meta)
}

impl CurrentUser {
    /// The user's email, or a 400 for identities that carry none.
    pub fn require_email(&self, meta: &RequestMeta) -> Result<&str, ApiErrorWithMeta> {
        self.email.as_deref().ok_or_else(|| {
            ApiError::BadRequest("user email is required".into())
                .with_meta(meta.clone())
                .with_code(E_MISSING_EMAIL)
        })
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiErrorWithMeta;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(subject) = header_str(&parts.headers, SUBJECT_HEADER) else {
            return Err(ApiError::Unauthorized("unauthorized".into())
                .with_meta(request_meta(parts))
                .with_code(E_UNAUTHENTICATED));
        };
        Ok(Self {
            subject,
            email: header_str(&parts.headers, EMAIL_HEADER),
            name: header_str(&parts.headers, NAME_HEADER),
        })
    }
}
