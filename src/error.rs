use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    status: u16,
}

/// Errors from token issuance, verification and request authentication.
///
/// The variants are deliberately fine-grained so callers can tell *why* a
/// token was rejected.  The HTTP response built from any of them is not:
/// see the [`IntoResponse`] impl.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Token lifetime must be at least one second")]
    InvalidTtl,

    #[error("No signing key registered under kid {0:?}")]
    UnknownKey(String),

    #[error("No default signing key configured")]
    NoDefaultSigner,

    #[error("Could not encode token: {0}")]
    EncodingError(String),

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Token signature is invalid")]
    SignatureInvalid,

    #[error("Token algorithm {found:?} does not match signer algorithm {expected:?}")]
    AlgorithmMismatch { expected: String, found: String },

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid issuer")]
    InvalidIssuer,

    #[error("Missing authorization header")]
    MissingHeader,

    #[error("Invalid authorization header format")]
    InvalidHeaderFormat,

    #[error("Invalid bearer token format")]
    InvalidBearerFormat,

    #[error("Authenticated subject not found")]
    SubjectNotFound,

    #[error("Auth not configured: {0}")]
    ConfigError(String),
}

impl AuthError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedToken(reason.into())
    }

    /// `true` for failures caused by the presented credential rather than
    /// by server-side configuration.
    pub fn is_unauthorized(&self) -> bool {
        !matches!(
            self,
            AuthError::ConfigError(_) | AuthError::NoDefaultSigner | AuthError::InvalidTtl
        )
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error) = if self.is_unauthorized() {
            tracing::debug!(target: "jwt_auth.http", reason = %self, "Request rejected");
            (StatusCode::UNAUTHORIZED, "unauthorized")
        } else {
            tracing::error!(target: "jwt_auth.http", error = %self, "Authentication misconfigured");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        };

        let body = ErrorBody {
            error,
            status: status.as_u16(),
        };

        (status, axum::Json(body)).into_response()
    }
}
