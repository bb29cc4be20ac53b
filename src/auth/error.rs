//! Authentication Errors
//! Mission: One error vocabulary for every auth outcome, mapped to HTTP once

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Errors produced by the credential, token and revocation layers.
///
/// Auth-domain variants are resolved at the gateway into
/// authenticated / anonymous / rejected outcomes. `Infrastructure` is always
/// surfaced as a server fault.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown account or wrong password. Both causes share one message.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Email or username already taken.
    #[error("duplicate account")]
    DuplicateAccount,

    /// Missing, malformed, expired, badly signed or revoked token.
    #[error("unauthenticated: {0}")]
    Unauthenticated(&'static str),

    /// A request field failed validation.
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: &'static str,
    },

    /// Store unreachable, worker task died, corrupt stored record.
    #[error("infrastructure failure: {0:#}")]
    Infrastructure(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials | AuthError::Unauthenticated(_) => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::DuplicateAccount => StatusCode::BAD_REQUEST,
            AuthError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AuthError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_infrastructure(&self) -> bool {
        matches!(self, AuthError::Infrastructure(_))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Every rejection cause renders the same body.
            AuthError::InvalidCredentials | AuthError::Unauthenticated(_) => {
                "Unauthorized".to_string()
            }
            AuthError::DuplicateAccount => "Either username or email is already used".to_string(),
            AuthError::Validation { field, message } => format!("{field} {message}"),
            AuthError::Infrastructure(e) => {
                error!(error = %format!("{e:#}"), "💥 Auth infrastructure failure");
                "Internal server error".to_string()
            }
        };

        (status, Json(json!({ "errors": { "body": [message] } }))).into_response()
    }
}
