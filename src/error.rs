//! Error types for the relying party server

use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Result type alias for the relying party server
pub type Result<T> = std::result::Result<T, Error>;

/// Relying party server errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Non-2xx response from a backend service, carrying the backend's
    /// original status code and raw body text
    #[error("Upstream error {status}: {body}")]
    Upstream {
        /// HTTP status returned by the backend
        status: u16,
        /// Raw response body text
        body: String,
    },

    /// A 2xx backend response whose body did not match the expected shape
    #[error("Format error: {0}")]
    Format(String),

    /// Verification succeeded but neither a token nor a usable session
    /// artifact could be extracted from the backend response
    #[error(
        "The response from {platform} did not contain an OIDC token or an authenticated session cookie(s). Please check your {platform} environment configuration."
    )]
    ConfigurationMismatch {
        /// The configured platform name
        platform: String,
    },

    /// The selected backend variant does not support this operation
    #[error("Method not implemented: {0}")]
    NotImplemented(String),

    /// A required header or bearer token was absent
    #[error("Missing precondition: {reason}")]
    MissingPrecondition {
        /// What was missing
        reason: String,
        /// Whether the missing artifact is an authorization credential
        /// (maps to 401 instead of 400)
        want_auth: bool,
    },

    /// Request body failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Shorthand for a bearer-token precondition failure (401)
    pub fn missing_bearer() -> Self {
        Self::MissingPrecondition {
            reason: "bearer authorization header required".to_string(),
            want_auth: true,
        }
    }

    /// Shorthand for a required request header that was absent (400)
    pub fn missing_header(name: &str) -> Self {
        Self::MissingPrecondition {
            reason: format!("required header '{name}' not present"),
            want_auth: false,
        }
    }

    /// HTTP status this error maps to at the route layer
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::MissingPrecondition { want_auth, .. } => {
                if *want_auth {
                    StatusCode::UNAUTHORIZED
                } else {
                    StatusCode::BAD_REQUEST
                }
            }
            Self::Format(_)
            | Self::ConfigurationMismatch { .. }
            | Self::NotImplemented(_)
            | Self::Validation(_)
            | Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) | Self::Io(_) | Self::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Upstream failures propagate the backend's own body text so callers
        // see the original reason, not a paraphrase.
        let body = match self {
            Self::Upstream { body, .. } => body,
            other => other.to_string(),
        };

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_maps_to_backend_status() {
        let err = Error::Upstream {
            status: 403,
            body: "denied".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn missing_bearer_maps_to_401() {
        assert_eq!(
            Error::missing_bearer().status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn missing_header_maps_to_400() {
        assert_eq!(
            Error::missing_header("username").status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn format_and_mismatch_map_to_400() {
        assert_eq!(
            Error::Format("bad shape".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        let err = Error::ConfigurationMismatch {
            platform: "isva".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("isva"));
    }
}
