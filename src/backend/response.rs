//! Uniform backend call result
//!
//! The two platforms encode a successful assertion verification differently
//! (JSON body, session cookies or neither), so `verify_credential` hands the
//! whole response back for the sign-in normalizer to interpret.

use axum::http::{HeaderMap, StatusCode, header::SET_COOKIE};
use bytes::Bytes;
use serde_json::Value;

use crate::{Error, Result};

/// Status, headers and raw body of a backend response
#[derive(Debug, Clone)]
pub struct BackendResponse {
    /// HTTP status returned by the backend
    pub status: StatusCode,
    /// Response headers, including any session cookies
    pub headers: HeaderMap,
    /// Raw body bytes, `None` when the backend sent none
    pub body: Option<Bytes>,
}

impl BackendResponse {
    /// Capture a `reqwest` response wholesale
    pub async fn from_http(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(Self {
            status,
            headers,
            body: if body.is_empty() { None } else { Some(body) },
        })
    }

    /// Whether the backend established a cookie-based session
    #[must_use]
    pub fn has_cookies(&self) -> bool {
        self.headers.contains_key(SET_COOKIE)
    }

    /// Parse the body as JSON, failing with a format error when absent or
    /// not parseable
    pub fn json(&self) -> Result<Value> {
        let body = self
            .body
            .as_ref()
            .ok_or_else(|| Error::Format("backend response carried no body".to_string()))?;
        serde_json::from_slice(body)
            .map_err(|e| Error::Format(format!("backend response is not valid JSON: {e}")))
    }
}
