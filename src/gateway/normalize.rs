//! Sign-in response normalizer
//!
//! The two platforms signal a verified assertion in structurally different
//! ways: ISV returns a JWT assertion to exchange through the jwt-bearer
//! grant, while ISVA's mediator can embed an access token in the result
//! attributes, establish a cookie session, or leave identity propagation to
//! EAI headers. This module folds all of them into one client-facing
//! response by priority: token body, then cookies, then EAI headers.

use async_trait::async_trait;
use axum::Json;
use axum::http::{
    HeaderMap, HeaderName, HeaderValue, StatusCode,
    header::{CONTENT_LENGTH, TRANSFER_ENCODING},
};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tracing::{debug, info};

use crate::backend::BackendResponse;
use crate::config::{AuthSession, Platform};
use crate::oauth::{Token, TokenClient};
use crate::{Error, Result};

/// EAI header naming the authenticated user
const EAI_USER_ID: &str = "am-eai-user-id";

/// EAI header listing the extended attribute names
const EAI_XATTRS: &str = "am-eai-xattrs";

/// Exchanges a backend-issued assertion for an OAuth token
#[async_trait]
pub trait AssertionExchanger: Send + Sync {
    /// Perform the jwt-bearer grant for the given assertion
    async fn jwt_bearer(&self, assertion: &str) -> Result<Token>;
}

#[async_trait]
impl AssertionExchanger for TokenClient {
    async fn jwt_bearer(&self, assertion: &str) -> Result<Token> {
        TokenClient::jwt_bearer(self, assertion).await
    }
}

/// Produce the client-facing sign-in response from a verification result
pub async fn signin_response(
    platform: Platform,
    auth_session: AuthSession,
    exchanger: &dyn AssertionExchanger,
    backend: BackendResponse,
) -> Result<Response> {
    // 1. A token extractable from the body wins.
    if let Some(token) = extract_token(platform, exchanger, &backend).await? {
        return Ok((StatusCode::OK, Json(token)).into_response());
    }

    // 2. A cookie-based session is passed through verbatim.
    if backend.has_cookies() {
        debug!("Backend established a cookie session");
        return Ok(cookie_response(backend));
    }

    // 3. EAI header propagation, when the operator asked for it.
    if auth_session == AuthSession::Eai {
        return eai_response(&backend);
    }

    Err(Error::ConfigurationMismatch {
        platform: platform.to_string(),
    })
}

/// Try to derive an OAuth token from the verification body
///
/// Shape mismatches fall through to the next stage of the chain rather than
/// failing: an ISVA deployment without the token mapping rule, or an ISV
/// response without `returnJwt`, simply doesn't produce a token.
async fn extract_token(
    platform: Platform,
    exchanger: &dyn AssertionExchanger,
    backend: &BackendResponse,
) -> Result<Option<Token>> {
    let Ok(body) = backend.json() else {
        return Ok(None);
    };

    match platform {
        // The ISVA mapping rule places a ready-made access token in the
        // result attributes.
        Platform::Isva => {
            let access_token = body
                .get("attributes")
                .and_then(|v| v.get("responseData"))
                .and_then(|v| v.get("access_token"))
                .and_then(Value::as_str);

            match access_token {
                Some(access_token) => Ok(Some(Token::from_access_token(access_token))),
                None => {
                    info!(
                        "No access token in the assertion result; check the FIDO2 mediator JavaScript"
                    );
                    Ok(None)
                }
            }
        }

        // ISV returns a JWT assertion which still needs to be exchanged.
        Platform::Isv => match body.get("assertion").and_then(Value::as_str) {
            Some(assertion) => Ok(Some(exchanger.jwt_bearer(assertion).await?)),
            None => {
                debug!("No assertion in the verification result");
                Ok(None)
            }
        },
    }
}

/// Pass the backend's session response through, headers and body intact
fn cookie_response(backend: BackendResponse) -> Response {
    let mut response = match backend.body {
        Some(body) => (StatusCode::OK, body).into_response(),
        None => StatusCode::OK.into_response(),
    };

    for name in backend.headers.keys() {
        // Body framing is re-done by the server.
        if *name == CONTENT_LENGTH || *name == TRANSFER_ENCODING {
            continue;
        }
        for value in backend.headers.get_all(name) {
            response.headers_mut().append(name.clone(), value.clone());
        }
    }

    response
}

/// Synthesize EAI identity headers from the verification body
fn eai_response(backend: &BackendResponse) -> Result<Response> {
    let body = backend.json()?;

    let username = body
        .get("user")
        .and_then(|v| v.get("name"))
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Format("no user.name in the assertion result".to_string()))?;
    let credential_data = body
        .get("attributes")
        .and_then(|v| v.get("credentialData"))
        .and_then(Value::as_object)
        .ok_or_else(|| {
            Error::Format("no attributes.credentialData in the assertion result".to_string())
        })?;

    let mut headers = HeaderMap::new();
    headers.insert(EAI_USER_ID, header_value(username)?);
    headers.insert(
        EAI_XATTRS,
        header_value(&credential_data.keys().cloned().collect::<Vec<_>>().join(","))?,
    );

    for (name, value) in credential_data {
        // The authenticated identity comes from user.name; a credentialData
        // entry of the same name must not override it.
        if name.eq_ignore_ascii_case(EAI_USER_ID) {
            continue;
        }
        let header_name: HeaderName = name
            .parse()
            .map_err(|_| Error::Format(format!("credentialData key '{name}' is not a header name")))?;

        match value {
            Value::String(value) => {
                headers.append(header_name, header_value(value)?);
            }
            Value::Array(values) => {
                for value in values.iter().filter_map(Value::as_str) {
                    headers.append(header_name.clone(), header_value(value)?);
                }
            }
            _ => {}
        }
    }

    debug!(headers = ?headers, "Synthesized EAI headers");

    let mut response = StatusCode::NO_CONTENT.into_response();
    response.headers_mut().extend(headers);
    Ok(response)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::Format(format!("'{value}' is not a valid header value")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::SET_COOKIE;
    use bytes::Bytes;
    use std::sync::Mutex;

    struct RecordingExchanger {
        assertions: Mutex<Vec<String>>,
    }

    impl RecordingExchanger {
        fn new() -> Self {
            Self {
                assertions: Mutex::new(Vec::new()),
            }
        }

        fn recorded(&self) -> Vec<String> {
            self.assertions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AssertionExchanger for RecordingExchanger {
        async fn jwt_bearer(&self, assertion: &str) -> Result<Token> {
            self.assertions.lock().unwrap().push(assertion.to_string());
            Ok(Token::from_access_token("exchanged"))
        }
    }

    fn backend_with_body(body: &str) -> BackendResponse {
        BackendResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Some(Bytes::copy_from_slice(body.as_bytes())),
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn isv_assertion_is_exchanged_for_a_token() {
        let exchanger = RecordingExchanger::new();
        let backend = backend_with_body(r#"{"assertion":"abc"}"#);

        let response = signin_response(Platform::Isv, AuthSession::Token, &exchanger, backend)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(exchanger.recorded(), vec!["abc".to_string()]);

        let body = body_json(response).await;
        assert_eq!(body["access_token"], "exchanged");
    }

    #[tokio::test]
    async fn isva_access_token_is_returned_without_exchange() {
        let exchanger = RecordingExchanger::new();
        let backend =
            backend_with_body(r#"{"attributes":{"responseData":{"access_token":"tok1"}}}"#);

        let response = signin_response(Platform::Isva, AuthSession::Token, &exchanger, backend)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(exchanger.recorded().is_empty());

        let body = body_json(response).await;
        assert_eq!(body["access_token"], "tok1");
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["expires_in"], 3600);
    }

    #[tokio::test]
    async fn cookie_session_is_passed_through() {
        let exchanger = RecordingExchanger::new();
        let mut backend = backend_with_body("{}");
        backend
            .headers
            .append(SET_COOKIE, "PD-S-SESSION-ID=1_2_abc; Path=/".parse().unwrap());

        let response = signin_response(Platform::Isva, AuthSession::Cookies, &exchanger, backend)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(SET_COOKIE).unwrap(),
            "PD-S-SESSION-ID=1_2_abc; Path=/"
        );
    }

    #[tokio::test]
    async fn eai_mode_synthesizes_identity_headers() {
        let exchanger = RecordingExchanger::new();
        let backend = backend_with_body(
            r#"{"user":{"name":"alice"},"attributes":{"credentialData":{"am-eai-user-id":["ignored"],"k1":"v1"}}}"#,
        );

        let response = signin_response(Platform::Isva, AuthSession::Eai, &exchanger, backend)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let headers = response.headers();
        assert_eq!(headers.get(EAI_USER_ID).unwrap(), "alice");
        assert_eq!(headers.get("k1").unwrap(), "v1");

        let xattrs = headers.get(EAI_XATTRS).unwrap().to_str().unwrap();
        let mut keys: Vec<&str> = xattrs.split(',').collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["am-eai-user-id", "k1"]);

        // user.name wins over the credentialData entry of the same name.
        let user_ids: Vec<_> = headers.get_all(EAI_USER_ID).iter().collect();
        assert_eq!(user_ids.len(), 1);
    }

    #[tokio::test]
    async fn no_token_no_cookies_no_eai_is_a_configuration_mismatch() {
        let exchanger = RecordingExchanger::new();
        let backend = backend_with_body("{}");

        let err = signin_response(Platform::Isva, AuthSession::Token, &exchanger, backend)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ConfigurationMismatch { .. }));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn isva_multi_valued_credential_data_becomes_repeated_headers() {
        let exchanger = RecordingExchanger::new();
        let backend = backend_with_body(
            r#"{"user":{"name":"alice"},"attributes":{"credentialData":{"groups":["admin","audit"]}}}"#,
        );

        let response = signin_response(Platform::Isva, AuthSession::Eai, &exchanger, backend)
            .await
            .unwrap();

        let groups: Vec<_> = response
            .headers()
            .get_all("groups")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(groups, vec!["admin", "audit"]);
    }
}
