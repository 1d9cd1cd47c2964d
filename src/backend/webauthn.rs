//! WebAuthn credential broker
//!
//! Issues challenge payloads and submits attestation/assertion results to
//! the platform's FIDO2 REST dialect. The broker never interprets the
//! WebAuthn binary fields; they stay base64url strings end to end and
//! cryptographic verification is the backend's job.

use async_trait::async_trait;
use axum::http::{
    HeaderMap, HeaderValue,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;
use url::Url;

use super::headers::merge_forwarded;
use super::response::BackendResponse;
use crate::oauth::Token;
use crate::{Error, Result};

/// The type of FIDO2 challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeType {
    /// Proof of provenance of a new authenticator (registration)
    Attestation,
    /// Proof of possession of a registered credential (sign-in)
    Assertion,
}

impl ChallengeType {
    /// The path segment used by both FIDO2 dialects
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Attestation => "attestation",
            Self::Assertion => "assertion",
        }
    }
}

/// Issues challenges to an authenticator and performs attestation and
/// assertion requests against the backend
#[async_trait]
pub trait WebAuthnService: Send + Sync {
    /// Initiate a FIDO2 ceremony, returning the backend's raw challenge
    /// payload unparsed
    async fn generate_challenge(
        &self,
        token: &Token,
        display_name: Option<&str>,
        challenge_type: ChallengeType,
        extra_headers: &HeaderMap,
    ) -> Result<String>;

    /// Register a new authenticator from an attestation result
    async fn create_credential(
        &self,
        token: &Token,
        nickname: &str,
        client_data_json: &str,
        attestation_object: &str,
        credential_id: &str,
        extra_headers: &HeaderMap,
    ) -> Result<()>;

    /// Present a signed challenge for verification, returning the full
    /// backend response for the sign-in normalizer
    #[allow(clippy::too_many_arguments)]
    async fn verify_credential(
        &self,
        token: &Token,
        client_data_json: &str,
        authenticator_data: &str,
        credential_id: &str,
        signature: &str,
        user_handle: &str,
        extra_headers: &HeaderMap,
    ) -> Result<BackendResponse>;
}

/// Fixed-shape attestation result document posted to `/attestation/result`
fn attestation_result_body(
    nickname: &str,
    client_data_json: &str,
    attestation_object: &str,
    credential_id: &str,
) -> Value {
    json!({
        "type": "public-key",
        "enabled": "true",
        "id": credential_id,
        "rawId": credential_id,
        "nickname": nickname,
        "response": {
            "clientDataJSON": client_data_json,
            "attestationObject": attestation_object
        }
    })
}

/// Fixed-shape assertion result document posted to `/assertion/result`
fn assertion_result_body(
    client_data_json: &str,
    authenticator_data: &str,
    credential_id: &str,
    signature: &str,
    user_handle: &str,
) -> Value {
    json!({
        "type": "public-key",
        "id": credential_id,
        "rawId": credential_id,
        "response": {
            "clientDataJSON": client_data_json,
            "authenticatorData": authenticator_data,
            "signature": signature,
            "userHandle": user_handle
        }
    })
}

/// POST a JSON body with bearer auth and forwarded caller headers
async fn post_json(
    http: &Client,
    url: &str,
    token: &Token,
    body: &Value,
    extra_headers: &HeaderMap,
) -> Result<reqwest::Response> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&token.authorization_header())
            .map_err(|e| Error::Format(format!("token is not a valid header value: {e}")))?,
    );
    merge_forwarded(&mut headers, extra_headers);

    debug!(url = %url, "Posting to FIDO2 endpoint");
    Ok(http.post(url).headers(headers).json(body).send().await?)
}

/// Surface a non-2xx response as an upstream error with its body text
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Upstream {
        status: status.as_u16(),
        body,
    })
}

/// WebAuthn broker for the IBM Security Verify (ISV) FIDO2 dialect
pub struct IsvWebAuthnService {
    http: Client,
    base: String,
}

impl IsvWebAuthnService {
    /// Create the service rooted at the ISV relying party endpoints
    #[must_use]
    pub fn new(http: Client, base_url: &Url, relying_party_id: &str) -> Self {
        let base = format!(
            "{}/v2.0/factors/fido2/relyingparties/{relying_party_id}",
            base_url.as_str().trim_end_matches('/')
        );
        Self { http, base }
    }
}

#[async_trait]
impl WebAuthnService for IsvWebAuthnService {
    async fn generate_challenge(
        &self,
        token: &Token,
        display_name: Option<&str>,
        challenge_type: ChallengeType,
        extra_headers: &HeaderMap,
    ) -> Result<String> {
        let mut body = Map::new();
        if let Some(display_name) = display_name {
            body.insert("displayName".to_string(), Value::from(display_name));
        }

        let url = format!("{}/{}/options", self.base, challenge_type.as_str());
        let response = post_json(&self.http, &url, token, &Value::Object(body), extra_headers).await?;
        let response = ensure_success(response).await?;

        Ok(response.text().await?)
    }

    async fn create_credential(
        &self,
        token: &Token,
        nickname: &str,
        client_data_json: &str,
        attestation_object: &str,
        credential_id: &str,
        extra_headers: &HeaderMap,
    ) -> Result<()> {
        let body =
            attestation_result_body(nickname, client_data_json, attestation_object, credential_id);
        let url = format!("{}/attestation/result", self.base);

        let response = post_json(&self.http, &url, token, &body, extra_headers).await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn verify_credential(
        &self,
        token: &Token,
        client_data_json: &str,
        authenticator_data: &str,
        credential_id: &str,
        signature: &str,
        user_handle: &str,
        extra_headers: &HeaderMap,
    ) -> Result<BackendResponse> {
        let body = assertion_result_body(
            client_data_json,
            authenticator_data,
            credential_id,
            signature,
            user_handle,
        );

        // ISV can return a JWT assertion alongside the verification result,
        // which the sign-in flow exchanges through the jwt-bearer grant.
        let url = format!("{}/assertion/result?returnJwt=true", self.base);

        let response = post_json(&self.http, &url, token, &body, extra_headers).await?;
        let response = ensure_success(response).await?;
        BackendResponse::from_http(response).await
    }
}

/// WebAuthn broker for the IBM Security Verify Access (ISVA) FIDO2 dialect
pub struct IsvaWebAuthnService {
    http: Client,
    base: String,
}

impl IsvaWebAuthnService {
    /// Create the service rooted at the ISVA FIDO2 junction
    #[must_use]
    pub fn new(http: Client, base_url: &Url, relying_party_id: &str) -> Self {
        let base = format!(
            "{}/mga/sps/fido2/{relying_party_id}",
            base_url.as_str().trim_end_matches('/')
        );
        Self { http, base }
    }

    /// Build the ISVA challenge request body
    ///
    /// ISVA resolves the ceremony's account through a `username` field: an
    /// empty string lets the assertion flow discover the user, while an
    /// attestation must name the account from the caller's `username`
    /// header.
    fn challenge_body(
        display_name: Option<&str>,
        challenge_type: ChallengeType,
        extra_headers: &HeaderMap,
    ) -> Result<Value> {
        let mut body = Map::new();
        if let Some(display_name) = display_name {
            body.insert("displayName".to_string(), Value::from(display_name));
        }

        let username = match challenge_type {
            ChallengeType::Assertion => String::new(),
            ChallengeType::Attestation => extra_headers
                .get("username")
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string)
                .ok_or_else(|| Error::missing_header("username"))?,
        };
        body.insert("username".to_string(), Value::from(username));

        Ok(Value::Object(body))
    }
}

#[async_trait]
impl WebAuthnService for IsvaWebAuthnService {
    async fn generate_challenge(
        &self,
        token: &Token,
        display_name: Option<&str>,
        challenge_type: ChallengeType,
        extra_headers: &HeaderMap,
    ) -> Result<String> {
        // Fails before any backend call when the username header is absent.
        let body = Self::challenge_body(display_name, challenge_type, extra_headers)?;

        let url = format!("{}/{}/options", self.base, challenge_type.as_str());
        let response = post_json(&self.http, &url, token, &body, extra_headers).await?;
        let response = ensure_success(response).await?;

        Ok(response.text().await?)
    }

    async fn create_credential(
        &self,
        token: &Token,
        nickname: &str,
        client_data_json: &str,
        attestation_object: &str,
        credential_id: &str,
        extra_headers: &HeaderMap,
    ) -> Result<()> {
        let body =
            attestation_result_body(nickname, client_data_json, attestation_object, credential_id);
        let url = format!("{}/attestation/result", self.base);

        let response = post_json(&self.http, &url, token, &body, extra_headers).await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn verify_credential(
        &self,
        token: &Token,
        client_data_json: &str,
        authenticator_data: &str,
        credential_id: &str,
        signature: &str,
        user_handle: &str,
        extra_headers: &HeaderMap,
    ) -> Result<BackendResponse> {
        let body = assertion_result_body(
            client_data_json,
            authenticator_data,
            credential_id,
            signature,
            user_handle,
        );
        let url = format!("{}/assertion/result", self.base);

        let response = post_json(&self.http, &url, token, &body, extra_headers).await?;
        let response = ensure_success(response).await?;
        BackendResponse::from_http(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn challenge_type_path_segments() {
        assert_eq!(ChallengeType::Attestation.as_str(), "attestation");
        assert_eq!(ChallengeType::Assertion.as_str(), "assertion");
    }

    #[test]
    fn attestation_result_shape() {
        let body = attestation_result_body("John's iPhone", "eyUyBg8Li8GH", "o2M884Yt0a3B7", "VGhpcyBpcyBh");
        assert_eq!(
            body,
            json!({
                "type": "public-key",
                "enabled": "true",
                "id": "VGhpcyBpcyBh",
                "rawId": "VGhpcyBpcyBh",
                "nickname": "John's iPhone",
                "response": {
                    "clientDataJSON": "eyUyBg8Li8GH",
                    "attestationObject": "o2M884Yt0a3B7"
                }
            })
        );
    }

    #[test]
    fn assertion_result_shape() {
        let body = assertion_result_body("cdj", "ad", "cred", "sig", "handle");
        assert_eq!(body["type"], "public-key");
        assert_eq!(body["id"], "cred");
        assert_eq!(body["rawId"], "cred");
        assert_eq!(body["response"]["signature"], "sig");
        assert_eq!(body["response"]["userHandle"], "handle");
    }

    #[test]
    fn isv_base_url_path() {
        let service = IsvWebAuthnService::new(
            Client::new(),
            &Url::parse("https://tenant.verify.ibm.com").unwrap(),
            "rp-1",
        );
        assert_eq!(
            service.base,
            "https://tenant.verify.ibm.com/v2.0/factors/fido2/relyingparties/rp-1"
        );
    }

    #[test]
    fn isva_base_url_path() {
        let service = IsvaWebAuthnService::new(
            Client::new(),
            &Url::parse("https://isva.example.com").unwrap(),
            "www.example.com",
        );
        assert_eq!(service.base, "https://isva.example.com/mga/sps/fido2/www.example.com");
    }

    #[test]
    fn isva_assertion_body_sends_empty_username() {
        let body = IsvaWebAuthnService::challenge_body(None, ChallengeType::Assertion, &HeaderMap::new())
            .unwrap();
        assert_eq!(body, json!({"username": ""}));
    }

    #[test]
    fn isva_attestation_body_takes_username_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert("username", "john@citizen.com".parse().unwrap());

        let body = IsvaWebAuthnService::challenge_body(
            Some("John's iPhone"),
            ChallengeType::Attestation,
            &headers,
        )
        .unwrap();
        assert_eq!(
            body,
            json!({"displayName": "John's iPhone", "username": "john@citizen.com"})
        );
    }

    #[test]
    fn isva_attestation_without_username_header_fails() {
        let err = IsvaWebAuthnService::challenge_body(
            Some("John's iPhone"),
            ChallengeType::Attestation,
            &HeaderMap::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::MissingPrecondition { want_auth: false, .. }
        ));
    }
}
