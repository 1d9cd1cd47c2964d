//! OAuth token client
//!
//! Performs client-credentials, resource-owner-password and jwt-bearer
//! exchanges against the platform's token endpoint and decodes the standard
//! OAuth token envelope.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::{Error, Result};

/// An access token issued by the authorization server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// The access token issued by the authorization server
    pub access_token: String,

    /// Token type, `Bearer` unless the backend says otherwise
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Lifetime of the access token in seconds
    #[serde(default = "default_expiry")]
    pub expires_in: u64,

    /// OIDC identity token, when the grant produced one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

fn default_expiry() -> u64 {
    3600
}

impl Token {
    /// Wrap a bare access token with the default type and lifetime
    #[must_use]
    pub fn from_access_token(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            expires_in: default_expiry(),
            id_token: None,
        }
    }

    /// The HTTP authorization header value, e.g. `Bearer a1b2c3d4`
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

/// OAuth client bound to one token endpoint and one client id/secret pair
pub struct TokenClient {
    http: Client,
    endpoint: Url,
    client_id: String,
    client_secret: String,
}

impl TokenClient {
    /// Create a token client for the given endpoint and client credentials
    #[must_use]
    pub fn new(http: Client, endpoint: Url, client_id: String, client_secret: String) -> Self {
        Self {
            http,
            endpoint,
            client_id,
            client_secret,
        }
    }

    /// The token endpoint this client posts to
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The client secret, doubling as the JWT assertion signing secret
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Authorize API client credentials, returning an OIDC token
    pub async fn client_credentials(&self) -> Result<Token> {
        debug!(endpoint = %self.endpoint, "Requesting client_credentials grant");

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ];

        let response = self.http.post(self.endpoint.clone()).form(&params).send().await?;
        decode_token(response).await
    }

    /// Authorize with a resource owner password credential (ROPC) grant
    pub async fn password(&self, username: &str, password: &str) -> Result<Token> {
        debug!(endpoint = %self.endpoint, "Requesting password grant");

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "password"),
            ("username", username),
            ("password", password),
            ("scope", "openid"),
        ];

        let response = self.http.post(self.endpoint.clone()).form(&params).send().await?;
        decode_token(response).await
    }

    /// Exchange a JWT assertion through the jwt-bearer grant
    ///
    /// Client credentials go in the Basic authorization header rather than
    /// the form body for this grant.
    pub async fn jwt_bearer(&self, assertion: &str) -> Result<Token> {
        debug!(endpoint = %self.endpoint, "Requesting jwt-bearer grant");

        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("scope", "openid"),
            ("assertion", assertion),
        ];

        let response = self
            .http
            .post(self.endpoint.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&params)
            .send()
            .await?;
        decode_token(response).await
    }
}

/// Decode the OAuth token envelope, surfacing non-2xx as an upstream error
async fn decode_token(response: reqwest::Response) -> Result<Token> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if !status.is_success() {
        return Err(Error::Upstream {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| Error::Format(format!("unable to decode token response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn token_decodes_with_defaults() {
        let token: Token = serde_json::from_str(r#"{"access_token":"a1b2c3d4"}"#).unwrap();
        assert_eq!(token.access_token, "a1b2c3d4");
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.expires_in, 3600);
        assert_eq!(token.id_token, None);
    }

    #[test]
    fn token_decodes_full_envelope() {
        let token: Token = serde_json::from_str(
            r#"{"access_token":"abc","token_type":"bearer","expires_in":7200,"id_token":"xyz"}"#,
        )
        .unwrap();
        assert_eq!(token.token_type, "bearer");
        assert_eq!(token.expires_in, 7200);
        assert_eq!(token.id_token.as_deref(), Some("xyz"));
    }

    #[test]
    fn authorization_header_combines_type_and_token() {
        let token = Token::from_access_token("a1b2c3d4");
        assert_eq!(token.authorization_header(), "Bearer a1b2c3d4");
    }

    #[test]
    fn serialized_token_omits_absent_id_token() {
        let token = Token::from_access_token("tok1");
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "access_token": "tok1",
                "token_type": "Bearer",
                "expires_in": 3600
            })
        );
    }
}
