//! User service: OTP issuance/validation and account provisioning
//!
//! ISV implements the full flow against its email-OTP factor and SCIM user
//! APIs. ISVA intentionally does not: its OTP and provisioning options are
//! deployment-specific, so the stub fails explicitly rather than pretending
//! the capability exists.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use url::Url;

use crate::oauth::Token;
use crate::{Error, Result};

/// A pending one-time password verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OTPChallenge {
    /// Unique identifier of the verification transaction
    #[serde(rename = "id")]
    pub transaction_id: String,

    /// Prefix included in the one-time password email so the user can match
    /// the message to this attempt
    pub correlation: String,

    /// When the verification expires
    #[serde(with = "iso8601_millis")]
    pub expiry: DateTime<Utc>,
}

/// A user's sign-up details, cached for the lifetime of the OTP transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSignUp {
    /// The user's first and last name
    pub name: String,

    /// The user's email address
    pub email: String,
}

/// Serde support for the backend's millisecond ISO8601 timestamps
/// (`2021-04-26T12:30:15.123Z`)
pub mod iso8601_millis {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

    /// Serialize a timestamp in the backend's format
    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&dt.format(FORMAT).to_string())
    }

    /// Deserialize a timestamp from the backend's format
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let value = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&value, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(de::Error::custom)
    }
}

/// Issues and validates one-time passwords and provisions user accounts
#[async_trait]
pub trait UserService: Send + Sync {
    /// Start an email OTP verification for a sign-up
    async fn generate_otp(&self, token: &Token, email: &str) -> Result<OTPChallenge>;

    /// Validate the OTP and provision the account, returning the provider's
    /// user identifier
    async fn verify_user(
        &self,
        token: &Token,
        transaction_id: &str,
        otp: &str,
        user: &UserSignUp,
    ) -> Result<String>;

    /// Create the user account, returning the provider's user identifier
    async fn create_user(&self, token: &Token, email: &str, name: &str) -> Result<String>;
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

/// User service for IBM Security Verify (ISV)
pub struct IsvUserService {
    http: Client,
    base: String,
}

impl IsvUserService {
    /// Create the service rooted at the ISV v2.0 APIs
    #[must_use]
    pub fn new(http: Client, base_url: &Url) -> Self {
        let base = format!("{}/v2.0", base_url.as_str().trim_end_matches('/'));
        Self { http, base }
    }
}

#[async_trait]
impl UserService for IsvUserService {
    async fn generate_otp(&self, token: &Token, email: &str) -> Result<OTPChallenge> {
        let url = format!("{}/factors/emailotp/transient/verifications", self.base);

        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .bearer_auth(&token.access_token)
            .json(&json!({ "emailAddress": email }))
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let challenge: OTPChallenge = serde_json::from_str(&response.text().await?)
            .map_err(|e| Error::Format(format!("unable to decode OTP challenge: {e}")))?;

        info!(email = %email, "OTP generated successfully");
        Ok(challenge)
    }

    async fn verify_user(
        &self,
        token: &Token,
        transaction_id: &str,
        otp: &str,
        user: &UserSignUp,
    ) -> Result<String> {
        let url = format!(
            "{}/factors/emailotp/transient/verifications/{transaction_id}",
            self.base
        );

        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .bearer_auth(&token.access_token)
            .json(&json!({ "otp": otp }))
            .send()
            .await?;
        ensure_success(response).await?;

        info!(transaction_id = %transaction_id, "OTP validated successfully");

        // A validated OTP proves ownership of the email; provision the
        // account straight away.
        self.create_user(token, &user.email, &user.name).await
    }

    async fn create_user(&self, token: &Token, email: &str, name: &str) -> Result<String> {
        let url = format!("{}/Users", self.base);

        let body = json!({
            "userName": email,
            "name": {
                "givenName": name
            },
            "urn:ietf:params:scim:schemas:extension:ibm:2.0:Notification": {
                "notifyType": "EMAIL",
                "notifyPassword": false
            },
            "urn:ietf:params:scim:schemas:extension:ibm:2.0:User": {
                "realm": "cloudIdentityRealm",
                "userCategory": "regular",
                "twoFactorAuthentication": false
            },
            "active": true,
            "emails": [{
                "type": "work",
                "value": email
            }],
            "schemas": [
                "urn:ietf:params:scim:schemas:extension:ibm:2.0:Notification",
                "urn:ietf:params:scim:schemas:extension:ibm:2.0:User",
                "urn:ietf:params:scim:schemas:core:2.0:User"
            ]
        });

        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/scim+json")
            .header(ACCEPT, "application/scim+json")
            .bearer_auth(&token.access_token)
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let body: serde_json::Value = serde_json::from_str(&response.text().await?)
            .map_err(|e| Error::Format(format!("unable to decode SCIM response: {e}")))?;
        let user_id = body
            .get("id")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| Error::Format("unable to parse user identifier".to_string()))?;

        info!(user_id = %user_id, "User created");
        Ok(user_id.to_string())
    }
}

/// User service stub for IBM Security Verify Access (ISVA)
///
/// ISVA one-time password and account creation flows are configured inside
/// the appliance, not through a stable REST dialect this broker could
/// target. Switching platforms therefore degrades sign-up explicitly.
pub struct IsvaUserService;

#[async_trait]
impl UserService for IsvaUserService {
    async fn generate_otp(&self, _token: &Token, _email: &str) -> Result<OTPChallenge> {
        Err(Error::NotImplemented(
            "OTP generation is not available on ISVA".to_string(),
        ))
    }

    async fn verify_user(
        &self,
        _token: &Token,
        _transaction_id: &str,
        _otp: &str,
        _user: &UserSignUp,
    ) -> Result<String> {
        Err(Error::NotImplemented(
            "OTP verification is not available on ISVA".to_string(),
        ))
    }

    async fn create_user(&self, _token: &Token, _email: &str, _name: &str) -> Result<String> {
        Err(Error::NotImplemented(
            "user creation is not available on ISVA".to_string(),
        ))
    }
}
