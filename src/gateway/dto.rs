//! Request DTOs and validation
//!
//! Field constraints are enforced here, before any core operation or
//! backend call runs. WebAuthn binary fields are validated only for
//! presence; their contents stay opaque base64url strings.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::backend::{ChallengeType, UserSignUp};
use crate::{Error, Result};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap_or_else(|_| unreachable!("static pattern"))
});

static ALPHANUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]+$").unwrap_or_else(|_| unreachable!("static pattern"))
});

fn require_non_empty(value: &str, field: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// A WebAuthn challenge request for registration or sign-in
#[derive(Debug, Clone, Deserialize)]
pub struct ChallengeRequest {
    /// Display name used by the authenticator for UI representation;
    /// ignored for assertion challenges
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,

    /// Which ceremony the challenge is for
    #[serde(rename = "type")]
    pub challenge_type: ChallengeType,
}

/// A FIDO2 registration (attestation result)
#[derive(Debug, Clone, Deserialize)]
pub struct FIDO2Registration {
    /// Friendly name for the registration
    pub nickname: String,

    /// Base64url-encoded clientDataJSON from the WebAuthn client
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,

    /// Base64url-encoded attestationObject from the WebAuthn client
    #[serde(rename = "attestationObject")]
    pub attestation_object: String,

    /// Credential identifier from the WebAuthn client
    #[serde(rename = "credentialId")]
    pub credential_id: String,
}

impl FIDO2Registration {
    /// All fields are required and non-empty
    pub fn validate(&self) -> Result<()> {
        require_non_empty(&self.nickname, "nickname")?;
        require_non_empty(&self.client_data_json, "clientDataJSON")?;
        require_non_empty(&self.attestation_object, "attestationObject")?;
        require_non_empty(&self.credential_id, "credentialId")
    }
}

/// A FIDO2 verification (assertion result)
#[derive(Debug, Clone, Deserialize)]
pub struct FIDO2Verification {
    /// Base64url-encoded clientDataJSON from the WebAuthn client
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,

    /// Authenticator data produced by the authenticator
    #[serde(rename = "authenticatorData")]
    pub authenticator_data: String,

    /// Credential identifier from the WebAuthn client
    #[serde(rename = "credentialId")]
    pub credential_id: String,

    /// Base64url-encoded signature over the challenge data
    pub signature: String,

    /// The userId provided when the credential was created
    #[serde(rename = "userHandle")]
    pub user_handle: String,
}

impl FIDO2Verification {
    /// All fields are required and non-empty
    pub fn validate(&self) -> Result<()> {
        require_non_empty(&self.client_data_json, "clientDataJSON")?;
        require_non_empty(&self.authenticator_data, "authenticatorData")?;
        require_non_empty(&self.credential_id, "credentialId")?;
        require_non_empty(&self.signature, "signature")?;
        require_non_empty(&self.user_handle, "userHandle")
    }
}

/// A password sign-in request for an existing account
#[derive(Debug, Clone, Deserialize)]
pub struct UserAuthentication {
    /// The user's username, an email address or an alphanumeric name
    pub username: String,

    /// The user's password
    pub password: String,
}

impl UserAuthentication {
    /// Username must look like an email or be alphanumeric; passwords are at
    /// least five characters
    pub fn validate(&self) -> Result<()> {
        if !EMAIL.is_match(&self.username) && !ALPHANUMERIC.is_match(&self.username) {
            return Err(Error::Validation(
                "username must be an email address or alphanumeric".to_string(),
            ));
        }
        if self.password.chars().count() < 5 {
            return Err(Error::Validation(
                "password must be at least 5 characters".to_string(),
            ));
        }
        Ok(())
    }
}

/// A one-time password verification request
#[derive(Debug, Clone, Deserialize)]
pub struct OTPVerification {
    /// The verification transaction identifier
    #[serde(rename = "transactionId")]
    pub transaction_id: String,

    /// The one-time password value
    pub otp: String,
}

impl OTPVerification {
    /// Both fields are required and non-empty
    pub fn validate(&self) -> Result<()> {
        require_non_empty(&self.transaction_id, "transactionId")?;
        require_non_empty(&self.otp, "otp")
    }
}

/// Validate a sign-up request: non-empty name, well-formed email
pub fn validate_signup(user: &UserSignUp) -> Result<()> {
    require_non_empty(&user.name, "name")?;
    if !EMAIL.is_match(&user.email) {
        return Err(Error::Validation("email is not a valid address".to_string()));
    }
    Ok(())
}
