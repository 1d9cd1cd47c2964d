//! Backend abstraction layer
//!
//! One of two identity-provider platforms (ISV or ISVA) is selected at
//! startup; everything above this module talks to the platform through the
//! [`WebAuthnService`] and [`UserService`] traits and the platform-specific
//! [`TokenClient`] endpoints built here.

pub mod headers;
pub mod response;
pub mod user;
pub mod webauthn;

use std::sync::Arc;

use reqwest::Client;
use url::Url;

use crate::config::{Config, Platform};
use crate::oauth::TokenClient;
use crate::{Error, Result};

pub use headers::{RESERVED_HEADERS, filter_reserved, merge_forwarded};
pub use response::BackendResponse;
pub use user::{IsvUserService, IsvaUserService, OTPChallenge, UserService, UserSignUp};
pub use webauthn::{ChallengeType, IsvWebAuthnService, IsvaWebAuthnService, WebAuthnService};

/// The concrete services wired for the configured platform
pub struct BackendServices {
    /// WebAuthn challenge/attestation/assertion broker
    pub webauthn: Arc<dyn WebAuthnService>,
    /// OTP and account provisioning service
    pub users: Arc<dyn UserService>,
    /// Token client for API (service-to-service) credentials
    pub api_tokens: Arc<TokenClient>,
    /// Token client for end-user authentication grants
    pub auth_tokens: Arc<TokenClient>,
}

impl BackendServices {
    /// Construct the platform's services once at startup
    pub fn from_config(config: &Config, http: Client) -> Result<Self> {
        let token_endpoint = token_endpoint(config.platform, &config.base_url)?;

        let api_tokens = Arc::new(TokenClient::new(
            http.clone(),
            token_endpoint.clone(),
            config.api_client_id.clone(),
            config.api_client_secret.clone(),
        ));
        let auth_tokens = Arc::new(TokenClient::new(
            http.clone(),
            token_endpoint,
            config.auth_client_id.clone(),
            config.auth_client_secret.clone(),
        ));

        let (webauthn, users): (Arc<dyn WebAuthnService>, Arc<dyn UserService>) =
            match config.platform {
                Platform::Isv => (
                    Arc::new(IsvWebAuthnService::new(
                        http.clone(),
                        &config.base_url,
                        &config.relying_party_id,
                    )),
                    Arc::new(IsvUserService::new(http, &config.base_url)),
                ),
                Platform::Isva => (
                    Arc::new(IsvaWebAuthnService::new(
                        http,
                        &config.base_url,
                        &config.relying_party_id,
                    )),
                    Arc::new(IsvaUserService),
                ),
            };

        Ok(Self {
            webauthn,
            users,
            api_tokens,
            auth_tokens,
        })
    }
}

/// The platform's OAuth token endpoint
fn token_endpoint(platform: Platform, base_url: &Url) -> Result<Url> {
    let base = base_url.as_str().trim_end_matches('/');
    let endpoint = match platform {
        Platform::Isv => format!("{base}/v1.0/endpoint/default/token"),
        Platform::Isva => format!("{base}/mga/sps/oauth/oauth20/token"),
    };
    Url::parse(&endpoint).map_err(|e| Error::Config(format!("invalid token endpoint: {e}")))
}
