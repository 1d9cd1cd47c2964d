//! Configuration management
//!
//! All settings come from the process environment (optionally seeded from an
//! env file by the CLI). Startup fails fast when the platform selection, the
//! backend base URL or any client credential is missing, mirroring the
//! operator-facing environment variables:
//!
//! `PLATFORM`, `BASE_URL`, `FIDO2_RELYING_PARTY_ID`, `API_CLIENT_ID`,
//! `API_CLIENT_SECRET`, `AUTH_CLIENT_ID`, `AUTH_CLIENT_SECRET` and, for
//! ISVA only, `AUTH_SESSION`.

use std::fmt;
use std::str::FromStr;

use figment::{Figment, providers::Env};
use serde::Deserialize;
use url::Url;

use crate::{Error, Result};

/// A platform supported by the relying party service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// IBM Security Verify
    Isv,
    /// IBM Security Verify Access
    Isva,
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "isv" => Ok(Self::Isv),
            "isva" => Ok(Self::Isva),
            other => Err(Error::Config(format!(
                "invalid PLATFORM '{other}'; valid values are 'ISV' or 'ISVA'"
            ))),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Isv => write!(f, "ISV"),
            Self::Isva => write!(f, "ISVA"),
        }
    }
}

/// How a successful ISVA sign-in is propagated to the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthSession {
    /// An OAuth token in the response body
    #[default]
    Token,
    /// Cookies representing an authenticated session
    Cookies,
    /// External Authentication Interface (EAI) headers
    Eai,
}

impl FromStr for AuthSession {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "token" => Ok(Self::Token),
            "cookies" => Ok(Self::Cookies),
            "eai" => Ok(Self::Eai),
            other => Err(Error::Config(format!(
                "invalid AUTH_SESSION '{other}'; valid values are 'token', 'cookies' or 'eai'"
            ))),
        }
    }
}

impl fmt::Display for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token => write!(f, "token"),
            Self::Cookies => write!(f, "cookies"),
            Self::Eai => write!(f, "eai"),
        }
    }
}

/// Validated server configuration, immutable for the process lifetime
#[derive(Debug, Clone)]
pub struct Config {
    /// Selected identity-provider platform
    pub platform: Platform,
    /// Base URL of the backend host
    pub base_url: Url,
    /// Unique relying party identifier registered with the backend
    pub relying_party_id: String,
    /// Client id for service-to-service API calls
    pub api_client_id: String,
    /// Client secret for service-to-service API calls
    pub api_client_secret: String,
    /// Client id for end-user authentication grants
    pub auth_client_id: String,
    /// Client secret for end-user authentication grants
    pub auth_client_secret: String,
    /// Sign-in session mode (ISVA only; ISV always returns tokens)
    pub auth_session: AuthSession,
}

/// Raw environment shape before validation
#[derive(Debug, Deserialize)]
struct RawConfig {
    platform: String,
    base_url: String,
    fido2_relying_party_id: String,
    api_client_id: String,
    api_client_secret: String,
    auth_client_id: String,
    auth_client_secret: String,
    auth_session: Option<String>,
}

impl Config {
    /// Load and validate configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::from_figment(&Figment::new().merge(Env::raw()))
    }

    fn from_figment(figment: &Figment) -> Result<Self> {
        let raw: RawConfig = figment
            .extract()
            .map_err(|e| Error::Config(format!("environment variables not set or invalid: {e}")))?;

        let platform: Platform = raw.platform.parse()?;
        let base_url = Url::parse(&raw.base_url)
            .map_err(|e| Error::Config(format!("invalid BASE_URL '{}': {e}", raw.base_url)))?;

        // AUTH_SESSION only changes behavior on ISVA; parse it regardless so
        // a typo is caught at startup instead of being ignored.
        let auth_session = match raw.auth_session.as_deref() {
            Some(value) => value.parse()?,
            None => AuthSession::default(),
        };

        Ok(Self {
            platform,
            base_url,
            relying_party_id: raw.fido2_relying_party_id,
            api_client_id: raw.api_client_id,
            api_client_secret: raw.api_client_secret,
            auth_client_id: raw.auth_client_id,
            auth_client_secret: raw.auth_client_secret,
            auth_session,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Serialized;

    fn figment_with(platform: &str, auth_session: Option<&str>) -> Figment {
        let mut figment = Figment::new()
            .merge(Serialized::default("platform", platform))
            .merge(Serialized::default("base_url", "https://tenant.verify.ibm.com"))
            .merge(Serialized::default("fido2_relying_party_id", "rp-1"))
            .merge(Serialized::default("api_client_id", "api-id"))
            .merge(Serialized::default("api_client_secret", "api-secret"))
            .merge(Serialized::default("auth_client_id", "auth-id"))
            .merge(Serialized::default("auth_client_secret", "auth-secret"));
        if let Some(session) = auth_session {
            figment = figment.merge(Serialized::default("auth_session", session));
        }
        figment
    }

    #[test]
    fn platform_parses_case_insensitively() {
        assert_eq!("ISV".parse::<Platform>().unwrap(), Platform::Isv);
        assert_eq!("isva".parse::<Platform>().unwrap(), Platform::Isva);
        assert!("other".parse::<Platform>().is_err());
    }

    #[test]
    fn auth_session_defaults_to_token() {
        let config = Config::from_figment(&figment_with("isva", None)).unwrap();
        assert_eq!(config.auth_session, AuthSession::Token);
    }

    #[test]
    fn auth_session_parses_modes() {
        let config = Config::from_figment(&figment_with("isva", Some("EAI"))).unwrap();
        assert_eq!(config.auth_session, AuthSession::Eai);

        assert!(Config::from_figment(&figment_with("isva", Some("bogus"))).is_err());
    }

    #[test]
    fn missing_variables_fail_fast() {
        let figment = Figment::new().merge(Serialized::default("platform", "isv"));
        assert!(matches!(Config::from_figment(&figment), Err(Error::Config(_))));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let figment = figment_with("isv", None)
            .merge(Serialized::default("base_url", "not a url"));
        assert!(matches!(Config::from_figment(&figment), Err(Error::Config(_))));
    }
}
