//! FIDO2 relying party server
//!
//! A broker between WebAuthn clients (mobile or web) and an IBM identity
//! provider: IBM Security Verify (ISV) or IBM Security Verify Access (ISVA).
//! The server issues FIDO2 challenges, submits attestation and assertion
//! results, runs email-OTP sign-up, and normalizes sign-in results into an
//! OAuth token, a cookie session or EAI identity headers.
//!
//! WebAuthn binary fields pass through as base64url strings; cryptographic
//! verification stays with the backend platform.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod oauth;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
