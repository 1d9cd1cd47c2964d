//! HTTP router and handlers

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{
        HeaderMap, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{info, warn};

use super::dto::{
    ChallengeRequest, FIDO2Registration, FIDO2Verification, OTPVerification, UserAuthentication,
    validate_signup,
};
use super::normalize::signin_response;
use crate::backend::{
    ChallengeType, UserService, UserSignUp, WebAuthnService, filter_reserved,
};
use crate::cache::TtlCache;
use crate::config::{AuthSession, Platform};
use crate::oauth::{Token, TokenClient, TokenManager, generate_jwt};
use crate::{Error, Result};

/// Shared application state
pub struct AppState {
    /// Selected identity-provider platform
    pub platform: Platform,
    /// Sign-in session mode
    pub auth_session: AuthSession,
    /// Process-wide TTL cache (service token, pending sign-ups)
    pub cache: Arc<TtlCache>,
    /// WebAuthn credential broker
    pub webauthn: Arc<dyn WebAuthnService>,
    /// OTP and account provisioning service
    pub users: Arc<dyn UserService>,
    /// Cached service token for API calls
    pub api_tokens: Arc<TokenManager>,
    /// Token client for end-user authentication grants
    pub auth_tokens: Arc<TokenClient>,
    /// Public address of this server, used as the JWT assertion issuer
    pub address: String,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/v1/authenticate", post(authenticate_handler))
        .route("/v1/signup", post(signup_handler))
        .route("/v1/validate", post(validate_handler))
        .route("/v1/challenge", post(challenge_handler))
        .route("/v1/register", post(register_handler))
        .route("/v1/signin", post(signin_handler))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The caller's bearer token from the authorization header
fn bearer_token(headers: &HeaderMap) -> Result<Token> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(Error::missing_bearer)?;

    match value.split_once(' ') {
        Some((scheme, credentials)) if scheme.eq_ignore_ascii_case("bearer") => {
            Ok(Token::from_access_token(credentials.trim()))
        }
        _ => Err(Error::missing_bearer()),
    }
}

/// GET / handler
async fn root_handler(State(state): State<Arc<AppState>>) -> Response {
    format!(
        "FIDO2 relying party server v{} ({})",
        env!("CARGO_PKG_VERSION"),
        state.platform
    )
    .into_response()
}

/// GET /health handler
async fn health_handler() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

/// POST /v1/authenticate handler
///
/// Password sign-in through the ROPC grant for accounts that have not yet
/// registered a FIDO2 credential.
async fn authenticate_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UserAuthentication>,
) -> Result<Response> {
    request.validate()?;

    let token = state
        .auth_tokens
        .password(&request.username, &request.password)
        .await?;

    info!(username = %request.username, "User authenticated");
    Ok(Json(token).into_response())
}

/// POST /v1/signup handler
///
/// Starts an email OTP verification and parks the sign-up details in the
/// cache until the OTP comes back through `/v1/validate`.
async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(user): Json<UserSignUp>,
) -> Result<Response> {
    validate_signup(&user)?;

    let token = state.api_tokens.service_token().await?;
    let challenge = state.users.generate_otp(&token, &user.email).await?;

    // The sign-up record lives exactly as long as the OTP transaction.
    let ttl = (challenge.expiry - Utc::now())
        .to_std()
        .unwrap_or(Duration::ZERO);
    state.cache.set(&challenge.transaction_id, &user, ttl);

    Ok(Json(challenge).into_response())
}

/// POST /v1/validate handler
///
/// Completes a sign-up: validates the OTP, provisions the account, then
/// signs a JWT assertion with the auth client secret and exchanges it for
/// the user's first OAuth token.
async fn validate_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OTPVerification>,
) -> Result<Response> {
    request.validate()?;

    let Some(user) = state.cache.get::<UserSignUp>(&request.transaction_id) else {
        return Err(Error::Validation(
            "no sign-up in progress for this transaction".to_string(),
        ));
    };

    let token = state.api_tokens.service_token().await?;
    let user_id = state
        .users
        .verify_user(&token, &request.transaction_id, &request.otp, &user)
        .await?;

    // The account exists now; a stale cache entry only wastes memory until
    // its TTL runs out, so a failed delete is not worth failing the request.
    if !state.cache.delete(&request.transaction_id) {
        warn!(transaction_id = %request.transaction_id, "Sign-up cache entry already gone");
    }

    let assertion = generate_jwt(
        state.auth_tokens.client_secret(),
        &user_id,
        &state.address,
        state.auth_tokens.endpoint().as_str(),
    );
    let token = state.auth_tokens.jwt_bearer(&assertion).await?;

    info!(user_id = %user_id, "Sign-up completed");
    Ok(Json(token).into_response())
}

/// POST /v1/challenge handler
///
/// Runs under the caller's own bearer token when one is present, falling
/// back to the service token otherwise. The display name only applies to
/// attestation ceremonies.
async fn challenge_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChallengeRequest>,
) -> Result<Response> {
    let token = match bearer_token(&headers) {
        Ok(token) => token,
        Err(_) => state.api_tokens.service_token().await?,
    };
    let display_name = match request.challenge_type {
        ChallengeType::Assertion => None,
        ChallengeType::Attestation => request.display_name.clone(),
    };

    let forwarded = filter_reserved(&headers);
    let payload = state
        .webauthn
        .generate_challenge(
            &token,
            display_name.as_deref(),
            request.challenge_type,
            &forwarded,
        )
        .await?;

    // The backend's challenge payload is already JSON; pass it through
    // unparsed.
    Ok(([(CONTENT_TYPE, "application/json")], payload).into_response())
}

/// POST /v1/register handler
async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(registration): Json<FIDO2Registration>,
) -> Result<Response> {
    // An unauthenticated caller is turned away before the body is even
    // looked at.
    let token = bearer_token(&headers)?;

    registration.validate()?;

    let forwarded = filter_reserved(&headers);
    state
        .webauthn
        .create_credential(
            &token,
            &registration.nickname,
            &registration.client_data_json,
            &registration.attestation_object,
            &registration.credential_id,
            &forwarded,
        )
        .await?;

    info!(nickname = %registration.nickname, "Credential registered");
    Ok(StatusCode::CREATED.into_response())
}

/// POST /v1/signin handler
async fn signin_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(verification): Json<FIDO2Verification>,
) -> Result<Response> {
    verification.validate()?;

    let token = state.api_tokens.service_token().await?;
    let forwarded = filter_reserved(&headers);

    let backend = state
        .webauthn
        .verify_credential(
            &token,
            &verification.client_data_json,
            &verification.authenticator_data,
            &verification.credential_id,
            &verification.signature,
            &verification.user_handle,
            &forwarded,
        )
        .await?;

    signin_response(
        state.platform,
        state.auth_session,
        state.auth_tokens.as_ref(),
        backend,
    )
    .await
}
