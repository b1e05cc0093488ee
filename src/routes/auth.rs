// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google OAuth authentication routes.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Redirect,
    routing::get,
    Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;

use crate::db::UserStore;
use crate::error::{AppError, Result};
use crate::middleware::auth::create_jwt;
use crate::models::User;
use crate::services::google_oauth::GoogleUserInfo;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

const CALLBACK_PATH: &str = "/auth/google/callback";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/google", get(auth_start))
        .route(CALLBACK_PATH, get(auth_callback))
}

/// Query parameters for starting OAuth flow.
#[derive(Deserialize)]
pub struct AuthStartParams {
    /// Frontend URL to redirect back to after OAuth completes.
    /// If not provided, uses FRONTEND_URL env var.
    #[serde(default)]
    redirect_uri: Option<String>,
}

/// Callback URL for this deployment, derived from the request's Host header.
fn callback_url(headers: &HeaderMap) -> String {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost:8080");

    let scheme = if host.contains("localhost") || host.contains("127.0.0.1") {
        "http"
    } else {
        "https"
    };

    format!("{}://{}{}", scheme, host, CALLBACK_PATH)
}

/// Sign `frontend_url|timestamp_hex` and base64 it for the `state` parameter.
fn sign_state(frontend_url: &str, timestamp_millis: i64, secret: &[u8]) -> Result<String> {
    let state_payload = format!("{}|{:x}", frontend_url, timestamp_millis);

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(state_payload.as_bytes());
    let signature = mac.finalize().into_bytes();

    let signed_state = format!("{}|{}", state_payload, hex::encode(signature));
    Ok(URL_SAFE_NO_PAD.encode(signed_state.as_bytes()))
}

/// Start OAuth flow - redirect to the Google consent screen.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthStartParams>,
    headers: HeaderMap,
) -> Result<Redirect> {
    let frontend_url = params
        .redirect_uri
        .unwrap_or_else(|| state.config.frontend_url.clone());

    let oauth_state = sign_state(
        &frontend_url,
        Utc::now().timestamp_millis(),
        &state.config.oauth_state_key,
    )?;
    let auth_url = state
        .oauth
        .authorize_url(&callback_url(&headers), &oauth_state);

    tracing::info!(
        frontend_url = %frontend_url,
        "Starting OAuth flow, redirecting to Google"
    );

    Ok(Redirect::temporary(&auth_url))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: String,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - exchange code for tokens, store the credential, start a
/// sync, and hand the session token to the frontend.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect> {
    // Decode and verify frontend URL from state parameter
    let frontend_url = verify_and_decode_state(&params.state, &state.config.oauth_state_key)
        .unwrap_or_else(|| {
            tracing::warn!(
                "Invalid or tampered state parameter, falling back to default frontend URL"
            );
            state.config.frontend_url.clone()
        });

    // Check for OAuth errors
    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from Google");
        let redirect = format!("{}?error={}", frontend_url, urlencoding::encode(&error));
        return Ok(Redirect::temporary(&redirect));
    }

    let code = params
        .code
        .ok_or_else(|| AppError::BadRequest("Missing authorization code".to_string()))?;

    tracing::info!("Exchanging authorization code for tokens");

    let now = Utc::now();
    let tokens = state
        .oauth
        .exchange_code(&code, &callback_url(&headers))
        .await?;
    let profile = state.oauth.fetch_userinfo(&tokens.access_token).await?;
    let user_id = profile.sub.clone();

    upsert_user(&state, profile, &format_utc_rfc3339(now)).await?;

    // Google omits the refresh token on some re-consents; keep the stored one.
    let previous_refresh = match state.credentials.load_credential(&user_id).await {
        Ok(existing) => existing.and_then(|c| c.refresh_token),
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Could not load previous credential");
            None
        }
    };
    let credential = tokens.into_credential(now, previous_refresh);
    state.credentials.save_credential(&user_id, &credential).await?;

    // A sync cycle may be parked waiting for exactly this consent.
    let woken = state.consent.fulfill(&user_id, &credential);
    if woken == 0 {
        state.sync.reset_session(&user_id);
    }

    tracing::info!(
        user_id = %user_id,
        waiting_cycles = woken,
        "OAuth successful, user and credential stored"
    );

    state.sync.trigger(&user_id);

    // Create JWT session token
    let jwt = create_jwt(&user_id, &state.config.jwt_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    // Redirect to frontend with token
    let redirect_url = format!("{}/callback?token={}", frontend_url, jwt);

    Ok(Redirect::temporary(&redirect_url))
}

/// Create the user on first login, otherwise refresh name, email and
/// last-active time.
async fn upsert_user(state: &AppState, profile: GoogleUserInfo, now: &str) -> Result<()> {
    let existing = state.store.get_user(&profile.sub).await?;
    let created_at = existing
        .map(|u| u.created_at)
        .unwrap_or_else(|| now.to_string());

    let user = User {
        name: profile.name.unwrap_or_else(|| profile.sub.clone()),
        user_id: profile.sub,
        email: profile.email,
        created_at,
        last_active: now.to_string(),
    };
    state.store.upsert_user(&user).await
}

/// Verify HMAC signature and decode the frontend URL from the OAuth state parameter.
pub fn verify_and_decode_state(state: &str, secret: &[u8]) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    // Format is "frontend_url|timestamp_hex|signature_hex"; the URL itself
    // may not contain '|'.
    let parts: Vec<&str> = state_str.rsplitn(3, '|').collect();
    if parts.len() != 3 {
        return None;
    }

    let signature_hex = parts[0];
    let timestamp_hex = parts[1];
    let frontend_url = parts[2];

    // Reconstruct payload and verify signature
    let payload = format!("{}|{}", frontend_url, timestamp_hex);

    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());

    let signature = hex::decode(signature_hex).ok()?;
    if mac.verify_slice(&signature).is_err() {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    Some(frontend_url.to_string())
}
