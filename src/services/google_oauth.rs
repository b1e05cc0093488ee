// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google OAuth 2.0 client: code exchange, refresh, and userinfo lookup.

use crate::config::Config;
use crate::error::{AppError, GrantError};
use crate::models::AccessCredential;
use crate::services::consent::ConsentBroker;
use crate::services::credentials::TokenGrantor;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;

/// Scopes requested on the consent screen.
pub const OAUTH_SCOPES: &str = "openid profile email \
    https://www.googleapis.com/auth/fitness.activity.read \
    https://www.googleapis.com/auth/fitness.body.read";

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google OAuth client.
#[derive(Clone)]
pub struct GoogleOAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token_url: String,
    userinfo_url: String,
}

impl GoogleOAuthClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.sync.provider_timeout)
            .build()?;

        Ok(Self {
            http,
            client_id: config.google_client_id.clone(),
            client_secret: config.google_client_secret.clone(),
            token_url: config.google_token_url.clone(),
            userinfo_url: config.google_userinfo_url.clone(),
        })
    }

    /// URL of the consent screen.
    pub fn authorize_url(&self, callback_url: &str, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
             access_type=offline&prompt=consent&state={}",
            AUTHORIZE_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(callback_url),
            urlencoding::encode(OAUTH_SCOPES),
            state
        )
    }

    /// Silent refresh with a stored refresh token.
    ///
    /// `invalid_grant` means the refresh token is dead and the user must
    /// consent again; every other failure is transient.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, GrantError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| GrantError::Transient(format!("Token refresh request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if body.contains("invalid_grant") {
                return Err(GrantError::ReauthorizationRequired);
            }
            return Err(GrantError::Transient(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| GrantError::Transient(format!("Failed to parse token response: {}", e)))
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        callback_url: &str,
    ) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", callback_url),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Google token exchange failed");
            return Err(AppError::Provider(format!(
                "Token exchange failed with status {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("Failed to parse token response: {}", e)))
    }

    /// Look up who the access token belongs to.
    pub async fn fetch_userinfo(&self, access_token: &str) -> Result<GoogleUserInfo, AppError> {
        let response = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Userinfo request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Provider(format!(
                "Userinfo failed with status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("Failed to parse userinfo: {}", e)))
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime in seconds
    pub expires_in: i64,
    /// Only sent on first consent (and with `prompt=consent`)
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// Build a credential, keeping `previous_refresh` when Google did not
    /// issue a new refresh token.
    pub fn into_credential(
        self,
        now: DateTime<Utc>,
        previous_refresh: Option<String>,
    ) -> AccessCredential {
        AccessCredential {
            token: self.access_token,
            expires_at: now + Duration::seconds(self.expires_in),
            refresh_token: self.refresh_token.or(previous_refresh),
        }
    }
}

/// OpenID Connect userinfo.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUserInfo {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// [`TokenGrantor`] backed by Google OAuth and the consent broker.
pub struct GoogleGrantor {
    oauth: GoogleOAuthClient,
    broker: Arc<ConsentBroker>,
    consent_timeout: std::time::Duration,
}

impl GoogleGrantor {
    pub fn new(
        oauth: GoogleOAuthClient,
        broker: Arc<ConsentBroker>,
        consent_timeout: std::time::Duration,
    ) -> Self {
        Self {
            oauth,
            broker,
            consent_timeout,
        }
    }
}

#[async_trait]
impl TokenGrantor for GoogleGrantor {
    async fn silent_refresh(
        &self,
        user_id: &str,
        refresh_token: Option<&str>,
    ) -> Result<AccessCredential, GrantError> {
        let Some(refresh_token) = refresh_token else {
            return Err(GrantError::ReauthorizationRequired);
        };

        let response = self.oauth.refresh(refresh_token).await?;
        tracing::info!(user_id, "Silent token refresh succeeded");
        Ok(response.into_credential(Utc::now(), Some(refresh_token.to_string())))
    }

    async fn interactive_grant(&self, user_id: &str) -> Result<AccessCredential, GrantError> {
        self.broker.wait(user_id, self.consent_timeout).await
    }
}
