// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Provider credential lifecycle for one user session.
//!
//! Acquisition order:
//! 1. In-session credential, if still outside the expiry buffer
//! 2. Persisted credential (first use in this session)
//! 3. Silent refresh with the stored refresh token
//! 4. Interactive grant, only when silent refresh says reauthorization is required
//!
//! Every credential obtained from a grant is persisted so later sessions can
//! skip the consent flow.

use crate::config::SyncSettings;
use crate::db::CredentialStore;
use crate::error::{GrantError, SyncError};
use crate::models::AccessCredential;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Mechanisms for obtaining a new access credential.
#[async_trait]
pub trait TokenGrantor: Send + Sync {
    /// Renew without user interaction.
    ///
    /// Must return [`GrantError::ReauthorizationRequired`] when the refresh
    /// artifact is missing or rejected.
    async fn silent_refresh(
        &self,
        user_id: &str,
        refresh_token: Option<&str>,
    ) -> Result<AccessCredential, GrantError>;

    /// Renew by prompting the user through the provider's consent flow.
    async fn interactive_grant(&self, user_id: &str) -> Result<AccessCredential, GrantError>;
}

/// Where a session's credential currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    NoCredential,
    Valid,
    /// Still accepted by the provider, but inside the expiry buffer
    ExpiringSoon,
    Expired,
    /// Provider quota exhausted; no calls until the cool-down elapses
    RateLimited,
}

#[derive(Default)]
struct SessionState {
    credential: Option<AccessCredential>,
    /// Whether the persisted credential has been read yet
    loaded: bool,
    cooling_down_until: Option<DateTime<Utc>>,
}

/// Owns the provider credential for a single user.
pub struct CredentialManager {
    user_id: String,
    store: Arc<dyn CredentialStore>,
    grantor: Arc<dyn TokenGrantor>,
    expiry_buffer: Duration,
    cooldown: Duration,
    state: Mutex<SessionState>,
}

impl CredentialManager {
    pub fn new(
        user_id: &str,
        store: Arc<dyn CredentialStore>,
        grantor: Arc<dyn TokenGrantor>,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            store,
            grantor,
            expiry_buffer: settings.expiry_buffer,
            cooldown: settings.rate_limit_cooldown,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Current state as of `now`, without any I/O.
    pub async fn state(&self, now: DateTime<Utc>) -> CredentialState {
        let state = self.state.lock().await;
        if state.cooling_down_until.is_some_and(|until| now < until) {
            return CredentialState::RateLimited;
        }
        match &state.credential {
            None => CredentialState::NoCredential,
            Some(c) if c.is_usable(now, self.expiry_buffer) => CredentialState::Valid,
            Some(c) if now < c.expires_at => CredentialState::ExpiringSoon,
            Some(_) => CredentialState::Expired,
        }
    }

    /// End of the active rate-limit cool-down, if any.
    pub async fn cooling_down_until(&self) -> Option<DateTime<Utc>> {
        let now = Utc::now();
        self.state
            .lock()
            .await
            .cooling_down_until
            .filter(|until| now < *until)
    }

    /// Record a provider rate-limit signal and start the cool-down.
    pub async fn note_rate_limited(&self) -> SyncError {
        let until = Utc::now() + self.cooldown;
        self.state.lock().await.cooling_down_until = Some(until);
        tracing::warn!(user_id = %self.user_id, until = %until, "Provider rate limited, cooling down");
        SyncError::ProviderRateLimited { until }
    }

    /// Return a token that is safe to use for the next provider call.
    pub async fn get_valid_token(&self) -> Result<String, SyncError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        if let Some(until) = state.cooling_down_until {
            if now < until {
                return Err(SyncError::ProviderRateLimited { until });
            }
            tracing::info!(user_id = %self.user_id, "Rate-limit cool-down elapsed");
            state.cooling_down_until = None;
        }

        if !state.loaded {
            state.credential = self.load_persisted().await?;
            state.loaded = true;
        }

        if let Some(credential) = &state.credential {
            if credential.is_usable(now, self.expiry_buffer) {
                return Ok(credential.token.clone());
            }
            tracing::info!(
                user_id = %self.user_id,
                expires_at = %credential.expires_at,
                "Access token inside expiry buffer, refreshing"
            );
        }

        let refresh_token = state
            .credential
            .as_ref()
            .and_then(|c| c.refresh_token.clone());

        let credential = match self
            .grantor
            .silent_refresh(&self.user_id, refresh_token.as_deref())
            .await
        {
            Ok(credential) => credential,
            Err(GrantError::ReauthorizationRequired) => {
                tracing::info!(user_id = %self.user_id, "Silent refresh rejected, requesting consent");
                self.interactive().await?
            }
            Err(GrantError::Transient(msg)) => {
                tracing::warn!(user_id = %self.user_id, error = %msg, "Silent refresh failed");
                return Err(SyncError::ProviderTransient(msg));
            }
            Err(GrantError::Unavailable(msg)) => {
                tracing::warn!(user_id = %self.user_id, error = %msg, "Silent refresh unavailable");
                return Err(SyncError::CredentialUnavailable);
            }
        };

        Ok(self.adopt(&mut state, credential).await)
    }

    /// Discard the current token after the provider rejected it and obtain a
    /// new one.
    ///
    /// The rejected token is never reused, even if its expiry says otherwise.
    pub async fn force_refresh(&self) -> Result<String, SyncError> {
        let mut state = self.state.lock().await;
        if !state.loaded {
            state.credential = self.load_persisted().await?;
            state.loaded = true;
        }
        // Mark the rejected token expired but keep its refresh token.
        if let Some(credential) = state.credential.as_mut() {
            credential.expires_at = Utc::now();
        }
        let refresh_token = state
            .credential
            .as_ref()
            .and_then(|c| c.refresh_token.clone());

        tracing::info!(user_id = %self.user_id, "Provider rejected token, forcing refresh");

        let credential = match self
            .grantor
            .silent_refresh(&self.user_id, refresh_token.as_deref())
            .await
        {
            Ok(credential) => credential,
            Err(GrantError::Transient(msg)) => return Err(SyncError::ProviderTransient(msg)),
            Err(_) => self.interactive().await?,
        };

        Ok(self.adopt(&mut state, credential).await)
    }

    async fn interactive(&self) -> Result<AccessCredential, SyncError> {
        self.grantor
            .interactive_grant(&self.user_id)
            .await
            .map_err(|e| {
                tracing::warn!(user_id = %self.user_id, error = %e, "Interactive grant failed");
                SyncError::CredentialUnavailable
            })
    }

    async fn load_persisted(&self) -> Result<Option<AccessCredential>, SyncError> {
        self.store.load_credential(&self.user_id).await.map_err(|e| {
            tracing::error!(user_id = %self.user_id, error = %e, "Failed to load stored credential");
            SyncError::CredentialUnavailable
        })
    }

    /// Make `credential` current and persist it. Returns its token.
    async fn adopt(&self, state: &mut SessionState, credential: AccessCredential) -> String {
        if let Err(e) = self.store.save_credential(&self.user_id, &credential).await {
            // The token is still good for this session.
            tracing::warn!(user_id = %self.user_id, error = %e, "Failed to persist credential");
        }
        let token = credential.token.clone();
        state.credential = Some(credential);
        state.loaded = true;
        token
    }
}
