// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Cloud Run injects secrets as environment variables via secret bindings,
//! so everything is read from the environment once at startup.

use chrono::Duration;
use std::env;
use std::str::FromStr;

/// Which backing store to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Firestore,
    Memory,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Google OAuth client ID (public)
    pub google_client_id: String,
    /// Frontend URL for OAuth redirects
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// GCP region (KMS key location)
    pub gcp_region: String,
    /// Server port
    pub port: u16,
    /// Backing store
    pub store: StoreKind,
    /// Google Fit REST base URL
    pub google_fit_base_url: String,
    /// Google OAuth token endpoint
    pub google_token_url: String,
    /// Google OAuth userinfo endpoint
    pub google_userinfo_url: String,
    /// Sync engine tuning
    pub sync: SyncSettings,

    // --- Secrets ---
    /// Google OAuth client secret
    pub google_client_secret: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for the OAuth `state` parameter
    pub oauth_state_key: Vec<u8>,
}

/// Timing and window parameters for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Interval between scheduled syncs of every connected user
    pub interval: std::time::Duration,
    /// Bound on every provider HTTP call
    pub provider_timeout: std::time::Duration,
    /// Trailing days reconciled each cycle
    pub lookback_days: i64,
    /// Credentials expiring within this buffer are refreshed first
    pub expiry_buffer: Duration,
    /// Sync pause after the provider signals a rate limit
    pub rate_limit_cooldown: Duration,
    /// How long a cycle waits for the user to re-consent
    pub consent_timeout: std::time::Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval: std::time::Duration::from_secs(15 * 60),
            provider_timeout: std::time::Duration::from_secs(10),
            lookback_days: 30,
            expiry_buffer: Duration::minutes(30),
            rate_limit_cooldown: Duration::minutes(5),
            consent_timeout: std::time::Duration::from_secs(120),
        }
    }
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            google_client_id: "test_client_id".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            gcp_region: "us-west1".to_string(),
            port: 8080,
            store: StoreKind::Memory,
            google_fit_base_url: GOOGLE_FIT_BASE_URL.to_string(),
            google_token_url: GOOGLE_TOKEN_URL.to_string(),
            google_userinfo_url: GOOGLE_USERINFO_URL.to_string(),
            sync: SyncSettings::default(),
            google_client_secret: "test_secret".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            oauth_state_key: b"test_oauth_state_key".to_vec(),
        }
    }
}

const GOOGLE_FIT_BASE_URL: &str = "https://www.googleapis.com/fitness/v1";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let store = match env::var("STORE").as_deref() {
            Ok("memory") => StoreKind::Memory,
            Ok("firestore") | Err(_) => StoreKind::Firestore,
            Ok(_) => return Err(ConfigError::Invalid("STORE")),
        };

        let sync = SyncSettings {
            interval: std::time::Duration::from_secs(parse_or("SYNC_INTERVAL_SECS", 900)?),
            provider_timeout: std::time::Duration::from_secs(parse_or(
                "PROVIDER_TIMEOUT_SECS",
                10,
            )?),
            lookback_days: parse_or("LOOKBACK_DAYS", 30)?,
            expiry_buffer: Duration::minutes(parse_or("TOKEN_EXPIRY_BUFFER_MINS", 30)?),
            rate_limit_cooldown: Duration::seconds(parse_or("RATE_LIMIT_COOLDOWN_SECS", 300)?),
            consent_timeout: std::time::Duration::from_secs(parse_or(
                "CONSENT_TIMEOUT_SECS",
                120,
            )?),
        };

        if sync.lookback_days < 1 {
            return Err(ConfigError::Invalid("LOOKBACK_DAYS"));
        }

        Ok(Self {
            google_client_id: env::var("GOOGLE_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("GOOGLE_CLIENT_ID"))?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            gcp_region: env::var("GCP_REGION").unwrap_or_else(|_| "us-west1".to_string()),
            port: parse_or("PORT", 8080)?,
            store,
            google_fit_base_url: env::var("GOOGLE_FIT_BASE_URL")
                .unwrap_or_else(|_| GOOGLE_FIT_BASE_URL.to_string()),
            google_token_url: env::var("GOOGLE_TOKEN_URL")
                .unwrap_or_else(|_| GOOGLE_TOKEN_URL.to_string()),
            google_userinfo_url: env::var("GOOGLE_USERINFO_URL")
                .unwrap_or_else(|_| GOOGLE_USERINFO_URL.to_string()),
            sync,

            google_client_secret: env::var("GOOGLE_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("GOOGLE_CLIENT_SECRET"))?,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            oauth_state_key: env::var("OAUTH_STATE_KEY")
                .map_err(|_| ConfigError::Missing("OAUTH_STATE_KEY"))?
                .into_bytes(),
        })
    }
}

/// Parse an optional numeric variable, falling back to `default` when unset.
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
