// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Failures of the provider sync pipeline.
///
/// Everything except `CredentialUnavailable` is resolved inside a sync
/// cycle (retry, skip, or clean abort) and never crashes it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error("No usable provider credential")]
    CredentialUnavailable,

    #[error("Provider rate limit hit, cooling down until {until}")]
    ProviderRateLimited { until: DateTime<Utc> },

    #[error("Provider rejected the access token")]
    ProviderUnauthorized,

    #[error("Provider request failed: {0}")]
    ProviderTransient(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

impl SyncError {
    /// Whether this error fails the whole cycle rather than just ending
    /// the fetch stage (scoring still runs on stored data in that case).
    pub fn fails_cycle(&self) -> bool {
        matches!(self, SyncError::CredentialUnavailable)
    }
}

/// Failures from the token grant mechanisms.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GrantError {
    /// The refresh artifact was rejected; the user must consent again.
    #[error("Reauthorization required")]
    ReauthorizationRequired,

    #[error("Grant unavailable: {0}")]
    Unavailable(String),

    #[error("Grant request failed: {0}")]
    Transient(String),
}

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Provider(msg) => {
                (StatusCode::BAD_GATEWAY, "provider_error", Some(msg.clone()))
            }
            AppError::Sync(err) => match err {
                SyncError::CredentialUnavailable => (
                    StatusCode::CONFLICT,
                    "credential_unavailable",
                    Some(err.to_string()),
                ),
                SyncError::ProviderRateLimited { .. } => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate_limited",
                    Some(err.to_string()),
                ),
                _ => (StatusCode::BAD_GATEWAY, "sync_failed", Some(err.to_string())),
            },
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
