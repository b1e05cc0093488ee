// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Provider-agnostic interface for fetching daily fitness aggregates.

use crate::error::SyncError;
use crate::models::DaySample;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Days extracted from one aggregate response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedDays {
    pub samples: Vec<DaySample>,
    /// Buckets dropped because steps/weight could not be read
    pub skipped_buckets: usize,
}

/// Failure of a single provider call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limited")]
    RateLimited,

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<ProviderError> for SyncError {
    /// Rate limits are mapped by the credential manager, which owns the
    /// cool-down deadline; this conversion is for the remaining variants.
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unauthorized => SyncError::ProviderUnauthorized,
            ProviderError::RateLimited => SyncError::ProviderTransient("rate limited".to_string()),
            ProviderError::Transient(msg) => SyncError::ProviderTransient(msg),
            ProviderError::Malformed(msg) => SyncError::MalformedResponse(msg),
        }
    }
}

/// A source of day-bucketed step and weight data.
#[async_trait]
pub trait FitnessProvider: Send + Sync {
    /// Fetch one bucket per UTC day in `[start, end)`.
    async fn fetch_aggregate(
        &self,
        token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<FetchedDays, ProviderError>;
}
