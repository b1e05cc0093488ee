// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Provider access credentials.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Delegated-access credential for the fitness provider.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessCredential {
    /// Bearer token sent to the provider
    pub token: String,
    /// When the token stops working
    pub expires_at: DateTime<Utc>,
    /// Refresh artifact for silent refresh
    pub refresh_token: Option<String>,
}

impl AccessCredential {
    /// A credential is usable only while `now < expires_at - buffer`.
    pub fn is_usable(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        now < self.expires_at - buffer
    }
}

impl std::fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessCredential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// Credential as stored in Firestore (encrypted with KMS).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedCredential {
    /// Owner (also used as document ID)
    pub user_id: String,
    /// Encrypted access token (base64)
    pub token_encrypted: String,
    /// Encrypted refresh token (base64)
    pub refresh_token_encrypted: Option<String>,
    /// When the access token expires (ISO 8601)
    pub expires_at: String,
}
