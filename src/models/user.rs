// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! User model for storage and API.

use serde::{Deserialize, Serialize};

/// User profile stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Google account subject ID (also used as document ID)
    pub user_id: String,
    /// Display name shown on leaderboards
    pub name: String,
    /// Email address (may be None if not shared)
    pub email: Option<String>,
    /// When user first connected
    pub created_at: String,
    /// Last login timestamp
    pub last_active: String,
}
