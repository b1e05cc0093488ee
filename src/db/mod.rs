// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! The sync engine talks to storage only through the traits below, so the
//! same code runs against Firestore in production and [`MemoryDb`] in tests.

pub mod credentials;
pub mod firestore;
pub mod memory;

pub use credentials::EncryptedCredentialStore;
pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::AppError;
use crate::models::{AccessCredential, Challenge, ChallengeParticipant, DailyHistoryEntry, User};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const CREDENTIALS: &str = "credentials";
    pub const DAILY_HISTORY: &str = "daily_history";
    pub const CHALLENGES: &str = "challenges";
    pub const CHALLENGE_PARTICIPANTS: &str = "challenge_participants";
}

/// Per-day history records.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Entries for `user_id` with `start <= date < end`, ordered by date.
    async fn get_history(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyHistoryEntry>, AppError>;

    /// Insert or replace the entry keyed by `(user_id, date)`.
    async fn upsert_history(&self, entry: &DailyHistoryEntry) -> Result<(), AppError>;
}

/// Challenges and their participants.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn get_challenge(&self, challenge_id: &str) -> Result<Option<Challenge>, AppError>;

    /// Challenges that `user_id` participates in.
    async fn challenges_for_user(&self, user_id: &str) -> Result<Vec<Challenge>, AppError>;

    async fn get_participant(
        &self,
        challenge_id: &str,
        user_id: &str,
    ) -> Result<Option<ChallengeParticipant>, AppError>;

    async fn upsert_participant(&self, participant: &ChallengeParticipant)
        -> Result<(), AppError>;

    async fn list_participants(
        &self,
        challenge_id: &str,
    ) -> Result<Vec<ChallengeParticipant>, AppError>;
}

/// User profiles.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError>;
    async fn upsert_user(&self, user: &User) -> Result<(), AppError>;
}

/// Persisted provider credentials, used for silent refresh across sessions.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load_credential(&self, user_id: &str) -> Result<Option<AccessCredential>, AppError>;
    async fn save_credential(
        &self,
        user_id: &str,
        credential: &AccessCredential,
    ) -> Result<(), AppError>;
    async fn delete_credential(&self, user_id: &str) -> Result<(), AppError>;

    /// Users with a stored credential (candidates for scheduled sync).
    async fn connected_users(&self) -> Result<Vec<String>, AppError>;
}

/// Everything the application needs from its document store.
pub trait Store: HistoryStore + ChallengeStore + UserStore {}

impl<T: HistoryStore + ChallengeStore + UserStore> Store for T {}
