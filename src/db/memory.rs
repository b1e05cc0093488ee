// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store for tests and local development.

use crate::db::{ChallengeStore, CredentialStore, HistoryStore, UserStore};
use crate::error::AppError;
use crate::models::challenge::participant_doc_id;
use crate::models::history::history_doc_id;
use crate::models::{AccessCredential, Challenge, ChallengeParticipant, DailyHistoryEntry, User};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    credentials: HashMap<String, AccessCredential>,
    history: BTreeMap<String, DailyHistoryEntry>,
    challenges: HashMap<String, Challenge>,
    participants: HashMap<String, ChallengeParticipant>,
}

/// In-memory document store keyed by the same document IDs as Firestore.
#[derive(Clone, Default)]
pub struct MemoryDb {
    tables: Arc<RwLock<Tables>>,
    history_writes: Arc<AtomicUsize>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a challenge definition.
    pub async fn put_challenge(&self, challenge: Challenge) {
        self.tables
            .write()
            .await
            .challenges
            .insert(challenge.id.clone(), challenge);
    }

    /// Enroll a user in a challenge if not already enrolled.
    pub async fn enroll(&self, challenge_id: &str, user_id: &str) {
        self.tables
            .write()
            .await
            .participants
            .entry(participant_doc_id(challenge_id, user_id))
            .or_insert_with(|| ChallengeParticipant::new(challenge_id, user_id));
    }

    /// Every stored history entry, ordered by document ID.
    pub async fn all_history(&self) -> Vec<DailyHistoryEntry> {
        self.tables.read().await.history.values().cloned().collect()
    }

    /// Number of history writes performed so far.
    pub fn history_write_count(&self) -> usize {
        self.history_writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl HistoryStore for MemoryDb {
    async fn get_history(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyHistoryEntry>, AppError> {
        let tables = self.tables.read().await;
        let mut entries: Vec<DailyHistoryEntry> = tables
            .history
            .values()
            .filter(|e| e.user_id == user_id && e.date >= start && e.date < end)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.date);
        Ok(entries)
    }

    async fn upsert_history(&self, entry: &DailyHistoryEntry) -> Result<(), AppError> {
        self.history_writes.fetch_add(1, Ordering::Relaxed);
        self.tables
            .write()
            .await
            .history
            .insert(history_doc_id(&entry.user_id, entry.date), entry.clone());
        Ok(())
    }
}

#[async_trait]
impl ChallengeStore for MemoryDb {
    async fn get_challenge(&self, challenge_id: &str) -> Result<Option<Challenge>, AppError> {
        Ok(self.tables.read().await.challenges.get(challenge_id).cloned())
    }

    async fn challenges_for_user(&self, user_id: &str) -> Result<Vec<Challenge>, AppError> {
        let tables = self.tables.read().await;
        let mut challenges: Vec<Challenge> = tables
            .participants
            .values()
            .filter(|p| p.user_id == user_id)
            .filter_map(|p| tables.challenges.get(&p.challenge_id).cloned())
            .collect();
        challenges.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(challenges)
    }

    async fn get_participant(
        &self,
        challenge_id: &str,
        user_id: &str,
    ) -> Result<Option<ChallengeParticipant>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .participants
            .get(&participant_doc_id(challenge_id, user_id))
            .cloned())
    }

    async fn upsert_participant(
        &self,
        participant: &ChallengeParticipant,
    ) -> Result<(), AppError> {
        self.tables
            .write()
            .await
            .participants
            .insert(participant.doc_id(), participant.clone());
        Ok(())
    }

    async fn list_participants(
        &self,
        challenge_id: &str,
    ) -> Result<Vec<ChallengeParticipant>, AppError> {
        Ok(self
            .tables
            .read()
            .await
            .participants
            .values()
            .filter(|p| p.challenge_id == challenge_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryDb {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        Ok(self.tables.read().await.users.get(user_id).cloned())
    }

    async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.tables
            .write()
            .await
            .users
            .insert(user.user_id.clone(), user.clone());
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryDb {
    async fn load_credential(&self, user_id: &str) -> Result<Option<AccessCredential>, AppError> {
        Ok(self.tables.read().await.credentials.get(user_id).cloned())
    }

    async fn save_credential(
        &self,
        user_id: &str,
        credential: &AccessCredential,
    ) -> Result<(), AppError> {
        self.tables
            .write()
            .await
            .credentials
            .insert(user_id.to_string(), credential.clone());
        Ok(())
    }

    async fn delete_credential(&self, user_id: &str) -> Result<(), AppError> {
        self.tables.write().await.credentials.remove(user_id);
        Ok(())
    }

    async fn connected_users(&self) -> Result<Vec<String>, AppError> {
        let mut users: Vec<String> = self
            .tables
            .read()
            .await
            .credentials
            .keys()
            .cloned()
            .collect();
        users.sort();
        Ok(users)
    }
}
