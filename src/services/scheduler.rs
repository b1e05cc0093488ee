// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Periodic sync of every connected user.
//!
//! Ticks only trigger cycles; the per-user lock in [`SyncService`] coalesces
//! them with login and manual-refresh triggers.

use crate::error::AppError;
use crate::services::sync::{SyncService, TriggerOutcome};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Outcome of one scheduler tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickResult {
    pub started: usize,
    /// Users whose previous cycle was still running
    pub already_running: usize,
}

/// Drives [`SyncService::trigger`] on a fixed interval.
pub struct SyncScheduler {
    sync: SyncService,
    interval: Duration,
}

impl SyncScheduler {
    pub fn new(sync: SyncService, interval: Duration) -> Self {
        Self { sync, interval }
    }

    /// Trigger a cycle for every connected user.
    pub async fn tick(&self) -> Result<TickResult, AppError> {
        let users = self.sync.connected_users().await?;
        let mut result = TickResult::default();

        for user_id in &users {
            match self.sync.trigger(user_id) {
                TriggerOutcome::Started => result.started += 1,
                TriggerOutcome::AlreadyRunning => result.already_running += 1,
            }
        }

        tracing::info!(
            users = users.len(),
            started = result.started,
            already_running = result.already_running,
            "Scheduled sync tick"
        );
        Ok(result)
    }

    /// Run forever in a background task.
    ///
    /// The first tick fires one full interval after start; logins trigger
    /// their own cycles.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + self.interval,
                self.interval,
            );
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(e) = self.tick().await {
                    tracing::error!(error = %e, "Scheduled sync tick failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncSettings;
    use crate::db::{CredentialStore, MemoryDb};
    use crate::error::GrantError;
    use crate::models::AccessCredential;
    use crate::services::credentials::TokenGrantor;
    use crate::services::provider::{FetchedDays, FitnessProvider, ProviderError};
    use crate::services::realtime::BroadcastHub;
    use crate::services::sync::SyncDeps;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Arc;

    struct SlowProvider;

    #[async_trait]
    impl FitnessProvider for SlowProvider {
        async fn fetch_aggregate(
            &self,
            _token: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<FetchedDays, ProviderError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(FetchedDays::default())
        }
    }

    struct NoGrants;

    #[async_trait]
    impl TokenGrantor for NoGrants {
        async fn silent_refresh(
            &self,
            _user_id: &str,
            _refresh_token: Option<&str>,
        ) -> Result<AccessCredential, GrantError> {
            Err(GrantError::ReauthorizationRequired)
        }

        async fn interactive_grant(&self, _user_id: &str) -> Result<AccessCredential, GrantError> {
            Err(GrantError::Unavailable("test".to_string()))
        }
    }

    #[tokio::test]
    async fn test_tick_triggers_connected_users_once() {
        let db = MemoryDb::new();
        for user in ["u1", "u2"] {
            db.save_credential(
                user,
                &AccessCredential {
                    token: "t".to_string(),
                    expires_at: Utc::now() + chrono::Duration::hours(2),
                    refresh_token: None,
                },
            )
            .await
            .unwrap();
        }

        let sync = SyncService::new(
            SyncDeps {
                store: Arc::new(db.clone()),
                history: Arc::new(db.clone()),
                credentials: Arc::new(db.clone()),
                provider: Arc::new(SlowProvider),
                grantor: Arc::new(NoGrants),
                sink: Arc::new(BroadcastHub::new()),
            },
            SyncSettings::default(),
        );
        let scheduler = SyncScheduler::new(sync, Duration::from_secs(900));

        let first = scheduler.tick().await.unwrap();
        assert_eq!(first.started, 2);

        let second = scheduler.tick().await.unwrap();
        assert_eq!(second.started, 0);
        assert_eq!(second.already_running, 2);
    }
}
