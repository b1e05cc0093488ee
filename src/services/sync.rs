// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user sync cycle: credential → plan → fetch → reconcile → score → publish.
//!
//! At most one cycle runs per user. Provider trouble ends the fetch stage
//! but scoring still runs over whatever is stored; a missing credential or a
//! store failure fails the cycle outright.

use crate::config::SyncSettings;
use crate::db::{CredentialStore, HistoryStore, Store};
use crate::error::{AppError, SyncError};
use crate::models::{DailyHistoryEntry, UserSnapshot};
use crate::services::credentials::{CredentialManager, TokenGrantor};
use crate::services::gap_planner::{plan_gaps, GapPlan};
use crate::services::provider::{FetchedDays, FitnessProvider, ProviderError};
use crate::services::realtime::SnapshotSink;
use crate::services::reconcile::Reconciler;
use crate::services::scoring::ScoringEngine;
use crate::time_utils::{day_start, format_utc_rfc3339, utc_day};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Succeeded,
    /// Fetching stopped early; scores reflect stored data only
    Partial,
    /// Nothing attempted (cool-down or another cycle running)
    Skipped,
    Failed,
}

/// Summary of one sync cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SyncReport {
    pub status: SyncStatus,
    pub days_inserted: usize,
    pub days_updated: usize,
    pub buckets_skipped: usize,
    pub challenges_scored: usize,
    pub error: Option<String>,
    /// ISO 8601
    pub finished_at: String,
}

impl SyncReport {
    fn new(status: SyncStatus) -> Self {
        Self {
            status,
            days_inserted: 0,
            days_updated: 0,
            buckets_skipped: 0,
            challenges_scored: 0,
            error: None,
            finished_at: format_utc_rfc3339(Utc::now()),
        }
    }

    fn with_error(status: SyncStatus, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(status)
        }
    }
}

/// Result of asking for a background cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    /// A cycle is already running for this user; nothing was queued
    AlreadyRunning,
}

/// Collaborators of the sync engine.
pub struct SyncDeps {
    pub store: Arc<dyn Store>,
    pub history: Arc<dyn HistoryStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub provider: Arc<dyn FitnessProvider>,
    pub grantor: Arc<dyn TokenGrantor>,
    pub sink: Arc<dyn SnapshotSink>,
}

/// Orchestrates sync cycles for all users.
#[derive(Clone)]
pub struct SyncService {
    history: Arc<dyn HistoryStore>,
    credentials: Arc<dyn CredentialStore>,
    provider: Arc<dyn FitnessProvider>,
    grantor: Arc<dyn TokenGrantor>,
    sink: Arc<dyn SnapshotSink>,
    reconciler: Reconciler,
    scoring: ScoringEngine,
    settings: SyncSettings,
    /// Per-user mutex making cycles non-reentrant.
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    /// Credential session per user.
    sessions: Arc<DashMap<String, Arc<CredentialManager>>>,
    running: Arc<DashMap<String, AbortHandle>>,
    reports: Arc<DashMap<String, SyncReport>>,
}

impl SyncService {
    pub fn new(deps: SyncDeps, settings: SyncSettings) -> Self {
        Self {
            reconciler: Reconciler::new(deps.history.clone()),
            scoring: ScoringEngine::new(deps.store),
            history: deps.history,
            credentials: deps.credentials,
            provider: deps.provider,
            grantor: deps.grantor,
            sink: deps.sink,
            settings,
            locks: Arc::new(DashMap::new()),
            sessions: Arc::new(DashMap::new()),
            running: Arc::new(DashMap::new()),
            reports: Arc::new(DashMap::new()),
        }
    }

    pub fn scoring(&self) -> &ScoringEngine {
        &self.scoring
    }

    // ─── Triggers ────────────────────────────────────────────────────────────

    /// Start a background cycle unless one is already running.
    pub fn trigger(&self, user_id: &str) -> TriggerOutcome {
        let Ok(guard) = self.user_lock(user_id).try_lock_owned() else {
            tracing::debug!(user_id, "Sync already running, trigger ignored");
            return TriggerOutcome::AlreadyRunning;
        };

        let service = self.clone();
        let user = user_id.to_string();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            service.cycle(&user).await;
            service.running.remove(&user);
        });
        self.running
            .insert(user_id.to_string(), handle.abort_handle());

        TriggerOutcome::Started
    }

    /// Run a cycle in the caller's task and wait for it.
    pub async fn run_cycle(&self, user_id: &str) -> SyncReport {
        let Ok(_guard) = self.user_lock(user_id).try_lock_owned() else {
            return SyncReport::with_error(SyncStatus::Skipped, "sync already running");
        };
        self.cycle(user_id).await
    }

    /// Abort any in-flight cycle and drop the user's credential session.
    ///
    /// Upserts already committed stay; scoring is redone next cycle.
    pub fn cancel(&self, user_id: &str) {
        if let Some((_, handle)) = self.running.remove(user_id) {
            handle.abort();
            tracing::info!(user_id, "Cancelled in-flight sync");
        }
        self.sessions.remove(user_id);
    }

    /// Forget the in-memory session so the next cycle reloads the stored
    /// credential.
    pub fn reset_session(&self, user_id: &str) {
        self.sessions.remove(user_id);
    }

    pub fn is_running(&self, user_id: &str) -> bool {
        self.locks
            .get(user_id)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    pub fn last_report(&self, user_id: &str) -> Option<SyncReport> {
        self.reports.get(user_id).map(|r| r.clone())
    }

    /// Users with a stored credential.
    pub async fn connected_users(&self) -> Result<Vec<String>, AppError> {
        self.credentials.connected_users().await
    }

    // ─── Manual entries ──────────────────────────────────────────────────────

    /// Store a manual weight for `date`, keeping that day's steps, and
    /// rescore the user's challenges.
    ///
    /// Waits for a running cycle to finish first; both write the same
    /// history and participant records.
    pub async fn record_weight(
        &self,
        user_id: &str,
        date: NaiveDate,
        weight_lbs: f64,
    ) -> Result<DailyHistoryEntry, AppError> {
        let _guard = self.user_lock(user_id).lock_owned().await;

        let existing = self
            .history
            .get_history(user_id, date, date + Duration::days(1))
            .await?
            .into_iter()
            .next();

        let entry = DailyHistoryEntry {
            user_id: user_id.to_string(),
            date,
            steps: existing.map_or(0, |e| e.steps),
            weight_lbs: Some(weight_lbs),
        };
        self.history.upsert_history(&entry).await?;
        tracing::info!(user_id, date = %date, weight_lbs, "Manual weight recorded");

        // Leaderboards pick up the new weight without waiting for a sync.
        match self.scoring.score_user(user_id, utc_day(Utc::now())).await {
            Ok(updates) => {
                for update in updates {
                    self.sink.publish_leaderboard(update);
                }
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Rescore after weight entry failed");
            }
        }

        Ok(entry)
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn session(&self, user_id: &str) -> Arc<CredentialManager> {
        self.sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                Arc::new(CredentialManager::new(
                    user_id,
                    self.credentials.clone(),
                    self.grantor.clone(),
                    &self.settings,
                ))
            })
            .clone()
    }

    // ─── Cycle ───────────────────────────────────────────────────────────────

    async fn cycle(&self, user_id: &str) -> SyncReport {
        tracing::info!(user_id, "Sync cycle started");

        let report = match self.run_stages(user_id).await {
            Ok(report) => report,
            Err(e) => SyncReport::with_error(SyncStatus::Failed, e.to_string()),
        };

        match report.status {
            SyncStatus::Succeeded | SyncStatus::Skipped => tracing::info!(
                user_id,
                status = ?report.status,
                days_inserted = report.days_inserted,
                days_updated = report.days_updated,
                buckets_skipped = report.buckets_skipped,
                challenges_scored = report.challenges_scored,
                "Sync cycle finished"
            ),
            SyncStatus::Partial | SyncStatus::Failed => tracing::warn!(
                user_id,
                status = ?report.status,
                error = report.error.as_deref().unwrap_or(""),
                "Sync cycle did not complete, will retry"
            ),
        }

        self.reports.insert(user_id.to_string(), report.clone());
        report
    }

    async fn run_stages(&self, user_id: &str) -> Result<SyncReport, AppError> {
        let session = self.session(user_id);

        if let Some(until) = session.cooling_down_until().await {
            tracing::info!(user_id, until = %until, "Provider cool-down active, skipping sync");
            return Ok(SyncReport::with_error(
                SyncStatus::Skipped,
                SyncError::ProviderRateLimited { until }.to_string(),
            ));
        }

        let today = utc_day(Utc::now());
        let window_start = today - Duration::days(self.settings.lookback_days);
        let existing = self
            .history
            .get_history(user_id, window_start, today)
            .await?;
        let plan = plan_gaps(&existing, today, self.settings.lookback_days);
        if plan.is_complete() {
            tracing::debug!(user_id, "History window complete, backfill is parity-only");
        } else {
            tracing::debug!(
                user_id,
                missing = plan.missing.len(),
                needs_weight = plan.needs_weight_only.len(),
                "History gaps planned"
            );
        }

        let mut report = SyncReport::new(SyncStatus::Succeeded);

        if let Some(err) = self
            .fetch_and_reconcile(&session, user_id, &plan, today, &mut report)
            .await?
        {
            report.status = SyncStatus::Partial;
            report.error = Some(err.to_string());
        }

        let leaderboards = self.scoring.score_user(user_id, today).await?;
        report.challenges_scored = leaderboards.len();
        for update in leaderboards {
            self.sink.publish_leaderboard(update);
        }

        self.publish_snapshot(user_id, window_start, today).await?;

        report.finished_at = format_utc_rfc3339(Utc::now());
        Ok(report)
    }

    /// Backfill the window, then today's bucket.
    ///
    /// Returns the provider error that stopped fetching, if any.
    async fn fetch_and_reconcile(
        &self,
        session: &CredentialManager,
        user_id: &str,
        plan: &GapPlan,
        today: NaiveDate,
        report: &mut SyncReport,
    ) -> Result<Option<SyncError>, AppError> {
        let mut token = match session.get_valid_token().await {
            Ok(token) => token,
            Err(e) => return stop_fetching(user_id, e),
        };

        let windows = [
            (plan.fetch_start, plan.fetch_end, plan.eligible_dates()),
            (
                day_start(today),
                day_start(today + Duration::days(1)),
                BTreeSet::new(),
            ),
        ];

        let mut refreshed = false;
        for (start, end, eligible) in windows {
            let fetched = match self
                .fetch_with_retry(session, &mut token, &mut refreshed, start, end)
                .await
            {
                Ok(fetched) => fetched,
                Err(e) => return stop_fetching(user_id, e),
            };

            report.buckets_skipped += fetched.skipped_buckets;
            let outcome = self
                .reconciler
                .upsert(user_id, &fetched.samples, &eligible, today)
                .await?;
            report.days_inserted += outcome.inserted;
            report.days_updated += outcome.updated;
        }

        Ok(None)
    }

    /// One provider call, retried with a fresh token on 401.
    ///
    /// `refreshed` spans the whole cycle: once the token has been forced
    /// fresh, any later 401 is terminal.
    async fn fetch_with_retry(
        &self,
        session: &CredentialManager,
        token: &mut String,
        refreshed: &mut bool,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<FetchedDays, SyncError> {
        match self.provider.fetch_aggregate(token, start, end).await {
            Ok(fetched) => return Ok(fetched),
            Err(ProviderError::Unauthorized) if *refreshed => {
                return Err(SyncError::ProviderUnauthorized)
            }
            Err(ProviderError::Unauthorized) => {}
            Err(ProviderError::RateLimited) => return Err(session.note_rate_limited().await),
            Err(e) => return Err(e.into()),
        }

        *refreshed = true;
        *token = session.force_refresh().await?;

        match self.provider.fetch_aggregate(token, start, end).await {
            Ok(fetched) => Ok(fetched),
            Err(ProviderError::RateLimited) => Err(session.note_rate_limited().await),
            Err(e) => Err(e.into()),
        }
    }

    async fn publish_snapshot(
        &self,
        user_id: &str,
        window_start: NaiveDate,
        today: NaiveDate,
    ) -> Result<(), AppError> {
        let history = self
            .history
            .get_history(user_id, window_start, today + Duration::days(1))
            .await?;

        let snapshot = UserSnapshot {
            user_id: user_id.to_string(),
            steps: history
                .iter()
                .find(|e| e.date == today)
                .map_or(0, |e| e.steps),
            weight: history.iter().rev().find_map(|e| e.weight_lbs),
            last_sync: format_utc_rfc3339(Utc::now()),
        };

        self.sink.publish_snapshot(snapshot);
        Ok(())
    }
}

fn stop_fetching(user_id: &str, err: SyncError) -> Result<Option<SyncError>, AppError> {
    if err.fails_cycle() {
        return Err(AppError::Sync(err));
    }
    tracing::warn!(user_id, error = %err, "Provider fetch stopped, scoring stored data");
    Ok(Some(err))
}
