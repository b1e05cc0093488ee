// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::db::ChallengeStore;
use crate::error::{AppError, Result};
use crate::middleware::auth::{AuthUser, SESSION_COOKIE};
use crate::models::{DailyHistoryEntry, LeaderboardUpdate, RealtimeEvent};
use crate::services::sync::{SyncReport, TriggerOutcome};
use crate::time_utils::utc_day;
use crate::units::{kg_to_lbs, round2};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Days, NaiveDate, Utc};
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sync", post(trigger_sync))
        .route("/api/sync/status", get(sync_status))
        .route("/api/history", get(get_history))
        .route("/api/weight", post(record_weight))
        .route(
            "/api/challenges/{challenge_id}/leaderboard",
            get(get_leaderboard),
        )
        .route("/api/events", get(events))
        .route("/api/logout", post(logout))
}

fn validation_error(err: validator::ValidationErrors) -> AppError {
    AppError::BadRequest(err.to_string())
}

// ─── Sync ────────────────────────────────────────────────────

/// Manual refresh response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SyncTriggerResponse {
    pub started: bool,
    pub already_running: bool,
}

/// Start a sync cycle for the caller.
///
/// 202 when a cycle was started, 200 when one was already running.
async fn trigger_sync(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> (StatusCode, Json<SyncTriggerResponse>) {
    match state.sync.trigger(&user.user_id) {
        TriggerOutcome::Started => {
            tracing::info!(user_id = %user.user_id, "Manual sync triggered");
            (
                StatusCode::ACCEPTED,
                Json(SyncTriggerResponse {
                    started: true,
                    already_running: false,
                }),
            )
        }
        TriggerOutcome::AlreadyRunning => (
            StatusCode::OK,
            Json(SyncTriggerResponse {
                started: false,
                already_running: true,
            }),
        ),
    }
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SyncStatusResponse {
    pub running: bool,
    /// Most recent finished cycle, if any since startup
    pub last_report: Option<SyncReport>,
}

async fn sync_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Json<SyncStatusResponse> {
    Json(SyncStatusResponse {
        running: state.sync.is_running(&user.user_id),
        last_report: state.sync.last_report(&user.user_id),
    })
}

// ─── History ─────────────────────────────────────────────────

const DEFAULT_HISTORY_DAYS: u32 = 30;

#[derive(Deserialize, Validate)]
struct HistoryQuery {
    #[serde(default = "default_days")]
    #[validate(range(min = 1, max = 90))]
    days: u32,
}

fn default_days() -> u32 {
    DEFAULT_HISTORY_DAYS
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct HistoryResponse {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub entries: Vec<DailyHistoryEntry>,
}

/// Stored daily history for the trailing `days` days, today included.
async fn get_history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>> {
    params.validate().map_err(validation_error)?;

    let (start_date, end_date) = history_window(utc_day(Utc::now()), params.days)?;
    let entries = state
        .history
        .get_history(&user.user_id, start_date, end_date + Days::new(1))
        .await?;

    Ok(Json(HistoryResponse {
        start_date,
        end_date,
        entries,
    }))
}

/// Inclusive date range of `days` days ending today.
fn history_window(today: NaiveDate, days: u32) -> Result<(NaiveDate, NaiveDate)> {
    let start = today
        .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
        .ok_or_else(|| AppError::BadRequest("History window out of range".to_string()))?;
    Ok((start, today))
}

// ─── Manual Weight ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    Kg,
    Lbs,
}

#[derive(Debug, Deserialize, Validate)]
pub struct WeightRequest {
    #[validate(range(exclusive_min = 0.0, max = 1500.0))]
    pub weight: f64,
    pub unit: WeightUnit,
    /// Defaults to today (UTC)
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

impl WeightRequest {
    /// Weight in pounds, rounded to 2 decimal places.
    fn weight_lbs(&self) -> Option<f64> {
        match self.unit {
            WeightUnit::Kg => kg_to_lbs(self.weight),
            WeightUnit::Lbs if self.weight.is_finite() && self.weight > 0.0 => {
                Some(round2(self.weight))
            }
            WeightUnit::Lbs => None,
        }
    }
}

/// Record a manual weight for one day, keeping that day's steps.
async fn record_weight(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<WeightRequest>,
) -> Result<Json<DailyHistoryEntry>> {
    request.validate().map_err(validation_error)?;

    let today = utc_day(Utc::now());
    let date = request.date.unwrap_or(today);
    if date > today {
        return Err(AppError::BadRequest(
            "Weight cannot be recorded for a future date".to_string(),
        ));
    }

    let weight_lbs = request
        .weight_lbs()
        .ok_or_else(|| AppError::BadRequest("Weight must be a positive number".to_string()))?;

    let entry = state
        .sync
        .record_weight(&user.user_id, date, weight_lbs)
        .await?;

    Ok(Json(entry))
}

// ─── Leaderboard ─────────────────────────────────────────────

/// Standings for a challenge the caller participates in.
///
/// Non-participants get the same 404 as an unknown challenge.
async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(challenge_id): Path<String>,
) -> Result<Json<LeaderboardUpdate>> {
    let not_found = || AppError::NotFound(format!("Challenge {} not found", challenge_id));

    if state.store.get_challenge(&challenge_id).await?.is_none() {
        return Err(not_found());
    }
    if state
        .store
        .get_participant(&challenge_id, &user.user_id)
        .await?
        .is_none()
    {
        tracing::debug!(
            user_id = %user.user_id,
            challenge_id = %challenge_id,
            "Leaderboard requested by non-participant"
        );
        return Err(not_found());
    }

    let leaderboard = state.sync.scoring().leaderboard(&challenge_id).await?;
    Ok(Json(leaderboard))
}

// ─── Real-time Events ────────────────────────────────────────

/// Server-Sent Events stream of the caller's real-time events.
///
/// The caller counts as connected (and can be asked for consent) while
/// this stream is open.
async fn events(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    tracing::debug!(user_id = %user.user_id, "Real-time stream opened");

    let subscription = state.hub.subscribe(&user.user_id);
    let stream = futures_util::stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.next_event().await?;
        Some((to_sse_event(&event), subscription))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse_event(event: &RealtimeEvent) -> std::result::Result<Event, axum::Error> {
    Event::default().event(event.name()).json_data(event)
}

// ─── Logout ──────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LogoutResponse {
    pub success: bool,
}

/// Cancel any in-flight sync and drop the caller's session.
///
/// The stored credential is kept so scheduled syncs keep leaderboards
/// current.
async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
) -> (CookieJar, Json<LogoutResponse>) {
    state.sync.cancel(&user.user_id);
    state.hub.forget_user(&user.user_id);
    tracing::info!(user_id = %user.user_id, "User logged out");

    let secure = state.config.frontend_url.starts_with("https://");
    let removal = Cookie::build(SESSION_COOKIE)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure);

    (jar.remove(removal), Json(LogoutResponse { success: true }))
}
