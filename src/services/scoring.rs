// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Challenge points and leaderboards.
//!
//! Step-goal points accumulate one per credited day and are never taken
//! back. Weight-loss points are recomputed from scratch on every pass, and
//! the total is always rebuilt from the two sub-totals.

use crate::db::{ChallengeStore, HistoryStore, Store, UserStore};
use crate::error::AppError;
use crate::models::{
    Challenge, ChallengeParticipant, DailyHistoryEntry, LeaderboardEntry, LeaderboardUpdate,
    WeightLossTier,
};
use chrono::{Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Maps a weight-loss percentage to points.
pub trait WeightLossPolicy: Send + Sync {
    fn points_for(&self, percentage: f64) -> u32;
}

/// Awards the points of the highest tier reached.
#[derive(Debug, Clone, Default)]
pub struct TieredWeightLoss {
    tiers: Vec<WeightLossTier>,
}

impl TieredWeightLoss {
    pub fn new(tiers: Vec<WeightLossTier>) -> Self {
        Self { tiers }
    }

    /// Policy configured on `challenge`.
    pub fn for_challenge(challenge: &Challenge) -> Self {
        Self::new(challenge.weight_loss_tiers.clone())
    }
}

impl WeightLossPolicy for TieredWeightLoss {
    fn points_for(&self, percentage: f64) -> u32 {
        self.tiers
            .iter()
            .filter(|tier| tier.min_percentage <= percentage)
            .max_by(|a, b| a.min_percentage.total_cmp(&b.min_percentage))
            .map(|tier| tier.points)
            .unwrap_or(0)
    }
}

/// Percentage of starting weight lost, never negative.
///
/// Returns 0 unless both weights are finite and positive. Not rounded:
/// tier thresholds compare against the exact value.
pub fn weight_loss_percentage(starting: f64, current: f64) -> f64 {
    let valid = |w: f64| w.is_finite() && w > 0.0;
    if !valid(starting) || !valid(current) {
        return 0.0;
    }
    ((starting - current) * 100.0 / starting).max(0.0)
}

/// Update `participant` from `history` (ordered by date).
///
/// Only days inside the challenge window and not after `today` count.
/// Returns whether any field changed.
pub fn score_participant(
    challenge: &Challenge,
    participant: &mut ChallengeParticipant,
    history: &[DailyHistoryEntry],
    today: NaiveDate,
    policy: &dyn WeightLossPolicy,
) -> bool {
    let before = participant.clone();

    let in_window = history
        .iter()
        .filter(|e| e.date <= today && challenge.covers(e.date));

    for entry in in_window.clone() {
        if entry.steps >= challenge.step_goal && participant.credit_step_day(entry.date) {
            tracing::debug!(
                challenge_id = %challenge.id,
                user_id = %participant.user_id,
                date = %entry.date,
                "Credited step goal day"
            );
        }
    }

    let weights = in_window.clone().filter_map(|e| e.weight_lbs);
    if participant.starting_weight.is_none() {
        participant.starting_weight = weights.clone().next();
    }
    if let Some(latest) = weights.last() {
        participant.last_weight = Some(latest);
    }

    if let Some(latest_steps) = in_window.filter(|e| e.steps > 0).last() {
        participant.last_step_count = latest_steps.steps;
        participant.last_step_date = Some(latest_steps.date);
    }

    participant.weight_loss_points = match (participant.starting_weight, participant.last_weight) {
        (Some(start), Some(current)) => {
            policy.points_for(weight_loss_percentage(start, current))
        }
        _ => 0,
    };

    participant.recompute_points();
    *participant != before
}

/// Rank participants by points (descending), then user ID (ascending).
///
/// Ranks are sequential: equal points still get distinct ranks.
pub fn build_leaderboard(
    participants: &[ChallengeParticipant],
    names: &HashMap<String, String>,
) -> Vec<LeaderboardEntry> {
    let mut sorted: Vec<&ChallengeParticipant> = participants.iter().collect();
    sorted.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.user_id.cmp(&b.user_id)));

    sorted
        .into_iter()
        .enumerate()
        .map(|(i, p)| LeaderboardEntry {
            user_id: p.user_id.clone(),
            name: names
                .get(&p.user_id)
                .cloned()
                .unwrap_or_else(|| p.user_id.clone()),
            points: p.points,
            rank: (i + 1) as u32,
        })
        .collect()
}

/// Scores a user's challenges against stored history.
#[derive(Clone)]
pub struct ScoringEngine {
    store: Arc<dyn Store>,
}

impl ScoringEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Rescore every challenge `user_id` participates in and return the
    /// resulting leaderboards.
    pub async fn score_user(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<Vec<LeaderboardUpdate>, AppError> {
        let challenges = self.store.challenges_for_user(user_id).await?;
        let mut updates = Vec::with_capacity(challenges.len());

        for challenge in &challenges {
            let mut participant = self
                .store
                .get_participant(&challenge.id, user_id)
                .await?
                .unwrap_or_else(|| ChallengeParticipant::new(&challenge.id, user_id));

            let end = challenge.end_date.map_or(today, |end| end.min(today));
            let history = if end < challenge.start_date {
                Vec::new()
            } else {
                self.store
                    .get_history(user_id, challenge.start_date, end + Duration::days(1))
                    .await?
            };

            let policy = TieredWeightLoss::for_challenge(challenge);
            if score_participant(challenge, &mut participant, &history, today, &policy) {
                participant.updated_at = Utc::now().to_rfc3339();
                self.store.upsert_participant(&participant).await?;
                tracing::info!(
                    challenge_id = %challenge.id,
                    user_id,
                    points = participant.points,
                    step_goal_days = participant.step_goal_days_achieved,
                    "Participant rescored"
                );
            }

            updates.push(self.leaderboard(&challenge.id).await?);
        }

        Ok(updates)
    }

    /// Current leaderboard for a challenge.
    pub async fn leaderboard(&self, challenge_id: &str) -> Result<LeaderboardUpdate, AppError> {
        let participants = self.store.list_participants(challenge_id).await?;

        let mut names = HashMap::new();
        for p in &participants {
            if let Some(user) = self.store.get_user(&p.user_id).await? {
                names.insert(p.user_id.clone(), user.name);
            }
        }

        Ok(LeaderboardUpdate {
            challenge_id: challenge_id.to_string(),
            leaderboard: build_leaderboard(&participants, &names),
        })
    }
}
