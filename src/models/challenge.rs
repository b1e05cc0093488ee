// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Challenges, their participants, and derived leaderboard rows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A group challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    /// Challenge ID (also used as document ID)
    pub id: String,
    pub name: String,
    /// Daily step goal
    pub step_goal: u32,
    /// First day that counts
    pub start_date: NaiveDate,
    /// Last day that counts (open-ended if None)
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Weight-loss thresholds
    #[serde(default)]
    pub weight_loss_tiers: Vec<WeightLossTier>,
}

impl Challenge {
    /// Whether `day` falls inside the challenge window.
    pub fn covers(&self, day: NaiveDate) -> bool {
        day >= self.start_date && self.end_date.is_none_or(|end| day <= end)
    }
}

/// Points awarded once weight loss reaches `min_percentage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightLossTier {
    pub min_percentage: f64,
    pub points: u32,
}

/// A user's standing in one challenge.
///
/// Invariant: `points == step_goal_points + weight_loss_points` after every
/// scoring pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeParticipant {
    pub challenge_id: String,
    pub user_id: String,
    #[serde(default)]
    pub starting_weight: Option<f64>,
    #[serde(default)]
    pub last_weight: Option<f64>,
    #[serde(default)]
    pub last_step_count: u32,
    #[serde(default)]
    pub last_step_date: Option<NaiveDate>,
    #[serde(default)]
    pub step_goal_points: u32,
    #[serde(default)]
    pub weight_loss_points: u32,
    #[serde(default)]
    pub points: u32,
    #[serde(default)]
    pub step_goal_days_achieved: u32,

    // ─── Idempotency ─────────────────────────────────────────────
    /// Days already credited for meeting the step goal
    #[serde(default)]
    pub credited_step_days: BTreeSet<NaiveDate>,
    /// Most recent credited day
    #[serde(default)]
    pub last_credited_date: Option<NaiveDate>,

    /// Last scoring timestamp (ISO 8601)
    #[serde(default)]
    pub updated_at: String,
}

impl ChallengeParticipant {
    /// Fresh participant with no points.
    pub fn new(challenge_id: &str, user_id: &str) -> Self {
        Self {
            challenge_id: challenge_id.to_string(),
            user_id: user_id.to_string(),
            starting_weight: None,
            last_weight: None,
            last_step_count: 0,
            last_step_date: None,
            step_goal_points: 0,
            weight_loss_points: 0,
            points: 0,
            step_goal_days_achieved: 0,
            credited_step_days: BTreeSet::new(),
            last_credited_date: None,
            updated_at: String::new(),
        }
    }

    /// Deterministic document ID.
    pub fn doc_id(&self) -> String {
        participant_doc_id(&self.challenge_id, &self.user_id)
    }

    /// Credit a step-goal day.
    ///
    /// Returns `false` if the day was already credited.
    pub fn credit_step_day(&mut self, day: NaiveDate) -> bool {
        if !self.credited_step_days.insert(day) {
            return false;
        }
        self.step_goal_points += 1;
        self.step_goal_days_achieved += 1;
        if self.last_credited_date.is_none_or(|last| day > last) {
            self.last_credited_date = Some(day);
        }
        true
    }

    /// Recompute the total from the sub-totals.
    pub fn recompute_points(&mut self) {
        self.points = self.step_goal_points + self.weight_loss_points;
    }
}

/// Document ID for a participant record.
pub fn participant_doc_id(challenge_id: &str, user_id: &str) -> String {
    format!("{}_{}", challenge_id, user_id)
}

/// One ranked leaderboard row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub name: String,
    pub points: u32,
    pub rank: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
    }

    #[test]
    fn test_credit_step_day_is_idempotent() {
        let mut p = ChallengeParticipant::new("c1", "u1");
        assert!(p.credit_step_day(day(3)));
        assert!(!p.credit_step_day(day(3)));
        assert_eq!(p.step_goal_points, 1);
        assert_eq!(p.step_goal_days_achieved, 1);
    }

    #[test]
    fn test_last_credited_date_tracks_latest() {
        let mut p = ChallengeParticipant::new("c1", "u1");
        p.credit_step_day(day(10));
        p.credit_step_day(day(4));
        assert_eq!(p.last_credited_date, Some(day(10)));
        assert_eq!(p.step_goal_days_achieved, 2);
    }

    #[test]
    fn test_recompute_points() {
        let mut p = ChallengeParticipant::new("c1", "u1");
        p.credit_step_day(day(1));
        p.weight_loss_points = 5;
        p.points = 999;
        p.recompute_points();
        assert_eq!(p.points, 6);
    }

    #[test]
    fn test_challenge_covers() {
        let challenge = Challenge {
            id: "c1".to_string(),
            name: "May".to_string(),
            step_goal: 10_000,
            start_date: day(2),
            end_date: Some(day(20)),
            weight_loss_tiers: vec![],
        };
        assert!(!challenge.covers(day(1)));
        assert!(challenge.covers(day(2)));
        assert!(challenge.covers(day(20)));
        assert!(!challenge.covers(day(21)));
    }

    #[test]
    fn test_participant_deserializes_with_defaults() {
        let p: ChallengeParticipant =
            serde_json::from_str(r#"{"challenge_id":"c1","user_id":"u1"}"#).unwrap();
        assert_eq!(p, ChallengeParticipant::new("c1", "u1"));
    }
}
