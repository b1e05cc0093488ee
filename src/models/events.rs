// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Payloads pushed to the real-time transport.

use crate::models::LeaderboardEntry;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Latest finalized fitness numbers for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserSnapshot {
    pub user_id: String,
    /// Today's steps
    pub steps: u32,
    /// Most recent known weight (lbs)
    pub weight: Option<f64>,
    /// When the sync that produced this snapshot finished (ISO 8601)
    pub last_sync: String,
}

impl UserSnapshot {
    /// Same numbers, ignoring the sync timestamp.
    pub fn same_data(&self, other: &UserSnapshot) -> bool {
        self.user_id == other.user_id && self.steps == other.steps && self.weight == other.weight
    }
}

/// Ranked standings for one challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LeaderboardUpdate {
    pub challenge_id: String,
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// Event delivered to real-time subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeEvent {
    Snapshot(UserSnapshot),
    Leaderboard(LeaderboardUpdate),
    ConsentRequired { user_id: String },
}

impl RealtimeEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            RealtimeEvent::Snapshot(_) => "snapshot",
            RealtimeEvent::Leaderboard(_) => "leaderboard",
            RealtimeEvent::ConsentRequired { .. } => "consent_required",
        }
    }

    /// Whether `user_id` should receive this event.
    ///
    /// Leaderboards go to the challenge's participants; the rest only to
    /// their owner.
    pub fn is_visible_to(&self, user_id: &str) -> bool {
        match self {
            RealtimeEvent::Snapshot(s) => s.user_id == user_id,
            RealtimeEvent::Leaderboard(update) => {
                update.leaderboard.iter().any(|e| e.user_id == user_id)
            }
            RealtimeEvent::ConsentRequired { user_id: owner } => owner == user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(steps: u32, last_sync: &str) -> UserSnapshot {
        UserSnapshot {
            user_id: "u1".to_string(),
            steps,
            weight: Some(180.5),
            last_sync: last_sync.to_string(),
        }
    }

    #[test]
    fn test_same_data_ignores_timestamp() {
        assert!(snapshot(10, "a").same_data(&snapshot(10, "b")));
        assert!(!snapshot(10, "a").same_data(&snapshot(11, "a")));
    }

    #[test]
    fn test_event_tagging() {
        let event = RealtimeEvent::ConsentRequired {
            user_id: "u1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "consent_required");
        assert_eq!(json["user_id"], "u1");
    }

    #[test]
    fn test_visibility() {
        let event = RealtimeEvent::Snapshot(snapshot(1, "a"));
        assert!(event.is_visible_to("u1"));
        assert!(!event.is_visible_to("u2"));

        let board = RealtimeEvent::Leaderboard(LeaderboardUpdate {
            challenge_id: "c1".to_string(),
            leaderboard: vec![LeaderboardEntry {
                user_id: "u1".to_string(),
                name: "One".to_string(),
                points: 3,
                rank: 1,
            }],
        });
        assert!(board.is_visible_to("u1"));
        assert!(!board.is_visible_to("u2"));
    }
}
