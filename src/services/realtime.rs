// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Real-time fan-out of snapshots, leaderboards and consent prompts.
//!
//! The sync engine only talks to [`SnapshotSink`]; [`BroadcastHub`] is the
//! in-process implementation that feeds the SSE endpoint.

use crate::models::{LeaderboardUpdate, RealtimeEvent, UserSnapshot};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Downstream consumer of finalized sync results.
pub trait SnapshotSink: Send + Sync {
    /// Publish a user snapshot. Returns `false` if it was a duplicate.
    fn publish_snapshot(&self, snapshot: UserSnapshot) -> bool;

    /// Publish a challenge leaderboard. Returns `false` if it was a duplicate.
    fn publish_leaderboard(&self, update: LeaderboardUpdate) -> bool;

    /// Ask the user's connected clients to run the consent flow.
    fn publish_consent_required(&self, user_id: &str);

    /// Whether the user has at least one open real-time connection.
    fn has_listener(&self, user_id: &str) -> bool;
}

/// Broadcast-channel hub that only emits changed values.
#[derive(Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<RealtimeEvent>,
    last_snapshots: Arc<DashMap<String, UserSnapshot>>,
    last_leaderboards: Arc<DashMap<String, LeaderboardUpdate>>,
    listeners: Arc<DashMap<String, usize>>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            last_snapshots: Arc::new(DashMap::new()),
            last_leaderboards: Arc::new(DashMap::new()),
            listeners: Arc::new(DashMap::new()),
        }
    }

    /// Open a subscription for `user_id`.
    ///
    /// The user counts as connected until the returned value is dropped.
    pub fn subscribe(&self, user_id: &str) -> Subscription {
        *self.listeners.entry(user_id.to_string()).or_insert(0) += 1;
        Subscription {
            user_id: user_id.to_string(),
            rx: self.tx.subscribe(),
            listeners: self.listeners.clone(),
        }
    }

    /// Forget the last snapshot so the next one is always emitted.
    pub fn forget_user(&self, user_id: &str) {
        self.last_snapshots.remove(user_id);
    }

    fn send(&self, event: RealtimeEvent) {
        // No receivers is fine: nobody is watching right now.
        let _ = self.tx.send(event);
    }
}

impl SnapshotSink for BroadcastHub {
    fn publish_snapshot(&self, snapshot: UserSnapshot) -> bool {
        let unchanged = self
            .last_snapshots
            .get(&snapshot.user_id)
            .is_some_and(|last| last.same_data(&snapshot));
        if unchanged {
            tracing::debug!(user_id = %snapshot.user_id, "Snapshot unchanged, not emitting");
            return false;
        }

        self.last_snapshots
            .insert(snapshot.user_id.clone(), snapshot.clone());
        self.send(RealtimeEvent::Snapshot(snapshot));
        true
    }

    fn publish_leaderboard(&self, update: LeaderboardUpdate) -> bool {
        let unchanged = self
            .last_leaderboards
            .get(&update.challenge_id)
            .is_some_and(|last| *last == update);
        if unchanged {
            return false;
        }

        self.last_leaderboards
            .insert(update.challenge_id.clone(), update.clone());
        self.send(RealtimeEvent::Leaderboard(update));
        true
    }

    fn publish_consent_required(&self, user_id: &str) {
        self.send(RealtimeEvent::ConsentRequired {
            user_id: user_id.to_string(),
        });
    }

    fn has_listener(&self, user_id: &str) -> bool {
        self.listeners.get(user_id).is_some_and(|count| *count > 0)
    }
}

/// A user's live view of the hub.
pub struct Subscription {
    user_id: String,
    rx: broadcast::Receiver<RealtimeEvent>,
    listeners: Arc<DashMap<String, usize>>,
}

impl Subscription {
    /// Next event visible to this user, or `None` once the hub is gone.
    pub async fn next_event(&mut self) -> Option<RealtimeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.is_visible_to(&self.user_id) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(user_id = %self.user_id, missed, "Real-time subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let now_empty = match self.listeners.get_mut(&self.user_id) {
            Some(mut count) => {
                *count = count.saturating_sub(1);
                *count == 0
            }
            None => false,
        };
        if now_empty {
            self.listeners.remove_if(&self.user_id, |_, count| *count == 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LeaderboardEntry;

    fn snapshot(user: &str, steps: u32, last_sync: &str) -> UserSnapshot {
        UserSnapshot {
            user_id: user.to_string(),
            steps,
            weight: Some(170.0),
            last_sync: last_sync.to_string(),
        }
    }

    fn board(points: u32) -> LeaderboardUpdate {
        LeaderboardUpdate {
            challenge_id: "c1".to_string(),
            leaderboard: vec![LeaderboardEntry {
                user_id: "u1".to_string(),
                name: "One".to_string(),
                points,
                rank: 1,
            }],
        }
    }

    #[tokio::test]
    async fn test_snapshot_dedup_ignores_timestamp() {
        let hub = BroadcastHub::new();
        let mut sub = hub.subscribe("u1");

        assert!(hub.publish_snapshot(snapshot("u1", 100, "t1")));
        assert!(!hub.publish_snapshot(snapshot("u1", 100, "t2")));
        assert!(hub.publish_snapshot(snapshot("u1", 200, "t3")));

        let first = sub.next_event().await.unwrap();
        let second = sub.next_event().await.unwrap();
        assert_eq!(first, RealtimeEvent::Snapshot(snapshot("u1", 100, "t1")));
        assert_eq!(second, RealtimeEvent::Snapshot(snapshot("u1", 200, "t3")));
    }

    #[tokio::test]
    async fn test_leaderboard_dedup() {
        let hub = BroadcastHub::new();
        assert!(hub.publish_leaderboard(board(1)));
        assert!(!hub.publish_leaderboard(board(1)));
        assert!(hub.publish_leaderboard(board(2)));
    }

    #[tokio::test]
    async fn test_subscription_filters_other_users() {
        let hub = BroadcastHub::new();
        let mut sub = hub.subscribe("u1");

        hub.publish_snapshot(snapshot("u2", 5, "t"));
        hub.publish_consent_required("u2");
        hub.publish_consent_required("u1");

        let event = sub.next_event().await.unwrap();
        assert_eq!(
            event,
            RealtimeEvent::ConsentRequired {
                user_id: "u1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_leaderboard_only_reaches_participants() {
        let hub = BroadcastHub::new();
        let mut outsider = hub.subscribe("u2");
        let mut member = hub.subscribe("u1");

        hub.publish_leaderboard(board(4));
        hub.publish_consent_required("u2");

        assert_eq!(member.next_event().await, Some(RealtimeEvent::Leaderboard(board(4))));
        assert_eq!(
            outsider.next_event().await,
            Some(RealtimeEvent::ConsentRequired {
                user_id: "u2".to_string()
            })
        );
    }

    #[test]
    fn test_listener_tracking() {
        let hub = BroadcastHub::new();
        assert!(!hub.has_listener("u1"));

        let a = hub.subscribe("u1");
        let b = hub.subscribe("u1");
        assert!(hub.has_listener("u1"));

        drop(a);
        assert!(hub.has_listener("u1"));
        drop(b);
        assert!(!hub.has_listener("u1"));
    }

    #[test]
    fn test_forget_user_reemits() {
        let hub = BroadcastHub::new();
        assert!(hub.publish_snapshot(snapshot("u1", 1, "t")));
        hub.forget_user("u1");
        assert!(hub.publish_snapshot(snapshot("u1", 1, "t")));
    }
}
