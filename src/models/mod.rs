// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod challenge;
pub mod credential;
pub mod events;
pub mod history;
pub mod user;

pub use challenge::{Challenge, ChallengeParticipant, LeaderboardEntry, WeightLossTier};
pub use credential::AccessCredential;
pub use events::{LeaderboardUpdate, RealtimeEvent, UserSnapshot};
pub use history::{DailyHistoryEntry, DaySample};
pub use user::User;
