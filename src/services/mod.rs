// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod consent;
pub mod credentials;
pub mod gap_planner;
pub mod google_fit;
pub mod google_oauth;
pub mod kms;
pub mod provider;
pub mod realtime;
pub mod reconcile;
pub mod scheduler;
pub mod scoring;
pub mod sync;

pub use consent::ConsentBroker;
pub use credentials::{CredentialManager, CredentialState, TokenGrantor};
pub use gap_planner::{plan_gaps, GapPlan};
pub use google_fit::GoogleFitClient;
pub use google_oauth::{GoogleGrantor, GoogleOAuthClient};
pub use kms::KmsService;
pub use provider::{FetchedDays, FitnessProvider, ProviderError};
pub use realtime::{BroadcastHub, SnapshotSink};
pub use reconcile::Reconciler;
pub use scheduler::SyncScheduler;
pub use scoring::{ScoringEngine, TieredWeightLoss, WeightLossPolicy};
pub use sync::{SyncDeps, SyncReport, SyncService, SyncStatus, TriggerOutcome};
