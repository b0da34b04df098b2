//! CLM Reconcile - subreconcilers for database clusters
//!
//! Moves a cluster's process groups toward the declared topology one
//! subreconciler at a time. Each step returns an optional [`Requeue`]
//! signal that the [`Scheduler`] turns into the timing of the next pass.
//!
//! ## Steps
//!
//! - [`ChooseRemovals`]: flags surplus process groups for removal, draining
//!   crowded zones first
//! - [`UpdateProcessConfig`]: pushes dynamic configuration to live
//!   processes whose [`Fingerprint`] has drifted
//!
//! ## Key Principle
//!
//! Steps never touch the outside world directly. Object store, process
//! manager, locality and configuration delivery are reached through the
//! collaborator traits held by [`ClusterReconciler`], and every call runs
//! under a [`ReconcileContext`].
//!
//! ## Usage
//!
//! ```no_run
//! use clm_reconcile::memory::InMemoryCollaborators;
//! use clm_reconcile::{ReconcileContext, Scheduler};
//! use clm_types::ClusterKey;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let collaborators = InMemoryCollaborators::new();
//! let scheduler = Scheduler::new(Arc::new(collaborators.reconciler()));
//!
//! let (_cancel, ctx) = ReconcileContext::new();
//! let outcome = scheduler
//!     .run_pass(&ctx, &ClusterKey::new("default", "sample"))
//!     .await;
//! println!("{}", outcome);
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod choose_removals;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod fingerprint;
pub mod memory;
pub mod requeue;
pub mod scheduler;
pub mod update_process_config;

pub use choose_removals::{select_removals, ChooseRemovals, RemovalCandidate, Zone};
pub use collaborators::{
    ClusterReconciler, ClusterStateStore, ConfigPushChannel, ConfigSource, LiveProcessDirectory,
    LocalityClient,
};
pub use config::ReconcilerConfig;
pub use context::{CancelHandle, ReconcileContext};
pub use error::{
    ConfigError, LocalityError, PushError, ReconcileError, ReconcileResult, StoreError,
};
pub use fingerprint::Fingerprint;
pub use requeue::{Requeue, Subreconciler};
pub use scheduler::{PassOutcome, Scheduler};
pub use update_process_config::UpdateProcessConfig;
