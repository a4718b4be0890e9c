//! Tuple reconciliation between the legacy permission store and the remote
//! relationship (ReBAC) store
//!
//! The legacy store stays authoritative while permissions are dual-written.
//! This crate keeps the remote tuples of each tenant consistent with it:
//! - Collect the legacy snapshot of a tenant, grouped by object
//! - Fetch the remote tuples of each of those objects
//! - Diff by `(user, relation)`, comparing full content for tuple categories
//!   that embed derived state (folder resource tuples)
//! - Flush deletes, then writes, in bounded batches
//!
//! A pass holds no state between calls, so a failed pass is repaired by
//! running it again.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tuple_reconciler::repository::{InMemoryLegacySource, InMemoryTupleStore};
//! use tuple_reconciler::{group_tuples, ResourceReconciler, Tuple};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let legacy = Arc::new(InMemoryLegacySource::new().with_snapshot(
//!         1,
//!         group_tuples(vec![Tuple::new("user:1", "view", "folder:general")]),
//!     ));
//!     let remote = Arc::new(InMemoryTupleStore::new());
//!
//!     let reconciler = ResourceReconciler::new("folder", legacy, remote.clone(), remote.clone());
//!     let summary = reconciler.reconcile("default").await?;
//!
//!     assert_eq!(summary.writes, 1);
//!     assert_eq!(remote.snapshot("default").len(), 1);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod classify;
pub mod client;
pub mod collector;
pub mod error;
pub mod models;
pub mod namespace;
pub mod reconciler;
pub mod repository;
pub mod runner;
pub mod settings;

pub use batch::*;
pub use classify::*;
pub use client::*;
pub use collector::*;
pub use error::*;
pub use models::*;
pub use namespace::*;
pub use reconciler::*;
pub use runner::*;
pub use settings::*;
pub use tokio_util::sync::CancellationToken;
