//! Snapshot sources consumed by the reconciler
//!
//! The legacy side can enumerate a whole tenant at once, the remote side only
//! one object at a time. Both are injected so the diff can run against
//! in-memory fakes.

use crate::models::{ObjectTuples, TupleGroup};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Authoritative tuples for a tenant, grouped by object and tuple key.
///
/// Must return the complete snapshot or fail: a partial result cannot be
/// told apart from a tenant that simply has fewer tuples.
#[async_trait]
pub trait LegacyCollector: Send + Sync {
    async fn collect(&self, org_id: i64) -> anyhow::Result<TupleGroup>;
}

/// Tuples currently stored remotely for one object.
///
/// An object without remote tuples yields an empty map, not an error.
#[async_trait]
pub trait RemoteCollector: Send + Sync {
    async fn collect(&self, object: &str, namespace: &str) -> anyhow::Result<ObjectTuples>;
}

/// Legacy collector backed by a plain async function
pub struct LegacyCollectorFn<F> {
    f: F,
}

pub fn legacy_collector_fn<F>(f: F) -> Arc<LegacyCollectorFn<F>>
where
    F: Fn(i64) -> BoxFuture<'static, anyhow::Result<TupleGroup>> + Send + Sync,
{
    Arc::new(LegacyCollectorFn { f })
}

#[async_trait]
impl<F> LegacyCollector for LegacyCollectorFn<F>
where
    F: Fn(i64) -> BoxFuture<'static, anyhow::Result<TupleGroup>> + Send + Sync,
{
    async fn collect(&self, org_id: i64) -> anyhow::Result<TupleGroup> {
        (self.f)(org_id).await
    }
}

/// Remote collector backed by a plain async function
pub struct RemoteCollectorFn<F> {
    f: F,
}

pub fn remote_collector_fn<F>(f: F) -> Arc<RemoteCollectorFn<F>>
where
    F: Fn(String, String) -> BoxFuture<'static, anyhow::Result<ObjectTuples>> + Send + Sync,
{
    Arc::new(RemoteCollectorFn { f })
}

#[async_trait]
impl<F> RemoteCollector for RemoteCollectorFn<F>
where
    F: Fn(String, String) -> BoxFuture<'static, anyhow::Result<ObjectTuples>> + Send + Sync,
{
    async fn collect(&self, object: &str, namespace: &str) -> anyhow::Result<ObjectTuples> {
        (self.f)(object.to_string(), namespace.to_string()).await
    }
}
