//! In-memory collaborators for development, dry runs and tests

use crate::{
    client::{RemoteStoreClient, WriteRequest},
    collector::{LegacyCollector, RemoteCollector},
    models::*,
};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// In-memory remote tuple store
///
/// Keyed by `(namespace, object)`. A request applies its deletes before its
/// writes, as the remote store does for a single call.
pub struct InMemoryTupleStore {
    tuples: Arc<DashMap<(String, String), ObjectTuples>>,
    requests: Mutex<Vec<WriteRequest>>,
    reads: AtomicUsize,
    fail_write_at: Mutex<Option<usize>>,
    failing_objects: DashSet<String>,
}

impl InMemoryTupleStore {
    pub fn new() -> Self {
        Self {
            tuples: Arc::new(DashMap::new()),
            requests: Mutex::new(Vec::new()),
            reads: AtomicUsize::new(0),
            fail_write_at: Mutex::new(None),
            failing_objects: DashSet::new(),
        }
    }

    /// Seed the store with a flat tuple list for `namespace`
    pub fn with_tuples<I>(self, namespace: &str, tuples: I) -> Self
    where
        I: IntoIterator<Item = Tuple>,
    {
        for tuple in tuples {
            self.insert(namespace, tuple);
        }
        self
    }

    pub fn insert(&self, namespace: &str, tuple: Tuple) {
        self.tuples
            .entry((namespace.to_string(), tuple.object.clone()))
            .or_default()
            .insert(tuple.key(), tuple);
    }

    fn remove(&self, namespace: &str, key: &TupleKeyWithoutCondition) {
        let object_key = (namespace.to_string(), key.object.clone());
        if let Some(mut tuples) = self.tuples.get_mut(&object_key) {
            tuples.remove(&TupleKey::new(&key.user, &key.relation));
        }
        self.tuples.remove_if(&object_key, |_, tuples| tuples.is_empty());
    }

    /// Everything stored for `namespace`, grouped by object
    pub fn snapshot(&self, namespace: &str) -> TupleGroup {
        self.tuples
            .iter()
            .filter(|entry| entry.key().0 == namespace)
            .map(|entry| (entry.key().1.clone(), entry.value().clone()))
            .collect()
    }

    /// Fail the write request with this zero-based index (counted over the
    /// store's lifetime). Failed requests are not applied.
    pub fn fail_write_at(&self, index: usize) {
        if let Ok(mut slot) = self.fail_write_at.lock() {
            *slot = Some(index);
        }
    }

    /// Fail every read of `object`
    pub fn fail_reads_of(&self, object: &str) {
        self.failing_objects.insert(object.to_string());
    }

    /// Write requests received so far, including failed ones
    pub fn requests(&self) -> Vec<WriteRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests().len()
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryTupleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteCollector for InMemoryTupleStore {
    async fn collect(&self, object: &str, namespace: &str) -> anyhow::Result<ObjectTuples> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.failing_objects.contains(object) {
            anyhow::bail!("read of {} failed", object);
        }
        Ok(self
            .tuples
            .get(&(namespace.to_string(), object.to_string()))
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl RemoteStoreClient for InMemoryTupleStore {
    async fn write(&self, request: WriteRequest) -> anyhow::Result<()> {
        let index = {
            let mut requests = self
                .requests
                .lock()
                .map_err(|_| anyhow::anyhow!("request log poisoned"))?;
            requests.push(request.clone());
            requests.len().saturating_sub(1)
        };

        let fail_at = *self
            .fail_write_at
            .lock()
            .map_err(|_| anyhow::anyhow!("failure switch poisoned"))?;
        if fail_at == Some(index) {
            anyhow::bail!("write request {} rejected", index);
        }

        debug!(
            namespace = %request.namespace,
            writes = request.writes.len(),
            deletes = request.deletes.len(),
            "applying write request"
        );
        for key in &request.deletes {
            self.remove(&request.namespace, key);
        }
        for tuple in request.writes {
            self.insert(&request.namespace, tuple);
        }
        Ok(())
    }
}

/// Legacy snapshots per organization
#[derive(Default)]
pub struct InMemoryLegacySource {
    snapshots: DashMap<i64, TupleGroup>,
    failure: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl InMemoryLegacySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(self, org_id: i64, group: TupleGroup) -> Self {
        self.snapshots.insert(org_id, group);
        self
    }

    pub fn set_snapshot(&self, org_id: i64, group: TupleGroup) {
        self.snapshots.insert(org_id, group);
    }

    /// Make every subsequent collect fail with `message`
    pub fn fail_with(&self, message: &str) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(message.to_string());
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LegacyCollector for InMemoryLegacySource {
    async fn collect(&self, org_id: i64) -> anyhow::Result<TupleGroup> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failure = self
            .failure
            .lock()
            .map_err(|_| anyhow::anyhow!("failure switch poisoned"))?
            .clone();
        if let Some(message) = failure {
            anyhow::bail!(message);
        }
        Ok(self
            .snapshots
            .get(&org_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}
