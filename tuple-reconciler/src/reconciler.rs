use crate::{
    batch::{batch_async, batch_count, DEFAULT_BATCH_SIZE},
    classify::ContentRules,
    client::{RemoteStoreClient, WriteRequest},
    collector::{LegacyCollector, RemoteCollector},
    error::{CollectorSource, ReconcileError, Result, WritePhase},
    models::*,
    namespace::{DefaultNamespaceParser, NamespaceParser},
};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Outcome of a successful reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub resource: String,
    pub namespace: String,
    /// Objects present in the legacy snapshot
    pub objects: usize,
    pub writes: usize,
    pub deletes: usize,
    /// Write requests sent to the remote store
    pub batches: usize,
}

impl ReconcileSummary {
    pub fn is_noop(&self) -> bool {
        self.writes == 0 && self.deletes == 0
    }
}

/// Keeps the remote tuples of one resource type in line with the legacy source
///
/// A pass collects the legacy snapshot once, diffs it object by object against
/// the remote store, and only then flushes: all deletes first, then all
/// writes, in batches sent one after another. Passes for the same resource
/// and namespace must not overlap; the reconciler does no locking of its own.
pub struct ResourceReconciler {
    name: String,
    legacy: Arc<dyn LegacyCollector>,
    remote: Arc<dyn RemoteCollector>,
    client: Arc<dyn RemoteStoreClient>,
    rules: ContentRules,
    parser: Arc<dyn NamespaceParser>,
    batch_size: usize,
}

impl ResourceReconciler {
    pub fn new(
        name: &str,
        legacy: Arc<dyn LegacyCollector>,
        remote: Arc<dyn RemoteCollector>,
        client: Arc<dyn RemoteStoreClient>,
    ) -> Self {
        Self {
            name: name.to_string(),
            legacy,
            remote,
            client,
            rules: ContentRules::default(),
            parser: Arc::new(DefaultNamespaceParser),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Requests carry at most `batch_size` tuples; valid sizes are 1..=100
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_rules(mut self, rules: ContentRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_namespace_parser(mut self, parser: Arc<dyn NamespaceParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Compute the changes a pass would make, without writing anything
    pub async fn plan(&self, namespace: &str) -> Result<ChangeSet> {
        let (changes, _) = self.collect_changes(namespace).await?;
        Ok(changes)
    }

    pub async fn reconcile(&self, namespace: &str) -> Result<ReconcileSummary> {
        self.reconcile_with_cancel(namespace, &CancellationToken::new())
            .await
    }

    /// Run a full pass. `token` is checked before every batch.
    pub async fn reconcile_with_cancel(
        &self,
        namespace: &str,
        token: &CancellationToken,
    ) -> Result<ReconcileSummary> {
        let span = info_span!("reconcile", resource = %self.name, namespace = %namespace);
        let result = self.run_pass(namespace, token).instrument(span).await;

        match &result {
            Ok(summary) if summary.is_noop() => {
                debug!(resource = %self.name, namespace, "tuples already in sync");
            }
            Ok(summary) => {
                info!(
                    resource = %self.name,
                    namespace,
                    objects = summary.objects,
                    writes = summary.writes,
                    deletes = summary.deletes,
                    batches = summary.batches,
                    "reconciled tuples"
                );
            }
            Err(err) => {
                warn!(resource = %self.name, namespace, error = %err, "reconciliation failed");
            }
        }

        result
    }

    async fn run_pass(
        &self,
        namespace: &str,
        token: &CancellationToken,
    ) -> Result<ReconcileSummary> {
        if self.batch_size == 0 || self.batch_size > DEFAULT_BATCH_SIZE {
            return Err(ReconcileError::InvalidBatchSize {
                resource: Some(self.name.clone()),
                size: self.batch_size,
            });
        }

        let (changes, objects) = self.collect_changes(namespace).await?;
        let mut summary = ReconcileSummary {
            resource: self.name.clone(),
            namespace: namespace.to_string(),
            objects,
            writes: changes.writes.len(),
            deletes: changes.deletes.len(),
            batches: 0,
        };

        if changes.is_empty() {
            return Ok(summary);
        }

        let delete_batches = self
            .flush(namespace, WritePhase::Delete, &changes.deletes, token, WriteRequest::deletes)
            .await?;
        let write_batches = self
            .flush(namespace, WritePhase::Write, &changes.writes, token, WriteRequest::writes)
            .await?;

        summary.batches = delete_batches.saturating_add(write_batches);
        Ok(summary)
    }

    async fn collect_changes(&self, namespace: &str) -> Result<(ChangeSet, usize)> {
        let info = self
            .parser
            .parse(namespace)
            .map_err(|err| err.for_resource(&self.name))?;

        let legacy = self
            .legacy
            .collect(info.org_id)
            .await
            .map_err(|cause| ReconcileError::CollectionFailed {
                collector: CollectorSource::Legacy,
                resource: self.name.clone(),
                cause,
            })?;
        debug!(objects = legacy.len(), org_id = info.org_id, "collected legacy tuples");

        let mut changes = ChangeSet::new();
        for (object, tuples) in &legacy {
            // The remote store can only enumerate tuples per object.
            let remote = self
                .remote
                .collect(object, namespace)
                .await
                .map_err(|cause| ReconcileError::CollectionFailed {
                    collector: CollectorSource::Remote,
                    resource: self.name.clone(),
                    cause,
                })?;

            diff_object(&self.rules, tuples, &remote, &mut changes);
            debug!(
                object = %object,
                legacy = tuples.len(),
                remote = remote.len(),
                pending_writes = changes.writes.len(),
                pending_deletes = changes.deletes.len(),
                "diffed object"
            );
        }

        Ok((changes, legacy.len()))
    }

    async fn flush<T: Clone>(
        &self,
        namespace: &str,
        phase: WritePhase,
        items: &[T],
        token: &CancellationToken,
        build: fn(&str, Vec<T>) -> WriteRequest,
    ) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        batch_async(items, self.batch_size, |index, chunk| {
            let request = build(namespace, chunk.to_vec());
            async move {
                if token.is_cancelled() {
                    return Err(ReconcileError::Cancelled {
                        resource: self.name.clone(),
                        phase,
                    });
                }
                debug!(phase = %phase, batch = index, size = request.len(), "sending batch");
                self.client
                    .write(request)
                    .await
                    .map_err(|cause| ReconcileError::WriteFailed {
                        resource: self.name.clone(),
                        phase,
                        batch: index,
                        cause,
                    })
            }
        })
        .await?;

        batch_count(items.len(), self.batch_size)
    }
}

/// Diff one object's legacy tuples against its remote tuples.
///
/// - legacy keys missing remotely are written
/// - keys present on both sides are left alone, unless a content rule
///   applies and the content differs: then the key is deleted and rewritten
/// - remote keys missing from the legacy side are deleted
pub fn diff_object(
    rules: &ContentRules,
    legacy: &ObjectTuples,
    remote: &ObjectTuples,
    changes: &mut ChangeSet,
) {
    for (key, tuple) in legacy {
        match remote.get(key) {
            None => {
                changes.push_write(tuple.clone());
            }
            Some(stored) if rules.requires_rewrite(tuple, stored) => {
                changes.push_delete(TupleKeyWithoutCondition::from(tuple));
                changes.push_write(tuple.clone());
            }
            Some(_) => {}
        }
    }

    for (key, stored) in remote {
        if !legacy.contains_key(key) {
            changes.push_delete(TupleKeyWithoutCondition::from(stored));
        }
    }
}

/// Diff whole groups. Objects only present remotely are not visited, as in a
/// reconciliation pass.
pub fn diff_groups(rules: &ContentRules, legacy: &TupleGroup, remote: &TupleGroup) -> ChangeSet {
    let empty = ObjectTuples::new();
    let mut changes = ChangeSet::new();
    for (object, tuples) in legacy {
        let stored = remote.get(object).unwrap_or(&empty);
        diff_object(rules, tuples, stored, &mut changes);
    }
    changes
}
