//! Scheduling layer around resource reconcilers
//!
//! A deployment registers one reconciler per resource type (folders,
//! dashboards, managed permissions, roles, ...). The runner drives them for
//! one or many namespaces and makes sure two passes for the same resource and
//! namespace never run at the same time.

use crate::{
    error::{ReconcileError, Result},
    reconciler::{ReconcileSummary, ResourceReconciler},
    settings::ReconcilerSettings,
};
use dashmap::DashMap;
use futures::{
    future::BoxFuture,
    stream::{self, StreamExt},
    FutureExt,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

type PassKey = (String, String);

/// Results of every resource reconciler for one namespace
#[derive(Debug)]
pub struct NamespaceReport {
    pub namespace: String,
    pub results: Vec<(String, Result<ReconcileSummary>)>,
}

impl NamespaceReport {
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|(_, result)| result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ReconcileError)> {
        self.results.iter().filter_map(|(resource, result)| {
            result.as_ref().err().map(|err| (resource.as_str(), err))
        })
    }

    pub fn summaries(&self) -> impl Iterator<Item = &ReconcileSummary> {
        self.results.iter().filter_map(|(_, result)| result.as_ref().ok())
    }
}

pub struct ReconcileRunner {
    reconcilers: Vec<Arc<ResourceReconciler>>,
    /// One entry per pair with a pass running or waiting; removed by the
    /// last pass to leave
    locks: DashMap<PassKey, Arc<Mutex<()>>>,
    max_concurrent_namespaces: usize,
}

impl ReconcileRunner {
    pub fn new() -> Self {
        Self {
            reconcilers: Vec::new(),
            locks: DashMap::new(),
            max_concurrent_namespaces: ReconcilerSettings::default().max_concurrent_namespaces,
        }
    }

    pub fn from_settings(settings: &ReconcilerSettings) -> Self {
        Self::new().with_max_concurrent_namespaces(settings.max_concurrent_namespaces)
    }

    /// Register a resource reconciler. Resources run in registration order.
    pub fn with_reconciler(mut self, reconciler: ResourceReconciler) -> Self {
        self.reconcilers.push(Arc::new(reconciler));
        self
    }

    pub fn with_max_concurrent_namespaces(mut self, limit: usize) -> Self {
        self.max_concurrent_namespaces = limit.max(1);
        self
    }

    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.reconcilers.iter().map(|r| r.name())
    }

    fn pass_lock(&self, key: &PassKey) -> Arc<Mutex<()>> {
        let entry = self.locks.entry(key.clone()).or_default();
        Arc::clone(&entry)
    }

    /// Drop the lock of `key` unless another pass still holds or waits on it.
    /// The map and the caller account for two references.
    fn release_lock(&self, key: &PassKey) {
        self.locks.remove_if(key, |_, lock| Arc::strong_count(lock) <= 2);
    }

    /// Reconcile one resource type for `namespace`, waiting for any pass
    /// already running for the same pair.
    pub async fn reconcile_resource(
        &self,
        reconciler: &ResourceReconciler,
        namespace: &str,
        token: &CancellationToken,
    ) -> Result<ReconcileSummary> {
        let key = (reconciler.name().to_string(), namespace.to_string());
        let lock = self.pass_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            reconciler.reconcile_with_cancel(namespace, token).await
        };
        self.release_lock(&key);
        result
    }

    /// Run every registered resource for `namespace`. A failing resource does
    /// not stop the others.
    pub async fn reconcile_namespace(
        &self,
        namespace: &str,
        token: &CancellationToken,
    ) -> NamespaceReport {
        let mut results = Vec::with_capacity(self.reconcilers.len());
        for reconciler in &self.reconcilers {
            if token.is_cancelled() {
                debug!(namespace, "cancelled, skipping remaining resources");
                break;
            }
            let result = self.reconcile_resource(reconciler, namespace, token).await;
            results.push((reconciler.name().to_string(), result));
        }

        NamespaceReport {
            namespace: namespace.to_string(),
            results,
        }
    }

    /// Reconcile several namespaces concurrently, at most
    /// `max_concurrent_namespaces` at a time. Reports keep the input order.
    pub async fn reconcile_all(
        &self,
        namespaces: &[String],
        token: &CancellationToken,
    ) -> Vec<NamespaceReport> {
        let mut passes: Vec<BoxFuture<'_, NamespaceReport>> = Vec::with_capacity(namespaces.len());
        for namespace in namespaces {
            passes.push(self.reconcile_namespace(namespace, token).boxed());
        }

        stream::iter(passes)
            .buffered(self.max_concurrent_namespaces)
            .collect()
            .await
    }

    /// Reconcile `namespaces` every `interval` until `token` is cancelled.
    /// A cancel while waiting for the next tick returns immediately.
    pub async fn run_periodic(
        &self,
        namespaces: &[String],
        interval: Duration,
        token: &CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let reports = self.reconcile_all(namespaces, token).await;
            for report in &reports {
                for (resource, err) in report.failures() {
                    error!(
                        namespace = %report.namespace,
                        resource,
                        error = %err,
                        "reconciliation pass failed"
                    );
                }
            }
            let failed = reports.iter().filter(|r| !r.is_success()).count();
            info!(namespaces = reports.len(), failed, "reconciliation round finished");
        }
        debug!("periodic reconciliation stopped");
    }
}

impl Default for ReconcileRunner {
    fn default() -> Self {
        Self::new()
    }
}
