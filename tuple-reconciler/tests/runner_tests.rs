//! Runner tests: several resource types, several tenants, and pass
//! serialization per `(resource, namespace)`

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tuple_reconciler::repository::{InMemoryLegacySource, InMemoryTupleStore};
use tuple_reconciler::*;

fn tenants_source() -> Arc<InMemoryLegacySource> {
    Arc::new(
        InMemoryLegacySource::new()
            .with_snapshot(1, group_tuples(vec![Tuple::new("user:1", "view", "folder:general")]))
            .with_snapshot(2, group_tuples(vec![Tuple::new("user:7", "admin", "folder:ops")])),
    )
}

#[tokio::test]
async fn test_namespaces_are_isolated() {
    let legacy = tenants_source();
    let store = Arc::new(InMemoryTupleStore::new());
    let runner = ReconcileRunner::new().with_reconciler(ResourceReconciler::new(
        "folder",
        legacy,
        store.clone(),
        store.clone(),
    ));

    let namespaces = vec!["default".to_string(), "org-2".to_string()];
    let reports = runner.reconcile_all(&namespaces, &CancellationToken::new()).await;

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.is_success()));
    assert_eq!(reports[0].namespace, "default");
    assert_eq!(
        flatten_group(&store.snapshot("default")),
        vec![Tuple::new("user:1", "view", "folder:general")]
    );
    assert_eq!(
        flatten_group(&store.snapshot("org-2")),
        vec![Tuple::new("user:7", "admin", "folder:ops")]
    );
}

#[tokio::test]
async fn test_failing_resource_does_not_stop_others() {
    let healthy = tenants_source();
    let broken = Arc::new(InMemoryLegacySource::new());
    broken.fail_with("permission table missing");
    let store = Arc::new(InMemoryTupleStore::new());

    let runner = ReconcileRunner::new()
        .with_reconciler(ResourceReconciler::new("dashboard", broken, store.clone(), store.clone()))
        .with_reconciler(ResourceReconciler::new("folder", healthy, store.clone(), store.clone()));
    assert_eq!(runner.resources().collect::<Vec<_>>(), vec!["dashboard", "folder"]);

    let report = runner.reconcile_namespace("default", &CancellationToken::new()).await;

    assert!(!report.is_success());
    let failures: Vec<&str> = report.failures().map(|(resource, _)| resource).collect();
    assert_eq!(failures, vec!["dashboard"]);
    assert_eq!(report.summaries().count(), 1);
    assert_eq!(store.snapshot("default").len(), 1);
}

/// Legacy collector that records how many passes overlap
struct OverlapProbe {
    active: AtomicUsize,
    max_active: AtomicUsize,
}

#[async_trait]
impl LegacyCollector for OverlapProbe {
    async fn collect(&self, _org_id: i64) -> anyhow::Result<TupleGroup> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(TupleGroup::new())
    }
}

#[tokio::test]
async fn test_passes_for_same_resource_and_namespace_are_serialized() {
    let probe = Arc::new(OverlapProbe {
        active: AtomicUsize::new(0),
        max_active: AtomicUsize::new(0),
    });
    let store = Arc::new(InMemoryTupleStore::new());
    let runner = ReconcileRunner::new().with_reconciler(ResourceReconciler::new(
        "folder",
        probe.clone(),
        store.clone(),
        store.clone(),
    ));
    let token = CancellationToken::new();

    let (a, b) = tokio::join!(
        runner.reconcile_namespace("default", &token),
        runner.reconcile_namespace("default", &token)
    );
    assert!(a.is_success() && b.is_success());
    assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);

    probe.max_active.store(0, Ordering::SeqCst);
    let (a, b) = tokio::join!(
        runner.reconcile_namespace("default", &token),
        runner.reconcile_namespace("org-2", &token)
    );
    assert!(a.is_success() && b.is_success());
    assert_eq!(probe.max_active.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cancelled_runner_skips_resources() {
    let store = Arc::new(InMemoryTupleStore::new());
    let runner = ReconcileRunner::new().with_reconciler(ResourceReconciler::new(
        "folder",
        tenants_source(),
        store.clone(),
        store.clone(),
    ));
    let token = CancellationToken::new();
    token.cancel();

    let report = runner.reconcile_namespace("default", &token).await;
    assert!(report.results.is_empty());

    // Already cancelled: returns without running a round.
    runner
        .run_periodic(&["default".to_string()], Duration::from_millis(5), &token)
        .await;
    assert_eq!(store.read_count(), 0);
}

#[tokio::test]
async fn test_periodic_run_until_cancelled() {
    let legacy = tenants_source();
    let store = Arc::new(InMemoryTupleStore::new());
    let runner = Arc::new(
        ReconcileRunner::from_settings(&ReconcilerSettings::default()).with_reconciler(
            ResourceReconciler::new("folder", legacy.clone(), store.clone(), store.clone()),
        ),
    );
    let token = CancellationToken::new();

    let handle = {
        let runner = runner.clone();
        let token = token.clone();
        tokio::spawn(async move {
            runner
                .run_periodic(&["default".to_string()], Duration::from_millis(10), &token)
                .await;
        })
    };

    tokio::time::sleep(Duration::from_millis(60)).await;
    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();

    assert!(legacy.call_count() >= 2);
    // Only the first round had anything to write.
    assert_eq!(store.request_count(), 1);
}

#[tokio::test]
async fn test_cancel_interrupts_wait_for_next_round() {
    let legacy = tenants_source();
    let store = Arc::new(InMemoryTupleStore::new());
    let runner = Arc::new(ReconcileRunner::new().with_reconciler(ResourceReconciler::new(
        "folder",
        legacy.clone(),
        store.clone(),
        store.clone(),
    )));
    let token = CancellationToken::new();

    let handle = {
        let runner = runner.clone();
        let token = token.clone();
        let namespaces = vec!["default".to_string(), "org-2".to_string()];
        tokio::spawn(async move {
            runner
                .run_periodic(&namespaces, Duration::from_secs(300), &token)
                .await;
        })
    };

    // The first round runs right away, the second would wait five minutes.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let cancelled_at = std::time::Instant::now();
    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();

    assert!(cancelled_at.elapsed() < Duration::from_millis(500));
    assert_eq!(legacy.call_count(), 2);
    assert_eq!(store.request_count(), 2);
}

#[tokio::test]
async fn test_reconcile_all_runs_on_spawned_task() {
    let store = Arc::new(InMemoryTupleStore::new());
    let runner = Arc::new(
        ReconcileRunner::new()
            .with_max_concurrent_namespaces(2)
            .with_reconciler(ResourceReconciler::new(
                "folder",
                tenants_source(),
                store.clone(),
                store.clone(),
            )),
    );

    let reports = tokio::spawn({
        let runner = runner.clone();
        async move {
            let namespaces: Vec<String> =
                ["org-2", "default", "stacks-9"].iter().map(ToString::to_string).collect();
            runner.reconcile_all(&namespaces, &CancellationToken::new()).await
        }
    })
    .await
    .unwrap();

    let order: Vec<&str> = reports.iter().map(|r| r.namespace.as_str()).collect();
    assert_eq!(order, vec!["org-2", "default", "stacks-9"]);
    assert!(reports.iter().all(NamespaceReport::is_success));
    assert_eq!(store.snapshot("stacks-9").len(), 1);
}
