use crate::snapshot;
use anyhow::{bail, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tuple_reconciler::repository::{InMemoryLegacySource, InMemoryTupleStore};
use tuple_reconciler::{
    flatten_group, ChangeSet, NamespaceInfo, ReconcileRunner, ReconcileSummary,
    ReconcilerSettings, ResourceReconciler,
};

/// Inputs shared by `plan` and `apply`
#[derive(Args, Debug, Clone)]
pub struct SnapshotArgs {
    /// Legacy snapshot (JSON array of tuples)
    #[arg(long)]
    pub legacy: PathBuf,

    /// Remote snapshot (JSON array of tuples)
    #[arg(long)]
    pub remote: PathBuf,

    /// Tenant namespace, e.g. default, org-2, stacks-10
    #[arg(short, long, default_value = "default")]
    pub namespace: String,

    /// Resource type name used in logs and errors
    #[arg(short, long, default_value = "folder")]
    pub resource: String,
}

/// Inputs of `run`: one snapshot file per tenant
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Directory of legacy snapshots, one `<org_id>.json` per organization
    #[arg(long)]
    pub legacy_dir: PathBuf,

    /// Directory of remote snapshots, one `<namespace>.json` per namespace.
    /// Reconciled snapshots are written back here.
    #[arg(long)]
    pub remote_dir: PathBuf,

    /// Resource type name used in logs and errors
    #[arg(short, long, default_value = "folder")]
    pub resource: String,

    /// Run a single round instead of one every `interval_secs`
    #[arg(long)]
    pub once: bool,
}

struct Workspace {
    reconciler: ResourceReconciler,
    store: Arc<InMemoryTupleStore>,
}

fn load_workspace(args: &SnapshotArgs, batch_size: usize) -> Result<Workspace> {
    let info = NamespaceInfo::parse(&args.namespace)?;
    let legacy = Arc::new(
        InMemoryLegacySource::new().with_snapshot(info.org_id, snapshot::load(&args.legacy)?),
    );
    let remote = snapshot::load(&args.remote)?;
    let store = Arc::new(
        InMemoryTupleStore::new().with_tuples(&args.namespace, flatten_group(&remote)),
    );

    let reconciler = ResourceReconciler::new(&args.resource, legacy, store.clone(), store.clone())
        .with_batch_size(batch_size);
    Ok(Workspace { reconciler, store })
}

pub async fn plan(args: &SnapshotArgs, batch_size: usize) -> Result<ChangeSet> {
    let workspace = load_workspace(args, batch_size)?;
    let changes = workspace.reconciler.plan(&args.namespace).await?;
    info!(
        writes = changes.writes.len(),
        deletes = changes.deletes.len(),
        "planned reconciliation"
    );
    Ok(changes)
}

/// Reconcile the remote snapshot in memory and optionally save the result
pub async fn apply(
    args: &SnapshotArgs,
    batch_size: usize,
    output: Option<&Path>,
) -> Result<ReconcileSummary> {
    let workspace = load_workspace(args, batch_size)?;
    let summary = workspace.reconciler.reconcile(&args.namespace).await?;

    if let Some(output) = output {
        snapshot::save(output, &workspace.store.snapshot(&args.namespace))?;
        info!(path = %output.display(), "wrote reconciled remote snapshot");
    }
    Ok(summary)
}

fn remote_path(args: &RunArgs, namespace: &str) -> PathBuf {
    args.remote_dir.join(format!("{namespace}.json"))
}

/// Reconcile every configured namespace, once or until `token` is cancelled,
/// then write the remote snapshots back
pub async fn run(
    args: &RunArgs,
    settings: &ReconcilerSettings,
    token: &CancellationToken,
) -> Result<()> {
    let mut legacy = InMemoryLegacySource::new();
    let store = InMemoryTupleStore::new();
    for namespace in &settings.namespaces {
        let info = NamespaceInfo::parse(namespace)?;
        let legacy_path = args.legacy_dir.join(format!("{}.json", info.org_id));
        legacy = legacy.with_snapshot(info.org_id, snapshot::load(&legacy_path)?);

        let remote_file = remote_path(args, namespace);
        if remote_file.exists() {
            for tuple in flatten_group(&snapshot::load(&remote_file)?) {
                store.insert(namespace, tuple);
            }
        }
    }

    let store = Arc::new(store);
    let runner = ReconcileRunner::from_settings(settings).with_reconciler(
        ResourceReconciler::new(&args.resource, Arc::new(legacy), store.clone(), store.clone())
            .with_batch_size(settings.batch_size),
    );

    let failed = if args.once {
        let reports = runner.reconcile_all(&settings.namespaces, token).await;
        for report in &reports {
            for (resource, err) in report.failures() {
                error!(
                    namespace = %report.namespace,
                    resource,
                    error = %err,
                    "reconciliation failed"
                );
            }
        }
        reports.iter().filter(|r| !r.is_success()).count()
    } else {
        info!(
            namespaces = settings.namespaces.len(),
            interval_secs = settings.interval_secs,
            "starting periodic reconciliation"
        );
        runner
            .run_periodic(&settings.namespaces, settings.interval(), token)
            .await;
        0
    };

    for namespace in &settings.namespaces {
        snapshot::save(&remote_path(args, namespace), &store.snapshot(namespace))?;
    }
    if failed > 0 {
        bail!("{failed} namespace(s) failed to reconcile");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_fixture(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    fn fixture_args(dir: &Path) -> SnapshotArgs {
        SnapshotArgs {
            legacy: write_fixture(
                dir,
                "legacy.json",
                r#"[{"user": "user:1", "relation": "view", "object": "folder:a"}]"#,
            ),
            remote: write_fixture(
                dir,
                "remote.json",
                r#"[{"user": "user:2", "relation": "edit", "object": "folder:a"}]"#,
            ),
            namespace: "org-3".to_string(),
            resource: "folder".to_string(),
        }
    }

    #[tokio::test]
    async fn test_plan_reports_changes() {
        let dir = tempfile::tempdir().unwrap();
        let changes = plan(&fixture_args(dir.path()), 100).await.unwrap();

        assert_eq!(changes.writes.len(), 1);
        assert_eq!(changes.deletes.len(), 1);
    }

    #[tokio::test]
    async fn test_apply_writes_converged_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let args = fixture_args(dir.path());
        let output = dir.path().join("out.json");

        let summary = apply(&args, 100, Some(&output)).await.unwrap();
        assert_eq!(summary.batches, 2);

        let converged = snapshot::load(&output).unwrap();
        assert_eq!(converged, snapshot::load(&args.legacy).unwrap());
    }

    fn run_fixture(dir: &Path) -> (RunArgs, ReconcilerSettings) {
        let legacy_dir = dir.join("legacy");
        let remote_dir = dir.join("remote");
        fs::create_dir_all(&legacy_dir).unwrap();
        fs::create_dir_all(&remote_dir).unwrap();
        write_fixture(
            &legacy_dir,
            "1.json",
            r#"[{"user": "user:1", "relation": "view", "object": "folder:a"}]"#,
        );
        write_fixture(
            &legacy_dir,
            "2.json",
            r#"[{"user": "user:9", "relation": "admin", "object": "folder:b"}]"#,
        );
        write_fixture(
            &remote_dir,
            "org-2.json",
            r#"[{"user": "user:3", "relation": "edit", "object": "folder:b"}]"#,
        );

        let args = RunArgs {
            legacy_dir,
            remote_dir,
            resource: "folder".to_string(),
            once: true,
        };
        let settings = ReconcilerSettings {
            namespaces: vec!["default".to_string(), "org-2".to_string()],
            ..ReconcilerSettings::default()
        };
        (args, settings)
    }

    #[tokio::test]
    async fn test_run_once_reconciles_every_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let (args, settings) = run_fixture(dir.path());

        run(&args, &settings, &CancellationToken::new()).await.unwrap();

        let default = snapshot::load(&args.remote_dir.join("default.json")).unwrap();
        assert_eq!(default, snapshot::load(&args.legacy_dir.join("1.json")).unwrap());
        let org2 = snapshot::load(&args.remote_dir.join("org-2.json")).unwrap();
        assert_eq!(org2, snapshot::load(&args.legacy_dir.join("2.json")).unwrap());
    }

    #[tokio::test]
    async fn test_periodic_run_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let (mut args, settings) = run_fixture(dir.path());
        args.once = false;
        let token = CancellationToken::new();

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                token.cancel();
            })
        };
        tokio::time::timeout(std::time::Duration::from_secs(1), run(&args, &settings, &token))
            .await
            .unwrap()
            .unwrap();
        canceller.await.unwrap();

        let org2 = snapshot::load(&args.remote_dir.join("org-2.json")).unwrap();
        assert_eq!(org2, snapshot::load(&args.legacy_dir.join("2.json")).unwrap());
    }

    #[tokio::test]
    async fn test_run_requires_legacy_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let (args, mut settings) = run_fixture(dir.path());
        settings.namespaces.push("org-5".to_string());

        let err = run(&args, &settings, &CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("failed to read snapshot"));
    }

    #[tokio::test]
    async fn test_invalid_namespace_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = fixture_args(dir.path());
        args.namespace = "org-abc".to_string();

        assert!(plan(&args, 100).await.is_err());
    }
}
