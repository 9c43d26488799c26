//! Integration tests for the plan-and-apply pipeline.
//!
//! These tests run the real planner and executor against a mock dev/target
//! database and a migration directory on disk, verifying that:
//! - A fresh diff produces a migration file and updates the manifest
//! - Re-running diff immediately afterwards plans nothing
//! - Apply is idempotent and records ordered revisions
//! - Edited files are caught by the manifest gate and the hash cross-check
//! - A failing file leaves an `error` revision and blocks further applies

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use drift_core::DriftError;
use drift_db::mock::{MockDriver, DEFAULT_SCHEMA};
use drift_db::schema::{Column, Realm, Schema, Table};
use drift_db::state::RealmReader;
use drift_db::Driver;
use drift_migrate::dir::{Dir, LocalDir};
use drift_migrate::executor::Executor;
use drift_migrate::planner::Planner;
use drift_migrate::revision::{ExecutionState, MemRevisions};
use drift_migrate::sum::validate;
use drift_migrate::RevisionStore;

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn create_temp_dir() -> PathBuf {
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!("drift_e2e_{}_{}", std::process::id(), id));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn cleanup(dir: &Path) {
    let _ = std::fs::remove_dir_all(dir);
}

fn open(tmp: &Path) -> Arc<LocalDir> {
    Arc::new(LocalDir::open(&format!("file://{}", tmp.display())).unwrap())
}

/// Writes a migration file and refreshes the manifest, as `migrate new`
/// followed by an edit and `migrate hash` would.
fn add_file(dir: &LocalDir, name: &str, content: &str) {
    dir.write(name, content.as_bytes()).unwrap();
    dir.write_sum(&dir.checksum().unwrap()).unwrap();
}

fn users_realm() -> Realm {
    Realm::new().with_schema(
        Schema::new(DEFAULT_SCHEMA).with_table(
            Table::new(DEFAULT_SCHEMA, "users")
                .with_column(Column::new("id", "int"))
                .with_primary_key(vec!["id".into()]),
        ),
    )
}

// ── 1. Fresh diff ───────────────────────────────────────────────────

#[tokio::test]
async fn test_fresh_diff_writes_file_and_manifest() {
    let tmp = create_temp_dir();
    let dir = open(&tmp);
    let dev = Arc::new(MockDriver::new("mock"));
    let planner = Planner::new(dev.clone(), dir.clone());
    let desired = RealmReader::new(users_realm());

    let mut plan = planner.plan("init", &desired).await.unwrap();
    plan.version = Some("20230101000000".to_string());
    planner.write_plan(&plan).unwrap();

    let files = dir.files().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "20230101000000_init.sql");
    let content = String::from_utf8(files[0].bytes.clone()).unwrap();
    assert!(content.contains("CREATE TABLE main.users"));
    validate(dir.as_ref()).unwrap();

    // The directory is now synced with the desired state.
    let err = planner.plan("init", &desired).await.unwrap_err();
    assert!(matches!(err, DriftError::NoPlan));
    cleanup(&tmp);
}

// ── 2. Idempotent apply ─────────────────────────────────────────────

#[tokio::test]
async fn test_apply_is_idempotent() {
    let tmp = create_temp_dir();
    let dir = open(&tmp);
    add_file(&dir, "20230101000000_a.sql", "CREATE TABLE a (id bigint);\n");
    add_file(&dir, "20230102000000_b.sql", "CREATE TABLE b (id bigint);\n");
    add_file(&dir, "20230103000000_c.sql", "CREATE TABLE c (id bigint);\n");

    let target = MockDriver::new("mock");
    let store = Arc::new(MemRevisions::new());
    let executor = Executor::new(Arc::new(target.clone()), dir.clone(), store.clone());
    executor.execute_n(0).await.unwrap();

    let revisions = store.read_revisions().await.unwrap();
    assert_eq!(revisions.len(), 3);
    assert!(revisions
        .iter()
        .all(|r| r.execution_state == ExecutionState::Ok));
    let versions: Vec<&str> = revisions.iter().map(|r| r.version.as_str()).collect();
    assert_eq!(
        versions,
        vec!["20230101000000", "20230102000000", "20230103000000"]
    );

    // Second run has nothing to do and changes nothing.
    let executor = Executor::new(Arc::new(target), dir, store.clone());
    let err = executor.execute_n(0).await.unwrap_err();
    assert!(matches!(err, DriftError::NoPendingFiles));
    assert_eq!(store.read_revisions().await.unwrap().len(), 3);
    cleanup(&tmp);
}

// ── 3. Hash-mismatch guard ──────────────────────────────────────────

#[tokio::test]
async fn test_edited_file_is_rejected() {
    let tmp = create_temp_dir();
    let dir = open(&tmp);
    add_file(&dir, "20230101000000_a.sql", "CREATE TABLE a (id bigint);\n");

    let target = MockDriver::new("mock");
    let store = Arc::new(MemRevisions::new());
    Executor::new(Arc::new(target.clone()), dir.clone(), store.clone())
        .execute_n(0)
        .await
        .unwrap();

    // Edit the applied file without re-hashing.
    std::fs::write(
        tmp.join("20230101000000_a.sql"),
        "CREATE TABLE a (id int);\n",
    )
    .unwrap();

    // validate sees the stale manifest.
    assert!(matches!(
        validate(dir.as_ref()).unwrap_err(),
        DriftError::ChecksumMismatch
    ));
    // A gated apply fails the same way.
    let executor = Executor::new(Arc::new(target.clone()), dir.clone(), store.clone());
    assert!(matches!(
        executor.execute_n(0).await.unwrap_err(),
        DriftError::ChecksumMismatch
    ));
    // Even a forced apply is stopped by the revision hash cross-check.
    let executor = Executor::new(Arc::new(target), dir, store).skip_validate();
    assert!(matches!(
        executor.execute_n(0).await.unwrap_err(),
        DriftError::HashMismatch(f) if f == "20230101000000_a.sql"
    ));
    cleanup(&tmp);
}

// ── 6. Apply failure and recovery ───────────────────────────────────

#[tokio::test]
async fn test_failure_mid_batch_and_blocked_retry() {
    let tmp = create_temp_dir();
    let dir = open(&tmp);
    add_file(&dir, "20230101000000_a.sql", "CREATE TABLE a (id bigint);\n");
    add_file(&dir, "20230102000000_b.sql", "CREATE TABLEX broken;\n");
    add_file(&dir, "20230103000000_c.sql", "CREATE TABLE c (id bigint);\n");

    let target = MockDriver::new("mock");
    let store = Arc::new(MemRevisions::new());
    let err = Executor::new(Arc::new(target.clone()), dir.clone(), store.clone())
        .execute_n(0)
        .await
        .unwrap_err();
    assert!(matches!(err, DriftError::Sql(_)));

    let revisions = store.read_revisions().await.unwrap();
    assert_eq!(revisions.len(), 2);
    assert_eq!(revisions[0].execution_state, ExecutionState::Ok);
    assert_eq!(revisions[1].execution_state, ExecutionState::Error);
    assert!(revisions[1].execution_time > 0);

    // The third file never ran.
    let realm = target.inspect_realm(&[]).await.unwrap();
    assert!(realm.table(DEFAULT_SCHEMA, "a").is_some());
    assert!(realm.table(DEFAULT_SCHEMA, "c").is_none());

    // Retrying without changing anything is refused.
    let err = Executor::new(Arc::new(target), dir, store)
        .execute_n(0)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DriftError::PreviousError { version, .. } if version == "20230102000000"
    ));
    cleanup(&tmp);
}

// ── Full cycle: plan, apply, plan again ─────────────────────────────

#[tokio::test]
async fn test_plan_apply_cycle() {
    let tmp = create_temp_dir();
    let dir = open(&tmp);
    let dev = Arc::new(MockDriver::new("mock"));

    // Plan the initial state.
    let planner = Planner::new(dev.clone(), dir.clone());
    let desired = RealmReader::new(users_realm());
    let mut plan = planner.plan("init", &desired).await.unwrap();
    plan.version = Some("20230101000000".to_string());
    planner.write_plan(&plan).unwrap();

    // Apply it to a fresh target.
    let target = MockDriver::new("mock");
    let store = Arc::new(MemRevisions::new());
    Executor::new(Arc::new(target.clone()), dir.clone(), store)
        .execute_n(0)
        .await
        .unwrap();
    let realm = target.inspect_realm(&[]).await.unwrap();
    let users = realm.table(DEFAULT_SCHEMA, "users").unwrap();
    assert_eq!(users.primary_key, vec!["id".to_string()]);

    // Extend the desired state and plan the increment.
    let mut extended = users_realm();
    extended
        .schema_mut(DEFAULT_SCHEMA)
        .unwrap()
        .table_mut("users")
        .unwrap()
        .columns
        .push(Column::new("email", "varchar(255)").nullable());
    let desired = RealmReader::new(extended);
    let mut plan = planner.plan("add_email", &desired).await.unwrap();
    plan.version = Some("20230102000000".to_string());
    assert_eq!(plan.changes.len(), 1);
    assert!(plan.changes[0].cmd.contains("ADD COLUMN email"));
    planner.write_plan(&plan).unwrap();
    assert_eq!(dir.files().unwrap().len(), 2);
    validate(dir.as_ref()).unwrap();
    cleanup(&tmp);
}
