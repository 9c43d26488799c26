//! Migration execution.
//!
//! The [`Executor`] drives pending files to completion against a target
//! database, exactly once each. Before anything runs it validates the
//! directory manifest, cross-checks applied revisions against the current
//! file hashes, and refuses to proceed over `ongoing` or `error` revisions
//! left by earlier runs. Progress is reported through the [`Logger`] event
//! stream and recorded durably through the revision store: a row is written
//! `ongoing` before the first statement executes and updated to `ok` or
//! `error` afterwards, so a crash leaves evidence behind.
//!
//! Dry runs are decorators, not flags: [`DryRunDriver`] and
//! [`DryRunRevisions`] no-op the write paths while preserving reads.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;

use drift_core::{DriftError, DriftResult};
use drift_db::changes::Change;
use drift_db::driver::{Driver, Locker, Normalizer};
use drift_db::plan::Plan;
use drift_db::row::Row;
use drift_db::schema::Realm;

use crate::dir::{Dir, MigrationFile};
use crate::revision::{ExecutionState, Revision, RevisionStore};
use crate::sum;

/// The advisory lock held for the duration of an apply.
pub const EXECUTE_LOCK_NAME: &str = "atlas_migrate_execute";

/// A progress event emitted during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// Execution is starting.
    Execution {
        /// The last applied version, if any.
        from: Option<String>,
        /// The last version in this batch.
        to: String,
        /// Every version in the batch, in order.
        versions: Vec<String>,
    },
    /// A file is about to execute.
    File {
        /// The file version.
        version: String,
        /// The file description.
        description: String,
    },
    /// A statement is about to execute.
    Stmt {
        /// The statement SQL.
        sql: String,
    },
    /// The batch finished.
    Done,
}

/// A sink for [`LogEntry`] events. Renderers (TTY, JSON) consume the same
/// stream.
pub trait Logger: Send + Sync {
    /// Receives one event.
    fn log(&self, entry: LogEntry);
}

/// A logger that drops every event.
pub struct NopLogger;

impl Logger for NopLogger {
    fn log(&self, _entry: LogEntry) {}
}

/// Applies pending migration files in order.
pub struct Executor {
    driver: Arc<dyn Driver>,
    dir: Arc<dyn Dir>,
    store: Arc<dyn RevisionStore>,
    logger: Arc<dyn Logger>,
    operator_version: String,
    skip_validate: bool,
}

impl Executor {
    /// Creates an executor over the given driver, directory, and store.
    pub fn new(driver: Arc<dyn Driver>, dir: Arc<dyn Dir>, store: Arc<dyn RevisionStore>) -> Self {
        Self {
            driver,
            dir,
            store,
            logger: Arc::new(NopLogger),
            operator_version: format!("drift/{}", env!("CARGO_PKG_VERSION")),
            skip_validate: false,
        }
    }

    /// Sets the progress logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Sets the operator identifier recorded in revision rows.
    #[must_use]
    pub fn with_operator_version(mut self, v: impl Into<String>) -> Self {
        self.operator_version = v.into();
        self
    }

    /// Skips directory validation. The `--force` escape hatch.
    #[must_use]
    pub fn skip_validate(mut self) -> Self {
        self.skip_validate = true;
        self
    }

    /// Computes the ordered pending file set.
    ///
    /// Enforces the full precondition set: manifest validation, no
    /// `ongoing` or `error` revisions, no orphan revisions, and hash
    /// equality for every applied file. Fails with
    /// [`DriftError::NoPendingFiles`] when nothing is left to do.
    pub async fn pending(&self) -> DriftResult<Vec<MigrationFile>> {
        Ok(self.pending_with_last().await?.0)
    }

    async fn pending_with_last(&self) -> DriftResult<(Vec<MigrationFile>, Option<String>)> {
        if !self.skip_validate {
            sum::validate(self.dir.as_ref())?;
        }
        let files = self.dir.files()?;
        let revisions = self.store.read_revisions().await?;
        let mut last_ok: Option<String> = None;
        for rev in &revisions {
            match rev.execution_state {
                ExecutionState::Ongoing => {
                    return Err(DriftError::RevisionOngoing(rev.version.clone()));
                }
                ExecutionState::Error => {
                    let error = rev
                        .meta
                        .get("error")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown error")
                        .to_string();
                    return Err(DriftError::PreviousError {
                        version: rev.version.clone(),
                        error,
                    });
                }
                ExecutionState::Ok => {}
            }
            let Some(file) = files.iter().find(|f| f.version == rev.version) else {
                return Err(DriftError::OrphanRevision(rev.version.clone()));
            };
            if file.hash() != rev.hash {
                return Err(DriftError::HashMismatch(file.name.clone()));
            }
            if last_ok.as_deref() < Some(rev.version.as_str()) {
                last_ok = Some(rev.version.clone());
            }
        }
        let pending: Vec<MigrationFile> = files
            .into_iter()
            .filter(|f| Some(f.version.as_str()) > last_ok.as_deref())
            .collect();
        if pending.is_empty() {
            return Err(DriftError::NoPendingFiles);
        }
        Ok((pending, last_ok))
    }

    /// Applies up to `n` pending files; zero means all of them.
    ///
    /// Requesting more files than are pending applies everything and
    /// succeeds.
    pub async fn execute_n(&self, n: usize) -> DriftResult<()> {
        let (pending, last_ok) = self.pending_with_last().await?;
        let count = if n == 0 || n > pending.len() {
            pending.len()
        } else {
            n
        };
        let batch = &pending[..count];
        match self.driver.as_locker() {
            Some(locker) => {
                locker.lock(EXECUTE_LOCK_NAME).await?;
                let result = self.execute_batch(batch, last_ok).await;
                if let Err(e) = locker.unlock(EXECUTE_LOCK_NAME).await {
                    if result.is_ok() {
                        return Err(e);
                    }
                    tracing::warn!("releasing {EXECUTE_LOCK_NAME}: {e}");
                }
                result
            }
            None => self.execute_batch(batch, last_ok).await,
        }
    }

    async fn execute_batch(
        &self,
        batch: &[MigrationFile],
        last_ok: Option<String>,
    ) -> DriftResult<()> {
        self.logger.log(LogEntry::Execution {
            from: last_ok,
            to: batch.last().map(|f| f.version.clone()).unwrap_or_default(),
            versions: batch.iter().map(|f| f.version.clone()).collect(),
        });
        for file in batch {
            self.execute_file(file).await?;
        }
        self.store.flush().await?;
        self.logger.log(LogEntry::Done);
        Ok(())
    }

    async fn execute_file(&self, file: &MigrationFile) -> DriftResult<()> {
        let statements = file.statements()?;
        let mut revision = Revision {
            version: file.version.clone(),
            description: file.description.clone(),
            execution_state: ExecutionState::Ongoing,
            executed_at: Utc::now(),
            execution_time: 0,
            hash: file.hash(),
            operator_version: self.operator_version.clone(),
            meta: serde_json::json!({}),
        };
        self.store.write_revision(&revision).await?;
        self.logger.log(LogEntry::File {
            version: file.version.clone(),
            description: file.description.clone(),
        });
        let started = Instant::now();
        for stmt in &statements {
            self.logger.log(LogEntry::Stmt {
                sql: stmt.text.clone(),
            });
            if let Err(e) = self.driver.exec(&stmt.text).await {
                revision.execution_state = ExecutionState::Error;
                revision.execution_time = elapsed_ns(started);
                revision.meta = serde_json::json!({
                    "error": e.to_string(),
                    "stmt": stmt.text,
                });
                self.store.write_revision(&revision).await?;
                self.store.flush().await?;
                return Err(e);
            }
        }
        revision.execution_state = ExecutionState::Ok;
        revision.execution_time = elapsed_ns(started);
        self.store.write_revision(&revision).await?;
        Ok(())
    }

    /// Replays the whole directory on the driver and inspects the result.
    ///
    /// This is the validate-with-replay path; it is meant for dev
    /// databases and does not touch the revision store.
    pub async fn read_state(&self) -> DriftResult<Realm> {
        for file in self.dir.files()? {
            for stmt in file.statements()? {
                self.driver.exec(&stmt.text).await?;
            }
        }
        self.driver.inspect_realm(&[]).await
    }
}

fn elapsed_ns(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_nanos()).unwrap_or(i64::MAX)
}

// ── Dry-run decorators ───────────────────────────────────────────────

/// Wraps a driver, turning every write into a no-op while preserving the
/// read paths. Locking reports unsupported, nothing runs anyway.
#[derive(Debug)]
pub struct DryRunDriver(pub Arc<dyn Driver>);

#[async_trait]
impl Driver for DryRunDriver {
    fn dialect(&self) -> &str {
        self.0.dialect()
    }

    async fn exec(&self, _sql: &str) -> DriftResult<u64> {
        Ok(0)
    }

    async fn query(&self, sql: &str) -> DriftResult<Vec<Row>> {
        self.0.query(sql).await
    }

    async fn inspect_realm(&self, schemas: &[String]) -> DriftResult<Realm> {
        self.0.inspect_realm(schemas).await
    }

    fn realm_diff(&self, from: &Realm, to: &Realm) -> Vec<Change> {
        self.0.realm_diff(from, to)
    }

    fn plan_changes(&self, name: &str, changes: &[Change]) -> DriftResult<Plan> {
        self.0.plan_changes(name, changes)
    }

    fn as_locker(&self) -> Option<&dyn Locker> {
        None
    }

    fn as_normalizer(&self) -> Option<&dyn Normalizer> {
        self.0.as_normalizer()
    }
}

/// Wraps a revision store, discarding writes while preserving reads.
pub struct DryRunRevisions(pub Arc<dyn RevisionStore>);

#[async_trait]
impl RevisionStore for DryRunRevisions {
    async fn read_revisions(&self) -> DriftResult<Vec<Revision>> {
        self.0.read_revisions().await
    }

    async fn write_revision(&self, _rev: &Revision) -> DriftResult<()> {
        Ok(())
    }

    async fn flush(&self) -> DriftResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir::testutil::{cleanup, create_temp_dir};
    use crate::dir::LocalDir;
    use crate::revision::MemRevisions;
    use drift_db::mock::MockDriver;
    use std::sync::Mutex;

    /// Collects events for assertions.
    struct MemLogger(Mutex<Vec<LogEntry>>);

    impl MemLogger {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Vec::new())))
        }

        fn entries(&self) -> Vec<LogEntry> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Logger for MemLogger {
        fn log(&self, entry: LogEntry) {
            self.0.lock().unwrap().push(entry);
        }
    }

    struct Setup {
        tmp: std::path::PathBuf,
        driver: MockDriver,
        dir: Arc<LocalDir>,
        store: Arc<MemRevisions>,
    }

    impl Setup {
        fn new() -> Self {
            let tmp = create_temp_dir();
            let dir = Arc::new(LocalDir::open(&format!("file://{}", tmp.display())).unwrap());
            Self {
                tmp,
                driver: MockDriver::new("mock"),
                dir,
                store: Arc::new(MemRevisions::new()),
            }
        }

        fn write(&self, name: &str, content: &str) {
            std::fs::write(self.tmp.join(name), content).unwrap();
            let dir = self.dir.clone();
            dir.write_sum(&dir.checksum().unwrap()).unwrap();
        }

        fn executor(&self) -> Executor {
            Executor::new(
                Arc::new(self.driver.clone()),
                self.dir.clone(),
                self.store.clone(),
            )
        }

        fn three_files(&self) {
            self.write("20230101000000_a.sql", "CREATE TABLE a (id bigint);\n");
            self.write("20230102000000_b.sql", "CREATE TABLE b (id bigint);\n");
            self.write("20230103000000_c.sql", "CREATE TABLE c (id bigint);\n");
        }
    }

    // ── pending() preconditions ─────────────────────────────────────

    #[tokio::test]
    async fn test_pending_orders_files() {
        let s = Setup::new();
        s.three_files();
        let pending = s.executor().pending().await.unwrap();
        let versions: Vec<&str> = pending.iter().map(|f| f.version.as_str()).collect();
        assert_eq!(
            versions,
            vec!["20230101000000", "20230102000000", "20230103000000"]
        );
        cleanup(&s.tmp);
    }

    #[tokio::test]
    async fn test_pending_requires_clean_directory() {
        let s = Setup::new();
        s.write("20230101000000_a.sql", "CREATE TABLE a (id bigint);\n");
        std::fs::write(
            s.tmp.join("20230101000000_a.sql"),
            "CREATE TABLE a (id int);\n",
        )
        .unwrap();
        let err = s.executor().pending().await.unwrap_err();
        assert!(matches!(err, DriftError::ChecksumMismatch));
        // --force skips the gate.
        s.executor().skip_validate().pending().await.unwrap();
        cleanup(&s.tmp);
    }

    #[tokio::test]
    async fn test_pending_rejects_ongoing_revision() {
        let s = Setup::new();
        s.three_files();
        let files = s.dir.files().unwrap();
        s.store
            .write_revision(&Revision {
                version: "20230101000000".into(),
                description: "a".into(),
                execution_state: ExecutionState::Ongoing,
                executed_at: Utc::now(),
                execution_time: 0,
                hash: files[0].hash(),
                operator_version: "t".into(),
                meta: serde_json::json!({}),
            })
            .await
            .unwrap();
        let err = s.executor().pending().await.unwrap_err();
        assert!(matches!(err, DriftError::RevisionOngoing(v) if v == "20230101000000"));
        cleanup(&s.tmp);
    }

    #[tokio::test]
    async fn test_pending_rejects_orphan_revision() {
        let s = Setup::new();
        s.three_files();
        s.store
            .write_revision(&Revision {
                version: "20220101000000".into(),
                description: "gone".into(),
                execution_state: ExecutionState::Ok,
                executed_at: Utc::now(),
                execution_time: 0,
                hash: "x".into(),
                operator_version: "t".into(),
                meta: serde_json::json!({}),
            })
            .await
            .unwrap();
        let err = s.executor().pending().await.unwrap_err();
        assert!(matches!(err, DriftError::OrphanRevision(_)));
        cleanup(&s.tmp);
    }

    // ── execute_n ───────────────────────────────────────────────────

    #[tokio::test]
    async fn test_execute_all_records_ok_revisions() {
        let s = Setup::new();
        s.three_files();
        s.executor().execute_n(0).await.unwrap();

        let revs = s.store.read_revisions().await.unwrap();
        assert_eq!(revs.len(), 3);
        assert!(revs.iter().all(|r| r.execution_state == ExecutionState::Ok));
        let versions: Vec<&str> = revs.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(
            versions,
            vec!["20230101000000", "20230102000000", "20230103000000"]
        );
        // The tables exist on the target.
        let realm = s.driver.inspect_realm(&[]).await.unwrap();
        for t in ["a", "b", "c"] {
            assert!(realm.table("main", t).is_some(), "missing table {t}");
        }
        cleanup(&s.tmp);
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let s = Setup::new();
        s.three_files();
        s.executor().execute_n(0).await.unwrap();
        let err = s.executor().execute_n(0).await.unwrap_err();
        assert!(matches!(err, DriftError::NoPendingFiles));
        assert_eq!(s.store.read_revisions().await.unwrap().len(), 3);
        cleanup(&s.tmp);
    }

    #[tokio::test]
    async fn test_execute_n_limits_batch() {
        let s = Setup::new();
        s.three_files();
        s.executor().execute_n(2).await.unwrap();
        assert_eq!(s.store.read_revisions().await.unwrap().len(), 2);
        s.executor().execute_n(0).await.unwrap();
        assert_eq!(s.store.read_revisions().await.unwrap().len(), 3);
        cleanup(&s.tmp);
    }

    #[tokio::test]
    async fn test_execute_n_beyond_pending_applies_all() {
        let s = Setup::new();
        s.three_files();
        s.executor().execute_n(99).await.unwrap();
        assert_eq!(s.store.read_revisions().await.unwrap().len(), 3);
        cleanup(&s.tmp);
    }

    #[tokio::test]
    async fn test_failure_records_error_and_blocks_retry() {
        let s = Setup::new();
        s.write("20230101000000_a.sql", "CREATE TABLE a (id bigint);\n");
        s.write("20230102000000_b.sql", "CREATE TABLEX broken;\n");
        s.write("20230103000000_c.sql", "CREATE TABLE c (id bigint);\n");

        let err = s.executor().execute_n(0).await.unwrap_err();
        assert!(matches!(err, DriftError::Sql(_)));

        let revs = s.store.read_revisions().await.unwrap();
        assert_eq!(revs.len(), 2);
        assert_eq!(revs[0].execution_state, ExecutionState::Ok);
        assert_eq!(revs[1].execution_state, ExecutionState::Error);
        assert!(revs[1].meta.get("error").is_some());

        // Retrying without resolving the error refuses to run.
        let err = s.executor().execute_n(0).await.unwrap_err();
        assert!(matches!(err, DriftError::PreviousError { version, .. } if version == "20230102000000"));
        cleanup(&s.tmp);
    }

    #[tokio::test]
    async fn test_hash_mismatch_after_apply() {
        let s = Setup::new();
        s.write("20230101000000_a.sql", "CREATE TABLE a (id bigint);\n");
        s.executor().execute_n(0).await.unwrap();

        // Edit the applied file and re-hash the manifest so only the
        // revision cross-check can catch it.
        std::fs::write(
            s.tmp.join("20230101000000_a.sql"),
            "CREATE TABLE a (id int);\n",
        )
        .unwrap();
        s.dir.write_sum(&s.dir.checksum().unwrap()).unwrap();

        let err = s.executor().execute_n(0).await.unwrap_err();
        assert!(matches!(err, DriftError::HashMismatch(f) if f == "20230101000000_a.sql"));
        cleanup(&s.tmp);
    }

    #[tokio::test]
    async fn test_logger_event_order() {
        let s = Setup::new();
        s.write(
            "20230101000000_a.sql",
            "CREATE TABLE a (id bigint);\nCREATE TABLE a2 (id bigint);\n",
        );
        let logger = MemLogger::new();
        s.executor()
            .with_logger(logger.clone())
            .execute_n(0)
            .await
            .unwrap();

        let entries = logger.entries();
        assert!(matches!(
            &entries[0],
            LogEntry::Execution { from: None, to, versions }
                if to == "20230101000000" && versions.len() == 1
        ));
        assert!(matches!(&entries[1], LogEntry::File { version, .. } if version == "20230101000000"));
        assert!(matches!(&entries[2], LogEntry::Stmt { .. }));
        assert!(matches!(&entries[3], LogEntry::Stmt { .. }));
        assert_eq!(entries[4], LogEntry::Done);
        cleanup(&s.tmp);
    }

    #[tokio::test]
    async fn test_execute_holds_advisory_lock() {
        let s = Setup::new();
        s.three_files();
        // Somebody else holds the lock.
        s.driver
            .as_locker()
            .unwrap()
            .lock(EXECUTE_LOCK_NAME)
            .await
            .unwrap();
        let err = s.executor().execute_n(0).await.unwrap_err();
        assert!(matches!(err, DriftError::Locked(_)));

        s.driver
            .as_locker()
            .unwrap()
            .unlock(EXECUTE_LOCK_NAME)
            .await
            .unwrap();
        s.executor().execute_n(0).await.unwrap();
        cleanup(&s.tmp);
    }

    // ── read_state ──────────────────────────────────────────────────

    #[tokio::test]
    async fn test_read_state_replays_directory() {
        let s = Setup::new();
        s.three_files();
        let realm = s.executor().read_state().await.unwrap();
        assert!(realm.table("main", "a").is_some());
        assert!(realm.table("main", "c").is_some());
        // Nothing was recorded.
        assert!(s.store.read_revisions().await.unwrap().is_empty());
        cleanup(&s.tmp);
    }

    // ── dry-run decorators ──────────────────────────────────────────

    #[tokio::test]
    async fn test_dry_run_executes_nothing() {
        let s = Setup::new();
        s.three_files();
        let executor = Executor::new(
            Arc::new(DryRunDriver(Arc::new(s.driver.clone()))),
            s.dir.clone(),
            Arc::new(DryRunRevisions(s.store.clone())),
        );
        executor.execute_n(0).await.unwrap();
        // No SQL ran, no revisions were stored.
        assert!(s.driver.executed().is_empty());
        assert!(s.store.read_revisions().await.unwrap().is_empty());
        // The real run still sees everything pending.
        assert_eq!(s.executor().pending().await.unwrap().len(), 3);
        cleanup(&s.tmp);
    }
}
