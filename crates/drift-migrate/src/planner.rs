//! Migration planning.
//!
//! The [`Planner`] produces a new migration file that advances the
//! directory state to match a desired realm. The directory is replayed on
//! a disposable dev database to materialize the current state; the dev
//! database is the only thing the planner mutates, and the mutation is
//! scoped by the `atlas_migrate_diff` advisory lock when the driver
//! supports locking.

use std::sync::Arc;

use drift_core::{DriftError, DriftResult};
use drift_db::driver::Driver;
use drift_db::plan::Plan;
use drift_db::schema::Realm;
use drift_db::state::StateReader;

use crate::dir::Dir;
use crate::format::{AtlasFormatter, Formatter};

/// The advisory lock held while the dev database is in use.
pub const DIFF_LOCK_NAME: &str = "atlas_migrate_diff";

/// Plans new migration files from a desired state.
pub struct Planner {
    dev: Arc<dyn Driver>,
    dir: Arc<dyn Dir>,
    formatter: Arc<dyn Formatter>,
}

impl Planner {
    /// Creates a planner with the default (atlas) formatter.
    pub fn new(dev: Arc<dyn Driver>, dir: Arc<dyn Dir>) -> Self {
        Self {
            dev,
            dir,
            formatter: Arc::new(AtlasFormatter),
        }
    }

    /// Sets the output formatter.
    #[must_use]
    pub fn with_formatter(mut self, formatter: Arc<dyn Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Computes the plan that moves the directory state to the desired
    /// state.
    ///
    /// Returns [`DriftError::NoPlan`] when the two states already match,
    /// and [`DriftError::DialectMismatch`] when the desired state comes
    /// from a database of a different dialect.
    pub async fn plan(&self, name: &str, desired: &dyn StateReader) -> DriftResult<Plan> {
        match self.dev.as_locker() {
            Some(locker) => {
                locker.lock(DIFF_LOCK_NAME).await?;
                let result = self.plan_inner(name, desired).await;
                if let Err(e) = locker.unlock(DIFF_LOCK_NAME).await {
                    if result.is_ok() {
                        return Err(e);
                    }
                    tracing::warn!("releasing {DIFF_LOCK_NAME}: {e}");
                }
                result
            }
            None => self.plan_inner(name, desired).await,
        }
    }

    async fn plan_inner(&self, name: &str, desired: &dyn StateReader) -> DriftResult<Plan> {
        reset_dev(self.dev.as_ref()).await?;
        self.replay().await?;
        let current = self.dev.inspect_realm(&[]).await?;
        if let Some(dialect) = desired.dialect() {
            if dialect != self.dev.dialect() {
                return Err(DriftError::DialectMismatch {
                    expected: self.dev.dialect().to_string(),
                    found: dialect.to_string(),
                });
            }
        }
        let mut want = desired.read_state().await?;
        if let Some(normalizer) = self.dev.as_normalizer() {
            want = normalizer.normalize_realm(want).await?;
        }
        let changes = self.dev.realm_diff(&current, &want);
        if changes.is_empty() {
            return Err(DriftError::NoPlan);
        }
        self.dev.plan_changes(name, &changes)
    }

    /// Replays every directory file on the dev database, one transaction
    /// per file.
    async fn replay(&self) -> DriftResult<()> {
        for file in self.dir.files()? {
            let statements = file.statements()?;
            self.dev.exec("BEGIN").await?;
            for stmt in &statements {
                if let Err(e) = self.dev.exec(&stmt.text).await {
                    let _ = self.dev.exec("ROLLBACK").await;
                    return Err(e);
                }
            }
            self.dev.exec("COMMIT").await?;
        }
        Ok(())
    }

    /// Writes a plan to the directory and refreshes the manifest.
    pub fn write_plan(&self, plan: &Plan) -> DriftResult<()> {
        write_plan_files(self.dir.as_ref(), self.formatter.as_ref(), plan)
    }
}

/// Serializes a plan through a formatter, writes every produced file, and
/// rewrites the integrity manifest.
pub fn write_plan_files(dir: &dyn Dir, formatter: &dyn Formatter, plan: &Plan) -> DriftResult<()> {
    for file in formatter.format(plan)? {
        dir.write(&file.name, &file.bytes)?;
    }
    let sum = dir.checksum()?;
    dir.write_sum(&sum)
}

/// Brings a dev realm back to empty through the driver's own
/// diff-and-plan pipeline.
pub async fn reset_dev(dev: &dyn Driver) -> DriftResult<()> {
    let current = dev.inspect_realm(&[]).await?;
    if current.is_empty() {
        return Ok(());
    }
    let changes = dev.realm_diff(&current, &Realm::new());
    let plan = dev.plan_changes("reset", &changes)?;
    for change in &plan.changes {
        dev.exec(&change.cmd).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir::testutil::{cleanup, create_temp_dir};
    use crate::dir::LocalDir;
    use crate::sum::validate;
    use drift_db::mock::{MockDriver, DEFAULT_SCHEMA};
    use drift_db::schema::{Column, Schema, Table};
    use drift_db::state::{ConnReader, RealmReader};

    fn desired_users() -> Realm {
        Realm::new().with_schema(
            Schema::new(DEFAULT_SCHEMA).with_table(
                Table::new(DEFAULT_SCHEMA, "users")
                    .with_column(Column::new("id", "bigint"))
                    .with_primary_key(vec!["id".into()]),
            ),
        )
    }

    struct Setup {
        tmp: std::path::PathBuf,
        dev: MockDriver,
        dir: Arc<LocalDir>,
    }

    impl Setup {
        fn new() -> Self {
            let tmp = create_temp_dir();
            let dir = Arc::new(LocalDir::open(&format!("file://{}", tmp.display())).unwrap());
            Self {
                tmp,
                dev: MockDriver::new("mock"),
                dir,
            }
        }

        fn planner(&self) -> Planner {
            Planner::new(Arc::new(self.dev.clone()), self.dir.clone())
        }
    }

    // ── plan ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_fresh_diff_produces_plan() {
        let s = Setup::new();
        let reader = RealmReader::new(desired_users());
        let plan = s.planner().plan("init", &reader).await.unwrap();
        assert!(!plan.changes.is_empty());
        assert!(plan
            .changes
            .iter()
            .any(|c| c.cmd.contains("CREATE TABLE main.users")));
        cleanup(&s.tmp);
    }

    #[tokio::test]
    async fn test_diff_after_write_returns_no_plan() {
        let s = Setup::new();
        let reader = RealmReader::new(desired_users());
        let mut plan = s.planner().plan("init", &reader).await.unwrap();
        plan.version = Some("20230101000000".to_string());
        s.planner().write_plan(&plan).unwrap();
        let err = s.planner().plan("init", &reader).await.unwrap_err();
        assert!(matches!(err, DriftError::NoPlan));
        // The manifest is valid after the write.
        validate(s.dir.as_ref()).unwrap();
        cleanup(&s.tmp);
    }

    #[tokio::test]
    async fn test_planner_only_mutates_dev() {
        let s = Setup::new();
        let reader = RealmReader::new(desired_users());
        let plan = s.planner().plan("init", &reader).await.unwrap();
        assert!(!plan.changes.is_empty());
        // No file was written without an explicit write_plan call.
        assert!(s.dir.files().unwrap().is_empty());
        cleanup(&s.tmp);
    }

    #[tokio::test]
    async fn test_plan_releases_lock_on_no_plan() {
        let s = Setup::new();
        let reader = RealmReader::new(Realm::new());
        let err = s.planner().plan("noop", &reader).await.unwrap_err();
        assert!(matches!(err, DriftError::NoPlan));
        // The lock was released on the error path.
        s.dev
            .as_locker()
            .unwrap()
            .lock(DIFF_LOCK_NAME)
            .await
            .unwrap();
        cleanup(&s.tmp);
    }

    #[tokio::test]
    async fn test_plan_lock_conflict() {
        let s = Setup::new();
        s.dev
            .as_locker()
            .unwrap()
            .lock(DIFF_LOCK_NAME)
            .await
            .unwrap();
        let reader = RealmReader::new(desired_users());
        let err = s.planner().plan("init", &reader).await.unwrap_err();
        assert!(matches!(err, DriftError::Locked(_)));
        cleanup(&s.tmp);
    }

    #[tokio::test]
    async fn test_dialect_mismatch() {
        let s = Setup::new();
        let other = Arc::new(MockDriver::new("postgres"));
        let reader = ConnReader::new(other, vec![]);
        let err = s.planner().plan("init", &reader).await.unwrap_err();
        assert!(matches!(
            err,
            DriftError::DialectMismatch { expected, found }
                if expected == "mock" && found == "postgres"
        ));
        cleanup(&s.tmp);
    }

    #[tokio::test]
    async fn test_replay_materializes_directory_state() {
        let s = Setup::new();
        std::fs::write(
            s.tmp.join("20230101000000_users.sql"),
            "CREATE TABLE users (id bigint NOT NULL);\n",
        )
        .unwrap();
        // Desired state matches the directory exactly.
        let desired = Realm::new().with_schema(
            Schema::new(DEFAULT_SCHEMA).with_table(
                Table::new(DEFAULT_SCHEMA, "users").with_column(Column::new("id", "bigint")),
            ),
        );
        let reader = RealmReader::new(desired);
        let err = s.planner().plan("sync", &reader).await.unwrap_err();
        assert!(matches!(err, DriftError::NoPlan));
        cleanup(&s.tmp);
    }

    // ── write_plan ──────────────────────────────────────────────────

    #[tokio::test]
    async fn test_write_plan_updates_manifest() {
        let s = Setup::new();
        let reader = RealmReader::new(desired_users());
        let mut plan = s.planner().plan("init", &reader).await.unwrap();
        plan.version = Some("20230101000000".to_string());
        s.planner().write_plan(&plan).unwrap();

        let files = s.dir.files().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "20230101000000_init.sql");
        validate(s.dir.as_ref()).unwrap();
        cleanup(&s.tmp);
    }
}
