//! Revision rows and their stores.
//!
//! A [`Revision`] is the durable record of one migration file having been
//! applied (or attempted). Rows move through the
//! `ongoing -> ok | error` state machine; an interrupted run leaves its row
//! `ongoing` for the operator to resolve.
//!
//! [`RevisionStore`] is the three-method persistence seam. [`MemRevisions`]
//! keeps rows in memory, [`NopRevisions`] discards writes (validate and
//! replay paths), and [`TableRevisions`] persists rows to a table in the
//! target database.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use drift_core::{DriftError, DriftResult};
use drift_db::driver::Driver;
use drift_db::row::Row;

/// The execution state of a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    /// Execution started and has not finished.
    Ongoing,
    /// Execution finished successfully.
    Ok,
    /// Execution failed.
    Error,
}

impl ExecutionState {
    /// Returns the stored string form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ongoing => "ongoing",
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }

    /// Parses the stored string form.
    pub fn parse(s: &str) -> DriftResult<Self> {
        match s {
            "ongoing" => Ok(Self::Ongoing),
            "ok" => Ok(Self::Ok),
            "error" => Ok(Self::Error),
            other => Err(DriftError::Serialization(format!(
                "unknown execution state {other:?}"
            ))),
        }
    }
}

/// A durable record of one applied (or attempted) migration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    /// The file version; primary key.
    pub version: String,
    /// The file description.
    pub description: String,
    /// Where execution stands.
    pub execution_state: ExecutionState,
    /// When execution started.
    pub executed_at: DateTime<Utc>,
    /// Execution duration in nanoseconds.
    pub execution_time: i64,
    /// The file's content hash at apply time.
    pub hash: String,
    /// The tool identifier that performed the apply.
    pub operator_version: String,
    /// Opaque structured blob (error details, driver notes).
    pub meta: serde_json::Value,
}

/// Persistence seam for revision rows.
#[async_trait]
pub trait RevisionStore: Send + Sync {
    /// Returns all revisions ordered by version ascending.
    async fn read_revisions(&self) -> DriftResult<Vec<Revision>>;

    /// Inserts or replaces the revision with the same version.
    async fn write_revision(&self, rev: &Revision) -> DriftResult<()>;

    /// Ensures buffered writes are durable.
    async fn flush(&self) -> DriftResult<()>;
}

/// An in-memory revision store.
#[derive(Default)]
pub struct MemRevisions {
    rows: Mutex<BTreeMap<String, Revision>>,
}

impl MemRevisions {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevisionStore for MemRevisions {
    async fn read_revisions(&self) -> DriftResult<Vec<Revision>> {
        Ok(self.rows.lock().unwrap().values().cloned().collect())
    }

    async fn write_revision(&self, rev: &Revision) -> DriftResult<()> {
        self.rows
            .lock()
            .unwrap()
            .insert(rev.version.clone(), rev.clone());
        Ok(())
    }

    async fn flush(&self) -> DriftResult<()> {
        Ok(())
    }
}

/// A store that discards writes. Used by validate and replay paths.
pub struct NopRevisions;

#[async_trait]
impl RevisionStore for NopRevisions {
    async fn read_revisions(&self) -> DriftResult<Vec<Revision>> {
        Ok(Vec::new())
    }

    async fn write_revision(&self, _rev: &Revision) -> DriftResult<()> {
        Ok(())
    }

    async fn flush(&self) -> DriftResult<()> {
        Ok(())
    }
}

/// A store persisting rows to a table in the target database.
pub struct TableRevisions {
    driver: Arc<dyn Driver>,
    table: String,
}

impl TableRevisions {
    /// Creates a store over the given driver and table name.
    pub fn new(driver: Arc<dyn Driver>, table: impl Into<String>) -> Self {
        Self {
            driver,
            table: table.into(),
        }
    }

    /// Creates the revision table when it does not exist yet.
    pub async fn init(&self) -> DriftResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             version varchar(255) NOT NULL PRIMARY KEY, \
             description varchar(255) NOT NULL, \
             execution_state varchar(16) NOT NULL, \
             executed_at varchar(64) NOT NULL, \
             execution_time bigint NOT NULL, \
             hash varchar(64) NOT NULL, \
             operator_version varchar(64) NOT NULL, \
             meta text NOT NULL)",
            self.table
        );
        self.driver.exec(&sql).await?;
        Ok(())
    }

    fn row_to_revision(&self, row: &Row) -> DriftResult<Revision> {
        let text = |col: &str| {
            row.get_text(col).map(str::to_string).ok_or_else(|| {
                DriftError::Serialization(format!("revision row missing column {col:?}"))
            })
        };
        let executed_at = DateTime::parse_from_rfc3339(&text("executed_at")?)
            .map_err(|e| DriftError::Serialization(format!("bad executed_at: {e}")))?
            .with_timezone(&Utc);
        let meta_text = text("meta")?;
        let meta = serde_json::from_str(&meta_text)
            .map_err(|e| DriftError::Serialization(format!("bad meta json: {e}")))?;
        Ok(Revision {
            version: text("version")?,
            description: text("description")?,
            execution_state: ExecutionState::parse(&text("execution_state")?)?,
            executed_at,
            execution_time: row.get_int("execution_time").ok_or_else(|| {
                DriftError::Serialization("revision row missing column \"execution_time\"".into())
            })?,
            hash: text("hash")?,
            operator_version: text("operator_version")?,
            meta,
        })
    }
}

/// Doubles single quotes for embedding in a SQL string literal.
fn sql_quote(s: &str) -> String {
    s.replace('\'', "''")
}

#[async_trait]
impl RevisionStore for TableRevisions {
    async fn read_revisions(&self) -> DriftResult<Vec<Revision>> {
        let sql = format!(
            "SELECT version, description, execution_state, executed_at, \
             execution_time, hash, operator_version, meta FROM {} ORDER BY version",
            self.table
        );
        let rows = self.driver.query(&sql).await?;
        rows.iter().map(|r| self.row_to_revision(r)).collect()
    }

    async fn write_revision(&self, rev: &Revision) -> DriftResult<()> {
        // Upsert as delete-then-insert to stay dialect neutral.
        self.driver
            .exec(&format!(
                "DELETE FROM {} WHERE version = '{}'",
                self.table,
                sql_quote(&rev.version)
            ))
            .await?;
        let meta = serde_json::to_string(&rev.meta)
            .map_err(|e| DriftError::Serialization(e.to_string()))?;
        self.driver
            .exec(&format!(
                "INSERT INTO {} (version, description, execution_state, executed_at, \
                 execution_time, hash, operator_version, meta) VALUES \
                 ('{}', '{}', '{}', '{}', {}, '{}', '{}', '{}')",
                self.table,
                sql_quote(&rev.version),
                sql_quote(&rev.description),
                rev.execution_state.as_str(),
                rev.executed_at.to_rfc3339(),
                rev.execution_time,
                sql_quote(&rev.hash),
                sql_quote(&rev.operator_version),
                sql_quote(&meta),
            ))
            .await?;
        Ok(())
    }

    async fn flush(&self) -> DriftResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_db::mock::MockDriver;
    use drift_db::row::SqlValue;

    fn revision(version: &str, state: ExecutionState) -> Revision {
        Revision {
            version: version.to_string(),
            description: "add_users".to_string(),
            execution_state: state,
            executed_at: Utc::now(),
            execution_time: 1_500_000,
            hash: "abc123".to_string(),
            operator_version: "drift/0.1.0".to_string(),
            meta: serde_json::json!({}),
        }
    }

    // ── ExecutionState tests ────────────────────────────────────────

    #[test]
    fn test_state_string_round_trip() {
        for state in [ExecutionState::Ongoing, ExecutionState::Ok, ExecutionState::Error] {
            assert_eq!(ExecutionState::parse(state.as_str()).unwrap(), state);
        }
        assert!(ExecutionState::parse("done").is_err());
    }

    // ── MemRevisions tests ──────────────────────────────────────────

    #[tokio::test]
    async fn test_mem_store_ordered_reads() {
        let store = MemRevisions::new();
        store
            .write_revision(&revision("20230102000000", ExecutionState::Ok))
            .await
            .unwrap();
        store
            .write_revision(&revision("20230101000000", ExecutionState::Ok))
            .await
            .unwrap();
        let revs = store.read_revisions().await.unwrap();
        assert_eq!(revs.len(), 2);
        assert_eq!(revs[0].version, "20230101000000");
        assert_eq!(revs[1].version, "20230102000000");
    }

    #[tokio::test]
    async fn test_mem_store_upsert() {
        let store = MemRevisions::new();
        store
            .write_revision(&revision("20230101000000", ExecutionState::Ongoing))
            .await
            .unwrap();
        store
            .write_revision(&revision("20230101000000", ExecutionState::Ok))
            .await
            .unwrap();
        let revs = store.read_revisions().await.unwrap();
        assert_eq!(revs.len(), 1);
        assert_eq!(revs[0].execution_state, ExecutionState::Ok);
    }

    // ── NopRevisions tests ──────────────────────────────────────────

    #[tokio::test]
    async fn test_nop_store_discards() {
        let store = NopRevisions;
        store
            .write_revision(&revision("20230101000000", ExecutionState::Ok))
            .await
            .unwrap();
        assert!(store.read_revisions().await.unwrap().is_empty());
    }

    // ── TableRevisions tests ────────────────────────────────────────

    #[tokio::test]
    async fn test_table_store_init_and_write_sql() {
        let drv = MockDriver::new("mock");
        let store = TableRevisions::new(Arc::new(drv.clone()), "atlas_schema_revisions");
        store.init().await.unwrap();
        store
            .write_revision(&revision("20230101000000", ExecutionState::Ok))
            .await
            .unwrap();
        store.flush().await.unwrap();

        let executed = drv.executed();
        assert!(executed[0].starts_with("CREATE TABLE IF NOT EXISTS atlas_schema_revisions"));
        assert!(executed
            .iter()
            .any(|s| s.starts_with("DELETE FROM atlas_schema_revisions")));
        let insert = executed
            .iter()
            .find(|s| s.starts_with("INSERT INTO atlas_schema_revisions"))
            .unwrap();
        assert!(insert.contains("'20230101000000'"));
        assert!(insert.contains("'ok'"));
    }

    #[tokio::test]
    async fn test_table_store_read_maps_rows() {
        let drv = MockDriver::new("mock");
        let now = Utc::now();
        drv.push_query_rows(
            "SELECT version",
            vec![Row::new()
                .with("version", SqlValue::Text("20230101000000".into()))
                .with("description", SqlValue::Text("add_users".into()))
                .with("execution_state", SqlValue::Text("ok".into()))
                .with("executed_at", SqlValue::Text(now.to_rfc3339()))
                .with("execution_time", SqlValue::Int(1000))
                .with("hash", SqlValue::Text("abc".into()))
                .with("operator_version", SqlValue::Text("drift/0.1.0".into()))
                .with("meta", SqlValue::Text("{}".into()))],
        );
        let store = TableRevisions::new(Arc::new(drv), "atlas_schema_revisions");
        let revs = store.read_revisions().await.unwrap();
        assert_eq!(revs.len(), 1);
        assert_eq!(revs[0].version, "20230101000000");
        assert_eq!(revs[0].execution_state, ExecutionState::Ok);
        assert_eq!(revs[0].execution_time, 1000);
        assert_eq!(revs[0].meta, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_table_store_read_rejects_bad_state() {
        let drv = MockDriver::new("mock");
        drv.push_query_rows(
            "SELECT version",
            vec![Row::new()
                .with("version", SqlValue::Text("1".into()))
                .with("description", SqlValue::Text("x".into()))
                .with("execution_state", SqlValue::Text("finished".into()))
                .with("executed_at", SqlValue::Text(Utc::now().to_rfc3339()))
                .with("execution_time", SqlValue::Int(0))
                .with("hash", SqlValue::Text("h".into()))
                .with("operator_version", SqlValue::Text("v".into()))
                .with("meta", SqlValue::Text("{}".into()))],
        );
        let store = TableRevisions::new(Arc::new(drv), "atlas_schema_revisions");
        assert!(matches!(
            store.read_revisions().await.unwrap_err(),
            DriftError::Serialization(_)
        ));
    }
}
