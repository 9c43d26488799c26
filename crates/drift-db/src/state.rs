//! Desired-state readers.
//!
//! The planner consumes a [`StateReader`]: one operation producing the
//! desired [`Realm`]. Two sources exist. [`RealmReader`] wraps a realm that
//! was already decoded (for example from declarative schema files by an
//! external collaborator), and [`ConnReader`] inspects a live database.
//! Connection-backed readers expose their dialect so the planner can detect
//! a mismatch with the dev database.

use std::sync::Arc;

use async_trait::async_trait;
use drift_core::DriftResult;

use crate::driver::Driver;
use crate::schema::Realm;

/// Produces the desired realm.
#[async_trait]
pub trait StateReader: Send + Sync {
    /// Reads the desired state.
    async fn read_state(&self) -> DriftResult<Realm>;

    /// The dialect behind this reader, for connection-backed sources.
    fn dialect(&self) -> Option<&str> {
        None
    }
}

/// A state reader over an already-decoded realm.
pub struct RealmReader {
    realm: Realm,
}

impl RealmReader {
    /// Wraps a decoded realm.
    pub fn new(realm: Realm) -> Self {
        Self { realm }
    }
}

#[async_trait]
impl StateReader for RealmReader {
    async fn read_state(&self) -> DriftResult<Realm> {
        Ok(self.realm.clone())
    }
}

/// A state reader over a live database connection.
pub struct ConnReader {
    driver: Arc<dyn Driver>,
    schemas: Vec<String>,
}

impl ConnReader {
    /// Wraps a driver, optionally restricted to the given schemas.
    pub fn new(driver: Arc<dyn Driver>, schemas: Vec<String>) -> Self {
        Self { driver, schemas }
    }
}

#[async_trait]
impl StateReader for ConnReader {
    async fn read_state(&self) -> DriftResult<Realm> {
        self.driver.inspect_realm(&self.schemas).await
    }

    fn dialect(&self) -> Option<&str> {
        Some(self.driver.dialect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDriver;
    use crate::schema::Schema;

    #[tokio::test]
    async fn test_realm_reader() {
        let realm = Realm::new().with_schema(Schema::new("public"));
        let reader = RealmReader::new(realm.clone());
        assert_eq!(reader.read_state().await.unwrap(), realm);
        assert!(reader.dialect().is_none());
    }

    #[tokio::test]
    async fn test_conn_reader_reports_dialect() {
        let drv = Arc::new(MockDriver::new("postgres"));
        drv.exec("CREATE TABLE users (id bigint)").await.unwrap();
        let reader = ConnReader::new(drv, vec![]);
        assert_eq!(reader.dialect(), Some("postgres"));
        let realm = reader.read_state().await.unwrap();
        assert!(realm.table("main", "users").is_some());
    }
}
