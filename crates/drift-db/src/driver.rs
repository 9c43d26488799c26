//! The driver capability set.
//!
//! A [`Driver`] is the engine's view of one database dialect: it executes
//! SQL, inspects the live catalog into a [`Realm`], diffs two realms, and
//! renders a change list into an executable [`Plan`]. Optional capabilities
//! (advisory locking, realm normalization) are probed structurally through
//! [`Driver::as_locker`] and [`Driver::as_normalizer`] rather than being
//! part of the required surface.
//!
//! Dialect implementations live outside this workspace and register
//! themselves with the [`registry`] so front-ends can open database URLs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use drift_core::{DriftError, DriftResult};

use crate::changes::Change;
use crate::plan::Plan;
use crate::row::Row;
use crate::schema::Realm;

/// The core trait for database drivers.
///
/// All I/O methods are async; callers pass cancellation through the task
/// context. Implementations must be shareable across tasks.
#[async_trait]
pub trait Driver: Send + Sync + std::fmt::Debug {
    /// Returns the dialect name (e.g. "postgres", "mysql", "sqlite").
    fn dialect(&self) -> &str;

    /// Executes a SQL statement that does not return rows.
    ///
    /// Returns the number of rows affected.
    async fn exec(&self, sql: &str) -> DriftResult<u64>;

    /// Executes a SQL query and returns all result rows.
    async fn query(&self, sql: &str) -> DriftResult<Vec<Row>>;

    /// Inspects the connected database into a realm.
    ///
    /// An empty `schemas` slice selects every schema.
    async fn inspect_realm(&self, schemas: &[String]) -> DriftResult<Realm>;

    /// Computes the changes that turn `from` into `to`.
    fn realm_diff(&self, from: &Realm, to: &Realm) -> Vec<Change>;

    /// Renders a change list into an executable plan.
    fn plan_changes(&self, name: &str, changes: &[Change]) -> DriftResult<Plan>;

    /// Returns the advisory-lock capability, when supported.
    fn as_locker(&self) -> Option<&dyn Locker> {
        None
    }

    /// Returns the realm-normalization capability, when supported.
    fn as_normalizer(&self) -> Option<&dyn Normalizer> {
        None
    }
}

/// Named advisory locks with zero-timeout semantics.
///
/// `lock` either acquires the lock immediately or fails with
/// [`DriftError::Locked`]; there is no waiting.
#[async_trait]
pub trait Locker: Send + Sync {
    /// Acquires the named lock, failing immediately on conflict.
    async fn lock(&self, name: &str) -> DriftResult<()>;

    /// Releases the named lock.
    async fn unlock(&self, name: &str) -> DriftResult<()>;
}

/// Dialect-specific realm normalization.
///
/// Normalization replays a desired realm through the dev database so that
/// implicit dialect behavior (default collations, type aliases) is made
/// explicit before diffing.
#[async_trait]
pub trait Normalizer: Send + Sync {
    /// Returns the normalized form of the realm.
    async fn normalize_realm(&self, realm: Realm) -> DriftResult<Realm>;
}

/// The driver registry: maps URL schemes to driver openers.
pub mod registry {
    use super::*;

    /// Opens a driver from the portion of the URL after the scheme.
    pub type Opener = Arc<dyn Fn(&str) -> DriftResult<Arc<dyn Driver>> + Send + Sync>;

    fn openers() -> &'static Mutex<HashMap<String, Opener>> {
        static REGISTRY: OnceLock<Mutex<HashMap<String, Opener>>> = OnceLock::new();
        REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
    }

    /// Registers an opener for a URL scheme, replacing any existing one.
    pub fn register(scheme: &str, opener: Opener) {
        openers()
            .lock()
            .expect("driver registry poisoned")
            .insert(scheme.to_string(), opener);
    }

    /// Opens a driver for a database URL of the form `<scheme>://<rest>`.
    pub fn open(url: &str) -> DriftResult<Arc<dyn Driver>> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| DriftError::InvalidLocation(url.to_string()))?;
        let opener = openers()
            .lock()
            .expect("driver registry poisoned")
            .get(scheme)
            .cloned()
            .ok_or_else(|| {
                DriftError::Config(format!("no driver registered for dialect {scheme:?}"))
            })?;
        opener(rest)
    }
}
