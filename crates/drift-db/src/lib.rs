//! # drift-db
//!
//! Schema model and driver abstraction for the drift migration engine.
//!
//! ## Architecture
//!
//! - [`schema`] - The realm catalog: schemas, tables, columns, indexes,
//!   foreign keys. Children reference parents by name, never by pointer,
//!   so the model stays an acyclic value type.
//! - [`changes`] - The closed [`Change`](changes::Change) union describing
//!   semantic schema deltas.
//! - [`diff`] - A pure, dialect-neutral realm differ.
//! - [`plan`] - The executable [`Plan`](plan::Plan) produced from a change
//!   list.
//! - [`driver`] - The [`Driver`](driver::Driver) capability trait together
//!   with the optional [`Locker`](driver::Locker) and
//!   [`Normalizer`](driver::Normalizer) capabilities, plus the driver
//!   registry used by front-ends to open URLs.
//! - [`state`] - [`StateReader`](state::StateReader) polymorphism over
//!   desired-state sources.
//! - [`row`] - Query result rows.
//! - [`mock`] - A scriptable in-memory driver used by the engine's tests.

pub mod changes;
pub mod diff;
pub mod driver;
pub mod mock;
pub mod plan;
pub mod row;
pub mod schema;
pub mod state;

// Re-export key types at the crate root.
pub use changes::{Change, ModifyKind, TableChange};
pub use driver::{Driver, Locker, Normalizer};
pub use plan::{Plan, PlannedChange};
pub use row::{Row, SqlValue};
pub use schema::{Column, ForeignKey, Index, Realm, Schema, Table};
pub use state::{ConnReader, RealmReader, StateReader};
