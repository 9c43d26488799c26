//! Semantic schema deltas.
//!
//! [`Change`] is a closed tagged union over every kind of schema change the
//! engine understands. Table-scoped changes nest inside
//! [`Change::ModifyTable`] as [`TableChange`] values. Modify variants carry
//! a [`ModifyKind`] bitmask describing which column attributes changed.

use serde::{Deserialize, Serialize};

use crate::schema::{Column, ForeignKey, Index, Table};

/// A bitmask of column attribute changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyKind(u32);

impl ModifyKind {
    /// No attribute changed.
    pub const NONE: Self = Self(0);
    /// The column type changed.
    pub const TYPE: Self = Self(1);
    /// The nullability changed.
    pub const NULL: Self = Self(1 << 1);
    /// The default expression changed.
    pub const DEFAULT: Self = Self(1 << 2);

    /// Returns whether all bits of `other` are set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns whether no bits are set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for ModifyKind {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ModifyKind {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A schema-level change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Change {
    /// A schema was created.
    AddSchema {
        /// The schema name.
        schema: String,
    },
    /// A schema was dropped.
    DropSchema {
        /// The schema name.
        schema: String,
    },
    /// A table was created. Carries the full definition so consumers can
    /// see the columns and indexes introduced with it.
    AddTable {
        /// The created table.
        table: Table,
    },
    /// A table was dropped.
    DropTable {
        /// The owning schema name.
        schema: String,
        /// The table name.
        table: String,
    },
    /// A table was modified in place.
    ModifyTable {
        /// The owning schema name.
        schema: String,
        /// The table name.
        table: String,
        /// The nested table-scoped changes, in order.
        changes: Vec<TableChange>,
    },
}

/// A change scoped to a single table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableChange {
    /// A column was added.
    AddColumn {
        /// The added column.
        column: Column,
    },
    /// A column was dropped.
    DropColumn {
        /// The dropped column name.
        column: String,
    },
    /// A column was modified.
    ModifyColumn {
        /// The column before the change.
        from: Column,
        /// The column after the change.
        to: Column,
        /// Which attributes changed.
        kind: ModifyKind,
    },
    /// An index was added.
    AddIndex {
        /// The added index.
        index: Index,
    },
    /// An index was dropped.
    DropIndex {
        /// The dropped index name.
        index: String,
    },
    /// A foreign key was added.
    AddForeignKey {
        /// The added constraint.
        fk: ForeignKey,
    },
    /// A foreign key was dropped.
    DropForeignKey {
        /// The dropped constraint name.
        fk: String,
    },
    /// A foreign key was modified.
    ModifyForeignKey {
        /// The constraint before the change.
        from: ForeignKey,
        /// The constraint after the change.
        to: ForeignKey,
    },
}
