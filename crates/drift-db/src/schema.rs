//! The realm catalog: a value-type model of database schemas.
//!
//! A [`Realm`] is the complete catalog of a database: a set of schemas,
//! each holding tables with columns, indexes, and foreign keys. The model
//! deliberately carries no parent back-references; a [`Table`] records the
//! *name* of its schema, and lookups go through the owning collection.

use serde::{Deserialize, Serialize};

/// A complete database schema catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Realm {
    /// The schemas in the catalog, in inspection order.
    pub schemas: Vec<Schema>,
}

impl Realm {
    /// Creates an empty realm.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a schema and returns the realm, builder style.
    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Looks up a schema by name.
    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.schemas.iter().find(|s| s.name == name)
    }

    /// Looks up a schema by name, mutably.
    pub fn schema_mut(&mut self, name: &str) -> Option<&mut Schema> {
        self.schemas.iter_mut().find(|s| s.name == name)
    }

    /// Looks up a table by `(schema, table)` name.
    pub fn table(&self, schema: &str, table: &str) -> Option<&Table> {
        self.schema(schema)?.table(table)
    }

    /// Returns whether the realm holds no schemas.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// A named schema holding tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// The schema name.
    pub name: String,
    /// The tables in the schema.
    pub tables: Vec<Table>,
}

impl Schema {
    /// Creates an empty schema with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
        }
    }

    /// Adds a table and returns the schema, builder style.
    #[must_use]
    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Looks up a table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Looks up a table by name, mutably.
    pub fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.name == name)
    }
}

/// A table definition.
///
/// `schema` holds the owning schema's name. Analysis code must index by
/// `(schema, name)` strings rather than walking object references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Name of the owning schema.
    pub schema: String,
    /// The table name.
    pub name: String,
    /// The table columns, in definition order.
    pub columns: Vec<Column>,
    /// Secondary indexes.
    pub indexes: Vec<Index>,
    /// Foreign keys.
    pub foreign_keys: Vec<ForeignKey>,
    /// Names of the primary key columns, in key order.
    pub primary_key: Vec<String>,
}

impl Table {
    /// Creates an empty table.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    /// Adds a column and returns the table, builder style.
    #[must_use]
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Adds an index and returns the table, builder style.
    #[must_use]
    pub fn with_index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Adds a foreign key and returns the table, builder style.
    #[must_use]
    pub fn with_foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Sets the primary key columns and returns the table, builder style.
    #[must_use]
    pub fn with_primary_key(mut self, columns: Vec<String>) -> Self {
        self.primary_key = columns;
        self
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Looks up an index by name.
    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Looks up a foreign key by name.
    pub fn foreign_key(&self, name: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|f| f.name == name)
    }
}

/// A column definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// The column name.
    pub name: String,
    /// The raw dialect type (e.g. `varchar(255)`, `bigint`).
    pub type_raw: String,
    /// Whether NULL values are allowed.
    pub null: bool,
    /// The default expression, if any.
    pub default: Option<String>,
}

impl Column {
    /// Creates a NOT NULL column with the given type.
    pub fn new(name: impl Into<String>, type_raw: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_raw: type_raw.into(),
            null: false,
            default: None,
        }
    }

    /// Marks the column as nullable.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Sets the default expression.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// A secondary index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// The index name.
    pub name: String,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// The indexed column names, in key order.
    pub columns: Vec<String>,
}

impl Index {
    /// Creates a non-unique index over the given columns.
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            unique: false,
            columns,
        }
    }

    /// Marks the index as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A foreign key constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// The constraint name.
    pub name: String,
    /// The referencing columns.
    pub columns: Vec<String>,
    /// The referenced table name.
    pub ref_table: String,
    /// The referenced columns.
    pub ref_columns: Vec<String>,
}
