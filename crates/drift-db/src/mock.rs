//! A scriptable in-memory driver.
//!
//! [`MockDriver`] backs the engine's test suites and any code path that
//! needs a disposable dev database without a real server. It keeps a
//! [`Realm`] that is mutated by a small DDL interpreter (the subset of
//! CREATE/DROP/ALTER the engine itself emits), records every executed
//! statement, serves scripted query results, and implements [`Locker`]
//! with a process-local lock table.
//!
//! Cloning a `MockDriver` shares the underlying state, which models two
//! connections to the same database.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use drift_core::{DriftError, DriftResult};

use crate::changes::{Change, ModifyKind, TableChange};
use crate::diff::diff_realms;
use crate::driver::{Driver, Locker};
use crate::plan::{Plan, PlannedChange};
use crate::row::Row;
use crate::schema::{Column, ForeignKey, Index, Realm, Schema, Table};

/// The schema used for unqualified table names.
pub const DEFAULT_SCHEMA: &str = "main";

#[derive(Default, Debug)]
struct MockState {
    realm: Realm,
    executed: Vec<String>,
    scripted_queries: Vec<(String, Vec<Row>)>,
    fail_contains: Option<String>,
    locks: Vec<String>,
}

/// An in-memory driver with a tiny DDL interpreter.
#[derive(Clone, Debug)]
pub struct MockDriver {
    dialect: String,
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// Creates an empty mock database reporting the given dialect.
    pub fn new(dialect: impl Into<String>) -> Self {
        Self {
            dialect: dialect.into(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Returns every statement executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    /// Makes any statement containing `needle` fail with a SQL error.
    pub fn fail_on_contains(&self, needle: impl Into<String>) {
        self.state.lock().unwrap().fail_contains = Some(needle.into());
    }

    /// Scripts the result rows for queries starting with `prefix`.
    pub fn push_query_rows(&self, prefix: impl Into<String>, rows: Vec<Row>) {
        self.state
            .lock()
            .unwrap()
            .scripted_queries
            .push((prefix.into(), rows));
    }

    /// Replaces the current realm wholesale.
    pub fn set_realm(&self, realm: Realm) {
        self.state.lock().unwrap().realm = realm;
    }

    fn apply_stmt(realm: &mut Realm, sql: &str) -> DriftResult<()> {
        let stmt = sql.trim().trim_end_matches(';').trim();
        if stmt.is_empty() {
            return Ok(());
        }
        let upper = stmt.to_uppercase();
        if matches!(upper.as_str(), "BEGIN" | "COMMIT" | "ROLLBACK") {
            return Ok(());
        }
        // DML does not affect the schema catalog.
        if ["INSERT ", "UPDATE ", "DELETE ", "SELECT "]
            .iter()
            .any(|p| upper.starts_with(p))
        {
            return Ok(());
        }
        if let Some(rest) = strip_prefix_ci(stmt, "CREATE SCHEMA ") {
            let name = rest.trim();
            if realm.schema(name).is_none() {
                realm.schemas.push(Schema::new(name));
            }
            return Ok(());
        }
        if let Some(rest) = strip_prefix_ci(stmt, "DROP SCHEMA ") {
            let name = rest.trim();
            realm.schemas.retain(|s| s.name != name);
            return Ok(());
        }
        if let Some(rest) = strip_prefix_ci(stmt, "CREATE TABLE ") {
            return create_table(realm, rest);
        }
        if let Some(rest) = strip_prefix_ci(stmt, "DROP TABLE ") {
            let (schema, table) = split_qualified(rest.trim());
            let s = realm
                .schema_mut(&schema)
                .ok_or_else(|| DriftError::Sql(format!("unknown schema {schema:?}")))?;
            let before = s.tables.len();
            s.tables.retain(|t| t.name != table);
            if s.tables.len() == before {
                return Err(DriftError::Sql(format!("unknown table {table:?}")));
            }
            return Ok(());
        }
        if let Some(rest) = strip_prefix_ci(stmt, "ALTER TABLE ") {
            return alter_table(realm, rest);
        }
        if let Some(rest) = strip_prefix_ci(stmt, "CREATE UNIQUE INDEX ") {
            return create_index(realm, rest, true);
        }
        if let Some(rest) = strip_prefix_ci(stmt, "CREATE INDEX ") {
            return create_index(realm, rest, false);
        }
        if let Some(rest) = strip_prefix_ci(stmt, "DROP INDEX ") {
            return drop_index(realm, rest);
        }
        Err(DriftError::Sql(format!("unsupported statement: {stmt}")))
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn dialect(&self) -> &str {
        &self.dialect
    }

    async fn exec(&self, sql: &str) -> DriftResult<u64> {
        let mut state = self.state.lock().unwrap();
        state.executed.push(sql.to_string());
        if let Some(needle) = &state.fail_contains {
            if sql.contains(needle.as_str()) {
                return Err(DriftError::Sql(format!("injected failure on: {sql}")));
            }
        }
        Self::apply_stmt(&mut state.realm, sql)?;
        Ok(0)
    }

    async fn query(&self, sql: &str) -> DriftResult<Vec<Row>> {
        let mut state = self.state.lock().unwrap();
        state.executed.push(sql.to_string());
        for (prefix, rows) in &state.scripted_queries {
            if sql.starts_with(prefix.as_str()) {
                return Ok(rows.clone());
            }
        }
        Ok(Vec::new())
    }

    async fn inspect_realm(&self, schemas: &[String]) -> DriftResult<Realm> {
        let state = self.state.lock().unwrap();
        let mut realm = state.realm.clone();
        if !schemas.is_empty() {
            realm.schemas.retain(|s| schemas.contains(&s.name));
        }
        realm.schemas.sort_by(|a, b| a.name.cmp(&b.name));
        for s in &mut realm.schemas {
            s.tables.sort_by(|a, b| a.name.cmp(&b.name));
        }
        Ok(realm)
    }

    fn realm_diff(&self, from: &Realm, to: &Realm) -> Vec<Change> {
        diff_realms(from, to)
    }

    fn plan_changes(&self, name: &str, changes: &[Change]) -> DriftResult<Plan> {
        let mut plan = Plan::new(name);
        for change in changes {
            for pc in render_change(change) {
                plan.push(pc);
            }
        }
        Ok(plan)
    }

    fn as_locker(&self) -> Option<&dyn Locker> {
        Some(self)
    }
}

#[async_trait]
impl Locker for MockDriver {
    async fn lock(&self, name: &str) -> DriftResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.locks.iter().any(|l| l == name) {
            return Err(DriftError::Locked(name.to_string()));
        }
        state.locks.push(name.to_string());
        Ok(())
    }

    async fn unlock(&self, name: &str) -> DriftResult<()> {
        self.state.lock().unwrap().locks.retain(|l| l != name);
        Ok(())
    }
}

// ── DDL interpreter ──────────────────────────────────────────────────

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

fn split_qualified(name: &str) -> (String, String) {
    match name.split_once('.') {
        Some((s, t)) => (s.to_string(), t.to_string()),
        None => (DEFAULT_SCHEMA.to_string(), name.to_string()),
    }
}

/// Splits a parenthesized body on commas that are not nested in parens.
fn split_top_level(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in body.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

fn ident_list(body: &str) -> Vec<String> {
    body.split(',').map(|s| s.trim().to_string()).collect()
}

/// Parses `name type [NOT NULL | NULL] [DEFAULT expr] [PRIMARY KEY]`.
fn parse_column_def(def: &str) -> DriftResult<(Column, bool)> {
    let tokens: Vec<&str> = def.split_whitespace().collect();
    if tokens.len() < 2 {
        return Err(DriftError::Sql(format!("bad column definition: {def}")));
    }
    let name = tokens[0].to_string();
    let mut type_end = 1;
    while type_end < tokens.len() {
        let upper = tokens[type_end].to_uppercase();
        if matches!(upper.as_str(), "NOT" | "NULL" | "DEFAULT" | "PRIMARY" | "UNIQUE") {
            break;
        }
        type_end += 1;
    }
    let type_raw = tokens[1..type_end].join(" ");
    let mut column = Column {
        name,
        type_raw,
        null: true,
        default: None,
    };
    let mut primary = false;
    let mut i = type_end;
    while i < tokens.len() {
        match tokens[i].to_uppercase().as_str() {
            "NOT" if tokens.get(i + 1).is_some_and(|t| t.eq_ignore_ascii_case("NULL")) => {
                column.null = false;
                i += 2;
            }
            "NULL" => {
                column.null = true;
                i += 1;
            }
            "DEFAULT" => {
                let expr = tokens.get(i + 1).ok_or_else(|| {
                    DriftError::Sql(format!("DEFAULT without expression: {def}"))
                })?;
                column.default = Some((*expr).to_string());
                i += 2;
            }
            "PRIMARY" if tokens.get(i + 1).is_some_and(|t| t.eq_ignore_ascii_case("KEY")) => {
                primary = true;
                column.null = false;
                i += 2;
            }
            other => {
                return Err(DriftError::Sql(format!(
                    "unsupported column attribute {other:?} in: {def}"
                )));
            }
        }
    }
    Ok((column, primary))
}

fn create_table(realm: &mut Realm, rest: &str) -> DriftResult<()> {
    let (rest, if_not_exists) = match strip_prefix_ci(rest.trim_start(), "IF NOT EXISTS ") {
        Some(r) => (r, true),
        None => (rest, false),
    };
    let open = rest
        .find('(')
        .ok_or_else(|| DriftError::Sql(format!("missing column list: {rest}")))?;
    let close = rest
        .rfind(')')
        .ok_or_else(|| DriftError::Sql(format!("missing closing paren: {rest}")))?;
    let (schema, table) = split_qualified(rest[..open].trim());
    if realm.schema(&schema).is_none() {
        realm.schemas.push(Schema::new(&schema));
    }
    if realm.table(&schema, &table).is_some() {
        if if_not_exists {
            return Ok(());
        }
        return Err(DriftError::Sql(format!("table {table:?} already exists")));
    }
    let mut t = Table::new(&schema, &table);
    for def in split_top_level(&rest[open + 1..close]) {
        if let Some(cols) = strip_prefix_ci(&def, "PRIMARY KEY") {
            let cols = cols.trim().trim_start_matches('(').trim_end_matches(')');
            t.primary_key = ident_list(cols);
        } else if let Some(rest) = strip_prefix_ci(&def, "CONSTRAINT ") {
            t.foreign_keys.push(parse_fk(rest)?);
        } else {
            let (column, primary) = parse_column_def(&def)?;
            if primary {
                t.primary_key.push(column.name.clone());
            }
            t.columns.push(column);
        }
    }
    realm
        .schema_mut(&schema)
        .expect("schema created above")
        .tables
        .push(t);
    Ok(())
}

/// Parses `<name> FOREIGN KEY (cols) REFERENCES table (cols)`.
fn parse_fk(def: &str) -> DriftResult<ForeignKey> {
    let tokens: Vec<&str> = def.split_whitespace().collect();
    let name = tokens
        .first()
        .ok_or_else(|| DriftError::Sql(format!("bad constraint: {def}")))?;
    let upper = def.to_uppercase();
    let fk_pos = upper
        .find("FOREIGN KEY")
        .ok_or_else(|| DriftError::Sql(format!("unsupported constraint: {def}")))?;
    let refs_pos = upper
        .find("REFERENCES")
        .ok_or_else(|| DriftError::Sql(format!("missing REFERENCES: {def}")))?;
    let columns = paren_list(&def[fk_pos..refs_pos])?;
    let after = def[refs_pos + "REFERENCES".len()..].trim();
    let open = after
        .find('(')
        .ok_or_else(|| DriftError::Sql(format!("missing referenced columns: {def}")))?;
    let ref_table = after[..open].trim().to_string();
    let ref_columns = paren_list(&after[open..])?;
    Ok(ForeignKey {
        name: (*name).to_string(),
        columns,
        ref_table,
        ref_columns,
    })
}

fn paren_list(s: &str) -> DriftResult<Vec<String>> {
    let open = s
        .find('(')
        .ok_or_else(|| DriftError::Sql(format!("missing paren list: {s}")))?;
    let close = s
        .rfind(')')
        .ok_or_else(|| DriftError::Sql(format!("missing paren list: {s}")))?;
    Ok(ident_list(&s[open + 1..close]))
}

fn alter_table(realm: &mut Realm, rest: &str) -> DriftResult<()> {
    let (target, action) = rest
        .trim()
        .split_once(' ')
        .ok_or_else(|| DriftError::Sql(format!("bad ALTER TABLE: {rest}")))?;
    let (schema, table) = split_qualified(target);
    let t = realm
        .schema_mut(&schema)
        .and_then(|s| s.table_mut(&table))
        .ok_or_else(|| DriftError::Sql(format!("unknown table {schema}.{table}")))?;
    let action = action.trim();
    if let Some(def) = strip_prefix_ci(action, "ADD COLUMN ") {
        let (column, primary) = parse_column_def(def)?;
        if primary {
            t.primary_key.push(column.name.clone());
        }
        t.columns.push(column);
        return Ok(());
    }
    if let Some(name) = strip_prefix_ci(action, "DROP COLUMN ") {
        let name = name.trim();
        let before = t.columns.len();
        t.columns.retain(|c| c.name != name);
        if t.columns.len() == before {
            return Err(DriftError::Sql(format!("unknown column {name:?}")));
        }
        return Ok(());
    }
    if let Some(rest) = strip_prefix_ci(action, "ALTER COLUMN ") {
        return alter_column(t, rest);
    }
    if let Some(def) = strip_prefix_ci(action, "ADD CONSTRAINT ") {
        t.foreign_keys.push(parse_fk(def)?);
        return Ok(());
    }
    if let Some(name) = strip_prefix_ci(action, "DROP CONSTRAINT ") {
        let name = name.trim();
        t.foreign_keys.retain(|f| f.name != name);
        return Ok(());
    }
    Err(DriftError::Sql(format!("unsupported ALTER TABLE action: {action}")))
}

fn alter_column(t: &mut Table, rest: &str) -> DriftResult<()> {
    let (name, action) = rest
        .trim()
        .split_once(' ')
        .ok_or_else(|| DriftError::Sql(format!("bad ALTER COLUMN: {rest}")))?;
    let column = t
        .columns
        .iter_mut()
        .find(|c| c.name == name)
        .ok_or_else(|| DriftError::Sql(format!("unknown column {name:?}")))?;
    let action = action.trim();
    if let Some(ty) = strip_prefix_ci(action, "TYPE ") {
        column.type_raw = ty.trim().to_string();
        return Ok(());
    }
    if strip_prefix_ci(action, "SET NOT NULL").is_some() {
        column.null = false;
        return Ok(());
    }
    if strip_prefix_ci(action, "DROP NOT NULL").is_some() {
        column.null = true;
        return Ok(());
    }
    if let Some(expr) = strip_prefix_ci(action, "SET DEFAULT ") {
        column.default = Some(expr.trim().to_string());
        return Ok(());
    }
    if strip_prefix_ci(action, "DROP DEFAULT").is_some() {
        column.default = None;
        return Ok(());
    }
    Err(DriftError::Sql(format!("unsupported ALTER COLUMN action: {action}")))
}

fn create_index(realm: &mut Realm, rest: &str, unique: bool) -> DriftResult<()> {
    let upper = rest.to_uppercase();
    let on = upper
        .find(" ON ")
        .ok_or_else(|| DriftError::Sql(format!("missing ON clause: {rest}")))?;
    let name = rest[..on].trim().to_string();
    let after = &rest[on + 4..];
    let open = after
        .find('(')
        .ok_or_else(|| DriftError::Sql(format!("missing column list: {rest}")))?;
    let (schema, table) = split_qualified(after[..open].trim());
    let columns = paren_list(&after[open..])?;
    let t = realm
        .schema_mut(&schema)
        .and_then(|s| s.table_mut(&table))
        .ok_or_else(|| DriftError::Sql(format!("unknown table {schema}.{table}")))?;
    if t.index(&name).is_some() {
        return Err(DriftError::Sql(format!("index {name:?} already exists")));
    }
    t.indexes.push(Index {
        name,
        unique,
        columns,
    });
    Ok(())
}

fn drop_index(realm: &mut Realm, rest: &str) -> DriftResult<()> {
    let rest = rest.trim();
    let (name, table) = match strip_prefix_ci_find(rest, " ON ") {
        Some((name, target)) => (name.trim().to_string(), Some(split_qualified(target.trim()))),
        None => (rest.to_string(), None),
    };
    match table {
        Some((schema, table)) => {
            let t = realm
                .schema_mut(&schema)
                .and_then(|s| s.table_mut(&table))
                .ok_or_else(|| DriftError::Sql(format!("unknown table {schema}.{table}")))?;
            t.indexes.retain(|i| i.name != name);
        }
        None => {
            for s in &mut realm.schemas {
                for t in &mut s.tables {
                    t.indexes.retain(|i| i.name != name);
                }
            }
        }
    }
    Ok(())
}

/// Case-insensitive split on the first occurrence of `sep`.
fn strip_prefix_ci_find<'a>(s: &'a str, sep: &str) -> Option<(&'a str, &'a str)> {
    let pos = s.to_uppercase().find(&sep.to_uppercase())?;
    Some((&s[..pos], &s[pos + sep.len()..]))
}

// ── Change rendering ─────────────────────────────────────────────────

fn column_def(c: &Column) -> String {
    let mut def = format!("{} {}", c.name, c.type_raw);
    if !c.null {
        def.push_str(" NOT NULL");
    }
    if let Some(d) = &c.default {
        def.push_str(&format!(" DEFAULT {d}"));
    }
    def
}

fn render_change(change: &Change) -> Vec<PlannedChange> {
    match change {
        Change::AddSchema { schema } => vec![PlannedChange::new(format!("CREATE SCHEMA {schema}"))
            .with_reverse(format!("DROP SCHEMA {schema}"))
            .with_comment(format!("add schema {schema}"))],
        Change::DropSchema { schema } => vec![
            PlannedChange::new(format!("DROP SCHEMA {schema}"))
                .with_comment(format!("drop schema {schema}")),
        ],
        Change::AddTable { table } => {
            let mut defs: Vec<String> = table.columns.iter().map(column_def).collect();
            if !table.primary_key.is_empty() {
                defs.push(format!("PRIMARY KEY ({})", table.primary_key.join(", ")));
            }
            for fk in &table.foreign_keys {
                defs.push(format!(
                    "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                    fk.name,
                    fk.columns.join(", "),
                    fk.ref_table,
                    fk.ref_columns.join(", ")
                ));
            }
            let target = format!("{}.{}", table.schema, table.name);
            let mut out = vec![PlannedChange::new(format!(
                "CREATE TABLE {target} ({})",
                defs.join(", ")
            ))
            .with_reverse(format!("DROP TABLE {target}"))
            .with_comment(format!("create table {target}"))];
            for idx in &table.indexes {
                out.push(render_add_index(&table.schema, &table.name, idx));
            }
            out
        }
        Change::DropTable { schema, table } => vec![
            PlannedChange::new(format!("DROP TABLE {schema}.{table}"))
                .with_comment(format!("drop table {schema}.{table}")),
        ],
        Change::ModifyTable {
            schema,
            table,
            changes,
        } => changes
            .iter()
            .flat_map(|tc| render_table_change(schema, table, tc))
            .collect(),
    }
}

fn render_add_index(schema: &str, table: &str, idx: &Index) -> PlannedChange {
    let unique = if idx.unique { "UNIQUE " } else { "" };
    PlannedChange::new(format!(
        "CREATE {unique}INDEX {} ON {schema}.{table} ({})",
        idx.name,
        idx.columns.join(", ")
    ))
    .with_reverse(format!("DROP INDEX {} ON {schema}.{table}", idx.name))
    .with_comment(format!("add index {} to {schema}.{table}", idx.name))
}

fn render_table_change(schema: &str, table: &str, tc: &TableChange) -> Vec<PlannedChange> {
    let target = format!("{schema}.{table}");
    match tc {
        TableChange::AddColumn { column } => vec![PlannedChange::new(format!(
            "ALTER TABLE {target} ADD COLUMN {}",
            column_def(column)
        ))
        .with_reverse(format!("ALTER TABLE {target} DROP COLUMN {}", column.name))
        .with_comment(format!("add column {} to {target}", column.name))],
        TableChange::DropColumn { column } => vec![
            PlannedChange::new(format!("ALTER TABLE {target} DROP COLUMN {column}"))
                .with_comment(format!("drop column {column} from {target}")),
        ],
        TableChange::ModifyColumn { from, to, kind } => {
            let mut out = Vec::new();
            if kind.contains(ModifyKind::TYPE) {
                out.push(
                    PlannedChange::new(format!(
                        "ALTER TABLE {target} ALTER COLUMN {} TYPE {}",
                        to.name, to.type_raw
                    ))
                    .with_reverse(format!(
                        "ALTER TABLE {target} ALTER COLUMN {} TYPE {}",
                        from.name, from.type_raw
                    ))
                    .with_comment(format!("change type of {}.{}", target, to.name)),
                );
            }
            if kind.contains(ModifyKind::NULL) {
                let (cmd, rev) = if to.null {
                    ("DROP NOT NULL", "SET NOT NULL")
                } else {
                    ("SET NOT NULL", "DROP NOT NULL")
                };
                out.push(
                    PlannedChange::new(format!(
                        "ALTER TABLE {target} ALTER COLUMN {} {cmd}",
                        to.name
                    ))
                    .with_reverse(format!(
                        "ALTER TABLE {target} ALTER COLUMN {} {rev}",
                        to.name
                    )),
                );
            }
            if kind.contains(ModifyKind::DEFAULT) {
                let cmd = match &to.default {
                    Some(d) => format!("SET DEFAULT {d}"),
                    None => "DROP DEFAULT".to_string(),
                };
                let rev = match &from.default {
                    Some(d) => format!("SET DEFAULT {d}"),
                    None => "DROP DEFAULT".to_string(),
                };
                out.push(
                    PlannedChange::new(format!(
                        "ALTER TABLE {target} ALTER COLUMN {} {cmd}",
                        to.name
                    ))
                    .with_reverse(format!(
                        "ALTER TABLE {target} ALTER COLUMN {} {rev}",
                        to.name
                    )),
                );
            }
            out
        }
        TableChange::AddIndex { index } => vec![render_add_index(schema, table, index)],
        TableChange::DropIndex { index } => vec![
            PlannedChange::new(format!("DROP INDEX {index} ON {target}"))
                .with_comment(format!("drop index {index} from {target}")),
        ],
        TableChange::AddForeignKey { fk } => vec![PlannedChange::new(format!(
            "ALTER TABLE {target} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            fk.name,
            fk.columns.join(", "),
            fk.ref_table,
            fk.ref_columns.join(", ")
        ))
        .with_reverse(format!("ALTER TABLE {target} DROP CONSTRAINT {}", fk.name))],
        TableChange::DropForeignKey { fk } => vec![PlannedChange::new(format!(
            "ALTER TABLE {target} DROP CONSTRAINT {fk}"
        ))],
        TableChange::ModifyForeignKey { from, to } => vec![
            PlannedChange::new(format!(
                "ALTER TABLE {target} DROP CONSTRAINT {}",
                from.name
            )),
            PlannedChange::new(format!(
                "ALTER TABLE {target} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                to.name,
                to.columns.join(", "),
                to.ref_table,
                to.ref_columns.join(", ")
            )),
        ],
    }
}
