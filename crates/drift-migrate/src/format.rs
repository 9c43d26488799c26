//! On-disk migration formats.
//!
//! A [`Formatter`] serializes a [`Plan`] into one or more files and can
//! read its own output back (comments excepted). Six formats are
//! supported:
//!
//! | Format | File layout |
//! |---|---|
//! | atlas (default) | `<version>_<name>.sql`, single file |
//! | golang-migrate | `<version>_<name>.up.sql` + `.down.sql` |
//! | goose | single file with `-- +goose Up` / `-- +goose Down` markers |
//! | flyway | `V<version>__<name>.sql` + `U<version>__<name>.sql` |
//! | liquibase | XML changeset wrapper |
//! | dbmate | single file with `-- migrate:up` / `-- migrate:down` markers |
//!
//! Plans without an explicit version get the current UTC timestamp in
//! `%Y%m%d%H%M%S` form.

use std::sync::Arc;

use chrono::Utc;
use drift_core::{DriftError, DriftResult};
use drift_db::plan::{Plan, PlannedChange};

use crate::dir::split_statements;

/// A serialized plan file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanFile {
    /// The file name.
    pub name: String,
    /// The file contents.
    pub bytes: Vec<u8>,
}

/// Maps a plan to an ordered list of files and back.
pub trait Formatter: Send + Sync + std::fmt::Debug {
    /// Serializes the plan.
    fn format(&self, plan: &Plan) -> DriftResult<Vec<PlanFile>>;

    /// Reconstructs a plan from files previously produced by [`Self::format`].
    fn parse(&self, files: &[PlanFile]) -> DriftResult<Plan>;
}

/// Returns the formatter registered under the given name.
pub fn formatter_for(name: &str) -> DriftResult<Arc<dyn Formatter>> {
    match name {
        "atlas" => Ok(Arc::new(AtlasFormatter)),
        "golang-migrate" => Ok(Arc::new(GolangMigrateFormatter)),
        "goose" => Ok(Arc::new(GooseFormatter)),
        "flyway" => Ok(Arc::new(FlywayFormatter)),
        "liquibase" => Ok(Arc::new(LiquibaseFormatter)),
        "dbmate" => Ok(Arc::new(DbmateFormatter)),
        other => Err(DriftError::Config(format!("unknown format {other:?}"))),
    }
}

/// Returns the current UTC timestamp in the version format.
pub fn default_version() -> String {
    Utc::now().format("%Y%m%d%H%M%S").to_string()
}

fn version_of(plan: &Plan) -> String {
    plan.version.clone().unwrap_or_else(default_version)
}

/// Turns a plan name into a filename slug.
fn slug(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

fn base_name(plan: &Plan) -> String {
    let version = version_of(plan);
    let s = slug(&plan.name);
    if s.is_empty() {
        version
    } else {
        format!("{version}_{s}")
    }
}

/// Renders `cmd;` lines, each preceded by its comment when present.
fn render_cmds(changes: &[PlannedChange], with_comments: bool) -> String {
    let mut out = String::new();
    for c in changes {
        if with_comments {
            if let Some(comment) = &c.comment {
                out.push_str(&format!("-- {comment}\n"));
            }
        }
        out.push_str(&c.cmd);
        out.push_str(";\n");
    }
    out
}

/// Renders the reverse commands in reverse order.
fn render_reverses(changes: &[PlannedChange]) -> String {
    let mut out = String::new();
    for c in changes.iter().rev() {
        if let Some(rev) = &c.reverse {
            out.push_str(rev);
            out.push_str(";\n");
        }
    }
    out
}

/// Splits content into raw command strings.
fn parse_cmds(file: &str, content: &str) -> DriftResult<Vec<String>> {
    Ok(split_statements(file, content)?
        .into_iter()
        .map(|s| s.text)
        .collect())
}

/// Builds a plan from parsed command and (reverse-ordered) rollback lists.
fn assemble(name: &str, version: &str, cmds: Vec<String>, mut reverses: Vec<String>) -> Plan {
    // Rollback sections are written back-to-front; realign them.
    reverses.reverse();
    let mut plan = Plan::new(name);
    plan.version = Some(version.to_string());
    let pair_reverses = reverses.len() == cmds.len();
    for (i, cmd) in cmds.into_iter().enumerate() {
        let mut change = PlannedChange::new(cmd);
        if pair_reverses {
            change.reverse = Some(reverses[i].clone());
        }
        plan.push(change);
    }
    plan
}

/// Splits `<version>_<name>` (used by most formats).
fn split_base_name(stem: &str) -> (String, String) {
    match stem.split_once('_') {
        Some((v, n)) => (v.to_string(), n.to_string()),
        None => (stem.to_string(), String::new()),
    }
}

fn one_file<'a>(files: &'a [PlanFile], what: &str) -> DriftResult<&'a PlanFile> {
    match files {
        [f] => Ok(f),
        _ => Err(DriftError::ParseFile {
            file: what.to_string(),
            message: format!("expected exactly one file, got {}", files.len()),
        }),
    }
}

fn utf8<'a>(f: &'a PlanFile) -> DriftResult<&'a str> {
    std::str::from_utf8(&f.bytes).map_err(|e| DriftError::ParseFile {
        file: f.name.clone(),
        message: format!("not valid utf-8: {e}"),
    })
}

// ── atlas ────────────────────────────────────────────────────────────

/// The default single-file format.
#[derive(Debug)]
pub struct AtlasFormatter;

impl Formatter for AtlasFormatter {
    fn format(&self, plan: &Plan) -> DriftResult<Vec<PlanFile>> {
        Ok(vec![PlanFile {
            name: format!("{}.sql", base_name(plan)),
            bytes: render_cmds(&plan.changes, true).into_bytes(),
        }])
    }

    fn parse(&self, files: &[PlanFile]) -> DriftResult<Plan> {
        let f = one_file(files, "atlas plan")?;
        let stem = f.name.strip_suffix(".sql").unwrap_or(&f.name);
        let (version, name) = split_base_name(stem);
        let cmds = parse_cmds(&f.name, utf8(f)?)?;
        Ok(assemble(&name, &version, cmds, Vec::new()))
    }
}

// ── golang-migrate ───────────────────────────────────────────────────

/// Paired `.up.sql` / `.down.sql` files.
#[derive(Debug)]
pub struct GolangMigrateFormatter;

impl Formatter for GolangMigrateFormatter {
    fn format(&self, plan: &Plan) -> DriftResult<Vec<PlanFile>> {
        let base = base_name(plan);
        Ok(vec![
            PlanFile {
                name: format!("{base}.up.sql"),
                bytes: render_cmds(&plan.changes, true).into_bytes(),
            },
            PlanFile {
                name: format!("{base}.down.sql"),
                bytes: render_reverses(&plan.changes).into_bytes(),
            },
        ])
    }

    fn parse(&self, files: &[PlanFile]) -> DriftResult<Plan> {
        let up = files
            .iter()
            .find(|f| f.name.ends_with(".up.sql"))
            .ok_or_else(|| DriftError::ParseFile {
                file: "golang-migrate plan".to_string(),
                message: "missing .up.sql file".to_string(),
            })?;
        let down = files.iter().find(|f| f.name.ends_with(".down.sql"));
        let stem = up.name.strip_suffix(".up.sql").unwrap_or(&up.name);
        let (version, name) = split_base_name(stem);
        let cmds = parse_cmds(&up.name, utf8(up)?)?;
        let reverses = match down {
            Some(d) => parse_cmds(&d.name, utf8(d)?)?,
            None => Vec::new(),
        };
        Ok(assemble(&name, &version, cmds, reverses))
    }
}

// ── goose ────────────────────────────────────────────────────────────

/// Single file with `-- +goose Up` / `-- +goose Down` markers.
#[derive(Debug)]
pub struct GooseFormatter;

const GOOSE_UP: &str = "-- +goose Up";
const GOOSE_DOWN: &str = "-- +goose Down";

impl Formatter for GooseFormatter {
    fn format(&self, plan: &Plan) -> DriftResult<Vec<PlanFile>> {
        let mut content = format!("{GOOSE_UP}\n");
        content.push_str(&render_cmds(&plan.changes, false));
        content.push_str(&format!("{GOOSE_DOWN}\n"));
        content.push_str(&render_reverses(&plan.changes));
        Ok(vec![PlanFile {
            name: format!("{}.sql", base_name(plan)),
            bytes: content.into_bytes(),
        }])
    }

    fn parse(&self, files: &[PlanFile]) -> DriftResult<Plan> {
        parse_marked(files, "goose plan", GOOSE_UP, GOOSE_DOWN)
    }
}

// ── dbmate ───────────────────────────────────────────────────────────

/// Single file with `-- migrate:up` / `-- migrate:down` markers.
#[derive(Debug)]
pub struct DbmateFormatter;

const DBMATE_UP: &str = "-- migrate:up";
const DBMATE_DOWN: &str = "-- migrate:down";

impl Formatter for DbmateFormatter {
    fn format(&self, plan: &Plan) -> DriftResult<Vec<PlanFile>> {
        let mut content = format!("{DBMATE_UP}\n");
        content.push_str(&render_cmds(&plan.changes, false));
        content.push_str(&format!("{DBMATE_DOWN}\n"));
        content.push_str(&render_reverses(&plan.changes));
        Ok(vec![PlanFile {
            name: format!("{}.sql", base_name(plan)),
            bytes: content.into_bytes(),
        }])
    }

    fn parse(&self, files: &[PlanFile]) -> DriftResult<Plan> {
        parse_marked(files, "dbmate plan", DBMATE_UP, DBMATE_DOWN)
    }
}

/// Shared parser for marker-sectioned single-file formats.
fn parse_marked(files: &[PlanFile], what: &str, up: &str, down: &str) -> DriftResult<Plan> {
    let f = one_file(files, what)?;
    let content = utf8(f)?;
    let up_pos = content.find(up).ok_or_else(|| DriftError::ParseFile {
        file: f.name.clone(),
        message: format!("missing {up:?} marker"),
    })?;
    let after_up = &content[up_pos + up.len()..];
    let (up_sql, down_sql) = match after_up.find(down) {
        Some(pos) => (&after_up[..pos], &after_up[pos + down.len()..]),
        None => (after_up, ""),
    };
    let stem = f.name.strip_suffix(".sql").unwrap_or(&f.name);
    let (version, name) = split_base_name(stem);
    let cmds = parse_cmds(&f.name, up_sql)?;
    let reverses = parse_cmds(&f.name, down_sql)?;
    Ok(assemble(&name, &version, cmds, reverses))
}

// ── flyway ───────────────────────────────────────────────────────────

/// Versioned `V<version>__<name>.sql` plus undo `U<version>__<name>.sql`.
#[derive(Debug)]
pub struct FlywayFormatter;

impl Formatter for FlywayFormatter {
    fn format(&self, plan: &Plan) -> DriftResult<Vec<PlanFile>> {
        let version = version_of(plan);
        let s = slug(&plan.name);
        Ok(vec![
            PlanFile {
                name: format!("V{version}__{s}.sql"),
                bytes: render_cmds(&plan.changes, true).into_bytes(),
            },
            PlanFile {
                name: format!("U{version}__{s}.sql"),
                bytes: render_reverses(&plan.changes).into_bytes(),
            },
        ])
    }

    fn parse(&self, files: &[PlanFile]) -> DriftResult<Plan> {
        let versioned = files
            .iter()
            .find(|f| f.name.starts_with('V'))
            .ok_or_else(|| DriftError::ParseFile {
                file: "flyway plan".to_string(),
                message: "missing V file".to_string(),
            })?;
        let undo = files.iter().find(|f| f.name.starts_with('U'));
        let stem = versioned.name[1..]
            .strip_suffix(".sql")
            .unwrap_or(&versioned.name[1..]);
        let (version, name) = match stem.split_once("__") {
            Some((v, n)) => (v.to_string(), n.to_string()),
            None => (stem.to_string(), String::new()),
        };
        let cmds = parse_cmds(&versioned.name, utf8(versioned)?)?;
        let reverses = match undo {
            Some(u) => parse_cmds(&u.name, utf8(u)?)?,
            None => Vec::new(),
        };
        Ok(assemble(&name, &version, cmds, reverses))
    }
}

// ── liquibase ────────────────────────────────────────────────────────

/// XML changeset wrapper.
#[derive(Debug)]
pub struct LiquibaseFormatter;

impl Formatter for LiquibaseFormatter {
    fn format(&self, plan: &Plan) -> DriftResult<Vec<PlanFile>> {
        let version = version_of(plan);
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<databaseChangeLog xmlns=\"http://www.liquibase.org/xml/ns/dbchangelog\">\n");
        xml.push_str(&format!(
            "  <changeSet id=\"{version}\" author=\"{}\">\n",
            xml_escape(&plan.name)
        ));
        for c in &plan.changes {
            xml.push_str(&format!("    <sql>{}</sql>\n", xml_escape(&c.cmd)));
        }
        let rollback = render_reverses(&plan.changes);
        if !rollback.is_empty() {
            xml.push_str(&format!(
                "    <rollback>{}</rollback>\n",
                xml_escape(rollback.trim_end())
            ));
        }
        xml.push_str("  </changeSet>\n</databaseChangeLog>\n");
        Ok(vec![PlanFile {
            name: format!("{}.xml", base_name(plan)),
            bytes: xml.into_bytes(),
        }])
    }

    fn parse(&self, files: &[PlanFile]) -> DriftResult<Plan> {
        let f = one_file(files, "liquibase plan")?;
        let content = utf8(f)?;
        let stem = f.name.strip_suffix(".xml").unwrap_or(&f.name);
        let (version, name) = split_base_name(stem);
        let cmds: Vec<String> = extract_tags(content, "sql")
            .into_iter()
            .map(|s| xml_unescape(&s))
            .collect();
        let reverses = match extract_tags(content, "rollback").first() {
            Some(r) => parse_cmds(&f.name, &xml_unescape(r))?,
            None => Vec::new(),
        };
        Ok(assemble(&name, &version, cmds, reverses))
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<").replace("&gt;", ">").replace("&amp;", "&")
}

/// Extracts the text content of every `<tag>...</tag>` occurrence.
fn extract_tags(content: &str, tag: &str) -> Vec<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut out = Vec::new();
    let mut rest = content;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else {
            break;
        };
        out.push(after[..end].to_string());
        rest = &after[end + close.len()..];
    }
    out
}
