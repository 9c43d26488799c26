//! Migration directory storage.
//!
//! A [`Dir`] persists an ordered, hash-verified set of migration files. The
//! only backend today is [`LocalDir`], a local filesystem path addressed by
//! a `file://` URL. Files are ordered by plain lexicographic comparison of
//! their names; the integrity manifest and other non-migration files are
//! excluded from [`Dir::files`].
//!
//! Writes are atomic: content goes to a temporary file in the same
//! directory, is fsynced, and is renamed into place.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use drift_core::{DriftError, DriftResult};

use crate::sum::{hash_bytes, SumFile};

/// The fixed name of the integrity manifest.
pub const SUM_FILENAME: &str = "atlas.sum";

/// The directive replacing the default statement terminator.
const DELIMITER_DIRECTIVE: &str = "-- atlas:delimiter";

/// Abstract migration directory backend.
pub trait Dir: Send + Sync {
    /// Returns the migration files sorted by version ascending.
    fn files(&self) -> DriftResult<Vec<MigrationFile>>;

    /// Atomically creates a new file; fails if the name is taken.
    fn write(&self, name: &str, bytes: &[u8]) -> DriftResult<()>;

    /// Computes the integrity manifest over the current contents.
    fn checksum(&self) -> DriftResult<SumFile>;

    /// Returns the stored manifest contents, if present.
    fn read_sum(&self) -> DriftResult<Option<String>>;

    /// Atomically replaces the stored manifest.
    fn write_sum(&self, sum: &SumFile) -> DriftResult<()>;
}

/// A migration directory on the local filesystem.
#[derive(Debug)]
pub struct LocalDir {
    path: PathBuf,
}

impl LocalDir {
    /// Opens a directory from a `file://<path>` URL.
    pub fn open(url: &str) -> DriftResult<Self> {
        let (scheme, path) = url
            .split_once("://")
            .ok_or_else(|| DriftError::InvalidLocation(url.to_string()))?;
        if scheme != "file" {
            return Err(DriftError::InvalidLocation(format!(
                "unsupported scheme {scheme:?} in {url:?}"
            )));
        }
        let path = PathBuf::from(path);
        if !path.is_dir() {
            return Err(DriftError::NotFound(path.display().to_string()));
        }
        Ok(Self { path })
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lists the names of all regular files except the manifest, sorted.
    fn entries(&self) -> DriftResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name != SUM_FILENAME {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn write_atomic(&self, name: &str, bytes: &[u8]) -> DriftResult<()> {
        let tmp = self.path.join(format!(".{name}.tmp"));
        let target = self.path.join(name);
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        drop(f);
        fs::rename(&tmp, &target)?;
        Ok(())
    }
}

impl Dir for LocalDir {
    fn files(&self) -> DriftResult<Vec<MigrationFile>> {
        let mut files = Vec::new();
        for name in self.entries()? {
            if !name.ends_with(".sql") {
                continue;
            }
            let bytes = fs::read(self.path.join(&name))?;
            files.push(MigrationFile::new(name, bytes));
        }
        Ok(files)
    }

    fn write(&self, name: &str, bytes: &[u8]) -> DriftResult<()> {
        if self.path.join(name).exists() {
            return Err(DriftError::Exists(name.to_string()));
        }
        self.write_atomic(name, bytes)
    }

    fn checksum(&self) -> DriftResult<SumFile> {
        let mut sum = SumFile::default();
        for name in self.entries()? {
            let bytes = fs::read(self.path.join(&name))?;
            sum.add(&name, &bytes);
        }
        Ok(sum)
    }

    fn read_sum(&self) -> DriftResult<Option<String>> {
        match fs::read_to_string(self.path.join(SUM_FILENAME)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_sum(&self, sum: &SumFile) -> DriftResult<()> {
        self.write_atomic(SUM_FILENAME, sum.render().as_bytes())
    }
}

/// One migration file: raw bytes plus the naming metadata derived from the
/// `<version>_<description>.sql` convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// The full file name.
    pub name: String,
    /// The version prefix, ordered lexicographically.
    pub version: String,
    /// The description slug following the version.
    pub description: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

impl MigrationFile {
    /// Builds a file from its name and contents.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let stem = name.strip_suffix(".sql").unwrap_or(&name);
        let (version, description) = match stem.split_once('_') {
            Some((v, d)) => (v.to_string(), d.to_string()),
            None => (stem.to_string(), String::new()),
        };
        Self {
            name,
            version,
            description,
            bytes,
        }
    }

    /// Returns the base64 SHA-256 of the file contents, the same value the
    /// integrity manifest records.
    pub fn hash(&self) -> String {
        hash_bytes(&self.bytes)
    }

    /// Parses the file contents into ordered statements.
    pub fn statements(&self) -> DriftResult<Vec<Statement>> {
        let content = std::str::from_utf8(&self.bytes).map_err(|e| DriftError::ParseFile {
            file: self.name.clone(),
            message: format!("not valid utf-8: {e}"),
        })?;
        split_statements(&self.name, content)
    }
}

/// A single SQL statement with its byte offset in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// The statement text, without the trailing terminator.
    pub text: String,
    /// Byte offset of the statement's first line in the file.
    pub pos: usize,
}

/// Splits file contents into statements.
///
/// The default terminator is `;` at end of a line. A
/// `-- atlas:delimiter <token>` directive at the file head (before any
/// statement) replaces the terminator for the rest of the file. Comment and
/// blank lines between statements are skipped; lines inside a statement are
/// kept verbatim.
pub fn split_statements(file: &str, content: &str) -> DriftResult<Vec<Statement>> {
    let mut delimiter = ";".to_string();
    let mut stmts = Vec::new();
    let mut buf = String::new();
    let mut buf_pos = 0usize;
    let mut offset = 0usize;
    let mut head = true;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\n', '\r']).trim();
        if head && buf.is_empty() {
            if let Some(token) = trimmed.strip_prefix(DELIMITER_DIRECTIVE) {
                if token.is_empty() || token.trim().is_empty() {
                    return Err(DriftError::ParseFile {
                        file: file.to_string(),
                        message: "delimiter directive without a token".to_string(),
                    });
                }
                if token.starts_with(char::is_whitespace) {
                    delimiter = token.trim().to_string();
                    offset += line.len();
                    continue;
                }
            }
        }
        if buf.is_empty() && (trimmed.is_empty() || trimmed.starts_with("--")) {
            offset += line.len();
            continue;
        }
        head = false;
        if buf.is_empty() {
            buf_pos = offset;
        } else {
            buf.push('\n');
        }
        buf.push_str(trimmed);
        if buf.ends_with(delimiter.as_str()) {
            let text = buf[..buf.len() - delimiter.len()].trim_end().to_string();
            stmts.push(Statement {
                text,
                pos: buf_pos,
            });
            buf.clear();
        }
        offset += line.len();
    }

    if !buf.trim().is_empty() {
        return Err(DriftError::ParseFile {
            file: file.to_string(),
            message: format!("unterminated statement: {buf:?}"),
        });
    }
    Ok(stmts)
}


#[cfg(test)]
mod tests {
    use super::testutil::{cleanup, create_temp_dir};
    use super::*;

    // ── LocalDir tests ──────────────────────────────────────────────

    #[test]
    fn test_open_invalid_url() {
        let err = LocalDir::open("no-scheme-here").unwrap_err();
        assert!(matches!(err, DriftError::InvalidLocation(_)));
        let err = LocalDir::open("s3://bucket/path").unwrap_err();
        assert!(matches!(err, DriftError::InvalidLocation(_)));
    }

    #[test]
    fn test_open_missing_path() {
        let err = LocalDir::open("file:///definitely/not/a/real/path").unwrap_err();
        assert!(matches!(err, DriftError::NotFound(_)));
    }

    #[test]
    fn test_files_sorted_and_filtered() {
        let tmp = create_temp_dir();
        let dir = LocalDir::open(&format!("file://{}", tmp.display())).unwrap();
        dir.write("20230102000000_b.sql", b"CREATE TABLE b (id bigint);\n")
            .unwrap();
        dir.write("20230101000000_a.sql", b"CREATE TABLE a (id bigint);\n")
            .unwrap();
        std::fs::write(tmp.join("README.md"), "notes").unwrap();
        dir.write_sum(&dir.checksum().unwrap()).unwrap();

        let files = dir.files().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].version, "20230101000000");
        assert_eq!(files[0].description, "a");
        assert_eq!(files[1].version, "20230102000000");
        cleanup(&tmp);
    }

    #[test]
    fn test_write_collision() {
        let tmp = create_temp_dir();
        let dir = LocalDir::open(&format!("file://{}", tmp.display())).unwrap();
        dir.write("20230101000000_a.sql", b"SELECT 1;\n").unwrap();
        let err = dir.write("20230101000000_a.sql", b"SELECT 2;\n").unwrap_err();
        assert!(matches!(err, DriftError::Exists(_)));
        cleanup(&tmp);
    }

    #[test]
    fn test_checksum_excludes_manifest() {
        let tmp = create_temp_dir();
        let dir = LocalDir::open(&format!("file://{}", tmp.display())).unwrap();
        dir.write("20230101000000_a.sql", b"SELECT 1;\n").unwrap();
        let before = dir.checksum().unwrap();
        dir.write_sum(&before).unwrap();
        let after = dir.checksum().unwrap();
        assert_eq!(before.render(), after.render());
        cleanup(&tmp);
    }

    #[test]
    fn test_checksum_covers_non_sql_files() {
        let tmp = create_temp_dir();
        let dir = LocalDir::open(&format!("file://{}", tmp.display())).unwrap();
        let before = dir.checksum().unwrap();
        std::fs::write(tmp.join("changes.xml"), "<x/>").unwrap();
        let after = dir.checksum().unwrap();
        assert_ne!(before.render(), after.render());
        cleanup(&tmp);
    }

    // ── MigrationFile tests ─────────────────────────────────────────

    #[test]
    fn test_file_name_parsing() {
        let f = MigrationFile::new("20230101000000_add_users.sql", Vec::new());
        assert_eq!(f.version, "20230101000000");
        assert_eq!(f.description, "add_users");

        let f = MigrationFile::new("20230101000000.sql", Vec::new());
        assert_eq!(f.version, "20230101000000");
        assert_eq!(f.description, "");
    }

    #[test]
    fn test_file_hash_stable() {
        let a = MigrationFile::new("x.sql", b"SELECT 1;\n".to_vec());
        let b = MigrationFile::new("y.sql", b"SELECT 1;\n".to_vec());
        assert_eq!(a.hash(), b.hash());
    }

    // ── Statement parsing tests ─────────────────────────────────────

    #[test]
    fn test_split_basic_statements() {
        let stmts = split_statements(
            "f.sql",
            "CREATE TABLE a (id bigint);\nCREATE TABLE b (id bigint);\n",
        )
        .unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].text, "CREATE TABLE a (id bigint)");
        assert_eq!(stmts[0].pos, 0);
        assert_eq!(stmts[1].pos, 28);
    }

    #[test]
    fn test_split_multiline_statement() {
        let stmts = split_statements(
            "f.sql",
            "CREATE TABLE a (\n  id bigint\n);\nSELECT 1;\n",
        )
        .unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].text, "CREATE TABLE a (\nid bigint\n)");
    }

    #[test]
    fn test_split_skips_leading_comments() {
        let stmts =
            split_statements("f.sql", "-- a comment\n\nSELECT 1;\n-- trailing\n").unwrap();
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].text, "SELECT 1");
        assert_eq!(stmts[0].pos, 14);
    }

    #[test]
    fn test_split_delimiter_directive() {
        let content = "-- atlas:delimiter ;;\nSELECT 1;\nstill same statement;;\nSELECT 2;;\n";
        let stmts = split_statements("f.sql", content).unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].text.contains("SELECT 1;"));
        assert_eq!(stmts[1].text, "SELECT 2");
    }

    #[test]
    fn test_split_unterminated() {
        let err = split_statements("f.sql", "SELECT 1").unwrap_err();
        assert!(matches!(err, DriftError::ParseFile { .. }));
    }

    #[test]
    fn test_split_empty_file() {
        assert!(split_statements("f.sql", "").unwrap().is_empty());
        assert!(split_statements("f.sql", "-- only a comment\n").unwrap().is_empty());
    }
}
