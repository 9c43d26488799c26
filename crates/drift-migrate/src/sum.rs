//! The directory integrity manifest.
//!
//! The manifest (`atlas.sum`) is a flat mapping from file name to the
//! base64-encoded SHA-256 of its contents, preceded by an `h1:` header
//! hashing the concatenated entries. The manifest file itself is excluded
//! from the computation. For a clean directory, recomputing the manifest
//! yields byte-identical contents.
//!
//! Layout:
//!
//! ```text
//! h1:<base64-sha256-of-concatenated-entries>
//! <filename1> h1:<base64-sha256-of-file1>
//! <filename2> h1:<base64-sha256-of-file2>
//! ```
//!
//! Entries are sorted by filename and a trailing newline is required.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use drift_core::{DriftError, DriftResult};

use crate::dir::{Dir, SUM_FILENAME};

/// Returns the base64-encoded SHA-256 of the given bytes.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    STANDARD.encode(hasher.finalize())
}

/// A computed or parsed integrity manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SumFile {
    entries: Vec<(String, String)>,
}

impl SumFile {
    /// Adds a file's entry, keeping entries sorted by name.
    pub fn add(&mut self, name: &str, bytes: &[u8]) {
        self.entries.push((name.to_string(), hash_bytes(bytes)));
        self.entries.sort();
    }

    /// Returns the recorded hash for a file name.
    pub fn hash_of(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, h)| h.as_str())
    }

    /// Returns the entry count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the manifest has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Computes the `h1:` header value over the concatenated entries.
    fn total(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, hash) in &self.entries {
            hasher.update(name.as_bytes());
            hasher.update(b"h1:");
            hasher.update(hash.as_bytes());
        }
        STANDARD.encode(hasher.finalize())
    }

    /// Renders the manifest to its on-disk form.
    pub fn render(&self) -> String {
        let mut out = format!("h1:{}\n", self.total());
        for (name, hash) in &self.entries {
            out.push_str(&format!("{name} h1:{hash}\n"));
        }
        out
    }

    /// Parses an on-disk manifest.
    ///
    /// Structural errors are parse failures; a header that does not match
    /// the entries is left for [`validate`] to report, since the byte
    /// comparison there covers it.
    pub fn parse(input: &str) -> DriftResult<Self> {
        let mut lines = input.lines();
        let header = lines.next().unwrap_or_default();
        if !header.starts_with("h1:") {
            return Err(DriftError::ParseFile {
                file: SUM_FILENAME.to_string(),
                message: "missing h1 header".to_string(),
            });
        }
        let mut entries = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (name, hash) = line.rsplit_once(" h1:").ok_or_else(|| DriftError::ParseFile {
                file: SUM_FILENAME.to_string(),
                message: format!("malformed entry: {line:?}"),
            })?;
            entries.push((name.to_string(), hash.to_string()));
        }
        entries.sort();
        Ok(Self { entries })
    }
}

impl std::fmt::Display for SumFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

/// Recomputes the directory manifest and compares it byte-for-byte with
/// the stored one.
///
/// This is the gate run before every operation that trusts the directory.
/// A missing manifest over a non-empty directory is a mismatch too.
pub fn validate(dir: &dyn Dir) -> DriftResult<()> {
    let computed = dir.checksum()?;
    match dir.read_sum()? {
        None if computed.is_empty() => Ok(()),
        None => Err(DriftError::ChecksumMismatch),
        Some(stored) if stored == computed.render() => Ok(()),
        Some(_) => Err(DriftError::ChecksumMismatch),
    }
}
