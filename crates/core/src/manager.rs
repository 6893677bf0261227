//! Collaborator seams: the index manager that resolves queries to record
//! keys, and the parser that turns record text into entries.

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::record_cache::decode_lines;
use crate::{DatabaseConfig, ExforError, Query, RawEntry, RecordKey, Result};

/// Resolves queries against the database index and fetches record text.
pub trait IndexManager {
    /// Keys of every record matching `query`. No match is an empty list.
    fn query(&self, query: &Query) -> Result<Vec<RecordKey>>;

    /// Raw text lines of one record, read straight from disk.
    fn retrieve_raw(&self, key: &RecordKey) -> Result<Vec<String>>;

    /// Database root the manager reads records from.
    fn root(&self) -> &Path;
}

/// Builds an entry from the text of one record.
///
/// Implementations report unreadable text as [`ExforError::Malformed`].
pub trait EntryParser {
    fn parse(&self, key: &RecordKey, lines: &[String]) -> Result<RawEntry>;
}

impl<F> EntryParser for F
where
    F: Fn(&RecordKey, &[String]) -> Result<RawEntry>,
{
    fn parse(&self, key: &RecordKey, lines: &[String]) -> Result<RawEntry> {
        self(key, lines)
    }
}

// ---------------------------------------------------------------------------
// Plain filesystem manager
// ---------------------------------------------------------------------------

/// One line of the JSON-lines index: a subentry and the record holding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRow {
    pub key: RecordKey,
    pub entry: String,
    pub subentry: String,
    pub quantity: String,
    pub target: String,
    pub reaction: String,
    #[serde(default)]
    pub monitored: bool,
}

impl IndexRow {
    /// Does this row satisfy every filter set on `query`?
    pub fn matches(&self, query: &Query) -> bool {
        fn field(filter: &Option<String>, value: &str) -> bool {
            filter
                .as_deref()
                .is_none_or(|wanted| wanted.eq_ignore_ascii_case(value))
        }

        field(&query.quantity, &self.quantity)
            && field(&query.target, &self.target)
            && field(&query.reaction, &self.reaction)
            && field(&query.entry, &self.entry)
            && field(&query.subentry, &self.subentry)
            && query.monitored.is_none_or(|m| m == self.monitored)
    }
}

/// Index manager over a database root and a JSON-lines index file.
#[derive(Debug, Clone)]
pub struct PlainFsManager {
    root: PathBuf,
    rows: Vec<IndexRow>,
}

impl PlainFsManager {
    /// Open the database described by `config`.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        Self::from_index_file(config.db_path(), config.index_path())
    }

    /// Load the index at `index_path` for records under `root`.
    pub fn from_index_file(root: impl Into<PathBuf>, index_path: impl AsRef<Path>) -> Result<Self> {
        let index_path = index_path.as_ref();
        let file = fs::File::open(index_path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                ExforError::NotFound(format!("index file {}", index_path.display()))
            }
            _ => ExforError::from(e),
        })?;
        let rows = read_index(BufReader::new(file))?;
        info!(index = %index_path.display(), rows = rows.len(), "index loaded");
        Ok(Self::from_rows(root, rows))
    }

    /// Build a manager from rows already in memory.
    pub fn from_rows(root: impl Into<PathBuf>, rows: Vec<IndexRow>) -> Self {
        Self {
            root: root.into(),
            rows,
        }
    }

    pub fn rows(&self) -> &[IndexRow] {
        &self.rows
    }
}

impl IndexManager for PlainFsManager {
    fn query(&self, query: &Query) -> Result<Vec<RecordKey>> {
        let keys: BTreeSet<&RecordKey> = self
            .rows
            .iter()
            .filter(|row| row.matches(query))
            .map(|row| &row.key)
            .collect();
        debug!(matches = keys.len(), "index query");
        Ok(keys.into_iter().cloned().collect())
    }

    fn retrieve_raw(&self, key: &RecordKey) -> Result<Vec<String>> {
        let path = key.path_under(&self.root);
        match fs::read(&path) {
            Ok(bytes) => Ok(decode_lines(&bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ExforError::NotFound(format!(
                "record {key} ({})",
                path.display()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

fn read_index<R: BufRead>(reader: R) -> Result<Vec<IndexRow>> {
    let mut rows = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(&line)
            .map_err(|e| ExforError::Index(format!("line {}: {e}", n + 1)))?;
        rows.push(row);
    }
    Ok(rows)
}
