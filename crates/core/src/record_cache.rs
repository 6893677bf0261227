//! Process-wide record cache over the on-disk database root.
//!
//! The first lookup of any kind scans the whole root once and keeps every
//! record in memory for the lifetime of the cache. There is no eviction and
//! no re-scan: a root that appears after the scan stays invisible, and a
//! scan that failed keeps failing.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, OnceLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{ExforError, Result};

/// Identity of one physical record: `(subdirectory, filename)` under the
/// database root.
///
/// Renders and parses as `"subdir/filename"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordKey {
    subdir: String,
    file: String,
}

impl RecordKey {
    pub fn new(subdir: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            subdir: subdir.into(),
            file: file.into(),
        }
    }

    pub fn subdir(&self) -> &str {
        &self.subdir
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// Location of this record below `root`.
    pub fn path_under(&self, root: &Path) -> PathBuf {
        root.join(&self.subdir).join(&self.file)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subdir, self.file)
    }
}

impl FromStr for RecordKey {
    type Err = ExforError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((subdir, file))
                if !subdir.is_empty() && !file.is_empty() && !file.contains('/') =>
            {
                Ok(Self::new(subdir, file))
            }
            _ => Err(ExforError::Malformed(format!(
                "record key {s:?} is not of the form subdir/filename"
            ))),
        }
    }
}

impl TryFrom<String> for RecordKey {
    type Error = ExforError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<RecordKey> for String {
    fn from(key: RecordKey) -> Self {
        key.to_string()
    }
}

type RecordMap = HashMap<RecordKey, Vec<String>>;

/// Lazily populated, never-evicting map from [`RecordKey`] to the record's
/// text lines.
///
/// Population happens at most once per instance, guarded by a
/// [`OnceLock`], so concurrent first lookups share a single scan. After
/// that the map is read-only and safe for any number of readers.
pub struct RecordCache {
    root: PathBuf,
    /// Outcome of the one and only scan. A failure is kept as its message
    /// so every later lookup reports the same condition.
    records: OnceLock<std::result::Result<RecordMap, String>>,
}

fn shared_caches() -> &'static Mutex<HashMap<PathBuf, Arc<RecordCache>>> {
    static SHARED: OnceLock<Mutex<HashMap<PathBuf, Arc<RecordCache>>>> = OnceLock::new();
    SHARED.get_or_init(|| Mutex::new(HashMap::new()))
}

impl RecordCache {
    /// Create a private, not yet populated cache over `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            records: OnceLock::new(),
        }
    }

    /// The process-wide cache for `root`.
    ///
    /// Every call with the same root returns the same instance, so the
    /// bulk scan runs once per process no matter how many pipelines use it.
    pub fn shared(root: impl Into<PathBuf>) -> Arc<Self> {
        let root = root.into();
        let mut caches = shared_caches()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        caches
            .entry(root.clone())
            .or_insert_with(|| Arc::new(Self::new(root)))
            .clone()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the one-time scan has already run (successfully or not).
    pub fn is_populated(&self) -> bool {
        self.records.get().is_some()
    }

    /// Run the bulk scan if it has not run yet.
    ///
    /// Returns the scan failure, if any. The outcome is fixed after the
    /// first call.
    pub fn ensure_populated(&self) -> Result<()> {
        self.records().map(|_| ())
    }

    /// Lines of the record named by `key`.
    pub fn get(&self, key: &RecordKey) -> Result<&[String]> {
        self.records()?
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| ExforError::NotFound(format!("record {key} is not in the cache")))
    }

    pub fn contains(&self, key: &RecordKey) -> Result<bool> {
        Ok(self.records()?.contains_key(key))
    }

    /// Number of cached records (populates on first call).
    pub fn len(&self) -> Result<usize> {
        Ok(self.records()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// All cached keys in ascending order.
    pub fn keys(&self) -> Result<Vec<RecordKey>> {
        let mut keys: Vec<RecordKey> = self.records()?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn records(&self) -> Result<&RecordMap> {
        self.records
            .get_or_init(|| scan_root(&self.root).map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|msg| ExforError::Io(format!("record cache scan failed: {msg}")))
    }
}

impl fmt::Debug for RecordCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordCache")
            .field("root", &self.root)
            .field("populated", &self.is_populated())
            .finish()
    }
}

/// Read every `root/<subdir>/<file>` into memory.
///
/// A missing root is an empty database, not an error. A root whose
/// existence cannot be determined fails the scan.
fn scan_root(root: &Path) -> Result<RecordMap> {
    let mut records = RecordMap::new();
    if !root.try_exists()? {
        warn!(root = %root.display(), "database root does not exist; cache is empty");
        return Ok(records);
    }

    for entry in WalkDir::new(root).min_depth(2).max_depth(2) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let (Some(subdir), Some(file)) = (
            path.parent()
                .and_then(Path::file_name)
                .and_then(|name| name.to_str()),
            path.file_name().and_then(|name| name.to_str()),
        ) else {
            debug!(path = %path.display(), "skipping record with non UTF-8 name");
            continue;
        };
        let bytes = fs::read(path)?;
        records.insert(RecordKey::new(subdir, file), decode_lines(&bytes));
    }

    info!(root = %root.display(), records = records.len(), "record cache populated");
    Ok(records)
}

pub(crate) fn decode_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::to_string)
        .collect()
}
