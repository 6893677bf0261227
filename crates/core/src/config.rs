use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where the database lives on disk and how records are fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Base data directory holding the record tree and the index.
    pub data_path: PathBuf,
    /// Subdirectory of `data_path` holding the record tree.
    pub db_dir: String,
    /// File name of the JSON-lines index inside `data_path`.
    pub index_file: String,
    /// Serve record text from the process-wide [`RecordCache`](crate::RecordCache)
    /// instead of reading each file on demand.
    pub use_cache: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data"),
            db_dir: "db".to_string(),
            index_file: "index.jsonl".to_string(),
            use_cache: false,
        }
    }
}

impl DatabaseConfig {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            ..Self::default()
        }
    }

    /// Defaults, overridden by `EXFOR_DATA_PATH` and `EXFOR_USE_CACHE`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = env::var("EXFOR_DATA_PATH") {
            config.data_path = PathBuf::from(path);
        }
        if let Ok(flag) = env::var("EXFOR_USE_CACHE") {
            config.use_cache = parse_flag(&flag);
        }
        config
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_path.join(&self.db_dir)
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_path.join(&self.index_file)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
