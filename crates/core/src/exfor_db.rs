//! exfor-db: cached retrieval and dataset merging over a flat-file
//! EXFOR nuclear reaction database.
//!
//! The database root is a directory tree with one subdirectory per logical
//! group and one file per physical record. A record is named by a
//! [`RecordKey`] `(subdirectory, filename)`.
//!
//! Three pieces sit on top of that tree:
//!
//! - [`RecordCache`]: a one-time bulk scan of the root into memory, for
//!   workloads that issue many overlapping queries.
//! - [`RetrievalPipeline`]: turns a [`Query`] into record keys (through an
//!   [`IndexManager`]) and then into parsed [`Entry`] values (through an
//!   [`EntryParser`]).
//! - [`DatasetMerger`]: concatenates [`SimplifiedDataFragment`]s taken from
//!   several subentries into one sorted dataset with a fixed text report.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use exfor_db::{DatabaseConfig, DatasetMerger, PlainFsManager, Query, RetrievalPipeline};
//! # struct MyParser;
//! # impl exfor_db::EntryParser for MyParser {
//! #     fn parse(&self, _: &exfor_db::RecordKey, _: &[String])
//! #         -> exfor_db::Result<exfor_db::RawEntry> { unimplemented!() }
//! # }
//!
//! let config = DatabaseConfig::from_env();
//! let manager = PlainFsManager::open(&config).unwrap();
//! let pipeline = RetrievalPipeline::new(manager, MyParser);
//!
//! let query = Query::new().quantity("SIG").target("PU-239").reaction("N,2N");
//! let mut merged = DatasetMerger::new();
//! for entry in pipeline.retrieve(&query).unwrap().values() {
//!     for fragment in entry.simplified_data_sets(true).into_values() {
//!         merged.append(fragment);
//!     }
//! }
//! merged.sort();
//! println!("{}", merged.serialize());
//! ```

mod config;
mod dataset;
mod entry;
mod manager;
mod pipeline;
mod query;
mod record_cache;

pub use config::DatabaseConfig;
pub use dataset::{format_value, Contribution, DatasetMerger, MergeState};
pub use entry::{
    DataPoint, DataSetKey, Entry, Monitor, Provenance, RawEntry, SimplifiedDataFragment, Subentry,
    SubentryDataSet, ABSENT_AUTHOR_PLACEHOLDER, UNKNOWN, UNKNOWN_SUBENTRY,
};
pub use manager::{EntryParser, IndexManager, IndexRow, PlainFsManager};
pub use pipeline::RetrievalPipeline;
pub use query::Query;
pub use record_cache::{RecordCache, RecordKey};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ExforError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("malformed record: {0}")]
    Malformed(String),
    #[error("i/o error: {0}")]
    Io(String),
    #[error("corrupt index: {0}")]
    Index(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<std::io::Error> for ExforError {
    fn from(e: std::io::Error) -> Self {
        ExforError::Io(e.to_string())
    }
}
impl From<walkdir::Error> for ExforError {
    fn from(e: walkdir::Error) -> Self {
        ExforError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExforError>;
