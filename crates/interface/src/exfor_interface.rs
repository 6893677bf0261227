//! High-level query, merge and report API built on `exfor-db`.
//!
//! One [`ExforSession`] owns a retrieval pipeline over a configured
//! database and runs the whole "query → retrieve → extract fragments →
//! merge → sort → report" workflow in one call.
//!
//! # Usage
//!
//! ```rust,no_run
//! use exfor_interface::{DatabaseConfig, ExforSession, Query};
//! # struct MyParser;
//! # impl exfor_interface::EntryParser for MyParser {
//! #     fn parse(&self, _: &exfor_interface::RecordKey, _: &[String])
//! #         -> exfor_interface::Result<exfor_interface::RawEntry> { unimplemented!() }
//! # }
//!
//! let session = ExforSession::open(&DatabaseConfig::from_env(), MyParser).unwrap();
//!
//! // Which records hold Pu-239 (n,2n) cross sections?
//! let query = Query::new().quantity("SIG").target("PU-239").reaction("N,2N");
//! let keys = session.query(&query).unwrap();
//!
//! // Merge every matching data table into one sorted report.
//! let report = session.report(&query, true).unwrap();
//! println!("{report}");
//! ```

use std::collections::BTreeMap;

use exfor_db::{IndexManager, PlainFsManager, RetrievalPipeline};
use tracing::{debug, info};

pub use exfor_db::{
    DataPoint, DataSetKey, DatabaseConfig, DatasetMerger, Entry, EntryParser, Monitor, Provenance,
    Query, RawEntry, RecordCache, RecordKey, SimplifiedDataFragment,
};
pub use exfor_db::ExforError as Error;
pub type Result<T> = std::result::Result<T, Error>;

/// A database opened for querying and merging.
///
/// This is the primary entry point for analysis code. It wraps a
/// [`RetrievalPipeline`] with the merge workflow most callers want.
pub struct ExforSession<P, M = PlainFsManager> {
    pipeline: RetrievalPipeline<M, P>,
}

impl<P: EntryParser> ExforSession<P> {
    /// Open the database described by `config`, parsing records with
    /// `parser`.
    ///
    /// With `config.use_cache` set, record text is served by the
    /// process-wide [`RecordCache`] for the database root, shared with
    /// every other session on the same root.
    pub fn open(config: &DatabaseConfig, parser: P) -> Result<Self> {
        let manager = PlainFsManager::open(config)?;
        let mut pipeline = RetrievalPipeline::new(manager, parser);
        if config.use_cache {
            pipeline = pipeline.with_shared_cache();
        }
        info!(
            root = %config.db_path().display(),
            cached = config.use_cache,
            "exfor session opened"
        );
        Ok(Self { pipeline })
    }
}

impl<P: EntryParser, M: IndexManager> ExforSession<P, M> {
    /// Wrap an already assembled pipeline.
    pub fn from_pipeline(pipeline: RetrievalPipeline<M, P>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &RetrievalPipeline<M, P> {
        &self.pipeline
    }

    /// Keys of the records matching `query`.
    pub fn query(&self, query: &Query) -> Result<Vec<RecordKey>> {
        self.pipeline.query(query)
    }

    /// Matching records in the parser's raw form.
    pub fn raw_retrieve(&self, query: &Query) -> Result<BTreeMap<RecordKey, RawEntry>> {
        self.pipeline.raw_retrieve(query)
    }

    /// Matching records as typed entries.
    pub fn retrieve(&self, query: &Query) -> Result<BTreeMap<RecordKey, Entry>> {
        self.pipeline.retrieve(query)
    }

    /// Every data table of every matching record, ordered by record key
    /// and then by `(entry, subentry, pointer, index)`. Every data set of
    /// every record is present; none is folded into another.
    pub fn data_sets(
        &self,
        query: &Query,
        prefer_monitor_normalized: bool,
    ) -> Result<Vec<(DataSetKey, SimplifiedDataFragment)>> {
        let entries = self.pipeline.retrieve(query)?;
        Ok(entries
            .values()
            .flat_map(|entry| entry.simplified_data_sets(prefer_monitor_normalized))
            .collect())
    }

    /// Merge every matching data table into one sorted dataset.
    pub fn merge(&self, query: &Query, prefer_monitor_normalized: bool) -> Result<DatasetMerger> {
        let data_sets = self.data_sets(query, prefer_monitor_normalized)?;
        let fragments = data_sets.len();
        let mut merged: DatasetMerger = data_sets
            .into_iter()
            .map(|(_, fragment)| fragment)
            .collect();
        merged.sort();
        debug!(fragments, points = merged.len(), "merged data sets");
        Ok(merged)
    }

    /// Text report of [`merge`](Self::merge).
    pub fn report(&self, query: &Query, prefer_monitor_normalized: bool) -> Result<String> {
        Ok(self.merge(query, prefer_monitor_normalized)?.serialize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exfor_db::{IndexRow, Subentry, SubentryDataSet};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    struct JsonParser;

    impl EntryParser for JsonParser {
        fn parse(&self, key: &RecordKey, lines: &[String]) -> Result<RawEntry> {
            serde_json::from_str(&lines.join("\n"))
                .map_err(|e| Error::Malformed(format!("{key}: {e}")))
        }
    }

    fn store(config: &DatabaseConfig, key: &str, raw: &RawEntry, target: &str) -> IndexRow {
        let key: RecordKey = key.parse().unwrap();
        let path = key.path_under(&config.db_path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string(raw).unwrap()).unwrap();
        IndexRow {
            key,
            entry: raw.accession.clone(),
            subentry: raw.subentries[0].id.clone(),
            quantity: "SIG".to_string(),
            target: target.to_string(),
            reaction: "N,2N".to_string(),
            monitored: false,
        }
    }

    fn entry(accession: &str, subentry: &str, reaction: &str, points: &[(f64, f64)]) -> RawEntry {
        let fragment = SimplifiedDataFragment::new()
            .reaction(reaction)
            .points(points.iter().map(|&(x, y)| (x, y, 0.0, 0.0)));
        RawEntry::new(accession)
            .with_subentry(Subentry::new(subentry).with_data_set(SubentryDataSet::new(fragment)))
    }

    fn write_index(data_path: &Path, rows: &[IndexRow]) {
        let lines: Vec<String> = rows
            .iter()
            .map(|row| serde_json::to_string(row).unwrap())
            .collect();
        fs::write(data_path.join("index.jsonl"), lines.join("\n")).unwrap();
    }

    fn open_temp_session(use_cache: bool) -> (ExforSession<JsonParser>, TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let config = DatabaseConfig::new(tmp.path()).with_cache(use_cache);
        let rows = vec![
            store(
                &config,
                "219/21971.x4",
                &entry("21971", "21971002", "Pu-239 (n,2n)", &[(8.0, 0.49), (6.5, 0.419)]),
                "PU-239",
            ),
            store(
                &config,
                "207/20795.x4",
                &entry("20795", "20795002", "239Pu(n,2n)", &[(7.1, 0.451)]),
                "PU-239",
            ),
            store(
                &config,
                "130/13011.x4",
                &entry("13011", "13011002", "238U(n,2n)", &[(14.0, 0.7)]),
                "U-238",
            ),
        ];
        write_index(tmp.path(), &rows);
        let session = ExforSession::open(&config, JsonParser).unwrap();
        (session, tmp)
    }

    #[test]
    fn query_lists_matching_records() {
        let (session, _tmp) = open_temp_session(false);
        let keys = session.query(&Query::new().target("PU-239")).unwrap();
        assert_eq!(
            keys,
            vec![
                RecordKey::new("207", "20795.x4"),
                RecordKey::new("219", "21971.x4"),
            ]
        );
    }

    #[test]
    fn merge_sorts_points_from_every_record() {
        let (session, _tmp) = open_temp_session(false);
        let merged = session.merge(&Query::new().target("PU-239"), true).unwrap();
        let xs: Vec<f64> = merged.points().iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![6.5, 7.1, 8.0]);
        // 207/20795.x4 sorts before 219/21971.x4, so it is appended first.
        assert_eq!(merged.reaction(), Some("239Pu(n,2n)"));
    }

    #[test]
    fn report_uses_first_record_metadata() {
        let (session, _tmp) = open_temp_session(false);
        let report = session.report(&Query::new().target("PU-239"), true).unwrap();
        assert!(report.contains("#  Subent:    20795002\n"));
        assert!(report.ends_with(
            "        8.0           0.49          0.0           0.0\n"
        ));
    }

    #[test]
    fn cached_session_reads_through_shared_cache() {
        let (session, tmp) = open_temp_session(true);
        assert!(session.pipeline().uses_cache());
        let report = session.report(&Query::new().target("U-238"), false).unwrap();
        assert!(report.contains("#  Reaction:  238U(n,2n)\n"));

        let shared = RecordCache::shared(tmp.path().join("db"));
        assert!(shared.is_populated());
        assert_eq!(shared.len().unwrap(), 3);
    }

    #[test]
    fn unmatched_query_merges_to_empty_report() {
        let (session, _tmp) = open_temp_session(false);
        let merged = session.merge(&Query::new().target("FE-56"), true).unwrap();
        assert!(merged.is_empty());
        assert!(merged.serialize().ends_with("barns         MeV           barns\n"));
    }

    #[test]
    fn data_sets_are_keyed_by_subentry() {
        let (session, _tmp) = open_temp_session(false);
        let sets = session.data_sets(&Query::new(), false).unwrap();
        let subentries: Vec<&str> = sets.iter().map(|(k, _)| k.subentry.as_str()).collect();
        assert_eq!(subentries, ["13011002", "20795002", "21971002"]);
    }

    #[test]
    fn missing_index_fails_to_open() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ExforSession::open(&DatabaseConfig::new(tmp.path()), JsonParser)
            .err()
            .unwrap();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
