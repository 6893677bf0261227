//! Query dispatch: filters → record keys → record text → entries.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::{Entry, EntryParser, IndexManager, Query, RawEntry, RecordCache, RecordKey, Result};

/// Resolves queries through an [`IndexManager`] and builds entries with an
/// [`EntryParser`].
///
/// Record text comes from the attached [`RecordCache`] when there is one,
/// otherwise straight from the manager. The pipeline only reads from the
/// cache; it never changes how or when the cache is populated. Errors from
/// the manager, the cache and the parser are returned unchanged.
pub struct RetrievalPipeline<M, P> {
    manager: M,
    parser: P,
    cache: Option<Arc<RecordCache>>,
}

impl<M: IndexManager, P: EntryParser> RetrievalPipeline<M, P> {
    pub fn new(manager: M, parser: P) -> Self {
        Self {
            manager,
            parser,
            cache: None,
        }
    }

    /// Fetch record text through `cache`.
    pub fn with_cache(mut self, cache: Arc<RecordCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Fetch record text through the process-wide cache for the
    /// manager's database root.
    pub fn with_shared_cache(self) -> Self {
        let cache = RecordCache::shared(self.manager.root());
        self.with_cache(cache)
    }

    pub fn uses_cache(&self) -> bool {
        self.cache.is_some()
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    /// Keys of the matching records; no content is fetched.
    pub fn query(&self, query: &Query) -> Result<Vec<RecordKey>> {
        self.manager.query(query)
    }

    /// Parse every matching record into the parser's raw entry form.
    pub fn raw_retrieve(&self, query: &Query) -> Result<BTreeMap<RecordKey, RawEntry>> {
        let keys = self.manager.query(query)?;
        debug!(
            matches = keys.len(),
            cached = self.uses_cache(),
            "retrieving records"
        );
        let mut entries = BTreeMap::new();
        for key in keys {
            let raw = self.parse_record(&key)?;
            entries.insert(key, raw);
        }
        Ok(entries)
    }

    /// Like [`raw_retrieve`](Self::raw_retrieve), with each result wrapped
    /// in an [`Entry`].
    pub fn retrieve(&self, query: &Query) -> Result<BTreeMap<RecordKey, Entry>> {
        Ok(self
            .raw_retrieve(query)?
            .into_iter()
            .map(|(key, raw)| (key.clone(), Entry::new(key, raw)))
            .collect())
    }

    fn parse_record(&self, key: &RecordKey) -> Result<RawEntry> {
        match &self.cache {
            Some(cache) => self.parser.parse(key, cache.get(key)?),
            None => {
                let lines = self.manager.retrieve_raw(key)?;
                self.parser.parse(key, &lines)
            }
        }
    }
}
