//! Parsed records and the simplified data fragments they yield.
//!
//! The record grammar lives outside this crate: an
//! [`EntryParser`](crate::EntryParser) turns raw lines into a [`RawEntry`],
//! and [`Entry`] wraps it for downstream consumers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::RecordKey;

/// Rendered for any provenance field that no fragment supplied.
pub const UNKNOWN: &str = "unknown";

/// Rendered for an unknown subentry accession number.
pub const UNKNOWN_SUBENTRY: &str = "????????";

/// Absent-value token for the author list.
///
/// Reports render it character by character (`N, o, n, e`) so that their
/// text matches reports produced before authors were modelled as a list.
pub const ABSENT_AUTHOR_PLACEHOLDER: &str = "None";

// ---------------------------------------------------------------------------
// Fragment model
// ---------------------------------------------------------------------------

/// One measured point: independent value, dependent value and their
/// uncertainties. A zero uncertainty means "not reported".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
}

impl DataPoint {
    pub fn new(x: f64, y: f64, dx: f64, dy: f64) -> Self {
        Self { x, y, dx, dy }
    }
}

impl From<(f64, f64, f64, f64)> for DataPoint {
    fn from((x, y, dx, dy): (f64, f64, f64, f64)) -> Self {
        Self { x, y, dx, dy }
    }
}

/// A reference measurement used to normalize the reported quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    /// Monitor reaction identity, e.g. `(92-U-238(N,F),SIG)`.
    pub reaction: String,
    /// Normalization value as written in the record.
    pub normalization: String,
    pub annotation: Option<String>,
}

impl Monitor {
    pub fn new(reaction: impl Into<String>, normalization: impl Into<String>) -> Self {
        Self {
            reaction: reaction.into(),
            normalization: normalization.into(),
            annotation: None,
        }
    }

    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }
}

/// Bibliographic provenance of a fragment.
///
/// `None` means the source did not supply the field; the report renders
/// the documented default instead ([`UNKNOWN`], [`UNKNOWN_SUBENTRY`] or the
/// placeholder author token).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Provenance {
    pub authors: Option<Vec<String>>,
    pub title: Option<String>,
    pub year: Option<String>,
    pub institute: Option<String>,
    pub reference: Option<String>,
    pub subentry: Option<String>,
}

/// The unit a [`DatasetMerger`](crate::DatasetMerger) consumes: one data
/// series with its provenance, reaction and monitors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplifiedDataFragment {
    pub provenance: Provenance,
    /// Human-readable description of the measured reaction.
    pub reaction: Option<String>,
    pub monitors: Vec<Monitor>,
    pub points: Vec<DataPoint>,
}

impl SimplifiedDataFragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reaction(mut self, reaction: impl Into<String>) -> Self {
        self.reaction = Some(reaction.into());
        self
    }

    /// Set the author list. An empty list counts as "no known authors".
    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let authors: Vec<String> = authors.into_iter().map(Into::into).collect();
        self.provenance.authors = (!authors.is_empty()).then_some(authors);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.provenance.title = Some(title.into());
        self
    }

    pub fn year(mut self, year: impl Into<String>) -> Self {
        self.provenance.year = Some(year.into());
        self
    }

    pub fn institute(mut self, institute: impl Into<String>) -> Self {
        self.provenance.institute = Some(institute.into());
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.provenance.reference = Some(reference.into());
        self
    }

    pub fn subentry(mut self, subentry: impl Into<String>) -> Self {
        self.provenance.subentry = Some(subentry.into());
        self
    }

    pub fn monitor(mut self, monitor: Monitor) -> Self {
        self.monitors.push(monitor);
        self
    }

    pub fn point(mut self, point: impl Into<DataPoint>) -> Self {
        self.points.push(point.into());
        self
    }

    pub fn points<I, P>(mut self, points: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<DataPoint>,
    {
        self.points.extend(points.into_iter().map(Into::into));
        self
    }
}

// ---------------------------------------------------------------------------
// Parsed records
// ---------------------------------------------------------------------------

/// One data table of a subentry, in the variants the parser could build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubentryDataSet {
    /// Pointer distinguishing several tables within one subentry.
    pub pointer: Option<String>,
    pub as_reported: SimplifiedDataFragment,
    /// The same table renormalized to its monitor, when the parser could
    /// compute it.
    pub monitor_normalized: Option<SimplifiedDataFragment>,
}

impl SubentryDataSet {
    pub fn new(as_reported: SimplifiedDataFragment) -> Self {
        Self {
            pointer: None,
            as_reported,
            monitor_normalized: None,
        }
    }

    pub fn with_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.pointer = Some(pointer.into());
        self
    }

    pub fn with_monitor_normalized(mut self, fragment: SimplifiedDataFragment) -> Self {
        self.monitor_normalized = Some(fragment);
        self
    }

    /// The variant to hand to a merger.
    pub fn select(&self, prefer_monitor_normalized: bool) -> &SimplifiedDataFragment {
        match (&self.monitor_normalized, prefer_monitor_normalized) {
            (Some(normalized), true) => normalized,
            _ => &self.as_reported,
        }
    }
}

/// A substructure of an entry, typically one measured quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subentry {
    /// Subentry accession number, e.g. `21971002`.
    pub id: String,
    pub data_sets: Vec<SubentryDataSet>,
}

impl Subentry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data_sets: Vec::new(),
        }
    }

    pub fn with_data_set(mut self, data_set: SubentryDataSet) -> Self {
        self.data_sets.push(data_set);
        self
    }

    /// Fragments of this subentry, one per data set, in record order.
    ///
    /// A fragment that carries no subentry id is stamped with this
    /// subentry's id.
    pub fn simplified_data_sets(
        &self,
        prefer_monitor_normalized: bool,
    ) -> Vec<(Option<String>, SimplifiedDataFragment)> {
        self.data_sets
            .iter()
            .map(|data_set| {
                let mut fragment = data_set.select(prefer_monitor_normalized).clone();
                if fragment.provenance.subentry.is_none() {
                    fragment.provenance.subentry = Some(self.id.clone());
                }
                (data_set.pointer.clone(), fragment)
            })
            .collect()
    }
}

/// What an [`EntryParser`](crate::EntryParser) builds from one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntry {
    /// Entry accession number, e.g. `21971`.
    pub accession: String,
    pub subentries: Vec<Subentry>,
}

impl RawEntry {
    pub fn new(accession: impl Into<String>) -> Self {
        Self {
            accession: accession.into(),
            subentries: Vec::new(),
        }
    }

    pub fn with_subentry(mut self, subentry: Subentry) -> Self {
        self.subentries.push(subentry);
        self
    }
}

/// Ordering key of a fragment extracted from an entry.
///
/// `index` is the data set's position within the whole entry, in record
/// order. It keeps two data sets distinct when they share subentry id and
/// pointer, so no fragment is dropped on the way to a merger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataSetKey {
    pub entry: String,
    pub subentry: String,
    pub pointer: Option<String>,
    pub index: usize,
}

/// Typed view over a parsed record, as returned by
/// [`RetrievalPipeline::retrieve`](crate::RetrievalPipeline::retrieve).
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    key: RecordKey,
    raw: RawEntry,
}

impl Entry {
    pub fn new(key: RecordKey, raw: RawEntry) -> Self {
        Self { key, raw }
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn accession(&self) -> &str {
        &self.raw.accession
    }

    pub fn subentries(&self) -> &[Subentry] {
        &self.raw.subentries
    }

    pub fn subentry(&self, id: &str) -> Option<&Subentry> {
        self.raw.subentries.iter().find(|s| s.id == id)
    }

    pub fn raw(&self) -> &RawEntry {
        &self.raw
    }

    pub fn into_raw(self) -> RawEntry {
        self.raw
    }

    /// Every fragment of every subentry, keyed by
    /// `(entry, subentry, pointer, index)` so iteration order is
    /// deterministic. Each data set yields exactly one fragment.
    pub fn simplified_data_sets(
        &self,
        prefer_monitor_normalized: bool,
    ) -> BTreeMap<DataSetKey, SimplifiedDataFragment> {
        let mut out = BTreeMap::new();
        let fragments = self.raw.subentries.iter().flat_map(|subentry| {
            subentry
                .simplified_data_sets(prefer_monitor_normalized)
                .into_iter()
                .map(move |(pointer, fragment)| (subentry, pointer, fragment))
        });
        for (index, (subentry, pointer, fragment)) in fragments.enumerate() {
            let key = DataSetKey {
                entry: self.raw.accession.clone(),
                subentry: subentry.id.clone(),
                pointer,
                index,
            };
            out.insert(key, fragment);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(reaction: &str, x: f64) -> SimplifiedDataFragment {
        SimplifiedDataFragment::new()
            .reaction(reaction)
            .point((x, 1.0, 0.0, 0.1))
    }

    fn sample_entry() -> Entry {
        let raw = RawEntry::new("21971")
            .with_subentry(
                Subentry::new("21971003").with_data_set(
                    SubentryDataSet::new(fragment("as reported", 7.0))
                        .with_monitor_normalized(fragment("normalized", 7.0)),
                ),
            )
            .with_subentry(
                Subentry::new("21971002")
                    .with_data_set(SubentryDataSet::new(fragment("b", 6.0)).with_pointer("2"))
                    .with_data_set(SubentryDataSet::new(fragment("a", 6.0)).with_pointer("1")),
            );
        Entry::new(RecordKey::new("219", "21971.x4"), raw)
    }

    #[test]
    fn empty_author_list_counts_as_absent() {
        let f = SimplifiedDataFragment::new().authors(Vec::<String>::new());
        assert!(f.provenance.authors.is_none());
        let f = SimplifiedDataFragment::new().authors(["J.Frehaut", "G.Mosinski"]);
        assert_eq!(f.provenance.authors.unwrap().len(), 2);
    }

    #[test]
    fn data_set_keys_are_ordered_by_subentry_then_pointer() {
        let sets = sample_entry().simplified_data_sets(false);
        let keys: Vec<(String, Option<String>)> = sets
            .keys()
            .map(|k| (k.subentry.clone(), k.pointer.clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("21971002".to_string(), Some("1".to_string())),
                ("21971002".to_string(), Some("2".to_string())),
                ("21971003".to_string(), None),
            ]
        );
    }

    #[test]
    fn data_sets_sharing_subentry_and_pointer_are_all_kept() {
        let raw = RawEntry::new("40000")
            .with_subentry(
                Subentry::new("40000002")
                    .with_data_set(SubentryDataSet::new(fragment("first", 1.0)))
                    .with_data_set(SubentryDataSet::new(fragment("second", 2.0))),
            )
            .with_subentry(
                Subentry::new("40000002")
                    .with_data_set(SubentryDataSet::new(fragment("third", 3.0))),
            );
        let entry = Entry::new(RecordKey::new("400", "40000.x4"), raw);

        let sets = entry.simplified_data_sets(false);
        let reactions: Vec<_> = sets.values().filter_map(|f| f.reaction.clone()).collect();
        assert_eq!(reactions, ["first", "second", "third"]);
        let indices: Vec<usize> = sets.keys().map(|k| k.index).collect();
        assert_eq!(indices, [0, 1, 2]);
        assert!(sets.keys().all(|k| k.subentry == "40000002" && k.pointer.is_none()));
    }

    #[test]
    fn subentry_lookup_and_raw_access() {
        let entry = sample_entry();
        assert_eq!(entry.accession(), "21971");
        let sub = entry.subentry("21971002").unwrap();
        assert_eq!(sub.data_sets.len(), 2);
        assert!(entry.subentry("21971009").is_none());

        let raw = entry.clone().into_raw();
        assert_eq!(&raw, entry.raw());
        assert_eq!(raw.subentries.len(), 2);
    }

    #[test]
    fn monitor_normalized_variant_used_only_when_preferred() {
        let entry = sample_entry();
        let pick = |prefer| {
            entry
                .simplified_data_sets(prefer)
                .into_iter()
                .find(|(k, _)| k.subentry == "21971003")
                .map(|(_, f)| f.reaction)
                .unwrap()
        };
        assert_eq!(pick(true).as_deref(), Some("normalized"));
        assert_eq!(pick(false).as_deref(), Some("as reported"));
    }

    #[test]
    fn preferring_normalized_falls_back_to_as_reported() {
        let sets = sample_entry().simplified_data_sets(true);
        let reactions: Vec<_> = sets.values().filter_map(|f| f.reaction.clone()).collect();
        assert_eq!(reactions, ["a", "b", "normalized"]);
    }

    #[test]
    fn fragments_inherit_subentry_id() {
        let entry = sample_entry();
        for (key, fragment) in entry.simplified_data_sets(false) {
            assert_eq!(
                fragment.provenance.subentry.as_deref(),
                Some(key.subentry.as_str())
            );
        }

        let explicit = Subentry::new("30000002").with_data_set(SubentryDataSet::new(
            SimplifiedDataFragment::new().subentry("30000099"),
        ));
        let sets = explicit.simplified_data_sets(false);
        assert_eq!(sets[0].1.provenance.subentry.as_deref(), Some("30000099"));
    }

    #[test]
    fn fragment_loads_from_json_fixture() {
        let json = r#"{
            "reaction": "Cross section for 239Pu(n,2n)238Pu",
            "monitors": [{"reaction": "(92-U-238(N,F),SIG)",
                          "normalization": "1027MB+-5PERCENT AT 13.1MEV",
                          "annotation": null}],
            "points": [{"x": 6.5, "y": 0.419, "dx": 0.0, "dy": 0.053}]
        }"#;
        let f: SimplifiedDataFragment = serde_json::from_str(json).unwrap();
        assert_eq!(f.points, vec![DataPoint::new(6.5, 0.419, 0.0, 0.053)]);
        assert_eq!(f.monitors[0].normalization, "1027MB+-5PERCENT AT 13.1MEV");
        assert!(f.provenance.authors.is_none());
    }
}
