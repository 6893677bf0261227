use serde::{Deserialize, Serialize};

/// Structured filter set handed to an [`IndexManager`](crate::IndexManager).
///
/// Every filter is optional; an unset filter matches everything, so
/// `Query::default()` matches the whole index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    /// Physical quantity code (e.g. `SIG`).
    pub quantity: Option<String>,
    /// Target nuclide (e.g. `PU-239`).
    pub target: Option<String>,
    /// Reaction code (e.g. `N,2N`).
    pub reaction: Option<String>,
    /// Entry accession number.
    pub entry: Option<String>,
    /// Subentry accession number.
    pub subentry: Option<String>,
    /// Restrict to subentries that do (or do not) carry a monitor.
    pub monitored: Option<bool>,
    /// Ask a parsing manager for unparsed text. Managers that never parse
    /// ignore it.
    pub raw_entry: bool,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quantity(mut self, quantity: impl Into<String>) -> Self {
        self.quantity = Some(quantity.into());
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn reaction(mut self, reaction: impl Into<String>) -> Self {
        self.reaction = Some(reaction.into());
        self
    }

    pub fn entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    pub fn subentry(mut self, subentry: impl Into<String>) -> Self {
        self.subentry = Some(subentry.into());
        self
    }

    pub fn monitored(mut self, monitored: bool) -> Self {
        self.monitored = Some(monitored);
        self
    }

    pub fn raw_entry(mut self, raw_entry: bool) -> Self {
        self.raw_entry = raw_entry;
        self
    }

    /// True when no filter is set.
    pub fn is_unfiltered(&self) -> bool {
        self.quantity.is_none()
            && self.target.is_none()
            && self.reaction.is_none()
            && self.entry.is_none()
            && self.subentry.is_none()
            && self.monitored.is_none()
    }
}
