//! Merging simplified data fragments into one canonical, reportable dataset.
//!
//! Points from every appended fragment are concatenated, never
//! deduplicated. The report header describes the dataset with one
//! representative value per field: the first non-default value any
//! appended fragment supplied. Every fragment's own provenance is still
//! kept in [`DatasetMerger::contributions`].

use std::fmt;

use crate::entry::{
    DataPoint, Monitor, Provenance, SimplifiedDataFragment, ABSENT_AUTHOR_PLACEHOLDER, UNKNOWN,
    UNKNOWN_SUBENTRY,
};

/// Width of every data column except the last.
const COLUMN_WIDTH: usize = 14;
const ROW_INDENT: &str = "        ";

const COLUMN_NAMES: &str = "#        Energy        Data          d(Energy)     d(Data)";
const COLUMN_UNITS: &str = "#        MeV           barns         MeV           barns";

/// Whether the accumulated points are known to be in ascending order.
///
/// Appending is allowed in both states; appending points to a sorted
/// dataset makes it `Open` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    Open,
    Sorted,
}

/// Provenance of one appended fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub provenance: Provenance,
    pub reaction: Option<String>,
    /// Number of points the fragment contributed.
    pub points: usize,
}

/// Accumulates fragments into a single dataset and renders its report.
///
/// # Example
///
/// ```rust
/// use exfor_db::{DatasetMerger, SimplifiedDataFragment};
///
/// let mut merged = DatasetMerger::new();
/// merged.append(SimplifiedDataFragment::new().point((6.5, 0.419, 0.0, 0.053)));
/// merged.append(SimplifiedDataFragment::new().point((6.481, 0.1009, 0.2239, 0.03081)));
/// merged.sort();
/// assert_eq!(merged.points()[0].x, 6.481);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DatasetMerger {
    provenance: Provenance,
    reaction: Option<String>,
    monitors: Vec<Monitor>,
    points: Vec<DataPoint>,
    contributions: Vec<Contribution>,
    sorted: bool,
}

impl DatasetMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fragment's points, in the order given, after the current ones.
    ///
    /// Representative fields still at their default adopt the fragment's
    /// value when it has one. Values are not range-checked.
    pub fn append(&mut self, fragment: SimplifiedDataFragment) {
        let SimplifiedDataFragment {
            provenance,
            reaction,
            monitors,
            points,
        } = fragment;

        self.contributions.push(Contribution {
            provenance: provenance.clone(),
            reaction: reaction.clone(),
            points: points.len(),
        });

        let Provenance {
            authors,
            title,
            year,
            institute,
            reference,
            subentry,
        } = provenance;
        if self.provenance.authors.is_none() {
            self.provenance.authors = authors.filter(|names| !names.is_empty());
        }
        adopt(&mut self.provenance.title, title);
        adopt(&mut self.provenance.year, year);
        adopt(&mut self.provenance.institute, institute);
        adopt(&mut self.provenance.reference, reference);
        adopt(&mut self.provenance.subentry, subentry);
        adopt(&mut self.reaction, reaction);
        if self.monitors.is_empty() {
            self.monitors = monitors;
        }

        if !points.is_empty() {
            self.points.extend(points);
            self.sorted = false;
        }
    }

    /// Stable sort by ascending independent value.
    ///
    /// Points with equal independent values keep their append order.
    /// Idempotent.
    pub fn sort(&mut self) {
        self.points.sort_by(|a, b| a.x.total_cmp(&b.x));
        self.sorted = true;
    }

    pub fn state(&self) -> MergeState {
        if self.sorted {
            MergeState::Sorted
        } else {
            MergeState::Open
        }
    }

    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Representative provenance.
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Representative reaction description.
    pub fn reaction(&self) -> Option<&str> {
        self.reaction.as_deref()
    }

    /// Representative monitor list.
    pub fn monitors(&self) -> &[Monitor] {
        &self.monitors
    }

    /// One record per appended fragment, in append order.
    pub fn contributions(&self) -> &[Contribution] {
        &self.contributions
    }

    /// Render the fixed-shape text report. Does not sort.
    ///
    /// See the [`Display`](fmt::Display) impl for the exact layout.
    pub fn serialize(&self) -> String {
        self.to_string()
    }

    fn authors_line(&self) -> String {
        match &self.provenance.authors {
            Some(names) => names.join(", "),
            None => {
                let chars: Vec<String> = ABSENT_AUTHOR_PLACEHOLDER
                    .chars()
                    .map(String::from)
                    .collect();
                chars.join(", ")
            }
        }
    }
}

fn adopt(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value.filter(|v| !v.is_empty());
    }
}

impl Extend<SimplifiedDataFragment> for DatasetMerger {
    fn extend<I: IntoIterator<Item = SimplifiedDataFragment>>(&mut self, iter: I) {
        for fragment in iter {
            self.append(fragment);
        }
    }
}

impl FromIterator<SimplifiedDataFragment> for DatasetMerger {
    fn from_iter<I: IntoIterator<Item = SimplifiedDataFragment>>(iter: I) -> Self {
        let mut merged = Self::new();
        merged.extend(iter);
        merged
    }
}

/// Ten `#` header lines, then one row per point.
///
/// Every line, the last row included, ends with a single `\n`. Older
/// reports also wrote the row indent after the final newline; that
/// trailing indent is not reproduced, so output differs from them in its
/// last bytes only.
impl fmt::Display for DatasetMerger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.provenance;
        let or_unknown = |v: &Option<String>| v.as_deref().unwrap_or(UNKNOWN).to_string();

        writeln!(f, "#  Authors:   {}", self.authors_line())?;
        writeln!(f, "#  Title:     {}", or_unknown(&p.title))?;
        writeln!(f, "#  Year:      {}", or_unknown(&p.year))?;
        writeln!(f, "#  Institute: {}", or_unknown(&p.institute))?;
        writeln!(f, "#  Reference: {}", or_unknown(&p.reference))?;
        writeln!(
            f,
            "#  Subent:    {}",
            p.subentry.as_deref().unwrap_or(UNKNOWN_SUBENTRY)
        )?;
        writeln!(f, "#  Reaction:  {}", or_unknown(&self.reaction))?;
        writeln!(f, "#  Monitor(s): {}", format_monitors(&self.monitors))?;
        writeln!(f, "{COLUMN_NAMES}")?;
        writeln!(f, "{COLUMN_UNITS}")?;
        for point in &self.points {
            writeln!(
                f,
                "{ROW_INDENT}{:<w$}{:<w$}{:<w$}{}",
                format_value(point.x),
                format_value(point.y),
                format_value(point.dx),
                format_value(point.dy),
                w = COLUMN_WIDTH
            )?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Text rendering helpers
// ---------------------------------------------------------------------------

/// Shortest decimal text that reads back as `value`.
///
/// Always carries a fractional part (`6.0`, `0.0`). Magnitudes of `1e16`
/// and above, or below `1e-4`, switch to exponent form (`1e-05`, `2.5e+16`).
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        return format_exponent(value);
    }
    let text = value.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{text}.0")
    }
}

fn format_exponent(value: f64) -> String {
    let text = format!("{value:e}");
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => text,
    }
}

/// A lone monitor renders as its tuple; several are wrapped in one more
/// pair of parentheses; none renders as `()`.
fn format_monitors(monitors: &[Monitor]) -> String {
    let rendered: Vec<String> = monitors.iter().map(format_monitor).collect();
    match rendered.as_slice() {
        [single] => single.clone(),
        _ => format!("({})", rendered.join(", ")),
    }
}

fn format_monitor(monitor: &Monitor) -> String {
    let annotation = match &monitor.annotation {
        Some(text) => quote(text),
        None => "None".to_string(),
    };
    format!(
        "({}, {}, {})",
        monitor.reaction,
        quote(&monitor.normalization),
        annotation
    )
}

/// Quote text the way the historical reports did: single quotes unless the
/// text itself holds a single quote and no double quote.
///
/// Backslashes, the chosen quote and control characters are escaped, so
/// the result always stays on one line.
fn quote(text: &str) -> String {
    let delimiter = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(text.len() + 2);
    out.push(delimiter);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_ascii_control() => out.push_str(&format!("\\x{:02x}", u32::from(c))),
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}
