//! Filter engine: derives a view from a table and a set of criteria.
//!
//! Filtering is a pure function of (rows, criteria): the output is the
//! order-preserving subset of rows that satisfy every active predicate.
//!
//! ## Permissive inputs
//!
//! - Date bounds that are missing, unparseable or inverted fall back to the
//!   range observed in the table. Nothing here ever fails.
//! - An empty accepted-category set accepts nothing.
//! - A row whose constrained field is null or unparseable does not match.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::records::ImageRecord;
use crate::types::{parse_date, QueryResult, RowRef};

/// Number of sensor categories selected when the caller gives none.
pub const DEFAULT_SENSOR_SELECTION: usize = 3;

/// Quality threshold applied when the caller gives none.
pub const DEFAULT_MIN_QUALITY: f64 = 80.0;

/// Anything the filter engine can inspect.
pub trait Filterable {
    fn capture_date(&self) -> Option<NaiveDate>;
    fn category(&self) -> Option<&str>;
    fn quality(&self) -> Option<f64>;
}

impl Filterable for ImageRecord {
    fn capture_date(&self) -> Option<NaiveDate> {
        Some(self.capture_date)
    }

    fn category(&self) -> Option<&str> {
        Some(&self.sensor_category)
    }

    fn quality(&self) -> Option<f64> {
        Some(self.combined_quality_score)
    }
}

/// Requested date interval. Either side may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Parse user-supplied bounds; anything unparseable becomes absent.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Self {
        Self {
            start: start.and_then(parse_date),
            end: end.and_then(parse_date),
        }
    }

    /// Resolve against the observed range of a table.
    ///
    /// Absent sides take the observed bound. An inverted interval is
    /// treated as invalid and replaced by the observed range entirely.
    /// Returns `None` on a side only when nothing was observed either.
    pub fn resolve(
        &self,
        observed: Option<(NaiveDate, NaiveDate)>,
    ) -> (Option<NaiveDate>, Option<NaiveDate>) {
        let (obs_lo, obs_hi) = match observed {
            Some((lo, hi)) => (Some(lo), Some(hi)),
            None => (None, None),
        };
        let lo = self.start.or(obs_lo);
        let hi = self.end.or(obs_hi);
        match (lo, hi) {
            (Some(l), Some(h)) if l > h => (obs_lo, obs_hi),
            _ => (lo, hi),
        }
    }
}

/// Conjunction of filter predicates. `None` on an axis leaves it unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub date_range: Option<DateRange>,
    pub categories: Option<BTreeSet<String>>,
    pub min_quality: Option<f64>,
}

impl FilterCriteria {
    /// Criteria that keep every row.
    pub fn pass_through() -> Self {
        Self::default()
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    /// Set the quality threshold. Non-finite thresholds are ignored.
    pub fn with_min_quality(mut self, threshold: f64) -> Self {
        self.min_quality = threshold.is_finite().then_some(threshold);
        self
    }

    pub fn is_pass_through(&self) -> bool {
        self.date_range.is_none() && self.categories.is_none() && self.min_quality.is_none()
    }

    /// Dashboard defaults: the full observed date range, the first
    /// [`DEFAULT_SENSOR_SELECTION`] categories in fetch order, and
    /// [`DEFAULT_MIN_QUALITY`].
    pub fn dashboard_default<T: Filterable>(rows: &[T]) -> Self {
        let mut criteria = Self::pass_through()
            .with_categories(
                distinct_categories(rows)
                    .into_iter()
                    .take(DEFAULT_SENSOR_SELECTION),
            )
            .with_min_quality(DEFAULT_MIN_QUALITY);
        if let Some((lo, hi)) = observed_dates(rows) {
            criteria.date_range = Some(DateRange::new(lo, hi));
        }
        criteria
    }
}

/// Earliest and latest capture date among `rows`.
pub fn observed_dates<T: Filterable>(rows: &[T]) -> Option<(NaiveDate, NaiveDate)> {
    rows.iter()
        .filter_map(Filterable::capture_date)
        .fold(None, |acc, d| match acc {
            None => Some((d, d)),
            Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
        })
}

/// Distinct categories in first-seen order.
pub fn distinct_categories<T: Filterable>(rows: &[T]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for cat in rows.iter().filter_map(Filterable::category) {
        if seen.insert(cat) {
            out.push(cat.to_string());
        }
    }
    out
}

/// Indices of rows matching `criteria`, in input order.
pub fn matching_indices<T: Filterable>(rows: &[T], criteria: &FilterCriteria) -> Vec<usize> {
    let bounds = criteria
        .date_range
        .map(|range| range.resolve(observed_dates(rows)));

    rows.iter()
        .enumerate()
        .filter(|(_, row)| {
            if let Some((lo, hi)) = bounds {
                let Some(date) = row.capture_date() else {
                    return false;
                };
                if lo.is_some_and(|lo| date < lo) || hi.is_some_and(|hi| date > hi) {
                    return false;
                }
            }
            if let Some(accepted) = &criteria.categories {
                match row.category() {
                    Some(cat) if accepted.contains(cat) => {}
                    _ => return false,
                }
            }
            if let Some(threshold) = criteria.min_quality {
                match row.quality() {
                    Some(q) if q >= threshold => {}
                    _ => return false,
                }
            }
            true
        })
        .map(|(i, _)| i)
        .collect()
}

/// Filter typed records.
pub fn apply<T: Filterable + Clone>(rows: &[T], criteria: &FilterCriteria) -> Vec<T> {
    matching_indices(rows, criteria)
        .into_iter()
        .map(|i| rows[i].clone())
        .collect()
}

// ── Generic tables ──────────────────────────────────────────────

/// Which columns of a generic table carry the filtered fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterColumns {
    pub date: String,
    pub category: String,
    pub quality: String,
}

impl Default for FilterColumns {
    fn default() -> Self {
        Self {
            date: "capture_date".to_string(),
            category: "sensor_category".to_string(),
            quality: "combined_quality_score".to_string(),
        }
    }
}

struct TableRow<'a> {
    row: RowRef<'a>,
    columns: &'a FilterColumns,
}

impl Filterable for TableRow<'_> {
    fn capture_date(&self) -> Option<NaiveDate> {
        self.row.date(&self.columns.date)
    }

    fn category(&self) -> Option<&str> {
        self.row.get(&self.columns.category).and_then(|v| v.as_str())
    }

    fn quality(&self) -> Option<f64> {
        self.row.float(&self.columns.quality)
    }
}

/// Filter a generic query result.
///
/// Predicates whose column the table does not have are dropped, so results
/// of free-form analyst queries pass through the axes they cannot express.
pub fn apply_table(
    result: &QueryResult,
    columns: &FilterColumns,
    criteria: &FilterCriteria,
) -> QueryResult {
    let mut effective = criteria.clone();
    if effective.date_range.is_some() && !result.has_column(&columns.date) {
        tracing::debug!("date predicate skipped: no column '{}'", columns.date);
        effective.date_range = None;
    }
    if effective.categories.is_some() && !result.has_column(&columns.category) {
        tracing::debug!("category predicate skipped: no column '{}'", columns.category);
        effective.categories = None;
    }
    if effective.min_quality.is_some() && !result.has_column(&columns.quality) {
        tracing::debug!("quality predicate skipped: no column '{}'", columns.quality);
        effective.min_quality = None;
    }
    if effective.is_pass_through() {
        return result.clone();
    }

    let rows: Vec<TableRow<'_>> = result
        .iter()
        .map(|row| TableRow { row, columns })
        .collect();
    let indices = matching_indices(&rows, &effective);
    result.select_rows(&indices)
}
