//! Core tabular types: warehouse values, query results, and the library error.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A scalar cell returned by the warehouse.
///
/// Variant order matters for untagged deserialization: JSON integers must
/// land in `Integer` before `Float` gets a chance at them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value. Text is parsed; booleans are not numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) if v.is_finite() => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            Value::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Integer(0) => Some(false),
            Value::Integer(1) => Some(true),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "1" => Some(true),
                "false" | "f" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Borrow the text payload. Only `Text` values qualify.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Owned textual rendering for identifier-like columns (numbers allowed).
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Text(s) => Some(s.clone()),
            Value::Integer(v) => Some(v.to_string()),
            Value::Float(v) => Some(v.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Text(s) => parse_date(s),
            Value::Integer(secs) => DateTime::from_timestamp(*secs, 0).map(|d| d.date_naive()),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Text(s) => parse_timestamp(s),
            Value::Integer(secs) => DateTime::from_timestamp(*secs, 0).map(|d| d.naive_utc()),
            _ => None,
        }
    }

    /// Render for CSV output: nulls become empty fields, floats keep full precision.
    pub fn to_csv_field(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Integer(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Text(s) => s.clone(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Float(v) => write!(f, "{v:.2}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Null => write!(f, "null"),
        }
    }
}

/// Parse a calendar date. Accepts a bare date or any timestamp form
/// understood by [`parse_timestamp`].
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(s).map(|ts| ts.date()))
}

/// Parse a timestamp in the forms warehouses commonly emit.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.naive_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Column metadata of a query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Lower-cased column name.
    pub name: String,
    /// Declared type as reported by the warehouse, if any.
    pub decl_type: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            decl_type: None,
        }
    }

    pub fn typed(name: impl Into<String>, decl_type: impl Into<String>) -> Self {
        Self {
            decl_type: Some(decl_type.into()),
            ..Self::new(name)
        }
    }
}

/// An ordered sequence of homogeneous rows plus their column metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// Create a result, checking that every row matches the column count.
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> ImintResult<Self> {
        if let Some(bad) = rows.iter().find(|r| r.len() != columns.len()) {
            return Err(ImintError::RowWidth {
                expected: columns.len(),
                got: bad.len(),
            });
        }
        Ok(Self { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column, matched case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Borrow a single row.
    pub fn row(&self, index: usize) -> Option<RowRef<'_>> {
        self.rows
            .get(index)
            .map(|values| RowRef::new(&self.columns, values))
    }

    /// Iterate rows in order.
    pub fn iter(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.rows
            .iter()
            .map(move |values| RowRef::new(&self.columns, values))
    }

    /// Build a new result holding the rows at `indices`, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> QueryResult {
        QueryResult {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }
}

/// A borrowed view of one row, addressable by column name.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    columns: &'a [Column],
    values: &'a [Value],
}

impl<'a> RowRef<'a> {
    pub fn new(columns: &'a [Column], values: &'a [Value]) -> Self {
        Self { columns, values }
    }

    /// Value of a column; `None` when the column does not exist.
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .and_then(|i| self.values.get(i))
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).and_then(Value::to_text)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn date(&self, name: &str) -> Option<NaiveDate> {
        self.get(name).and_then(Value::as_date)
    }

    pub fn timestamp(&self, name: &str) -> Option<NaiveDateTime> {
        self.get(name).and_then(Value::as_timestamp)
    }
}

/// Errors that can occur in the imint library.
#[derive(thiserror::Error, Debug)]
pub enum ImintError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Row width {got} does not match {expected} columns")]
    RowWidth { expected: usize, got: usize },

    #[error("Invalid row {row} in {table}: {reason}")]
    InvalidRow {
        table: &'static str,
        row: usize,
        reason: String,
    },

    #[error("Conversation is {state}; cannot {action}")]
    ConversationState { state: String, action: &'static str },

    #[error("Malformed analyst response: {0}")]
    MalformedResponse(String),

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience result type.
pub type ImintResult<T> = Result<T, ImintError>;
