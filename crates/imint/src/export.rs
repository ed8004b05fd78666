//! CSV export of filtered views and summary tables.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::records::Record;
use crate::types::{ImintResult, QueryResult};

/// Which table an export dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    /// The filtered image metadata view.
    Filtered,
    /// The operational summary table.
    Summary,
}

impl ExportKind {
    pub fn file_prefix(self) -> &'static str {
        match self {
            ExportKind::Filtered => "nga_imagery_intelligence",
            ExportKind::Summary => "nga_operational_summary",
        }
    }

    /// File name stamped with the export time.
    pub fn file_name(self, at: NaiveDateTime) -> String {
        format!("{}_{}.csv", self.file_prefix(), at.format("%Y%m%d_%H%M%S"))
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "filtered" | "imagery" => Some(ExportKind::Filtered),
            "summary" => Some(ExportKind::Summary),
            _ => None,
        }
    }
}

/// Serialize typed records to CSV, header first.
pub fn records_to_csv<T: Record + Serialize>(records: &[T]) -> ImintResult<String> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(T::COLUMNS)?;
    for rec in records {
        wtr.serialize(rec)?;
    }
    finish(wtr)
}

/// Serialize a generic result table to CSV, header first.
pub fn table_to_csv(table: &QueryResult) -> ImintResult<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(table.column_names())?;
    for row in &table.rows {
        wtr.write_record(row.iter().map(|v| v.to_csv_field()))?;
    }
    finish(wtr)
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> ImintResult<String> {
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    // every field written above is a Rust string
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write an export payload into `dir` under its stamped file name.
pub fn write_export(
    dir: &Path,
    kind: ExportKind,
    contents: &str,
    at: NaiveDateTime,
) -> ImintResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(kind.file_name(at));
    std::fs::write(&path, contents)?;
    tracing::info!("exported {} bytes to {}", contents.len(), path.display());
    Ok(path)
}
