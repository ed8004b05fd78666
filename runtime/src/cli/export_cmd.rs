//! `imint export [filtered|summary]`: write a CSV export.

use std::path::Path;

use anyhow::{Context, Result};
use imint::export::{records_to_csv, write_export};
use imint::{filter, ExportKind};

use crate::cli::output::{self, Styled};
use crate::cli::{open_fetcher, FilterArgs};
use crate::config::Config;
use crate::fetcher::Fetcher;
use crate::pages::FilterInput;

/// CSV payload and row count for `kind`. The filtered export honors the
/// dashboard filters; the summary export is the whole summary table.
pub fn payload(
    fetcher: &mut Fetcher,
    kind: ExportKind,
    filters: &FilterInput,
) -> Result<(String, usize)> {
    match kind {
        ExportKind::Filtered => {
            let imagery = fetcher.imagery()?;
            let criteria = filters.resolve(&imagery);
            let rows = filter::apply(&imagery, &criteria);
            Ok((records_to_csv(&rows)?, rows.len()))
        }
        ExportKind::Summary => {
            let summary = fetcher.summary()?;
            Ok((records_to_csv(&summary)?, summary.len()))
        }
    }
}

pub async fn run(
    config: &Config,
    kind: ExportKind,
    filters: &FilterArgs,
    out: &Path,
) -> Result<()> {
    let mut fetcher = open_fetcher(config)?;
    let (csv, rows) = payload(&mut fetcher, kind, &filters.to_input())?;
    let now = chrono::Local::now().naive_local();
    let path = write_export(out, kind, &csv, now)
        .with_context(|| format!("failed to write export into {}", out.display()))?;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "path": path.display().to_string(),
            "rows": rows,
        }));
    } else if !output::is_quiet() {
        let s = Styled::new();
        eprintln!("  {} Wrote {rows} rows to {}", s.ok_sym(), path.display());
    }
    Ok(())
}
