//! `imint init`: create the local warehouse.

use anyhow::{Context, Result};

use crate::cli::output::{self, Styled};
use crate::config::Config;
use crate::warehouse::schema;

pub async fn run(config: &Config, sample: bool) -> Result<()> {
    let path = &config.warehouse_path;
    let existed = path.exists();
    schema::init(path, sample)
        .with_context(|| format!("failed to initialize warehouse at {}", path.display()))?;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "warehouse": path.display().to_string(),
            "created": !existed,
            "sample_data": sample,
        }));
        return Ok(());
    }

    if !output::is_quiet() {
        let s = Styled::new();
        let verb = if existed { "Updated" } else { "Created" };
        eprintln!("  {} {verb} warehouse at {}", s.ok_sym(), path.display());
        if sample {
            eprintln!("  Loaded Bay Area sample data.");
        } else {
            eprintln!("  Tables are empty. Re-run with --sample for demo data.");
        }
    }
    Ok(())
}
