//! `imint ask <question>`: one analyst question, answered and executed.

use anyhow::Result;
use imint::filter::apply_table;
use imint::{Conversation, FilterColumns};

use crate::cli::output::{self, Styled};
use crate::cli::{open_fetcher, require_analyst, FilterArgs};
use crate::config::Config;
use crate::proxy::ProxyOutcome;

/// Rows shown in human output.
pub const DISPLAY_ROWS: usize = 20;

pub async fn run(config: &Config, question: &str, filters: &FilterArgs) -> Result<()> {
    let proxy = require_analyst(config)?;
    let fetcher = open_fetcher(config)?;
    let mut conv = Conversation::new(config.history_window);

    let mut outcome = proxy.ask(&mut conv, question, &fetcher).await?;
    if !filters.is_empty() {
        let criteria = filters.to_input().explicit();
        outcome.result = outcome
            .result
            .map(|r| apply_table(&r, &FilterColumns::default(), &criteria));
    }

    if output::is_json() {
        output::print_json(&outcome);
        return Ok(());
    }
    if !output::is_quiet() {
        print_outcome(&outcome);
    }
    Ok(())
}

/// Human rendering shared with the chat REPL.
pub fn print_outcome(outcome: &ProxyOutcome) {
    let s = Styled::new();
    let reply = &outcome.reply;
    if !reply.answer_text.is_empty() {
        for line in reply.answer_text.lines() {
            eprintln!("  {line}");
        }
    }
    if let Some(sql) = &reply.sql {
        eprintln!();
        eprintln!("  {}", s.dim("SQL:"));
        for line in sql.lines() {
            eprintln!("    {}", s.dim(line));
        }
    }
    if let Some(result) = &outcome.result {
        eprintln!();
        if result.is_empty() {
            eprintln!("  Query returned no rows.");
        } else {
            eprintln!("  {} {} row(s):", s.ok_sym(), result.len());
            output::print_table(result, DISPLAY_ROWS);
        }
    }
    if let Some(err) = &outcome.sql_error {
        eprintln!();
        eprintln!("  {} SQL did not run: {err}", s.warn_sym());
    }
    if let Some(suggestions) = &reply.suggestions {
        eprintln!();
        eprintln!("  Suggestions:");
        for q in suggestions {
            eprintln!("    - {q}");
        }
    }
}
