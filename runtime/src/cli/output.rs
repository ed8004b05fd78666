//! Output mode flags and terminal styling shared by all commands.
//!
//! `main` records the global `--json`, `--quiet` and `--no-color` flags in
//! the environment so every command can check them without threading
//! arguments through.

use imint::views::truncate_label;
use imint::QueryResult;
use serde::Serialize;

pub const JSON_ENV: &str = "IMINT_JSON";
pub const QUIET_ENV: &str = "IMINT_QUIET";
pub const NO_COLOR_ENV: &str = "IMINT_NO_COLOR";

fn flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| v == "1")
}

pub fn is_json() -> bool {
    flag(JSON_ENV)
}

pub fn is_quiet() -> bool {
    flag(QUIET_ENV)
}

/// Pretty-print `value` as JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("  Error: could not encode output: {e}"),
    }
}

/// ANSI styling, disabled by `--no-color` or `NO_COLOR`.
pub struct Styled {
    color: bool,
}

impl Default for Styled {
    fn default() -> Self {
        Self::new()
    }
}

impl Styled {
    pub fn new() -> Self {
        let color = !flag(NO_COLOR_ENV) && std::env::var_os("NO_COLOR").is_none();
        Self { color }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    pub fn ok_sym(&self) -> String {
        self.paint("32", "✓")
    }

    pub fn warn_sym(&self) -> String {
        self.paint("33", "!")
    }

    pub fn err_sym(&self) -> String {
        self.paint("31", "✗")
    }

    pub fn bold(&self, text: &str) -> String {
        self.paint("1", text)
    }

    pub fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }
}

/// Format an optional number with `decimals`, or "-".
pub fn num(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{v:.decimals$}"),
        None => "-".to_string(),
    }
}

/// Print up to `max_rows` rows of a result table to stderr.
pub fn print_table(table: &QueryResult, max_rows: usize) {
    const MAX_WIDTH: usize = 28;
    let names = table.column_names();
    let cells: Vec<Vec<String>> = table
        .rows
        .iter()
        .take(max_rows)
        .map(|row| {
            row.iter()
                .map(|v| truncate_label(&v.to_string(), MAX_WIDTH))
                .collect()
        })
        .collect();
    let widths: Vec<usize> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: Vec<&str>| {
        values
            .iter()
            .zip(&widths)
            .map(|(v, &w)| format!("{v:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
    };
    eprintln!("    {}", line(names));
    for row in &cells {
        eprintln!("    {}", line(row.iter().map(String::as_str).collect()));
    }
    if table.len() > max_rows {
        eprintln!("    ... {} more rows", table.len() - max_rows);
    }
}
