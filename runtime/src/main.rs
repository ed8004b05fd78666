use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use imint::ExportKind;
use imint_runtime::cli::{self, output, FilterArgs};
use imint_runtime::config::Config;
use imint_runtime::loitering::LoiterThresholds;
use imint_runtime::pages::Page;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "imint",
    about = "Imagery intelligence console over a read-only warehouse",
    version,
    after_help = "Run 'imint <command> --help' for details on each command.\nRun 'imint' with no command to chat with the analyst."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Config file (default: ~/.imint/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Warehouse database, overriding config and IMINT_WAREHOUSE
    #[arg(long, global = true)]
    warehouse: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the local warehouse tables
    Init {
        /// Load the Bay Area sample data set
        #[arg(long)]
        sample: bool,
    },
    /// Render a dashboard page (overview, viewer, geo, reports)
    Dashboard {
        #[arg(default_value = "overview")]
        page: Page,
        #[command(flatten)]
        filters: FilterArgs,
        /// Image to show in the viewer detail panel
        #[arg(long)]
        select: Option<String>,
    },
    /// Show one image with a presigned URL
    Image {
        /// Image identifier
        id: String,
    },
    /// Write a CSV export (filtered or summary)
    Export {
        #[arg(default_value = "filtered", value_parser = parse_export_kind)]
        kind: ExportKind,
        #[command(flatten)]
        filters: FilterArgs,
        /// Directory to write into
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Ask the analyst one question and run the SQL it returns
    Ask {
        /// The question, in plain English
        #[arg(required = true)]
        question: Vec<String>,
        /// Filters applied to the returned rows (only the ones given)
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Interactive analyst conversation
    Chat,
    /// Detect loitering vessels in the position feed
    Loiter {
        /// Largest time gap between positions, in seconds
        #[arg(long)]
        max_gap_secs: Option<u64>,
        /// Largest distance between positions, in meters
        #[arg(long)]
        max_distance_m: Option<f64>,
    },
    /// Classify a stored image with the configured model
    Classify {
        /// Object key in the imagery stage
        s3_key: String,
    },
    /// Serve the REST API
    Serve {
        #[arg(long, default_value = "8080")]
        port: u16,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate for (bash, zsh, fish, powershell, elvish)
        shell: Shell,
    },
}

fn parse_export_kind(s: &str) -> Result<ExportKind, String> {
    ExportKind::parse(s)
        .ok_or_else(|| format!("unknown export '{s}' (expected filtered or summary)"))
}

fn init_tracing(verbose: bool, quiet: bool, json: bool) {
    let default = if verbose {
        "imint=debug,imint_runtime=debug"
    } else if quiet {
        "imint=warn,imint_runtime=warn"
    } else {
        "imint=info,imint_runtime=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

async fn dispatch(command: Option<Commands>, config: &Config) -> Result<()> {
    match command {
        // No subcommand → analyst chat
        None | Some(Commands::Chat) => cli::chat::run(config).await,

        Some(Commands::Init { sample }) => cli::init_cmd::run(config, sample).await,
        Some(Commands::Dashboard {
            page,
            filters,
            select,
        }) => cli::dashboard_cmd::run(config, page, &filters, select).await,
        Some(Commands::Image { id }) => cli::image_cmd::run(config, &id).await,
        Some(Commands::Export { kind, filters, out }) => {
            cli::export_cmd::run(config, kind, &filters, &out).await
        }
        Some(Commands::Ask { question, filters }) => {
            cli::ask_cmd::run(config, &question.join(" "), &filters).await
        }
        Some(Commands::Loiter {
            max_gap_secs,
            max_distance_m,
        }) => {
            let thresholds = LoiterThresholds {
                max_gap_secs: max_gap_secs.unwrap_or(config.loitering.max_gap_secs),
                max_distance_m: max_distance_m.unwrap_or(config.loitering.max_distance_m),
            };
            cli::loiter_cmd::run(config, thresholds).await
        }
        Some(Commands::Classify { s3_key }) => cli::classify_cmd::run(config, &s3_key).await,
        Some(Commands::Serve { port }) => cli::serve_cmd::run(config, port).await,
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "imint", &mut std::io::stdout());
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var(output::JSON_ENV, "1");
    }
    if cli.quiet {
        std::env::set_var(output::QUIET_ENV, "1");
    }
    if cli.no_color {
        std::env::set_var(output::NO_COLOR_ENV, "1");
    }
    init_tracing(cli.verbose, cli.quiet, cli.json);

    let result = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(path) = cli.warehouse {
                config.warehouse_path = path;
            }
            dispatch(cli.command, &config).await
        }
        Err(e) => Err(e),
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !output::is_quiet() && !output::is_json() {
            eprintln!("  Error: {e:#}");
        }
        if output::is_json() {
            output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        }
        std::process::exit(1);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_package_metadata_matches_core() {
        assert_eq!(env!("CARGO_PKG_LICENSE"), "MIT");
        assert_eq!(env!("CARGO_PKG_AUTHORS"), "Omoshola Owolabi");
        assert_eq!(Cli::command().get_version(), Some(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_parse_export_kind() {
        assert!(parse_export_kind("summary").is_ok());
        let err = parse_export_kind("everything").unwrap_err();
        assert!(err.contains("expected filtered or summary"));
    }
}
