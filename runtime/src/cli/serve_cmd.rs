//! `imint serve`: run the REST API.

use std::sync::Arc;

use anyhow::Result;

use crate::cli::output::{self, Styled};
use crate::cli::{analyst_proxy, open_fetcher};
use crate::config::Config;
use crate::rest::{self, AppState};

pub async fn run(config: &Config, port: u16) -> Result<()> {
    let fetcher = open_fetcher(config)?;
    let proxy = analyst_proxy(config)?;
    let analyst = proxy.is_some();
    let state = Arc::new(AppState::new(fetcher, proxy, config));

    if !output::is_quiet() && !output::is_json() {
        let s = Styled::new();
        eprintln!(
            "  {} imint v{} serving on http://127.0.0.1:{port}",
            s.ok_sym(),
            env!("CARGO_PKG_VERSION")
        );
        if !analyst {
            eprintln!(
                "  {} Analyst not configured; /api/v1/ask will answer 503.",
                s.warn_sym()
            );
        }
    }
    rest::start(port, state).await
}
