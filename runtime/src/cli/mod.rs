//! CLI subcommand implementations for the `imint` binary.

pub mod ask_cmd;
pub mod chat;
pub mod classify_cmd;
pub mod dashboard_cmd;
pub mod export_cmd;
pub mod image_cmd;
pub mod init_cmd;
pub mod loiter_cmd;
pub mod output;
pub mod serve_cmd;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::analyst::AnalystClient;
use crate::config::Config;
use crate::fetcher::Fetcher;
use crate::pages::FilterInput;
use crate::presign::UrlSigner;
use crate::proxy::QueryProxy;
use crate::warehouse::SqliteWarehouse;

/// Filter flags shared by the dashboard, export and ask commands.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct FilterArgs {
    /// First capture date (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<String>,
    /// Last capture date (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<String>,
    /// Accepted sensor categories (repeat or comma-separate)
    #[arg(long = "sensor", value_delimiter = ',')]
    pub sensors: Vec<String>,
    /// Minimum combined quality score (0-100)
    #[arg(long)]
    pub min_quality: Option<f64>,
}

impl FilterArgs {
    pub fn is_empty(&self) -> bool {
        self.start.is_none()
            && self.end.is_none()
            && self.sensors.is_empty()
            && self.min_quality.is_none()
    }

    pub fn to_input(&self) -> FilterInput {
        FilterInput {
            start: self.start.clone(),
            end: self.end.clone(),
            sensors: (!self.sensors.is_empty()).then(|| self.sensors.clone()),
            min_quality: self.min_quality,
        }
    }
}

/// Open the configured warehouse behind a caching fetcher.
pub fn open_fetcher(config: &Config) -> Result<Fetcher> {
    if !config.warehouse_path.exists() {
        bail!(
            "No warehouse at {}. Run 'imint init --sample' to create one.",
            config.warehouse_path.display()
        );
    }
    let signer = UrlSigner::new(&config.signing_key, &config.presign_base_url)
        .context("invalid presign settings")?;
    let warehouse = SqliteWarehouse::open(
        &config.warehouse_path,
        signer,
        Duration::from_secs(config.busy_timeout_secs),
    )?;
    Ok(Fetcher::new(
        Box::new(warehouse),
        Duration::from_secs(config.cache_ttl_secs),
        config.stage.clone(),
        config.presign_ttl_secs,
    ))
}

/// Analyst proxy from configuration, or `None` when no endpoint is set.
pub fn analyst_proxy(config: &Config) -> Result<Option<QueryProxy>> {
    let (Some(url), Some(token)) = (&config.analyst_url, &config.analyst_token) else {
        return Ok(None);
    };
    let client = AnalystClient::new(
        url,
        token,
        Duration::from_secs(config.analyst_timeout_secs),
    )
    .context("invalid analyst settings")?;
    Ok(Some(QueryProxy::new(
        Arc::new(client),
        config.semantic_model_file.clone(),
    )))
}

/// Like [`analyst_proxy`], failing when the analyst is not configured.
pub fn require_analyst(config: &Config) -> Result<QueryProxy> {
    analyst_proxy(config)?.ok_or_else(|| crate::analyst::AnalystError::NotConfigured.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_args_to_input() {
        let args = FilterArgs::default();
        assert!(args.is_empty());
        assert_eq!(args.to_input(), FilterInput::default());

        let args = FilterArgs {
            sensors: vec!["WorldView-3".into()],
            min_quality: Some(70.0),
            ..Default::default()
        };
        let input = args.to_input();
        assert_eq!(input.sensors, Some(vec!["WorldView-3".to_string()]));
        assert_eq!(input.min_quality, Some(70.0));
    }

    #[test]
    fn test_missing_warehouse_hint() {
        let config = Config {
            warehouse_path: "/nonexistent/imint/wh.db".into(),
            ..Default::default()
        };
        let err = open_fetcher(&config).err().unwrap();
        assert!(err.to_string().contains("imint init"));
    }

    #[test]
    fn test_analyst_unconfigured() {
        let config = Config::default();
        assert!(analyst_proxy(&config).unwrap().is_none());
        assert!(require_analyst(&config).is_err());
    }
}
