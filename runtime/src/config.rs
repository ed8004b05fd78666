//! Configuration loading and resolution.
//!
//! Values are resolved in three layers, later layers winning:
//! 1. `~/.imint/config.json` (or the file given with `--config`)
//! 2. `IMINT_*` environment variables
//! 3. command-line flags, applied by the caller

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use imint::{ModelKind, QualityBands};
use serde::{Deserialize, Serialize};

use crate::conversations::{DEFAULT_IDLE_SECS, DEFAULT_MAX_CONVERSATIONS};
use crate::loitering::LoiterThresholds;

/// Default stage holding the raw imagery objects.
pub const DEFAULT_STAGE: &str = "@s3_imagery_stage_direct";

/// Default semantic model used by the analyst service.
pub const DEFAULT_SEMANTIC_MODEL: &str =
    "@nga_app_stage/semantic_models/nga_intelligence_semantic_model.yaml";

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file backing the warehouse.
    pub warehouse_path: PathBuf,
    /// Analyst service base URL, e.g. `https://<account>.snowflakecomputing.com`.
    pub analyst_url: Option<String>,
    pub analyst_token: Option<String>,
    pub semantic_model_file: String,
    pub cache_ttl_secs: u64,
    /// HMAC key used to sign presigned URLs.
    pub signing_key: String,
    pub stage: String,
    /// Origin that presigned URLs point at.
    pub presign_base_url: String,
    pub presign_ttl_secs: u64,
    /// ONNX classifier file. Image analysis is disabled without one.
    pub model_path: Option<PathBuf>,
    pub model: ModelKind,
    /// Hugging Face `config.json` carrying the `id2label` table.
    pub model_labels_path: Option<PathBuf>,
    pub quality_bands: QualityBands,
    pub loitering: LoiterThresholds,
    pub analyst_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub busy_timeout_secs: u64,
    /// Conversation turns shown when history is replayed.
    pub history_window: usize,
    /// Conversations the REST API keeps between requests.
    pub max_conversations: usize,
    /// Seconds a REST conversation may sit idle before it is dropped.
    pub conversation_idle_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            warehouse_path: imint_dir().join("warehouse.db"),
            analyst_url: None,
            analyst_token: None,
            semantic_model_file: DEFAULT_SEMANTIC_MODEL.to_string(),
            cache_ttl_secs: 300,
            signing_key: "imint-dev-signing-key".to_string(),
            stage: DEFAULT_STAGE.to_string(),
            presign_base_url: "https://imagery.localhost".to_string(),
            presign_ttl_secs: 3600,
            model_path: None,
            model: ModelKind::Torchvision {
                model_name: "resnet50".to_string(),
            },
            model_labels_path: None,
            quality_bands: QualityBands::default(),
            loitering: LoiterThresholds::default(),
            analyst_timeout_secs: 50,
            download_timeout_secs: 30,
            busy_timeout_secs: 30,
            history_window: imint::analyst::DEFAULT_REPLAY_WINDOW,
            max_conversations: DEFAULT_MAX_CONVERSATIONS,
            conversation_idle_secs: DEFAULT_IDLE_SECS,
        }
    }
}

/// `~/.imint`, falling back to the working directory.
pub fn imint_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".imint")
}

impl Config {
    /// Load the file layer and the environment layer.
    ///
    /// An explicit path must exist; the default path is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = imint_dir().join("config.json");
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Overlay `IMINT_*` variables read through `get`.
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = get("IMINT_WAREHOUSE") {
            self.warehouse_path = PathBuf::from(v);
        }
        if let Some(v) = get("IMINT_ANALYST_URL") {
            self.analyst_url = Some(v);
        }
        if let Some(v) = get("IMINT_ANALYST_TOKEN") {
            self.analyst_token = Some(v);
        }
        if let Some(v) = get("IMINT_SEMANTIC_MODEL") {
            self.semantic_model_file = v;
        }
        if let Some(v) = get("IMINT_CACHE_TTL_SECS") {
            self.cache_ttl_secs = v
                .trim()
                .parse()
                .with_context(|| format!("IMINT_CACHE_TTL_SECS is not a number: '{v}'"))?;
        }
        if let Some(v) = get("IMINT_SIGNING_KEY") {
            self.signing_key = v;
        }
        if let Some(v) = get("IMINT_STAGE") {
            self.stage = v;
        }
        if let Some(v) = get("IMINT_MODEL_PATH") {
            self.model_path = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Whether an analyst endpoint and token are both configured.
    pub fn analyst_configured(&self) -> bool {
        self.analyst_url.is_some() && self.analyst_token.is_some()
    }
}
