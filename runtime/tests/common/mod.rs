//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use imint_runtime::fetcher::Fetcher;
use imint_runtime::presign::UrlSigner;
use imint_runtime::warehouse::{schema, SqliteWarehouse};
use tempfile::TempDir;

pub const SIGNING_KEY: &str = "integration-key";
pub const PRESIGN_BASE: &str = "https://imagery.test";

/// A warehouse file loaded with the sample data set.
pub fn sample_warehouse() -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("warehouse.db");
    schema::init(&path, true).unwrap();
    (dir, path)
}

pub fn fetcher(path: &Path) -> Fetcher {
    let signer = UrlSigner::new(SIGNING_KEY, PRESIGN_BASE).unwrap();
    let warehouse = SqliteWarehouse::open(path, signer, Duration::from_secs(5)).unwrap();
    Fetcher::new(
        Box::new(warehouse),
        Duration::from_secs(300),
        "@s3_imagery_stage_direct",
        600,
    )
}

/// An analyst response body carrying text and, optionally, one SQL block.
pub fn analyst_body(text: &str, sql: Option<&str>) -> serde_json::Value {
    let mut content = vec![serde_json::json!({ "type": "text", "text": text })];
    if let Some(statement) = sql {
        content.push(serde_json::json!({ "type": "sql", "statement": statement }));
    }
    serde_json::json!({
        "message": { "role": "analyst", "content": content },
        "request_id": "req-integration"
    })
}
