//! Cached reads of the three logical warehouse tables.

use std::time::Duration;

use imint::records::{decode, DailySummary, ImageRecord, Record, SpatialMetric};
use imint::{QueryResult, ResultCache};

use crate::warehouse::{sql_literal, Warehouse, WarehouseError};

pub const IMAGERY_LIMIT: usize = 1000;
pub const SPATIAL_LIMIT: usize = 1000;
pub const SUMMARY_LIMIT: usize = 100;

/// Issues the fixed table queries through a result cache.
pub struct Fetcher {
    warehouse: Box<dyn Warehouse>,
    cache: ResultCache<QueryResult>,
    ttl: Duration,
    stage: String,
    presign_ttl_secs: u64,
}

/// `SELECT <columns> FROM <table> ORDER BY <order> DESC LIMIT <n>`.
pub fn table_sql<T: Record>(order_by: &str, limit: usize) -> String {
    format!(
        "SELECT {} FROM {} ORDER BY {} DESC LIMIT {}",
        T::COLUMNS.join(", "),
        T::TABLE,
        order_by,
        limit
    )
}

impl Fetcher {
    pub fn new(
        warehouse: Box<dyn Warehouse>,
        ttl: Duration,
        stage: impl Into<String>,
        presign_ttl_secs: u64,
    ) -> Self {
        Self {
            warehouse,
            cache: ResultCache::new(),
            ttl,
            stage: stage.into(),
            presign_ttl_secs,
        }
    }

    pub fn warehouse(&self) -> &dyn Warehouse {
        self.warehouse.as_ref()
    }

    pub fn cache(&self) -> &ResultCache<QueryResult> {
        &self.cache
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    fn fetch<T: Record>(&mut self, order_by: &str, limit: usize) -> Result<Vec<T>, WarehouseError> {
        let query_id = format!("{}:{}", T::TABLE, limit);
        let sql = table_sql::<T>(order_by, limit);
        let warehouse = self.warehouse.as_ref();
        let result = self
            .cache
            .get_or_fetch(&query_id, self.ttl, || warehouse.query(&sql))?;

        let decoded = decode::<T>(&result);
        for rejected in &decoded.rejected {
            tracing::warn!("{}: {rejected}", T::TABLE);
        }
        tracing::info!(
            "{}: {} records ({} dropped)",
            T::TABLE,
            decoded.records.len(),
            decoded.rejected.len()
        );
        Ok(decoded.records)
    }

    /// Image metadata, newest capture first.
    pub fn imagery(&mut self) -> Result<Vec<ImageRecord>, WarehouseError> {
        self.fetch("capture_timestamp", IMAGERY_LIMIT)
    }

    pub fn spatial(&mut self) -> Result<Vec<SpatialMetric>, WarehouseError> {
        self.fetch("capture_date", SPATIAL_LIMIT)
    }

    pub fn summary(&mut self) -> Result<Vec<DailySummary>, WarehouseError> {
        self.fetch("capture_date", SUMMARY_LIMIT)
    }

    /// Run an arbitrary read-only statement, bypassing the cache.
    pub fn execute(&self, sql: &str) -> Result<QueryResult, WarehouseError> {
        self.warehouse.query(sql)
    }

    /// Presigned URL for an object key in the configured stage.
    ///
    /// Failures are logged and yield `None`.
    pub fn presigned_url(&self, key: &str) -> Option<String> {
        let sql = format!(
            "SELECT GET_PRESIGNED_URL({}, {}, {}) AS url",
            sql_literal(&self.stage),
            sql_literal(key),
            self.presign_ttl_secs
        );
        match self.warehouse.query(&sql) {
            Ok(result) => {
                let url = result.row(0).and_then(|r| r.text("url"));
                if url.is_none() {
                    tracing::warn!("presign returned no url for {key}");
                }
                url
            }
            Err(e) => {
                tracing::warn!("presign failed for {key}: {e}");
                None
            }
        }
    }
}
