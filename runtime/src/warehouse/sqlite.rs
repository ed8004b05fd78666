//! SQLite-backed warehouse.
//!
//! The database is opened read-only, and every statement is additionally
//! checked with SQLite's own read-only test before it runs. The scalar
//! functions the application calls on a managed warehouse are registered
//! on the connection:
//!
//! - `GET_PRESIGNED_URL(stage, key, ttl_secs)`: signed object URL
//! - `HAVERSINE_M(lat1, lon1, lat2, lon2)`: great-circle distance in meters

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use imint::{Column, QueryResult, Value};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use super::{Warehouse, WarehouseError};
use crate::presign::UrlSigner;

/// Mean Earth radius used by `HAVERSINE_M`.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Great-circle distance between two points, in meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
}

/// A read-only SQLite warehouse.
pub struct SqliteWarehouse {
    conn: Mutex<Connection>,
}

impl SqliteWarehouse {
    /// Open `path` read-only and register the warehouse functions.
    pub fn open(
        path: &Path,
        signer: UrlSigner,
        busy_timeout: Duration,
    ) -> Result<Self, WarehouseError> {
        let open_err = |source: rusqlite::Error| WarehouseError::Open {
            path: path.display().to_string(),
            source,
        };
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(open_err)?;
        conn.busy_timeout(busy_timeout).map_err(open_err)?;
        register_functions(&conn, signer)?;

        tracing::info!("opened warehouse {} (read-only)", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn register_functions(conn: &Connection, signer: UrlSigner) -> Result<(), WarehouseError> {
    conn.create_scalar_function(
        "GET_PRESIGNED_URL",
        3,
        FunctionFlags::SQLITE_UTF8,
        move |ctx| {
            let stage: String = ctx.get(0)?;
            let key: String = ctx.get(1)?;
            let ttl: i64 = ctx.get(2)?;
            signer
                .presign(&stage, &key, ttl)
                .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))
        },
    )?;

    conn.create_scalar_function(
        "HAVERSINE_M",
        4,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let lat1: f64 = ctx.get(0)?;
            let lon1: f64 = ctx.get(1)?;
            let lat2: f64 = ctx.get(2)?;
            let lon2: f64 = ctx.get(3)?;
            Ok(haversine_m(lat1, lon1, lat2, lon2))
        },
    )?;
    Ok(())
}

fn to_value(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Text(hex::encode(b)),
    }
}

impl Warehouse for SqliteWarehouse {
    fn query(&self, sql: &str) -> Result<QueryResult, WarehouseError> {
        let conn = self.conn.lock().map_err(|_| WarehouseError::Poisoned)?;
        let mut stmt = conn.prepare(sql)?;
        if !stmt.readonly() {
            let head: String = sql.trim().chars().take(60).collect();
            tracing::warn!("rejected non-read-only statement: {head}");
            return Err(WarehouseError::ReadOnly(head));
        }

        let columns: Vec<Column> = stmt
            .columns()
            .iter()
            .map(|c| match c.decl_type() {
                Some(t) => Column::typed(c.name(), t),
                None => Column::new(c.name()),
            })
            .collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(to_value(row.get_ref(i)?));
            }
            rows.push(values);
        }

        tracing::debug!("query returned {} rows", rows.len());
        Ok(QueryResult::new(columns, rows)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::schema;

    fn warehouse() -> (tempfile::TempDir, SqliteWarehouse) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wh.db");
        schema::init(&path, true).unwrap();
        let signer = UrlSigner::new("k", "https://imagery.localhost").unwrap();
        let wh = SqliteWarehouse::open(&path, signer, Duration::from_secs(1)).unwrap();
        (dir, wh)
    }

    #[test]
    fn test_haversine() {
        assert_eq!(haversine_m(37.0, -122.0, 37.0, -122.0), 0.0);
        // one degree of latitude is about 111.2 km
        let d = haversine_m(37.0, -122.0, 38.0, -122.0);
        assert!((d - 111_195.0).abs() < 100.0);
    }

    #[test]
    fn test_query_normalizes_columns() {
        let (_dir, wh) = warehouse();
        let result = wh
            .query(
                "SELECT IMAGE_ID, Combined_Quality_Score FROM silver_imagery_metadata \
                 ORDER BY image_id",
            )
            .unwrap();
        assert_eq!(result.column_names(), vec!["image_id", "combined_quality_score"]);
        assert_eq!(result.columns[1].decl_type.as_deref(), Some("REAL"));
        assert_eq!(result.len(), 5);
    }

    #[test]
    fn test_write_statements_rejected() {
        let (_dir, wh) = warehouse();
        for sql in [
            "DELETE FROM silver_imagery_metadata",
            "INSERT INTO vessel_positions VALUES ('v', '2024-01-01', 0, 0)",
            "DROP TABLE gold_daily_summary",
        ] {
            assert!(
                matches!(wh.query(sql), Err(WarehouseError::ReadOnly(_))),
                "{sql}"
            );
        }
        let n = wh.query("SELECT COUNT(*) AS n FROM silver_imagery_metadata").unwrap();
        assert_eq!(n.rows[0][0], Value::Integer(5));
    }

    #[test]
    fn test_bad_sql_is_typed_error() {
        let (_dir, wh) = warehouse();
        assert!(matches!(
            wh.query("SELECT * FROM no_such_table"),
            Err(WarehouseError::Sql(_))
        ));
    }

    #[test]
    fn test_presign_function() {
        let (_dir, wh) = warehouse();
        let result = wh
            .query(
                "SELECT GET_PRESIGNED_URL('@s3_imagery_stage_direct', 'wv3/0001.tif', 3600) AS url",
            )
            .unwrap();
        let url = result.row(0).unwrap().text("url").unwrap();
        assert!(url.starts_with(
            "https://imagery.localhost/s3_imagery_stage_direct/wv3/0001.tif?expires="
        ));

        // an invalid ttl surfaces as a query error
        assert!(wh
            .query("SELECT GET_PRESIGNED_URL('@stage', 'k', 0) AS url")
            .is_err());
    }

    #[test]
    fn test_open_missing_file() {
        let signer = UrlSigner::new("k", "https://imagery.localhost").unwrap();
        let err = SqliteWarehouse::open(
            Path::new("/nonexistent/wh.db"),
            signer,
            Duration::from_secs(1),
        );
        assert!(matches!(err, Err(WarehouseError::Open { .. })));
    }
}
