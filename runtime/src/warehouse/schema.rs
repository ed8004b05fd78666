//! Schema of the logical warehouse tables, and warehouse initialization.

use std::path::Path;

use rusqlite::Connection;

use super::WarehouseError;

/// DDL for every table the application reads.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS silver_imagery_metadata (
    image_id TEXT PRIMARY KEY,
    capture_timestamp TEXT NOT NULL,
    capture_date TEXT,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    sensor_category TEXT NOT NULL,
    resolution_meters REAL,
    file_size_bytes INTEGER,
    file_url TEXT,
    s3_bucket TEXT,
    s3_key TEXT,
    data_quality_score REAL,
    combined_quality_score REAL NOT NULL,
    h3_res8_city TEXT,
    h3_res9_neighborhood TEXT,
    distance_to_sf_downtown_m REAL,
    bay_region TEXT,
    within_5km_sf_downtown BOOLEAN,
    closest_landmark TEXT,
    estimated_coverage_hectares REAL,
    batch_id TEXT
);

CREATE TABLE IF NOT EXISTS silver_imagery_spatial_metrics (
    image_id TEXT PRIMARY KEY,
    capture_date TEXT NOT NULL,
    urban_classification TEXT,
    avg_distance_to_landmarks_m REAL,
    quality_per_hectare_ratio REAL,
    h3_coverage_category TEXT,
    latitude_decimal_places INTEGER,
    longitude_decimal_places INTEGER
);

CREATE TABLE IF NOT EXISTS gold_daily_summary (
    capture_date TEXT NOT NULL,
    bay_region TEXT NOT NULL,
    sensor_category TEXT NOT NULL,
    total_images INTEGER,
    unique_h3_cells INTEGER,
    avg_quality_score REAL,
    total_coverage_hectares REAL,
    spatial_diversity_index_pct REAL,
    operational_effectiveness_score REAL,
    images_within_5km_sf INTEGER,
    ultra_high_res_count INTEGER,
    high_res_count INTEGER,
    PRIMARY KEY (capture_date, bay_region, sensor_category)
);

CREATE TABLE IF NOT EXISTS vessel_positions (
    vessel_id TEXT NOT NULL,
    observed_at TEXT NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    PRIMARY KEY (vessel_id, observed_at)
);
";

/// A small Bay Area data set for demos and smoke tests.
pub const SAMPLE_DATA: &str = "
INSERT OR REPLACE INTO silver_imagery_metadata VALUES
 ('WV3_20240503_SF_FIDI_0001', '2024-05-03 18:42:10', '2024-05-03', 37.7946, -122.3999, 'WorldView-3', 0.31, 48213004, 's3://nga-imagery/wv3/0001.tif', 'nga-imagery', 'wv3/20240503/0001.tif', 96.0, 95.0, '8828308281fffff', '8928308280bffff', 412.0, 'San Francisco', 1, 'Ferry Building', 12.4, 'batch-0503'),
 ('WV3_20240503_SF_MISSION_0002', '2024-05-03 18:42:55', '2024-05-03', 37.7599, -122.4148, 'WorldView-3', 0.31, 47100233, 's3://nga-imagery/wv3/0002.tif', 'nga-imagery', 'wv3/20240503/0002.tif', 84.0, 82.0, '8828308281fffff', '8928308283bffff', 3890.0, 'San Francisco', 1, 'Mission Dolores', 11.9, 'batch-0503'),
 ('SEN2_20240502_EB_OAK_0003', '2024-05-02 19:01:00', '2024-05-02', 37.8044, -122.2712, 'Sentinel-2', 10.0, 120331000, 's3://nga-imagery/s2/0003.tif', 'nga-imagery', 's2/20240502/0003.tif', 70.0, 61.0, '882830828dfffff', '892830828cfffff', 12800.0, 'East Bay', 0, 'Lake Merritt', 980.0, 'batch-0502'),
 ('SAR_20240502_SB_SJ_0004', '2024-05-02 02:15:44', '2024-05-02', 37.3382, -121.8863, 'Capella-SAR', 0.5, 88211002, 's3://nga-imagery/sar/0004.tif', 'nga-imagery', 'sar/20240502/0004.tif', 91.0, 90.5, '88283475a9fffff', '89283475a93ffff', 67500.0, 'South Bay', 0, 'Downtown San Jose', 25.0, 'batch-0502'),
 ('PLN_20240501_NB_SR_0005', '2024-05-01 17:30:12', '2024-05-01', 38.4404, -122.7141, 'PlanetScope', 3.0, 30122110, 's3://nga-imagery/pl/0005.tif', 'nga-imagery', NULL, 88.0, 87.0, '8828309a65fffff', '8928309a643ffff', 79000.0, 'North Bay', 0, 'Santa Rosa Plaza', 150.0, 'batch-0501');

INSERT OR REPLACE INTO silver_imagery_spatial_metrics VALUES
 ('WV3_20240503_SF_FIDI_0001', '2024-05-03', 'Dense Urban', 640.0, 7.66, 'City Core', 4, 4),
 ('SEN2_20240502_EB_OAK_0003', '2024-05-02', 'Urban', 2100.0, 0.06, 'Metro', 4, 4),
 ('SAR_20240502_SB_SJ_0004', '2024-05-02', 'Suburban', 5100.0, 3.62, 'Metro', 4, 4);

INSERT OR REPLACE INTO gold_daily_summary VALUES
 ('2024-05-03', 'San Francisco', 'WorldView-3', 2, 1, 88.5, 24.3, 50.0, 82.1, 2, 2, 2),
 ('2024-05-02', 'East Bay', 'Sentinel-2', 1, 1, 61.0, 980.0, 100.0, 55.4, 0, 0, 0),
 ('2024-05-02', 'South Bay', 'Capella-SAR', 1, 1, 90.5, 25.0, 100.0, 78.0, 0, 0, 1),
 ('2024-05-01', 'North Bay', 'PlanetScope', 1, 1, 87.0, 150.0, 100.0, 70.2, 0, 0, 0);

INSERT OR REPLACE INTO vessel_positions VALUES
 ('MMSI-366999001', '2024-05-03 06:00:00', 37.8080, -122.4100),
 ('MMSI-366999001', '2024-05-03 06:00:30', 37.8082, -122.4101),
 ('MMSI-366999001', '2024-05-03 06:10:00', 37.8300, -122.4300),
 ('MMSI-366999002', '2024-05-03 06:00:00', 37.7000, -122.3000),
 ('MMSI-366999002', '2024-05-03 06:00:40', 37.7100, -122.3000);
";

/// Create the warehouse file and its tables. Safe to run repeatedly.
pub fn init(path: &Path, with_sample: bool) -> Result<(), WarehouseError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path).map_err(|source| WarehouseError::Open {
        path: path.display().to_string(),
        source,
    })?;
    conn.execute_batch(SCHEMA)?;
    if with_sample {
        conn.execute_batch(SAMPLE_DATA)?;
    }
    tracing::info!("initialized warehouse at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("wh.db");
        init(&path, false).unwrap();
        init(&path, false).unwrap();

        let conn = Connection::open(&path).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tables, 4);
    }

    #[test]
    fn test_sample_data_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wh.db");
        init(&path, true).unwrap();
        let conn = Connection::open(&path).unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM silver_imagery_metadata", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 5);
    }
}
