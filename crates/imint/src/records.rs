//! Typed records for the logical warehouse tables.
//!
//! Rows are validated here, at the fetch boundary: a row that is missing a
//! required field or carries an out-of-range value is rejected with a
//! reason, and the remaining rows decode normally.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::types::{ImintError, QueryResult, RowRef};

/// A record type that can be decoded from one warehouse row.
///
/// `COLUMNS` lists the selected columns in struct field order; it drives
/// both the fetch projection and the CSV header.
pub trait Record: Sized {
    /// Logical table name used in diagnostics.
    const TABLE: &'static str;
    /// Column projection, in field order.
    const COLUMNS: &'static [&'static str];

    /// Decode a row, or explain why it is invalid.
    fn from_row(row: RowRef<'_>) -> Result<Self, String>;
}

/// Outcome of decoding a whole result.
#[derive(Debug)]
pub struct Decoded<T> {
    pub records: Vec<T>,
    pub rejected: Vec<ImintError>,
}

/// Decode every row of `result` into `T`, collecting rejections.
pub fn decode<T: Record>(result: &QueryResult) -> Decoded<T> {
    let mut records = Vec::with_capacity(result.len());
    let mut rejected = Vec::new();
    for (i, row) in result.iter().enumerate() {
        match T::from_row(row) {
            Ok(rec) => records.push(rec),
            Err(reason) => rejected.push(ImintError::InvalidRow {
                table: T::TABLE,
                row: i,
                reason,
            }),
        }
    }
    Decoded { records, rejected }
}

fn required<T>(value: Option<T>, column: &str) -> Result<T, String> {
    value.ok_or_else(|| format!("missing or invalid {column}"))
}

fn score_in_range(score: f64, column: &str) -> Result<f64, String> {
    if (0.0..=100.0).contains(&score) {
        Ok(score)
    } else {
        Err(format!("{column} {score} outside [0, 100]"))
    }
}

// ── Image metadata ──────────────────────────────────────────────

/// One captured image, as stored in the silver metadata table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub image_id: String,
    pub capture_timestamp: NaiveDateTime,
    pub capture_date: NaiveDate,
    pub latitude: f64,
    pub longitude: f64,
    pub sensor_category: String,
    pub resolution_meters: Option<f64>,
    pub file_size_bytes: Option<i64>,
    pub file_url: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_key: Option<String>,
    pub data_quality_score: Option<f64>,
    pub combined_quality_score: f64,
    pub h3_res8_city: Option<String>,
    pub h3_res9_neighborhood: Option<String>,
    pub distance_to_sf_downtown_m: Option<f64>,
    pub bay_region: Option<String>,
    pub within_5km_sf_downtown: Option<bool>,
    pub closest_landmark: Option<String>,
    pub estimated_coverage_hectares: Option<f64>,
    pub batch_id: Option<String>,
}

impl Record for ImageRecord {
    const TABLE: &'static str = "silver_imagery_metadata";
    const COLUMNS: &'static [&'static str] = &[
        "image_id",
        "capture_timestamp",
        "capture_date",
        "latitude",
        "longitude",
        "sensor_category",
        "resolution_meters",
        "file_size_bytes",
        "file_url",
        "s3_bucket",
        "s3_key",
        "data_quality_score",
        "combined_quality_score",
        "h3_res8_city",
        "h3_res9_neighborhood",
        "distance_to_sf_downtown_m",
        "bay_region",
        "within_5km_sf_downtown",
        "closest_landmark",
        "estimated_coverage_hectares",
        "batch_id",
    ];

    fn from_row(row: RowRef<'_>) -> Result<Self, String> {
        let image_id = required(row.text("image_id"), "image_id")?;
        let capture_timestamp = required(row.timestamp("capture_timestamp"), "capture_timestamp")?;
        // capture_date is derived from the timestamp when the warehouse omits it
        let capture_date = row
            .date("capture_date")
            .unwrap_or_else(|| capture_timestamp.date());

        let latitude = required(row.float("latitude"), "latitude")?;
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(format!("latitude {latitude} out of range"));
        }
        let longitude = required(row.float("longitude"), "longitude")?;
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(format!("longitude {longitude} out of range"));
        }

        let combined_quality_score = score_in_range(
            required(row.float("combined_quality_score"), "combined_quality_score")?,
            "combined_quality_score",
        )?;

        Ok(Self {
            image_id,
            capture_timestamp,
            capture_date,
            latitude,
            longitude,
            sensor_category: required(row.text("sensor_category"), "sensor_category")?,
            resolution_meters: row.float("resolution_meters"),
            file_size_bytes: row.int("file_size_bytes"),
            file_url: row.text("file_url"),
            s3_bucket: row.text("s3_bucket"),
            s3_key: row.text("s3_key").filter(|k| !k.trim().is_empty()),
            data_quality_score: row.float("data_quality_score"),
            combined_quality_score,
            h3_res8_city: row.text("h3_res8_city"),
            h3_res9_neighborhood: row.text("h3_res9_neighborhood"),
            distance_to_sf_downtown_m: row.float("distance_to_sf_downtown_m"),
            bay_region: row.text("bay_region"),
            within_5km_sf_downtown: row.boolean("within_5km_sf_downtown"),
            closest_landmark: row.text("closest_landmark"),
            estimated_coverage_hectares: row.float("estimated_coverage_hectares"),
            batch_id: row.text("batch_id"),
        })
    }
}

// ── Spatial metrics ─────────────────────────────────────────────

/// Derived spatial metrics for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialMetric {
    pub image_id: String,
    pub capture_date: NaiveDate,
    pub urban_classification: Option<String>,
    pub avg_distance_to_landmarks_m: Option<f64>,
    pub quality_per_hectare_ratio: Option<f64>,
    pub h3_coverage_category: Option<String>,
    pub latitude_decimal_places: Option<i64>,
    pub longitude_decimal_places: Option<i64>,
}

impl Record for SpatialMetric {
    const TABLE: &'static str = "silver_imagery_spatial_metrics";
    const COLUMNS: &'static [&'static str] = &[
        "image_id",
        "capture_date",
        "urban_classification",
        "avg_distance_to_landmarks_m",
        "quality_per_hectare_ratio",
        "h3_coverage_category",
        "latitude_decimal_places",
        "longitude_decimal_places",
    ];

    fn from_row(row: RowRef<'_>) -> Result<Self, String> {
        Ok(Self {
            image_id: required(row.text("image_id"), "image_id")?,
            capture_date: required(row.date("capture_date"), "capture_date")?,
            urban_classification: row.text("urban_classification"),
            avg_distance_to_landmarks_m: row.float("avg_distance_to_landmarks_m"),
            quality_per_hectare_ratio: row.float("quality_per_hectare_ratio"),
            h3_coverage_category: row.text("h3_coverage_category"),
            latitude_decimal_places: row.int("latitude_decimal_places"),
            longitude_decimal_places: row.int("longitude_decimal_places"),
        })
    }
}

// ── Operational summary ─────────────────────────────────────────

/// One day × region × sensor row of the gold operational summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub capture_date: NaiveDate,
    pub bay_region: String,
    pub sensor_category: String,
    pub total_images: i64,
    pub unique_h3_cells: i64,
    pub avg_quality_score: f64,
    pub total_coverage_hectares: f64,
    pub spatial_diversity_index_pct: f64,
    pub operational_effectiveness_score: f64,
    pub images_within_5km_sf: i64,
    pub ultra_high_res_count: i64,
    pub high_res_count: i64,
}

impl Record for DailySummary {
    const TABLE: &'static str = "gold_daily_summary";
    const COLUMNS: &'static [&'static str] = &[
        "capture_date",
        "bay_region",
        "sensor_category",
        "total_images",
        "unique_h3_cells",
        "avg_quality_score",
        "total_coverage_hectares",
        "spatial_diversity_index_pct",
        "operational_effectiveness_score",
        "images_within_5km_sf",
        "ultra_high_res_count",
        "high_res_count",
    ];

    fn from_row(row: RowRef<'_>) -> Result<Self, String> {
        Ok(Self {
            capture_date: required(row.date("capture_date"), "capture_date")?,
            bay_region: row.text("bay_region").unwrap_or_default(),
            sensor_category: row.text("sensor_category").unwrap_or_default(),
            total_images: row.int("total_images").unwrap_or(0),
            unique_h3_cells: row.int("unique_h3_cells").unwrap_or(0),
            avg_quality_score: score_in_range(
                required(row.float("avg_quality_score"), "avg_quality_score")?,
                "avg_quality_score",
            )?,
            total_coverage_hectares: row.float("total_coverage_hectares").unwrap_or(0.0),
            spatial_diversity_index_pct: row.float("spatial_diversity_index_pct").unwrap_or(0.0),
            operational_effectiveness_score: row
                .float("operational_effectiveness_score")
                .unwrap_or(0.0),
            images_within_5km_sf: row.int("images_within_5km_sf").unwrap_or(0),
            ultra_high_res_count: row.int("ultra_high_res_count").unwrap_or(0),
            high_res_count: row.int("high_res_count").unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, Value};

    fn image_table(rows: Vec<Vec<Value>>) -> QueryResult {
        let columns = [
            "image_id",
            "capture_timestamp",
            "latitude",
            "longitude",
            "sensor_category",
            "combined_quality_score",
            "s3_key",
        ]
        .iter()
        .map(|c| Column::new(*c))
        .collect();
        QueryResult::new(columns, rows).unwrap()
    }

    fn row(id: &str, lat: f64, quality: Value) -> Vec<Value> {
        vec![
            Value::Text(id.into()),
            Value::Text("2024-05-01 10:15:00".into()),
            Value::Float(lat),
            Value::Float(-122.41),
            Value::Text("WorldView-3".into()),
            quality,
            Value::Text("".into()),
        ]
    }

    #[test]
    fn test_decode_valid_image_row() {
        let table = image_table(vec![row("img-1", 37.77, Value::Float(91.5))]);
        let decoded = decode::<ImageRecord>(&table);
        assert!(decoded.rejected.is_empty());
        let rec = &decoded.records[0];
        assert_eq!(rec.image_id, "img-1");
        assert_eq!(rec.capture_date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(rec.combined_quality_score, 91.5);
        // blank keys are treated as absent
        assert!(rec.s3_key.is_none());
    }

    #[test]
    fn test_invalid_rows_rejected_rest_kept() {
        let table = image_table(vec![
            row("ok", 37.7, Value::Float(80.0)),
            row("bad-lat", 137.7, Value::Float(80.0)),
            row("bad-score", 37.7, Value::Float(140.0)),
            row("no-score", 37.7, Value::Null),
        ]);
        let decoded = decode::<ImageRecord>(&table);
        assert_eq!(decoded.records.len(), 1);
        assert_eq!(decoded.rejected.len(), 3);
        assert!(matches!(
            decoded.rejected[0],
            ImintError::InvalidRow { row: 1, .. }
        ));
    }

    #[test]
    fn test_summary_defaults_missing_counts() {
        let table = QueryResult::new(
            vec![
                Column::new("capture_date"),
                Column::new("bay_region"),
                Column::new("avg_quality_score"),
            ],
            vec![vec![
                Value::Text("2024-05-02".into()),
                Value::Text("North Bay".into()),
                Value::Integer(88),
            ]],
        )
        .unwrap();
        let decoded = decode::<DailySummary>(&table);
        let rec = &decoded.records[0];
        assert_eq!(rec.total_images, 0);
        assert_eq!(rec.avg_quality_score, 88.0);
        assert_eq!(rec.bay_region, "North Bay");
    }

    #[test]
    fn test_columns_match_field_count() {
        assert_eq!(ImageRecord::COLUMNS.len(), 21);
        assert_eq!(SpatialMetric::COLUMNS.len(), 8);
        assert_eq!(DailySummary::COLUMNS.len(), 12);
    }
}
