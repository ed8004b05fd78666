//! Vessel loitering detection.
//!
//! A vessel loiters when two of its reported positions are close in both
//! time and space. The pairing is a self-join computed by the warehouse;
//! this module only builds the statement and decodes the rows.

use chrono::NaiveDateTime;
use imint::records::{decode, Record};
use imint::RowRef;
use serde::{Deserialize, Serialize};

use crate::warehouse::{Warehouse, WarehouseError};

/// Proximity thresholds for pairing two positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoiterThresholds {
    /// Largest time gap between the two positions, in seconds.
    pub max_gap_secs: u64,
    /// Largest distance between the two positions, in meters.
    pub max_distance_m: f64,
}

impl Default for LoiterThresholds {
    fn default() -> Self {
        Self {
            max_gap_secs: 60,
            max_distance_m: 100.0,
        }
    }
}

/// Two positions of one vessel within the thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoiterEvent {
    pub vessel_id: String,
    pub first_seen: NaiveDateTime,
    pub last_seen: NaiveDateTime,
    pub gap_secs: f64,
    pub distance_m: f64,
    pub latitude: f64,
    pub longitude: f64,
}

impl Record for LoiterEvent {
    const TABLE: &'static str = "vessel_positions";
    const COLUMNS: &'static [&'static str] = &[
        "vessel_id",
        "first_seen",
        "last_seen",
        "gap_secs",
        "distance_m",
        "latitude",
        "longitude",
    ];

    fn from_row(row: RowRef<'_>) -> Result<Self, String> {
        let need = |name: &str| format!("missing or invalid {name}");
        Ok(Self {
            vessel_id: row.text("vessel_id").ok_or_else(|| need("vessel_id"))?,
            first_seen: row.timestamp("first_seen").ok_or_else(|| need("first_seen"))?,
            last_seen: row.timestamp("last_seen").ok_or_else(|| need("last_seen"))?,
            gap_secs: row.float("gap_secs").ok_or_else(|| need("gap_secs"))?,
            distance_m: row.float("distance_m").ok_or_else(|| need("distance_m"))?,
            latitude: row.float("latitude").ok_or_else(|| need("latitude"))?,
            longitude: row.float("longitude").ok_or_else(|| need("longitude"))?,
        })
    }
}

/// Self-join over `vessel_positions`, ordered by vessel and time.
pub fn loitering_sql(t: &LoiterThresholds) -> String {
    // julianday differences are fractional days; rounding keeps
    // boundary gaps such as exactly 60 s from drifting past the limit
    let gap = "ROUND((julianday(b.observed_at) - julianday(a.observed_at)) * 86400.0, 3)";
    let dist = "HAVERSINE_M(a.latitude, a.longitude, b.latitude, b.longitude)";
    format!(
        "SELECT a.vessel_id AS vessel_id, \
                a.observed_at AS first_seen, \
                b.observed_at AS last_seen, \
                {gap} AS gap_secs, \
                {dist} AS distance_m, \
                a.latitude AS latitude, \
                a.longitude AS longitude \
         FROM vessel_positions a \
         JOIN vessel_positions b \
           ON a.vessel_id = b.vessel_id AND b.observed_at > a.observed_at \
         WHERE {gap} <= {max_gap} AND {dist} <= {max_dist} \
         ORDER BY a.vessel_id, a.observed_at, b.observed_at",
        max_gap = t.max_gap_secs,
        max_dist = t.max_distance_m,
    )
}

/// Run the detector against `warehouse`.
pub fn detect(
    warehouse: &dyn Warehouse,
    thresholds: &LoiterThresholds,
) -> Result<Vec<LoiterEvent>, WarehouseError> {
    let result = warehouse.query(&loitering_sql(thresholds))?;
    let decoded = decode::<LoiterEvent>(&result);
    for rejected in &decoded.rejected {
        tracing::warn!("dropped loitering row: {rejected}");
    }
    tracing::info!(
        "loitering: {} events (gap <= {} s, distance <= {} m)",
        decoded.records.len(),
        thresholds.max_gap_secs,
        thresholds.max_distance_m
    );
    Ok(decoded.records)
}
