//! Presentation adapters: turn a filtered view into chart series, map
//! layers and statistics.
//!
//! Every adapter is a pure function over already-filtered records. They
//! produce serializable data for a renderer; nothing here draws.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::records::{DailySummary, ImageRecord, SpatialMetric};

/// Images listed in the catalog.
pub const CATALOG_SIZE: usize = 10;
/// Characters of the image id shown in the catalog.
pub const CATALOG_ID_CHARS: usize = 20;
/// Points plotted on the map layer.
pub const MAP_POINT_LIMIT: usize = 100;
/// Cells shown in the H3 coverage chart.
pub const TOP_H3_CELLS: usize = 10;
/// Characters of an H3 cell id shown as a chart label.
pub const H3_LABEL_CHARS: usize = 12;
/// Summary rows in the effectiveness trend.
pub const TREND_ROWS: usize = 7;

/// Quality score bands used by the statistics adapters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityBands {
    /// Scores at or above this count as high quality.
    pub high: f64,
}

impl Default for QualityBands {
    fn default() -> Self {
        Self { high: 90.0 }
    }
}

// ── Helpers ─────────────────────────────────────────────────────

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Shorten `s` to `max_chars` characters, marking the cut with "...".
pub fn truncate_label(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &s[..byte_idx]),
        None => s.to_string(),
    }
}

// ── Overview ────────────────────────────────────────────────────

/// Headline metrics of the overview page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewMetrics {
    pub total_images: usize,
    pub h3_cells_covered: usize,
    pub avg_quality: Option<f64>,
    pub total_coverage_hectares: f64,
    /// Percentage of images in the high-quality band.
    pub high_quality_pct: Option<f64>,
}

pub fn overview_metrics(records: &[ImageRecord], bands: QualityBands) -> OverviewMetrics {
    let h3_cells_covered = records
        .iter()
        .filter_map(|r| r.h3_res8_city.as_deref())
        .collect::<std::collections::HashSet<_>>()
        .len();
    let high = records
        .iter()
        .filter(|r| r.combined_quality_score >= bands.high)
        .count();

    OverviewMetrics {
        total_images: records.len(),
        h3_cells_covered,
        avg_quality: mean(records.iter().map(|r| r.combined_quality_score)),
        total_coverage_hectares: records
            .iter()
            .filter_map(|r| r.estimated_coverage_hectares)
            .sum(),
        high_quality_pct: (!records.is_empty())
            .then(|| high as f64 / records.len() as f64 * 100.0),
    }
}

/// One bar of the daily collection chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCollection {
    pub capture_date: NaiveDate,
    pub images: usize,
    pub avg_quality: f64,
    pub coverage_hectares: f64,
}

/// Per-day image count, mean quality and coverage, oldest day first.
pub fn daily_collection(records: &[ImageRecord]) -> Vec<DailyCollection> {
    let mut by_day: BTreeMap<NaiveDate, (usize, f64, f64)> = BTreeMap::new();
    for r in records {
        let day = by_day.entry(r.capture_date).or_default();
        day.0 += 1;
        day.1 += r.combined_quality_score;
        day.2 += r.estimated_coverage_hectares.unwrap_or(0.0);
    }
    by_day
        .into_iter()
        .map(|(capture_date, (images, quality_sum, coverage))| DailyCollection {
            capture_date,
            images,
            avg_quality: quality_sum / images as f64,
            coverage_hectares: coverage,
        })
        .collect()
}

// ── Viewer ──────────────────────────────────────────────────────

/// One card in the image catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub image_id: String,
    pub display_id: String,
    pub sensor_category: String,
    pub quality: f64,
    pub bay_region: Option<String>,
    pub closest_landmark: Option<String>,
    pub resolution_meters: Option<f64>,
    pub capture_date: NaiveDate,
}

pub fn catalog(records: &[ImageRecord]) -> Vec<CatalogEntry> {
    records
        .iter()
        .take(CATALOG_SIZE)
        .map(|r| CatalogEntry {
            image_id: r.image_id.clone(),
            display_id: truncate_label(&r.image_id, CATALOG_ID_CHARS),
            sensor_category: r.sensor_category.clone(),
            quality: r.combined_quality_score,
            bay_region: r.bay_region.clone(),
            closest_landmark: r.closest_landmark.clone(),
            resolution_meters: r.resolution_meters,
            capture_date: r.capture_date,
        })
        .collect()
}

/// Detail panel for the selected image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDetail {
    pub image_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub h3_cell: Option<String>,
    pub urban_classification: String,
    pub distance_to_downtown_m: Option<f64>,
    pub sensor_category: String,
    pub capture_date: NaiveDate,
    pub s3_key: Option<String>,
}

/// Join an image with its spatial metrics; the urban class reads "N/A"
/// when no metric row (or no classification) exists.
pub fn image_detail(record: &ImageRecord, spatial: &[SpatialMetric]) -> ImageDetail {
    let urban_classification = spatial
        .iter()
        .find(|m| m.image_id == record.image_id)
        .and_then(|m| m.urban_classification.clone())
        .unwrap_or_else(|| "N/A".to_string());

    ImageDetail {
        image_id: record.image_id.clone(),
        latitude: record.latitude,
        longitude: record.longitude,
        h3_cell: record.h3_res8_city.clone(),
        urban_classification,
        distance_to_downtown_m: record.distance_to_sf_downtown_m,
        sensor_category: record.sensor_category.clone(),
        capture_date: record.capture_date,
        s3_key: record.s3_key.clone(),
    }
}

// ── Geospatial ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    pub lat: f64,
    pub lon: f64,
    pub quality: f64,
    pub sensor: String,
}

/// Scatter layer for the map. `center` is the mean position of every
/// filtered image, while only the first points are plotted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapLayer {
    pub center: Option<(f64, f64)>,
    pub points: Vec<MapPoint>,
}

pub fn map_layer(records: &[ImageRecord]) -> MapLayer {
    let center = mean(records.iter().map(|r| r.latitude))
        .zip(mean(records.iter().map(|r| r.longitude)));
    MapLayer {
        center,
        points: records
            .iter()
            .take(MAP_POINT_LIMIT)
            .map(|r| MapPoint {
                lat: r.latitude,
                lon: r.longitude,
                quality: r.combined_quality_score,
                sensor: r.sensor_category.clone(),
            })
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellCount {
    pub cell: String,
    pub label: String,
    pub images: usize,
}

/// Most-imaged H3 cells, highest count first. Ties keep first-seen order.
pub fn top_h3_cells(records: &[ImageRecord]) -> Vec<CellCount> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for cell in records.iter().filter_map(|r| r.h3_res8_city.as_deref()) {
        let n = counts.entry(cell).or_insert(0);
        if *n == 0 {
            order.push(cell);
        }
        *n += 1;
    }
    // stable sort keeps first-seen order among equal counts
    order.sort_by_key(|cell| std::cmp::Reverse(counts[cell]));

    order
        .into_iter()
        .take(TOP_H3_CELLS)
        .map(|cell| CellCount {
            cell: cell.to_string(),
            label: truncate_label(cell, H3_LABEL_CHARS),
            images: counts[cell],
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionQuality {
    pub bay_region: String,
    pub avg_quality: f64,
}

/// Mean quality per bay region, best region first.
pub fn region_quality(records: &[ImageRecord]) -> Vec<RegionQuality> {
    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for r in records {
        if let Some(region) = r.bay_region.as_deref() {
            let e = sums.entry(region).or_default();
            e.0 += r.combined_quality_score;
            e.1 += 1;
        }
    }
    let mut out: Vec<RegionQuality> = sums
        .into_iter()
        .map(|(region, (sum, n))| RegionQuality {
            bay_region: region.to_string(),
            avg_quality: sum / n as f64,
        })
        .collect();
    out.sort_by(|a, b| b.avg_quality.total_cmp(&a.avg_quality));
    out
}

// ── Reports ─────────────────────────────────────────────────────

/// One point of the operational effectiveness trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectivenessPoint {
    pub capture_date: NaiveDate,
    pub bay_region: String,
    pub sensor_category: String,
    pub operational_effectiveness_score: f64,
    pub spatial_diversity_index_pct: f64,
    pub avg_quality_score: f64,
    pub total_images: i64,
}

/// The latest summary rows. Summary fetches are newest first, so this is
/// a prefix of the input.
pub fn effectiveness_trend(summary: &[DailySummary]) -> Vec<EffectivenessPoint> {
    summary
        .iter()
        .take(TREND_ROWS)
        .map(|s| EffectivenessPoint {
            capture_date: s.capture_date,
            bay_region: s.bay_region.clone(),
            sensor_category: s.sensor_category.clone(),
            operational_effectiveness_score: s.operational_effectiveness_score,
            spatial_diversity_index_pct: s.spatial_diversity_index_pct,
            avg_quality_score: s.avg_quality_score,
            total_images: s.total_images,
        })
        .collect()
}

/// Descriptive statistics of the combined quality score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityDistribution {
    pub count: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation; needs at least two images.
    pub std_dev: Option<f64>,
    pub min: Option<f64>,
    pub median: Option<f64>,
    pub max: Option<f64>,
    pub high_quality_count: usize,
}

pub fn quality_distribution(records: &[ImageRecord], bands: QualityBands) -> QualityDistribution {
    let mut scores: Vec<f64> = records.iter().map(|r| r.combined_quality_score).collect();
    scores.sort_by(f64::total_cmp);

    let n = scores.len();
    let avg = mean(scores.iter().copied());
    let std_dev = match avg {
        Some(m) if n > 1 => {
            let var = scores.iter().map(|s| (s - m).powi(2)).sum::<f64>() / (n - 1) as f64;
            Some(var.sqrt())
        }
        _ => None,
    };
    let median = match n {
        0 => None,
        _ if n % 2 == 1 => Some(scores[n / 2]),
        _ => Some((scores[n / 2 - 1] + scores[n / 2]) / 2.0),
    };

    QualityDistribution {
        count: n,
        mean: avg,
        std_dev,
        min: scores.first().copied(),
        median,
        max: scores.last().copied(),
        high_quality_count: scores.iter().filter(|&&s| s >= bands.high).count(),
    }
}
