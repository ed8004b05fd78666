//! Dashboard pages.
//!
//! Each interaction carries its own [`InteractionState`]; a render is a
//! pure function of that state and the fetched tables.

use std::fmt;
use std::str::FromStr;

use imint::filter::{self, DEFAULT_MIN_QUALITY};
use imint::views::{
    self, CatalogEntry, CellCount, DailyCollection, EffectivenessPoint, ImageDetail, MapLayer,
    OverviewMetrics, QualityDistribution, RegionQuality,
};
use imint::{DailySummary, DateRange, FilterCriteria, ImageRecord, QualityBands, SpatialMetric};
use serde::{Deserialize, Serialize};

use crate::fetcher::Fetcher;
use crate::warehouse::WarehouseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Page {
    #[default]
    Overview,
    Viewer,
    Geospatial,
    Reports,
}

impl Page {
    pub const ALL: [Page; 4] = [Page::Overview, Page::Viewer, Page::Geospatial, Page::Reports];

    pub fn title(self) -> &'static str {
        match self {
            Page::Overview => "Operational Dashboard",
            Page::Viewer => "Imagery Viewer",
            Page::Geospatial => "Geospatial Analysis",
            Page::Reports => "Intelligence Reports",
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Page::Overview => "overview",
            Page::Viewer => "viewer",
            Page::Geospatial => "geospatial",
            Page::Reports => "reports",
        };
        f.write_str(name)
    }
}

impl FromStr for Page {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overview" | "dashboard" => Ok(Page::Overview),
            "viewer" | "imagery" => Ok(Page::Viewer),
            "geo" | "geospatial" | "map" => Ok(Page::Geospatial),
            "reports" | "report" => Ok(Page::Reports),
            other => Err(format!(
                "unknown page '{other}' (expected overview, viewer, geo or reports)"
            )),
        }
    }
}

/// Raw filter controls as entered by a user. Every field is optional and
/// malformed values fall back to the dashboard defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterInput {
    pub start: Option<String>,
    pub end: Option<String>,
    pub sensors: Option<Vec<String>>,
    pub min_quality: Option<f64>,
}

impl FilterInput {
    /// Criteria for `imagery`: the dashboard defaults, overridden by
    /// whatever was supplied.
    pub fn resolve(&self, imagery: &[ImageRecord]) -> FilterCriteria {
        self.overlay(FilterCriteria::dashboard_default(imagery))
    }

    /// Only the supplied constraints; every other axis passes through.
    /// Used for analyst results, which have no dashboard defaults.
    pub fn explicit(&self) -> FilterCriteria {
        self.overlay(FilterCriteria::pass_through())
    }

    fn overlay(&self, mut criteria: FilterCriteria) -> FilterCriteria {
        if self.start.is_some() || self.end.is_some() {
            criteria.date_range = Some(DateRange::parse(
                self.start.as_deref(),
                self.end.as_deref(),
            ));
        }
        if let Some(sensors) = &self.sensors {
            criteria = criteria.with_categories(sensors.iter().map(|s| s.trim()));
        }
        if let Some(q) = self.min_quality {
            let q = if q.is_finite() {
                q.clamp(0.0, 100.0)
            } else {
                DEFAULT_MIN_QUALITY
            };
            criteria = criteria.with_min_quality(q);
        }
        criteria
    }
}

/// State of one interaction with the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionState {
    pub page: Page,
    pub filters: FilterInput,
    pub selected_image: Option<String>,
}

/// The three fetched tables.
#[derive(Debug, Clone, Default)]
pub struct DashboardData {
    pub imagery: Vec<ImageRecord>,
    pub spatial: Vec<SpatialMetric>,
    pub summary: Vec<DailySummary>,
}

impl DashboardData {
    pub fn load(fetcher: &mut Fetcher) -> Result<Self, WarehouseError> {
        Ok(Self {
            imagery: fetcher.imagery()?,
            spatial: fetcher.spatial()?,
            summary: fetcher.summary()?,
        })
    }

    pub fn find_image(&self, image_id: &str) -> Option<&ImageRecord> {
        self.imagery.iter().find(|r| r.image_id == image_id)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PageView {
    Overview {
        metrics: OverviewMetrics,
        /// Images in the warehouse before filtering.
        pipeline_images: usize,
        daily: Vec<DailyCollection>,
    },
    Viewer {
        catalog: Vec<CatalogEntry>,
        selected: Option<ImageDetail>,
        /// Signed link to the selected image, see [`presign_selected`].
        presigned_url: Option<String>,
    },
    Geospatial {
        map: MapLayer,
        top_cells: Vec<CellCount>,
        regions: Vec<RegionQuality>,
    },
    Reports {
        effectiveness: Vec<EffectivenessPoint>,
        quality: QualityDistribution,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedPage {
    pub page: Page,
    pub title: &'static str,
    pub criteria: FilterCriteria,
    pub total_images: usize,
    pub filtered_images: usize,
    pub view: PageView,
}

/// Assemble the page named by `state.page`.
pub fn render(state: &InteractionState, data: &DashboardData, bands: QualityBands) -> RenderedPage {
    let criteria = state.filters.resolve(&data.imagery);
    let filtered = filter::apply(&data.imagery, &criteria);

    let view = match state.page {
        Page::Overview => PageView::Overview {
            metrics: views::overview_metrics(&filtered, bands),
            pipeline_images: data.imagery.len(),
            daily: views::daily_collection(&filtered),
        },
        Page::Viewer => PageView::Viewer {
            catalog: views::catalog(&filtered),
            selected: state
                .selected_image
                .as_deref()
                .and_then(|id| data.find_image(id))
                .map(|record| views::image_detail(record, &data.spatial)),
            presigned_url: None,
        },
        Page::Geospatial => PageView::Geospatial {
            map: views::map_layer(&filtered),
            top_cells: views::top_h3_cells(&filtered),
            regions: views::region_quality(&filtered),
        },
        Page::Reports => PageView::Reports {
            effectiveness: views::effectiveness_trend(&data.summary),
            quality: views::quality_distribution(&filtered, bands),
        },
    };

    RenderedPage {
        page: state.page,
        title: state.page.title(),
        criteria,
        total_images: data.imagery.len(),
        filtered_images: filtered.len(),
        view,
    }
}

/// Attach a presigned URL for the viewer's selected image. Images without
/// an object key, and failed presigns, leave it empty.
pub fn presign_selected(page: &mut RenderedPage, data: &DashboardData, fetcher: &Fetcher) {
    if let PageView::Viewer {
        selected: Some(detail),
        presigned_url,
        ..
    } = &mut page.view
    {
        *presigned_url = data
            .find_image(&detail.image_id)
            .and_then(|record| record.s3_key.as_deref())
            .and_then(|key| fetcher.presigned_url(key));
    }
}
