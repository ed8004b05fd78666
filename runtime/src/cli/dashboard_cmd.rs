//! `imint dashboard [page]`: render one dashboard page.

use anyhow::Result;

use crate::cli::output::{self, num, Styled};
use crate::cli::{open_fetcher, FilterArgs};
use crate::config::Config;
use crate::pages::{
    presign_selected, render, DashboardData, InteractionState, Page, PageView, RenderedPage,
};

pub async fn run(
    config: &Config,
    page: Page,
    filters: &FilterArgs,
    selected: Option<String>,
) -> Result<()> {
    let mut fetcher = open_fetcher(config)?;
    let data = DashboardData::load(&mut fetcher)?;
    let state = InteractionState {
        page,
        filters: filters.to_input(),
        selected_image: selected,
    };
    let mut rendered = render(&state, &data, config.quality_bands);
    presign_selected(&mut rendered, &data, &fetcher);

    if output::is_json() {
        output::print_json(&rendered);
        return Ok(());
    }
    if !output::is_quiet() {
        print_page(&rendered);
    }
    Ok(())
}

fn print_page(p: &RenderedPage) {
    let s = Styled::new();
    eprintln!("  {}", s.bold(p.title));
    eprintln!(
        "  {} of {} images match the filters",
        p.filtered_images, p.total_images
    );
    eprintln!();

    match &p.view {
        PageView::Overview {
            metrics,
            pipeline_images,
            daily,
        } => {
            eprintln!("  Total images      {}", metrics.total_images);
            eprintln!("  H3 cells covered  {}", metrics.h3_cells_covered);
            eprintln!("  Avg quality       {}%", num(metrics.avg_quality, 1));
            eprintln!("  Total coverage    {:.1} ha", metrics.total_coverage_hectares);
            eprintln!("  High quality      {}%", num(metrics.high_quality_pct, 1));
            eprintln!();
            eprintln!("  {} Data pipeline   {pipeline_images} images processed", s.ok_sym());
            eprintln!();
            if !daily.is_empty() {
                eprintln!("  Daily collection:");
                for d in daily {
                    eprintln!(
                        "    {}  {:>4} images  quality {:>5.1}  {:>8.1} ha",
                        d.capture_date, d.images, d.avg_quality, d.coverage_hectares
                    );
                }
            }
        }
        PageView::Viewer {
            catalog,
            selected,
            presigned_url,
        } => {
            if catalog.is_empty() {
                eprintln!("  No images match. Try broader filters.");
            }
            for e in catalog {
                eprintln!(
                    "    {:<24} {:<14} {:>5.1}%  {} - {}  {}",
                    e.display_id,
                    e.sensor_category,
                    e.quality,
                    e.bay_region.as_deref().unwrap_or("-"),
                    e.closest_landmark.as_deref().unwrap_or("-"),
                    e.capture_date
                );
            }
            match selected {
                Some(d) => {
                    eprintln!();
                    eprintln!("  Selected {}", s.bold(&d.image_id));
                    eprintln!("    Coordinates     {:.6}, {:.6}", d.latitude, d.longitude);
                    eprintln!("    H3 cell         {}", d.h3_cell.as_deref().unwrap_or("-"));
                    eprintln!("    Urban class     {}", d.urban_classification);
                    eprintln!("    Distance to SF  {}m", num(d.distance_to_downtown_m, 0));
                    if let Some(url) = presigned_url {
                        eprintln!("    Image URL       {url}");
                    }
                }
                None => {
                    eprintln!();
                    eprintln!("  {}", s.dim("Use --select <image-id> to view details."));
                }
            }
        }
        PageView::Geospatial {
            map,
            top_cells,
            regions,
        } => {
            match map.center {
                Some((lat, lon)) => eprintln!(
                    "  Map: {} points centered on {lat:.4}, {lon:.4}",
                    map.points.len()
                ),
                None => eprintln!("  Map: no points"),
            }
            if !top_cells.is_empty() {
                eprintln!();
                eprintln!("  Top H3 cells:");
                for c in top_cells {
                    eprintln!("    {:<16} {:>4}", c.label, c.images);
                }
            }
            if !regions.is_empty() {
                eprintln!();
                eprintln!("  Quality by region:");
                for r in regions {
                    eprintln!("    {:<16} {:>5.1}", r.bay_region, r.avg_quality);
                }
            }
        }
        PageView::Reports {
            effectiveness,
            quality,
        } => {
            if !effectiveness.is_empty() {
                eprintln!("  Operational effectiveness:");
                for e in effectiveness {
                    eprintln!(
                        "    {}  {:<14} {:<12} score {:>5.1}  diversity {:>5.1}%",
                        e.capture_date,
                        e.bay_region,
                        e.sensor_category,
                        e.operational_effectiveness_score,
                        e.spatial_diversity_index_pct
                    );
                }
                eprintln!();
            }
            eprintln!("  Quality distribution ({} images):", quality.count);
            eprintln!(
                "    mean {}  std {}  median {}",
                num(quality.mean, 1),
                num(quality.std_dev, 1),
                num(quality.median, 1)
            );
            eprintln!(
                "    min {}  max {}  high quality {}",
                num(quality.min, 1),
                num(quality.max, 1),
                quality.high_quality_count
            );
        }
    }
}
