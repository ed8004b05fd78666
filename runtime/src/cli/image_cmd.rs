//! `imint image <id>`: detail of one image with a presigned URL.

use anyhow::{bail, Result};
use imint::views;

use crate::cli::open_fetcher;
use crate::cli::output::{self, num, Styled};
use crate::config::Config;

pub async fn run(config: &Config, image_id: &str) -> Result<()> {
    let mut fetcher = open_fetcher(config)?;
    let imagery = fetcher.imagery()?;
    let Some(record) = imagery.iter().find(|r| r.image_id == image_id) else {
        bail!("No image '{image_id}'. Run 'imint dashboard viewer' to list images.");
    };
    let spatial = fetcher.spatial()?;
    let detail = views::image_detail(record, &spatial);
    let url = record
        .s3_key
        .as_deref()
        .and_then(|key| fetcher.presigned_url(key));

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "detail": detail,
            "presigned_url": url,
        }));
        return Ok(());
    }
    if output::is_quiet() {
        return Ok(());
    }

    let s = Styled::new();
    eprintln!("  {}", s.bold(&detail.image_id));
    eprintln!("    Sensor          {}", detail.sensor_category);
    eprintln!("    Captured        {}", detail.capture_date);
    eprintln!("    Coordinates     {:.6}, {:.6}", detail.latitude, detail.longitude);
    eprintln!("    H3 cell         {}", detail.h3_cell.as_deref().unwrap_or("-"));
    eprintln!("    Urban class     {}", detail.urban_classification);
    eprintln!("    Distance to SF  {}m", num(detail.distance_to_downtown_m, 0));
    match (&detail.s3_key, url) {
        (Some(_), Some(url)) => eprintln!("    URL             {url}"),
        (Some(key), None) => eprintln!("  {} Could not presign {key}", s.warn_sym()),
        (None, _) => eprintln!("  {} No S3 key for this image", s.warn_sym()),
    }
    Ok(())
}
