//! `imint classify <s3-key>`: run the image classifier on a stored image.

use std::time::Duration;

use anyhow::{Context, Result};
use imint::classify::load_hf_labels;
use imint::{ImageClassifier, ModelKind};

use crate::analysis::ImageAnalyzer;
use crate::cli::open_fetcher;
use crate::cli::output::{self, Styled};
use crate::config::Config;

/// The configured model kind, with Hugging Face labels read from
/// `model_labels_path` when one is set.
pub fn model_kind(config: &Config) -> Result<ModelKind> {
    let mut kind = config.model.clone();
    if let (ModelKind::HuggingFace { labels, .. }, Some(path)) =
        (&mut kind, &config.model_labels_path)
    {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read model labels {}", path.display()))?;
        *labels = load_hf_labels(&raw)?;
    }
    Ok(kind)
}

pub fn analyzer(config: &Config) -> Result<ImageAnalyzer> {
    let classifier = ImageClassifier::new(config.model_path.as_deref(), model_kind(config)?)?;
    Ok(ImageAnalyzer::new(
        classifier,
        Duration::from_secs(config.download_timeout_secs),
    )?)
}

pub async fn run(config: &Config, s3_key: &str) -> Result<()> {
    let fetcher = open_fetcher(config)?;
    let mut analyzer = analyzer(config)?;
    let report = analyzer.analyze(&fetcher, s3_key).await?;

    if output::is_json() {
        output::print_json(&report);
        return Ok(());
    }
    if output::is_quiet() {
        return Ok(());
    }

    let s = Styled::new();
    eprintln!(
        "  {} {} ({}x{}, {} model, {:.1} ms on {})",
        s.ok_sym(),
        report.s3_key,
        report.width,
        report.height,
        report.classification.model_type,
        report.classification.inference_ms,
        report.classification.device
    );
    eprintln!();
    for (i, p) in report.classification.predictions.iter().enumerate() {
        eprintln!("    {}. {:<32} {:>6.2}%", i + 1, p.label, p.confidence);
    }
    Ok(())
}
