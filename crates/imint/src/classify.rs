//! Image classification via ONNX Runtime.
//!
//! Two model families are supported, each with its own preprocessing:
//! Hugging Face image classifiers (exact resize, mean/std 0.5, labels from
//! the model's `id2label` table) and torchvision classifiers (shorter-side
//! resize, center crop, ImageNet mean/std, numeric class labels).

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;
use serde::{Deserialize, Serialize};

use crate::types::{ImintError, ImintResult};

/// Predictions returned per image.
pub const TOP_K: usize = 5;

/// Input edge length expected by both model families.
const INPUT_SIZE: u32 = 224;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
const HF_MEAN: [f32; 3] = [0.5, 0.5, 0.5];
const HF_STD: [f32; 3] = [0.5, 0.5, 0.5];

/// Supported classifier families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ModelKind {
    HuggingFace {
        model_id: String,
        /// Class index → label, from the model's `id2label` table.
        #[serde(default)]
        labels: BTreeMap<usize, String>,
    },
    Torchvision {
        model_name: String,
    },
}

impl ModelKind {
    pub fn preprocessing(&self) -> Preprocessing {
        match self {
            ModelKind::HuggingFace { .. } => Preprocessing::ResizeExact {
                size: INPUT_SIZE,
                mean: HF_MEAN,
                std: HF_STD,
            },
            ModelKind::Torchvision { .. } => Preprocessing::ResizeCenterCrop {
                resize: INPUT_SIZE,
                crop: INPUT_SIZE,
                mean: IMAGENET_MEAN,
                std: IMAGENET_STD,
            },
        }
    }

    /// Human-readable family name.
    pub fn type_name(&self) -> &'static str {
        match self {
            ModelKind::HuggingFace { .. } => "Hugging Face",
            ModelKind::Torchvision { .. } => "Torchvision",
        }
    }

    pub fn label(&self, idx: usize) -> String {
        match self {
            ModelKind::HuggingFace { labels, .. } => labels
                .get(&idx)
                .cloned()
                .unwrap_or_else(|| format!("Class_{idx}")),
            ModelKind::Torchvision { .. } => format!("Class_{idx}"),
        }
    }
}

/// How an image becomes an NCHW input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Preprocessing {
    /// Stretch to `size`×`size`.
    ResizeExact {
        size: u32,
        mean: [f32; 3],
        std: [f32; 3],
    },
    /// Scale the shorter side to `resize`, then cut the central
    /// `crop`×`crop` square.
    ResizeCenterCrop {
        resize: u32,
        crop: u32,
        mean: [f32; 3],
        std: [f32; 3],
    },
}

impl Preprocessing {
    /// Produce a `[1, 3, H, W]` tensor.
    pub fn apply(&self, img: &DynamicImage) -> Array4<f32> {
        let (prepared, mean, std) = match *self {
            Preprocessing::ResizeExact { size, mean, std } => (
                img.resize_exact(size, size, image::imageops::FilterType::Triangle),
                mean,
                std,
            ),
            Preprocessing::ResizeCenterCrop {
                resize,
                crop,
                mean,
                std,
            } => (center_crop(img, resize, crop), mean, std),
        };
        let rgb = prepared.to_rgb8();
        let (w, h) = rgb.dimensions();

        let mut tensor = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for c in 0..3usize {
                let val = pixel[c] as f32 / 255.0;
                tensor[[0, c, y as usize, x as usize]] = (val - mean[c]) / std[c];
            }
        }
        tensor
    }
}

fn center_crop(img: &DynamicImage, resize: u32, crop: u32) -> DynamicImage {
    let (w, h) = (img.width().max(1), img.height().max(1));
    let target = resize.max(crop);
    let scale = target as f64 / w.min(h) as f64;
    let new_w = ((w as f64 * scale).round() as u32).max(crop);
    let new_h = ((h as f64 * scale).round() as u32).max(crop);
    let resized = img.resize_exact(new_w, new_h, image::imageops::FilterType::Triangle);
    resized.crop_imm((new_w - crop) / 2, (new_h - crop) / 2, crop, crop)
}

/// One ranked class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    /// Probability as a percentage.
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub predictions: Vec<Prediction>,
    pub inference_ms: f64,
    pub device: String,
    pub model_type: String,
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        exps.into_iter().map(|e| e / sum).collect()
    } else {
        vec![0.0; logits.len()]
    }
}

/// The `k` most probable classes, highest first. Ties keep the lower index.
pub fn top_predictions(probs: &[f32], k: usize, kind: &ModelKind) -> Vec<Prediction> {
    let mut ranked: Vec<(usize, f32)> = probs.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .take(k)
        .map(|(idx, p)| Prediction {
            label: kind.label(idx),
            confidence: p as f64 * 100.0,
        })
        .collect()
}

#[derive(Deserialize)]
struct HfConfig {
    #[serde(default)]
    id2label: BTreeMap<String, String>,
}

/// Read the `id2label` table from a Hugging Face `config.json`.
pub fn load_hf_labels(config_json: &str) -> ImintResult<BTreeMap<usize, String>> {
    let config: HfConfig = serde_json::from_str(config_json)?;
    let mut labels = BTreeMap::new();
    for (k, v) in config.id2label {
        let idx = k
            .parse::<usize>()
            .map_err(|_| ImintError::InvalidInput(format!("id2label key is not an index: {k}")))?;
        labels.insert(idx, v);
    }
    Ok(labels)
}

/// Decode downloaded bytes into an RGB image.
pub fn decode_image(bytes: &[u8]) -> ImintResult<DynamicImage> {
    let img = image::load_from_memory(bytes)?;
    Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
}

/// An ONNX classifier of a known family.
pub struct ImageClassifier {
    session: Option<Session>,
    kind: ModelKind,
}

impl ImageClassifier {
    /// Load the model at `model_path`. A missing path leaves the classifier
    /// without a model; [`classify`](Self::classify) then reports that.
    pub fn new(model_path: Option<&Path>, kind: ModelKind) -> ImintResult<Self> {
        let Some(path) = model_path.filter(|p| p.exists()) else {
            tracing::warn!(
                "classifier model not found{}; image analysis is disabled",
                model_path
                    .map(|p| format!(" at {}", p.display()))
                    .unwrap_or_default()
            );
            return Ok(Self {
                session: None,
                kind,
            });
        };

        tracing::info!("Loading {} model from {}", kind.type_name(), path.display());
        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(1))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| ImintError::Classifier(format!("Failed to load ONNX model: {e}")))?;

        Ok(Self {
            session: Some(session),
            kind,
        })
    }

    pub fn has_model(&self) -> bool {
        self.session.is_some()
    }

    pub fn kind(&self) -> &ModelKind {
        &self.kind
    }

    /// Run the model and rank the top classes.
    pub fn classify(&mut self, img: &DynamicImage) -> ImintResult<ClassificationReport> {
        let Some(session) = self.session.as_mut() else {
            return Err(ImintError::ModelNotAvailable(format!(
                "no {} model loaded",
                self.kind.type_name()
            )));
        };

        let input = self.kind.preprocessing().apply(img);
        let input_tensor = Tensor::from_array(input)
            .map_err(|e| ImintError::Classifier(format!("Failed to create input tensor: {e}")))?;

        let start = Instant::now();
        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e| ImintError::Classifier(format!("ONNX inference failed: {e}")))?;
        let inference_ms = start.elapsed().as_secs_f64() * 1000.0;

        let (_shape, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ImintError::Classifier(format!("Failed to extract output: {e}")))?;

        let probs = softmax(logits);
        Ok(ClassificationReport {
            predictions: top_predictions(&probs, TOP_K, &self.kind),
            inference_ms,
            device: "cpu".to_string(),
            model_type: self.kind.type_name().to_string(),
        })
    }
}
