//! Image analysis: presign, download, decode, classify.

use std::time::Duration;

use imint::classify::decode_image;
use imint::{ClassificationReport, ImageClassifier, ImintError};
use serde::Serialize;

use crate::fetcher::Fetcher;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("image analysis unavailable: {0}")]
    ModelUnavailable(String),

    #[error("no presigned url for '{0}'")]
    Presign(String),

    #[error("image download timed out")]
    Timeout,

    #[error("image download failed: {0}")]
    Download(reqwest::Error),

    #[error("image download returned {0}")]
    Status(u16),

    #[error(transparent)]
    Image(#[from] ImintError),
}

impl From<reqwest::Error> for AnalysisError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Download(e)
        }
    }
}

/// Classification of one stored image.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub s3_key: String,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
    #[serde(flatten)]
    pub classification: ClassificationReport,
}

pub struct ImageAnalyzer {
    classifier: ImageClassifier,
    client: reqwest::Client,
}

impl ImageAnalyzer {
    pub fn new(
        classifier: ImageClassifier,
        download_timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder().timeout(download_timeout).build()?;
        Ok(Self { classifier, client })
    }

    /// Classify the object stored under `s3_key`. Fails before any network
    /// call when no model is loaded.
    pub async fn analyze(
        &mut self,
        fetcher: &Fetcher,
        s3_key: &str,
    ) -> Result<AnalysisReport, AnalysisError> {
        if !self.classifier.has_model() {
            return Err(AnalysisError::ModelUnavailable(format!(
                "no {} model configured (set IMINT_MODEL_PATH)",
                self.classifier.kind().type_name()
            )));
        }
        let url = fetcher
            .presigned_url(s3_key)
            .ok_or_else(|| AnalysisError::Presign(s3_key.to_string()))?;

        let bytes = download(&self.client, &url).await?;
        let img = decode_image(&bytes)?;
        let classification = self.classifier.classify(&img)?;
        tracing::info!(
            "classified {s3_key}: {} ({:.1}%)",
            classification
                .predictions
                .first()
                .map(|p| p.label.as_str())
                .unwrap_or("-"),
            classification
                .predictions
                .first()
                .map(|p| p.confidence)
                .unwrap_or(0.0)
        );

        Ok(AnalysisReport {
            s3_key: s3_key.to_string(),
            width: img.width(),
            height: img.height(),
            bytes: bytes.len(),
            classification,
        })
    }
}

/// GET `url` and return the body.
pub async fn download(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, AnalysisError> {
    let resp = client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(AnalysisError::Status(status.as_u16()));
    }
    let bytes = resp.bytes().await?;
    tracing::debug!("downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presign::UrlSigner;
    use crate::warehouse::{schema, SqliteWarehouse};
    use imint::ModelKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_download_body_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stage/a.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"pixels".to_vec()))
            .mount(&server)
            .await;

        let body = download(&client(), &format!("{}/stage/a.png", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, b"pixels");

        let missing = download(&client(), &format!("{}/stage/b.png", server.uri())).await;
        assert!(matches!(missing, Err(AnalysisError::Status(404))));
    }

    #[tokio::test]
    async fn test_download_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;
        let r = download(&client(), &format!("{}/slow", server.uri())).await;
        assert!(matches!(r, Err(AnalysisError::Timeout)));
    }

    #[tokio::test]
    async fn test_analyze_without_model() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("wh.db");
        schema::init(&db, true).unwrap();
        let signer = UrlSigner::new("k", "https://imagery.localhost").unwrap();
        let wh = SqliteWarehouse::open(&db, signer, Duration::from_secs(1)).unwrap();
        let fetcher = Fetcher::new(Box::new(wh), Duration::from_secs(60), "@s", 60);

        let classifier = ImageClassifier::new(
            None,
            ModelKind::Torchvision {
                model_name: "resnet50".into(),
            },
        )
        .unwrap();
        let mut analyzer = ImageAnalyzer::new(classifier, Duration::from_secs(1)).unwrap();
        let err = analyzer.analyze(&fetcher, "wv3/0001.tif").await.unwrap_err();
        assert!(matches!(err, AnalysisError::ModelUnavailable(_)));
        assert!(err.to_string().contains("Torchvision"));
    }
}
