//! The external object detector and the detection stage built on it.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tgmi_core::{ClassifiedDetection, Detection, DetectionResult};

use crate::classifier::VisualClassifier;
use crate::error::DetectorError;
use crate::media::MediaItem;

/// A black-box detector: given an image, returns labelled objects.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, image: &Path) -> Result<Vec<Detection>, DetectorError>;
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<Detection>,
}

/// Detector served over HTTP.
///
/// `POST {url}` with the raw image bytes; the response body is
/// `{"detections": [{"label": "...", "confidence": 0.0}]}`.
pub struct HttpDetector {
    client: Client,
    url: String,
}

impl HttpDetector {
    /// # Errors
    ///
    /// Returns [`DetectorError::InvalidUrl`] for an unparseable URL, or
    /// [`DetectorError::Http`] if the client cannot be built.
    pub fn new(url: &str, timeout_secs: u64) -> Result<Self, DetectorError> {
        reqwest::Url::parse(url).map_err(|e| DetectorError::InvalidUrl {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: url.to_owned(),
        })
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, image: &Path) -> Result<Vec<Detection>, DetectorError> {
        let bytes = tokio::fs::read(image)
            .await
            .map_err(|source| DetectorError::Io {
                path: image.to_path_buf(),
                source,
            })?;

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DetectorError::UnexpectedStatus {
                status: status.as_u16(),
                path: image.to_path_buf(),
            });
        }

        let body = response.text().await?;
        let parsed = serde_json::from_str::<DetectResponse>(&body).map_err(|source| {
            DetectorError::Deserialize {
                path: image.to_path_buf(),
                source,
            }
        })?;

        Ok(parsed
            .detections
            .into_iter()
            .map(|d| Detection::new(d.label, d.confidence.clamp(0.0, 1.0)))
            .collect())
    }
}

/// Output of running the detector over a batch of media.
#[derive(Debug, Clone, Default)]
pub struct DetectionBatch {
    pub classified: Vec<ClassifiedDetection>,
    /// Media items the detector could not process.
    pub failures: usize,
}

/// Runs `detector` over each item in turn and classifies the result.
///
/// A failure on one image is logged and counted; the rest of the batch
/// continues.
pub async fn detect_and_classify(
    detector: &dyn Detector,
    classifier: &VisualClassifier,
    media: &[MediaItem],
) -> DetectionBatch {
    let mut batch = DetectionBatch::default();

    for item in media {
        match detector.detect(&item.path).await {
            Ok(detections) => {
                let result = DetectionResult {
                    message_id: item.message_id,
                    channel_name: item.channel_name.clone(),
                    detections,
                };
                batch.classified.push(classifier.classify(&result));
            }
            Err(e) => {
                batch.failures += 1;
                tracing::warn!(
                    channel = %item.channel_name,
                    message_id = item.message_id,
                    error = %e,
                    "detector failed for image"
                );
            }
        }
    }

    tracing::info!(
        images = media.len(),
        classified = batch.classified.len(),
        failures = batch.failures,
        "detection batch complete"
    );
    batch
}
