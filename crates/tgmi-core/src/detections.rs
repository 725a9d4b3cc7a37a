use serde::{Deserialize, Serialize};

/// One labelled object reported by the external detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Human-readable class label, e.g. `"person"` or `"bottle"`.
    pub label: String,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
}

impl Detection {
    #[must_use]
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Raw detector output for a single media item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub message_id: i64,
    pub channel_name: String,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// Semantic category assigned to an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageCategory {
    Promotional,
    ProductDisplay,
    Lifestyle,
    Other,
}

impl ImageCategory {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Promotional => "promotional",
            Self::ProductDisplay => "product_display",
            Self::Lifestyle => "lifestyle",
            Self::Other => "other",
        }
    }

    #[must_use]
    pub fn all() -> &'static [ImageCategory] {
        &[
            Self::Promotional,
            Self::ProductDisplay,
            Self::Lifestyle,
            Self::Other,
        ]
    }
}

impl std::fmt::Display for ImageCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ImageCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| format!("unknown image category: {s}"))
    }
}

/// Classifier output for one [`DetectionResult`]; one row of the detections table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedDetection {
    pub message_id: i64,
    pub channel_name: String,
    /// Distinct labels in first-seen order, joined with `", "`.
    pub detected_objects: String,
    /// Highest confidence across the detections; `0.0` when nothing was found.
    pub confidence_score: f64,
    pub image_category: ImageCategory,
}
