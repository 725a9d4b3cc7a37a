//! Visual enrichment: detector access, the category classifier, and the
//! detection result file.

pub mod classifier;
pub mod detection_file;
pub mod detector;
pub mod error;
pub mod media;

pub use classifier::{LabelSets, VisualClassifier};
pub use detection_file::{read_detection_records, write_detections, DetectionRecord};
pub use detector::{detect_and_classify, DetectionBatch, Detector, HttpDetector};
pub use error::{ClassifierError, DetectionFileError, DetectorError};
pub use media::{scan_media, MediaItem};
