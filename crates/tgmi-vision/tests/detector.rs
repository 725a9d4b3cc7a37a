//! `HttpDetector` and the detection stage against a local `wiremock` server.

use serde_json::json;
use tgmi_core::ImageCategory;
use tgmi_vision::{detect_and_classify, Detector, DetectorError, HttpDetector, MediaItem, VisualClassifier};
use wiremock::matchers::{body_bytes, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn image(dir: &tempfile::TempDir, channel: &str, id: i64, bytes: &[u8]) -> MediaItem {
    let channel_dir = dir.path().join(channel);
    std::fs::create_dir_all(&channel_dir).unwrap();
    let path = channel_dir.join(format!("{id}.jpg"));
    std::fs::write(&path, bytes).unwrap();
    MediaItem {
        channel_name: channel.to_string(),
        message_id: id,
        path,
    }
}

#[tokio::test]
async fn detect_posts_image_bytes_and_parses_labels() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/detect"))
        .and(body_bytes(b"jpeg-1".to_vec()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "detections": [
                {"label": "person", "confidence": 0.88},
                {"label": "bottle", "confidence": 1.2}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let item = image(&dir, "EAHPA", 1, b"jpeg-1");
    let detector = HttpDetector::new(&format!("{}/detect", server.uri()), 5).unwrap();

    let detections = detector.detect(&item.path).await.expect("detect");
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].label, "person");
    assert!((detections[1].confidence - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn detector_error_status_is_typed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let item = image(&dir, "EAHPA", 2, b"x");
    let detector = HttpDetector::new(&server.uri(), 5).unwrap();
    let err = detector.detect(&item.path).await.unwrap_err();
    assert!(matches!(err, DetectorError::UnexpectedStatus { status: 500, .. }));
}

#[tokio::test]
async fn missing_image_is_an_io_error() {
    let detector = HttpDetector::new("http://127.0.0.1:9/detect", 1).unwrap();
    let err = detector
        .detect(std::path::Path::new("/nonexistent/1.jpg"))
        .await
        .unwrap_err();
    assert!(matches!(err, DetectorError::Io { .. }));
}

#[tokio::test]
async fn batch_classifies_successes_and_counts_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_bytes(b"good".to_vec()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "detections": [{"label": "cup", "confidence": 0.6}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_bytes(b"empty".to_vec()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"detections": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_bytes(b"broken".to_vec()))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let media = vec![
        image(&dir, "CheMed123", 10, b"good"),
        image(&dir, "CheMed123", 11, b"broken"),
        image(&dir, "CheMed123", 12, b"empty"),
    ];
    let detector = HttpDetector::new(&server.uri(), 5).unwrap();

    let batch = detect_and_classify(&detector, &VisualClassifier::default(), &media).await;

    assert_eq!(batch.failures, 1);
    assert_eq!(batch.classified.len(), 2);
    assert_eq!(batch.classified[0].message_id, 10);
    assert_eq!(batch.classified[0].image_category, ImageCategory::ProductDisplay);
    assert_eq!(batch.classified[1].message_id, 12);
    assert_eq!(batch.classified[1].image_category, ImageCategory::Other);
    assert!(batch.classified[1].confidence_score.abs() < f64::EPSILON);
}

#[test]
fn invalid_detector_url_is_rejected() {
    assert!(matches!(
        HttpDetector::new("::nope::", 5),
        Err(DetectorError::InvalidUrl { .. })
    ));
}
