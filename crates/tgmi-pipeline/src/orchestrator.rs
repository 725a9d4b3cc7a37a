//! Sequential stage machine over collection, loading, detection, and
//! transform.
//!
//! ```text
//! Idle -> CollectingLake -> LoadingMessages -> AwaitingDetection
//!      -> LoadingDetections -> Transforming -> Succeeded
//!                   (any stage) -> Failed
//! ```
//!
//! Each run starts from `Idle` and carries nothing over from earlier runs.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use tgmi_collector::{ChannelRequest, LakeSnapshot, MessageSource, RateLimitedCollector};
use tgmi_core::{AppConfig, ChannelsFile, LoadReport};
use tgmi_vision::{detect_and_classify, write_detections, Detector, MediaItem, VisualClassifier};

use crate::loader::WarehouseLoader;
use crate::transform::Transform;
use crate::warehouse::Warehouse;

/// Position of a run in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    CollectingLake,
    LoadingMessages,
    AwaitingDetection,
    LoadingDetections,
    Transforming,
    Succeeded,
    Failed,
}

impl PipelineState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CollectingLake => "collecting_lake",
            Self::LoadingMessages => "loading_messages",
            Self::AwaitingDetection => "awaiting_detection",
            Self::LoadingDetections => "loading_detections",
            Self::Transforming => "transforming",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Successor on the success path.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::CollectingLake),
            Self::CollectingLake => Some(Self::LoadingMessages),
            Self::LoadingMessages => Some(Self::AwaitingDetection),
            Self::AwaitingDetection => Some(Self::LoadingDetections),
            Self::LoadingDetections => Some(Self::Transforming),
            Self::Transforming => Some(Self::Succeeded),
            Self::Succeeded | Self::Failed => None,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collection result for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReport {
    pub channel: String,
    pub succeeded: bool,
    pub messages: usize,
    pub media_failures: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionStageReport {
    pub images: usize,
    pub classified: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOutcome {
    Completed,
    /// No transform configured (dry runs).
    Skipped,
}

/// Everything a run observed, up to and including the stage that ended it.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub state: PipelineState,
    pub failed_stage: Option<PipelineState>,
    pub error: Option<String>,
    /// Every state entered, in order, starting with `Idle`.
    pub transitions: Vec<PipelineState>,
    pub channels: Vec<ChannelReport>,
    pub messages: Option<LoadReport>,
    pub detection: Option<DetectionStageReport>,
    pub detections: Option<LoadReport>,
    pub transform: Option<TransformOutcome>,
}

impl PipelineReport {
    fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            failed_stage: None,
            error: None,
            transitions: vec![PipelineState::Idle],
            channels: Vec::new(),
            messages: None,
            detection: None,
            detections: None,
            transform: None,
        }
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Succeeded
    }

    /// Warehouse rows written across both load stages.
    #[must_use]
    pub fn records_processed(&self) -> usize {
        self.messages.map_or(0, |r| r.inserted_or_updated)
            + self.detections.map_or(0, |r| r.inserted_or_updated)
    }

    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            tracing::info!(from = %self.state, to = %next, "pipeline transition");
            self.state = next;
            self.transitions.push(next);
        }
    }

    fn fail(&mut self, error: String) {
        tracing::error!(stage = %self.state, error = %error, "pipeline stage failed");
        self.failed_stage = Some(self.state);
        self.error = Some(error);
        self.state = PipelineState::Failed;
        self.transitions.push(PipelineState::Failed);
    }
}

/// Static inputs for every run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub channels: Vec<ChannelRequest>,
    pub max_concurrent_channels: usize,
    /// Where the detection stage writes its result file.
    pub detections_path: PathBuf,
}

impl PipelineSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig, channels: &ChannelsFile) -> Self {
        Self {
            channels: channels
                .channels
                .iter()
                .map(|c| ChannelRequest {
                    channel: c.identity(),
                    max_messages: c.message_budget(config.collector_max_messages),
                })
                .collect(),
            max_concurrent_channels: config.collector_max_concurrent_channels,
            detections_path: config.detections_path(),
        }
    }
}

type StageResult<T> = Result<T, String>;

/// Runs the full pipeline, one stage at a time.
pub struct PipelineOrchestrator<S, W> {
    collector: RateLimitedCollector<S>,
    loader: WarehouseLoader<W>,
    classifier: VisualClassifier,
    detector: Option<Box<dyn Detector>>,
    transform: Option<Box<dyn Transform>>,
    settings: PipelineSettings,
}

impl<S: MessageSource, W: Warehouse> PipelineOrchestrator<S, W> {
    pub fn new(
        collector: RateLimitedCollector<S>,
        loader: WarehouseLoader<W>,
        classifier: VisualClassifier,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            collector,
            loader,
            classifier,
            detector: None,
            transform: None,
            settings,
        }
    }

    #[must_use]
    pub fn with_detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.detector = Some(detector);
        self
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Box<dyn Transform>) -> Self {
        self.transform = Some(transform);
        self
    }

    #[must_use]
    pub fn loader(&self) -> &WarehouseLoader<W> {
        &self.loader
    }

    /// Runs every stage into today's lake partition.
    pub async fn run(&self) -> PipelineReport {
        self.run_on(Utc::now().date_naive()).await
    }

    /// Runs every stage into the given lake partition. Never panics on stage
    /// failure; the report carries the outcome.
    pub async fn run_on(&self, capture_date: NaiveDate) -> PipelineReport {
        let mut report = PipelineReport::new();
        match self.drive(&mut report, capture_date).await {
            Ok(()) => {
                report.advance();
                tracing::info!(
                    records = report.records_processed(),
                    "pipeline run succeeded"
                );
            }
            Err(error) => report.fail(error),
        }
        report
    }

    async fn drive(&self, report: &mut PipelineReport, capture_date: NaiveDate) -> StageResult<()> {
        report.advance();
        let snapshots = self.collect(report, capture_date).await?;

        report.advance();
        let mut messages = LoadReport::default();
        for snapshot in &snapshots {
            let loaded = self
                .loader
                .load_messages(snapshot)
                .await
                .map_err(|e| format!("loading {}: {e}", snapshot.path.display()))?;
            messages.merge(loaded);
        }
        report.messages = Some(messages);

        report.advance();
        self.detect(report, &snapshots).await?;

        report.advance();
        let loaded = self
            .loader
            .load_detection_file(&self.settings.detections_path)
            .await
            .map_err(|e| e.to_string())?;
        report.detections = Some(loaded);

        report.advance();
        match &self.transform {
            Some(transform) => {
                transform.run().await.map_err(|e| e.to_string())?;
                report.transform = Some(TransformOutcome::Completed);
            }
            None => {
                tracing::info!("no transform configured; skipping");
                report.transform = Some(TransformOutcome::Skipped);
            }
        }

        Ok(())
    }

    async fn collect(
        &self,
        report: &mut PipelineReport,
        capture_date: NaiveDate,
    ) -> StageResult<Vec<LakeSnapshot>> {
        let outcomes = self
            .collector
            .collect_all(
                &self.settings.channels,
                self.settings.max_concurrent_channels,
                capture_date,
            )
            .await;

        let mut snapshots = Vec::new();
        for outcome in outcomes {
            let channel = outcome.channel.to_string();
            match outcome.result {
                Ok(collection) => {
                    report.channels.push(ChannelReport {
                        channel,
                        succeeded: true,
                        messages: collection.snapshot.messages.len(),
                        media_failures: collection.media_failures,
                        error: None,
                    });
                    snapshots.push(collection.snapshot);
                }
                Err(e) => report.channels.push(ChannelReport {
                    channel,
                    succeeded: false,
                    messages: 0,
                    media_failures: 0,
                    error: Some(e.to_string()),
                }),
            }
        }

        if snapshots.is_empty() {
            return Err(format!(
                "no channel produced a snapshot ({} attempted)",
                report.channels.len()
            ));
        }
        Ok(snapshots)
    }

    async fn detect(
        &self,
        report: &mut PipelineReport,
        snapshots: &[LakeSnapshot],
    ) -> StageResult<()> {
        let media = media_in(snapshots);

        let batch = if media.is_empty() {
            tgmi_vision::DetectionBatch::default()
        } else {
            let Some(detector) = &self.detector else {
                return Err(format!(
                    "{} images collected but no detector is configured",
                    media.len()
                ));
            };
            detect_and_classify(detector.as_ref(), &self.classifier, &media).await
        };

        report.detection = Some(DetectionStageReport {
            images: media.len(),
            classified: batch.classified.len(),
            failures: batch.failures,
        });

        if !media.is_empty() && batch.classified.is_empty() {
            return Err(format!("detector failed on all {} images", media.len()));
        }

        write_detections(&self.settings.detections_path, &batch.classified)
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Media downloaded by this run, in snapshot order.
fn media_in(snapshots: &[LakeSnapshot]) -> Vec<MediaItem> {
    snapshots
        .iter()
        .flat_map(|s| s.messages.iter())
        .filter_map(|m| {
            m.media_path.as_ref().map(|p| MediaItem {
                channel_name: m.channel_name.clone(),
                message_id: m.message_id,
                path: Path::new(p).to_path_buf(),
            })
        })
        .collect()
}
