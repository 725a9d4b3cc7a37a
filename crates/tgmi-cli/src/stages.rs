//! Handlers that run one pipeline stage on its own.

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use tgmi_collector::{
    discover_snapshots, ChannelRequest, CollectorSettings, HttpMessageSource, RateLimitedCollector,
};
use tgmi_core::{AppConfig, LoadReport};
use tgmi_pipeline::{PgWarehouse, WarehouseLoader};
use tgmi_vision::{detect_and_classify, scan_media, write_detections, HttpDetector, VisualClassifier};

/// Resolves the channels to collect, applying `--channel` and `--limit`.
pub(crate) fn channel_requests(
    config: &AppConfig,
    channel_filter: Option<&str>,
    limit: Option<usize>,
) -> anyhow::Result<Vec<ChannelRequest>> {
    let channels = tgmi_core::load_channels(&config.channels_path)
        .with_context(|| format!("loading {}", config.channels_path.display()))?;

    let selected: Vec<&tgmi_core::ChannelConfig> = match channel_filter {
        Some(name) => vec![channels.find(name).ok_or_else(|| {
            anyhow::anyhow!(
                "channel '{name}' is not listed in {}",
                config.channels_path.display()
            )
        })?],
        None => channels.channels.iter().collect(),
    };

    Ok(selected
        .into_iter()
        .map(|c| ChannelRequest {
            channel: c.identity(),
            max_messages: limit.unwrap_or_else(|| c.message_budget(config.collector_max_messages)),
        })
        .collect())
}

pub(crate) async fn run_collect(
    config: &AppConfig,
    channel_filter: Option<&str>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let requests = channel_requests(config, channel_filter, limit)?;
    let source = HttpMessageSource::from_app_config(config)?;
    let collector = RateLimitedCollector::new(source, CollectorSettings::from_app_config(config));

    let outcomes = collector
        .collect_all(
            &requests,
            config.collector_max_concurrent_channels,
            Utc::now().date_naive(),
        )
        .await;

    let mut failed = 0usize;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(c) => println!(
                "{:<24} ok      {:>5} messages  {:>3} media failures  {}",
                outcome.channel,
                c.snapshot.messages.len(),
                c.media_failures,
                c.snapshot.path.display()
            ),
            Err(e) => {
                failed += 1;
                println!("{:<24} FAILED  {e}", outcome.channel);
            }
        }
    }

    if !outcomes.is_empty() && failed == outcomes.len() {
        anyhow::bail!("all {failed} channels failed collection");
    }
    Ok(())
}

pub(crate) async fn run_load_messages(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    date: Option<NaiveDate>,
) -> anyhow::Result<()> {
    let files = discover_snapshots(&config.snapshots_root(), date).await?;
    if files.is_empty() {
        println!(
            "no snapshots found under {}; run `collect` first",
            config.snapshots_root().display()
        );
        return Ok(());
    }

    let loader = WarehouseLoader::new(PgWarehouse::new(pool.clone()));
    let mut total = LoadReport::default();
    for file in &files {
        let report = loader.load_snapshot_file(file).await?;
        println!(
            "{} {:<24} {report}",
            file.capture_date, file.channel
        );
        total.merge(report);
    }
    println!("messages: {total} across {} snapshots", files.len());
    Ok(())
}

pub(crate) async fn run_detect(config: &AppConfig) -> anyhow::Result<()> {
    let url = config
        .detector_url
        .as_deref()
        .context("TGMI_DETECTOR_URL must be set to run detection")?;
    let detector = HttpDetector::new(url, config.detector_timeout_secs)?;

    let media = scan_media(&config.images_root()).await?;
    let batch = detect_and_classify(&detector, &VisualClassifier::default(), &media).await;
    write_detections(&config.detections_path(), &batch.classified).await?;

    println!(
        "detected {} of {} images ({} failed) -> {}",
        batch.classified.len(),
        media.len(),
        batch.failures,
        config.detections_path().display()
    );
    Ok(())
}

pub(crate) async fn run_load_detections(
    pool: &sqlx::PgPool,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let path = config.detections_path();
    if !path.exists() {
        println!("no detection file at {}; run `detect` first", path.display());
        return Ok(());
    }
    let loader = WarehouseLoader::new(PgWarehouse::new(pool.clone()));
    let report = loader.load_detection_file(&path).await?;
    println!("detections: {report}");
    Ok(())
}
