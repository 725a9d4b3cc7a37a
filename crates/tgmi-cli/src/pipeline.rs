//! `pipeline run`: the full orchestrated run, recorded in `pipeline_runs`.

use std::sync::Arc;

use tgmi_collector::{CollectorSettings, HttpMessageSource, RateLimitedCollector};
use tgmi_core::AppConfig;
use tgmi_pipeline::{
    CommandTransform, MemoryWarehouse, PgWarehouse, PipelineOrchestrator, PipelineReport,
    PipelineSettings, Warehouse, WarehouseLoader,
};
use tgmi_vision::{HttpDetector, VisualClassifier};

use crate::fail_run_best_effort;

fn build_orchestrator<W: Warehouse>(
    config: &AppConfig,
    warehouse: W,
    with_transform: bool,
) -> anyhow::Result<PipelineOrchestrator<HttpMessageSource, W>> {
    let channels = tgmi_core::load_channels(&config.channels_path)?;
    let settings = PipelineSettings::from_app_config(config, &channels);

    let source = HttpMessageSource::from_app_config(config)?;
    let collector = RateLimitedCollector::new(source, CollectorSettings::from_app_config(config));

    let mut orchestrator = PipelineOrchestrator::new(
        collector,
        WarehouseLoader::new(warehouse),
        VisualClassifier::default(),
        settings,
    );

    match config.detector_url.as_deref() {
        Some(url) => {
            let detector = HttpDetector::new(url, config.detector_timeout_secs)?;
            orchestrator = orchestrator.with_detector(Box::new(detector));
        }
        None => tracing::warn!("TGMI_DETECTOR_URL not set; runs that collect media will fail detection"),
    }

    if with_transform {
        orchestrator = orchestrator.with_transform(Box::new(CommandTransform::new(
            config.transform_command.clone(),
            config.transform_dir.clone(),
        )));
    }

    Ok(orchestrator)
}

pub(crate) async fn run_pipeline(config: &AppConfig, dry_run: bool) -> anyhow::Result<()> {
    if dry_run {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let orchestrator = build_orchestrator(config, Arc::clone(&warehouse), false)?;
        let report = orchestrator.run().await;
        print_report(&report);
        println!(
            "dry-run: {} messages and {} detections held in memory",
            warehouse.messages().len(),
            warehouse.detections().len()
        );
        return finish(&report);
    }

    let pool = tgmi_db::connect_pool_from_config(config).await?;
    let orchestrator = build_orchestrator(config, PgWarehouse::new(pool.clone()), true)?;

    let run = tgmi_db::create_pipeline_run(&pool, "cli").await?;
    if let Err(e) = tgmi_db::start_pipeline_run(&pool, run.id).await {
        fail_run_best_effort(&pool, run.id, None, 0, format!("{e:#}")).await;
        return Err(e.into());
    }

    let report = orchestrator.run().await;
    print_report(&report);
    record_report(&pool, run.id, &report).await;
    finish(&report)
}

/// Writes the outcome into the audit tables. Audit failures are logged only.
async fn record_report(pool: &sqlx::PgPool, run_id: i64, report: &PipelineReport) {
    for ch in &report.channels {
        let status = if ch.succeeded { "succeeded" } else { "failed" };
        if let Err(e) = tgmi_db::upsert_pipeline_run_channel(
            pool,
            run_id,
            &ch.channel,
            status,
            saturating_i32(ch.messages),
            saturating_i32(ch.media_failures),
            ch.error.as_deref(),
        )
        .await
        {
            tracing::error!(run_id, channel = %ch.channel, error = %e, "failed to record channel outcome");
        }
    }

    let records = saturating_i32(report.records_processed());
    if report.succeeded() {
        if let Err(e) = tgmi_db::complete_pipeline_run(pool, run_id, records).await {
            tracing::error!(run_id, error = %e, "failed to mark pipeline run as succeeded");
        }
    } else {
        fail_run_best_effort(
            pool,
            run_id,
            report.failed_stage.map(|s| s.as_str()),
            records,
            report.error.clone().unwrap_or_default(),
        )
        .await;
    }
}

fn saturating_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn finish(report: &PipelineReport) -> anyhow::Result<()> {
    if report.succeeded() {
        return Ok(());
    }
    let stage = report
        .failed_stage
        .map_or("unknown", |s| s.as_str());
    anyhow::bail!(
        "pipeline failed during {stage}: {}",
        report.error.as_deref().unwrap_or("no error recorded")
    )
}

fn print_report(report: &PipelineReport) {
    println!("pipeline: {}", report.state);
    for ch in &report.channels {
        match &ch.error {
            None => println!(
                "  collect  {:<24} {:>5} messages  {:>3} media failures",
                ch.channel, ch.messages, ch.media_failures
            ),
            Some(e) => println!("  collect  {:<24} FAILED  {e}", ch.channel),
        }
    }
    if let Some(r) = report.messages {
        println!("  messages    {r}");
    }
    if let Some(d) = report.detection {
        println!(
            "  detection   {} images, {} classified, {} failed",
            d.images, d.classified, d.failures
        );
    }
    if let Some(r) = report.detections {
        println!("  detections  {r}");
    }
    if let Some(t) = report.transform {
        println!("  transform   {t:?}");
    }
    if let (Some(stage), Some(err)) = (report.failed_stage, report.error.as_deref()) {
        println!("  failed at {stage}: {err}");
    }
}
