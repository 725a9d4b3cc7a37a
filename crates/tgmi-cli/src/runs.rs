pub(crate) async fn run_runs_list(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let runs = tgmi_db::list_pipeline_runs(pool, limit).await?;
    if runs.is_empty() {
        println!("no pipeline runs recorded; run `pipeline run` first");
        return Ok(());
    }

    println!(
        "{:<6} {:<10} {:<20} {:>8}  {:<20} error",
        "id", "status", "started", "records", "failed stage"
    );
    for run in runs {
        let started = run
            .started_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!(
            "{:<6} {:<10} {:<20} {:>8}  {:<20} {}",
            run.id,
            run.status,
            started,
            run.records_processed,
            run.failed_stage.as_deref().unwrap_or("-"),
            run.error_message.as_deref().unwrap_or("")
        );

        for ch in tgmi_db::list_pipeline_run_channels(pool, run.id).await? {
            println!(
                "       {:<24} {:<10} {:>5} records {:>3} media failures {}",
                ch.channel_name,
                ch.status,
                ch.records_processed,
                ch.media_failures,
                ch.error_message.as_deref().unwrap_or("")
            );
        }
    }
    Ok(())
}
