mod pipeline;
mod runs;
mod stages;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "tgmi-cli")]
#[command(about = "Channel ingestion and visual enrichment pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the whole pipeline
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },
    /// Collect recent channel content into the lake
    Collect {
        /// Collect only this channel (must be listed in the channels file)
        #[arg(long)]
        channel: Option<String>,

        /// Override the per-channel message budget
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Load lake artifacts into the warehouse
    Load {
        #[command(subcommand)]
        command: LoadCommands,
    },
    /// Run the detector over every downloaded image and write the detection file
    Detect,
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Inspect recorded pipeline runs
    Runs {
        #[command(subcommand)]
        command: RunsCommands,
    },
}

#[derive(Debug, Subcommand)]
enum PipelineCommands {
    Run {
        /// Use an in-memory warehouse and skip the transform step
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Debug, Subcommand)]
enum LoadCommands {
    /// Load message snapshots (all dates unless --date is given)
    Messages {
        /// Capture date partition, YYYY-MM-DD
        #[arg(long)]
        date: Option<chrono::NaiveDate>,
    },
    /// Load the detection result file
    Detections,
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    Ping,
    Migrate,
}

#[derive(Debug, Subcommand)]
enum RunsCommands {
    List {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("tgmi-cli: no command given; see --help");
        return Ok(());
    };

    let config = tgmi_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match command {
        Commands::Pipeline {
            command: PipelineCommands::Run { dry_run },
        } => pipeline::run_pipeline(&config, dry_run).await,
        Commands::Collect { channel, limit } => {
            stages::run_collect(&config, channel.as_deref(), limit).await
        }
        Commands::Load {
            command: LoadCommands::Messages { date },
        } => {
            let pool = tgmi_db::connect_pool_from_config(&config).await?;
            stages::run_load_messages(&pool, &config, date).await
        }
        Commands::Load {
            command: LoadCommands::Detections,
        } => {
            let pool = tgmi_db::connect_pool_from_config(&config).await?;
            stages::run_load_detections(&pool, &config).await
        }
        Commands::Detect => stages::run_detect(&config).await,
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            let pool = tgmi_db::connect_pool_from_config(&config).await?;
            tgmi_db::ping(&pool).await?;
            println!("database reachable");
            Ok(())
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let pool = tgmi_db::connect_pool_from_config(&config).await?;
            let applied = tgmi_db::run_migrations(&pool).await?;
            println!("migrations applied: {applied}");
            Ok(())
        }
        Commands::Runs {
            command: RunsCommands::List { limit },
        } => {
            let pool = tgmi_db::connect_pool_from_config(&config).await?;
            runs::run_runs_list(&pool, limit).await
        }
    }
}

/// Marks a pipeline run as failed, logging (not propagating) any error while
/// doing so.
async fn fail_run_best_effort(
    pool: &sqlx::PgPool,
    run_id: i64,
    failed_stage: Option<&str>,
    records_processed: i32,
    message: String,
) {
    if let Err(mark_err) =
        tgmi_db::fail_pipeline_run(pool, run_id, failed_stage, records_processed, &message).await
    {
        tracing::error!(
            run_id,
            error = %mark_err,
            "failed to mark pipeline run as failed"
        );
    }
}
