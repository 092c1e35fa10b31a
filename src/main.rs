use anyhow::Context;
use clap::{Parser, Subcommand};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::prelude::*;
use uptime_indexer::{
    checkpoint::store::CheckpointStore,
    client::{ChainClient, ChainSource},
    config::IndexerConfig,
    extension::pool::DecodePool,
    governance::{refresh_governance, store::GovernanceStore},
    pipeline::{IndexingPipeline, PipelineOutcome},
    slashing::{refresh_slashes, store::SlashStore},
    stats::store::DailyStatsStore,
    store::IndexerStore,
    summary::Summary,
    validator::{store::ValidatorStore, Validator},
};

#[derive(Parser, Debug)]
#[command(name = "uptime-indexer", author, version, about, long_about = Some("Uptime Indexer\n\n\
Index validator block signing and oracle vote extension participation"))]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Max file log level
    #[arg(long, default_value_t = LevelFilter::DEBUG)]
    log_level: LevelFilter,

    /// Max stdout log level
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level_stdout: LevelFilter,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: IndexerCommand,
}

#[derive(Subcommand, Debug)]
enum IndexerCommand {
    /// Index block signatures and oracle votes up to the last complete day
    Blocks,
    /// Record slash events of every roster validator
    Slashes,
    /// Record roster votes on finished governance proposals
    Governance,
    /// Print cumulative per validator totals
    Summary,
    /// Print the stored checkpoint
    Checkpoint,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let config = IndexerConfig::from_path(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        IndexerCommand::Blocks => index_blocks(config).await,
        IndexerCommand::Slashes => index_slashes(config).await,
        IndexerCommand::Governance => index_governance(config).await,
        IndexerCommand::Summary => {
            let store = IndexerStore::new_read_only(&config.database_dir)?;
            let summary = Summary::new(
                store.get_checkpoint()?,
                &store.list_daily_stats()?,
                &store.get_validators()?,
                &store.list_slashes()?,
            )
            .with_governance(&store.list_proposal_votes()?);
            println!("{summary}");
            Ok(())
        }
        IndexerCommand::Checkpoint => {
            let store = IndexerStore::new_read_only(&config.database_dir)?;
            match store.get_checkpoint()? {
                Some(checkpoint) => println!("{}", serde_json::to_string_pretty(&checkpoint)?),
                None => println!("No checkpoint in {}", config.database_dir.display()),
            }
            Ok(())
        }
    }
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let file_layer = match &cli.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let log_file = std::fs::File::create(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(log_file)
                    .with_filter(cli.log_level),
            )
        }
        None => None,
    };

    let stdout_layer = tracing_subscriber::fmt::layer();
    tracing_subscriber::registry()
        .with(stdout_layer.with_filter(cli.log_level_stdout))
        .with(file_layer)
        .init();
    Ok(())
}

async fn index_blocks(config: IndexerConfig) -> anyhow::Result<()> {
    let store = Arc::new(IndexerStore::new(&config.database_dir)?);
    let client = ChainClient::new(config.client_config())?;
    check_api_node(&client).await?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Shutting down after the current batch");
        flag.store(true, Ordering::SeqCst);
    })?;

    let pool = DecodePool::new(config.decode_workers())?;
    info!("Decoding vote extensions with {} workers", pool.workers());

    let mut pipeline =
        IndexingPipeline::new(client, store, pool, shutdown, (&config).into());
    match pipeline.run().await? {
        PipelineOutcome::Completed(summary) => info!(
            "Done: {} heights, {} days flushed, last flushed height {:?}, {} undetermined oracle votes",
            summary.heights_folded,
            summary.days_flushed,
            summary.last_flushed_height,
            summary.undetermined_oracle
        ),
        PipelineOutcome::Interrupted(summary) => info!(
            "Interrupted: {} days flushed, last flushed height {:?}",
            summary.days_flushed, summary.last_flushed_height
        ),
    }
    Ok(())
}

async fn index_slashes(config: IndexerConfig) -> anyhow::Result<()> {
    let store = IndexerStore::new(&config.database_dir)?;
    let client = ChainClient::new(config.client_config())?;
    let validators = load_roster(&config, &client, &store).await?;
    refresh_slashes(&client, &store, &validators).await?;
    Ok(())
}

async fn index_governance(config: IndexerConfig) -> anyhow::Result<()> {
    let store = IndexerStore::new(&config.database_dir)?;
    let client = ChainClient::new(config.client_config())?;
    let validators = load_roster(&config, &client, &store).await?;
    refresh_governance(&client, &store, &validators).await?;
    Ok(())
}

/// The stored roster, fetched and stored first if there is none
async fn load_roster(
    config: &IndexerConfig,
    client: &ChainClient,
    store: &IndexerStore,
) -> anyhow::Result<Vec<Validator>> {
    let mut validators = store.get_validators()?;
    if validators.is_empty() {
        info!("No stored roster, fetching validators");
        for entry in client
            .fetch_validator_roster(config.validators_page_size)
            .await?
        {
            let valoper = entry.valoper.clone();
            match Validator::from_roster_entry(entry, &config.address_prefix) {
                Ok(validator) => validators.push(validator),
                Err(e) => warn!("Skipping roster entry {valoper}: {e}"),
            }
        }
        store.set_validators(&validators)?;
    }
    Ok(validators)
}

async fn check_api_node(client: &ChainClient) -> anyhow::Result<()> {
    let status = client.get_api_status().await?;
    if status.earliest_store_height != 0 {
        warn!(
            "REST API node {} is not an archive node, earliest store height {}",
            client.api_url(),
            status.earliest_store_height
        );
    }
    Ok(())
}
