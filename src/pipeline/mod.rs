//! Batched block range indexing.
//!
//! Heights are fetched a window at a time, decoded on the decode pool and
//! folded strictly in ascending order into the current day. Each finished
//! day is committed together with the checkpoint, so a restart resumes at
//! the first height of the unfinished day.

use crate::{
    block::BlockRecord,
    checkpoint::Checkpoint,
    client::{ChainClientError, ChainSource},
    config::{HeightSetting, IndexerConfig},
    constants::BLOCK_REPORTING_FREQ,
    extension::{
        pool::{DecodePool, PoolError},
        DecodeError, VoteExtensionResult,
    },
    stats::{store::DailyStatsStore, DailyAccumulator, OutOfOrderHeight},
    store::StoreError,
    validator::{store::ValidatorStore, Validator, ValidatorSetSnapshot},
};
use chrono::NaiveDate;
use futures::future::try_join_all;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration does not match the chain: {0}")]
    ConfigMismatch(String),
    #[error("{operation} failed: {source}")]
    Warmup {
        operation: &'static str,
        #[source]
        source: ChainClientError,
    },
    #[error("{operation} failed at height {height}: {source}")]
    Fetch {
        height: u64,
        operation: &'static str,
        #[source]
        source: ChainClientError,
    },
    #[error("vote extension decoding failed at height {height}: {source}")]
    Decode {
        height: u64,
        #[source]
        source: DecodeError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    OutOfOrder(#[from] OutOfOrderHeight),
}

impl PipelineError {
    fn warmup(operation: &'static str) -> impl FnOnce(ChainClientError) -> Self {
        move |source| Self::Warmup { operation, source }
    }

    fn fetch(height: u64, operation: &'static str) -> impl FnOnce(ChainClientError) -> Self {
        move |source| Self::Fetch {
            height,
            operation,
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Warmup,
    BatchFetch,
    Fold,
    DayFlush,
    Done,
    Fatal,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chain_id: String,
    pub address_prefix: String,
    pub start_height: Option<u64>,
    pub end_height: HeightSetting,
    pub blocks_batch_size: u64,
    pub sleep_between_batches: Duration,
    pub validators_page_size: u32,
}

impl From<&IndexerConfig> for PipelineConfig {
    fn from(config: &IndexerConfig) -> Self {
        Self {
            chain_id: config.chain_id.clone(),
            address_prefix: config.address_prefix.clone(),
            start_height: config.start_height,
            end_height: config.end_height,
            blocks_batch_size: config.blocks_batch_size,
            sleep_between_batches: config.sleep_between_batches(),
            validators_page_size: config.validators_page_size,
        }
    }
}

/// Heights resolved at warmup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexingRange {
    pub start_height: u64,
    pub end_height: u64,
    /// Blocks of this date are never folded; the day is still in progress
    pub terminal_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub heights_folded: u64,
    pub days_flushed: u64,
    pub last_flushed_height: Option<u64>,
    /// Active memberships whose oracle vote could not be determined
    pub undetermined_oracle: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The terminal date or end height was reached
    Completed(PipelineSummary),
    /// Stopped on request after a window's fold; the open day was discarded
    Interrupted(PipelineSummary),
}

impl PipelineOutcome {
    pub fn summary(&self) -> &PipelineSummary {
        match self {
            Self::Completed(summary) | Self::Interrupted(summary) => summary,
        }
    }
}

/// Everything fetched for one height
struct FetchedHeight {
    block: BlockRecord,
    valset: ValidatorSetSnapshot,
    raw_extension: String,
}

enum FoldStep {
    Continue,
    ReachedTerminalDate,
}

pub struct IndexingPipeline<C, S> {
    client: C,
    store: Arc<S>,
    pool: DecodePool,
    shutdown: Arc<AtomicBool>,
    config: PipelineConfig,
    state: PipelineState,
    current_day: Option<DailyAccumulator>,
    summary: PipelineSummary,
}

impl<C, S> IndexingPipeline<C, S>
where
    C: ChainSource,
    S: DailyStatsStore + ValidatorStore,
{
    pub fn new(
        client: C,
        store: Arc<S>,
        pool: DecodePool,
        shutdown: Arc<AtomicBool>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            client,
            store,
            pool,
            shutdown,
            config,
            state: PipelineState::Init,
            current_day: None,
            summary: PipelineSummary::default(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    #[instrument(skip_all)]
    pub async fn run(&mut self) -> Result<PipelineOutcome, PipelineError> {
        match self.run_inner().await {
            Ok(outcome) => {
                self.state = PipelineState::Done;
                Ok(outcome)
            }
            Err(e) => {
                self.state = PipelineState::Fatal;
                error!("Indexing stopped: {e}");
                Err(e)
            }
        }
    }

    async fn run_inner(&mut self) -> Result<PipelineOutcome, PipelineError> {
        self.state = PipelineState::Warmup;
        let range = self.warmup().await?;
        info!(
            "Indexing heights {}..={} until {}",
            range.start_height, range.end_height, range.terminal_date
        );

        let started = Instant::now();
        let batch_size = self.config.blocks_batch_size.max(1);
        let mut next_height = range.start_height;
        while next_height <= range.end_height {
            let window_end = (next_height + batch_size - 1).min(range.end_height);

            self.state = PipelineState::BatchFetch;
            let window = self.fetch_window(next_height, window_end).await?;

            self.state = PipelineState::Fold;
            for (fetched, extension) in window {
                if let FoldStep::ReachedTerminalDate =
                    self.fold_height(fetched, &extension, range.terminal_date)?
                {
                    info!(
                        "Reached {} in {:?}, {} days flushed",
                        range.terminal_date,
                        started.elapsed(),
                        self.summary.days_flushed
                    );
                    return Ok(PipelineOutcome::Completed(self.summary));
                }
            }
            next_height = window_end + 1;

            if let Some(outcome) = self.check_interrupted() {
                return Ok(outcome);
            }
            if next_height <= range.end_height && !self.config.sleep_between_batches.is_zero() {
                tokio::time::sleep(self.config.sleep_between_batches).await;
                // the request may have arrived while sleeping
                if let Some(outcome) = self.check_interrupted() {
                    return Ok(outcome);
                }
            }
        }

        // only reachable when the start is already past the end
        Ok(PipelineOutcome::Completed(self.summary))
    }

    /// Discard the open day if a shutdown was requested
    fn check_interrupted(&mut self) -> Option<PipelineOutcome> {
        if !self.shutdown.load(Ordering::SeqCst) {
            return None;
        }
        if let Some(day) = self.current_day.take() {
            info!(
                "Interrupted, discarding {} heights of {}",
                day.heights(),
                day.date()
            );
        }
        Some(PipelineOutcome::Interrupted(self.summary))
    }

    /// Check the nodes, resolve the height range and persist the roster
    async fn warmup(&mut self) -> Result<IndexingRange, PipelineError> {
        let status = self
            .client
            .get_status()
            .await
            .map_err(PipelineError::warmup("status"))?;
        if status.chain_id != self.config.chain_id {
            return Err(PipelineError::ConfigMismatch(format!(
                "node serves chain {}, configured {}",
                status.chain_id, self.config.chain_id
            )));
        }
        if status.catching_up {
            warn!("RPC node is catching up, the chain head may lag");
        }
        if status.tx_index != "on" {
            warn!("RPC node tx_index is {:?}, slash searches need it on", status.tx_index);
        }

        let lowest_height = self
            .client
            .get_lowest_height()
            .await
            .map_err(PipelineError::warmup("lowest height"))?;
        if lowest_height != 1 {
            warn!("RPC node is pruned, lowest available height is {lowest_height}");
        }

        let end_height = match self.config.end_height {
            HeightSetting::Auto => status.latest_height,
            HeightSetting::Height(height) if height > status.latest_height => {
                warn!(
                    "end_height {height} is past the chain head, using {}",
                    status.latest_height
                );
                status.latest_height
            }
            HeightSetting::Height(height) => height,
        };
        let terminal_date = self
            .client
            .get_block_commit(end_height)
            .await
            .map_err(PipelineError::fetch(end_height, "commit"))?
            .date();

        let start_height = self.resolve_start_height(lowest_height)?;
        self.refresh_roster().await?;

        Ok(IndexingRange {
            start_height,
            end_height,
            terminal_date,
        })
    }

    fn resolve_start_height(&self, lowest_height: u64) -> Result<u64, PipelineError> {
        if let Some(checkpoint) = self.store.get_checkpoint()? {
            if checkpoint.chain_id != self.config.chain_id {
                return Err(PipelineError::ConfigMismatch(format!(
                    "database was indexed for chain {}, configured {}",
                    checkpoint.chain_id, self.config.chain_id
                )));
            }
            if let Some(start) = self.config.start_height {
                warn!(
                    "Ignoring start_height {start}, resuming after checkpoint {}",
                    checkpoint.latest_processed_height
                );
            }
            return Ok(checkpoint.next_height());
        }

        Ok(match self.config.start_height {
            Some(start) if start < lowest_height => {
                warn!("start_height {start} is pruned, starting at {lowest_height}");
                lowest_height
            }
            Some(start) => start,
            None => lowest_height,
        })
    }

    async fn refresh_roster(&self) -> Result<(), PipelineError> {
        let entries = self
            .client
            .fetch_validator_roster(self.config.validators_page_size)
            .await
            .map_err(PipelineError::warmup("validator roster"))?;

        let mut validators = Vec::with_capacity(entries.len());
        for entry in entries {
            let valoper = entry.valoper.clone();
            match Validator::from_roster_entry(entry, &self.config.address_prefix) {
                Ok(validator) => validators.push(validator),
                Err(e) => warn!("Skipping roster entry {valoper}: {e}"),
            }
        }
        info!("Fetched {} validators", validators.len());
        self.store.set_validators(&validators)?;
        Ok(())
    }

    /// Fetch and decode every height of the window. Any failure is fatal.
    async fn fetch_window(
        &self,
        first: u64,
        last: u64,
    ) -> Result<Vec<(FetchedHeight, VoteExtensionResult)>, PipelineError> {
        debug!("Fetching heights {first}..={last}");
        let mut fetched = try_join_all((first..=last).map(|height| self.fetch_height(height))).await?;

        let txs = fetched
            .iter_mut()
            .map(|f| (f.block.height, std::mem::take(&mut f.raw_extension)))
            .collect();
        let decoded = self.pool.decode_window(txs).await?;

        fetched
            .into_iter()
            .zip(decoded)
            .map(|(f, (height, result))| {
                result
                    .map(|extension| (f, extension))
                    .map_err(|source| PipelineError::Decode { height, source })
            })
            .collect()
    }

    async fn fetch_height(&self, height: u64) -> Result<FetchedHeight, PipelineError> {
        let (block, valset, raw_extension) = tokio::try_join!(
            async {
                self.client
                    .get_block_commit(height)
                    .await
                    .map_err(PipelineError::fetch(height, "commit"))
            },
            async {
                self.client
                    .get_validator_set(height)
                    .await
                    .map_err(PipelineError::fetch(height, "validator set"))
            },
            async {
                self.client
                    .get_raw_extension_tx(height)
                    .await
                    .map_err(PipelineError::fetch(height, "vote extension"))
            },
        )?;
        Ok(FetchedHeight {
            block,
            valset,
            raw_extension,
        })
    }

    fn fold_height(
        &mut self,
        fetched: FetchedHeight,
        extension: &VoteExtensionResult,
        terminal_date: NaiveDate,
    ) -> Result<FoldStep, PipelineError> {
        let FetchedHeight { block, valset, .. } = fetched;
        let date = block.date();

        if date == terminal_date {
            if let Some(day) = self.current_day.take() {
                self.flush_day(day)?;
            }
            return Ok(FoldStep::ReachedTerminalDate);
        }

        let day = match self.current_day.take() {
            Some(day) if day.date() == date => day,
            previous => {
                if let Some(day) = previous {
                    self.flush_day(day)?;
                }
                debug!("Starting {date} at height {}", block.height);
                DailyAccumulator::new(date, block.height)
            }
        };
        let day = self.current_day.insert(day);
        let report = day.fold(&block, &valset, extension)?;
        if !report.undetermined_oracle.is_empty() {
            debug!(
                "No oracle determination at height {} for {} of {} members",
                block.height,
                report.undetermined_oracle.len(),
                report.members
            );
        }

        self.summary.heights_folded += 1;
        self.summary.undetermined_oracle += report.undetermined_oracle.len() as u64;
        if block.height % BLOCK_REPORTING_FREQ == 0 {
            info!(
                "Folded height {} ({date}, {} validators)",
                block.height,
                valset.len()
            );
        }
        Ok(FoldStep::Continue)
    }

    fn flush_day(&mut self, day: DailyAccumulator) -> Result<(), PipelineError> {
        self.state = PipelineState::DayFlush;
        let end_time = day.end_time();
        let Some((document, end_time)) = day.into_document().zip(end_time) else {
            return Ok(());
        };

        let checkpoint = Checkpoint::new(
            document.date_end_height,
            end_time,
            self.config.chain_id.clone(),
        );
        self.store.commit_day(&document, &checkpoint)?;
        info!(
            "Flushed {} (heights {}..={}, {} validators)",
            document.date,
            document.date_start_height,
            document.date_end_height,
            document.validators.len()
        );

        self.summary.days_flushed += 1;
        self.summary.last_flushed_height = Some(document.date_end_height);
        self.state = PipelineState::Fold;
        Ok(())
    }
}
