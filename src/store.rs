use crate::{
    checkpoint::{store::CheckpointStore, Checkpoint},
    constants::*,
    governance::{store::GovernanceStore, ProposalVotes},
    slashing::{store::SlashStore, SlashRecord},
    stats::{store::DailyStatsStore, DailyStatDocument},
    validator::{store::ValidatorStore, Validator},
};
use chrono::NaiveDate;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, WriteBatch, DB};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    sync::Mutex,
};
use thiserror::Error;
use tracing::trace;

const CHECKPOINT_KEY: &[u8] = b"checkpoint";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("checkpoint may only advance: attempted {attempted}, stored {current}")]
    CheckpointRegression { attempted: u64, current: u64 },
    #[error("stored chain id {stored} does not match {attempted}")]
    ChainIdMismatch { stored: String, attempted: String },
    #[error("daily stats for {0} were already written")]
    DuplicateDay(NaiveDate),
    #[error("missing column family {0}")]
    MissingColumnFamily(&'static str),
    #[error("database error: {0}")]
    Db(#[from] rocksdb::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// RocksDB backed store of the checkpoint, daily stats, roster, slashes and governance votes
#[derive(Debug)]
pub struct IndexerStore {
    pub db_path: PathBuf,
    pub database: DB,
    /// Serializes check-then-write sequences
    write_lock: Mutex<()>,
}

impl IndexerStore {
    /// Open for reporting while an indexer may hold the primary
    pub fn new_read_only(path: &Path) -> Result<Self, StoreError> {
        let database_opts = rocksdb::Options::default();
        let database =
            DB::open_cf_for_read_only(&database_opts, path, COLUMN_FAMILIES, false)?;
        Ok(Self {
            db_path: PathBuf::from(path),
            database,
            write_lock: Mutex::new(()),
        })
    }

    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let mut cf_opts = rocksdb::Options::default();
        cf_opts.set_max_write_buffer_number(16);
        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, cf_opts.clone()));

        let mut database_opts = rocksdb::Options::default();
        database_opts.create_missing_column_families(true);
        database_opts.create_if_missing(true);
        let database = DB::open_cf_descriptors(&database_opts, path, descriptors)?;
        Ok(Self {
            db_path: PathBuf::from(path),
            database,
            write_lock: Mutex::new(()),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn cf(&self, name: &'static str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.database
            .cf_handle(name)
            .ok_or(StoreError::MissingColumnFamily(name))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        if let Some(current) = self.get_checkpoint()? {
            if current.chain_id != checkpoint.chain_id {
                return Err(StoreError::ChainIdMismatch {
                    stored: current.chain_id,
                    attempted: checkpoint.chain_id.clone(),
                });
            }
            if checkpoint.latest_processed_height <= current.latest_processed_height {
                return Err(StoreError::CheckpointRegression {
                    attempted: checkpoint.latest_processed_height,
                    current: current.latest_processed_height,
                });
            }
        }
        Ok(())
    }

    fn check_new_day(&self, date: NaiveDate) -> Result<(), StoreError> {
        if self.get_daily_stats(date)?.is_some() {
            return Err(StoreError::DuplicateDay(date));
        }
        Ok(())
    }
}

fn day_key(date: NaiveDate) -> Vec<u8> {
    date.format("%Y-%m-%d").to_string().into_bytes()
}

/// `{valoper}:{height}` with zero padded height so keys sort by height
fn slash_key(valoper: &str, height: u64) -> Vec<u8> {
    format!("{valoper}:{height:020}").into_bytes()
}

fn slash_prefix(valoper: &str) -> Vec<u8> {
    format!("{valoper}:").into_bytes()
}

/// Zero padded so keys sort by proposal id
fn proposal_key(proposal_id: u64) -> Vec<u8> {
    format!("{proposal_id:020}").into_bytes()
}

impl CheckpointStore for IndexerStore {
    fn get_checkpoint(&self) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self
            .database
            .get_pinned_cf(self.cf(CHECKPOINT_CF)?, CHECKPOINT_KEY)?
            .map(|bytes| serde_json::from_slice(&bytes))
            .transpose()?)
    }

    fn set_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        trace!(
            "Setting checkpoint to height {}",
            checkpoint.latest_processed_height
        );
        let _guard = self.lock();
        self.check_checkpoint(checkpoint)?;
        self.database.put_cf(
            self.cf(CHECKPOINT_CF)?,
            CHECKPOINT_KEY,
            serde_json::to_vec(checkpoint)?,
        )?;
        Ok(())
    }
}

impl DailyStatsStore for IndexerStore {
    fn append_daily_stats(&self, document: &DailyStatDocument) -> Result<(), StoreError> {
        trace!("Adding daily stats for {}", document.date);
        let _guard = self.lock();
        self.check_new_day(document.date)?;
        self.database.put_cf(
            self.cf(DAILY_STATS_CF)?,
            day_key(document.date),
            serde_json::to_vec(document)?,
        )?;
        Ok(())
    }

    fn get_daily_stats(&self, date: NaiveDate) -> Result<Option<DailyStatDocument>, StoreError> {
        Ok(self
            .database
            .get_pinned_cf(self.cf(DAILY_STATS_CF)?, day_key(date))?
            .map(|bytes| serde_json::from_slice(&bytes))
            .transpose()?)
    }

    fn list_daily_stats(&self) -> Result<Vec<DailyStatDocument>, StoreError> {
        let mut documents = vec![];
        for entry in self
            .database
            .iterator_cf(self.cf(DAILY_STATS_CF)?, IteratorMode::Start)
        {
            let (_, value) = entry?;
            documents.push(serde_json::from_slice(&value)?);
        }
        Ok(documents)
    }

    fn commit_day(
        &self,
        document: &DailyStatDocument,
        checkpoint: &Checkpoint,
    ) -> Result<(), StoreError> {
        trace!(
            "Committing {} ({}..={}) with checkpoint {}",
            document.date,
            document.date_start_height,
            document.date_end_height,
            checkpoint.latest_processed_height
        );
        let _guard = self.lock();
        self.check_new_day(document.date)?;
        self.check_checkpoint(checkpoint)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(DAILY_STATS_CF)?,
            day_key(document.date),
            serde_json::to_vec(document)?,
        );
        batch.put_cf(
            self.cf(CHECKPOINT_CF)?,
            CHECKPOINT_KEY,
            serde_json::to_vec(checkpoint)?,
        );
        self.database.write(batch)?;
        Ok(())
    }
}

impl ValidatorStore for IndexerStore {
    fn set_validators(&self, validators: &[Validator]) -> Result<(), StoreError> {
        trace!("Replacing roster with {} validators", validators.len());
        let _guard = self.lock();
        let validators_cf = self.cf(VALIDATORS_CF)?;

        let mut batch = WriteBatch::default();
        for entry in self.database.iterator_cf(validators_cf, IteratorMode::Start) {
            let (key, _) = entry?;
            batch.delete_cf(validators_cf, key);
        }
        for validator in validators {
            batch.put_cf(
                validators_cf,
                validator.hex.as_bytes(),
                serde_json::to_vec(validator)?,
            );
        }
        self.database.write(batch)?;
        Ok(())
    }

    fn get_validators(&self) -> Result<Vec<Validator>, StoreError> {
        let mut validators = vec![];
        for entry in self
            .database
            .iterator_cf(self.cf(VALIDATORS_CF)?, IteratorMode::Start)
        {
            let (_, value) = entry?;
            validators.push(serde_json::from_slice(&value)?);
        }
        Ok(validators)
    }
}

impl SlashStore for IndexerStore {
    fn add_slash(&self, valoper: &str, record: &SlashRecord) -> Result<bool, StoreError> {
        let _guard = self.lock();
        let slashes_cf = self.cf(SLASHES_CF)?;
        let key = slash_key(valoper, record.height);
        if self.database.get_pinned_cf(slashes_cf, &key)?.is_some() {
            return Ok(false);
        }
        trace!("Adding slash of {valoper} at height {}", record.height);
        self.database
            .put_cf(slashes_cf, key, serde_json::to_vec(record)?)?;
        Ok(true)
    }

    fn get_slashes(&self, valoper: &str) -> Result<Vec<SlashRecord>, StoreError> {
        let prefix = slash_prefix(valoper);
        let mut records = vec![];
        for entry in self.database.iterator_cf(
            self.cf(SLASHES_CF)?,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        ) {
            let (key, value) = entry?;
            if !key.starts_with(&prefix) {
                break;
            }
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    fn list_slashes(&self) -> Result<BTreeMap<String, Vec<SlashRecord>>, StoreError> {
        let mut slashes: BTreeMap<String, Vec<SlashRecord>> = BTreeMap::new();
        for entry in self
            .database
            .iterator_cf(self.cf(SLASHES_CF)?, IteratorMode::Start)
        {
            let (key, value) = entry?;
            let key = String::from_utf8_lossy(&key);
            let valoper = key.rsplit_once(':').map(|(v, _)| v).unwrap_or(&key);
            slashes
                .entry(valoper.to_string())
                .or_default()
                .push(serde_json::from_slice(&value)?);
        }
        Ok(slashes)
    }
}

impl GovernanceStore for IndexerStore {
    fn add_proposal_votes(&self, votes: &ProposalVotes) -> Result<bool, StoreError> {
        let _guard = self.lock();
        let governance_cf = self.cf(GOVERNANCE_CF)?;
        let key = proposal_key(votes.proposal_id);
        if self.database.get_pinned_cf(governance_cf, &key)?.is_some() {
            return Ok(false);
        }
        trace!(
            "Adding proposal {} with {} votes",
            votes.proposal_id,
            votes.votes.len()
        );
        self.database
            .put_cf(governance_cf, key, serde_json::to_vec(votes)?)?;
        Ok(true)
    }

    fn get_proposal_votes(&self, proposal_id: u64) -> Result<Option<ProposalVotes>, StoreError> {
        Ok(self
            .database
            .get_pinned_cf(self.cf(GOVERNANCE_CF)?, proposal_key(proposal_id))?
            .map(|bytes| serde_json::from_slice(&bytes))
            .transpose()?)
    }

    fn get_processed_proposals(&self) -> Result<BTreeSet<u64>, StoreError> {
        Ok(self
            .list_proposal_votes()?
            .into_iter()
            .map(|votes| votes.proposal_id)
            .collect())
    }

    fn list_proposal_votes(&self) -> Result<Vec<ProposalVotes>, StoreError> {
        let mut proposals = vec![];
        for entry in self
            .database
            .iterator_cf(self.cf(GOVERNANCE_CF)?, IteratorMode::Start)
        {
            let (_, value) = entry?;
            proposals.push(serde_json::from_slice(&value)?);
        }
        Ok(proposals)
    }
}
