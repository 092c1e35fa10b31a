use crate::{
    checkpoint::{store::CheckpointStore, Checkpoint},
    stats::DailyStatDocument,
    store::StoreError,
};
use chrono::NaiveDate;

pub trait DailyStatsStore: CheckpointStore {
    /// Add the day's document; fails if the date was already written
    fn append_daily_stats(&self, document: &DailyStatDocument) -> Result<(), StoreError>;

    /// Get the document of the given date
    fn get_daily_stats(&self, date: NaiveDate) -> Result<Option<DailyStatDocument>, StoreError>;

    /// Get every document, ascending by date
    fn list_daily_stats(&self) -> Result<Vec<DailyStatDocument>, StoreError>;

    /// Write the day's document and advance the checkpoint as one atomic commit
    fn commit_day(
        &self,
        document: &DailyStatDocument,
        checkpoint: &Checkpoint,
    ) -> Result<(), StoreError>;
}
