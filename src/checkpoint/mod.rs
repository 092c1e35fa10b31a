pub mod store;

use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

/// Durable cursor: the last height whose day has been flushed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub latest_processed_height: u64,
    pub latest_processed_time: DateTime<Utc>,
    pub chain_id: String,
}

impl Checkpoint {
    pub fn new(height: u64, time: DateTime<Utc>, chain_id: impl Into<String>) -> Self {
        Self {
            latest_processed_height: height,
            latest_processed_time: time,
            chain_id: chain_id.into(),
        }
    }

    /// First height not yet covered by a flushed day
    pub fn next_height(&self) -> u64 {
        self.latest_processed_height + 1
    }
}
