use crate::{slashing::SlashRecord, store::StoreError};
use std::collections::BTreeMap;

pub trait SlashStore {
    /// Record a slash for the operator; `false` if that height is already recorded
    fn add_slash(&self, valoper: &str, record: &SlashRecord) -> Result<bool, StoreError>;

    /// Get the recorded slashes of the operator, ascending by height
    fn get_slashes(&self, valoper: &str) -> Result<Vec<SlashRecord>, StoreError>;

    /// Get all recorded slashes keyed by operator address
    fn list_slashes(&self) -> Result<BTreeMap<String, Vec<SlashRecord>>, StoreError>;
}
