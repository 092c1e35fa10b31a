use chrono::{DateTime, NaiveDate, Utc};
use std::{
    collections::BTreeSet,
    fmt::{Debug, Formatter, Result},
};

/// Commit data of one height: proposer, signers and block time
#[derive(Hash, PartialEq, Eq, Clone)]
pub struct BlockRecord {
    pub height: u64,
    pub proposer_hex: String,
    pub signer_hexes: BTreeSet<String>,
    pub time: DateTime<Utc>,
}

impl BlockRecord {
    /// Calendar (UTC) date the block was produced on
    pub fn date(&self) -> NaiveDate {
        self.time.date_naive()
    }

    pub fn is_signed_by(&self, hex: &str) -> bool {
        self.signer_hexes.contains(hex)
    }
}

impl Debug for BlockRecord {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(
            f,
            "\nBlockRecord {{\n  height:   {:?},\n  proposer: {:?},\n  signers:  {},\n  time:     {} }}",
            self.height,
            self.proposer_hex,
            self.signer_hexes.len(),
            self.time.to_rfc3339()
        )
    }
}
