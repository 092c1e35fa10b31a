/// Log progress every this many folded heights
pub const BLOCK_REPORTING_FREQ: u64 = 5000;

pub const REQUEST_RETRY_ATTEMPTS: u32 = 3;
pub const REQUEST_RETRY_DELAY_SECS: u64 = 3;
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Largest page CometBFT serves for `validators`
pub const VALIDATOR_SET_PAGE_SIZE: u64 = 100;
pub const VALIDATOR_ROSTER_PAGE_SIZE: u32 = 100;
pub const SLASH_SEARCH_PAGE_SIZE: u64 = 100;
pub const VOTE_SEARCH_PAGE_SIZE: u64 = 100;
pub const PROPOSAL_PAGE_SIZE: u32 = 100;

/// Upper bound on a decompressed vote extension payload
pub const MAX_DECOMPRESSED_EXTENSION_BYTES: u64 = 64 * 1024 * 1024;

pub const DEFAULT_BLOCKS_BATCH_SIZE: u64 = 50;
pub const DEFAULT_VALIDATORS_PATH: &str = "/cosmos/staking/v1beta1/validators";
pub const API_STATUS_PATH: &str = "/cosmos/base/node/v1beta1/status";
pub const GOV_PROPOSALS_PATH: &str = "/cosmos/gov/v1/proposals";
pub const DEFAULT_DATABASE_DIR: &str = "./uptime-indexer-db";

// column families
pub const CHECKPOINT_CF: &str = "checkpoint";
pub const DAILY_STATS_CF: &str = "daily_stats";
pub const VALIDATORS_CF: &str = "validators";
pub const SLASHES_CF: &str = "slashes";
pub const GOVERNANCE_CF: &str = "governance";
pub const COLUMN_FAMILIES: [&str; 5] = [
    CHECKPOINT_CF,
    DAILY_STATS_CF,
    VALIDATORS_CF,
    SLASHES_CF,
    GOVERNANCE_CF,
];
