pub mod keys;
pub mod store;

use self::keys::KeyError;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Validator identity, created once per run from the roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub hex: String,
    pub valoper: String,
    pub valcons: String,
    pub wallet: String,
    pub moniker: String,
    pub consensus_pubkey: String,
}

/// A roster entry as reported by the staking module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub valoper: String,
    pub moniker: String,
    pub consensus_pubkey: String,
}

/// One page of the staking module's validator roster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorPage {
    pub entries: Vec<RosterEntry>,
    pub next_cursor: Option<String>,
}

/// Validators eligible to be credited or debited at `height`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorSetSnapshot {
    pub height: u64,
    pub member_hexes: BTreeSet<String>,
}

impl Validator {
    /// Derive every address form of a roster entry
    pub fn from_roster_entry(entry: RosterEntry, address_prefix: &str) -> Result<Self, KeyError> {
        let hex = keys::consensus_hex_from_base64(&entry.consensus_pubkey)?;
        let valcons = keys::valcons_from_base64(&entry.consensus_pubkey, address_prefix)?;
        let wallet = keys::wallet_from_valoper(&entry.valoper)?;
        Ok(Self {
            hex,
            valcons,
            wallet,
            valoper: entry.valoper,
            moniker: entry.moniker,
            consensus_pubkey: entry.consensus_pubkey,
        })
    }
}

impl ValidatorSetSnapshot {
    pub fn new(height: u64, member_hexes: impl IntoIterator<Item = String>) -> Self {
        Self {
            height,
            member_hexes: member_hexes.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.member_hexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_hexes.is_empty()
    }

    pub fn contains(&self, hex: &str) -> bool {
        self.member_hexes.contains(hex)
    }
}
