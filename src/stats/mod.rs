pub mod store;

use crate::{block::BlockRecord, extension::VoteExtensionResult, validator::ValidatorSetSnapshot};
use chrono::{DateTime, NaiveDate, Utc};
use serde_derive::{Deserialize, Serialize};
use std::{collections::BTreeMap, ops::AddAssign};
use thiserror::Error;
use tracing::warn;

/// Per validator counters of one day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatorDayStats {
    #[serde(rename = "proposed_blocks")]
    pub proposed: u64,
    #[serde(rename = "signed_blocks")]
    pub signed: u64,
    #[serde(rename = "missed_blocks")]
    pub missed: u64,
    pub signed_oracle: u64,
    pub missed_oracle: u64,
}

impl ValidatorDayStats {
    /// Heights the validator was in the active set for
    pub fn active_heights(&self) -> u64 {
        self.signed + self.missed
    }

    /// Signed share of active heights, in percent
    pub fn uptime(&self) -> f64 {
        percentage(self.signed, self.active_heights())
    }

    /// Share of oracle determinations that carried prices, in percent
    pub fn oracle_uptime(&self) -> f64 {
        percentage(self.signed_oracle, self.signed_oracle + self.missed_oracle)
    }
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

impl AddAssign for ValidatorDayStats {
    fn add_assign(&mut self, rhs: Self) {
        self.proposed += rhs.proposed;
        self.signed += rhs.signed;
        self.missed += rhs.missed;
        self.signed_oracle += rhs.signed_oracle;
        self.missed_oracle += rhs.missed_oracle;
    }
}

/// Persisted rollup of one calendar day, written exactly once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStatDocument {
    pub date: NaiveDate,
    pub date_start_height: u64,
    pub date_end_height: u64,
    pub validators: BTreeMap<String, ValidatorDayStats>,
}

/// Sum of every document's counters per validator hex
pub fn cumulative_totals<'a>(
    documents: impl IntoIterator<Item = &'a DailyStatDocument>,
) -> BTreeMap<String, ValidatorDayStats> {
    let mut totals: BTreeMap<String, ValidatorDayStats> = BTreeMap::new();
    for document in documents {
        for (hex, stats) in &document.validators {
            *totals.entry(hex.clone()).or_default() += *stats;
        }
    }
    totals
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("height {got} folded into a day expecting height {expected}")]
pub struct OutOfOrderHeight {
    pub expected: u64,
    pub got: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldReport {
    pub members: usize,
    pub undetermined_oracle: Vec<String>,
}

/// Counters of the day in flight, owned by the pipeline's fold step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyAccumulator {
    date: NaiveDate,
    start_height: u64,
    end_height: Option<u64>,
    end_time: Option<DateTime<Utc>>,
    validators: BTreeMap<String, ValidatorDayStats>,
}

impl DailyAccumulator {
    pub fn new(date: NaiveDate, start_height: u64) -> Self {
        Self {
            date,
            start_height,
            end_height: None,
            end_time: None,
            validators: BTreeMap::new(),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn start_height(&self) -> u64 {
        self.start_height
    }

    /// Last folded height, `None` before the first fold
    pub fn end_height(&self) -> Option<u64> {
        self.end_height
    }

    /// Time of the last folded block
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn heights(&self) -> u64 {
        self.end_height
            .map(|end| end + 1 - self.start_height)
            .unwrap_or(0)
    }

    pub fn get(&self, hex: &str) -> Option<&ValidatorDayStats> {
        self.validators.get(hex)
    }

    /// Credit or debit every member of the height's validator set.
    ///
    /// Block attendance is exclusive: each member is either signed or missed.
    /// Oracle attendance is only counted when the extension gives an explicit
    /// determination for the member.
    pub fn fold(
        &mut self,
        block: &BlockRecord,
        valset: &ValidatorSetSnapshot,
        extension: &VoteExtensionResult,
    ) -> Result<FoldReport, OutOfOrderHeight> {
        let expected = self.end_height.map(|h| h + 1).unwrap_or(self.start_height);
        if block.height != expected || valset.height != expected {
            return Err(OutOfOrderHeight {
                expected,
                got: block.height.max(valset.height),
            });
        }

        let mut report = FoldReport {
            members: valset.len(),
            ..Default::default()
        };
        for hex in &valset.member_hexes {
            let stats = self.validators.entry(hex.clone()).or_default();
            if *hex == block.proposer_hex {
                stats.proposed += 1;
            }
            if block.is_signed_by(hex) {
                stats.signed += 1;
            } else {
                stats.missed += 1;
            }
            match extension.determination(hex) {
                Some(true) => stats.signed_oracle += 1,
                Some(false) => stats.missed_oracle += 1,
                None => {
                    warn!(
                        "No oracle determination for {hex} at height {}",
                        block.height
                    );
                    report.undetermined_oracle.push(hex.clone());
                }
            }
        }

        self.end_height = Some(block.height);
        self.end_time = Some(block.time);
        Ok(report)
    }

    /// Finish the day; `None` if nothing was folded
    pub fn into_document(self) -> Option<DailyStatDocument> {
        let date_end_height = self.end_height?;
        Some(DailyStatDocument {
            date: self.date,
            date_start_height: self.start_height,
            date_end_height,
            validators: self.validators,
        })
    }
}
