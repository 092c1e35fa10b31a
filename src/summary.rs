use crate::{
    checkpoint::Checkpoint,
    governance::ProposalVotes,
    slashing::SlashRecord,
    stats::{cumulative_totals, DailyStatDocument, ValidatorDayStats},
    validator::Validator,
};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorSummary {
    pub hex: String,
    /// Empty for validators no longer in the roster
    pub moniker: String,
    pub valoper: String,
    pub totals: ValidatorDayStats,
    pub slashes: usize,
    /// Finished proposals the validator voted on
    pub votes: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub checkpoint: Option<Checkpoint>,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub days: usize,
    pub proposals: usize,
    /// Sorted by signed blocks, most first
    pub validators: Vec<ValidatorSummary>,
}

impl Summary {
    pub fn new(
        checkpoint: Option<Checkpoint>,
        documents: &[DailyStatDocument],
        roster: &[Validator],
        slashes: &BTreeMap<String, Vec<SlashRecord>>,
    ) -> Self {
        let roster: HashMap<&str, &Validator> =
            roster.iter().map(|v| (v.hex.as_str(), v)).collect();

        let mut validators: Vec<ValidatorSummary> = cumulative_totals(documents)
            .into_iter()
            .map(|(hex, totals)| {
                let known = roster.get(hex.as_str());
                let valoper = known.map(|v| v.valoper.clone()).unwrap_or_default();
                ValidatorSummary {
                    moniker: known.map(|v| v.moniker.clone()).unwrap_or_default(),
                    slashes: slashes.get(&valoper).map(Vec::len).unwrap_or(0),
                    votes: 0,
                    valoper,
                    hex,
                    totals,
                }
            })
            .collect();
        validators.sort_by(|a, b| {
            b.totals
                .signed
                .cmp(&a.totals.signed)
                .then_with(|| a.hex.cmp(&b.hex))
        });

        Self {
            checkpoint,
            first_date: documents.iter().map(|d| d.date).min(),
            last_date: documents.iter().map(|d| d.date).max(),
            days: documents.len(),
            proposals: 0,
            validators,
        }
    }

    /// Count each validator's votes across the stored proposals
    pub fn with_governance(mut self, proposals: &[ProposalVotes]) -> Self {
        self.proposals = proposals.len();
        for validator in self.validators.iter_mut() {
            validator.votes = proposals
                .iter()
                .filter(|p| p.has_voted(&validator.valoper))
                .count();
        }
        self
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "===== Uptime summary =====")?;
        match &self.checkpoint {
            Some(checkpoint) => {
                writeln!(f, "  Chain:          {}", checkpoint.chain_id)?;
                writeln!(f, "  Last height:    {}", checkpoint.latest_processed_height)?;
                writeln!(f, "  Last time:      {}", checkpoint.latest_processed_time)?;
            }
            None => writeln!(f, "  No days indexed yet")?,
        }
        if let (Some(first), Some(last)) = (self.first_date, self.last_date) {
            writeln!(f, "  Days:           {} ({first} to {last})", self.days)?;
        }
        writeln!(f, "  Proposals:      {}", self.proposals)?;

        if self.validators.is_empty() {
            return Ok(());
        }
        writeln!(f, "\n=== Validators ===")?;
        writeln!(
            f,
            "{:<24} {:<40} {:>9} {:>9} {:>9} {:>8} {:>8} {:>8} {:>6}",
            "moniker", "hex", "proposed", "signed", "missed", "uptime", "oracle", "slashes", "votes"
        )?;
        for v in &self.validators {
            writeln!(
                f,
                "{:<24} {:<40} {:>9} {:>9} {:>9} {:>7.2}% {:>7.2}% {:>8} {:>6}",
                truncate(&v.moniker, 24),
                v.hex,
                v.totals.proposed,
                v.totals.signed,
                v.totals.missed,
                v.totals.uptime(),
                v.totals.oracle_uptime(),
                v.slashes,
                v.votes
            )?;
        }
        Ok(())
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
