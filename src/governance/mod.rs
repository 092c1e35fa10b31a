//! Governance participation of roster validators.
//!
//! Finished proposals are listed from the REST API; each validator's vote is
//! the latest successful `MsgVote` its wallet broadcast for the proposal.

pub mod store;

use self::store::GovernanceStore;
use crate::{
    client::{ChainClient, ChainClientError},
    store::StoreError,
    validator::Validator,
};
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

const VOTE_EVENT: &str = "proposal_vote";
const OPTION_ATTRIBUTE: &str = "option";

/// Statuses after which a proposal's votes can no longer change
const FINISHED_STATUSES: [&str; 3] = [
    "PROPOSAL_STATUS_PASSED",
    "PROPOSAL_STATUS_REJECTED",
    "PROPOSAL_STATUS_FAILED",
];

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("listing proposals failed: {0}")]
    Proposals(#[source] ChainClientError),
    #[error("vote search of {valoper} on proposal {proposal_id} failed: {source}")]
    VoteSearch {
        proposal_id: u64,
        valoper: String,
        #[source]
        source: ChainClientError,
    },
    #[error("vote of {valoper} on proposal {proposal_id} is malformed: {reason}")]
    MalformedVote {
        proposal_id: u64,
        valoper: String,
        reason: String,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// `cosmos.gov.v1.VoteOption`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VoteOption {
    Unspecified,
    Yes,
    Abstain,
    No,
    NoWithVeto,
}

impl VoteOption {
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::Unspecified),
            1 => Some(Self::Yes),
            2 => Some(Self::Abstain),
            3 => Some(Self::No),
            4 => Some(Self::NoWithVeto),
            _ => None,
        }
    }

    /// Accepts the enum name (`VOTE_OPTION_YES`) or its numeric code
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().trim_matches('"');
        if let Ok(code) = name.parse() {
            return Self::from_code(code);
        }
        match name.trim_start_matches("VOTE_OPTION_") {
            "UNSPECIFIED" => Some(Self::Unspecified),
            "YES" => Some(Self::Yes),
            "ABSTAIN" => Some(Self::Abstain),
            "NO" => Some(Self::No),
            "NO_WITH_VETO" => Some(Self::NoWithVeto),
            _ => None,
        }
    }
}

impl std::fmt::Display for VoteOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unspecified => "unspecified",
            Self::Yes => "yes",
            Self::Abstain => "abstain",
            Self::No => "no",
            Self::NoWithVeto => "no_with_veto",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub id: u64,
    pub status: String,
}

impl Proposal {
    pub fn is_finished(&self) -> bool {
        FINISHED_STATUSES.contains(&self.status.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalPage {
    pub proposals: Vec<Proposal>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxEvent {
    pub kind: String,
    pub attributes: Vec<(String, String)>,
}

/// A transaction found by a vote search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteTx {
    pub hash: String,
    pub height: u64,
    pub code: u32,
    pub events: Vec<TxEvent>,
}

impl VoteTx {
    fn option_attribute(&self) -> Option<&str> {
        self.events
            .iter()
            .filter(|event| event.kind == VOTE_EVENT)
            .flat_map(|event| event.attributes.iter())
            .find(|(key, _)| key == OPTION_ATTRIBUTE)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalVote {
    pub option: VoteOption,
    pub tx_height: u64,
    pub tx_hash: String,
}

/// Roster votes on one finished proposal, keyed by operator address.
/// Validators without a vote are absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalVotes {
    pub proposal_id: u64,
    pub status: String,
    pub votes: BTreeMap<String, ProposalVote>,
}

impl ProposalVotes {
    pub fn new(proposal: &Proposal) -> Self {
        Self {
            proposal_id: proposal.id,
            status: proposal.status.clone(),
            votes: BTreeMap::new(),
        }
    }

    pub fn has_voted(&self, valoper: &str) -> bool {
        self.votes.contains_key(valoper)
    }
}

/// The vote carried by the highest successful transaction, if any
pub fn latest_vote(txs: &[VoteTx]) -> Result<Option<ProposalVote>, String> {
    let Some(tx) = txs
        .iter()
        .filter(|tx| tx.code == 0)
        .max_by_key(|tx| tx.height)
    else {
        return Ok(None);
    };

    let value = tx
        .option_attribute()
        .ok_or_else(|| format!("tx {} has no {VOTE_EVENT}.{OPTION_ATTRIBUTE}", tx.hash))?;
    let option = parse_vote_option(value)
        .ok_or_else(|| format!("tx {} has unknown vote option {value}", tx.hash))?;
    Ok(Some(ProposalVote {
        option,
        tx_height: tx.height,
        tx_hash: tx.hash.clone(),
    }))
}

/// The `option` attribute is JSON weighted options in gov v1
/// (`[{"option":1,"weight":"1.0"}]`) and a bare name in v1beta1.
/// A split vote is attributed to its first option.
fn parse_vote_option(value: &str) -> Option<VoteOption> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Weighted {
        Many(Vec<WeightedOption>),
        One(WeightedOption),
    }

    #[derive(Deserialize)]
    struct WeightedOption {
        option: serde_json::Value,
    }

    let value = value.trim();
    if value.starts_with('[') || value.starts_with('{') {
        let first = match serde_json::from_str::<Weighted>(value).ok()? {
            Weighted::Many(options) => options.into_iter().next()?,
            Weighted::One(option) => option,
        };
        return match first.option {
            serde_json::Value::Number(code) => VoteOption::from_code(code.as_u64()?),
            serde_json::Value::String(name) => VoteOption::from_name(&name),
            _ => None,
        };
    }

    // "option:VOTE_OPTION_YES weight:\"1.000000000000000000\""
    value
        .split_whitespace()
        .map(|token| token.trim_start_matches("option:"))
        .find_map(VoteOption::from_name)
}

/// Record the roster's votes on every finished proposal not yet stored.
/// Returns the number of newly stored proposals.
#[instrument(skip_all)]
pub async fn refresh_governance<S: GovernanceStore>(
    client: &ChainClient,
    store: &S,
    validators: &[Validator],
) -> Result<usize, GovernanceError> {
    let processed = store.get_processed_proposals()?;
    let proposals = client
        .fetch_proposals()
        .await
        .map_err(GovernanceError::Proposals)?;
    let pending: Vec<Proposal> = proposals
        .into_iter()
        .filter(|p| p.is_finished() && !processed.contains(&p.id))
        .collect();
    debug!(
        "{} finished proposals to record, {} already stored",
        pending.len(),
        processed.len()
    );

    let mut added = 0;
    for proposal in &pending {
        let votes = collect_votes(client, proposal, validators).await?;
        let voted = votes.votes.len();
        if store.add_proposal_votes(&votes)? {
            debug!(
                "Proposal {} ({}): {voted} of {} validators voted",
                proposal.id,
                proposal.status,
                validators.len()
            );
            added += 1;
        } else {
            warn!("Proposal {} was stored concurrently", proposal.id);
        }
    }
    info!("Recorded votes on {added} new proposals");
    Ok(added)
}

async fn collect_votes(
    client: &ChainClient,
    proposal: &Proposal,
    validators: &[Validator],
) -> Result<ProposalVotes, GovernanceError> {
    let mut votes = ProposalVotes::new(proposal);
    for validator in validators {
        let txs = client
            .search_proposal_votes(&validator.wallet, proposal.id)
            .await
            .map_err(|source| GovernanceError::VoteSearch {
                proposal_id: proposal.id,
                valoper: validator.valoper.clone(),
                source,
            })?;
        let vote = latest_vote(&txs).map_err(|reason| GovernanceError::MalformedVote {
            proposal_id: proposal.id,
            valoper: validator.valoper.clone(),
            reason,
        })?;
        if let Some(vote) = vote {
            votes.votes.insert(validator.valoper.clone(), vote);
        }
    }
    Ok(votes)
}
