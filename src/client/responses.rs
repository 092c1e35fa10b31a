//! Wire shapes of the CometBFT RPC and Cosmos REST responses the indexer reads.
//!
//! Conversions into domain records return a reason string on unexpected
//! shapes; the client turns it into [super::ChainClientError::Malformed].

use crate::{
    block::BlockRecord,
    governance::{Proposal, ProposalPage, TxEvent, VoteTx},
    validator::{keys, RosterEntry, ValidatorPage},
};
use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde_derive::Deserialize;
use std::collections::BTreeSet;

/// JSON-RPC envelope
#[derive(Debug, Deserialize)]
pub struct RpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<String>,
}

impl<T> RpcResponse<T> {
    pub fn into_result(self) -> Result<T, String> {
        match (self.result, self.error) {
            (Some(result), _) => Ok(result),
            (None, Some(error)) => Err(format!(
                "rpc error: {} {}",
                error.message,
                error.data.unwrap_or_default()
            )),
            (None, None) => Err("response has neither result nor error".into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStatus {
    pub chain_id: String,
    pub latest_height: u64,
    pub latest_time: DateTime<Utc>,
    pub catching_up: bool,
    pub tx_index: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusResult {
    node_info: NodeInfo,
    sync_info: SyncInfo,
}

#[derive(Debug, Deserialize)]
struct NodeInfo {
    network: String,
    #[serde(default)]
    other: NodeInfoOther,
}

#[derive(Debug, Default, Deserialize)]
struct NodeInfoOther {
    #[serde(default)]
    tx_index: String,
}

#[derive(Debug, Deserialize)]
struct SyncInfo {
    #[serde(deserialize_with = "u64_from_str")]
    latest_block_height: u64,
    latest_block_time: DateTime<Utc>,
    #[serde(default)]
    catching_up: bool,
}

impl From<StatusResult> for ChainStatus {
    fn from(status: StatusResult) -> Self {
        Self {
            chain_id: status.node_info.network,
            latest_height: status.sync_info.latest_block_height,
            latest_time: status.sync_info.latest_block_time,
            catching_up: status.sync_info.catching_up,
            tx_index: status.node_info.other.tx_index,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommitResult {
    signed_header: SignedHeader,
}

#[derive(Debug, Deserialize)]
struct SignedHeader {
    header: Header,
    commit: Commit,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(deserialize_with = "u64_from_str")]
    height: u64,
    time: DateTime<Utc>,
    #[serde(default)]
    proposer_address: String,
}

#[derive(Debug, Deserialize)]
struct Commit {
    #[serde(default)]
    signatures: Vec<CommitSig>,
}

#[derive(Debug, Deserialize)]
struct CommitSig {
    #[serde(default)]
    validator_address: Option<String>,
}

impl CommitResult {
    pub fn into_block_record(self, height: u64) -> Result<BlockRecord, String> {
        let SignedHeader { header, commit } = self.signed_header;
        if header.height != height {
            return Err(format!(
                "requested height {height}, commit is for {}",
                header.height
            ));
        }
        if header.proposer_address.is_empty() {
            return Err(format!("commit at height {height} has no proposer"));
        }

        // absent votes carry an empty address
        let signer_hexes = commit
            .signatures
            .into_iter()
            .filter_map(|sig| sig.validator_address)
            .filter(|address| !address.is_empty())
            .map(|address| keys::normalize_hex(&address))
            .collect();

        Ok(BlockRecord {
            height,
            proposer_hex: keys::normalize_hex(&header.proposer_address),
            signer_hexes,
            time: header.time,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ValidatorsResult {
    #[serde(default)]
    pub validators: Vec<ValidatorsEntry>,
    #[serde(deserialize_with = "u64_from_str")]
    pub total: u64,
}

#[derive(Debug, Deserialize)]
pub struct ValidatorsEntry {
    pub address: String,
}

impl ValidatorsResult {
    pub fn member_hexes(&self) -> BTreeSet<String> {
        self.validators
            .iter()
            .map(|v| keys::normalize_hex(&v.address))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct BlockResult {
    block: Block,
}

#[derive(Debug, Deserialize)]
struct Block {
    header: Header,
    #[serde(default)]
    data: BlockData,
}

#[derive(Debug, Default, Deserialize)]
struct BlockData {
    #[serde(default)]
    txs: Option<Vec<String>>,
}

impl BlockResult {
    pub fn height(&self) -> u64 {
        self.block.header.height
    }

    /// The vote extension transaction is always injected first
    pub fn into_extension_tx(self, height: u64) -> Result<String, String> {
        if self.block.header.height != height {
            return Err(format!(
                "requested height {height}, block is {}",
                self.block.header.height
            ));
        }
        self.block
            .data
            .txs
            .and_then(|txs| txs.into_iter().next())
            .ok_or_else(|| format!("block {height} has no transactions"))
    }
}

/// Pruned nodes answer `block?height=1` with an error naming the lowest height
pub fn lowest_height_from_error(data: &str) -> Option<u64> {
    data.split_whitespace().last()?.parse().ok()
}

#[derive(Debug, Deserialize)]
pub struct StakingValidatorsResponse {
    #[serde(default)]
    validators: Vec<StakingValidator>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct StakingValidator {
    operator_address: String,
    consensus_pubkey: ConsensusPubkey,
    #[serde(default)]
    description: Description,
}

#[derive(Debug, Deserialize)]
struct ConsensusPubkey {
    key: String,
}

#[derive(Debug, Default, Deserialize)]
struct Description {
    #[serde(default)]
    moniker: String,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    next_key: Option<String>,
}

impl From<StakingValidatorsResponse> for ValidatorPage {
    fn from(response: StakingValidatorsResponse) -> Self {
        let entries = response
            .validators
            .into_iter()
            .map(|v| RosterEntry {
                valoper: v.operator_address,
                moniker: v.description.moniker,
                consensus_pubkey: v.consensus_pubkey.key,
            })
            .collect();
        let next_cursor = response
            .pagination
            .and_then(|p| p.next_key)
            .filter(|key| !key.is_empty());
        Self {
            entries,
            next_cursor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiStatus {
    pub earliest_store_height: u64,
    pub height: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ApiStatusResponse {
    #[serde(deserialize_with = "u64_from_str")]
    earliest_store_height: u64,
    #[serde(deserialize_with = "u64_from_str")]
    height: u64,
    timestamp: DateTime<Utc>,
}

impl From<ApiStatusResponse> for ApiStatus {
    fn from(status: ApiStatusResponse) -> Self {
        Self {
            earliest_store_height: status.earliest_store_height,
            height: status.height,
            timestamp: status.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlashEvent {
    pub height: u64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct BlockSearchResult {
    #[serde(default)]
    blocks: Vec<BlockResult>,
    #[serde(deserialize_with = "u64_from_str")]
    pub total_count: u64,
}

impl BlockSearchResult {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn into_slash_events(self) -> Vec<SlashEvent> {
        self.blocks
            .into_iter()
            .map(|b| SlashEvent {
                height: b.block.header.height,
                time: b.block.header.time,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct ProposalsResponse {
    #[serde(default)]
    proposals: Vec<ProposalEntry>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct ProposalEntry {
    // v1beta1 names it `proposal_id`
    #[serde(alias = "proposal_id", deserialize_with = "u64_from_str")]
    id: u64,
    #[serde(default)]
    status: String,
}

impl From<ProposalsResponse> for ProposalPage {
    fn from(response: ProposalsResponse) -> Self {
        let proposals = response
            .proposals
            .into_iter()
            .map(|p| Proposal {
                id: p.id,
                status: p.status,
            })
            .collect();
        let next_cursor = response
            .pagination
            .and_then(|p| p.next_key)
            .filter(|key| !key.is_empty());
        Self {
            proposals,
            next_cursor,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TxSearchResult {
    #[serde(default)]
    txs: Vec<TxEntry>,
    #[serde(deserialize_with = "u64_from_str")]
    pub total_count: u64,
}

#[derive(Debug, Deserialize)]
struct TxEntry {
    hash: String,
    #[serde(deserialize_with = "u64_from_str")]
    height: u64,
    tx_result: TxResultEntry,
}

#[derive(Debug, Deserialize)]
struct TxResultEntry {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    events: Vec<EventEntry>,
}

#[derive(Debug, Deserialize)]
struct EventEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    attributes: Vec<AttributeEntry>,
}

#[derive(Debug, Deserialize)]
struct AttributeEntry {
    key: String,
    #[serde(default)]
    value: Option<String>,
}

impl TxSearchResult {
    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    pub fn into_vote_txs(self) -> Vec<VoteTx> {
        self.txs
            .into_iter()
            .map(|tx| VoteTx {
                hash: tx.hash,
                height: tx.height,
                code: tx.tx_result.code,
                events: tx
                    .tx_result
                    .events
                    .into_iter()
                    .map(|event| TxEvent {
                        kind: event.kind,
                        attributes: event
                            .attributes
                            .into_iter()
                            .map(|a| (a.key, a.value.unwrap_or_default()))
                            .collect(),
                    })
                    .collect(),
            })
            .collect()
    }
}

/// CometBFT encodes 64 bit integers as strings
fn u64_from_str<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Str(String),
        Num(u64),
    }

    match <StrOrNum as serde::Deserialize>::deserialize(deserializer)? {
        StrOrNum::Str(s) => s.parse().map_err(de::Error::custom),
        StrOrNum::Num(n) => Ok(n),
    }
}
