pub mod responses;
pub mod retry;

use self::{
    responses::{
        lowest_height_from_error, ApiStatus, ApiStatusResponse, BlockResult, BlockSearchResult,
        ChainStatus, CommitResult, ProposalsResponse, RpcResponse, SlashEvent,
        StakingValidatorsResponse, StatusResult, TxSearchResult, ValidatorsResult,
    },
    retry::RetryPolicy,
};
use crate::{
    block::BlockRecord,
    constants::{
        API_STATUS_PATH, DEFAULT_VALIDATORS_PATH, GOV_PROPOSALS_PATH, PROPOSAL_PAGE_SIZE,
        REQUEST_TIMEOUT_SECS, SLASH_SEARCH_PAGE_SIZE, VALIDATOR_SET_PAGE_SIZE,
        VOTE_SEARCH_PAGE_SIZE,
    },
    governance::{Proposal, ProposalPage, VoteTx},
    validator::{RosterEntry, ValidatorPage, ValidatorSetSnapshot},
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::{collections::BTreeSet, time::Duration};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum ChainClientError {
    #[error("request to {url} failed: {reason}")]
    Transient { url: String, reason: String },
    #[error("empty response from {url}")]
    EmptyResponse { url: String },
    #[error("request to {url} failed with status {status}")]
    Status { url: String, status: u16 },
    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },
}

impl ChainClientError {
    /// Timeouts, connection failures and empty bodies are worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::EmptyResponse { .. })
    }

    fn malformed(url: &str, reason: impl ToString) -> Self {
        Self::Malformed {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Read access to the chain needed by the indexing pipeline
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn get_status(&self) -> Result<ChainStatus, ChainClientError>;

    /// Lowest height the node still serves
    async fn get_lowest_height(&self) -> Result<u64, ChainClientError>;

    async fn get_block_commit(&self, height: u64) -> Result<BlockRecord, ChainClientError>;

    /// Active validator set at `height`, merged across all pages
    async fn get_validator_set(&self, height: u64)
        -> Result<ValidatorSetSnapshot, ChainClientError>;

    /// Base64 vote extension transaction included at `height`
    async fn get_raw_extension_tx(&self, height: u64) -> Result<String, ChainClientError>;

    async fn list_validators(
        &self,
        page_size: u32,
        cursor: Option<String>,
    ) -> Result<ValidatorPage, ChainClientError>;

    /// Walk the roster cursor until no next cursor is returned
    async fn fetch_validator_roster(
        &self,
        page_size: u32,
    ) -> Result<Vec<RosterEntry>, ChainClientError> {
        let mut entries = vec![];
        let mut cursor = None;
        loop {
            let page = self.list_validators(page_size, cursor).await?;
            trace!("Fetched roster page with {} validators", page.entries.len());
            entries.extend(page.entries);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(entries),
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub rpc: String,
    pub api: String,
    pub validators_path: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new(rpc: impl Into<String>, api: impl Into<String>) -> Self {
        Self {
            rpc: rpc.into(),
            api: api.into(),
            validators_path: DEFAULT_VALIDATORS_PATH.to_string(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

/// HTTP client for a CometBFT RPC node and its Cosmos REST API.
///
/// One connection pool is held for the lifetime of the client.
#[derive(Debug, Clone)]
pub struct ChainClient {
    http: reqwest::Client,
    rpc: String,
    api: String,
    validators_path: String,
    retry: RetryPolicy,
}

impl ChainClient {
    pub fn new(config: ClientConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            rpc: config.rpc.trim_end_matches('/').to_string(),
            api: config.api.trim_end_matches('/').to_string(),
            validators_path: config.validators_path,
            retry: config.retry,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api
    }

    /// REST API node status
    pub async fn get_api_status(&self) -> Result<ApiStatus, ChainClientError> {
        let url = format!("{}{API_STATUS_PATH}", self.api);
        let status: ApiStatusResponse = self.get_json(&url, &[], false).await?;
        Ok(status.into())
    }

    /// Heights at which `valcons` was slashed
    pub async fn get_slashing_events(
        &self,
        valcons: &str,
    ) -> Result<Vec<SlashEvent>, ChainClientError> {
        let url = format!("{}/block_search", self.rpc);
        let query = format!("\"slash.address='{valcons}'\"");
        let mut events = vec![];
        let mut page = 1u64;
        loop {
            let result: BlockSearchResult = self
                .rpc_result(
                    &url,
                    &[
                        ("query", query.clone()),
                        ("page", page.to_string()),
                        ("per_page", SLASH_SEARCH_PAGE_SIZE.to_string()),
                    ],
                )
                .await?;
            let total = result.total_count;
            if result.is_empty() {
                break;
            }
            events.extend(result.into_slash_events());
            if events.len() as u64 >= total {
                break;
            }
            page += 1;
        }
        Ok(events)
    }

    /// One page of governance proposals
    pub async fn list_proposals(
        &self,
        page_size: u32,
        cursor: Option<String>,
    ) -> Result<ProposalPage, ChainClientError> {
        let url = format!("{}{GOV_PROPOSALS_PATH}", self.api);
        let mut query = vec![("pagination.limit", page_size.to_string())];
        if let Some(cursor) = cursor {
            query.push(("pagination.key", cursor));
        }
        let response: ProposalsResponse = self.get_json(&url, &query, false).await?;
        Ok(response.into())
    }

    /// Every proposal, following the pagination cursor
    pub async fn fetch_proposals(&self) -> Result<Vec<Proposal>, ChainClientError> {
        let mut proposals = vec![];
        let mut cursor = None;
        loop {
            let page = self.list_proposals(PROPOSAL_PAGE_SIZE, cursor).await?;
            trace!("Fetched {} proposals", page.proposals.len());
            proposals.extend(page.proposals);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(proposals),
            }
        }
    }

    /// Transactions in which `wallet` voted on the proposal
    pub async fn search_proposal_votes(
        &self,
        wallet: &str,
        proposal_id: u64,
    ) -> Result<Vec<VoteTx>, ChainClientError> {
        let url = format!("{}/tx_search", self.rpc);
        let query = format!(
            "\"proposal_vote.voter='{wallet}' AND proposal_vote.proposal_id='{proposal_id}'\""
        );
        let mut txs = vec![];
        let mut page = 1u64;
        loop {
            let result: TxSearchResult = self
                .rpc_result(
                    &url,
                    &[
                        ("query", query.clone()),
                        ("page", page.to_string()),
                        ("per_page", VOTE_SEARCH_PAGE_SIZE.to_string()),
                    ],
                )
                .await?;
            let total = result.total_count;
            if result.is_empty() {
                break;
            }
            txs.extend(result.into_vote_txs());
            if txs.len() as u64 >= total {
                break;
            }
            page += 1;
        }
        Ok(txs)
    }

    async fn rpc_result<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ChainClientError> {
        let response: RpcResponse<T> = self.get_json(url, query, false).await?;
        response
            .into_result()
            .map_err(|reason| ChainClientError::malformed(url, reason))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        allow_server_error: bool,
    ) -> Result<T, ChainClientError> {
        self.retry
            .run(url, move || self.get_json_once(url, query, allow_server_error))
            .await
    }

    async fn get_json_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        allow_server_error: bool,
    ) -> Result<T, ChainClientError> {
        trace!("GET {url} {query:?}");
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| ChainClientError::Transient {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success()
            && !(allow_server_error && status == StatusCode::INTERNAL_SERVER_ERROR)
        {
            debug!("Request to {url} failed with status code {status}");
            return Err(ChainClientError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ChainClientError::Transient {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        if body.is_empty() {
            return Err(ChainClientError::EmptyResponse {
                url: url.to_string(),
            });
        }
        serde_json::from_slice(&body).map_err(|e| ChainClientError::malformed(url, e))
    }
}

#[async_trait]
impl ChainSource for ChainClient {
    async fn get_status(&self) -> Result<ChainStatus, ChainClientError> {
        let url = format!("{}/status", self.rpc);
        let status: StatusResult = self.rpc_result(&url, &[]).await?;
        Ok(status.into())
    }

    async fn get_lowest_height(&self) -> Result<u64, ChainClientError> {
        let url = format!("{}/block", self.rpc);
        let response: RpcResponse<BlockResult> = self
            .get_json(&url, &[("height", "1".to_string())], true)
            .await?;

        if let Some(block) = response.result {
            return Ok(block.height());
        }
        response
            .error
            .and_then(|error| error.data)
            .as_deref()
            .and_then(lowest_height_from_error)
            .ok_or_else(|| ChainClientError::malformed(&url, "no lowest height in response"))
    }

    async fn get_block_commit(&self, height: u64) -> Result<BlockRecord, ChainClientError> {
        let url = format!("{}/commit", self.rpc);
        let commit: CommitResult = self
            .rpc_result(&url, &[("height", height.to_string())])
            .await?;
        commit
            .into_block_record(height)
            .map_err(|reason| ChainClientError::malformed(&url, reason))
    }

    async fn get_validator_set(
        &self,
        height: u64,
    ) -> Result<ValidatorSetSnapshot, ChainClientError> {
        let url = format!("{}/validators", self.rpc);
        let mut members = BTreeSet::new();
        let mut seen = 0;
        let mut page = 1u64;
        loop {
            let result: ValidatorsResult = self
                .rpc_result(
                    &url,
                    &[
                        ("height", height.to_string()),
                        ("page", page.to_string()),
                        ("per_page", VALIDATOR_SET_PAGE_SIZE.to_string()),
                    ],
                )
                .await?;

            if result.validators.is_empty() && seen < result.total {
                return Err(ChainClientError::malformed(
                    &url,
                    format!(
                        "page {page} at height {height} is empty with {seen} of {} validators",
                        result.total
                    ),
                ));
            }
            seen += result.validators.len() as u64;
            members.extend(result.member_hexes());

            if seen >= result.total {
                return Ok(ValidatorSetSnapshot::new(height, members));
            }
            page += 1;
        }
    }

    async fn get_raw_extension_tx(&self, height: u64) -> Result<String, ChainClientError> {
        let url = format!("{}/block", self.rpc);
        let block: BlockResult = self
            .rpc_result(&url, &[("height", height.to_string())])
            .await?;
        block
            .into_extension_tx(height)
            .map_err(|reason| ChainClientError::malformed(&url, reason))
    }

    async fn list_validators(
        &self,
        page_size: u32,
        cursor: Option<String>,
    ) -> Result<ValidatorPage, ChainClientError> {
        let url = format!("{}{}", self.api, self.validators_path);
        let mut query = vec![("pagination.limit", page_size.to_string())];
        if let Some(cursor) = cursor {
            query.push(("pagination.key", cursor));
        }
        let response: StakingValidatorsResponse = self.get_json(&url, &query, false).await?;
        Ok(response.into())
    }
}
