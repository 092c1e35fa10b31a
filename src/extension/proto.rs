//! Protobuf messages carried by the vote extension transaction.
//!
//! Only the fields the indexer reads are declared; prost skips unknown
//! fields when decoding.

use std::collections::BTreeMap;

/// `tendermint.abci.ExtendedCommitInfo`
#[derive(Clone, PartialEq, prost::Message)]
pub struct ExtendedCommitInfo {
    #[prost(int32, tag = "1")]
    pub round: i32,
    #[prost(message, repeated, tag = "2")]
    pub votes: Vec<ExtendedVoteInfo>,
}

/// `tendermint.abci.ExtendedVoteInfo`
#[derive(Clone, PartialEq, prost::Message)]
pub struct ExtendedVoteInfo {
    #[prost(message, optional, tag = "1")]
    pub validator: Option<VoteValidator>,
    #[prost(bytes = "vec", tag = "3")]
    pub vote_extension: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub extension_signature: Vec<u8>,
    #[prost(int32, tag = "5")]
    pub block_id_flag: i32,
}

/// `tendermint.abci.Validator`
#[derive(Clone, PartialEq, prost::Message)]
pub struct VoteValidator {
    #[prost(bytes = "vec", tag = "1")]
    pub address: Vec<u8>,
    #[prost(int64, tag = "3")]
    pub power: i64,
}

/// `slinky.abci.v1.OracleVoteExtension`: currency pair id to big-endian price
#[derive(Clone, PartialEq, prost::Message)]
pub struct OracleVoteExtension {
    #[prost(btree_map = "uint64, bytes", tag = "1")]
    pub prices: BTreeMap<u64, Vec<u8>>,
}
