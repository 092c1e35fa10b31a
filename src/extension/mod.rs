//! Oracle vote extension decoding.
//!
//! The first transaction of every block carries the previous height's
//! extended commit info: base64 of a zstd compressed `ExtendedCommitInfo`.
//! Each vote inside holds its own zlib compressed `OracleVoteExtension`.

pub mod pool;
pub mod proto;

use self::proto::{ExtendedCommitInfo, OracleVoteExtension};
use crate::{constants::MAX_DECOMPRESSED_EXTENSION_BYTES, validator::keys};
use data_encoding::BASE64;
use flate2::read::ZlibDecoder;
use prost::Message;
use std::{collections::BTreeMap, io::Read};
use thiserror::Error;
use tracing::{trace, warn};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("vote extension payload is empty")]
    Empty,
    #[error("vote extension payload is not valid base64: {0}")]
    Base64(#[from] data_encoding::DecodeError),
    #[error("zstd decompression failed: {0}")]
    Zstd(#[source] std::io::Error),
    #[error("zlib decompression failed: {0}")]
    Zlib(#[source] std::io::Error),
    #[error("decompressed payload exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("invalid protobuf: {0}")]
    Protobuf(#[from] prost::DecodeError),
}

/// What a single validator's vote says about its oracle participation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleParticipation {
    /// Extension carried this many prices
    Prices(usize),
    /// Extension decoded but carried no prices
    NoPrices,
    /// Vote carried no extension at all
    NoData,
    /// Extension present but could not be decoded
    Undecodable(String),
}

impl OracleParticipation {
    /// `None` when the vote does not allow a determination
    pub fn participated(&self) -> Option<bool> {
        match self {
            Self::Prices(_) => Some(true),
            Self::NoPrices | Self::NoData => Some(false),
            Self::Undecodable(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleVote {
    pub validator_hex: String,
    pub participation: OracleParticipation,
}

/// Oracle determinations of one height keyed by hex consensus address.
/// A missing key means no determination, never a miss.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteExtensionResult {
    determinations: BTreeMap<String, bool>,
}

impl VoteExtensionResult {
    pub fn from_votes(votes: Vec<OracleVote>) -> Self {
        let determinations = votes
            .into_iter()
            .filter_map(|vote| match vote.participation.participated() {
                Some(participated) => Some((vote.validator_hex, participated)),
                None => {
                    warn!(
                        "Undecodable oracle extension from {}: {:?}",
                        vote.validator_hex, vote.participation
                    );
                    None
                }
            })
            .collect();
        Self { determinations }
    }

    pub fn determination(&self, hex: &str) -> Option<bool> {
        self.determinations.get(hex).copied()
    }

    pub fn len(&self) -> usize {
        self.determinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.determinations.is_empty()
    }
}

impl FromIterator<(String, bool)> for VoteExtensionResult {
    fn from_iter<T: IntoIterator<Item = (String, bool)>>(iter: T) -> Self {
        Self {
            determinations: iter.into_iter().collect(),
        }
    }
}

/// Decode a raw vote extension transaction into per validator votes.
///
/// A failure of the outer envelope fails the whole payload; a failure of one
/// vote's inner extension only marks that vote [OracleParticipation::Undecodable].
pub fn decode_vote_extensions(tx: &str) -> Result<Vec<OracleVote>, DecodeError> {
    let tx = tx.trim();
    if tx.is_empty() {
        return Err(DecodeError::Empty);
    }

    let compressed = BASE64.decode(tx.as_bytes())?;
    let decoder =
        zstd::stream::read::Decoder::new(compressed.as_slice()).map_err(DecodeError::Zstd)?;
    let decompressed = read_bounded(
        decoder,
        MAX_DECOMPRESSED_EXTENSION_BYTES,
        DecodeError::Zstd,
    )?;
    let commit_info = ExtendedCommitInfo::decode(decompressed.as_slice())?;
    trace!(
        "Decoded extended commit info with {} votes at round {}",
        commit_info.votes.len(),
        commit_info.round
    );

    let votes = commit_info
        .votes
        .into_iter()
        .filter_map(|vote| {
            let address = vote.validator.map(|v| v.address).unwrap_or_default();
            if address.is_empty() {
                trace!("Skipping vote without validator address");
                return None;
            }

            let participation = if vote.vote_extension.is_empty() {
                OracleParticipation::NoData
            } else {
                match decode_oracle_extension(&vote.vote_extension) {
                    Ok(extension) if extension.prices.is_empty() => OracleParticipation::NoPrices,
                    Ok(extension) => OracleParticipation::Prices(extension.prices.len()),
                    Err(e) => OracleParticipation::Undecodable(e.to_string()),
                }
            };

            Some(OracleVote {
                validator_hex: keys::hex_from_address_bytes(&address),
                participation,
            })
        })
        .collect();
    Ok(votes)
}

/// [decode_vote_extensions] folded into a [VoteExtensionResult]
pub fn decode_vote_extension_result(tx: &str) -> Result<VoteExtensionResult, DecodeError> {
    decode_vote_extensions(tx).map(VoteExtensionResult::from_votes)
}

fn decode_oracle_extension(bytes: &[u8]) -> Result<OracleVoteExtension, DecodeError> {
    let buf = read_bounded(
        ZlibDecoder::new(bytes),
        MAX_DECOMPRESSED_EXTENSION_BYTES,
        DecodeError::Zlib,
    )?;
    Ok(OracleVoteExtension::decode(buf.as_slice())?)
}

/// Drain a decompressing reader, refusing output past `limit` bytes
fn read_bounded<R: Read>(
    reader: R,
    limit: u64,
    io_error: fn(std::io::Error) -> DecodeError,
) -> Result<Vec<u8>, DecodeError> {
    let mut buf = vec![];
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut buf)
        .map_err(io_error)?;
    if buf.len() as u64 > limit {
        return Err(DecodeError::TooLarge { limit });
    }
    Ok(buf)
}
