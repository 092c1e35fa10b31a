use bech32::{ToBase32, Variant};
use data_encoding::{BASE64, HEXUPPER};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of a tendermint consensus address in bytes
pub const CONSENSUS_ADDRESS_LEN: usize = 20;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("consensus public key is not valid base64: {0}")]
    Base64(#[from] data_encoding::DecodeError),
    #[error("bech32 error: {0}")]
    Bech32(#[from] bech32::Error),
    #[error("{0} is not a validator operator address")]
    NotValoper(String),
}

/// Hex consensus address: the first 20 bytes of `sha256(pubkey)`, uppercase hex
pub fn consensus_hex(pubkey: &[u8]) -> String {
    HEXUPPER.encode(&consensus_address(pubkey))
}

/// Same as [consensus_hex] with a base64 encoded public key
pub fn consensus_hex_from_base64(pubkey: &str) -> Result<String, KeyError> {
    Ok(consensus_hex(&BASE64.decode(pubkey.as_bytes())?))
}

/// Bech32 `<prefix>valcons` address of a base64 encoded consensus public key
pub fn valcons_from_base64(pubkey: &str, address_prefix: &str) -> Result<String, KeyError> {
    let address = consensus_address(&BASE64.decode(pubkey.as_bytes())?);
    Ok(bech32::encode(
        &format!("{address_prefix}valcons"),
        address.to_base32(),
        Variant::Bech32,
    )?)
}

/// Account ("wallet") address sharing the operator address' key bytes
pub fn wallet_from_valoper(valoper: &str) -> Result<String, KeyError> {
    let (hrp, data, variant) = bech32::decode(valoper)?;
    if !hrp.contains("valoper") {
        return Err(KeyError::NotValoper(valoper.to_string()));
    }
    Ok(bech32::encode(&hrp.replace("valoper", ""), data, variant)?)
}

/// Hex form of raw address bytes, e.g. the validator address in a vote
pub fn hex_from_address_bytes(address: &[u8]) -> String {
    HEXUPPER.encode(address)
}

/// Commit signatures report hex addresses already; nodes differ on case
pub fn normalize_hex(address: &str) -> String {
    address.trim().to_ascii_uppercase()
}

fn consensus_address(pubkey: &[u8]) -> Vec<u8> {
    Sha256::digest(pubkey)[..CONSENSUS_ADDRESS_LEN].to_vec()
}
