pub mod store;

use self::store::SlashStore;
use crate::{
    client::{responses::SlashEvent, ChainClient, ChainClientError},
    store::StoreError,
    validator::Validator,
};
use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

/// A height at which a validator was slashed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashRecord {
    pub height: u64,
    pub time: DateTime<Utc>,
}

impl From<SlashEvent> for SlashRecord {
    fn from(event: SlashEvent) -> Self {
        Self {
            height: event.height,
            time: event.time,
        }
    }
}

#[derive(Debug, Error)]
pub enum SlashingError {
    #[error("slash search for {valoper} failed: {source}")]
    Client {
        valoper: String,
        #[source]
        source: ChainClientError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Record the operator's slash events, skipping heights already stored.
/// Returns the number of new records.
pub fn record_slash_events<S: SlashStore>(
    store: &S,
    valoper: &str,
    events: impl IntoIterator<Item = SlashEvent>,
) -> Result<usize, StoreError> {
    let mut added = 0;
    for event in events {
        if store.add_slash(valoper, &event.into())? {
            added += 1;
        }
    }
    Ok(added)
}

/// Search every roster validator's slash events and store the new ones
#[instrument(skip_all)]
pub async fn refresh_slashes<S: SlashStore>(
    client: &ChainClient,
    store: &S,
    validators: &[Validator],
) -> Result<usize, SlashingError> {
    let mut total = 0;
    for validator in validators {
        let events = client
            .get_slashing_events(&validator.valcons)
            .await
            .map_err(|source| SlashingError::Client {
                valoper: validator.valoper.clone(),
                source,
            })?;
        let found = events.len();
        let added = record_slash_events(store, &validator.valoper, events)?;
        debug!(
            "{} ({}): {found} slash events, {added} new",
            validator.moniker, validator.valoper
        );
        total += added;
    }
    info!(
        "Recorded {total} new slash events across {} validators",
        validators.len()
    );
    Ok(total)
}
