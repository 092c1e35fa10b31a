use crate::{governance::ProposalVotes, store::StoreError};
use std::collections::BTreeSet;

pub trait GovernanceStore {
    /// Store the votes on a proposal; `false` if the proposal is already stored
    fn add_proposal_votes(&self, votes: &ProposalVotes) -> Result<bool, StoreError>;

    fn get_proposal_votes(&self, proposal_id: u64) -> Result<Option<ProposalVotes>, StoreError>;

    /// Ids of the proposals whose votes are stored
    fn get_processed_proposals(&self) -> Result<BTreeSet<u64>, StoreError>;

    /// All stored proposals, ascending by id
    fn list_proposal_votes(&self) -> Result<Vec<ProposalVotes>, StoreError>;
}
