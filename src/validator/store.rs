use crate::{store::StoreError, validator::Validator};

pub trait ValidatorStore {
    /// Replace the stored roster
    fn set_validators(&self, validators: &[Validator]) -> Result<(), StoreError>;

    /// Get the stored roster, keyed by hex consensus address
    fn get_validators(&self) -> Result<Vec<Validator>, StoreError>;
}
