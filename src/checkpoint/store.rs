use crate::{checkpoint::Checkpoint, store::StoreError};

pub trait CheckpointStore {
    /// Get the stored checkpoint, if any day has been flushed
    fn get_checkpoint(&self) -> Result<Option<Checkpoint>, StoreError>;

    /// Advance the checkpoint.
    ///
    /// Fails without touching the stored value when the height does not
    /// exceed the stored height or the chain id differs.
    fn set_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;
}
