use super::{decode_vote_extension_result, DecodeError, VoteExtensionResult};
use rayon::prelude::*;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to build decode worker pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),
    #[error("decode worker exited before returning results")]
    WorkerLost,
}

pub type DecodeOutcome = (u64, Result<VoteExtensionResult, DecodeError>);

/// Worker pool for vote extension decoding, kept off the I/O runtime.
///
/// Zero workers decodes inline on the calling task.
#[derive(Clone)]
pub struct DecodePool {
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl DecodePool {
    pub fn new(workers: usize) -> Result<Self, PoolError> {
        if workers == 0 {
            return Ok(Self::inline());
        }

        debug!("Starting decode pool with {workers} workers");
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("extension-decoder-{i}"))
            .build()?;
        Ok(Self {
            pool: Some(Arc::new(pool)),
        })
    }

    pub fn inline() -> Self {
        Self { pool: None }
    }

    /// Available cores minus the one driving network I/O
    pub fn default_workers() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1).max(1))
            .unwrap_or(1)
    }

    pub fn workers(&self) -> usize {
        self.pool
            .as_ref()
            .map(|pool| pool.current_num_threads())
            .unwrap_or(0)
    }

    /// Decode a window of `(height, raw tx)` pairs, preserving input order.
    /// Each height's outcome is independent of the others.
    pub async fn decode_window(
        &self,
        txs: Vec<(u64, String)>,
    ) -> Result<Vec<DecodeOutcome>, PoolError> {
        let Some(pool) = &self.pool else {
            return Ok(txs.into_iter().map(decode_one).collect());
        };

        let (sender, receiver) = oneshot::channel();
        pool.spawn(move || {
            let outcomes: Vec<DecodeOutcome> = txs.into_par_iter().map(decode_one).collect();
            let _ = sender.send(outcomes);
        });
        receiver.await.map_err(|_| PoolError::WorkerLost)
    }
}

fn decode_one((height, tx): (u64, String)) -> DecodeOutcome {
    (height, decode_vote_extension_result(&tx))
}
