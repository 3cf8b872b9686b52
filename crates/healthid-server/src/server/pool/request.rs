use healthid::{Actor, Hid, IssuedBlock, Result};
use tokio::sync::oneshot;

/// Which path a block request takes through the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOwner {
    Mci,
    Organization(String),
}

/// A message sent from the worker pool to an individual worker task.
///
/// Every variant carries a one-shot channel on which the worker reports the
/// outcome back to the waiting handler.
#[derive(Debug)]
pub enum WorkRequest {
    /// Issue up to `count` HIDs for `owner` from the sub-block at `start`.
    Block {
        owner: BlockOwner,
        start: u64,
        count: u64,
        actor: Actor,
        response: oneshot::Sender<Result<IssuedBlock>>,
    },

    /// Issue the largest allowed block from the next MCI sub-block with
    /// capacity.
    Generate {
        actor: Actor,
        response: oneshot::Sender<Result<IssuedBlock>>,
    },

    /// Serve the next page of the MCI pool.
    Page {
        size: Option<usize>,
        response: oneshot::Sender<Result<Vec<Hid>>>,
    },

    /// Move the MCI pool cursor back to the beginning.
    ResetCursor {
        response: oneshot::Sender<Result<()>>,
    },

    /// Request the worker to shut down gracefully.
    ///
    /// - `response`: One-shot channel for acknowledging that the worker has
    ///   completed its shutdown routine.
    Shutdown { response: oneshot::Sender<()> },
}
