use crate::{
    records::Topic,
    state_machine::OperationLane,
};
use ethers::types::{
    Address,
    H256,
};
use thiserror::Error;

/// Failure reported by a [`crate::Ledger`] call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("request was cancelled by the signer")]
    Cancelled,
    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),
    #[error("execution reverted: {0}")]
    Reverted(String),
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    #[error("malformed ledger data: {0}")]
    Malformed(String),
}

/// A write that never made it onto the ledger.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("{lane} write was cancelled")]
    Cancelled { lane: OperationLane },
    #[error("{lane} write needs more funds: {detail}")]
    InsufficientBalance { lane: OperationLane, detail: String },
    #[error("{lane} write would revert: {reason}")]
    PreflightReverted { lane: OperationLane, reason: String },
    #[error("{lane} write could not reach the ledger: {detail}")]
    Unavailable { lane: OperationLane, detail: String },
}

impl SubmissionError {
    pub fn from_ledger(lane: OperationLane, err: LedgerError) -> Self {
        match err {
            LedgerError::Cancelled => SubmissionError::Cancelled { lane },
            LedgerError::InsufficientBalance(detail) => {
                SubmissionError::InsufficientBalance { lane, detail }
            }
            LedgerError::Reverted(reason) => {
                SubmissionError::PreflightReverted { lane, reason }
            }
            LedgerError::Unavailable(detail) | LedgerError::Malformed(detail) => {
                SubmissionError::Unavailable { lane, detail }
            }
        }
    }

    pub fn lane(&self) -> OperationLane {
        match self {
            SubmissionError::Cancelled { lane }
            | SubmissionError::InsufficientBalance { lane, .. }
            | SubmissionError::PreflightReverted { lane, .. }
            | SubmissionError::Unavailable { lane, .. } => *lane,
        }
    }
}

/// A write that was broadcast but did not settle successfully.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfirmationError {
    #[error("{lane} write {tx_hash:?} reverted")]
    Reverted { lane: OperationLane, tx_hash: H256 },
    #[error("{lane} write {tx_hash:?} has unknown settlement: {detail}")]
    Unknown {
        lane: OperationLane,
        tx_hash: H256,
        detail: String,
    },
}

impl ConfirmationError {
    pub fn lane(&self) -> OperationLane {
        match self {
            ConfirmationError::Reverted { lane, .. }
            | ConfirmationError::Unknown { lane, .. } => *lane,
        }
    }

    pub fn tx_hash(&self) -> H256 {
        match self {
            ConfirmationError::Reverted { tx_hash, .. }
            | ConfirmationError::Unknown { tx_hash, .. } => *tx_hash,
        }
    }
}

/// A watcher gave up after exhausting its retries.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{topic} stream stalled after {attempts} attempts")]
pub struct WatcherError {
    pub topic: Topic,
    pub attempts: u32,
    #[source]
    pub source: LedgerError,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("transferring ownership of {contract:?} to {new_owner:?} failed: {detail}")]
pub struct OwnershipTransferError {
    pub contract: Address,
    pub new_owner: Address,
    pub detail: String,
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SelectError {
    #[error("cannot start {requested}: {active} is still rolling")]
    Busy {
        requested: OperationLane,
        active: OperationLane,
    },
}

/// What the session surfaces when a lane falls back to idle without resolving.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LaneFailure {
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),
}

impl LaneFailure {
    pub fn lane(&self) -> OperationLane {
        match self {
            LaneFailure::Submission(err) => err.lane(),
            LaneFailure::Confirmation(err) => err.lane(),
        }
    }
}
