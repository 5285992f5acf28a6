//! Client-side reconciliation for the dice table.
//!
//! A [`session::DiceSession`] owns two [`watcher::EventStreamWatcher`]s (one per
//! ledger topic), the [`state_machine::GameStateMachine`] that drives the shared
//! presentation surface, and the [`transactions::TransactionLifecycleController`]
//! that issues ledger writes. All mutation happens inside the session's
//! `next_update` turn; watchers and writes only talk to it through channels.

pub mod config;
pub mod error;
pub mod history;
pub mod ledger;
pub mod records;
pub mod session;
pub mod state_machine;
pub mod transactions;
pub mod watcher;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use config::SessionConfig;
pub use error::{
    ConfirmationError,
    LaneFailure,
    LedgerError,
    OwnershipTransferError,
    SelectError,
    SubmissionError,
    WatcherError,
};
pub use ledger::Ledger;
pub use records::{
    Notification,
    NotificationId,
    RollRecord,
    Topic,
    WinnerRecord,
};
pub use session::DiceSession;
pub use state_machine::{
    GameState,
    LifecycleStatus,
    OperationLane,
    ResolutionPolicy,
};
