use crate::{
    error::{
        ConfirmationError,
        SubmissionError,
    },
    ledger::{
        Ledger,
        Settlement,
    },
    state_machine::{
        MachineEvent,
        OperationLane,
        Ticket,
    },
};
use ethers::types::{
    H256,
    U256,
};
use std::sync::Arc;
use tokio::{
    sync::mpsc::UnboundedSender,
    task::JoinHandle,
};
use tracing::{
    debug,
    info,
};

#[cfg(test)]
mod tests;

/// Progress of one write, tagged with the ticket it was issued under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxReport {
    Submitted {
        lane: OperationLane,
        ticket: Ticket,
        tx_hash: H256,
    },
    Rejected {
        ticket: Ticket,
        error: SubmissionError,
    },
    Mined {
        ticket: Ticket,
        block: u64,
    },
    Reverted {
        ticket: Ticket,
        error: ConfirmationError,
    },
}

impl TxReport {
    pub fn ticket(&self) -> Ticket {
        match self {
            TxReport::Submitted { ticket, .. }
            | TxReport::Rejected { ticket, .. }
            | TxReport::Mined { ticket, .. }
            | TxReport::Reverted { ticket, .. } => *ticket,
        }
    }

    pub fn into_machine_event(self) -> MachineEvent {
        match self {
            TxReport::Submitted {
                ticket, tx_hash, ..
            } => MachineEvent::Submitted { ticket, tx_hash },
            TxReport::Rejected { ticket, error } => MachineEvent::Rejected { ticket, error },
            TxReport::Mined { ticket, .. } => MachineEvent::Mined { ticket },
            TxReport::Reverted { ticket, error } => MachineEvent::Reverted { ticket, error },
        }
    }
}

/// Issues ledger writes and follows each one until it settles.
///
/// Writes are never retried or cancelled. A tracking task outlives the
/// controller if it has to; its reports are dropped once nobody listens.
pub struct TransactionLifecycleController<L> {
    ledger: Arc<L>,
    reports: UnboundedSender<TxReport>,
}

impl<L: Ledger> TransactionLifecycleController<L> {
    pub fn new(ledger: Arc<L>, reports: UnboundedSender<TxReport>) -> Self {
        Self { ledger, reports }
    }

    pub fn submit_standard(&self, ticket: Ticket, wager: U256) -> JoinHandle<()> {
        self.submit(OperationLane::Standard, ticket, wager)
    }

    pub fn submit_privileged(&self, ticket: Ticket) -> JoinHandle<()> {
        self.submit(OperationLane::Privileged, ticket, U256::zero())
    }

    pub fn submit(&self, lane: OperationLane, ticket: Ticket, wager: U256) -> JoinHandle<()> {
        let ledger = self.ledger.clone();
        let reports = self.reports.clone();
        tokio::spawn(track(ledger, lane, ticket, wager, reports))
    }
}

async fn track<L: Ledger>(
    ledger: Arc<L>,
    lane: OperationLane,
    ticket: Ticket,
    wager: U256,
    reports: UnboundedSender<TxReport>,
) {
    let write = match lane {
        OperationLane::Standard => ledger.roll_the_dice(wager).await,
        OperationLane::Privileged => ledger.rigged_roll().await,
    };
    let tx_hash = match write {
        Ok(pending) => pending.tx_hash,
        Err(err) => {
            let error = SubmissionError::from_ledger(lane, err);
            debug!(ticket, %error, "write rejected");
            let _ = reports.send(TxReport::Rejected { ticket, error });
            return;
        }
    };

    info!(%lane, ticket, ?tx_hash, "write submitted");
    if reports
        .send(TxReport::Submitted {
            lane,
            ticket,
            tx_hash,
        })
        .is_err()
    {
        debug!(ticket, "session gone, not tracking settlement");
        return;
    }

    let report = match ledger.settlement(tx_hash).await {
        Ok(Settlement::Mined { block }) => TxReport::Mined { ticket, block },
        Ok(Settlement::Reverted { .. }) => TxReport::Reverted {
            ticket,
            error: ConfirmationError::Reverted { lane, tx_hash },
        },
        Err(err) => TxReport::Reverted {
            ticket,
            error: ConfirmationError::Unknown {
                lane,
                tx_hash,
                detail: err.to_string(),
            },
        },
    };
    if reports.send(report).is_err() {
        debug!(ticket, ?tx_hash, "settled after session ended");
    }
}
