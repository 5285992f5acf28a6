#![allow(non_snake_case)]

use super::*;
use crate::{
    error::LedgerError,
    test_helpers::{
        FakeLedger,
        WriteKind,
        WriteOutcome,
    },
};
use tokio::sync::mpsc;

fn controller() -> (
    Arc<FakeLedger>,
    TransactionLifecycleController<FakeLedger>,
    mpsc::UnboundedReceiver<TxReport>,
) {
    let ledger = Arc::new(FakeLedger::new());
    let (tx, rx) = mpsc::unbounded_channel();
    let controller = TransactionLifecycleController::new(ledger.clone(), tx);
    (ledger, controller, rx)
}

#[tokio::test]
async fn submit_standard__mined__reports_submitted_then_mined() {
    // given
    let (ledger, controller, mut reports) = controller();
    let wager = U256::from(2_000_000_000_000_000u64);

    // when
    controller.submit_standard(1, wager).await.unwrap();

    // then
    let write = &ledger.writes()[0];
    assert_eq!(write.kind, WriteKind::RollTheDice);
    assert_eq!(write.wager, wager);
    assert_eq!(
        reports.recv().await,
        Some(TxReport::Submitted {
            lane: OperationLane::Standard,
            ticket: 1,
            tx_hash: write.tx_hash,
        })
    );
    assert!(matches!(
        reports.recv().await,
        Some(TxReport::Mined { ticket: 1, .. })
    ));
}

#[tokio::test]
async fn submit_privileged__calls_rigged_roll_without_value() {
    let (ledger, controller, _reports) = controller();
    controller.submit_privileged(4).await.unwrap();
    let writes = ledger.writes();
    assert_eq!(writes[0].kind, WriteKind::RiggedRoll);
    assert_eq!(writes[0].wager, U256::zero());
}

#[tokio::test]
async fn submit__insufficient_funds__reports_typed_rejection_only() {
    // given
    let (ledger, controller, mut reports) = controller();
    ledger.push_outcome(WriteOutcome::Rejected(LedgerError::InsufficientBalance(
        "balance 0".into(),
    )));

    // when
    controller.submit_standard(2, U256::from(1u64)).await.unwrap();

    // then
    assert_eq!(
        reports.recv().await,
        Some(TxReport::Rejected {
            ticket: 2,
            error: SubmissionError::InsufficientBalance {
                lane: OperationLane::Standard,
                detail: "balance 0".into(),
            },
        })
    );
    assert!(ledger.writes().is_empty());
    assert!(reports.try_recv().is_err());
}

#[tokio::test]
async fn submit__reverted__reports_confirmation_error() {
    // given
    let (ledger, controller, mut reports) = controller();
    ledger.push_outcome(WriteOutcome::Reverted);

    // when
    controller.submit_privileged(3).await.unwrap();

    // then
    let tx_hash = ledger.last_tx_hash().unwrap();
    let _submitted = reports.recv().await;
    assert_eq!(
        reports.recv().await,
        Some(TxReport::Reverted {
            ticket: 3,
            error: ConfirmationError::Reverted {
                lane: OperationLane::Privileged,
                tx_hash,
            },
        })
    );
}

#[tokio::test]
async fn submit__settlement_lookup_fails__reports_unknown() {
    // given
    let (ledger, controller, mut reports) = controller();
    ledger.push_outcome(WriteOutcome::SettlementFails(LedgerError::Unavailable(
        "receipt timeout".into(),
    )));

    // when
    controller.submit_standard(5, U256::one()).await.unwrap();

    // then
    let _submitted = reports.recv().await;
    let report = reports.recv().await.unwrap();
    assert!(matches!(
        report,
        TxReport::Reverted {
            ticket: 5,
            error: ConfirmationError::Unknown { .. },
        }
    ));
}

#[tokio::test]
async fn submit__settles_after_listener_dropped__finishes_quietly() {
    // given
    let (ledger, controller, mut reports) = controller();
    ledger.hold_settlements();
    let task = controller.submit_standard(6, U256::one());
    assert!(matches!(
        reports.recv().await,
        Some(TxReport::Submitted { ticket: 6, .. })
    ));

    // when
    drop(reports);
    drop(controller);
    ledger.release_settlements();

    // then
    task.await.unwrap();
}

#[test]
fn into_machine_event__keeps_ticket() {
    let report = TxReport::Mined {
        ticket: 9,
        block: 100,
    };
    assert_eq!(report.ticket(), 9);
    assert_eq!(
        report.into_machine_event(),
        MachineEvent::Mined { ticket: 9 }
    );
}
