#![allow(non_snake_case)]

use super::*;
use dice_client::{
    LifecycleStatus,
    test_helpers::FakeLedger,
    watcher::RetryPolicy,
};
use tokio::time::timeout;

const WAGER: u64 = 2_000_000_000_000_000;

fn player() -> Address {
    Address::from_low_u64_be(0xABC)
}

async fn step(controller: &mut AppController<FakeLedger>) -> bool {
    timeout(Duration::from_secs(30), controller.next_update())
        .await
        .expect("session went quiet")
}

async fn live_controller(
    ledger: &Arc<FakeLedger>,
    config: SessionConfig,
) -> AppController<FakeLedger> {
    let mut controller = AppController::new(DiceSession::start(ledger.clone(), config), player());
    loop {
        let snap = controller.snapshot().session;
        if snap.roll_stream == StreamStatus::Live && snap.winner_stream == StreamStatus::Live {
            return controller;
        }
        step(&mut controller).await;
    }
}

#[tokio::test(start_paused = true)]
async fn roll__second_lane_while_rolling__surfaces_busy_error() {
    // given
    let ledger = Arc::new(FakeLedger::new());
    ledger.hold_settlements();
    let mut controller = live_controller(&ledger, SessionConfig::default()).await;

    // when
    controller.roll(OperationLane::Standard);
    controller.roll(OperationLane::Privileged);

    // then
    let snap = controller.snapshot();
    assert_eq!(snap.errors.len(), 1);
    assert!(snap.errors[0].contains("rigged roll"));
    assert!(snap.session.standard.is_in_flight());
    assert!(!snap.session.actionable);
}

#[tokio::test(start_paused = true)]
async fn next_update__live_roll_after_mined__reports_resolution() {
    // given
    let ledger = Arc::new(FakeLedger::new());
    let mut controller = live_controller(&ledger, SessionConfig::default()).await;
    controller.roll(OperationLane::Standard);
    while controller.snapshot().session.standard != LifecycleStatus::AwaitingConfirmation {
        step(&mut controller).await;
    }

    // when
    let tx_hash = ledger.last_tx_hash().unwrap();
    ledger.emit_roll(tx_hash, player(), U256::from(WAGER), 12);
    while !controller.snapshot().status.contains("resolved") {
        step(&mut controller).await;
    }

    // then
    let snap = controller.snapshot();
    assert_eq!(snap.status, "standard roll resolved: C");
    assert!(controller.balances_stale());
    assert!(snap.session.actionable);
    assert_eq!(snap.session.rolls.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn next_update__stream_stalls__surfaces_error() {
    // given
    let ledger = Arc::new(FakeLedger::new());
    ledger.fail_next_subscribes(100);
    let config = SessionConfig::default().with_retry(RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(20),
    });
    let mut controller = AppController::new(DiceSession::start(ledger.clone(), config), player());

    // when
    while controller.snapshot().errors.len() < 2 {
        step(&mut controller).await;
    }

    // then
    let errors = controller.snapshot().errors;
    assert!(errors.iter().any(|e| e.contains("Roll stream stalled")));
    assert!(errors.iter().any(|e| e.contains("Winner stream stalled")));
}

#[tokio::test(start_paused = true)]
async fn refresh_balances__reads_prize_and_both_balances() {
    // given
    let ledger = Arc::new(FakeLedger::new());
    ledger.set_prize(U256::from(WAGER * 5));
    ledger.set_balance(player(), U256::exp10(18));
    ledger.set_balance(ledger.rigged_roll_address(), U256::from(WAGER));
    let mut controller = live_controller(&ledger, SessionConfig::default()).await;

    // when
    controller.refresh_balances().await;

    // then
    let snap = controller.snapshot();
    assert!(!controller.balances_stale());
    assert_eq!(snap.prize, Some(U256::from(WAGER * 5)));
    assert_eq!(snap.wallet_balance.unwrap().raw, U256::exp10(18));
    assert_eq!(snap.rigged_roll_balance.unwrap().raw, U256::from(WAGER));
    assert_eq!(snap.rigged_roll, Address::from_low_u64_be(0x5157));
}

#[tokio::test(start_paused = true)]
async fn push_error__over_limit__keeps_newest() {
    // given
    let ledger = Arc::new(FakeLedger::new());
    let mut controller = AppController::new(
        DiceSession::start(ledger, SessionConfig::default()),
        player(),
    );

    // when
    for i in 0..(MAX_ERRORS + 3) {
        controller.push_error(format!("error {i}"));
    }

    // then
    let errors = controller.snapshot().errors;
    assert_eq!(errors.len(), MAX_ERRORS);
    assert_eq!(errors.last().map(String::as_str), Some("error 7"));
    assert_eq!(errors.first().map(String::as_str), Some("error 3"));
}
