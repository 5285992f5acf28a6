#![allow(non_snake_case)]

use super::*;
use ethers::types::{
    Address,
    U256,
};
use proptest::prelude::*;

fn roll(outcome: u8) -> RollRecord {
    RollRecord::new(
        Address::from_low_u64_be(0xABC),
        U256::from(2_000_000_000_000_000u64),
        outcome,
    )
    .unwrap()
}

fn hash(n: u64) -> H256 {
    H256::from_low_u64_be(n)
}

fn rolling(machine: &mut GameStateMachine, lane: OperationLane) -> Ticket {
    match machine.apply(MachineEvent::Select(lane)).unwrap().as_slice() {
        [Effect::SubmitWrite { ticket, .. }] => *ticket,
        other => panic!("unexpected effects {other:?}"),
    }
}

#[test]
fn apply__select_from_idle__enters_rolling_and_requests_write() {
    // given
    let mut machine = GameStateMachine::default();

    // when
    let effects = machine
        .apply(MachineEvent::Select(OperationLane::Standard))
        .unwrap();

    // then
    assert_eq!(
        effects,
        vec![Effect::SubmitWrite {
            lane: OperationLane::Standard,
            ticket: 1
        }]
    );
    assert_eq!(machine.active_lane(), Some(OperationLane::Standard));
    assert_eq!(
        machine.lane_status(OperationLane::Standard),
        LifecycleStatus::Submitted
    );
    assert!(!machine.is_actionable());
    assert!(machine.has_rolled());
}

#[test]
fn apply__select_while_rolling__is_rejected_and_state_kept() {
    // given
    let mut machine = GameStateMachine::default();
    rolling(&mut machine, OperationLane::Standard);
    let before = machine.state().clone();

    // when
    let result = machine.apply(MachineEvent::Select(OperationLane::Privileged));

    // then
    assert_eq!(
        result,
        Err(SelectError::Busy {
            requested: OperationLane::Privileged,
            active: OperationLane::Standard,
        })
    );
    assert_eq!(machine.state(), &before);
    assert_eq!(
        machine.lane_status(OperationLane::Privileged),
        LifecycleStatus::Idle
    );
}

#[test]
fn apply__mined_after_submitted__awaits_confirmation() {
    // given
    let mut machine = GameStateMachine::default();
    let ticket = rolling(&mut machine, OperationLane::Standard);

    // when
    machine
        .apply(MachineEvent::Submitted {
            ticket,
            tx_hash: hash(1),
        })
        .unwrap();
    machine.apply(MachineEvent::Mined { ticket }).unwrap();

    // then
    assert_eq!(
        machine.lane_status(OperationLane::Standard),
        LifecycleStatus::AwaitingConfirmation
    );
    assert!(!machine.is_actionable());
}

#[test]
fn apply__roll_grew_while_rolling__resolves_with_newest_roll() {
    // given
    let mut machine = GameStateMachine::default();
    rolling(&mut machine, OperationLane::Standard);

    // when
    let effects = machine
        .apply(MachineEvent::RollGrew {
            newest: roll(11),
            tx_hash: hash(9),
        })
        .unwrap();

    // then
    assert_eq!(
        effects,
        vec![Effect::ShowOutcome {
            lane: OperationLane::Standard,
            outcome: Some(roll(11)),
        }]
    );
    assert_eq!(
        machine.state(),
        &GameState::Resolved {
            lane: OperationLane::Standard,
            outcome: Some(roll(11)),
        }
    );
    assert!(machine.is_actionable());
}

#[test]
fn apply__winner_grew_while_rolling__resolves_with_roll_hint() {
    // given
    let mut machine = GameStateMachine::default();
    rolling(&mut machine, OperationLane::Privileged);

    // when
    machine
        .apply(MachineEvent::WinnerGrew {
            tx_hash: hash(3),
            newest_roll: Some(roll(2)),
        })
        .unwrap();

    // then
    assert_eq!(
        machine.lane_status(OperationLane::Privileged),
        LifecycleStatus::Resolved
    );
}

#[test]
fn apply__roll_grew_after_winner_resolved__replaces_shown_outcome() {
    // given
    let mut machine = GameStateMachine::default();
    rolling(&mut machine, OperationLane::Standard);
    machine
        .apply(MachineEvent::WinnerGrew {
            tx_hash: hash(7),
            newest_roll: Some(roll(6)),
        })
        .unwrap();

    // when
    let effects = machine
        .apply(MachineEvent::RollGrew {
            newest: roll(3),
            tx_hash: hash(7),
        })
        .unwrap();

    // then
    assert_eq!(
        effects,
        vec![Effect::ShowOutcome {
            lane: OperationLane::Standard,
            outcome: Some(roll(3)),
        }]
    );
    assert_eq!(
        machine.state(),
        &GameState::Resolved {
            lane: OperationLane::Standard,
            outcome: Some(roll(3)),
        }
    );
}

#[test]
fn apply__growth_while_idle__changes_nothing() {
    let mut machine = GameStateMachine::default();
    let effects = machine
        .apply(MachineEvent::RollGrew {
            newest: roll(4),
            tx_hash: hash(1),
        })
        .unwrap();
    assert!(effects.is_empty());
    assert_eq!(machine.state(), &GameState::Idle);
}

#[test]
fn apply__rejected__returns_to_idle_with_failure() {
    // given
    let mut machine = GameStateMachine::default();
    let ticket = rolling(&mut machine, OperationLane::Standard);
    let error = SubmissionError::InsufficientBalance {
        lane: OperationLane::Standard,
        detail: "need 0.002".into(),
    };

    // when
    let effects = machine
        .apply(MachineEvent::Rejected {
            ticket,
            error: error.clone(),
        })
        .unwrap();

    // then
    assert_eq!(
        effects,
        vec![Effect::ReportFailure(LaneFailure::Submission(error.clone()))]
    );
    assert_eq!(machine.state(), &GameState::Idle);
    assert_eq!(
        machine.lane_status(OperationLane::Standard),
        LifecycleStatus::Failed
    );
    assert_eq!(
        machine.last_failure(),
        Some(&LaneFailure::Submission(error))
    );
    assert!(machine.is_actionable());
}

#[test]
fn apply__reverted__returns_to_idle_and_allows_other_lane() {
    // given
    let mut machine = GameStateMachine::default();
    let ticket = rolling(&mut machine, OperationLane::Privileged);
    let error = ConfirmationError::Reverted {
        lane: OperationLane::Privileged,
        tx_hash: hash(5),
    };
    machine.apply(MachineEvent::Reverted { ticket, error }).unwrap();

    // when
    let result = machine.apply(MachineEvent::Select(OperationLane::Standard));

    // then
    assert!(result.is_ok());
    assert_eq!(machine.active_lane(), Some(OperationLane::Standard));
    assert_eq!(machine.last_failure(), None);
}

#[test]
fn apply__report_for_stale_ticket__is_ignored() {
    // given
    let mut machine = GameStateMachine::default();
    let first = rolling(&mut machine, OperationLane::Standard);
    machine
        .apply(MachineEvent::RollGrew {
            newest: roll(1),
            tx_hash: hash(1),
        })
        .unwrap();
    let second = rolling(&mut machine, OperationLane::Privileged);
    assert_ne!(first, second);

    // when
    let effects = machine
        .apply(MachineEvent::Reverted {
            ticket: first,
            error: ConfirmationError::Reverted {
                lane: OperationLane::Standard,
                tx_hash: hash(1),
            },
        })
        .unwrap();

    // then
    assert!(effects.is_empty());
    assert_eq!(machine.active_lane(), Some(OperationLane::Privileged));
}

#[test]
fn apply__correlated_growth_from_other_write__does_not_resolve() {
    // given
    let mut machine = GameStateMachine::new(ResolutionPolicy::CorrelatedTransaction);
    let ticket = rolling(&mut machine, OperationLane::Standard);
    machine
        .apply(MachineEvent::Submitted {
            ticket,
            tx_hash: hash(1),
        })
        .unwrap();

    // when
    let effects = machine
        .apply(MachineEvent::RollGrew {
            newest: roll(7),
            tx_hash: hash(2),
        })
        .unwrap();

    // then
    assert!(effects.is_empty());
    assert_eq!(machine.active_lane(), Some(OperationLane::Standard));
}

#[test]
fn apply__correlated_growth_before_hash_known__resolves_on_submitted() {
    // given
    let mut machine = GameStateMachine::new(ResolutionPolicy::CorrelatedTransaction);
    let ticket = rolling(&mut machine, OperationLane::Standard);
    machine
        .apply(MachineEvent::RollGrew {
            newest: roll(12),
            tx_hash: hash(4),
        })
        .unwrap();
    assert_eq!(machine.active_lane(), Some(OperationLane::Standard));

    // when
    let effects = machine
        .apply(MachineEvent::Submitted {
            ticket,
            tx_hash: hash(4),
        })
        .unwrap();

    // then
    assert_eq!(
        effects,
        vec![Effect::ShowOutcome {
            lane: OperationLane::Standard,
            outcome: Some(roll(12)),
        }]
    );
}

fn arb_event() -> impl Strategy<Value = MachineEvent> {
    let lane = prop_oneof![
        Just(OperationLane::Standard),
        Just(OperationLane::Privileged)
    ];
    prop_oneof![
        lane.clone().prop_map(MachineEvent::Select),
        (1u64..6, any::<u64>()).prop_map(|(ticket, h)| MachineEvent::Submitted {
            ticket,
            tx_hash: hash(h % 4),
        }),
        (1u64..6).prop_map(|ticket| MachineEvent::Mined { ticket }),
        (1u64..6, lane.clone()).prop_map(|(ticket, lane)| MachineEvent::Rejected {
            ticket,
            error: SubmissionError::Cancelled { lane },
        }),
        (1u64..6, lane).prop_map(|(ticket, lane)| MachineEvent::Reverted {
            ticket,
            error: ConfirmationError::Reverted {
                lane,
                tx_hash: hash(0),
            },
        }),
        (0u8..16, any::<u64>()).prop_map(|(outcome, h)| MachineEvent::RollGrew {
            newest: roll(outcome),
            tx_hash: hash(h % 4),
        }),
    ]
}

proptest! {
    #[test]
    fn apply__any_event_sequence__never_has_two_lanes_in_flight(
        events in proptest::collection::vec(arb_event(), 0..40),
        correlated in any::<bool>(),
    ) {
        let policy = if correlated {
            ResolutionPolicy::CorrelatedTransaction
        } else {
            ResolutionPolicy::AnyGrowth
        };
        let mut machine = GameStateMachine::new(policy);
        for event in events {
            let was_rolling = !machine.is_actionable();
            let is_select = matches!(event, MachineEvent::Select(_));
            let result = machine.apply(event);
            prop_assert_eq!(result.is_err(), was_rolling && is_select);

            let in_flight = OperationLane::ALL
                .iter()
                .filter(|lane| machine.lane_status(**lane).is_in_flight())
                .count();
            prop_assert!(in_flight <= 1);
        }
    }
}
