use crate::{
    error::{
        ConfirmationError,
        LaneFailure,
        SelectError,
        SubmissionError,
    },
    records::RollRecord,
};
use ethers::types::H256;
use std::{
    collections::VecDeque,
    fmt,
};

#[cfg(test)]
mod tests;

/// Growth seen before the in-flight write's hash was known.
const EARLY_GROWTH_LIMIT: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationLane {
    /// A wagered `rollTheDice` from the player's account.
    Standard,
    /// `riggedRoll` through the privileged contract.
    Privileged,
}

impl OperationLane {
    pub const ALL: [OperationLane; 2] = [OperationLane::Standard, OperationLane::Privileged];
}

impl fmt::Display for OperationLane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationLane::Standard => f.write_str("standard roll"),
            OperationLane::Privileged => f.write_str("rigged roll"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleStatus {
    Idle,
    Submitted,
    AwaitingConfirmation,
    Resolved,
    Failed,
}

impl LifecycleStatus {
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            LifecycleStatus::Submitted | LifecycleStatus::AwaitingConfirmation
        )
    }
}

/// Which stream growth ends a roll.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResolutionPolicy {
    /// Any live growth of either stream resolves the rolling lane.
    #[default]
    AnyGrowth,
    /// Only growth emitted by the in-flight write resolves it.
    CorrelatedTransaction,
}

pub type Ticket = u64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InFlight {
    pub lane: OperationLane,
    pub ticket: Ticket,
    pub status: LifecycleStatus,
    pub tx_hash: Option<H256>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameState {
    Idle,
    Rolling(InFlight),
    Resolved {
        lane: OperationLane,
        /// Newest roll known when the lane resolved.
        outcome: Option<RollRecord>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MachineEvent {
    Select(OperationLane),
    Submitted {
        ticket: Ticket,
        tx_hash: H256,
    },
    Rejected {
        ticket: Ticket,
        error: SubmissionError,
    },
    Mined {
        ticket: Ticket,
    },
    Reverted {
        ticket: Ticket,
        error: ConfirmationError,
    },
    /// A live roll record was appended.
    RollGrew {
        newest: RollRecord,
        tx_hash: H256,
    },
    /// A live winner record was appended.
    WinnerGrew {
        tx_hash: H256,
        newest_roll: Option<RollRecord>,
    },
}

/// Work the owner of the machine must carry out after a transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    SubmitWrite {
        lane: OperationLane,
        ticket: Ticket,
    },
    ShowOutcome {
        lane: OperationLane,
        outcome: Option<RollRecord>,
    },
    ReportFailure(LaneFailure),
}

pub type Transition = Result<Vec<Effect>, SelectError>;

/// Single presentation surface shared by both lanes.
///
/// At most one lane is ever rolling: a selection while rolling is refused
/// rather than queued. Every change goes through [`GameStateMachine::apply`].
#[derive(Clone, Debug)]
pub struct GameStateMachine {
    state: GameState,
    policy: ResolutionPolicy,
    next_ticket: Ticket,
    last_failure: Option<LaneFailure>,
    rolled: bool,
    early_growth: VecDeque<(H256, Option<RollRecord>)>,
}

impl Default for GameStateMachine {
    fn default() -> Self {
        Self::new(ResolutionPolicy::default())
    }
}

impl GameStateMachine {
    pub fn new(policy: ResolutionPolicy) -> Self {
        Self {
            state: GameState::Idle,
            policy,
            next_ticket: 1,
            last_failure: None,
            rolled: false,
            early_growth: VecDeque::new(),
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    pub fn last_failure(&self) -> Option<&LaneFailure> {
        self.last_failure.as_ref()
    }

    /// Whether any roll was started in this session.
    pub fn has_rolled(&self) -> bool {
        self.rolled
    }

    pub fn is_actionable(&self) -> bool {
        !matches!(self.state, GameState::Rolling(_))
    }

    pub fn active_lane(&self) -> Option<OperationLane> {
        match &self.state {
            GameState::Rolling(in_flight) => Some(in_flight.lane),
            _ => None,
        }
    }

    pub fn lane_status(&self, lane: OperationLane) -> LifecycleStatus {
        match &self.state {
            GameState::Rolling(in_flight) if in_flight.lane == lane => in_flight.status,
            GameState::Resolved { lane: resolved, .. } if *resolved == lane => {
                LifecycleStatus::Resolved
            }
            _ if self
                .last_failure
                .as_ref()
                .is_some_and(|failure| failure.lane() == lane) =>
            {
                LifecycleStatus::Failed
            }
            _ => LifecycleStatus::Idle,
        }
    }

    pub fn apply(&mut self, event: MachineEvent) -> Transition {
        match event {
            MachineEvent::Select(lane) => self.select(lane),
            MachineEvent::Submitted { ticket, tx_hash } => Ok(self.submitted(ticket, tx_hash)),
            MachineEvent::Rejected { ticket, error } => Ok(self.fail(ticket, error.into())),
            MachineEvent::Mined { ticket } => {
                if let Some(in_flight) = self.in_flight_mut(ticket) {
                    if in_flight.status == LifecycleStatus::Submitted {
                        in_flight.status = LifecycleStatus::AwaitingConfirmation;
                    }
                }
                Ok(Vec::new())
            }
            MachineEvent::Reverted { ticket, error } => Ok(self.fail(ticket, error.into())),
            MachineEvent::RollGrew { newest, tx_hash } => {
                if let GameState::Resolved { lane, outcome } = &mut self.state {
                    // a roll landing after the lane resolved is the one to show
                    *outcome = Some(newest.clone());
                    return Ok(vec![Effect::ShowOutcome {
                        lane: *lane,
                        outcome: Some(newest),
                    }]);
                }
                Ok(self.grew(tx_hash, Some(newest)))
            }
            MachineEvent::WinnerGrew {
                tx_hash,
                newest_roll,
            } => Ok(self.grew(tx_hash, newest_roll)),
        }
    }

    fn select(&mut self, lane: OperationLane) -> Transition {
        if let GameState::Rolling(in_flight) = &self.state {
            return Err(SelectError::Busy {
                requested: lane,
                active: in_flight.lane,
            });
        }
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.state = GameState::Rolling(InFlight {
            lane,
            ticket,
            status: LifecycleStatus::Submitted,
            tx_hash: None,
        });
        self.last_failure = None;
        self.rolled = true;
        self.early_growth.clear();
        Ok(vec![Effect::SubmitWrite { lane, ticket }])
    }

    fn in_flight_mut(&mut self, ticket: Ticket) -> Option<&mut InFlight> {
        match &mut self.state {
            GameState::Rolling(in_flight) if in_flight.ticket == ticket => Some(in_flight),
            _ => None,
        }
    }

    fn submitted(&mut self, ticket: Ticket, tx_hash: H256) -> Vec<Effect> {
        let Some(in_flight) = self.in_flight_mut(ticket) else {
            return Vec::new();
        };
        in_flight.tx_hash = Some(tx_hash);
        if self.policy != ResolutionPolicy::CorrelatedTransaction {
            return Vec::new();
        }
        let early = self
            .early_growth
            .iter()
            .position(|(hash, _)| *hash == tx_hash)
            .and_then(|index| self.early_growth.remove(index));
        match early {
            Some((_, outcome)) => self.resolve(outcome),
            None => Vec::new(),
        }
    }

    fn fail(&mut self, ticket: Ticket, failure: LaneFailure) -> Vec<Effect> {
        if self.in_flight_mut(ticket).is_none() {
            return Vec::new();
        }
        self.state = GameState::Idle;
        self.last_failure = Some(failure.clone());
        vec![Effect::ReportFailure(failure)]
    }

    fn grew(&mut self, tx_hash: H256, outcome: Option<RollRecord>) -> Vec<Effect> {
        let GameState::Rolling(in_flight) = &self.state else {
            return Vec::new();
        };
        match (self.policy, in_flight.tx_hash) {
            (ResolutionPolicy::AnyGrowth, _) => self.resolve(outcome),
            (ResolutionPolicy::CorrelatedTransaction, Some(expected)) if expected == tx_hash => {
                self.resolve(outcome)
            }
            (ResolutionPolicy::CorrelatedTransaction, Some(_)) => Vec::new(),
            (ResolutionPolicy::CorrelatedTransaction, None) => {
                if self.early_growth.len() == EARLY_GROWTH_LIMIT {
                    self.early_growth.pop_front();
                }
                self.early_growth.push_back((tx_hash, outcome));
                Vec::new()
            }
        }
    }

    fn resolve(&mut self, outcome: Option<RollRecord>) -> Vec<Effect> {
        let GameState::Rolling(in_flight) = &self.state else {
            return Vec::new();
        };
        let lane = in_flight.lane;
        self.state = GameState::Resolved {
            lane,
            outcome: outcome.clone(),
        };
        self.early_growth.clear();
        vec![Effect::ShowOutcome { lane, outcome }]
    }
}
