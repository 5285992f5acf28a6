use crate::{
    config::SessionConfig,
    error::{
        LaneFailure,
        LedgerError,
        SelectError,
        WatcherError,
    },
    history::BoundedHistory,
    ledger::{
        Balance,
        Ledger,
    },
    records::{
        LedgerEvent,
        Notification,
        RecordLog,
        RollRecord,
        Topic,
        WinnerRecord,
    },
    state_machine::{
        Effect,
        GameState,
        GameStateMachine,
        LifecycleStatus,
        MachineEvent,
        OperationLane,
    },
    transactions::{
        TransactionLifecycleController,
        TxReport,
    },
    watcher::{
        Delivery,
        EventStreamWatcher,
        WatcherEvent,
        WatcherHandle,
    },
};
use ethers::types::{
    Address,
    U256,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{
    debug,
    error,
    info,
    trace,
    warn,
};


#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamStatus {
    Replaying,
    Live,
    Resubscribing { attempt: u32 },
    Stalled(WatcherError),
}

/// Something the presentation layer should redraw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionUpdate {
    RollsChanged,
    WinnersChanged,
    Stream {
        topic: Topic,
        status: StreamStatus,
    },
    Lane {
        lane: OperationLane,
        status: LifecycleStatus,
    },
    Resolved {
        lane: OperationLane,
        outcome: Option<RollRecord>,
    },
    Failure(LaneFailure),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Newest first.
    pub rolls: Vec<RollRecord>,
    /// Newest first.
    pub winners: Vec<WinnerRecord>,
    pub state: GameState,
    pub standard: LifecycleStatus,
    pub privileged: LifecycleStatus,
    pub actionable: bool,
    pub rolled: bool,
    pub last_outcome_label: String,
    pub last_failure: Option<LaneFailure>,
    pub roll_stream: StreamStatus,
    pub winner_stream: StreamStatus,
}

/// One player's view of the dice table.
///
/// Both watchers are started by [`DiceSession::start`] and stopped when the
/// session is dropped. Writes already broadcast keep settling in the
/// background, but nothing they report reaches a dropped session.
pub struct DiceSession<L: Ledger> {
    ledger: Arc<L>,
    config: SessionConfig,
    machine: GameStateMachine,
    controller: TransactionLifecycleController<L>,
    rolls: RecordLog<RollRecord>,
    winners: RecordLog<WinnerRecord>,
    roll_view: BoundedHistory<RollRecord>,
    winner_view: BoundedHistory<WinnerRecord>,
    roll_stream: StreamStatus,
    winner_stream: StreamStatus,
    watcher_events: mpsc::UnboundedReceiver<WatcherEvent>,
    watchers_open: bool,
    reports: mpsc::UnboundedReceiver<TxReport>,
    _watchers: [WatcherHandle; 2],
}

impl<L: Ledger> DiceSession<L> {
    pub fn start(ledger: Arc<L>, config: SessionConfig) -> Self {
        let (watcher_tx, watcher_events) = mpsc::unbounded_channel();
        let (report_tx, reports) = mpsc::unbounded_channel();

        let watchers = [Topic::Roll, Topic::Winner].map(|topic| {
            EventStreamWatcher::new(
                ledger.clone(),
                topic,
                config.from_block,
                config.retry.clone(),
            )
            .spawn(watcher_tx.clone())
        });
        info!(from_block = config.from_block, policy = ?config.resolution, "session started");

        Self {
            controller: TransactionLifecycleController::new(ledger.clone(), report_tx),
            machine: GameStateMachine::new(config.resolution),
            rolls: RecordLog::new(),
            winners: RecordLog::new(),
            roll_view: BoundedHistory::new(config.history_capacity),
            winner_view: BoundedHistory::new(config.history_capacity),
            roll_stream: StreamStatus::Replaying,
            winner_stream: StreamStatus::Replaying,
            watcher_events,
            watchers_open: true,
            reports,
            _watchers: watchers,
            ledger,
            config,
        }
    }

    /// Starts a roll on `lane`, or refuses if another roll is still going.
    pub fn select(&mut self, lane: OperationLane) -> Result<Vec<SessionUpdate>, SelectError> {
        let before = self.lane_statuses();
        let effects = self.machine.apply(MachineEvent::Select(lane)).inspect_err(|err| {
            debug!(%err, "selection refused");
        })?;
        let mut updates = Vec::new();
        self.execute(effects, &mut updates);
        self.push_lane_changes(before, &mut updates);
        Ok(updates)
    }

    /// Waits for the next watcher or transaction message and applies it.
    ///
    /// May return an empty batch when the message changed nothing visible.
    pub async fn next_update(&mut self) -> Vec<SessionUpdate> {
        tokio::select! {
            event = self.watcher_events.recv(), if self.watchers_open => match event {
                Some(event) => self.on_watcher_event(event),
                None => {
                    self.watchers_open = false;
                    Vec::new()
                }
            },
            Some(report) = self.reports.recv() => self.on_report(report),
        }
    }

    /// Folds one notification into the record sets and, for live growth,
    /// into the state machine. Re-delivery of a known notification is a no-op.
    pub fn reconcile(
        &mut self,
        delivery: Delivery,
        notification: Notification,
    ) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        let Notification { id, tx_hash, event } = notification;
        let growth = match event {
            LedgerEvent::Roll(record) => {
                if !self.rolls.ingest(id, record.clone()) {
                    trace!(%id, "roll already known");
                    return updates;
                }
                self.roll_view.update(self.rolls.records());
                updates.push(SessionUpdate::RollsChanged);
                MachineEvent::RollGrew {
                    newest: record,
                    tx_hash,
                }
            }
            LedgerEvent::Winner(record) => {
                if !self.winners.ingest(id, record) {
                    trace!(%id, "winner already known");
                    return updates;
                }
                self.winner_view.update(self.winners.records());
                updates.push(SessionUpdate::WinnersChanged);
                MachineEvent::WinnerGrew {
                    tx_hash,
                    newest_roll: self.roll_view.newest().cloned(),
                }
            }
        };
        if delivery == Delivery::Live {
            self.drive(growth, &mut updates);
        }
        updates
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            rolls: self.roll_view.items().to_vec(),
            winners: self.winner_view.items().to_vec(),
            state: self.machine.state().clone(),
            standard: self.machine.lane_status(OperationLane::Standard),
            privileged: self.machine.lane_status(OperationLane::Privileged),
            actionable: self.machine.is_actionable(),
            rolled: self.machine.has_rolled(),
            last_outcome_label: self
                .roll_view
                .newest()
                .map(RollRecord::outcome_label)
                .unwrap_or_else(|| "0".to_string()),
            last_failure: self.machine.last_failure().cloned(),
            roll_stream: self.roll_stream.clone(),
            winner_stream: self.winner_stream.clone(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn prize(&self) -> Result<U256, LedgerError> {
        self.ledger.prize().await
    }

    pub async fn balance(&self, address: Address) -> Result<Balance, LedgerError> {
        self.ledger.balance(address).await
    }

    pub fn rigged_roll_address(&self) -> Address {
        self.ledger.rigged_roll_address()
    }

    /// Balance held by the privileged contract, which pays for rigged rolls.
    pub async fn rigged_roll_balance(&self) -> Result<Balance, LedgerError> {
        self.ledger.balance(self.ledger.rigged_roll_address()).await
    }

    fn on_watcher_event(&mut self, event: WatcherEvent) -> Vec<SessionUpdate> {
        match event {
            WatcherEvent::Notification {
                delivery,
                notification,
            } => self.reconcile(delivery, notification),
            WatcherEvent::CaughtUp { topic, head } => {
                info!(%topic, head, "stream caught up");
                self.set_stream(topic, StreamStatus::Live)
            }
            WatcherEvent::Resubscribing {
                topic,
                attempt,
                delay,
                reason,
            } => {
                warn!(%topic, attempt, ?delay, %reason, "stream interrupted");
                self.set_stream(topic, StreamStatus::Resubscribing { attempt })
            }
            WatcherEvent::Stalled(err) => {
                error!(%err, source = %err.source, "stream stalled");
                self.set_stream(err.topic, StreamStatus::Stalled(err))
            }
        }
    }

    fn on_report(&mut self, report: TxReport) -> Vec<SessionUpdate> {
        trace!(?report, "transaction report");
        let mut updates = Vec::new();
        self.drive(report.into_machine_event(), &mut updates);
        updates
    }

    fn drive(&mut self, event: MachineEvent, updates: &mut Vec<SessionUpdate>) {
        let before = self.lane_statuses();
        match self.machine.apply(event) {
            Ok(effects) => self.execute(effects, updates),
            Err(err) => warn!(%err, "transition refused"),
        }
        self.push_lane_changes(before, updates);
    }

    fn execute(&mut self, effects: Vec<Effect>, updates: &mut Vec<SessionUpdate>) {
        for effect in effects {
            match effect {
                Effect::SubmitWrite { lane, ticket } => {
                    let wager = match lane {
                        OperationLane::Standard => self.config.standard_wager,
                        OperationLane::Privileged => U256::zero(),
                    };
                    info!(%lane, ticket, %wager, "submitting write");
                    // detached: settlement is reported over the channel
                    drop(self.controller.submit(lane, ticket, wager));
                }
                Effect::ShowOutcome { lane, outcome } => {
                    info!(
                        %lane,
                        outcome = ?outcome.as_ref().map(RollRecord::outcome_label),
                        "roll resolved"
                    );
                    updates.push(SessionUpdate::Resolved { lane, outcome });
                }
                Effect::ReportFailure(failure) => {
                    warn!(lane = %failure.lane(), %failure, "roll failed");
                    updates.push(SessionUpdate::Failure(failure));
                }
            }
        }
    }

    fn set_stream(&mut self, topic: Topic, status: StreamStatus) -> Vec<SessionUpdate> {
        let slot = match topic {
            Topic::Roll => &mut self.roll_stream,
            Topic::Winner => &mut self.winner_stream,
        };
        if *slot == status {
            return Vec::new();
        }
        *slot = status.clone();
        vec![SessionUpdate::Stream { topic, status }]
    }

    fn lane_statuses(&self) -> [LifecycleStatus; 2] {
        OperationLane::ALL.map(|lane| self.machine.lane_status(lane))
    }

    fn push_lane_changes(&self, before: [LifecycleStatus; 2], updates: &mut Vec<SessionUpdate>) {
        for (lane, before) in OperationLane::ALL.into_iter().zip(before) {
            let status = self.machine.lane_status(lane);
            if status != before {
                updates.push(SessionUpdate::Lane { lane, status });
            }
        }
    }
}
