//! In-memory [`Ledger`] for driving sessions and watchers from tests.

use crate::{
    error::LedgerError,
    ledger::{
        Balance,
        Ledger,
        NotificationStream,
        PendingWrite,
        Settlement,
    },
    records::{
        LedgerEvent,
        Notification,
        NotificationId,
        RollRecord,
        Topic,
        WinnerRecord,
    },
};
use ethers::types::{
    Address,
    H256,
    U256,
};
use futures::StreamExt;
use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    sync::Mutex,
};
use tokio::sync::{
    mpsc,
    watch,
};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// How the fake settles the next write it receives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Mined,
    Reverted,
    Rejected(LedgerError),
    SettlementFails(LedgerError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteKind {
    RollTheDice,
    RiggedRoll,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmittedWrite {
    pub kind: WriteKind,
    pub wager: U256,
    pub tx_hash: H256,
}

type LiveSender = mpsc::UnboundedSender<Result<Notification, LedgerError>>;

#[derive(Default)]
struct State {
    head: u64,
    log: Vec<Notification>,
    subscribers: Vec<(Topic, LiveSender)>,
    outcomes: VecDeque<WriteOutcome>,
    settlements: HashMap<H256, WriteOutcome>,
    writes: Vec<SubmittedWrite>,
    replay_failures: u32,
    subscribe_failures: u32,
    prize: U256,
    balances: HashMap<Address, U256>,
}

pub struct FakeLedger {
    state: Mutex<State>,
    settle_gate: watch::Sender<bool>,
    rigged_roll: Address,
}

impl Default for FakeLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            settle_gate: watch::Sender::new(true),
            rigged_roll: Address::from_low_u64_be(0x5157),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake ledger state poisoned")
    }

    /// Appends `event` in a new block and pushes it to live subscribers.
    pub fn emit(&self, tx_hash: H256, event: LedgerEvent) -> Notification {
        let mut state = self.state();
        state.head += 1;
        let notification = Notification {
            id: NotificationId::new(state.head, 0),
            tx_hash,
            event,
        };
        state.log.push(notification.clone());
        let topic = notification.topic();
        state.subscribers.retain(|(subscribed, tx)| {
            *subscribed != topic || tx.send(Ok(notification.clone())).is_ok()
        });
        notification
    }

    pub fn emit_roll(
        &self,
        tx_hash: H256,
        player: Address,
        amount: U256,
        outcome: u8,
    ) -> Notification {
        let record = RollRecord::new(player, amount, outcome).expect("valid outcome");
        self.emit(tx_hash, LedgerEvent::Roll(record))
    }

    pub fn emit_winner(&self, tx_hash: H256, winner: Address, amount: U256) -> Notification {
        self.emit(tx_hash, LedgerEvent::Winner(WinnerRecord { winner, amount }))
    }

    /// Pushes an already-emitted notification to live subscribers again.
    pub fn redeliver(&self, notification: &Notification) {
        let topic = notification.topic();
        self.state().subscribers.retain(|(subscribed, tx)| {
            *subscribed != topic || tx.send(Ok(notification.clone())).is_ok()
        });
    }

    /// Breaks every live subscription on `topic`.
    pub fn fail_live(&self, topic: Topic) {
        self.state().subscribers.retain(|(subscribed, tx)| {
            if *subscribed == topic {
                let _ = tx.send(Err(LedgerError::Unavailable("connection reset".into())));
                false
            } else {
                true
            }
        });
    }

    pub fn fail_next_replays(&self, count: u32) {
        self.state().replay_failures = count;
    }

    pub fn fail_next_subscribes(&self, count: u32) {
        self.state().subscribe_failures = count;
    }

    /// Queues how the next write will behave. Unqueued writes are mined.
    pub fn push_outcome(&self, outcome: WriteOutcome) {
        self.state().outcomes.push_back(outcome);
    }

    /// Settlement lookups block until [`FakeLedger::release_settlements`].
    pub fn hold_settlements(&self) {
        self.settle_gate.send_replace(false);
    }

    pub fn release_settlements(&self) {
        self.settle_gate.send_replace(true);
    }

    pub fn writes(&self) -> Vec<SubmittedWrite> {
        self.state().writes.clone()
    }

    pub fn last_tx_hash(&self) -> Option<H256> {
        self.state().writes.last().map(|w| w.tx_hash)
    }

    pub fn active_subscriptions(&self, topic: Topic) -> usize {
        self.state()
            .subscribers
            .iter()
            .filter(|(subscribed, tx)| *subscribed == topic && !tx.is_closed())
            .count()
    }

    pub fn set_prize(&self, prize: U256) {
        self.state().prize = prize;
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.state().balances.insert(address, balance);
    }

    fn record_write(&self, kind: WriteKind, wager: U256) -> Result<PendingWrite, LedgerError> {
        let mut state = self.state();
        let outcome = state.outcomes.pop_front().unwrap_or(WriteOutcome::Mined);
        if let WriteOutcome::Rejected(err) = outcome {
            return Err(err);
        }
        let tx_hash = H256::from_low_u64_be(0x7000 + state.writes.len() as u64 + 1);
        state.writes.push(SubmittedWrite {
            kind,
            wager,
            tx_hash,
        });
        state.settlements.insert(tx_hash, outcome);
        Ok(PendingWrite { tx_hash })
    }
}

impl Ledger for FakeLedger {
    async fn prize(&self) -> Result<U256, LedgerError> {
        Ok(self.state().prize)
    }

    async fn balance(&self, address: Address) -> Result<Balance, LedgerError> {
        let raw = self
            .state()
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default();
        Ok(Balance::from_wei(raw))
    }

    fn rigged_roll_address(&self) -> Address {
        self.rigged_roll
    }

    async fn roll_the_dice(&self, wager: U256) -> Result<PendingWrite, LedgerError> {
        self.record_write(WriteKind::RollTheDice, wager)
    }

    async fn rigged_roll(&self) -> Result<PendingWrite, LedgerError> {
        self.record_write(WriteKind::RiggedRoll, U256::zero())
    }

    async fn settlement(&self, tx_hash: H256) -> Result<Settlement, LedgerError> {
        let mut gate = self.settle_gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| LedgerError::Unavailable("gate closed".into()))?;

        let state = self.state();
        let block = state.head;
        match state.settlements.get(&tx_hash) {
            Some(WriteOutcome::Mined) => Ok(Settlement::Mined { block }),
            Some(WriteOutcome::Reverted) => Ok(Settlement::Reverted { block: Some(block) }),
            Some(WriteOutcome::SettlementFails(err)) => Err(err.clone()),
            Some(WriteOutcome::Rejected(_)) | None => {
                Err(LedgerError::Unavailable(format!("unknown transaction {tx_hash:?}")))
            }
        }
    }

    async fn head(&self) -> Result<u64, LedgerError> {
        Ok(self.state().head)
    }

    async fn replay(
        &self,
        topic: Topic,
        from: u64,
        to: u64,
    ) -> Result<Vec<Notification>, LedgerError> {
        let mut state = self.state();
        if state.replay_failures > 0 {
            state.replay_failures -= 1;
            return Err(LedgerError::Unavailable("replay failed".into()));
        }
        Ok(state
            .log
            .iter()
            .filter(|n| n.topic() == topic && (from..=to).contains(&n.id.block))
            .cloned()
            .collect())
    }

    async fn subscribe(
        &self,
        topic: Topic,
        from: u64,
    ) -> Result<NotificationStream, LedgerError> {
        let mut state = self.state();
        if state.subscribe_failures > 0 {
            state.subscribe_failures -= 1;
            return Err(LedgerError::Unavailable("subscribe failed".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        for notification in state
            .log
            .iter()
            .filter(|n| n.topic() == topic && n.id.block >= from)
        {
            let _ = tx.send(Ok(notification.clone()));
        }
        state.subscribers.push((topic, tx));
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}
