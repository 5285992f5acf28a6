use crate::error::LedgerError;
use ethers::types::{
    Address,
    H256,
    U256,
};
use generated_abi::{
    ROLL_EVENT,
    WINNER_EVENT,
};
use std::{
    collections::HashSet,
    fmt,
};

/// Highest outcome the dice game can produce (one hex digit).
pub const MAX_OUTCOME: u8 = 15;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    Roll,
    Winner,
}

impl Topic {
    pub fn event_name(self) -> &'static str {
        match self {
            Topic::Roll => ROLL_EVENT,
            Topic::Winner => WINNER_EVENT,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

/// Stable identity of a ledger notification: where it sits in the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotificationId {
    pub block: u64,
    pub log_index: u64,
}

impl NotificationId {
    pub fn new(block: u64, log_index: u64) -> Self {
        Self { block, log_index }
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.log_index)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RollRecord {
    pub player: Address,
    pub amount: U256,
    pub outcome: u8,
}

impl RollRecord {
    pub fn new(player: Address, amount: U256, outcome: u8) -> Result<Self, LedgerError> {
        if outcome > MAX_OUTCOME {
            return Err(LedgerError::Malformed(format!(
                "roll outcome {outcome} is outside 0..={MAX_OUTCOME}"
            )));
        }
        Ok(Self {
            player,
            amount,
            outcome,
        })
    }

    /// Builds a record from the raw 256-bit outcome the contract logs.
    pub fn from_raw(player: Address, amount: U256, raw: U256) -> Result<Self, LedgerError> {
        if raw > U256::from(MAX_OUTCOME) {
            return Err(LedgerError::Malformed(format!(
                "roll outcome {raw} is outside 0..={MAX_OUTCOME}"
            )));
        }
        Self::new(player, amount, raw.low_u32() as u8)
    }

    /// Uppercase hex digit, the way the table labels dice faces.
    pub fn outcome_label(&self) -> String {
        format!("{:X}", self.outcome)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WinnerRecord {
    pub winner: Address,
    pub amount: U256,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerEvent {
    Roll(RollRecord),
    Winner(WinnerRecord),
}

impl LedgerEvent {
    pub fn topic(&self) -> Topic {
        match self {
            LedgerEvent::Roll(_) => Topic::Roll,
            LedgerEvent::Winner(_) => Topic::Winner,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    /// Hash of the write that emitted this notification.
    pub tx_hash: H256,
    pub event: LedgerEvent,
}

impl Notification {
    pub fn topic(&self) -> Topic {
        self.event.topic()
    }
}

/// Append-only, arrival-ordered record set keyed by notification identity.
///
/// Ingesting an identity that is already present leaves the set untouched, so
/// re-delivery of a notification never changes anything derived from it.
#[derive(Clone, Debug)]
pub struct RecordLog<T> {
    seen: HashSet<NotificationId>,
    records: Vec<T>,
}

impl<T> Default for RecordLog<T> {
    fn default() -> Self {
        Self {
            seen: HashSet::new(),
            records: Vec::new(),
        }
    }
}

impl<T> RecordLog<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when `id` was already ingested.
    pub fn ingest(&mut self, id: NotificationId, record: T) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn contains(&self, id: &NotificationId) -> bool {
        self.seen.contains(id)
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn outcome_label__eleven__is_uppercase_b() {
        let record =
            RollRecord::new(Address::from_low_u64_be(0xABC), U256::from(1u64), 11).unwrap();
        assert_eq!(record.outcome_label(), "B");
    }

    #[test]
    fn from_raw__outcome_above_fifteen__is_malformed() {
        let result =
            RollRecord::from_raw(Address::zero(), U256::zero(), U256::from(16u64));
        assert!(matches!(result, Err(LedgerError::Malformed(_))));
    }

    #[test]
    fn ingest__same_identity_twice__keeps_one_record() {
        // given
        let mut log = RecordLog::new();
        let id = NotificationId::new(7, 2);

        // when
        let first = log.ingest(id, "first");
        let second = log.ingest(id, "second");

        // then
        assert!(first);
        assert!(!second);
        assert_eq!(log.records(), &["first"]);
    }

    #[test]
    fn ingest__same_block_different_log_index__keeps_both() {
        let mut log = RecordLog::new();
        log.ingest(NotificationId::new(7, 0), 1);
        log.ingest(NotificationId::new(7, 1), 2);
        assert_eq!(log.len(), 2);
    }
}
