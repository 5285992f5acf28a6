use crate::{
    error::LedgerError,
    records::{
        Notification,
        Topic,
    },
};
use ethers::{
    types::{
        Address,
        H256,
        U256,
    },
    utils::format_ether,
};
use futures::stream::BoxStream;

pub mod ethers_ledger;

pub use ethers_ledger::EthersLedger;

pub type NotificationStream = BoxStream<'static, Result<Notification, LedgerError>>;

/// A write accepted by the ledger and waiting to settle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingWrite {
    pub tx_hash: H256,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
    Mined { block: u64 },
    Reverted { block: Option<u64> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Balance {
    pub raw: U256,
    /// Ether-denominated rendering of `raw`.
    pub formatted: String,
}

impl Balance {
    pub fn from_wei(raw: U256) -> Self {
        Self {
            raw,
            formatted: format_ether(raw),
        }
    }
}

/// Everything the client needs from the dice game deployment.
///
/// Implementations are shared between the session and its background tasks,
/// so every future they hand out must be `Send`.
pub trait Ledger: Send + Sync + 'static {
    fn prize(&self) -> impl Future<Output = Result<U256, LedgerError>> + Send;

    fn balance(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<Balance, LedgerError>> + Send;

    /// Address of the privileged contract.
    fn rigged_roll_address(&self) -> Address;

    fn roll_the_dice(
        &self,
        wager: U256,
    ) -> impl Future<Output = Result<PendingWrite, LedgerError>> + Send;

    fn rigged_roll(&self) -> impl Future<Output = Result<PendingWrite, LedgerError>> + Send;

    /// Resolves once `tx_hash` is included in a block.
    fn settlement(
        &self,
        tx_hash: H256,
    ) -> impl Future<Output = Result<Settlement, LedgerError>> + Send;

    fn head(&self) -> impl Future<Output = Result<u64, LedgerError>> + Send;

    /// Notifications of `topic` in `[from, to]`, in ledger order.
    fn replay(
        &self,
        topic: Topic,
        from: u64,
        to: u64,
    ) -> impl Future<Output = Result<Vec<Notification>, LedgerError>> + Send;

    /// Live notifications of `topic` from block `from` onwards.
    ///
    /// The returned stream may overlap with a replay of the same range; callers
    /// de-duplicate by notification identity.
    fn subscribe(
        &self,
        topic: Topic,
        from: u64,
    ) -> impl Future<Output = Result<NotificationStream, LedgerError>> + Send;
}
