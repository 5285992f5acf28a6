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
use ethers::{
    contract::{
        ContractError,
        LogMeta,
    },
    middleware::SignerMiddleware,
    providers::{
        Http,
        Middleware,
        Provider,
    },
    signers::{
        LocalWallet,
        Signer,
    },
    types::{
        Address,
        H256,
        U64,
        U256,
    },
};
use futures::{
    StreamExt,
    stream,
};
use generated_abi::{
    dice_game_types::{
        DiceGame,
        RollFilter,
        WinnerFilter,
    },
    rigged_roll_types::RiggedRoll,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tracing::{
    debug,
    warn,
};

pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_MAX_RANGE: u64 = 2_000;

/// [`Ledger`] backed by a JSON-RPC node.
///
/// Live subscriptions are served by polling the head and querying logs for the
/// new range, which works against any HTTP endpoint.
#[derive(Clone)]
pub struct EthersLedger {
    provider: Provider<Http>,
    dice_game: DiceGame<SignerClient>,
    rigged_roll: RiggedRoll<SignerClient>,
    poll_interval: Duration,
    max_range: u64,
}

impl EthersLedger {
    pub async fn connect(
        rpc_url: &str,
        wallet: LocalWallet,
        dice_game: Address,
        rigged_roll: Address,
    ) -> Result<Self, LedgerError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| LedgerError::Unavailable(format!("invalid rpc url {rpc_url}: {e}")))?;
        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| classify_message(e.to_string()))?;
        let wallet = wallet.with_chain_id(chain_id.as_u64());
        let client = Arc::new(SignerMiddleware::new(provider.clone(), wallet));

        Ok(Self {
            provider,
            dice_game: DiceGame::new(dice_game, client.clone()),
            rigged_roll: RiggedRoll::new(rigged_roll, client),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_range: DEFAULT_MAX_RANGE,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn dice_game_address(&self) -> Address {
        self.dice_game.address()
    }

    async fn replay_chunk(
        &self,
        topic: Topic,
        from: u64,
        to: u64,
    ) -> Result<Vec<Notification>, LedgerError> {
        let mut out = Vec::new();
        match topic {
            Topic::Roll => {
                let logs = self
                    .dice_game
                    .event::<RollFilter>()
                    .from_block(from)
                    .to_block(to)
                    .query_with_meta()
                    .await
                    .map_err(contract_error)?;
                for (event, meta) in logs {
                    match RollRecord::from_raw(event.player, event.amount, event.roll) {
                        Ok(record) => out.push(notification(&meta, LedgerEvent::Roll(record))),
                        Err(err) => warn!(tx_hash = ?meta.transaction_hash, %err, "skipping roll log"),
                    }
                }
            }
            Topic::Winner => {
                let logs = self
                    .dice_game
                    .event::<WinnerFilter>()
                    .from_block(from)
                    .to_block(to)
                    .query_with_meta()
                    .await
                    .map_err(contract_error)?;
                out.extend(logs.into_iter().map(|(event, meta)| {
                    let record = WinnerRecord {
                        winner: event.winner,
                        amount: event.amount,
                    };
                    notification(&meta, LedgerEvent::Winner(record))
                }));
            }
        }
        Ok(out)
    }
}

fn notification(meta: &LogMeta, event: LedgerEvent) -> Notification {
    Notification {
        id: NotificationId::new(meta.block_number.as_u64(), meta.log_index.as_u64()),
        tx_hash: meta.transaction_hash,
        event,
    }
}

impl Ledger for EthersLedger {
    async fn prize(&self) -> Result<U256, LedgerError> {
        self.dice_game.prize().call().await.map_err(contract_error)
    }

    async fn balance(&self, address: Address) -> Result<Balance, LedgerError> {
        let raw = self
            .provider
            .get_balance(address, None)
            .await
            .map_err(|e| classify_message(e.to_string()))?;
        Ok(Balance::from_wei(raw))
    }

    fn rigged_roll_address(&self) -> Address {
        self.rigged_roll.address()
    }

    async fn roll_the_dice(&self, wager: U256) -> Result<PendingWrite, LedgerError> {
        let call = self.dice_game.roll_the_dice().value(wager);
        let pending = call.send().await.map_err(contract_error)?;
        Ok(PendingWrite {
            tx_hash: *pending,
        })
    }

    async fn rigged_roll(&self) -> Result<PendingWrite, LedgerError> {
        let call = self.rigged_roll.rigged_roll();
        let pending = call.send().await.map_err(contract_error)?;
        Ok(PendingWrite {
            tx_hash: *pending,
        })
    }

    async fn settlement(&self, tx_hash: H256) -> Result<Settlement, LedgerError> {
        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(|e| classify_message(e.to_string()))?;
            let Some(receipt) = receipt else {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            };
            let block = receipt.block_number.map(|n| n.as_u64());
            return match (receipt.status, block) {
                (Some(status), Some(block)) if status == U64::from(1) => {
                    Ok(Settlement::Mined { block })
                }
                _ => Ok(Settlement::Reverted { block }),
            };
        }
    }

    async fn head(&self) -> Result<u64, LedgerError> {
        self.provider
            .get_block_number()
            .await
            .map(|n| n.as_u64())
            .map_err(|e| classify_message(e.to_string()))
    }

    async fn replay(
        &self,
        topic: Topic,
        from: u64,
        to: u64,
    ) -> Result<Vec<Notification>, LedgerError> {
        let mut out = Vec::new();
        let mut start = from;
        while start <= to {
            let end = to.min(start.saturating_add(self.max_range - 1));
            debug!(%topic, start, end, "querying logs");
            out.extend(self.replay_chunk(topic, start, end).await?);
            start = end + 1;
        }
        out.sort_by_key(|n| n.id);
        Ok(out)
    }

    async fn subscribe(
        &self,
        topic: Topic,
        from: u64,
    ) -> Result<NotificationStream, LedgerError> {
        let ledger = self.clone();
        let polled = stream::unfold(Some(from), move |next| {
            let ledger = ledger.clone();
            async move {
                let from = next?;
                loop {
                    tokio::time::sleep(ledger.poll_interval).await;
                    let head = match ledger.head().await {
                        Ok(head) => head,
                        Err(err) => return Some((vec![Err(err)], None)),
                    };
                    if head < from {
                        continue;
                    }
                    return match ledger.replay(topic, from, head).await {
                        Ok(batch) => Some((batch.into_iter().map(Ok).collect(), Some(head + 1))),
                        Err(err) => Some((vec![Err(err)], None)),
                    };
                }
            }
        });
        Ok(polled.flat_map(stream::iter).boxed())
    }
}

fn contract_error<M: Middleware>(err: ContractError<M>) -> LedgerError {
    if let Some(data) = err.as_revert() {
        let reason = err
            .decode_revert::<String>()
            .unwrap_or_else(|| data.to_string());
        return LedgerError::Reverted(reason);
    }
    classify_message(err.to_string())
}

/// Maps a node or signer error message onto a [`LedgerError`] kind.
pub(crate) fn classify_message(message: String) -> LedgerError {
    let lower = message.to_lowercase();
    if lower.contains("user rejected") || lower.contains("denied") || lower.contains("cancel") {
        LedgerError::Cancelled
    } else if lower.contains("insufficient funds") {
        LedgerError::InsufficientBalance(message)
    } else if lower.contains("revert") {
        LedgerError::Reverted(message)
    } else {
        LedgerError::Unavailable(message)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn classify_message__insufficient_funds__is_insufficient_balance() {
        let err = classify_message(
            "insufficient funds for gas * price + value".to_string(),
        );
        assert!(matches!(err, LedgerError::InsufficientBalance(_)));
    }

    #[test]
    fn classify_message__execution_reverted__is_reverted() {
        let err = classify_message("execution reverted: Not enough ETH".to_string());
        assert!(matches!(err, LedgerError::Reverted(_)));
    }

    #[test]
    fn classify_message__user_rejected__is_cancelled() {
        let err = classify_message("User rejected the request.".to_string());
        assert_eq!(err, LedgerError::Cancelled);
    }

    #[test]
    fn classify_message__connection_refused__is_unavailable() {
        let err = classify_message("error sending request: connection refused".to_string());
        assert!(matches!(err, LedgerError::Unavailable(_)));
    }
}
