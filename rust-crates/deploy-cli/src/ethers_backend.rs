use crate::procedure::{
    Artifact,
    DeployBackend,
    Deployed,
};
use anyhow::{
    Context,
    Result,
    anyhow,
};
use ethers::{
    contract::ContractFactory,
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
        TransactionReceipt,
        TransactionRequest,
        U64,
        U256,
    },
};
use generated_abi::rigged_roll_types::RiggedRoll;
use std::sync::Arc;

type Client = SignerMiddleware<Provider<Http>, LocalWallet>;

pub struct EthersBackend {
    client: Arc<Client>,
    rpc_url: String,
}

impl EthersBackend {
    pub async fn connect(rpc_url: &str, wallet: LocalWallet) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url).context("Invalid RPC URL")?;
        let chain_id = provider
            .get_chainid()
            .await
            .context("fetching chain id")?;
        let wallet = wallet.with_chain_id(chain_id.as_u64());
        Ok(Self {
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
            rpc_url: rpc_url.to_string(),
        })
    }

    pub async fn balance(&self, address: Address) -> Result<U256> {
        self.client
            .get_balance(address, None)
            .await
            .context("fetching balance")
    }

    /// Owner-only withdrawal from the rigged roll contract.
    pub async fn withdraw(&self, contract: Address, to: Address, amount: U256) -> Result<()> {
        let rigged = RiggedRoll::new(contract, self.client.clone());
        let call = rigged.withdraw(to, amount);
        let pending = call.send().await.context("submitting withdrawal")?;
        let receipt = pending.await.context("waiting for withdrawal receipt")?;
        ensure_success(receipt, "withdrawal")
    }
}

fn ensure_success(receipt: Option<TransactionReceipt>, what: &str) -> Result<()> {
    let receipt = receipt.ok_or_else(|| anyhow!("{what} transaction was dropped"))?;
    if receipt.status != Some(U64::from(1)) {
        anyhow::bail!(
            "{what} transaction {:?} reverted",
            receipt.transaction_hash
        );
    }
    Ok(())
}

impl DeployBackend for EthersBackend {
    fn deployer(&self) -> Address {
        self.client.address()
    }

    fn network_url(&self) -> &str {
        &self.rpc_url
    }

    async fn deploy(&self, artifact: &Artifact, dependency: Address) -> Result<Deployed> {
        let factory = ContractFactory::new(
            artifact.abi.clone(),
            artifact.bytecode.clone(),
            self.client.clone(),
        );
        let (contract, receipt) = factory
            .deploy(dependency)
            .context("encoding constructor arguments")?
            .send_with_receipt()
            .await
            .context("sending deployment transaction")?;
        Ok(Deployed {
            address: contract.address(),
            block: receipt.block_number.map(|n| n.as_u64()),
        })
    }

    async fn fund(&self, contract: Address, amount: U256) -> Result<()> {
        let tx = TransactionRequest::new().to(contract).value(amount);
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .context("sending funding transaction")?;
        let receipt = pending.await.context("waiting for funding receipt")?;
        ensure_success(receipt, "funding")
    }

    async fn transfer_ownership(&self, contract: Address, new_owner: Address) -> Result<()> {
        let rigged = RiggedRoll::new(contract, self.client.clone());
        let call = rigged.transfer_ownership(new_owner);
        let pending = call.send().await.context("submitting transferOwnership")?;
        let receipt = pending
            .await
            .context("waiting for transferOwnership receipt")?;
        ensure_success(receipt, "transferOwnership")
    }
}
