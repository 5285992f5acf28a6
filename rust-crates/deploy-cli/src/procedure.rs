use anyhow::{
    Context,
    Result,
};
use chrono::Utc;
use deployments::{
    DeploymentRecord,
    DeploymentStore,
    compute_bytecode_hash,
};
use dice_client::OwnershipTransferError;
use ethers::{
    abi::Abi,
    types::{
        Address,
        Bytes,
        U256,
    },
};
use serde::Deserialize;
use std::{
    fs,
    path::Path,
};
use tracing::{
    info,
    warn,
};


/// Address that receives ownership of every freshly deployed rigged roll.
pub const DEFAULT_OWNER: &str = "0xD00B9215e7f45c2198d4e1f9b1d1F45dE6aFfd99";

/// Compiled contract as emitted by hardhat/foundry (`abi` plus creation code).
#[derive(Clone, Debug, Deserialize)]
pub struct Artifact {
    pub abi: Abi,
    #[serde(deserialize_with = "bytecode_from_hex")]
    pub bytecode: Bytes,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Hardhat(String),
    Foundry { object: String },
}

fn bytecode_from_hex<'de, D>(deserializer: D) -> std::result::Result<Bytes, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = match RawBytecode::deserialize(deserializer)? {
        RawBytecode::Hardhat(hex) | RawBytecode::Foundry { object: hex } => hex,
    };
    let cleaned = raw.strip_prefix("0x").unwrap_or(&raw);
    hex::decode(cleaned)
        .map(Bytes::from)
        .map_err(<D::Error as serde::de::Error>::custom)
}

impl Artifact {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)
            .with_context(|| format!("Failed to read contract artifact {}", path.display()))?;
        serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse contract artifact {}", path.display()))
    }

    pub fn bytecode_hash(&self) -> String {
        compute_bytecode_hash(&self.bytecode)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deployed {
    pub address: Address,
    pub block: Option<u64>,
}

/// The ledger side of a deployment.
pub trait DeployBackend {
    fn deployer(&self) -> Address;

    fn network_url(&self) -> &str;

    /// Deploys `artifact` with `dependency` as its only constructor argument.
    fn deploy(
        &self,
        artifact: &Artifact,
        dependency: Address,
    ) -> impl Future<Output = Result<Deployed>>;

    fn fund(&self, contract: Address, amount: U256) -> impl Future<Output = Result<()>>;

    fn transfer_ownership(
        &self,
        contract: Address,
        new_owner: Address,
    ) -> impl Future<Output = Result<()>>;
}

#[derive(Clone, Debug)]
pub struct DeploymentPlan {
    pub artifact: Artifact,
    pub dice_game: Address,
    pub funding: Option<U256>,
    pub new_owner: Address,
}

#[derive(Debug)]
pub struct DeploymentReport {
    pub deployed: Deployed,
    pub funded: Option<U256>,
    pub ownership: std::result::Result<(), OwnershipTransferError>,
    pub record: DeploymentRecord,
}

/// Deploys, optionally funds, hands over ownership and records the result.
///
/// Only the ownership transfer is allowed to fail without aborting; its error
/// ends up in the report and in the stored record.
pub async fn run_deployment<B: DeployBackend>(
    backend: &B,
    plan: &DeploymentPlan,
    store: &DeploymentStore,
) -> Result<DeploymentReport> {
    let deployed = backend
        .deploy(&plan.artifact, plan.dice_game)
        .await
        .context("deploying rigged roll contract")?;
    info!(address = ?deployed.address, block = ?deployed.block, "rigged roll deployed");

    if let Some(amount) = plan.funding {
        backend
            .fund(deployed.address, amount)
            .await
            .context("funding rigged roll contract")?;
        info!(%amount, "rigged roll funded");
    }

    let ownership = match backend
        .transfer_ownership(deployed.address, plan.new_owner)
        .await
    {
        Ok(()) => {
            info!(new_owner = ?plan.new_owner, "ownership transferred");
            Ok(())
        }
        Err(err) => {
            let err = OwnershipTransferError {
                contract: deployed.address,
                new_owner: plan.new_owner,
                detail: format!("{err:#}"),
            };
            warn!(%err, "continuing without ownership transfer");
            Err(err)
        }
    };

    let record = DeploymentRecord {
        deployed_at: Utc::now().to_rfc3339(),
        contract_address: format!("{:?}", deployed.address),
        dice_game_address: format!("{:?}", plan.dice_game),
        bytecode_hash: plan.artifact.bytecode_hash(),
        network_url: backend.network_url().to_string(),
        deployer: Some(format!("{:?}", backend.deployer())),
        owner: Some(format!(
            "{:?}",
            if ownership.is_ok() {
                plan.new_owner
            } else {
                backend.deployer()
            }
        )),
        deployment_block: deployed.block,
        funding_wei: plan.funding.map(|amount| amount.to_string()),
        ownership_transferred: ownership.is_ok(),
        ownership_error: ownership.as_ref().err().map(ToString::to_string),
    };
    store
        .append(record.clone())
        .context("recording deployment")?;

    Ok(DeploymentReport {
        deployed,
        funded: plan.funding,
        ownership,
        record,
    })
}
