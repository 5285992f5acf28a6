mod ethers_backend;
mod procedure;

use anyhow::{
    Context,
    Result,
};
use clap::{
    ArgGroup,
    Parser,
};
use deployments::{
    DeploymentEnv,
    DeploymentRecord,
    DeploymentStore,
    wallets::{
        find_wallet,
        resolve_wallet_dir,
        unlock_wallet,
    },
};
use ethers::{
    types::Address,
    utils::{
        format_ether,
        parse_ether,
    },
};
use std::{
    path::PathBuf,
    str::FromStr,
};
use tracing_subscriber::EnvFilter;

use crate::{
    ethers_backend::EthersBackend,
    procedure::{
        Artifact,
        DEFAULT_OWNER,
        DeployBackend,
        DeploymentPlan,
        run_deployment,
    },
};

const DEFAULT_SEPOLIA_RPC_URL: &str = "https://rpc.sepolia.org";
const DEFAULT_LOCAL_RPC_URL: &str = "http://127.0.0.1:8545";
const DEFAULT_ARTIFACT: &str = "./artifacts/contracts/RiggedRoll.sol/RiggedRoll.json";

#[derive(Parser, Debug)]
#[command(
    name = "dice-deploy",
    about = "Deploy the rigged roll contract or perform owner utilities (balance, withdraw)",
    version,
    group(
        ArgGroup::new("network")
            .args(["local", "sepolia"])
            .required(true)
    )
)]
struct Args {
    /// Deploy to a local node (hardhat/anvil)
    #[arg(long)]
    local: bool,

    /// Deploy to Sepolia
    #[arg(long)]
    sepolia: bool,

    /// Override RPC URL
    #[arg(long)]
    rpc_url: Option<String>,

    /// Keystore name
    #[arg(long)]
    wallet: String,

    /// Override keystore directory (defaults to ~/.foundry/keystores)
    #[arg(long)]
    wallet_dir: Option<String>,

    /// Which action to perform (defaults to deploy)
    #[arg(short, long, value_enum, default_value = "deploy")]
    action: Action,

    /// Dice game contract the rigged roll plays against (deploy only)
    #[arg(long)]
    dice_game: Option<String>,

    /// Compiled rigged roll artifact (hardhat or foundry JSON)
    #[arg(long, default_value = DEFAULT_ARTIFACT)]
    artifact: PathBuf,

    /// Ether to send to the new contract after deployment
    #[arg(long)]
    funding: Option<String>,

    /// Address that takes ownership after deployment
    #[arg(long, default_value = DEFAULT_OWNER)]
    owner: String,

    /// Destination address for withdrawal (defaults to this wallet)
    #[arg(long)]
    withdraw_to: Option<String>,

    /// Withdrawal amount in ether (required for withdraw action)
    #[arg(long)]
    withdraw: Option<String>,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum Action {
    Deploy,
    Balance,
    Withdraw,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    deployments::ensure_structure().context("initializing deployment directories")?;

    let (env, default_url) = if args.sepolia {
        (DeploymentEnv::Sepolia, DEFAULT_SEPOLIA_RPC_URL)
    } else {
        (DeploymentEnv::Local, DEFAULT_LOCAL_RPC_URL)
    };
    let rpc_url = args
        .rpc_url
        .clone()
        .unwrap_or_else(|| default_url.to_string());

    let wallet_dir = resolve_wallet_dir(args.wallet_dir.as_deref())
        .context("resolving wallet directory")?;
    let descriptor =
        find_wallet(&wallet_dir, &args.wallet).context("locating requested wallet")?;
    let wallet = unlock_wallet(&descriptor).context("unlocking keystore")?;
    let backend = EthersBackend::connect(&rpc_url, wallet)
        .await
        .context("failed to connect to provider")?;

    let store = DeploymentStore::new(env).context("opening deployment store")?;

    match args.action {
        Action::Deploy => deploy(&args, &backend, &store).await,
        Action::Balance => {
            let record = latest_record(&store)?;
            let contract = parse_address(&record.contract_address)?;
            let contract_balance = backend.balance(contract).await?;
            let wallet_balance = backend.balance(backend.deployer()).await?;
            println!("Wallet '{}' ({:?})", args.wallet, backend.deployer());
            println!("  Balance: {} ETH", format_ether(wallet_balance));
            println!("Rigged roll {:?} on {}", contract, env);
            println!("  Balance: {} ETH", format_ether(contract_balance));
            Ok(())
        }
        Action::Withdraw => {
            let raw = args.withdraw.as_deref().ok_or_else(|| {
                anyhow::anyhow!("--withdraw <ether> is required for withdraw action")
            })?;
            let amount = parse_ether(raw).context("parsing withdrawal amount")?;
            let record = latest_record(&store)?;
            let contract = parse_address(&record.contract_address)?;
            let to = match args.withdraw_to.as_deref() {
                Some(raw) => parse_address(raw)?,
                None => backend.deployer(),
            };
            backend
                .withdraw(contract, to, amount)
                .await
                .context("withdrawing from rigged roll")?;
            println!(
                "Withdrew {} ETH from {:?} to {:?}",
                format_ether(amount),
                contract,
                to
            );
            Ok(())
        }
    }
}

async fn deploy(args: &Args, backend: &EthersBackend, store: &DeploymentStore) -> Result<()> {
    let dice_game = args
        .dice_game
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("--dice-game <address> is required when deploying"))
        .and_then(parse_address)?;
    let artifact = Artifact::load(&args.artifact)?;
    let funding = args
        .funding
        .as_deref()
        .map(|raw| parse_ether(raw).context("parsing funding amount"))
        .transpose()?
        .filter(|amount| !amount.is_zero());
    let plan = DeploymentPlan {
        artifact,
        dice_game,
        funding,
        new_owner: parse_address(&args.owner)?,
    };

    let report = run_deployment(backend, &plan, store).await?;

    println!(
        "Rigged roll deployed: {:?} at block {}",
        report.deployed.address,
        report
            .deployed
            .block
            .map(|b| b.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    );
    if let Some(amount) = report.funded {
        println!("Funded with {} ETH", format_ether(amount));
    }
    match &report.ownership {
        Ok(()) => println!("Ownership transferred to {:?}", plan.new_owner),
        Err(err) => println!("Ownership NOT transferred: {err}"),
    }
    println!("Deployment metadata written to {}", store.path().display());
    Ok(())
}

fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw).map_err(|_| anyhow::anyhow!("unable to parse address: {raw}"))
}

fn latest_record(store: &DeploymentStore) -> Result<DeploymentRecord> {
    store
        .latest()
        .context("loading deployment records")?
        .ok_or_else(|| anyhow::anyhow!("no deployments found for this environment"))
}
