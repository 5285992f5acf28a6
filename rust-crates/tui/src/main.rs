use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use dice_client::ResolutionPolicy;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod client;
mod ui;

const LOG_DIR: &str = ".logs";
const LOG_FILE: &str = "dice-table.log";

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: dice-table [--local | --sepolia] [--rpc-url <url>]\n\
         [--wallet <name>] [--wallet-dir <path>]\n\
         [--from-block <n>] [--correlated]\n\
         \n\
         Flags:\n\
           --local             Connect to a local node (default RPC {})\n\
           --sepolia           Connect to Sepolia (default RPC {})\n\
           --rpc-url <url>     Override the RPC URL for the selected network\n\
           --wallet <name>     Keystore to play with\n\
           --wallet-dir <path> Override keystore directory (defaults to ~/.foundry/keystores)\n\
           --from-block <n>    Replay history from this block (defaults to the deployment block)\n\
           --correlated        Only resolve a roll on events emitted by its own transaction",
        client::DEFAULT_LOCAL_RPC_URL,
        client::DEFAULT_SEPOLIA_RPC_URL,
    );
    std::process::exit(0);
}

fn parse_cli_args() -> Result<client::AppConfig> {
    #[derive(Clone, Copy)]
    enum NetworkFlag {
        Local,
        Sepolia,
    }

    let mut args = std::env::args().skip(1);
    let mut network_flag: Option<NetworkFlag> = None;
    let mut custom_url: Option<String> = None;
    let mut wallet_dir: Option<String> = None;
    let mut wallet_name: Option<String> = None;
    let mut from_block: Option<u64> = None;
    let mut resolution = ResolutionPolicy::AnyGrowth;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--local" | "--sepolia" => {
                if network_flag.is_some() {
                    return Err(eyre!(
                        "Multiple network flags provided; choose one of --local/--sepolia"
                    ));
                }
                network_flag = Some(if arg == "--local" {
                    NetworkFlag::Local
                } else {
                    NetworkFlag::Sepolia
                });
            }
            "--rpc-url" => {
                let url = args
                    .next()
                    .ok_or_else(|| eyre!("--rpc-url requires a URL argument"))?;
                if custom_url.is_some() {
                    return Err(eyre!("--rpc-url may only be specified once"));
                }
                custom_url = Some(url);
            }
            "--wallet-dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet-dir requires a path argument"))?;
                if wallet_dir.is_some() {
                    return Err(eyre!("--wallet-dir may only be specified once"));
                }
                wallet_dir = Some(dir);
            }
            "--wallet" => {
                let name = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet requires a wallet name"))?;
                if wallet_name.is_some() {
                    return Err(eyre!("--wallet may only be specified once"));
                }
                wallet_name = Some(name);
            }
            "--from-block" => {
                let raw = args
                    .next()
                    .ok_or_else(|| eyre!("--from-block requires a block number"))?;
                let block = raw
                    .parse::<u64>()
                    .wrap_err_with(|| format!("invalid block number: {raw}"))?;
                from_block = Some(block);
            }
            "--correlated" => resolution = ResolutionPolicy::CorrelatedTransaction,
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    let network = match network_flag {
        None => return Err(eyre!("Select a network with --local or --sepolia")),
        Some(NetworkFlag::Local) => client::NetworkTarget::Local {
            url: custom_url.unwrap_or_else(|| client::DEFAULT_LOCAL_RPC_URL.to_string()),
        },
        Some(NetworkFlag::Sepolia) => client::NetworkTarget::Sepolia {
            url: custom_url.unwrap_or_else(|| client::DEFAULT_SEPOLIA_RPC_URL.to_string()),
        },
    };

    let name =
        wallet_name.ok_or_else(|| eyre!("Specify --wallet <name> to select a keystore"))?;
    let dir = deployments::wallets::resolve_wallet_dir(wallet_dir.as_deref())
        .map_err(|e| eyre!("{e:#}"))?;

    Ok(client::AppConfig {
        network,
        wallet: client::WalletConfig::Keystore { name, dir },
        from_block,
        resolution,
    })
}

/// Logs go to a file; stdout belongs to the alternate screen.
fn init_file_logging() -> WorkerGuard {
    let appender = tracing_appender::rolling::never(LOG_DIR, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(writer)
        .try_init();
    guard
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let _log_guard = init_file_logging();
    tracing::info!("starting dice table client");
    deployments::ensure_structure().map_err(|e| eyre!("{e:#}"))?;
    let app_config = parse_cli_args()?;
    client::run_app(app_config).await
}
