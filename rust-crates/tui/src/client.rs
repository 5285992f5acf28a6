use crate::ui;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use crossterm::event::EventStream;
use deployments::{
    DeploymentEnv,
    DeploymentStore,
    wallets,
};
use dice_client::{
    DiceSession,
    Ledger,
    OperationLane,
    ResolutionPolicy,
    SessionConfig,
    ledger::{
        Balance,
        EthersLedger,
    },
    session::{
        SessionSnapshot,
        SessionUpdate,
        StreamStatus,
    },
};
use ethers::{
    signers::Signer,
    types::{
        Address,
        U256,
    },
};
use futures::StreamExt;
use std::{
    path::PathBuf,
    str::FromStr,
    sync::Arc,
    time::Duration,
};
use tokio::time::MissedTickBehavior;

#[cfg(test)]
mod tests;

pub const DEFAULT_LOCAL_RPC_URL: &str = "http://127.0.0.1:8545";
pub const DEFAULT_SEPOLIA_RPC_URL: &str = "https://rpc.sepolia.org";

const BALANCE_REFRESH_INTERVAL: Duration = Duration::from_secs(5);
const MAX_ERRORS: usize = 5;

#[derive(Clone, Debug)]
pub enum NetworkTarget {
    Local { url: String },
    Sepolia { url: String },
}

impl NetworkTarget {
    pub fn url(&self) -> &str {
        match self {
            NetworkTarget::Local { url } | NetworkTarget::Sepolia { url } => url,
        }
    }

    pub fn env(&self) -> DeploymentEnv {
        match self {
            NetworkTarget::Local { .. } => DeploymentEnv::Local,
            NetworkTarget::Sepolia { .. } => DeploymentEnv::Sepolia,
        }
    }
}

#[derive(Clone, Debug)]
pub enum WalletConfig {
    Keystore { name: String, dir: PathBuf },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: NetworkTarget,
    pub wallet: WalletConfig,
    pub from_block: Option<u64>,
    pub resolution: ResolutionPolicy,
}

/// Everything one frame needs.
#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub session: SessionSnapshot,
    pub player: Address,
    pub wallet_balance: Option<Balance>,
    pub prize: Option<U256>,
    pub rigged_roll: Address,
    pub rigged_roll_balance: Option<Balance>,
    pub status: String,
    pub errors: Vec<String>,
}

pub struct AppController<L: Ledger> {
    session: DiceSession<L>,
    player: Address,
    wallet_balance: Option<Balance>,
    prize: Option<U256>,
    rigged_roll_balance: Option<Balance>,
    balances_stale: bool,
    status: String,
    errors: Vec<String>,
}

impl<L: Ledger> AppController<L> {
    pub fn new(session: DiceSession<L>, player: Address) -> Self {
        Self {
            session,
            player,
            wallet_balance: None,
            prize: None,
            rigged_roll_balance: None,
            balances_stale: true,
            status: "Replaying history".to_string(),
            errors: Vec::new(),
        }
    }

    pub fn roll(&mut self, lane: OperationLane) {
        match self.session.select(lane) {
            Ok(updates) => {
                self.errors.clear();
                self.set_status(format!("Rolling ({lane})"));
                self.absorb(updates);
            }
            Err(err) => self.push_error(err.to_string()),
        }
    }

    /// Waits for the session to move. Returns whether anything visible changed.
    pub async fn next_update(&mut self) -> bool {
        let updates = self.session.next_update().await;
        self.absorb(updates)
    }

    pub fn balances_stale(&self) -> bool {
        self.balances_stale
    }

    pub async fn refresh_balances(&mut self) {
        self.balances_stale = false;
        match self.session.prize().await {
            Ok(prize) => self.prize = Some(prize),
            Err(err) => self.push_error(format!("prize: {err}")),
        }
        match self.session.balance(self.player).await {
            Ok(balance) => self.wallet_balance = Some(balance),
            Err(err) => self.push_error(format!("wallet balance: {err}")),
        }
        match self.session.rigged_roll_balance().await {
            Ok(balance) => self.rigged_roll_balance = Some(balance),
            Err(err) => self.push_error(format!("rigged roll balance: {err}")),
        }
    }

    pub fn snapshot(&self) -> AppSnapshot {
        AppSnapshot {
            session: self.session.snapshot(),
            player: self.player,
            wallet_balance: self.wallet_balance.clone(),
            prize: self.prize,
            rigged_roll: self.session.rigged_roll_address(),
            rigged_roll_balance: self.rigged_roll_balance.clone(),
            status: self.status.clone(),
            errors: self.errors.clone(),
        }
    }

    fn absorb(&mut self, updates: Vec<SessionUpdate>) -> bool {
        let changed = !updates.is_empty();
        for update in updates {
            match update {
                SessionUpdate::RollsChanged => {}
                SessionUpdate::WinnersChanged => self.balances_stale = true,
                SessionUpdate::Lane { lane, status } => {
                    tracing::debug!(%lane, ?status, "lane changed");
                }
                SessionUpdate::Resolved { lane, outcome } => {
                    let label = outcome
                        .map(|roll| roll.outcome_label())
                        .unwrap_or_else(|| "?".to_string());
                    self.set_status(format!("{lane} resolved: {label}"));
                    self.balances_stale = true;
                }
                SessionUpdate::Failure(failure) => self.push_error(failure.to_string()),
                SessionUpdate::Stream { topic, status } => match status {
                    StreamStatus::Replaying => {}
                    StreamStatus::Live => self.set_status(format!("{topic} stream live")),
                    StreamStatus::Resubscribing { attempt } => {
                        self.set_status(format!("{topic} stream reconnecting (attempt {attempt})"))
                    }
                    StreamStatus::Stalled(err) => self.push_error(err.to_string()),
                },
            }
        }
        changed
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
    }

    fn push_error(&mut self, message: String) {
        tracing::warn!(%message, "surfacing error");
        self.errors.push(message);
        if self.errors.len() > MAX_ERRORS {
            let excess = self.errors.len() - MAX_ERRORS;
            self.errors.drain(..excess);
        }
    }
}

fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw).map_err(|_| eyre!("unable to parse address: {raw}"))
}

async fn connect(config: &AppConfig) -> Result<AppController<EthersLedger>> {
    let env = config.network.env();
    let store = DeploymentStore::new(env).map_err(|e| eyre!("{e:#}"))?;
    let record = store
        .latest()
        .map_err(|e| eyre!("{e:#}"))?
        .ok_or_else(|| eyre!("No deployment recorded for {env}; run dice-deploy first"))?;
    let dice_game = parse_address(&record.dice_game_address)?;
    let rigged_roll = parse_address(&record.contract_address)?;

    let WalletConfig::Keystore { name, dir } = &config.wallet;
    let descriptor = wallets::find_wallet(dir, name).map_err(|e| eyre!("{e:#}"))?;
    let wallet = wallets::unlock_wallet(&descriptor).map_err(|e| eyre!("{e:#}"))?;
    let player = wallet.address();

    let ledger = EthersLedger::connect(config.network.url(), wallet, dice_game, rigged_roll)
        .await
        .wrap_err("connecting to the ledger failed")?;
    let from_block = config
        .from_block
        .or(record.deployment_block)
        .unwrap_or_default();
    tracing::info!(
        network = %env,
        url = config.network.url(),
        ?dice_game,
        ?rigged_roll,
        from_block,
        "connected"
    );

    let session_config = SessionConfig::default()
        .with_from_block(from_block)
        .with_resolution(config.resolution);
    let session = DiceSession::start(Arc::new(ledger), session_config);
    Ok(AppController::new(session, player))
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    // Keystore password prompt has to happen before raw mode.
    let controller = connect(&config).await?;
    let mut ui_state = ui::UiState::default();

    tracing::info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(controller, &mut ui_state).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop<L: Ledger>(
    mut controller: AppController<L>,
    ui_state: &mut ui::UiState,
) -> Result<()> {
    let mut input_events = EventStream::new();
    let mut refresh = tokio::time::interval(BALANCE_REFRESH_INTERVAL);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

    ui::draw(ui_state, &controller.snapshot()).wrap_err("initial draw failed")?;

    loop {
        tokio::select! {
            changed = controller.next_update() => {
                if controller.balances_stale() {
                    controller.refresh_balances().await;
                }
                if changed {
                    ui::draw(ui_state, &controller.snapshot())
                        .wrap_err("draw after session update failed")?;
                }
            }
            _ = refresh.tick() => {
                controller.refresh_balances().await;
                ui::draw(ui_state, &controller.snapshot())
                    .wrap_err("draw after balance refresh failed")?;
            }
            _ = tokio::signal::ctrl_c() => break,
            maybe_event = input_events.next() => {
                let Some(event) = maybe_event else {
                    tracing::warn!("terminal input closed");
                    break;
                };
                let event = event.wrap_err("reading terminal input failed")?;
                match ui::interpret_event(event) {
                    Some(ui::UserEvent::Quit) => break,
                    Some(ui::UserEvent::Roll(lane)) => {
                        controller.roll(lane);
                        ui::draw(ui_state, &controller.snapshot())
                            .wrap_err("draw after roll request failed")?;
                    }
                    Some(ui::UserEvent::Redraw) => {
                        ui::draw(ui_state, &controller.snapshot())
                            .wrap_err("redraw failed")?;
                    }
                    None => {}
                }
            }
        }
    }
    tracing::info!("leaving dice table");
    Ok(())
}
