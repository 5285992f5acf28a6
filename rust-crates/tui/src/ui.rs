use crate::client::AppSnapshot;
use color_eyre::eyre::Result;
use crossterm::{
    event::{
        Event,
        KeyCode,
        KeyEvent,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use dice_client::{
    GameState,
    LifecycleStatus,
    OperationLane,
    RollRecord,
    WinnerRecord,
    session::StreamStatus,
};
use ethers::{
    types::{
        Address,
        U256,
    },
    utils::format_ether,
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserEvent {
    Quit,
    Roll(OperationLane),
    Redraw,
}

#[derive(Default)]
pub struct UiState {
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // Create a single persistent Terminal to preserve buffers across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    if let Some(term) = state.terminal.as_mut() {
        term.draw(|f| ui(f, snap))?;
    }
    Ok(())
}

pub fn interpret_event(event: Event) -> Option<UserEvent> {
    match event {
        Event::Key(key) => interpret_key(key),
        Event::Resize(..) => Some(UserEvent::Redraw),
        _ => None,
    }
}

fn interpret_key(key: KeyEvent) -> Option<UserEvent> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(UserEvent::Quit)
        }
        KeyCode::Char('q') | KeyCode::Esc => Some(UserEvent::Quit),
        KeyCode::Char('r') => Some(UserEvent::Roll(OperationLane::Standard)),
        KeyCode::Char('g') => Some(UserEvent::Roll(OperationLane::Privileged)),
        _ => None,
    }
}

fn ui(f: &mut Frame, snap: &AppSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // wallet
            Constraint::Min(14),   // rolls | game | winners
            Constraint::Length(7), // status/errors
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_wallet_panel(f, chunks[0], snap);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(35),
            Constraint::Percentage(30),
            Constraint::Percentage(35),
        ])
        .split(chunks[1]);
    draw_rolls_panel(f, columns[0], &snap.session.rolls);
    draw_game_panel(f, columns[1], snap);
    draw_winners_panel(f, columns[2], &snap.session.winners);
    draw_status(f, chunks[2], snap);

    let help = Paragraph::new("r roll (0.002 ETH) | g rigged roll | q/Esc quit")
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, chunks[3]);
}

fn draw_wallet_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let balance = snap
        .wallet_balance
        .as_ref()
        .map(|b| format_eth(b.raw))
        .unwrap_or_else(|| "…".to_string());
    let text = format!("Player: {:?} | Balance: {} ETH", snap.player, balance);
    let widget =
        Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Wallet"));
    f.render_widget(widget, area);
}

fn draw_rolls_panel(f: &mut Frame, area: Rect, rolls: &[RollRecord]) {
    let items: Vec<ListItem> = if rolls.is_empty() {
        vec![ListItem::new("No rolls yet")]
    } else {
        rolls.iter().map(|r| ListItem::new(roll_line(r))).collect()
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Recent Rolls"));
    f.render_widget(list, area);
}

fn draw_winners_panel(f: &mut Frame, area: Rect, winners: &[WinnerRecord]) {
    let items: Vec<ListItem> = if winners.is_empty() {
        vec![ListItem::new("No winners yet")]
    } else {
        winners.iter().map(|w| ListItem::new(winner_line(w))).collect()
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Recent Winners"));
    f.render_widget(list, area);
}

fn draw_game_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let session = &snap.session;
    let prize = snap
        .prize
        .map(format_eth)
        .unwrap_or_else(|| "…".to_string());
    let rigged_balance = snap
        .rigged_roll_balance
        .as_ref()
        .map(|b| format_eth(b.raw))
        .unwrap_or_else(|| "…".to_string());

    let lines = vec![
        Line::from(format!("Prize: {prize} ETH")),
        Line::from(format!("Rigged roll: {}", short_address(snap.rigged_roll))),
        Line::from(format!("Rigged roll balance: {rigged_balance} ETH")),
        Line::from(""),
        Line::from(vec![
            lane_button('r', OperationLane::Standard, session.standard, session.actionable),
            Span::raw("  "),
            lane_button(
                'g',
                OperationLane::Privileged,
                session.privileged,
                session.actionable,
            ),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            dice_line(&session.state, session.rolled, &session.last_outcome_label),
            Style::default().add_modifier(Modifier::BOLD),
        )),
    ];
    let widget = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Game"));
    f.render_widget(widget, area);
}

fn draw_status(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let streams: Vec<String> = [
        ("Roll", &snap.session.roll_stream),
        ("Winner", &snap.session.winner_stream),
    ]
    .into_iter()
    .filter_map(|(name, status)| stream_line(name, status))
    .collect();

    let widget = if snap.errors.is_empty() && streams.is_empty() {
        let status = if snap.status.trim().is_empty() {
            "Ready"
        } else {
            snap.status.as_str()
        };
        Paragraph::new(status.to_string())
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(Color::Green))
    } else {
        let lines: Vec<Line> = streams
            .into_iter()
            .chain(snap.errors.iter().cloned())
            .map(Line::from)
            .collect();
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Errors"))
            .style(Style::default().fg(Color::Red))
    };
    f.render_widget(widget, area);
}

fn lane_button(
    key: char,
    lane: OperationLane,
    status: LifecycleStatus,
    actionable: bool,
) -> Span<'static> {
    let text = match status {
        LifecycleStatus::Submitted => format!("[{key}] {lane}: submitting"),
        LifecycleStatus::AwaitingConfirmation => format!("[{key}] {lane}: confirming"),
        LifecycleStatus::Failed => format!("[{key}] {lane} (failed)"),
        LifecycleStatus::Idle | LifecycleStatus::Resolved => format!("[{key}] {lane}"),
    };
    let style = if status.is_in_flight() {
        Style::default().fg(Color::Yellow)
    } else if actionable {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Span::styled(text, style)
}

fn dice_line(state: &GameState, rolled: bool, last_label: &str) -> String {
    match state {
        GameState::Rolling(in_flight) => format!("Rolling the dice ({})...", in_flight.lane),
        GameState::Resolved {
            outcome: Some(roll),
            ..
        } => format!("Rolled: {}", roll.outcome_label()),
        GameState::Resolved { outcome: None, .. } => format!("Rolled: {last_label}"),
        GameState::Idle if rolled => format!("Rolled: {last_label}"),
        GameState::Idle => format!("Last roll: {last_label}"),
    }
}

fn stream_line(name: &str, status: &StreamStatus) -> Option<String> {
    match status {
        StreamStatus::Replaying | StreamStatus::Live => None,
        StreamStatus::Resubscribing { attempt } => {
            Some(format!("{name} stream reconnecting (attempt {attempt})"))
        }
        StreamStatus::Stalled(err) => Some(format!("{err}: {}", err.source)),
    }
}

fn roll_line(roll: &RollRecord) -> String {
    format!(
        "{} {} ETH  {}",
        short_address(roll.player),
        format_eth(roll.amount),
        roll.outcome_label()
    )
}

fn winner_line(winner: &WinnerRecord) -> String {
    format!(
        "{} won {} ETH",
        short_address(winner.winner),
        format_eth(winner.amount)
    )
}

fn short_address(address: Address) -> String {
    let full = format!("{address:?}");
    format!("{}…{}", &full[..6], &full[full.len() - 4..])
}

/// Ether amount without trailing zeros.
fn format_eth(wei: U256) -> String {
    let full = format_ether(wei);
    match full.split_once('.') {
        Some((whole, frac)) => {
            let frac = frac.trim_end_matches('0');
            if frac.is_empty() {
                whole.to_string()
            } else {
                format!("{whole}.{frac}")
            }
        }
        None => full,
    }
}
