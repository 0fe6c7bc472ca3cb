//! Live status panel with controller keys

use crate::client::Client;
use crate::ui;
use anyhow::Result;
use caspar_amcp::ConnectionStatusDetails;
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::crossterm::execute;
use ratatui::crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::Terminal;
use std::io;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Connect,
    Update,
    Show,
    Hide,
    ToggleAuto,
    Quit,
}

pub fn action_for(code: KeyCode) -> Option<Action> {
    match code {
        KeyCode::Char('c') => Some(Action::Connect),
        KeyCode::Char('u') => Some(Action::Update),
        KeyCode::Char('o') => Some(Action::Show),
        KeyCode::Char('f') => Some(Action::Hide),
        KeyCode::Char('a') => Some(Action::ToggleAuto),
        KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
        _ => None,
    }
}

pub struct Panel {
    pub status: Option<ConnectionStatusDetails>,
    pub message: String,
}

impl Default for Panel {
    fn default() -> Self {
        Self::new()
    }
}

impl Panel {
    pub fn new() -> Self {
        Self {
            status: None,
            message: "Waiting for casparclock...".to_string(),
        }
    }

    async fn refresh(&mut self, client: &Client) {
        match client.status().await {
            Ok(status) => self.status = Some(status),
            Err(e) => {
                self.status = None;
                self.message = format!("Error: {e:#}");
            }
        }
    }

    async fn apply(&mut self, client: &Client, action: Action) {
        let outcome = match action {
            Action::Connect => client.connect().await.map(|status| status.message),
            Action::Update => client
                .update_clock()
                .await
                .map(|result| format!("Clock set to {}", result.time)),
            Action::Show => client
                .toggle_overlay(true)
                .await
                .map(|_| "Overlay shown".to_string()),
            Action::Hide => client
                .toggle_overlay(false)
                .await
                .map(|_| "Overlay hidden".to_string()),
            Action::ToggleAuto => {
                let enabled = !self
                    .status
                    .as_ref()
                    .map_or(true, |status| status.auto_update_enabled);
                client.set_auto_update(enabled).await.map(|response| {
                    if response.auto_update_enabled {
                        "Auto-update on".to_string()
                    } else {
                        "Auto-update off".to_string()
                    }
                })
            }
            Action::Quit => return,
        };
        self.message = match outcome {
            Ok(message) => message,
            Err(e) => format!("Error: {e:#}"),
        };
    }
}

pub async fn run(client: &Client) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let res = run_panel(&mut terminal, client).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    res
}

async fn run_panel<B: Backend>(terminal: &mut Terminal<B>, client: &Client) -> Result<()> {
    let mut panel = Panel::new();
    let mut last_poll: Option<Instant> = None;

    loop {
        if last_poll.map_or(true, |at| at.elapsed() >= POLL_INTERVAL) {
            panel.refresh(client).await;
            last_poll = Some(Instant::now());
        }

        terminal.draw(|f| ui::draw(f, &panel))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match action_for(key.code) {
                    Some(Action::Quit) => return Ok(()),
                    Some(action) => {
                        panel.apply(client, action).await;
                        // show the effect right away instead of on the next poll
                        last_poll = None;
                    }
                    None => {}
                }
            }
        }
    }
}
