//! App: terminal init, main loop, key handling and the network pump.

use crate::input::{Action, key_to_action};
use crate::ui::{self, GameView, MultiView, View};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use matchgrid::GameConfig;
use matchgrid::game::{Direction, EndReason, Game, GameEvent, Phase, PieceSource, TurnHook};
use matchgrid::highscores::{ScoreEntry, ScoreStore};
use matchgrid::multiplayer::{MultiplayerSession, SessionEvent};
use matchgrid::net::{self, NetworkEvent, NetworkHandle};
use matchgrid::protocol::ClientMessage;
use ratatui::DefaultTerminal;
use std::time::{Duration, Instant};
use tachyonfx::Effect;
use tracing::{debug, error, info, warn};

/// Frame budget: input is polled for at most this long per loop.
const FRAME: Duration = Duration::from_millis(16);
const MAX_NAME_LEN: usize = 16;
const MAX_CHAT_LEN: usize = 120;
const DEFAULT_NAME: &str = "Player";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    /// Multiplayer: browsing channels or waiting in one for the host to start.
    Lobby {
        /// Highlighted entry of the channel list.
        selected: usize,
    },
    Playing,
    /// Typing a chat line; the game keeps running underneath.
    Chat(String),
    GameOver {
        reason: EndReason,
        /// Name being typed for a qualifying score.
        name_entry: Option<String>,
        /// Where the saved score landed in the local table.
        rank: Option<usize>,
    },
}

/// Where to connect and which channel to play in.
#[derive(Debug, Clone)]
pub struct MultiOptions {
    pub server: String,
    /// Channel to enter right away; without one the lobby lists open channels.
    pub channel: Option<String>,
    pub name: Option<String>,
    pub host: bool,
}

enum Session {
    Single { game: Game, seed: Option<u64> },
    Multi { session: MultiplayerSession, net: NetworkHandle },
}

pub struct App {
    session: Session,
    config: GameConfig,
    screen: Screen,
    scores: ScoreStore,
    online_scores: Vec<ScoreEntry>,
    status: Option<String>,
    no_animation: bool,
    last_tick: Instant,
    /// TachyonFX fade over pending-clear squares (created when a clear shows up).
    line_clear_effect: Option<Effect>,
    /// Last time we processed the line-clear effect (for delta).
    line_clear_effect_process_time: Option<Instant>,
}

impl App {
    pub fn single(config: GameConfig, seed: Option<u64>, scores: ScoreStore, no_animation: bool) -> Self {
        let mut game = Game::single_player(config, seed);
        game.start(scores.high_score());
        Self::new(Session::Single { game, seed }, config, Screen::Playing, scores, no_animation)
    }

    /// Connects, announces our name and creates or joins the channel.
    pub fn multi(
        config: GameConfig,
        options: &MultiOptions,
        scores: ScoreStore,
        no_animation: bool,
    ) -> Result<Self> {
        let net = net::connect(&options.server)?;
        if let Some(name) = &options.name {
            net.send(&ClientMessage::Nick(name.clone()))?;
        }
        if let Some(channel) = &options.channel {
            let join = if options.host {
                ClientMessage::Create(channel.clone())
            } else {
                ClientMessage::Join(channel.clone())
            };
            net.send(&join)?;
        }
        info!(server = %options.server, channel = ?options.channel, host = options.host, "entering lobby");
        let session = MultiplayerSession::new(config);
        Ok(Self::new(
            Session::Multi { session, net },
            config,
            Screen::Lobby { selected: 0 },
            scores,
            no_animation,
        ))
    }

    fn new(session: Session, config: GameConfig, screen: Screen, scores: ScoreStore, no_animation: bool) -> Self {
        Self {
            session,
            config,
            screen,
            scores,
            online_scores: Vec::new(),
            status: None,
            no_animation,
            last_tick: Instant::now(),
            line_clear_effect: None,
            line_clear_effect_process_time: None,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        use crossterm::{
            execute,
            terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
        };

        enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let mut terminal = DefaultTerminal::new(ratatui::backend::CrosstermBackend::new(stdout))?;

        let result = self.run_loop(&mut terminal);
        if let Err(e) = &result {
            error!(error = %e, "main loop failed");
        }
        self.leave();

        // Restore
        execute!(std::io::stdout(), LeaveAlternateScreen)?;
        disable_raw_mode()?;

        result
    }

    fn run_loop(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        loop {
            let now = Instant::now();
            let mut effect = self.line_clear_effect.take();
            let mut effect_time = self.line_clear_effect_process_time.take();
            terminal.draw(|f| {
                let view = self.view();
                ui::draw(f, &view, &mut effect, &mut effect_time, now, self.no_animation);
            })?;
            self.line_clear_effect = effect;
            self.line_clear_effect_process_time = effect_time;

            if self.line_clear_effect.as_ref().is_some_and(Effect::done) {
                self.finish_clear();
            }

            let timeout = FRAME.saturating_sub(now.elapsed());
            if event::poll(timeout)? {
                while event::poll(Duration::ZERO)? {
                    if let Event::Key(key) = event::read()? {
                        if key.kind != KeyEventKind::Press {
                            continue;
                        }
                        if !self.handle_key(key) {
                            return Ok(());
                        }
                    }
                }
            }

            self.pump_network();
            let elapsed = self.last_tick.elapsed();
            self.last_tick = Instant::now();
            match &mut self.session {
                Session::Single { game, .. } => game.tick(elapsed),
                Session::Multi { session, .. } => {
                    session.lobby_tick(elapsed);
                    session.game_mut().tick(elapsed);
                }
            }
            self.process_events();
            self.flush_outgoing();

            if self.no_animation && self.has_pending_clear() {
                self.finish_clear();
            }
        }
    }

    fn view(&self) -> View<'_> {
        let (game, multi) = match &self.session {
            Session::Single { game, .. } => (GameView::of(game), None),
            Session::Multi { session, .. } => (GameView::of(session.game()), Some(MultiView::of(session))),
        };
        View {
            screen: &self.screen,
            game,
            multi,
            status: self.status.as_deref(),
            scores: self.scores.entries(),
            online_scores: &self.online_scores,
        }
    }

    /// Returns false when the app should exit.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        let action = key_to_action(key);
        match &mut self.screen {
            Screen::Lobby { selected } => {
                let Session::Multi { session, .. } = &mut self.session else {
                    return action != Action::Quit;
                };
                let in_channel = session.channel().is_some();
                match action {
                    Action::Quit if in_channel && key.code == KeyCode::Esc => session.part_channel(),
                    Action::Quit => return false,
                    Action::CursorUp => *selected = selected.saturating_sub(1),
                    Action::CursorDown => {
                        *selected = (*selected + 1).min(session.channels().len().saturating_sub(1));
                    }
                    Action::Place if in_channel => {
                        if !session.request_start() {
                            self.status = Some("Only the host can start the game".to_string());
                        }
                    }
                    Action::Place => {
                        if let Some(channel) = session.channels().get(*selected).cloned() {
                            session.join_channel(&channel);
                        }
                    }
                    _ => {}
                }
            }
            Screen::Playing => {
                if action == Action::Chat && matches!(self.session, Session::Multi { .. }) {
                    self.screen = Screen::Chat(String::new());
                } else {
                    match &mut self.session {
                        Session::Single { game, .. } => apply_action(game, action),
                        Session::Multi { session, .. } => {
                            if action == Action::Quit {
                                session.die();
                            } else {
                                apply_action(session.game_mut(), action);
                            }
                        }
                    }
                }
            }
            Screen::Chat(text) => match key.code {
                KeyCode::Enter => {
                    let text = std::mem::take(text);
                    if let Session::Multi { session, .. } = &mut self.session {
                        if !text.trim().is_empty() {
                            session.send_chat(text.trim());
                        }
                    }
                    self.screen = Screen::Playing;
                }
                KeyCode::Esc => self.screen = Screen::Playing,
                KeyCode::Backspace => {
                    text.pop();
                }
                KeyCode::Char(c) if text.len() < MAX_CHAT_LEN => text.push(c),
                _ => {}
            },
            Screen::GameOver {
                name_entry: Some(name),
                ..
            } => match key.code {
                KeyCode::Enter => {
                    let name = match name.trim() {
                        "" => DEFAULT_NAME.to_string(),
                        n => n.to_string(),
                    };
                    self.save_score(name);
                }
                KeyCode::Esc => return false,
                KeyCode::Backspace => {
                    name.pop();
                }
                KeyCode::Char(c) if c != ':' && !c.is_whitespace() && name.chars().count() < MAX_NAME_LEN => {
                    name.push(c);
                }
                _ => {}
            },
            Screen::GameOver { .. } => match (action, key.code) {
                (Action::Quit, _) | (_, KeyCode::Char('q')) => return false,
                (Action::Swap, KeyCode::Char('r' | 'R')) => self.restart(),
                _ => {}
            },
        }
        true
    }

    /// Inbound frames and connection state, from the network thread.
    fn pump_network(&mut self) {
        let Session::Multi { session, net } = &mut self.session else {
            return;
        };
        for event in net.poll() {
            match event {
                NetworkEvent::Connected => self.status = None,
                NetworkEvent::Message(text) => session.handle_message(&text),
                NetworkEvent::Disconnected(reason) => {
                    warn!(%reason, "lost connection to server");
                    self.status = Some(format!("Disconnected: {reason}"));
                    session.connection_lost();
                }
            }
        }
    }

    fn flush_outgoing(&mut self) {
        let Session::Multi { session, net } = &mut self.session else {
            return;
        };
        for message in session.drain_outgoing() {
            if let Err(e) = net.send(&message) {
                warn!(error = %e, %message, "send failed");
                self.status = Some(e.to_string());
                break;
            }
        }
    }

    fn process_events(&mut self) {
        let events: Vec<SessionEvent> = match &mut self.session {
            Session::Single { game, .. } => game.drain_events().map(SessionEvent::Game).collect(),
            Session::Multi { session, .. } => session.drain_events().collect(),
        };
        for event in events {
            match event {
                SessionEvent::Game(GameEvent::GameOver(reason)) => self.enter_game_over(reason),
                SessionEvent::Game(GameEvent::Cleared { clear, points }) => {
                    debug!(lines = clear.lines(), points, "clear to animate");
                    self.line_clear_effect = None;
                    self.line_clear_effect_process_time = None;
                }
                SessionEvent::Game(_) => {}
                SessionEvent::Started => self.screen = Screen::Playing,
                SessionEvent::ServerError(text) => self.status = Some(text),
                SessionEvent::OnlineScores(scores) => self.online_scores = scores,
                SessionEvent::NameConfirmed(name) => info!(%name, "name confirmed"),
                SessionEvent::Joined(channel) => self.status = Some(format!("Joined {channel}")),
                SessionEvent::HostGranted => self.status = Some("You are the host".to_string()),
                SessionEvent::Parted => {
                    self.status = Some("Left the channel".to_string());
                    if matches!(self.screen, Screen::Lobby { .. }) {
                        self.screen = Screen::Lobby { selected: 0 };
                    }
                }
                SessionEvent::ChannelsChanged => {
                    let count = match &self.session {
                        Session::Multi { session, .. } => session.channels().len(),
                        Session::Single { .. } => 0,
                    };
                    if let Screen::Lobby { selected } = &mut self.screen {
                        *selected = (*selected).min(count.saturating_sub(1));
                    }
                }
                SessionEvent::UsersChanged
                | SessionEvent::ChatMessage(_)
                | SessionEvent::LeaderboardChanged
                | SessionEvent::BoardUpdate { .. } => {}
            }
        }
    }

    fn enter_game_over(&mut self, reason: EndReason) {
        let score = self.game_score();
        let name_entry = (score > 0 && self.scores.qualifies(score)).then(|| match &self.session {
            Session::Multi { session, .. } => session.name().unwrap_or_default().to_string(),
            Session::Single { .. } => String::new(),
        });
        if let Session::Multi { session, .. } = &mut self.session {
            session.request_online_scores();
        }
        info!(?reason, score, qualifies = name_entry.is_some(), "game over screen");
        self.screen = Screen::GameOver {
            reason,
            name_entry,
            rank: None,
        };
    }

    fn save_score(&mut self, name: String) {
        let score = self.game_score();
        let rank = self.scores.insert(name.clone(), score);
        if let Err(e) = self.scores.save() {
            error!(error = %e, path = %self.scores.path().display(), "could not save scores");
            self.status = Some(format!("Could not save scores: {e}"));
        }
        if let Session::Multi { session, .. } = &mut self.session {
            session.submit_online_score(ScoreEntry::new(name, score));
            session.request_online_scores();
        }
        if let Screen::GameOver { reason, .. } = self.screen {
            self.screen = Screen::GameOver {
                reason,
                name_entry: None,
                rank,
            };
        }
    }

    fn restart(&mut self) {
        let Session::Single { seed, .. } = &self.session else {
            return;
        };
        let seed = *seed;
        let mut game = Game::single_player(self.config, seed);
        game.start(self.scores.high_score());
        info!("restarting");
        self.session = Session::Single { game, seed };
        self.screen = Screen::Playing;
        self.status = None;
        self.line_clear_effect = None;
        self.line_clear_effect_process_time = None;
        self.last_tick = Instant::now();
    }

    /// Says goodbye to the server before the terminal is restored.
    fn leave(&mut self) {
        if let Session::Multi { session, .. } = &mut self.session {
            session.quit();
        }
        self.flush_outgoing();
    }

    fn finish_clear(&mut self) {
        let resolved = match &mut self.session {
            Session::Single { game, .. } => game.finish_clear(),
            Session::Multi { session, .. } => session.game_mut().finish_clear(),
        };
        debug!(resolved, "clear finished");
        self.line_clear_effect = None;
        self.line_clear_effect_process_time = None;
    }

    fn has_pending_clear(&self) -> bool {
        match &self.session {
            Session::Single { game, .. } => game.grid().has_pending(),
            Session::Multi { session, .. } => session.game().grid().has_pending(),
        }
    }

    fn game_score(&self) -> u32 {
        match &self.session {
            Session::Single { game, .. } => game.score(),
            Session::Multi { session, .. } => session.game().score(),
        }
    }
}

fn apply_action<S: PieceSource, H: TurnHook>(game: &mut Game<S, H>, action: Action) {
    if game.phase() != Phase::Running {
        return;
    }
    match action {
        Action::CursorUp => game.move_cursor(Direction::Up),
        Action::CursorDown => game.move_cursor(Direction::Down),
        Action::CursorLeft => game.move_cursor(Direction::Left),
        Action::CursorRight => game.move_cursor(Direction::Right),
        Action::Place => {
            game.place_at_cursor();
        }
        Action::RotateLeft => game.rotate(true),
        Action::RotateRight => game.rotate(false),
        Action::Swap => game.swap(),
        Action::Quit => game.quit(),
        Action::Chat | Action::None => {}
    }
}
