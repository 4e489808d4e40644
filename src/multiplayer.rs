//! Multiplayer session: the engine fed from a server-driven piece queue, broadcasting its state back.
//!
//! The session never touches the network itself. Inbound frames go through
//! [`MultiplayerSession::handle_message`]; outbound frames pile up in the [`Broadcaster`] and are
//! collected with [`MultiplayerSession::drain_outgoing`] by whoever owns the connection.

use crate::GameConfig;
use crate::game::{EndReason, Game, GameEvent, Phase, PieceSource, TurnHook};
use crate::grid::Grid;
use crate::highscores::ScoreEntry;
use crate::leaderboard::{LeaderboardEntry, Player, build_leaderboard};
use crate::piece::Piece;
use crate::protocol::{ClientMessage, ServerMessage};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::{debug, info, warn};

/// `PIECE` requests sent when the session is created.
pub const PRIME_REQUESTS: usize = 5;
/// Pieces that must be queued before the first turn can start.
pub const MIN_QUEUED_TO_START: usize = 2;
/// Outside a channel the lobby asks for the channel list this often.
pub const LIST_INTERVAL: Duration = Duration::from_secs(1);
/// Inside a channel the lobby asks for the member list this often.
pub const USERS_INTERVAL: Duration = Duration::from_secs(2);

/// Pieces received from the server, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct PieceQueue {
    pieces: VecDeque<Piece>,
}

impl PieceQueue {
    pub fn push(&mut self, piece: Piece) {
        self.pieces.push_back(piece);
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }
}

impl PieceSource for PieceQueue {
    fn draw(&mut self) -> Option<Piece> {
        self.pieces.pop_front()
    }
}

/// Collects the frames the engine wants sent, in the order it produced them.
#[derive(Debug, Clone, Default)]
pub struct Broadcaster {
    outbox: VecDeque<ClientMessage>,
}

impl Broadcaster {
    pub fn push(&mut self, message: ClientMessage) {
        self.outbox.push_back(message);
    }

    pub fn drain(&mut self) -> std::collections::vec_deque::Drain<'_, ClientMessage> {
        self.outbox.drain(..)
    }
}

impl TurnHook for Broadcaster {
    fn on_advance(&mut self, grid: &Grid) {
        self.push(ClientMessage::Board(grid.values().to_vec()));
        self.push(ClientMessage::RequestPiece);
        self.push(ClientMessage::RequestScores);
    }

    fn on_score(&mut self, score: u32) {
        self.push(ClientMessage::Score(score));
    }

    fn on_lives(&mut self, lives: u32) {
        self.push(ClientMessage::Lives(lives));
    }

    fn on_end(&mut self, reason: EndReason) {
        debug!(?reason, "announcing death");
        self.push(ClientMessage::Die);
    }
}

pub type MultiplayerGame = Game<PieceQueue, Broadcaster>;

/// Everything a multiplayer front end reacts to: engine events plus what the server tells us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Game(GameEvent),
    /// The first turn began.
    Started,
    LeaderboardChanged,
    BoardUpdate { player: String, values: Vec<i32> },
    ChatMessage(String),
    OnlineScores(Vec<ScoreEntry>),
    ServerError(String),
    NameConfirmed(String),
    Joined(String),
    /// The server made us host of our channel.
    HostGranted,
    Parted,
    UsersChanged,
    ChannelsChanged,
}

#[derive(Debug)]
pub struct MultiplayerSession {
    game: MultiplayerGame,
    players: Vec<Player>,
    leaderboard: Vec<LeaderboardEntry>,
    latest_message: Option<String>,
    boards: HashMap<String, Vec<i32>>,
    name: Option<String>,
    channel: Option<String>,
    is_host: bool,
    users: Vec<String>,
    channels: Vec<String>,
    /// Time since the last lobby poll.
    lobby_poll: Duration,
    start_pending: bool,
    events: Vec<SessionEvent>,
}

impl MultiplayerSession {
    /// New idle session, ready for lobby traffic. Nothing is queued for sending yet.
    pub fn new(config: GameConfig) -> Self {
        Self {
            game: Game::new(config, PieceQueue::default(), Broadcaster::default()),
            players: Vec::new(),
            leaderboard: Vec::new(),
            latest_message: None,
            boards: HashMap::new(),
            name: None,
            channel: None,
            is_host: false,
            users: Vec::new(),
            channels: Vec::new(),
            lobby_poll: LIST_INTERVAL,
            start_pending: false,
            events: Vec::new(),
        }
    }

    /// Applies one inbound frame. Unknown or malformed frames are logged and dropped.
    pub fn handle_message(&mut self, frame: &str) {
        let message = match ServerMessage::parse(frame) {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!(frame, "ignoring frame");
                return;
            }
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };
        debug!(?message, "received");
        match message {
            ServerMessage::Piece(piece) => {
                self.game.source_mut().push(piece);
                self.try_start();
            }
            ServerMessage::Scores(players) => {
                self.leaderboard = build_leaderboard(&players);
                self.players = players;
                self.events.push(SessionEvent::LeaderboardChanged);
            }
            ServerMessage::Msg(text) => {
                self.latest_message = Some(text.clone());
                self.events.push(SessionEvent::ChatMessage(text));
            }
            ServerMessage::Board { player, values } => {
                self.boards.insert(player.clone(), values.clone());
                self.events.push(SessionEvent::BoardUpdate { player, values });
            }
            ServerMessage::Start => self.begin(),
            ServerMessage::Error(text) => {
                warn!(%text, "server error");
                self.events.push(SessionEvent::ServerError(text));
            }
            ServerMessage::HiScores(scores) => self.events.push(SessionEvent::OnlineScores(scores)),
            ServerMessage::Nick(name) => {
                self.name = Some(name.clone());
                self.events.push(SessionEvent::NameConfirmed(name));
            }
            ServerMessage::Renamed { old, new } => {
                debug!(%old, %new, "player renamed");
                self.send(ClientMessage::RequestUsers);
            }
            ServerMessage::Join(channel) => {
                info!(%channel, "joined channel");
                self.channel = Some(channel.clone());
                self.lobby_poll = USERS_INTERVAL;
                self.events.push(SessionEvent::Joined(channel));
            }
            ServerMessage::Host => {
                info!("hosting channel");
                self.is_host = true;
                self.events.push(SessionEvent::HostGranted);
            }
            ServerMessage::Parted => {
                info!(channel = ?self.channel, "parted channel");
                self.channel = None;
                self.is_host = false;
                self.users.clear();
                self.lobby_poll = LIST_INTERVAL;
                self.events.push(SessionEvent::Parted);
            }
            ServerMessage::Users(users) => {
                if users != self.users {
                    self.users = users;
                    self.events.push(SessionEvent::UsersChanged);
                }
            }
            ServerMessage::Channels(channels) => {
                if channels != self.channels {
                    self.channels = channels;
                    self.events.push(SessionEvent::ChannelsChanged);
                }
            }
        }
    }

    /// Keeps the lobby fresh until the game starts: `LIST` outside a channel, `USERS` inside one.
    pub fn lobby_tick(&mut self, elapsed: Duration) {
        if self.start_pending || self.game.phase() != Phase::Idle {
            return;
        }
        self.lobby_poll = self.lobby_poll.saturating_add(elapsed);
        let (interval, request) = match self.channel {
            None => (LIST_INTERVAL, ClientMessage::List),
            Some(_) => (USERS_INTERVAL, ClientMessage::RequestUsers),
        };
        if self.lobby_poll >= interval {
            self.lobby_poll = Duration::ZERO;
            self.send(request);
        }
    }

    /// The channel's game began: asks for [`PRIME_REQUESTS`] pieces and starts as soon as two are in.
    fn begin(&mut self) {
        if self.start_pending || self.game.phase() != Phase::Idle {
            debug!("duplicate START ignored");
            return;
        }
        info!("game starting, priming piece queue");
        for _ in 0..PRIME_REQUESTS {
            self.send(ClientMessage::RequestPiece);
        }
        self.start_pending = true;
        self.try_start();
    }

    /// Starts the first turn once the server said START and enough pieces are buffered.
    fn try_start(&mut self) {
        if !self.start_pending || self.game.phase() != Phase::Idle {
            return;
        }
        let queued = self.game.source().len();
        if queued < MIN_QUEUED_TO_START {
            debug!(queued, "start deferred, waiting for pieces");
            return;
        }
        self.start_pending = false;
        self.game.start(0);
        self.collect_game_events();
        self.events.push(SessionEvent::Started);
    }

    /// Frames waiting to be sent, oldest first.
    pub fn drain_outgoing(&mut self) -> std::collections::vec_deque::Drain<'_, ClientMessage> {
        self.game.hook_mut().drain()
    }

    /// Asks the server to start the channel's game. Only the host may; returns false otherwise.
    pub fn request_start(&mut self) -> bool {
        if !self.is_host {
            debug!("not host, START not sent");
            return false;
        }
        self.send(ClientMessage::Start);
        true
    }

    pub fn create_channel(&mut self, channel: &str) {
        self.send(ClientMessage::Create(channel.to_string()));
    }

    pub fn join_channel(&mut self, channel: &str) {
        self.send(ClientMessage::Join(channel.to_string()));
    }

    /// Leaves the channel; local lobby state is cleared when `PARTED` comes back.
    pub fn part_channel(&mut self) {
        self.send(ClientMessage::Part);
    }

    pub fn set_nick(&mut self, name: &str) {
        self.send(ClientMessage::Nick(name.to_string()));
    }

    pub fn send_chat(&mut self, text: &str) {
        self.send(ClientMessage::Msg(text.to_string()));
    }

    pub fn request_online_scores(&mut self) {
        self.send(ClientMessage::HiScoresUnique);
    }

    pub fn submit_online_score(&mut self, entry: ScoreEntry) {
        self.send(ClientMessage::HiScore(entry));
    }

    /// Gives up: ends the local game, which announces `DIE`.
    pub fn die(&mut self) {
        self.game.quit();
    }

    /// Leaves the server. Dies first if still playing.
    pub fn quit(&mut self) {
        if self.game.phase() == Phase::Running {
            self.die();
        }
        self.send(ClientMessage::Quit);
    }

    /// The channel went away.
    pub fn connection_lost(&mut self) {
        if self.game.phase() == Phase::Idle {
            self.events.push(SessionEvent::Game(GameEvent::ConnectionLost));
            return;
        }
        self.game.connection_lost();
    }

    fn send(&mut self, message: ClientMessage) {
        self.game.hook_mut().push(message);
    }

    fn collect_game_events(&mut self) {
        let drained: Vec<GameEvent> = self.game.drain_events().collect();
        self.events.extend(drained.into_iter().map(SessionEvent::Game));
    }

    pub fn drain_events(&mut self) -> std::vec::Drain<'_, SessionEvent> {
        self.collect_game_events();
        self.events.drain(..)
    }

    pub fn game(&self) -> &MultiplayerGame {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut MultiplayerGame {
        &mut self.game
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn leaderboard(&self) -> &[LeaderboardEntry] {
        &self.leaderboard
    }

    pub fn latest_message(&self) -> Option<&str> {
        self.latest_message.as_deref()
    }

    pub fn boards(&self) -> &HashMap<String, Vec<i32>> {
        &self.boards
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn users(&self) -> &[String] {
        &self.users
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn is_start_pending(&self) -> bool {
        self.start_pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::timer_delay;
    use crate::piece::PieceKind;
    use std::time::Duration;

    fn session() -> MultiplayerSession {
        MultiplayerSession::new(GameConfig::multiplayer(5, 5))
    }

    fn outgoing(session: &mut MultiplayerSession) -> Vec<ClientMessage> {
        session.drain_outgoing().collect()
    }

    /// Session that received START and `pieces` dots, with the outbox and events cleared.
    fn running(pieces: usize) -> MultiplayerSession {
        let mut s = session();
        s.handle_message("START");
        for _ in 0..pieces {
            s.handle_message("PIECE 4");
        }
        outgoing(&mut s);
        s.drain_events().for_each(drop);
        s
    }

    #[test]
    fn test_start_primes_piece_requests() {
        let mut s = session();
        assert!(outgoing(&mut s).is_empty());
        s.handle_message("START");
        assert_eq!(outgoing(&mut s), vec![ClientMessage::RequestPiece; PRIME_REQUESTS]);
        assert_eq!(s.game().phase(), Phase::Idle);
        s.handle_message("START");
        assert!(outgoing(&mut s).is_empty());
    }

    #[test]
    fn test_start_waits_for_two_pieces() {
        let mut s = session();
        s.handle_message("START");
        assert!(s.is_start_pending());
        s.handle_message("PIECE 4");
        assert_eq!(s.game().phase(), Phase::Idle);
        s.handle_message("PIECE 1");
        assert_eq!(s.game().phase(), Phase::Running);
        assert_eq!(s.game().current_piece().map(Piece::kind), Some(PieceKind::Dot));
        assert_eq!(s.game().next_piece().map(Piece::kind), Some(PieceKind::Line));
        let events: Vec<_> = s.drain_events().collect();
        assert!(events.contains(&SessionEvent::Started));
        assert_eq!(s.game().lives(), 3);
        assert_eq!(s.game().score(), 0);
    }

    #[test]
    fn test_pieces_before_start_are_buffered() {
        let mut s = session();
        for _ in 0..3 {
            s.handle_message("PIECE 4");
        }
        assert_eq!(s.game().phase(), Phase::Idle);
        assert_eq!(s.game().source().len(), 3);
        s.handle_message("START");
        assert_eq!(s.game().phase(), Phase::Running);
        assert_eq!(s.game().source().len(), 1);
    }

    #[test]
    fn test_placement_broadcasts_board_then_piece_then_scores() {
        let mut s = running(4);
        assert!(s.game_mut().attempt_place(0, 0));
        let mut board = vec![0; 25];
        board[0] = PieceKind::Dot.value();
        assert_eq!(
            outgoing(&mut s),
            vec![
                ClientMessage::Board(board),
                ClientMessage::RequestPiece,
                ClientMessage::RequestScores,
            ]
        );
    }

    #[test]
    fn test_score_and_lives_sent_immediately() {
        let mut s = running(6);
        for x in 0..5 {
            s.handle_message("PIECE 4");
            assert!(s.game_mut().attempt_place(x, 0));
        }
        let sent = outgoing(&mut s);
        assert!(sent.contains(&ClientMessage::Score(50)));
        let score_at = sent.iter().position(|m| *m == ClientMessage::Score(50)).unwrap();
        assert!(matches!(sent[score_at + 1], ClientMessage::Board(_)));

        s.game_mut().tick(Duration::from_millis(timer_delay(0)));
        let sent = outgoing(&mut s);
        assert_eq!(sent.first(), Some(&ClientMessage::Lives(2)));
    }

    #[test]
    fn test_queue_underrun_ends_game() {
        let mut s = running(2);
        s.game_mut().attempt_place(2, 2);
        assert!(s.game().is_over());
        let events: Vec<_> = s.drain_events().collect();
        let lost = events
            .iter()
            .position(|e| *e == SessionEvent::Game(GameEvent::ConnectionLost))
            .unwrap();
        let over = events
            .iter()
            .position(|e| *e == SessionEvent::Game(GameEvent::GameOver(EndReason::ConnectionLost)))
            .unwrap();
        assert!(lost < over);
        assert_eq!(outgoing(&mut s).last(), Some(&ClientMessage::Die));
    }

    #[test]
    fn test_scores_rebuild_leaderboard() {
        let mut s = session();
        s.handle_message("SCORES alice:500:3\nbob:900:DEAD\n");
        let board = s.leaderboard();
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].display_name(), ":bob");
        assert_eq!(board[0].score, 900);
        assert_eq!(board[1].name, "alice");
        assert_eq!(s.players()[0].name, "alice");
        let events: Vec<_> = s.drain_events().collect();
        assert_eq!(events, vec![SessionEvent::LeaderboardChanged]);

        s.handle_message("SCORES alice:1200:2\nbob:900:DEAD");
        assert_eq!(s.leaderboard()[0].name, "alice");
        assert!(s.leaderboard()[1].dead);
    }

    #[test]
    fn test_board_chat_and_lobby_frames() {
        let mut s = session();
        s.handle_message("BOARD bob:0 1 0 2");
        s.handle_message("MSG bob:hi");
        s.handle_message("NICK ana");
        s.handle_message("JOIN lobby");
        s.handle_message("ERROR Channel full");
        assert_eq!(s.boards().get("bob"), Some(&vec![0, 1, 0, 2]));
        assert_eq!(s.latest_message(), Some("bob:hi"));
        assert_eq!(s.name(), Some("ana"));
        assert_eq!(s.channel(), Some("lobby"));
        let events: Vec<_> = s.drain_events().collect();
        assert_eq!(events.len(), 5);
        assert_eq!(events[4], SessionEvent::ServerError("Channel full".into()));
    }

    #[test]
    fn test_malformed_and_unknown_frames_ignored() {
        let mut s = session();
        for frame in ["PIECE 99", "PIECE", "garbage", "BOARD nobody", "HELLO a\nb", "piece 3"] {
            s.handle_message(frame);
        }
        assert!(s.game().source().is_empty());
        assert_eq!(s.drain_events().count(), 0);
    }

    #[test]
    fn test_oversized_board_is_dropped() {
        let mut s = session();
        let frame = format!("BOARD bob:{}", vec!["1"; 327_670].join(" "));
        s.handle_message(&frame);
        assert!(s.boards().is_empty());
        assert_eq!(s.drain_events().count(), 0);
    }

    #[test]
    fn test_lobby_polls_channels_then_users() {
        let mut s = session();
        s.lobby_tick(Duration::ZERO);
        assert_eq!(outgoing(&mut s), vec![ClientMessage::List]);
        s.lobby_tick(Duration::from_millis(500));
        assert!(outgoing(&mut s).is_empty());
        s.lobby_tick(Duration::from_millis(500));
        assert_eq!(outgoing(&mut s), vec![ClientMessage::List]);

        s.handle_message("JOIN lobby");
        s.lobby_tick(Duration::ZERO);
        assert_eq!(outgoing(&mut s), vec![ClientMessage::RequestUsers]);
        s.lobby_tick(LIST_INTERVAL);
        assert!(outgoing(&mut s).is_empty());
        s.lobby_tick(LIST_INTERVAL);
        assert_eq!(outgoing(&mut s), vec![ClientMessage::RequestUsers]);

        s.handle_message("START");
        outgoing(&mut s);
        s.lobby_tick(USERS_INTERVAL);
        assert!(outgoing(&mut s).is_empty());
    }

    #[test]
    fn test_lobby_membership_and_host() {
        let mut s = session();
        s.handle_message("CHANNELS lobby\nfriday");
        assert_eq!(s.channels(), ["lobby", "friday"]);
        s.handle_message("CHANNELS lobby\nfriday");
        s.handle_message("JOIN lobby");
        s.handle_message("USERS ana\nbob");
        assert_eq!(s.users(), ["ana", "bob"]);

        assert!(!s.request_start());
        assert!(outgoing(&mut s).is_empty());
        s.handle_message("HOST");
        assert!(s.is_host());
        assert!(s.request_start());
        assert_eq!(outgoing(&mut s), vec![ClientMessage::Start]);

        s.handle_message("NICK bob:robert");
        assert_eq!(outgoing(&mut s), vec![ClientMessage::RequestUsers]);

        s.part_channel();
        assert_eq!(outgoing(&mut s), vec![ClientMessage::Part]);
        assert_eq!(s.channel(), Some("lobby"));
        s.handle_message("PARTED");
        assert_eq!(s.channel(), None);
        assert!(!s.is_host());
        assert!(s.users().is_empty());

        let events: Vec<_> = s.drain_events().collect();
        assert_eq!(
            events,
            vec![
                SessionEvent::ChannelsChanged,
                SessionEvent::Joined("lobby".into()),
                SessionEvent::UsersChanged,
                SessionEvent::HostGranted,
                SessionEvent::Parted,
            ]
        );
    }

    #[test]
    fn test_die_then_quit() {
        let mut s = running(4);
        s.quit();
        assert!(s.game().is_over());
        assert_eq!(outgoing(&mut s), vec![ClientMessage::Die, ClientMessage::Quit]);
        s.quit();
        assert_eq!(outgoing(&mut s), vec![ClientMessage::Quit]);
    }

    #[test]
    fn test_outbound_helpers() {
        let mut s = session();
        outgoing(&mut s);
        s.set_nick("ana");
        s.join_channel("lobby");
        s.send_chat("gg");
        s.request_online_scores();
        s.submit_online_score(ScoreEntry::new("ana", 300));
        let text: Vec<String> = outgoing(&mut s).iter().map(ToString::to_string).collect();
        assert_eq!(
            text,
            vec!["NICK ana", "JOIN lobby", "MSG gg", "HISCORES UNIQUE", "HISCORE ana:300"]
        );
    }
}
