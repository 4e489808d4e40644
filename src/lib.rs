//! Matchgrid: place 3x3 pieces on a small grid and clear full rows and columns before the turn timer
//! runs out. Single player with local random pieces, or multiplayer against a shared piece sequence
//! served over a WebSocket channel.

pub mod game;
pub mod grid;
pub mod highscores;
pub mod leaderboard;
pub mod multiplayer;
pub mod net;
pub mod piece;
pub mod protocol;
pub mod timer;

pub use game::{Direction, EndReason, Game, GameEvent, Phase, PieceSource, RandomSource, TurnHook};
pub use grid::{Grid, LineClear};
pub use highscores::{ScoreEntry, ScoreError, ScoreStore};
pub use multiplayer::{MultiplayerGame, MultiplayerSession, SessionEvent};
pub use piece::{Piece, PieceKind};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage};

/// Board size, starting values and timer granularity for one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameConfig {
    pub cols: usize,
    pub rows: usize,
    pub starting_lives: u32,
    pub starting_score: u32,
    /// Countdown step of the turn timer.
    pub tick_ms: u64,
}

impl GameConfig {
    /// Multiplayer games always start from three lives and zero score.
    pub fn multiplayer(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            ..Self::default()
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            cols: 5,
            rows: 5,
            starting_lives: 3,
            starting_score: 0,
            tick_ms: timer::DEFAULT_STEP_MS,
        }
    }
}
