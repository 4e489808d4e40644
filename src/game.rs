//! Game engine: piece supply, placement, line clears, scoring, level, lives and the turn timer.
//!
//! One [`Game`] type serves both modes. Where pieces come from is a [`PieceSource`] (local RNG in
//! single player, a network-fed queue in multiplayer) and what gets announced at each turn boundary
//! is a [`TurnHook`]. Everything the engine does is reported as a [`GameEvent`]; consumers drain them
//! with [`Game::drain_events`].

use crate::GameConfig;
use crate::grid::{Grid, LineClear};
use crate::piece::{PIECE_COUNT, Piece};
use crate::timer::{GameTimer, TimerEvent};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Turn delay at level 0.
pub const BASE_DELAY_MS: u64 = 12_000;
/// Delay removed per level.
pub const DELAY_STEP_MS: u64 = 500;
/// Shortest turn delay.
pub const MIN_DELAY_MS: u64 = 2_500;
/// Points needed per level.
pub const POINTS_PER_LEVEL: u32 = 1_000;

/// Turn delay for `level`: `max(2500, 12000 - 500 * level)` ms.
pub fn timer_delay(level: u32) -> u64 {
    BASE_DELAY_MS
        .saturating_sub(DELAY_STEP_MS * u64::from(level))
        .max(MIN_DELAY_MS)
}

/// Points for a clear: `blocks * lines * 10 * multiplier`.
pub fn clear_score(blocks: usize, lines: usize, multiplier: u32) -> u32 {
    blocks
        .checked_mul(lines)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(u32::MAX)
        .saturating_mul(10)
        .saturating_mul(multiplier)
}

/// Level reached at `score`: one per [`POINTS_PER_LEVEL`].
pub fn level_for_score(score: u32) -> u32 {
    score / POINTS_PER_LEVEL
}

/// Supplies pieces to the engine. `None` means the supply ran dry.
pub trait PieceSource {
    fn draw(&mut self) -> Option<Piece>;
}

/// Uniformly random pieces from the full catalogue.
#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: StdRng,
}

impl RandomSource {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }
}

impl Default for RandomSource {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PieceSource for RandomSource {
    fn draw(&mut self) -> Option<Piece> {
        Piece::create(self.rng.gen_range(0..PIECE_COUNT))
    }
}

/// Called by the engine at its extension points. Default methods do nothing.
pub trait TurnHook {
    /// Before pieces advance, with the board as it stands after the last move.
    fn on_advance(&mut self, _grid: &Grid) {}
    fn on_score(&mut self, _score: u32) {}
    fn on_lives(&mut self, _lives: u32) {}
    /// Once, when the game reaches its terminal state.
    fn on_end(&mut self, _reason: EndReason) {}
}

/// Hook for single player: nothing leaves the engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBroadcast;

impl TurnHook for NoBroadcast {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The timer ran out with no lives left.
    OutOfLives,
    /// The piece supply ran dry (multiplayer network loss).
    ConnectionLost,
    /// The player gave up.
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    PieceChanged { current: Piece, next: Piece },
    PlaceRejected { x: i32, y: i32 },
    Placed { x: i32, y: i32, piece: Piece },
    Cleared { clear: LineClear, points: u32 },
    ScoreChanged(u32),
    LevelChanged(u32),
    LivesChanged(u32),
    MultiplierChanged(u32),
    HighScoreChanged(u32),
    Rotated(Piece),
    Swapped { current: Piece, next: Piece },
    CursorMoved { x: i32, y: i32 },
    TimerRestarted { delay_ms: u64 },
    TimerTick { remaining_ms: u64 },
    /// The turn timer expired and a life was spent (or the game ended).
    TimeUp,
    ConnectionLost,
    GameOver(EndReason),
}

/// Single game session. Idle until [`Game::start`], Ended after [`EndReason`] fires; no state changes after that.
#[derive(Debug)]
pub struct Game<S = RandomSource, H = NoBroadcast> {
    config: GameConfig,
    grid: Grid,
    source: S,
    hook: H,
    timer: GameTimer,
    phase: Phase,
    current: Option<Piece>,
    next: Option<Piece>,
    score: u32,
    level: u32,
    lives: u32,
    multiplier: u32,
    high_score: u32,
    cursor: (i32, i32),
    events: Vec<GameEvent>,
}

impl<S: PieceSource, H: TurnHook> Game<S, H> {
    pub fn new(config: GameConfig, source: S, hook: H) -> Self {
        Self {
            grid: Grid::new(config.cols, config.rows),
            timer: GameTimer::new(config.tick_ms),
            config,
            source,
            hook,
            phase: Phase::Idle,
            current: None,
            next: None,
            score: 0,
            level: 0,
            lives: 0,
            multiplier: 1,
            high_score: 0,
            cursor: (0, 0),
            events: Vec::new(),
        }
    }

    /// Idle -> Running: resets score/level/lives/multiplier, draws two pieces and arms the timer.
    pub fn start(&mut self, high_score: u32) {
        if self.phase != Phase::Idle {
            warn!(phase = ?self.phase, "start ignored");
            return;
        }
        info!(
            cols = self.config.cols,
            rows = self.config.rows,
            lives = self.config.starting_lives,
            "starting game"
        );
        self.phase = Phase::Running;
        self.set_score(self.config.starting_score);
        self.set_multiplier(1);
        self.set_level(level_for_score(self.config.starting_score));
        self.set_lives(self.config.starting_lives);
        self.high_score = high_score;
        self.events.push(GameEvent::HighScoreChanged(high_score));
        self.track_high_score();
        self.advance(true);
    }

    /// Places the current piece centred on `(x, y)`. Returns false (and emits `PlaceRejected`) if it does not fit.
    pub fn attempt_place(&mut self, x: i32, y: i32) -> bool {
        if self.phase != Phase::Running {
            return false;
        }
        let piece = match self.current {
            Some(p) => p,
            None => return false,
        };
        if !self.grid.can_place(&piece, x, y) {
            debug!(%piece, x, y, "can't place piece, cells busy or off board");
            self.events.push(GameEvent::PlaceRejected { x, y });
            return false;
        }
        debug!(%piece, x, y, "placing piece");
        self.grid.place(&piece, x, y);
        self.events.push(GameEvent::Placed { x, y, piece });
        self.resolve_lines();
        self.advance(false);
        true
    }

    pub fn place_at_cursor(&mut self) -> bool {
        let (x, y) = self.cursor;
        self.attempt_place(x, y)
    }

    /// Rotates the current piece: three quarter-turns for left, one for right. Does not touch the timer.
    pub fn rotate(&mut self, left: bool) {
        if self.phase != Phase::Running {
            return;
        }
        if let Some(piece) = self.current.as_mut() {
            piece.rotate(if left { 3 } else { 1 });
            debug!(%piece, rotation = piece.rotation(), "piece rotated");
            let piece = *piece;
            self.events.push(GameEvent::Rotated(piece));
        }
    }

    /// Exchanges current and next piece. Does not draw or touch the timer.
    pub fn swap(&mut self) {
        if self.phase != Phase::Running {
            return;
        }
        std::mem::swap(&mut self.current, &mut self.next);
        if let (Some(current), Some(next)) = (self.current, self.next) {
            self.events.push(GameEvent::Swapped { current, next });
        }
    }

    /// Moves the keyboard cursor one square; stays put at the board edge.
    pub fn move_cursor(&mut self, direction: Direction) {
        if self.phase != Phase::Running {
            return;
        }
        let (x, y) = self.cursor;
        let (nx, ny) = match direction {
            Direction::Up => (x, y - 1),
            Direction::Down => (x, y + 1),
            Direction::Left => (x - 1, y),
            Direction::Right => (x + 1, y),
        };
        if self.grid.in_bounds(nx, ny) {
            self.cursor = (nx, ny);
            self.events.push(GameEvent::CursorMoved { x: nx, y: ny });
        }
    }

    /// Feeds elapsed time to the turn timer and handles expiry.
    pub fn tick(&mut self, elapsed: Duration) {
        if self.phase != Phase::Running {
            return;
        }
        match self.timer.tick(elapsed) {
            TimerEvent::Zero => self.on_time_up(),
            TimerEvent::Counting { remaining_ms } => {
                self.events.push(GameEvent::TimerTick { remaining_ms });
            }
            TimerEvent::Stopped | TimerEvent::Restarted { .. } => {}
        }
    }

    /// Resolves pending-clear cells to empty once their clear-out has been shown.
    pub fn finish_clear(&mut self) -> usize {
        self.grid.finalize_clears()
    }

    /// Supply lost: reports it and ends the game.
    pub fn connection_lost(&mut self) {
        if self.phase == Phase::Ended {
            return;
        }
        warn!("piece supply lost, ending game");
        self.events.push(GameEvent::ConnectionLost);
        self.end(EndReason::ConnectionLost);
    }

    pub fn quit(&mut self) {
        self.end(EndReason::Quit);
    }

    pub fn drain_events(&mut self) -> std::vec::Drain<'_, GameEvent> {
        self.events.drain(..)
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_over(&self) -> bool {
        self.phase == Phase::Ended
    }

    pub fn current_piece(&self) -> Option<&Piece> {
        self.current.as_ref()
    }

    pub fn next_piece(&self) -> Option<&Piece> {
        self.next.as_ref()
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn lives(&self) -> u32 {
        self.lives
    }

    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    pub fn high_score(&self) -> u32 {
        self.high_score
    }

    pub fn cursor(&self) -> (i32, i32) {
        self.cursor
    }

    pub fn timer(&self) -> &GameTimer {
        &self.timer
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn hook_mut(&mut self) -> &mut H {
        &mut self.hook
    }

    /// Scores the clears left by the last placement and updates multiplier, level and high score.
    fn resolve_lines(&mut self) {
        let clear = self.grid.resolve_lines();
        let lines = clear.lines();
        let blocks = clear.blocks();
        let points = clear_score(blocks, lines, self.multiplier);
        debug!(
            rows = clear.rows.len(),
            cols = clear.cols.len(),
            lines,
            blocks,
            multiplier = self.multiplier,
            points,
            "lines resolved"
        );
        if lines > 0 {
            info!(lines, blocks, points, "clearing lines");
            self.events.push(GameEvent::Cleared { clear, points });
        }
        self.set_score(self.score.saturating_add(points));
        self.track_high_score();

        if lines == 0 {
            self.set_multiplier(1);
        } else {
            self.set_multiplier(self.multiplier + 1);
        }

        self.set_level(self.level.max(level_for_score(self.score)));
    }

    /// Spends a life, or ends the game when none are left.
    fn on_time_up(&mut self) {
        self.events.push(GameEvent::TimeUp);
        if self.lives == 0 {
            info!(score = self.score, "out of lives");
            self.end(EndReason::OutOfLives);
            return;
        }
        debug!(lives = self.lives - 1, "turn timed out");
        self.set_lives(self.lives - 1);
        self.set_multiplier(1);
        self.advance(false);
    }

    /// Moves next into current and draws a new next; on the first call draws both.
    fn advance(&mut self, initial: bool) {
        self.hook.on_advance(&self.grid);
        let current = if initial {
            self.source.draw()
        } else {
            self.next.take()
        };
        let next = self.source.draw();
        match (current, next) {
            (Some(current), Some(next)) => {
                debug!(%current, %next, "next piece");
                self.current = Some(current);
                self.next = Some(next);
                self.events.push(GameEvent::PieceChanged { current, next });
                let delay_ms = timer_delay(self.level);
                if let TimerEvent::Restarted { delay_ms } = self.timer.reset(delay_ms) {
                    self.events.push(GameEvent::TimerRestarted { delay_ms });
                }
            }
            (current, _) => {
                self.current = current;
                self.connection_lost();
            }
        }
    }

    fn end(&mut self, reason: EndReason) {
        if self.phase == Phase::Ended {
            return;
        }
        info!(?reason, score = self.score, level = self.level, "game over");
        self.phase = Phase::Ended;
        self.timer.stop();
        self.hook.on_end(reason);
        self.events.push(GameEvent::GameOver(reason));
    }

    fn track_high_score(&mut self) {
        if self.score > self.high_score {
            self.high_score = self.score;
            self.events.push(GameEvent::HighScoreChanged(self.score));
        }
    }

    fn set_score(&mut self, score: u32) {
        if score != self.score {
            self.score = score;
            self.events.push(GameEvent::ScoreChanged(score));
            self.hook.on_score(score);
        }
    }

    fn set_level(&mut self, level: u32) {
        if level != self.level {
            self.level = level;
            self.events.push(GameEvent::LevelChanged(level));
        }
    }

    fn set_lives(&mut self, lives: u32) {
        if lives != self.lives {
            self.lives = lives;
            self.events.push(GameEvent::LivesChanged(lives));
            self.hook.on_lives(lives);
        }
    }

    fn set_multiplier(&mut self, multiplier: u32) {
        if multiplier != self.multiplier {
            self.multiplier = multiplier;
            self.events.push(GameEvent::MultiplierChanged(multiplier));
        }
    }
}

impl Game<RandomSource, NoBroadcast> {
    /// Single-player game with local random pieces.
    pub fn single_player(config: GameConfig, seed: Option<u64>) -> Self {
        Self::new(config, RandomSource::new(seed), NoBroadcast)
    }
}
