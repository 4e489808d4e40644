//! Draw: board with cursor and ghost piece, sidebar (pieces, stats, timer), leaderboard, popups.

use crate::app::Screen;
use matchgrid::game::{EndReason, Game, Phase, PieceSource, TurnHook};
use matchgrid::grid::{EMPTY, Grid, PENDING_CLEAR};
use matchgrid::highscores::ScoreEntry;
use matchgrid::leaderboard::LeaderboardEntry;
use matchgrid::multiplayer::MultiplayerSession;
use matchgrid::piece::{MASK_SIZE, Piece};
use ratatui::Frame;
use ratatui::buffer::Buffer;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Gauge, Paragraph, Widget};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tachyonfx::{
    CellFilter, Duration as TfxDuration, Effect, EffectRenderer, Interpolation, fx, ref_count,
};

/// Terminal columns and rows per board square.
const CELL_WIDTH: u16 = 4;
const CELL_HEIGHT: u16 = 2;
const SIDEBAR_WIDTH: u16 = 24;
const SIDE_PANEL_WIDTH: u16 = 26;
const FOOTER_HEIGHT: u16 = 3;
/// Pending-clear cells fade out over this long before they are emptied.
const LINE_CLEAR_FADE_MS: u32 = 350;
/// Spectate boards use one-row, two-column squares.
const MINI_CELL_WIDTH: u16 = 2;

const BG: Color = Color::Rgb(0x28, 0x2C, 0x34);
const DIV_LINE: Color = Color::Rgb(0x3F, 0x44, 0x4F);
const MAIN_FG: Color = Color::Rgb(0xAB, 0xB2, 0xBF);
const TITLE: Color = Color::Rgb(0xE5, 0xC0, 0x7B);
const INACTIVE_FG: Color = Color::Rgb(0x5C, 0x63, 0x70);
const FLASH: Color = Color::Rgb(0xFF, 0xFF, 0xFF);

/// Piece colours, indexed by piece value - 1.
const PIECE_COLORS: [Color; 15] = [
    Color::Rgb(0xE0, 0x6C, 0x75),
    Color::Rgb(0x98, 0xC3, 0x79),
    Color::Rgb(0xE5, 0xC0, 0x7B),
    Color::Rgb(0x61, 0xAF, 0xEF),
    Color::Rgb(0xC6, 0x78, 0xDD),
    Color::Rgb(0x56, 0xB6, 0xC2),
    Color::Rgb(0xD1, 0x9A, 0x66),
    Color::Rgb(0xBE, 0x50, 0x46),
    Color::Rgb(0x7E, 0xC1, 0x6E),
    Color::Rgb(0x4D, 0x78, 0xCC),
    Color::Rgb(0xA9, 0x6E, 0xD8),
    Color::Rgb(0x2B, 0xBA, 0xC5),
    Color::Rgb(0xF0, 0x8D, 0x49),
    Color::Rgb(0xEC, 0xBE, 0x7B),
    Color::Rgb(0x9D, 0xA5, 0xB4),
];

fn value_color(value: i32) -> Option<Color> {
    match value {
        PENDING_CLEAR => Some(FLASH),
        v if v > EMPTY => PIECE_COLORS.get((v - 1) as usize).copied(),
        _ => None,
    }
}

/// Engine state the renderer needs, independent of where pieces come from.
pub struct GameView<'a> {
    pub grid: &'a Grid,
    pub current: Option<&'a Piece>,
    pub next: Option<&'a Piece>,
    pub cursor: (i32, i32),
    pub score: u32,
    pub level: u32,
    pub lives: u32,
    pub multiplier: u32,
    pub high_score: u32,
    pub remaining_ms: u64,
    pub delay_ms: u64,
    pub phase: Phase,
}

impl<'a> GameView<'a> {
    pub fn of<S: PieceSource, H: TurnHook>(game: &'a Game<S, H>) -> Self {
        Self {
            grid: game.grid(),
            current: game.current_piece(),
            next: game.next_piece(),
            cursor: game.cursor(),
            score: game.score(),
            level: game.level(),
            lives: game.lives(),
            multiplier: game.multiplier(),
            high_score: game.high_score(),
            remaining_ms: game.timer().remaining_ms(),
            delay_ms: game.timer().delay_ms(),
            phase: game.phase(),
        }
    }
}

/// Multiplayer-only state: who we are, the leaderboard, chat and other players' boards.
pub struct MultiView<'a> {
    pub name: Option<&'a str>,
    pub channel: Option<&'a str>,
    pub leaderboard: &'a [LeaderboardEntry],
    pub latest_message: Option<&'a str>,
    pub boards: &'a HashMap<String, Vec<i32>>,
    pub users: &'a [String],
    pub channels: &'a [String],
    pub is_host: bool,
}

impl<'a> MultiView<'a> {
    pub fn of(session: &'a MultiplayerSession) -> Self {
        Self {
            name: session.name(),
            channel: session.channel(),
            leaderboard: session.leaderboard(),
            latest_message: session.latest_message(),
            boards: session.boards(),
            users: session.users(),
            channels: session.channels(),
            is_host: session.is_host(),
        }
    }
}

pub struct View<'a> {
    pub screen: &'a Screen,
    pub game: GameView<'a>,
    pub multi: Option<MultiView<'a>>,
    /// Last server error or connection notice.
    pub status: Option<&'a str>,
    pub scores: &'a [ScoreEntry],
    pub online_scores: &'a [ScoreEntry],
}

struct GameLayout {
    board: Rect,
    sidebar: Rect,
    side_panel: Option<Rect>,
    footer: Rect,
}

/// Splits the screen; the board's inner rect is shared by drawing and the line-clear effect.
fn game_layout(area: Rect, view: &View) -> GameLayout {
    let grid = view.game.grid;
    let board_w = grid.cols() as u16 * CELL_WIDTH + 2;
    let board_h = grid.rows() as u16 * CELL_HEIGHT + 2;
    let side_w = if view.multi.is_some() { SIDE_PANEL_WIDTH } else { 0 };
    let total_w = board_w + SIDEBAR_WIDTH + side_w;
    let body_h = board_h.max(20);

    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(body_h),
            Constraint::Length(FOOTER_HEIGHT),
            Constraint::Fill(1),
        ])
        .split(area);
    let horiz = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(total_w),
            Constraint::Fill(1),
        ])
        .split(vert[1]);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(board_w),
            Constraint::Length(SIDEBAR_WIDTH),
            Constraint::Length(side_w),
        ])
        .split(horiz[1]);
    let board_outer = Rect {
        height: board_h.min(columns[0].height),
        ..columns[0]
    };
    let footer = Rect {
        x: horiz[1].x,
        width: horiz[1].width,
        ..vert[2]
    };
    GameLayout {
        board: Block::default().borders(Borders::ALL).inner(board_outer),
        sidebar: columns[1],
        side_panel: view.multi.as_ref().map(|_| columns[2]),
        footer,
    }
}

/// Buffer rect of board square `(gx, gy)`, clipped to the board.
fn cell_rect(board: Rect, gx: usize, gy: usize) -> Rect {
    Rect {
        x: board.x + gx as u16 * CELL_WIDTH,
        y: board.y + gy as u16 * CELL_HEIGHT,
        width: CELL_WIDTH,
        height: CELL_HEIGHT,
    }
    .intersection(board)
}

fn fill(buf: &mut Buffer, rect: Rect, symbol: &str, style: Style) {
    for y in rect.top()..rect.bottom() {
        for x in rect.left()..rect.right() {
            if let Some(cell) = buf.cell_mut((x, y)) {
                cell.set_symbol(symbol).set_style(style);
            }
        }
    }
}

/// Buffer positions covered by pending-clear squares.
fn clearing_buffer_positions(board: Rect, grid: &Grid) -> HashSet<(u16, u16)> {
    let mut set = HashSet::new();
    for gy in 0..grid.rows() {
        for gx in 0..grid.cols() {
            if grid.get(gx as i32, gy as i32) != PENDING_CLEAR {
                continue;
            }
            let r = cell_rect(board, gx, gy);
            for y in r.top()..r.bottom() {
                for x in r.left()..r.right() {
                    set.insert((x, y));
                }
            }
        }
    }
    set
}

/// Create or update the clear-out fade over pending squares and process it.
fn apply_line_clear_effect(
    frame: &mut Frame,
    board: Rect,
    grid: &Grid,
    line_clear_effect: &mut Option<Effect>,
    line_clear_process_time: &mut Option<Instant>,
    now: Instant,
) {
    let delta = line_clear_process_time
        .map(|t| now.saturating_duration_since(t))
        .unwrap_or(std::time::Duration::ZERO);
    let delta_ms = delta.as_millis().min(u32::MAX as u128) as u32;
    let tfx_delta = TfxDuration::from_millis(delta_ms);
    *line_clear_process_time = Some(now);

    if line_clear_effect.is_none() {
        let clearing_set = clearing_buffer_positions(board, grid);
        let filter = CellFilter::PositionFn(ref_count(move |pos: Position| {
            clearing_set.contains(&(pos.x, pos.y))
        }));
        let effect = fx::fade_to(BG, BG, (LINE_CLEAR_FADE_MS, Interpolation::Linear))
            .with_filter(filter)
            .with_area(board);
        *line_clear_effect = Some(effect);
    }

    if let Some(effect) = line_clear_effect {
        frame.render_effect(effect, board, tfx_delta);
    }
}

/// Draw the current screen. While the grid holds pending-clear squares (and animation is on) the
/// fade effect runs and `line_clear_effect` is left for the caller to check with `done()`.
pub fn draw(
    frame: &mut Frame,
    view: &View,
    line_clear_effect: &mut Option<Effect>,
    line_clear_process_time: &mut Option<Instant>,
    now: Instant,
    no_animation: bool,
) {
    let area = frame.area();
    Block::default()
        .style(Style::default().bg(BG))
        .render(area, frame.buffer_mut());

    if let Screen::Lobby { selected } = view.screen {
        draw_lobby(frame, view, *selected, area);
        return;
    }

    let layout = game_layout(area, view);
    draw_board(frame, view, &layout);
    draw_sidebar(frame, &view.game, layout.sidebar);
    if let (Some(multi), Some(panel)) = (&view.multi, layout.side_panel) {
        draw_side_panel(frame, multi, view.game.grid.cols(), panel);
    }
    draw_footer(frame, view, layout.footer);

    if view.game.grid.has_pending() && !no_animation {
        apply_line_clear_effect(
            frame,
            layout.board,
            view.game.grid,
            line_clear_effect,
            line_clear_process_time,
            now,
        );
    }

    if let Screen::GameOver { .. } = view.screen {
        draw_game_over(frame, view, area);
    }
}

fn draw_board(frame: &mut Frame, view: &View, layout: &GameLayout) {
    let game = &view.game;
    let grid = game.grid;
    let outer = Rect {
        x: layout.board.x.saturating_sub(1),
        y: layout.board.y.saturating_sub(1),
        width: layout.board.width + 2,
        height: layout.board.height + 2,
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(DIV_LINE).bg(BG))
        .title(Span::styled(" Matchgrid ", Style::default().fg(TITLE)))
        .render(outer, frame.buffer_mut());

    let buf = frame.buffer_mut();
    for gy in 0..grid.rows() {
        for gx in 0..grid.cols() {
            let r = cell_rect(layout.board, gx, gy);
            match value_color(grid.get(gx as i32, gy as i32)) {
                Some(c) => fill(buf, r, "█", Style::default().fg(c).bg(c)),
                None => {
                    let dot = if (gx + gy) % 2 == 0 { BG } else { DIV_LINE };
                    fill(buf, r, " ", Style::default().bg(dot));
                }
            }
        }
    }

    if game.phase != Phase::Running {
        return;
    }
    let (cx, cy) = game.cursor;
    if let Some(piece) = game.current {
        let fits = grid.can_place(piece, cx, cy);
        let color = PIECE_COLORS[(piece.value() - 1) as usize];
        for (dx, dy) in piece.cells() {
            let (gx, gy) = (cx + dx, cy + dy);
            if !grid.in_bounds(gx, gy) {
                continue;
            }
            let r = cell_rect(layout.board, gx as usize, gy as usize);
            let style = if fits {
                Style::default().fg(color).bg(BG)
            } else {
                Style::default().fg(Color::Red).bg(BG)
            };
            fill(buf, r, if fits { "▒" } else { "░" }, style);
        }
    }
    if grid.in_bounds(cx, cy) {
        let r = cell_rect(layout.board, cx as usize, cy as usize);
        if let Some(cell) = buf.cell_mut((r.x + r.width / 2, r.y + r.height / 2)) {
            cell.set_symbol("◆").set_style(Style::default().fg(FLASH));
        }
    }
}

fn sidebar_block<'a>() -> Block<'a> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(DIV_LINE).bg(BG))
}

fn draw_sidebar(frame: &mut Frame, game: &GameView, area: Rect) {
    let title_style = Style::default().fg(TITLE);
    let fg_style = Style::default().fg(MAIN_FG);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(6), // Pieces (border + titles + 3x3 previews)
            Constraint::Length(8), // Stats
            Constraint::Length(4), // Timer
        ])
        .split(area);

    // --- Pieces: current and next side by side ---
    let pieces_block = sidebar_block();
    let pieces_inner = pieces_block.inner(chunks[0]);
    pieces_block.render(chunks[0], frame.buffer_mut());
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 2), Constraint::Ratio(1, 2)])
        .split(pieces_inner);
    for (half, (label, piece)) in halves
        .iter()
        .zip([("Current", game.current), ("Next", game.next)])
    {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Length(MASK_SIZE as u16)])
            .split(*half);
        Paragraph::new(Line::from(Span::styled(label, title_style)))
            .alignment(Alignment::Center)
            .render(rows[0], frame.buffer_mut());
        if let Some(piece) = piece {
            draw_piece_preview(frame.buffer_mut(), piece, rows[1]);
        }
    }

    // --- Stats ---
    let stats_block = sidebar_block();
    let stats_inner = stats_block.inner(chunks[1]);
    stats_block.render(chunks[1], frame.buffer_mut());
    let stat = |label: &'static str, value: String| {
        Line::from(vec![
            Span::styled(label, title_style),
            Span::styled(value, fg_style),
        ])
    };
    let stats_lines = vec![
        stat("Score: ", game.score.to_string()),
        stat("Best: ", game.high_score.to_string()),
        stat("Level: ", game.level.to_string()),
        stat("Lives: ", game.lives.to_string()),
        stat("Multiplier: ", format!("x{}", game.multiplier)),
        stat("Piece: ", game.current.map(ToString::to_string).unwrap_or_default()),
    ];
    Paragraph::new(Text::from(stats_lines)).render(stats_inner, frame.buffer_mut());

    // --- Timer: seconds left above, bar below ---
    let timer_block = sidebar_block();
    let timer_inner = timer_block.inner(chunks[2]);
    timer_block.render(chunks[2], frame.buffer_mut());
    let timer_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(timer_inner);
    let ratio = if game.delay_ms > 0 {
        (game.remaining_ms as f64 / game.delay_ms as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };
    Paragraph::new(Line::from(Span::styled(
        format!("Time {}s", game.remaining_ms.div_ceil(1000)),
        title_style,
    )))
    .render(timer_layout[0], frame.buffer_mut());
    let bar_color = if ratio > 0.6 {
        Color::Green
    } else if ratio > 0.3 {
        Color::Yellow
    } else {
        Color::Red
    };
    Gauge::default()
        .ratio(ratio)
        .label("")
        .gauge_style(Style::default().fg(bar_color).bg(DIV_LINE))
        .render(timer_layout[1], frame.buffer_mut());
}

/// 3x3 mask preview, two columns per square, centred in `area`.
fn draw_piece_preview(buf: &mut Buffer, piece: &Piece, area: Rect) {
    let color = PIECE_COLORS[(piece.value() - 1) as usize];
    let w = MASK_SIZE as u16 * 2;
    let off_x = area.width.saturating_sub(w) / 2;
    for (row, cols) in piece.blocks().iter().enumerate() {
        for (col, &filled) in cols.iter().enumerate() {
            let r = Rect {
                x: area.x + off_x + col as u16 * 2,
                y: area.y + row as u16,
                width: 2,
                height: 1,
            }
            .intersection(area);
            if filled {
                fill(buf, r, "█", Style::default().fg(color).bg(color));
            } else {
                fill(buf, r, "·", Style::default().fg(DIV_LINE).bg(BG));
            }
        }
    }
}

/// Leaderboard, then other players' boards as far as they fit.
fn draw_side_panel(frame: &mut Frame, multi: &MultiView, cols: usize, area: Rect) {
    let title_style = Style::default().fg(TITLE);
    let board_rows = u16::try_from(multi.leaderboard.len().max(1))
        .unwrap_or(u16::MAX)
        .saturating_add(2);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(board_rows), Constraint::Fill(1)])
        .split(area);

    let lines: Vec<Line> = multi
        .leaderboard
        .iter()
        .map(|entry| {
            let me = multi.name == Some(entry.name.as_str());
            let style = if entry.dead {
                Style::default()
                    .fg(INACTIVE_FG)
                    .add_modifier(Modifier::CROSSED_OUT)
            } else if me {
                Style::default().fg(TITLE).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(MAIN_FG)
            };
            Line::from(Span::styled(
                format!("{:<14}{:>8}", entry.display_name(), entry.score),
                style,
            ))
        })
        .collect();
    let title = match multi.channel {
        Some(channel) => format!(" {channel} "),
        None => " Players ".to_string(),
    };
    Paragraph::new(lines)
        .block(sidebar_block().title(Span::styled(title, title_style)))
        .render(chunks[0], frame.buffer_mut());

    let cols = cols.max(1);
    let width = u16::try_from(cols)
        .unwrap_or(u16::MAX)
        .saturating_mul(MINI_CELL_WIDTH)
        .saturating_add(2)
        .min(chunks[1].width);
    let mut y = chunks[1].y;
    let mut names: Vec<&String> = multi
        .boards
        .keys()
        .filter(|name| multi.name != Some(name.as_str()))
        .collect();
    names.sort();
    for name in names {
        let values = &multi.boards[name];
        let h = u16::try_from(values.len().div_ceil(cols))
            .unwrap_or(u16::MAX)
            .saturating_add(2);
        if y.saturating_add(h) > chunks[1].bottom() {
            break;
        }
        let outer = Rect {
            x: chunks[1].x,
            y,
            width,
            height: h,
        };
        let block = sidebar_block().title(Span::styled(name.as_str(), Style::default().fg(MAIN_FG)));
        let inner = block.inner(outer);
        block.render(outer, frame.buffer_mut());
        let buf = frame.buffer_mut();
        for (i, &v) in values.iter().enumerate() {
            let (Ok(col), Ok(row)) = (u16::try_from(i % cols), u16::try_from(i / cols)) else {
                break;
            };
            let r = Rect {
                x: inner.x.saturating_add(col.saturating_mul(MINI_CELL_WIDTH)),
                y: inner.y.saturating_add(row),
                width: MINI_CELL_WIDTH,
                height: 1,
            }
            .intersection(inner);
            match value_color(v) {
                Some(c) => fill(buf, r, "█", Style::default().fg(c).bg(c)),
                None => fill(buf, r, "·", Style::default().fg(DIV_LINE).bg(BG)),
            }
        }
        y = y.saturating_add(h);
    }
}

/// Chat line (or chat input), plus the key help.
fn draw_footer(frame: &mut Frame, view: &View, area: Rect) {
    let fg = Style::default().fg(MAIN_FG);
    let mut lines = Vec::new();
    match view.screen {
        Screen::Chat(text) => lines.push(Line::from(vec![
            Span::styled("Say: ", Style::default().fg(TITLE)),
            Span::styled(format!("{text}_"), fg),
        ])),
        _ => {
            if let Some(msg) = view.multi.as_ref().and_then(|m| m.latest_message) {
                lines.push(Line::from(Span::styled(msg.to_string(), fg)));
            }
        }
    }
    if let Some(status) = view.status {
        lines.push(Line::from(Span::styled(
            status.to_string(),
            Style::default().fg(Color::Red),
        )));
    }
    let chat = if view.multi.is_some() { "  T chat" } else { "" };
    lines.push(Line::from(Span::styled(
        format!("Arrows/WASD move  Enter/X place  Q/E rotate  Space swap{chat}  Esc quit"),
        Style::default().fg(INACTIVE_FG),
    )));
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .render(area, frame.buffer_mut());
}

fn popup_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    }
}

fn score_lines<'a>(title: &'a str, scores: &'a [ScoreEntry], highlight: Option<usize>) -> Vec<Line<'a>> {
    let mut lines = vec![Line::from(Span::styled(title, Style::default().fg(TITLE)))];
    for (i, entry) in scores.iter().enumerate() {
        let style = if highlight == Some(i) {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(MAIN_FG)
        };
        lines.push(Line::from(Span::styled(
            format!("{:>2}. {:<16}{:>7}", i + 1, entry.name, entry.score),
            style,
        )));
    }
    lines
}

fn draw_game_over(frame: &mut Frame, view: &View, area: Rect) {
    let Screen::GameOver {
        reason,
        name_entry,
        rank,
    } = view.screen
    else {
        return;
    };
    let title = match reason {
        EndReason::OutOfLives => " Out of time! ",
        EndReason::ConnectionLost => " Connection lost ",
        EndReason::Quit => " Game Over ",
    };
    let fg = Style::default().fg(MAIN_FG);
    let mut lines: Vec<Line> = vec![
        Line::from(""),
        Line::from(Span::styled(
            title,
            Style::default().fg(Color::White).bg(Color::Red),
        )),
        Line::from(""),
        Line::from(Span::styled(format!(" Score: {} ", view.game.score), fg)),
        Line::from(Span::styled(format!(" Level: {} ", view.game.level), fg)),
        Line::from(""),
    ];
    match name_entry {
        Some(name) => {
            lines.push(Line::from(Span::styled(
                " New high score! ",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from(vec![
                Span::styled(" Name: ", Style::default().fg(TITLE)),
                Span::styled(format!("{name}_"), fg),
            ]));
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(" Enter save ", fg)));
        }
        None => {
            lines.extend(score_lines(" High scores ", view.scores, *rank));
            if !view.online_scores.is_empty() {
                lines.push(Line::from(""));
                lines.extend(score_lines(" Online ", view.online_scores, None));
            }
            lines.push(Line::from(""));
            let restart = if view.multi.is_none() { " R restart  " } else { " " };
            lines.push(Line::from(Span::styled(format!("{restart}Esc quit "), fg)));
        }
    }
    let height = lines.len() as u16 + 2;
    let popup = popup_rect(area, 40, height);
    Clear.render(popup, frame.buffer_mut());
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .style(Style::default().bg(BG))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(DIV_LINE).bg(BG))
                .title(Span::styled(" Matchgrid ", Style::default().fg(TITLE))),
        )
        .render(popup, frame.buffer_mut());
}

fn draw_lobby(frame: &mut Frame, view: &View, selected: usize, area: Rect) {
    let fg = Style::default().fg(MAIN_FG);
    let heading = Style::default().fg(TITLE).add_modifier(Modifier::BOLD);
    let Some(multi) = view.multi.as_ref() else {
        return;
    };
    let mut lines = vec![Line::from("")];
    if let Some(name) = multi.name {
        lines.push(Line::from(Span::styled(format!(" You are {name} "), fg)));
        lines.push(Line::from(""));
    }
    let help = match multi.channel {
        Some(channel) => {
            lines.push(Line::from(Span::styled(format!(" {channel} "), heading)));
            let waiting = if multi.is_host {
                " You host this channel "
            } else {
                " Waiting for the host to start "
            };
            lines.push(Line::from(Span::styled(waiting, fg)));
            lines.push(Line::from(""));
            for user in multi.users {
                let style = if multi.name == Some(user.as_str()) {
                    Style::default().fg(TITLE)
                } else {
                    fg
                };
                lines.push(Line::from(Span::styled(format!(" {user} "), style)));
            }
            if multi.is_host {
                " Enter start  Esc leave channel "
            } else {
                " Esc leave channel "
            }
        }
        None => {
            lines.push(Line::from(Span::styled(" Open channels ", heading)));
            lines.push(Line::from(""));
            if multi.channels.is_empty() {
                lines.push(Line::from(Span::styled(" None yet ", Style::default().fg(INACTIVE_FG))));
            }
            for (i, channel) in multi.channels.iter().enumerate() {
                let line = if i == selected {
                    Span::styled(format!("> {channel} <"), Style::default().fg(BG).bg(TITLE))
                } else {
                    Span::styled(format!("  {channel}  "), fg)
                };
                lines.push(Line::from(line));
            }
            " Up/Down select  Enter join  Esc quit "
        }
    };
    if let Some(msg) = multi.latest_message {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(format!(" {msg} "), fg)));
    }
    if let Some(status) = view.status {
        lines.push(Line::from(Span::styled(
            format!(" {status} "),
            Style::default().fg(Color::Red),
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(help, Style::default().fg(INACTIVE_FG))));
    let height = u16::try_from(lines.len()).unwrap_or(u16::MAX).saturating_add(2);
    let popup = popup_rect(area, 44, height);
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(DIV_LINE).bg(BG))
                .title(Span::styled(" Matchgrid ", Style::default().fg(TITLE))),
        )
        .render(popup, frame.buffer_mut());
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchgrid::GameConfig;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn buffer_text(buf: &Buffer) -> String {
        buf.content().iter().map(|cell| cell.symbol()).collect()
    }

    #[test]
    fn test_oversized_remote_board_is_skipped() {
        let mut boards = HashMap::new();
        boards.insert("alf".to_string(), vec![1; 25]);
        boards.insert("bob".to_string(), vec![1; 327_670]);
        let multi = MultiView {
            name: Some("ana"),
            channel: Some("lobby"),
            leaderboard: &[],
            latest_message: None,
            boards: &boards,
            users: &[],
            channels: &[],
            is_host: false,
        };
        let mut terminal = Terminal::new(TestBackend::new(SIDE_PANEL_WIDTH, 30)).unwrap();
        terminal
            .draw(|f| draw_side_panel(f, &multi, 5, f.area()))
            .unwrap();
        let text = buffer_text(terminal.backend().buffer());
        assert!(text.contains("alf"));
        assert!(!text.contains("bob"));
    }

    #[test]
    fn test_lobby_lists_channels_with_selection() {
        let mut session = MultiplayerSession::new(GameConfig::multiplayer(5, 5));
        session.handle_message("CHANNELS lobby\nfriday");
        let screen = Screen::Lobby { selected: 1 };
        let view = View {
            screen: &screen,
            game: GameView::of(session.game()),
            multi: Some(MultiView::of(&session)),
            status: None,
            scores: &[],
            online_scores: &[],
        };
        let mut terminal = Terminal::new(TestBackend::new(80, 30)).unwrap();
        terminal
            .draw(|f| draw(f, &view, &mut None, &mut None, Instant::now(), true))
            .unwrap();
        let text = buffer_text(terminal.backend().buffer());
        assert!(text.contains("> friday <"));
        assert!(text.contains("  lobby  "));
        assert!(text.contains("Enter join"));
    }
}
