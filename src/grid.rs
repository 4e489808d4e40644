//! Grid: cols x rows board of cell values, placement checks and row/column clears.

use crate::piece::Piece;
use std::collections::HashSet;

/// Empty cell.
pub const EMPTY: i32 = 0;

/// Cell cleared by a line but not yet finalised back to [`EMPTY`]. Blocks placement.
pub const PENDING_CLEAR: i32 = -1;

/// Returned by [`Grid::get`] for coordinates outside the board.
pub const INVALID: i32 = -1;

/// Full rows and columns found after a placement, and the distinct cells they cover.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineClear {
    pub rows: Vec<usize>,
    pub cols: Vec<usize>,
    /// `(x, y)` of every cell marked for clearing, each listed once.
    pub cells: Vec<(usize, usize)>,
}

impl LineClear {
    pub fn lines(&self) -> usize {
        self.rows.len() + self.cols.len()
    }

    pub fn blocks(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines() == 0
    }
}

/// Board of cell values. `0` is empty, `1..=15` a piece value, [`PENDING_CLEAR`] a cell being cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    cols: usize,
    rows: usize,
    /// Row-major: `cells[y * cols + x]`.
    cells: Vec<i32>,
}

impl Grid {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            cells: vec![EMPTY; cols * rows],
        }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        (x < self.cols && y < self.rows).then(|| y * self.cols + x)
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        self.index(x, y).is_some()
    }

    /// Cell value, or [`INVALID`] outside the board.
    #[inline]
    pub fn get(&self, x: i32, y: i32) -> i32 {
        self.index(x, y).map_or(INVALID, |i| self.cells[i])
    }

    /// Unconditional write; ignored outside the board.
    #[inline]
    pub fn set(&mut self, x: i32, y: i32, value: i32) {
        if let Some(i) = self.index(x, y) {
            self.cells[i] = value;
        }
    }

    /// True if every occupied cell of `piece`, centred on `(x, y)`, lands on an empty in-bounds cell.
    pub fn can_place(&self, piece: &Piece, x: i32, y: i32) -> bool {
        piece
            .cells()
            .all(|(dx, dy)| self.index(x + dx, y + dy).is_some_and(|i| self.cells[i] == EMPTY))
    }

    /// Writes the piece value under every occupied mask cell. Callers check [`Grid::can_place`] first.
    pub fn place(&mut self, piece: &Piece, x: i32, y: i32) {
        let value = piece.value();
        for (dx, dy) in piece.cells() {
            self.set(x + dx, y + dy, value);
        }
    }

    /// Resets every cell to empty.
    pub fn clear(&mut self) {
        self.cells.fill(EMPTY);
    }

    #[inline]
    fn is_filled(&self, x: usize, y: usize) -> bool {
        self.cells[y * self.cols + x] > EMPTY
    }

    pub fn row_full(&self, y: usize) -> bool {
        y < self.rows && (0..self.cols).all(|x| self.is_filled(x, y))
    }

    pub fn col_full(&self, x: usize) -> bool {
        x < self.cols && (0..self.rows).all(|y| self.is_filled(x, y))
    }

    /// Finds full rows and columns and marks their cells [`PENDING_CLEAR`].
    /// Cells on a crossing are counted once.
    pub fn resolve_lines(&mut self) -> LineClear {
        let rows: Vec<usize> = (0..self.rows).filter(|&y| self.row_full(y)).collect();
        let cols: Vec<usize> = (0..self.cols).filter(|&x| self.col_full(x)).collect();
        if rows.is_empty() && cols.is_empty() {
            return LineClear::default();
        }

        let full_rows: HashSet<usize> = rows.iter().copied().collect();
        let full_cols: HashSet<usize> = cols.iter().copied().collect();
        let mut cells = Vec::new();
        for y in 0..self.rows {
            for x in 0..self.cols {
                if full_rows.contains(&y) || full_cols.contains(&x) {
                    self.cells[y * self.cols + x] = PENDING_CLEAR;
                    cells.push((x, y));
                }
            }
        }
        LineClear { rows, cols, cells }
    }

    /// Turns every pending-clear cell back into an empty cell. Returns how many were resolved.
    pub fn finalize_clears(&mut self) -> usize {
        let mut resolved = 0;
        for cell in &mut self.cells {
            if *cell == PENDING_CLEAR {
                *cell = EMPTY;
                resolved += 1;
            }
        }
        resolved
    }

    pub fn has_pending(&self) -> bool {
        self.cells.contains(&PENDING_CLEAR)
    }

    /// All cell values, row-major.
    pub fn values(&self) -> &[i32] {
        &self.cells
    }
}
