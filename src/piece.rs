//! Piece catalogue: 15 fixed 3x3 shapes, each with a colour value, plus rotation.

use std::fmt;

/// Number of shapes in the catalogue.
pub const PIECE_COUNT: usize = 15;

/// Side length of a piece mask.
pub const MASK_SIZE: usize = 3;

/// Occupancy mask, `mask[row][col]`; row 0 is the top, the centre cell is `[1][1]`.
pub type Mask = [[bool; MASK_SIZE]; MASK_SIZE];

/// The 15 canonical shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceKind {
    Line,
    C,
    Plus,
    Dot,
    Square,
    L,
    J,
    S,
    Z,
    T,
    X,
    Corner,
    InverseCorner,
    Double,
    Triple,
}

impl PieceKind {
    pub const ALL: [Self; PIECE_COUNT] = [
        Self::Line,
        Self::C,
        Self::Plus,
        Self::Dot,
        Self::Square,
        Self::L,
        Self::J,
        Self::S,
        Self::Z,
        Self::T,
        Self::X,
        Self::Corner,
        Self::InverseCorner,
        Self::Double,
        Self::Triple,
    ];

    /// Catalogue index `0..15`.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Grid value written by this shape: `index + 1`, so 0 stays "empty".
    pub fn value(self) -> i32 {
        self.index() as i32 + 1
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Line => "Line",
            Self::C => "C",
            Self::Plus => "Plus",
            Self::Dot => "Dot",
            Self::Square => "Square",
            Self::L => "L",
            Self::J => "J",
            Self::S => "S",
            Self::Z => "Z",
            Self::T => "T",
            Self::X => "X",
            Self::Corner => "Corner",
            Self::InverseCorner => "Inverse Corner",
            Self::Double => "Double",
            Self::Triple => "Triple",
        }
    }

    /// Unrotated occupancy mask.
    pub fn mask(self) -> Mask {
        const O: bool = false;
        const I: bool = true;
        match self {
            Self::Line => [[O, O, O], [I, I, I], [O, O, O]],
            Self::C => [[O, O, O], [I, I, I], [I, O, I]],
            Self::Plus => [[O, I, O], [I, I, I], [O, I, O]],
            Self::Dot => [[O, O, O], [O, I, O], [O, O, O]],
            Self::Square => [[I, I, O], [I, I, O], [O, O, O]],
            Self::L => [[O, O, O], [I, I, I], [O, O, I]],
            Self::J => [[O, O, I], [I, I, I], [O, O, O]],
            Self::S => [[O, O, O], [O, I, I], [I, I, O]],
            Self::Z => [[I, I, O], [O, I, I], [O, O, O]],
            Self::T => [[I, O, O], [I, I, O], [I, O, O]],
            Self::X => [[I, O, I], [O, I, O], [I, O, I]],
            Self::Corner => [[O, O, O], [I, I, O], [I, O, O]],
            Self::InverseCorner => [[I, O, O], [I, I, O], [O, O, O]],
            Self::Double => [[O, I, O], [O, I, O], [O, O, O]],
            Self::Triple => [[O, I, O], [O, I, O], [O, I, O]],
        }
    }
}

/// A shape in some orientation. The value never changes; only the mask rotates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    kind: PieceKind,
    rotation: u8, // 0..4
    blocks: Mask,
}

impl Piece {
    pub fn new(kind: PieceKind) -> Self {
        Self {
            kind,
            rotation: 0,
            blocks: kind.mask(),
        }
    }

    /// Piece for catalogue index `0..15`; `None` outside the catalogue.
    pub fn create(index: usize) -> Option<Self> {
        PieceKind::from_index(index).map(Self::new)
    }

    pub fn kind(&self) -> PieceKind {
        self.kind
    }

    pub fn value(&self) -> i32 {
        self.kind.value()
    }

    /// Quarter-turns clockwise from the catalogue orientation.
    pub fn rotation(&self) -> u8 {
        self.rotation
    }

    pub fn blocks(&self) -> &Mask {
        &self.blocks
    }

    /// New orientation after `quarter_turns` clockwise turns (mod 4). Three turns is one counter-clockwise.
    pub fn rotated(&self, quarter_turns: u8) -> Self {
        let turns = quarter_turns % 4;
        let mut blocks = self.blocks;
        for _ in 0..turns {
            blocks = rotate_cw(&blocks);
        }
        Self {
            kind: self.kind,
            rotation: (self.rotation + turns) % 4,
            blocks,
        }
    }

    pub fn rotate(&mut self, quarter_turns: u8) {
        *self = self.rotated(quarter_turns);
    }

    /// Offsets `(dx, dy)` from the centre of every occupied mask cell, each in `-1..=1`.
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.blocks.iter().enumerate().flat_map(|(row, line)| {
            line.iter()
                .enumerate()
                .filter(|&(_, occupied)| *occupied)
                .map(move |(col, _)| (col as i32 - 1, row as i32 - 1))
        })
    }

    pub fn block_count(&self) -> usize {
        self.cells().count()
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.name())
    }
}

fn rotate_cw(mask: &Mask) -> Mask {
    let n = MASK_SIZE;
    let mut out = [[false; MASK_SIZE]; MASK_SIZE];
    for (row, line) in out.iter_mut().enumerate() {
        for (col, cell) in line.iter_mut().enumerate() {
            *cell = mask[n - 1 - col][row];
        }
    }
    out
}
