//! Tetromino definitions and shapes
//!
//! Shapes are sets of (dx, dy) offsets from the piece anchor. x grows to the
//! right and y grows downward, so row 0 is the top of the well.

use ratatui::style::Color;

/// The 7 tetromino types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TetrominoType {
    I, // Cyan - long bar
    O, // Yellow - square
    T, // Purple - T-shape
    S, // Green - S-shape
    Z, // Red - Z-shape
    J, // Blue - J-shape
    L, // Orange - L-shape
}

impl TetrominoType {
    /// Get the color for this tetromino
    pub fn color(&self) -> Color {
        match self {
            TetrominoType::I => Color::Cyan,
            TetrominoType::O => Color::Yellow,
            TetrominoType::T => Color::Magenta,
            TetrominoType::S => Color::Green,
            TetrominoType::Z => Color::Red,
            TetrominoType::J => Color::Blue,
            TetrominoType::L => Color::Rgb(255, 165, 0), // Orange
        }
    }

    /// Get all tetromino types for bag randomization
    pub fn all() -> [TetrominoType; 7] {
        [
            TetrominoType::I,
            TetrominoType::O,
            TetrominoType::T,
            TetrominoType::S,
            TetrominoType::Z,
            TetrominoType::J,
            TetrominoType::L,
        ]
    }

    /// Wire color-id, one character per kind
    pub fn color_id(&self) -> char {
        match self {
            TetrominoType::I => '1',
            TetrominoType::O => '2',
            TetrominoType::T => '3',
            TetrominoType::S => '4',
            TetrominoType::Z => '5',
            TetrominoType::J => '6',
            TetrominoType::L => '7',
        }
    }

    pub fn from_color_id(id: char) -> Option<TetrominoType> {
        match id {
            '1' => Some(TetrominoType::I),
            '2' => Some(TetrominoType::O),
            '3' => Some(TetrominoType::T),
            '4' => Some(TetrominoType::S),
            '5' => Some(TetrominoType::Z),
            '6' => Some(TetrominoType::J),
            '7' => Some(TetrominoType::L),
            _ => None,
        }
    }

    /// Spawn orientation offsets
    ///
    /// ```text
    /// I: ####   O: ##   T: .#.   S: .##   Z: ##.   J: #..   L: ..#
    ///               ##      ###      ##.      .##      ###      ###
    /// ```
    pub fn shape(&self) -> Shape {
        let cells = match self {
            TetrominoType::I => [(0, 0), (1, 0), (2, 0), (3, 0)],
            TetrominoType::O => [(0, 0), (1, 0), (0, 1), (1, 1)],
            TetrominoType::T => [(1, 0), (0, 1), (1, 1), (2, 1)],
            TetrominoType::S => [(1, 0), (2, 0), (0, 1), (1, 1)],
            TetrominoType::Z => [(0, 0), (1, 0), (1, 1), (2, 1)],
            TetrominoType::J => [(0, 0), (0, 1), (1, 1), (2, 1)],
            TetrominoType::L => [(2, 0), (0, 1), (1, 1), (2, 1)],
        };
        Shape { cells }
    }
}

/// Four offsets relative to a piece anchor. Rotation state is implicit in the
/// offsets themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    cells: [(i32, i32); 4],
}

#[cfg(test)]
impl Shape {
    pub fn new(cells: [(i32, i32); 4]) -> Self {
        Self { cells }
    }
}

impl Shape {
    pub fn cells(&self) -> &[(i32, i32); 4] {
        &self.cells
    }

    /// Clockwise quarter turn about the anchor: (dx, dy) -> (-dy, dx)
    pub fn rotated_cw(&self) -> Shape {
        Shape {
            cells: self.cells.map(|(dx, dy)| (-dy, dx)),
        }
    }

    /// Apply `turns` clockwise quarter turns
    pub fn rotated(&self, turns: usize) -> Shape {
        (0..turns % 4).fold(*self, |shape, _| shape.rotated_cw())
    }

    /// Absolute cells for an anchor at (x, y)
    pub fn at(&self, x: i32, y: i32) -> [(i32, i32); 4] {
        self.cells.map(|(dx, dy)| (x + dx, y + dy))
    }
}
