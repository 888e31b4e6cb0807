//! Game board representation and collision detection

use crate::tetromino::{Shape, TetrominoType};
use rand::Rng;

/// Board dimensions
pub const BOARD_WIDTH: usize = 10;
pub const BOARD_HEIGHT: usize = 20;

/// A cell on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Filled(TetrominoType),
    /// Filler row injected by an opponent attack
    Garbage,
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    pub fn is_filled(&self) -> bool {
        !self.is_empty()
    }
}

/// The game board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    /// Grid stored as [row][col], row 0 is the top, row increases downward
    cells: [[Cell; BOARD_WIDTH]; BOARD_HEIGHT],
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    /// Create a new empty board
    pub fn new() -> Self {
        Self {
            cells: [[Cell::Empty; BOARD_WIDTH]; BOARD_HEIGHT],
        }
    }

    /// Get the cell at (x, y), None if out of bounds
    pub fn get(&self, x: i32, y: i32) -> Option<Cell> {
        if !Self::in_bounds(x, y) {
            return None;
        }
        Some(self.cells[y as usize][x as usize])
    }

    /// Set a cell, returns false if out of bounds
    pub fn set(&mut self, x: i32, y: i32, cell: Cell) -> bool {
        if !Self::in_bounds(x, y) {
            return false;
        }
        self.cells[y as usize][x as usize] = cell;
        true
    }

    fn in_bounds(x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < BOARD_WIDTH && (y as usize) < BOARD_HEIGHT
    }

    /// True if any cell of `shape` anchored at (x, y) is outside the walls,
    /// below the floor, or on an occupied cell. Cells above the ceiling are legal.
    pub fn is_blocked(&self, x: i32, y: i32, shape: &Shape) -> bool {
        shape.at(x, y).iter().any(|&(cx, cy)| {
            if cx < 0 || cx >= BOARD_WIDTH as i32 || cy >= BOARD_HEIGHT as i32 {
                return true;
            }
            cy >= 0 && self.cells[cy as usize][cx as usize].is_filled()
        })
    }

    /// Write every visible cell of the shape. Cells above the ceiling are dropped.
    pub fn lock(&mut self, x: i32, y: i32, shape: &Shape, cell: Cell) {
        for (cx, cy) in shape.at(x, y) {
            self.set(cx, cy, cell);
        }
    }

    /// Remove full rows and pack the rest down. Returns the number removed.
    pub fn clear_lines(&mut self) -> usize {
        let mut write_row = BOARD_HEIGHT;

        for read_row in (0..BOARD_HEIGHT).rev() {
            if !self.is_line_full(read_row) {
                write_row -= 1;
                if write_row != read_row {
                    self.cells[write_row] = self.cells[read_row];
                }
            }
        }

        // Rows above the packed stack are fresh
        for row in 0..write_row {
            self.cells[row] = [Cell::Empty; BOARD_WIDTH];
        }

        write_row
    }

    /// Number of rows with no empty cell
    pub fn full_rows(&self) -> usize {
        (0..BOARD_HEIGHT).filter(|&row| self.is_line_full(row)).count()
    }

    /// Push `n` garbage rows in from the bottom, each with one hole at a random
    /// column. The top `n` rows are discarded. Returns true if any discarded row
    /// held a filled cell.
    pub fn inject_garbage<R: Rng>(&mut self, n: usize, rng: &mut R) -> bool {
        let n = n.min(BOARD_HEIGHT);
        if n == 0 {
            return false;
        }

        let overflowed = self.cells[..n]
            .iter()
            .any(|row| row.iter().any(|cell| cell.is_filled()));

        self.cells.rotate_left(n);
        for row in BOARD_HEIGHT - n..BOARD_HEIGHT {
            let hole = rng.gen_range(0..BOARD_WIDTH);
            let mut garbage = [Cell::Garbage; BOARD_WIDTH];
            garbage[hole] = Cell::Empty;
            self.cells[row] = garbage;
        }

        overflowed
    }

    /// Height of each column: BOARD_HEIGHT minus the first occupied row
    pub fn column_heights(&self) -> [u32; BOARD_WIDTH] {
        let mut heights = [0u32; BOARD_WIDTH];
        for (col, height) in heights.iter_mut().enumerate() {
            if let Some(row) = (0..BOARD_HEIGHT).find(|&row| self.cells[row][col].is_filled()) {
                *height = (BOARD_HEIGHT - row) as u32;
            }
        }
        heights
    }

    /// Check if a line is completely filled
    fn is_line_full(&self, row: usize) -> bool {
        self.cells[row].iter().all(|cell| cell.is_filled())
    }

    /// Rows from top to bottom
    pub fn rows(&self) -> &[[Cell; BOARD_WIDTH]; BOARD_HEIGHT] {
        &self.cells
    }
}

#[cfg(test)]
impl Board {
    pub fn is_empty(&self) -> bool {
        self.cells
            .iter()
            .all(|row| row.iter().all(|cell| cell.is_empty()))
    }
}
