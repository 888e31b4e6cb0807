//! Grid string codec for the room document
//!
//! One character per cell, rows top to bottom: `'0'` empty, `'1'..='7'` a
//! piece kind, `'G'` garbage.

use crate::board::{BOARD_HEIGHT, BOARD_WIDTH, Board, Cell};
use crate::tetromino::TetrominoType;
use thiserror::Error;

/// Length of an encoded grid
pub const GRID_LEN: usize = BOARD_WIDTH * BOARD_HEIGHT;

const EMPTY: char = '0';
const GARBAGE: char = 'G';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("grid has {0} cells, expected {}", GRID_LEN)]
    Length(usize),
    #[error("unknown cell {cell:?} at index {index}")]
    BadCell { index: usize, cell: char },
}

fn encode_cell(cell: Cell) -> char {
    match cell {
        Cell::Empty => EMPTY,
        Cell::Filled(kind) => kind.color_id(),
        Cell::Garbage => GARBAGE,
    }
}

fn decode_cell(ch: char) -> Option<Cell> {
    match ch {
        EMPTY => Some(Cell::Empty),
        GARBAGE => Some(Cell::Garbage),
        other => TetrominoType::from_color_id(other).map(Cell::Filled),
    }
}

pub fn encode_board(board: &Board) -> String {
    board.rows().iter().flatten().copied().map(encode_cell).collect()
}

pub fn decode_board(grid: &str) -> Result<Board, WireError> {
    let count = grid.chars().count();
    if count != GRID_LEN {
        return Err(WireError::Length(count));
    }

    let mut board = Board::new();
    for (index, ch) in grid.chars().enumerate() {
        let cell = decode_cell(ch).ok_or(WireError::BadCell { index, cell: ch })?;
        let x = (index % BOARD_WIDTH) as i32;
        let y = (index / BOARD_WIDTH) as i32;
        board.set(x, y, cell);
    }
    Ok(board)
}

/// Encoded empty board, used for fresh player records
pub fn empty_grid() -> String {
    EMPTY.to_string().repeat(GRID_LEN)
}
