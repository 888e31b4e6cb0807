//! Pure placement helpers shared by hard drop and the bot

use crate::board::{Board, Cell};
use crate::tetromino::Shape;

/// Lowest anchor row reachable by dropping `shape` straight down in column `x`
/// from the spawn row. None if the shape is already blocked at the spawn row.
pub fn drop_y(board: &Board, shape: &Shape, x: i32) -> Option<i32> {
    if board.is_blocked(x, 0, shape) {
        return None;
    }
    Some(drop_y_from(board, shape, x, 0))
}

/// Lowest anchor row reachable from (x, y). The start position must be legal.
pub fn drop_y_from(board: &Board, shape: &Shape, x: i32, y: i32) -> i32 {
    let mut y = y;
    while !board.is_blocked(x, y + 1, shape) {
        y += 1;
    }
    y
}

/// Copy of `board` with the shape locked at (x, y). The input is untouched.
pub fn simulate_place(board: &Board, shape: &Shape, x: i32, y: i32, cell: Cell) -> Board {
    let mut next = board.clone();
    next.lock(x, y, shape, cell);
    next
}
