//! Active falling piece logic

use crate::board::{BOARD_WIDTH, Board};
use crate::placement::drop_y_from;
use crate::tetromino::{Shape, TetrominoType};

/// Spawn anchor column
pub const SPAWN_X: i32 = BOARD_WIDTH as i32 / 2 - 1;
/// Spawn anchor row
pub const SPAWN_Y: i32 = 0;

/// An active falling piece
#[derive(Debug, Clone)]
pub struct Piece {
    /// The type of tetromino
    pub kind: TetrominoType,
    /// Current offsets, rotation included
    pub shape: Shape,
    /// Anchor position, row 0 is the top
    pub x: i32,
    pub y: i32,
}

impl Piece {
    /// Create a new piece at spawn position
    pub fn new(kind: TetrominoType) -> Self {
        Self {
            kind,
            shape: kind.shape(),
            x: SPAWN_X,
            y: SPAWN_Y,
        }
    }

    /// Absolute positions of all 4 blocks
    pub fn cells(&self) -> [(i32, i32); 4] {
        self.shape.at(self.x, self.y)
    }

    /// True if the piece overlaps something where it stands
    pub fn is_blocked(&self, board: &Board) -> bool {
        board.is_blocked(self.x, self.y, &self.shape)
    }

    /// Try to shift by (dx, dy), returns true if successful
    fn try_shift(&mut self, dx: i32, dy: i32, board: &Board) -> bool {
        if board.is_blocked(self.x + dx, self.y + dy, &self.shape) {
            return false;
        }
        self.x += dx;
        self.y += dy;
        true
    }

    pub fn move_left(&mut self, board: &Board) -> bool {
        self.try_shift(-1, 0, board)
    }

    pub fn move_right(&mut self, board: &Board) -> bool {
        self.try_shift(1, 0, board)
    }

    pub fn move_down(&mut self, board: &Board) -> bool {
        self.try_shift(0, 1, board)
    }

    /// Rotate clockwise in place. There is no kick search: a blocked rotation
    /// is discarded and the piece keeps its old shape.
    pub fn rotate(&mut self, board: &Board) -> bool {
        let rotated = self.shape.rotated_cw();
        if board.is_blocked(self.x, self.y, &rotated) {
            return false;
        }
        self.shape = rotated;
        true
    }

    /// Would a clockwise rotation be legal right now
    pub fn can_rotate(&self, board: &Board) -> bool {
        !board.is_blocked(self.x, self.y, &self.shape.rotated_cw())
    }

    /// Move down as far as possible, returns the distance dropped
    pub fn hard_drop(&mut self, board: &Board) -> i32 {
        let landing = self.ghost_y(board);
        let distance = landing - self.y;
        self.y = landing;
        distance
    }

    /// Row the piece would land on
    pub fn ghost_y(&self, board: &Board) -> i32 {
        drop_y_from(board, &self.shape, self.x, self.y)
    }

    /// Lift the piece until it no longer overlaps the stack
    pub fn lift_clear(&mut self, board: &Board) {
        while self.is_blocked(board) && self.y > -(crate::board::BOARD_HEIGHT as i32) {
            self.y -= 1;
        }
    }
}
