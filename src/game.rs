//! Core game state and logic

use crate::bag::Bag;
use crate::board::{Board, Cell};
use crate::piece::Piece;
use crate::score::Score;
use crate::tetromino::TetrominoType;
use crate::walker::{WalkerField, WalkerFate};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

/// Simulation tunables
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Time between gravity steps
    pub fall_interval: Duration,
    /// Time between walker drops
    pub walker_spawn_interval: Duration,
    pub walkers_enabled: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            fall_interval: Duration::from_millis(800),
            walker_spawn_interval: Duration::from_secs(9),
            walkers_enabled: true,
        }
    }
}

/// Game state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Playing,
    GameOver,
}

/// Input actions the game can process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    MoveLeft,
    MoveRight,
    SoftDrop,
    HardDrop,
    Rotate,
    Hold,
}

/// How a round was lost
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossCause {
    /// The next piece could not spawn
    BlockedSpawn,
    /// Garbage pushed locked cells off the top
    GarbageOverflow,
}

/// Things that happened since the caller last drained events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    LinesCleared(usize),
    Stomped,
    Lost(LossCause),
}

/// The main game struct
pub struct Game {
    /// The game board
    pub board: Board,
    /// Current falling piece
    current_piece: Option<Piece>,
    /// Held piece (can swap once per piece)
    hold_piece: Option<TetrominoType>,
    /// Whether hold has been used this piece
    hold_used: bool,
    /// Piece bag randomizer
    bag: Bag,
    /// Score tracking
    pub score: Score,
    /// Current game state
    pub state: GameState,
    pub walkers: WalkerField,
    config: GameConfig,
    /// Time since the last gravity step
    fall_timer: Duration,
    /// Bumped every time a new piece becomes current
    piece_serial: u64,
    /// Garbage holes and walker drops
    rng: ChaCha8Rng,
    events: Vec<GameEvent>,
}

impl Game {
    pub fn new(seed: u64, config: GameConfig) -> Self {
        let mut bag = Bag::with_seed(seed);
        let first_piece = bag.next();

        Self {
            board: Board::new(),
            current_piece: Some(Piece::new(first_piece)),
            hold_piece: None,
            hold_used: false,
            bag,
            score: Score::new(),
            state: GameState::Playing,
            walkers: WalkerField::new(config.walker_spawn_interval, config.walkers_enabled),
            config,
            fall_timer: Duration::ZERO,
            piece_serial: 0,
            rng: ChaCha8Rng::seed_from_u64(seed ^ 0x9e37_79b9_7f4a_7c15),
            events: Vec::new(),
        }
    }

    /// Start a fresh round: empty board, zeroed score, next piece from the bag
    pub fn reset(&mut self) {
        self.board = Board::new();
        self.score = Score::new();
        self.hold_piece = None;
        self.walkers.clear();
        self.state = GameState::Playing;
        self.events.clear();
        let kind = self.bag.next();
        self.spawn(kind);
    }

    pub fn current_piece(&self) -> Option<&Piece> {
        self.current_piece.as_ref()
    }

    pub fn hold_piece(&self) -> Option<TetrominoType> {
        self.hold_piece
    }

    /// Next piece that will spawn
    pub fn next_kind(&self) -> TetrominoType {
        self.bag.peek()
    }

    pub fn preview(&self, count: usize) -> Vec<TetrominoType> {
        self.bag.preview(count)
    }

    pub fn piece_serial(&self) -> u64 {
        self.piece_serial
    }

    /// Drain events raised since the last call
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Is a clockwise rotation of the current piece legal right now
    pub fn can_rotate(&self) -> bool {
        self.current_piece
            .as_ref()
            .is_some_and(|piece| piece.can_rotate(&self.board))
    }

    /// Process an action. Returns false if it was rejected as illegal.
    pub fn process_action(&mut self, action: Action) -> bool {
        if self.state != GameState::Playing {
            return false;
        }
        match action {
            Action::MoveLeft => self.with_piece(|piece, board| piece.move_left(board)),
            Action::MoveRight => self.with_piece(|piece, board| piece.move_right(board)),
            Action::Rotate => self.with_piece(|piece, board| piece.rotate(board)),
            Action::SoftDrop => {
                let moved = self.with_piece(|piece, board| piece.move_down(board));
                if moved {
                    self.fall_timer = Duration::ZERO;
                }
                moved
            }
            Action::HardDrop => {
                if !self.with_piece(|piece, board| {
                    piece.hard_drop(board);
                    true
                }) {
                    return false;
                }
                self.lock_piece();
                true
            }
            Action::Hold => self.hold(),
        }
    }

    fn with_piece(&mut self, f: impl FnOnce(&mut Piece, &Board) -> bool) -> bool {
        match &mut self.current_piece {
            Some(piece) => f(piece, &self.board),
            None => false,
        }
    }

    /// Advance gravity and walkers by `dt`
    pub fn update(&mut self, dt: Duration) {
        if self.state != GameState::Playing {
            return;
        }

        let piece_cells = self.current_piece.as_ref().map(Piece::cells);
        let fates = self
            .walkers
            .update(dt, &self.board, piece_cells.as_ref(), &mut self.rng);
        for fate in fates {
            if fate == WalkerFate::Stomped {
                self.score.add_stomp();
                self.events.push(GameEvent::Stomped);
            }
        }

        self.fall_timer += dt;
        if self.fall_timer < self.config.fall_interval {
            return;
        }
        self.fall_timer = Duration::ZERO;

        if !self.with_piece(|piece, board| piece.move_down(board)) {
            self.lock_piece();
        }
    }

    /// Push `lines` garbage rows in from the bottom. Returns true if that cost
    /// the round.
    pub fn apply_garbage(&mut self, lines: usize) -> bool {
        if lines == 0 || self.state != GameState::Playing {
            return false;
        }
        let overflowed = self.board.inject_garbage(lines, &mut self.rng);
        if let Some(piece) = &mut self.current_piece {
            piece.lift_clear(&self.board);
        }
        if overflowed {
            self.lose(LossCause::GarbageOverflow);
        }
        overflowed
    }

    /// Board with the falling piece drawn in, as the opponent should see it
    pub fn board_with_piece(&self) -> Board {
        let mut board = self.board.clone();
        if let Some(piece) = &self.current_piece {
            board.lock(piece.x, piece.y, &piece.shape, Cell::Filled(piece.kind));
        }
        board
    }

    fn hold(&mut self) -> bool {
        if self.hold_used {
            return false;
        }

        let Some(current) = self.current_piece.take() else {
            return false;
        };

        let next_kind = match self.hold_piece.replace(current.kind) {
            Some(held) => held,
            None => self.bag.next(),
        };

        self.spawn(next_kind);
        self.hold_used = true;
        true
    }

    /// Lock the current piece and spawn next
    fn lock_piece(&mut self) {
        let Some(piece) = self.current_piece.take() else {
            return;
        };

        self.board
            .lock(piece.x, piece.y, &piece.shape, Cell::Filled(piece.kind));

        let lines_cleared = self.board.clear_lines();
        if lines_cleared > 0 {
            self.score.add_lines(lines_cleared);
            self.events.push(GameEvent::LinesCleared(lines_cleared));
        }

        let next_kind = self.bag.next();
        self.spawn(next_kind);
    }

    fn spawn(&mut self, kind: TetrominoType) {
        let piece = Piece::new(kind);
        let blocked = piece.is_blocked(&self.board);
        self.current_piece = Some(piece);
        self.piece_serial += 1;
        self.hold_used = false;
        self.fall_timer = Duration::ZERO;
        if blocked {
            self.lose(LossCause::BlockedSpawn);
        }
    }

    fn lose(&mut self, cause: LossCause) {
        self.state = GameState::GameOver;
        self.current_piece = None;
        self.events.push(GameEvent::Lost(cause));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BOARD_HEIGHT, BOARD_WIDTH};

    fn quiet_game(seed: u64) -> Game {
        Game::new(
            seed,
            GameConfig {
                walkers_enabled: false,
                ..GameConfig::default()
            },
        )
    }

    #[test]
    fn test_hard_drop_locks_and_spawns() {
        let mut game = quiet_game(1);
        let first = game.current_piece().map(|p| p.kind);
        let serial = game.piece_serial();
        assert!(game.process_action(Action::HardDrop));
        assert!(!game.board.is_empty());
        assert_eq!(game.piece_serial(), serial + 1);
        assert!(first.is_some());
    }

    #[test]
    fn test_gravity_moves_piece_down() {
        let mut game = quiet_game(2);
        game.update(Duration::from_millis(799));
        assert_eq!(game.current_piece().map(|p| p.y), Some(0));
        game.update(Duration::from_millis(1));
        assert_eq!(game.current_piece().map(|p| p.y), Some(1));
    }

    #[test]
    fn test_line_clear_raises_event_and_score() {
        let mut game = quiet_game(3);
        // Bottom row full except where the falling piece will land
        let mut piece = game.current_piece().cloned().unwrap();
        piece.hard_drop(&game.board);
        let bottom = BOARD_HEIGHT as i32 - 1;
        let landing = piece.cells();
        for x in 0..BOARD_WIDTH as i32 {
            if !landing.contains(&(x, bottom)) {
                game.board.set(x, bottom, Cell::Garbage);
            }
        }
        game.process_action(Action::HardDrop);
        assert_eq!(game.take_events(), vec![GameEvent::LinesCleared(1)]);
        assert_eq!(game.score.points, 1000);
        assert!(game.take_events().is_empty());
    }

    #[test]
    fn test_illegal_move_is_rejected() {
        let mut game = quiet_game(4);
        while game.process_action(Action::MoveLeft) {}
        let x = game.current_piece().map(|p| p.x);
        assert!(!game.process_action(Action::MoveLeft));
        assert_eq!(game.current_piece().map(|p| p.x), x);
    }

    #[test]
    fn test_hold_once_per_piece() {
        let mut game = quiet_game(5);
        let first = game.current_piece().map(|p| p.kind).unwrap();
        assert!(game.process_action(Action::Hold));
        assert_eq!(game.hold_piece(), Some(first));
        assert!(!game.process_action(Action::Hold));

        game.process_action(Action::HardDrop);
        let current = game.current_piece().map(|p| p.kind).unwrap();
        assert!(game.process_action(Action::Hold));
        assert_eq!(game.current_piece().map(|p| p.kind), Some(first));
        assert_eq!(game.hold_piece(), Some(current));
    }

    #[test]
    fn test_blocked_spawn_loses_round() {
        let mut game = quiet_game(6);
        for x in 0..BOARD_WIDTH as i32 - 1 {
            for y in 1..BOARD_HEIGHT as i32 {
                game.board.set(x, y, Cell::Garbage);
            }
        }
        for _ in 0..10 {
            if game.state == GameState::GameOver {
                break;
            }
            game.process_action(Action::HardDrop);
        }
        assert_eq!(game.state, GameState::GameOver);
        assert!(
            game.take_events()
                .contains(&GameEvent::Lost(LossCause::BlockedSpawn))
        );
        assert!(!game.process_action(Action::MoveLeft));
    }

    #[test]
    fn test_garbage_keeps_piece_legal() {
        let mut game = quiet_game(7);
        for _ in 0..18 {
            game.process_action(Action::SoftDrop);
        }
        assert!(!game.apply_garbage(4));
        let piece = game.current_piece().unwrap();
        assert!(!piece.is_blocked(&game.board));
    }

    #[test]
    fn test_garbage_overflow_loses_round() {
        let mut game = quiet_game(8);
        game.board.set(0, 0, Cell::Garbage);
        assert!(game.apply_garbage(1));
        assert_eq!(game.state, GameState::GameOver);
        assert_eq!(
            game.take_events(),
            vec![GameEvent::Lost(LossCause::GarbageOverflow)]
        );
    }

    #[test]
    fn test_reset_starts_clean_round() {
        let mut game = quiet_game(9);
        game.board.set(0, 0, Cell::Garbage);
        game.apply_garbage(1);
        let upcoming = game.bag.peek();
        game.reset();
        assert_eq!(game.state, GameState::Playing);
        assert!(game.board.is_empty());
        assert_eq!(game.score, Score::new());
        assert_eq!(game.current_piece().map(|p| p.kind), Some(upcoming));
        assert!(game.take_events().is_empty());
    }

    #[test]
    fn test_board_with_piece_overlays_falling_piece() {
        let game = quiet_game(10);
        let overlay = game.board_with_piece();
        let piece = game.current_piece().unwrap();
        for (x, y) in piece.cells() {
            assert_eq!(overlay.get(x, y), Some(Cell::Filled(piece.kind)));
        }
        assert!(game.board.is_empty());
    }
}
