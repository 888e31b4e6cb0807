//! Heuristic two-ply placement bot
//!
//! The bot looks at the current piece and the next one, scores every pair of
//! drops with a weighted board heuristic and then plays the winning placement
//! one primitive action per tick.

use crate::board::{BOARD_HEIGHT, BOARD_WIDTH, Board, Cell};
use crate::game::{Action, Game, GameState};
use crate::placement::{drop_y, simulate_place};
use crate::tetromino::Shape;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// Leftmost anchor column searched. Wide shapes need room past the walls.
const MIN_COLUMN: i32 = -3;
/// Rightmost anchor column searched
const MAX_COLUMN: i32 = BOARD_WIDTH as i32 + 2;

/// Heuristic weights. Positive rewards, negative penalises.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub lines: f64,
    pub height: f64,
    pub holes: f64,
    pub bumpiness: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            lines: 10.0,
            height: -0.5,
            holes: -10.0,
            bumpiness: -0.2,
        }
    }
}

/// Raw board measurements the heuristic is built from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoardFeatures {
    /// Full rows, not yet cleared
    pub lines: u32,
    pub aggregate_height: u32,
    /// Empty cells with a filled cell somewhere above them
    pub holes: u32,
    /// Sum of height steps between neighbouring columns
    pub bumpiness: u32,
}

impl BoardFeatures {
    pub fn of(board: &Board) -> Self {
        let heights = board.column_heights();
        let rows = board.rows();

        let mut holes = 0;
        for (col, &height) in heights.iter().enumerate() {
            let top = BOARD_HEIGHT - height as usize;
            holes += (top..BOARD_HEIGHT)
                .filter(|&row| rows[row][col] == Cell::Empty)
                .count() as u32;
        }

        Self {
            lines: board.full_rows() as u32,
            aggregate_height: heights.iter().sum(),
            holes,
            bumpiness: heights.windows(2).map(|w| w[0].abs_diff(w[1])).sum(),
        }
    }
}

/// Weighted heuristic score of a board, higher is better
pub fn evaluate(board: &Board, weights: &Weights) -> f64 {
    let features = BoardFeatures::of(board);
    weights.lines * features.lines as f64
        + weights.height * features.aggregate_height as f64
        + weights.holes * features.holes as f64
        + weights.bumpiness * features.bumpiness as f64
}

/// Chosen target for the current piece
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Clockwise quarter turns from the piece's current orientation
    pub rotation: usize,
    /// Target anchor column
    pub column: i32,
    /// Best look-ahead score reachable from this placement
    pub score: f64,
}

/// Every legal straight drop of `shape`: (rotation, column, board after lock)
fn drops<'a>(board: &'a Board, shape: &'a Shape) -> impl Iterator<Item = (usize, i32, Board)> + 'a {
    (0..4).flat_map(move |rotation| {
        let rotated = shape.rotated(rotation);
        (MIN_COLUMN..=MAX_COLUMN).filter_map(move |column| {
            let y = drop_y(board, &rotated, column)?;
            Some((rotation, column, simulate_place(board, &rotated, column, y, Cell::Garbage)))
        })
    })
}

/// Best score over every drop of `shape` on `board`, None if nothing fits
fn best_single(board: &Board, shape: &Shape, weights: &Weights) -> Option<f64> {
    drops(board, shape)
        .map(|(_, _, after)| evaluate(&after, weights))
        .fold(None, |best, score| match best {
            Some(best) if best >= score => Some(best),
            _ => Some(score),
        })
}

/// Two-ply search. Each placement of `current` is rated by the best placement
/// of `next` on the resulting board, or by the board itself when the next
/// piece is unknown. Ties keep the first candidate found. None if `current`
/// cannot be placed anywhere.
pub fn best_placement(
    board: &Board,
    current: &Shape,
    next: Option<&Shape>,
    weights: &Weights,
) -> Option<Placement> {
    let mut best: Option<Placement> = None;

    for (rotation, column, after) in drops(board, current) {
        let score = match next {
            Some(next) => best_single(&after, next, weights).unwrap_or(f64::NEG_INFINITY),
            None => evaluate(&after, weights),
        };

        if best.is_none_or(|best| score > best.score) {
            best = Some(Placement {
                rotation,
                column,
                score,
            });
        }
    }

    best
}

/// Primitive actions that bring a piece at `from_column` to `target`
pub fn plan_actions(target: &Placement, from_column: i32) -> VecDeque<Action> {
    let mut actions = VecDeque::new();
    actions.extend(std::iter::repeat_n(Action::Rotate, target.rotation));

    let shift = target.column - from_column;
    let step = if shift < 0 {
        Action::MoveLeft
    } else {
        Action::MoveRight
    };
    actions.extend(std::iter::repeat_n(step, shift.unsigned_abs() as usize));

    actions.push_back(Action::HardDrop);
    actions
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotState {
    /// Nothing to do: no piece, game over or no legal placement
    Idle,
    /// Waiting to search for the current piece
    Planning,
    /// Playing out a queued plan
    Executing,
}

/// Paced bot driving a `Game` through the same actions a player uses
#[derive(Debug, Clone)]
pub struct Bot {
    weights: Weights,
    tick: Duration,
    since_tick: Duration,
    queue: VecDeque<Action>,
    state: BotState,
    /// Piece serial the queued plan was made for
    planned_for: Option<u64>,
}

impl Bot {
    pub fn new(weights: Weights, tick: Duration) -> Self {
        Self {
            weights,
            tick,
            since_tick: Duration::ZERO,
            queue: VecDeque::new(),
            state: BotState::Planning,
            planned_for: None,
        }
    }

    pub fn state(&self) -> BotState {
        self.state
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Drop the current plan so the next update searches again
    pub fn reset(&mut self) {
        self.queue.clear();
        self.planned_for = None;
        self.since_tick = Duration::ZERO;
        self.state = BotState::Planning;
    }

    /// Plan if the piece changed, then play at most one action per tick.
    /// Returns the action that was applied.
    pub fn update(&mut self, dt: Duration, game: &mut Game) -> Option<Action> {
        if game.state != GameState::Playing {
            self.queue.clear();
            self.state = BotState::Idle;
            return None;
        }

        if self.planned_for != Some(game.piece_serial()) {
            self.plan(game);
        }

        self.since_tick += dt;
        if self.since_tick < self.tick {
            return None;
        }
        self.since_tick = Duration::ZERO;

        let action = self.queue.pop_front()?;
        if action == Action::Rotate && !game.can_rotate() {
            debug!("bot: queued rotation is no longer legal, replanning");
            self.reset();
            return None;
        }
        if !game.process_action(action) {
            debug!("bot: {:?} rejected, replanning", action);
            self.reset();
            return None;
        }

        if self.queue.is_empty() {
            self.state = BotState::Planning;
        }
        Some(action)
    }

    fn plan(&mut self, game: &Game) {
        self.state = BotState::Planning;
        self.queue.clear();
        self.planned_for = Some(game.piece_serial());

        let Some(piece) = game.current_piece() else {
            self.state = BotState::Idle;
            return;
        };
        let next = game.next_kind().shape();

        match best_placement(&game.board, &piece.shape, Some(&next), &self.weights) {
            Some(target) => {
                debug!(
                    "bot: {:?} -> rotation {} column {} (score {:.2})",
                    piece.kind, target.rotation, target.column, target.score
                );
                self.queue = plan_actions(&target, piece.x);
                self.state = BotState::Executing;
            }
            None => {
                debug!("bot: no legal placement for {:?}", piece.kind);
                self.state = BotState::Idle;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameConfig;
    use crate::tetromino::TetrominoType;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn quiet_game(seed: u64) -> Game {
        Game::new(
            seed,
            GameConfig {
                walkers_enabled: false,
                ..GameConfig::default()
            },
        )
    }

    /// Rows 16..=19 filled except for the rightmost column
    fn well_board() -> Board {
        let mut board = Board::new();
        for y in 16..BOARD_HEIGHT as i32 {
            for x in 0..BOARD_WIDTH as i32 - 1 {
                board.set(x, y, Cell::Garbage);
            }
        }
        board
    }

    #[test]
    fn test_features_of_simple_board() {
        let mut board = Board::new();
        board.set(0, 18, Cell::Garbage);
        let features = BoardFeatures::of(&board);
        assert_eq!(
            features,
            BoardFeatures {
                lines: 0,
                aggregate_height: 2,
                holes: 1,
                bumpiness: 2,
            }
        );
        assert!(close(evaluate(&board, &Weights::default()), -11.4));
    }

    #[test]
    fn test_extra_hole_scores_lower() {
        let mut solid = Board::new();
        solid.set(0, 18, Cell::Garbage);
        solid.set(0, 19, Cell::Garbage);
        let mut holed = Board::new();
        holed.set(0, 18, Cell::Garbage);

        for holes in [-0.01, -1.0, -10.0, -250.0] {
            let weights = Weights {
                holes,
                ..Weights::default()
            };
            assert!(evaluate(&holed, &weights) < evaluate(&solid, &weights));
        }
    }

    #[test]
    fn test_holes_weight_is_monotonic() {
        let mut holed = Board::new();
        holed.set(0, 18, Cell::Garbage);
        let mild = Weights {
            holes: -5.0,
            ..Weights::default()
        };
        let harsh = Weights {
            holes: -10.0,
            ..Weights::default()
        };
        assert!(evaluate(&holed, &harsh) < evaluate(&holed, &mild));
    }

    #[test]
    fn test_bar_goes_into_well() {
        let board = well_board();
        let bar = TetrominoType::I.shape();
        let square = TetrominoType::O.shape();

        let target = best_placement(&board, &bar, Some(&square), &Weights::default()).unwrap();
        assert_eq!(target.rotation, 1);
        assert_eq!(target.column, 9);
        // Four full rows, then the square flush against the left wall
        assert!(close(target.score, 17.6));
    }

    #[test]
    fn test_bar_stays_off_tall_column() {
        let mut board = Board::new();
        for y in 12..BOARD_HEIGHT as i32 {
            board.set(4, y, Cell::Garbage);
        }
        let bar = TetrominoType::I.shape();

        let target = best_placement(&board, &bar, None, &Weights::default()).unwrap();
        // Flat against the left wall: heights 1,1,1,1,8 and the rest empty
        assert_eq!((target.rotation, target.column), (0, 0));
        assert!(close(target.score, -9.0));
    }

    #[test]
    fn test_search_without_lookahead() {
        let board = well_board();
        let bar = TetrominoType::I.shape();
        let target = best_placement(&board, &bar, None, &Weights::default()).unwrap();
        assert_eq!((target.rotation, target.column), (1, 9));
    }

    #[test]
    fn test_no_legal_placement() {
        let mut board = Board::new();
        for y in 0..2 {
            for x in 0..BOARD_WIDTH as i32 {
                board.set(x, y, Cell::Garbage);
            }
        }
        let bar = TetrominoType::I.shape();
        assert_eq!(best_placement(&board, &bar, None, &Weights::default()), None);
        assert_eq!(
            best_placement(&board, &bar, Some(&bar), &Weights::default()),
            None
        );
    }

    #[test]
    fn test_plan_actions() {
        let target = Placement {
            rotation: 1,
            column: 9,
            score: 0.0,
        };
        let actions: Vec<_> = plan_actions(&target, 4).into_iter().collect();
        let mut expected = vec![Action::Rotate];
        expected.extend([Action::MoveRight; 5]);
        expected.push(Action::HardDrop);
        assert_eq!(actions, expected);

        let left = Placement {
            rotation: 0,
            column: 1,
            score: 0.0,
        };
        let actions: Vec<_> = plan_actions(&left, 4).into_iter().collect();
        assert_eq!(
            actions,
            vec![
                Action::MoveLeft,
                Action::MoveLeft,
                Action::MoveLeft,
                Action::HardDrop
            ]
        );
    }

    #[test]
    fn test_one_action_per_tick() {
        let mut game = quiet_game(11);
        let mut bot = Bot::new(Weights::default(), Duration::from_millis(50));

        assert_eq!(bot.update(Duration::ZERO, &mut game), None);
        assert_eq!(bot.state(), BotState::Executing);
        let planned = bot.pending();
        assert!(planned >= 1);

        assert_eq!(bot.update(Duration::from_millis(49), &mut game), None);
        assert_eq!(bot.pending(), planned);
        assert!(bot.update(Duration::from_millis(1), &mut game).is_some());
        assert_eq!(bot.pending(), planned - 1);
    }

    #[test]
    fn test_bot_places_piece() {
        let mut game = quiet_game(12);
        let mut bot = Bot::new(Weights::default(), Duration::from_millis(50));
        let serial = game.piece_serial();

        for _ in 0..20 {
            bot.update(Duration::from_millis(50), &mut game);
            if game.piece_serial() != serial {
                break;
            }
        }
        assert_eq!(game.piece_serial(), serial + 1);
        assert!(!game.board.is_empty());
    }

    #[test]
    fn test_illegal_rotation_aborts_plan() {
        let mut game = quiet_game(13);
        let mut bot = Bot::new(Weights::default(), Duration::from_millis(50));
        bot.planned_for = Some(game.piece_serial());
        bot.queue = VecDeque::from([Action::Rotate, Action::HardDrop]);
        bot.state = BotState::Executing;

        // Every kind's first quarter turn from spawn needs one of these cells
        for (x, y) in [(3, 0), (3, 1), (3, 2), (3, 3), (4, 2), (4, 3)] {
            game.board.set(x, y, Cell::Garbage);
        }
        let before = game.current_piece().map(|p| p.shape);

        assert_eq!(bot.update(Duration::from_millis(50), &mut game), None);
        assert_eq!(game.current_piece().map(|p| p.shape), before);
        assert_eq!(bot.pending(), 0);
        assert_eq!(bot.state(), BotState::Planning);
    }

    #[test]
    fn test_bot_idles_after_game_over() {
        let mut game = quiet_game(14);
        game.board.set(0, 0, Cell::Garbage);
        game.apply_garbage(1);
        let mut bot = Bot::new(Weights::default(), Duration::from_millis(50));
        assert_eq!(bot.update(Duration::from_millis(50), &mut game), None);
        assert_eq!(bot.state(), BotState::Idle);
    }
}
