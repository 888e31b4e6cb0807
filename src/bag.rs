//! 7-bag randomizer for piece generation
//!
//! All 7 pieces are shuffled, then dealt out before reshuffling. The shuffle
//! is driven by its own seeded RNG so piece order is reproducible.

use crate::tetromino::TetrominoType;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;

/// The 7-bag piece randomizer
#[derive(Debug, Clone)]
pub struct Bag {
    /// Upcoming pieces, always at least one full bag deep
    queue: VecDeque<TetrominoType>,
    rng: ChaCha8Rng,
}

impl Bag {
    /// Create a bag with the given seed
    pub fn with_seed(seed: u64) -> Self {
        let mut bag = Self {
            queue: VecDeque::with_capacity(14),
            rng: ChaCha8Rng::seed_from_u64(seed),
        };
        bag.refill();
        bag.refill();
        bag
    }

    /// Take the next piece
    pub fn next(&mut self) -> TetrominoType {
        if self.queue.len() <= 7 {
            self.refill();
        }
        // Two bags are queued at construction and topped up above
        self.queue.pop_front().unwrap_or(TetrominoType::I)
    }

    /// The piece `next()` will return
    pub fn peek(&self) -> TetrominoType {
        self.queue.front().copied().unwrap_or(TetrominoType::I)
    }

    /// Preview the next N pieces without removing them
    pub fn preview(&self, count: usize) -> Vec<TetrominoType> {
        self.queue.iter().take(count).copied().collect()
    }

    fn refill(&mut self) {
        let mut new_bag = TetrominoType::all();
        new_bag.shuffle(&mut self.rng);
        self.queue.extend(new_bag);
    }
}
