//! Walkers: critters that drop into the well, pace along the stack and can be
//! stomped by the falling piece.

use crate::board::{BOARD_HEIGHT, BOARD_WIDTH, Board};
use rand::Rng;
use std::time::Duration;

/// Downward acceleration in cells/s²
const GRAVITY: f64 = 35.0;
/// Horizontal speed in cells/s
const WALK_SPEED: f64 = 1.5;
/// Seconds a walker keeps walking before it wanders off
const WALK_LIFETIME: f64 = 15.0;

/// Why a walker left the field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkerFate {
    /// A locked cell landed on it
    Squished,
    /// Ran out of walking time
    Expired,
    /// The falling piece touched it
    Stomped,
}

#[derive(Debug, Clone)]
pub struct Walker {
    pub x: f64,
    pub y: f64,
    vy: f64,
    dir: f64,
    lifetime: f64,
    walking: bool,
}

impl Walker {
    pub fn new(column: usize, facing_right: bool) -> Self {
        Self {
            x: column as f64,
            y: -1.0,
            vy: 0.0,
            dir: if facing_right { 1.0 } else { -1.0 },
            lifetime: WALK_LIFETIME,
            walking: false,
        }
    }

    /// Grid cell the walker occupies
    pub fn cell(&self) -> (i32, i32) {
        let col = (self.x + 0.5).floor().clamp(0.0, (BOARD_WIDTH - 1) as f64);
        ((col as i32), (self.y + 0.5).floor() as i32)
    }

    pub fn is_walking(&self) -> bool {
        self.walking
    }

    /// Advance one step. Returns Some when the walker should be removed.
    pub fn update(&mut self, dt: f64, board: &Board) -> Option<WalkerFate> {
        let (col, row) = self.cell();
        if self.walking && board.get(col, row).is_some_and(|cell| cell.is_filled()) {
            return Some(WalkerFate::Squished);
        }

        // First filled cell at or below the walker in its column, scanned from
        // where it stood before this step
        let start_row = self.y.max(0.0) as usize;
        self.vy += GRAVITY * dt;
        self.y += self.vy * dt;

        let floor = (start_row..BOARD_HEIGHT)
            .find(|&row| board.get(col, row as i32).is_some_and(|cell| cell.is_filled()))
            .unwrap_or(BOARD_HEIGHT);
        let target_y = floor as f64 - 1.0;

        let landed = self.y >= target_y;
        if landed {
            self.y = target_y;
            self.vy = 0.0;
        }
        self.walking = landed;

        if !self.walking {
            return None;
        }

        self.lifetime -= dt;
        let next_x = self.x + self.dir * WALK_SPEED * dt;
        let next_col = (next_x + 0.5).floor() as i32;
        let (_, row) = self.cell();
        let bumped = next_x < 0.0
            || next_x > (BOARD_WIDTH - 1) as f64
            || board.get(next_col, row).is_some_and(|cell| cell.is_filled());
        if bumped {
            self.dir = -self.dir;
        } else {
            self.x = next_x;
        }

        if self.lifetime <= 0.0 {
            Some(WalkerFate::Expired)
        } else {
            None
        }
    }
}

/// All walkers in one well plus the spawn timer
#[derive(Debug, Clone)]
pub struct WalkerField {
    walkers: Vec<Walker>,
    spawn_interval: Duration,
    since_spawn: Duration,
    enabled: bool,
}

impl WalkerField {
    pub fn new(spawn_interval: Duration, enabled: bool) -> Self {
        Self {
            walkers: Vec::new(),
            spawn_interval,
            since_spawn: Duration::ZERO,
            enabled,
        }
    }

    pub fn walkers(&self) -> &[Walker] {
        &self.walkers
    }

    pub fn clear(&mut self) {
        self.walkers.clear();
        self.since_spawn = Duration::ZERO;
    }

    /// Spawn, move and resolve walkers. `piece` holds the falling piece's cells,
    /// a walking walker under any of them is stomped.
    pub fn update<R: Rng>(
        &mut self,
        dt: Duration,
        board: &Board,
        piece: Option<&[(i32, i32); 4]>,
        rng: &mut R,
    ) -> Vec<WalkerFate> {
        if self.enabled {
            self.since_spawn += dt;
            if self.since_spawn >= self.spawn_interval {
                self.since_spawn = Duration::ZERO;
                let column = rng.gen_range(0..BOARD_WIDTH);
                let facing_right = rng.gen_bool(0.5);
                self.walkers.push(Walker::new(column, facing_right));
            }
        }

        let secs = dt.as_secs_f64();
        let mut fates = Vec::new();
        self.walkers.retain_mut(|walker| {
            let fate = walker.update(secs, board).or_else(|| {
                let stomped = walker.is_walking()
                    && piece.is_some_and(|cells| cells.contains(&walker.cell()));
                stomped.then_some(WalkerFate::Stomped)
            });
            match fate {
                Some(fate) => {
                    fates.push(fate);
                    false
                }
                None => true,
            }
        });
        fates
    }
}

#[cfg(test)]
impl WalkerField {
    pub fn push(&mut self, walker: Walker) {
        self.walkers.push(walker);
    }
}
