//! Round score counters

/// Points per cleared line
pub const POINTS_PER_LINE: u64 = 1000;
/// Points per stomped walker
pub const POINTS_PER_STOMP: u64 = 500;

/// Score tracking for one round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Score {
    /// Current score
    pub points: u64,
    /// Total lines cleared
    pub lines: u32,
    /// Walkers stomped by the falling piece
    pub stomps: u32,
}

impl Score {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add score for a line clear
    pub fn add_lines(&mut self, lines: usize) {
        self.lines += lines as u32;
        self.points += POINTS_PER_LINE * lines as u64;
    }

    pub fn add_stomp(&mut self) {
        self.stomps += 1;
        self.points += POINTS_PER_STOMP;
    }
}
