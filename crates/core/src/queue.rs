//! Piece queue - 7-bag randomizer with a lookahead window
//!
//! Each bag contains one of each piece (I, O, T, S, Z, J, L), shuffled by the
//! seeded [`Rng`]. Pieces are taken from the end of the bag and appended to the
//! queue until the preview window is full again.

use std::collections::VecDeque;

use thiserror::Error;

use crate::rng::Rng;
use crate::types::PieceKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue index {index} out of range (queue holds {len} pieces)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Seeded bag randomizer
#[derive(Debug, Clone)]
pub struct PieceQueue {
    queue: VecDeque<PieceKind>,
    bag: Vec<PieceKind>,
    preview_count: usize,
    rng: Rng,
    seed: i64,
}

impl PieceQueue {
    /// Create a new piece queue with the given seed
    pub fn new(seed: i64, preview_count: usize) -> Self {
        let preview_count = preview_count.max(1);
        let mut queue = Self {
            queue: VecDeque::with_capacity(preview_count + 7),
            bag: Vec::with_capacity(7),
            preview_count,
            rng: Rng::new(seed),
            seed,
        };
        queue.ensure_filled();
        queue
    }

    /// Generate a new shuffled bag
    fn refill_bag(&mut self) {
        self.bag.clear();
        self.bag.extend_from_slice(&PieceKind::ALL);
        self.rng.shuffle(&mut self.bag);
    }

    fn ensure_filled(&mut self) {
        while self.queue.len() < self.preview_count {
            if self.bag.is_empty() {
                self.refill_bag();
            }
            if let Some(kind) = self.bag.pop() {
                self.queue.push_back(kind);
            }
        }
    }

    /// Remove and return the head of the queue, topping the window back up.
    pub fn pop_next(&mut self) -> PieceKind {
        self.ensure_filled();
        let kind = self.queue.pop_front().unwrap_or(PieceKind::I);
        self.ensure_filled();
        kind
    }

    /// Look `index` pieces ahead without consuming anything.
    pub fn peek(&self, index: usize) -> Result<PieceKind, QueueError> {
        self.queue
            .get(index)
            .copied()
            .ok_or(QueueError::IndexOutOfRange {
                index,
                len: self.queue.len(),
            })
    }

    /// The lookahead window shown to the player.
    pub fn preview(&self) -> impl Iterator<Item = PieceKind> + '_ {
        self.queue.iter().copied().take(self.preview_count)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn preview_count(&self) -> usize {
        self.preview_count
    }

    /// Seed the queue was created with (for restarting with the same sequence).
    pub fn seed(&self) -> i64 {
        self.seed
    }

    /// Current RNG state.
    pub fn rng_state(&self) -> u32 {
        self.rng.state()
    }
}

impl Default for PieceQueue {
    fn default() -> Self {
        Self::new(1, crate::types::DEFAULT_PREVIEW_COUNT)
    }
}
