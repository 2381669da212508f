//! Per-cell detection scan with a self-sizing candidate buffer.
//!
//! Each cell issues one overlap query into a caller-owned slice.  When the
//! query fills the slice the result may be truncated, so the buffer doubles
//! (never past the configured maximum) and the query is reissued.  The size
//! reached becomes the starting size for any later reallocation, so a
//! crowded world only pays for growth once.

use gridsense_types::{LayerMask, ObjectId};
use tracing::debug;

use crate::spatial::{OrientedBox, SpatialQuery};

/// Growable scratch array of candidate ids for one cell query.
#[derive(Debug, Clone)]
pub struct CandidateBuffer {
    slots: Vec<ObjectId>,
    initial_size: usize,
    max_size: usize,
}

impl CandidateBuffer {
    /// Create a buffer holding `min(initial_size, max_size)` slots.
    pub fn new(initial_size: usize, max_size: usize) -> Self {
        let max_size = max_size.max(1);
        let initial_size = initial_size.clamp(1, max_size);
        Self {
            slots: vec![ObjectId::default(); initial_size],
            initial_size,
            max_size,
        }
    }

    /// Current number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Size the buffer will start at after the next [`reallocate`][Self::reallocate].
    pub fn initial_size(&self) -> usize {
        self.initial_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Rebuild the buffer for new size limits.  The larger of the learned
    /// size and `initial_size` is kept, capped at the new maximum.
    pub fn reallocate(&mut self, initial_size: usize, max_size: usize) {
        self.max_size = max_size.max(1);
        self.initial_size = self.initial_size.max(initial_size).clamp(1, self.max_size);
        self.slots = vec![ObjectId::default(); self.initial_size];
    }

    /// Query `world` for `volume`, growing the buffer while the result fills
    /// it.  Returns the number of valid entries in [`candidates`][Self::candidates].
    ///
    /// At most `ceil(log2(max / capacity)) + 1` queries are issued.  A result
    /// still equal to the maximum size after growth is accepted as-is.
    pub fn query<W>(&mut self, world: &W, volume: &OrientedBox, mask: LayerMask) -> usize
    where
        W: SpatialQuery + ?Sized,
    {
        let mut attempts = doublings_to_reach(self.slots.len(), self.max_size) + 1;
        loop {
            let found = world.overlap_box(volume, mask, &mut self.slots);
            attempts -= 1;
            if found < self.slots.len() {
                return found;
            }
            if self.slots.len() >= self.max_size || attempts == 0 {
                debug!(
                    capacity = self.slots.len(),
                    "candidate buffer saturated at maximum size; result may be truncated"
                );
                return found;
            }
            let grown = (self.slots.len() * 2).min(self.max_size);
            debug!(from = self.slots.len(), to = grown, "growing candidate buffer");
            self.slots.resize(grown, ObjectId::default());
            self.initial_size = grown;
        }
    }

    /// The first `found` entries written by the last [`query`][Self::query].
    pub fn candidates(&self, found: usize) -> &[ObjectId] {
        &self.slots[..found.min(self.slots.len())]
    }
}

/// Number of doublings needed to grow `from` to at least `to`.
fn doublings_to_reach(from: usize, to: usize) -> usize {
    let mut size = from.max(1);
    let mut steps = 0;
    while size < to {
        size = size.saturating_mul(2);
        steps += 1;
    }
    steps
}
