//! Identifier ranges: where a run starts and where it ends.

mod checkpoint;
mod error;
mod index;

use std::fmt;

pub use checkpoint::resume_point;
pub use error::RangeError;
pub use index::{highest_known_id, highest_known_id_with_refresh, parse_index};

/// Half-open identifier interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct IdRange {
    start: u64,
    end: u64,
}

impl IdRange {
    /// Creates `[start, end)`; an `end` below `start` yields an empty range.
    #[must_use]
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// First identifier of the range.
    #[must_use]
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Exclusive end of the range.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of identifiers in the range.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// True when the range holds no identifiers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The identifiers in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<u64> {
        (self.start..self.end).collect()
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
