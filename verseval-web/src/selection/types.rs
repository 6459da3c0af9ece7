//! Value types for the selection subsystem

use std::cmp::Ordering;

/// A single image record: identifier plus owning poem title.
///
/// Ordering is by path only, used purely as the final heap tie-break; it
/// carries no business meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    /// Image identifier (path relative to the images directory)
    pub path: String,
    /// Title of the poem this image illustrates
    pub poem_title: String,
    /// Generator kind parsed from the filename
    pub kind: String,
}

impl PartialOrd for ImageRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ImageRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.cmp(&other.path)
    }
}

/// One priority-queue entry.
///
/// `rating` is the ledger count at push time; a popped slot whose rating no
/// longer matches the ledger is stale and gets discarded (lazy deletion).
/// `tie_breaker` is assigned randomly once at load so equal-rating images
/// come out in a stable shuffled order instead of catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueueSlot {
    pub rating: u32,
    pub tie_breaker: u64,
    pub record: ImageRecord,
}

impl PartialOrd for QueueSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rating
            .cmp(&other.rating)
            .then(self.tie_breaker.cmp(&other.tie_breaker))
            .then_with(|| self.record.cmp(&other.record))
    }
}

/// Outcome of an assignment request.
///
/// Exhaustion is a normal terminal state for a user, not an error: every
/// remaining image's poem has already been seen by them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignOutcome {
    Assigned(ImageRecord),
    Exhausted,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str) -> ImageRecord {
        ImageRecord {
            path: path.to_string(),
            poem_title: "t".to_string(),
            kind: "gpt".to_string(),
        }
    }

    #[test]
    fn slots_order_by_rating_first() {
        let low = QueueSlot { rating: 0, tie_breaker: u64::MAX, record: record("z") };
        let high = QueueSlot { rating: 3, tie_breaker: 0, record: record("a") };
        assert!(low < high);
    }

    #[test]
    fn equal_ratings_order_by_tie_breaker() {
        let a = QueueSlot { rating: 1, tie_breaker: 7, record: record("z") };
        let b = QueueSlot { rating: 1, tie_breaker: 9, record: record("a") };
        assert!(a < b);
    }
}
