//! Full-text index over profiles and its asynchronous synchronizer.

mod index;
mod sync;

pub use index::{IndexHits, IndexOp, IndexQuery, IndexSort, ProfileIndex, TermField, ANALYZER};
pub use sync::{IndexSynchronizer, ProfileSource};

use std::time::Duration;

/// Index tuning. Writes become searchable within roughly one refresh interval.
#[derive(Clone, Debug)]
pub struct SearchSettings {
    /// Indexing threads used by the index writer.
    pub workers: usize,
    pub refresh_interval: Duration,
    pub min_gram: usize,
    pub max_gram: usize,
    /// Rebuild the index from the persistence store when the chain is built.
    pub index_on_startup: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        SearchSettings {
            workers: 3,
            refresh_interval: Duration::from_millis(50),
            min_gram: 3,
            max_gram: 10,
            index_on_startup: true,
        }
    }
}
