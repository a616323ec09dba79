//! Temporal cluster-pruned retrieval over a time-ordered tweet stream.
//!
//! Documents live in a flat, read-only [`stats::DocumentStore`]. Every day and
//! hour window carries its own clustering ([`clusters::ClusterIndex`]); a query
//! scans only the partitions whose centroids are closest to its embedding
//! ([`selector`]), scores them with a Dirichlet-smoothed language model
//! ([`scorer`]) and rolls results up across windows ([`executor`]).

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod clusters;
pub mod config;
pub mod dictionary;
pub mod engine;
pub mod error;
pub mod executor;
pub mod persist;
pub mod scorer;
pub mod selector;
pub mod stats;
pub mod tokenizer;
pub mod topics;
pub mod topn;
pub mod window_stats;

pub use error::{Result, RetrievalError};

pub type TermId = u32;
pub type SeqId = u32;
pub type ExternalId = u64;
pub type PartitionId = u32;

pub const HOURS_PER_DAY: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Hour,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Hour => "hour",
        }
    }
}

/// A day or hour window. Indices are 1-based and global to the collection:
/// day `d` holds hours `24 * (d - 1) + 1 ..= 24 * d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId {
    pub granularity: Granularity,
    pub index: u32,
}

impl WindowId {
    pub const fn new(granularity: Granularity, index: u32) -> Self { Self { granularity, index } }
    pub const fn day(index: u32) -> Self { Self::new(Granularity::Day, index) }
    pub const fn hour(index: u32) -> Self { Self::new(Granularity::Hour, index) }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.granularity.as_str(), self.index)
    }
}

/// One ranked result: a document's external id and its relevance score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredDoc {
    pub external_id: ExternalId,
    pub score: f32,
}

impl ScoredDoc {
    pub const fn new(external_id: ExternalId, score: f32) -> Self { Self { external_id, score } }
}
