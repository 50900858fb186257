//! Co-occurrence matching of source and target words.

pub mod jaccard;
pub mod matcher;

pub use jaccard::{intersection_count, jaccard, pair_score};
pub use matcher::{match_words, MatchDictionary, MatchEntry, Thresholds};
