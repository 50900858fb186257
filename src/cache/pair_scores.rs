// src/cache/pair_scores.rs
use crate::error::Result;
use crate::persistence::{load_bincode, save_bincode, WriteLease};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// An unordered word pair, stored with the lexicographically smaller word
/// first so `(a, b)` and `(b, a)` resolve to the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    first: String,
    second: String,
}

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self { first: first.to_string(), second: second.to_string() }
    }

    #[cfg(test)]
    fn words(&self) -> (&str, &str) {
        (&self.first, &self.second)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairScore {
    pub jaccard_similarity: f64,
    pub count: u32,
}

/// Jaccard similarity and co-occurrence count for every pair ever
/// evaluated. Threshold-independent: changing the match thresholds only
/// changes which cached pairs enter the match dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairScoreCache {
    scores: FxHashMap<PairKey, PairScore>,
}

impl PairScoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, a: &str, b: &str) -> Option<PairScore> {
        self.scores.get(&PairKey::new(a, b)).copied()
    }

    pub fn contains(&self, a: &str, b: &str) -> bool {
        self.scores.contains_key(&PairKey::new(a, b))
    }

    pub fn insert(&mut self, a: &str, b: &str, score: PairScore) {
        self.scores.insert(PairKey::new(a, b), score);
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// The persisted cache at `path`, or an empty one when refreshing or
    /// when nothing has been persisted yet.
    pub fn load_or_default(path: &Path, refresh: bool) -> Result<Self> {
        if refresh || !path.exists() {
            return Ok(Self::new());
        }
        let cache: PairScoreCache = load_bincode(path)?;
        tracing::debug!("Loaded {} cached pair scores from {}", cache.len(), path.display());
        Ok(cache)
    }

    /// Writes the cache; `refresh` also breaks a lease left by a killed run.
    pub fn persist(&self, path: &Path, refresh: bool) -> Result<()> {
        let _lease = WriteLease::acquire(path, refresh)?;
        save_bincode(self, path)
    }
}
