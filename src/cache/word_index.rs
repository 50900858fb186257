// src/cache/word_index.rs
use crate::cache::{index_path, CorpusId};
use crate::core::types::{Row, RowId};
use crate::error::{AlignError, Result, Side};
use crate::persistence::{load_bincode, save_bincode, WriteLease};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// For every normalized word on one side of the corpus, the ascending
/// positions of the condensed rows it occurs in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordIndex {
    row_count: usize,
    words: FxHashMap<String, Vec<RowId>>,
    /// Cache key this index was built or loaded under, for error reports.
    #[serde(skip)]
    label: String,
}

impl WordIndex {
    /// One pass over the rows; O(total tokens).
    pub fn build(rows: &[Row], side: Side) -> Self {
        let mut words: FxHashMap<String, Vec<RowId>> = FxHashMap::default();
        for (i, row) in rows.iter().enumerate() {
            let row_id = i as RowId;
            let tokens = match side {
                Side::Source => &row.source_words,
                Side::Target => &row.target_words,
            };
            for token in tokens {
                let positions = words.entry(token.clone()).or_default();
                // Rows are visited in order, so only the tail can repeat.
                if positions.last() != Some(&row_id) {
                    positions.push(row_id);
                }
            }
        }
        Self { row_count: rows.len(), words, label: String::new() }
    }

    /// Loads the persisted index for `corpus` unless `refresh` is set or
    /// no cache file exists, in which case it is rebuilt and persisted.
    pub fn build_or_load(
        cache_dir: &Path,
        corpus: &CorpusId,
        rows: &[Row],
        side: Side,
        refresh: bool,
    ) -> Result<Self> {
        let path = index_path(cache_dir, corpus);
        if !refresh && path.exists() {
            let mut index: WordIndex = load_bincode(&path)?;
            index.label = corpus.key();
            tracing::debug!("Loaded {} index '{}' ({} words)", side, corpus, index.len());
            return Ok(index);
        }

        let mut index = Self::build(rows, side);
        index.label = corpus.key();
        let _lease = WriteLease::acquire(&path, refresh)?;
        save_bincode(&index, &path)?;
        tracing::info!(
            "Built {} index '{}': {} words over {} rows",
            side,
            corpus,
            index.len(),
            index.row_count
        );
        Ok(index)
    }

    pub fn get(&self, word: &str) -> Option<&[RowId]> {
        self.words.get(word).map(Vec::as_slice)
    }

    /// Like [`get`](Self::get), but a missing word means the cache does not
    /// describe the corpus being scored.
    pub fn require(&self, word: &str, side: Side) -> Result<&[RowId]> {
        self.get(word).ok_or_else(|| AlignError::StaleCache {
            side,
            word: word.to_string(),
            corpus: self.label.clone(),
        })
    }

    #[cfg(test)]
    fn contains(&self, word: &str) -> bool {
        self.words.contains_key(word)
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
