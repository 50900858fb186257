//! On-disk caches keyed by corpus identity.
//!
//! Layout under the configured cache directory:
//!
//! - `index/<corpus>.bin` word index per corpus side
//! - `pairs/<source>__<target>.bin` pairwise Jaccard/count scores
//! - `matches/<source>__<target>-j<threshold>-c<count>.json` match dictionary

pub mod pair_scores;
pub mod word_index;

pub use pair_scores::{PairKey, PairScore, PairScoreCache};
pub use word_index::WordIndex;

use crate::core::types::Row;
use crate::error::Side;
use std::fmt;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::Xxh3;

/// Identity of one side of a condensed corpus: the file stem plus a digest
/// of the condensed text, so a changed corpus never resolves to an old
/// cache file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorpusId {
    pub stem: String,
    pub digest: u64,
}

impl CorpusId {
    pub fn for_side(path: &Path, rows: &[Row], side: Side) -> Self {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("corpus")
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
            .take(40)
            .collect::<String>();

        let mut hasher = Xxh3::new();
        for row in rows {
            let words = match side {
                Side::Source => &row.source_words,
                Side::Target => &row.target_words,
            };
            for word in words {
                hasher.update(word.as_bytes());
                hasher.update(b" ");
            }
            hasher.update(b"\n");
        }
        Self { stem, digest: hasher.digest() }
    }

    pub fn key(&self) -> String {
        format!("{}-{:016x}", self.stem, self.digest)
    }
}

impl fmt::Display for CorpusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

pub fn index_path(cache_dir: &Path, corpus: &CorpusId) -> PathBuf {
    cache_dir.join("index").join(format!("{}.bin", corpus.key()))
}

pub fn pair_scores_path(cache_dir: &Path, source: &CorpusId, target: &CorpusId) -> PathBuf {
    cache_dir
        .join("pairs")
        .join(format!("{}__{}.bin", source.key(), target.key()))
}

pub fn match_dictionary_path(
    cache_dir: &Path,
    source: &CorpusId,
    target: &CorpusId,
    jaccard_threshold: f64,
    count_threshold: u32,
) -> PathBuf {
    cache_dir.join("matches").join(format!(
        "{}__{}-j{}-c{}.json",
        source.key(),
        target.key(),
        jaccard_threshold,
        count_threshold
    ))
}
