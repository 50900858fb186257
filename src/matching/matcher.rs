// src/matching/matcher.rs
use crate::cache::{PairKey, PairScore, PairScoreCache, WordIndex};
use crate::core::types::Row;
use crate::error::{AlignError, Result, Side};
use crate::matching::jaccard::pair_score;
use indexmap::IndexMap;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub jaccard: f64,
    pub count: u32,
}

impl Thresholds {
    pub fn admits(&self, score: &PairScore) -> bool {
        score.jaccard_similarity > self.jaccard && score.count > self.count
    }
}

/// A target word that passed both match thresholds for some source word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEntry {
    #[serde(rename = "value")]
    pub target: String,
    pub jaccard_similarity: f64,
    pub count: u32,
}

/// Source word to its matching target words, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchDictionary {
    entries: IndexMap<String, Vec<MatchEntry>>,
}

impl MatchDictionary {
    /// Rebuilds the dictionary from already-scored pairs. Pairs missing
    /// from `cache` are skipped, so this is only complete after
    /// [`match_words`] has scored the same rows.
    pub fn from_cache(rows: &[Row], cache: &PairScoreCache, thresholds: Thresholds) -> Self {
        let mut entries: IndexMap<String, Vec<MatchEntry>> = IndexMap::new();
        let mut seen: FxHashSet<(&str, &str)> = FxHashSet::default();

        for row in rows {
            let targets = distinct(&row.target_words);
            for s in distinct(&row.source_words) {
                for &t in &targets {
                    if seen.contains(&(s, t)) {
                        continue;
                    }
                    let Some(score) = cache.get(s, t) else { continue };
                    seen.insert((s, t));
                    if thresholds.admits(&score) {
                        entries.entry(s.to_string()).or_default().push(MatchEntry {
                            target: t.to_string(),
                            jaccard_similarity: score.jaccard_similarity,
                            count: score.count,
                        });
                    }
                }
            }
        }
        Self { entries }
    }

    pub fn get(&self, source: &str) -> &[MatchEntry] {
        self.entries.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find(&self, source: &str, target: &str) -> Option<&MatchEntry> {
        self.get(source).iter().find(|e| e.target == target)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    fn iter(&self) -> impl Iterator<Item = (&str, &[MatchEntry])> {
        self.entries.iter().map(|(s, e)| (s.as_str(), e.as_slice()))
    }
}

/// Distinct words of a row, in first-seen order.
fn distinct(words: &[String]) -> Vec<&str> {
    let mut seen = FxHashSet::default();
    words
        .iter()
        .map(String::as_str)
        .filter(|w| seen.insert(*w))
        .collect()
}

/// Scores every (source, target) pair co-occurring in some row and builds
/// the match dictionary.
///
/// Pairs already in `cache` (under either ordering) are not recomputed;
/// new scores are added to it. The heavy part, scoring unseen pairs, runs
/// in parallel; the dictionary is then assembled sequentially in row order.
pub fn match_words(
    source_index: &WordIndex,
    target_index: &WordIndex,
    rows: &[Row],
    thresholds: Thresholds,
    cache: &mut PairScoreCache,
) -> Result<MatchDictionary> {
    let mut pending: Vec<(&str, &str)> = Vec::new();
    let mut queued: FxHashSet<PairKey> = FxHashSet::default();
    for row in rows {
        let targets = distinct(&row.target_words);
        for s in distinct(&row.source_words) {
            for &t in &targets {
                if cache.contains(s, t) {
                    continue;
                }
                if queued.insert(PairKey::new(s, t)) {
                    pending.push((s, t));
                }
            }
        }
    }
    tracing::debug!("{} cached pairs, {} to score", cache.len(), pending.len());

    let scored: Vec<(&str, &str, PairScore)> = pending
        .par_iter()
        .map(|&(s, t)| {
            let source_rows = source_index.require(s, Side::Source)?;
            let target_rows = target_index.require(t, Side::Target)?;
            Ok::<_, AlignError>((s, t, pair_score(source_rows, target_rows)))
        })
        .collect::<Result<_>>()?;

    for (s, t, score) in scored {
        cache.insert(s, t, score);
    }

    let dictionary = MatchDictionary::from_cache(rows, cache, thresholds);
    tracing::info!(
        "Matched {} source words ({} scored pairs)",
        dictionary.len(),
        cache.len()
    );
    Ok(dictionary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::corpus::build_rows;

    fn corpus(source: &[&str], target: &[&str]) -> Vec<Row> {
        build_rows(
            source.iter().map(|s| s.to_string()).collect(),
            Some(target.iter().map(|s| s.to_string()).collect()),
            None,
            false,
        )
        .unwrap()
    }

    // "cat" occurs in rows {1,2,3}, "chat" in rows {2,3,4}.
    fn overlapping() -> Vec<Row> {
        corpus(
            &["x", "cat", "cat", "cat", "y"],
            &["u", "v", "chat", "chat", "chat"],
        )
    }

    fn run(rows: &[Row], thresholds: Thresholds) -> (MatchDictionary, PairScoreCache) {
        let source = WordIndex::build(rows, Side::Source);
        let target = WordIndex::build(rows, Side::Target);
        let mut cache = PairScoreCache::new();
        let dictionary = match_words(&source, &target, rows, thresholds, &mut cache).unwrap();
        (dictionary, cache)
    }

    #[test]
    fn pair_above_both_thresholds_is_kept() {
        let (dictionary, cache) = run(&overlapping(), Thresholds { jaccard: 0.4, count: 1 });
        let entry = dictionary.find("cat", "chat").unwrap();
        assert_eq!(entry.jaccard_similarity, 0.5);
        assert_eq!(entry.count, 2);
        assert_eq!(cache.get("chat", "cat").unwrap().count, 2);
    }

    #[test]
    fn pair_below_jaccard_threshold_is_dropped_but_cached() {
        let rows = overlapping();
        let (dictionary, cache) = run(&rows, Thresholds { jaccard: 0.6, count: 1 });
        assert!(dictionary.find("cat", "chat").is_none());
        assert!(cache.contains("cat", "chat"));

        let relaxed = MatchDictionary::from_cache(&rows, &cache, Thresholds { jaccard: 0.4, count: 1 });
        assert!(relaxed.find("cat", "chat").is_some());
    }

    #[test]
    fn targets_are_unique_and_in_first_seen_order() {
        let rows = corpus(&["a a b", "a b"], &["x y x", "y x"]);
        let (dictionary, _) = run(&rows, Thresholds { jaccard: 0.0, count: 0 });
        let targets: Vec<&str> = dictionary.get("a").iter().map(|e| e.target.as_str()).collect();
        assert_eq!(targets, vec!["x", "y"]);
        let sources: Vec<&str> = dictionary.iter().map(|(s, _)| s).collect();
        assert_eq!(sources, vec!["a", "b"]);
    }

    #[test]
    fn cached_pairs_are_reused() {
        let rows = overlapping();
        let source = WordIndex::build(&rows, Side::Source);
        let target = WordIndex::build(&rows, Side::Target);
        let mut cache = PairScoreCache::new();
        // A planted score proves the cached value wins over recomputation.
        cache.insert("chat", "cat", PairScore { jaccard_similarity: 0.9, count: 9 });
        let dictionary =
            match_words(&source, &target, &rows, Thresholds { jaccard: 0.4, count: 1 }, &mut cache).unwrap();
        assert_eq!(dictionary.find("cat", "chat").unwrap().count, 9);
    }

    #[test]
    fn stale_index_is_reported() {
        let rows = overlapping();
        let source = WordIndex::build(&rows[..2], Side::Source);
        let target = WordIndex::build(&rows, Side::Target);
        let mut cache = PairScoreCache::new();
        let err = match_words(&source, &target, &rows, Thresholds { jaccard: 0.0, count: 0 }, &mut cache)
            .unwrap_err();
        assert!(matches!(err, crate::error::AlignError::StaleCache { side: Side::Source, .. }));
    }

    #[test]
    fn dictionary_serializes_with_value_key() {
        let (dictionary, _) = run(&overlapping(), Thresholds { jaccard: 0.4, count: 1 });
        let json = serde_json::to_value(&dictionary).unwrap();
        assert_eq!(json["cat"][0]["value"], "chat");
    }
}
