// src/fusion.rs
//! Joining every scoring signal into per-pair rows, then reducing them to
//! per-word and per-verse scores.

use crate::core::normalize::normalize;
use crate::core::types::{Row, ScoreRow, Signal, TopSourceScore, VerseScore};
use crate::embedding::EmbeddingLookup;
use crate::error::Result;
use crate::matching::MatchDictionary;
use crate::tables::{AlignmentRecord, BestAlignmentRecord, ScoreRecord, TranslationRecord};
use indexmap::{IndexMap, IndexSet};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

type Pair = (String, String);

/// The external producers' output, keyed for lookup.
#[derive(Debug, Default)]
pub struct SignalTables {
    /// (vref, source, target) -> verse_score
    alignment: FxHashMap<(String, String, String), f64>,
    /// Aligned pairs per verse, in file order.
    aligned_pairs: FxHashMap<String, Vec<Pair>>,
    avg_aligned: FxHashMap<Pair, f64>,
    /// Translation scores; values below the noise floor are stored as 0.
    translation: FxHashMap<Pair, f64>,
}

impl SignalTables {
    pub fn new(
        alignments: Vec<AlignmentRecord>,
        best_alignments: Vec<BestAlignmentRecord>,
        translations: Vec<TranslationRecord>,
        translation_floor: f64,
    ) -> Self {
        let mut tables = SignalTables::default();

        for record in alignments {
            let pair = (normalize(&record.source), normalize(&record.target));
            let key = (record.vref.clone(), pair.0.clone(), pair.1.clone());
            if tables.alignment.contains_key(&key) {
                continue;
            }
            tables.alignment.insert(key, record.verse_score);
            tables.aligned_pairs.entry(record.vref).or_default().push(pair);
        }

        for record in &best_alignments {
            let pair = (normalize(&record.source), normalize(&record.target));
            tables.avg_aligned.entry(pair).or_insert_with(|| record.avg_aligned());
        }

        for record in translations {
            let pair = (normalize(&record.source), normalize(&record.target));
            let score = if record.translation_score < translation_floor {
                0.0
            } else {
                record.translation_score
            };
            tables.translation.entry(pair).or_insert(score);
        }
        tables
    }

    fn alignment_score(&self, vref: &str, source: &str, target: &str) -> Signal {
        self.alignment
            .get(&(vref.to_string(), source.to_string(), target.to_string()))
            .copied()
            .into()
    }

    fn avg_aligned(&self, pair: &Pair) -> Signal {
        self.avg_aligned.get(pair).copied().into()
    }

    fn translation_score(&self, pair: &Pair) -> Signal {
        self.translation.get(pair).copied().into()
    }

    /// Whether any producer mentions the pair in this verse.
    fn mentions(&self, vref: &str, pair: &Pair) -> bool {
        self.alignment
            .contains_key(&(vref.to_string(), pair.0.clone(), pair.1.clone()))
            || self.avg_aligned.contains_key(pair)
            || self.translation.contains_key(pair)
    }
}

/// A (verse, source, target) pairing that some signal speaks about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub vref: String,
    pub source: String,
    pub target: String,
}

/// Every pairing the score table will contain, in verse order then word
/// order.
#[derive(Debug, Default)]
pub struct Candidates {
    items: Vec<Candidate>,
}

impl Candidates {
    /// Outer join of the producer tables and the match dictionary over the
    /// condensed rows. Within a verse, pairs of words from the verse come
    /// first (source order, then target order), followed by aligner pairs
    /// whose words the verse does not contain, in file order.
    pub fn collect(rows: &[Row], signals: &SignalTables, matches: &MatchDictionary) -> Self {
        let mut items = Vec::new();
        let mut known_vrefs: FxHashSet<&str> = FxHashSet::default();

        for row in rows {
            known_vrefs.insert(row.vref.as_str());
            let targets: IndexSet<&str> = row.target_words.iter().map(String::as_str).collect();
            let mut seen: FxHashSet<Pair> = FxHashSet::default();

            for source in row.source_words.iter().map(String::as_str).collect::<IndexSet<_>>() {
                for &target in &targets {
                    let pair = (source.to_string(), target.to_string());
                    if seen.contains(&pair) {
                        continue;
                    }
                    if signals.mentions(&row.vref, &pair) || matches.find(source, target).is_some() {
                        seen.insert(pair.clone());
                        items.push(Candidate { vref: row.vref.clone(), source: pair.0, target: pair.1 });
                    }
                }
            }

            if let Some(aligned) = signals.aligned_pairs.get(&row.vref) {
                for pair in aligned {
                    if seen.insert(pair.clone()) {
                        items.push(Candidate {
                            vref: row.vref.clone(),
                            source: pair.0.clone(),
                            target: pair.1.clone(),
                        });
                    }
                }
            }
        }

        let orphans = signals
            .aligned_pairs
            .keys()
            .filter(|vref| !known_vrefs.contains(vref.as_str()))
            .count();
        if orphans > 0 {
            tracing::warn!("Skipped aligner rows for {} verses absent from the condensed corpus", orphans);
        }
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn source_words(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|c| c.source.as_str())
    }

    pub fn target_words(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|c| c.target.as_str())
    }
}

/// Word-level scores for one corpus pair.
#[derive(Debug, Default)]
pub struct ScoreTable {
    rows: Vec<ScoreRow>,
}

impl ScoreTable {
    pub fn from_rows(rows: Vec<ScoreRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[ScoreRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn records(&self) -> Vec<ScoreRecord> {
        self.rows.iter().map(ScoreRecord::from).collect()
    }
}

/// Fills every signal for every candidate. Every candidate word must
/// already have an embedding in `embeddings`.
pub fn fuse(
    candidates: &Candidates,
    signals: &SignalTables,
    matches: &MatchDictionary,
    embeddings: &EmbeddingLookup,
) -> Result<ScoreTable> {
    let rows = candidates
        .items
        .par_iter()
        .map(|c| -> Result<ScoreRow> {
            let pair = (c.source.clone(), c.target.clone());
            let matched = matches.find(&c.source, &c.target);
            Ok(ScoreRow {
                vref: c.vref.clone(),
                alignment_score: signals.alignment_score(&c.vref, &c.source, &c.target),
                translation_score: signals.translation_score(&pair),
                avg_aligned: signals.avg_aligned(&pair),
                jac_sim: matched.map(|m| m.jaccard_similarity).into(),
                match_counts: matched.map(|m| f64::from(m.count)).into(),
                encoding_dist: embeddings.distance(&c.source, &c.target)?,
                source: pair.0,
                target: pair.1,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    tracing::info!("Fused {} score rows", rows.len());
    Ok(ScoreTable { rows })
}

/// The best-scoring row per (verse, source word). A defined score beats an
/// undefined one; among defined scores the higher wins and ties keep the
/// earlier row.
pub fn top_source_scores(table: &ScoreTable) -> Vec<TopSourceScore> {
    let mut best: IndexMap<(&str, &str), (&ScoreRow, Option<f64>)> = IndexMap::new();
    for row in &table.rows {
        let score = row.total_score();
        let key = (row.vref.as_str(), row.source.as_str());
        match best.get_mut(&key) {
            None => {
                best.insert(key, (row, score));
            }
            Some(current) => {
                let better = match (current.1, score) {
                    (None, Some(_)) => true,
                    (Some(old), Some(new)) => new > old,
                    _ => false,
                };
                if better {
                    *current = (row, score);
                }
            }
        }
    }

    best.into_values()
        .map(|(row, score)| TopSourceScore {
            vref: row.vref.clone(),
            source: row.source.clone(),
            target: row.target.clone(),
            total_score: score,
        })
        .collect()
}

/// Mean top-source score per verse, in corpus order.
///
/// A verse with no defined word score has no data. Such verses are trimmed
/// from the head and tail of the sequence; inside it they score 0.
pub fn verse_scores(rows: &[Row], top: &[TopSourceScore]) -> Vec<VerseScore> {
    let mut per_verse: FxHashMap<&str, (f64, usize, bool)> = FxHashMap::default();
    for entry in top {
        let slot = per_verse.entry(entry.vref.as_str()).or_insert((0.0, 0, false));
        slot.0 += entry.total_score.unwrap_or(0.0);
        slot.1 += 1;
        slot.2 |= entry.total_score.is_some();
    }

    let scores: Vec<(&str, Option<f64>)> = rows
        .iter()
        .map(|row| {
            let score = per_verse
                .get(row.vref.as_str())
                .filter(|(_, _, defined)| *defined)
                .map(|(sum, n, _)| sum / *n as f64);
            (row.vref.as_str(), score)
        })
        .collect();

    let Some(first) = scores.iter().position(|(_, s)| s.is_some()) else {
        return Vec::new();
    };
    let last = scores.iter().rposition(|(_, s)| s.is_some()).unwrap_or(first);

    scores[first..=last]
        .iter()
        .map(|(vref, score)| VerseScore { vref: vref.to_string(), total_score: score.unwrap_or(0.0) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::WordIndex;
    use crate::core::corpus::build_rows;
    use crate::embedding::WeightMatrix;
    use crate::error::{AlignError, Side};
    use ndarray::Array2;
    use proptest::prelude::*;

    fn corpus() -> Vec<Row> {
        build_rows(
            vec!["the cat".into(), "the dog".into(), "a cat".into()],
            Some(vec!["le chat".into(), "le chien".into(), "un chat".into()]),
            None,
            false,
        )
        .unwrap()
    }

    fn alignment(vref: &str, source: &str, target: &str, verse_score: f64) -> AlignmentRecord {
        AlignmentRecord {
            vref: vref.into(),
            source: source.into(),
            target: target.into(),
            alignment_count: 1.0,
            co_occurrence_count: 1.0,
            verse_score,
        }
    }

    fn identity_lookup(rows: &[Row], candidates: &Candidates) -> EmbeddingLookup {
        let source = WordIndex::build(rows, Side::Source);
        let target = WordIndex::build(rows, Side::Target);
        let weights = WeightMatrix::new(Array2::eye(rows.len()));
        EmbeddingLookup::build(&weights, &source, &target, candidates.source_words(), candidates.target_words())
            .unwrap()
    }

    fn score_row(vref: &str, source: &str, target: &str, alignment: Signal) -> ScoreRow {
        ScoreRow {
            vref: vref.into(),
            source: source.into(),
            target: target.into(),
            alignment_score: alignment,
            translation_score: Signal::Absent,
            avg_aligned: Signal::Absent,
            jac_sim: Signal::Absent,
            match_counts: Signal::Absent,
            encoding_dist: 1.0,
        }
    }

    #[test]
    fn translation_noise_is_clamped_to_a_real_zero() {
        let tables = SignalTables::new(
            vec![],
            vec![],
            vec![
                TranslationRecord { source: "cat".into(), target: "chat".into(), translation_score: 1e-7 },
                TranslationRecord { source: "dog".into(), target: "chien".into(), translation_score: 0.6 },
            ],
            1e-5,
        );
        let cat = ("cat".to_string(), "chat".to_string());
        let dog = ("dog".to_string(), "chien".to_string());
        assert_eq!(tables.translation_score(&cat), Signal::Present(0.0));
        assert!(tables.mentions("1", &cat));
        assert_eq!(tables.translation_score(&dog), Signal::Present(0.6));
    }

    #[test]
    fn outer_join_fills_missing_signals_with_absent() {
        let rows = corpus();
        let signals = SignalTables::new(
            vec![alignment("1", "cat", "chat", 0.8)],
            vec![BestAlignmentRecord {
                source: "cat".into(),
                target: "chat".into(),
                alignment_count: 1.0,
                co_occurrence_count: 2.0,
            }],
            vec![TranslationRecord { source: "dog".into(), target: "chien".into(), translation_score: 0.6 }],
            1e-5,
        );
        let matches = MatchDictionary::default();
        let candidates = Candidates::collect(&rows, &signals, &matches);
        let lookup = identity_lookup(&rows, &candidates);
        let table = fuse(&candidates, &signals, &matches, &lookup).unwrap();

        let pairs: Vec<(&str, &str, &str)> = table
            .rows()
            .iter()
            .map(|r| (r.vref.as_str(), r.source.as_str(), r.target.as_str()))
            .collect();
        assert_eq!(pairs, vec![("1", "cat", "chat"), ("2", "dog", "chien"), ("3", "cat", "chat")]);

        let first = &table.rows()[0];
        assert_eq!(first.alignment_score, Signal::Present(0.8));
        assert_eq!(first.avg_aligned, Signal::Present(0.5));
        assert_eq!(first.translation_score, Signal::Absent);
        // Verse 3 only has the corpus-level average.
        assert_eq!(table.rows()[2].alignment_score, Signal::Absent);
        assert!(table.rows().iter().all(|r| r.total_score().is_some()));
    }

    #[test]
    fn pair_known_only_through_noise_has_a_defined_total() {
        let rows = corpus();
        let signals = SignalTables::new(
            vec![],
            vec![],
            vec![TranslationRecord { source: "cat".into(), target: "chat".into(), translation_score: 1e-7 }],
            1e-5,
        );
        let matches = MatchDictionary::default();
        let candidates = Candidates::collect(&rows, &signals, &matches);
        let lookup = identity_lookup(&rows, &candidates);
        let table = fuse(&candidates, &signals, &matches, &lookup).unwrap();

        assert_eq!(table.len(), 2);
        for row in table.rows() {
            let expected = crate::core::types::fuse_signals(0.0, 0.0, 0.0, 0.0, row.encoding_dist);
            assert_eq!(row.translation_score, Signal::Present(0.0));
            assert_eq!(row.total_score(), Some(expected));
        }
        let verses = verse_scores(&rows, &top_source_scores(&table));
        assert_eq!(verses.first().map(|v| v.vref.as_str()), Some("1"));
        assert!((verses[0].total_score - 2f64.ln() / 5.0).abs() < 1e-12);
    }

    #[test]
    fn aligner_pairs_outside_the_verse_still_need_embeddings() {
        let rows = corpus();
        let signals = SignalTables::new(vec![alignment("1", "cat", "hibou", 0.3)], vec![], vec![], 1e-5);
        let matches = MatchDictionary::default();
        let candidates = Candidates::collect(&rows, &signals, &matches);
        assert_eq!(candidates.len(), 1);

        let source = WordIndex::build(&rows, Side::Source);
        let target = WordIndex::build(&rows, Side::Target);
        let weights = WeightMatrix::new(Array2::eye(rows.len()));
        let err = EmbeddingLookup::build(
            &weights,
            &source,
            &target,
            candidates.source_words(),
            candidates.target_words(),
        )
        .unwrap_err();
        assert!(matches!(err, AlignError::StaleCache { side: Side::Target, .. }));
    }

    #[test]
    fn top_score_prefers_highest_then_earliest() {
        let table = ScoreTable::from_rows(vec![
            score_row("1", "cat", "le", Signal::Present(0.2)),
            score_row("1", "cat", "chat", Signal::Present(0.9)),
            score_row("1", "cat", "un", Signal::Present(0.9)),
            score_row("1", "the", "le", Signal::Absent),
            score_row("2", "cat", "chat", Signal::Present(0.1)),
        ]);
        let top = top_source_scores(&table);
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].target, "chat");
        assert_eq!(top[1].source, "the");
        assert_eq!(top[1].total_score, None);
        assert_eq!(top[2].vref, "2");
    }

    #[test]
    fn verse_scores_trim_empty_edges_only() {
        let rows = build_rows(
            (1..=5).map(|i| format!("w{}", i)).collect(),
            Some((1..=5).map(|i| format!("t{}", i)).collect()),
            None,
            false,
        )
        .unwrap();
        let top = vec![
            TopSourceScore { vref: "1".into(), source: "w1".into(), target: "t1".into(), total_score: None },
            TopSourceScore { vref: "2".into(), source: "a".into(), target: "x".into(), total_score: Some(0.4) },
            TopSourceScore { vref: "2".into(), source: "b".into(), target: "y".into(), total_score: Some(0.2) },
            TopSourceScore { vref: "4".into(), source: "c".into(), target: "z".into(), total_score: Some(0.6) },
        ];
        let verses = verse_scores(&rows, &top);
        let got: Vec<(&str, f64)> = verses.iter().map(|v| (v.vref.as_str(), v.total_score)).collect();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].0, "2");
        assert!((got[0].1 - 0.3).abs() < 1e-12);
        assert_eq!(got[1], ("3", 0.0));
        assert_eq!(got[2], ("4", 0.6));
    }

    #[test]
    fn no_data_means_no_verse_scores() {
        assert!(verse_scores(&corpus(), &[]).is_empty());
    }

    proptest! {
        #[test]
        fn total_score_is_never_nan(
            avg in 0.0f64..=1.0,
            translation in 0.0f64..=1.0,
            alignment in 0.0f64..=1.0,
            jac in 0.0f64..=1.0,
            dist in 0.0f64..1e6,
        ) {
            let total = crate::core::types::fuse_signals(avg, translation, alignment, jac, dist);
            prop_assert!(total.is_finite());
        }
    }
}
