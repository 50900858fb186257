use crate::cache::{
    match_dictionary_path, pair_scores_path, CorpusId, PairScoreCache, WordIndex,
};
use crate::config::EngineConfig;
use crate::core::types::{Row, TopSourceScore, VerseScore};
use crate::core::{condense::condense, corpus};
use crate::detector::{detect, Baseline, FlaggedWord};
use crate::embedding::{EmbeddingLookup, WeightMatrix};
use crate::error::{AlignError, Result, Side};
use crate::fusion::{fuse, top_source_scores, verse_scores, Candidates, ScoreTable, SignalTables};
use crate::matching::{match_words, MatchDictionary, Thresholds};
use crate::persistence::{load_json, save_json, WriteLease};
use crate::tables::{self, write_csv};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const SCORES_FILE: &str = "scores.csv";
pub const TOP_SOURCE_FILE: &str = "top_source_scores.csv";
pub const VERSE_FILE: &str = "verse_scores.csv";
pub const FLAGS_FILE: &str = "flagged_words.json";

/// A condensed verse-pair corpus and the identity of each side.
#[derive(Debug, Clone)]
pub struct PreparedCorpus {
    pub rows: Vec<Row>,
    pub source_id: CorpusId,
    pub target_id: CorpusId,
}

/// Paths to everything one assessment reads.
#[derive(Debug, Clone, Copy)]
pub struct AssessmentInputs<'a> {
    pub source: &'a Path,
    pub target: &'a Path,
    pub vrefs: Option<&'a Path>,
    pub alignments: &'a Path,
    pub best_alignments: &'a Path,
    pub translations: &'a Path,
    pub weights: &'a Path,
}

/// The result of scoring one target against its source.
#[derive(Debug)]
pub struct Assessment {
    pub corpus: PreparedCorpus,
    pub matches: MatchDictionary,
    pub scores: ScoreTable,
    pub top_source: Vec<TopSourceScore>,
    pub verses: Vec<VerseScore>,
}

impl Assessment {
    /// Writes the score, top-source and verse tables into `out_dir`.
    ///
    /// All three are staged in a scratch directory inside `out_dir` and
    /// moved in only once every one was written. If a move fails, the
    /// tables already moved are removed again, so `out_dir` never holds a
    /// partial set from this run.
    pub fn publish(&self, out_dir: &Path) -> Result<()> {
        fs::create_dir_all(out_dir).map_err(|e| AlignError::io(out_dir, e))?;
        let staging = tempfile::Builder::new()
            .prefix(".publish-")
            .tempdir_in(out_dir)
            .map_err(|e| AlignError::io(out_dir, e))?;

        write_csv(&self.scores.records(), &staging.path().join(SCORES_FILE))?;
        write_csv(&self.top_source, &staging.path().join(TOP_SOURCE_FILE))?;
        write_csv(&self.verses, &staging.path().join(VERSE_FILE))?;

        let mut moved: Vec<PathBuf> = Vec::with_capacity(3);
        for name in [SCORES_FILE, TOP_SOURCE_FILE, VERSE_FILE] {
            let destination = out_dir.join(name);
            if let Err(e) = fs::rename(staging.path().join(name), &destination) {
                for done in &moved {
                    if let Err(undo) = fs::remove_file(done) {
                        tracing::warn!("Could not withdraw {}: {}", done.display(), undo);
                    }
                }
                return Err(AlignError::io(destination, e));
            }
            moved.push(destination);
        }
        tracing::info!("Published assessment tables to {}", out_dir.display());
        Ok(())
    }
}

/// Runs the alignment scoring pipeline for one (source, target) pair:
/// load, condense, index, match, embed, fuse, aggregate.
pub struct AlignmentEngine {
    config: EngineConfig,
}

impl AlignmentEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            jaccard: self.config.jaccard_threshold,
            count: self.config.count_threshold,
        }
    }

    /// Loads and condenses both sides. Every corpus invariant is checked
    /// here, before anything touches the cache.
    pub fn prepare(&self, source: &Path, target: &Path, vrefs: Option<&Path>) -> Result<PreparedCorpus> {
        let rows = corpus::load(source, Some(target), vrefs, self.config.is_bible)?;
        let rows = condense(rows)?;
        Ok(PreparedCorpus {
            source_id: CorpusId::for_side(source, &rows, Side::Source),
            target_id: CorpusId::for_side(target, &rows, Side::Target),
            rows,
        })
    }

    pub fn indexes(&self, corpus: &PreparedCorpus) -> Result<(WordIndex, WordIndex)> {
        let dir = &self.config.cache_dir;
        let refresh = self.config.refresh;
        let source = WordIndex::build_or_load(dir, &corpus.source_id, &corpus.rows, Side::Source, refresh)?;
        let target = WordIndex::build_or_load(dir, &corpus.target_id, &corpus.rows, Side::Target, refresh)?;
        Ok((source, target))
    }

    /// The match dictionary for the configured thresholds.
    ///
    /// A persisted dictionary for these thresholds is reused as is.
    /// Otherwise pair scores come from the threshold-independent pair cache,
    /// topped up with any pairs it lacks, and both are persisted.
    pub fn match_corpus(
        &self,
        corpus: &PreparedCorpus,
        source_index: &WordIndex,
        target_index: &WordIndex,
    ) -> Result<MatchDictionary> {
        let dir = &self.config.cache_dir;
        let thresholds = self.thresholds();
        let dictionary_path = match_dictionary_path(
            dir,
            &corpus.source_id,
            &corpus.target_id,
            thresholds.jaccard,
            thresholds.count,
        );
        if !self.config.refresh && dictionary_path.exists() {
            tracing::debug!("Reusing match dictionary {}", dictionary_path.display());
            return load_json(&dictionary_path);
        }

        let pairs_path = pair_scores_path(dir, &corpus.source_id, &corpus.target_id);
        let mut pair_cache = PairScoreCache::load_or_default(&pairs_path, self.config.refresh)?;
        let before = pair_cache.len();
        let dictionary = match_words(source_index, target_index, &corpus.rows, thresholds, &mut pair_cache)?;

        if pair_cache.len() != before {
            pair_cache.persist(&pairs_path, self.config.refresh)?;
        }
        let _lease = WriteLease::acquire(&dictionary_path, self.config.refresh)?;
        save_json(&dictionary, &dictionary_path)?;
        Ok(dictionary)
    }

    /// Scores a prepared corpus against already-loaded producer output.
    pub fn assess_prepared(
        &self,
        corpus: PreparedCorpus,
        signals: &SignalTables,
        weights: &WeightMatrix,
    ) -> Result<Assessment> {
        let started = Instant::now();
        let (source_index, target_index) = self.indexes(&corpus)?;
        tracing::info!(
            "Indexed {} source and {} target words in {:?}",
            source_index.len(),
            target_index.len(),
            started.elapsed()
        );

        let started = Instant::now();
        let matches = self.match_corpus(&corpus, &source_index, &target_index)?;
        tracing::info!("Match stage finished in {:?}", started.elapsed());

        let started = Instant::now();
        let candidates = Candidates::collect(&corpus.rows, signals, &matches);
        let embeddings = EmbeddingLookup::build(
            weights,
            &source_index,
            &target_index,
            candidates.source_words(),
            candidates.target_words(),
        )?;
        let scores = fuse(&candidates, signals, &matches, &embeddings)?;
        tracing::info!("Embed and fuse stages finished in {:?}", started.elapsed());

        let top_source = top_source_scores(&scores);
        let verses = verse_scores(&corpus.rows, &top_source);
        tracing::info!(
            "Scored {} verses, {} source words, {} pairings",
            verses.len(),
            top_source.len(),
            scores.len()
        );

        Ok(Assessment { corpus, matches, scores, top_source, verses })
    }

    /// Runs the whole pipeline from files.
    pub fn assess(&self, inputs: &AssessmentInputs<'_>) -> Result<Assessment> {
        let corpus = self.prepare(inputs.source, inputs.target, inputs.vrefs)?;
        tracing::info!(
            "Prepared {} verse pairs ({} / {})",
            corpus.rows.len(),
            corpus.source_id,
            corpus.target_id
        );

        let signals = SignalTables::new(
            tables::read_alignments(inputs.alignments)?,
            tables::read_best_alignments(inputs.best_alignments)?,
            tables::read_translations(inputs.translations)?,
            self.config.translation_floor,
        );
        let weights = WeightMatrix::from_text_file(inputs.weights)?;
        self.assess_prepared(corpus, &signals, &weights)
    }

    pub fn flag_missing(
        &self,
        target: &[TopSourceScore],
        baselines: &[Baseline],
        target_id: Option<&str>,
    ) -> Vec<FlaggedWord> {
        detect(target, baselines, target_id, self.config.missing_threshold)
    }

    pub fn publish_flags(&self, flagged: &[FlaggedWord], out_dir: &Path) -> Result<()> {
        save_json(&flagged, &out_dir.join(FLAGS_FILE))
    }
}
