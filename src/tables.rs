// src/tables.rs
//! CSV tables exchanged with the external producers and with whoever
//! consumes the scores.

use crate::core::types::{ScoreRow, TopSourceScore, VerseScore};
use crate::error::{AlignError, Result};
use crate::persistence::write_atomic;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ALIGNER: &str = "statistical aligner";
pub const TRANSLATION_PRODUCER: &str = "translation scorer";

/// Row-level aligner output: one aligned pair within one verse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentRecord {
    pub vref: String,
    pub source: String,
    pub target: String,
    pub alignment_count: f64,
    #[serde(rename = "co-occurrence_count", alias = "co_occurrence_count")]
    pub co_occurrence_count: f64,
    pub verse_score: f64,
}

/// Corpus-level ("best") aligner output, averaged over the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestAlignmentRecord {
    pub source: String,
    pub target: String,
    pub alignment_count: f64,
    #[serde(rename = "co-occurrence_count", alias = "co_occurrence_count")]
    pub co_occurrence_count: f64,
}

impl BestAlignmentRecord {
    /// Share of co-occurrences in which the pair was aligned.
    pub fn avg_aligned(&self) -> f64 {
        if self.co_occurrence_count > 0.0 {
            self.alignment_count / self.co_occurrence_count
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationRecord {
    pub source: String,
    pub target: String,
    pub translation_score: f64,
}

/// One fused row as written to the score table. Absent signals are
/// written as 0; an undefined total is left empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub vref: String,
    pub source: String,
    pub target: String,
    pub alignment_score: f64,
    pub translation_score: f64,
    pub avg_aligned: f64,
    pub jac_sim: f64,
    pub match_counts: f64,
    pub encoding_dist: f64,
    pub total_score: Option<f64>,
}

impl From<&ScoreRow> for ScoreRecord {
    fn from(row: &ScoreRow) -> Self {
        Self {
            vref: row.vref.clone(),
            source: row.source.clone(),
            target: row.target.clone(),
            alignment_score: row.alignment_score.or_zero(),
            translation_score: row.translation_score.or_zero(),
            avg_aligned: row.avg_aligned.or_zero(),
            jac_sim: row.jac_sim.or_zero(),
            match_counts: row.match_counts.or_zero(),
            encoding_dist: row.encoding_dist,
            total_score: row.total_score(),
        }
    }
}

/// Reads a producer table. An unreadable file, a missing column or an
/// empty table all violate the producer contract.
pub fn read_producer_table<T: DeserializeOwned>(path: &Path, producer: &'static str) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| AlignError::producer(producer, format!("{}: {}", path.display(), e)))?;
    let records = reader
        .deserialize()
        .collect::<std::result::Result<Vec<T>, csv::Error>>()
        .map_err(|e| AlignError::producer(producer, format!("{}: {}", path.display(), e)))?;
    if records.is_empty() {
        return Err(AlignError::producer(producer, format!("{} has no rows", path.display())));
    }
    tracing::debug!("Read {} rows of {} output from {}", records.len(), producer, path.display());
    Ok(records)
}

pub fn read_alignments(path: &Path) -> Result<Vec<AlignmentRecord>> {
    read_producer_table(path, ALIGNER)
}

pub fn read_best_alignments(path: &Path) -> Result<Vec<BestAlignmentRecord>> {
    read_producer_table(path, ALIGNER)
}

pub fn read_translations(path: &Path) -> Result<Vec<TranslationRecord>> {
    read_producer_table(path, TRANSLATION_PRODUCER)
}

/// Reads a top-source-score table previously written by [`write_csv`].
pub fn read_top_scores(path: &Path) -> Result<Vec<TopSourceScore>> {
    let mut reader = csv::Reader::from_path(path)?;
    let records = reader.deserialize().collect::<std::result::Result<Vec<_>, csv::Error>>()?;
    Ok(records)
}

pub fn read_verse_scores(path: &Path) -> Result<Vec<VerseScore>> {
    let mut reader = csv::Reader::from_path(path)?;
    let records = reader.deserialize().collect::<std::result::Result<Vec<_>, csv::Error>>()?;
    Ok(records)
}

/// Writes records with a header row, atomically.
pub fn write_csv<'a, T, I>(records: I, path: &Path) -> Result<()>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    write_atomic(path, |writer| {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for record in records {
            csv_writer.serialize(record)?;
        }
        csv_writer.flush().map_err(|e| AlignError::io(path, e))?;
        Ok(())
    })
}
