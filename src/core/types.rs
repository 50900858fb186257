// src/core/types.rs
use serde::{Deserialize, Serialize};

/// Position of a row in the condensed corpus.
pub type RowId = u32;

/// Marks a line whose content belongs to the previous verse.
pub const CONTINUATION_MARKER: &str = "<range>";

/// One aligned verse pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub vref: String,
    pub source_text: String,
    pub target_text: String,
    /// Normalized tokens, in text order.
    pub source_words: Vec<String>,
    pub target_words: Vec<String>,
}

impl Row {
    pub fn is_blank(&self) -> bool {
        self.source_text.trim().is_empty() || self.target_text.trim().is_empty()
    }
}

/// A producer-derived scoring signal. `Absent` means the producer said
/// nothing about the pair, which is not the same as scoring it zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Signal {
    Present(f64),
    #[default]
    Absent,
}

impl Signal {
    pub fn is_present(&self) -> bool {
        matches!(self, Signal::Present(_))
    }

    pub fn or_zero(&self) -> f64 {
        match self {
            Signal::Present(v) => *v,
            Signal::Absent => 0.0,
        }
    }
}

impl From<Option<f64>> for Signal {
    fn from(value: Option<f64>) -> Self {
        value.map(Signal::Present).unwrap_or(Signal::Absent)
    }
}

/// Floor applied to `1 - encoding_dist` before `log1p`.
pub const ENCODING_FLOOR: f64 = -0.99;

/// One source-target word pairing within one verse.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRow {
    pub vref: String,
    pub source: String,
    pub target: String,
    pub alignment_score: Signal,
    pub translation_score: Signal,
    pub avg_aligned: Signal,
    pub jac_sim: Signal,
    pub match_counts: Signal,
    pub encoding_dist: f64,
}

impl ScoreRow {
    /// Whether any producer said anything about this pairing.
    pub fn has_signal(&self) -> bool {
        [
            self.alignment_score,
            self.translation_score,
            self.avg_aligned,
            self.jac_sim,
            self.match_counts,
        ]
        .iter()
        .any(Signal::is_present)
    }

    /// Fused score; `None` when the row carries no producer signal.
    pub fn total_score(&self) -> Option<f64> {
        if !self.has_signal() {
            return None;
        }
        Some(fuse_signals(
            self.avg_aligned.or_zero(),
            self.translation_score.or_zero(),
            self.alignment_score.or_zero(),
            self.jac_sim.or_zero(),
            self.encoding_dist,
        ))
    }
}

/// Mean of the four producer signals and the log-damped embedding
/// similarity.
pub fn fuse_signals(
    avg_aligned: f64,
    translation_score: f64,
    alignment_score: f64,
    jac_sim: f64,
    encoding_dist: f64,
) -> f64 {
    let encoding = (1.0 - encoding_dist).max(ENCODING_FLOOR).ln_1p();
    (avg_aligned + translation_score + alignment_score + jac_sim + encoding) / 5.0
}

/// Best-scoring target for one (verse, source word).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopSourceScore {
    pub vref: String,
    pub source: String,
    pub target: String,
    pub total_score: Option<f64>,
}

/// Aggregate score for one verse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerseScore {
    pub vref: String,
    pub total_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(alignment: Signal, encoding_dist: f64) -> ScoreRow {
        ScoreRow {
            vref: "GEN 1:1".into(),
            source: "god".into(),
            target: "dieu".into(),
            alignment_score: alignment,
            translation_score: Signal::Absent,
            avg_aligned: Signal::Absent,
            jac_sim: Signal::Absent,
            match_counts: Signal::Absent,
            encoding_dist,
        }
    }

    #[test]
    fn total_score_is_undefined_without_signal() {
        assert_eq!(row(Signal::Absent, 0.0).total_score(), None);
    }

    #[test]
    fn total_score_averages_five_terms() {
        let score = row(Signal::Present(1.0), 1.0).total_score().unwrap();
        // encoding term is log1p(0) = 0
        assert!((score - 0.2).abs() < 1e-12);
    }

    #[test]
    fn far_embeddings_hit_the_floor() {
        let score = fuse_signals(0.0, 0.0, 0.0, 0.0, 2.0);
        assert!((score - (0.01f64).ln() / 5.0).abs() < 1e-12);
    }
}
