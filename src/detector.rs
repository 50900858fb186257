// src/detector.rs
//! Red-flagging source words that score poorly against the target but
//! well against baseline translations.

use crate::core::types::TopSourceScore;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Baseline mean must exceed the target score by this factor.
pub const RATIO: f64 = 5.0;
/// And must exceed this absolute score.
pub const MIN_REFERENCE_SCORE: f64 = 0.35;

/// Top-source scores of one baseline reference translation.
#[derive(Debug, Clone)]
pub struct Baseline {
    pub id: String,
    pub scores: Vec<TopSourceScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedWord {
    pub vref: String,
    pub source: String,
    /// Baseline id to the word it matched for this source word.
    pub target: BTreeMap<String, String>,
    pub score: f64,
    pub mean_reference_score: Option<f64>,
    pub min_reference_score: Option<f64>,
    pub flag: bool,
}

pub fn is_red_flag(mean_reference_score: f64, target_score: f64) -> bool {
    mean_reference_score > RATIO * target_score && mean_reference_score > MIN_REFERENCE_SCORE
}

fn clamped(score: Option<f64>) -> f64 {
    score.unwrap_or(0.0).max(0.0)
}

/// Checks every low-scoring source word of `target` against the baselines.
///
/// Baselines whose id equals `target_id` are skipped. A baseline without an
/// entry for the (verse, source word) counts as scoring 0 there. With no
/// baselines left, words are reported unflagged with no statistics.
pub fn detect(
    target: &[TopSourceScore],
    baselines: &[Baseline],
    target_id: Option<&str>,
    threshold: f64,
) -> Vec<FlaggedWord> {
    let references: Vec<(&str, FxHashMap<(&str, &str), &TopSourceScore>)> = baselines
        .iter()
        .filter(|b| Some(b.id.as_str()) != target_id)
        .map(|b| {
            let lookup = b
                .scores
                .iter()
                .map(|s| ((s.vref.as_str(), s.source.as_str()), s))
                .collect();
            (b.id.as_str(), lookup)
        })
        .collect();
    if references.is_empty() {
        tracing::info!("No baseline references; missing words cannot be flagged");
    }

    let flagged: Vec<FlaggedWord> = target
        .iter()
        .filter_map(|entry| {
            let score = clamped(entry.total_score);
            if score >= threshold {
                return None;
            }

            let mut matches = BTreeMap::new();
            let mut reference_scores = Vec::with_capacity(references.len());
            for (id, lookup) in &references {
                match lookup.get(&(entry.vref.as_str(), entry.source.as_str())) {
                    Some(found) => {
                        matches.insert(id.to_string(), found.target.clone());
                        reference_scores.push(clamped(found.total_score));
                    }
                    None => reference_scores.push(0.0),
                }
            }

            let (mean, min) = if reference_scores.is_empty() {
                (None, None)
            } else {
                let mean = reference_scores.iter().sum::<f64>() / reference_scores.len() as f64;
                let min = reference_scores.iter().copied().fold(f64::INFINITY, f64::min);
                (Some(mean), Some(min))
            };

            Some(FlaggedWord {
                vref: entry.vref.clone(),
                source: entry.source.clone(),
                target: matches,
                score,
                mean_reference_score: mean,
                min_reference_score: min,
                flag: mean.map(|m| is_red_flag(m, score)).unwrap_or(false),
            })
        })
        .collect();

    tracing::info!(
        "{} low-scoring words, {} red flags",
        flagged.len(),
        flagged.iter().filter(|f| f.flag).count()
    );
    flagged
}
