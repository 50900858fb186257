// src/core/corpus.rs
//! Reading line-aligned source/target files into verse rows.

use crate::config::CANONICAL_VREF_COUNT;
use crate::core::normalize::tokenize;
use crate::core::types::Row;
use crate::error::{AlignError, Result};
use std::fs;
use std::path::Path;

/// Reads a text file into lines, without line terminators.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| AlignError::io(path, e))?;
    Ok(content.lines().map(str::to_string).collect())
}

/// Reads the reference index (one vref per line).
pub fn read_vrefs(path: &Path) -> Result<Vec<String>> {
    Ok(read_lines(path)?.into_iter().map(|l| l.trim().to_string()).collect())
}

/// Builds uncondensed rows from line lists.
///
/// Without a target, every row gets an empty target side. Scripture
/// corpora must come with the full canonical reference index; other
/// corpora fall back to 1-based line numbers when `vrefs` is `None`.
pub fn build_rows(
    source_lines: Vec<String>,
    target_lines: Option<Vec<String>>,
    vrefs: Option<Vec<String>>,
    is_bible: bool,
) -> Result<Vec<Row>> {
    if let Some(target) = &target_lines {
        if target.len() != source_lines.len() {
            return Err(AlignError::LineCountMismatch {
                source_lines: source_lines.len(),
                target_lines: target.len(),
            });
        }
    }

    if is_bible {
        let found = vrefs.as_ref().map(Vec::len).unwrap_or(0);
        if found != CANONICAL_VREF_COUNT {
            return Err(AlignError::CanonicalLength { expected: CANONICAL_VREF_COUNT, found });
        }
        if source_lines.len() != CANONICAL_VREF_COUNT {
            return Err(AlignError::CanonicalLength {
                expected: CANONICAL_VREF_COUNT,
                found: source_lines.len(),
            });
        }
    } else if let Some(refs) = &vrefs {
        if refs.len() != source_lines.len() {
            return Err(AlignError::VrefCount { vrefs: refs.len(), lines: source_lines.len() });
        }
    }

    let mut vrefs = vrefs.map(Vec::into_iter);
    let mut targets = target_lines.map(Vec::into_iter);
    let rows = source_lines
        .into_iter()
        .enumerate()
        .map(|(i, source_text)| {
            let vref = vrefs
                .as_mut()
                .and_then(|refs| refs.next())
                .unwrap_or_else(|| (i + 1).to_string());
            let target_text = targets.as_mut().and_then(|t| t.next()).unwrap_or_default();
            Row {
                vref,
                source_words: tokenize(&source_text),
                target_words: tokenize(&target_text),
                source_text,
                target_text,
            }
        })
        .collect();
    Ok(rows)
}

/// Loads a source file and optional target file into uncondensed rows.
pub fn load(
    source: &Path,
    target: Option<&Path>,
    vref_path: Option<&Path>,
    is_bible: bool,
) -> Result<Vec<Row>> {
    let source_lines = read_lines(source)?;
    let target_lines = target.map(read_lines).transpose()?;
    let vrefs = vref_path.map(read_vrefs).transpose()?;
    let rows = build_rows(source_lines, target_lines, vrefs, is_bible)?;
    tracing::info!("Loaded {} rows from {}", rows.len(), source.display());
    Ok(rows)
}
