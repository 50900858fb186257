// src/core/condense.rs
//! Folding verse-range continuation lines into the verse they extend.

use crate::core::normalize::tokenize;
use crate::core::types::{Row, CONTINUATION_MARKER};
use crate::error::{AlignError, Result};

fn is_continuation(text: &str) -> bool {
    text.trim() == CONTINUATION_MARKER
}

fn append_text(text: &mut String, words: &mut Vec<String>, extra: &str) {
    let extra = extra.trim();
    if extra.is_empty() {
        return;
    }
    let trimmed_len = text.trim_end().len();
    text.truncate(trimmed_len);
    if !text.trim().is_empty() {
        text.push(' ');
    } else {
        text.clear();
    }
    text.push_str(extra);
    *words = tokenize(text);
}

/// Condenses rows so every remaining row has text on both sides.
///
/// Rows blank on both sides are skipped. A `<range>` marker on one side
/// means that side's previous line already covers this verse, so the other
/// side's text is appended to the previous retained row and this row is
/// dropped. Rows still blank on either side are removed at the end.
/// Row positions in the result are the positions every index refers to.
pub fn condense(rows: Vec<Row>) -> Result<Vec<Row>> {
    let total = rows.len();
    let mut out: Vec<Row> = Vec::with_capacity(total);

    for (i, row) in rows.into_iter().enumerate() {
        let source_blank = row.source_text.trim().is_empty();
        let target_blank = row.target_text.trim().is_empty();
        if source_blank && target_blank {
            continue;
        }

        let source_cont = is_continuation(&row.source_text);
        let target_cont = is_continuation(&row.target_text);
        if !source_cont && !target_cont {
            out.push(row);
            continue;
        }

        let prev = out
            .last_mut()
            .ok_or(AlignError::OrphanContinuation { line: i + 1 })?;
        match (source_cont, target_cont) {
            (true, false) => append_text(&mut prev.target_text, &mut prev.target_words, &row.target_text),
            (false, true) => append_text(&mut prev.source_text, &mut prev.source_words, &row.source_text),
            _ => {}
        }
    }

    out.retain(|row| !row.is_blank());
    tracing::debug!("Condensed {} rows into {}", total, out.len());
    Ok(out)
}
