// src/embedding.rs
//! Word embeddings from occurrence vectors and a pretrained projection.

use crate::cache::WordIndex;
use crate::core::normalize::normalize;
use crate::core::types::RowId;
use crate::error::{AlignError, Result, Side};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::path::Path;

/// Pretrained projection of shape `[embedding_dim, corpus_row_count]`.
#[derive(Debug, Clone)]
pub struct WeightMatrix {
    weights: Array2<f64>,
}

impl WeightMatrix {
    pub fn new(weights: Array2<f64>) -> Self {
        Self { weights }
    }

    /// Reads a text matrix: one matrix row per line, values separated by
    /// whitespace or commas. Blank lines are ignored.
    pub fn from_text_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| AlignError::io(path, e))?;
        let malformed = |reason: String| AlignError::Weights { path: path.to_path_buf(), reason };

        let mut values = Vec::new();
        let mut columns = None;
        let mut rows = 0;
        for (line_no, line) in content.lines().enumerate() {
            let before = values.len();
            for field in line.split(|c: char| c.is_whitespace() || c == ',').filter(|f| !f.is_empty()) {
                let value: f64 = field
                    .parse()
                    .map_err(|_| malformed(format!("line {}: '{}' is not a number", line_no + 1, field)))?;
                values.push(value);
            }
            let width = values.len() - before;
            if width == 0 {
                continue;
            }
            match columns {
                None => columns = Some(width),
                Some(expected) if expected != width => {
                    return Err(malformed(format!(
                        "line {} has {} values, expected {}",
                        line_no + 1,
                        width,
                        expected
                    )));
                }
                Some(_) => {}
            }
            rows += 1;
        }

        let columns = columns.ok_or_else(|| malformed("no values".to_string()))?;
        let weights = Array2::from_shape_vec((rows, columns), values).map_err(|e| malformed(e.to_string()))?;
        tracing::info!("Loaded {}x{} weight matrix from {}", rows, columns, path.display());
        Ok(Self { weights })
    }

    pub fn dim(&self) -> usize {
        self.weights.nrows()
    }

    pub fn columns(&self) -> usize {
        self.weights.ncols()
    }

    /// `weights · one_hot(rows)`, computed as a sum of the selected columns.
    pub fn project(&self, rows: &[RowId]) -> Result<Array1<f64>> {
        let mut embedding = Array1::zeros(self.dim());
        for &row in rows {
            let index = row as usize;
            if index >= self.columns() {
                return Err(AlignError::WeightShape { index, columns: self.columns() });
            }
            embedding += &self.weights.column(index);
        }
        Ok(embedding)
    }

    /// The dense product over an explicit indicator vector.
    #[cfg(test)]
    fn project_dense(&self, one_hot: &Array1<f64>) -> Array1<f64> {
        self.weights.dot(one_hot)
    }
}

/// `v / ||v||`; the zero vector stays zero.
pub fn unit(v: Array1<f64>) -> Array1<f64> {
    let norm = v.dot(&v).sqrt();
    if norm == 0.0 {
        v
    } else {
        v / norm
    }
}

/// Euclidean distance between two vectors.
pub fn distance(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    let diff = a - b;
    diff.dot(&diff).sqrt()
}

/// A normalized word with its occurrence rows and, once encoded, its
/// embedding.
#[derive(Debug, Clone)]
pub struct Word {
    pub normalized: String,
    pub index_list: Vec<RowId>,
    pub embedding: Option<Array1<f64>>,
    pub norm_embedding: Option<Array1<f64>>,
}

impl Word {
    pub fn new(surface: &str, index_list: Vec<RowId>) -> Self {
        Self {
            normalized: normalize(surface),
            index_list,
            embedding: None,
            norm_embedding: None,
        }
    }

    /// Indicator vector of length `len`: 1 at each occurrence row.
    #[cfg(test)]
    fn one_hot(&self, len: usize) -> Array1<f64> {
        let mut v = Array1::zeros(len);
        for &row in &self.index_list {
            if let Some(slot) = v.get_mut(row as usize) {
                *slot = 1.0;
            }
        }
        v
    }

    pub fn encode(&mut self, weights: &WeightMatrix) -> Result<()> {
        let embedding = weights.project(&self.index_list)?;
        self.norm_embedding = Some(unit(embedding.clone()));
        self.embedding = Some(embedding);
        Ok(())
    }
}

/// Unit embeddings for every word the score table references.
#[derive(Debug, Default)]
pub struct EmbeddingLookup {
    source: FxHashMap<String, Array1<f64>>,
    target: FxHashMap<String, Array1<f64>>,
}

impl EmbeddingLookup {
    /// Encodes the given words in parallel. The matrix must have one column
    /// per condensed row; a word missing from its index is a stale-cache
    /// error.
    pub fn build<'a>(
        weights: &WeightMatrix,
        source_index: &WordIndex,
        target_index: &WordIndex,
        source_words: impl IntoIterator<Item = &'a str>,
        target_words: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        for rows in [source_index.row_count(), target_index.row_count()] {
            if weights.columns() != rows {
                return Err(AlignError::WeightColumns { columns: weights.columns(), rows });
            }
        }
        let source = encode_side(weights, source_index, source_words, Side::Source)?;
        let target = encode_side(weights, target_index, target_words, Side::Target)?;
        tracing::info!("Encoded {} source and {} target words", source.len(), target.len());
        Ok(Self { source, target })
    }

    pub fn get(&self, word: &str, side: Side) -> Option<&Array1<f64>> {
        match side {
            Side::Source => self.source.get(word),
            Side::Target => self.target.get(word),
        }
    }

    /// Distance between the unit embeddings of a source and a target word.
    pub fn distance(&self, source: &str, target: &str) -> Result<f64> {
        let a = self.require(source, Side::Source)?;
        let b = self.require(target, Side::Target)?;
        Ok(distance(a, b))
    }

    fn require(&self, word: &str, side: Side) -> Result<&Array1<f64>> {
        self.get(word, side).ok_or_else(|| AlignError::StaleCache {
            side,
            word: word.to_string(),
            corpus: "embeddings".to_string(),
        })
    }
}

fn encode_side<'a>(
    weights: &WeightMatrix,
    index: &WordIndex,
    words: impl IntoIterator<Item = &'a str>,
    side: Side,
) -> Result<FxHashMap<String, Array1<f64>>> {
    let mut unique: Vec<&str> = words.into_iter().collect();
    unique.sort_unstable();
    unique.dedup();

    unique
        .par_iter()
        .map(|&w| -> Result<(String, Array1<f64>)> {
            let mut word = Word::new(w, index.require(w, side)?.to_vec());
            word.encode(weights)?;
            let norm = word.norm_embedding.take().unwrap_or_else(|| Array1::zeros(weights.dim()));
            Ok((w.to_string(), norm))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::corpus::build_rows;
    use ndarray::{array, Array2};

    fn weights() -> WeightMatrix {
        WeightMatrix::new(array![[1.0, 0.0, 2.0, 0.0], [0.0, 3.0, 0.0, 4.0]])
    }

    #[test]
    fn sparse_projection_matches_dense_product() {
        let w = weights();
        let word = Word::new("Cat,", vec![0, 3]);
        assert_eq!(word.normalized, "cat");
        let dense = w.project_dense(&word.one_hot(w.columns()));
        assert_eq!(w.project(&word.index_list).unwrap(), dense);
        assert_eq!(dense, array![1.0, 4.0]);
    }

    #[test]
    fn encode_fills_unit_embedding() {
        let mut word = Word::new("dog", vec![1, 3]);
        word.encode(&weights()).unwrap();
        assert_eq!(word.embedding.as_ref().unwrap(), &array![0.0, 7.0]);
        assert_eq!(word.norm_embedding.as_ref().unwrap(), &array![0.0, 1.0]);
    }

    #[test]
    fn zero_embedding_stays_finite() {
        let v = unit(Array1::zeros(3));
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn out_of_range_row_is_a_shape_error() {
        let err = weights().project(&[4]).unwrap_err();
        assert!(matches!(err, AlignError::WeightShape { index: 4, columns: 4 }));
    }

    #[test]
    fn orthogonal_unit_vectors_are_sqrt2_apart() {
        let d = distance(&array![1.0, 0.0], &array![0.0, 1.0]);
        assert!((d - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn reads_text_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.txt");
        std::fs::write(&path, "1 0 2\n\n0,3,0\n").unwrap();
        let w = WeightMatrix::from_text_file(&path).unwrap();
        assert_eq!((w.dim(), w.columns()), (2, 3));

        std::fs::write(&path, "1 0 2\n0 3\n").unwrap();
        assert!(matches!(WeightMatrix::from_text_file(&path), Err(AlignError::Weights { .. })));
    }

    #[test]
    fn matrix_wider_than_the_corpus_is_rejected() {
        let rows = build_rows(
            vec!["cat".into(), "dog".into(), "cat".into()],
            Some(vec!["chat".into(), "chien".into(), "chat".into()]),
            None,
            false,
        )
        .unwrap();
        let source = WordIndex::build(&rows, Side::Source);
        let target = WordIndex::build(&rows, Side::Target);
        let wide = WeightMatrix::new(Array2::eye(5));
        let err = EmbeddingLookup::build(&wide, &source, &target, ["cat"], ["chat"]).unwrap_err();
        assert!(matches!(err, AlignError::WeightColumns { columns: 5, rows: 3 }));

        let exact = WeightMatrix::new(Array2::eye(3));
        assert!(EmbeddingLookup::build(&exact, &source, &target, ["cat"], ["chat"]).is_ok());
    }

    #[test]
    fn lookup_rejects_words_outside_the_index() {
        let rows = build_rows(
            vec!["cat".into(), "dog".into(), "cat".into(), "dog".into()],
            Some(vec!["chat".into(), "chien".into(), "chat".into(), "chien".into()]),
            None,
            false,
        )
        .unwrap();
        let source = WordIndex::build(&rows, Side::Source);
        let target = WordIndex::build(&rows, Side::Target);

        let lookup = EmbeddingLookup::build(&weights(), &source, &target, ["cat"], ["chat", "chien"]).unwrap();
        assert!(lookup.distance("cat", "chat").unwrap() < 1e-12);
        assert!(lookup.distance("cat", "chien").unwrap() > 1.0);

        let err = EmbeddingLookup::build(&weights(), &source, &target, ["bird"], ["chat"]).unwrap_err();
        assert!(matches!(err, AlignError::StaleCache { side: Side::Source, .. }));
    }
}
