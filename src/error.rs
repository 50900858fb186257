// src/error.rs
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The pipeline stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Load,
    Condense,
    Embed,
    Fuse,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Config => "config",
            Stage::Load => "load",
            Stage::Condense => "condense",
            Stage::Embed => "embed",
            Stage::Fuse => "fuse",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// Which half of a verse pair a word or file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Source,
    Target,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => f.write_str("source"),
            Side::Target => f.write_str("target"),
        }
    }
}

#[derive(Error, Debug)]
pub enum AlignError {
    #[error("source has {source_lines} lines but target has {target_lines}")]
    LineCountMismatch { source_lines: usize, target_lines: usize },

    #[error("reference index has {found} entries, expected {expected}")]
    CanonicalLength { expected: usize, found: usize },

    #[error("reference file has {vrefs} entries but the corpus has {lines} lines")]
    VrefCount { vrefs: usize, lines: usize },

    #[error("continuation marker on line {line} has no preceding verse")]
    OrphanContinuation { line: usize },

    #[error(
        "{side} word '{word}' is missing from the index cache '{corpus}'; rerun with refresh enabled"
    )]
    StaleCache { side: Side, word: String, corpus: String },

    #[error("row index {index} is outside the weight matrix ({columns} columns)")]
    WeightShape { index: usize, columns: usize },

    #[error("weight matrix has {columns} columns but the condensed corpus has {rows} rows")]
    WeightColumns { columns: usize, rows: usize },

    #[error("malformed weight matrix {path}: {reason}")]
    Weights { path: PathBuf, reason: String },

    #[error("{producer} output is unusable: {reason}")]
    Producer { producer: &'static str, reason: String },

    #[error(
        "cache entry {path} is held by another writer; if no other run is active, \
         delete {lock} or rerun with refresh enabled"
    )]
    CacheBusy { path: PathBuf, lock: PathBuf },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("binary cache error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AlignError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AlignError::Io { path: path.into(), source }
    }

    pub fn producer(producer: &'static str, reason: impl Into<String>) -> Self {
        AlignError::Producer { producer, reason: reason.into() }
    }

    /// The stage whose invariant failed.
    pub fn stage(&self) -> Stage {
        match self {
            AlignError::LineCountMismatch { .. }
            | AlignError::CanonicalLength { .. }
            | AlignError::VrefCount { .. } => Stage::Load,
            AlignError::OrphanContinuation { .. } => Stage::Condense,
            AlignError::StaleCache { .. }
            | AlignError::WeightShape { .. }
            | AlignError::WeightColumns { .. } => Stage::Embed,
            AlignError::Weights { .. } => Stage::Embed,
            AlignError::Producer { .. } => Stage::Fuse,
            AlignError::Config(_) => Stage::Config,
            AlignError::CacheBusy { .. }
            | AlignError::Io { .. }
            | AlignError::Csv(_)
            | AlignError::Bincode(_)
            | AlignError::Json(_) => Stage::Persist,
        }
    }
}

pub type Result<T> = std::result::Result<T, AlignError>;
