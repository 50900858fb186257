// src/lib.rs

pub mod cache;
pub mod config;
pub mod core;
pub mod detector;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod matching;
pub mod persistence;
pub mod tables;

pub use crate::config::EngineConfig;
pub use crate::core::engine::{AlignmentEngine, Assessment, AssessmentInputs};
pub use crate::error::{AlignError, Result};
