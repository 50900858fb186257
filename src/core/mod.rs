// src/core/mod.rs

pub mod condense;
pub mod corpus;
pub mod engine;
pub mod normalize;
pub mod types;
