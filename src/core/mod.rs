//! Core substitution logic: units, canonicalization, knowledge, resolution, planning.

pub mod canonicalizer;
pub mod knowledge;
pub mod parser;
pub mod planner;
pub mod resolver;
pub mod selector;
pub mod types;
pub mod units;
