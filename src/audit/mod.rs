//! Audit: BLAKE3 fingerprints for knowledge bases and substitution plans.

pub mod hasher;
