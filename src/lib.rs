//! Larder: deterministic dietary substitution.
//!
//! Canonicalizes recipe ingredients, checks them against an ordered set of
//! active diets, and resolves every forbidden ingredient to one substitute
//! that satisfies all of them at once, with exactly scaled quantities.
//! Conflicts that cannot be resolved are reported, never hidden.

pub mod audit;
pub mod cli;
pub mod core;
pub mod logging;
