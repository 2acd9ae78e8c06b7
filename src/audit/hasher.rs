//! BLAKE3 fingerprints.
//!
//! A plan's digest covers its canonical JSON form, which embeds the knowledge
//! base fingerprint, so the same recipe and diets against an edited knowledge
//! base produce a different digest.

use crate::core::types::SubstitutionPlan;
use serde::Serialize;

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Hash the compact JSON form of a value.
pub fn hash_serialized<T: Serialize>(value: &T) -> Result<String, String> {
    let json = serde_json::to_string(value).map_err(|e| format!("serialize error: {}", e))?;
    Ok(hash_string(&json))
}

/// Digest of a substitution plan.
pub fn plan_digest(plan: &SubstitutionPlan) -> Result<String, String> {
    hash_serialized(plan)
}

/// Compare a plan against an expected digest. The `blake3:` prefix is optional.
pub fn verify_plan_digest(plan: &SubstitutionPlan, expected: &str) -> Result<String, String> {
    let actual = plan_digest(plan)?;
    let expected = expected.trim();
    let matches = actual == expected || actual.strip_prefix("blake3:") == Some(expected);
    if matches {
        Ok(actual)
    } else {
        Err(format!(
            "plan digest mismatch: expected {}, got {}",
            expected, actual
        ))
    }
}
