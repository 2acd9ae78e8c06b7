//! Ingredient name canonicalization.
//!
//! Pipeline for a raw name:
//! 1. split off comma tails and parenthesized text as qualifiers
//! 2. normalize (lowercase, punctuation to spaces, collapsed whitespace)
//! 3. exact alias lookup
//! 4. strip preparation words ("softened", "chopped", "fresh") and retry
//! 5. longest alias whose tokens all appear in the name (plurals folded)
//! 6. otherwise a synthetic, unlinked identifier
//!
//! Every registered ingredient's id and display name are aliases of itself,
//! so canonicalizing a display name again yields the same ingredient.

use super::types::{CanonicalIngredient, IngredientId};
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

static PARENTHETICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^)]*)\)").expect("parenthetical pattern is valid"));

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s]+").expect("punctuation pattern is valid"));

/// Preparation and state words that never change an ingredient's identity.
const QUALIFIER_WORDS: &[&str] = &[
    "beaten",
    "chilled",
    "chopped",
    "coarsely",
    "cold",
    "crushed",
    "cubed",
    "diced",
    "divided",
    "drained",
    "dried",
    "finely",
    "fresh",
    "freshly",
    "frozen",
    "grated",
    "large",
    "melted",
    "medium",
    "minced",
    "organic",
    "packed",
    "peeled",
    "rinsed",
    "roughly",
    "shredded",
    "sifted",
    "sliced",
    "small",
    "softened",
    "thawed",
    "thinly",
    "warm",
    "canned",
];

/// How a raw name was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    QualifierStripped,
    Fuzzy,
    Synthetic,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::QualifierStripped => write!(f, "qualifier-stripped"),
            Self::Fuzzy => write!(f, "fuzzy"),
            Self::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// Result of canonicalizing one raw name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canonicalized {
    pub ingredient: CanonicalIngredient,
    /// Preparation words and comma/parenthetical text, joined with ", "
    pub qualifier: Option<String>,
    pub kind: MatchKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("alias '{alias}' maps to both '{existing}' and '{duplicate}'")]
pub struct AliasConflict {
    pub alias: String,
    pub existing: IngredientId,
    pub duplicate: IngredientId,
}

#[derive(Debug, Clone)]
struct FuzzyEntry {
    alias: String,
    tokens: Vec<String>,
    id: IngredientId,
}

/// Alias index over the canonical ingredient table. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Canonicalizer {
    entries: FxHashMap<IngredientId, CanonicalIngredient>,
    aliases: FxHashMap<String, IngredientId>,
    /// Sorted longest alias first, then lexically
    fuzzy: Vec<FuzzyEntry>,
}

impl Canonicalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an ingredient under its id, display name, and aliases.
    pub fn register(&mut self, ingredient: CanonicalIngredient) -> Result<(), AliasConflict> {
        let keys = alias_keys(&ingredient);
        for key in &keys {
            if let Some(existing) = self.aliases.get(key) {
                if *existing != ingredient.id {
                    return Err(AliasConflict {
                        alias: key.clone(),
                        existing: existing.clone(),
                        duplicate: ingredient.id.clone(),
                    });
                }
            }
        }
        for key in keys {
            if self.aliases.contains_key(&key) {
                continue;
            }
            let entry = FuzzyEntry {
                tokens: key.split(' ').map(fold_plural).collect(),
                alias: key.clone(),
                id: ingredient.id.clone(),
            };
            let at = self.fuzzy.partition_point(|e| {
                (std::cmp::Reverse(e.alias.len()), &e.alias)
                    < (std::cmp::Reverse(entry.alias.len()), &entry.alias)
            });
            self.fuzzy.insert(at, entry);
            self.aliases.insert(key, ingredient.id.clone());
        }
        self.entries.insert(ingredient.id.clone(), ingredient);
        Ok(())
    }

    pub fn get(&self, id: &IngredientId) -> Option<&CanonicalIngredient> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonicalize a raw ingredient name. Total: always returns an ingredient.
    pub fn canonicalize(&self, raw: &str) -> Canonicalized {
        let (head, tail) = split_qualifiers(raw);
        let normalized = normalize(&head);

        if let Some(found) = self.lookup(&normalized) {
            return matched(found.clone(), Vec::new(), tail, MatchKind::Exact);
        }

        let (stripped, words) = strip_qualifier_words(&normalized);
        if stripped != normalized {
            if let Some(found) = self.lookup(&stripped) {
                return matched(found.clone(), words, tail, MatchKind::QualifierStripped);
            }
        }

        if let Some(found) = self.fuzzy_lookup(&normalized) {
            return matched(found.clone(), words, tail, MatchKind::Fuzzy);
        }

        let id_text = if stripped.is_empty() {
            normalized
        } else {
            stripped
        };
        matched(
            CanonicalIngredient::synthetic(&id_text),
            words,
            tail,
            MatchKind::Synthetic,
        )
    }

    fn lookup(&self, normalized: &str) -> Option<&CanonicalIngredient> {
        if normalized.is_empty() {
            return None;
        }
        self.aliases
            .get(normalized)
            .and_then(|id| self.entries.get(id))
    }

    fn fuzzy_lookup(&self, normalized: &str) -> Option<&CanonicalIngredient> {
        let tokens: FxHashSet<String> = normalized.split(' ').map(fold_plural).collect();
        self.fuzzy
            .iter()
            .find(|e| e.tokens.iter().all(|t| tokens.contains(t)))
            .and_then(|e| self.entries.get(&e.id))
    }
}

fn matched(
    ingredient: CanonicalIngredient,
    mut words: Vec<String>,
    tail: Vec<String>,
    kind: MatchKind,
) -> Canonicalized {
    words.extend(tail);
    let qualifier = if words.is_empty() {
        None
    } else {
        Some(words.join(", "))
    };
    Canonicalized {
        ingredient,
        qualifier,
        kind,
    }
}

fn alias_keys(ingredient: &CanonicalIngredient) -> Vec<String> {
    let mut keys = Vec::with_capacity(ingredient.aliases.len() + 2);
    for text in std::iter::once(ingredient.id.as_str())
        .chain(std::iter::once(ingredient.name.as_str()))
        .chain(ingredient.aliases.iter().map(String::as_str))
    {
        let key = normalize(text);
        if !key.is_empty() && !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

/// Lowercase, turn punctuation into spaces, collapse whitespace.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let spaced = PUNCTUATION.replace_all(&lowered, " ");
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split `"butter (unsalted), softened"` into `"butter"` and
/// `["unsalted", "softened"]`.
fn split_qualifiers(raw: &str) -> (String, Vec<String>) {
    let mut tail = Vec::new();
    for cap in PARENTHETICAL.captures_iter(raw) {
        let text = cap[1].trim();
        if !text.is_empty() {
            tail.push(text.to_string());
        }
    }
    let without_parens = PARENTHETICAL.replace_all(raw, " ");
    let mut parts = without_parens.split(',');
    let head = parts.next().unwrap_or_default().to_string();
    for part in parts {
        let text = part.trim();
        if !text.is_empty() {
            tail.push(text.to_string());
        }
    }
    (head, tail)
}

fn strip_qualifier_words(normalized: &str) -> (String, Vec<String>) {
    let mut kept = Vec::new();
    let mut removed = Vec::new();
    for token in normalized.split(' ').filter(|t| !t.is_empty()) {
        if QUALIFIER_WORDS.contains(&token) {
            removed.push(token.to_string());
        } else {
            kept.push(token);
        }
    }
    (kept.join(" "), removed)
}

/// Fold simple English plurals so "onions" meets "onion".
fn fold_plural(token: &str) -> String {
    if token.len() > 4 {
        if let Some(stem) = token.strip_suffix("ies") {
            return format!("{}y", stem);
        }
        if let Some(stem) = token.strip_suffix("oes") {
            return format!("{}o", stem);
        }
    }
    if token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        return token[..token.len() - 1].to_string();
    }
    token.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ingredient(id: &str, name: &str, aliases: &[&str]) -> CanonicalIngredient {
        CanonicalIngredient {
            id: IngredientId::new(id),
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            linked: true,
        }
    }

    fn table() -> Canonicalizer {
        let mut c = Canonicalizer::new();
        c.register(ingredient(
            "all-purpose-flour",
            "all-purpose flour",
            &["flour", "ap flour", "plain flour", "white flour"],
        ))
        .unwrap();
        c.register(ingredient("almond-flour", "almond flour", &["ground almonds"]))
            .unwrap();
        c.register(ingredient("butter", "butter", &["unsalted butter", "salted butter"]))
            .unwrap();
        c.register(ingredient("eggs", "eggs", &["egg", "large eggs"]))
            .unwrap();
        c.register(ingredient("onion", "onion", &["yellow onion"]))
            .unwrap();
        c.register(ingredient("olive-oil", "olive oil", &["extra virgin olive oil", "evoo"]))
            .unwrap();
        c
    }

    #[test]
    fn test_canon_normalize() {
        assert_eq!(normalize("  All-Purpose   FLOUR! "), "all purpose flour");
        assert_eq!(normalize("Jalapeño"), "jalapeño");
        assert_eq!(normalize("..."), "");
    }

    #[test]
    fn test_canon_exact_alias() {
        let c = table();
        let out = c.canonicalize("AP Flour");
        assert_eq!(out.ingredient.id.as_str(), "all-purpose-flour");
        assert_eq!(out.kind, MatchKind::Exact);
        assert!(out.qualifier.is_none());
        assert!(out.ingredient.linked);
    }

    #[test]
    fn test_canon_id_and_name_are_aliases() {
        let c = table();
        assert_eq!(
            c.canonicalize("all-purpose-flour").ingredient.id.as_str(),
            "all-purpose-flour"
        );
        assert_eq!(
            c.canonicalize("All-purpose flour").ingredient.id.as_str(),
            "all-purpose-flour"
        );
    }

    #[test]
    fn test_canon_qualifier_stripped() {
        let c = table();
        let out = c.canonicalize("softened unsalted butter");
        assert_eq!(out.ingredient.id.as_str(), "butter");
        assert_eq!(out.kind, MatchKind::QualifierStripped);
        assert_eq!(out.qualifier.as_deref(), Some("softened"));
    }

    #[test]
    fn test_canon_comma_and_parenthetical() {
        let c = table();
        let out = c.canonicalize("butter (cold), cubed");
        assert_eq!(out.ingredient.id.as_str(), "butter");
        assert_eq!(out.kind, MatchKind::Exact);
        assert_eq!(out.qualifier.as_deref(), Some("cold, cubed"));
    }

    #[test]
    fn test_canon_fuzzy_plural() {
        let c = table();
        let out = c.canonicalize("finely chopped yellow onions");
        assert_eq!(out.ingredient.id.as_str(), "onion");
        assert_eq!(out.kind, MatchKind::Fuzzy);
        assert_eq!(out.qualifier.as_deref(), Some("finely, chopped"));
    }

    #[test]
    fn test_canon_fuzzy_prefers_longest_alias() {
        let c = table();
        let out = c.canonicalize("organic almond flour blend");
        assert_eq!(out.ingredient.id.as_str(), "almond-flour");
    }

    #[test]
    fn test_canon_synthetic() {
        let c = table();
        let out = c.canonicalize("Fresh Dragon-Fruit");
        assert_eq!(out.kind, MatchKind::Synthetic);
        assert!(!out.ingredient.linked);
        assert_eq!(out.ingredient.id.as_str(), "dragon fruit");
        assert_eq!(out.qualifier.as_deref(), Some("fresh"));
    }

    #[test]
    fn test_canon_synthetic_only_qualifiers() {
        let c = table();
        let out = c.canonicalize("fresh");
        assert_eq!(out.ingredient.id.as_str(), "fresh");
        assert_eq!(c.canonicalize(&out.ingredient.name).ingredient, out.ingredient);
    }

    #[test]
    fn test_canon_alias_conflict() {
        let mut c = table();
        let err = c
            .register(ingredient("cake-flour", "cake flour", &["white flour"]))
            .unwrap_err();
        assert_eq!(err.alias, "white flour");
        assert_eq!(err.existing.as_str(), "all-purpose-flour");
        assert_eq!(err.duplicate.as_str(), "cake-flour");
    }

    #[test]
    fn test_canon_alias_repeated_on_same_ingredient() {
        let mut c = Canonicalizer::new();
        c.register(ingredient("milk", "milk", &["Milk", "whole milk"]))
            .unwrap();
        assert_eq!(c.len(), 1);
        assert_eq!(c.canonicalize("whole milk").ingredient.id.as_str(), "milk");
    }

    #[test]
    fn test_canon_fold_plural() {
        assert_eq!(fold_plural("onions"), "onion");
        assert_eq!(fold_plural("berries"), "berry");
        assert_eq!(fold_plural("tomatoes"), "tomato");
        assert_eq!(fold_plural("glass"), "glass");
        assert_eq!(fold_plural("oats"), "oat");
        assert_eq!(fold_plural("gas"), "gas");
    }

    const VOCAB: &[&str] = &[
        "flour", "ap", "almond", "butter", "unsalted", "eggs", "egg", "large", "onion",
        "onions", "yellow", "olive", "oil", "evoo", "chopped", "fresh", "softened", "dragon",
        "fruit", "Plain", "(cold)", "melted,", "-", "ground", "almonds",
    ];

    proptest! {
        #[test]
        fn prop_canon_idempotent(words in prop::collection::vec(prop::sample::select(VOCAB), 0..5)) {
            let c = table();
            let raw = words.join(" ");
            let first = c.canonicalize(&raw);
            let again = c.canonicalize(&first.ingredient.name);
            prop_assert_eq!(again.ingredient, first.ingredient);
        }

        #[test]
        fn prop_canon_normalize_is_fixed_point(text in "[A-Za-z ,.()-]{0,30}") {
            let once = normalize(&text);
            prop_assert_eq!(normalize(&once), once.clone());
        }
    }
}
