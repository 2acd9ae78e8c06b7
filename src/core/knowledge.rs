//! Restriction knowledge base.
//!
//! Built once from a validated [`KnowledgeConfig`] and read-only afterwards,
//! so one instance can be shared across threads. Category rules are expanded
//! into explicit forbidden sets at load time. Each diet's options for a
//! source are ranked by priority, then confidence (descending), then target id.

use super::canonicalizer::{Canonicalized, Canonicalizer};
use super::parser::{self, KnowledgeBaseIntegrityError, KnowledgeLoadError};
use super::types::*;
use super::units::{self, Amount};
use crate::audit::hasher;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::path::Path;

static BUILTIN_KNOWLEDGE: &str = include_str!("data/knowledge.yaml");

/// An entry of the canonical ingredient table.
#[derive(Debug, Clone)]
pub struct IngredientRecord {
    pub ingredient: CanonicalIngredient,
    pub categories: Vec<String>,
    /// Grams per millilitre
    pub density: Option<Amount>,
}

/// One diet's forbidden set and ranked options.
#[derive(Debug, Clone)]
pub struct DietRule {
    pub id: DietId,
    pub name: String,
    pub description: Option<String>,
    pub forbidden_categories: Vec<String>,
    forbidden: FxHashSet<IngredientId>,
    options: FxHashMap<IngredientId, Vec<SubstitutionOption>>,
}

impl DietRule {
    pub fn forbids(&self, ingredient: &IngredientId) -> bool {
        self.forbidden.contains(ingredient)
    }

    /// Ranked options for a source; empty when none are authored.
    pub fn options_for(&self, ingredient: &IngredientId) -> &[SubstitutionOption] {
        match self.options.get(ingredient) {
            Some(list) => list,
            None => &[],
        }
    }

    pub fn forbidden_count(&self) -> usize {
        self.forbidden.len()
    }

    pub fn option_count(&self) -> usize {
        self.options.values().map(Vec::len).sum()
    }
}

/// Option ranking within one diet's list.
pub(crate) fn rank_options(a: &SubstitutionOption, b: &SubstitutionOption) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then(b.confidence.total_cmp(&a.confidence))
        .then_with(|| a.target.cmp(&b.target))
}

/// Validated, indexed restriction knowledge.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    name: String,
    description: Option<String>,
    policy: ResolutionPolicy,
    canonicalizer: Canonicalizer,
    ingredients: IndexMap<IngredientId, IngredientRecord>,
    diets: IndexMap<DietId, DietRule>,
    fingerprint: String,
}

impl KnowledgeBase {
    /// The knowledge base shipped with the crate.
    pub fn builtin() -> Result<Self, KnowledgeLoadError> {
        Self::from_yaml(BUILTIN_KNOWLEDGE)
    }

    /// YAML source of the built-in knowledge base.
    pub fn builtin_source() -> &'static str {
        BUILTIN_KNOWLEDGE
    }

    /// Load and validate a knowledge-base file.
    pub fn load(path: &Path) -> Result<Self, KnowledgeLoadError> {
        let config = parser::parse_knowledge_file(path)?;
        Ok(Self::from_config(&config)?)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, KnowledgeLoadError> {
        let config = parser::parse_knowledge(yaml)?;
        Ok(Self::from_config(&config)?)
    }

    /// Validate and index a parsed configuration. Rejects on any integrity error.
    pub fn from_config(config: &KnowledgeConfig) -> Result<Self, KnowledgeBaseIntegrityError> {
        let errors = parser::validate_knowledge(config);
        if !errors.is_empty() {
            return Err(KnowledgeBaseIntegrityError { errors });
        }

        let mut canonicalizer = Canonicalizer::new();
        let mut ingredients = IndexMap::with_capacity(config.ingredients.len());
        for (id, spec) in &config.ingredients {
            let ingredient = CanonicalIngredient {
                id: IngredientId::new(id.as_str()),
                name: spec.name.clone(),
                aliases: spec.aliases.clone(),
                linked: true,
            };
            canonicalizer
                .register(ingredient.clone())
                .map_err(|e| KnowledgeBaseIntegrityError::single(e.to_string()))?;
            let density = spec
                .density
                .as_ref()
                .map(parser::positive_amount)
                .transpose()
                .map_err(|e| {
                    KnowledgeBaseIntegrityError::single(format!(
                        "ingredient '{}' density: {}",
                        id, e
                    ))
                })?;
            ingredients.insert(
                ingredient.id.clone(),
                IngredientRecord {
                    ingredient,
                    categories: spec.categories.clone(),
                    density,
                },
            );
        }

        let mut diets = IndexMap::with_capacity(config.diets.len());
        for (key, spec) in &config.diets {
            let id = DietId::new(key);
            let forbidden = parser::forbidden_ids(config, spec)
                .into_iter()
                .map(IngredientId::from)
                .collect();
            let mut options = FxHashMap::default();
            for (source, list) in &spec.substitutions {
                let source = IngredientId::new(source.as_str());
                let mut ranked = list
                    .iter()
                    .enumerate()
                    .map(|(position, option)| build_option(&id, &source, position, option))
                    .collect::<Result<Vec<_>, String>>()
                    .map_err(KnowledgeBaseIntegrityError::single)?;
                ranked.sort_by(rank_options);
                options.insert(source, ranked);
            }
            diets.insert(
                id.clone(),
                DietRule {
                    name: spec.name.clone().unwrap_or_else(|| id.to_string()),
                    id,
                    description: spec.description.clone(),
                    forbidden_categories: spec.forbid.categories.clone(),
                    forbidden,
                    options,
                },
            );
        }

        let fingerprint =
            hasher::hash_serialized(config).map_err(KnowledgeBaseIntegrityError::single)?;

        tracing::info!(
            knowledge_base = %config.name,
            ingredients = ingredients.len(),
            diets = diets.len(),
            "knowledge base loaded"
        );

        Ok(Self {
            name: config.name.clone(),
            description: config.description.clone(),
            policy: config.policy.clone(),
            canonicalizer,
            ingredients,
            diets,
            fingerprint,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn policy(&self) -> &ResolutionPolicy {
        &self.policy
    }

    /// BLAKE3 fingerprint of the source configuration.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn knowledge_ref(&self) -> KnowledgeRef {
        KnowledgeRef {
            name: self.name.clone(),
            fingerprint: self.fingerprint.clone(),
        }
    }

    pub fn canonicalize(&self, raw: &str) -> Canonicalized {
        self.canonicalizer.canonicalize(raw)
    }

    pub fn ingredient(&self, id: &IngredientId) -> Option<&IngredientRecord> {
        self.ingredients.get(id)
    }

    pub fn ingredients(&self) -> impl Iterator<Item = &IngredientRecord> {
        self.ingredients.values()
    }

    /// Display name for an id, falling back to the id itself.
    pub fn display_name<'a>(&'a self, id: &'a IngredientId) -> &'a str {
        self.ingredients
            .get(id)
            .map_or(id.as_str(), |r| r.ingredient.name.as_str())
    }

    pub fn density_of(&self, id: &IngredientId) -> Option<&Amount> {
        self.ingredients.get(id).and_then(|r| r.density.as_ref())
    }

    /// Diets in authored order.
    pub fn diets(&self) -> impl Iterator<Item = &DietRule> {
        self.diets.values()
    }

    pub fn diet(&self, id: &DietId) -> Option<&DietRule> {
        self.diets.get(id)
    }

    /// Normalize a user-supplied diet name and confirm it is known.
    pub fn parse_diet(&self, raw: &str) -> Option<DietId> {
        let id = DietId::new(raw);
        self.diets.contains_key(&id).then_some(id)
    }

    pub fn is_forbidden(&self, ingredient: &IngredientId, diet: &DietId) -> bool {
        self.diets.get(diet).is_some_and(|d| d.forbids(ingredient))
    }

    /// Ranked options authored by `diet` for `ingredient`.
    pub fn options_for(&self, ingredient: &IngredientId, diet: &DietId) -> &[SubstitutionOption] {
        match self.diets.get(diet) {
            Some(rule) => rule.options_for(ingredient),
            None => &[],
        }
    }

    /// Members of `active` that forbid `ingredient`, in the order given.
    pub fn forbidding_diets(&self, ingredient: &IngredientId, active: &[DietId]) -> Vec<DietId> {
        active
            .iter()
            .filter(|d| self.is_forbidden(ingredient, d))
            .cloned()
            .collect()
    }

    /// True when no member of `active` forbids `ingredient`.
    pub fn is_compliant(&self, ingredient: &IngredientId, active: &[DietId]) -> bool {
        active.iter().all(|d| !self.is_forbidden(ingredient, d))
    }
}

fn build_option(
    diet: &DietId,
    source: &IngredientId,
    position: usize,
    spec: &OptionSpec,
) -> Result<SubstitutionOption, String> {
    let ctx = |e: String| format!("diet '{}' option '{}' -> '{}': {}", diet, source, spec.target, e);
    Ok(SubstitutionOption {
        diet: diet.clone(),
        source: source.clone(),
        target: IngredientId::new(spec.target.as_str()),
        ratio: parser::positive_amount(&spec.ratio).map_err(ctx)?,
        per: spec.per.as_deref().map(units::normalize_unit),
        unit: spec.unit.as_deref().map(units::normalize_unit),
        density: spec
            .density
            .as_ref()
            .map(parser::positive_amount)
            .transpose()
            .map_err(ctx)?,
        confidence: spec.confidence,
        priority: spec
            .priority
            .unwrap_or_else(|| u32::try_from(position).unwrap_or(u32::MAX)),
        notes: spec.notes.trim().to_string(),
    })
}
