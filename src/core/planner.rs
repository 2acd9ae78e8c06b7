//! Substitution planning: canonicalize a recipe, resolve every line against
//! an ordered diet set, and collect decisions, conflicts, and warnings.

use super::knowledge::KnowledgeBase;
use super::resolver::{CompositeResolver, Resolution};
use super::selector::SubstitutionSelector;
use super::types::*;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("unknown diet '{requested}' (known: {known})")]
    UnknownDiet { requested: String, known: String },
}

/// Per-call overrides of the knowledge base's policy.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    pub max_chain_depth: Option<usize>,
}

/// Normalize requested diets, reject unknown ones, drop repeats (first wins).
pub fn activate_diets<S: AsRef<str>>(
    kb: &KnowledgeBase,
    requested: &[S],
) -> Result<Vec<DietId>, PlanError> {
    let mut active: Vec<DietId> = Vec::with_capacity(requested.len());
    for raw in requested {
        let raw = raw.as_ref();
        let id = kb.parse_diet(raw).ok_or_else(|| PlanError::UnknownDiet {
            requested: raw.to_string(),
            known: kb
                .diets()
                .map(|d| d.id.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })?;
        if !active.contains(&id) {
            active.push(id);
        }
    }
    Ok(active)
}

/// Canonicalize one recipe line, merging authored and extracted qualifiers.
pub fn canonicalize_line(kb: &KnowledgeBase, line: &RecipeLine) -> IngredientLine {
    let canonical = kb.canonicalize(&line.name);
    let qualifier = match (&line.qualifier, canonical.qualifier) {
        (Some(authored), Some(extracted)) => Some(format!("{}, {}", authored, extracted)),
        (Some(authored), None) => Some(authored.clone()),
        (None, extracted) => extracted,
    };
    IngredientLine {
        raw: line.name.clone(),
        ingredient: canonical.ingredient,
        quantity: line.quantity.clone(),
        qualifier,
        section: line.section.clone(),
    }
}

/// Build a substitution plan for `recipe` under `diets` (priority order).
pub fn plan_substitutions<S: AsRef<str>>(
    kb: &KnowledgeBase,
    recipe: &Recipe,
    diets: &[S],
    options: &PlanOptions,
) -> Result<SubstitutionPlan, PlanError> {
    let active = activate_diets(kb, diets)?;
    let span = tracing::info_span!("plan", recipe = %recipe.title, diets = %join_diets(&active));
    let _guard = span.enter();

    let mut resolver = CompositeResolver::new(kb, &active);
    if let Some(depth) = options.max_chain_depth {
        resolver = resolver.with_max_chain_depth(depth);
    }
    let selector = SubstitutionSelector::new(kb);

    let mut decisions = Vec::new();
    let mut unchanged = Vec::new();
    let mut unresolved = Vec::new();
    let mut warnings = Vec::new();

    for (index, recipe_line) in recipe.ingredients.iter().enumerate() {
        let line = canonicalize_line(kb, recipe_line);

        if !line.ingredient.linked {
            tracing::warn!(
                line = index + 1,
                name = %line.raw,
                "unknown ingredient; left unchecked"
            );
            warnings.push(PlanWarning::UnknownIngredient {
                line: index,
                raw: line.raw.clone(),
                id: line.ingredient.id.clone(),
            });
            unchanged.push(UnchangedLine {
                line: index,
                ingredient: line,
                reason: UnchangedReason::UnknownIngredient,
            });
            continue;
        }

        match resolver.resolve(&line.ingredient.id) {
            Resolution::Allowed => unchanged.push(UnchangedLine {
                line: index,
                ingredient: line,
                reason: UnchangedReason::Allowed,
            }),
            Resolution::Substitute(chain) => {
                debug_assert!(chain
                    .target()
                    .is_some_and(|t| kb.is_compliant(t, &active)));
                let (decision, line_warnings) = selector.select(index, &line, &chain);
                decisions.push(decision);
                warnings.extend(line_warnings);
            }
            Resolution::Unresolved(conflict) => {
                tracing::warn!(
                    line = index + 1,
                    ingredient = %line.ingredient.id,
                    reason = %conflict.reason,
                    "unresolved conflict"
                );
                unresolved.push(UnresolvedConflict {
                    line: index,
                    ingredient: line.ingredient.id.clone(),
                    raw: line.raw.clone(),
                    diets: conflict.diets.clone(),
                    reason: conflict.reason,
                    detail: conflict.detail.clone(),
                });
                decisions.push(retained(index, line, conflict.diets, &conflict.detail));
            }
        }
    }

    let summary = PlanSummary {
        substituted: decisions.iter().filter(|d| d.is_resolved()).count(),
        unchanged: unchanged.len(),
        unresolved: unresolved.len(),
        warnings: warnings.len(),
    };
    let compliant = unresolved.is_empty()
        && decisions.iter().all(|d| {
            d.substitute
                .as_ref()
                .is_some_and(|s| kb.is_compliant(&s.id, &active))
        });
    tracing::info!(
        substituted = summary.substituted,
        unchanged = summary.unchanged,
        unresolved = summary.unresolved,
        compliant,
        "plan complete"
    );

    Ok(SubstitutionPlan {
        title: recipe.title.clone(),
        servings: recipe.servings,
        knowledge: kb.knowledge_ref(),
        diets: active,
        decisions,
        unchanged,
        unresolved,
        warnings,
        summary,
        compliant,
    })
}

/// Decision for a conflict with no substitute: the original stays.
fn retained(
    index: usize,
    line: IngredientLine,
    diets: Vec<DietId>,
    detail: &str,
) -> SubstitutionDecision {
    SubstitutionDecision {
        line: index,
        quantity: line.quantity.clone(),
        rationale: format!("Kept {}: {}.", line.ingredient.name, detail),
        original: line,
        substitute: None,
        strategy: None,
        steps: Vec::new(),
        conversion: ConversionKind::Retained,
        confidence: 0.0,
        diets,
    }
}
