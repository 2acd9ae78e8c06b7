//! Composite diet resolution.
//!
//! Finds one substitute for a forbidden ingredient that every active diet
//! accepts. First by intersecting the forbidding diets' ranked option lists,
//! then by bounded chaining: apply the best single option and resolve the
//! result again against the full diet set. Diet order is the tie-break for
//! equal candidates, so resolution is reproducible.

use super::knowledge::{rank_options, KnowledgeBase};
use super::types::*;
use std::cmp::Ordering;

/// Outcome of resolving one ingredient.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// No active diet forbids the ingredient
    Allowed,
    Substitute(ResolvedChain),
    Unresolved(Conflict),
}

/// One or more substitution hops ending at a compliant ingredient.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChain {
    pub strategy: Strategy,
    pub steps: Vec<ChainStep>,
}

impl ResolvedChain {
    /// Final substitute.
    pub fn target(&self) -> Option<&IngredientId> {
        self.steps.last().map(|s| &s.to)
    }

    /// Product of the hop confidences.
    pub fn confidence(&self) -> f64 {
        self.steps.iter().map(|s| s.confidence).product()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    /// Active diets that forbid the original ingredient
    pub diets: Vec<DietId>,
    pub reason: ConflictReason,
    pub detail: String,
}

enum Outcome {
    Allowed,
    Resolved(Vec<ChainStep>, Strategy),
    Failed(ConflictReason),
}

/// Resolves ingredients against an ordered diet set.
pub struct CompositeResolver<'a> {
    kb: &'a KnowledgeBase,
    diets: &'a [DietId],
    max_chain_depth: usize,
}

impl<'a> CompositeResolver<'a> {
    /// Resolver with the knowledge base's hop budget. `diets` is in priority order.
    pub fn new(kb: &'a KnowledgeBase, diets: &'a [DietId]) -> Self {
        Self {
            kb,
            diets,
            max_chain_depth: kb.policy().max_chain_depth,
        }
    }

    pub fn with_max_chain_depth(mut self, depth: usize) -> Self {
        self.max_chain_depth = depth;
        self
    }

    pub fn max_chain_depth(&self) -> usize {
        self.max_chain_depth
    }

    pub fn resolve(&self, ingredient: &IngredientId) -> Resolution {
        let mut visited = vec![ingredient.clone()];
        match self.resolve_within(ingredient, self.max_chain_depth, &mut visited) {
            Outcome::Allowed => Resolution::Allowed,
            Outcome::Resolved(steps, strategy) => {
                tracing::debug!(
                    ingredient = %ingredient,
                    strategy = %strategy,
                    hops = steps.len(),
                    "resolved"
                );
                Resolution::Substitute(ResolvedChain { strategy, steps })
            }
            Outcome::Failed(reason) => {
                let diets = self.kb.forbidding_diets(ingredient, self.diets);
                let detail = match reason {
                    ConflictReason::NoAuthoredOptions => format!(
                        "no substitutions are authored for '{}' under {}",
                        ingredient,
                        join_diets(&diets)
                    ),
                    ConflictReason::NoCompliantCandidate => format!(
                        "no substitute for '{}' satisfies {}",
                        ingredient,
                        join_diets(self.diets)
                    ),
                    ConflictReason::ChainDepthExhausted => format!(
                        "no substitute for '{}' satisfies {} within {} hop(s)",
                        ingredient,
                        join_diets(self.diets),
                        self.max_chain_depth
                    ),
                };
                tracing::debug!(ingredient = %ingredient, reason = %reason, "unresolved");
                Resolution::Unresolved(Conflict {
                    diets,
                    reason,
                    detail,
                })
            }
        }
    }

    fn is_compliant(&self, ingredient: &IngredientId) -> bool {
        self.kb.is_compliant(ingredient, self.diets)
    }

    fn resolve_within(
        &self,
        ingredient: &IngredientId,
        hops_left: usize,
        visited: &mut Vec<IngredientId>,
    ) -> Outcome {
        let forbidding = self.kb.forbidding_diets(ingredient, self.diets);
        if forbidding.is_empty() {
            return Outcome::Allowed;
        }
        let lists: Vec<&[SubstitutionOption]> = forbidding
            .iter()
            .map(|d| self.kb.options_for(ingredient, d))
            .collect();
        if lists.iter().all(|l| l.is_empty()) {
            return Outcome::Failed(ConflictReason::NoAuthoredOptions);
        }
        if hops_left == 0 {
            return Outcome::Failed(ConflictReason::ChainDepthExhausted);
        }
        if let Some(step) = self.intersect(ingredient, &forbidding, &lists) {
            return Outcome::Resolved(vec![step], Strategy::Intersection);
        }
        self.chain(ingredient, &forbidding, &lists, hops_left, visited)
    }

    /// Best compliant target present in every forbidding diet's list.
    ///
    /// Ranked by the first forbidding diet's order; confidence is the
    /// minimum across lists and notes are merged without duplicates.
    fn intersect(
        &self,
        ingredient: &IngredientId,
        forbidding: &[DietId],
        lists: &[&[SubstitutionOption]],
    ) -> Option<ChainStep> {
        let (lead, rest) = lists.split_first()?;
        lead.iter()
            .filter(|option| self.is_compliant(&option.target))
            .filter_map(|option| {
                let mut confidence = option.confidence;
                let mut notes = Vec::new();
                push_note(&mut notes, &option.notes);
                for list in rest {
                    let other = list.iter().find(|o| o.target == option.target)?;
                    confidence = confidence.min(other.confidence);
                    push_note(&mut notes, &other.notes);
                }
                Some((option, confidence, notes))
            })
            .min_by(|a, b| {
                rank_options(a.0, b.0)
                    .then(b.1.total_cmp(&a.1))
            })
            .map(|(option, confidence, notes)| ChainStep {
                from: ingredient.clone(),
                to: option.target.clone(),
                option: option.clone(),
                diets: forbidding.to_vec(),
                notes,
                confidence,
            })
    }

    /// Apply the best single option from any forbidding diet, then re-resolve.
    ///
    /// Candidates: every option across the lists whose target was not already
    /// visited. Order: compliant first, confidence descending, diet
    /// priority, target id.
    fn chain(
        &self,
        ingredient: &IngredientId,
        forbidding: &[DietId],
        lists: &[&[SubstitutionOption]],
        hops_left: usize,
        visited: &mut Vec<IngredientId>,
    ) -> Outcome {
        let pick = lists
            .iter()
            .enumerate()
            .flat_map(|(rank, list)| list.iter().map(move |option| (rank, option)))
            .filter(|(_, option)| !visited.contains(&option.target))
            .map(|(rank, option)| (self.is_compliant(&option.target), rank, option))
            .min_by(|a, b| chain_order(a, b));

        let Some((_, _, option)) = pick else {
            return Outcome::Failed(ConflictReason::NoCompliantCandidate);
        };

        let mut notes = Vec::new();
        push_note(&mut notes, &option.notes);
        let step = ChainStep {
            from: ingredient.clone(),
            to: option.target.clone(),
            option: option.clone(),
            diets: forbidding.to_vec(),
            notes,
            confidence: option.confidence,
        };

        visited.push(option.target.clone());
        match self.resolve_within(&option.target, hops_left - 1, visited) {
            Outcome::Allowed => Outcome::Resolved(vec![step], Strategy::Chained),
            Outcome::Resolved(rest, _) => {
                let mut steps = Vec::with_capacity(rest.len() + 1);
                steps.push(step);
                steps.extend(rest);
                Outcome::Resolved(steps, Strategy::Chained)
            }
            Outcome::Failed(ConflictReason::ChainDepthExhausted) => {
                Outcome::Failed(ConflictReason::ChainDepthExhausted)
            }
            Outcome::Failed(_) => Outcome::Failed(ConflictReason::NoCompliantCandidate),
        }
    }
}

fn chain_order(
    a: &(bool, usize, &SubstitutionOption),
    b: &(bool, usize, &SubstitutionOption),
) -> Ordering {
    b.0.cmp(&a.0)
        .then(b.2.confidence.total_cmp(&a.2.confidence))
        .then(a.1.cmp(&b.1))
        .then_with(|| a.2.target.cmp(&b.2.target))
}

fn push_note(notes: &mut Vec<String>, note: &str) {
    if !note.is_empty() && !notes.iter().any(|n| n == note) {
        notes.push(note.to_string());
    }
}
