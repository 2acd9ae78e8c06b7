//! Substitution selection: turns a resolved chain into a concrete decision.
//!
//! Each hop's ratio is applied in turn. An option with a `per` unit scales
//! the line after converting it to that unit, through a density when volume
//! and weight meet; an option without one scales the amount as written. When
//! no conversion exists the amount is kept as written and the decision's
//! confidence is multiplied by the policy's fallback factor.

use super::knowledge::KnowledgeBase;
use super::resolver::ResolvedChain;
use super::types::*;
use super::units::{self, UnitFamily};

/// A quantity after one option's ratio was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Scaled {
    pub quantity: Quantity,
    pub conversion: ConversionKind,
}

pub struct SubstitutionSelector<'a> {
    kb: &'a KnowledgeBase,
}

impl<'a> SubstitutionSelector<'a> {
    pub fn new(kb: &'a KnowledgeBase) -> Self {
        Self { kb }
    }

    /// Scale `quantity` of the option's source into the option's target.
    pub fn apply_option(&self, quantity: &Quantity, option: &SubstitutionOption) -> Scaled {
        let Some(per) = option.per.as_deref() else {
            let scaled = units::scale(quantity, &option.ratio);
            let Some(unit) = option.unit.as_deref() else {
                return Scaled {
                    quantity: scaled,
                    conversion: ConversionKind::Exact,
                };
            };
            // Unit-agnostic ratio, but the substitute is measured in its own unit
            return match self.convert_bridged(&scaled, unit, option) {
                Some((quantity, conversion)) => Scaled {
                    quantity,
                    conversion,
                },
                None => count_preserving(quantity, option),
            };
        };

        let Some((in_per, conversion)) = self.convert_bridged(quantity, per, option) else {
            return count_preserving(quantity, option);
        };

        let scaled = units::scale(&in_per, &option.ratio);
        let quantity = match option.unit.as_deref() {
            Some(unit) => Quantity {
                amount: scaled.amount,
                unit: units::normalize_unit(unit),
            },
            // Measured like the source: back in the line's unit when the family allows
            None => units::convert(&scaled, &quantity.unit).unwrap_or(scaled),
        };
        Scaled {
            quantity,
            conversion,
        }
    }

    /// Convert within a family, or across volume and weight through the
    /// option's density (else the source ingredient's). None when neither works.
    fn convert_bridged(
        &self,
        quantity: &Quantity,
        unit: &str,
        option: &SubstitutionOption,
    ) -> Option<(Quantity, ConversionKind)> {
        if let Ok(converted) = units::convert(quantity, unit) {
            return Some((converted, ConversionKind::Exact));
        }
        let density = option
            .density
            .as_ref()
            .or_else(|| self.kb.density_of(&option.source))?;
        units::convert_with_density(quantity, unit, Some(density))
            .ok()
            .map(|converted| (converted, ConversionKind::DensityBridged))
    }

    /// Build the decision for one forbidden line, plus any per-line warnings.
    pub fn select(
        &self,
        line_index: usize,
        line: &IngredientLine,
        chain: &ResolvedChain,
    ) -> (SubstitutionDecision, Vec<PlanWarning>) {
        let mut quantity = line.quantity.clone();
        let mut conversion = ConversionKind::Exact;
        let mut warnings = Vec::new();

        for step in &chain.steps {
            let scaled = self.apply_option(&quantity, &step.option);
            if scaled.conversion == ConversionKind::CountPreserving {
                tracing::warn!(
                    line = line_index + 1,
                    target = %step.to,
                    unit = %quantity.unit,
                    "ratio not applicable across unit families; amount kept"
                );
                warnings.push(PlanWarning::IncompatibleUnits {
                    line: line_index,
                    target: step.to.clone(),
                    unit: quantity.unit.clone(),
                    expected: step
                        .option
                        .family()
                        .or_else(|| step.option.unit.as_deref().map(units::family_of))
                        .unwrap_or(UnitFamily::Other),
                });
            }
            conversion = conversion.max(scaled.conversion);
            quantity = scaled.quantity;
        }

        let mut confidence = chain.confidence();
        if conversion == ConversionKind::CountPreserving {
            confidence *= self.kb.policy().fallback_confidence_factor;
        }

        let mut diets: Vec<DietId> = Vec::new();
        for d in chain.steps.iter().flat_map(|s| s.diets.iter()) {
            if !diets.contains(d) {
                diets.push(d.clone());
            }
        }

        let decision = SubstitutionDecision {
            line: line_index,
            original: line.clone(),
            substitute: chain.target().map(|id| self.canonical(id)),
            strategy: Some(chain.strategy),
            steps: chain.steps.clone(),
            rationale: self.rationale(line, chain, conversion),
            quantity,
            conversion,
            confidence,
            diets,
        };
        (decision, warnings)
    }

    fn canonical(&self, id: &IngredientId) -> CanonicalIngredient {
        self.kb
            .ingredient(id)
            .map(|r| r.ingredient.clone())
            .unwrap_or_else(|| CanonicalIngredient::synthetic(id.as_str()))
    }

    fn rationale(
        &self,
        line: &IngredientLine,
        chain: &ResolvedChain,
        conversion: ConversionKind,
    ) -> String {
        let hops: Vec<String> = chain
            .steps
            .iter()
            .map(|s| {
                format!(
                    "{} with {} for {}",
                    self.kb.display_name(&s.from),
                    self.kb.display_name(&s.to),
                    join_diets(&s.diets)
                )
            })
            .collect();
        let mut text = format!("Replaced {}.", hops.join(", then "));
        for note in chain.steps.iter().flat_map(|s| s.notes.iter()) {
            text.push(' ');
            text.push_str(note);
        }
        if conversion == ConversionKind::CountPreserving {
            text.push_str(&format!(
                " Amount kept as written ({}); the ratio is given for a different measure.",
                line.quantity
            ));
        }
        text
    }
}

fn count_preserving(quantity: &Quantity, option: &SubstitutionOption) -> Scaled {
    let unit = option
        .unit
        .clone()
        .unwrap_or_else(|| quantity.unit.clone());
    Scaled {
        quantity: Quantity {
            amount: quantity.amount,
            unit,
        },
        conversion: ConversionKind::CountPreserving,
    }
}
