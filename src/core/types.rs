//! Data model: recipes, knowledge-base configuration, and substitution plans.
//!
//! Configuration types derive Deserialize for YAML loading. Plan types derive
//! Serialize so a plan can be rendered as JSON and fingerprinted. Amounts stay
//! exact rationals everywhere and serialize as fraction strings ("9/4").

use super::units::{self, Amount, ConversionError, UnitFamily};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Canonical ingredient identifier (e.g. `all-purpose-flour`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IngredientId(String);

impl IngredientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IngredientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IngredientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Diet identifier. Construction normalizes case and separators, so
/// `Gluten Free`, `gluten_free` and `gluten-free` are the same diet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DietId(String);

impl DietId {
    pub fn new(raw: &str) -> Self {
        let lowered = raw.trim().to_lowercase();
        let joined = lowered
            .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        Self(joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DietId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Join diet ids for messages ("vegan, keto").
pub fn join_diets(diets: &[DietId]) -> String {
    diets
        .iter()
        .map(DietId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Ingredients and quantities
// ============================================================================

/// The de-aliased identity of an ingredient.
///
/// `linked` is false for identifiers synthesized from unmatched text; such
/// ingredients are not registered under any diet rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalIngredient {
    pub id: IngredientId,
    pub name: String,
    #[serde(skip)]
    pub aliases: Vec<String>,
    pub linked: bool,
}

impl CanonicalIngredient {
    /// An unlinked ingredient whose id and name are the normalized text.
    pub fn synthetic(normalized: &str) -> Self {
        Self {
            id: IngredientId::new(normalized),
            name: normalized.to_string(),
            aliases: Vec::new(),
            linked: false,
        }
    }
}

/// A non-negative exact amount in a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quantity {
    #[serde(serialize_with = "serialize_amount")]
    pub amount: Amount,
    pub unit: String,
}

impl Quantity {
    /// Build a quantity, normalizing the unit to its canonical symbol.
    pub fn new(amount: Amount, unit: &str) -> Result<Self, ConversionError> {
        if amount < Amount::from_integer(0) {
            return Err(ConversionError::NegativeAmount(amount.to_string()));
        }
        Ok(Self {
            amount,
            unit: units::normalize_unit(unit),
        })
    }

    /// Parse an amount string ("2 1/4", "0.5", "½") and a unit.
    pub fn parse(amount: &str, unit: &str) -> Result<Self, ConversionError> {
        Self::new(units::parse_amount(amount)?, unit)
    }

    pub fn family(&self) -> UnitFamily {
        units::family_of(&self.unit)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let amount = units::render_amount(&self.amount);
        if self.unit.is_empty() {
            write!(f, "{}", amount)
        } else {
            write!(f, "{} {}", amount, self.unit)
        }
    }
}

/// An amount as authored in YAML: integer, decimal, or fraction text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AmountText {
    Integer(i64),
    Decimal(f64),
    Text(String),
}

impl AmountText {
    pub fn parse(&self) -> Result<Amount, ConversionError> {
        match self {
            Self::Integer(n) if *n < 0 => Err(ConversionError::NegativeAmount(n.to_string())),
            Self::Integer(n) => Ok(Amount::from_integer(i128::from(*n))),
            Self::Decimal(d) => units::parse_amount(&d.to_string()),
            Self::Text(s) => units::parse_amount(s),
        }
    }
}

impl Default for AmountText {
    fn default() -> Self {
        Self::Integer(1)
    }
}

impl fmt::Display for AmountText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{}", n),
            Self::Decimal(d) => write!(f, "{}", d),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

// ============================================================================
// Recipes
// ============================================================================

/// A structured recipe as handed over by the parsing collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct Recipe {
    pub title: String,

    #[serde(default)]
    pub servings: Option<u32>,

    /// Ingredient lines in recipe order
    #[serde(default)]
    pub ingredients: Vec<RecipeLine>,
}

/// One ingredient line before canonicalization.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RecipeLineSpec")]
pub struct RecipeLine {
    pub quantity: Quantity,
    pub name: String,
    pub qualifier: Option<String>,
    pub section: Option<String>,
}

impl RecipeLine {
    pub fn new(amount: &str, unit: &str, name: &str) -> Result<Self, ConversionError> {
        Ok(Self {
            quantity: Quantity::parse(amount, unit)?,
            name: name.to_string(),
            qualifier: None,
            section: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RecipeLineSpec {
    #[serde(default)]
    quantity: AmountText,
    #[serde(default)]
    unit: String,
    name: String,
    #[serde(default)]
    qualifier: Option<String>,
    #[serde(default)]
    section: Option<String>,
}

impl TryFrom<RecipeLineSpec> for RecipeLine {
    type Error = ConversionError;

    fn try_from(spec: RecipeLineSpec) -> Result<Self, Self::Error> {
        Ok(Self {
            quantity: Quantity::new(spec.quantity.parse()?, &spec.unit)?,
            name: spec.name,
            qualifier: spec.qualifier.filter(|q| !q.trim().is_empty()),
            section: spec.section,
        })
    }
}

/// A canonicalized ingredient line. Read-only once built.
#[derive(Debug, Clone, Serialize)]
pub struct IngredientLine {
    /// Name as written in the recipe
    pub raw: String,
    pub ingredient: CanonicalIngredient,
    pub quantity: Quantity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

// ============================================================================
// Knowledge-base configuration (YAML)
// ============================================================================

/// Root of a knowledge-base document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Schema version (must be "1.0")
    pub version: String,

    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub policy: ResolutionPolicy,

    /// Canonical ingredient table, keyed by id
    #[serde(default)]
    pub ingredients: IndexMap<String, IngredientSpec>,

    /// Diet rules, keyed by diet id
    #[serde(default)]
    pub diets: IndexMap<String, DietSpec>,
}

/// Tunable resolution constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionPolicy {
    /// Maximum substitution hops per ingredient (0 disables substitution)
    #[serde(default = "default_chain_depth")]
    pub max_chain_depth: usize,

    /// Confidence multiplier for count-preserving fallbacks
    #[serde(default = "default_fallback_factor")]
    pub fallback_confidence_factor: f64,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self {
            max_chain_depth: default_chain_depth(),
            fallback_confidence_factor: default_fallback_factor(),
        }
    }
}

fn default_chain_depth() -> usize {
    2
}

fn default_fallback_factor() -> f64 {
    0.5
}

/// An ingredient table entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientSpec {
    pub name: String,

    #[serde(default)]
    pub aliases: Vec<String>,

    /// Category tags used by category-wide diet rules ("dairy", "gluten")
    #[serde(default)]
    pub categories: Vec<String>,

    /// Grams per millilitre
    #[serde(default)]
    pub density: Option<AmountText>,
}

/// A diet's forbidden set and substitution table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DietSpec {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub forbid: ForbidSpec,

    /// Source ingredient id → ranked options
    #[serde(default)]
    pub substitutions: IndexMap<String, Vec<OptionSpec>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForbidSpec {
    #[serde(default)]
    pub ingredients: Vec<String>,

    #[serde(default)]
    pub categories: Vec<String>,
}

/// An authored substitution option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionSpec {
    pub target: String,

    /// Target amount per one `per` unit of source
    #[serde(default)]
    pub ratio: AmountText,

    /// Source reference unit; its family is the option's unit-family tag
    #[serde(default)]
    pub per: Option<String>,

    /// Unit the substitute is measured in
    #[serde(default)]
    pub unit: Option<String>,

    /// Source density (g/ml) for bridging volume and weight
    #[serde(default)]
    pub density: Option<AmountText>,

    #[serde(default = "default_confidence")]
    pub confidence: f64,

    /// Authored rank; defaults to position in the list
    #[serde(default)]
    pub priority: Option<u32>,

    #[serde(default)]
    pub notes: String,
}

fn default_confidence() -> f64 {
    1.0
}

// ============================================================================
// Substitution options (validated, in memory)
// ============================================================================

/// A validated substitution rule: `source` → `target` under `diet`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubstitutionOption {
    pub diet: DietId,
    pub source: IngredientId,
    pub target: IngredientId,
    #[serde(serialize_with = "serialize_amount")]
    pub ratio: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(
        serialize_with = "serialize_optional_amount",
        skip_serializing_if = "Option::is_none"
    )]
    pub density: Option<Amount>,
    pub confidence: f64,
    pub priority: u32,
    pub notes: String,
}

impl SubstitutionOption {
    /// The unit family the ratio is measured in, or None when unit-agnostic.
    pub fn family(&self) -> Option<UnitFamily> {
        self.per.as_deref().map(units::family_of)
    }
}

// ============================================================================
// Plan
// ============================================================================

/// How a substitute was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Every forbidding diet authored the same compliant target
    Intersection,
    /// One diet's option applied, then re-resolved against the rest
    Chained,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Intersection => write!(f, "intersection"),
            Self::Chained => write!(f, "chained"),
        }
    }
}

/// One hop of a substitution chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainStep {
    pub from: IngredientId,
    pub to: IngredientId,
    /// Option whose ratio and units are applied
    pub option: SubstitutionOption,
    /// Active diets that forbid `from`
    pub diets: Vec<DietId>,
    /// Authored notes merged across the diets' lists
    pub notes: Vec<String>,
    pub confidence: f64,
}

/// How the substitute quantity was derived. Ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionKind {
    Exact,
    DensityBridged,
    CountPreserving,
    Retained,
}

impl fmt::Display for ConversionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::DensityBridged => write!(f, "density-bridged"),
            Self::CountPreserving => write!(f, "count-preserving"),
            Self::Retained => write!(f, "retained"),
        }
    }
}

/// Decision for one forbidden line.
#[derive(Debug, Clone, Serialize)]
pub struct SubstitutionDecision {
    /// Index of the line in the recipe
    pub line: usize,
    pub original: IngredientLine,
    /// None when the conflict is unresolved and the original is kept
    pub substitute: Option<CanonicalIngredient>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    pub steps: Vec<ChainStep>,
    pub quantity: Quantity,
    pub conversion: ConversionKind,
    pub confidence: f64,
    pub rationale: String,
    pub diets: Vec<DietId>,
}

impl SubstitutionDecision {
    /// The option applied last, if any.
    pub fn chosen_option(&self) -> Option<&SubstitutionOption> {
        self.steps.last().map(|s| &s.option)
    }

    pub fn is_resolved(&self) -> bool {
        self.substitute.is_some()
    }
}

/// Why a line was left as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnchangedReason {
    Allowed,
    UnknownIngredient,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnchangedLine {
    pub line: usize,
    pub ingredient: IngredientLine,
    pub reason: UnchangedReason,
}

/// Why no substitute could be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    NoAuthoredOptions,
    NoCompliantCandidate,
    ChainDepthExhausted,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAuthoredOptions => write!(f, "no authored options"),
            Self::NoCompliantCandidate => write!(f, "no compliant candidate"),
            Self::ChainDepthExhausted => write!(f, "chain depth exhausted"),
        }
    }
}

/// A forbidden ingredient left in place for the caller's attention.
#[derive(Debug, Clone, Serialize)]
pub struct UnresolvedConflict {
    pub line: usize,
    pub ingredient: IngredientId,
    pub raw: String,
    pub diets: Vec<DietId>,
    pub reason: ConflictReason,
    pub detail: String,
}

/// Non-fatal per-line conditions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanWarning {
    /// Name matched nothing in the ingredient table; treated as allowed
    UnknownIngredient {
        line: usize,
        raw: String,
        id: IngredientId,
    },
    /// Ratio could not be applied across unit families; amount kept as written
    IncompatibleUnits {
        line: usize,
        target: IngredientId,
        unit: String,
        expected: UnitFamily,
    },
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownIngredient { line, raw, id } => write!(
                f,
                "line {}: '{}' is not a known ingredient (as '{}'); left unchecked",
                line + 1,
                raw,
                id
            ),
            Self::IncompatibleUnits {
                line,
                target,
                unit,
                expected,
            } => write!(
                f,
                "line {}: cannot scale '{}' from '{}' to a {} measure; amount kept as written",
                line + 1,
                target,
                unit,
                expected
            ),
        }
    }
}

/// Identity of the knowledge base a plan was computed against.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeRef {
    pub name: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub substituted: usize,
    pub unchanged: usize,
    pub unresolved: usize,
    pub warnings: usize,
}

/// Full substitution plan for one recipe under one ordered diet set.
#[derive(Debug, Clone, Serialize)]
pub struct SubstitutionPlan {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servings: Option<u32>,
    pub knowledge: KnowledgeRef,
    /// Active diets in priority order
    pub diets: Vec<DietId>,
    pub decisions: Vec<SubstitutionDecision>,
    pub unchanged: Vec<UnchangedLine>,
    pub unresolved: Vec<UnresolvedConflict>,
    pub warnings: Vec<PlanWarning>,
    pub summary: PlanSummary,
    /// No unresolved conflicts and every substitute satisfies every active
    /// diet. Unknown ingredients are not checked.
    pub compliant: bool,
}

// ============================================================================
// Amount serialization helpers
// ============================================================================

/// Serialize an exact amount as its fraction string ("9/4", "2").
pub fn serialize_amount<S: Serializer>(amount: &Amount, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&amount.to_string())
}

fn serialize_optional_amount<S: Serializer>(
    amount: &Option<Amount>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match amount {
        Some(a) => serialize_amount(a, s),
        None => s.serialize_none(),
    }
}

// ============================================================================
// Tests
// ============================================================================
