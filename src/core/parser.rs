//! Knowledge-base and recipe YAML parsing, plus knowledge-base validation.
//!
//! Validation collects every problem instead of stopping at the first:
//! - Version must be "1.0"
//! - An alias names exactly one ingredient
//! - Diets only reference ingredients in the table
//! - Options exist only for ingredients their diet forbids
//! - No option targets an ingredient its own diet forbids
//! - Ratios, densities, confidences and units are well-formed

use super::canonicalizer::normalize;
use super::types::*;
use super::units::{self, Amount};
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::Path;
use thiserror::Error;

/// Validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
}

/// All validation errors of a rejected knowledge base.
#[derive(Debug, Clone, Error)]
#[error("knowledge base failed validation ({} error(s)){}", .errors.len(), bullet_list(.errors))]
pub struct KnowledgeBaseIntegrityError {
    pub errors: Vec<ValidationError>,
}

impl KnowledgeBaseIntegrityError {
    pub fn single(message: impl Into<String>) -> Self {
        Self {
            errors: vec![ValidationError {
                message: message.into(),
            }],
        }
    }
}

fn bullet_list(errors: &[ValidationError]) -> String {
    errors.iter().map(|e| format!("\n  - {}", e)).collect()
}

#[derive(Debug, Error)]
pub enum KnowledgeLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml_ng::Error),

    #[error(transparent)]
    Integrity(#[from] KnowledgeBaseIntegrityError),
}

#[derive(Debug, Error)]
pub enum RecipeLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("recipe parse error: {0}")]
    Parse(#[from] serde_yaml_ng::Error),
}

/// Parse a knowledge-base file from disk.
pub fn parse_knowledge_file(path: &Path) -> Result<KnowledgeConfig, KnowledgeLoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| KnowledgeLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_knowledge(&content)
}

/// Parse a knowledge base from a YAML string. Does not validate.
pub fn parse_knowledge(yaml: &str) -> Result<KnowledgeConfig, KnowledgeLoadError> {
    Ok(serde_yaml_ng::from_str(yaml)?)
}

/// Parse a recipe file from disk.
pub fn parse_recipe_file(path: &Path) -> Result<Recipe, RecipeLoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| RecipeLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_recipe(&content)
}

/// Parse a recipe from a YAML string.
pub fn parse_recipe(yaml: &str) -> Result<Recipe, RecipeLoadError> {
    Ok(serde_yaml_ng::from_str(yaml)?)
}

/// Ingredient ids a diet forbids: listed ids plus members of listed categories.
pub(crate) fn forbidden_ids<'a>(
    config: &'a KnowledgeConfig,
    diet: &'a DietSpec,
) -> FxHashSet<&'a str> {
    let mut forbidden: FxHashSet<&str> = diet
        .forbid
        .ingredients
        .iter()
        .map(String::as_str)
        .filter(|id| config.ingredients.contains_key(*id))
        .collect();
    for (id, spec) in &config.ingredients {
        if spec
            .categories
            .iter()
            .any(|c| diet.forbid.categories.contains(c))
        {
            forbidden.insert(id.as_str());
        }
    }
    forbidden
}

/// Parse an authored amount that must be strictly positive.
pub(crate) fn positive_amount(text: &AmountText) -> Result<Amount, String> {
    let amount = text.parse().map_err(|e| e.to_string())?;
    if amount <= Amount::from_integer(0) {
        return Err(format!("must be positive, got {}", text));
    }
    Ok(amount)
}

/// Validate a parsed knowledge base. Returns a list of errors (empty = valid).
pub fn validate_knowledge(config: &KnowledgeConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut push = |message: String| errors.push(ValidationError { message });

    if config.version != "1.0" {
        push(format!(
            "version must be \"1.0\", got \"{}\"",
            config.version
        ));
    }

    if config.name.is_empty() {
        push("name must not be empty".to_string());
    }

    let factor = config.policy.fallback_confidence_factor;
    if !(factor > 0.0 && factor <= 1.0) {
        push(format!(
            "policy.fallback_confidence_factor must be in (0, 1], got {}",
            factor
        ));
    }

    // Ingredient table
    let mut aliases: FxHashMap<String, &str> = FxHashMap::default();
    let mut categories: FxHashSet<&str> = FxHashSet::default();
    for (id, spec) in &config.ingredients {
        if normalize(id).is_empty() {
            push(format!("ingredient id '{}' is empty after normalization", id));
        }
        if spec.name.trim().is_empty() {
            push(format!("ingredient '{}' has an empty name", id));
        }
        if let Some(density) = &spec.density {
            if let Err(e) = positive_amount(density) {
                push(format!("ingredient '{}' density: {}", id, e));
            }
        }
        let names = std::iter::once(id)
            .chain(std::iter::once(&spec.name))
            .chain(spec.aliases.iter());
        for alias in names {
            let key = normalize(alias);
            if key.is_empty() {
                continue;
            }
            match aliases.get(&key) {
                Some(other) if *other != id.as_str() => push(format!(
                    "alias '{}' maps to both '{}' and '{}'",
                    key, other, id
                )),
                Some(_) => {}
                None => {
                    aliases.insert(key, id.as_str());
                }
            }
        }
        categories.extend(spec.categories.iter().map(String::as_str));
    }

    // Diet rules
    let mut diet_ids: FxHashMap<DietId, &str> = FxHashMap::default();
    for (key, diet) in &config.diets {
        let diet_id = DietId::new(key);
        if diet_id.as_str().is_empty() {
            push(format!("diet id '{}' is empty after normalization", key));
        }
        if let Some(previous) = diet_ids.insert(diet_id.clone(), key) {
            push(format!(
                "diets '{}' and '{}' both normalize to '{}'",
                previous, key, diet_id
            ));
        }

        for ingredient in &diet.forbid.ingredients {
            if !config.ingredients.contains_key(ingredient) {
                push(format!(
                    "diet '{}' forbids unknown ingredient '{}'",
                    diet_id, ingredient
                ));
            }
        }
        for category in &diet.forbid.categories {
            if !categories.contains(category.as_str()) {
                tracing::warn!(
                    diet = %diet_id,
                    category = %category,
                    "forbidden category matches no ingredient"
                );
            }
        }

        let forbidden = forbidden_ids(config, diet);
        for (source, options) in &diet.substitutions {
            if !config.ingredients.contains_key(source) {
                push(format!(
                    "diet '{}' has options for unknown ingredient '{}'",
                    diet_id, source
                ));
                continue;
            }
            if !forbidden.contains(source.as_str()) {
                push(format!(
                    "diet '{}' has options for '{}', which it does not forbid",
                    diet_id, source
                ));
            }
            let mut targets: FxHashSet<&str> = FxHashSet::default();
            for option in options {
                let ctx = format!("diet '{}' option '{}' -> '{}'", diet_id, source, option.target);
                if !config.ingredients.contains_key(&option.target) {
                    push(format!("{}: unknown target ingredient", ctx));
                }
                if option.target == *source {
                    push(format!("{}: target is the source itself", ctx));
                } else if forbidden.contains(option.target.as_str()) {
                    push(format!("{}: target is forbidden by the same diet", ctx));
                }
                if !targets.insert(option.target.as_str()) {
                    push(format!("{}: duplicate target", ctx));
                }
                if let Err(e) = positive_amount(&option.ratio) {
                    push(format!("{}: ratio {}", ctx, e));
                }
                if let Some(density) = &option.density {
                    if let Err(e) = positive_amount(density) {
                        push(format!("{}: density {}", ctx, e));
                    }
                }
                if !(0.0..=1.0).contains(&option.confidence) {
                    push(format!(
                        "{}: confidence {} outside [0, 1]",
                        ctx, option.confidence
                    ));
                }
                for unit in option.per.iter().chain(option.unit.iter()) {
                    if let Err(e) = units::require_unit(unit) {
                        push(format!("{}: {}", ctx, e));
                    }
                }
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
version: "1.0"
name: test
ingredients:
  milk:
    name: milk
    aliases: [whole milk]
    categories: [dairy]
  oat-milk:
    name: oat milk
  butter:
    name: butter
    categories: [dairy]
    density: "0.911"
diets:
  vegan:
    forbid:
      categories: [dairy]
    substitutions:
      milk:
        - target: oat-milk
          confidence: 0.9
"#;

    fn messages(yaml: &str) -> Vec<String> {
        let config = parse_knowledge(yaml).unwrap();
        validate_knowledge(&config)
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    #[test]
    fn test_parser_parse_valid() {
        let config = parse_knowledge(BASE).unwrap();
        assert_eq!(config.name, "test");
        assert_eq!(config.ingredients.len(), 3);
        let errors = validate_knowledge(&config);
        assert!(
            errors.is_empty(),
            "unexpected errors: {:?}",
            errors.iter().map(|e| &e.message).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_parser_bad_version() {
        let yaml = BASE.replace("version: \"1.0\"", "version: \"2.0\"");
        assert!(messages(&yaml).iter().any(|m| m.contains("version")));
    }

    #[test]
    fn test_parser_bad_fallback_factor() {
        let yaml = format!("{}policy:\n  fallback_confidence_factor: 0\n", BASE);
        assert!(messages(&yaml)
            .iter()
            .any(|m| m.contains("fallback_confidence_factor")));
    }

    #[test]
    fn test_parser_alias_conflict() {
        let yaml = BASE.replace("name: oat milk", "name: oat milk\n    aliases: [Whole Milk]");
        let msgs = messages(&yaml);
        assert!(
            msgs.iter()
                .any(|m| m.contains("alias 'whole milk' maps to both 'milk' and 'oat-milk'")),
            "{:?}",
            msgs
        );
    }

    #[test]
    fn test_parser_option_for_allowed_source() {
        let yaml = BASE.replace("categories: [dairy]\n    substitutions:", "categories: [eggs]\n    substitutions:");
        assert!(messages(&yaml)
            .iter()
            .any(|m| m.contains("which it does not forbid")));
    }

    #[test]
    fn test_parser_target_forbidden_by_same_diet() {
        let yaml = BASE.replace("- target: oat-milk", "- target: butter");
        assert!(messages(&yaml)
            .iter()
            .any(|m| m.contains("forbidden by the same diet")));
    }

    #[test]
    fn test_parser_unknown_target() {
        let yaml = BASE.replace("- target: oat-milk", "- target: rice-milk");
        assert!(messages(&yaml)
            .iter()
            .any(|m| m.contains("unknown target ingredient")));
    }

    #[test]
    fn test_parser_duplicate_target() {
        let yaml = format!(
            "{}        - target: oat-milk\n          confidence: 0.5\n",
            BASE
        );
        assert!(messages(&yaml).iter().any(|m| m.contains("duplicate target")));
    }

    #[test]
    fn test_parser_confidence_range() {
        let yaml = BASE.replace("confidence: 0.9", "confidence: 1.5");
        assert!(messages(&yaml).iter().any(|m| m.contains("outside [0, 1]")));
    }

    #[test]
    fn test_parser_bad_ratio() {
        let zero = BASE.replace("confidence: 0.9", "confidence: 0.9\n          ratio: 0");
        assert!(messages(&zero).iter().any(|m| m.contains("must be positive")));

        let text = BASE.replace("confidence: 0.9", "confidence: 0.9\n          ratio: lots");
        assert!(messages(&text).iter().any(|m| m.contains("invalid amount")));
    }

    #[test]
    fn test_parser_unknown_unit() {
        let yaml = BASE.replace("confidence: 0.9", "confidence: 0.9\n          per: handful");
        assert!(messages(&yaml).iter().any(|m| m.contains("unknown unit 'handful'")));
    }

    #[test]
    fn test_parser_bad_density() {
        let yaml = BASE.replace("density: \"0.911\"", "density: \"-1\"");
        assert!(messages(&yaml).iter().any(|m| m.contains("density")));
    }

    #[test]
    fn test_parser_unknown_forbidden_ingredient() {
        let yaml = BASE.replace("categories: [dairy]\n    substitutions:", "categories: [dairy]\n      ingredients: [lard]\n    substitutions:");
        assert!(messages(&yaml)
            .iter()
            .any(|m| m.contains("forbids unknown ingredient 'lard'")));
    }

    #[test]
    fn test_parser_unused_category_is_not_error() {
        let yaml = BASE.replace("categories: [dairy]\n    substitutions:", "categories: [dairy, shellfish]\n    substitutions:");
        assert!(messages(&yaml).is_empty());
    }

    #[test]
    fn test_parser_diet_id_collision() {
        let yaml = format!("{}  Vegan:\n    forbid:\n      ingredients: [milk]\n", BASE);
        assert!(messages(&yaml)
            .iter()
            .any(|m| m.contains("both normalize to 'vegan'")));
    }

    #[test]
    fn test_parser_forbidden_ids_expands_categories() {
        let config = parse_knowledge(BASE).unwrap();
        let forbidden = forbidden_ids(&config, &config.diets["vegan"]);
        assert!(forbidden.contains("milk"));
        assert!(forbidden.contains("butter"));
        assert!(!forbidden.contains("oat-milk"));
    }

    #[test]
    fn test_parser_integrity_error_display() {
        let err = KnowledgeBaseIntegrityError {
            errors: vec![
                ValidationError {
                    message: "first".into(),
                },
                ValidationError {
                    message: "second".into(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("2 error(s)"));
        assert!(text.contains("- first"));
        assert!(text.contains("- second"));
    }

    #[test]
    fn test_parser_integrity_error_is_std_error() {
        let err = KnowledgeBaseIntegrityError::single("alias 'ap' names two ingredients");
        assert_eq!(
            err.to_string(),
            "knowledge base failed validation (1 error(s))\n  - alias 'ap' names two ingredients"
        );
        let boxed: Box<dyn std::error::Error> = Box::new(err.clone());
        assert_eq!(boxed.to_string(), err.to_string());

        let load: KnowledgeLoadError = err.into();
        assert!(matches!(load, KnowledgeLoadError::Integrity(_)));
        assert!(load.to_string().starts_with("knowledge base failed validation (1 error(s))"));
    }

    #[test]
    fn test_parser_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.yaml");
        std::fs::write(&path, BASE).unwrap();
        let config = parse_knowledge_file(&path).unwrap();
        assert_eq!(config.name, "test");
    }

    #[test]
    fn test_parser_missing_file() {
        let result = parse_knowledge_file(Path::new("/nonexistent/knowledge.yaml"));
        assert!(matches!(result, Err(KnowledgeLoadError::Io { .. })));
    }

    #[test]
    fn test_parser_parse_invalid_yaml() {
        let result = parse_knowledge("not: [valid: yaml: {{");
        assert!(matches!(result, Err(KnowledgeLoadError::Parse(_))));
    }

    #[test]
    fn test_parser_recipe_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recipe.yaml");
        std::fs::write(
            &path,
            "title: Toast\ningredients:\n  - quantity: 1\n    unit: slice\n    name: bread\n",
        )
        .unwrap();
        let recipe = parse_recipe_file(&path).unwrap();
        assert_eq!(recipe.title, "Toast");
        assert_eq!(recipe.ingredients[0].quantity.unit, "slice");
    }

    #[test]
    fn test_parser_recipe_negative_quantity() {
        let result = parse_recipe("title: X\ningredients:\n  - quantity: -2\n    name: eggs\n");
        assert!(matches!(result, Err(RecipeLoadError::Parse(_))));
    }
}
