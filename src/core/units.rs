//! Unit conversion and exact amount arithmetic.
//!
//! Amounts are `Ratio<i128>` from parse to render; nothing is rounded until
//! [`render_amount`]. Units convert within their family through exact base
//! factors (millilitres for volume, grams for weight, one for count). Volume
//! and weight meet only through a density in grams per millilitre. Units in
//! the `Other` family (pinch, can, stick, any unknown unit) convert only to
//! themselves.

use super::types::Quantity;
use num_rational::Ratio;
use num_traits::{CheckedAdd, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Exact non-negative amount.
pub type Amount = Ratio<i128>;

/// Unit family. Conversion never crosses families without a density.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitFamily {
    Volume,
    Weight,
    Count,
    Other,
}

impl fmt::Display for UnitFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Volume => write!(f, "volume"),
            Self::Weight => write!(f, "weight"),
            Self::Count => write!(f, "count"),
            Self::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("invalid amount '{0}'")]
    InvalidAmount(String),

    #[error("amount must not be negative: {0}")]
    NegativeAmount(String),

    #[error("unknown unit '{0}'")]
    UnknownUnit(String),

    #[error("cannot convert '{from}' ({from_family}) to '{to}' ({to_family}) without a density")]
    IncompatibleUnits {
        from: String,
        from_family: UnitFamily,
        to: String,
        to_family: UnitFamily,
    },
}

// ============================================================================
// Unit table
// ============================================================================

/// A known unit: canonical symbol, family, base factor as (numer, denom).
#[derive(Debug)]
pub struct UnitDef {
    pub symbol: &'static str,
    pub family: UnitFamily,
    factor: (i128, i128),
    aliases: &'static [&'static str],
}

impl UnitDef {
    /// Size of one unit in the family's base (ml, g, or 1); None for Other.
    pub fn base_factor(&self) -> Option<Amount> {
        match self.family {
            UnitFamily::Other => None,
            _ => Some(Amount::new(self.factor.0, self.factor.1)),
        }
    }
}

// US customary volumes are exact multiples of the teaspoon.
const TSP_E11: i128 = 492_892_159_375;
const E11: i128 = 100_000_000_000;
const OZ_E9: i128 = 28_349_523_125;
const E9: i128 = 1_000_000_000;

static UNITS: &[UnitDef] = &[
    // Volume (base: ml)
    UnitDef {
        symbol: "ml",
        family: UnitFamily::Volume,
        factor: (1, 1),
        aliases: &["milliliter", "milliliters", "millilitre", "millilitres"],
    },
    UnitDef {
        symbol: "l",
        family: UnitFamily::Volume,
        factor: (1000, 1),
        aliases: &["liter", "liters", "litre", "litres"],
    },
    UnitDef {
        symbol: "tsp",
        family: UnitFamily::Volume,
        factor: (TSP_E11, E11),
        aliases: &["teaspoon", "teaspoons", "tsps"],
    },
    UnitDef {
        symbol: "tbsp",
        family: UnitFamily::Volume,
        factor: (TSP_E11 * 3, E11),
        aliases: &["tablespoon", "tablespoons", "tbsps", "tbs", "tbl"],
    },
    UnitDef {
        symbol: "fl oz",
        family: UnitFamily::Volume,
        factor: (TSP_E11 * 6, E11),
        aliases: &["fluid ounce", "fluid ounces", "fl. oz", "floz"],
    },
    UnitDef {
        symbol: "cup",
        family: UnitFamily::Volume,
        factor: (TSP_E11 * 48, E11),
        aliases: &["cups", "c"],
    },
    UnitDef {
        symbol: "pint",
        family: UnitFamily::Volume,
        factor: (TSP_E11 * 96, E11),
        aliases: &["pints", "pt"],
    },
    UnitDef {
        symbol: "quart",
        family: UnitFamily::Volume,
        factor: (TSP_E11 * 192, E11),
        aliases: &["quarts", "qt"],
    },
    UnitDef {
        symbol: "gallon",
        family: UnitFamily::Volume,
        factor: (TSP_E11 * 768, E11),
        aliases: &["gallons", "gal"],
    },
    // Weight (base: g)
    UnitDef {
        symbol: "mg",
        family: UnitFamily::Weight,
        factor: (1, 1000),
        aliases: &["milligram", "milligrams"],
    },
    UnitDef {
        symbol: "g",
        family: UnitFamily::Weight,
        factor: (1, 1),
        aliases: &["gram", "grams", "gr"],
    },
    UnitDef {
        symbol: "kg",
        family: UnitFamily::Weight,
        factor: (1000, 1),
        aliases: &["kilogram", "kilograms", "kilo", "kilos"],
    },
    UnitDef {
        symbol: "oz",
        family: UnitFamily::Weight,
        factor: (OZ_E9, E9),
        aliases: &["ounce", "ounces"],
    },
    UnitDef {
        symbol: "lb",
        family: UnitFamily::Weight,
        factor: (OZ_E9 * 16, E9),
        aliases: &["lbs", "pound", "pounds"],
    },
    // Count (base: 1)
    UnitDef {
        symbol: "",
        family: UnitFamily::Count,
        factor: (1, 1),
        aliases: &["each", "ea", "count", "whole", "piece", "pieces", "pc", "pcs"],
    },
    UnitDef {
        symbol: "large",
        family: UnitFamily::Count,
        factor: (1, 1),
        aliases: &["lg"],
    },
    UnitDef {
        symbol: "medium",
        family: UnitFamily::Count,
        factor: (1, 1),
        aliases: &["med"],
    },
    UnitDef {
        symbol: "small",
        family: UnitFamily::Count,
        factor: (1, 1),
        aliases: &["sm"],
    },
    UnitDef {
        symbol: "clove",
        family: UnitFamily::Count,
        factor: (1, 1),
        aliases: &["cloves"],
    },
    UnitDef {
        symbol: "slice",
        family: UnitFamily::Count,
        factor: (1, 1),
        aliases: &["slices"],
    },
    UnitDef {
        symbol: "leaf",
        family: UnitFamily::Count,
        factor: (1, 1),
        aliases: &["leaves"],
    },
    UnitDef {
        symbol: "dozen",
        family: UnitFamily::Count,
        factor: (12, 1),
        aliases: &["dozens", "doz"],
    },
    // Other: known, but convertible only to themselves
    UnitDef {
        symbol: "pinch",
        family: UnitFamily::Other,
        factor: (1, 1),
        aliases: &["pinches"],
    },
    UnitDef {
        symbol: "dash",
        family: UnitFamily::Other,
        factor: (1, 1),
        aliases: &["dashes"],
    },
    UnitDef {
        symbol: "can",
        family: UnitFamily::Other,
        factor: (1, 1),
        aliases: &["cans", "tin", "tins"],
    },
    UnitDef {
        symbol: "package",
        family: UnitFamily::Other,
        factor: (1, 1),
        aliases: &["packages", "pkg", "packet", "packets"],
    },
    UnitDef {
        symbol: "stick",
        family: UnitFamily::Other,
        factor: (1, 1),
        aliases: &["sticks"],
    },
    UnitDef {
        symbol: "bunch",
        family: UnitFamily::Other,
        factor: (1, 1),
        aliases: &["bunches"],
    },
    UnitDef {
        symbol: "sprig",
        family: UnitFamily::Other,
        factor: (1, 1),
        aliases: &["sprigs"],
    },
    UnitDef {
        symbol: "to taste",
        family: UnitFamily::Other,
        factor: (1, 1),
        aliases: &[],
    },
];

fn clean_unit(raw: &str) -> String {
    raw.trim()
        .trim_end_matches('.')
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Find a unit by symbol or alias (case-insensitive).
pub fn lookup_unit(raw: &str) -> Option<&'static UnitDef> {
    let cleaned = clean_unit(raw);
    UNITS
        .iter()
        .find(|u| u.symbol == cleaned || u.aliases.contains(&cleaned.as_str()))
}

/// Canonical symbol for a unit. Unknown units are kept, cleaned.
pub fn normalize_unit(raw: &str) -> String {
    match lookup_unit(raw) {
        Some(def) => def.symbol.to_string(),
        None => clean_unit(raw),
    }
}

/// Family of a unit. Unknown units belong to `Other`.
pub fn family_of(unit: &str) -> UnitFamily {
    lookup_unit(unit).map_or(UnitFamily::Other, |u| u.family)
}

/// Canonical symbol, or an error for a unit the table does not know.
pub fn require_unit(raw: &str) -> Result<&'static str, ConversionError> {
    lookup_unit(raw)
        .map(|u| u.symbol)
        .ok_or_else(|| ConversionError::UnknownUnit(raw.to_string()))
}

// ============================================================================
// Parsing and rendering
// ============================================================================

const VULGAR_FRACTIONS: &[(char, &str)] = &[
    ('½', "1/2"),
    ('⅓', "1/3"),
    ('⅔', "2/3"),
    ('¼', "1/4"),
    ('¾', "3/4"),
    ('⅕', "1/5"),
    ('⅖', "2/5"),
    ('⅗', "3/5"),
    ('⅘', "4/5"),
    ('⅙', "1/6"),
    ('⅚', "5/6"),
    ('⅛', "1/8"),
    ('⅜', "3/8"),
    ('⅝', "5/8"),
    ('⅞', "7/8"),
];

fn expand_vulgar(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match VULGAR_FRACTIONS.iter().find(|(v, _)| *v == c) {
            Some((_, ascii)) => {
                out.push(' ');
                out.push_str(ascii);
            }
            None => out.push(c),
        }
    }
    out
}

fn parse_digits(digits: &str, original: &str) -> Result<i128, ConversionError> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ConversionError::InvalidAmount(original.to_string()));
    }
    digits
        .parse::<i128>()
        .map_err(|_| ConversionError::InvalidAmount(original.to_string()))
}

fn parse_token(token: &str, original: &str) -> Result<Amount, ConversionError> {
    if let Some((numer, denom)) = token.split_once('/') {
        let n = parse_digits(numer, original)?;
        let d = parse_digits(denom, original)?;
        if d == 0 {
            return Err(ConversionError::InvalidAmount(original.to_string()));
        }
        return Ok(Amount::new(n, d));
    }
    if let Some((whole, frac)) = token.split_once('.') {
        if frac.len() > 18 {
            return Err(ConversionError::InvalidAmount(original.to_string()));
        }
        let whole = if whole.is_empty() {
            0
        } else {
            parse_digits(whole, original)?
        };
        let scale = 10_i128.pow(frac.len() as u32);
        let frac = if frac.is_empty() {
            0
        } else {
            parse_digits(frac, original)?
        };
        let numer = whole
            .checked_mul(scale)
            .and_then(|n| n.checked_add(frac))
            .ok_or_else(|| ConversionError::InvalidAmount(original.to_string()))?;
        return Ok(Amount::new(numer, scale));
    }
    Ok(Amount::from_integer(parse_digits(token, original)?))
}

/// Parse an integer, decimal, fraction, mixed number, or unicode fraction.
///
/// `"2 1/4"`, `"2¼"`, `"0.25"`, `"¾"` and `"3"` all parse exactly.
pub fn parse_amount(text: &str) -> Result<Amount, ConversionError> {
    let trimmed = text.trim();
    if trimmed.starts_with('-') {
        return Err(ConversionError::NegativeAmount(trimmed.to_string()));
    }
    let expanded = expand_vulgar(trimmed);
    let tokens: Vec<&str> = expanded.split_whitespace().collect();
    match tokens.as_slice() {
        [single] => parse_token(single, trimmed),
        [whole, frac] => {
            // Mixed number: integer followed by a proper fraction
            if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.contains('/') {
                return Err(ConversionError::InvalidAmount(trimmed.to_string()));
            }
            let whole = parse_token(whole, trimmed)?;
            let frac = parse_token(frac, trimmed)?;
            if frac >= Amount::from_integer(1) {
                return Err(ConversionError::InvalidAmount(trimmed.to_string()));
            }
            whole
                .checked_add(&frac)
                .ok_or_else(|| ConversionError::InvalidAmount(trimmed.to_string()))
        }
        _ => Err(ConversionError::InvalidAmount(trimmed.to_string())),
    }
}

/// Approximate value for display and statistics.
pub fn to_f64(amount: &Amount) -> f64 {
    *amount.numer() as f64 / *amount.denom() as f64
}

/// Human-readable form: integers as-is, mixed fractions for small
/// denominators, otherwise two decimals without trailing zeros.
pub fn render_amount(amount: &Amount) -> String {
    if amount.is_integer() {
        return amount.to_integer().to_string();
    }
    if *amount.denom() <= 16 {
        let whole = amount.trunc().to_integer();
        let frac = amount.fract();
        return if whole == 0 {
            format!("{}/{}", frac.numer(), frac.denom())
        } else {
            format!("{} {}/{}", whole, frac.numer(), frac.denom())
        };
    }
    let fixed = format!("{:.2}", to_f64(amount));
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

// ============================================================================
// Conversion
// ============================================================================

fn incompatible(quantity: &Quantity, target: &str) -> ConversionError {
    ConversionError::IncompatibleUnits {
        from: quantity.unit.clone(),
        from_family: family_of(&quantity.unit),
        to: target.to_string(),
        to_family: family_of(target),
    }
}

/// Convert within a unit family. Exact.
pub fn convert(quantity: &Quantity, target_unit: &str) -> Result<Quantity, ConversionError> {
    convert_with_density(quantity, target_unit, None)
}

/// Convert, bridging volume and weight through `density` (g/ml) when given.
pub fn convert_with_density(
    quantity: &Quantity,
    target_unit: &str,
    density: Option<&Amount>,
) -> Result<Quantity, ConversionError> {
    let target = normalize_unit(target_unit);
    if quantity.unit == target {
        return Ok(quantity.clone());
    }
    let (Some(from), Some(to)) = (lookup_unit(&quantity.unit), lookup_unit(&target)) else {
        return Err(incompatible(quantity, &target));
    };
    let (Some(from_factor), Some(to_factor)) = (from.base_factor(), to.base_factor()) else {
        return Err(incompatible(quantity, &target));
    };
    let density = density.filter(|d| **d > Amount::zero());

    let amount = match (from.family, to.family, density) {
        (a, b, _) if a == b => quantity.amount * from_factor / to_factor,
        (UnitFamily::Volume, UnitFamily::Weight, Some(d)) => {
            quantity.amount * from_factor * d / to_factor
        }
        (UnitFamily::Weight, UnitFamily::Volume, Some(d)) => {
            quantity.amount * from_factor / d / to_factor
        }
        _ => return Err(incompatible(quantity, &target)),
    };
    Ok(Quantity {
        amount,
        unit: target,
    })
}

/// Multiply a quantity by an exact ratio, keeping its unit.
pub fn scale(quantity: &Quantity, ratio: &Amount) -> Quantity {
    Quantity {
        amount: quantity.amount * ratio,
        unit: quantity.unit.clone(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn q(amount: &str, unit: &str) -> Quantity {
        Quantity::parse(amount, unit).unwrap()
    }

    #[test]
    fn test_units_parse_forms() {
        assert_eq!(parse_amount("3").unwrap(), Amount::from_integer(3));
        assert_eq!(parse_amount("2 1/4").unwrap(), Amount::new(9, 4));
        assert_eq!(parse_amount("0.25").unwrap(), Amount::new(1, 4));
        assert_eq!(parse_amount(".5").unwrap(), Amount::new(1, 2));
        assert_eq!(parse_amount("3/4").unwrap(), Amount::new(3, 4));
        assert_eq!(parse_amount("½").unwrap(), Amount::new(1, 2));
        assert_eq!(parse_amount("1½").unwrap(), Amount::new(3, 2));
        assert_eq!(parse_amount("1 ½").unwrap(), Amount::new(3, 2));
        assert_eq!(parse_amount("  2  ").unwrap(), Amount::from_integer(2));
    }

    #[test]
    fn test_units_parse_rejects() {
        assert!(matches!(
            parse_amount("-1"),
            Err(ConversionError::NegativeAmount(_))
        ));
        for bad in ["", "two", "1/0", "1 2", "1/2 3", "2 5/4", "1.2.3", "1 1 1/2"] {
            assert!(
                matches!(parse_amount(bad), Err(ConversionError::InvalidAmount(_))),
                "expected invalid: {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_units_parse_rejects_out_of_range() {
        let huge = "170141183460469231731687303715884105727";
        assert_eq!(parse_amount(huge).unwrap(), Amount::from_integer(i128::MAX));
        for bad in [
            format!("{}.5", huge),
            "1000000000000000000000.000000000000000001".to_string(),
            format!("{} 1/2", huge),
            format!("{} 1/1000000000000000000000", huge),
        ] {
            assert!(
                matches!(parse_amount(&bad), Err(ConversionError::InvalidAmount(_))),
                "expected invalid: {:?}",
                bad
            );
        }
        assert_eq!(
            parse_amount("1000000000000000000.5").unwrap(),
            Amount::new(2_000_000_000_000_000_001, 2)
        );
    }

    #[test]
    fn test_units_decimal_is_exact() {
        assert_eq!(parse_amount("0.1").unwrap() * Amount::from_integer(3), Amount::new(3, 10));
    }

    #[test]
    fn test_units_render() {
        assert_eq!(render_amount(&Amount::from_integer(2)), "2");
        assert_eq!(render_amount(&Amount::new(9, 4)), "2 1/4");
        assert_eq!(render_amount(&Amount::new(3, 8)), "3/8");
        assert_eq!(render_amount(&Amount::new(1, 3)), "1/3");
        assert_eq!(render_amount(&Amount::new(1, 100)), "0.01");
        assert_eq!(render_amount(&Amount::new(1, 20)), "0.05");
        assert_eq!(render_amount(&Amount::new(101, 20)), "5.05");
    }

    #[test]
    fn test_units_normalize_aliases() {
        assert_eq!(normalize_unit("Tablespoons"), "tbsp");
        assert_eq!(normalize_unit("tbsp."), "tbsp");
        assert_eq!(normalize_unit("fluid  ounces"), "fl oz");
        assert_eq!(normalize_unit("each"), "");
        assert_eq!(normalize_unit("LBS"), "lb");
        assert_eq!(normalize_unit("handful"), "handful");
    }

    #[test]
    fn test_units_families() {
        assert_eq!(family_of("cup"), UnitFamily::Volume);
        assert_eq!(family_of("g"), UnitFamily::Weight);
        assert_eq!(family_of(""), UnitFamily::Count);
        assert_eq!(family_of("clove"), UnitFamily::Count);
        assert_eq!(family_of("pinch"), UnitFamily::Other);
        assert_eq!(family_of("handful"), UnitFamily::Other);
    }

    #[test]
    fn test_units_require_unit() {
        assert_eq!(require_unit("cups").unwrap(), "cup");
        assert!(matches!(
            require_unit("handful"),
            Err(ConversionError::UnknownUnit(_))
        ));
    }

    #[test]
    fn test_units_cup_to_tbsp() {
        let out = convert(&q("1", "cup"), "tbsp").unwrap();
        assert_eq!(out.amount, Amount::from_integer(16));
        assert_eq!(out.unit, "tbsp");
    }

    #[test]
    fn test_units_tsp_to_ml_exact() {
        let out = convert(&q("1", "tsp"), "ml").unwrap();
        assert_eq!(out.amount, Amount::new(TSP_E11, E11));
    }

    #[test]
    fn test_units_lb_to_g() {
        let out = convert(&q("1", "lb"), "g").unwrap();
        assert_eq!(out.amount, Amount::new(45_359_237, 100_000));
    }

    #[test]
    fn test_units_dozen_to_each() {
        let out = convert(&q("1/2", "dozen"), "each").unwrap();
        assert_eq!(out.amount, Amount::from_integer(6));
        assert_eq!(out.unit, "");
    }

    #[test]
    fn test_units_cross_family_needs_density() {
        let err = convert(&q("1", "cup"), "g").unwrap_err();
        assert!(matches!(
            err,
            ConversionError::IncompatibleUnits {
                from_family: UnitFamily::Volume,
                to_family: UnitFamily::Weight,
                ..
            }
        ));
    }

    #[test]
    fn test_units_density_bridge() {
        let water = Amount::from_integer(1);
        let out = convert_with_density(&q("100", "ml"), "g", Some(&water)).unwrap();
        assert_eq!(out.amount, Amount::from_integer(100));

        let honey = Amount::new(7, 5);
        let grams = convert_with_density(&q("10", "ml"), "g", Some(&honey)).unwrap();
        assert_eq!(grams.amount, Amount::from_integer(14));
        let back = convert_with_density(&grams, "ml", Some(&honey)).unwrap();
        assert_eq!(back.amount, Amount::from_integer(10));
    }

    #[test]
    fn test_units_zero_density_refused() {
        let zero = Amount::zero();
        assert!(convert_with_density(&q("1", "cup"), "g", Some(&zero)).is_err());
    }

    #[test]
    fn test_units_other_family_identity_only() {
        assert_eq!(convert(&q("1", "pinch"), "pinch").unwrap().amount, Amount::from_integer(1));
        assert!(convert(&q("1", "pinch"), "tsp").is_err());
        assert!(convert(&q("1", "stick"), "can").is_err());
        assert!(convert(&q("1", "handful"), "cup").is_err());
    }

    #[test]
    fn test_units_count_to_volume_refused() {
        assert!(convert_with_density(&q("2", ""), "cup", Some(&Amount::from_integer(1))).is_err());
    }

    #[test]
    fn test_units_scale() {
        let out = scale(&q("2", "cup"), &Amount::new(3, 4));
        assert_eq!(out.amount, Amount::new(3, 2));
        assert_eq!(out.unit, "cup");
    }

    const CONVERTIBLE: &[&str] = &[
        "ml", "l", "tsp", "tbsp", "fl oz", "cup", "pint", "quart", "gallon",
    ];
    const WEIGHTS: &[&str] = &["mg", "g", "kg", "oz", "lb"];

    proptest! {
        #[test]
        fn prop_units_scaled_roundtrip_exact(
            numer in 0i128..10_000,
            denom in 1i128..64,
            r_numer in 1i128..20,
            r_denom in 1i128..20,
            from in prop::sample::select(CONVERTIBLE),
            to in prop::sample::select(CONVERTIBLE),
        ) {
            let original = Quantity::new(Amount::new(numer, denom), from).unwrap();
            let ratio = Amount::new(r_numer, r_denom);
            let scaled = scale(&original, &ratio);
            let there = convert(&scaled, to).unwrap();
            let back = convert(&there, from).unwrap();
            prop_assert_eq!(back.amount, original.amount * ratio);
        }

        #[test]
        fn prop_units_weight_roundtrip_exact(
            numer in 0i128..10_000,
            denom in 1i128..64,
            from in prop::sample::select(WEIGHTS),
            to in prop::sample::select(WEIGHTS),
        ) {
            let original = Quantity::new(Amount::new(numer, denom), from).unwrap();
            let back = convert(&convert(&original, to).unwrap(), from).unwrap();
            prop_assert_eq!(back, original);
        }

        #[test]
        fn prop_units_parse_render_integer(n in 0i128..1_000_000) {
            let text = n.to_string();
            let amount = parse_amount(&text).unwrap();
            prop_assert_eq!(render_amount(&amount), text);
        }
    }
}
