//! Packaging-notation extraction.
//!
//! Turns free text such as `CREVETTES 16/20 TIGRE CRUES 2/5LB` or
//! `Caisse 25kg` into a billing value and unit. Six pattern families are
//! applied in priority order; every hit is kept for diagnostics and the
//! highest-priority hit becomes `best_match`.

use bigdecimal::BigDecimal;
use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::constants::{MeasureUnit, CONTAINER_KEYWORDS};
use crate::models::{FormatExtraction, FormatKind, FormatMatch};
use crate::numeric::{parse_token, trim_display};

const NUM: &str = r"(\d+(?:[.,]\d+)?)";
const WEIGHT_UNITS: &str = r"(KGS?|KILOS?|LBS?|OZ|GRAMMES?|GRAMS?|GRS?|G)";
const VOLUME_UNITS: &str = r"(ML|LITRES?|LITERS?|LT|L|GAL|FL\.?\s?OZ)";
const MEASURE_UNITS: &str = r"(KGS?|KILOS?|LBS?|OZ|GRAMMES?|GRAMS?|GRS?|G|ML|LITRES?|LITERS?|LT|L|GAL)";
const COUNT_UNITS: &str = r"(CT|PKS?|PCS?|EA|UN|CS|CASES?|DZ|DOZ(?:EN)?)";

static PACK_WEIGHT: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"(?i){NUM}\s*/\s*{NUM}\s*{MEASURE_UNITS}\b")));

static PACK_COUNT: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"(?i)(?:(\d+)\s*/\s*)?\b(\d+)\s*{COUNT_UNITS}\b")));

static MULTIPLIED: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"(?i){NUM}\s*[x×*]\s*{NUM}\s*{MEASURE_UNITS}\b")));

static EMBEDDED: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(
        r"(?i)\b({})\s*(?:DE\s+|D'|OF\s+)?{NUM}\s*{WEIGHT_UNITS}\b",
        CONTAINER_KEYWORDS.join("|")
    ))
});

static SIMPLE_WEIGHT: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"(?i){NUM}\s*{WEIGHT_UNITS}\b")));

static SIMPLE_VOLUME: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"(?i){NUM}\s*{VOLUME_UNITS}\b")));

fn compile(pattern: &str) -> Regex {
    // patterns are fixed at compile time; a failure here is a programming error
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid format pattern {pattern}: {e}"))
}

/// Extracts every packaging notation from `text`. Never fails.
pub fn extract_all_formats(text: &str) -> FormatExtraction {
    let mut formats = Vec::new();
    for kind in FormatKind::PRIORITY {
        formats.extend(extract_kind(kind, text));
    }
    let best_match = formats.first().cloned();
    FormatExtraction {
        found: best_match.is_some(),
        formats,
        best_match,
    }
}

/// Matches of a single family, in text order.
pub fn extract_kind(kind: FormatKind, text: &str) -> Vec<FormatMatch> {
    match kind {
        FormatKind::PackWeight => collect(&PACK_WEIGHT, text, pack_weight),
        FormatKind::PackCount => collect(&PACK_COUNT, text, pack_count),
        FormatKind::Multiplied => collect(&MULTIPLIED, text, multiplied),
        FormatKind::Embedded => collect(&EMBEDDED, text, embedded),
        FormatKind::SimpleWeight => collect(&SIMPLE_WEIGHT, text, simple_weight),
        FormatKind::SimpleVolume => collect(&SIMPLE_VOLUME, text, simple_volume),
    }
}

fn collect(
    regex: &Regex,
    text: &str,
    build: fn(&Captures) -> Option<FormatMatch>,
) -> Vec<FormatMatch> {
    regex.captures_iter(text).filter_map(|c| build(&c)).collect()
}

/// Best match of the text, if any.
pub fn best_format(text: &str) -> Option<FormatMatch> {
    FormatKind::PRIORITY
        .into_iter()
        .find_map(|kind| extract_kind(kind, text).into_iter().next())
}

fn raw(caps: &Captures) -> String {
    caps.get(0).map(|m| m.as_str().trim().to_string()).unwrap_or_default()
}

fn number(caps: &Captures, group: usize) -> Option<BigDecimal> {
    caps.get(group).and_then(|m| parse_token(m.as_str()))
}

fn unit(caps: &Captures, group: usize) -> Option<MeasureUnit> {
    caps.get(group).and_then(|m| MeasureUnit::from_token(m.as_str()))
}

fn build(
    kind: FormatKind,
    raw: String,
    components: Vec<BigDecimal>,
    unit: MeasureUnit,
    billing_value: BigDecimal,
    billing_unit: MeasureUnit,
    formula: String,
) -> FormatMatch {
    // billing_value is already in billing_unit (dozens arrive as pieces)
    let normalized_value = &billing_value * billing_unit.base_factor();
    FormatMatch {
        kind,
        raw,
        components,
        unit,
        billing_value,
        billing_unit,
        normalized_value,
        formula,
    }
}

fn pack_weight(caps: &Captures) -> Option<FormatMatch> {
    let packs = number(caps, 1)?;
    let size = number(caps, 2)?;
    let unit = unit(caps, 3)?;
    let billing = &packs * &size;
    let formula = format!(
        "{} × {} {unit} = {} {unit}",
        trim_display(&packs),
        trim_display(&size),
        trim_display(&billing)
    );
    Some(build(
        FormatKind::PackWeight,
        raw(caps),
        vec![packs, size],
        unit,
        billing,
        unit,
        formula,
    ))
}

fn pack_count(caps: &Captures) -> Option<FormatMatch> {
    let outer = number(caps, 1);
    let inner = number(caps, 2)?;
    let unit = unit(caps, 3)?;
    let per_unit = unit.base_factor().clone();
    let mut billing = &inner * &per_unit;
    let mut components = vec![inner.clone()];
    let mut formula = if unit == MeasureUnit::Dozen {
        format!("{} DZ × 12", trim_display(&inner))
    } else {
        format!("{} {unit}", trim_display(&inner))
    };
    if let Some(outer) = outer {
        billing = &billing * &outer;
        formula = format!("{} × {formula}", trim_display(&outer));
        components.insert(0, outer);
    }
    formula = format!("{formula} = {} CT", trim_display(&billing));
    Some(build(
        FormatKind::PackCount,
        raw(caps),
        components,
        unit,
        billing,
        MeasureUnit::Count,
        formula,
    ))
}

fn multiplied(caps: &Captures) -> Option<FormatMatch> {
    let count = number(caps, 1)?;
    let size = number(caps, 2)?;
    let unit = unit(caps, 3)?;
    let billing = &count * &size;
    let formula = format!(
        "{} x {} {unit} = {} {unit}",
        trim_display(&count),
        trim_display(&size),
        trim_display(&billing)
    );
    Some(build(
        FormatKind::Multiplied,
        raw(caps),
        vec![count, size],
        unit,
        billing,
        unit,
        formula,
    ))
}

fn embedded(caps: &Captures) -> Option<FormatMatch> {
    let container = caps.get(1).map(|m| m.as_str().to_uppercase()).unwrap_or_default();
    let weight = number(caps, 2)?;
    let unit = unit(caps, 3)?;
    let formula = format!("{container} {} {unit}", trim_display(&weight));
    Some(build(
        FormatKind::Embedded,
        raw(caps),
        vec![weight.clone()],
        unit,
        weight,
        unit,
        formula,
    ))
}

fn simple_weight(caps: &Captures) -> Option<FormatMatch> {
    simple(FormatKind::SimpleWeight, caps)
}

fn simple_volume(caps: &Captures) -> Option<FormatMatch> {
    simple(FormatKind::SimpleVolume, caps)
}

fn simple(kind: FormatKind, caps: &Captures) -> Option<FormatMatch> {
    let value = number(caps, 1)?;
    let unit = unit(caps, 2)?;
    let formula = format!("{} {unit}", trim_display(&value));
    Some(build(kind, raw(caps), vec![value.clone()], unit, value, unit, formula))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn pack_weight_multiplies_packs_by_size() {
        let ex = extract_all_formats("CAROTTE BÉBÉ PELÉE 4/5LB");
        assert!(ex.found);
        let best = ex.best_match.unwrap();
        assert_eq!(best.kind, FormatKind::PackWeight);
        assert_eq!(best.billing_value, d("20"));
        assert_eq!(best.billing_unit, MeasureUnit::Pound);
        assert_eq!(best.normalized_value, d("9071.84"));
        assert_eq!(best.formula, "4 × 5 LB = 20 LB");
    }

    #[test]
    fn pack_weight_accepts_decimal_comma() {
        let best = best_format("CALMAR 2/2,5KG").unwrap();
        assert_eq!(best.billing_value, d("5"));
        assert_eq!(best.unit, MeasureUnit::Kilogram);
    }

    #[test]
    fn pack_count_handles_dozen_and_outer_packs() {
        let best = best_format("HUÎTRES MALPEQUE 100CT").unwrap();
        assert_eq!(best.kind, FormatKind::PackCount);
        assert_eq!(best.billing_value, d("100"));
        assert_eq!(best.normalized_value, d("100"));

        let best = best_format("CANARD CUISSE CONFITE 4/12PC").unwrap();
        assert_eq!(best.billing_value, d("48"));
        assert_eq!(best.normalized_value, d("48"));

        let best = best_format("OEUFS 2 DZ").unwrap();
        assert_eq!(best.billing_value, d("24"));
        assert_eq!(best.billing_unit, MeasureUnit::Count);
        assert_eq!(best.normalized_value, d("24"));

        let best = best_format("OEUFS 3/2DZ").unwrap();
        assert_eq!(best.billing_value, d("72"));
        assert_eq!(best.normalized_value, d("72"));
        assert_eq!(best.formula, "3 × 2 DZ × 12 = 72 CT");
    }

    #[test]
    fn multiplied_and_embedded() {
        let best = best_format("JUS 6 x 500ML").unwrap();
        assert_eq!(best.kind, FormatKind::Multiplied);
        assert_eq!(best.billing_value, d("3000"));
        assert_eq!(best.normalized_value, d("3000"));

        let best = best_format("Tomates Caisse 25kg").unwrap();
        assert_eq!(best.kind, FormatKind::Embedded);
        assert_eq!(best.billing_value, d("25"));
        assert_eq!(best.formula, "CAISSE 25 KG");
    }

    #[test]
    fn simple_weight_and_volume() {
        let best = best_format("PORC BACON TRANCHÉ 5KG").unwrap();
        assert_eq!(best.kind, FormatKind::SimpleWeight);
        assert_eq!(best.normalized_value, d("5000"));

        let best = best_format("HUILE OLIVE 3 L").unwrap();
        assert_eq!(best.kind, FormatKind::SimpleVolume);
        assert_eq!(best.unit, MeasureUnit::Litre);
    }

    #[test]
    fn all_matches_are_retained() {
        let ex = extract_all_formats("CREVETTES 2/5LB");
        let kinds: Vec<FormatKind> = ex.formats.iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![FormatKind::PackWeight, FormatKind::SimpleWeight]);
        assert_eq!(ex.first_of(FormatKind::SimpleWeight).unwrap().billing_value, d("5"));
    }

    #[test]
    fn unmatched_text_is_not_found() {
        let ex = extract_all_formats("SAC SOUS-VIDE 8X12");
        assert!(!ex.found);
        assert!(ex.formats.is_empty());
        assert!(ex.best_match.is_none());
        assert!(!extract_all_formats("").found);
    }
}
