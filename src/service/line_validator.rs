//! Line-level arithmetic: which interpretation of B makes `B × P = T` hold.

use bigdecimal::{BigDecimal, One, Zero};

use crate::constants::QUANTITY_SCALE;
use crate::models::{
    DerivedValue, FormatExtraction, FormatKind, FormulaAttempt, FormulaKind, LineFields,
    LineValidation, NumericTriple, TripleCheck, TripleField, ValidationStatus,
};
use crate::numeric::{round_money, trim_display};
use crate::service::format_extractor::extract_all_formats;
use crate::tolerance::{compare, ToleranceModel};

/// A candidate billing value together with how it was obtained.
struct Candidate {
    label: String,
    value: BigDecimal,
}

/// Tries every formula kind in catalogue order and stops at the first
/// candidate that reproduces the declared total.
pub fn find_valid_formula(fields: &LineFields, tolerances: &ToleranceModel) -> LineValidation {
    let (price, total) = match priced(fields) {
        Ok(pair) => pair,
        Err(skipped) => return skipped,
    };

    let formats = fields
        .description
        .as_deref()
        .map(extract_all_formats)
        .unwrap_or_default();

    let mut all_results = Vec::new();
    for kind in FormulaKind::CATALOGUE {
        for candidate in candidates(kind, fields, &formats) {
            let attempt = attempt(kind, candidate, price, total, tolerances);
            let valid = attempt.is_valid;
            all_results.push(attempt);
            if valid {
                return LineValidation {
                    found: true,
                    status: ValidationStatus::Valid,
                    best_match: all_results.last().cloned(),
                    all_results,
                    reason: None,
                };
            }
        }
    }

    if all_results.is_empty() {
        return LineValidation::skipped("insufficient data: no billing value candidate");
    }
    let best_match = all_results
        .iter()
        .min_by(|a, b| a.difference.cmp(&b.difference))
        .cloned();
    LineValidation {
        found: false,
        status: ValidationStatus::Invalid,
        best_match,
        all_results,
        reason: Some("no formula reproduces the line total".to_string()),
    }
}

/// Checks a line whose billing value was fixed upstream (a solved column
/// mapping put it in `billing_quantity`).
pub fn validate_mapped_line(
    fields: &LineFields,
    kind: FormulaKind,
    label: &str,
    tolerances: &ToleranceModel,
) -> LineValidation {
    let (price, total) = match priced(fields) {
        Ok(pair) => pair,
        Err(skipped) => return skipped,
    };
    let Some(billing) = fields.billing_quantity.clone() else {
        return LineValidation::skipped("insufficient data: no billing value under this mapping");
    };
    let candidate = Candidate {
        label: label.to_string(),
        value: billing,
    };
    let attempt = attempt(kind, candidate, price, total, tolerances);
    let valid = attempt.is_valid;
    LineValidation {
        found: valid,
        status: if valid {
            ValidationStatus::Valid
        } else {
            ValidationStatus::Invalid
        },
        best_match: Some(attempt.clone()),
        all_results: vec![attempt],
        reason: (!valid).then(|| "mapped billing value does not reproduce the line total".to_string()),
    }
}

fn priced(fields: &LineFields) -> Result<(&BigDecimal, &BigDecimal), LineValidation> {
    let (Some(price), Some(total)) = (&fields.unit_price, &fields.total_price) else {
        return Err(LineValidation::skipped(
            "insufficient data: unit price and total are required",
        ));
    };
    if price.is_zero() || total.is_zero() {
        return Err(LineValidation::skipped("zero price or total (sample or free goods)"));
    }
    Ok((price, total))
}

fn attempt(
    kind: FormulaKind,
    candidate: Candidate,
    price: &BigDecimal,
    total: &BigDecimal,
    tolerances: &ToleranceModel,
) -> FormulaAttempt {
    let check = validate_line(&candidate.value, price, total, tolerances);
    FormulaAttempt {
        formula_type: kind,
        label: candidate.label,
        billing_value: candidate.value,
        unit_price: price.clone(),
        calculated: check.calculated,
        expected: check.expected,
        difference: check.difference,
        tolerance: check.tolerance,
        is_valid: check.is_valid,
    }
}

/// Candidate B values one formula kind can offer for this line.
fn candidates(kind: FormulaKind, fields: &LineFields, formats: &FormatExtraction) -> Vec<Candidate> {
    let mut out = Vec::new();
    let quantity = fields.quantity.as_ref();
    match kind {
        FormulaKind::BillingQuantity => {
            if let Some(bq) = &fields.billing_quantity {
                push(&mut out, "billing_quantity".to_string(), bq.clone());
            }
        }
        FormulaKind::PackWeight => {
            if let (Some(count), Some(weight)) = (&fields.pack_count, &fields.pack_weight) {
                let per_case = count * weight;
                if let Some(q) = quantity.filter(|q| !q.is_one()) {
                    push(&mut out, "quantity × pack_count × pack_weight".to_string(), q * &per_case);
                }
                push(&mut out, "pack_count × pack_weight".to_string(), per_case);
            }
            for m in formats.all_of(FormatKind::PackWeight).chain(formats.all_of(FormatKind::Multiplied)) {
                with_quantity(&mut out, &m.formula, &m.billing_value, quantity);
            }
        }
        FormulaKind::PackCount => {
            if let (Some(q), Some(count)) = (quantity, &fields.pack_count) {
                push(&mut out, "quantity × pack_count".to_string(), q * count);
            }
            for m in formats.all_of(FormatKind::PackCount) {
                with_quantity(&mut out, &m.formula, &m.billing_value, quantity);
            }
        }
        FormulaKind::EmbeddedWeight => {
            for m in formats.all_of(FormatKind::Embedded) {
                with_quantity(&mut out, &m.formula, &m.billing_value, quantity);
            }
        }
        FormulaKind::SimpleWeight => {
            if let Some(w) = &fields.weight {
                push(&mut out, "weight".to_string(), w.clone());
            }
            for m in formats.all_of(FormatKind::SimpleWeight) {
                with_quantity(&mut out, &m.formula, &m.billing_value, quantity);
            }
        }
        FormulaKind::SimpleVolume => {
            if let Some(v) = &fields.volume {
                push(&mut out, "volume".to_string(), v.clone());
            }
            for m in formats.all_of(FormatKind::SimpleVolume) {
                with_quantity(&mut out, &m.formula, &m.billing_value, quantity);
            }
        }
        FormulaKind::SimpleCount => {
            if let Some(q) = quantity {
                push(&mut out, "quantity".to_string(), q.clone());
            }
        }
        FormulaKind::PackPrice => {
            if let (Some(q), Some(count)) = (quantity, &fields.pack_count) {
                if !count.is_zero() {
                    push(&mut out, "quantity ÷ pack_count".to_string(), q / count);
                }
            }
        }
        FormulaKind::Derived => {}
    }
    out
}

fn push(out: &mut Vec<Candidate>, label: String, value: BigDecimal) {
    if value.is_zero() || out.iter().any(|c| c.value == value) {
        return;
    }
    out.push(Candidate { label, value });
}

/// A description format alone, then scaled by the ordered quantity.
fn with_quantity(
    out: &mut Vec<Candidate>,
    formula: &str,
    value: &BigDecimal,
    quantity: Option<&BigDecimal>,
) {
    push(out, format!("format {formula}"), value.clone());
    if let Some(q) = quantity.filter(|q| !q.is_one()) {
        push(out, format!("{} × format {formula}", trim_display(q)), q * value);
    }
}

/// Single-triple check: `round(B × P, 2)` against T within the line band.
pub fn validate_line(
    billing: &BigDecimal,
    price: &BigDecimal,
    total: &BigDecimal,
    tolerances: &ToleranceModel,
) -> TripleCheck {
    let calculated = round_money(&(billing * price));
    let cmp = compare(&calculated, total, tolerances.line_band(total));
    TripleCheck {
        is_valid: cmp.within,
        calculated,
        expected: total.clone(),
        difference: cmp.difference,
        tolerance: cmp.tolerance,
    }
}

/// Fills in the missing member when exactly two of B, P and T are known.
/// Divisions are rounded to quantity precision; a zero divisor yields `None`.
pub fn derive_value(triple: &NumericTriple) -> Option<DerivedValue> {
    match (&triple.billing, &triple.price, &triple.total) {
        (Some(b), Some(p), None) => Some(DerivedValue {
            field: TripleField::Total,
            value: round_money(&(b * p)),
        }),
        (None, Some(p), Some(t)) if !p.is_zero() => Some(DerivedValue {
            field: TripleField::Billing,
            value: (t / p).round(QUANTITY_SCALE),
        }),
        (Some(b), None, Some(t)) if !b.is_zero() => Some(DerivedValue {
            field: TripleField::Price,
            value: (t / b).round(QUANTITY_SCALE),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::decimal;

    fn line(quantity: Option<&str>, price: &str, total: &str) -> LineFields {
        LineFields {
            quantity: quantity.map(decimal),
            unit_price: Some(decimal(price)),
            total_price: Some(decimal(total)),
            ..Default::default()
        }
    }

    #[test]
    fn billing_quantity_beats_simple_count() {
        let mut fields = line(Some("3"), "2.00", "6.00");
        fields.billing_quantity = Some(decimal("3"));
        let result = find_valid_formula(&fields, &ToleranceModel::default());
        assert!(result.found);
        assert_eq!(result.status, ValidationStatus::Valid);
        assert_eq!(result.formula_type(), Some(FormulaKind::BillingQuantity));
        assert_eq!(result.all_results.len(), 1);
    }

    #[test]
    fn weight_billed_line_from_description() {
        let mut fields = line(Some("2"), "1.50", "60.00");
        fields.description = Some("CAROTTE BÉBÉ 4/5LB".to_string());
        let result = find_valid_formula(&fields, &ToleranceModel::default());
        let best = result.best_match.unwrap();
        assert_eq!(best.formula_type, FormulaKind::PackWeight);
        assert_eq!(best.billing_value, decimal("40"));
        assert_eq!(best.calculated, decimal("60.00"));
    }

    #[test]
    fn price_per_pack() {
        let mut fields = line(Some("24"), "15.00", "30.00");
        fields.pack_count = Some(decimal("12"));
        let result = find_valid_formula(&fields, &ToleranceModel::default());
        assert_eq!(result.formula_type(), Some(FormulaKind::PackPrice));
        assert_eq!(result.best_match.unwrap().billing_value, decimal("2"));
    }

    #[test]
    fn zero_price_is_skipped() {
        let result = find_valid_formula(&line(Some("1"), "0", "0"), &ToleranceModel::default());
        assert_eq!(result.status, ValidationStatus::Skipped);
        assert!(!result.found);
    }

    #[test]
    fn missing_data_is_skipped() {
        let fields = LineFields {
            quantity: Some(decimal("2")),
            unit_price: Some(decimal("4.00")),
            ..Default::default()
        };
        let result = find_valid_formula(&fields, &ToleranceModel::default());
        assert_eq!(result.status, ValidationStatus::Skipped);
        assert!(result.reason.unwrap().contains("insufficient data"));

        let result = find_valid_formula(&line(None, "4.00", "8.00"), &ToleranceModel::default());
        assert_eq!(result.status, ValidationStatus::Skipped);
    }

    #[test]
    fn failing_line_reports_closest_attempt() {
        let mut fields = line(Some("3"), "10.00", "31.00");
        fields.weight = Some(decimal("2.5"));
        let result = find_valid_formula(&fields, &ToleranceModel::default());
        assert!(!result.found);
        assert_eq!(result.status, ValidationStatus::Invalid);
        assert_eq!(result.all_results.len(), 2);
        let best = result.best_match.unwrap();
        assert_eq!(best.formula_type, FormulaKind::SimpleCount);
        assert_eq!(best.difference, decimal("1.00"));
    }

    #[test]
    fn mapped_line_uses_fixed_billing_value() {
        let mut fields = line(None, "3.20", "14.46");
        fields.billing_quantity = Some(decimal("4.52"));
        let result = validate_mapped_line(&fields, FormulaKind::BillingQuantity, "col2", &ToleranceModel::default());
        assert!(result.found);
        assert_eq!(result.best_match.unwrap().calculated, decimal("14.46"));

        fields.billing_quantity = None;
        let result = validate_mapped_line(&fields, FormulaKind::BillingQuantity, "col2", &ToleranceModel::default());
        assert_eq!(result.status, ValidationStatus::Skipped);
    }

    #[test]
    fn tolerance_boundary_is_inclusive() {
        let tol = ToleranceModel::default();
        assert!(validate_line(&decimal("1"), &decimal("1.00"), &decimal("1.02"), &tol).is_valid);
        assert!(!validate_line(&decimal("1"), &decimal("1.00"), &decimal("1.03"), &tol).is_valid);
    }

    #[test]
    fn derive_missing_member() {
        let triple = NumericTriple {
            billing: Some(decimal("3")),
            price: Some(decimal("2.333")),
            total: None,
        };
        let derived = derive_value(&triple).unwrap();
        assert_eq!(derived.field, TripleField::Total);
        assert_eq!(derived.value, decimal("7.00"));

        let triple = NumericTriple {
            billing: None,
            price: Some(decimal("2.50")),
            total: Some(decimal("10.00")),
        };
        assert_eq!(derive_value(&triple).unwrap().value, decimal("4"));

        let triple = NumericTriple {
            billing: Some(decimal("0")),
            price: None,
            total: Some(decimal("10.00")),
        };
        assert!(derive_value(&triple).is_none());
        assert!(derive_value(&NumericTriple::default()).is_none());
    }
}
