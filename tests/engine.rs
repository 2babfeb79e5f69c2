// End-to-end behaviour of the math engine through its public API.

use invoice_math_rust::constants::decimal;
use invoice_math_rust::models::{
    CascadeInput, CellValue, ColumnMapping, FormulaKind, InvoiceInput, InvoiceTotals, LineFields,
    MappingOrigin, MappingSource, OverallStatus, Row, ValidationStatus,
};
use invoice_math_rust::service::{
    find_valid_formula, solve_columns, validate_cascade, validate_line, SolverSettings,
    TaxSettings,
};
use invoice_math_rust::tolerance::compare;
use invoice_math_rust::{EngineSettings, MathValidator, ToleranceModel};
use serde_json::json;

fn text_rows(data: &[&[&str]]) -> Vec<Row> {
    data.iter()
        .map(|row| row.iter().map(|&c| CellValue::from(c)).collect())
        .collect()
}

fn cascade(lines: &[&str], subtotal: &str, tax_a: Option<&str>, tax_b: Option<&str>, grand_total: Option<&str>) -> CascadeInput {
    CascadeInput {
        line_totals: lines.iter().map(|l| decimal(l)).collect(),
        totals: InvoiceTotals {
            subtotal: Some(decimal(subtotal)),
            tax_a: tax_a.map(decimal),
            tax_b: tax_b.map(decimal),
            grand_total: grand_total.map(decimal),
            fees: Vec::new(),
        },
    }
}

// ---------------------------------------------------------------------------
// Line validator
// ---------------------------------------------------------------------------

#[test]
fn exact_product_validates() {
    let tol = ToleranceModel::default();
    let check = validate_line(&decimal("2.345"), &decimal("3.99"), &decimal("9.36"), &tol);
    assert!(check.is_valid);
    assert_eq!(check.calculated, decimal("9.36"));
}

#[test]
fn tolerance_holds_at_the_band_and_fails_beyond() {
    let tol = ToleranceModel::default();
    let expected = decimal("250.00");
    let band = tol.line_band(&expected);
    assert_eq!(band, decimal("1.25"));

    let at_edge = &expected + &band;
    assert!(compare(&at_edge, &expected, tol.line_band(&expected)).within);
    let beyond = &at_edge + decimal("0.01");
    assert!(!compare(&beyond, &expected, tol.line_band(&expected)).within);
}

#[test]
fn billing_quantity_column_has_priority_over_count() {
    let fields = LineFields {
        quantity: Some(decimal("12")),
        billing_quantity: Some(decimal("12")),
        unit_price: Some(decimal("1.25")),
        total_price: Some(decimal("15.00")),
        ..Default::default()
    };
    let result = find_valid_formula(&fields, &ToleranceModel::default());
    assert_eq!(result.formula_type(), Some(FormulaKind::BillingQuantity));
}

#[test]
fn weight_priced_case_uses_pack_notation() {
    // two cases of 4 × 5 LB sold by the pound
    let fields = LineFields {
        quantity: Some(decimal("2")),
        unit_price: Some(decimal("2.19")),
        total_price: Some(decimal("87.60")),
        description: Some("CAROTTE BÉBÉ PELÉE 4/5LB".to_string()),
        ..Default::default()
    };
    let result = find_valid_formula(&fields, &ToleranceModel::default());
    assert!(result.found);
    let best = result.best_match.unwrap();
    assert_eq!(best.formula_type, FormulaKind::PackWeight);
    assert_eq!(best.billing_value, decimal("40"));
}

// ---------------------------------------------------------------------------
// Cascade
// ---------------------------------------------------------------------------

#[test]
fn compound_tax_law() {
    let tax = TaxSettings::default();
    let tol = ToleranceModel::default();

    let good = validate_cascade(&cascade(&["100.00"], "100.00", Some("5.00"), Some("10.47"), None), &tax, &tol);
    assert_eq!(good.results.tax_a.calculated, Some(decimal("5.00")));
    assert_eq!(good.results.tax_b.calculated, Some(decimal("10.47")));
    assert_eq!(good.results.tax_b.status, ValidationStatus::Valid);

    let flat = validate_cascade(&cascade(&["100.00"], "100.00", Some("5.00"), Some("9.98"), None), &tax, &tol);
    assert_eq!(flat.results.tax_b.status, ValidationStatus::Invalid);
}

#[test]
fn tax_exempt_invoice() {
    let result = validate_cascade(
        &cascade(&["100"], "100", Some("0"), Some("0"), None),
        &TaxSettings::default(),
        &ToleranceModel::default(),
    );
    assert_eq!(result.results.tax_a.status, ValidationStatus::Skipped);
    assert_eq!(result.results.tax_b.status, ValidationStatus::Skipped);
    assert!(result.summary.is_tax_exempt);
    assert!(result.summary.both_valid);
}

#[test]
fn missing_deposit_line() {
    let result = validate_cascade(
        &cascade(&["50.00", "75.00"], "135.00", None, None, None),
        &TaxSettings::default(),
        &ToleranceModel::default(),
    );
    assert_eq!(result.results.sum.status, ValidationStatus::Invalid);
    assert_eq!(result.results.sum.difference, Some(decimal("10.00")));
    assert!(result.summary.missing_line.is_some());
}

#[test]
fn end_to_end_cascade() {
    let result = validate_cascade(
        &cascade(&["150", "200", "100"], "450.00", Some("22.50"), Some("47.14"), Some("519.64")),
        &TaxSettings::default(),
        &ToleranceModel::default(),
    );
    assert!(result.summary.all_valid, "{}", result.summary.message);
}

// ---------------------------------------------------------------------------
// Column solver
// ---------------------------------------------------------------------------

#[test]
fn column_inference_is_deterministic() {
    let rows: Vec<Row> = serde_json::from_value(json!([
        ["10045", 2, 4.52, 3.2, 14.46],
        ["10046", 1, 2.35, 8.99, 21.13],
        ["10047", 3, 12.1, 4.15, 50.22],
        ["10048", 5, 7.8, 2.49, 19.42],
        ["10049", 2, 3, 11.5, 34.5]
    ]))
    .unwrap();
    let first = solve_columns(&rows, None, &SolverSettings::default(), &ToleranceModel::default());
    assert_eq!(first.mapping, Some(ColumnMapping::column(2, 3, 4)));
    assert!(first.validation.as_ref().unwrap().all_valid);

    let again = solve_columns(&rows, None, &SolverSettings::default(), &ToleranceModel::default());
    assert_eq!(first, again);
}

#[test]
fn derived_fallback_is_never_bare_failure() {
    let rows = text_rows(&[
        &["A", "2", "3.10", "50.00"],
        &["B", "5", "1.20", "17.30"],
        &["C", "7", "4.40", "11.11"],
        &["D", "1", "9.00", "4.50"],
    ]);
    let outcome = solve_columns(&rows, None, &SolverSettings::default(), &ToleranceModel::default());
    assert!(outcome.found);
    let mapping = outcome.mapping.unwrap();
    assert!(mapping.is_derived);
    assert_eq!(mapping.source, MappingSource::Derived);
    assert_eq!(outcome.validation.unwrap().valid_rate, 100.0);
}

// ---------------------------------------------------------------------------
// Integration
// ---------------------------------------------------------------------------

#[test]
fn raw_rows_from_json_are_fully_validated() {
    let input: InvoiceInput = serde_json::from_value(json!({
        "vendor_id": "fournisseur-42",
        "rows": [
            ["ITEM", "QTY", "BILLED", "PRICE", "AMOUNT"],
            ["10045", 2, 4.52, 3.2, 14.46],
            ["10046", 1, 2.35, 8.99, 21.13],
            ["10047", 3, 12.1, 4.15, 50.22],
            ["10048", 5, 7.8, 2.49, 19.42],
            ["10049", 2, 3, 11.5, 34.5]
        ],
        "totals": {
            "subtotal": 139.73,
            "tax_a": "6.99",
            "tax_b": "14.64",
            "grand_total": 161.36
        }
    }))
    .unwrap();

    let validator = MathValidator::new(EngineSettings::default());
    let report = validator.validate(&input).unwrap();
    assert_eq!(report.status, OverallStatus::FullyValidated, "{}", report.render_text());
    assert_eq!(report.line_summary.valid, 5);
    assert_eq!(report.line_summary.skipped, 1);
    assert_eq!(report.lines[0].math_validation.status, ValidationStatus::Skipped);
    let mapping = report.mapping.unwrap();
    assert_eq!(mapping.mapping, ColumnMapping::column(2, 3, 4));
    assert_eq!(mapping.origin, MappingOrigin::Consensus);
    assert!(validator.cache().get("fournisseur-42").is_some());
}

#[test]
fn mismatched_invoice_needs_review_with_line_numbers() {
    let validator = MathValidator::new(EngineSettings::default());
    let line = |q: &str, p: &str, t: &str| LineFields {
        quantity: Some(decimal(q)),
        unit_price: Some(decimal(p)),
        total_price: Some(decimal(t)),
        ..Default::default()
    };
    let input = InvoiceInput {
        lines: Some(vec![
            line("2", "10.00", "20.00"),
            line("3", "7.00", "25.00"),
            line("1", "4.00", "4.00"),
        ]),
        totals: InvoiceTotals {
            subtotal: Some(decimal("59.00")),
            tax_a: Some(decimal("2.95")),
            tax_b: Some(decimal("5.60")),
            grand_total: Some(decimal("67.55")),
            fees: Vec::new(),
        },
        ..Default::default()
    };
    let report = validator.validate(&input).unwrap();
    assert_eq!(report.status, OverallStatus::NeedsReview);

    let line_issue = report.diagnostics.iter().find(|d| d.line_numbers == vec![2]).unwrap();
    assert_eq!(line_issue.calculated, Some(decimal("21.00")));
    assert_eq!(line_issue.expected, Some(decimal("25.00")));

    let sum_issue = report
        .diagnostics
        .iter()
        .find(|d| d.level.to_string() == "sum")
        .unwrap();
    assert_eq!(sum_issue.line_numbers, vec![2]);
}

#[test]
fn provided_mapping_skips_inference() {
    let validator = MathValidator::new(EngineSettings::default());
    let input = InvoiceInput {
        rows: Some(text_rows(&[&["SAUMON", "1.5", "22.00", "33.00"]])),
        mapping: Some(ColumnMapping::column(1, 2, 3)),
        ..Default::default()
    };
    let report = validator.validate(&input).unwrap();
    let mapping = report.mapping.unwrap();
    assert_eq!(mapping.origin, MappingOrigin::Provided);
    assert_eq!(report.line_summary.valid, 1);
}
