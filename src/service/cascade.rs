//! Invoice-level totals cascade: line sum, federal tax, compound provincial
//! tax, grand total. Each stage is checked independently so one bad figure
//! does not hide the others.

use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};

use crate::constants::{decimal, FEDERAL_RATE, PROVINCIAL_RATE};
use crate::models::{
    CascadeChecks, CascadeInput, CascadeResult, CascadeStep, CascadeSummary, CheckLevel,
    CheckResult, MissingLineHint, ValidationStatus,
};
use crate::numeric::{money_display, round_money, trim_display};
use crate::tolerance::{compare, Comparison, ToleranceModel};

/// What the provincial rate applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxBase {
    /// Subtotal plus the federal tax (QST-style).
    #[default]
    Compound,
    /// Subtotal alone (HST/PST-style regimes).
    Subtotal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxSettings {
    #[serde(with = "crate::models::amount")]
    pub federal_rate: BigDecimal,
    #[serde(with = "crate::models::amount")]
    pub provincial_rate: BigDecimal,
    pub base: TaxBase,
}

impl Default for TaxSettings {
    fn default() -> Self {
        Self {
            federal_rate: decimal(FEDERAL_RATE),
            provincial_rate: decimal(PROVINCIAL_RATE),
            base: TaxBase::Compound,
        }
    }
}

/// A sum shortfall larger than this share of the subtotal is not a plausible
/// single omitted line.
const MISSING_LINE_SHARE: &str = "0.25";

fn checked(
    level: CheckLevel,
    formula: String,
    calculated: BigDecimal,
    expected: &BigDecimal,
    cmp: Comparison,
) -> CheckResult {
    CheckResult {
        level,
        status: if cmp.within {
            ValidationStatus::Valid
        } else {
            ValidationStatus::Invalid
        },
        formula,
        calculated: Some(calculated),
        expected: Some(expected.clone()),
        difference: Some(cmp.difference),
        tolerance: Some(cmp.tolerance),
        reason: None,
        is_tax_exempt: false,
    }
}

fn exempt(level: CheckLevel, formula: &str) -> CheckResult {
    let mut check = CheckResult::skipped(level, formula, "no tax declared (tax exempt)");
    check.is_tax_exempt = true;
    check
}

fn declared(value: &Option<BigDecimal>) -> Option<&BigDecimal> {
    value.as_ref().filter(|v| !v.is_zero())
}

fn sum_check(input: &CascadeInput, tolerances: &ToleranceModel) -> CheckResult {
    let count = input.line_totals.len();
    let formula = format!("Σ {count} line totals = subtotal");
    let Some(subtotal) = &input.totals.subtotal else {
        return CheckResult::skipped(CheckLevel::Sum, formula, "no declared subtotal");
    };
    let sum: BigDecimal = input.line_totals.iter().sum();
    let cmp = compare(&sum, subtotal, tolerances.sum_band(subtotal, count));
    let mut check = checked(CheckLevel::Sum, formula, sum, subtotal, cmp);
    if count == 0 {
        check.status = ValidationStatus::Invalid;
        check.reason = Some("subtotal declared but no line totals".to_string());
    }
    check
}

fn tax_a_check(base: Option<&BigDecimal>, input: &CascadeInput, tax: &TaxSettings, tolerances: &ToleranceModel) -> CheckResult {
    let label = "tax A = round(base × federal rate, 2)";
    let Some(declared_a) = declared(&input.totals.tax_a) else {
        return exempt(CheckLevel::TaxA, label);
    };
    let Some(base) = base else {
        return CheckResult::skipped(CheckLevel::TaxA, label, "no tax base (subtotal and lines missing)");
    };
    let calculated = round_money(&(base * &tax.federal_rate));
    let formula = format!(
        "round({} × {}, 2)",
        money_display(base),
        trim_display(&tax.federal_rate)
    );
    let cmp = compare(&calculated, declared_a, tolerances.tax_band(declared_a));
    checked(CheckLevel::TaxA, formula, calculated, declared_a, cmp)
}

fn tax_b_check(base: Option<&BigDecimal>, input: &CascadeInput, tax: &TaxSettings, tolerances: &ToleranceModel) -> CheckResult {
    let label = "tax B = round((base + tax A) × provincial rate, 2)";
    let Some(declared_b) = declared(&input.totals.tax_b) else {
        return exempt(CheckLevel::TaxB, label);
    };
    let Some(base) = base else {
        return CheckResult::skipped(CheckLevel::TaxB, label, "no tax base (subtotal and lines missing)");
    };
    let rate = &tax.provincial_rate;
    let tax_a = declared(&input.totals.tax_a);

    let (taxed, formula) = match (tax.base, tax_a) {
        (TaxBase::Compound, Some(a)) => (
            base + a,
            format!(
                "round(({} + {}) × {}, 2)",
                money_display(base),
                money_display(a),
                trim_display(rate)
            ),
        ),
        _ => (
            base.clone(),
            format!("round({} × {}, 2)", money_display(base), trim_display(rate)),
        ),
    };
    let calculated = round_money(&(&taxed * rate));
    let cmp = compare(&calculated, declared_b, tolerances.tax_band(declared_b));
    let mut check = checked(CheckLevel::TaxB, formula, calculated.clone(), declared_b, cmp);

    if tax.base == TaxBase::Compound && tax_a.is_some() {
        let flat = round_money(&(base * rate));
        let to_flat = (declared_b - &flat).abs();
        let to_compound = (declared_b - &calculated).abs();
        if to_flat < to_compound {
            check.status = ValidationStatus::Invalid;
            check.reason = Some(format!(
                "declared tax B matches {} computed on the subtotal alone; the provincial rate applies to subtotal + tax A",
                money_display(&flat)
            ));
        }
    }
    check
}

fn grand_total_check(base: Option<&BigDecimal>, input: &CascadeInput, tolerances: &ToleranceModel) -> CheckResult {
    let label = "base + tax A + tax B = grand total";
    let Some(grand_total) = &input.totals.grand_total else {
        return CheckResult::skipped(CheckLevel::GrandTotal, label, "no declared grand total");
    };
    let Some(base) = base else {
        return CheckResult::skipped(CheckLevel::GrandTotal, label, "no tax base (subtotal and lines missing)");
    };
    let zero = BigDecimal::zero();
    let tax_a = input.totals.tax_a.as_ref().unwrap_or(&zero);
    let tax_b = input.totals.tax_b.as_ref().unwrap_or(&zero);
    let calculated = base + tax_a + tax_b;
    let formula = format!(
        "{} + {} + {}",
        money_display(base),
        money_display(tax_a),
        money_display(tax_b)
    );
    let cmp = compare(&calculated, grand_total, tolerances.grand_total_band(grand_total));
    checked(CheckLevel::GrandTotal, formula, calculated, grand_total, cmp)
}

/// Looks for a plausible explanation of a failed sum check.
fn missing_line_hint(input: &CascadeInput, sum: &CheckResult, tolerances: &ToleranceModel) -> Option<MissingLineHint> {
    if !sum.status.is_invalid() || input.line_totals.is_empty() {
        return None;
    }
    let subtotal = input.totals.subtotal.as_ref()?;
    let calculated = sum.calculated.as_ref()?;
    let gap = subtotal - calculated;
    let magnitude = gap.abs();
    let band = tolerances.line_band(&magnitude);
    let matches = |amount: &BigDecimal| (amount.abs() - &magnitude).abs() <= band;

    if gap > BigDecimal::zero() {
        if let Some(fee) = input.totals.fees.iter().find(|f| matches(&f.amount)) {
            return Some(MissingLineHint {
                amount: gap.clone(),
                matching_fee: Some(fee.label.clone()),
                matching_line: None,
                message: format!(
                    "lines are short of the subtotal by {}, the amount of the declared '{}'; it was likely not extracted as a line",
                    money_display(&gap),
                    fee.label
                ),
            });
        }
        if magnitude <= subtotal.abs() * decimal(MISSING_LINE_SHARE) {
            return Some(MissingLineHint {
                amount: gap.clone(),
                matching_fee: None,
                matching_line: None,
                message: format!(
                    "lines are short of the subtotal by {}; a fee, deposit or line may be missing",
                    money_display(&gap)
                ),
            });
        }
        return None;
    }

    let duplicate = input.line_totals.iter().position(|t| matches(t)).map(|i| i + 1);
    let message = match duplicate {
        Some(line) => format!(
            "lines exceed the subtotal by {}, the total of line {line}; it may be duplicated",
            money_display(&magnitude)
        ),
        None => format!(
            "lines exceed the subtotal by {}; a discount may be missing or a line duplicated",
            money_display(&magnitude)
        ),
    };
    Some(MissingLineHint {
        amount: gap,
        matching_fee: None,
        matching_line: duplicate,
        message,
    })
}

fn summarize(checks: &CascadeChecks, missing_line: Option<MissingLineHint>) -> CascadeSummary {
    let valid_count = checks.iter().filter(|c| c.status.is_valid()).count();
    let invalid_count = checks.iter().filter(|c| c.status.is_invalid()).count();
    let skipped_count = checks.iter().filter(|c| c.status.is_skipped()).count();
    let tax_a_valid = !checks.tax_a.status.is_invalid();
    let tax_b_valid = !checks.tax_b.status.is_invalid();

    let mut message = if invalid_count == 0 {
        format!("{valid_count} of {} checks valid, {skipped_count} skipped", valid_count + skipped_count)
    } else {
        let failures: Vec<String> = checks
            .iter()
            .filter(|c| c.status.is_invalid())
            .map(|c| match &c.difference {
                Some(d) => format!("{} off by {}", c.level, money_display(d)),
                None => c.level.to_string(),
            })
            .collect();
        format!("{invalid_count} check(s) failed: {}", failures.join(", "))
    };
    if let Some(hint) = &missing_line {
        message = format!("{message}; {}", hint.message);
    }

    CascadeSummary {
        all_valid: invalid_count == 0 && valid_count > 0,
        sum_valid: !checks.sum.status.is_invalid(),
        tax_a_valid,
        tax_b_valid,
        both_valid: tax_a_valid && tax_b_valid,
        grand_total_valid: !checks.grand_total.status.is_invalid(),
        is_tax_exempt: checks.tax_a.is_tax_exempt && checks.tax_b.is_tax_exempt,
        valid_count,
        invalid_count,
        skipped_count,
        missing_line,
        message,
    }
}

/// Runs the four totals checks.
///
/// The tax base is the declared subtotal (or the line sum when no subtotal is
/// declared) plus any taxable fees. Each later stage uses the declared figure
/// of the stage before it, so a single wrong figure fails only its own check.
pub fn validate_cascade(input: &CascadeInput, tax: &TaxSettings, tolerances: &ToleranceModel) -> CascadeResult {
    let fees: BigDecimal = input.totals.fees.iter().map(|f| &f.amount).sum();
    let base = match (&input.totals.subtotal, input.line_totals.is_empty()) {
        (Some(subtotal), _) => Some(subtotal + &fees),
        (None, false) => Some(input.line_totals.iter().sum::<BigDecimal>() + &fees),
        (None, true) => None,
    };

    let sum = sum_check(input, tolerances);
    let missing_line = missing_line_hint(input, &sum, tolerances);
    let results = CascadeChecks {
        tax_a: tax_a_check(base.as_ref(), input, tax, tolerances),
        tax_b: tax_b_check(base.as_ref(), input, tax, tolerances),
        grand_total: grand_total_check(base.as_ref(), input, tolerances),
        sum,
    };

    let labels = ["line sum", "tax A", "tax B", "grand total"];
    let cascade = results
        .iter()
        .zip(labels)
        .enumerate()
        .map(|(i, (check, label))| CascadeStep {
            step: i as u8 + 1,
            label: label.to_string(),
            status: check.status,
            calculated: check.calculated.clone(),
            expected: check.expected.clone(),
        })
        .collect();

    let summary = summarize(&results, missing_line);
    CascadeResult {
        results,
        summary,
        cascade,
    }
}
