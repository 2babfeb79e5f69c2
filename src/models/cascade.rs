use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use super::check::{CheckResult, ValidationStatus};

/// A taxable charge that is not a product line (freight, fuel surcharge,
/// container deposit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fee {
    pub label: String,
    #[serde(with = "super::amount")]
    pub amount: BigDecimal,
}

/// Invoice-level figures as declared on the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    #[serde(default, with = "super::amount::option")]
    pub subtotal: Option<BigDecimal>,
    #[serde(default, with = "super::amount::option")]
    pub tax_a: Option<BigDecimal>,
    #[serde(default, with = "super::amount::option")]
    pub tax_b: Option<BigDecimal>,
    #[serde(default, with = "super::amount::option")]
    pub grand_total: Option<BigDecimal>,
    #[serde(default)]
    pub fees: Vec<Fee>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CascadeInput {
    #[serde(default, with = "super::amount::seq")]
    pub line_totals: Vec<BigDecimal>,
    #[serde(flatten)]
    pub totals: InvoiceTotals,
}

/// The four independent checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeChecks {
    pub sum: CheckResult,
    pub tax_a: CheckResult,
    pub tax_b: CheckResult,
    pub grand_total: CheckResult,
}

impl CascadeChecks {
    pub fn iter(&self) -> impl Iterator<Item = &CheckResult> {
        [&self.sum, &self.tax_a, &self.tax_b, &self.grand_total].into_iter()
    }
}

/// A sum shortfall that looks like a line the extraction missed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingLineHint {
    #[serde(with = "super::amount")]
    pub amount: BigDecimal,
    /// Declared fee with a matching amount, if any.
    pub matching_fee: Option<String>,
    /// 1-based line whose total equals the gap (duplicate or dropped copy).
    pub matching_line: Option<usize>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeSummary {
    pub all_valid: bool,
    pub sum_valid: bool,
    pub tax_a_valid: bool,
    pub tax_b_valid: bool,
    /// Neither tax check failed (skipped counts as fine).
    pub both_valid: bool,
    pub grand_total_valid: bool,
    pub is_tax_exempt: bool,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub skipped_count: usize,
    pub missing_line: Option<MissingLineHint>,
    pub message: String,
}

/// Compact ordered view of the cascade for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeStep {
    pub step: u8,
    pub label: String,
    pub status: ValidationStatus,
    pub calculated: Option<BigDecimal>,
    pub expected: Option<BigDecimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeResult {
    pub results: CascadeChecks,
    pub summary: CascadeSummary,
    pub cascade: Vec<CascadeStep>,
}
