use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use super::check::ValidationStatus;
use super::format::FormatKind;

/// Whatever the extraction service managed to read for one invoice line.
///
/// Every numeric field is optional: an absent price and a zero price carry
/// different meanings and must never be conflated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineFields {
    #[serde(default, with = "super::amount::option", skip_serializing_if = "Option::is_none")]
    pub quantity: Option<BigDecimal>,
    #[serde(default, with = "super::amount::option", skip_serializing_if = "Option::is_none")]
    pub weight: Option<BigDecimal>,
    #[serde(default, with = "super::amount::option", skip_serializing_if = "Option::is_none")]
    pub volume: Option<BigDecimal>,
    #[serde(default, with = "super::amount::option", skip_serializing_if = "Option::is_none")]
    pub billing_quantity: Option<BigDecimal>,
    #[serde(default, with = "super::amount::option", skip_serializing_if = "Option::is_none")]
    pub pack_count: Option<BigDecimal>,
    #[serde(default, with = "super::amount::option", skip_serializing_if = "Option::is_none")]
    pub pack_weight: Option<BigDecimal>,
    #[serde(default, with = "super::amount::option", skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<BigDecimal>,
    #[serde(default, with = "super::amount::option", skip_serializing_if = "Option::is_none")]
    pub total_price: Option<BigDecimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl LineFields {
    /// Count of numeric fields present.
    pub fn numeric_field_count(&self) -> usize {
        [
            &self.quantity,
            &self.weight,
            &self.volume,
            &self.billing_quantity,
            &self.pack_count,
            &self.pack_weight,
            &self.unit_price,
            &self.total_price,
        ]
        .iter()
        .filter(|v| v.is_some())
        .count()
    }
}

/// Interpretation of the billing value B, tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaKind {
    /// Explicit billed-quantity column; most authoritative when present.
    BillingQuantity,
    PackWeight,
    PackCount,
    EmbeddedWeight,
    SimpleWeight,
    SimpleVolume,
    SimpleCount,
    /// Price is quoted per pack while the quantity counts units.
    PackPrice,
    /// B recovered as T ÷ P; no independent cross-check happened.
    Derived,
}

impl FormulaKind {
    /// Order tried by the line validator. `Derived` is never tried.
    pub const CATALOGUE: [FormulaKind; 8] = [
        FormulaKind::BillingQuantity,
        FormulaKind::PackWeight,
        FormulaKind::PackCount,
        FormulaKind::EmbeddedWeight,
        FormulaKind::SimpleWeight,
        FormulaKind::SimpleVolume,
        FormulaKind::SimpleCount,
        FormulaKind::PackPrice,
    ];
}

/// `6 x 500G` bills the same way as `4/5LB`: packs times size.
impl From<FormatKind> for FormulaKind {
    fn from(kind: FormatKind) -> Self {
        match kind {
            FormatKind::PackWeight | FormatKind::Multiplied => FormulaKind::PackWeight,
            FormatKind::PackCount => FormulaKind::PackCount,
            FormatKind::Embedded => FormulaKind::EmbeddedWeight,
            FormatKind::SimpleWeight => FormulaKind::SimpleWeight,
            FormatKind::SimpleVolume => FormulaKind::SimpleVolume,
        }
    }
}

impl std::fmt::Display for FormulaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BillingQuantity => write!(f, "billing_quantity"),
            Self::PackWeight => write!(f, "pack_weight"),
            Self::PackCount => write!(f, "pack_count"),
            Self::EmbeddedWeight => write!(f, "embedded_weight"),
            Self::SimpleWeight => write!(f, "simple_weight"),
            Self::SimpleVolume => write!(f, "simple_volume"),
            Self::SimpleCount => write!(f, "simple_count"),
            Self::PackPrice => write!(f, "pack_price"),
            Self::Derived => write!(f, "derived"),
        }
    }
}

/// One tested hypothesis for B.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaAttempt {
    pub formula_type: FormulaKind,
    pub label: String,
    pub billing_value: BigDecimal,
    pub unit_price: BigDecimal,
    pub calculated: BigDecimal,
    pub expected: BigDecimal,
    pub difference: BigDecimal,
    pub tolerance: BigDecimal,
    pub is_valid: bool,
}

/// Per-line `math_validation` annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineValidation {
    pub found: bool,
    pub status: ValidationStatus,
    pub best_match: Option<FormulaAttempt>,
    pub all_results: Vec<FormulaAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl LineValidation {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            found: false,
            status: ValidationStatus::Skipped,
            best_match: None,
            all_results: Vec::new(),
            reason: Some(reason.into()),
        }
    }

    /// Keeps the attempt for audit but withdraws the verdict.
    pub fn unverified(self, reason: impl Into<String>) -> Self {
        Self {
            found: false,
            status: ValidationStatus::Skipped,
            reason: Some(reason.into()),
            ..self
        }
    }

    pub fn formula_type(&self) -> Option<FormulaKind> {
        self.best_match.as_ref().map(|m| m.formula_type)
    }
}

/// Single-triple check result: `round(B × P, 2)` against T.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripleCheck {
    pub is_valid: bool,
    pub calculated: BigDecimal,
    pub expected: BigDecimal,
    pub difference: BigDecimal,
    pub tolerance: BigDecimal,
}

/// B, P and T as far as they are known.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericTriple {
    #[serde(default, with = "super::amount::option")]
    pub billing: Option<BigDecimal>,
    #[serde(default, with = "super::amount::option")]
    pub price: Option<BigDecimal>,
    #[serde(default, with = "super::amount::option")]
    pub total: Option<BigDecimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripleField {
    Billing,
    Price,
    Total,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedValue {
    pub field: TripleField,
    pub value: BigDecimal,
}

/// A line together with its non-destructive math annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedLine {
    pub line_number: usize,
    #[serde(flatten)]
    pub fields: LineFields,
    pub math_validation: LineValidation,
}
