use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// Outcome severity of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Valid,
    Invalid,
    /// The check does not apply (tax-exempt invoice, zero-price sample, missing
    /// declared figure). Never counted as a failure.
    Skipped,
}

impl ValidationStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "VALID"),
            Self::Invalid => write!(f, "INVALID"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckLevel {
    Line,
    Sum,
    TaxA,
    TaxB,
    GrandTotal,
}

impl std::fmt::Display for CheckLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Line => write!(f, "line"),
            Self::Sum => write!(f, "sum"),
            Self::TaxA => write!(f, "tax_a"),
            Self::TaxB => write!(f, "tax_b"),
            Self::GrandTotal => write!(f, "grand_total"),
        }
    }
}

/// Result of one arithmetic check. A new validation run yields new results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub level: CheckLevel,
    pub status: ValidationStatus,
    pub formula: String,
    pub calculated: Option<BigDecimal>,
    pub expected: Option<BigDecimal>,
    pub difference: Option<BigDecimal>,
    pub tolerance: Option<BigDecimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_tax_exempt: bool,
}

impl CheckResult {
    pub fn skipped(level: CheckLevel, formula: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            level,
            status: ValidationStatus::Skipped,
            formula: formula.into(),
            calculated: None,
            expected: None,
            difference: None,
            tolerance: None,
            reason: Some(reason.into()),
            is_tax_exempt: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status.is_valid()
    }
}
