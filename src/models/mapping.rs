use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use super::check::ValidationStatus;
use super::format::FormatKind;
use super::line::FormulaKind;

/// A raw cell as delivered by the extraction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(serde_json::Number),
    Text(String),
    Null,
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Textual form used by the number parser and the format extractor.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Number(n) => Some(n.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::Null => None,
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value)
            .map(Self::Number)
            .unwrap_or(Self::Null)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

pub type Row = Vec<CellValue>;

/// Where the billing value of a mapping comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSource {
    /// A numeric column holds B directly.
    Column,
    /// B is read from packaging notation in the description column,
    /// optionally multiplied by a numeric column.
    Format,
    /// B = T ÷ P per row.
    Derived,
}

impl std::fmt::Display for MappingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Column => write!(f, "column"),
            Self::Format => write!(f, "format"),
            Self::Derived => write!(f, "derived"),
        }
    }
}

/// Role assignment for the columns of one vendor's line table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub billing_index: Option<usize>,
    pub price_index: usize,
    pub total_index: usize,
    #[serde(default)]
    pub description_index: Option<usize>,
    pub source: MappingSource,
    #[serde(default)]
    pub is_derived: bool,
}

impl ColumnMapping {
    pub fn column(billing: usize, price: usize, total: usize) -> Self {
        Self {
            billing_index: Some(billing),
            price_index: price,
            total_index: total,
            description_index: None,
            source: MappingSource::Column,
            is_derived: false,
        }
    }

    pub fn derived(price: usize, total: usize) -> Self {
        Self {
            billing_index: None,
            price_index: price,
            total_index: total,
            description_index: None,
            source: MappingSource::Derived,
            is_derived: true,
        }
    }

    /// Formula kind reported for a line validated under this mapping.
    /// Format mappings report the notation found on that row.
    pub fn formula_kind(&self, format: Option<FormatKind>) -> FormulaKind {
        match self.source {
            MappingSource::Column => FormulaKind::BillingQuantity,
            MappingSource::Format => format.map_or(FormulaKind::PackWeight, FormulaKind::from),
            MappingSource::Derived => FormulaKind::Derived,
        }
    }
}

impl std::fmt::Display for ColumnMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let billing = match (self.billing_index, self.description_index) {
            (Some(b), Some(d)) => format!("col{b} × format(col{d})"),
            (Some(b), None) => format!("col{b}"),
            (None, Some(d)) => format!("format(col{d})"),
            (None, None) => "total ÷ price".to_string(),
        };
        write!(
            f,
            "billing={billing}, price=col{}, total=col{} ({})",
            self.price_index, self.total_index, self.source
        )
    }
}

/// Outcome for one row under a candidate mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowCheck {
    pub row_index: usize,
    pub status: ValidationStatus,
    pub billing_value: Option<BigDecimal>,
    pub calculated: Option<BigDecimal>,
    pub expected: Option<BigDecimal>,
    pub difference: Option<BigDecimal>,
}

/// Pass-rate statistics for a mapping over a row set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveValidation {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    pub skipped_rows: usize,
    /// Percentage 0-100 of applicable (non-skipped) rows that validated.
    pub valid_rate: f64,
    pub all_valid: bool,
    pub is_derived: bool,
    pub rows: Vec<RowCheck>,
}

impl SolveValidation {
    pub fn from_rows(rows: Vec<RowCheck>, is_derived: bool) -> Self {
        let valid_rows = rows.iter().filter(|r| r.status.is_valid()).count();
        let invalid_rows = rows.iter().filter(|r| r.status.is_invalid()).count();
        let skipped_rows = rows.len() - valid_rows - invalid_rows;
        let applicable = valid_rows + invalid_rows;
        let valid_rate = if applicable == 0 {
            0.0
        } else {
            valid_rows as f64 * 100.0 / applicable as f64
        };
        Self {
            total_rows: rows.len(),
            valid_rows,
            invalid_rows,
            skipped_rows,
            valid_rate,
            all_valid: applicable > 0 && invalid_rows == 0,
            is_derived,
            rows,
        }
    }

    pub fn pass_fraction(&self) -> f64 {
        self.valid_rate / 100.0
    }
}

/// Result of column inference. Never an error: failure carries a reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveOutcome {
    pub found: bool,
    pub mapping: Option<ColumnMapping>,
    pub validation: Option<SolveValidation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub candidates_tried: usize,
}

impl SolveOutcome {
    pub fn not_found(reason: impl Into<String>, candidates_tried: usize) -> Self {
        Self {
            found: false,
            mapping: None,
            validation: None,
            reason: Some(reason.into()),
            candidates_tried,
        }
    }
}

/// How many subsets proposed a given mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingVote {
    pub mapping: ColumnMapping,
    pub votes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    pub found: bool,
    pub mapping: Option<ColumnMapping>,
    /// Fraction 0.0-1.0 of subsets that agreed on `mapping`.
    pub agreement: f64,
    pub subsets: usize,
    pub votes: Vec<MappingVote>,
    /// Validation of the accepted mapping over every row.
    pub validation: Option<SolveValidation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
