use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use super::cascade::{CascadeResult, InvoiceTotals};
use super::check::{CheckLevel, ValidationStatus};
use super::line::{AnnotatedLine, LineFields};
use super::mapping::{ColumnMapping, MappingVote, Row, SolveValidation};

/// One invoice handed over by the orchestration layer.
///
/// Either structured `lines` or raw `rows` must be present. With raw rows the
/// engine infers (or reuses) a column mapping first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceInput {
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub lines: Option<Vec<LineFields>>,
    #[serde(default)]
    pub rows: Option<Vec<Row>>,
    #[serde(default)]
    pub description_column: Option<usize>,
    /// A mapping confirmed earlier by a reviewer; skips inference.
    #[serde(default)]
    pub mapping: Option<ColumnMapping>,
    #[serde(default)]
    pub totals: InvoiceTotals,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    FullyValidated,
    MostlyValid,
    NeedsReview,
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FullyValidated => write!(f, "FULLY_VALIDATED"),
            Self::MostlyValid => write!(f, "MOSTLY_VALID"),
            Self::NeedsReview => write!(f, "NEEDS_REVIEW"),
        }
    }
}

/// How the mapping used for this invoice was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingOrigin {
    Provided,
    Cached,
    Solved,
    Consensus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingReport {
    pub mapping: ColumnMapping,
    pub origin: MappingOrigin,
    /// Consensus agreement 0.0-1.0; 1.0 for provided or cached mappings.
    pub agreement: f64,
    pub votes: Vec<MappingVote>,
    pub validation: SolveValidation,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineSummary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub skipped: usize,
    /// Fraction 0.0-1.0 of non-skipped lines that validated.
    pub valid_rate: f64,
}

/// One failing check, made legible for a human reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: CheckLevel,
    pub status: ValidationStatus,
    pub line_numbers: Vec<usize>,
    pub expected: Option<BigDecimal>,
    pub calculated: Option<BigDecimal>,
    pub difference: Option<BigDecimal>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceReport {
    pub vendor_id: Option<String>,
    pub status: OverallStatus,
    pub confidence: f64,
    pub lines: Vec<AnnotatedLine>,
    pub line_summary: LineSummary,
    pub mapping: Option<MappingReport>,
    pub cascade: CascadeResult,
    pub diagnostics: Vec<Diagnostic>,
}

impl InvoiceReport {
    pub fn needs_review(&self) -> bool {
        self.status != OverallStatus::FullyValidated
    }

    /// Plain-text review report, one line per failing check.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} (confidence {:.2}) - lines {}/{} valid, {} skipped",
            self.status,
            self.confidence,
            self.line_summary.valid,
            self.line_summary.valid + self.line_summary.invalid,
            self.line_summary.skipped
        );
        if let Some(mapping) = &self.mapping {
            let _ = writeln!(
                out,
                "mapping: {} [{:?}, agreement {:.0}%]",
                mapping.mapping,
                mapping.origin,
                mapping.agreement * 100.0
            );
        }
        let _ = writeln!(out, "cascade: {}", self.cascade.summary.message);
        for d in &self.diagnostics {
            let lines = if d.line_numbers.is_empty() {
                String::new()
            } else {
                let nums: Vec<String> = d.line_numbers.iter().map(|n| n.to_string()).collect();
                format!(" (line {})", nums.join(", "))
            };
            let _ = writeln!(out, "  [{}]{} {}", d.level, lines, d.message);
        }
        out
    }
}
