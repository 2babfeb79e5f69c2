//! Invoice-level composition: line checks, mapping inference, cascade,
//! confidence score and reviewer diagnostics.

use rayon::prelude::*;

use crate::config::EngineSettings;
use crate::error::{MathError, Result};
use crate::models::{
    AnnotatedLine, CascadeInput, CascadeResult, CheckLevel, CheckResult, Diagnostic,
    InvoiceInput, InvoiceReport, LineFields, LineSummary, LineValidation, MappingOrigin,
    MappingReport, OverallStatus, Row, ValidationStatus,
};
use crate::numeric::money_display;
use crate::service::cascade::validate_cascade;
use crate::service::column_solver::{
    solve_columns, solve_columns_consensus, validate_mapped_rows, validate_rows_with_mapping,
};
use crate::service::line_validator::find_valid_formula;
use crate::service::mapping_cache::MappingCache;

const LINE_WEIGHT: f64 = 0.40;
const SUM_WEIGHT: f64 = 0.20;
const TAX_WEIGHT: f64 = 0.10;
const GRAND_TOTAL_WEIGHT: f64 = 0.10;
const MAPPING_WEIGHT: f64 = 0.10;

const FULLY_VALIDATED_AT: f64 = 0.95;
const MOSTLY_VALID_AT: f64 = 0.75;

const DERIVED_REASON: &str = "unverified: billing value derived as total ÷ price";

/// Outcome of resolving the column mapping for raw rows.
enum Resolved {
    Mapped(MappingReport),
    Unmapped(String),
}

/// Math validation service.
pub struct MathValidator {
    settings: EngineSettings,
    cache: MappingCache,
}

impl MathValidator {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            cache: MappingCache::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn cache(&self) -> &MappingCache {
        &self.cache
    }

    /// Validates one invoice. Fails only when the input carries neither
    /// structured lines nor raw rows.
    pub fn validate(&self, input: &InvoiceInput) -> Result<InvoiceReport> {
        let tolerances = &self.settings.tolerances;

        let (fields, validations, mapping, unmapped) = match (&input.lines, &input.rows) {
            (Some(lines), _) => {
                let validations: Vec<LineValidation> =
                    lines.iter().map(|l| find_valid_formula(l, tolerances)).collect();
                (lines.clone(), validations, None, None)
            }
            (None, Some(rows)) => match self.resolve_mapping(input, rows) {
                Resolved::Mapped(report) => {
                    let derived = report.mapping.is_derived;
                    let (fields, validations): (Vec<LineFields>, Vec<LineValidation>) =
                        validate_mapped_rows(rows, &report.mapping, tolerances)
                            .into_iter()
                            .map(|(f, v)| match derived {
                                true => (f, v.unverified(DERIVED_REASON)),
                                false => (f, v),
                            })
                            .unzip();
                    (fields, validations, Some(report), None)
                }
                Resolved::Unmapped(reason) => (Vec::new(), Vec::new(), None, Some(reason)),
            },
            (None, None) => {
                return Err(MathError::invalid_input(
                    "invoice carries neither structured lines nor raw rows",
                ))
            }
        };

        let lines: Vec<AnnotatedLine> = fields
            .into_iter()
            .zip(validations)
            .enumerate()
            .map(|(i, (fields, math_validation))| AnnotatedLine {
                line_number: i + 1,
                fields,
                math_validation,
            })
            .collect();
        let line_summary = summarize_lines(&lines);

        let cascade_input = CascadeInput {
            line_totals: lines.iter().filter_map(|l| l.fields.total_price.clone()).collect(),
            totals: input.totals.clone(),
        };
        let cascade = validate_cascade(&cascade_input, &self.settings.tax, tolerances);

        // structured lines involve no mapping; a failed inference or a
        // derived billing value scores zero
        let derived = mapping.as_ref().is_some_and(|m| m.mapping.is_derived);
        let mapping_score = match input.lines {
            Some(_) => None,
            None if derived => Some(0.0),
            None => Some(mapping.as_ref().map_or(0.0, |m| m.agreement)),
        };
        let confidence = confidence(&line_summary, &cascade, mapping_score);

        let mut diagnostics = line_diagnostics(&lines);
        diagnostics.extend(cascade_diagnostics(&cascade, &lines));
        if let Some(reason) = &unmapped {
            diagnostics.push(Diagnostic {
                level: CheckLevel::Line,
                status: ValidationStatus::Invalid,
                line_numbers: Vec::new(),
                expected: None,
                calculated: None,
                difference: None,
                message: format!("no column mapping could be inferred: {reason}"),
            });
        }
        if derived {
            diagnostics.push(Diagnostic {
                level: CheckLevel::Line,
                status: ValidationStatus::Skipped,
                line_numbers: lines.iter().map(|l| l.line_number).collect(),
                expected: None,
                calculated: None,
                difference: None,
                message: "no column combination reproduces the line totals; billing value derived as total ÷ price, lines unverified".to_string(),
            });
        }

        let any_invalid = line_summary.invalid > 0 || cascade.summary.invalid_count > 0 || unmapped.is_some();
        let status = if !any_invalid && !derived && confidence >= FULLY_VALIDATED_AT {
            OverallStatus::FullyValidated
        } else if confidence >= MOSTLY_VALID_AT {
            OverallStatus::MostlyValid
        } else {
            OverallStatus::NeedsReview
        };

        if let (Some(vendor), Some(report)) = (&input.vendor_id, &mapping) {
            let fresh = matches!(report.origin, MappingOrigin::Solved | MappingOrigin::Consensus);
            if fresh && !report.mapping.is_derived && status != OverallStatus::NeedsReview {
                self.cache.store(vendor, report.mapping.clone());
            }
        }

        tracing::info!(
            "invoice {}: {} (confidence {:.2}, {} lines, {} diagnostics)",
            input.vendor_id.as_deref().unwrap_or("-"),
            status,
            confidence,
            lines.len(),
            diagnostics.len()
        );

        Ok(InvoiceReport {
            vendor_id: input.vendor_id.clone(),
            status,
            confidence,
            lines,
            line_summary,
            mapping,
            cascade,
            diagnostics,
        })
    }

    /// Validates invoices in parallel; results keep the input order.
    pub fn validate_batch(&self, inputs: &[InvoiceInput]) -> Vec<Result<InvoiceReport>> {
        tracing::info!("validating batch of {} invoices", inputs.len());
        inputs.par_iter().map(|input| self.validate(input)).collect()
    }

    fn resolve_mapping(&self, input: &InvoiceInput, rows: &[Row]) -> Resolved {
        let tolerances = &self.settings.tolerances;
        let solver = &self.settings.solver;

        let known = input
            .mapping
            .clone()
            .map(|m| (m, MappingOrigin::Provided))
            .or_else(|| {
                input
                    .vendor_id
                    .as_deref()
                    .and_then(|v| self.cache.get(v))
                    .map(|m| (m, MappingOrigin::Cached))
            });
        if let Some((mapping, origin)) = known {
            let validation = validate_rows_with_mapping(rows, &mapping, tolerances);
            return Resolved::Mapped(MappingReport {
                mapping,
                origin,
                agreement: 1.0,
                votes: Vec::new(),
                validation,
            });
        }

        let mut agreement = 1.0;
        if solver.use_consensus {
            let consensus = solve_columns_consensus(rows, input.description_column, solver, tolerances);
            if let (Some(mapping), Some(validation)) = (consensus.mapping, consensus.validation) {
                return Resolved::Mapped(MappingReport {
                    mapping,
                    origin: MappingOrigin::Consensus,
                    agreement: consensus.agreement,
                    votes: consensus.votes,
                    validation,
                });
            }
            tracing::warn!(
                "no consensus mapping ({:.0}% agreement), solving over all rows",
                consensus.agreement * 100.0
            );
            agreement = consensus.agreement;
        }

        let outcome = solve_columns(rows, input.description_column, solver, tolerances);
        match (outcome.mapping, outcome.validation) {
            (Some(mapping), Some(validation)) => Resolved::Mapped(MappingReport {
                mapping,
                origin: MappingOrigin::Solved,
                agreement,
                votes: Vec::new(),
                validation,
            }),
            _ => Resolved::Unmapped(
                outcome
                    .reason
                    .unwrap_or_else(|| "no mapping found".to_string()),
            ),
        }
    }
}

fn summarize_lines(lines: &[AnnotatedLine]) -> LineSummary {
    let count = |status: ValidationStatus| {
        lines
            .iter()
            .filter(|l| l.math_validation.status == status)
            .count()
    };
    let valid = count(ValidationStatus::Valid);
    let invalid = count(ValidationStatus::Invalid);
    let skipped = count(ValidationStatus::Skipped);
    let applicable = valid + invalid;
    LineSummary {
        total: lines.len(),
        valid,
        invalid,
        skipped,
        valid_rate: if applicable == 0 {
            0.0
        } else {
            valid as f64 / applicable as f64
        },
    }
}

fn check_score(check: &CheckResult) -> Option<f64> {
    match check.status {
        ValidationStatus::Valid => Some(1.0),
        ValidationStatus::Invalid => Some(0.0),
        ValidationStatus::Skipped => None,
    }
}

/// Weighted score over the components that applied; skipped components
/// drop out and the remaining weights are renormalized.
fn confidence(lines: &LineSummary, cascade: &CascadeResult, mapping: Option<f64>) -> f64 {
    let checks = &cascade.results;
    let line_score = (lines.valid + lines.invalid > 0).then_some(lines.valid_rate);
    let components = [
        (LINE_WEIGHT, line_score),
        (SUM_WEIGHT, check_score(&checks.sum)),
        (TAX_WEIGHT, check_score(&checks.tax_a)),
        (TAX_WEIGHT, check_score(&checks.tax_b)),
        (GRAND_TOTAL_WEIGHT, check_score(&checks.grand_total)),
        (MAPPING_WEIGHT, mapping),
    ];
    let (weighted, weight) = components
        .iter()
        .filter_map(|(w, score)| score.map(|s| (w * s, *w)))
        .fold((0.0, 0.0), |(acc, total), (ws, w)| (acc + ws, total + w));
    if weight == 0.0 {
        0.0
    } else {
        (weighted / weight).clamp(0.0, 1.0)
    }
}

fn line_diagnostics(lines: &[AnnotatedLine]) -> Vec<Diagnostic> {
    lines
        .iter()
        .filter(|l| l.math_validation.status.is_invalid())
        .map(|l| line_diagnostic(l.line_number, &l.fields, &l.math_validation))
        .collect()
}

fn line_diagnostic(line_number: usize, fields: &LineFields, validation: &LineValidation) -> Diagnostic {
    let best = validation.best_match.as_ref();
    let message = match best {
        Some(b) => format!(
            "line {line_number}: closest formula {} ({} × {}) gives {}, declared {}",
            b.formula_type,
            b.billing_value,
            b.unit_price,
            money_display(&b.calculated),
            money_display(&b.expected)
        ),
        None => format!(
            "line {line_number}: {}",
            fields.description.as_deref().unwrap_or("no formula reproduces the total")
        ),
    };
    Diagnostic {
        level: CheckLevel::Line,
        status: validation.status,
        line_numbers: vec![line_number],
        expected: best.map(|b| b.expected.clone()),
        calculated: best.map(|b| b.calculated.clone()),
        difference: best.map(|b| b.difference.clone()),
        message,
    }
}

fn cascade_diagnostics(cascade: &CascadeResult, lines: &[AnnotatedLine]) -> Vec<Diagnostic> {
    cascade
        .results
        .iter()
        .filter(|c| c.status.is_invalid())
        .map(|check| {
            let line_numbers = match check.level {
                CheckLevel::Sum => match cascade.summary.missing_line.as_ref().and_then(|h| h.matching_line) {
                    Some(line) => vec![line],
                    None => lines
                        .iter()
                        .filter(|l| l.math_validation.status.is_invalid())
                        .map(|l| l.line_number)
                        .collect(),
                },
                _ => Vec::new(),
            };
            let mut message = match (&check.calculated, &check.expected, &check.difference) {
                (Some(c), Some(e), Some(d)) => format!(
                    "{}: calculated {}, declared {}, difference {} ({})",
                    check.level,
                    money_display(c),
                    money_display(e),
                    money_display(d),
                    check.formula
                ),
                _ => format!("{}: {}", check.level, check.formula),
            };
            if let Some(reason) = &check.reason {
                message = format!("{message}; {reason}");
            }
            if check.level == CheckLevel::Sum {
                if let Some(hint) = &cascade.summary.missing_line {
                    message = format!("{message}; {}", hint.message);
                }
            }
            Diagnostic {
                level: check.level,
                status: check.status,
                line_numbers,
                expected: check.expected.clone(),
                calculated: check.calculated.clone(),
                difference: check.difference.clone(),
                message,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::decimal;
    use crate::models::{CellValue, ColumnMapping, FormulaKind, InvoiceTotals};

    fn priced_line(quantity: &str, price: &str, total: &str) -> LineFields {
        LineFields {
            quantity: Some(decimal(quantity)),
            unit_price: Some(decimal(price)),
            total_price: Some(decimal(total)),
            ..Default::default()
        }
    }

    fn totals(subtotal: &str, tax_a: &str, tax_b: &str, grand_total: &str) -> InvoiceTotals {
        InvoiceTotals {
            subtotal: Some(decimal(subtotal)),
            tax_a: Some(decimal(tax_a)),
            tax_b: Some(decimal(tax_b)),
            grand_total: Some(decimal(grand_total)),
            fees: Vec::new(),
        }
    }

    #[test]
    fn clean_invoice_is_fully_validated() {
        let validator = MathValidator::new(EngineSettings::default());
        let input = InvoiceInput {
            lines: Some(vec![
                priced_line("3", "50.00", "150.00"),
                priced_line("4", "50.00", "200.00"),
                priced_line("2", "50.00", "100.00"),
            ]),
            totals: totals("450.00", "22.50", "47.14", "519.64"),
            ..Default::default()
        };
        let report = validator.validate(&input).unwrap();
        assert_eq!(report.status, OverallStatus::FullyValidated);
        assert_eq!(report.confidence, 1.0);
        assert!(report.diagnostics.is_empty());
        assert_eq!(report.lines[2].line_number, 3);
        assert!(report.mapping.is_none());
    }

    #[test]
    fn skipped_checks_do_not_lower_confidence() {
        let validator = MathValidator::new(EngineSettings::default());
        let input = InvoiceInput {
            lines: Some(vec![priced_line("2", "5.00", "10.00"), priced_line("1", "0", "0")]),
            totals: totals("10.00", "0", "0", "10.00"),
            ..Default::default()
        };
        let report = validator.validate(&input).unwrap();
        assert_eq!(report.line_summary.skipped, 1);
        assert!(report.cascade.summary.is_tax_exempt);
        assert_eq!(report.confidence, 1.0);
        assert_eq!(report.status, OverallStatus::FullyValidated);
    }

    #[test]
    fn failing_line_is_named_in_diagnostics() {
        let validator = MathValidator::new(EngineSettings::default());
        let input = InvoiceInput {
            lines: Some(vec![priced_line("2", "5.00", "10.00"), priced_line("3", "4.00", "15.00")]),
            totals: InvoiceTotals {
                subtotal: Some(decimal("25.00")),
                ..Default::default()
            },
            ..Default::default()
        };
        let report = validator.validate(&input).unwrap();
        assert_ne!(report.status, OverallStatus::FullyValidated);
        let line = report
            .diagnostics
            .iter()
            .find(|d| d.level == CheckLevel::Line)
            .unwrap();
        assert_eq!(line.line_numbers, vec![2]);
        assert_eq!(line.difference, Some(decimal("3.00")));
        assert!(report.render_text().contains("line 2"));
    }

    #[test]
    fn solved_mapping_is_cached_per_vendor() {
        let validator = MathValidator::new(EngineSettings::default());
        let rows: Vec<Row> = [
            ["10045", "2", "4.52", "3.20", "14.46"],
            ["10046", "1", "2.35", "8.99", "21.13"],
            ["10047", "3", "12.10", "4.15", "50.22"],
            ["10048", "5", "7.80", "2.49", "19.42"],
            ["10049", "2", "3.00", "11.50", "34.50"],
        ]
        .iter()
        .map(|r| r.iter().map(|&c| CellValue::from(c)).collect())
        .collect();
        let input = InvoiceInput {
            vendor_id: Some("acme".to_string()),
            rows: Some(rows),
            totals: InvoiceTotals {
                subtotal: Some(decimal("139.73")),
                ..Default::default()
            },
            ..Default::default()
        };
        let first = validator.validate(&input).unwrap();
        let mapping = first.mapping.unwrap();
        assert_eq!(mapping.origin, MappingOrigin::Consensus);
        assert_eq!(mapping.mapping, ColumnMapping::column(2, 3, 4));
        assert_eq!(first.status, OverallStatus::FullyValidated);

        let second = validator.validate(&input).unwrap();
        assert_eq!(second.mapping.unwrap().origin, MappingOrigin::Cached);
    }

    #[test]
    fn derived_mapping_is_never_fully_validated() {
        let validator = MathValidator::new(EngineSettings::default());
        let rows: Vec<Row> = [
            ["A", "2", "3.10", "50.00"],
            ["B", "5", "1.20", "17.30"],
            ["C", "7", "4.40", "11.11"],
            ["D", "1", "9.00", "4.50"],
        ]
        .iter()
        .map(|r| r.iter().map(|&c| CellValue::from(c)).collect())
        .collect();
        let input = InvoiceInput {
            vendor_id: Some("derive".to_string()),
            rows: Some(rows),
            totals: InvoiceTotals {
                subtotal: Some(decimal("82.91")),
                ..Default::default()
            },
            ..Default::default()
        };
        let report = validator.validate(&input).unwrap();
        assert!(report.mapping.as_ref().unwrap().mapping.is_derived);
        assert_ne!(report.status, OverallStatus::FullyValidated);
        assert!(report.confidence < FULLY_VALIDATED_AT);
        assert_eq!(report.line_summary.valid, 0);
        assert_eq!(report.line_summary.skipped, 4);
        assert!(report.lines.iter().all(|l| l.math_validation.reason.as_deref() == Some(DERIVED_REASON)));
        let note = report
            .diagnostics
            .iter()
            .find(|d| d.message.contains("derived"))
            .unwrap();
        assert_eq!(note.line_numbers, vec![1, 2, 3, 4]);
        assert!(validator.cache().get("derive").is_none());
    }

    #[test]
    fn format_rows_keep_their_formula_kind() {
        let validator = MathValidator::new(EngineSettings::default());
        let rows: Vec<Row> = [
            ["Tomates Caisse 25kg", "2.00", "50.00"],
            ["Pommes Caisse 18kg", "1.50", "27.00"],
            ["Oignons Caisse 10kg", "1.20", "12.00"],
        ]
        .iter()
        .map(|r| r.iter().map(|&c| CellValue::from(c)).collect())
        .collect();
        let input = InvoiceInput {
            rows: Some(rows),
            description_column: Some(0),
            ..Default::default()
        };
        let report = validator.validate(&input).unwrap();
        assert_eq!(report.line_summary.valid, 3);
        for line in &report.lines {
            assert_eq!(line.math_validation.formula_type(), Some(FormulaKind::EmbeddedWeight));
        }
    }

    #[test]
    fn neither_lines_nor_rows_is_an_error() {
        let validator = MathValidator::new(EngineSettings::default());
        let err = validator.validate(&InvoiceInput::default()).unwrap_err();
        assert!(matches!(err, MathError::InvalidInput(_)));
    }

    #[test]
    fn batch_keeps_input_order() {
        let validator = MathValidator::new(EngineSettings::default());
        let inputs: Vec<InvoiceInput> = (1..=4)
            .map(|i| InvoiceInput {
                vendor_id: Some(format!("v{i}")),
                lines: Some(vec![priced_line("1", "1.00", "1.00")]),
                ..Default::default()
            })
            .collect();
        let reports = validator.validate_batch(&inputs);
        let vendors: Vec<String> = reports
            .into_iter()
            .map(|r| r.unwrap().vendor_id.unwrap())
            .collect();
        assert_eq!(vendors, vec!["v1", "v2", "v3", "v4"]);
    }
}
