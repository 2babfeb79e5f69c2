//! Column-role inference.
//!
//! Raw extracted rows carry no reliable labels, so the solver searches for the
//! (billing, price, total) assignment under which `B × P = T` holds on the
//! most rows. Heuristics order the search; the arithmetic decides.

use bigdecimal::{BigDecimal, Zero};
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::constants::QUANTITY_SCALE;
use crate::error::Result;
use crate::models::{
    CellValue, ColumnMapping, ConsensusOutcome, FormatMatch, FormulaKind, LineFields,
    LineValidation, MappingSource, MappingVote, Row, RowCheck, SolveOutcome, SolveValidation,
};
use crate::numeric::{parse_number, ParsedNumber};
use crate::service::format_extractor::best_format;
use crate::service::line_validator::validate_mapped_line;
use crate::tolerance::ToleranceModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Fraction of applicable rows a mapping must validate to be accepted.
    pub min_pass_rate: f64,
    /// Share of subsets that must agree before a consensus mapping is accepted.
    pub consensus_threshold: f64,
    /// Rows per consensus subset.
    pub sample_rows: usize,
    pub max_subsets: usize,
    pub use_consensus: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            min_pass_rate: 0.8,
            consensus_threshold: 0.75,
            sample_rows: 5,
            max_subsets: 8,
            use_consensus: true,
        }
    }
}

#[derive(Debug, Clone)]
struct ColumnProfile {
    index: usize,
    non_empty: usize,
    parsed: usize,
    /// Cells written with exactly two decimals or a currency marker.
    money: usize,
    /// Cells with two or more decimals or a currency marker.
    priced: usize,
    /// Median absolute value of the parsed cells.
    median: Option<BigDecimal>,
}

impl ColumnProfile {
    fn is_numeric(&self) -> bool {
        self.parsed > 0 && self.parsed * 2 >= self.non_empty
    }

    fn money_like(&self) -> bool {
        self.parsed > 0 && self.money * 2 >= self.parsed
    }

    fn price_like(&self) -> bool {
        self.parsed > 0 && self.priced * 2 >= self.parsed
    }
}

/// Rows parsed once; every candidate mapping is evaluated against this.
struct Grid {
    numbers: Vec<Vec<Option<ParsedNumber>>>,
    texts: Vec<Vec<Option<String>>>,
    description: Option<usize>,
    formats: Vec<Option<FormatMatch>>,
}

impl Grid {
    fn new(rows: &[Row], description: Option<usize>) -> Self {
        let texts: Vec<Vec<Option<String>>> = rows
            .iter()
            .map(|row| row.iter().map(CellValue::as_text).collect())
            .collect();
        let numbers: Vec<Vec<Option<ParsedNumber>>> = texts
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.as_deref().and_then(parse_number))
                    .collect()
            })
            .collect();
        let formats: Vec<Option<FormatMatch>> = texts
            .iter()
            .map(|row| {
                description
                    .and_then(|d| row.get(d))
                    .and_then(|cell| cell.as_deref())
                    .and_then(best_format)
            })
            .collect();
        Self {
            numbers,
            texts,
            description,
            formats,
        }
    }

    fn len(&self) -> usize {
        self.numbers.len()
    }

    fn width(&self) -> usize {
        self.texts.iter().map(Vec::len).max().unwrap_or(0)
    }

    fn value(&self, row: usize, col: usize) -> Option<BigDecimal> {
        self.numbers
            .get(row)
            .and_then(|cells| cells.get(col))
            .and_then(|cell| cell.as_ref())
            .map(|parsed| parsed.value.clone())
    }

    fn text(&self, row: usize, col: usize) -> Option<String> {
        self.texts.get(row).and_then(|cells| cells.get(col)).cloned().flatten()
    }

    fn has_formats(&self) -> bool {
        self.formats.iter().any(Option::is_some)
    }

    fn profiles(&self) -> Vec<ColumnProfile> {
        (0..self.width())
            .map(|index| {
                let mut profile = ColumnProfile {
                    index,
                    non_empty: 0,
                    parsed: 0,
                    money: 0,
                    priced: 0,
                    median: None,
                };
                let mut magnitudes = Vec::new();
                for (texts, numbers) in self.texts.iter().zip(&self.numbers) {
                    if texts.get(index).cloned().flatten().is_some_and(|t| !t.trim().is_empty()) {
                        profile.non_empty += 1;
                    }
                    if let Some(Some(n)) = numbers.get(index) {
                        profile.parsed += 1;
                        if n.decimals == 2 || n.currency {
                            profile.money += 1;
                        }
                        if n.decimals >= 2 || n.currency {
                            profile.priced += 1;
                        }
                        magnitudes.push(n.value.abs());
                    }
                }
                magnitudes.sort();
                profile.median = magnitudes.get(magnitudes.len() / 2).cloned();
                profile
            })
            .collect()
    }

    /// Line fields of one row under `mapping`; B lands in `billing_quantity`.
    fn fields(&self, row: usize, mapping: &ColumnMapping) -> LineFields {
        let unit_price = self.value(row, mapping.price_index);
        let total_price = self.value(row, mapping.total_index);
        let billing_quantity = match mapping.source {
            MappingSource::Column => mapping.billing_index.and_then(|b| self.value(row, b)),
            MappingSource::Format => self.formats.get(row).cloned().flatten().and_then(|f| {
                match mapping.billing_index {
                    Some(b) => self.value(row, b).map(|v| v * &f.billing_value),
                    None => Some(f.billing_value),
                }
            }),
            MappingSource::Derived => match (&unit_price, &total_price) {
                (Some(p), Some(t)) if !p.is_zero() => Some((t / p).round(QUANTITY_SCALE)),
                _ => None,
            },
        };
        LineFields {
            billing_quantity,
            unit_price,
            total_price,
            description: mapping.description_index.and_then(|d| self.text(row, d)),
            ..Default::default()
        }
    }

    fn formula_kind(&self, row: usize, mapping: &ColumnMapping) -> FormulaKind {
        let format = self.formats.get(row).and_then(|f| f.as_ref()).map(|f| f.kind);
        mapping.formula_kind(format)
    }

    fn validate_row(
        &self,
        row: usize,
        mapping: &ColumnMapping,
        label: &str,
        tolerances: &ToleranceModel,
    ) -> (LineFields, LineValidation) {
        let fields = self.fields(row, mapping);
        let line = validate_mapped_line(&fields, self.formula_kind(row, mapping), label, tolerances);
        (fields, line)
    }
}

fn evaluate(grid: &Grid, mapping: &ColumnMapping, tolerances: &ToleranceModel) -> SolveValidation {
    let label = mapping.to_string();
    let rows: Vec<RowCheck> = (0..grid.len())
        .map(|row_index| {
            let (fields, line) = grid.validate_row(row_index, mapping, &label, tolerances);
            let best = line.best_match.as_ref();
            RowCheck {
                row_index,
                status: line.status,
                billing_value: fields.billing_quantity.clone(),
                calculated: best.map(|b| b.calculated.clone()),
                expected: best.map(|b| b.expected.clone()),
                difference: best.map(|b| b.difference.clone()),
            }
        })
        .collect();
    let mut validation = SolveValidation::from_rows(rows, mapping.is_derived);
    if mapping.is_derived {
        // T ÷ P reproduces T by construction
        validation.valid_rate = 100.0;
    }
    validation
}

fn accepted(validation: &SolveValidation, settings: &SolverSettings) -> bool {
    validation.valid_rows > 0 && validation.pass_fraction() >= settings.min_pass_rate
}

fn found(mapping: ColumnMapping, validation: SolveValidation, candidates_tried: usize) -> SolveOutcome {
    tracing::debug!(
        "mapping {} accepted: {}/{} rows valid",
        mapping, validation.valid_rows, validation.total_rows
    );
    SolveOutcome {
        found: true,
        mapping: Some(mapping),
        validation: Some(validation),
        reason: None,
        candidates_tried,
    }
}

/// Total = rightmost total-like column, price = the remaining price-like
/// column of smallest median magnitude (rightmost on ties); plain rightmost
/// numeric columns stand in otherwise.
fn heuristic_pair(numeric: &[ColumnProfile]) -> (usize, usize) {
    let total = numeric
        .iter()
        .rev()
        .find(|p| p.money_like())
        .or_else(|| numeric.last())
        .map(|p| p.index)
        .unwrap_or(0);
    let rest = || numeric.iter().rev().filter(move |p| p.index != total);
    let price = rest()
        .filter(|p| p.price_like())
        .min_by(|a, b| a.median.cmp(&b.median))
        .or_else(|| rest().next())
        .map(|p| p.index)
        .unwrap_or(0);
    (price, total)
}

/// Infers a column mapping from raw rows.
pub fn solve_columns(
    rows: &[Row],
    description_column: Option<usize>,
    settings: &SolverSettings,
    tolerances: &ToleranceModel,
) -> SolveOutcome {
    let grid = Grid::new(rows, description_column);
    let numeric: Vec<ColumnProfile> = grid
        .profiles()
        .into_iter()
        .filter(|p| p.is_numeric() && Some(p.index) != description_column)
        .collect();
    if numeric.len() < 2 {
        return SolveOutcome::not_found(
            format!(
                "fewer than two numeric columns ({} found); unit price and total are required",
                numeric.len()
            ),
            0,
        );
    }

    let (price, total) = heuristic_pair(&numeric);
    let mut tried = 0;

    // 1. heuristic price/total, every other numeric column as billing
    let mut best: Option<(ColumnMapping, SolveValidation)> = None;
    for billing in numeric.iter().map(|p| p.index).filter(|&i| i != price && i != total) {
        let mapping = ColumnMapping::column(billing, price, total);
        let validation = evaluate(&grid, &mapping, tolerances);
        tried += 1;
        if best.as_ref().map_or(true, |(_, b)| validation.valid_rows > b.valid_rows) {
            best = Some((mapping, validation));
        }
    }
    if let Some((mapping, validation)) = best {
        if accepted(&validation, settings) {
            return found(mapping, validation, tried);
        }
    }

    // 2. every ordered triple
    let profile = |index: usize| numeric.iter().find(|p| p.index == index);
    let indices: Vec<usize> = numeric.iter().map(|p| p.index).collect();
    let mut best: Option<(ColumnMapping, SolveValidation, (usize, u8, bool))> = None;
    for &t in &indices {
        for &p in indices.iter().filter(|&&p| p != t) {
            for &b in indices.iter().filter(|&&b| b != p && b != t) {
                let mapping = ColumnMapping::column(b, p, t);
                let validation = evaluate(&grid, &mapping, tolerances);
                tried += 1;
                let score = u8::from(t == total)
                    + u8::from(p == price)
                    + u8::from(profile(t).is_some_and(ColumnProfile::money_like))
                    + u8::from(profile(p).is_some_and(ColumnProfile::price_like));
                // B × P is symmetric; prefer price to the right of billing
                let key = (validation.valid_rows, score, p > b);
                if best.as_ref().map_or(true, |(_, _, k)| key > *k) {
                    best = Some((mapping, validation, key));
                }
            }
        }
    }
    if let Some((mapping, validation, _)) = best {
        if accepted(&validation, settings) {
            return found(mapping, validation, tried);
        }
    }

    // 3. packaging notation in the description, alone or times a column
    if let (Some(description), true) = (grid.description, grid.has_formats()) {
        let mut best: Option<(ColumnMapping, SolveValidation)> = None;
        let multipliers = std::iter::once(None).chain(
            indices
                .iter()
                .filter(|&&i| i != price && i != total)
                .map(|&i| Some(i)),
        );
        for billing_index in multipliers {
            let mapping = ColumnMapping {
                billing_index,
                price_index: price,
                total_index: total,
                description_index: Some(description),
                source: MappingSource::Format,
                is_derived: false,
            };
            let validation = evaluate(&grid, &mapping, tolerances);
            tried += 1;
            if best.as_ref().map_or(true, |(_, b)| validation.valid_rows > b.valid_rows) {
                best = Some((mapping, validation));
            }
        }
        if let Some((mapping, validation)) = best {
            if accepted(&validation, settings) {
                return found(mapping, validation, tried);
            }
        }
    }

    // 4. B = T ÷ P
    let mapping = ColumnMapping::derived(price, total);
    let validation = evaluate(&grid, &mapping, tolerances);
    tried += 1;
    let mut outcome = found(mapping, validation, tried);
    outcome.reason = Some("no column combination validated; billing value derived as total ÷ price".to_string());
    outcome
}

/// Start offsets of the sample windows: evenly spread, at most `max_subsets`.
fn sample_windows(rows: usize, sample_rows: usize, max_subsets: usize) -> Vec<Range<usize>> {
    let size = sample_rows.max(1);
    if rows <= size {
        return vec![0..rows];
    }
    let span = rows - size;
    let count = max_subsets.max(1).min(span + 1);
    if count == 1 {
        return vec![0..size];
    }
    (0..count)
        .map(|i| {
            let start = i * span / (count - 1);
            start..start + size
        })
        .collect()
}

/// Solves independent row windows and accepts the majority mapping when its
/// share of votes reaches `consensus_threshold`.
pub fn solve_columns_consensus(
    rows: &[Row],
    description_column: Option<usize>,
    settings: &SolverSettings,
    tolerances: &ToleranceModel,
) -> ConsensusOutcome {
    let windows = sample_windows(rows.len(), settings.sample_rows, settings.max_subsets);
    let outcomes: Vec<SolveOutcome> = windows
        .par_iter()
        .map(|window| solve_columns(&rows[window.clone()], description_column, settings, tolerances))
        .collect();

    let mut tally: IndexMap<ColumnMapping, usize> = IndexMap::new();
    for mapping in outcomes.iter().filter_map(|o| o.mapping.clone()) {
        *tally.entry(mapping).or_insert(0) += 1;
    }
    let mut votes: Vec<MappingVote> = tally
        .into_iter()
        .map(|(mapping, votes)| MappingVote { mapping, votes })
        .collect();
    votes.sort_by(|a, b| b.votes.cmp(&a.votes));

    let subsets = windows.len();
    let Some(top) = votes.first().cloned() else {
        let reason = outcomes
            .into_iter()
            .find_map(|o| o.reason)
            .unwrap_or_else(|| "no subset produced a mapping".to_string());
        return ConsensusOutcome {
            found: false,
            mapping: None,
            agreement: 0.0,
            subsets,
            votes,
            validation: None,
            reason: Some(reason),
        };
    };

    let agreement = top.votes as f64 / subsets as f64;
    if agreement < settings.consensus_threshold {
        tracing::debug!("no consensus: best mapping {} has {}/{} votes", top.mapping, top.votes, subsets);
        return ConsensusOutcome {
            found: false,
            mapping: None,
            agreement,
            subsets,
            votes,
            validation: None,
            reason: Some(format!(
                "no mapping reached consensus ({:.0}% agreement, {:.0}% required)",
                agreement * 100.0,
                settings.consensus_threshold * 100.0
            )),
        };
    }

    let validation = validate_rows_with_mapping(rows, &top.mapping, tolerances);
    ConsensusOutcome {
        found: true,
        mapping: Some(top.mapping),
        agreement,
        subsets,
        votes,
        validation: Some(validation),
        reason: None,
    }
}

/// Line fields for every row under a frozen mapping.
pub fn apply_mapping(rows: &[Row], mapping: &ColumnMapping) -> Vec<LineFields> {
    let grid = Grid::new(rows, mapping.description_index);
    (0..grid.len()).map(|row| grid.fields(row, mapping)).collect()
}

/// Line fields and their validation for every row under a frozen mapping.
/// Format mappings carry the formula kind of each row's own notation.
pub fn validate_mapped_rows(
    rows: &[Row],
    mapping: &ColumnMapping,
    tolerances: &ToleranceModel,
) -> Vec<(LineFields, LineValidation)> {
    let grid = Grid::new(rows, mapping.description_index);
    let label = mapping.to_string();
    (0..grid.len())
        .map(|row| grid.validate_row(row, mapping, &label, tolerances))
        .collect()
}

/// Re-validates every row under a frozen mapping.
pub fn validate_rows_with_mapping(
    rows: &[Row],
    mapping: &ColumnMapping,
    tolerances: &ToleranceModel,
) -> SolveValidation {
    let grid = Grid::new(rows, mapping.description_index);
    evaluate(&grid, mapping, tolerances)
}

/// Reads raw rows from CSV text. No header handling and no type coercion:
/// a header line is just a row the solver finds no numbers in.
pub fn parse_csv_rows(text: &str) -> Result<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|cell| {
                    if cell.is_empty() {
                        CellValue::Null
                    } else {
                        CellValue::text(cell)
                    }
                })
                .collect(),
        );
    }
    Ok(rows)
}
