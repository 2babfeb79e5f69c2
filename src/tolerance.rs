//! Tolerance model shared by every validator.
//!
//! A tolerance band is `max(absolute, relative × |expected|)`: rounding noise
//! grows with the amount but never drops below a cent-level floor.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::constants::decimal;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    #[serde(with = "crate::models::amount")]
    pub absolute: BigDecimal,
    #[serde(with = "crate::models::amount")]
    pub relative: BigDecimal,
}

impl Tolerance {
    pub fn new(absolute: &str, relative: &str) -> Self {
        Self {
            absolute: decimal(absolute),
            relative: decimal(relative),
        }
    }

    /// Maximum acceptable absolute difference for `expected`.
    pub fn band(&self, expected: &BigDecimal) -> BigDecimal {
        let scaled = &self.relative * expected.abs();
        if scaled > self.absolute {
            scaled
        } else {
            self.absolute.clone()
        }
    }

    /// Same band with the floor widened by `extra`.
    pub fn band_with_floor(&self, expected: &BigDecimal, extra: &BigDecimal) -> BigDecimal {
        let floor = &self.absolute + extra;
        let scaled = &self.relative * expected.abs();
        if scaled > floor {
            scaled
        } else {
            floor
        }
    }
}

/// Outcome of comparing a calculated figure to a declared one.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub difference: BigDecimal,
    pub tolerance: BigDecimal,
    pub within: bool,
}

pub fn compare(calculated: &BigDecimal, expected: &BigDecimal, band: BigDecimal) -> Comparison {
    let difference = (calculated - expected).abs();
    let within = difference <= band;
    Comparison {
        difference,
        tolerance: band,
        within,
    }
}

/// Tolerance profiles per check level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceModel {
    pub line: Tolerance,
    pub sum: Tolerance,
    /// Added to the sum floor for every line, so rounding that compounds
    /// over long invoices is not reported as a mismatch.
    #[serde(with = "crate::models::amount")]
    pub sum_per_line: BigDecimal,
    pub tax: Tolerance,
    pub grand_total: Tolerance,
}

impl Default for ToleranceModel {
    fn default() -> Self {
        Self {
            line: Tolerance::new("0.02", "0.005"),
            sum: Tolerance::new("0.05", "0.001"),
            sum_per_line: decimal("0.005"),
            tax: Tolerance::new("0.02", "0.005"),
            grand_total: Tolerance::new("0.05", "0.001"),
        }
    }
}

impl ToleranceModel {
    pub fn line_band(&self, expected: &BigDecimal) -> BigDecimal {
        self.line.band(expected)
    }

    pub fn sum_band(&self, expected: &BigDecimal, line_count: usize) -> BigDecimal {
        let extra = &self.sum_per_line * BigDecimal::from(line_count as u64);
        self.sum.band_with_floor(expected, &extra)
    }

    pub fn tax_band(&self, expected: &BigDecimal) -> BigDecimal {
        self.tax.band(expected)
    }

    pub fn grand_total_band(&self, expected: &BigDecimal) -> BigDecimal {
        self.grand_total.band(expected)
    }
}
