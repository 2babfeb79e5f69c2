use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::constants::MeasureUnit;

/// Packaging notation families, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    /// `4/5LB`: four packs of five pounds.
    PackWeight,
    /// `12CT`, `4/12PC`, `2DZ`.
    PackCount,
    /// `6 x 500G`.
    Multiplied,
    /// `Caisse 25kg`.
    Embedded,
    SimpleWeight,
    SimpleVolume,
}

impl FormatKind {
    pub const PRIORITY: [FormatKind; 6] = [
        FormatKind::PackWeight,
        FormatKind::PackCount,
        FormatKind::Multiplied,
        FormatKind::Embedded,
        FormatKind::SimpleWeight,
        FormatKind::SimpleVolume,
    ];
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PackWeight => write!(f, "pack_weight"),
            Self::PackCount => write!(f, "pack_count"),
            Self::Multiplied => write!(f, "multiplied"),
            Self::Embedded => write!(f, "embedded"),
            Self::SimpleWeight => write!(f, "simple_weight"),
            Self::SimpleVolume => write!(f, "simple_volume"),
        }
    }
}

/// One packaging notation found in free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatMatch {
    pub kind: FormatKind,
    pub raw: String,
    /// Numbers as they appear, e.g. `[4, 5]` for `4/5LB`.
    pub components: Vec<BigDecimal>,
    pub unit: MeasureUnit,
    /// Quantity the unit price applies to, in `billing_unit`.
    pub billing_value: BigDecimal,
    pub billing_unit: MeasureUnit,
    /// `billing_value` converted to grams, millilitres or pieces.
    pub normalized_value: BigDecimal,
    pub formula: String,
}

/// All notations found in a text; `best_match` is the highest-priority one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatExtraction {
    pub found: bool,
    pub formats: Vec<FormatMatch>,
    pub best_match: Option<FormatMatch>,
}

impl FormatExtraction {
    pub fn first_of(&self, kind: FormatKind) -> Option<&FormatMatch> {
        self.formats.iter().find(|m| m.kind == kind)
    }

    pub fn all_of(&self, kind: FormatKind) -> impl Iterator<Item = &FormatMatch> {
        self.formats.iter().filter(move |m| m.kind == kind)
    }
}
