use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::LazyLock;

/// Federal goods and services tax (TPS/GST).
pub const FEDERAL_RATE: &str = "0.05";

/// Provincial sales tax (TVQ/QST), applied on the compound base by default.
pub const PROVINCIAL_RATE: &str = "0.09975";

/// Money is always compared at cent precision.
pub const MONEY_SCALE: i64 = 2;

/// Scale used when a quantity has to be recovered by division.
pub const QUANTITY_SCALE: i64 = 6;

/// Parses one of the decimal literals above.
pub fn decimal(literal: &str) -> BigDecimal {
    BigDecimal::from_str(literal).unwrap_or_default()
}

/// Physical dimension a unit measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Weight,
    Volume,
    Count,
}

/// Units recognised in packaging notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureUnit {
    Gram,
    Kilogram,
    Pound,
    Ounce,
    Millilitre,
    Litre,
    Gallon,
    FluidOunce,
    Count,
    Dozen,
}

impl MeasureUnit {
    pub fn dimension(&self) -> Dimension {
        match self {
            Self::Gram | Self::Kilogram | Self::Pound | Self::Ounce => Dimension::Weight,
            Self::Millilitre | Self::Litre | Self::Gallon | Self::FluidOunce => Dimension::Volume,
            Self::Count | Self::Dozen => Dimension::Count,
        }
    }

    /// Factor to the dimension's base unit (grams, millilitres, pieces).
    pub fn base_factor(&self) -> &'static BigDecimal {
        // every unit is present in the tables below
        BASE_FACTORS.get(self).unwrap_or(&ONE)
    }

    /// Resolves a raw unit token ("LBS", "kg", "Dz") to a unit.
    pub fn from_token(token: &str) -> Option<Self> {
        let key: String = token
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '.')
            .collect::<String>()
            .to_uppercase();
        UNIT_ALIASES.get(key.as_str()).copied()
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Gram => "G",
            Self::Kilogram => "KG",
            Self::Pound => "LB",
            Self::Ounce => "OZ",
            Self::Millilitre => "ML",
            Self::Litre => "L",
            Self::Gallon => "GAL",
            Self::FluidOunce => "FLOZ",
            Self::Count => "CT",
            Self::Dozen => "DZ",
        }
    }
}

impl std::fmt::Display for MeasureUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

static ONE: LazyLock<BigDecimal> = LazyLock::new(|| BigDecimal::from(1));

/// Weight to grams, volume to millilitres, count to pieces.
static BASE_FACTORS: LazyLock<HashMap<MeasureUnit, BigDecimal>> = LazyLock::new(|| {
    [
        (MeasureUnit::Gram, "1"),
        (MeasureUnit::Kilogram, "1000"),
        (MeasureUnit::Pound, "453.592"),
        (MeasureUnit::Ounce, "28.3495"),
        (MeasureUnit::Millilitre, "1"),
        (MeasureUnit::Litre, "1000"),
        (MeasureUnit::Gallon, "3785.41"),
        (MeasureUnit::FluidOunce, "29.5735"),
        (MeasureUnit::Count, "1"),
        (MeasureUnit::Dozen, "12"),
    ]
    .into_iter()
    .map(|(unit, factor)| (unit, decimal(factor)))
    .collect()
});

static UNIT_ALIASES: LazyLock<HashMap<&'static str, MeasureUnit>> = LazyLock::new(|| {
    use MeasureUnit::{
        Count, Dozen, FluidOunce, Gallon, Gram, Kilogram, Litre, Millilitre, Ounce, Pound,
    };
    HashMap::from([
        ("G", Gram),
        ("GR", Gram),
        ("GRS", Gram),
        ("GRAM", Gram),
        ("GRAMS", Gram),
        ("GRAMME", Gram),
        ("GRAMMES", Gram),
        ("KG", Kilogram),
        ("KGS", Kilogram),
        ("KILO", Kilogram),
        ("KILOS", Kilogram),
        ("LB", Pound),
        ("LBS", Pound),
        ("#", Pound),
        ("OZ", Ounce),
        ("ML", Millilitre),
        ("L", Litre),
        ("LT", Litre),
        ("LITRE", Litre),
        ("LITRES", Litre),
        ("LITER", Litre),
        ("LITERS", Litre),
        ("GAL", Gallon),
        ("FLOZ", FluidOunce),
        ("CT", Count),
        ("PK", Count),
        ("PC", Count),
        ("PCS", Count),
        ("EA", Count),
        ("UN", Count),
        ("UNIT", Count),
        ("UNITS", Count),
        ("CS", Count),
        ("CASE", Count),
        ("CASES", Count),
        ("DZ", Dozen),
        ("DOZ", Dozen),
        ("DOZEN", Dozen),
    ])
});

/// Container keywords that introduce an embedded weight ("Caisse 25kg").
pub const CONTAINER_KEYWORDS: &[&str] = &[
    "CAISSE",
    "CAISSES",
    "BOITE",
    "BOÎTE",
    "SAC",
    "SACS",
    "SEAU",
    "POCHE",
    "CHAUDIERE",
    "CHAUDIÈRE",
    "BARIL",
    "CASE",
    "BOX",
    "BAG",
    "PAIL",
    "TUB",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_tokens_resolve_case_insensitively() {
        assert_eq!(MeasureUnit::from_token("lbs"), Some(MeasureUnit::Pound));
        assert_eq!(MeasureUnit::from_token("Kg"), Some(MeasureUnit::Kilogram));
        assert_eq!(MeasureUnit::from_token("fl oz"), Some(MeasureUnit::FluidOunce));
        assert_eq!(MeasureUnit::from_token("doz."), Some(MeasureUnit::Dozen));
        assert_eq!(MeasureUnit::from_token("PT"), None);
    }

    #[test]
    fn base_factors_cover_every_unit() {
        assert_eq!(MeasureUnit::Kilogram.base_factor(), &decimal("1000"));
        assert_eq!(MeasureUnit::Pound.base_factor(), &decimal("453.592"));
        assert_eq!(MeasureUnit::Dozen.base_factor(), &decimal("12"));
        assert_eq!(MeasureUnit::Litre.dimension(), Dimension::Volume);
    }
}
