//! Serde helpers for decimal amounts.
//!
//! Extraction services emit amounts either as JSON numbers or as strings, so
//! both are accepted. Numbers go through their shortest textual form to avoid
//! binary float noise (`0.1` stays `0.1`).

use bigdecimal::BigDecimal;
use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;
use std::str::FromStr;

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = BigDecimal;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal number or numeric string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<BigDecimal, E> {
        Ok(BigDecimal::from(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<BigDecimal, E> {
        Ok(BigDecimal::from(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<BigDecimal, E> {
        if !v.is_finite() {
            return Err(E::custom(format!("non-finite amount {v}")));
        }
        BigDecimal::from_str(&v.to_string()).map_err(E::custom)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<BigDecimal, E> {
        BigDecimal::from_str(v.trim()).map_err(|_| E::custom(format!("invalid amount '{v}'")))
    }
}

pub fn serialize<S: Serializer>(value: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigDecimal, D::Error> {
    deserializer.deserialize_any(AmountVisitor)
}

/// Same as the parent module for `Option<BigDecimal>`; `null` stays `None`.
pub mod option {
    use super::AmountVisitor;
    use bigdecimal::BigDecimal;
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    struct OptionVisitor;

    impl<'de> Visitor<'de> for OptionVisitor {
        type Value = Option<BigDecimal>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a decimal number, numeric string or null")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            d.deserialize_any(AmountVisitor).map(Some)
        }
    }

    pub fn serialize<S: Serializer>(
        value: &Option<BigDecimal>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.collect_str(v),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<BigDecimal>, D::Error> {
        deserializer.deserialize_option(OptionVisitor)
    }
}

/// Sequence form, e.g. a list of line totals.
pub mod seq {
    use bigdecimal::BigDecimal;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    struct Amount(#[serde(with = "super")] BigDecimal);

    pub fn serialize<S: Serializer>(values: &[BigDecimal], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|v| v.to_string()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<BigDecimal>, D::Error> {
        let amounts = Vec::<Amount>::deserialize(deserializer)?;
        Ok(amounts.into_iter().map(|a| a.0).collect())
    }
}
