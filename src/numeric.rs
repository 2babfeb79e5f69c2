//! Decimal parsing and rounding shared by the engine.

use bigdecimal::BigDecimal;
use std::str::FromStr;

use crate::constants::MONEY_SCALE;

/// A cell that parsed as a number, with the hints the column ranker needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNumber {
    pub value: BigDecimal,
    /// Digits after the decimal separator as written.
    pub decimals: usize,
    /// A currency glyph or code was present.
    pub currency: bool,
}

const CURRENCY_MARKERS: &[&str] = &["CAD", "USD", "EUR", "$CA", "CA$", "$", "€", "£"];

/// Parses a raw extracted cell.
///
/// Accepts both conventions seen on invoices: `1,234.56` (thousands comma)
/// and `1 234,56` / `1.234,56` (decimal comma). Parentheses and a trailing
/// minus mark negatives. Returns `None` for anything that is not purely
/// numeric once currency markers and spaces are removed.
pub fn parse_number(raw: &str) -> Option<ParsedNumber> {
    let mut text = raw.trim().to_uppercase();
    if text.is_empty() {
        return None;
    }

    let mut currency = false;
    for marker in CURRENCY_MARKERS {
        if text.contains(marker) {
            currency = true;
            text = text.replace(marker, "");
        }
    }

    let mut negative = false;
    let mut body: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\u{202f}' && *c != '\'')
        .collect();
    if body.starts_with('(') && body.ends_with(')') && body.len() > 2 {
        negative = true;
        body = body[1..body.len() - 1].to_string();
    }
    if let Some(stripped) = body.strip_suffix('-') {
        negative = true;
        body = stripped.to_string();
    }
    if let Some(stripped) = body.strip_prefix('-') {
        negative = !negative;
        body = stripped.to_string();
    } else if let Some(stripped) = body.strip_prefix('+') {
        body = stripped.to_string();
    }

    let canonical = canonical_decimal(&body)?;
    let decimals = canonical.split('.').nth(1).map(str::len).unwrap_or(0);
    let mut value = BigDecimal::from_str(&canonical).ok()?;
    if negative {
        value = -value;
    }
    Some(ParsedNumber {
        value,
        decimals,
        currency,
    })
}

/// Rewrites a separator-laden numeral into `1234.56` form.
fn canonical_decimal(body: &str) -> Option<String> {
    if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return None;
    }
    if !body.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let last_dot = body.rfind('.');
    let last_comma = body.rfind(',');
    let canonical = match (last_dot, last_comma) {
        (None, None) => body.to_string(),
        // both present: the right-most one is the decimal separator
        (Some(d), Some(c)) => {
            let (decimal_sep, group_sep) = if d > c { ('.', ',') } else { (',', '.') };
            let split_at = d.max(c);
            let (int_part, frac_part) = body.split_at(split_at);
            if frac_part[1..].contains(decimal_sep) || frac_part[1..].contains(group_sep) {
                return None;
            }
            if !is_grouped(int_part, group_sep) {
                return None;
            }
            format!("{}.{}", int_part.replace(group_sep, ""), &frac_part[1..])
        }
        (Some(_), None) => single_separator(body, '.')?,
        (None, Some(_)) => single_separator(body, ',')?,
    };
    if canonical.starts_with('.') {
        return Some(format!("0{canonical}"));
    }
    if canonical.ends_with('.') {
        return None;
    }
    Some(canonical)
}

/// Only one kind of separator present: grouping if it forms clean groups of
/// three (`1,234,567`, `1.234.567`), otherwise a decimal separator. A lone
/// dot is always decimal (`4.536` kg).
fn single_separator(body: &str, sep: char) -> Option<String> {
    let count = body.matches(sep).count();
    if count > 1 {
        return is_grouped(body, sep).then(|| body.replace(sep, ""));
    }
    let (int_part, frac_part) = body.split_once(sep)?;
    if sep == ',' && frac_part.len() == 3 && !int_part.is_empty() && int_part != "0" && int_part.len() <= 3 {
        // "1,250" reads as twelve hundred fifty, "0,250" as a fraction
        return Some(format!("{int_part}{frac_part}"));
    }
    Some(format!("{int_part}.{frac_part}"))
}

fn is_grouped(int_part: &str, sep: char) -> bool {
    let groups: Vec<&str> = int_part.split(sep).collect();
    if groups.len() == 1 {
        return true;
    }
    let first_ok = !groups[0].is_empty() && groups[0].len() <= 3;
    first_ok && groups[1..].iter().all(|g| g.len() == 3)
}

/// Number token captured by a packaging regex ("2,5" or "2.5").
pub fn parse_token(token: &str) -> Option<BigDecimal> {
    BigDecimal::from_str(&token.replace(',', ".")).ok()
}

/// Half-up rounding to cents.
pub fn round_money(value: &BigDecimal) -> BigDecimal {
    value.round(MONEY_SCALE).with_scale(MONEY_SCALE)
}

/// Display without trailing zeros: `10.0` → `10`, `2.50` → `2.5`.
pub fn trim_display(value: &BigDecimal) -> String {
    let text = value.to_string();
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

/// Money display with exactly two decimals.
pub fn money_display(value: &BigDecimal) -> String {
    round_money(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn plain_and_currency_numbers() {
        let p = parse_number("$44.55").unwrap();
        assert_eq!(p.value, d("44.55"));
        assert_eq!(p.decimals, 2);
        assert!(p.currency);
        assert_eq!(parse_number("12").unwrap().value, d("12"));
        assert_eq!(parse_number(" 3,5 ").unwrap().value, d("3.5"));
    }

    #[test]
    fn thousands_versus_decimal_comma() {
        assert_eq!(parse_number("1,234.56").unwrap().value, d("1234.56"));
        assert_eq!(parse_number("1.234,56").unwrap().value, d("1234.56"));
        assert_eq!(parse_number("1 234,56 $").unwrap().value, d("1234.56"));
        assert_eq!(parse_number("1,234,567").unwrap().value, d("1234567"));
        assert_eq!(parse_number("22,50").unwrap().value, d("22.50"));
        assert_eq!(parse_number("1,250").unwrap().value, d("1250"));
        assert_eq!(parse_number("0,250").unwrap().value, d("0.250"));
        assert_eq!(parse_number("4.536").unwrap().value, d("4.536"));
    }

    #[test]
    fn negatives() {
        assert_eq!(parse_number("(10.00)").unwrap().value, d("-10"));
        assert_eq!(parse_number("10.00-").unwrap().value, d("-10"));
        assert_eq!(parse_number("-3").unwrap().value, d("-3"));
    }

    #[test]
    fn rejects_text_and_packaging() {
        assert!(parse_number("4/5LB").is_none());
        assert!(parse_number("SAUMON").is_none());
        assert!(parse_number("").is_none());
        assert!(parse_number("12.34.5").is_none());
        assert!(parse_number("$").is_none());
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(round_money(&d("10.47375")), d("10.47"));
        assert_eq!(round_money(&d("9.975")), d("9.98"));
        assert_eq!(round_money(&d("0.005")), d("0.01"));
        assert_eq!(money_display(&d("5")), "5.00");
    }

    #[test]
    fn display_trims_trailing_zeros() {
        assert_eq!(trim_display(&d("10.0")), "10");
        assert_eq!(trim_display(&d("2.50")), "2.5");
        assert_eq!(trim_display(&d("100")), "100");
    }
}
