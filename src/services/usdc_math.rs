//! Exact USDC arithmetic.
//!
//! Amounts travel as strings with up to six fractional digits and are
//! computed on scaled 128-bit integers (value x 10^6), so price math never
//! touches floating point.

use std::cmp::Ordering;

pub const USDC_DECIMALS: u32 = 6;
const SCALE: i128 = 1_000_000;
/// 10^4: scaled units per whole cent.
const CENT_SCALE: i128 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    Malformed(String),
    Overflow(String),
}

impl std::fmt::Display for AmountError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AmountError::Malformed(amount) => write!(f, "invalid amount: {}", amount),
            AmountError::Overflow(amount) => write!(f, "amount out of range: {}", amount),
        }
    }
}

impl std::error::Error for AmountError {}

/// Parse an amount string matching `^\d+(\.\d{1,6})?$` into scaled units.
pub fn parse_usdc(amount: &str) -> Result<i128, AmountError> {
    let (whole, frac) = match amount.split_once('.') {
        Some((whole, frac)) => (whole, Some(frac)),
        None => (amount, None),
    };

    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AmountError::Malformed(amount.to_string()));
    }
    if let Some(frac) = frac {
        if frac.is_empty()
            || frac.len() > USDC_DECIMALS as usize
            || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(AmountError::Malformed(amount.to_string()));
        }
    }

    let whole: i128 = whole
        .parse()
        .map_err(|_| AmountError::Overflow(amount.to_string()))?;
    let frac_raw: i128 = match frac {
        Some(frac) => {
            // digits already validated, at most six of them
            let digits: i128 = frac
                .parse()
                .map_err(|_| AmountError::Malformed(amount.to_string()))?;
            digits * 10_i128.pow(USDC_DECIMALS - frac.len() as u32)
        }
        None => 0,
    };

    whole
        .checked_mul(SCALE)
        .and_then(|w| w.checked_add(frac_raw))
        .ok_or_else(|| AmountError::Overflow(amount.to_string()))
}

/// Format scaled units back to a string with six fractional digits.
pub fn format_usdc(raw: i128) -> String {
    let sign = if raw < 0 { "-" } else { "" };
    let abs = raw.unsigned_abs();
    let whole = abs / SCALE.unsigned_abs();
    let frac = abs % SCALE.unsigned_abs();
    format!("{}{}.{:06}", sign, whole, frac)
}

pub fn multiply_usdc(unit_price: &str, quantity: u32) -> Result<String, AmountError> {
    let raw = parse_usdc(unit_price)?;
    let total = raw
        .checked_mul(quantity as i128)
        .ok_or_else(|| AmountError::Overflow(unit_price.to_string()))?;
    Ok(format_usdc(total))
}

pub fn add_usdc(a: &str, b: &str) -> Result<String, AmountError> {
    let total = parse_usdc(a)?
        .checked_add(parse_usdc(b)?)
        .ok_or_else(|| AmountError::Overflow(format!("{} + {}", a, b)))?;
    Ok(format_usdc(total))
}

pub fn compare_usdc(a: &str, b: &str) -> Result<Ordering, AmountError> {
    Ok(parse_usdc(a)?.cmp(&parse_usdc(b)?))
}

pub fn is_positive_usdc(amount: &str) -> bool {
    parse_usdc(amount).map(|raw| raw > 0).unwrap_or(false)
}

/// Whole cents for card-network minor units, rounding half up.
pub fn usdc_to_cents(amount: &str) -> Result<i64, AmountError> {
    let raw = parse_usdc(amount)?;
    let cents = (raw + CENT_SCALE / 2) / CENT_SCALE;
    i64::try_from(cents).map_err(|_| AmountError::Overflow(amount.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_format_round_trip() {
        for amount in ["0", "1", "10.5", "12.34", "0.000001", "99999.999999"] {
            let raw = parse_usdc(amount).unwrap();
            let formatted = format_usdc(raw);
            // equal after normalizing to six fractional digits
            assert_eq!(parse_usdc(&formatted).unwrap(), raw, "{amount}");
        }
        assert_eq!(format_usdc(parse_usdc("12.34").unwrap()), "12.340000");
        assert_eq!(format_usdc(parse_usdc("0").unwrap()), "0.000000");
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["", ".", "1.", ".5", "1.2345678", "1,00", "-1", "1e3", "12.3a", "a"] {
            assert!(parse_usdc(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn multiply_is_exact() {
        assert_eq!(multiply_usdc("19.99", 1).unwrap(), "19.990000");
        assert_eq!(multiply_usdc("19.99", 2).unwrap(), "39.980000");
        assert_eq!(multiply_usdc("19.99", 3).unwrap(), "59.970000");
        assert_eq!(multiply_usdc("0.333333", 3).unwrap(), "0.999999");
    }

    #[test]
    fn compare_never_uses_floats() {
        assert_eq!(compare_usdc("10.00", "10.000001").unwrap(), Ordering::Less);
        assert_eq!(compare_usdc("10.000000", "10").unwrap(), Ordering::Equal);
        assert_eq!(compare_usdc("10.1", "10.09").unwrap(), Ordering::Greater);
    }

    #[test]
    fn add_carries_fractions() {
        assert_eq!(add_usdc("0.999999", "0.000001").unwrap(), "1.000000");
        assert_eq!(add_usdc("45", "10").unwrap(), "55.000000");
    }

    #[test]
    fn positivity() {
        assert!(is_positive_usdc("0.000001"));
        assert!(!is_positive_usdc("0"));
        assert!(!is_positive_usdc("not-a-number"));
    }

    #[test]
    fn cents_round_half_up() {
        assert_eq!(usdc_to_cents("10.00").unwrap(), 1000);
        assert_eq!(usdc_to_cents("19.994999").unwrap(), 1999);
        assert_eq!(usdc_to_cents("19.995000").unwrap(), 2000);
    }
}
