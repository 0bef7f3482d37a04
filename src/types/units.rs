//! Unit Conversion Utilities
//!
//! Amounts travel through the API and the domain as `Decimal` in the asset's
//! decimal unit (SOL). The settlement ledger and the SQLite store work in
//! integer base units (lamports). Both the base asset and the derivative use
//! 9 decimals, so one base unit of SOL backs one base unit of the derivative.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

/// Lamports per SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Decimal places of the base asset and the derivative
pub const BASE_DECIMALS: u32 = 9;

/// Conversion errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitsError {
    #[error("amount must be positive")]
    NotPositive,

    #[error("amount has more than 9 decimal places")]
    TooPrecise,

    #[error("amount out of range")]
    Overflow,
}

/// Convert a decimal amount to base units (lamports)
///
/// Rejects zero, negative values and anything finer than one lamport.
pub fn to_base_units(amount: Decimal) -> Result<u64, UnitsError> {
    if amount <= Decimal::ZERO {
        return Err(UnitsError::NotPositive);
    }

    let scaled = amount
        .checked_mul(Decimal::from(LAMPORTS_PER_SOL))
        .ok_or(UnitsError::Overflow)?;

    if !scaled.fract().is_zero() {
        return Err(UnitsError::TooPrecise);
    }

    scaled.to_u64().ok_or(UnitsError::Overflow)
}

/// Convert a signed decimal delta to signed base units (for vault deltas)
pub fn to_signed_base_units(delta: Decimal) -> Result<i64, UnitsError> {
    let scaled = delta
        .checked_mul(Decimal::from(LAMPORTS_PER_SOL))
        .ok_or(UnitsError::Overflow)?;

    if !scaled.fract().is_zero() {
        return Err(UnitsError::TooPrecise);
    }

    scaled.to_i64().ok_or(UnitsError::Overflow)
}

/// Convert base units to a normalized decimal amount
pub fn from_base_units(units: u64) -> Decimal {
    Decimal::from_i128_with_scale(units as i128, BASE_DECIMALS).normalize()
}

/// Convert signed base units to a normalized decimal amount
pub fn from_signed_base_units(units: i64) -> Decimal {
    Decimal::from_i128_with_scale(units as i128, BASE_DECIMALS).normalize()
}

/// Human-readable amount, e.g. "1.5 SOL (1,500,000,000 lamports)"
pub fn format_amount(amount: Decimal, symbol: &str) -> String {
    match to_base_units(amount) {
        Ok(units) => format!("{} {} ({} lamports)", amount.normalize(), symbol, format_with_commas(units)),
        Err(_) => format!("{} {}", amount.normalize(), symbol),
    }
}

/// Format number with thousands separators
fn format_with_commas(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_to_base_units() {
        assert_eq!(to_base_units(dec("1")), Ok(1_000_000_000));
        assert_eq!(to_base_units(dec("2.0")), Ok(2_000_000_000));
        assert_eq!(to_base_units(dec("1.5")), Ok(1_500_000_000));
        assert_eq!(to_base_units(dec("0.000000001")), Ok(1));
    }

    #[test]
    fn test_rejects_bad_amounts() {
        assert_eq!(to_base_units(Decimal::ZERO), Err(UnitsError::NotPositive));
        assert_eq!(to_base_units(dec("-1")), Err(UnitsError::NotPositive));
        assert_eq!(to_base_units(dec("0.0000000001")), Err(UnitsError::TooPrecise));
    }

    #[test]
    fn test_from_base_units() {
        assert_eq!(from_base_units(2_000_000_000), dec("2"));
        assert_eq!(from_base_units(1_500_000_000), dec("1.5"));
        assert_eq!(from_base_units(1), dec("0.000000001"));
        assert_eq!(from_signed_base_units(-1_500_000_000), dec("-1.5"));
    }

    #[test]
    fn test_signed_deltas() {
        assert_eq!(to_signed_base_units(dec("-1.5")), Ok(-1_500_000_000));
        assert_eq!(to_signed_base_units(Decimal::ZERO), Ok(0));
    }

    #[test]
    fn test_display_format() {
        let display = format_amount(dec("1.5"), "SOL");
        assert!(display.contains("1,500,000,000 lamports"));
        assert!(display.starts_with("1.5 SOL"));
    }
}
