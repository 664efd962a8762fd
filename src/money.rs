//! Money formatting for won-denominated amounts
//!
//! All prices in the catalog and order layer are `rust_decimal::Decimal`
//! (whole won, no sub-unit). Client-facing strings go through this module so
//! the comma-grouped surface is identical everywhere, including the text that
//! feeds TTS.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Format an amount as a comma-grouped won string, e.g. `6500` -> `"6,500"`.
///
/// Fractional parts are truncated (won has no sub-unit in this domain).
pub fn format_won(amount: Decimal) -> String {
    let whole = amount.trunc().to_i128().unwrap_or(0);
    group_thousands(whole)
}

fn group_thousands(value: i128) -> String {
    let negative = value < 0;
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    let offset = digits.len() % 3;
    for (i, ch) in digits.chars().enumerate() {
        if i != 0 && (i + 3 - offset) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if negative {
        format!("-{}", out)
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_won_normal_cases() {
        assert_eq!(format_won(Decimal::from(6500)), "6,500");
        assert_eq!(format_won(Decimal::from(500)), "500");
        assert_eq!(format_won(Decimal::from(13000)), "13,000");
        assert_eq!(format_won(Decimal::from(1234567)), "1,234,567");
    }

    #[test]
    fn test_format_won_boundary_cases() {
        assert_eq!(format_won(Decimal::ZERO), "0");
        assert_eq!(format_won(Decimal::from(1)), "1");
        assert_eq!(format_won(Decimal::from(999)), "999");
        assert_eq!(format_won(Decimal::from(1000)), "1,000");
    }

    #[test]
    fn test_format_won_truncates_fraction() {
        let amount = Decimal::new(65005, 1); // 6500.5
        assert_eq!(format_won(amount), "6,500");
    }

    #[test]
    fn test_format_won_negative() {
        assert_eq!(format_won(Decimal::from(-1500)), "-1,500");
    }
}
