//! Asset-quantity wire format.
//!
//! Ledger quantities travel as decimal strings with a trailing
//! space-separated currency symbol, e.g. `"12.3400 RIDL"`. Arithmetic
//! uses the leading numeric field only; rendered values always carry
//! exactly 4 decimal digits.

use crate::error::{ReputeError, Result};

/// Parse the numeric field of an asset string, ignoring the symbol.
pub fn parse_amount(asset: &str) -> Result<f64> {
    let field = asset
        .split_whitespace()
        .next()
        .ok_or_else(|| ReputeError::Parse(format!("empty asset string: {asset:?}")))?;
    field
        .parse::<f64>()
        .map_err(|_| ReputeError::Parse(format!("bad asset quantity: {asset:?}")))
}

/// Render a quantity with 4 decimal digits and its currency symbol.
pub fn format_amount(value: f64, symbol: &str) -> String {
    format!("{value:.4} {symbol}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_leading_field() {
        assert_eq!(parse_amount("12.3400 RIDL").unwrap(), 12.34);
        assert_eq!(parse_amount("0.0000 RIDL").unwrap(), 0.0);
        assert_eq!(parse_amount("-1.5000 RIDL").unwrap(), -1.5);
        // symbol is ignored, even when missing
        assert_eq!(parse_amount("3.14").unwrap(), 3.14);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_amount("").is_err());
        assert!(parse_amount("   ").is_err());
        assert!(parse_amount("RIDL 1.0").is_err());
    }

    #[test]
    fn renders_four_decimals() {
        assert_eq!(format_amount(0.1, "RIDL"), "0.1000 RIDL");
        assert_eq!(format_amount(12.34, "RIDL"), "12.3400 RIDL");
        assert_eq!(format_amount(-0.5, "X"), "-0.5000 X");
    }
}
