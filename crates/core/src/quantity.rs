//! Quantity rules shared by the ledger and the cutting workflow.

use core::str::FromStr;

use rust_decimal::Decimal;

use crate::error::{DomainError, DomainResult};

/// Maximum number of fractional digits a stored quantity may carry (`NUMERIC(18,4)`).
pub const MAX_QUANTITY_SCALE: u32 = 4;

/// Validate a strictly positive quantity with a storable scale.
pub fn positive(quantity: Decimal, what: &str) -> DomainResult<Decimal> {
    if quantity <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "{what} must be positive (got {quantity})"
        )));
    }
    storable(quantity, what)
}

/// Validate that a (signed) quantity fits the stored scale. Trailing zeros are dropped.
pub fn storable(quantity: Decimal, what: &str) -> DomainResult<Decimal> {
    let normalized = quantity.normalize();
    if normalized.scale() > MAX_QUANTITY_SCALE {
        return Err(DomainError::validation(format!(
            "{what} has more than {MAX_QUANTITY_SCALE} decimal places (got {quantity})"
        )));
    }
    Ok(normalized)
}

/// Coerce free-form text into a positive quantity.
pub fn parse_positive(raw: &str, what: &str) -> DomainResult<Decimal> {
    let quantity = Decimal::from_str(raw.trim())
        .map_err(|e| DomainError::validation(format!("{what} is not a decimal number: {e}")))?;
    positive(quantity, what)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn positive_rejects_zero_and_negative() {
        assert!(positive(Decimal::ZERO, "quantity").is_err());
        assert!(positive(dec!(-1), "quantity").is_err());
        assert_eq!(positive(dec!(2.50), "quantity").unwrap(), dec!(2.5));
    }

    #[test]
    fn scale_beyond_four_places_is_rejected() {
        assert!(positive(dec!(0.00001), "quantity").is_err());
        assert!(positive(dec!(0.0001), "quantity").is_ok());
    }

    #[test]
    fn parse_positive_trims_and_validates() {
        assert_eq!(parse_positive(" 12.5 ", "quantity").unwrap(), dec!(12.5));
        assert!(matches!(
            parse_positive("twelve", "quantity"),
            Err(DomainError::Validation(_))
        ));
    }
}
