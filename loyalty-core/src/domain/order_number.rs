//! Order number validation (Luhn checksum)

use super::result::{Error, Result};

/// Check an order number against the Luhn algorithm.
///
/// The number must be a non-empty run of ASCII digits. The rightmost digit is
/// the check digit; every second digit to its left is doubled.
pub fn is_valid_order_number(number: &str) -> bool {
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let sum: u32 = number
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let digit = u32::from(b - b'0');
            if i % 2 == 1 {
                let doubled = digit * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                digit
            }
        })
        .sum();

    sum % 10 == 0
}

/// Trim and validate a caller-supplied order number.
pub fn parse_order_number(raw: &str) -> Result<String> {
    let number = raw.trim();
    if is_valid_order_number(number) {
        Ok(number.to_string())
    } else {
        Err(Error::InvalidOrderFormat(raw.to_string()))
    }
}
