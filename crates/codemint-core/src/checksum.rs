//! # Check Digit
//!
//! The checksum capability the issuance engine depends on.
//!
//! Any deterministic, side-effect-free function that maps a digit string to one
//! digit can stand in for [`Gs1Mod10`]; the engine only sees the
//! [`CheckDigit`] trait.
//!
//! ## GS1 Mod-10
//! ```text
//! base  = 1 2 3 4 0 0 0 0 0 0 0 1
//! weight= 1 3 1 3 1 3 1 3 1 3 1 3   (3 on the rightmost digit, alternating)
//! sum   = 25
//! check = (10 - 25 % 10) % 10 = 5   →  1234000000015
//! ```

use crate::error::{IssuanceError, IssuanceResult};

/// A deterministic check-digit function.
pub trait CheckDigit: Send + Sync {
    /// Computes the check digit for `base`.
    ///
    /// ## Errors
    /// `InvalidInput` when `base` is empty or contains a non-digit.
    fn check_digit(&self, base: &str) -> IssuanceResult<char>;

    /// Whether the last digit of `code` is the check digit of the rest.
    fn verify(&self, code: &str) -> IssuanceResult<bool> {
        if code.len() < 2 || !code.is_ascii() {
            return Err(IssuanceError::InvalidInput(code.to_string()));
        }
        let (base, last) = code.split_at(code.len() - 1);
        let expected = self.check_digit(base)?;
        Ok(last.starts_with(expected))
    }
}

/// GS1 weighted mod-10 (EAN/UPC family).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Gs1Mod10;

impl CheckDigit for Gs1Mod10 {
    fn check_digit(&self, base: &str) -> IssuanceResult<char> {
        if base.is_empty() || !base.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IssuanceError::InvalidInput(base.to_string()));
        }

        let sum: u32 = base
            .bytes()
            .rev()
            .enumerate()
            .map(|(i, b)| {
                let digit = u32::from(b - b'0');
                if i % 2 == 0 {
                    digit * 3
                } else {
                    digit
                }
            })
            .sum();

        let check = (10 - sum % 10) % 10;
        // check is always 0..=9
        Ok(char::from(b'0' + check as u8))
    }
}

/// Computes the GS1 check digit of `base`.
///
/// ## Example
/// ```rust
/// use codemint_core::checksum::check_digit;
///
/// assert_eq!(check_digit("400638133393").unwrap(), '1');
/// assert!(check_digit("12a4").is_err());
/// ```
pub fn check_digit(base: &str) -> IssuanceResult<char> {
    Gs1Mod10.check_digit(base)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_ean13() {
        assert_eq!(check_digit("400638133393").unwrap(), '1');
        assert_eq!(check_digit("123400000001").unwrap(), '5');
    }

    #[test]
    fn test_known_upc() {
        assert_eq!(check_digit("03600029145").unwrap(), '2');
    }

    #[test]
    fn test_deterministic() {
        let a = check_digit("98765432100").unwrap();
        let b = check_digit("98765432100").unwrap();
        assert_eq!(a, b);
        assert!(a.is_ascii_digit());
    }

    #[test]
    fn test_rejects_non_digits() {
        assert!(matches!(check_digit(""), Err(IssuanceError::InvalidInput(_))));
        assert!(matches!(check_digit("12 4"), Err(IssuanceError::InvalidInput(_))));
        assert!(matches!(check_digit("١٢٣"), Err(IssuanceError::InvalidInput(_))));
    }

    #[test]
    fn test_verify() {
        assert!(Gs1Mod10.verify("4006381333931").unwrap());
        assert!(!Gs1Mod10.verify("4006381333932").unwrap());
        assert!(Gs1Mod10.verify("7").is_err());
    }
}
