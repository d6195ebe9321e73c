//! ZIP Code Module
//! Canonical 5-digit ZIP identifier shared by every pipeline stage.

use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Width of a canonical ZIP code.
pub const ZIP_WIDTH: usize = 5;

#[derive(Error, Debug, Clone)]
pub enum ZipCodeError {
    #[error("no digits found in {0:?}")]
    NoDigits(String),
    #[error("digit run {0:?} is longer than {ZIP_WIDTH} characters")]
    TooLong(String),
    #[error("digit pattern failed to compile: {0}")]
    Pattern(#[from] regex::Error),
}

/// A zero-padded 5-digit ZIP code.
///
/// Stored as a fixed array of ASCII digits so it can never pass through a
/// numeric type and lose its leading zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ZipCode([u8; ZIP_WIDTH]);

impl ZipCode {
    /// Build a ZIP from a cell that should hold only digits, left-padding
    /// short values (`"501"` becomes `"00501"`).
    pub fn from_padded(raw: &str) -> Result<Self, ZipCodeError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ZipCodeError::NoDigits(raw.to_string()));
        }
        if trimmed.len() > ZIP_WIDTH {
            return Err(ZipCodeError::TooLong(trimmed.to_string()));
        }

        let mut digits = [b'0'; ZIP_WIDTH];
        digits[ZIP_WIDTH - trimmed.len()..].copy_from_slice(trimmed.as_bytes());
        Ok(Self(digits))
    }

    /// Extract the first run of digits from a free-form region label such as
    /// `"Zip Code: 90266"`.
    pub fn extract(region: &str) -> Result<Self, ZipCodeError> {
        let digits = digit_run()?
            .find(region)
            .ok_or_else(|| ZipCodeError::NoDigits(region.to_string()))?;
        Self::from_padded(digits.as_str())
    }

    pub fn as_str(&self) -> &str {
        // Only ASCII digits are ever stored.
        std::str::from_utf8(&self.0).unwrap_or("00000")
    }
}

/// Compiled once; a failed compile is cached and reported on every call.
fn digit_run() -> Result<&'static Regex, ZipCodeError> {
    static DIGITS: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    DIGITS
        .get_or_init(|| Regex::new(r"\d+"))
        .as_ref()
        .map_err(|e| ZipCodeError::Pattern(e.clone()))
}

impl fmt::Display for ZipCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ZipCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_zeros_survive() {
        let zip = ZipCode::from_padded("00501").unwrap();
        assert_eq!(zip.as_str(), "00501");
        assert_eq!(zip.to_string(), "00501");
    }

    #[test]
    fn test_short_values_are_padded() {
        assert_eq!(ZipCode::from_padded("501").unwrap().as_str(), "00501");
        assert_eq!(ZipCode::from_padded(" 7 ").unwrap().as_str(), "00007");
    }

    #[test]
    fn test_rejects_non_digits_and_long_runs() {
        assert!(matches!(
            ZipCode::from_padded("ABCDE"),
            Err(ZipCodeError::NoDigits(_))
        ));
        assert!(matches!(
            ZipCode::from_padded(""),
            Err(ZipCodeError::NoDigits(_))
        ));
        assert!(matches!(
            ZipCode::from_padded("123456"),
            Err(ZipCodeError::TooLong(_))
        ));
    }

    #[test]
    fn test_extract_from_region_label() {
        assert_eq!(
            ZipCode::extract("Zip Code: 90266").unwrap().as_str(),
            "90266"
        );
        assert_eq!(ZipCode::extract("00501, NY").unwrap().as_str(), "00501");
        assert!(ZipCode::extract("Zip Code: n/a").is_err());
    }

    #[test]
    fn test_digit_pattern_is_compiled_once() {
        let first = digit_run().unwrap();
        let second = digit_run().unwrap();
        assert!(std::ptr::eq(first, second));
        assert_eq!(first.find("ZIP 02134-1234").unwrap().as_str(), "02134");
    }

    #[test]
    fn test_ordering_is_lexical() {
        let a = ZipCode::from_padded("00501").unwrap();
        let b = ZipCode::from_padded("10017").unwrap();
        assert!(a < b);
    }
}
