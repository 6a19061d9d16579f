//! Symbol value object for tradeable tickers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::shared::DomainError;

/// A ticker symbol, normalized to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol, trimming and uppercasing the input.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_uppercase())
    }

    /// Borrow the symbol string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate the symbol for order entry.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidValue`] for an empty symbol or one with
    /// characters outside `A-Z`, `0-9`, `.`, `-` and `/`.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.0.is_empty() {
            return Err(DomainError::InvalidValue {
                field: "symbol".to_string(),
                message: "symbol must not be empty".to_string(),
            });
        }
        if !self
            .0
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '/'))
        {
            return Err(DomainError::InvalidValue {
                field: "symbol".to_string(),
                message: format!("symbol '{}' contains invalid characters", self.0),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(Symbol::new(" aapl ").as_str(), "AAPL");
    }

    #[test]
    fn validation() {
        assert!(Symbol::new("BRK.B").validate().is_ok());
        assert!(Symbol::new("").validate().is_err());
        assert!(Symbol::new("AA PL").validate().is_err());
    }
}
