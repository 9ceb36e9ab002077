//! Test utilities for query emission validation.
//!
//! Wraps [`super::validate::check_syntax`] with a string error so emitter
//! tests can `unwrap()` and see the offending text in the panic message.

use super::validate::check_syntax;

/// Validates that emitted query text is syntactically valid.
///
/// # Example
///
/// ```ignore
/// use crate::sql::test_utils::validate_query;
///
/// validate_query("SELECT A FROM Customer A").unwrap();
/// ```
pub fn validate_query(text: &str) -> Result<(), String> {
    check_syntax(text).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_valid_query() {
        validate_query("SELECT A FROM Customer A").unwrap();
        validate_query("SELECT DISTINCT A.country FROM Customer A ORDER BY A.country ASC").unwrap();
    }

    #[test]
    fn test_validate_invalid_query() {
        let result = validate_query("SELEC A FORM Customer A");
        assert!(result.is_err());
    }
}
