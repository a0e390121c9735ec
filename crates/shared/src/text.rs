//! Text helpers: customer identifier normalization and script detection

use crate::error::DeskError;

/// Maximum length of a normalized customer identifier
pub const MAX_CUSTOMER_ID_LENGTH: usize = 255;

/// Normalize a customer identifier so that values differing only in case or
/// whitespace map to the same key.
pub fn normalize_customer_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Normalize and validate a customer identifier
pub fn validate_customer_id(raw: &str) -> Result<String, DeskError> {
    let normalized = normalize_customer_id(raw);
    if normalized.is_empty() {
        return Err(DeskError::Validation(
            "customer identifier cannot be empty".into(),
        ));
    }
    if normalized.chars().count() > MAX_CUSTOMER_ID_LENGTH {
        return Err(DeskError::Validation(format!(
            "customer identifier too long (max {} characters)",
            MAX_CUSTOMER_ID_LENGTH
        )));
    }
    Ok(normalized)
}

/// True if the character is in the Thai Unicode block (U+0E00–U+0E7F)
pub fn is_thai_char(c: char) -> bool {
    ('\u{0E00}'..='\u{0E7F}').contains(&c)
}

/// True if any character of the text is Thai script
pub fn contains_thai(text: &str) -> bool {
    text.chars().any(is_thai_char)
}

/// Case-insensitive substring test (Unicode lowercase on both sides)
pub fn contains_case_insensitive(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_case_and_whitespace() {
        assert_eq!(normalize_customer_id("  Player One "), "playerone");
        assert_eq!(normalize_customer_id("PLAYER\tone"), "playerone");
        assert_eq!(
            normalize_customer_id("player one"),
            normalize_customer_id("PlayerOne")
        );
    }

    #[test]
    fn test_validate_rejects_blank() {
        assert!(matches!(
            validate_customer_id("   "),
            Err(DeskError::Validation(_))
        ));
        assert_eq!(validate_customer_id(" Abc ").unwrap(), "abc");
    }

    #[test]
    fn test_validate_rejects_too_long() {
        let long = "a".repeat(MAX_CUSTOMER_ID_LENGTH + 1);
        assert!(validate_customer_id(&long).is_err());
    }

    #[test]
    fn test_thai_detection() {
        assert!(contains_thai("สมชาย"));
        assert!(contains_thai("john ใจดี"));
        assert!(!contains_thai("PlayerName_99"));
        assert!(!contains_thai(""));
    }

    #[test]
    fn test_contains_case_insensitive() {
        assert!(contains_case_insensitive("PlayerName", "playern"));
        assert!(!contains_case_insensitive("Player", "players"));
    }
}
