use crate::error::{AppError, Result};

/// Shortest accepted session owner name.
const MIN_OWNER_LEN: usize = 2;
/// Longest accepted session owner name; it is echoed in every log line.
const MAX_OWNER_LEN: usize = 32;

/// Normalizes the name a host session is opened for.
///
/// Surrounding whitespace is dropped. The name must start with an ASCII
/// letter and may then use ASCII letters, digits, `.`, `_` and `-`.
pub fn session_owner(raw: &str) -> Result<String> {
    let name = raw.trim();

    let len = name.chars().count();
    if !(MIN_OWNER_LEN..=MAX_OWNER_LEN).contains(&len) {
        return Err(AppError::Validation(format!(
            "Session owner must be {MIN_OWNER_LEN} to {MAX_OWNER_LEN} characters, got {len}"
        )));
    }

    let mut chars = name.chars();
    if !chars.next().is_some_and(|first| first.is_ascii_alphabetic()) {
        return Err(AppError::Validation(
            "Session owner must start with a letter".to_string(),
        ));
    }

    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))) {
        return Err(AppError::Validation(format!(
            "Session owner contains an unsupported character: {bad:?}"
        )));
    }

    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_accepts_dashboard_names() {
        assert_eq!(session_owner("  maria.s_01 ").unwrap(), "maria.s_01");
        assert_eq!(session_owner("jp").unwrap(), "jp");
    }

    #[test]
    fn rejects_names_outside_length_bounds() {
        assert!(session_owner("a").is_err());
        assert!(session_owner("   ").is_err());
        assert!(session_owner(&"a".repeat(MAX_OWNER_LEN + 1)).is_err());
        assert!(session_owner(&"a".repeat(MAX_OWNER_LEN)).is_ok());
    }

    #[test]
    fn rejects_leading_digits_spaces_and_non_ascii() {
        assert!(session_owner("01-ana").is_err());
        assert!(session_owner("maria silva").is_err());
        assert!(session_owner("joão").is_err());
    }
}
