use crate::error::{Result, TreeError};

/// Maximum length of a single entry name, in characters.
pub const MAX_NAME_LEN: usize = 255;

/// Characters that may never appear in an entry name.
const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Device names reserved by common filesystems, compared case-insensitively.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Check a proposed entry name and return it trimmed.
///
/// Rules are applied in order: required, non-blank after trimming, at most
/// [`MAX_NAME_LEN`] characters, no forbidden or control characters anywhere
/// in the raw input (surrounding whitespace included), not a reserved device
/// name.
pub fn validate(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(TreeError::Validation("Name is required".into()));
    }

    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(TreeError::Validation("Name cannot be empty".into()));
    }

    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(TreeError::Validation(format!(
            "Name is too long (max {} characters)",
            MAX_NAME_LEN
        )));
    }

    if name.chars().any(is_forbidden) {
        return Err(TreeError::Validation(
            "Name contains invalid characters".into(),
        ));
    }

    if RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(trimmed))
    {
        return Err(TreeError::Validation("Name is reserved".into()));
    }

    Ok(trimmed.to_string())
}

fn is_forbidden(c: char) -> bool {
    FORBIDDEN_CHARS.contains(&c) || ('\u{00}'..='\u{1f}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reason(name: &str) -> String {
        match validate(name) {
            Err(TreeError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn accepts_and_trims() {
        assert_eq!(validate("  chapter1.tex ").unwrap(), "chapter1.tex");
    }

    #[test]
    fn empty_is_required() {
        assert_eq!(reason(""), "Name is required");
    }

    #[test]
    fn blank_is_empty() {
        assert_eq!(reason("   "), "Name cannot be empty");
    }

    #[test]
    fn length_limit_applies_after_trim() {
        let exact = "a".repeat(MAX_NAME_LEN);
        assert!(validate(&format!("  {}  ", exact)).is_ok());
        assert!(reason(&"a".repeat(MAX_NAME_LEN + 1)).contains("too long"));
    }

    #[test]
    fn rejects_each_forbidden_char() {
        for c in FORBIDDEN_CHARS {
            let name = format!("bad{}name", c);
            assert_eq!(reason(&name), "Name contains invalid characters");
        }
    }

    #[test]
    fn rejects_control_chars() {
        assert!(validate("tab\there").is_err());
        assert!(validate("nul\u{0}").is_err());
        assert!(validate("unit\u{1f}sep").is_err());
    }

    #[test]
    fn control_chars_at_the_edges_are_not_trimmed_away() {
        assert_eq!(reason("a\n"), "Name contains invalid characters");
        assert_eq!(reason("\tname"), "Name contains invalid characters");
        assert_eq!(reason(" a\r "), "Name contains invalid characters");
    }

    #[test]
    fn reserved_names_case_insensitive() {
        assert_eq!(reason("con"), "Name is reserved");
        assert_eq!(reason("Lpt9"), "Name is reserved");
        assert_eq!(reason(" NUL "), "Name is reserved");
    }

    #[test]
    fn reserved_prefix_is_allowed() {
        assert!(validate("CONFIG").is_ok());
        assert!(validate("COM10").is_ok());
        assert!(validate("con.txt").is_ok());
    }

    proptest! {
        #[test]
        fn any_forbidden_char_is_rejected(
            prefix in "[a-z]{0,10}",
            suffix in "[a-z]{0,10}",
            bad in prop::sample::select(vec!['<', '>', ':', '"', '/', '\\', '|', '?', '*', '\u{0}', '\n', '\u{1f}']),
        ) {
            let name = format!("{}{}{}", prefix, bad, suffix);
            prop_assert!(validate(&name).is_err());
        }

        #[test]
        fn clean_names_return_trimmed(name in "[A-Za-z0-9_.-][A-Za-z0-9 _.-]{0,200}[A-Za-z0-9_.-]") {
            prop_assume!(!RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(name.trim())));
            let padded = format!("  {} ", name);
            prop_assert_eq!(validate(&padded).unwrap(), name.trim().to_string());
        }
    }
}
