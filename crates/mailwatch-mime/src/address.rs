//! Mailbox address extraction.

/// Reduces an address header to its bare, lower-cased address.
///
/// `"Display Name <addr@x.com>"` becomes `addr@x.com`; a value without
/// angle brackets is trimmed and lower-cased as-is. Only the last
/// bracketed address is considered, so a display name that itself
/// contains `<` does not confuse the extraction.
#[must_use]
pub fn extract_address(header: &str) -> String {
    let bracketed = header.rfind('<').and_then(|open| {
        let rest = &header[open + 1..];
        rest.find('>').map(|close| &rest[..close])
    });

    bracketed.unwrap_or(header).trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_stripped() {
        assert_eq!(extract_address("Display Name <addr@x.com>"), "addr@x.com");
        assert_eq!(extract_address("\"Doe, Jane\" <Jane@Example.COM>"), "jane@example.com");
    }

    #[test]
    fn test_bare_address() {
        assert_eq!(extract_address("  A@X.com "), "a@x.com");
    }

    #[test]
    fn test_unclosed_bracket_falls_back_to_whole_value() {
        assert_eq!(extract_address("Broken <a@x.com"), "broken <a@x.com");
    }

    #[test]
    fn test_empty() {
        assert_eq!(extract_address(""), "");
    }
}
