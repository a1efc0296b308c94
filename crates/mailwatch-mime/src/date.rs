//! `Date:` header parsing.

use chrono::{DateTime, FixedOffset};

/// Parses an RFC 2822 `Date:` header value.
///
/// Trailing comments such as `(UTC)` or `(Pacific Standard Time)` are
/// stripped before parsing. Returns `None` for anything chrono rejects.
#[must_use]
pub fn parse_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let mut value = raw.trim();
    if value.ends_with(')')
        && let Some(open) = value.rfind('(')
    {
        value = value[..open].trim_end();
    }

    DateTime::parse_from_rfc2822(value).ok()
}
