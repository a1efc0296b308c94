//! `Content-Type` header values.

use crate::error::{Error, Result};

/// The parts of a `Content-Type` the body walker looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Lower-cased `type/subtype`.
    pub essence: String,
    /// `charset` parameter.
    pub charset: Option<String>,
    /// `boundary` parameter of a multipart.
    pub boundary: Option<String>,
    /// `name` parameter, set on most attachments.
    pub name: Option<String>,
}

impl Default for ContentType {
    /// `text/plain; charset=us-ascii`, what a part without the header is.
    fn default() -> Self {
        Self {
            essence: "text/plain".to_string(),
            charset: Some("us-ascii".to_string()),
            boundary: None,
            name: None,
        }
    }
}

impl ContentType {
    /// Parses `type/subtype; key=value; key="quoted; value"`.
    ///
    /// Unknown parameters are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if there is no `type/subtype`.
    pub fn parse(value: &str) -> Result<Self> {
        let mut segments = split_params(value).into_iter();
        let essence = segments.next().unwrap_or_default().trim().to_ascii_lowercase();

        match essence.split_once('/') {
            Some((main, sub)) if !main.is_empty() && !sub.is_empty() => {}
            _ => return Err(Error::Parse(format!("content type {value:?}"))),
        }

        let mut content_type = Self {
            essence,
            charset: None,
            boundary: None,
            name: None,
        };
        for segment in segments {
            let Some((key, raw)) = segment.split_once('=') else {
                continue;
            };
            let value = unquote(raw.trim());
            match key.trim().to_ascii_lowercase().as_str() {
                "charset" => content_type.charset = Some(value),
                "boundary" => content_type.boundary = Some(value),
                "name" => content_type.name = Some(value),
                _ => {}
            }
        }
        Ok(content_type)
    }

    /// Returns true for any `multipart/*`.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.essence.starts_with("multipart/")
    }

    /// Returns true for `text/<sub_type>`.
    #[must_use]
    pub fn is_text(&self, sub_type: &str) -> bool {
        self.essence
            .strip_prefix("text/")
            .is_some_and(|sub| sub.eq_ignore_ascii_case(sub_type))
    }
}

/// Splits on `;` outside double quotes.
fn split_params(value: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;

    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => {
                segments.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&value[start..]);
    segments
}

fn unquote(value: &str) -> String {
    match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(inner) => inner.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => value.to_string(),
    }
}
