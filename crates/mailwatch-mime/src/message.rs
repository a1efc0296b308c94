//! MIME message structure and plain-text extraction.

use crate::content_type::ContentType;
use crate::encoding::{decode_base64, decode_charset, decode_quoted_printable};
use crate::header::Headers;

/// Nesting limit for multipart traversal.
const MAX_MULTIPART_DEPTH: usize = 16;

/// `Content-Transfer-Encoding` of a leaf part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// `7bit`, `8bit`, `binary`, or absent: the body is used as is.
    Identity,
    /// `base64`.
    Base64,
    /// `quoted-printable`.
    QuotedPrintable,
}

impl TransferEncoding {
    /// Reads a header value. Unknown encodings are treated as identity.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case("base64") {
            Self::Base64
        } else if value.eq_ignore_ascii_case("quoted-printable") {
            Self::QuotedPrintable
        } else {
            Self::Identity
        }
    }
}

/// A parsed message: headers plus the raw, still-encoded body.
#[derive(Debug, Clone)]
pub struct Message {
    /// Message headers.
    pub headers: Headers,
    /// Raw body bytes (everything after the header block).
    pub body: Vec<u8>,
}

impl Message {
    /// Parses a raw RFC 5322 message.
    ///
    /// A header-only buffer (as returned by a header fetch) yields an empty
    /// body. Parsing is lenient and never fails.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        let (head, body) = split_head_body(raw);
        Self {
            headers: Headers::parse(&String::from_utf8_lossy(head)),
            body: body.to_vec(),
        }
    }

    /// Gets the raw From header.
    #[must_use]
    pub fn from(&self) -> Option<&str> {
        self.headers.get("from")
    }

    /// Gets the Subject header with encoded words decoded.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        self.headers.decoded("subject")
    }

    /// Gets the raw Date header.
    #[must_use]
    pub fn date(&self) -> Option<&str> {
        self.headers.get("date")
    }

    /// Gets the Message-ID header.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.headers.get("message-id")
    }

    /// Extracts readable text from the message.
    ///
    /// All inline `text/plain` parts are concatenated; when there is none,
    /// the first inline `text/html` part is converted to text instead.
    /// Attachments are skipped.
    #[must_use]
    pub fn text_content(&self) -> String {
        let mut collected = Collected::default();
        collect_text(&self.headers, &self.body, &mut collected, 0);

        let text = if collected.plain.is_empty() {
            collected.html.as_deref().map(html_to_text).unwrap_or_default()
        } else {
            collected.plain.join("\n")
        };

        text.trim().to_string()
    }
}

#[derive(Default)]
struct Collected {
    plain: Vec<String>,
    html: Option<String>,
}

fn collect_text(headers: &Headers, body: &[u8], collected: &mut Collected, depth: usize) {
    if depth > MAX_MULTIPART_DEPTH || is_attachment(headers) {
        return;
    }

    let content_type = headers
        .get("content-type")
        .and_then(|value| ContentType::parse(value).ok())
        .unwrap_or_default();

    if content_type.is_multipart() {
        if let Some(boundary) = content_type.boundary.as_deref() {
            for part in split_multipart(body, boundary) {
                let (head, part_body) = split_head_body(part);
                let part_headers = Headers::parse(&String::from_utf8_lossy(head));
                collect_text(&part_headers, part_body, collected, depth + 1);
            }
        }
        return;
    }

    if content_type.is_text("plain") {
        collected.plain.push(decode_body(headers, body, &content_type));
    } else if content_type.is_text("html") && collected.html.is_none() {
        collected.html = Some(decode_body(headers, body, &content_type));
    }
}

fn is_attachment(headers: &Headers) -> bool {
    headers
        .get("content-disposition")
        .is_some_and(|d| d.trim_start().to_ascii_lowercase().starts_with("attachment"))
}

/// Decodes a leaf body according to its transfer encoding and charset.
///
/// A body that fails to decode is kept as-is rather than dropped.
fn decode_body(headers: &Headers, body: &[u8], content_type: &ContentType) -> String {
    let encoding = headers
        .get("content-transfer-encoding")
        .map_or(TransferEncoding::Identity, TransferEncoding::parse);

    let raw = String::from_utf8_lossy(body);
    let bytes = match encoding {
        TransferEncoding::Base64 => decode_base64(&raw).unwrap_or_else(|_| body.to_vec()),
        TransferEncoding::QuotedPrintable => {
            decode_quoted_printable(&raw).unwrap_or_else(|_| body.to_vec())
        }
        TransferEncoding::Identity => body.to_vec(),
    };

    decode_charset(&bytes, content_type.charset.as_deref().unwrap_or("utf-8"))
}

/// Converts HTML to readable text, falling back to tag stripping.
fn html_to_text(html: &str) -> String {
    htmd::convert(html).unwrap_or_else(|_| strip_tags(html))
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Splits a raw message at the first blank line.
fn split_head_body(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(idx) = find(raw, b"\r\n\r\n") {
        (&raw[..idx], &raw[idx + 4..])
    } else if let Some(idx) = find(raw, b"\n\n") {
        (&raw[..idx], &raw[idx + 2..])
    } else {
        (raw, &[])
    }
}

/// Splits a multipart body into its parts using the boundary.
///
/// The preamble and epilogue are discarded. A missing close delimiter
/// keeps the last part.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();
    let mut current_start: Option<usize> = None;
    let mut pos = 0;

    while pos < body.len() {
        let line_end = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |i| pos + i);
        let next = (line_end + 1).min(body.len());
        let line = body[pos..line_end]
            .strip_suffix(b"\r")
            .unwrap_or(&body[pos..line_end]);

        if let Some(rest) = line.strip_prefix(delimiter.as_bytes()) {
            if let Some(start) = current_start.take() {
                parts.push(strip_line_ending(&body[start..pos]));
            }
            if rest.starts_with(b"--") {
                return parts;
            }
            current_start = Some(next);
        }

        pos = next;
    }

    if let Some(start) = current_start {
        parts.push(&body[start..]);
    }
    parts
}

fn strip_line_ending(part: &[u8]) -> &[u8] {
    part.strip_suffix(b"\r\n")
        .or_else(|| part.strip_suffix(b"\n"))
        .unwrap_or(part)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::needless_raw_string_hashes)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::Identity);
        assert_eq!(TransferEncoding::parse("BASE64"), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("quoted-printable"),
            TransferEncoding::QuotedPrintable
        );
    }

    #[test]
    fn test_single_part_message() {
        let raw = concat!(
            "From: Billing <billing@example.com>\r\n",
            "Subject: =?utf-8?Q?Invoice_=E2=84=962?=\r\n",
            "Message-ID: <abc@example.com>\r\n",
            "Date: Tue, 14 Oct 2025 09:30:00 +0000\r\n",
            "\r\n",
            "Amount due: 12 EUR\r\n"
        );
        let message = Message::parse(raw.as_bytes());

        assert_eq!(message.from(), Some("Billing <billing@example.com>"));
        assert_eq!(message.subject().as_deref(), Some("Invoice №2"));
        assert_eq!(message.message_id(), Some("<abc@example.com>"));
        assert_eq!(message.text_content(), "Amount due: 12 EUR");
    }

    #[test]
    fn test_header_only_message() {
        let raw = b"From: a@x.com\r\nSubject: hi\r\n\r\n";
        let message = Message::parse(raw);
        assert_eq!(message.subject().as_deref(), Some("hi"));
        assert!(message.body.is_empty());
        assert_eq!(message.text_content(), "");
    }

    #[test]
    fn test_multipart_prefers_plain_and_skips_attachments() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=\"outer\"\r\n",
            "\r\n",
            "preamble\r\n",
            "--outer\r\n",
            "Content-Type: multipart/alternative; boundary=inner\r\n",
            "\r\n",
            "--inner\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "Content-Transfer-Encoding: quoted-printable\r\n",
            "\r\n",
            "Caf=C3=A9 opens at 9\r\n",
            "--inner\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>Caf&eacute; opens at 9</p>\r\n",
            "--inner--\r\n",
            "--outer\r\n",
            "Content-Type: text/plain\r\n",
            "Content-Disposition: attachment; filename=notes.txt\r\n",
            "\r\n",
            "secret attachment\r\n",
            "--outer--\r\n",
            "epilogue\r\n"
        );
        let message = Message::parse(raw.as_bytes());
        assert_eq!(message.text_content(), "Café opens at 9");
    }

    #[test]
    fn test_base64_latin1_part() {
        // "Grüße" in ISO-8859-1, base64 encoded
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=b1\n",
            "\n",
            "--b1\n",
            "Content-Type: text/plain; charset=iso-8859-1\n",
            "Content-Transfer-Encoding: base64\n",
            "\n",
            "R3L832U=\n",
            "--b1--\n"
        );
        let message = Message::parse(raw.as_bytes());
        assert_eq!(message.text_content(), "Grüße");
    }

    #[test]
    fn test_html_only_fallback() {
        let raw = concat!(
            "Content-Type: text/html; charset=utf-8\r\n",
            "\r\n",
            "<html><body><b>Shipped</b></body></html>\r\n"
        );
        let message = Message::parse(raw.as_bytes());
        let text = message.text_content();
        assert!(text.contains("Shipped"));
        assert!(!text.contains("<b>"));
    }

    #[test]
    fn test_unterminated_multipart_keeps_last_part() {
        let parts = split_multipart(b"--x\r\nA\r\n--x\r\nB", "x");
        assert_eq!(parts, vec![&b"A"[..], &b"B"[..]]);
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<p>Hi <i>there</i></p>"), "Hi there");
    }
}
