//! Header block parsing.

use crate::encoding::decode_header_value;

/// The header fields of a message or body part, in the order they appeared.
///
/// Lookups ignore ASCII case. Values are unfolded but otherwise raw;
/// [`Headers::decoded`] resolves encoded words.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    /// Unfolds and splits a header block.
    ///
    /// Stops at the first blank line. A line with no `:` ends the current
    /// field and is dropped, as is a continuation with nothing to continue.
    #[must_use]
    pub fn parse(block: &str) -> Self {
        let mut fields: Vec<(String, String)> = Vec::new();
        let mut open = false;

        for line in block.lines() {
            if line.is_empty() {
                break;
            }
            let folded = line.starts_with([' ', '\t']);
            match fields.last_mut() {
                Some((_, value)) if folded && open => {
                    let more = line.trim();
                    if !more.is_empty() {
                        if !value.is_empty() {
                            value.push(' ');
                        }
                        value.push_str(more);
                    }
                }
                _ if folded => {}
                _ => {
                    open = match line.split_once(':') {
                        Some((name, value)) => {
                            fields.push((name.trim().to_string(), value.trim().to_string()));
                            true
                        }
                        None => false,
                    };
                }
            }
        }

        Self { fields }
    }

    /// First raw value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Every raw value of `name`, in order.
    pub fn values<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a str> + use<'a, 'n> {
        self.fields
            .iter()
            .filter(move |(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// First value of `name` with encoded words resolved.
    #[must_use]
    pub fn decoded(&self, name: &str) -> Option<String> {
        self.get(name).map(decode_header_value)
    }

    /// Number of fields, repeats included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the block had no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unfolds_continuations() {
        let block = concat!(
            "From: Billing <billing@example.com>\r\n",
            "Subject: Your monthly\r\n",
            "\tstatement\r\n",
            "Content-Type: text/plain;\r\n",
            " charset=utf-8\r\n",
            "\r\n",
            "Body: not a header\r\n"
        );

        let headers = Headers::parse(block);
        assert_eq!(headers.get("FROM"), Some("Billing <billing@example.com>"));
        assert_eq!(headers.get("subject"), Some("Your monthly statement"));
        assert_eq!(headers.get("content-type"), Some("text/plain; charset=utf-8"));
        assert_eq!(headers.get("Body"), None);
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn test_repeated_fields_keep_order() {
        let headers = Headers::parse("Received: a\nX-Other: z\nreceived: b\n");
        assert_eq!(headers.values("Received").collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(headers.get("received"), Some("a"));
    }

    #[test]
    fn test_values_outlive_the_name() {
        let headers = Headers::parse("Received: a\nReceived: b\n");
        let received: Vec<&str> = {
            let name = String::from("received");
            headers.values(&name).collect()
        };
        assert_eq!(received, ["a", "b"]);

        let from = {
            let name = String::from("RECEIVED");
            headers.get(&name)
        };
        assert_eq!(from, Some("a"));
    }

    #[test]
    fn test_decoded_subject() {
        let headers = Headers::parse("Subject: =?utf-8?B?SMOpbGxv?=\r\n\r\n");
        assert_eq!(headers.decoded("subject").as_deref(), Some("Héllo"));
    }

    #[test]
    fn test_stray_lines_are_dropped() {
        let headers = Headers::parse("  orphan continuation\nno colon here\n  still orphaned\n");
        assert!(headers.is_empty());
    }

    #[test]
    fn test_empty_first_line_folds_into_value() {
        let headers = Headers::parse("Subject:\r\n  Overdue notice\r\n");
        assert_eq!(headers.get("subject"), Some("Overdue notice"));
    }
}
