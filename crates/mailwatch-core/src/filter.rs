//! Sender/subject match engine.

use std::collections::BTreeMap;
use std::fmt;

use mailwatch_mime::extract_address;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::session::CandidateMessage;
use crate::{Error, Result};

/// Sender → subject substrings.
///
/// Senders are exact, lower-cased, bare addresses. Subject patterns are
/// matched case-insensitively as substrings. A sender with no patterns
/// never matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "BTreeMap<String, Vec<String>>")]
pub struct FilterSet {
    rules: BTreeMap<String, Vec<String>>,
}

impl FilterSet {
    /// Builds a filter set from sender/pattern pairs.
    ///
    /// Keys are normalized the same way as [`FilterSet::from_value`]; rules
    /// for the same sender are merged.
    pub fn from_rules<K, P, I>(rules: I) -> Self
    where
        I: IntoIterator<Item = (K, P)>,
        K: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let mut set = Self::default();
        for (sender, patterns) in rules {
            set.insert(
                sender.as_ref(),
                patterns.into_iter().map(|p| p.as_ref().to_string()),
            );
        }
        set
    }

    /// Parses `{"sender": ["pattern", ...], ...}`.
    ///
    /// `null` yields an empty set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the value is not an object of
    /// string arrays.
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(Error::Validation(format!(
                    "expected an object of sender to subject list, got {}",
                    type_name(other)
                )));
            }
        };

        let mut set = Self::default();
        for (sender, patterns) in map {
            let Value::Array(patterns) = patterns else {
                return Err(Error::Validation(format!(
                    "subjects for {sender} must be a list, got {}",
                    type_name(patterns)
                )));
            };
            let patterns = patterns
                .iter()
                .map(|p| {
                    p.as_str().map(str::to_string).ok_or_else(|| {
                        Error::Validation(format!(
                            "subject for {sender} must be a string, got {}",
                            type_name(p)
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            set.insert(sender, patterns);
        }
        Ok(set)
    }

    fn insert(&mut self, sender: &str, patterns: impl IntoIterator<Item = String>) {
        let key = extract_address(sender);
        if key.is_empty() {
            return;
        }
        let entry = self.rules.entry(key).or_default();
        for pattern in patterns {
            let pattern = pattern.trim();
            if !pattern.is_empty() && !entry.iter().any(|p| p == pattern) {
                entry.push(pattern.to_string());
            }
        }
    }

    /// Returns true if there are no sender rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of sender rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Sender addresses, for narrowing the server-side search.
    #[must_use]
    pub fn senders(&self) -> Vec<String> {
        self.rules.keys().cloned().collect()
    }

    /// Subject patterns configured for a sender.
    #[must_use]
    pub fn patterns(&self, sender: &str) -> Option<&[String]> {
        self.rules.get(sender).map(Vec::as_slice)
    }

    /// Evaluates a candidate against the rules.
    ///
    /// Returns every subject pattern that matched, in configured order.
    #[must_use]
    pub fn matches(&self, candidate: &CandidateMessage) -> Option<FilterMatch> {
        let sender = extract_address(&candidate.sender_address);
        let (key, patterns) = self.rules.get_key_value(&sender)?;

        let subject = candidate.subject.to_lowercase();
        let matched: Vec<String> = patterns
            .iter()
            .filter(|p| subject.contains(&p.to_lowercase()))
            .cloned()
            .collect();

        (!matched.is_empty()).then(|| FilterMatch {
            sender_filter: key.clone(),
            subject_filters: matched,
        })
    }
}

impl TryFrom<Value> for FilterSet {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(&value)
    }
}

impl From<FilterSet> for BTreeMap<String, Vec<String>> {
    fn from(set: FilterSet) -> Self {
        set.rules
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Which rule a candidate satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterMatch {
    /// The sender rule key.
    pub sender_filter: String,
    /// Every subject pattern found in the subject (never empty).
    pub subject_filters: Vec<String>,
}

/// Stable message identifier used for dedupe and exposed as `email_id`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hex SHA-256 over the message id and the raw received date.
    #[must_use]
    pub fn of(message_id: &str, date: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(message_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(date.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Wraps an already computed fingerprint (as loaded from a store).
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Returns the hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A candidate that satisfied a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedMessage {
    /// The message.
    pub candidate: CandidateMessage,
    /// Matching sender rule key.
    pub matched_sender_filter: String,
    /// Matching subject patterns (never empty).
    pub matched_subject_filters: Vec<String>,
    /// Dedupe identifier.
    pub fingerprint: Fingerprint,
}

/// Runs the match engine and attaches the fingerprint on success.
#[must_use]
pub fn match_candidate(candidate: &CandidateMessage, filters: &FilterSet) -> Option<MatchedMessage> {
    let found = filters.matches(candidate)?;
    Some(MatchedMessage {
        fingerprint: Fingerprint::of(&candidate.message_id, &candidate.raw_date),
        candidate: candidate.clone(),
        matched_sender_filter: found.sender_filter,
        matched_subject_filters: found.subject_filters,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::session::MessageHandle;
    use serde_json::json;

    fn candidate(from: &str, subject: &str) -> CandidateMessage {
        CandidateMessage {
            handle: MessageHandle(1),
            raw_sender: from.to_string(),
            sender_address: extract_address(from),
            subject: subject.to_string(),
            body_text: String::new(),
            raw_date: "Tue, 14 Oct 2025 09:30:00 +0000".to_string(),
            received_at: None,
            message_id: "<m1@x.com>".to_string(),
        }
    }

    #[test]
    fn test_invoice_scenario() {
        let filters = FilterSet::from_value(&json!({"a@x.com": ["invoice"]})).unwrap();
        let matched = match_candidate(&candidate("A@X.com", "Your Invoice #2"), &filters).unwrap();

        assert_eq!(matched.matched_sender_filter, "a@x.com");
        assert_eq!(matched.matched_subject_filters, vec!["invoice"]);
        assert_eq!(matched.fingerprint.as_str().len(), 64);
    }

    #[test]
    fn test_sender_match_is_exact() {
        let filters = FilterSet::from_rules([("x.com", ["alert"])]);
        assert!(filters.matches(&candidate("notifications@x.com", "alert")).is_none());

        let filters = FilterSet::from_rules([("foo@x.com", ["alert"])]);
        assert!(filters.matches(&candidate("Foo <Foo@X.com>", "ALERT: disk")).is_some());
    }

    #[test]
    fn test_all_matching_subjects_recorded() {
        let filters = FilterSet::from_rules([("a@x.com", ["order", "shipped", "refund"])]);
        let found = filters
            .matches(&candidate("a@x.com", "Order 17 has SHIPPED"))
            .unwrap();
        assert_eq!(found.subject_filters, vec!["order", "shipped"]);
    }

    #[test]
    fn test_rule_without_subjects_never_matches() {
        let filters = FilterSet::from_value(&json!({"a@x.com": []})).unwrap();
        assert_eq!(filters.len(), 1);
        assert!(filters.matches(&candidate("a@x.com", "anything")).is_none());

        let blanks = FilterSet::from_value(&json!({"a@x.com": ["", "  "]})).unwrap();
        assert!(blanks.matches(&candidate("a@x.com", "anything")).is_none());
    }

    #[test]
    fn test_keys_normalized() {
        let filters = FilterSet::from_value(&json!({" Billing <Billing@Acme.COM> ": ["x"]})).unwrap();
        assert_eq!(filters.senders(), vec!["billing@acme.com"]);
    }

    #[test]
    fn test_malformed_filters_rejected() {
        assert!(matches!(
            FilterSet::from_value(&json!(["a@x.com"])),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            FilterSet::from_value(&json!({"a@x.com": "invoice"})),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            FilterSet::from_value(&json!({"a@x.com": ["ok", 3]})),
            Err(Error::Validation(_))
        ));
        assert!(FilterSet::from_value(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_serde_roundtrip_through_config() {
        let set: FilterSet = serde_json::from_value(json!({"A@x.com": ["Invoice"]})).unwrap();
        assert_eq!(set.patterns("a@x.com"), Some(&["Invoice".to_string()][..]));
        assert_eq!(serde_json::to_value(&set).unwrap(), json!({"a@x.com": ["Invoice"]}));
    }

    #[test]
    fn test_fingerprint_stable_and_distinct() {
        let a = Fingerprint::of("<m1@x.com>", "Tue, 14 Oct 2025 09:30:00 +0000");
        let b = Fingerprint::of("<m1@x.com>", "Tue, 14 Oct 2025 09:30:00 +0000");
        let c = Fingerprint::of("<m1@x.com>", "Wed, 15 Oct 2025 09:30:00 +0000");
        assert_eq!(a, b);
        assert_ne!(a, c);
        // NUL separator keeps field boundaries distinct
        assert_ne!(Fingerprint::of("ab", "c"), Fingerprint::of("a", "bc"));
    }

    proptest::proptest! {
        #[test]
        fn prop_unknown_sender_never_matches(
            local in "[a-z]{1,12}",
            subject in "\\PC*",
        ) {
            let filters = FilterSet::from_rules([("known@x.com", ["a", "e", "invoice"])]);
            let from = format!("{local}@elsewhere.org");
            proptest::prop_assert!(filters.matches(&candidate(&from, &subject)).is_none());
        }

        #[test]
        fn prop_matched_subjects_never_empty(subject in "\\PC*") {
            let filters = FilterSet::from_rules([("a@x.com", ["a", "b"])]);
            if let Some(found) = filters.matches(&candidate("a@x.com", &subject)) {
                proptest::prop_assert!(!found.subject_filters.is_empty());
            }
        }
    }
}
