//! Caller-facing response shape.
//!
//! Every cycle, whatever happened, becomes one [`CheckResponse`] with
//! `success: true`. Callers branch on `matched_emails` being empty; the
//! reason a cycle came back empty is only visible in the logs and in
//! `statistics.connection_status`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::filter::MatchedMessage;
use crate::poll::{ConnectionStatus, CycleOutcome};

/// One matched message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedEmail {
    /// `From` header as sent, encoded words decoded.
    pub sender: String,
    /// Bare sender address.
    pub sender_email: String,
    /// Decoded subject.
    pub subject: String,
    /// Plain-text body.
    pub content: String,
    /// RFC 3339 date when parseable, otherwise the raw `Date` header.
    pub date_received: String,
    /// `Message-ID` header.
    pub message_id: String,
    /// Sender rule that matched.
    pub matched_sender_filter: String,
    /// Subject patterns that matched.
    pub matched_subject_filters: Vec<String>,
    /// Stable identifier (the dedupe fingerprint).
    pub email_id: String,
}

impl From<&MatchedMessage> for MatchedEmail {
    fn from(matched: &MatchedMessage) -> Self {
        let candidate = &matched.candidate;
        Self {
            sender: candidate.raw_sender.clone(),
            sender_email: candidate.sender_address.clone(),
            subject: candidate.subject.clone(),
            content: candidate.body_text.clone(),
            date_received: candidate
                .received_at
                .map_or_else(|| candidate.raw_date.clone(), |at| at.to_rfc3339()),
            message_id: candidate.message_id.clone(),
            matched_sender_filter: matched.matched_sender_filter.clone(),
            matched_subject_filters: matched.matched_subject_filters.clone(),
            email_id: matched.fingerprint.to_string(),
        }
    }
}

/// Cycle counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Messages examined.
    pub emails_checked: usize,
    /// Fingerprints in the cache after the cycle.
    pub cache_size: usize,
    /// Number of sender rules.
    pub filters_applied: usize,
    /// Messages skipped because they could not be fetched.
    pub fetch_failures: usize,
    /// Whether already-seen messages were skipped.
    pub cache_enabled: bool,
    /// Window searched, e.g. `"24 hours"` or `"1 days"`.
    pub search_period: String,
    /// Window in hours, when given in hours.
    #[serde(rename = "time_range_hours")]
    pub time_window_hours: Option<u32>,
    /// Whether the mailbox was reached.
    pub connection_status: ConnectionStatus,
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResponse {
    /// Always true.
    pub success: bool,
    /// New matches.
    pub matched_emails: Vec<MatchedEmail>,
    /// When the cycle completed.
    pub check_time: DateTime<Utc>,
    /// `matched_emails.len()`.
    pub total_matched: usize,
    /// Counters.
    pub statistics: Statistics,
}

/// Collapses a cycle outcome into the response shape.
#[must_use]
pub fn build_response(outcome: &CycleOutcome) -> CheckResponse {
    let matched_emails: Vec<MatchedEmail> = outcome.matches.iter().map(MatchedEmail::from).collect();

    CheckResponse {
        success: true,
        total_matched: matched_emails.len(),
        matched_emails,
        check_time: outcome.check_time,
        statistics: Statistics {
            emails_checked: outcome.emails_checked,
            cache_size: outcome.cache_size,
            filters_applied: outcome.filters_applied,
            fetch_failures: outcome.fetch_failures,
            cache_enabled: outcome.config.use_cache,
            search_period: outcome.config.search_period(),
            time_window_hours: outcome.config.time_window_hours,
            connection_status: outcome.connection,
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::filter::{FilterSet, match_candidate};
    use crate::params::PollConfig;
    use crate::poll::{CycleStatus, Degradation};
    use crate::session::{CandidateMessage, MessageHandle};
    use serde_json::json;

    fn outcome_with_match(date: &str) -> CycleOutcome {
        let raw = format!(
            "From: Billing <A@X.com>\r\nSubject: Your Invoice #2\r\nDate: {date}\r\nMessage-ID: <m1@x.com>\r\n\r\n"
        );
        let mut candidate = CandidateMessage::from_headers(MessageHandle(4), raw.as_bytes());
        candidate.body_text = "Amount due".to_string();
        let filters = FilterSet::from_rules([("a@x.com", ["invoice"])]);
        let matched = match_candidate(&candidate, &filters).unwrap();

        let mut outcome =
            CycleOutcome::trivial(CycleStatus::Matched, &PollConfig::default(), 1, 1);
        outcome.matches = vec![matched];
        outcome.emails_checked = 3;
        outcome.connection = ConnectionStatus::Ok;
        outcome
    }

    #[test]
    fn test_matched_email_fields() {
        let response = build_response(&outcome_with_match("Tue, 14 Oct 2025 09:30:00 +0000"));
        assert!(response.success);
        assert_eq!(response.total_matched, 1);

        let email = &response.matched_emails[0];
        assert_eq!(email.sender, "Billing <A@X.com>");
        assert_eq!(email.sender_email, "a@x.com");
        assert_eq!(email.subject, "Your Invoice #2");
        assert_eq!(email.content, "Amount due");
        assert_eq!(email.date_received, "2025-10-14T09:30:00+00:00");
        assert_eq!(email.matched_subject_filters, vec!["invoice"]);
        assert_eq!(email.email_id.len(), 64);
    }

    #[test]
    fn test_unparseable_date_kept_raw() {
        let response = build_response(&outcome_with_match("sometime last week"));
        assert_eq!(response.matched_emails[0].date_received, "sometime last week");
    }

    #[test]
    fn test_degraded_outcome_has_success_shape() {
        let outcome = CycleOutcome::trivial(
            CycleStatus::NoMatchDegraded(Degradation::Auth),
            &PollConfig::default(),
            2,
            0,
        );
        let value = serde_json::to_value(build_response(&outcome)).unwrap();

        assert_eq!(value["success"], json!(true));
        assert_eq!(value["matched_emails"], json!([]));
        assert_eq!(value["total_matched"], json!(0));
        assert_eq!(value["statistics"]["connection_status"], json!("failed"));
        assert_eq!(value["statistics"]["filters_applied"], json!(2));
        assert_eq!(value["statistics"]["search_period"], json!("1 days"));
        assert_eq!(value["statistics"]["time_range_hours"], json!(null));
        assert!(value["statistics"].get("time_window_hours").is_none());
    }

    #[test]
    fn test_exact_field_names() {
        let value = serde_json::to_value(build_response(&outcome_with_match(
            "Tue, 14 Oct 2025 09:30:00 +0000",
        )))
        .unwrap();

        let mut top: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        top.sort_unstable();
        assert_eq!(
            top,
            ["check_time", "matched_emails", "statistics", "success", "total_matched"]
        );

        let mut email: Vec<&str> = value["matched_emails"][0]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        email.sort_unstable();
        assert_eq!(
            email,
            [
                "content",
                "date_received",
                "email_id",
                "matched_sender_filter",
                "matched_subject_filters",
                "message_id",
                "sender",
                "sender_email",
                "subject",
            ]
        );

        let mut statistics: Vec<&str> = value["statistics"]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        statistics.sort_unstable();
        assert_eq!(
            statistics,
            [
                "cache_enabled",
                "cache_size",
                "connection_status",
                "emails_checked",
                "fetch_failures",
                "filters_applied",
                "search_period",
                "time_range_hours",
            ]
        );
    }
}
