//! Sans-I/O parsing of the server responses the poller relies on.
//!
//! Only status lines, `SEARCH`, `EXISTS` and single-literal `FETCH` data are
//! understood; everything else is ignored by the client.

use crate::connection::parse_literal_length;

/// Status of a status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// OK.
    Ok,
    /// NO.
    No,
    /// BAD.
    Bad,
    /// PREAUTH (greeting only).
    PreAuth,
    /// BYE.
    Bye,
}

impl Status {
    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            "PREAUTH" => Some(Self::PreAuth),
            "BYE" => Some(Self::Bye),
            _ => None,
        }
    }
}

/// A parsed status line, tagged or untagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    /// Command tag, or `None` for `*`.
    pub tag: Option<String>,
    /// Status keyword.
    pub status: Status,
    /// Human-readable text, with any `[CODE]` prefix kept.
    pub text: String,
}

/// Parses `<tag> OK text` or `* BYE text`.
///
/// Returns `None` for lines that are not status responses.
#[must_use]
pub fn parse_status(line: &[u8]) -> Option<StatusLine> {
    let line = std::str::from_utf8(first_line(line)).ok()?;
    let mut words = line.splitn(3, ' ');
    let tag = words.next()?;
    let status = Status::parse(words.next()?)?;
    let text = words.next().unwrap_or_default().trim().to_string();

    Some(StatusLine {
        tag: (tag != "*").then(|| tag.to_string()),
        status,
        text,
    })
}

/// Parses `* SEARCH 1 2 3` into its numbers.
///
/// Non-numeric trailing items (such as a `(MODSEQ n)` extension) are skipped.
#[must_use]
pub fn parse_search(line: &[u8]) -> Option<Vec<u32>> {
    let line = std::str::from_utf8(first_line(line)).ok()?;
    let rest = line.strip_prefix("* ")?;
    let (keyword, numbers) = rest.split_once(' ').unwrap_or((rest, ""));
    if !keyword.eq_ignore_ascii_case("SEARCH") {
        return None;
    }

    Some(
        numbers
            .split_ascii_whitespace()
            .filter_map(|n| n.parse().ok())
            .collect(),
    )
}

/// Parses `* 17 EXISTS` into the count.
#[must_use]
pub fn parse_exists(line: &[u8]) -> Option<u32> {
    let line = std::str::from_utf8(first_line(line)).ok()?;
    let mut words = line.strip_prefix("* ")?.split(' ');
    let count = words.next()?.parse().ok()?;
    words
        .next()
        .is_some_and(|w| w.eq_ignore_ascii_case("EXISTS"))
        .then_some(count)
}

/// Data carried by a `FETCH` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchData<'a> {
    /// UID item, when the server included one.
    pub uid: Option<u32>,
    /// The first literal in the response.
    pub body: &'a [u8],
}

/// Parses a `* n FETCH (... {len}\r\n<bytes>)` response.
///
/// Returns `None` for other responses and for `FETCH` responses that carry
/// no literal (for example unsolicited flag updates).
#[must_use]
pub fn parse_fetch(response: &[u8]) -> Option<FetchData<'_>> {
    let head_end = response.windows(2).position(|w| w == b"\r\n")? + 2;
    let head = &response[..head_end];
    let head_str = std::str::from_utf8(head).ok()?;

    let mut words = head_str.strip_prefix("* ")?.split(' ');
    words.next()?.parse::<u32>().ok()?;
    if !words.next()?.eq_ignore_ascii_case("FETCH") {
        return None;
    }

    let len = parse_literal_length(head)?;
    let body = response.get(head_end..head_end + len)?;

    Some(FetchData {
        uid: parse_uid_item(head_str),
        body,
    })
}

fn parse_uid_item(head: &str) -> Option<u32> {
    let upper = head.to_ascii_uppercase();
    let start = upper.find("UID ")? + 4;
    let digits: String = head[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

fn first_line(data: &[u8]) -> &[u8] {
    let end = data
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(data.len());
    &data[..end]
}
