//! Outgoing commands.

use chrono::NaiveDate;

/// Issues `A0000`, `A0001`, ... for one session.
#[derive(Debug, Default)]
pub struct TagGenerator {
    issued: u32,
}

impl TagGenerator {
    /// The next unused tag.
    pub fn issue(&mut self) -> String {
        let tag = format!("A{:04}", self.issued);
        self.issued = self.issued.wrapping_add(1);
        tag
    }
}

/// What a `UID FETCH` retrieves. Always `BODY.PEEK`, so `\Seen` is left
/// alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSection {
    /// The header block.
    Header,
    /// The whole message.
    Full,
}

impl FetchSection {
    const fn item(self) -> &'static str {
        match self {
            Self::Header => "BODY.PEEK[HEADER]",
            Self::Full => "BODY.PEEK[]",
        }
    }
}

/// `UID SEARCH` criteria: a date range and optional senders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Internal date on or after this day.
    pub since: NaiveDate,
    /// Internal date strictly before this day.
    pub before: Option<NaiveDate>,
    /// Match any of these in `From`, server-side substring match.
    pub from: Vec<String>,
}

impl SearchQuery {
    /// Everything since `since`.
    #[must_use]
    pub const fn since(since: NaiveDate) -> Self {
        Self {
            since,
            before: None,
            from: Vec::new(),
        }
    }

    /// Adds an exclusive upper day.
    #[must_use]
    pub const fn before(mut self, before: NaiveDate) -> Self {
        self.before = Some(before);
        self
    }

    /// Keeps only messages from one of `senders`.
    #[must_use]
    pub fn from_any(mut self, senders: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.from = senders.into_iter().map(Into::into).collect();
        self
    }

    fn write_to(&self, line: &mut Line) {
        line.atom("SINCE").atom(&imap_date(self.since));
        if let Some(before) = self.before {
            line.atom("BEFORE").atom(&imap_date(before));
        }
        // n senders need n-1 leading ORs: OR FROM a OR FROM b FROM c
        let last = self.from.len().saturating_sub(1);
        for (i, sender) in self.from.iter().enumerate() {
            if i < last {
                line.atom("OR");
            }
            line.atom("FROM").astring(sender);
        }
    }
}

/// `14-Oct-2025`.
#[must_use]
pub fn imap_date(date: NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string()
}

/// The commands a poll session sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `LOGIN user password`
    Login {
        /// Account name.
        username: String,
        /// Account secret.
        password: String,
    },
    /// `SELECT mailbox`
    Select {
        /// Mailbox to open.
        mailbox: String,
    },
    /// `UID SEARCH criteria`
    UidSearch(SearchQuery),
    /// `UID FETCH uid (UID section)`
    UidFetch {
        /// Target message.
        uid: u32,
        /// What to retrieve.
        section: FetchSection,
    },
    /// `LOGOUT`
    Logout,
}

impl Command {
    /// Wire form, tagged and CRLF-terminated.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut line = Line::default();
        line.atom(tag);

        match self {
            Self::Login { username, password } => {
                line.atom("LOGIN").astring(username).astring(password);
            }
            Self::Select { mailbox } => {
                line.atom("SELECT").astring(mailbox);
            }
            Self::UidSearch(query) => {
                line.atom("UID").atom("SEARCH");
                query.write_to(&mut line);
            }
            Self::UidFetch { uid, section } => {
                line.atom("UID")
                    .atom("FETCH")
                    .atom(&uid.to_string())
                    .atom(&format!("(UID {})", section.item()));
            }
            Self::Logout => {
                line.atom("LOGOUT");
            }
        }

        line.finish()
    }

    /// Command verb for logs. Never includes arguments.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "LOGIN",
            Self::Select { .. } => "SELECT",
            Self::UidSearch(_) => "UID SEARCH",
            Self::UidFetch { .. } => "UID FETCH",
            Self::Logout => "LOGOUT",
        }
    }
}

/// Space-separated command line under construction.
#[derive(Default)]
struct Line(Vec<u8>);

impl Line {
    fn separate(&mut self) {
        if !self.0.is_empty() {
            self.0.push(b' ');
        }
    }

    fn atom(&mut self, atom: &str) -> &mut Self {
        self.separate();
        self.0.extend_from_slice(atom.as_bytes());
        self
    }

    /// Bare when every byte is an atom char, quoted otherwise.
    fn astring(&mut self, value: &str) -> &mut Self {
        self.separate();
        if !value.is_empty() && value.bytes().all(is_atom_char) {
            self.0.extend_from_slice(value.as_bytes());
            return self;
        }
        self.0.push(b'"');
        for byte in value.bytes() {
            if matches!(byte, b'"' | b'\\') {
                self.0.push(b'\\');
            }
            self.0.push(byte);
        }
        self.0.push(b'"');
        self
    }

    fn finish(mut self) -> Vec<u8> {
        self.0.extend_from_slice(b"\r\n");
        self.0
    }
}

const fn is_atom_char(byte: u8) -> bool {
    byte.is_ascii_graphic() && !matches!(byte, b'(' | b')' | b'{' | b'%' | b'*' | b'"' | b'\\')
}
