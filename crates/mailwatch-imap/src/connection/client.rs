//! IMAP client connection.
//!
//! A single-mailbox client driven one command at a time. Every command is
//! bounded by the configured I/O timeout; a timed-out connection should be
//! dropped rather than reused.

#![allow(clippy::missing_errors_doc)]

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

use super::config::Config;
use super::framed::FramedStream;
use super::stream::ImapStream;
use crate::command::{Command, FetchSection, SearchQuery, TagGenerator};
use crate::response::{Status, parse_exists, parse_fetch, parse_search, parse_status};
use crate::{Error, Result};

/// IMAP client connection.
pub struct Client<S> {
    stream: FramedStream<S>,
    tag_gen: TagGenerator,
    io_timeout: Duration,
    selected: Option<String>,
}

impl<S> std::fmt::Debug for Client<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tag_gen", &self.tag_gen)
            .field("io_timeout", &self.io_timeout)
            .field("selected", &self.selected)
            .finish_non_exhaustive()
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new client from a connected stream.
    ///
    /// Reads the server greeting. A `BYE` greeting is an error.
    pub async fn from_stream(stream: S, io_timeout: Duration) -> Result<Self> {
        let mut framed = FramedStream::new(stream);

        let greeting = tokio::time::timeout(io_timeout, framed.read_response())
            .await
            .map_err(|_| Error::Timeout(io_timeout))??;

        match parse_status(&greeting) {
            Some(line) if line.tag.is_none() => match line.status {
                Status::Ok | Status::PreAuth => {}
                Status::Bye => return Err(Error::Bye(line.text)),
                Status::No | Status::Bad => return Err(Error::Protocol(line.text)),
            },
            _ => {
                return Err(Error::Protocol(format!(
                    "unexpected greeting: {}",
                    String::from_utf8_lossy(&greeting).trim_end()
                )));
            }
        }

        Ok(Self {
            stream: framed,
            tag_gen: TagGenerator::default(),
            io_timeout,
            selected: None,
        })
    }

    /// Returns the currently selected mailbox.
    #[must_use]
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Authenticates with the server using LOGIN.
    ///
    /// A `NO` reply is reported as [`Error::Auth`].
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let cmd = Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        };

        match self.execute(&cmd).await {
            Ok(_) => Ok(()),
            Err(Error::No(text)) => Err(Error::Auth(text)),
            Err(e) => Err(e),
        }
    }

    /// Selects a mailbox and returns its message count.
    pub async fn select(&mut self, mailbox: &str) -> Result<u32> {
        let cmd = Command::Select {
            mailbox: mailbox.to_string(),
        };
        let responses = self.execute(&cmd).await?;
        self.selected = Some(mailbox.to_string());

        Ok(responses
            .iter()
            .find_map(|r| parse_exists(r))
            .unwrap_or_default())
    }

    /// Runs `UID SEARCH` and returns matching UIDs in ascending order.
    pub async fn uid_search(&mut self, query: &SearchQuery) -> Result<Vec<u32>> {
        self.require_selected()?;
        let responses = self.execute(&Command::UidSearch(query.clone())).await?;

        let mut uids: Vec<u32> = responses
            .iter()
            .filter_map(|r| parse_search(r))
            .flatten()
            .collect();
        uids.sort_unstable();
        uids.dedup();
        Ok(uids)
    }

    /// Fetches one section of a message by UID without setting `\Seen`.
    ///
    /// Returns `None` if the message no longer exists.
    pub async fn uid_fetch(&mut self, uid: u32, section: FetchSection) -> Result<Option<Vec<u8>>> {
        self.require_selected()?;
        let responses = self.execute(&Command::UidFetch { uid, section }).await?;

        Ok(responses.iter().find_map(|r| {
            parse_fetch(r)
                .filter(|data| data.uid.is_none_or(|u| u == uid))
                .map(|data| data.body.to_vec())
        }))
    }

    /// Logs out and closes the connection.
    ///
    /// A connection the server already closed counts as logged out.
    pub async fn logout(mut self) -> Result<()> {
        match self.execute(&Command::Logout).await {
            Ok(_) | Err(Error::Bye(_)) => Ok(()),
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn require_selected(&self) -> Result<()> {
        if self.selected.is_none() {
            return Err(Error::Protocol("no mailbox selected".to_string()));
        }
        Ok(())
    }

    /// Sends a command and waits for its tagged completion.
    ///
    /// Returns all responses, the tagged one last, if the status is OK.
    async fn execute(&mut self, cmd: &Command) -> Result<Vec<Vec<u8>>> {
        let tag = self.tag_gen.issue();
        let bytes = cmd.serialize(&tag);
        trace!(tag = %tag, command = cmd.name(), "sending command");

        let timeout = self.io_timeout;
        let stream = &mut self.stream;
        let responses = tokio::time::timeout(timeout, async {
            stream.write_command(&bytes).await?;
            stream.read_until_tagged(&tag).await
        })
        .await
        .map_err(|_| Error::Timeout(timeout))??;

        check_tagged_ok(&responses, &tag)?;
        debug!(tag = %tag, command = cmd.name(), responses = responses.len(), "command completed");
        Ok(responses)
    }
}

/// Checks that the tagged response is OK.
fn check_tagged_ok(responses: &[Vec<u8>], tag: &str) -> Result<()> {
    let line = responses
        .last()
        .and_then(|r| parse_status(r))
        .filter(|line| line.tag.as_deref() == Some(tag))
        .ok_or_else(|| Error::Protocol("missing tagged response".to_string()))?;

    match line.status {
        Status::Ok | Status::PreAuth => Ok(()),
        Status::No => Err(Error::No(line.text)),
        Status::Bad => Err(Error::Bad(line.text)),
        Status::Bye => Err(Error::Bye(line.text)),
    }
}

/// Connects to the configured server and reads the greeting.
///
/// The TCP connect, TLS handshake and greeting together are bounded by the
/// connect timeout.
pub async fn connect(config: &Config) -> Result<Client<ImapStream>> {
    debug!(host = %config.host, port = config.port, security = ?config.security, "connecting");

    let attempt = async {
        let stream = ImapStream::open(config).await?;
        Client::from_stream(stream, config.io_timeout).await
    };

    tokio::time::timeout(config.connect_timeout, attempt)
        .await
        .map_err(|_| Error::Timeout(config.connect_timeout))?
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_greeting_ok() {
        let mock = Builder::new().read(b"* OK IMAP4rev1 ready\r\n").build();
        let client = Client::from_stream(mock, TIMEOUT).await.unwrap();
        assert!(client.selected().is_none());
    }

    #[tokio::test]
    async fn test_greeting_bye() {
        let mock = Builder::new().read(b"* BYE too many connections\r\n").build();
        let err = Client::from_stream(mock, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, Error::Bye(text) if text == "too many connections"));
    }

    #[tokio::test]
    async fn test_login_rejected_is_auth_error() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 LOGIN user pass\r\n")
            .read(b"A0000 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
            .build();
        let mut client = Client::from_stream(mock, TIMEOUT).await.unwrap();

        let err = client.login("user", "pass").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_search_requires_select() {
        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut client = Client::from_stream(mock, TIMEOUT).await.unwrap();

        let query = SearchQuery::since(chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert!(matches!(
            client.uid_search(&query).await,
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_check_tagged_ok() {
        let ok = vec![b"* SEARCH 1\r\n".to_vec(), b"A1 OK done\r\n".to_vec()];
        assert!(check_tagged_ok(&ok, "A1").is_ok());

        let bad = vec![b"A1 BAD syntax\r\n".to_vec()];
        assert!(matches!(check_tagged_ok(&bad, "A1"), Err(Error::Bad(_))));

        let other = vec![b"A2 OK done\r\n".to_vec()];
        assert!(matches!(check_tagged_ok(&other, "A1"), Err(Error::Protocol(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_timeout() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 SELECT INBOX\r\n")
            .wait(Duration::from_secs(10))
            .build();
        let mut client = Client::from_stream(mock, TIMEOUT).await.unwrap();

        let err = client.select("INBOX").await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(err.is_session_fatal());
    }
}
