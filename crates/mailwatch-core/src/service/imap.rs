//! IMAP-backed mailbox sessions.

use async_trait::async_trait;
use mailwatch_imap::{Client, FetchSection, ImapStream, SearchQuery, connect};
use mailwatch_mime::Message;
use tracing::{debug, info};

use crate::session::{
    CandidateMessage, Credential, MailboxConnector, MailboxSession, MessageHandle, SearchWindow,
};
use crate::{Error, Result};

/// Opens IMAP sessions: connect, LOGIN, SELECT.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    config: mailwatch_imap::Config,
    mailbox: String,
}

impl ImapConnector {
    /// Creates a connector for the given server and mailbox.
    #[must_use]
    pub fn new(config: mailwatch_imap::Config, mailbox: impl Into<String>) -> Self {
        Self {
            config,
            mailbox: mailbox.into(),
        }
    }

    /// Server host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Mailbox selected on open.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }
}

#[async_trait]
impl MailboxConnector for ImapConnector {
    async fn open(&self, credential: &Credential) -> Result<Box<dyn MailboxSession>> {
        let mut client = connect(&self.config).await.map_err(Error::from_imap)?;
        client
            .login(&credential.address, &credential.secret)
            .await
            .map_err(Error::from_imap)?;
        let exists = client
            .select(&self.mailbox)
            .await
            .map_err(Error::from_imap)?;

        info!(host = %self.config.host, mailbox = %self.mailbox, exists, "mailbox opened");
        Ok(Box::new(ImapSession {
            client: Some(client),
        }))
    }
}

/// One logged-in connection with the mailbox selected.
struct ImapSession {
    client: Option<Client<ImapStream>>,
}

impl ImapSession {
    fn client(&mut self) -> Result<&mut Client<ImapStream>> {
        self.client
            .as_mut()
            .ok_or_else(|| Error::Connection("session already closed".to_string()))
    }

    async fn fetch_section(&mut self, uid: u32, section: FetchSection) -> Result<Vec<u8>> {
        match self.client()?.uid_fetch(uid, section).await {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(Error::Fetch {
                uid,
                reason: "message no longer exists".to_string(),
            }),
            Err(e) if e.is_session_fatal() => Err(Error::from_imap(e)),
            Err(e) => Err(Error::Fetch {
                uid,
                reason: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl MailboxSession for ImapSession {
    async fn search(
        &mut self,
        window: &SearchWindow,
        senders: &[String],
    ) -> Result<Vec<MessageHandle>> {
        // SEARCH dates are whole days; BEFORE is exclusive.
        let since = window.start.date_naive();
        let end_day = window.end.date_naive();
        let before = end_day.succ_opt().unwrap_or(end_day);

        let query = SearchQuery::since(since)
            .before(before)
            .from_any(senders.iter().cloned());
        let uids = self
            .client()?
            .uid_search(&query)
            .await
            .map_err(Error::from_imap)?;

        debug!(%since, %before, senders = senders.len(), found = uids.len(), "search completed");
        Ok(uids.into_iter().map(MessageHandle).collect())
    }

    async fn fetch(&mut self, handle: MessageHandle) -> Result<CandidateMessage> {
        let header = self.fetch_section(handle.0, FetchSection::Header).await?;
        Ok(CandidateMessage::from_headers(handle, &header))
    }

    async fn fetch_content(&mut self, handle: MessageHandle) -> Result<String> {
        let raw = self.fetch_section(handle.0, FetchSection::Full).await?;
        Ok(Message::parse(&raw).text_content())
    }

    async fn close(&mut self) {
        if let Some(client) = self.client.take()
            && let Err(e) = client.logout().await
        {
            debug!(error = %e, "logout failed");
        }
    }
}
