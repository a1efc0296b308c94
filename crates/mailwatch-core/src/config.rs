//! Watcher configuration file.
//!
//! ```json
//! {
//!   "address": "me@gmail.com",
//!   "imap": { "mailbox": "INBOX" },
//!   "email_filters": { "billing@example.com": ["invoice"] },
//!   "defaults": { "check_interval_seconds": 600 }
//! }
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::JsonFileCache;
use crate::filter::FilterSet;
use crate::params::PollConfig;
use crate::service::ImapConnector;
use crate::{Error, Result};

/// Connection security as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    /// No encryption. Only for local testing.
    None,
    /// Implicit TLS.
    #[default]
    Tls,
    /// STARTTLS upgrade. Not supported by the wire client.
    StartTls,
}

/// IMAP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImapSettings {
    /// Server hostname; detected from the address when empty.
    pub host: String,
    /// Server port; defaults to the security mode's port.
    pub port: Option<u16>,
    /// Security mode.
    pub security: SecurityMode,
    /// Mailbox to watch.
    pub mailbox: String,
    /// TCP connect, TLS handshake and greeting timeout.
    pub connect_timeout_secs: u64,
    /// Per-command timeout.
    pub io_timeout_secs: u64,
}

impl Default for ImapSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: None,
            security: SecurityMode::Tls,
            mailbox: "INBOX".to_string(),
            connect_timeout_secs: 30,
            io_timeout_secs: 60,
        }
    }
}

/// Everything needed to build a [`crate::MailWatcher`] except the secret,
/// which may also come from the environment or the system keyring.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Mailbox address, also the login name.
    pub address: String,
    /// App password. Prefer the keyring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// IMAP server.
    pub imap: ImapSettings,
    /// Cache file; defaults to the platform cache directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
    /// Filters used when a request carries none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_filters: Option<FilterSet>,
    /// Defaults for request parameters.
    pub defaults: PollConfig,
}

impl fmt::Debug for WatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchConfig")
            .field("address", &self.address)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("imap", &self.imap)
            .field("cache_path", &self.cache_path)
            .field("email_filters", &self.email_filters)
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl WatchConfig {
    /// Platform config file location (`~/.config/mailwatch/config.json` on
    /// Linux).
    ///
    /// # Errors
    ///
    /// Returns an error if the platform has no config directory.
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("mailwatch").join("config.json"))
            .ok_or_else(|| Error::Config("no config directory on this platform".to_string()))
    }

    /// Reads and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read, is not valid
    /// JSON, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&text).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Parses and validates config JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on malformed JSON, malformed filters, or a
    /// missing address.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut config: Self =
            serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        config.defaults = config.defaults.clamped();
        Ok(config)
    }

    /// Checks the settings that cannot be defaulted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let address = self.address.trim();
        if address.is_empty() {
            return Err(Error::Config("address is required".to_string()));
        }
        if !address.contains('@') {
            return Err(Error::Config(format!("address {address} has no domain")));
        }
        if self.imap.security == SecurityMode::StartTls {
            return Err(Error::Config(
                "STARTTLS is not supported; use \"tls\" (port 993)".to_string(),
            ));
        }
        Ok(())
    }

    /// IMAP host, detected from the address domain when not configured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no host is set and the provider is not
    /// recognized.
    pub fn imap_host(&self) -> Result<String> {
        let host = self.imap.host.trim();
        if !host.is_empty() {
            return Ok(host.to_string());
        }
        detect_imap_host(&self.address)
            .map(str::to_string)
            .ok_or_else(|| Error::Config(format!("imap.host is required for {}", self.address)))
    }

    /// Wire client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the host cannot be determined or the
    /// security mode is unsupported.
    pub fn imap_config(&self) -> Result<mailwatch_imap::Config> {
        let security = match self.imap.security {
            SecurityMode::None => mailwatch_imap::Security::Plain,
            SecurityMode::Tls => mailwatch_imap::Security::Tls,
            SecurityMode::StartTls => {
                return Err(Error::Config("STARTTLS is not supported".to_string()));
            }
        };

        let mut config = mailwatch_imap::Config::new(self.imap_host()?)
            .with_security(security)
            .with_timeouts(
                Duration::from_secs(self.imap.connect_timeout_secs.max(1)),
                Duration::from_secs(self.imap.io_timeout_secs.max(1)),
            );
        if let Some(port) = self.imap.port {
            config = config.with_port(port);
        }
        Ok(config)
    }

    /// Production connector for this mailbox.
    ///
    /// # Errors
    ///
    /// See [`WatchConfig::imap_config`].
    pub fn connector(&self) -> Result<ImapConnector> {
        Ok(ImapConnector::new(self.imap_config()?, self.imap.mailbox.clone()))
    }

    /// File cache at `cache_path` or the platform default.
    ///
    /// # Errors
    ///
    /// Returns an error if no path is configured and the platform has no
    /// cache directory.
    pub fn cache_store(&self) -> Result<JsonFileCache> {
        match &self.cache_path {
            Some(path) => Ok(JsonFileCache::new(path)),
            None => JsonFileCache::at_default_location(),
        }
    }

    /// Configured default filters, empty when absent.
    #[must_use]
    pub fn filters(&self) -> FilterSet {
        self.email_filters.clone().unwrap_or_default()
    }
}

/// IMAP host for well-known providers.
#[must_use]
pub fn detect_imap_host(address: &str) -> Option<&'static str> {
    let (_, domain) = address.trim().rsplit_once('@')?;
    match domain.to_lowercase().as_str() {
        "gmail.com" | "googlemail.com" => Some("imap.gmail.com"),
        "outlook.com" | "hotmail.com" | "live.com" => Some("outlook.office365.com"),
        "yahoo.com" | "ymail.com" => Some("imap.mail.yahoo.com"),
        "icloud.com" | "me.com" | "mac.com" => Some("imap.mail.me.com"),
        _ => None,
    }
}
