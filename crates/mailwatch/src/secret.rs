//! Mailbox secret lookup.
//!
//! Checked in order: the `MAILWATCH_SECRET` environment variable, the
//! system keyring (service `mailwatch`, user = mailbox address), then the
//! config file's `secret` field.

use anyhow::anyhow;
use keyring::Entry;
use tracing::{debug, warn};

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "mailwatch";

/// Environment variable checked first.
pub const SECRET_ENV: &str = "MAILWATCH_SECRET";

/// Where a secret was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Env,
    Keyring,
    ConfigFile,
}

/// Resolves the secret for `address`.
pub fn resolve(address: &str, from_config: Option<&str>) -> anyhow::Result<String> {
    let from_env = std::env::var(SECRET_ENV).ok();
    let (source, secret) = pick(from_env, || keyring_secret(address), from_config).ok_or_else(|| {
        anyhow!(
            "no secret for {address}: set {SECRET_ENV}, store one in the system keyring \
             (service \"{SERVICE_NAME}\", user \"{address}\"), or add \"secret\" to the config file"
        )
    })?;
    debug!(?source, "mailbox secret resolved");
    Ok(secret)
}

fn pick(
    from_env: Option<String>,
    from_keyring: impl FnOnce() -> Option<String>,
    from_config: Option<&str>,
) -> Option<(Source, String)> {
    let present = |s: &String| !s.is_empty();

    if let Some(secret) = from_env.filter(present) {
        return Some((Source::Env, secret));
    }
    if let Some(secret) = from_keyring().filter(present) {
        return Some((Source::Keyring, secret));
    }
    from_config
        .map(str::to_string)
        .filter(present)
        .map(|secret| (Source::ConfigFile, secret))
}

fn keyring_secret(address: &str) -> Option<String> {
    let lookup = Entry::new(SERVICE_NAME, address).and_then(|entry| entry.get_password());
    match lookup {
        Ok(secret) => Some(secret),
        Err(keyring::Error::NoEntry) => {
            debug!(address, "no keyring entry");
            None
        }
        Err(e) => {
            warn!(address, error = %e, "keyring unavailable");
            None
        }
    }
}
