//! `mailwatch` - watch an IMAP mailbox for messages matching sender and
//! subject rules.
//!
//! - `mailwatch check` checks once and prints one JSON response.
//! - `mailwatch monitor` checks on an interval, one JSON line per check,
//!   until Ctrl-C.
//! - `mailwatch cache-status` prints the dedup cache status.
//!
//! Logs go to stderr so stdout carries only JSON.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;
mod secret;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mailwatch_core::{CacheStore, Credential, MailWatcher, StartOutcome, WatchConfig, shared};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let path = match cli.config {
        Some(path) => path,
        None => WatchConfig::default_path()?,
    };
    let mut config = WatchConfig::load(&path).context("failed to load configuration")?;
    if let Some(cache) = cli.cache {
        config.cache_path = Some(cache);
    }

    match cli.command {
        Command::Check(args) => {
            let request = args.to_value()?;
            let watcher = build_watcher(&config)?;
            let response = watcher.check(&request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Monitor(args) => {
            let request = args.to_value()?;
            let watcher = build_watcher(&config)?;
            monitor(&watcher, &request).await?;
        }
        Command::CacheStatus => {
            let mut store = config.cache_store()?;
            store.load();
            println!("{}", serde_json::to_string_pretty(&store.status())?);
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "mailwatch=debug,mailwatch_core=debug,mailwatch_imap=debug"
    } else {
        "mailwatch=info,mailwatch_core=info,mailwatch_imap=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_watcher(config: &WatchConfig) -> anyhow::Result<MailWatcher> {
    let secret = secret::resolve(&config.address, config.secret.as_deref())?;
    let connector = config.connector().context("invalid IMAP settings")?;
    let cache = config.cache_store().context("no cache location")?;
    info!(address = %config.address, host = %connector.host(), mailbox = %connector.mailbox(), "watching mailbox");

    Ok(MailWatcher::new(
        Arc::new(connector),
        Credential::new(config.address.trim(), secret),
        shared(cache),
    )
    .with_default_filters(config.filters())
    .with_defaults(config.defaults))
}

async fn monitor(watcher: &MailWatcher, request: &serde_json::Value) -> anyhow::Result<()> {
    let mut updates = watcher.subscribe();

    match watcher.start_monitoring(request).await? {
        StartOutcome::Started(first) => print_line(&first)?,
        StartOutcome::AlreadyRunning => {}
    }
    updates.mark_unchanged();
    info!(
        interval_secs = watcher.monitor_status().check_interval_seconds,
        "monitoring, press Ctrl-C to stop"
    );

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                info!("received shutdown signal");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = updates.borrow_and_update().clone();
                if let Some(response) = latest {
                    print_line(response.as_ref())?;
                }
            }
        }
    }

    watcher.stop_monitoring().await;
    Ok(())
}

fn print_line(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
