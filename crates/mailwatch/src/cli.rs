//! Command-line arguments.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value, json};

/// Watch an IMAP mailbox for messages from given senders.
#[derive(Debug, Parser)]
#[command(name = "mailwatch", about = "Watch an IMAP mailbox for matching messages", version)]
pub struct Cli {
    /// Config file path (defaults to the platform config directory).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Cache file path (overrides the config file).
    #[arg(long, global = true)]
    pub cache: Option<PathBuf>,

    /// Enable debug-level logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check the mailbox once and print the result.
    Check(CheckArgs),

    /// Check on an interval until interrupted, one JSON line per check.
    Monitor(MonitorArgs),

    /// Print the dedup cache status.
    CacheStatus,
}

/// Options shared by `check` and `monitor`.
///
/// Numbers are kept as strings and handed to the normalizer, so a bad value
/// falls back to its default instead of failing.
#[derive(Debug, Default, Args)]
pub struct CheckArgs {
    /// Filters as JSON: `{"sender@x.com": ["subject", ...]}`.
    #[arg(long)]
    pub filters: Option<String>,

    /// One filter as `SENDER=SUBJECT1,SUBJECT2`; repeatable.
    #[arg(long = "filter", value_name = "SENDER=SUBJECTS")]
    pub filter: Vec<String>,

    /// Maximum messages examined per check.
    #[arg(long, value_name = "N")]
    pub max_messages: Option<String>,

    /// Search window in hours; overrides --days.
    #[arg(long, value_name = "N")]
    pub hours: Option<String>,

    /// Search window in days.
    #[arg(long, value_name = "N")]
    pub days: Option<String>,

    /// Report messages even if they were reported before.
    #[arg(long)]
    pub no_cache: bool,
}

/// Options for `monitor`.
#[derive(Debug, Default, Args)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub check: CheckArgs,

    /// Seconds between checks.
    #[arg(long, value_name = "SECONDS")]
    pub interval: Option<String>,
}

impl CheckArgs {
    /// Builds the request arguments.
    ///
    /// `email_filters` is only set when filters were given, so the config
    /// file's filters apply otherwise.
    pub fn to_value(&self) -> anyhow::Result<Value> {
        let mut args = Map::new();

        if let Some(filters) = self.filters()? {
            args.insert("email_filters".into(), filters);
        }
        if let Some(n) = &self.max_messages {
            args.insert("max_messages".into(), json!(n));
        }
        if let Some(n) = &self.hours {
            args.insert("time_window_hours".into(), json!(n));
        }
        if let Some(n) = &self.days {
            args.insert("days_back".into(), json!(n));
        }
        if self.no_cache {
            args.insert("use_cache".into(), json!(false));
        }
        Ok(Value::Object(args))
    }

    fn filters(&self) -> anyhow::Result<Option<Value>> {
        if self.filters.is_none() && self.filter.is_empty() {
            return Ok(None);
        }

        let mut rules = match &self.filters {
            Some(text) => match serde_json::from_str::<Value>(text).context("--filters is not valid JSON")? {
                Value::Object(map) => map,
                _ => bail!("--filters must be a JSON object"),
            },
            None => Map::new(),
        };

        for rule in &self.filter {
            let Some((sender, subjects)) = rule.split_once('=') else {
                bail!("--filter {rule:?} must look like SENDER=SUBJECT1,SUBJECT2");
            };
            let entry = rules
                .entry(sender.trim().to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            let Value::Array(patterns) = entry else {
                bail!("--filters entry for {sender} is not a list");
            };
            patterns.extend(subjects.split(',').map(|s| json!(s.trim())));
        }

        Ok(Some(Value::Object(rules)))
    }
}

impl MonitorArgs {
    /// Builds the request arguments, including the interval.
    pub fn to_value(&self) -> anyhow::Result<Value> {
        let mut args = self.check.to_value()?;
        if let (Some(n), Value::Object(map)) = (&self.interval, &mut args) {
            map.insert("check_interval_seconds".into(), json!(n));
        }
        Ok(args)
    }
}
