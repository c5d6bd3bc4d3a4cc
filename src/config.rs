use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://electnxt.db";
pub const DEFAULT_REFRESH_SECS: u64 = 30;
pub const DEFAULT_VOTE_DELAY_MS: u64 = 2000;
pub const DEFAULT_SHARDS: u64 = 1;

pub struct Config {
    pub application_id: u64,
    pub token: String,
    pub database_url: String,
    /// How often election phases are recomputed.
    pub refresh_interval: Duration,
    /// Simulated latency of commit, reveal, and mint.
    pub vote_delay: Duration,
    pub campusbot_url: Option<String>,
    pub campusbot_key: Option<String>,
    pub shards: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key)
            .filter(|v| !v.trim().is_empty())
            .with_context(|| format!("expected {}", key));

        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            application_id: parse("ELECTNXT_APPL", &required("ELECTNXT_APPL")?)?,
            token: required("ELECTNXT_TOKEN")?,
            database_url: optional("ELECTNXT_DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_owned()),
            refresh_interval: Duration::from_secs(
                parse_or("ELECTNXT_REFRESH_SECS", optional("ELECTNXT_REFRESH_SECS"), DEFAULT_REFRESH_SECS)?.max(1)
            ),
            vote_delay: Duration::from_millis(
                parse_or("ELECTNXT_VOTE_DELAY_MS", optional("ELECTNXT_VOTE_DELAY_MS"), DEFAULT_VOTE_DELAY_MS)?
            ),
            campusbot_url: optional("ELECTNXT_CAMPUSBOT_URL"),
            campusbot_key: optional("ELECTNXT_CAMPUSBOT_KEY"),
            shards: parse_or("ELECTNXT_SHARDS", optional("ELECTNXT_SHARDS"), DEFAULT_SHARDS)?.max(1),
        })
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{} is invalid: {}", key, e))
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T::Err: Display,
{
    match raw {
        None => Ok(default),
        Some(v) => parse(key, &v),
    }
}
