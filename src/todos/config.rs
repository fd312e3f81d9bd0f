use std::time::Duration;

use anyhow::{bail, Result};
use url::Url;

use super::client::ClientConfig;
use super::FetchCmd;

pub const DEFAULT_NUM_TODOS: usize = 20;
pub const DEFAULT_NUM_RETRIES: u32 = 3;
/// Largest count whose last id, `2*count`, still fits in a u64.
pub const MAX_NUM_TODOS: u64 = u64::MAX / 2;

/// What the orchestrator is built with. `concurrency: None` means no throttle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchConfig {
    pub count: usize,
    pub retry_budget: u32,
    pub concurrency: Option<usize>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { count: DEFAULT_NUM_TODOS, retry_budget: DEFAULT_NUM_RETRIES, concurrency: None }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub fetch: FetchConfig,
    pub client: ClientConfig,
}

impl Settings {
    /// Flags first, then environment, then defaults. Unparseable env values fall through.
    pub fn resolve<F>(args: &FetchCmd, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let defaults = FetchConfig::default();
        let fetch = FetchConfig {
            count: args.num
                .or_else(|| parsed("NUM_TODOS").map(|v| v as usize))
                .unwrap_or(defaults.count),
            retry_budget: args.retries
                .or_else(|| parsed("NUM_RETRIES").and_then(|v| u32::try_from(v).ok()))
                .unwrap_or(defaults.retry_budget),
            concurrency: args.concurrency.or_else(|| parsed("TODOS_CONCURRENCY").map(|v| v as usize)),
        };
        if fetch.concurrency == Some(0) { bail!("--concurrency must be at least 1"); }
        if fetch.count as u64 > MAX_NUM_TODOS { bail!("--num must be at most {}", MAX_NUM_TODOS); }

        let mut client = ClientConfig::default();
        if let Some(base) = args.base_url.clone().or_else(|| lookup("TODOS_BASE_URL")) {
            client.base_url = base;
        }
        if Url::parse(&client.base_url).is_err() { bail!("Invalid base URL: {}", client.base_url); }
        if let Some(secs) = args.timeout_secs.or_else(|| parsed("TODOS_TIMEOUT_SECS")) {
            client.timeout = Duration::from_secs(secs);
        }

        Ok(Settings { fetch, client })
    }
}
