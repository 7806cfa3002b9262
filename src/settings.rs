use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::Config;
use serde::Deserialize;

const SCHOLAR_USER: &str = "TSoiF94AAAAJ";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";
const UPDATER_USER_AGENT: &str = "Mozilla/5.0 (compatible; citation-updater/1.0)";

/// Runtime settings. Defaults, then `scholar_citations.toml`, then `SCHOLAR_*` env vars.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    pub profile_url: String,
    pub listing_url: String,
    pub profile_user_agent: String,
    pub listing_user_agent: String,
    pub timeout_secs: u64,
    /// Cached aggregate is served without refetching for this long.
    pub fresh_secs: u64,
    /// Past freshness, the old value may still be served for this long while refreshing.
    pub stale_secs: u64,
    pub bind: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db_path: PathBuf::from("data/citations.sqlite"),
            profile_url: format!("https://scholar.google.com/citations?user={SCHOLAR_USER}&hl=en"),
            listing_url: format!(
                "https://scholar.google.com/citations?view_op=list_works&hl=en&user={SCHOLAR_USER}"
            ),
            profile_user_agent: BROWSER_USER_AGENT.to_string(),
            listing_user_agent: UPDATER_USER_AGENT.to_string(),
            timeout_secs: 30,
            fresh_secs: 60 * 60 * 12,
            stale_secs: 60 * 60 * 24,
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Config::builder()
            .add_source(config::File::with_name("scholar_citations").required(false))
            .add_source(config::Environment::with_prefix("SCHOLAR"))
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn fresh_for(&self) -> Duration {
        Duration::from_secs(self.fresh_secs)
    }

    pub fn stale_for(&self) -> Duration {
        Duration::from_secs(self.stale_secs)
    }

    /// Cache-Control header value expressing the freshness policy to downstream caches.
    pub fn cache_control(&self) -> String {
        format!(
            "s-maxage={}, stale-while-revalidate={}",
            self.fresh_secs, self.stale_secs
        )
    }
}
