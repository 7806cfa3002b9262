use std::time::Instant;

use reqwest::header::{ACCEPT, USER_AGENT};
use tracing::{info, warn};

use crate::error::{CitationError, Result};
use crate::settings::Settings;

/// Thin GET client for the two Scholar pages. No retries; callers decide.
#[derive(Clone)]
pub struct FetchClient {
    http: reqwest::Client,
    profile_agent: String,
    listing_agent: String,
}

impl FetchClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()?;
        Ok(FetchClient {
            http,
            profile_agent: settings.profile_user_agent.clone(),
            listing_agent: settings.listing_user_agent.clone(),
        })
    }

    /// Profile summary page, requested with a browser identity.
    pub async fn get_profile(&self, url: &str) -> Result<String> {
        let request = self.http.get(url).header(USER_AGENT, &self.profile_agent);
        send(request, url).await
    }

    /// Works listing page, requested as HTML.
    pub async fn get_listing(&self, url: &str) -> Result<String> {
        let request = self
            .http
            .get(url)
            .header(USER_AGENT, &self.listing_agent)
            .header(ACCEPT, "text/html");
        send(request, url).await
    }
}

async fn send(request: reqwest::RequestBuilder, url: &str) -> Result<String> {
    let start = Instant::now();
    info!("Fetching {}", url);

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        warn!("{} returned {}", url, status);
        return Err(CitationError::FetchFailed {
            status: status.as_u16(),
        });
    }

    let body = response.text().await?;
    info!(
        "Fetched {} ({} bytes, {}ms)",
        url,
        body.len(),
        start.elapsed().as_millis()
    );
    Ok(body)
}
