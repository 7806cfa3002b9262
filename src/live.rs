use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{CitationError, Result};
use crate::fetch::FetchClient;
use crate::parser::extract_aggregate;
use crate::settings::Settings;

/// Total citation count as observed at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateMetric {
    #[serde(rename = "totalCitations")]
    pub value: u64,
    #[serde(rename = "source")]
    pub source_url: String,
    pub fetched_at: DateTime<Utc>,
}

/// Fetch the profile page once and pull the total out of it. Uncached.
pub async fn fetch_aggregate(client: &FetchClient, url: &str) -> Result<AggregateMetric> {
    let html = client.get_profile(url).await?;
    let value = extract_aggregate(&html).ok_or(CitationError::UnparsableResponse)?;
    Ok(AggregateMetric {
        value,
        source_url: url.to_string(),
        fetched_at: Utc::now(),
    })
}

// ── Cache ──

#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Fresh(AggregateMetric),
    /// Past freshness but still servable while a refresh runs.
    Stale(AggregateMetric),
    Miss,
}

struct CacheEntry {
    value: AggregateMetric,
    fresh_until: Instant,
    stale_until: Instant,
}

/// Single-entry stale-while-revalidate cache. Readers never block each other;
/// a store replaces the whole entry (last writer wins).
pub struct CitationCache {
    fresh_for: Duration,
    stale_for: Duration,
    entry: RwLock<Option<CacheEntry>>,
    refreshing: AtomicBool,
}

impl CitationCache {
    pub fn new(fresh_for: Duration, stale_for: Duration) -> Self {
        CitationCache {
            fresh_for,
            stale_for,
            entry: RwLock::new(None),
            refreshing: AtomicBool::new(false),
        }
    }

    pub fn lookup(&self, now: Instant) -> Lookup {
        let guard = self.entry.read().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(e) if now < e.fresh_until => Lookup::Fresh(e.value.clone()),
            Some(e) if now < e.stale_until => Lookup::Stale(e.value.clone()),
            _ => Lookup::Miss,
        }
    }

    pub fn store(&self, value: AggregateMetric, now: Instant) {
        let fresh_until = now + self.fresh_for;
        let entry = CacheEntry {
            value,
            fresh_until,
            stale_until: fresh_until + self.stale_for,
        };
        *self.entry.write().unwrap_or_else(|e| e.into_inner()) = Some(entry);
    }

    /// Claim the refresh slot. False if another refresh already holds it.
    fn begin_refresh(&self) -> bool {
        self.refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn end_refresh(&self) {
        self.refreshing.store(false, Ordering::Release);
    }
}

// ── Live fetcher ──

struct Inner {
    client: FetchClient,
    profile_url: String,
    cache: CitationCache,
}

impl Inner {
    async fn fetch_and_store(&self) -> Result<AggregateMetric> {
        let metric = fetch_aggregate(&self.client, &self.profile_url).await?;
        self.cache.store(metric.clone(), Instant::now());
        info!("Cached total citations: {}", metric.value);
        Ok(metric)
    }
}

/// Cached access to the live total. Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct LiveCitations {
    inner: Arc<Inner>,
}

impl LiveCitations {
    pub fn new(client: FetchClient, profile_url: impl Into<String>, cache: CitationCache) -> Self {
        LiveCitations {
            inner: Arc::new(Inner {
                client,
                profile_url: profile_url.into(),
                cache,
            }),
        }
    }

    pub fn from_settings(client: FetchClient, settings: &Settings) -> Self {
        let cache = CitationCache::new(settings.fresh_for(), settings.stale_for());
        LiveCitations::new(client, settings.profile_url.clone(), cache)
    }

    /// Current total. Fresh hits skip the network; stale hits are served
    /// immediately and refreshed in the background. Failures are never cached.
    pub async fn current(&self) -> Result<AggregateMetric> {
        match self.inner.cache.lookup(Instant::now()) {
            Lookup::Fresh(metric) => {
                debug!("citation cache hit");
                Ok(metric)
            }
            Lookup::Stale(metric) => {
                debug!("citation cache stale, revalidating");
                self.spawn_refresh();
                Ok(metric)
            }
            Lookup::Miss => {
                debug!("citation cache miss");
                self.inner.fetch_and_store().await
            }
        }
    }

    #[cfg(test)]
    pub fn cached(&self) -> Lookup {
        self.inner.cache.lookup(Instant::now())
    }

    fn spawn_refresh(&self) {
        if !self.inner.cache.begin_refresh() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = inner.fetch_and_store().await {
                warn!("Background citation refresh failed, keeping stale value: {}", e);
            }
            inner.cache.end_refresh();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str =
        r#"<table id="gsc_rsb_st"><tr><td class="gsc_rsb_std">8,142</td></tr></table>"#;

    fn metric(value: u64) -> AggregateMetric {
        AggregateMetric {
            value,
            source_url: "https://example.test/profile".to_string(),
            fetched_at: Utc::now(),
        }
    }

    fn live_for(server: &mockito::Server, fresh: Duration, stale: Duration) -> LiveCitations {
        let client = FetchClient::new(&Settings::default()).unwrap();
        LiveCitations::new(
            client,
            format!("{}/citations", server.url()),
            CitationCache::new(fresh, stale),
        )
    }

    #[test]
    fn cache_windows() {
        let cache = CitationCache::new(Duration::from_secs(10), Duration::from_secs(20));
        let t0 = Instant::now();
        assert_eq!(cache.lookup(t0), Lookup::Miss);

        let m = metric(5);
        cache.store(m.clone(), t0);
        assert_eq!(cache.lookup(t0 + Duration::from_secs(9)), Lookup::Fresh(m.clone()));
        assert_eq!(cache.lookup(t0 + Duration::from_secs(10)), Lookup::Stale(m.clone()));
        assert_eq!(cache.lookup(t0 + Duration::from_secs(29)), Lookup::Stale(m));
        assert_eq!(cache.lookup(t0 + Duration::from_secs(30)), Lookup::Miss);
    }

    #[test]
    fn store_replaces_whole_entry() {
        let cache = CitationCache::new(Duration::from_secs(10), Duration::ZERO);
        let t0 = Instant::now();
        cache.store(metric(1), t0);
        let newer = metric(2);
        cache.store(newer.clone(), t0 + Duration::from_secs(5));
        assert_eq!(cache.lookup(t0 + Duration::from_secs(12)), Lookup::Fresh(newer));
    }

    #[test]
    fn only_one_refresh_at_a_time() {
        let cache = CitationCache::new(Duration::ZERO, Duration::ZERO);
        assert!(cache.begin_refresh());
        assert!(!cache.begin_refresh());
        cache.end_refresh();
        assert!(cache.begin_refresh());
    }

    #[test]
    fn serializes_like_the_api_payload() {
        let json = serde_json::to_value(metric(8142)).unwrap();
        assert_eq!(json["totalCitations"], 8142);
        assert_eq!(json["source"], "https://example.test/profile");
        assert!(json["fetchedAt"].as_str().unwrap().contains('T'));
    }

    #[tokio::test]
    async fn fresh_window_serves_cached_value() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/citations")
            .with_body(PROFILE)
            .expect(1)
            .create_async()
            .await;

        let live = live_for(&server, Duration::from_secs(60), Duration::from_secs(60));
        let first = live.current().await.unwrap();
        let second = live.current().await.unwrap();
        assert_eq!(first.value, 8142);
        assert_eq!(first.fetched_at, second.fetched_at);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn expiry_triggers_one_refetch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/citations")
            .with_body(PROFILE)
            .expect(2)
            .create_async()
            .await;

        let live = live_for(&server, Duration::from_millis(200), Duration::ZERO);
        let first = live.current().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        let second = live.current().await.unwrap();
        let third = live.current().await.unwrap();
        assert!(second.fetched_at > first.fetched_at);
        assert_eq!(second.fetched_at, third.fetched_at);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn stale_value_served_while_refreshing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/citations")
            .with_body(PROFILE)
            .expect(2)
            .create_async()
            .await;

        let live = live_for(&server, Duration::from_millis(200), Duration::from_secs(60));
        let first = live.current().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let stale = live.current().await.unwrap();
        assert_eq!(stale.fetched_at, first.fetched_at);

        let mut refreshed = None;
        for _ in 0..100 {
            if let Lookup::Fresh(m) = live.cached() {
                refreshed = Some(m);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let refreshed = refreshed.expect("background refresh never landed");
        assert!(refreshed.fetched_at > first.fetched_at);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn upstream_503_is_fetch_failed_and_not_cached() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/citations")
            .with_status(503)
            .create_async()
            .await;

        let live = live_for(&server, Duration::from_secs(60), Duration::from_secs(60));
        let err = live.current().await.unwrap_err();
        assert!(matches!(err, CitationError::FetchFailed { status: 503 }));
        assert_eq!(live.cached(), Lookup::Miss);
    }

    #[tokio::test]
    async fn layout_change_is_unparsable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/citations")
            .with_body("<html><div class=\"new-layout\">8,142</div></html>")
            .create_async()
            .await;

        let live = live_for(&server, Duration::from_secs(60), Duration::from_secs(60));
        let err = live.current().await.unwrap_err();
        assert!(matches!(err, CitationError::UnparsableResponse));
        assert_eq!(err.status_class(), 502);
    }
}
