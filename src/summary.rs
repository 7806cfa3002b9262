use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::db::WorkStore;
use crate::error::Result;
use crate::live::{AggregateMetric, LiveCitations};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    Live,
    Local,
}

/// What a page should display: always a number, live when possible.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationSummary {
    pub total_citations: u64,
    pub fetched_at: Option<DateTime<Utc>>,
    pub source: SummarySource,
    pub live_failed: bool,
}

impl CitationSummary {
    fn local(total: u64, live_failed: bool) -> Self {
        CitationSummary {
            total_citations: total,
            fetched_at: None,
            source: SummarySource::Local,
            live_failed,
        }
    }

    fn live(metric: AggregateMetric) -> Self {
        CitationSummary {
            total_citations: metric.value,
            fetched_at: Some(metric.fetched_at),
            source: SummarySource::Live,
            live_failed: false,
        }
    }
}

/// Last-known-good total from the dataset.
pub fn local_total<S: WorkStore>(store: &S) -> Result<u64> {
    Ok(store.load_citations()?.values().sum())
}

/// Seed from the dataset, overlay the live total if it can be had.
/// A live failure is reported in the result, never as an error.
pub async fn citation_summary<S: WorkStore>(store: &S, live: &LiveCitations) -> Result<CitationSummary> {
    let fallback = local_total(store)?;
    match live.current().await {
        Ok(metric) => Ok(CitationSummary::live(metric)),
        Err(e) => {
            warn!("Live citation fetch failed, using local total {}: {}", fallback, e);
            Ok(CitationSummary::local(fallback, true))
        }
    }
}
