//! Batch reconciliation of per-publication citation counts.
//!
//! Runs are expected to be non-overlapping (one scheduled job per dataset).
//! Nothing in-process enforces that; two concurrent runs against the same
//! database would race on the read-modify-write below.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::db::WorkStore;
use crate::error::Result;
use crate::fetch::FetchClient;
use crate::parser::extract_per_work;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconciliationResult {
    pub updated_count: usize,
}

/// Apply scraped counts to the stored ones in place and return how many changed.
///
/// Decreases are accepted. Ids missing from `scraped` keep their stored value;
/// scraped ids unknown to the store are ignored.
pub fn merge_citations(stored: &mut BTreeMap<String, u64>, scraped: &BTreeMap<String, u64>) -> usize {
    let mut updated = 0;
    for (scholar_id, current) in stored.iter_mut() {
        let Some(&observed) = scraped.get(scholar_id) else {
            continue;
        };
        if observed != *current {
            debug!("{}: {} -> {}", scholar_id, current, observed);
            *current = observed;
            updated += 1;
        }
    }
    updated
}

/// Fetch the works listing and fold its counts into the store.
///
/// A fetch failure aborts before anything is read or written. The store is
/// only written when at least one count changed.
pub async fn reconcile<S: WorkStore>(
    client: &FetchClient,
    store: &S,
    listing_url: &str,
) -> Result<ReconciliationResult> {
    let html = client.get_listing(listing_url).await?;
    let scraped = extract_per_work(&html);
    info!("Scraped {} works from listing", scraped.len());

    let mut citations = store.load_citations()?;
    let updated_count = merge_citations(&mut citations, &scraped);

    if updated_count > 0 {
        store.save_citations(&citations)?;
        info!("Saved {} citation update(s)", updated_count);
    }

    Ok(ReconciliationResult { updated_count })
}
