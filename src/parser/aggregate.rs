use std::sync::LazyLock;

use regex::Regex;

// Summary table on the profile page; first numeric cell is "Citations / All".
static TABLE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)id="gsc_rsb_st".*?<td class="gsc_rsb_std">([0-9,]+)</td>"#).unwrap()
});
// Older layout: the count follows a "Cited by" label cell.
static CITED_BY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)Cited by</a></td>\s*<td class="gsc_rsb_std">([0-9,]+)<"#).unwrap()
});

/// One way of locating the total citation count in a profile document.
pub trait AggregatePattern {
    fn name(&self) -> &'static str;

    /// Raw cell text, separators included, or `None` when the layout doesn't match.
    fn capture<'h>(&self, html: &'h str) -> Option<&'h str>;
}

pub struct ByTableId;

impl AggregatePattern for ByTableId {
    fn name(&self) -> &'static str {
        "table-id"
    }

    fn capture<'h>(&self, html: &'h str) -> Option<&'h str> {
        Some(TABLE_ID_RE.captures(html)?.get(1)?.as_str())
    }
}

pub struct ByCitedByLabel;

impl AggregatePattern for ByCitedByLabel {
    fn name(&self) -> &'static str {
        "cited-by-label"
    }

    fn capture<'h>(&self, html: &'h str) -> Option<&'h str> {
        Some(CITED_BY_RE.captures(html)?.get(1)?.as_str())
    }
}

/// Known layouts, most current first.
pub const DEFAULT_PATTERNS: &[&dyn AggregatePattern] = &[&ByTableId, &ByCitedByLabel];

/// Total citation count from a profile page, or `None` if no known layout matches.
pub fn extract_aggregate(html: &str) -> Option<u64> {
    extract_aggregate_with(html, DEFAULT_PATTERNS)
}

/// First pattern (in priority order) whose capture parses as a count wins.
pub fn extract_aggregate_with(html: &str, patterns: &[&dyn AggregatePattern]) -> Option<u64> {
    patterns.iter().find_map(|p| {
        let raw = p.capture(html)?;
        let value = parse_grouped(raw);
        if value.is_none() {
            tracing::debug!("pattern {} matched unparsable text {:?}", p.name(), raw);
        }
        value
    })
}

/// "12,345" -> 12345. Rejects empty, non-digit, and overflowing input.
pub fn parse_grouped(raw: &str) -> Option<u64> {
    let digits: String = raw.chars().filter(|c| *c != ',').collect();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
