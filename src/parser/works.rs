use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(?:amp|lt|gt|quot|#39);").unwrap());
static ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<tr class="gsc_a_tr">(.*?)</tr>"#).unwrap());
static WORK_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"citation_for_view=[^:]+:([A-Za-z0-9_-]+)").unwrap());
static CITED_BY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"class="gsc_a_ac gs_ibl">([0-9]*)</a>"#).unwrap());

/// Decode the handful of entities the listing uses inside attributes.
/// Single pass, so "&amp;lt;" becomes "&lt;" and not "<".
pub fn decode_entities(input: &str) -> Cow<'_, str> {
    ENTITY_RE.replace_all(input, |caps: &regex::Captures| {
        match &caps[0] {
            "&amp;" => "&",
            "&lt;" => "<",
            "&gt;" => ">",
            "&quot;" => "\"",
            _ => "'",
        }
    })
}

/// Per-work citation counts keyed by Scholar work id.
///
/// Rows without a work id (headers, "show more" rows) are skipped. A row whose
/// cited-by anchor is empty or missing counts as 0; a count too large to read
/// skips the row so the stored value survives.
pub fn extract_per_work(html: &str) -> BTreeMap<String, u64> {
    let html = decode_entities(html);
    let mut counts = BTreeMap::new();

    for row in ROW_RE.captures_iter(&html) {
        let row = &row[1];
        let Some(id) = WORK_ID_RE.captures(row) else {
            continue;
        };
        let citations = match CITED_BY_RE.captures(row) {
            Some(c) if !c[1].is_empty() => match c[1].parse() {
                Ok(n) => n,
                Err(_) => {
                    debug!("skipping {}: unreadable count {:?}", &id[1], &c[1]);
                    continue;
                }
            },
            _ => 0,
        };
        counts.insert(id[1].to_string(), citations);
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: Option<&str>, cited: &str) -> String {
        let link = match id {
            Some(id) => format!(
                r#"<a href="/citations?view_op=view_citation&amp;hl=en&amp;user=TSoiF94AAAAJ&amp;citation_for_view=TSoiF94AAAAJ:{id}" class="gsc_a_at">Title</a>"#
            ),
            None => r#"<a class="gsc_a_at">No link</a>"#.to_string(),
        };
        format!(
            r#"<tr class="gsc_a_tr"><td class="gsc_a_t">{link}</td><td class="gsc_a_c"><a href="x" class="gsc_a_ac gs_ibl">{cited}</a></td></tr>"#
        )
    }

    #[test]
    fn decodes_known_entities() {
        assert_eq!(
            decode_entities("a&amp;b &lt;i&gt; &quot;q&quot; it&#39;s"),
            "a&b <i> \"q\" it's"
        );
    }

    #[test]
    fn decode_is_single_pass() {
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
        assert!(matches!(decode_entities("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn counts_only_rows_with_ids() {
        let html = [
            row(Some("2osOgNQ5qMEC"), "18"),
            row(None, "99"),
            row(Some("YsMSGLbcyi4C"), "14"),
            row(None, ""),
        ]
        .concat();
        let counts = extract_per_work(&html);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts["2osOgNQ5qMEC"], 18);
        assert_eq!(counts["YsMSGLbcyi4C"], 14);
    }

    #[test]
    fn empty_anchor_is_zero() {
        let counts = extract_per_work(&row(Some("Tyk-4Ss8FVUC"), ""));
        assert_eq!(counts["Tyk-4Ss8FVUC"], 0);
    }

    #[test]
    fn missing_anchor_is_zero() {
        let html = r#"<tr class="gsc_a_tr"><a href="?citation_for_view=U:abc_1">t</a></tr>"#;
        assert_eq!(extract_per_work(html)["abc_1"], 0);
    }

    #[test]
    fn overflowing_count_skips_row() {
        let html = [
            row(Some("huge"), "99999999999999999999999"),
            row(Some("ok"), "7"),
        ]
        .concat();
        let counts = extract_per_work(&html);
        assert!(!counts.contains_key("huge"));
        assert_eq!(counts["ok"], 7);
    }

    #[test]
    fn later_duplicate_wins() {
        let html = [row(Some("dup"), "3"), row(Some("dup"), "5")].concat();
        let counts = extract_per_work(&html);
        assert_eq!(counts.len(), 1);
        assert_eq!(counts["dup"], 5);
    }

    #[test]
    fn no_rows() {
        assert!(extract_per_work("<html><body>blocked</body></html>").is_empty());
    }

    #[test]
    fn listing_fixture() {
        let html = std::fs::read_to_string("tests/fixtures/listing.html").unwrap();
        let counts = extract_per_work(&html);
        assert_eq!(counts.len(), 3);
        assert_eq!(counts["2osOgNQ5qMEC"], 18);
        assert_eq!(counts["YsMSGLbcyi4C"], 0);
        assert_eq!(counts["Tyk-4Ss8FVUC"], 12);
        assert_eq!(counts.values().filter(|c| **c > 0).count(), 2);
    }
}
