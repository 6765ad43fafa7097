//! Feed parsers.
//!
//! Turns raw RSS 2.0, Atom and arXiv documents into [`CandidateItem`]s for the
//! deduplication engine. Each feed family has its own [`Parser`]; parsers are
//! pure functions of their input and keep no state between calls.
//!
//! # Example
//!
//! ```rust
//! use newsdedup::collectors::parser_for;
//!
//! let parser = parser_for("openai-blog");
//! let items = parser.parse("<rss><channel></channel></rss>")?;
//! assert!(items.is_empty());
//! # Ok::<(), newsdedup::Error>(())
//! ```

mod arxiv;
mod feed;
mod standard;
pub mod text;

pub use arxiv::ArxivParser;
pub use feed::{FeedLink, RawEntry, read_entries};
pub use standard::StandardParser;

use crate::Result;
use crate::models::CandidateItem;
use std::time::Instant;

/// Capability interface for feed-family specific parsing.
pub trait Parser: Send + Sync {
    /// Returns the feed identifier stamped on every parsed item.
    fn source_name(&self) -> &str;

    /// Parses a raw feed document.
    ///
    /// Entries without a title or link are skipped, not reported as errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not readable XML.
    fn parse(&self, raw: &str) -> Result<Vec<CandidateItem>>;
}

/// Picks the parser for a feed by name: arXiv feeds get [`ArxivParser`],
/// everything else [`StandardParser`].
#[must_use]
pub fn parser_for(feed_name: &str) -> Box<dyn Parser> {
    if feed_name.to_lowercase().contains("arxiv") {
        Box::new(ArxivParser::new(feed_name))
    } else {
        Box::new(StandardParser::new(feed_name))
    }
}

/// Runs `convert` over every entry of `raw`, recording parse metrics.
fn parse_with(
    raw: &str,
    parser: &'static str,
    source_name: &str,
    convert: impl Fn(&RawEntry) -> Option<CandidateItem>,
) -> Result<Vec<CandidateItem>> {
    let start = Instant::now();
    let entries = read_entries(raw)?;
    let items: Vec<CandidateItem> = entries.iter().filter_map(convert).collect();
    let skipped = entries.len() - items.len();

    metrics::counter!("feed_items_parsed_total", "parser" => parser).increment(items.len() as u64);
    metrics::counter!("feed_items_skipped_total", "parser" => parser).increment(skipped as u64);
    metrics::histogram!("feed_parse_duration_ms", "parser" => parser)
        .record(start.elapsed().as_secs_f64() * 1000.0);
    tracing::info!(source = source_name, parsed = items.len(), skipped, "Parsed feed");

    Ok(items)
}

/// Returns the trimmed title and link, or `None` (logged) if either is blank.
fn required_fields<'a>(entry: &'a RawEntry, source_name: &str) -> Option<(String, &'a str)> {
    let title = entry.title.as_deref().map(text::clean_html).unwrap_or_default();
    let link = entry.article_url().unwrap_or_default();
    if title.is_empty() || link.is_empty() {
        tracing::debug!(source = source_name, "Skipping entry without title or link");
        return None;
    }
    Some((title, link))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_for_picks_by_name() {
        assert_eq!(parser_for("ArXiv cs.AI").source_name(), "ArXiv cs.AI");
        let arxiv = parser_for("arxiv-cs-lg");
        let items = arxiv
            .parse(
                r#"<rss xmlns:dc="http://purl.org/dc/elements/1.1/"><channel><item>
                    <title>Paper</title><link>https://arxiv.org/abs/2506.00001</link>
                    <dc:creator>A, B</dc:creator></item></channel></rss>"#,
            )
            .unwrap();
        assert_eq!(items[0].authors.as_deref(), Some("A, B"));
        assert!(items[0].tags.contains(&"arxiv".to_string()));

        let standard = parser_for("techcrunch");
        let items = standard
            .parse("<rss><channel><item><title>T</title><link>https://tc.example/a</link></item></channel></rss>")
            .unwrap();
        assert!(items[0].tags.is_empty());
    }
}
