//! RSS 2.0 and Atom parser.

use super::text::{clean_html, parse_date};
use super::{Parser, RawEntry, parse_with, required_fields};
use crate::Result;
use crate::models::CandidateItem;
use chrono::Utc;

/// Parser for standard RSS 2.0 and Atom feeds (company blogs, tech press).
#[derive(Debug, Clone)]
pub struct StandardParser {
    source_name: String,
}

impl StandardParser {
    /// Creates a parser stamping items with `source_name`.
    #[must_use]
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
        }
    }

    fn convert(&self, entry: &RawEntry) -> Option<CandidateItem> {
        let (title, link) = required_fields(entry, &self.source_name)?;

        // Full content beats a summary.
        let body = [&entry.content, &entry.summary, &entry.description]
            .into_iter()
            .flatten()
            .map(|raw| clean_html(raw))
            .find(|text| !text.is_empty())
            .unwrap_or_default();

        let published_at = [&entry.published, &entry.updated, &entry.dc_date]
            .into_iter()
            .flatten()
            .find_map(|raw| parse_date(raw))
            .unwrap_or_else(|| {
                tracing::debug!(title = %title, "No publication date, using current time");
                Utc::now()
            });

        let mut item = CandidateItem::new(link, title, body, &self.source_name, published_at)
            .with_tags(entry.categories.clone());
        let authors = if entry.authors.is_empty() {
            &entry.creators
        } else {
            &entry.authors
        };
        if !authors.is_empty() {
            item = item.with_authors(authors.join(", "));
        }
        Some(item)
    }
}

impl Parser for StandardParser {
    fn source_name(&self) -> &str {
        &self.source_name
    }

    fn parse(&self, raw: &str) -> Result<Vec<CandidateItem>> {
        parse_with(raw, "standard", &self.source_name, |entry| self.convert(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};

    fn parse(raw: &str) -> Vec<CandidateItem> {
        StandardParser::new("example-blog").parse(raw).unwrap()
    }

    #[test]
    fn test_prefers_full_content() {
        let items = parse(
            r#"<rss xmlns:content="http://purl.org/rss/1.0/modules/content/"><channel><item>
                <title>Launch</title>
                <link>https://example.com/launch</link>
                <description>Short</description>
                <content:encoded><![CDATA[<p>The <em>full</em> story</p>]]></content:encoded>
                <pubDate>Mon, 02 Jun 2025 14:30:00 GMT</pubDate>
            </item></channel></rss>"#,
        );
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.body, "The full story");
        assert_eq!(item.source_id, "example-blog");
        assert_eq!(
            item.published_at,
            Utc.with_ymd_and_hms(2025, 6, 2, 14, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_falls_back_to_description() {
        let items = parse(
            "<rss><channel><item><title>T</title><link>https://example.com/t</link>\
             <description>&lt;b&gt;Summary&lt;/b&gt; text</description></item></channel></rss>",
        );
        assert_eq!(items[0].body, "Summary text");
    }

    #[test]
    fn test_skips_entries_without_title_or_link() {
        let items = parse(
            "<rss><channel>\
             <item><link>https://example.com/no-title</link></item>\
             <item><title>No link</title></item>\
             <item><title>Kept</title><link>https://example.com/kept</link></item>\
             </channel></rss>",
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Kept");
    }

    #[test]
    fn test_missing_date_uses_now() {
        let before = Utc::now();
        let items = parse("<rss><channel><item><title>T</title><link>https://e.com/x</link></item></channel></rss>");
        assert!(items[0].published_at >= before);
    }

    #[test]
    fn test_atom_entry() {
        let items = parse(
            r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry>
                <title>Atom post</title>
                <link href="https://lab.example.org/posts/1"/>
                <updated>2025-05-30T10:00:00Z</updated>
                <summary>Atom summary</summary>
                <author><name>Lab Team</name></author>
                <category term="agents"/><category term="rl"/>
            </entry></feed>"#,
        );
        let item = &items[0];
        assert_eq!(item.url, "https://lab.example.org/posts/1");
        assert_eq!(item.body, "Atom summary");
        assert_eq!(item.tags, ["agents", "rl"]);
        assert_eq!(item.authors.as_deref(), Some("Lab Team"));
        assert_eq!(
            item.published_at,
            DateTime::parse_from_rfc3339("2025-05-30T10:00:00Z").unwrap()
        );
    }
}
