//! arXiv listing parser.
//!
//! arXiv feeds describe papers with Dublin Core elements: `dc:creator` holds
//! a comma separated author list and `dc:date` the announcement date.

use super::text::{clean_html, parse_date};
use super::{Parser, RawEntry, parse_with, required_fields};
use crate::Result;
use crate::models::CandidateItem;
use chrono::Utc;

/// Tags for new-style identifiers (`2506.01234`), which carry no category.
const DEFAULT_TAGS: [&str; 2] = ["arxiv", "cs.AI"];

/// Parser for arXiv RSS feeds.
#[derive(Debug, Clone)]
pub struct ArxivParser {
    source_name: String,
}

impl ArxivParser {
    /// Creates a parser stamping items with `source_name`.
    #[must_use]
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
        }
    }

    /// Extracts the paper identifier from an `arxiv.org/abs/` link.
    ///
    /// ```rust
    /// use newsdedup::collectors::ArxivParser;
    ///
    /// assert_eq!(ArxivParser::arxiv_id("https://arxiv.org/abs/2506.01234v2"), Some("2506.01234v2"));
    /// assert_eq!(ArxivParser::arxiv_id("https://example.com/abs/1"), None);
    /// ```
    #[must_use]
    pub fn arxiv_id(link: &str) -> Option<&str> {
        link.split_once("arxiv.org/abs/")
            .map(|(_, id)| id.trim_end_matches('/'))
            .filter(|id| !id.is_empty())
    }

    /// Tags derived from the identifier: old-style ids (`cs/0112017`) name
    /// their category.
    fn tags(link: &str) -> Vec<String> {
        match Self::arxiv_id(link) {
            Some(id) => match id.split_once('/') {
                Some((category, _)) => vec![category.to_string(), "arxiv".to_string()],
                None => DEFAULT_TAGS.iter().map(ToString::to_string).collect(),
            },
            None => vec!["arxiv".to_string()],
        }
    }

    fn convert(&self, entry: &RawEntry) -> Option<CandidateItem> {
        let (title, link) = required_fields(entry, &self.source_name)?;

        let body = [&entry.description, &entry.summary, &entry.content]
            .into_iter()
            .flatten()
            .map(|raw| clean_html(raw))
            .find(|text| !text.is_empty())
            .unwrap_or_default();

        let published_at = [&entry.dc_date, &entry.published, &entry.updated]
            .into_iter()
            .flatten()
            .find_map(|raw| parse_date(raw))
            .unwrap_or_else(|| {
                tracing::debug!(title = %title, "No publication date for paper, using current time");
                Utc::now()
            });

        let authors: Vec<String> = if entry.creators.is_empty() {
            entry.authors.clone()
        } else {
            entry
                .creators
                .iter()
                .flat_map(|creator| creator.split(','))
                .map(|name| clean_html(name))
                .filter(|name| !name.is_empty())
                .collect()
        };

        let mut item = CandidateItem::new(link, title, body, &self.source_name, published_at)
            .with_tags(Self::tags(link));
        if !authors.is_empty() {
            item = item.with_authors(authors.join(", "));
        }
        Some(item)
    }
}

impl Parser for ArxivParser {
    fn source_name(&self) -> &str {
        &self.source_name
    }

    fn parse(&self, raw: &str) -> Result<Vec<CandidateItem>> {
        parse_with(raw, "arxiv", &self.source_name, |entry| self.convert(entry))
    }
}
