//! Streaming reader for RSS 2.0 and Atom documents.
//!
//! Walks the XML event stream and collects the fields of every `<item>` or
//! `<entry>` by local name, so prefixed extensions (`dc:creator`,
//! `content:encoded`) are picked up regardless of the prefix a feed binds.
//! Interpretation of the fields is left to the parsers.

use crate::{Error, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// A link element of an Atom entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedLink {
    /// Target URL.
    pub href: String,
    /// Link relation; Atom treats a missing `rel` as `alternate`.
    pub rel: Option<String>,
}

/// Raw fields of one feed entry, as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    /// `<title>`.
    pub title: Option<String>,
    /// RSS `<link>` text.
    pub link: Option<String>,
    /// Atom `<link href>` elements.
    pub links: Vec<FeedLink>,
    /// RSS `<description>`.
    pub description: Option<String>,
    /// Atom `<summary>`.
    pub summary: Option<String>,
    /// Atom `<content>` or `content:encoded`.
    pub content: Option<String>,
    /// `<pubDate>` or `<published>`.
    pub published: Option<String>,
    /// `<updated>`.
    pub updated: Option<String>,
    /// Dublin Core `dc:date`.
    pub dc_date: Option<String>,
    /// Dublin Core `dc:creator` values.
    pub creators: Vec<String>,
    /// RSS `<author>` text or Atom `<author><name>`.
    pub authors: Vec<String>,
    /// RSS `<category>` text or Atom `<category term>`.
    pub categories: Vec<String>,
    /// `<guid>` or `<id>`.
    pub id: Option<String>,
}

impl RawEntry {
    /// Returns the article URL: RSS link text, else the alternate Atom link,
    /// else the first Atom link.
    #[must_use]
    pub fn article_url(&self) -> Option<&str> {
        if let Some(link) = self.link.as_deref().map(str::trim)
            && !link.is_empty()
        {
            return Some(link);
        }
        self.links
            .iter()
            .find(|l| l.rel.as_deref().is_none_or(|rel| rel == "alternate"))
            .or_else(|| self.links.first())
            .map(|l| l.href.as_str())
    }

    fn absorb_attributes(&mut self, name: &str, element: &BytesStart<'_>) {
        match name {
            "link" => {
                let href = attribute(element, b"href");
                if let Some(href) = href.filter(|h| !h.trim().is_empty()) {
                    self.links.push(FeedLink {
                        href: href.trim().to_string(),
                        rel: attribute(element, b"rel"),
                    });
                }
            },
            "category" => {
                if let Some(term) = attribute(element, b"term").filter(|t| !t.trim().is_empty()) {
                    self.categories.push(term.trim().to_string());
                }
            },
            _ => {},
        }
    }

    /// Stores a closed element's text. Returns the text back when the element
    /// is not a known field so it can flow into its parent.
    fn assign(&mut self, frame: Frame, parent: Option<&str>) -> Option<String> {
        let Frame {
            name,
            text,
            has_children,
        } = frame;
        let value = text.trim().to_string();

        match (name.as_str(), parent) {
            ("title", None) => set_once(&mut self.title, value),
            ("link", None) => set_once(&mut self.link, value),
            ("description", None) => set_once(&mut self.description, value),
            ("summary", None) => set_once(&mut self.summary, value),
            ("encoded" | "content", None) => set_once(&mut self.content, value),
            ("pubDate" | "published" | "issued", None) => set_once(&mut self.published, value),
            ("updated" | "modified", None) => set_once(&mut self.updated, value),
            ("date", None) => set_once(&mut self.dc_date, value),
            ("guid" | "id", None) => set_once(&mut self.id, value),
            ("creator", None) => push_nonempty(&mut self.creators, value),
            ("category", None) => push_nonempty(&mut self.categories, value),
            ("author", None) if !has_children => push_nonempty(&mut self.authors, value),
            ("name", Some("author")) => push_nonempty(&mut self.authors, value),
            ("author" | "email" | "uri", _) => {},
            (_, Some(_)) => return Some(text),
            _ => {},
        }
        None
    }
}

fn set_once(slot: &mut Option<String>, value: String) {
    if slot.is_none() && !value.is_empty() {
        *slot = Some(value);
    }
}

fn push_nonempty(values: &mut Vec<String>, value: String) {
    if !value.is_empty() {
        values.push(value);
    }
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == key)
        .map(|attr| decode(&attr.value))
}

fn local_name(element: &BytesStart<'_>) -> String {
    decode(element.local_name().as_ref())
}

/// Lossy UTF-8 plus HTML entity decoding; feeds routinely use HTML entities
/// that plain XML unescaping rejects.
fn decode(bytes: &[u8]) -> String {
    html_escape::decode_html_entities(&String::from_utf8_lossy(bytes)).into_owned()
}

fn is_entry(name: &str) -> bool {
    name == "item" || name == "entry"
}

/// An open element inside an entry.
#[derive(Debug)]
struct Frame {
    name: String,
    text: String,
    has_children: bool,
}

impl Frame {
    const fn new(name: String) -> Self {
        Self {
            name,
            text: String::new(),
            has_children: false,
        }
    }

    fn push_text(&mut self, text: &str) {
        if !self.text.is_empty() && !text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(text);
    }
}

/// Reads every entry of an RSS or Atom document.
///
/// Markup that breaks off after at least one complete entry is tolerated
/// with a warning; otherwise malformed XML is an error.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the document is not well-formed XML
/// before the first entry closes.
pub fn read_entries(raw: &str) -> Result<Vec<RawEntry>> {
    let mut reader = Reader::from_str(raw);
    let mut entries = Vec::new();
    let mut current: Option<RawEntry> = None;
    let mut stack: Vec<Frame> = Vec::new();

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) if entries.is_empty() => {
                return Err(Error::InvalidInput(format!(
                    "malformed feed XML at byte {}: {e}",
                    reader.buffer_position()
                )));
            },
            Err(e) => {
                tracing::warn!(error = %e, parsed = entries.len(), "Feed XML broke off, keeping parsed entries");
                break;
            },
        };

        match event {
            Event::Start(element) => {
                let name = local_name(&element);
                if is_entry(&name) {
                    current = Some(RawEntry::default());
                    stack.clear();
                } else if let Some(entry) = current.as_mut() {
                    entry.absorb_attributes(&name, &element);
                    if let Some(parent) = stack.last_mut() {
                        parent.has_children = true;
                    }
                    stack.push(Frame::new(name));
                }
            },
            Event::Empty(element) => {
                if let Some(entry) = current.as_mut() {
                    entry.absorb_attributes(&local_name(&element), &element);
                }
            },
            Event::Text(text) => {
                if let Some(frame) = stack.last_mut() {
                    frame.push_text(&decode(&text.into_inner()));
                }
            },
            Event::CData(data) => {
                if let Some(frame) = stack.last_mut() {
                    frame.push_text(&String::from_utf8_lossy(&data.into_inner()));
                }
            },
            Event::End(element) => {
                let name = decode(element.local_name().as_ref());
                if is_entry(&name) {
                    entries.extend(current.take());
                    stack.clear();
                } else if let Some(entry) = current.as_mut()
                    && let Some(frame) = stack.pop()
                {
                    let parent = stack.last().map(|p| p.name.clone());
                    if let Some(text) = entry.assign(frame, parent.as_deref())
                        && let Some(parent) = stack.last_mut()
                    {
                        parent.push_text(&text);
                    }
                }
            },
            Event::Eof => break,
            _ => {},
        }
    }

    Ok(entries)
}
