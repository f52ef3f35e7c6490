use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use super::extract::{extract_author, extract_image, parse_timestamp};
use crate::model::{FeedDescriptor, NewsItem, UNKNOWN_AUTHOR};
use crate::util::clean_text;

/// Why a feed document produced no entries at all.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The XML reader hit a syntax error or mismatched end tag.
    #[error("XML parse error: {0}")]
    Xml(String),
    /// The document ended with elements still open.
    #[error("Document truncated inside <{0}>")]
    Truncated(String),
    /// No element was found in the body.
    #[error("Document has no root element")]
    NoRoot,
    /// JSON Feed body rejected by feed-rs.
    #[error("JSON feed error: {0}")]
    Json(String),
}

/// Items normalized from one document, plus how many entries were dropped
/// for lacking a title or link.
#[derive(Debug, Default)]
pub struct ParseResult {
    pub items: Vec<NewsItem>,
    pub skipped: usize,
}

/// Normalizes a raw feed body into [`NewsItem`]s attributed to `descriptor`.
///
/// RSS `<item>` and Atom `<entry>` nodes are read in document order. Bodies
/// that look like JSON go through `feed-rs` as JSON Feed instead.
/// `fetched_at` stands in for entries whose date cannot be parsed.
pub fn parse_items(
    raw: &str,
    descriptor: &FeedDescriptor,
    fetched_at: DateTime<Utc>,
) -> Result<ParseResult, ParseError> {
    let entries = if raw.trim_start().starts_with('{') {
        read_json_entries(raw)?
    } else {
        read_xml_entries(raw)?
    };

    let mut result = ParseResult::default();
    for entry in entries {
        match entry.into_item(descriptor, fetched_at) {
            Some(item) => result.items.push(item),
            None => result.skipped += 1,
        }
    }
    Ok(result)
}

/// Child element of an entry whose text we keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Summary,
    Content,
    Published,
    Author,
}

impl Field {
    fn from_qname(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"description" | b"summary" => Some(Field::Summary),
            b"content:encoded" | b"content" => Some(Field::Content),
            b"pubDate" | b"published" | b"updated" | b"dc:date" => Some(Field::Published),
            b"author" | b"dc:creator" => Some(Field::Author),
            _ => None,
        }
    }
}

/// Raw text pulled from one entry node, before any cleanup.
#[derive(Debug, Default)]
struct RawEntry {
    title: String,
    link: String,
    href: Option<String>,
    summary: String,
    content: String,
    published: String,
    author: String,
    media: Option<String>,
}

impl RawEntry {
    fn push_text(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Summary => &mut self.summary,
            Field::Content => &mut self.content,
            Field::Published => &mut self.published,
            Field::Author => {
                // Atom nests <name> under <author>
                if !self.author.is_empty() {
                    self.author.push(' ');
                }
                &mut self.author
            }
        };
        target.push_str(text);
    }

    fn into_item(self, descriptor: &FeedDescriptor, fetched_at: DateTime<Utc>) -> Option<NewsItem> {
        let title = clean_text(&self.title);
        let url = match self.link.trim() {
            "" => self.href.unwrap_or_default().trim().to_string(),
            link => link.to_string(),
        };
        if title.is_empty() || url.is_empty() {
            return None;
        }

        let raw_summary = if self.summary.trim().is_empty() {
            &self.content
        } else {
            &self.summary
        };

        let author = match clean_text(&self.author) {
            named if !named.is_empty() => named,
            _ => extract_author(raw_summary).unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
        };

        Some(NewsItem {
            title,
            url,
            summary: clean_text(raw_summary),
            source: descriptor.name.clone(),
            category: descriptor.category,
            published_at: parse_timestamp(&self.published, fetched_at),
            image_url: extract_image(raw_summary).or(self.media),
            author,
        })
    }
}

fn read_xml_entries(raw: &str) -> Result<Vec<RawEntry>, ParseError> {
    // SEC-002: quick-xml 0.37 never expands <!ENTITY> declarations, so a
    // hostile DOCTYPE cannot pull in external content.
    // Text is left untrimmed: an entity or CDATA boundary splits one field
    // into several events, and clean_text normalizes the joined result.
    let mut reader = Reader::from_str(raw);

    let mut entries = Vec::new();
    let mut buf = Vec::new();
    let mut open: Vec<Vec<u8>> = Vec::new();
    let mut saw_root = false;
    // Depth of the open <item>/<entry>, and the entry being filled.
    let mut entry_depth: Option<usize> = None;
    let mut current = RawEntry::default();
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                saw_root = true;
                open.push(e.name().as_ref().to_vec());
                let depth = open.len();
                match entry_depth {
                    None if is_entry(&e) => {
                        entry_depth = Some(depth);
                        current = RawEntry::default();
                    }
                    Some(d) if depth == d + 1 => {
                        field = Field::from_qname(e.name().as_ref());
                        collect_attributes(&e, &reader, &mut current);
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                saw_root = true;
                if let Some(d) = entry_depth {
                    if open.len() == d {
                        collect_attributes(&e, &reader, &mut current);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(f) = field.filter(|f| !is_contact_detail(*f, &open)) {
                    let text = t
                        .unescape()
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    current.push_text(f, &text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(f) = field {
                    current.push_text(f, &String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::End(_)) => {
                open.pop();
                let depth = open.len();
                match entry_depth {
                    Some(d) if depth < d => {
                        entries.push(std::mem::take(&mut current));
                        entry_depth = None;
                        field = None;
                    }
                    Some(d) if depth == d => field = None,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if let Some(unclosed) = open.last() {
        return Err(ParseError::Truncated(
            String::from_utf8_lossy(unclosed).into_owned(),
        ));
    }
    if !saw_root {
        return Err(ParseError::NoRoot);
    }
    Ok(entries)
}

/// Atom `<author>` carries `<email>`/`<uri>` next to `<name>`; only the name is kept.
fn is_contact_detail(field: Field, open: &[Vec<u8>]) -> bool {
    field == Field::Author && matches!(open.last().map(Vec::as_slice), Some(b"email" | b"uri"))
}

fn is_entry(e: &BytesStart<'_>) -> bool {
    matches!(e.local_name().as_ref(), b"item" | b"entry")
}

/// Picks up attribute-borne values on direct children of an entry: Atom
/// `<link href>` and image enclosures.
fn collect_attributes(e: &BytesStart<'_>, reader: &Reader<&[u8]>, entry: &mut RawEntry) {
    let name = e.name();
    let name = name.as_ref();
    let wants_href = name == b"link" && entry.href.is_none();
    let wants_media = matches!(name, b"enclosure" | b"media:content" | b"media:thumbnail")
        && entry.media.is_none();
    if !wants_href && !wants_media {
        return;
    }

    let mut href = None;
    let mut url = None;
    let mut rel = None;
    let mut mime = None;
    let mut medium = None;
    for attr in e.attributes().flatten() {
        let Ok(value) = attr.decode_and_unescape_value(reader.decoder()) else {
            tracing::debug!("Skipping undecodable attribute in feed entry");
            continue;
        };
        match attr.key.as_ref() {
            b"href" => href = Some(value.into_owned()),
            b"url" => url = Some(value.into_owned()),
            b"rel" => rel = Some(value.into_owned()),
            b"type" => mime = Some(value.into_owned()),
            b"medium" => medium = Some(value.into_owned()),
            _ => {}
        }
    }

    if wants_href && matches!(rel.as_deref(), None | Some("alternate")) {
        entry.href = href.filter(|h| !h.trim().is_empty());
    }
    if wants_media {
        let is_image = name == b"media:thumbnail"
            || medium.as_deref() == Some("image")
            || mime.as_deref().is_some_and(|m| m.starts_with("image/"));
        if is_image {
            entry.media = url.filter(|u| !u.trim().is_empty());
        }
    }
}

fn read_json_entries(raw: &str) -> Result<Vec<RawEntry>, ParseError> {
    let feed =
        feed_rs::parser::parse(raw.as_bytes()).map_err(|e| ParseError::Json(e.to_string()))?;

    Ok(feed
        .entries
        .into_iter()
        .map(|entry| {
            let published = entry
                .published
                .or(entry.updated)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default();
            RawEntry {
                title: entry.title.map(|t| t.content).unwrap_or_default(),
                link: entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .unwrap_or_default(),
                href: None,
                summary: entry.summary.map(|s| s.content).unwrap_or_default(),
                content: entry.content.and_then(|c| c.body).unwrap_or_default(),
                published,
                author: entry
                    .authors
                    .into_iter()
                    .map(|p| p.name)
                    .collect::<Vec<_>>()
                    .join(", "),
                media: None,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn descriptor() -> FeedDescriptor {
        FeedDescriptor::new("ArXiv AI", "https://arxiv.org/rss/cs.AI", Category::Papers)
    }

    fn fetch_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn parse(raw: &str) -> Result<ParseResult, ParseError> {
        parse_items(raw, &descriptor(), fetch_time())
    }

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
<channel>
  <title>Channel title is not an item</title>
  <item>
    <title>First &lt;b&gt;bold&lt;/b&gt; story</title>
    <link> https://example.com/first </link>
    <description><![CDATA[<p>Written by Grace Hopper</p><img src="https://img.example.com/1.jpg"> &amp; more]]></description>
    <pubDate>Tue, 02 Jan 2024 03:04:05 GMT</pubDate>
  </item>
  <item>
    <title>Second</title>
    <link>https://example.com/second</link>
    <dc:creator>Alan Turing</dc:creator>
    <pubDate>whenever</pubDate>
  </item>
</channel>
</rss>"#;

    #[test]
    fn test_rss_items_in_document_order() {
        let result = parse(RSS).unwrap();
        assert_eq!(result.skipped, 0);
        assert_eq!(result.items.len(), 2);

        let first = &result.items[0];
        assert_eq!(first.title, "First bold story");
        assert_eq!(first.url, "https://example.com/first");
        assert_eq!(first.summary, "Written by Grace Hopper more");
        assert_eq!(first.source, "ArXiv AI");
        assert_eq!(first.category, Category::Papers);
        assert_eq!(
            first.published_at,
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
        );
        assert_eq!(first.image_url.as_deref(), Some("https://img.example.com/1.jpg"));
        assert_eq!(first.author, "Grace Hopper");

        let second = &result.items[1];
        assert_eq!(second.title, "Second");
        assert_eq!(second.summary, "");
        assert_eq!(second.author, "Alan Turing");
        assert_eq!(second.published_at, fetch_time());
        assert_eq!(second.image_url, None);
    }

    #[test]
    fn test_entries_missing_title_or_link_are_dropped() {
        let raw = r#"<rss><channel>
            <item><title>No link</title></item>
            <item><link>https://example.com/untitled</link></item>
            <item><title>   </title><link>https://example.com/blank</link></item>
            <item><title><![CDATA[<span></span>]]></title><link>https://example.com/tags-only</link></item>
            <item><title>Kept</title><link>https://example.com/kept</link></item>
        </channel></rss>"#;

        let result = parse(raw).unwrap();
        assert_eq!(result.skipped, 4);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].title, "Kept");
        assert_eq!(result.items[0].author, UNKNOWN_AUTHOR);
    }

    #[test]
    fn test_atom_entries() {
        let raw = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:media="http://search.yahoo.com/mrss/">
  <title>Feed title</title>
  <link href="https://blog.example.com/"/>
  <entry>
    <title type="html">Scaling &amp;amp; safety</title>
    <link rel="self" href="https://blog.example.com/self"/>
    <link rel="alternate" href="https://blog.example.com/post"/>
    <published>2024-02-10T08:00:00Z</published>
    <author><name>Ada</name><email>ada@example.com</email></author>
    <summary>Short summary</summary>
    <media:thumbnail url="https://img.example.com/thumb.png"/>
  </entry>
</feed>"#;

        let result = parse(raw).unwrap();
        assert_eq!(result.items.len(), 1);
        let item = &result.items[0];
        assert_eq!(item.title, "Scaling safety");
        assert_eq!(item.url, "https://blog.example.com/post");
        assert_eq!(item.summary, "Short summary");
        assert_eq!(item.author, "Ada");
        assert_eq!(
            item.published_at,
            Utc.with_ymd_and_hms(2024, 2, 10, 8, 0, 0).unwrap()
        );
        assert_eq!(item.image_url.as_deref(), Some("https://img.example.com/thumb.png"));
    }

    #[test]
    fn test_content_encoded_used_when_description_missing() {
        let raw = r#"<rss xmlns:content="http://purl.org/rss/1.0/modules/content/"><channel><item>
            <title>T</title><link>https://example.com/t</link>
            <content:encoded><![CDATA[<p>Body by Linus Torvalds</p>]]></content:encoded>
            <enclosure url="https://img.example.com/e.jpg" type="image/jpeg" length="1"/>
        </item></channel></rss>"#;

        let item = &parse(raw).unwrap().items[0];
        assert_eq!(item.summary, "Body by Linus Torvalds");
        assert_eq!(item.author, "Linus Torvalds");
        assert_eq!(item.image_url.as_deref(), Some("https://img.example.com/e.jpg"));
    }

    #[test]
    fn test_text_around_cdata_keeps_word_boundaries() {
        let raw = r#"<rss><channel><item>
            <title>Intro <![CDATA[<b>bold</b>]]> tail</title>
            <link>https://example.com/mixed</link>
            <description>Before <![CDATA[<i>middle</i>]]>
                after</description>
        </item></channel></rss>"#;

        let item = &parse(raw).unwrap().items[0];
        assert_eq!(item.title, "Intro bold tail");
        assert_eq!(item.summary, "Before middle after");
    }

    #[test]
    fn test_malformed_documents_are_errors() {
        assert!(matches!(
            parse("<rss><channel><item><title>x</item></channel></rss>"),
            Err(ParseError::Xml(_))
        ));
        assert!(matches!(
            parse("<rss><channel><item><title>x</title>"),
            Err(ParseError::Truncated(_) | ParseError::Xml(_))
        ));
        assert!(matches!(parse("just some words"), Err(ParseError::NoRoot)));
        assert!(matches!(parse("{ not json"), Err(ParseError::Json(_))));
    }

    #[test]
    fn test_empty_channel_is_not_an_error() {
        let result = parse(r#"<?xml version="1.0"?><rss version="2.0"><channel></channel></rss>"#)
            .unwrap();
        assert!(result.items.is_empty());
        assert_eq!(result.skipped, 0);
    }

    #[test]
    fn test_json_feed() {
        let raw = r#"{
            "version": "https://jsonfeed.org/version/1.1",
            "title": "JSON blog",
            "items": [
                {
                    "id": "1",
                    "title": "Hello <em>JSON</em>",
                    "url": "https://json.example.com/1",
                    "content_html": "<p>Notes by Margaret Hamilton</p>",
                    "date_published": "2024-04-01T09:30:00Z"
                },
                { "id": "2", "content_text": "no title, dropped" }
            ]
        }"#;

        let result = parse(raw).unwrap();
        assert_eq!(result.skipped, 1);
        let item = &result.items[0];
        assert_eq!(item.title, "Hello JSON");
        assert_eq!(item.url, "https://json.example.com/1");
        assert_eq!(item.author, "Margaret Hamilton");
        assert_eq!(
            item.published_at,
            Utc.with_ymd_and_hms(2024, 4, 1, 9, 30, 0).unwrap()
        );
    }
}
