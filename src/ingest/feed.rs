// src/ingest/feed.rs
//! RSS 2.0 / RSS 1.0 / Atom parsing over the quick-xml event reader.
//!
//! One pass handles both dialects: `<item>` and `<entry>` open a new entry,
//! and the child elements are mapped by name. Anything that is not a feed
//! document (or breaks the XML) is an error for the whole source.

use anyhow::{anyhow, bail, Result};
use metrics::{counter, histogram};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::ingest::types::{CandidateEntry, Source};
use crate::ingest::{extract_summary, normalize_text};

const FEED_ROOTS: [&str; 3] = ["rss", "feed", "rdf:RDF"];

#[derive(Debug, Default)]
struct EntryBuilder {
    title: Option<String>,
    link_text: Option<String>,
    guid: Option<String>,
    alternate_href: Option<String>,
    first_href: Option<String>,
    description: Option<String>,
    encoded: Option<String>,
    summary: Option<String>,
    content: Option<String>,
}

impl EntryBuilder {
    fn set(&mut self, field: &str, value: String) {
        let slot = match field {
            "title" => &mut self.title,
            "link" => &mut self.link_text,
            "guid" => &mut self.guid,
            "description" => &mut self.description,
            "content:encoded" => &mut self.encoded,
            "summary" => &mut self.summary,
            "content" => &mut self.content,
            _ => return,
        };
        // first occurrence wins
        if slot.is_none() && !value.trim().is_empty() {
            *slot = Some(value);
        }
    }

    fn push_link(&mut self, e: &BytesStart<'_>) {
        let mut href = None;
        let mut rel = None;
        for attr in e.attributes().flatten() {
            let value = String::from_utf8_lossy(&attr.value).to_string();
            match attr.key.as_ref() {
                b"href" => href = Some(html_escape::decode_html_entities(&value).to_string()),
                b"rel" => rel = Some(value),
                _ => {}
            }
        }
        let Some(href) = href.filter(|h| !h.trim().is_empty()) else {
            return;
        };
        if self.first_href.is_none() {
            self.first_href = Some(href.clone());
        }
        // Atom: a link without rel is an alternate link
        let is_alternate = rel.as_deref().map_or(true, |r| r == "alternate");
        if is_alternate && self.alternate_href.is_none() {
            self.alternate_href = Some(href);
        }
    }

    fn build(self, source: &Source) -> Option<CandidateEntry> {
        let title = normalize_text(self.title.as_deref().unwrap_or_default());
        let guid_link = self
            .guid
            .filter(|g| g.trim_start().starts_with("http://") || g.trim_start().starts_with("https://"));
        let link = self
            .link_text
            .or(self.alternate_href)
            .or(self.first_href)
            .or(guid_link)
            .map(|l| l.trim().to_string())
            .unwrap_or_default();
        let raw_summary = self
            .description
            .or(self.encoded)
            .or(self.summary)
            .or(self.content)
            .unwrap_or_default();
        let summary = extract_summary(&raw_summary);

        if title.is_empty() || link.is_empty() || summary.is_empty() {
            return None;
        }
        Some(CandidateEntry {
            title,
            link,
            summary,
            source: source.clone(),
        })
    }
}

fn qname(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_string()
}

/// Parse a feed body into candidate entries, preserving document order.
/// Entries with an empty title, link or summary are dropped.
pub fn parse_feed(xml: &str, source: &Source) -> Result<Vec<CandidateEntry>> {
    let t0 = std::time::Instant::now();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut out = Vec::new();
    let mut root: Option<String> = None;
    // element names from the entry element (exclusive) down to the current node
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<EntryBuilder> = None;
    let mut field_buf = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = qname(&e);
                if root.is_none() {
                    if !FEED_ROOTS.contains(&name.as_str()) {
                        bail!("not an RSS or Atom document (root <{name}>)");
                    }
                    root = Some(name);
                    continue;
                }
                if current.is_none() {
                    if name == "item" || name == "entry" {
                        current = Some(EntryBuilder::default());
                        path.clear();
                    }
                    continue;
                }
                if let Some(entry) = current.as_mut() {
                    if path.is_empty() {
                        field_buf.clear();
                        if name == "link" {
                            entry.push_link(&e);
                        }
                    } else {
                        // markup nested inside a field (xhtml content)
                        field_buf.push(' ');
                    }
                    path.push(name);
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(entry) = current.as_mut() {
                    if path.is_empty() && qname(&e) == "link" {
                        entry.push_link(&e);
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let Some(entry) = current.as_mut() else {
                    continue;
                };
                if path.is_empty() {
                    if name == "item" || name == "entry" {
                        if let Some(built) = current.take().and_then(|b| b.build(source)) {
                            out.push(built);
                        }
                    }
                    continue;
                }
                path.pop();
                if path.is_empty() {
                    entry.set(&name, std::mem::take(&mut field_buf));
                } else {
                    // text is trimmed, so inline markup would glue words together
                    field_buf.push(' ');
                }
            }
            Ok(Event::Text(t)) => {
                if current.is_some() && !path.is_empty() {
                    // entities are decoded later together with HTML ones
                    field_buf.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Ok(Event::CData(t)) => {
                if current.is_some() && !path.is_empty() {
                    field_buf.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(anyhow!(
                    "xml error at position {}: {e}",
                    reader.buffer_position()
                ))
            }
            _ => {}
        }
    }

    if root.is_none() {
        bail!("empty feed document");
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("relay_parse_ms").record(ms);
    counter!("relay_entries_fetched_total").increment(out.len() as u64);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src() -> Source {
        Source::new("Test", "https://feeds.example.com/rss.xml")
    }

    #[test]
    fn rss_items_in_document_order() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
  <item><title>First &amp; foremost</title><link>https://example.com/1</link>
    <description>&lt;p&gt;Sanctions widened. More text follows.&lt;/p&gt;</description></item>
  <item><title>Second</title><link>https://example.com/2</link>
    <description><![CDATA[<b>Talks</b> resume in Geneva]]></description></item>
</channel></rss>"#;
        let items = parse_feed(xml, &src()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "First & foremost");
        assert_eq!(items[0].summary, "Sanctions widened.");
        assert_eq!(items[1].link, "https://example.com/2");
        assert_eq!(items[1].summary, "Talks resume in Geneva");
        assert_eq!(items[1].source.name, "Test");
    }

    #[test]
    fn rss_guid_and_content_encoded_fallbacks() {
        let xml = r#"<rss xmlns:content="http://purl.org/rss/1.0/modules/content/"><channel>
  <item><title>No link</title><guid isPermaLink="true">https://example.com/g1</guid>
    <content:encoded><![CDATA[<p>Energy prices climb again</p>]]></content:encoded></item>
  <item><title>Opaque guid</title><guid isPermaLink="false">tag:123</guid>
    <description>Dropped for lack of link</description></item>
</channel></rss>"#;
        let items = parse_feed(xml, &src()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link, "https://example.com/g1");
        assert_eq!(items[0].summary, "Energy prices climb again");
    }

    #[test]
    fn atom_prefers_alternate_link_and_summary() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>A</title>
  <entry><title>Atom one</title>
    <link rel="self" href="https://example.com/self/1"/>
    <link rel="alternate" href="https://example.com/a/1"/>
    <summary type="html">Kremlin responds. Details later.</summary></entry>
  <entry><title type="xhtml">Atom two</title>
    <link rel="enclosure" href="https://example.com/file.mp3"/>
    <content type="xhtml"><div xmlns="http://www.w3.org/1999/xhtml"><p>Gas</p><p>deal signed</p></div></content></entry>
</feed>"#;
        let items = parse_feed(xml, &src()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].link, "https://example.com/a/1");
        assert_eq!(items[0].summary, "Kremlin responds.");
        assert_eq!(items[1].link, "https://example.com/file.mp3");
        assert_eq!(items[1].summary, "Gas deal signed");
    }

    #[test]
    fn inline_markup_keeps_words_apart() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <entry><title>Gas</title><link href="https://example.com/gas"/>
    <content type="xhtml"><div xmlns="http://www.w3.org/1999/xhtml"><p><b>Gas</b> deal signed in <a href="x">Berlin</a> today</p></div></content></entry>
</feed>"#;
        let items = parse_feed(xml, &src()).unwrap();
        assert_eq!(items[0].summary, "Gas deal signed in Berlin today");

        let xml = r#"<rss><channel><item><title>S</title><link>https://example.com/s</link>
  <description><p>Sanctions hit <em>Gazprom</em> exports again</p></description></item>
</channel></rss>"#;
        let items = parse_feed(xml, &src()).unwrap();
        assert_eq!(items[0].summary, "Sanctions hit Gazprom exports again");
    }

    #[test]
    fn entries_without_summary_are_dropped() {
        let xml = r#"<rss><channel>
  <item><title>Bare</title><link>https://example.com/bare</link></item>
  <item><title></title><link>https://example.com/untitled</link><description>x</description></item>
</channel></rss>"#;
        assert!(parse_feed(xml, &src()).unwrap().is_empty());
    }

    #[test]
    fn malformed_and_foreign_documents_fail() {
        assert!(parse_feed("<rss><channel><item><title>x</wrong>", &src()).is_err());
        assert!(parse_feed("<html><body>Not a feed</body></html>", &src()).is_err());
        assert!(parse_feed("", &src()).is_err());
    }
}
