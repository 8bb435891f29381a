// src/ingest/mod.rs
pub mod feed;
pub mod http;
pub mod types;

use futures::stream::{self, StreamExt};
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::ingest::types::{CandidateEntry, FeedClient, Source};

/// Character budget for a summary that has no sentence break.
pub const SUMMARY_MAX_CHARS: usize = 240;
pub const ELLIPSIS: char = '…';

/// Normalize text: decode entities, strip tags, ASCII quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode (covers the XML ones as well)
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z][^>]*>|<!--.*?-->").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (incl. nbsp)
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"[\s\u{00A0}]+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Summary for a raw description field: first sentence when there is a
/// sentence break, otherwise the text cut to `SUMMARY_MAX_CHARS` with an ellipsis.
pub fn extract_summary(raw: &str) -> String {
    let text = normalize_text(raw);
    if text.is_empty() {
        return text;
    }
    let first = first_sentence(&text).unwrap_or(&text);
    truncate_chars(first, SUMMARY_MAX_CHARS)
}

/// First sentence terminated by `.`, `!` or `?` followed by whitespace.
fn first_sentence(text: &str) -> Option<&str> {
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some((_, next)) = chars.peek() {
                if next.is_whitespace() {
                    return Some(&text[..i + c.len_utf8()]);
                }
            }
        }
    }
    None
}

/// Cut to at most `max` chars (ellipsis included), preferring a word boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let head: String = text.chars().take(max - 1).collect();
    let cut = match head.rfind(char::is_whitespace) {
        Some(pos) if pos > head.len() / 2 => head[..pos].trim_end().to_string(),
        _ => head,
    };
    format!("{cut}{ELLIPSIS}")
}

/// Fetch every source with at most `workers` requests in flight.
///
/// Results come back in source order and each source keeps its document order.
/// A failing source is logged and contributes nothing.
pub async fn fetch_all(
    client: &dyn FeedClient,
    sources: &[Source],
    workers: usize,
) -> Vec<CandidateEntry> {
    // futures are built up front so the stream borrows nothing generic over
    // lifetimes; otherwise the cycle future cannot be spawned
    let fetches: Vec<_> = sources
        .iter()
        .map(|source| async move {
            match client.fetch(source).await {
                Ok(entries) => {
                    tracing::debug!(target: "ingest", source = %source.name, entries = entries.len(), "source fetched");
                    entries
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", source = %source.name, error = %format!("{e:#}"), "source skipped");
                    counter!("relay_source_errors_total").increment(1);
                    Vec::new()
                }
            }
        })
        .collect();
    let per_source: Vec<Vec<CandidateEntry>> = stream::iter(fetches)
        .buffered(workers.max(1))
        .collect()
        .await;

    per_source.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_strips_tags_and_collapses_ws() {
        let s = "  <p>Hello,&nbsp;&nbsp; <b>world</b></p>\n\t“quoted”  ";
        assert_eq!(normalize_text(s), "Hello, world \"quoted\"");
    }

    #[test]
    fn summary_takes_first_sentence() {
        assert_eq!(
            extract_summary("Oil rose 3%. Analysts expect more! Really?"),
            "Oil rose 3%."
        );
        assert_eq!(extract_summary("Is this war? Maybe."), "Is this war?");
        // decimal point is not a sentence break
        assert_eq!(extract_summary("GDP grew 1.5 percent"), "GDP grew 1.5 percent");
    }

    #[test]
    fn summary_without_break_is_truncated() {
        let long = "word ".repeat(100);
        let out = extract_summary(&long);
        assert!(out.chars().count() <= SUMMARY_MAX_CHARS);
        assert!(out.ends_with(ELLIPSIS));
        assert!(!out.contains("  "));
    }

    #[test]
    fn empty_summary_stays_empty() {
        assert_eq!(extract_summary("  <br/> "), "");
    }
}
