// src/format.rs
//! Message layout and per-dialect escaping.
//!
//! Escaping has to match the receiving parser exactly, otherwise the
//! Bot API rejects the message with "can't parse entities":
//! - `Plain`: no markup, nothing escaped
//! - `Markdown` (legacy Telegram Markdown): `_ * ` [` get a backslash
//! - `Html`: `& < >` become entities

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Bot API limit for `sendMessage` text.
pub const TELEGRAM_MAX_MESSAGE_CHARS: usize = 4096;
pub const TRUNCATION_MARKER: &str = "…";
const MIN_SUMMARY_CHARS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MarkupDialect {
    Plain,
    Markdown,
    #[default]
    Html,
}

impl FromStr for MarkupDialect {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" | "" => Ok(Self::Plain),
            "markdown" | "md" => Ok(Self::Markdown),
            "html" => Ok(Self::Html),
            other => anyhow::bail!("unknown markup dialect `{other}`"),
        }
    }
}

static RE_HTML_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(/?)([A-Za-z][A-Za-z0-9-]*)[^>]*?(/?)>").unwrap());

const HTML_VOID: [&str; 2] = ["br", "hr"];

impl MarkupDialect {
    /// `parse_mode` value for the Bot API.
    pub fn parse_mode(self) -> Option<&'static str> {
        match self {
            Self::Plain => None,
            Self::Markdown => Some("Markdown"),
            Self::Html => Some("HTML"),
        }
    }

    pub fn escape(self, text: &str) -> String {
        match self {
            Self::Plain => text.to_string(),
            Self::Markdown => escape_markdown(text),
            Self::Html => html_escape::encode_text(text).to_string(),
        }
    }

    pub fn bold(self, text: &str) -> String {
        match self {
            Self::Plain => text.to_string(),
            // legacy Markdown has no escapes inside an entity
            Self::Markdown => format!("*{}*", text.replace('*', "")),
            Self::Html => format!("<b>{}</b>", self.escape(text)),
        }
    }

    /// Markup needed to close whatever `prefix` leaves open, innermost first.
    fn closers(self, prefix: &str) -> String {
        match self {
            Self::Plain => String::new(),
            Self::Markdown => markdown_open_entity(prefix)
                .map(|(_, marker)| marker.to_string())
                .unwrap_or_default(),
            Self::Html => {
                let mut stack: Vec<String> = Vec::new();
                for caps in RE_HTML_TAG.captures_iter(prefix) {
                    let closing = &caps[1] == "/";
                    let self_closing = &caps[3] == "/";
                    let name = caps[2].to_ascii_lowercase();
                    if self_closing || HTML_VOID.contains(&name.as_str()) {
                        continue;
                    }
                    if closing {
                        if let Some(pos) = stack.iter().rposition(|t| *t == name) {
                            stack.truncate(pos);
                        }
                    } else {
                        stack.push(name);
                    }
                }
                stack.iter().rev().map(|t| format!("</{t}>")).collect()
            }
        }
    }

    /// Move a byte cut point back so it does not split a tag, an entity or an escape.
    fn safe_cut(self, s: &str, mut cut: usize) -> usize {
        while cut > 0 && !s.is_char_boundary(cut) {
            cut -= 1;
        }
        let head = &s[..cut];
        match self {
            Self::Plain => cut,
            Self::Html => {
                if let Some(lt) = head.rfind('<') {
                    if head[lt..].find('>').is_none() {
                        return lt;
                    }
                }
                if let Some(amp) = head.rfind('&') {
                    if !head[amp..].contains(';') && head.len() - amp <= 10 {
                        return amp;
                    }
                }
                cut
            }
            Self::Markdown => {
                let trailing = head.chars().rev().take_while(|c| *c == '\\').count();
                let cut = if trailing % 2 == 1 { cut - 1 } else { cut };
                // an entity opened by the very last char would close empty
                match markdown_open_entity(&s[..cut]) {
                    Some((pos, _)) if pos + 1 == cut => pos,
                    _ => cut,
                }
            }
        }
    }
}

fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Byte position and marker of an entity left open at the end of `s`.
fn markdown_open_entity(s: &str) -> Option<(usize, char)> {
    let mut open: Option<(usize, char)> = None;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (c, open) {
            ('\\', None) => escaped = true,
            ('*' | '_' | '`', None) => open = Some((i, c)),
            (c, Some((_, m))) if c == m => open = None,
            _ => {}
        }
    }
    open
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn byte_index_of_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

/// Fields of one outgoing message, before escaping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageParts<'a> {
    pub source: &'a str,
    pub title: &'a str,
    pub summary: &'a str,
    pub link: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageFormatter {
    dialect: MarkupDialect,
    max_chars: usize,
}

impl MessageFormatter {
    pub fn new(dialect: MarkupDialect) -> Self {
        Self::with_limit(dialect, TELEGRAM_MAX_MESSAGE_CHARS)
    }

    pub fn with_limit(dialect: MarkupDialect, max_chars: usize) -> Self {
        Self { dialect, max_chars }
    }

    pub fn dialect(&self) -> MarkupDialect {
        self.dialect
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    fn compose(&self, parts: &MessageParts<'_>, summary: &str) -> String {
        let d = self.dialect;
        let blocks = [
            (!parts.source.trim().is_empty()).then(|| d.bold(parts.source.trim())),
            (!parts.title.trim().is_empty()).then(|| d.escape(parts.title.trim())),
            (!summary.trim().is_empty()).then(|| d.escape(summary.trim())),
            (!parts.link.trim().is_empty()).then(|| d.escape(parts.link.trim())),
        ];
        blocks.into_iter().flatten().collect::<Vec<_>>().join("\n\n")
    }

    /// Label (bold), title, summary and link separated by blank lines, never
    /// longer than the limit. The summary is shortened first, then dropped, then
    /// the title is shortened, so the link survives; only when even that cannot
    /// fit does the whole message go through [`Self::fit`].
    pub fn format(&self, parts: &MessageParts<'_>) -> String {
        let full = self.compose(parts, parts.summary);
        if char_len(&full) <= self.max_chars {
            return full;
        }

        if let Some(msg) = self.shorten_field(parts.summary, |s| self.compose(parts, s)) {
            return msg;
        }
        if let Some(msg) = self.shorten_field(parts.title, |t| {
            self.compose(&MessageParts { title: t, ..*parts }, "")
        }) {
            return msg;
        }

        self.fit(&full, self.max_chars)
    }

    /// Longest cut of `text` (at least `MIN_SUMMARY_CHARS`) for which `build`
    /// stays within the limit, else `build("")`. `None` when even that is over.
    fn shorten_field(&self, text: &str, build: impl Fn(&str) -> String) -> Option<String> {
        let text = text.trim();
        // room left for the field once everything else is laid out
        let base = char_len(&build(""));
        if base > self.max_chars {
            return None;
        }
        let budget = self.max_chars.saturating_sub(base + 2);
        let mut keep = budget.min(char_len(text));
        while keep >= MIN_SUMMARY_CHARS {
            let candidate = build(&crate::ingest::truncate_chars(text, keep));
            let len = char_len(&candidate);
            if len <= self.max_chars {
                return Some(candidate);
            }
            // escaping may have grown the text; shrink by what is still over
            keep = keep.saturating_sub((len - self.max_chars).max(1));
        }
        // no useful length fits: leave the field out
        Some(build(""))
    }

    /// Shorten an already formatted message to at most `max` chars.
    ///
    /// Whole lines are dropped from the end first; a cut inside a line is the
    /// fallback. Markup left open by the cut is closed before the marker.
    fn fit(&self, message: &str, max: usize) -> String {
        if char_len(message) <= max {
            return message.to_string();
        }
        let marker_len = char_len(TRUNCATION_MARKER);
        if max <= marker_len {
            return TRUNCATION_MARKER.chars().take(max).collect();
        }

        let close = |prefix: &str, sep: &str| -> Option<String> {
            let out = format!("{prefix}{}{sep}{TRUNCATION_MARKER}", self.dialect.closers(prefix));
            (char_len(&out) <= max).then_some(out)
        };

        for (end, _) in message.match_indices('\n').collect::<Vec<_>>().into_iter().rev() {
            let prefix = message[..end].trim_end();
            if prefix.is_empty() {
                continue;
            }
            if let Some(out) = close(prefix, "\n") {
                return out;
            }
        }

        let mut keep = max - marker_len;
        loop {
            let cut = self
                .dialect
                .safe_cut(message, byte_index_of_char(message, keep));
            let prefix = message[..cut].trim_end();
            if let Some(out) = close(prefix, "") {
                return out;
            }
            let used = char_len(prefix);
            if used == 0 {
                break;
            }
            let over = char_len(&format!("{prefix}{}", self.dialect.closers(prefix))) + marker_len - max;
            keep = used.saturating_sub(over.max(1));
        }

        TRUNCATION_MARKER.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts<'a>(title: &'a str, summary: &'a str) -> MessageParts<'a> {
        MessageParts {
            source: "Foreign Affairs",
            title,
            summary,
            link: "https://example.com/a_1",
        }
    }

    #[test]
    fn html_layout_and_escaping() {
        let f = MessageFormatter::new(MarkupDialect::Html);
        let msg = f.format(&parts("Oil & <gas>", "Prices rise."));
        assert_eq!(
            msg,
            "<b>Foreign Affairs</b>\n\nOil &amp; &lt;gas&gt;\n\nPrices rise.\n\nhttps://example.com/a_1"
        );
    }

    #[test]
    fn markdown_escapes_entity_chars() {
        let f = MessageFormatter::new(MarkupDialect::Markdown);
        let msg = f.format(&parts("[Update] *war_room*", "Use `code`."));
        assert!(msg.starts_with("*Foreign Affairs*\n\n\\[Update] \\*war\\_room\\*"));
        assert!(msg.contains("Use \\`code\\`."));
        assert!(msg.ends_with("https://example.com/a\\_1"));
    }

    #[test]
    fn plain_is_untouched() {
        let f = MessageFormatter::new(MarkupDialect::Plain);
        let msg = f.format(&parts("A <b> & _c_", "S"));
        assert!(msg.contains("A <b> & _c_"));
        assert!(msg.starts_with("Foreign Affairs\n\n"));
    }

    #[test]
    fn dialect_from_str() {
        assert_eq!("HTML".parse::<MarkupDialect>().unwrap(), MarkupDialect::Html);
        assert_eq!("markdown".parse::<MarkupDialect>().unwrap(), MarkupDialect::Markdown);
        assert!("bbcode".parse::<MarkupDialect>().is_err());
    }

    #[test]
    fn long_summary_is_shortened_and_link_kept() {
        let f = MessageFormatter::with_limit(MarkupDialect::Html, 200);
        let summary = "Gas & oil ".repeat(100);
        let msg = f.format(&parts("Title", &summary));
        assert!(msg.chars().count() <= 200, "len {}", msg.chars().count());
        assert!(msg.ends_with("https://example.com/a_1"));
        assert!(msg.contains(TRUNCATION_MARKER));
    }

    #[test]
    fn oversized_title_drops_summary_and_keeps_link() {
        let f = MessageFormatter::with_limit(MarkupDialect::Html, 120);
        let title = "Kremlin & Kyiv trade accusations ".repeat(10);
        let msg = f.format(&parts(&title, "Talks stall."));
        assert!(msg.chars().count() <= f.max_chars(), "len {}", msg.chars().count());
        assert!(msg.starts_with("<b>Foreign Affairs</b>\n\nKremlin &amp; Kyiv"), "{msg}");
        assert!(!msg.contains("Talks stall."));
        assert!(msg.ends_with("\n\nhttps://example.com/a_1"), "{msg}");
    }

    #[test]
    fn every_limit_is_respected() {
        let title = "Kremlin & <Kyiv> talks ".repeat(20);
        let summary = "Sanctions_widen * again. ".repeat(20);
        for dialect in [MarkupDialect::Plain, MarkupDialect::Markdown, MarkupDialect::Html] {
            for max in [1usize, 2, 5, 17, 40, 99, 256, 1000] {
                let f = MessageFormatter::with_limit(dialect, max);
                let msg = f.format(&parts(&title, &summary));
                assert!(
                    msg.chars().count() <= max,
                    "{dialect:?} max={max} len={}",
                    msg.chars().count()
                );
            }
        }
    }

    #[test]
    fn html_cut_closes_open_tags() {
        let f = MessageFormatter::new(MarkupDialect::Html);
        let msg = "<b>Label with a very long bold text</b>";
        let out = f.fit(msg, 20);
        assert!(out.chars().count() <= 20, "{out}");
        assert!(out.starts_with("<b>"));
        assert!(out.contains("</b>"), "{out}");
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn html_cut_never_splits_tag_or_entity() {
        let f = MessageFormatter::new(MarkupDialect::Html);
        for max in 5..40 {
            let out = f.fit("<b>A</b> x &amp; y <i>nested &lt; text</i> tail", max);
            assert!(out.chars().count() <= max);
            let open = out.matches('<').count();
            let close = out.matches('>').count();
            assert_eq!(open, close, "split tag in {out:?}");
            assert_eq!(f.dialect.closers(&out), "", "unclosed tag in {out:?}");
        }
    }

    #[test]
    fn fit_prefers_line_boundaries() {
        let f = MessageFormatter::new(MarkupDialect::Plain);
        let out = f.fit("first line\n\nsecond line\n\nthird line", 28);
        assert_eq!(out, "first line\n\nsecond line\n…");
    }

    #[test]
    fn markdown_cut_closes_bold() {
        let f = MessageFormatter::new(MarkupDialect::Markdown);
        let out = f.fit("*Foreign Affairs long label*", 10);
        assert!(out.chars().count() <= 10);
        assert!(markdown_open_entity(out.trim_end_matches(TRUNCATION_MARKER)).is_none(), "{out}");
    }
}
