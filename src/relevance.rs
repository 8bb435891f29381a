// src/relevance.rs
//! Keyword relevance gate: an ordered list of case-insensitive regexes with
//! any-of semantics. Runs before translation so unmatched entries cost nothing.

use regex::{Regex, RegexBuilder};

use crate::ingest::types::CandidateEntry;

/// Compiled keyword patterns, in configuration order.
#[derive(Debug, Clone)]
pub struct KeywordSet {
    patterns: Vec<Regex>,
}

impl KeywordSet {
    /// Compile every pattern case-insensitively. An invalid pattern is a
    /// configuration error naming the offending entry.
    pub fn new<I, S>(patterns: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .enumerate()
            .filter(|(_, p)| !p.as_ref().trim().is_empty())
            .map(|(i, p)| {
                RegexBuilder::new(p.as_ref())
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| anyhow::anyhow!("keyword #{} `{}` regex error: {}", i, p.as_ref(), e))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// True iff some pattern matches somewhere in `text`. Blank text never matches.
    pub fn matches(&self, text: &str) -> bool {
        self.first_match(text).is_some()
    }

    /// Source of the first pattern (in configuration order) that matches.
    pub fn first_match(&self, text: &str) -> Option<&str> {
        if text.trim().is_empty() {
            return None;
        }
        self.patterns
            .iter()
            .find(|re| re.is_match(text))
            .map(|re| re.as_str())
    }
}

/// Entry-level gate. Title only by default; `match_summary` widens it to
/// title + summary.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    keywords: KeywordSet,
    match_summary: bool,
}

impl RelevanceFilter {
    pub fn new(keywords: KeywordSet, match_summary: bool) -> Self {
        Self {
            keywords,
            match_summary,
        }
    }

    pub fn keywords(&self) -> &KeywordSet {
        &self.keywords
    }

    /// Pattern that let the entry through, if any.
    pub fn matched_pattern(&self, entry: &CandidateEntry) -> Option<&str> {
        if self.match_summary {
            let text = format!("{}\n{}", entry.title, entry.summary);
            // borrow the pattern from self, not from the temporary text
            return self
                .keywords
                .patterns
                .iter()
                .find(|re| !text.trim().is_empty() && re.is_match(&text))
                .map(|re| re.as_str());
        }
        self.keywords.first_match(&entry.title)
    }

    pub fn accepts(&self, entry: &CandidateEntry) -> bool {
        self.matched_pattern(entry).is_some()
    }
}
