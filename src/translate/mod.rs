//! Best-effort translation: primary backend, then fallbacks, then the original text.
//!
//! A small in-process cache keyed on normalized source text saves quota on
//! boilerplate that repeats across feeds.

pub mod google;
pub mod mymemory;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use metrics::counter;

pub use google::GoogleBackend;
pub use mymemory::MyMemoryBackend;

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend answered {0}")]
    Status(reqwest::StatusCode),
    #[error("unexpected response: {0}")]
    Malformed(String),
    #[error("quota exhausted: {0}")]
    Quota(String),
}

/// One remote translation service.
#[async_trait]
pub trait TranslateBackend: Send + Sync {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, TranslateError>;
    fn name(&self) -> &'static str;
}

pub type DynBackend = Arc<dyn TranslateBackend>;

pub const DEFAULT_CACHE_CAPACITY: usize = 512;

/// Bounded FIFO cache; the oldest key goes first.
#[derive(Debug, Default)]
struct TranslationCache {
    capacity: usize,
    map: HashMap<String, String>,
    order: VecDeque<String>,
}

impl TranslationCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ..Default::default()
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    fn put(&mut self, key: String, value: String) {
        if self.map.contains_key(&key) {
            return;
        }
        while self.order.len() >= self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.map.remove(&old);
            }
        }
        self.order.push_back(key.clone());
        self.map.insert(key, value);
    }
}

fn cache_key(target_lang: &str, text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("{target_lang}\u{1f}{}", collapsed.to_lowercase())
}

pub struct Translator {
    backends: Vec<DynBackend>,
    target_lang: String,
    cache: Option<Mutex<TranslationCache>>,
}

impl Translator {
    pub fn new(primary: DynBackend, target_lang: impl Into<String>) -> Self {
        Self {
            backends: vec![primary],
            target_lang: target_lang.into(),
            cache: None,
        }
    }

    /// Google first, MyMemory as fallback, with the default cache.
    pub fn with_default_backends(target_lang: impl Into<String>) -> anyhow::Result<Self> {
        let primary: DynBackend = Arc::new(GoogleBackend::new()?);
        let fallback: DynBackend = Arc::new(MyMemoryBackend::new()?);
        Ok(Self::new(primary, target_lang)
            .with_fallback(fallback)
            .with_cache(DEFAULT_CACHE_CAPACITY))
    }

    pub fn with_fallback(mut self, backend: DynBackend) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn with_cache(mut self, capacity: usize) -> Self {
        self.cache = Some(Mutex::new(TranslationCache::new(capacity)));
        self
    }

    pub fn target_lang(&self) -> &str {
        &self.target_lang
    }

    /// Never fails: blank input gives an empty string without any backend call,
    /// and when every backend fails the input comes back unchanged.
    pub async fn translate(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }

        let key = cache_key(&self.target_lang, text);
        if let Some(hit) = self.cached(&key) {
            return hit;
        }

        for (i, backend) in self.backends.iter().enumerate() {
            match backend.translate(text, &self.target_lang).await {
                Ok(out) if !out.trim().is_empty() => {
                    if i > 0 {
                        counter!("relay_translate_fallbacks_total").increment(1);
                    }
                    if let Some(cache) = &self.cache {
                        if let Ok(mut c) = cache.lock() {
                            c.put(key, out.clone());
                        }
                    }
                    return out;
                }
                Ok(_) => {
                    tracing::warn!(target: "translate", backend = backend.name(), "empty translation");
                }
                Err(e) => {
                    tracing::warn!(target: "translate", backend = backend.name(), "translation failed: {e}");
                }
            }
        }

        counter!("relay_translate_failures_total").increment(1);
        text.to_string()
    }

    fn cached(&self, key: &str) -> Option<String> {
        self.cache.as_ref()?.lock().ok()?.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn ok(reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply),
                calls: AtomicUsize::new(0),
            })
        }
        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: AtomicUsize::new(0),
            })
        }
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TranslateBackend for Scripted {
        async fn translate(&self, _text: &str, _lang: &str) -> Result<String, TranslateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .map(str::to_string)
                .ok_or_else(|| TranslateError::Malformed("scripted failure".into()))
        }
        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn falls_back_when_primary_fails() {
        let primary = Scripted::failing();
        let fallback = Scripted::ok("Привет");
        let t = Translator::new(primary.clone(), "ru").with_fallback(fallback.clone());
        assert_eq!(t.translate("Hello").await, "Привет");
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn returns_original_when_all_fail() {
        let t = Translator::new(Scripted::failing(), "ru").with_fallback(Scripted::failing());
        assert_eq!(t.translate("Hello world").await, "Hello world");
    }

    #[tokio::test]
    async fn blank_input_skips_backends() {
        let primary = Scripted::ok("x");
        let t = Translator::new(primary.clone(), "ru");
        assert_eq!(t.translate("   \n").await, "");
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn cache_hits_skip_backends() {
        let primary = Scripted::ok("Санкции");
        let t = Translator::new(primary.clone(), "ru").with_cache(4);
        assert_eq!(t.translate("Sanctions").await, "Санкции");
        assert_eq!(t.translate("  sanctions ").await, "Санкции");
        assert_eq!(primary.calls(), 1);
    }

    #[test]
    fn cache_evicts_oldest() {
        let mut c = TranslationCache::new(2);
        c.put("a".into(), "1".into());
        c.put("b".into(), "2".into());
        c.put("c".into(), "3".into());
        assert!(c.get("a").is_none());
        assert_eq!(c.get("c").as_deref(), Some("3"));
    }
}
