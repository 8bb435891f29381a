//! Persistent "already forwarded" set with bounded retention.
//!
//! Records are `(identity digest, recorded_at)` pairs kept in a JSON file.
//! The file also carries the identity scheme; a file written under another
//! scheme is ignored, because its digests cannot be compared with ours.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::ingest::types::CandidateEntry;

pub const DEFAULT_MAX_RECORDS: usize = 3000;
const PERSIST_RETRY_DELAY: Duration = Duration::from_millis(250);

/// How an entry is recognized across cycles. Pick one per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdentityScheme {
    /// scheme + host + path of the link; query and fragment dropped
    #[default]
    Link,
    /// lowercased title with every non-alphanumeric char removed
    Title,
}

/// Hex SHA-256 digest of the normalized identity string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // short form is enough for logs
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}

impl IdentityScheme {
    pub fn identity(self, entry: &CandidateEntry) -> Identity {
        match self {
            IdentityScheme::Link => identity_for_link(&entry.link),
            IdentityScheme::Title => identity_for_title(&entry.title),
        }
    }
}

pub fn identity_for_link(link: &str) -> Identity {
    digest(&canonical_link(link))
}

pub fn identity_for_title(title: &str) -> Identity {
    digest(&normalized_title(title))
}

fn digest(s: &str) -> Identity {
    let hash = Sha256::digest(s.as_bytes());
    let mut out = String::with_capacity(64);
    for b in hash.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    Identity(out)
}

/// `scheme://host[:port]/path` with query, fragment and a trailing slash removed.
/// Unparseable links are only trimmed.
pub fn canonical_link(link: &str) -> String {
    let trimmed = link.trim();
    let Ok(url) = url::Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    let Some(host) = url.host_str() else {
        return trimmed.to_string();
    };
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    let path = url.path();
    let path = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        ""
    };
    format!("{}://{}{}{}", url.scheme(), host, port, path)
}

pub fn normalized_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupRecord {
    pub identity_hash: Identity,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    // oldest first; ties keep insertion order
    records: Vec<DedupRecord>,
    index: HashSet<Identity>,
}

impl StoreState {
    fn from_records(records: Vec<DedupRecord>, max: usize) -> Self {
        let mut st = StoreState::default();
        for r in records {
            if st.index.insert(r.identity_hash.clone()) {
                st.records.push(r);
            }
        }
        st.enforce_cap(max);
        st
    }

    fn enforce_cap(&mut self, max: usize) {
        self.records.sort_by_key(|r| r.recorded_at); // stable
        if self.records.len() > max {
            let excess = self.records.len() - max;
            for r in self.records.drain(0..excess) {
                self.index.remove(&r.identity_hash);
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    scheme: IdentityScheme,
    records: Vec<DedupRecord>,
}

/// The only shared mutable state of the pipeline.
///
/// Reads take a shared lock and may come from any task; writes are issued
/// by the pipeline driver only.
#[derive(Debug)]
pub struct DedupStore {
    path: Option<PathBuf>,
    scheme: IdentityScheme,
    max_records: usize,
    inner: RwLock<StoreState>,
}

impl DedupStore {
    /// Volatile store (tests, dry runs without a state dir).
    pub fn in_memory(scheme: IdentityScheme, max_records: usize) -> Self {
        Self {
            path: None,
            scheme,
            max_records: max_records.max(1),
            inner: RwLock::new(StoreState::default()),
        }
    }

    /// Open the store file. A missing file starts empty; an unreadable one or
    /// one written under another identity scheme starts empty with a warning.
    pub async fn open(path: impl AsRef<Path>, scheme: IdentityScheme, max_records: usize) -> Self {
        let path = path.as_ref().to_path_buf();
        let max_records = max_records.max(1);
        let state = match fs::read_to_string(&path).await {
            Ok(s) => match serde_json::from_str::<StoreFile>(&s) {
                Ok(file) if file.scheme == scheme => StoreState::from_records(file.records, max_records),
                Ok(file) => {
                    tracing::warn!(
                        target: "dedup",
                        path = %path.display(),
                        stored = ?file.scheme,
                        configured = ?scheme,
                        "identity scheme changed; starting a fresh history"
                    );
                    StoreState::default()
                }
                Err(e) => {
                    tracing::warn!(target: "dedup", path = %path.display(), "unreadable store file: {e}");
                    StoreState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => {
                tracing::warn!(target: "dedup", path = %path.display(), "store file: {e}");
                StoreState::default()
            }
        };
        tracing::info!(target: "dedup", records = state.records.len(), scheme = ?scheme, "dedup store opened");
        Self {
            path: Some(path),
            scheme,
            max_records,
            inner: RwLock::new(state),
        }
    }

    pub fn scheme(&self) -> IdentityScheme {
        self.scheme
    }

    pub fn identity(&self, entry: &CandidateEntry) -> Identity {
        self.scheme.identity(entry)
    }

    pub fn is_seen(&self, id: &Identity) -> bool {
        self.inner
            .read()
            .map(|st| st.index.contains(id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|st| st.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Oldest first.
    pub fn records(&self) -> Vec<DedupRecord> {
        self.inner
            .read()
            .map(|st| st.records.clone())
            .unwrap_or_default()
    }

    /// Record `id` as seen. Idempotent: returns `Ok(false)` if it was already there.
    ///
    /// The new state is persisted before it becomes visible. If persisting fails
    /// twice the entry is not recorded and the error is returned.
    pub async fn mark_seen(&self, id: &Identity, at: DateTime<Utc>) -> Result<bool> {
        let next = {
            let st = self
                .inner
                .read()
                .map_err(|_| anyhow::anyhow!("dedup store lock poisoned"))?;
            if st.index.contains(id) {
                return Ok(false);
            }
            let mut next = st.clone();
            next.index.insert(id.clone());
            next.records.push(DedupRecord {
                identity_hash: id.clone(),
                recorded_at: at,
            });
            next.enforce_cap(self.max_records);
            next
        };

        if let Some(path) = &self.path {
            let file = StoreFile {
                scheme: self.scheme,
                records: next.records.clone(),
            };
            let bytes = serde_json::to_vec(&file).context("serializing dedup store")?;
            if let Err(first) = write_atomic(path, &bytes).await {
                tracing::warn!(target: "dedup", "store write failed, retrying: {first:#}");
                tokio::time::sleep(PERSIST_RETRY_DELAY).await;
                write_atomic(path, &bytes).await?;
            }
        }

        let mut st = self
            .inner
            .write()
            .map_err(|_| anyhow::anyhow!("dedup store lock poisoned"))?;
        *st = next;
        Ok(true)
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}
