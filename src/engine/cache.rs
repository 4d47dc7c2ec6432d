use crate::engine::types::{MessageId, TokenUsage};
use crate::engine::util::now_epoch_secs;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// What a provider call produced, stored before validation so a bad
/// parse never forces a re-fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedResponse {
    pub provider: String,
    pub text: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub data: CachedResponse,
    pub cached_at: u64,
    #[serde(default)]
    pub expires_at: Option<u64>,
}

impl CacheEntry {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>>;
    fn set(&self, key: &str, value: &CachedResponse, ttl_secs: u64) -> Result<()>;
}

#[derive(Serialize)]
struct CacheKeyInput<'a> {
    provider: &'a str,
    model: &'a str,
    messages: Vec<(MessageId, &'a str)>,
}

/// Content-addressed key over provider, model and the ordered
/// `(message id, content)` list of a batch.
pub fn cache_key<'a, I>(provider: &str, model: &str, messages: I) -> String
where
    I: IntoIterator<Item = (MessageId, &'a str)>,
{
    let input = CacheKeyInput {
        provider,
        model,
        messages: messages.into_iter().collect(),
    };
    let canonical = serde_json::to_vec(&input).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    format!("{:x}", hasher.finalize())
}

fn expiry(now: u64, ttl_secs: u64) -> Option<u64> {
    if ttl_secs == 0 {
        None
    } else {
        Some(now.saturating_add(ttl_secs))
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory cache lock poisoned"))?;
        let now = now_epoch_secs()?;
        Ok(entries.get(key).filter(|e| !e.is_expired(now)).cloned())
    }

    fn set(&self, key: &str, value: &CachedResponse, ttl_secs: u64) -> Result<()> {
        let now = now_epoch_secs()?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory cache lock poisoned"))?;
        entries.insert(
            key.to_string(),
            CacheEntry {
                data: value.clone(),
                cached_at: now,
                expires_at: expiry(now, ttl_secs),
            },
        );
        Ok(())
    }
}

/// One JSON file per key, sharded by the first two hex characters and
/// namespaced by prompt signature.
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    pub fn new(cache_dir: &Path, prompt_signature: &str) -> Self {
        let namespace: String = prompt_signature.chars().take(12).collect();
        Self {
            root: cache_dir.join(namespace),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let shard: String = key.chars().take(2).collect();
        self.root.join(shard).join(format!("{key}.json"))
    }

    /// Delete expired or unreadable entries under `cache_dir`, across
    /// every prompt namespace. Returns how many files were removed.
    pub fn prune_expired(cache_dir: &Path) -> Result<usize> {
        if !cache_dir.exists() {
            return Ok(0);
        }
        let now = now_epoch_secs()?;
        let mut removed = 0usize;
        let mut stack = vec![cache_dir.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in
                fs::read_dir(&dir).with_context(|| format!("failed to read {}", dir.display()))?
            {
                let path = entry?.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let stale = match fs::read_to_string(&path)
                    .ok()
                    .and_then(|raw| serde_json::from_str::<CacheEntry>(&raw).ok())
                {
                    Some(entry) => entry.is_expired(now),
                    None => true,
                };
                if stale {
                    fs::remove_file(&path)
                        .with_context(|| format!("failed to remove {}", path.display()))?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

impl ResponseCache for FileCache {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        // Unreadable entries are misses; the next `set` overwrites them.
        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(
                    code = "CACHE_ENTRY_UNREADABLE",
                    path = %path.display(),
                    error = %err,
                    "treating cache entry as a miss"
                );
                return Ok(None);
            }
        };
        if entry.is_expired(now_epoch_secs()?) {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn set(&self, key: &str, value: &CachedResponse, ttl_secs: u64) -> Result<()> {
        let path = self.entry_path(key);
        let Some(parent) = path.parent() else {
            anyhow::bail!("cache path has no parent: {}", path.display());
        };
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;

        let now = now_epoch_secs()?;
        let entry = CacheEntry {
            data: value.clone(),
            cached_at: now,
            expires_at: expiry(now, ttl_secs),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
        tmp.write_all(serde_json::to_string_pretty(&entry)?.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.persist(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}
