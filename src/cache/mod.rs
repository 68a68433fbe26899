// Identification cache
//
// Keyed by normalized producer/wine/vintage (or the normalized query text
// for text requests). A fresh hit short-circuits the whole tier ladder at
// zero cost. Entries live as JSON files under the cache dir, with a dashmap
// index in front so repeat lookups skip the filesystem.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

use crate::identify::IdentificationResult;

/// Normalized cache key. Construction is the only way to get one, so every
/// lookup and store goes through the same normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key from identified fields.
    pub fn from_fields(producer: &str, wine_name: &str, vintage: Option<i32>) -> Self {
        let mut parts = vec![normalize(producer), normalize(wine_name)];
        if let Some(vintage) = vintage {
            parts.push(vintage.to_string());
        }
        CacheKey(parts.join("|"))
    }

    /// Key from a raw text query, for repeat-search short-circuiting.
    pub fn from_query(text: &str) -> Self {
        CacheKey(format!("q|{}", normalize(text)))
    }

    /// Field keys a raw text query may correspond to: every producer/wine
    /// split of the normalized words, with a vintage year peeled off either
    /// end when present. Lets a typed query hit entries stored from parsed
    /// fields, for example by an earlier image request.
    pub fn field_candidates(text: &str) -> Vec<CacheKey> {
        let normalized = normalize(text);
        let mut words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();

        let max_year = Utc::now().year() + 1;
        let parse_year = |w: &str| {
            w.parse::<i32>()
                .ok()
                .filter(|y| (1800..=max_year).contains(y))
        };

        let mut vintage = None;
        if let Some(year) = words.last().copied().and_then(&parse_year) {
            vintage = Some(year);
            words.pop();
        } else if let Some(year) = words.first().copied().and_then(&parse_year) {
            vintage = Some(year);
            words.remove(0);
        }

        (1..words.len())
            .map(|i| {
                CacheKey::from_fields(&words[..i].join(" "), &words[i..].join(" "), vintage)
            })
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filename-safe digest of the key.
    fn file_stem(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Lowercase, alphanumeric words joined by single spaces.
fn normalize(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedIdentification {
    pub result: IdentificationResult,
    pub fetched_at: DateTime<Utc>,
}

pub struct IdentificationCache {
    dir: PathBuf,
    ttl: Duration,
    index: DashMap<String, CachedIdentification>,
}

impl IdentificationCache {
    pub fn new(dir: PathBuf, ttl_days: i64) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;
        Ok(Self {
            dir,
            ttl: Duration::days(ttl_days),
            index: DashMap::new(),
        })
    }

    /// Look up a fresh entry; stale or missing entries are misses.
    pub fn lookup(&self, key: &CacheKey) -> Option<CachedIdentification> {
        if let Some(entry) = self.index.get(key.as_str()) {
            if self.is_fresh(&entry) {
                return Some(entry.clone());
            }
            drop(entry);
            self.index.remove(key.as_str());
            return None;
        }

        let path = self.entry_path(key);
        let contents = fs::read_to_string(&path).ok()?;
        let entry: CachedIdentification = match serde_json::from_str(&contents) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("discarding corrupt cache entry {}: {}", path.display(), e);
                let _ = fs::remove_file(&path);
                return None;
            }
        };
        if !self.is_fresh(&entry) {
            return None;
        }
        self.index.insert(key.as_str().to_string(), entry.clone());
        Some(entry)
    }

    /// Store a result. Writes go through a temp file and rename so a
    /// concurrent reader never sees a partial entry.
    pub fn store(&self, key: &CacheKey, result: &IdentificationResult) -> Result<()> {
        let entry = CachedIdentification {
            result: result.clone(),
            fetched_at: Utc::now(),
        };

        let path = self.entry_path(key);
        let tmp = path.with_extension("tmp");
        let json = serde_json::to_string(&entry).context("Failed to serialize cache entry")?;
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write cache entry: {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to finalize cache entry: {}", path.display()))?;

        self.index.insert(key.as_str().to_string(), entry);
        Ok(())
    }

    fn is_fresh(&self, entry: &CachedIdentification) -> bool {
        Utc::now() - entry.fetched_at < self.ttl
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.file_stem()))
    }
}
