//! Local cache of fetched telemetry ranges.
//!
//! Wraps any [`TelemetryRangeSource`] so replaying the same window does not
//! hit the telemetry API again. Entries are pruned by age and count, and the
//! whole cache can be written to a JSON file that users may delete or replace.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fleet_core::{SourceError, TelemetryRangeSource, TelemetryRecord};
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub trait CacheEntry {
    /// Last time the entry was fetched or used.
    fn touched_at(&self) -> DateTime<Utc>;
}

/// Drop entries older than `max_age`, then the oldest until at most
/// `max_entries` remain.
pub fn prune_cache<K, V>(cache: &DashMap<K, V>, max_entries: usize, max_age: Duration, now: DateTime<Utc>)
where
    K: Clone + Eq + Hash,
    V: CacheEntry,
{
    let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
    let mut entries: Vec<(K, DateTime<Utc>)> = cache
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().touched_at()))
        .collect();

    entries.retain(|(key, touched_at)| {
        if now - *touched_at > max_age {
            cache.remove(key);
            false
        } else {
            true
        }
    });

    if cache.len() <= max_entries {
        return;
    }

    entries.sort_by_key(|(_, touched_at)| *touched_at);
    for (key, _) in entries {
        if cache.len() <= max_entries {
            break;
        }
        cache.remove(&key);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeKey {
    pub vehicle_id: String,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRange {
    pub fetched_at: DateTime<Utc>,
    pub records: Vec<TelemetryRecord>,
}

impl CacheEntry for CachedRange {
    fn touched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedRange {
    #[serde(flatten)]
    key: RangeKey,
    #[serde(flatten)]
    range: CachedRange,
}

pub struct RangeCache {
    source: Arc<dyn TelemetryRangeSource>,
    entries: DashMap<RangeKey, CachedRange>,
    path: Option<PathBuf>,
    max_entries: usize,
    max_age: Duration,
}

impl RangeCache {
    pub fn new(source: Arc<dyn TelemetryRangeSource>, max_entries: usize, max_age: Duration) -> Self {
        Self {
            source,
            entries: DashMap::new(),
            path: None,
            max_entries,
            max_age,
        }
    }

    pub fn with_persistence(mut self, path: Option<PathBuf>) -> Self {
        self.path = path;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn prune(&self) {
        prune_cache(&self.entries, self.max_entries, self.max_age, Utc::now());
    }

    /// Read the cache file, if any. A missing file is an empty cache.
    pub async fn load(&self) -> Result<usize> {
        let Some(path) = &self.path else {
            return Ok(0);
        };
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        let persisted: Vec<PersistedRange> = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        for entry in persisted {
            self.entries.insert(entry.key, entry.range);
        }
        self.prune();
        tracing::info!(path = %path.display(), ranges = self.entries.len(), "loaded range cache");
        Ok(self.entries.len())
    }

    /// Write the cache file atomically (temp file + rename).
    pub async fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot: Vec<PersistedRange> = self
            .entries
            .iter()
            .map(|entry| PersistedRange {
                key: entry.key().clone(),
                range: entry.value().clone(),
            })
            .collect();
        let bytes = serde_json::to_vec(&snapshot).context("failed to encode range cache")?;
        write_atomic(path, &bytes).await
    }

    fn lookup(&self, key: &RangeKey) -> Option<Vec<TelemetryRecord>> {
        let entry = self.entries.get(key)?;
        let age = Utc::now() - entry.fetched_at;
        let max_age = chrono::Duration::from_std(self.max_age).unwrap_or(chrono::Duration::MAX);
        (age <= max_age).then(|| entry.records.clone())
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl TelemetryRangeSource for RangeCache {
    async fn fetch_range(
        &self,
        vehicle_id: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<TelemetryRecord>, SourceError> {
        let key = RangeKey {
            vehicle_id: vehicle_id.to_string(),
            start: start.to_string(),
            end: end.to_string(),
        };
        if let Some(records) = self.lookup(&key) {
            tracing::debug!(vehicle_id = %vehicle_id, records = records.len(), "range cache hit");
            return Ok(records);
        }

        let records = self.source.fetch_range(vehicle_id, start, end).await?;
        self.entries.insert(
            key,
            CachedRange {
                fetched_at: Utc::now(),
                records: records.clone(),
            },
        );
        self.prune();
        if let Err(err) = self.persist().await {
            tracing::warn!(error = %err, "failed to persist range cache");
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{RecordLocation, RecordMetrics};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TelemetryRangeSource for CountingSource {
        async fn fetch_range(
            &self,
            vehicle_id: &str,
            start: &str,
            _end: &str,
        ) -> Result<Vec<TelemetryRecord>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![TelemetryRecord {
                id: format!("{}-{}", vehicle_id, start),
                vehicle_id: Some(vehicle_id.to_string()),
                timestamp: start.to_string(),
                location: RecordLocation {
                    latitude: 1.0,
                    longitude: 2.0,
                    altitude: 3.0,
                    accuracy: None,
                },
                metrics: RecordMetrics::default(),
            }])
        }
    }

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("fleet-range-cache-{}.json", uuid::Uuid::new_v4()))
    }

    fn ranged(fetched_at: DateTime<Utc>) -> CachedRange {
        CachedRange {
            fetched_at,
            records: Vec::new(),
        }
    }

    #[test]
    fn prune_drops_expired_then_oldest() {
        let now = Utc::now();
        let cache: DashMap<u32, CachedRange> = DashMap::new();
        cache.insert(1, ranged(now - chrono::Duration::hours(2)));
        cache.insert(2, ranged(now - chrono::Duration::minutes(30)));
        cache.insert(3, ranged(now - chrono::Duration::minutes(20)));
        cache.insert(4, ranged(now - chrono::Duration::minutes(10)));

        prune_cache(&cache, 2, Duration::from_secs(3600), now);

        assert!(!cache.contains_key(&1));
        assert!(!cache.contains_key(&2));
        assert!(cache.contains_key(&3));
        assert!(cache.contains_key(&4));
    }

    #[tokio::test]
    async fn repeated_window_is_served_from_cache() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let cache = RangeCache::new(source.clone(), 8, Duration::from_secs(60));

        let first = cache.fetch_range("D1", "s", "e").await.unwrap();
        let second = cache.fetch_range("D1", "s", "e").await.unwrap();
        cache.fetch_range("D1", "s2", "e").await.unwrap();

        assert_eq!(first[0].id, second[0].id);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn persisted_cache_survives_restart() {
        let path = temp_path();
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });

        let cache = RangeCache::new(source.clone(), 8, Duration::from_secs(60))
            .with_persistence(Some(path.clone()));
        cache.fetch_range("D1", "s", "e").await.unwrap();

        let reloaded = RangeCache::new(source.clone(), 8, Duration::from_secs(60))
            .with_persistence(Some(path.clone()));
        assert_eq!(reloaded.load().await.unwrap(), 1);
        reloaded.fetch_range("D1", "s", "e").await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn missing_cache_file_is_empty() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let cache = RangeCache::new(source, 8, Duration::from_secs(60)).with_persistence(Some(temp_path()));
        assert_eq!(cache.load().await.unwrap(), 0);
        assert!(cache.is_empty());
    }
}
