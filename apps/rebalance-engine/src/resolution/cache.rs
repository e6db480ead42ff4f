//! Resolution cache keyed by `(ticker, isin)`.
//!
//! Entries carry the confidence they were stored with; a later store may
//! only overwrite when it is at least as confident. Entries expire after a
//! configurable TTL and the whole cache can round-trip through a JSON file
//! between runs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::models::{Asset, ResolutionRecord};

/// One cached resolution with its storage time.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    record: ResolutionRecord,
    stored_at: DateTime<Utc>,
}

/// Hit/miss counters captured at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that fell through to the broker.
    pub misses: u64,
    /// Live entries.
    pub entries: usize,
}

/// Thread-safe TTL cache for instrument resolutions.
#[derive(Debug)]
pub struct ResolutionCache {
    entries: RwLock<HashMap<(String, Option<String>), CacheEntry>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResolutionCache {
    /// Empty cache with the given entry TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn is_live(&self, entry: &CacheEntry) -> bool {
        let age = Utc::now().signed_duration_since(entry.stored_at);
        age.to_std().is_ok_and(|age| age < self.ttl)
    }

    /// Look up a resolution for this asset, counting the hit or miss.
    #[must_use]
    pub fn get(&self, asset: &Asset) -> Option<ResolutionRecord> {
        let key = asset.cache_key();
        let found = self
            .entries
            .read()
            .ok()
            .and_then(|map| map.get(&key).filter(|e| self.is_live(e)).cloned());
        match found {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(ticker = %asset.ticker, "resolution cache hit");
                Some(entry.record)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a resolution unless a higher-confidence entry already exists.
    pub fn put(&self, asset: &Asset, record: ResolutionRecord) {
        let key = asset.cache_key();
        let Ok(mut map) = self.entries.write() else {
            return;
        };
        if let Some(existing) = map.get(&key) {
            if self.is_live(existing) && existing.record.confidence > record.confidence {
                debug!(
                    ticker = %asset.ticker,
                    existing = existing.record.confidence,
                    offered = record.confidence,
                    "keeping higher-confidence cache entry"
                );
                return;
            }
        }
        map.insert(
            key,
            CacheEntry {
                record,
                stored_at: Utc::now(),
            },
        );
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&self) {
        if let Ok(mut map) = self.entries.write() {
            map.clear();
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Current counters and live entry count.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let entries = self
            .entries
            .read()
            .map(|map| map.values().filter(|e| self.is_live(e)).count())
            .unwrap_or(0);
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries,
        }
    }

    /// Load previously persisted entries, pruning any past their TTL.
    ///
    /// A missing file is not an error; the cache just starts cold.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load_from(&self, path: &Path) -> Result<(), EngineError> {
        if !path.exists() {
            info!(path = %path.display(), "no persisted resolution cache, starting cold");
            return Ok(());
        }
        let raw = std::fs::read_to_string(path)?;
        let persisted: Vec<((String, Option<String>), CacheEntry)> = serde_json::from_str(&raw)?;
        let total = persisted.len();
        let live: Vec<_> = persisted
            .into_iter()
            .filter(|(_, entry)| self.is_live(entry))
            .collect();
        let loaded = live.len();
        if let Ok(mut map) = self.entries.write() {
            map.extend(live);
        }
        info!(loaded, expired = total - loaded, "resolution cache loaded");
        Ok(())
    }

    /// Persist live entries as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<(), EngineError> {
        let live: Vec<((String, Option<String>), CacheEntry)> = self
            .entries
            .read()
            .map(|map| {
                map.iter()
                    .filter(|(_, e)| self.is_live(e))
                    .map(|(k, e)| (k.clone(), e.clone()))
                    .collect()
            })
            .unwrap_or_default();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&live)?;
        std::fs::write(path, json)?;
        debug!(entries = live.len(), path = %path.display(), "resolution cache saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BrokerInstrument, ResolutionMethod};

    fn asset(ticker: &str, isin: Option<&str>) -> Asset {
        Asset {
            ticker: ticker.to_string(),
            isin: isin.map(String::from),
            name: format!("{ticker} Corp"),
            currency: "USD".to_string(),
            country: "US".to_string(),
        }
    }

    fn record(ticker: &str, confidence: f64) -> ResolutionRecord {
        ResolutionRecord {
            ticker: ticker.to_string(),
            isin: None,
            instrument: Some(BrokerInstrument {
                broker_id: 1,
                symbol: ticker.to_string(),
                exchange: "NYSE".to_string(),
                currency: "USD".to_string(),
                tradable: true,
            }),
            method: Some(ResolutionMethod::Ticker),
            confidence,
            rejected: Vec::new(),
        }
    }

    #[test]
    fn hit_and_miss_counters() {
        let cache = ResolutionCache::new(Duration::from_secs(60));
        let acme = asset("ACME", None);

        assert!(cache.get(&acme).is_none());
        cache.put(&acme, record("ACME", 0.85));
        assert!(cache.get(&acme).is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn isin_distinguishes_keys() {
        let cache = ResolutionCache::new(Duration::from_secs(60));
        cache.put(&asset("ACME", Some("US0001")), record("ACME", 1.0));
        assert!(cache.get(&asset("ACME", None)).is_none());
        assert!(cache.get(&asset("ACME", Some("US0001"))).is_some());
    }

    #[test]
    fn lower_confidence_does_not_overwrite() {
        let cache = ResolutionCache::new(Duration::from_secs(60));
        let acme = asset("ACME", None);
        cache.put(&acme, record("ACME", 1.0));
        cache.put(&acme, record("ACME", 0.72));
        let got = cache.get(&acme).expect("entry present");
        assert!((got.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn equal_confidence_overwrites() {
        let cache = ResolutionCache::new(Duration::from_secs(60));
        let acme = asset("ACME", None);
        let mut first = record("ACME", 0.85);
        first.rejected.clear();
        cache.put(&acme, first);
        let mut second = record("ACME", 0.85);
        if let Some(instrument) = second.instrument.as_mut() {
            instrument.broker_id = 2;
        }
        cache.put(&acme, second);
        let got = cache.get(&acme).expect("entry present");
        assert_eq!(got.instrument.expect("resolved").broker_id, 2);
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let cache = ResolutionCache::new(Duration::ZERO);
        let acme = asset("ACME", None);
        cache.put(&acme, record("ACME", 1.0));
        assert!(cache.get(&acme).is_none());
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache.json");

        let cache = ResolutionCache::new(Duration::from_secs(60));
        cache.put(&asset("ACME", None), record("ACME", 0.85));
        cache.save_to(&path).expect("save");

        let reloaded = ResolutionCache::new(Duration::from_secs(60));
        reloaded.load_from(&path).expect("load");
        assert!(reloaded.get(&asset("ACME", None)).is_some());
    }

    #[test]
    fn missing_file_is_a_cold_start() {
        let cache = ResolutionCache::new(Duration::from_secs(60));
        cache
            .load_from(Path::new("/nonexistent/cache.json"))
            .expect("missing file tolerated");
        assert_eq!(cache.stats().entries, 0);
    }
}
