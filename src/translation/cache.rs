/*!
 * Translation caching functionality.
 *
 * A `TranslationCache` composes an ordered list of tiers (usually an in-memory
 * LRU in front of the SQLite table) behind `get_or_compute`. Concurrent callers
 * for the same fingerprint share one computation; whatever reaches the durable
 * tier first for a fingerprint is what every later caller sees.
 */

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use crate::database::Repository;
use crate::errors::CacheUnavailable;
use crate::translation::segment::{Segment, truncate_text};

/// Longest ttl honoured, about a century
const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// A stored translation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub translated_text: String,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
    pub hit_count: u64,
}

impl CacheEntry {
    /// Create a fresh entry stamped with the current time
    pub fn new(fingerprint: impl Into<String>, translated_text: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            translated_text: translated_text.into(),
            created_at: Utc::now(),
            ttl_secs: ttl_secs.min(MAX_TTL_SECS),
            hit_count: 0,
        }
    }

    /// Instant after which the entry is no longer served
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::seconds(self.ttl_secs.min(MAX_TTL_SECS) as i64)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Cache key for a segment under a given glossary version.
///
/// SHA-256 over length-prefixed fields, so `("ab", "c")` and `("a", "bc")`
/// never collide.
pub fn fingerprint(segment: &Segment, glossary_version: u64) -> String {
    let version = glossary_version.to_string();
    let fields = [
        segment.source_text.as_str(),
        segment.source_lang.as_str(),
        segment.target_lang.as_str(),
        segment.domain_hint.as_str(),
        version.as_str(),
    ];

    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }

    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

/// One storage layer of the cache
#[async_trait]
pub trait CacheTier: Send + Sync + fmt::Debug {
    /// Short name used in logs and errors
    fn name(&self) -> &str;

    /// Live entry for `fingerprint`, if any
    async fn get(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheUnavailable>;

    /// Store `entry` unless a live entry already holds its fingerprint.
    /// Returns whichever entry the tier ends up holding.
    async fn put_if_absent(&self, entry: CacheEntry) -> Result<CacheEntry, CacheUnavailable>;

    /// Drop expired entries; returns how many went
    async fn purge_expired(&self) -> Result<usize, CacheUnavailable>;
}

struct LruSlot {
    entry: CacheEntry,
    tick: u64,
}

#[derive(Default)]
struct LruState {
    slots: HashMap<String, LruSlot>,
    /// Recency order: lowest tick is least recently used
    order: BTreeMap<u64, String>,
    tick: u64,
}

impl LruState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn touch(&mut self, fingerprint: &str) {
        let tick = self.next_tick();
        if let Some(slot) = self.slots.get_mut(fingerprint) {
            self.order.remove(&slot.tick);
            slot.tick = tick;
            self.order.insert(tick, fingerprint.to_string());
        }
    }

    fn remove(&mut self, fingerprint: &str) -> Option<CacheEntry> {
        let slot = self.slots.remove(fingerprint)?;
        self.order.remove(&slot.tick);
        Some(slot.entry)
    }

    fn insert(&mut self, entry: CacheEntry) {
        let tick = self.next_tick();
        self.order.insert(tick, entry.fingerprint.clone());
        self.slots.insert(entry.fingerprint.clone(), LruSlot { entry, tick });
    }

    fn evict_lru(&mut self) -> Option<String> {
        let (_, fingerprint) = self.order.pop_first()?;
        self.slots.remove(&fingerprint);
        Some(fingerprint)
    }
}

/// Bounded in-memory tier with least-recently-used eviction
pub struct MemoryTier {
    capacity: usize,
    state: Mutex<LruState>,
}

impl MemoryTier {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(LruState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTier")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[async_trait]
impl CacheTier for MemoryTier {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheUnavailable> {
        let mut state = self.state.lock();
        let expired = match state.slots.get(fingerprint) {
            Some(slot) => slot.entry.is_expired(),
            None => return Ok(None),
        };
        if expired {
            state.remove(fingerprint);
            return Ok(None);
        }

        state.touch(fingerprint);
        Ok(state.slots.get_mut(fingerprint).map(|slot| {
            slot.entry.hit_count += 1;
            slot.entry.clone()
        }))
    }

    async fn put_if_absent(&self, entry: CacheEntry) -> Result<CacheEntry, CacheUnavailable> {
        let mut state = self.state.lock();
        if let Some(slot) = state.slots.get(&entry.fingerprint) {
            if !slot.entry.is_expired() {
                let existing = slot.entry.clone();
                state.touch(&entry.fingerprint);
                return Ok(existing);
            }
            state.remove(&entry.fingerprint);
        }

        state.insert(entry.clone());
        while state.slots.len() > self.capacity {
            if let Some(evicted) = state.evict_lru() {
                debug!("Evicted {} from memory tier", truncate_text(&evicted, 12));
            }
        }
        Ok(entry)
    }

    async fn purge_expired(&self) -> Result<usize, CacheUnavailable> {
        let mut state = self.state.lock();
        let now = Utc::now();
        let expired: Vec<String> = state
            .slots
            .values()
            .filter(|slot| slot.entry.is_expired_at(now))
            .map(|slot| slot.entry.fingerprint.clone())
            .collect();
        for fingerprint in &expired {
            state.remove(fingerprint);
        }
        Ok(expired.len())
    }
}

/// Durable tier backed by the `cache_entries` table
#[derive(Debug, Clone)]
pub struct SqliteTier {
    repo: Repository,
}

impl SqliteTier {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    fn unavailable(&self, error: anyhow::Error) -> CacheUnavailable {
        CacheUnavailable {
            tier: self.name().to_string(),
            message: format!("{:#}", error),
        }
    }
}

#[async_trait]
impl CacheTier for SqliteTier {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheUnavailable> {
        self.repo
            .get_cache_entry(fingerprint.to_string(), Utc::now())
            .await
            .map_err(|e| self.unavailable(e))
    }

    async fn put_if_absent(&self, entry: CacheEntry) -> Result<CacheEntry, CacheUnavailable> {
        self.repo
            .put_cache_entry_if_absent(entry)
            .await
            .map_err(|e| self.unavailable(e))
    }

    async fn purge_expired(&self) -> Result<usize, CacheUnavailable> {
        self.repo
            .purge_expired_cache_entries(Utc::now())
            .await
            .map_err(|e| self.unavailable(e))
    }
}

/// What a compute function hands back to the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeOutcome {
    pub text: String,
    /// False for degraded output that must not outlive this call
    pub storable: bool,
}

impl ComputeOutcome {
    pub fn storable(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            storable: true,
        }
    }

    pub fn transient(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            storable: false,
        }
    }
}

/// Where a `get_or_compute` result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    /// The first tier
    FastTier,
    /// Any tier after the first
    DurableTier,
    /// This caller ran the compute function
    Computed,
    /// Another caller's in-flight computation
    Shared,
}

impl CacheSource {
    /// True unless this caller paid for the computation
    pub fn is_hit(self) -> bool {
        !matches!(self, Self::Computed)
    }
}

#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub entry: CacheEntry,
    pub source: CacheSource,
    /// False when the entry was a non-storable compute result
    pub storable: bool,
}

/// Counters since the cache was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub fast_hits: u64,
    pub durable_hits: u64,
    pub shared: u64,
    pub misses: u64,
    pub computes: u64,
    pub tier_errors: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.fast_hits + self.durable_hits + self.shared;
        let total = hits + self.misses;
        if total > 0 { hits as f64 / total as f64 } else { 0.0 }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fast hits: {}, durable hits: {}, shared: {}, misses: {}, computes: {}, tier errors: {} (hit rate {:.1}%)",
            self.fast_hits,
            self.durable_hits,
            self.shared,
            self.misses,
            self.computes,
            self.tier_errors,
            self.hit_rate() * 100.0
        )
    }
}

#[derive(Default)]
struct Counters {
    fast_hits: AtomicU64,
    durable_hits: AtomicU64,
    shared: AtomicU64,
    misses: AtomicU64,
    computes: AtomicU64,
    tier_errors: AtomicU64,
}

#[derive(Debug, Clone)]
struct Built {
    entry: CacheEntry,
    storable: bool,
}

struct CacheInner {
    tiers: Vec<Arc<dyn CacheTier>>,
    ttl_secs: u64,
    in_flight: Mutex<HashMap<String, Arc<OnceCell<Built>>>>,
    counters: Counters,
}

/// Multi-tier translation cache with single-flight computation
#[derive(Clone)]
pub struct TranslationCache {
    inner: Arc<CacheInner>,
}

impl fmt::Debug for TranslationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationCache")
            .field("tiers", &self.inner.tiers)
            .field("ttl_secs", &self.inner.ttl_secs)
            .finish()
    }
}

impl TranslationCache {
    /// Compose tiers, fastest first
    pub fn new(tiers: Vec<Arc<dyn CacheTier>>, ttl_secs: u64) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                tiers,
                ttl_secs,
                in_flight: Mutex::new(HashMap::new()),
                counters: Counters::default(),
            }),
        }
    }

    /// A single in-memory tier
    pub fn memory_only(capacity: usize, ttl_secs: u64) -> Self {
        Self::new(vec![Arc::new(MemoryTier::new(capacity))], ttl_secs)
    }

    /// No tiers; concurrent callers still share in-flight work
    pub fn disabled() -> Self {
        Self::new(Vec::new(), 0)
    }

    pub fn is_enabled(&self) -> bool {
        !self.inner.tiers.is_empty()
    }

    pub fn ttl_secs(&self) -> u64 {
        self.inner.ttl_secs
    }

    /// Return the cached entry for `fingerprint`, or run `compute` exactly once
    /// across concurrent callers and store its result.
    ///
    /// A failed compute is not remembered: the next caller (including one that
    /// was waiting) runs its own.
    pub async fn get_or_compute<F, Fut, E>(&self, fingerprint: &str, compute: F) -> Result<CacheLookup, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ComputeOutcome, E>>,
    {
        if let Some(lookup) = self.lookup(fingerprint).await {
            return Ok(lookup);
        }
        self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);

        let cell = self.inner.in_flight.lock().entry(fingerprint.to_string()).or_default().clone();

        let mut source = None;
        let result = {
            let source = &mut source;
            cell.get_or_try_init(|| async move {
                // Another builder may have finished between the first lookup and now
                if let Some(lookup) = self.lookup(fingerprint).await {
                    *source = Some(lookup.source);
                    return Ok(Built {
                        entry: lookup.entry,
                        storable: true,
                    });
                }

                let outcome = compute().await?;
                self.inner.counters.computes.fetch_add(1, Ordering::Relaxed);
                *source = Some(CacheSource::Computed);

                let entry = CacheEntry::new(fingerprint, outcome.text, self.inner.ttl_secs);
                let entry = if outcome.storable {
                    self.store(entry).await
                } else {
                    debug!("Not caching non-storable result for {}", truncate_text(fingerprint, 12));
                    entry
                };
                Ok::<_, E>(Built {
                    entry,
                    storable: outcome.storable,
                })
            })
            .await
            .cloned()
        };

        self.release(fingerprint, &cell);
        let built = result?;

        let source = source.unwrap_or_else(|| {
            self.inner.counters.shared.fetch_add(1, Ordering::Relaxed);
            CacheSource::Shared
        });
        Ok(CacheLookup {
            entry: built.entry,
            source,
            storable: built.storable,
        })
    }

    /// Read-only lookup across tiers, promoting lower-tier hits
    pub async fn get(&self, fingerprint: &str) -> Option<CacheEntry> {
        self.lookup(fingerprint).await.map(|lookup| lookup.entry)
    }

    /// Drop expired entries from every tier
    pub async fn purge_expired(&self) -> usize {
        let mut purged = 0;
        for tier in &self.inner.tiers {
            match tier.purge_expired().await {
                Ok(count) => purged += count,
                Err(e) => self.tier_failed(e),
            }
        }
        purged
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        CacheStats {
            fast_hits: c.fast_hits.load(Ordering::Relaxed),
            durable_hits: c.durable_hits.load(Ordering::Relaxed),
            shared: c.shared.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            computes: c.computes.load(Ordering::Relaxed),
            tier_errors: c.tier_errors.load(Ordering::Relaxed),
        }
    }

    async fn lookup(&self, fingerprint: &str) -> Option<CacheLookup> {
        for (index, tier) in self.inner.tiers.iter().enumerate() {
            match tier.get(fingerprint).await {
                Ok(Some(entry)) => {
                    let source = if index == 0 {
                        self.inner.counters.fast_hits.fetch_add(1, Ordering::Relaxed);
                        CacheSource::FastTier
                    } else {
                        self.inner.counters.durable_hits.fetch_add(1, Ordering::Relaxed);
                        CacheSource::DurableTier
                    };
                    debug!("Cache hit in {} tier for {}", tier.name(), truncate_text(fingerprint, 12));
                    self.promote(index, &entry).await;
                    return Some(CacheLookup {
                        entry,
                        source,
                        storable: true,
                    });
                }
                Ok(None) => {}
                Err(e) => self.tier_failed(e),
            }
        }
        debug!("Cache miss for {}", truncate_text(fingerprint, 12));
        None
    }

    async fn promote(&self, found_at: usize, entry: &CacheEntry) {
        for tier in &self.inner.tiers[..found_at] {
            if let Err(e) = tier.put_if_absent(entry.clone()).await {
                self.tier_failed(e);
            }
        }
    }

    /// Write slowest tier first so the durable winner is what faster tiers hold
    async fn store(&self, entry: CacheEntry) -> CacheEntry {
        let mut stored = entry;
        for tier in self.inner.tiers.iter().rev() {
            match tier.put_if_absent(stored.clone()).await {
                Ok(existing) => {
                    if existing.translated_text != stored.translated_text {
                        debug!(
                            "Keeping existing {} tier entry for {}",
                            tier.name(),
                            truncate_text(&stored.fingerprint, 12)
                        );
                    }
                    stored = existing;
                }
                Err(e) => self.tier_failed(e),
            }
        }
        stored
    }

    fn release(&self, fingerprint: &str, cell: &Arc<OnceCell<Built>>) {
        let mut in_flight = self.inner.in_flight.lock();
        if in_flight.get(fingerprint).is_some_and(|current| Arc::ptr_eq(current, cell)) {
            in_flight.remove(fingerprint);
        }
    }

    fn tier_failed(&self, error: CacheUnavailable) {
        self.inner.counters.tier_errors.fetch_add(1, Ordering::Relaxed);
        warn!("{}; bypassing tier", error);
    }
}
