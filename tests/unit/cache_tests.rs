/*!
 * Tests for the two-tier translation cache over an on-disk database
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use wikitranslate::translation::cache::{
    CacheSource, CacheTier, ComputeOutcome, MemoryTier, SqliteTier, TranslationCache, fingerprint,
};
use wikitranslate::translation::Segment;

use crate::common;

fn two_tier(repo: wikitranslate::database::Repository, ttl_secs: u64) -> TranslationCache {
    let memory: Arc<dyn CacheTier> = Arc::new(MemoryTier::new(32));
    let durable: Arc<dyn CacheTier> = Arc::new(SqliteTier::new(repo));
    TranslationCache::new(vec![memory, durable], ttl_secs)
}

#[tokio::test]
async fn test_putIfAbsent_acrossCachesSharingFile_shouldKeepFirstWrite() {
    common::init_logging();
    let dir = common::create_temp_dir().unwrap();
    let first = two_tier(common::create_file_repository(&dir).unwrap(), 3600);
    let second = two_tier(common::create_file_repository(&dir).unwrap(), 3600);

    let written = first
        .get_or_compute("fp-1", || async { Ok::<_, String>(ComputeOutcome::storable("ẹ kú àárọ̀")) })
        .await
        .unwrap();
    assert_eq!(written.source, CacheSource::Computed);

    let read = second
        .get_or_compute("fp-1", || async { Ok::<_, String>(ComputeOutcome::storable("overwritten")) })
        .await
        .unwrap();

    assert_eq!(read.source, CacheSource::DurableTier);
    assert_eq!(read.entry.translated_text, "ẹ kú àárọ̀");
    assert_eq!(second.stats().computes, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_getOrCompute_concurrentMissesOnDisk_shouldComputeOnce() {
    let dir = common::create_temp_dir().unwrap();
    let cache = two_tier(common::create_file_repository(&dir).unwrap(), 3600);
    let computes = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let cache = cache.clone();
            let computes = computes.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute("shared", || async move {
                        computes.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(40)).await;
                        Ok::<_, String>(ComputeOutcome::storable("once"))
                    })
                    .await
            })
        })
        .collect();

    for handle in handles {
        let lookup = handle.await.unwrap().unwrap();
        assert_eq!(lookup.entry.translated_text, "once");
        assert!(lookup.storable);
    }
    assert_eq!(computes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_getOrCompute_withZeroTtl_shouldNotServeExpiredEntry() {
    let dir = common::create_temp_dir().unwrap();
    let cache = two_tier(common::create_file_repository(&dir).unwrap(), 0);

    cache
        .get_or_compute("fp", || async { Ok::<_, String>(ComputeOutcome::storable("stale")) })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let again = cache
        .get_or_compute("fp", || async { Ok::<_, String>(ComputeOutcome::storable("fresh")) })
        .await
        .unwrap();

    assert_eq!(again.source, CacheSource::Computed);
    assert_eq!(again.entry.translated_text, "fresh");
}

#[tokio::test]
async fn test_disabledCache_shouldComputeEveryTime() {
    let cache = TranslationCache::disabled();
    assert!(!cache.is_enabled());

    for expected in ["a", "b"] {
        let lookup = cache
            .get_or_compute("fp", || async move { Ok::<_, String>(ComputeOutcome::storable(expected)) })
            .await
            .unwrap();
        assert_eq!(lookup.entry.translated_text, expected);
        assert_eq!(lookup.source, CacheSource::Computed);
    }
}

#[test]
fn test_fingerprint_shouldIgnoreIdButNotGlossaryVersion() {
    let a = Segment::new("s1", "The CPU", "en", "yo", "technical");
    let b = Segment::new("s2", "The CPU", "en", "yo", "technical");

    assert_eq!(fingerprint(&a, 3), fingerprint(&b, 3));
    assert_ne!(fingerprint(&a, 3), fingerprint(&a, 4));
}
