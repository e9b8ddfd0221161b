/*!
 * Batch runner tests: ordering, failure isolation, cancellation and progress
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use wikitranslate::errors::TranslationError;
use wikitranslate::providers::TranslationProvider;
use wikitranslate::providers::mock::MockProvider;
use wikitranslate::translation::{CancellationSignal, SegmentOrchestrator, TranslationCache};

use crate::common::mock_providers::{PoisonedProvider, ReverseLatencyProvider};
use crate::common::{self, cascade_of, numbered_segments, segment};

#[tokio::test]
async fn test_translateBatch_withReversedLatencies_shouldKeepInputOrder() {
    common::init_logging();
    let cascade = cascade_of(vec![Arc::new(ReverseLatencyProvider) as Arc<dyn TranslationProvider>], 1);
    let orchestrator = SegmentOrchestrator::new(cascade).with_max_concurrent_segments(6);

    let results = orchestrator.translate_batch(numbered_segments(6, "fr")).await;

    assert_eq!(results.len(), 6);
    for (i, result) in results.iter().enumerate() {
        let translated = result.as_ref().unwrap();
        assert_eq!(translated.id, format!("s{}", i));
        assert_eq!(translated.text, format!("[fr] line {}", i));
    }
}

#[tokio::test]
async fn test_translateBatch_withOnePoisonedSegment_shouldIsolateFailure() {
    let provider = PoisonedProvider { poison: "line 2" };
    let cascade = cascade_of(vec![Arc::new(provider) as Arc<dyn TranslationProvider>], 3);
    let orchestrator = SegmentOrchestrator::new(cascade).with_max_concurrent_segments(3);

    let results = orchestrator.translate_batch(numbered_segments(5, "fr")).await;

    assert_eq!(results.len(), 5);
    for (i, result) in results.iter().enumerate() {
        if i == 2 {
            let failure = result.as_ref().unwrap_err();
            assert_eq!(failure.id, "s2");
            assert!(matches!(failure.error, TranslationError::AllProvidersExhausted { .. }));
            assert_eq!(failure.attempts.len(), 1);
        } else {
            assert_eq!(result.as_ref().unwrap().text, format!("[fr] line {}", i));
        }
    }
}

#[tokio::test]
async fn test_translateBatchWithCancel_midBatch_shouldReturnEveryInputSlot() {
    let cascade = cascade_of(vec![Arc::new(MockProvider::slow(40)) as Arc<dyn TranslationProvider>], 1);
    let orchestrator = SegmentOrchestrator::new(cascade).with_max_concurrent_segments(1);
    let segments = numbered_segments(12, "fr");

    let cancel = CancellationSignal::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let cancelled = orchestrator
        .translate_batch_with_cancel(segments, &cancel)
        .await
        .unwrap_err();

    assert_eq!(cancelled.partial.len(), 12);
    for (i, result) in cancelled.partial.iter().enumerate() {
        let id = match result {
            Ok(translated) => &translated.id,
            Err(failure) => &failure.id,
        };
        assert_eq!(id, &format!("s{}", i));
    }
    assert!(cancelled.translated_count() < 12);
    assert!(
        cancelled
            .partial
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|f| matches!(f.error, TranslationError::Cancelled))
    );
}

#[tokio::test]
async fn test_translateBatchWithCancel_alreadyCancelled_shouldNotCallProviders() {
    let provider = MockProvider::working();
    let counter = provider.clone();
    let cascade = cascade_of(vec![Arc::new(provider) as Arc<dyn TranslationProvider>], 1);
    let orchestrator = SegmentOrchestrator::new(cascade);

    let cancel = CancellationSignal::new();
    cancel.cancel();
    let cancelled = orchestrator
        .translate_batch_with_cancel(numbered_segments(3, "fr"), &cancel)
        .await
        .unwrap_err();

    assert_eq!(cancelled.translated_count(), 0);
    assert_eq!(counter.request_count(), 0);
}

#[tokio::test]
async fn test_translateBatchWithProgress_shouldReportEverySegment() {
    let cascade = cascade_of(vec![Arc::new(MockProvider::working()) as Arc<dyn TranslationProvider>], 1);
    let orchestrator = SegmentOrchestrator::new(cascade);
    let calls = Arc::new(AtomicUsize::new(0));
    let highest = Arc::new(AtomicUsize::new(0));

    let (c, h) = (calls.clone(), highest.clone());
    let results = orchestrator
        .translate_batch_with_progress(numbered_segments(7, "fr"), &CancellationSignal::new(), move |done, total| {
            assert_eq!(total, 7);
            c.fetch_add(1, Ordering::SeqCst);
            h.fetch_max(done, Ordering::SeqCst);
        })
        .await
        .unwrap();

    assert_eq!(results.len(), 7);
    assert_eq!(calls.load(Ordering::SeqCst), 7);
    assert_eq!(highest.load(Ordering::SeqCst), 7);
}

#[tokio::test]
async fn test_translateBatch_withDuplicateSegments_shouldCallProviderOnce() {
    let provider = MockProvider::slow(50);
    let counter = provider.clone();
    let cascade = cascade_of(vec![Arc::new(provider) as Arc<dyn TranslationProvider>], 1);
    let orchestrator = SegmentOrchestrator::new(cascade)
        .with_cache(TranslationCache::memory_only(16, 3600))
        .with_max_concurrent_segments(4);
    let segments: Vec<_> = (0..4)
        .map(|i| segment(&format!("dup{}", i), "same words", "en", "fr"))
        .collect();

    let results = orchestrator.translate_batch(segments).await;

    assert_eq!(counter.request_count(), 1);
    let fresh = results.iter().filter(|r| !r.as_ref().unwrap().cache_hit).count();
    assert_eq!(fresh, 1);
    assert!(results.iter().all(|r| r.as_ref().unwrap().text == "[fr] same words"));
}

#[tokio::test]
async fn test_translateBatch_withEmptyInput_shouldReturnEmpty() {
    let cascade = cascade_of(vec![Arc::new(MockProvider::working()) as Arc<dyn TranslationProvider>], 1);
    let orchestrator = SegmentOrchestrator::new(cascade);

    assert!(orchestrator.translate_batch(Vec::new()).await.is_empty());
}
