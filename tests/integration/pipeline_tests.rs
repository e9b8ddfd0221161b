/*!
 * End-to-end tests of the per-segment pipeline:
 * glossary match, protection, routing, cascade, spelling, restoration and tones
 */

use std::sync::Arc;
use std::time::Duration;

use wikitranslate::errors::TranslationError;
use wikitranslate::providers::TranslationProvider;
use wikitranslate::providers::mock::MockProvider;
use wikitranslate::translation::protection::placeholder_spans;
use wikitranslate::translation::{
    GlossaryEntry, GlossaryMatcher, InMemoryTerminologyStore, Segment, SegmentOrchestrator, TonalAdapter,
    TranslationCache,
};

use crate::common::mock_providers::ScriptedProvider;
use crate::common::{self, cascade_of};

fn technical_glossary() -> Arc<GlossaryMatcher> {
    let store = InMemoryTerminologyStore::with_entries([
        GlossaryEntry::new("CPU", "UCP", "en", "yo").with_domain("technical")
    ]);
    Arc::new(GlossaryMatcher::new(Arc::new(store)))
}

fn cpu_segment() -> Segment {
    Segment::new("s1", "The CPU overheats", "en", "yo", "technical")
}

/// Yoruba-ish answer that keeps the one placeholder it was given
fn yoruba_with_term(text: &str, _source_lang: &str, _target_lang: &str) -> String {
    let token: String = placeholder_spans(text)
        .first()
        .map(|&(start, end)| text.chars().skip(start).take(end - start).collect())
        .unwrap_or_default();
    format!("ile {} dara", token)
}

#[tokio::test]
async fn test_translate_technicalTermToYoruba_shouldProtectRestoreAndMarkTones() {
    common::init_logging();
    let provider = MockProvider::working().with_custom_response(yoruba_with_term);
    let cascade = cascade_of(vec![Arc::new(provider) as Arc<dyn TranslationProvider>], 3);
    let orchestrator = SegmentOrchestrator::new(cascade).with_glossary(technical_glossary());

    let result = orchestrator.translate(&cpu_segment()).await.unwrap();

    let expected = TonalAdapter::with_builtin_tables().apply_tones("ile UCP dara", "yo");
    assert!(result.text.contains("UCP"));
    assert_eq!(result.text, expected);
    assert_ne!(result.text, "ile UCP dara");
    assert!(!result.degraded);
    assert!(!result.cache_hit);
}

#[tokio::test]
async fn test_translate_shouldSendExactlyOnePlaceholderAndNoSourceTerm() {
    let provider = ScriptedProvider::answering("scripted");
    let cascade = cascade_of(vec![provider.clone() as Arc<dyn TranslationProvider>], 3);
    let orchestrator = SegmentOrchestrator::new(cascade).with_glossary(technical_glossary());

    let result = orchestrator.translate(&cpu_segment()).await.unwrap();

    let calls = provider.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(placeholder_spans(&calls[0].text).len(), 1);
    assert!(!calls[0].text.contains("CPU"));
    assert_eq!((calls[0].source_lang.as_str(), calls[0].target_lang.as_str()), ("en", "yo"));
    assert!(result.text.contains("UCP"));
    assert!(!result.text.contains("__TERM_"));
}

#[tokio::test]
async fn test_translate_inGeneralDomain_shouldLeaveTechnicalTermAlone() {
    let provider = ScriptedProvider::answering("scripted");
    let cascade = cascade_of(vec![provider.clone() as Arc<dyn TranslationProvider>], 3);
    let orchestrator = SegmentOrchestrator::new(cascade).with_glossary(technical_glossary());
    let segment = Segment::new("s1", "The CPU overheats", "en", "yo", "general");

    orchestrator.translate(&segment).await.unwrap();

    assert_eq!(provider.calls()[0].text, "The CPU overheats");
}

#[tokio::test]
async fn test_translate_enToFon_shouldPivotThroughFrench() {
    let provider = ScriptedProvider::answering("scripted");
    let cascade = cascade_of(vec![provider.clone() as Arc<dyn TranslationProvider>], 3);
    let orchestrator = SegmentOrchestrator::new(cascade).with_tonal(TonalAdapter::new());
    let segment = Segment::new("s1", "water", "eng", "fon", "general");

    let result = orchestrator.translate(&segment).await.unwrap();

    assert_eq!(result.text, "[fon] [fr] water");
    let hops: Vec<(String, String)> = provider
        .calls()
        .into_iter()
        .map(|c| (c.source_lang, c.target_lang))
        .collect();
    assert_eq!(
        hops,
        vec![
            ("en".to_string(), "fr".to_string()),
            ("fr".to_string(), "fon".to_string())
        ]
    );
    assert_eq!(result.attempts.len(), 2);
    assert!(result.attempts.iter().all(|a| a.pivot_path() == "en→fr→fon"));
}

/// Fon answer spelled with ASCII digraphs around the placeholder
fn fon_digraphs_with_term(text: &str, _source_lang: &str, _target_lang: &str) -> String {
    let token: String = placeholder_spans(text)
        .first()
        .map(|&(start, end)| text.chars().skip(start).take(end - start).collect())
        .unwrap_or_default();
    format!("nyi {} dhe", token)
}

#[tokio::test]
async fn test_translate_toFon_shouldRespellProviderTextButNotGlossaryTerm() {
    let store = InMemoryTerminologyStore::with_entries([
        GlossaryEntry::new("CPU", "shipu", "en", "fon").with_domain("technical")
    ]);
    let provider = MockProvider::working().with_custom_response(fon_digraphs_with_term);
    let cascade = cascade_of(vec![Arc::new(provider) as Arc<dyn TranslationProvider>], 3);
    let orchestrator = SegmentOrchestrator::new(cascade)
        .with_glossary(Arc::new(GlossaryMatcher::new(Arc::new(store))))
        .with_tonal(TonalAdapter::new());
    let segment = Segment::new("s1", "The CPU overheats", "en", "fon", "technical");

    let result = orchestrator.translate(&segment).await.unwrap();

    assert_eq!(result.text, "ɲi shipu ɖe");
    assert!(!result.degraded);
}

#[tokio::test]
async fn test_translate_sameSourceAndTarget_shouldSkipProviders() {
    let provider = ScriptedProvider::answering("scripted");
    let cascade = cascade_of(vec![provider.clone() as Arc<dyn TranslationProvider>], 3);
    let orchestrator = SegmentOrchestrator::new(cascade).with_tonal(TonalAdapter::new());
    let segment = Segment::new("s1", "bawo ni", "yor", "yo", "general");

    let result = orchestrator.translate(&segment).await.unwrap();

    assert_eq!(result.text, "bawo ni");
    assert!(result.attempts.is_empty());
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_translate_withSlowProvider_shouldHonourSegmentTimeout() {
    let provider = MockProvider::slow(2_000);
    let cascade = cascade_of(vec![Arc::new(provider) as Arc<dyn TranslationProvider>], 3);
    let orchestrator = SegmentOrchestrator::new(cascade).with_segment_timeout(Some(Duration::from_millis(50)));

    let failure = orchestrator
        .translate(&Segment::new("s1", "slow text", "en", "fr", "general"))
        .await
        .unwrap_err();

    assert_eq!(failure.id, "s1");
    assert!(matches!(failure.error, TranslationError::SegmentTimeout));
    assert!(!failure.error.is_user_visible());
}

#[tokio::test]
async fn test_translate_withDroppedPlaceholders_shouldDegradeAndRetryLater() {
    let provider = MockProvider::new(wikitranslate::providers::mock::MockBehavior::DropPlaceholders);
    let counter = provider.clone();
    let cascade = cascade_of(vec![Arc::new(provider) as Arc<dyn TranslationProvider>], 3);
    let orchestrator = SegmentOrchestrator::new(cascade)
        .with_glossary(technical_glossary())
        .with_cache(TranslationCache::memory_only(16, 3600));

    let first = orchestrator.translate(&cpu_segment()).await.unwrap();
    let second = orchestrator.translate(&cpu_segment()).await.unwrap();

    assert!(first.degraded);
    assert!(!first.text.contains("TERM"));
    assert!(!second.cache_hit);
    assert_eq!(counter.request_count(), 2);
}
