/*!
 * Tests for the provider cascade, driven by scripted providers
 */

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use wikitranslate::errors::{ProviderErrorKind, TranslationError};
use wikitranslate::providers::TranslationProvider;
use wikitranslate::providers::libretranslate::LibreTranslate;
use wikitranslate::translation::segment::AttemptState;
use wikitranslate::translation::{CancellationSignal, PivotPath, RetryPolicy};

use crate::common::mock_providers::{ScriptedProvider, Step};
use crate::common::{self, cascade_of};

fn en_fr() -> PivotPath {
    PivotPath::direct("en", "fr", 0.95)
}

#[tokio::test]
async fn test_execute_withTwoTimeoutsAndThreeAttempts_shouldNeverReachSecondProvider() {
    common::init_logging();
    let a = ScriptedProvider::failing_first("a", 2, ProviderErrorKind::Timeout);
    let b = ScriptedProvider::answering("b");
    let cascade = cascade_of(vec![a.clone() as Arc<dyn TranslationProvider>, b.clone()], 3);

    let output = cascade
        .execute("hello", &en_fr(), &CancellationSignal::new(), None)
        .await
        .unwrap();

    assert_eq!(output.text, "[fr] hello");
    assert_eq!(a.call_count(), 3);
    assert_eq!(b.call_count(), 0);

    let states: Vec<AttemptState> = output.attempts.iter().map(|a| a.status()).collect();
    assert_eq!(
        states,
        vec![
            AttemptState::RetryableFailure,
            AttemptState::RetryableFailure,
            AttemptState::Succeeded
        ]
    );
    let numbers: Vec<u32> = output.attempts.iter().map(|a| a.attempt()).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_execute_withAuthError_shouldSkipRetriesAndUseNextProvider() {
    let a = ScriptedProvider::new("a", &[Step::Fail(ProviderErrorKind::AuthError)]);
    let b = ScriptedProvider::answering("b");
    let cascade = cascade_of(vec![a.clone() as Arc<dyn TranslationProvider>, b.clone()], 3);

    let output = cascade
        .execute("hello", &en_fr(), &CancellationSignal::new(), None)
        .await
        .unwrap();

    assert_eq!(a.call_count(), 1);
    assert_eq!(b.call_count(), 1);
    assert_eq!(output.attempts.len(), 2);
    assert_eq!(output.attempts[0].provider(), "a");
    assert_eq!(output.attempts[0].status(), AttemptState::FatalFailure);
    assert_eq!(output.attempts[0].error_kind(), Some(ProviderErrorKind::AuthError));
    assert_eq!(output.attempts[1].provider(), "b");
    assert_eq!(output.attempts[1].status(), AttemptState::Succeeded);
}

#[tokio::test]
async fn test_execute_withRetriesExhausted_shouldFallThroughInPriorityOrder() {
    let a = ScriptedProvider::failing_first("a", 5, ProviderErrorKind::RateLimited);
    let b = ScriptedProvider::failing_first("b", 5, ProviderErrorKind::Unknown);
    let c = ScriptedProvider::answering("c");
    let cascade = cascade_of(
        vec![a.clone() as Arc<dyn TranslationProvider>, b.clone(), c.clone()],
        2,
    );

    let output = cascade
        .execute("hello", &en_fr(), &CancellationSignal::new(), None)
        .await
        .unwrap();

    assert_eq!(output.text, "[fr] hello");
    let providers: Vec<&str> = output.attempts.iter().map(|a| a.provider()).collect();
    assert_eq!(providers, vec!["a", "a", "b", "b", "c"]);
}

#[tokio::test]
async fn test_execute_overTwoHops_shouldFeedFirstOutputIntoSecondHop() {
    let a = ScriptedProvider::answering("a");
    let cascade = cascade_of(vec![a.clone() as Arc<dyn TranslationProvider>], 1);
    let path = PivotPath::through(&["en".to_string(), "fr".to_string(), "fon".to_string()], 0.615);

    let output = cascade
        .execute("hello", &path, &CancellationSignal::new(), None)
        .await
        .unwrap();

    assert_eq!(output.text, "[fon] [fr] hello");
    let calls = a.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!((calls[0].source_lang.as_str(), calls[0].target_lang.as_str()), ("en", "fr"));
    assert_eq!(calls[1].text, "[fr] hello");
    assert_eq!((calls[1].source_lang.as_str(), calls[1].target_lang.as_str()), ("fr", "fon"));
    assert!(output.attempts.iter().all(|a| a.pivot_path() == "en→fr→fon"));
}

#[tokio::test]
async fn test_execute_whenSecondHopFails_shouldNameThatHop() {
    let a = ScriptedProvider::new(
        "a",
        &[Step::Answer, Step::Fail(ProviderErrorKind::InvalidRequest)],
    );
    let cascade = cascade_of(vec![a as Arc<dyn TranslationProvider>], 3);
    let path = PivotPath::through(&["en".to_string(), "fr".to_string(), "fon".to_string()], 0.615);

    let failure = cascade
        .execute("hello", &path, &CancellationSignal::new(), None)
        .await
        .unwrap_err();

    match failure.error {
        TranslationError::AllProvidersExhausted { hop } => assert_eq!(hop, "fr→fon"),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(failure.attempts.len(), 2);
}

#[tokio::test]
async fn test_execute_withDeadlineDuringBackoff_shouldTimeOutSegment() {
    let a = ScriptedProvider::failing_first("a", 5, ProviderErrorKind::Timeout);
    let policy = wikitranslate::translation::RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(1))
        .without_jitter();
    let cascade = wikitranslate::translation::ProviderCascade::new(
        vec![a.clone() as Arc<dyn TranslationProvider>],
        policy,
        Duration::from_secs(5),
    );

    let deadline = Instant::now() + Duration::from_millis(200);
    let failure = cascade
        .execute("hello", &en_fr(), &CancellationSignal::new(), Some(deadline))
        .await
        .unwrap_err();

    assert!(matches!(failure.error, TranslationError::SegmentTimeout));
    assert_eq!(a.call_count(), 1);
}

#[test]
fn test_retryPolicyDelay_withJitter_shouldStayWithinHalfDelayAndCap() {
    let policy = RetryPolicy::new(8, Duration::from_millis(100), Duration::from_millis(1000));

    for attempt in 1..=8 {
        let base = policy.base_delay(attempt);
        let ceiling = (base + base / 2).min(Duration::from_millis(1000));
        for _ in 0..50 {
            let delay = policy.delay(attempt);
            assert!(delay >= base, "attempt {}: {:?} < {:?}", attempt, delay, base);
            assert!(delay <= ceiling, "attempt {}: {:?} > {:?}", attempt, delay, ceiling);
        }
    }
    assert_eq!(policy.base_delay(8), Duration::from_millis(1000));
    assert_eq!(policy.delay(8), Duration::from_millis(1000));
}

#[tokio::test]
async fn test_execute_withUnbuildableEndpoint_shouldFailFastAndFallThrough() {
    let broken: Arc<dyn TranslationProvider> = Arc::new(LibreTranslate::new("lt", "bad host:5000", None, 2));
    let b = ScriptedProvider::answering("b");
    let cascade = cascade_of(vec![broken, b.clone()], 3);

    let output = cascade
        .execute("hello", &en_fr(), &CancellationSignal::new(), None)
        .await
        .unwrap();

    assert_eq!(output.text, "[fr] hello");
    assert_eq!(output.attempts.len(), 2);
    assert_eq!(output.attempts[0].provider(), "lt");
    assert_eq!(output.attempts[0].status(), AttemptState::FatalFailure);
    assert_eq!(output.attempts[0].error_kind(), Some(ProviderErrorKind::InvalidRequest));
    assert_eq!(b.call_count(), 1);
}
