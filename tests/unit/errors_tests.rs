/*!
 * Tests for error classification
 */

use wikitranslate::errors::{BatchCancelled, ProviderError, ProviderErrorKind, TranslationError};
use wikitranslate::translation::{SegmentFailure, TranslatedSegment};

#[test]
fn test_fromStatus_shouldClassifyHttpStatuses() {
    let cases = [
        (401, ProviderErrorKind::AuthError),
        (403, ProviderErrorKind::AuthError),
        (400, ProviderErrorKind::InvalidRequest),
        (422, ProviderErrorKind::InvalidRequest),
        (429, ProviderErrorKind::RateLimited),
        (408, ProviderErrorKind::Timeout),
        (504, ProviderErrorKind::Timeout),
        (500, ProviderErrorKind::Unknown),
        (503, ProviderErrorKind::Unknown),
    ];
    for (status, kind) in cases {
        assert_eq!(ProviderError::from_status(status, "body").kind(), kind, "status {}", status);
    }
}

#[test]
fn test_isRetryable_shouldOnlyRetryTransientKinds() {
    assert!(ProviderErrorKind::Timeout.is_retryable());
    assert!(ProviderErrorKind::RateLimited.is_retryable());
    assert!(ProviderErrorKind::Unknown.is_retryable());
    assert!(!ProviderErrorKind::AuthError.is_retryable());
    assert!(!ProviderErrorKind::InvalidRequest.is_retryable());
}

#[test]
fn test_providerErrorNew_shouldRoundTripKind() {
    for kind in [
        ProviderErrorKind::Timeout,
        ProviderErrorKind::RateLimited,
        ProviderErrorKind::AuthError,
        ProviderErrorKind::InvalidRequest,
        ProviderErrorKind::Unknown,
    ] {
        assert_eq!(ProviderError::new(kind, "x").kind(), kind);
    }
}

#[test]
fn test_isUserVisible_shouldExposeOnlyHardFailures() {
    let exhausted = TranslationError::AllProvidersExhausted {
        hop: "en→fon".to_string(),
    };
    assert!(exhausted.is_user_visible());
    assert!(!TranslationError::Cancelled.is_user_visible());
    assert!(!TranslationError::SegmentTimeout.is_user_visible());
    assert!(!TranslationError::Internal("worker panicked".to_string()).is_user_visible());

    let transient = TranslationError::Transient {
        provider: "a".to_string(),
        error: ProviderError::Timeout("slow".to_string()),
    };
    assert!(!transient.is_user_visible());
}

#[test]
fn test_batchCancelled_shouldCountFinishedSegments() {
    let done = TranslatedSegment {
        id: "s0".to_string(),
        text: "ok".to_string(),
        attempts: Vec::new(),
        cache_hit: false,
        degraded: false,
    };
    let cancelled = BatchCancelled {
        partial: vec![
            Ok(done),
            Err(SegmentFailure::new("s1", TranslationError::Cancelled, Vec::new())),
        ],
    };

    assert_eq!(cancelled.translated_count(), 1);
    assert_eq!(cancelled.to_string(), "Batch cancelled with 1 of 2 segment(s) translated");
}
