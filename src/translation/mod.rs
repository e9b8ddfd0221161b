/*!
 * Segment translation core.
 *
 * It is split into several submodules:
 *
 * - `segment`: Segments, attempt records and per-segment results
 * - `glossary`: Terminology store, versioned glossary snapshots and term matching
 * - `protection`: Placeholder codec keeping glossary terms out of provider hands
 * - `pivot`: Quality matrix and path selection through intermediate languages
 * - `cascade`: Retry policy and provider fallthrough
 * - `orthography`: Per-language spelling rules applied to provider output
 * - `tonal`: Tone lexicons and sandhi rules for tonal target languages
 * - `cache`: Two-tier translation cache with single-flight computation
 * - `orchestrator`: The per-segment pipeline and the batch runner
 * - `cancel`: Cooperative cancellation shared by a batch
 */

// Re-export main types for easier usage
pub use self::cache::{CacheEntry, CacheStats, TranslationCache};
pub use self::cancel::CancellationSignal;
pub use self::cascade::{ProviderCascade, RetryPolicy};
pub use self::glossary::{GlossaryEntry, GlossaryMatcher, InMemoryTerminologyStore, SqliteTerminologyStore, TerminologyStore};
pub use self::orchestrator::SegmentOrchestrator;
pub use self::orthography::OrthographicAdapter;
pub use self::pivot::{PivotPath, PivotRouter, QualityMatrix};
pub use self::segment::{Segment, SegmentFailure, SegmentResult, TranslatedSegment, TranslationAttempt};
pub use self::tonal::TonalAdapter;

// Submodules
pub mod cache;
pub mod cancel;
pub mod cascade;
pub mod glossary;
pub mod orchestrator;
pub mod orthography;
pub mod pivot;
pub mod protection;
pub mod segment;
pub mod tonal;
