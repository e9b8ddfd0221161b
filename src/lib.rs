/*!
 * # wikitranslate - segment translation orchestration
 *
 * A Rust library that turns cleaned, sentence-segmented text into translated
 * segments, with special care for low-resource tonal languages.
 *
 * ## Features
 *
 * - Glossary terms protected behind placeholders and restored verbatim
 * - Pivot routing through intermediate languages when a direct pair is weak
 * - Provider cascade with per-provider retries and exponential backoff:
 *   - OpenAI API
 *   - LibreTranslate
 *   - Ollama (local LLM)
 * - Tone marks for Yoruba, Fon, Ewe and Dindi from lexicons and sandhi rules
 * - In-memory and SQLite cache tiers keyed by a content fingerprint
 * - Bounded concurrent batches that keep input order and honour cancellation
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `translation`: The orchestration core:
 *   - `translation::orchestrator`: Per-segment pipeline and batch runner
 *   - `translation::glossary`: Terminology matching
 *   - `translation::protection`: Placeholder codec
 *   - `translation::pivot`: Path selection
 *   - `translation::cascade`: Provider fallthrough
 *   - `translation::tonal`: Tone adaptation
 *   - `translation::cache`: Translation caching
 * - `database`: SQLite persistence for the glossary and the cache
 * - `language_utils`: ISO language code utilities
 * - `providers`: Client implementations for the translation back-ends
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod database;
pub mod errors;
pub mod language_utils;
pub mod providers;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use errors::{AppError, BatchCancelled, ProviderError, TranslationError};
pub use language_utils::{canonical_language_code, language_codes_match, language_display_name};
pub use translation::{CancellationSignal, Segment, SegmentOrchestrator, SegmentResult, TranslatedSegment};
