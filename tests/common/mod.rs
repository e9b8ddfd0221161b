/*!
 * Common test utilities for the wikitranslate test suite
 */

use std::sync::{Arc, Once};
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;

use wikitranslate::database::{DatabaseConnection, Repository};
use wikitranslate::providers::TranslationProvider;
use wikitranslate::translation::{ProviderCascade, RetryPolicy, Segment};

// Re-export the mock providers module
pub mod mock_providers;

static LOGGER: Once = Once::new();

/// Route library logs to the test output; safe to call from every test
pub fn init_logging() {
    LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Repository backed by a SQLite file inside `dir`
pub fn create_file_repository(dir: &TempDir) -> Result<Repository> {
    let db = DatabaseConnection::new(dir.path().join("wikitranslate.db"))?;
    Ok(Repository::new(db))
}

/// Segment in the general domain
pub fn segment(id: &str, text: &str, source_lang: &str, target_lang: &str) -> Segment {
    Segment::new(id, text, source_lang, target_lang, "general")
}

/// Numbered English segments for batch tests
pub fn numbered_segments(count: usize, target_lang: &str) -> Vec<Segment> {
    (0..count)
        .map(|i| segment(&format!("s{}", i), &format!("line {}", i), "en", target_lang))
        .collect()
}

/// Retry policy with millisecond delays so tests stay fast
pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(4)).without_jitter()
}

/// Cascade over the given providers with `fast_policy`
pub fn cascade_of(providers: Vec<Arc<dyn TranslationProvider>>, max_attempts: u32) -> ProviderCascade {
    ProviderCascade::new(providers, fast_policy(max_attempts), Duration::from_secs(5))
}
