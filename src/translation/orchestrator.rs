/*!
 * Per-segment translation pipeline and the batch runner around it.
 *
 * One segment goes: cache lookup, glossary match, protect, route, cascade,
 * spelling, restore, tone marks, cache write. A batch fans segments out over a bounded
 * pool of tokio tasks and puts each result back into its input slot.
 */

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use log::{debug, error, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::app_config::Config;
use crate::database::{DatabaseConnection, Repository};
use crate::errors::{BatchCancelled, TranslationError};
use crate::providers::build_providers;
use crate::translation::cache::{CacheTier, ComputeOutcome, MemoryTier, SqliteTier, TranslationCache, fingerprint};
use crate::translation::cancel::CancellationSignal;
use crate::translation::cascade::{ProviderCascade, RetryPolicy};
use crate::translation::glossary::{GlossaryIndex, GlossaryMatcher, SqliteTerminologyStore};
use crate::translation::orthography::{ORTHOGRAPHY_SUBDIR, OrthographicAdapter};
use crate::translation::pivot::{PivotRouter, QualityMatrix};
use crate::translation::protection::{describe, protect, restore};
use crate::translation::segment::{Segment, SegmentFailure, SegmentResult, TranslatedSegment, TranslationAttempt, truncate_text};
use crate::translation::tonal::TonalAdapter;

/// Version folded into the fingerprint when no glossary could be loaded
const NO_GLOSSARY_VERSION: u64 = 0;

/// Translates segments; cheap to clone, clones share every component
#[derive(Debug, Clone)]
pub struct SegmentOrchestrator {
    glossary: Arc<GlossaryMatcher>,
    router: Arc<PivotRouter>,
    cascade: Arc<ProviderCascade>,
    orthography: Arc<OrthographicAdapter>,
    tonal: Arc<TonalAdapter>,
    cache: TranslationCache,
    max_concurrent_segments: usize,
    segment_timeout: Option<Duration>,
}

impl SegmentOrchestrator {
    /// Orchestrator over `cascade` with an empty glossary, default routing,
    /// built-in tone tables and no cache
    pub fn new(cascade: ProviderCascade) -> Self {
        Self {
            glossary: Arc::new(GlossaryMatcher::empty()),
            router: Arc::new(PivotRouter::default()),
            cascade: Arc::new(cascade),
            orthography: Arc::new(OrthographicAdapter::with_builtin_tables()),
            tonal: Arc::new(TonalAdapter::with_builtin_tables()),
            cache: TranslationCache::disabled(),
            max_concurrent_segments: 4,
            segment_timeout: None,
        }
    }

    /// Build everything from configuration, opening the SQLite database it names
    pub fn from_config(config: &Config) -> Result<Self> {
        let db = match &config.cache.database_path {
            Some(path) => DatabaseConnection::new(path)?,
            None => DatabaseConnection::new_default()?,
        };
        Self::from_config_with_repository(config, Repository::new(db))
    }

    /// Build from configuration over an already open repository
    pub fn from_config_with_repository(config: &Config, repo: Repository) -> Result<Self> {
        let t = &config.translation;
        let providers = build_providers(t)?;
        let cascade = ProviderCascade::new(
            providers,
            RetryPolicy::from_config(t),
            Duration::from_secs(t.attempt_timeout_secs.max(1)),
        );

        let matrix = match &config.pivot.quality_matrix_path {
            Some(path) => QualityMatrix::from_file(path)?,
            None => QualityMatrix::default(),
        };
        let router = PivotRouter::new(
            matrix,
            config.pivot.pivot_penalty,
            config.pivot.min_viable_score,
            config.pivot.max_pivots,
        );

        let mut tonal = TonalAdapter::with_builtin_tables();
        let mut orthography = OrthographicAdapter::with_builtin_tables();
        if let Some(dir) = &config.tonal.data_dir {
            let loaded = tonal.load_dir(dir)?;
            info!("Loaded {} tone table(s) from {}", loaded, dir.display());
            let spelling_dir = dir.join(ORTHOGRAPHY_SUBDIR);
            if spelling_dir.is_dir() {
                let loaded = orthography.load_dir(&spelling_dir)?;
                info!("Loaded {} orthography table(s) from {}", loaded, spelling_dir.display());
            }
        }

        let cache = if config.cache.enabled {
            let mut tiers: Vec<Arc<dyn CacheTier>> = vec![Arc::new(MemoryTier::new(config.cache.fast_tier_capacity))];
            if config.cache.durable {
                tiers.push(Arc::new(SqliteTier::new(repo.clone())));
            }
            TranslationCache::new(tiers, config.cache.cache_ttl_seconds)
        } else {
            TranslationCache::disabled()
        };

        let glossary = GlossaryMatcher::new(Arc::new(SqliteTerminologyStore::new(repo)));
        let segment_timeout = (t.segment_timeout_secs > 0).then(|| Duration::from_secs(t.segment_timeout_secs));

        Ok(Self::new(cascade)
            .with_glossary(Arc::new(glossary))
            .with_router(router)
            .with_orthography(orthography)
            .with_tonal(tonal)
            .with_cache(cache)
            .with_max_concurrent_segments(t.max_concurrent_segments)
            .with_segment_timeout(segment_timeout))
    }

    pub fn with_glossary(mut self, glossary: Arc<GlossaryMatcher>) -> Self {
        self.glossary = glossary;
        self
    }

    pub fn with_router(mut self, router: PivotRouter) -> Self {
        self.router = Arc::new(router);
        self
    }

    pub fn with_orthography(mut self, orthography: OrthographicAdapter) -> Self {
        self.orthography = Arc::new(orthography);
        self
    }

    pub fn with_tonal(mut self, tonal: TonalAdapter) -> Self {
        self.tonal = Arc::new(tonal);
        self
    }

    pub fn with_cache(mut self, cache: TranslationCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_max_concurrent_segments(mut self, max: usize) -> Self {
        self.max_concurrent_segments = max.max(1);
        self
    }

    pub fn with_segment_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.segment_timeout = timeout;
        self
    }

    pub fn glossary(&self) -> &GlossaryMatcher {
        &self.glossary
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub fn router(&self) -> &PivotRouter {
        &self.router
    }

    /// Translate one segment
    pub async fn translate(&self, segment: &Segment) -> SegmentResult {
        self.translate_with_cancel(segment, &CancellationSignal::new()).await
    }

    /// Translate one segment, giving up promptly once `cancel` fires
    pub async fn translate_with_cancel(&self, segment: &Segment, cancel: &CancellationSignal) -> SegmentResult {
        let deadline = self.segment_timeout.map(|timeout| Instant::now() + timeout);
        self.run_segment(segment, cancel, deadline).await
    }

    /// Translate every segment; results come back in input order
    pub async fn translate_batch(&self, segments: Vec<Segment>) -> Vec<SegmentResult> {
        match self.run_batch(segments, &CancellationSignal::new(), |_, _| {}).await {
            Ok(results) => results,
            Err(cancelled) => cancelled.partial,
        }
    }

    /// Translate every segment, stopping early when `cancel` fires
    pub async fn translate_batch_with_cancel(
        &self,
        segments: Vec<Segment>,
        cancel: &CancellationSignal,
    ) -> Result<Vec<SegmentResult>, BatchCancelled> {
        self.run_batch(segments, cancel, |_, _| {}).await
    }

    /// Like `translate_batch_with_cancel`, calling `progress(completed, total)` after each segment
    pub async fn translate_batch_with_progress<P>(
        &self,
        segments: Vec<Segment>,
        cancel: &CancellationSignal,
        progress: P,
    ) -> Result<Vec<SegmentResult>, BatchCancelled>
    where
        P: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.run_batch(segments, cancel, progress).await
    }

    async fn run_batch<P>(
        &self,
        segments: Vec<Segment>,
        cancel: &CancellationSignal,
        progress: P,
    ) -> Result<Vec<SegmentResult>, BatchCancelled>
    where
        P: Fn(usize, usize) + Send + Sync + 'static,
    {
        let total = segments.len();
        let ids: Vec<String> = segments.iter().map(|s| s.id.clone()).collect();

        let keys: BTreeSet<(String, String)> = segments
            .iter()
            .map(|s| {
                let canonical = s.canonical();
                (canonical.source_lang, canonical.domain_hint)
            })
            .collect();
        self.glossary.preload(&keys.into_iter().collect::<Vec<_>>()).await;

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_segments));
        let completed = Arc::new(AtomicUsize::new(0));
        let progress = Arc::new(progress);
        let mut tasks = JoinSet::new();

        for (index, segment) in segments.into_iter().enumerate() {
            let this = self.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let completed = completed.clone();
            let progress = progress.clone();

            tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };

                let result = match permit {
                    Some(_permit) => {
                        let deadline = this.segment_timeout.map(|timeout| Instant::now() + timeout);
                        this.run_segment(&segment, &cancel, deadline).await
                    }
                    None => Err(SegmentFailure::new(segment.id.clone(), TranslationError::Cancelled, Vec::new())),
                };

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                progress(done, total);
                (index, result)
            });
        }

        let mut slots: Vec<Option<SegmentResult>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!("Segment worker failed: {}", e),
            }
        }

        let results: Vec<SegmentResult> = slots
            .into_iter()
            .zip(ids)
            .map(|(slot, id)| {
                slot.unwrap_or_else(|| {
                    Err(SegmentFailure::new(
                        id,
                        TranslationError::Internal("segment worker panicked".to_string()),
                        Vec::new(),
                    ))
                })
            })
            .collect();

        let failed = results.iter().filter(|r| r.is_err()).count();
        if cancel.is_cancelled() {
            let cancelled = BatchCancelled { partial: results };
            warn!("{}", cancelled);
            return Err(cancelled);
        }

        info!("Batch finished: {} translated, {} failed", total - failed, failed);
        debug!("Cache: {}", self.cache.stats());
        Ok(results)
    }

    async fn run_segment(&self, segment: &Segment, cancel: &CancellationSignal, deadline: Option<Instant>) -> SegmentResult {
        let segment = segment.canonical();

        if cancel.is_cancelled() {
            return Err(SegmentFailure::new(segment.id, TranslationError::Cancelled, Vec::new()));
        }

        if segment.source_text.trim().is_empty() {
            return Ok(TranslatedSegment {
                id: segment.id,
                text: segment.source_text,
                attempts: Vec::new(),
                cache_hit: false,
                degraded: false,
            });
        }

        let index = self.glossary.snapshot(&segment.source_lang, &segment.domain_hint).await;
        let version = index.as_ref().map_or(NO_GLOSSARY_VERSION, |index| index.content_version());
        let key = fingerprint(&segment, version);

        let mut attempts = Vec::new();
        let lookup = {
            let (seg, index, recorded) = (&segment, index.as_deref(), &mut attempts);
            self.cache
                .get_or_compute(&key, move || self.compute(seg, index, cancel, deadline, recorded))
                .await
        };

        match lookup {
            Ok(lookup) => {
                let cache_hit = lookup.source.is_hit();
                if cache_hit {
                    debug!("Segment '{}' served from cache ({:?})", segment.id, lookup.source);
                }
                Ok(TranslatedSegment {
                    id: segment.id,
                    text: lookup.entry.translated_text,
                    attempts: if cache_hit { Vec::new() } else { attempts },
                    cache_hit,
                    degraded: !lookup.storable,
                })
            }
            Err(error) => {
                match &error {
                    TranslationError::Cancelled => debug!("Segment '{}' cancelled", segment.id),
                    // The cascade has already reported it
                    TranslationError::AllProvidersExhausted { .. } => {}
                    other => error!("Segment '{}' failed: {}", segment.id, other),
                }
                Err(SegmentFailure::new(segment.id, error, attempts))
            }
        }
    }

    async fn compute(
        &self,
        segment: &Segment,
        index: Option<&GlossaryIndex>,
        cancel: &CancellationSignal,
        deadline: Option<Instant>,
        attempts: &mut Vec<TranslationAttempt>,
    ) -> Result<ComputeOutcome, TranslationError> {
        let matches = index
            .map(|index| index.find(&segment.source_text, &segment.target_lang))
            .unwrap_or_default();
        let (protected, mapping) = protect(&segment.source_text, &matches).into_parts();
        if !mapping.is_empty() {
            debug!("Segment '{}' protected: {}", segment.id, describe(&mapping));
        }

        let translated = self.run_cascade(segment, &protected, cancel, deadline, attempts).await?;
        // Spelled before restore so glossary targets keep their own spelling
        let translated = self.orthography.apply(&translated, &segment.target_lang);

        let (restored, storable) = match restore(&translated, mapping) {
            Ok(text) => (text, true),
            Err(mismatch) => {
                let degraded = mismatch.degraded.clone();
                warn!(
                    "Segment '{}': {}; using '{}'",
                    segment.id,
                    TranslationError::from(mismatch),
                    truncate_text(&degraded, 60)
                );
                (degraded, false)
            }
        };

        let text = self.tonal.apply_tones(&restored, &segment.target_lang);
        Ok(ComputeOutcome { text, storable })
    }

    /// Run the best path, then the next best once if every provider failed on it
    async fn run_cascade(
        &self,
        segment: &Segment,
        text: &str,
        cancel: &CancellationSignal,
        deadline: Option<Instant>,
        attempts: &mut Vec<TranslationAttempt>,
    ) -> Result<String, TranslationError> {
        let (source, target, domain) = (&segment.source_lang, &segment.target_lang, &segment.domain_hint);
        let path = self.router.select_path(source, target, domain);

        let failure = match self.cascade.execute(text, &path, cancel, deadline).await {
            Ok(output) => {
                attempts.extend(output.attempts);
                return Ok(output.text);
            }
            Err(failure) => failure,
        };
        attempts.extend(failure.attempts);

        if !matches!(failure.error, TranslationError::AllProvidersExhausted { .. }) {
            return Err(failure.error);
        }
        let Some(next) = self.router.next_best_path(source, target, domain, std::slice::from_ref(&path)) else {
            return Err(failure.error);
        };

        info!("Re-routing segment '{}' from {} to {}", segment.id, path, next);
        match self.cascade.execute(text, &next, cancel, deadline).await {
            Ok(output) => {
                attempts.extend(output.attempts);
                Ok(output.text)
            }
            Err(failure) => {
                attempts.extend(failure.attempts);
                Err(failure.error)
            }
        }
    }
}
