/*!
 * Glossary matching.
 *
 * A `GlossaryIndex` is an immutable, versioned trie over normalized source
 * terms for one `(source language, domain)` pair. The `GlossaryMatcher` hands
 * out shared snapshots of these indexes and rebuilds them from the
 * terminology store after `invalidate()`.
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::database::Repository;
use crate::language_utils::canonical_language_code;
use crate::translation::protection::placeholder_spans;
use crate::translation::segment::DEFAULT_DOMAIN;

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

/// A protected term and its fixed translation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub source_term: String,
    pub target_term: String,
    pub source_lang: String,
    pub target_lang: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default)]
    pub priority: i32,
}

impl GlossaryEntry {
    /// New entry in the general domain with priority 0
    pub fn new(
        source_term: impl Into<String>,
        target_term: impl Into<String>,
        source_lang: &str,
        target_lang: &str,
    ) -> Self {
        Self {
            source_term: source_term.into(),
            target_term: target_term.into(),
            source_lang: canonical_language_code(source_lang),
            target_lang: canonical_language_code(target_lang),
            domain: default_domain(),
            priority: 0,
        }
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        let domain = domain.trim().to_lowercase();
        self.domain = if domain.is_empty() { default_domain() } else { domain };
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Same entry with canonical language codes and domain
    pub fn canonical(mut self) -> Self {
        self.source_lang = canonical_language_code(&self.source_lang);
        self.target_lang = canonical_language_code(&self.target_lang);
        let domain = self.domain.clone();
        self.with_domain(&domain)
    }
}

/// A matched term: half-open char span in the original text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub start: usize,
    pub end: usize,
    pub entry: Arc<GlossaryEntry>,
}

impl Match {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    fn overlaps(&self, other: &Match) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Read-only source of glossary entries
#[async_trait]
pub trait TerminologyStore: Send + Sync {
    /// Entries whose source language and domain match exactly
    async fn lookup_terms(&self, lang: &str, domain: &str) -> Result<Vec<GlossaryEntry>>;

    /// Insert or update an entry, keeping the higher priority
    async fn add_entry(&self, entry: GlossaryEntry) -> Result<()>;
}

/// Terminology store backed by a vector, for tests and dry runs
#[derive(Debug, Default)]
pub struct InMemoryTerminologyStore {
    entries: RwLock<Vec<GlossaryEntry>>,
}

impl InMemoryTerminologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = GlossaryEntry>) -> Self {
        let store = Self::new();
        for entry in entries {
            store.upsert(entry);
        }
        store
    }

    fn upsert(&self, entry: GlossaryEntry) {
        let entry = entry.canonical();
        let mut entries = self.entries.write();
        let existing = entries.iter_mut().find(|e| {
            e.source_term == entry.source_term
                && e.source_lang == entry.source_lang
                && e.target_lang == entry.target_lang
                && e.domain == entry.domain
        });
        match existing {
            Some(e) => {
                e.target_term = entry.target_term;
                e.priority = e.priority.max(entry.priority);
            }
            None => entries.push(entry),
        }
    }
}

#[async_trait]
impl TerminologyStore for InMemoryTerminologyStore {
    async fn lookup_terms(&self, lang: &str, domain: &str) -> Result<Vec<GlossaryEntry>> {
        let lang = canonical_language_code(lang);
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|e| e.source_lang == lang && e.domain == domain)
            .cloned()
            .collect())
    }

    async fn add_entry(&self, entry: GlossaryEntry) -> Result<()> {
        self.upsert(entry);
        Ok(())
    }
}

/// Terminology store over the `glossary_entries` table
#[derive(Debug, Clone)]
pub struct SqliteTerminologyStore {
    repo: Repository,
}

impl SqliteTerminologyStore {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Every entry, optionally for one source language
    pub async fn list(&self, lang: Option<&str>) -> Result<Vec<GlossaryEntry>> {
        let lang = lang.map(canonical_language_code);
        self.repo.list_glossary_entries(lang).await
    }
}

#[async_trait]
impl TerminologyStore for SqliteTerminologyStore {
    async fn lookup_terms(&self, lang: &str, domain: &str) -> Result<Vec<GlossaryEntry>> {
        self.repo
            .lookup_glossary_terms(canonical_language_code(lang), domain.to_string())
            .await
    }

    async fn add_entry(&self, entry: GlossaryEntry) -> Result<()> {
        self.repo.upsert_glossary_entry(entry.canonical()).await
    }
}

/// Per-language text normalization applied to both terms and segment text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizationRule {
    pub fold_case: bool,
    pub strip_diacritics: bool,
}

impl NormalizationRule {
    pub fn for_language(lang: &str) -> Self {
        Self {
            fold_case: true,
            strip_diacritics: lang == "en",
        }
    }
}

fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036F}').contains(&c)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || is_combining_mark(c)
}

/// Base letter of a precomposed Latin-1 accented letter
fn fold_latin1(c: char) -> char {
    match c {
        'À'..='Å' => 'A',
        'à'..='å' => 'a',
        'Ç' => 'C',
        'ç' => 'c',
        'È'..='Ë' => 'E',
        'è'..='ë' => 'e',
        'Ì'..='Ï' => 'I',
        'ì'..='ï' => 'i',
        'Ñ' => 'N',
        'ñ' => 'n',
        'Ò'..='Ö' | 'Ø' => 'O',
        'ò'..='ö' | 'ø' => 'o',
        'Ù'..='Ü' => 'U',
        'ù'..='ü' => 'u',
        'Ý' => 'Y',
        'ý' | 'ÿ' => 'y',
        _ => c,
    }
}

/// Normalized characters plus the original char offset each one came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    pub chars: Vec<char>,
    pub origin: Vec<usize>,
    original_len: usize,
}

impl NormalizedText {
    pub fn new(text: &str, rule: NormalizationRule) -> Self {
        let mut chars = Vec::with_capacity(text.len());
        let mut origin = Vec::with_capacity(text.len());
        let mut original_len = 0;

        for (offset, c) in text.chars().enumerate() {
            original_len = offset + 1;
            if is_combining_mark(c) {
                continue;
            }
            let base = if rule.strip_diacritics { fold_latin1(c) } else { c };
            if rule.fold_case {
                for lower in base.to_lowercase() {
                    chars.push(lower);
                    origin.push(offset);
                }
            } else {
                chars.push(base);
                origin.push(offset);
            }
        }

        Self {
            chars,
            origin,
            original_len,
        }
    }

    pub fn as_string(&self) -> String {
        self.chars.iter().collect()
    }

    /// Whether a normalized offset sits between two original characters
    fn is_char_boundary(&self, index: usize) -> bool {
        index == 0 || index >= self.chars.len() || self.origin[index] != self.origin[index - 1]
    }

    /// Map a normalized span back to original char offsets, keeping trailing marks
    fn original_span(&self, start: usize, end: usize) -> (usize, usize) {
        let original_start = self.origin[start];
        let original_end = if end < self.origin.len() {
            self.origin[end]
        } else {
            self.original_len
        };
        (original_start, original_end)
    }
}

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<char, usize>,
    terminals: Vec<usize>,
}

/// Immutable prefix trie over the normalized source terms of one snapshot
#[derive(Debug)]
pub struct GlossaryIndex {
    version: u64,
    content_version: u64,
    source_lang: String,
    domain: String,
    rule: NormalizationRule,
    nodes: Vec<TrieNode>,
    entries: Vec<Arc<GlossaryEntry>>,
}

impl GlossaryIndex {
    /// Build an index for `source_lang`/`domain` from domain and general entries.
    ///
    /// Entries colliding on `(normalized source term, source lang, target lang)` are
    /// deduplicated: higher priority wins, then the domain-specific entry.
    pub fn build(source_lang: &str, domain: &str, entries: Vec<GlossaryEntry>, version: u64) -> Self {
        let source_lang = canonical_language_code(source_lang);
        let rule = NormalizationRule::for_language(&source_lang);

        let mut chosen: HashMap<(String, String), GlossaryEntry> = HashMap::new();
        let mut order: Vec<(String, String)> = Vec::new();
        for entry in entries.into_iter().map(GlossaryEntry::canonical) {
            if entry.source_lang != source_lang {
                continue;
            }
            let key_term = NormalizedText::new(&entry.source_term, rule).as_string();
            if key_term.trim().is_empty() {
                continue;
            }
            let key = (key_term, entry.target_lang.clone());
            match chosen.get(&key) {
                Some(current) if !Self::prefers(&entry, current, domain) => {}
                Some(_) => {
                    chosen.insert(key, entry);
                }
                None => {
                    order.push(key.clone());
                    chosen.insert(key, entry);
                }
            }
        }

        let mut index = Self {
            version,
            content_version: 0,
            source_lang,
            domain: domain.to_string(),
            rule,
            nodes: vec![TrieNode::default()],
            entries: Vec::with_capacity(order.len()),
        };
        for key in order {
            if let Some(entry) = chosen.remove(&key) {
                index.insert(&key.0, entry);
            }
        }
        index.content_version = index.digest_entries();
        index
    }

    /// Order-independent digest of the chosen entries, never 0
    fn digest_entries(&self) -> u64 {
        let mut lines: Vec<String> = self
            .entries
            .iter()
            .map(|e| {
                format!(
                    "{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}",
                    e.source_term, e.target_term, e.target_lang, e.domain, e.priority
                )
            })
            .collect();
        lines.sort();

        let mut hasher = Sha256::new();
        hasher.update(self.source_lang.as_bytes());
        hasher.update(self.domain.as_bytes());
        for line in &lines {
            hasher.update((line.len() as u64).to_le_bytes());
            hasher.update(line.as_bytes());
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(bytes).max(1)
    }

    fn prefers(candidate: &GlossaryEntry, current: &GlossaryEntry, domain: &str) -> bool {
        if candidate.priority != current.priority {
            return candidate.priority > current.priority;
        }
        candidate.domain == domain && current.domain != domain
    }

    fn insert(&mut self, normalized_term: &str, entry: GlossaryEntry) {
        let mut node = 0;
        for c in normalized_term.chars() {
            node = match self.nodes[node].children.get(&c) {
                Some(&child) => child,
                None => {
                    self.nodes.push(TrieNode::default());
                    let child = self.nodes.len() - 1;
                    self.nodes[node].children.insert(c, child);
                    child
                }
            };
        }
        self.entries.push(Arc::new(entry));
        let entry_index = self.entries.len() - 1;
        self.nodes[node].terminals.push(entry_index);
    }

    /// Snapshot generation within this process
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Version of the indexed terms themselves; stable across processes, so it
    /// is what cache fingerprints fold in
    pub fn content_version(&self) -> u64 {
        self.content_version
    }

    pub fn source_lang(&self) -> &str {
        &self.source_lang
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Non-overlapping matches for `target_lang`, sorted by start offset
    pub fn find(&self, text: &str, target_lang: &str) -> Vec<Match> {
        if self.entries.is_empty() || text.is_empty() {
            return Vec::new();
        }
        let target_lang = canonical_language_code(target_lang);
        let normalized = NormalizedText::new(text, self.rule);
        let chars = &normalized.chars;
        let reserved = placeholder_spans(text);
        let mut candidates = Vec::new();

        for start in 0..chars.len() {
            if !normalized.is_char_boundary(start) {
                continue;
            }
            let starts_word = is_word_char(chars[start]);
            if starts_word && start > 0 && is_word_char(chars[start - 1]) {
                continue;
            }

            let mut node = 0;
            for (offset, c) in chars[start..].iter().enumerate() {
                let Some(&child) = self.nodes[node].children.get(c) else {
                    break;
                };
                node = child;
                let end = start + offset + 1;
                if self.nodes[node].terminals.is_empty() || !normalized.is_char_boundary(end) {
                    continue;
                }
                let ends_word = is_word_char(chars[end - 1]);
                if ends_word && end < chars.len() && is_word_char(chars[end]) {
                    continue;
                }

                let (orig_start, orig_end) = normalized.original_span(start, end);
                if reserved.iter().any(|&(s, e)| orig_start < e && s < orig_end) {
                    continue;
                }
                for &entry_index in &self.nodes[node].terminals {
                    let entry = &self.entries[entry_index];
                    if entry.target_lang == target_lang {
                        candidates.push(Match {
                            start: orig_start,
                            end: orig_end,
                            entry: Arc::clone(entry),
                        });
                    }
                }
            }
        }

        resolve_overlaps(candidates)
    }
}

/// Longest span first, then higher priority, then earliest start
pub fn resolve_overlaps(mut candidates: Vec<Match>) -> Vec<Match> {
    candidates.sort_by(|a, b| {
        b.len()
            .cmp(&a.len())
            .then_with(|| b.entry.priority.cmp(&a.entry.priority))
            .then_with(|| a.start.cmp(&b.start))
    });

    let mut accepted: Vec<Match> = Vec::new();
    for candidate in candidates {
        if accepted.iter().all(|m| !m.overlaps(&candidate)) {
            accepted.push(candidate);
        }
    }
    accepted.sort_by_key(|m| m.start);
    accepted
}

type SnapshotKey = (String, String);

/// Hands out versioned glossary snapshots built from a terminology store
pub struct GlossaryMatcher {
    store: Arc<dyn TerminologyStore>,
    snapshots: RwLock<HashMap<SnapshotKey, Arc<GlossaryIndex>>>,
    version: AtomicU64,
}

impl std::fmt::Debug for GlossaryMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlossaryMatcher")
            .field("snapshots", &self.snapshots.read().len())
            .field("version", &self.version.load(Ordering::SeqCst))
            .finish()
    }
}

impl GlossaryMatcher {
    pub fn new(store: Arc<dyn TerminologyStore>) -> Self {
        Self {
            store,
            snapshots: RwLock::new(HashMap::new()),
            version: AtomicU64::new(1),
        }
    }

    /// Matcher over an empty in-memory store
    pub fn empty() -> Self {
        Self::new(Arc::new(InMemoryTerminologyStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn TerminologyStore> {
        &self.store
    }

    /// Current global index version
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Shared snapshot for `lang`/`domain`, or `None` if the store is unavailable
    pub async fn snapshot(&self, lang: &str, domain: &str) -> Option<Arc<GlossaryIndex>> {
        let key = (canonical_language_code(lang), domain.to_string());
        let cached = self.snapshots.read().get(&key).cloned();
        if cached.is_some() {
            return cached;
        }

        let version = self.version();
        let entries = match self.load_entries(&key.0, &key.1).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Terminology store unavailable for {}/{}: {:#}", key.0, key.1, e);
                return None;
            }
        };
        let index = Arc::new(GlossaryIndex::build(&key.0, &key.1, entries, version));
        debug!(
            "Built glossary index v{} for {}/{} with {} term(s)",
            version,
            key.0,
            key.1,
            index.len()
        );

        let mut snapshots = self.snapshots.write();
        if self.version() != version {
            // Invalidated while building; serve it once without memoizing
            return Some(index);
        }
        Some(Arc::clone(snapshots.entry(key).or_insert(index)))
    }

    async fn load_entries(&self, lang: &str, domain: &str) -> Result<Vec<GlossaryEntry>> {
        let mut entries = self.store.lookup_terms(lang, domain).await?;
        if domain != DEFAULT_DOMAIN {
            entries.extend(self.store.lookup_terms(lang, DEFAULT_DOMAIN).await?);
        }
        Ok(entries)
    }

    /// Matches in `text` for one segment; empty when no glossary is available
    pub async fn find(&self, text: &str, source_lang: &str, target_lang: &str, domain: &str) -> Vec<Match> {
        match self.snapshot(source_lang, domain).await {
            Some(index) => index.find(text, target_lang),
            None => Vec::new(),
        }
    }

    /// Drop every snapshot; the next access rebuilds under a new version
    pub fn invalidate(&self) {
        let mut snapshots = self.snapshots.write();
        snapshots.clear();
        let next = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Glossary snapshots invalidated, now at version {}", next);
    }

    /// Build snapshots ahead of a batch
    pub async fn preload(&self, keys: &[(String, String)]) {
        join_all(keys.iter().map(|(lang, domain)| self.snapshot(lang, domain))).await;
    }
}
