/*!
 * Pivot routing over a static quality matrix.
 *
 * A path scores the product of its hop scores minus a fixed penalty per pivot
 * language. The router ranks every direct, one-pivot and two-pivot path and
 * hands the orchestrator the best one, plus the next best after a failure.
 */

use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::errors::TranslationError;
use crate::language_utils::canonical_language_code;
use crate::translation::segment::LanguagePair;

type ScoreTable = HashMap<String, HashMap<String, f64>>;

/// Ordered hops from source to target with the path's score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotPath {
    hops: Vec<LanguagePair>,
    score: f64,
}

impl PivotPath {
    /// Path through `languages`, source first and target last
    pub fn through(languages: &[String], score: f64) -> Self {
        let hops = languages
            .windows(2)
            .map(|w| LanguagePair::new(w[0].clone(), w[1].clone()))
            .collect();
        Self { hops, score }
    }

    pub fn direct(source: &str, target: &str, score: f64) -> Self {
        Self {
            hops: vec![LanguagePair::new(source, target)],
            score,
        }
    }

    /// Path for a segment whose source and target language agree
    pub fn empty() -> Self {
        Self {
            hops: Vec::new(),
            score: 1.0,
        }
    }

    pub fn hops(&self) -> &[LanguagePair] {
        &self.hops
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn is_direct(&self) -> bool {
        self.hops.len() == 1
    }

    pub fn pivot_count(&self) -> usize {
        self.hops.len().saturating_sub(1)
    }

    /// Every language visited, source first
    pub fn languages(&self) -> Vec<&str> {
        let mut langs: Vec<&str> = self.hops.iter().map(|h| h.source.as_str()).collect();
        if let Some(last) = self.hops.last() {
            langs.push(&last.target);
        }
        langs
    }

    /// Display label such as `en→fr→fon`
    pub fn label(&self) -> String {
        self.languages().join("→")
    }

    fn same_route(&self, other: &PivotPath) -> bool {
        self.hops == other.hops
    }
}

impl fmt::Display for PivotPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.3})", self.label(), self.score)
    }
}

/// Pair scores in [0, 1], with optional per-domain overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMatrix {
    /// Languages that may serve as intermediates
    pub pivots: Vec<String>,
    /// `pairs[source][target]`
    #[serde(default)]
    pub pairs: ScoreTable,
    /// `domains[domain][source][target]`, consulted before `pairs`
    #[serde(default)]
    pub domains: HashMap<String, ScoreTable>,
}

impl Default for QualityMatrix {
    fn default() -> Self {
        let mut matrix = Self {
            pivots: vec!["en".to_string(), "fr".to_string()],
            pairs: HashMap::new(),
            domains: HashMap::new(),
        };
        matrix.set("en", "fr", 0.95);
        matrix.set("fr", "en", 0.95);
        matrix.set("en", "fon", 0.3);
        matrix.set("fr", "fon", 0.7);
        matrix.set("en", "yor", 0.4);
        matrix.set("fr", "yor", 0.3);
        matrix.set("en", "ewe", 0.3);
        matrix.set("fr", "ewe", 0.6);
        matrix.set("en", "dindi", 0.2);
        matrix.set("fr", "dindi", 0.5);
        matrix
    }
}

fn canonical_table(table: ScoreTable) -> ScoreTable {
    let mut out: ScoreTable = HashMap::new();
    for (source, targets) in table {
        let row = out.entry(canonical_language_code(&source)).or_default();
        for (target, score) in targets {
            row.insert(canonical_language_code(&target), score.clamp(0.0, 1.0));
        }
    }
    out
}

impl QualityMatrix {
    /// Matrix with no scores and the given pivots
    pub fn new(pivots: &[&str]) -> Self {
        Self {
            pivots: pivots.iter().map(|p| canonical_language_code(p)).collect(),
            pairs: HashMap::new(),
            domains: HashMap::new(),
        }
    }

    /// Load a JSON matrix and canonicalise its language keys
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read quality matrix {:?}", path))?;
        let matrix: QualityMatrix =
            serde_json::from_str(&content).with_context(|| format!("Invalid quality matrix {:?}", path))?;
        Ok(matrix.canonical())
    }

    pub fn canonical(self) -> Self {
        Self {
            pivots: self.pivots.iter().map(|p| canonical_language_code(p)).collect(),
            pairs: canonical_table(self.pairs),
            domains: self
                .domains
                .into_iter()
                .map(|(domain, table)| (domain.trim().to_lowercase(), canonical_table(table)))
                .collect(),
        }
    }

    pub fn set(&mut self, source: &str, target: &str, score: f64) {
        self.pairs
            .entry(canonical_language_code(source))
            .or_default()
            .insert(canonical_language_code(target), score.clamp(0.0, 1.0));
    }

    pub fn set_for_domain(&mut self, domain: &str, source: &str, target: &str, score: f64) {
        self.domains
            .entry(domain.trim().to_lowercase())
            .or_default()
            .entry(canonical_language_code(source))
            .or_default()
            .insert(canonical_language_code(target), score.clamp(0.0, 1.0));
    }

    /// Score of one hop; unknown pairs score 0
    pub fn score(&self, source: &str, target: &str, domain: &str) -> f64 {
        let lookup = |table: &ScoreTable| table.get(source).and_then(|row| row.get(target)).copied();
        self.domains
            .get(domain)
            .and_then(lookup)
            .or_else(|| lookup(&self.pairs))
            .unwrap_or(0.0)
    }
}

/// Chooses translation paths from a quality matrix
#[derive(Debug, Clone)]
pub struct PivotRouter {
    matrix: QualityMatrix,
    pivot_penalty: f64,
    min_viable_score: f64,
    max_pivots: usize,
}

impl Default for PivotRouter {
    fn default() -> Self {
        Self::new(QualityMatrix::default(), 0.05, 0.2, 2)
    }
}

/// Total-order key: quantized score descending, fewer hops, then label
fn rank_key(path: &PivotPath) -> (Reverse<i64>, usize, String) {
    let quantized = (path.score * 1e9).round() as i64;
    (Reverse(quantized), path.hops.len(), path.label())
}

impl PivotRouter {
    pub fn new(matrix: QualityMatrix, pivot_penalty: f64, min_viable_score: f64, max_pivots: usize) -> Self {
        Self {
            matrix: matrix.canonical(),
            pivot_penalty,
            min_viable_score,
            max_pivots: max_pivots.min(2),
        }
    }

    pub fn matrix(&self) -> &QualityMatrix {
        &self.matrix
    }

    fn path_score(&self, languages: &[String], domain: &str) -> f64 {
        let product: f64 = languages
            .windows(2)
            .map(|w| self.matrix.score(&w[0], &w[1], domain))
            .product();
        product - self.pivot_penalty * languages.len().saturating_sub(2) as f64
    }

    /// Every candidate path in preference order
    pub fn rank_paths(&self, source: &str, target: &str, domain: &str) -> Vec<PivotPath> {
        let source = canonical_language_code(source);
        let target = canonical_language_code(target);
        if source == target {
            return vec![PivotPath::empty()];
        }

        let pivots: Vec<&String> = self
            .matrix
            .pivots
            .iter()
            .filter(|p| **p != source && **p != target)
            .collect();

        let mut routes: Vec<Vec<String>> = vec![vec![source.clone(), target.clone()]];
        if self.max_pivots >= 1 {
            for p in &pivots {
                routes.push(vec![source.clone(), (*p).clone(), target.clone()]);
            }
        }
        if self.max_pivots >= 2 {
            for p1 in &pivots {
                for p2 in pivots.iter().filter(|p2| *p2 != p1) {
                    routes.push(vec![source.clone(), (*p1).clone(), (*p2).clone(), target.clone()]);
                }
            }
        }

        let mut paths: Vec<PivotPath> = routes
            .into_iter()
            .map(|langs| {
                let score = self.path_score(&langs, domain);
                PivotPath::through(&langs, score)
            })
            .collect();
        paths.sort_by_cached_key(rank_key);
        paths
    }

    /// Best path, or the direct path when nothing clears the viability threshold
    pub fn select_path(&self, source: &str, target: &str, domain: &str) -> PivotPath {
        let ranked = self.rank_paths(source, target, domain);
        let best = ranked.into_iter().next().unwrap_or_else(PivotPath::empty);
        if best.is_empty() || best.score >= self.min_viable_score {
            debug!("Selected path {} for domain '{}'", best, domain);
            return best;
        }

        let source = canonical_language_code(source);
        let target = canonical_language_code(target);
        let err = TranslationError::PathUnroutable {
            source_lang: source.clone(),
            target_lang: target.clone(),
            best_score: best.score,
        };
        warn!("{}; falling back to direct translation", err);
        let direct_score = self.matrix.score(&source, &target, domain);
        PivotPath::direct(&source, &target, direct_score)
    }

    /// Best viable path not among `tried`
    pub fn next_best_path(&self, source: &str, target: &str, domain: &str, tried: &[PivotPath]) -> Option<PivotPath> {
        self.rank_paths(source, target, domain)
            .into_iter()
            .filter(|p| !p.is_empty() && p.score >= self.min_viable_score)
            .find(|p| !tried.iter().any(|t| t.same_route(p)))
    }
}
