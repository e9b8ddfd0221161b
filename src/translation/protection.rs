/*!
 * Term protection codec.
 *
 * Protected terms are swapped for opaque tokens of the form
 * `__TERM_<nonce>_<index>_<check>__` before the text is sent to a provider,
 * and swapped back to the glossary's target terms afterwards.
 */

use std::collections::HashMap;
use std::fmt::Write as _;

use log::{debug, warn};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::errors::RestorationMismatch;
use crate::translation::glossary::Match;

/// Well-formed placeholder tokens, case-insensitive so mangled casing is still found
static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)__TERM_([0-9a-f]{6})_(\d+)_([0-9a-f]{2})__").expect("valid placeholder regex"));

/// Partial tokens a provider may leave behind, e.g. `__TERM_ab12cd_0` or `TERM_ab12cd_0_9f__`
static PLACEHOLDER_RESIDUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)_*TERM_[0-9a-f]{6}(?:_\d+)?(?:_[0-9a-f]{0,2})?_*").expect("valid residue regex"));

/// Residue together with the blanks on either side of it
static PADDED_RESIDUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[ \t]*_*TERM_[0-9a-f]{6}(?:_\d+)?(?:_[0-9a-f]{0,2})?_*[ \t]*").expect("valid padded residue regex")
});

/// One placeholder and the terms it stands for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub token: String,
    pub source_term: String,
    pub target_term: String,
}

/// Mapping from placeholder tokens back to target terms.
///
/// Not `Clone`: `restore` takes it by value, so a mapping is consumed once.
#[derive(Debug, PartialEq, Eq, Default)]
pub struct PlaceholderMap {
    nonce: String,
    bindings: Vec<Placeholder>,
}

impl PlaceholderMap {
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn bindings(&self) -> &[Placeholder] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Segment text with every match replaced by a placeholder
#[derive(Debug)]
pub struct ProtectedSegment {
    pub text: String,
    pub mapping: PlaceholderMap,
}

impl ProtectedSegment {
    pub fn into_parts(self) -> (String, PlaceholderMap) {
        (self.text, self.mapping)
    }
}

fn checksum(nonce: &str, index: usize, target_term: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce.as_bytes());
    hasher.update(b":");
    hasher.update(index.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(target_term.as_bytes());
    format!("{:02x}", hasher.finalize()[0])
}

fn draw_nonce(text: &str) -> String {
    let mut rng = rand::rng();
    let lowered = text.to_lowercase();
    loop {
        let nonce = format!("{:06x}", rng.random_range(0..0x100_0000u32));
        if !lowered.contains(&format!("__term_{}", nonce)) {
            return nonce;
        }
    }
}

/// Replace each match span (char offsets, sorted, non-overlapping) with a placeholder
pub fn protect(text: &str, matches: &[Match]) -> ProtectedSegment {
    if matches.is_empty() {
        return ProtectedSegment {
            text: text.to_string(),
            mapping: PlaceholderMap::default(),
        };
    }

    let nonce = draw_nonce(text);
    let chars: Vec<char> = text.chars().collect();
    let mut output = String::with_capacity(text.len() + matches.len() * 24);
    let mut bindings = Vec::with_capacity(matches.len());
    let mut cursor = 0;

    for m in matches {
        if m.start < cursor || m.end > chars.len() || m.start >= m.end {
            warn!("Skipping invalid match span {}..{} during protection", m.start, m.end);
            continue;
        }
        output.extend(&chars[cursor..m.start]);
        // Token indexes follow `bindings`, which `restore` relies on
        let index = bindings.len();
        let check = checksum(&nonce, index, &m.entry.target_term);
        let token = format!("__TERM_{}_{}_{}__", nonce, index, check);
        output.push_str(&token);
        bindings.push(Placeholder {
            token,
            source_term: chars[m.start..m.end].iter().collect(),
            target_term: m.entry.target_term.clone(),
        });
        cursor = m.end;
    }
    output.extend(&chars[cursor..]);

    debug!("Protected {} term(s) with nonce {}", bindings.len(), nonce);
    ProtectedSegment {
        text: output,
        mapping: PlaceholderMap { nonce, bindings },
    }
}

/// Swap placeholders in `translated` back to their target terms.
///
/// Tokens that do not belong to `mapping` (foreign nonce, bad checksum, unknown index)
/// are stripped. If any placeholder from `mapping` is missing, the error carries the
/// degraded text with the survivors restored.
pub fn restore(translated: &str, mapping: PlaceholderMap) -> Result<String, RestorationMismatch> {
    if mapping.is_empty() {
        return Ok(translated.to_string());
    }

    let by_token: HashMap<String, &Placeholder> = mapping
        .bindings
        .iter()
        .map(|p| (p.token.to_lowercase(), p))
        .collect();
    let mut seen = vec![false; mapping.bindings.len()];
    let mut stripped = false;
    let mut output = String::with_capacity(translated.len());
    let mut last = 0;

    for caps in PLACEHOLDER_RE.captures_iter(translated) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        output.push_str(&translated[last..whole.start]);
        last = whole.end;

        let token = translated[whole.clone()].to_lowercase();
        match by_token.get(&token) {
            Some(placeholder) => {
                let index = caps[2].parse::<usize>().unwrap_or(usize::MAX);
                if let Some(flag) = seen.get_mut(index) {
                    *flag = true;
                }
                output.push_str(&placeholder.target_term);
            }
            None => {
                // Left in place for `strip_residue` to take out with its padding
                output.push_str(&translated[whole]);
                stripped = true;
            }
        }
    }
    output.push_str(&translated[last..]);

    let missing: Vec<String> = mapping
        .bindings
        .iter()
        .zip(&seen)
        .filter(|(_, found)| !**found)
        .map(|(p, _)| p.token.clone())
        .collect();

    if missing.is_empty() && !stripped && !PLACEHOLDER_RESIDUE_RE.is_match(&output) {
        return Ok(output);
    }

    let cleaned = strip_residue(&output);

    if missing.is_empty() {
        debug!("Stripped foreign placeholder residue after restoration");
        return Ok(cleaned);
    }

    Err(RestorationMismatch {
        missing,
        degraded: cleaned,
    })
}

/// Remove placeholder residue and only the blanks padding it.
///
/// Residue between two blanks leaves a single space behind; residue at either end of
/// the text or against punctuation leaves nothing.
fn strip_residue(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;
    for m in PADDED_RESIDUE_RE.find_iter(text) {
        output.push_str(&text[last..m.start()]);
        let padded = m.as_str();
        let inner = m.start() > 0 && m.end() < text.len();
        if inner && padded.starts_with([' ', '\t']) && padded.ends_with([' ', '\t']) {
            output.push(' ');
        }
        last = m.end();
    }
    output.push_str(&text[last..]);
    output
}

/// Char-offset spans of placeholder tokens already present in `text`
pub fn placeholder_spans(text: &str) -> Vec<(usize, usize)> {
    char_spans(&PLACEHOLDER_RE, text)
}

/// Char-offset spans of placeholder tokens, including ones a provider truncated
pub fn token_spans(text: &str) -> Vec<(usize, usize)> {
    char_spans(&PLACEHOLDER_RESIDUE_RE, text)
}

fn char_spans(re: &Regex, text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut byte_to_char = HashMap::new();
    for (char_index, (byte_index, _)) in text.char_indices().enumerate() {
        byte_to_char.insert(byte_index, char_index);
    }
    let char_len = text.chars().count();
    for m in re.find_iter(text) {
        let start = byte_to_char.get(&m.start()).copied().unwrap_or(0);
        let end = byte_to_char.get(&m.end()).copied().unwrap_or(char_len);
        spans.push((start, end));
    }
    spans
}

/// Remove every well-formed placeholder token from `text`
pub fn strip_placeholders(text: &str) -> String {
    PLACEHOLDER_RE.replace_all(text, "").into_owned()
}

/// Human-readable summary of a mapping for debug logs
pub fn describe(mapping: &PlaceholderMap) -> String {
    let mut out = String::new();
    for p in &mapping.bindings {
        let _ = write!(out, "{}={} ", p.token, p.target_term);
    }
    out.trim_end().to_string()
}
