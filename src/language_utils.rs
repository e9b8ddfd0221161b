//! Language utilities for ISO language code handling
//!
//! Every language tag the core sees goes through `canonical_language_code`,
//! so `yor`, `yo` and `Yoruba` all land on the same key.

use anyhow::{Result, anyhow};
use isolang::Language;

/// ISO 639-2/B codes that differ from their 639-2/T form
fn part2b_to_part2t(code: &str) -> Option<&'static str> {
    let mapped = match code {
        "fre" => "fra",
        "ger" => "deu",
        "dut" => "nld",
        "gre" => "ell",
        "chi" => "zho",
        "cze" => "ces",
        "ice" => "isl",
        "alb" => "sqi",
        "arm" => "hye",
        "baq" => "eus",
        "bur" => "mya",
        "per" => "fas",
        "geo" => "kat",
        "may" => "msa",
        "mac" => "mkd",
        "rum" => "ron",
        "slo" => "slk",
        "wel" => "cym",
        _ => return None,
    };
    Some(mapped)
}

/// Resolve a code or English language name to an isolang `Language`
fn resolve(code: &str) -> Option<Language> {
    let normalized = code.trim().to_lowercase();
    match normalized.len() {
        2 => Language::from_639_1(&normalized),
        3 => {
            let part2t = part2b_to_part2t(&normalized).unwrap_or(&normalized);
            Language::from_639_3(part2t)
        }
        _ => Language::from_name(&capitalize(&normalized)),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Normalize a language code to ISO 639-1 (2-letter) format if possible
/// Falls back to ISO 639-3 if no ISO 639-1 code exists
pub fn normalize_to_part1_or_part3(code: &str) -> Result<String> {
    let lang = resolve(code).ok_or_else(|| anyhow!("Cannot normalize invalid language code: {}", code))?;
    Ok(lang
        .to_639_1()
        .map(str::to_string)
        .unwrap_or_else(|| lang.to_639_3().to_string()))
}

/// Canonical key for a language tag.
///
/// Known languages map to ISO 639-1 when one exists, otherwise ISO 639-3.
/// Tags isolang does not know (regional languages such as Dindi) are kept,
/// lower-cased and trimmed.
pub fn canonical_language_code(code: &str) -> String {
    normalize_to_part1_or_part3(code).unwrap_or_else(|_| code.trim().to_lowercase())
}

/// Check if two language codes represent the same language
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    canonical_language_code(code1) == canonical_language_code(code2)
}

/// English name for prompts and logs, falling back to the tag itself
pub fn language_display_name(code: &str) -> String {
    match resolve(code) {
        Some(lang) => lang.to_name().to_string(),
        None => capitalize(&code.trim().to_lowercase()),
    }
}
