/*!
 * Orthographic normalization for target languages.
 *
 * Providers often spell low-resource languages with ASCII digraphs (`dh`, `ny`,
 * `sh`) where the standard orthography has a single letter. Per-language
 * replacement rules rewrite those before tone marks are restored. Placeholder
 * tokens are never rewritten, so glossary terms keep the spelling they were
 * given.
 */

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::language_utils::canonical_language_code;
use crate::translation::protection::token_spans;

/// Subdirectory of the tone data directory holding spelling tables
pub const ORTHOGRAPHY_SUBDIR: &str = "orthography";

const VOWELS: &str = "aeiouɛɔəẹọàáâǎāãèéêěēẽìíîǐīĩòóôǒōõùúûǔūũ";

/// Where in a word a rule may fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleContext {
    /// Anywhere
    #[default]
    All,
    /// At the start of a word
    WordInitial,
    /// At the end of a word
    WordFinal,
    /// With a vowel on both sides
    BetweenVowels,
}

/// Replace `from` with `to` wherever `context` allows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrthographicRule {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub context: RuleContext,
}

impl OrthographicRule {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            context: RuleContext::All,
        }
    }

    pub fn in_context(mut self, context: RuleContext) -> Self {
        self.context = context;
        self
    }
}

/// Spelling rules for one language, as stored in the JSON data directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrthographyTable {
    pub language: String,
    #[serde(default)]
    pub rules: Vec<OrthographicRule>,
}

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036F}').contains(&c)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || is_combining_mark(c)
}

fn is_vowel(c: char) -> bool {
    VOWELS.contains(fold(c))
}

/// Vowel check for the letter at `index`, looking through trailing tone marks
fn vowel_at(chars: &[char], index: usize) -> bool {
    chars[..=index]
        .iter()
        .rev()
        .find(|c| !is_combining_mark(**c))
        .is_some_and(|c| is_vowel(*c))
}

#[derive(Debug, Clone)]
struct CompiledRule {
    from: Vec<char>,
    to: String,
    context: RuleContext,
}

impl CompiledRule {
    fn matches_at(&self, chars: &[char], start: usize, limit: usize) -> bool {
        let end = start + self.from.len();
        if end > limit || !chars[start..end].iter().zip(&self.from).all(|(c, f)| fold(*c) == *f) {
            return false;
        }
        match self.context {
            RuleContext::All => true,
            RuleContext::WordInitial => start == 0 || !is_word_char(chars[start - 1]),
            RuleContext::WordFinal => end == chars.len() || !is_word_char(chars[end]),
            RuleContext::BetweenVowels => start > 0 && end < chars.len() && vowel_at(chars, start - 1) && is_vowel(chars[end]),
        }
    }

    /// Write the replacement, keeping a capital on the first letter
    fn write(&self, first: char, output: &mut String) {
        let mut to = self.to.chars();
        match to.next() {
            Some(head) if first.is_uppercase() => {
                output.extend(head.to_uppercase());
                output.push_str(to.as_str());
            }
            _ => output.push_str(&self.to),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct CompiledTable {
    rules: Vec<CompiledRule>,
}

impl CompiledTable {
    fn merge(&mut self, table: OrthographyTable) {
        for rule in table.rules {
            let from: Vec<char> = rule.from.chars().map(fold).collect();
            if from.is_empty() || rule.to.is_empty() || rule.from == rule.to {
                continue;
            }
            if !from.iter().copied().chain(rule.to.chars()).all(is_word_char) {
                warn!("Skipping spelling rule '{}' -> '{}' for {}: letters only", rule.from, rule.to, table.language);
                continue;
            }
            self.rules.retain(|r| !(r.from == from && r.context == rule.context));
            self.rules.push(CompiledRule {
                from,
                to: rule.to,
                context: rule.context,
            });
        }
        self.retain_fixed_points(&table.language);
        // Longest input first; stable, so earlier rules win ties
        self.rules.sort_by(|a, b| b.from.len().cmp(&a.from.len()));
    }

    /// Drop rules whose output could feed another rule, so a second pass changes nothing
    fn retain_fixed_points(&mut self, language: &str) {
        let inputs: HashSet<char> = self.rules.iter().flat_map(|r| r.from.iter().copied()).collect();
        self.rules.retain(|r| {
            let feeds = r.to.chars().map(fold).any(|c| inputs.contains(&c));
            if feeds {
                warn!("Skipping spelling rule '{}' for {}: its output matches another rule", r.to, language);
            }
            !feeds
        });

        if self.rules.iter().any(|r| r.context == RuleContext::BetweenVowels) {
            self.rules.retain(|r| {
                let voiced = r.to.chars().any(is_vowel);
                if voiced {
                    warn!("Skipping spelling rule '{}' for {}: vowel output next to a between-vowels rule", r.to, language);
                }
                !voiced
            });
        }
    }
}

/// Applies per-language spelling rules to translated text
#[derive(Debug, Default, Clone)]
pub struct OrthographicAdapter {
    tables: HashMap<String, CompiledTable>,
}

impl OrthographicAdapter {
    /// Adapter without any tables; every language passes through
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter preloaded with Yoruba, Fon, Ewe and Dindi
    pub fn with_builtin_tables() -> Self {
        Self::from_tables(builtin_tables())
    }

    pub fn from_tables(tables: impl IntoIterator<Item = OrthographyTable>) -> Self {
        let mut adapter = Self::new();
        for table in tables {
            adapter.add_table(table);
        }
        adapter
    }

    /// Merge a table into the adapter; a rule replaces one with the same input and context
    pub fn add_table(&mut self, table: OrthographyTable) {
        let language = canonical_language_code(&table.language);
        self.tables.entry(language).or_default().merge(table);
    }

    /// Load every `*.json` spelling table in `dir`
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;
        let entries =
            fs::read_dir(dir).with_context(|| format!("Failed to read orthography directory {:?}", dir))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
            let table: OrthographyTable =
                serde_json::from_str(&content).with_context(|| format!("Invalid orthography table {:?}", path))?;
            info!("Loaded {} spelling rule(s) for {}", table.rules.len(), table.language);
            self.add_table(table);
            loaded += 1;
        }
        Ok(loaded)
    }

    pub fn supports(&self, lang: &str) -> bool {
        self.tables.contains_key(&canonical_language_code(lang))
    }

    /// Rewrite `text` with the spelling rules for `lang`, leaving placeholders alone
    pub fn apply(&self, text: &str, lang: &str) -> String {
        let Some(table) = self.tables.get(&canonical_language_code(lang)) else {
            return text.to_string();
        };
        if table.rules.is_empty() || text.trim().is_empty() {
            return text.to_string();
        }

        let chars: Vec<char> = text.chars().collect();
        let reserved = token_spans(text);
        let mut output = String::with_capacity(text.len());
        let mut replaced = 0;
        let mut i = 0;

        'scan: while i < chars.len() {
            let limit = match reserved.iter().find(|&&(_, end)| end > i) {
                Some(&(start, end)) if start <= i => {
                    output.extend(&chars[i..end]);
                    i = end;
                    continue;
                }
                Some(&(start, _)) => start,
                None => chars.len(),
            };
            for rule in &table.rules {
                if rule.matches_at(&chars, i, limit) {
                    rule.write(chars[i], &mut output);
                    i += rule.from.len();
                    replaced += 1;
                    continue 'scan;
                }
            }
            output.push(chars[i]);
            i += 1;
        }

        if replaced > 0 {
            debug!("Applied {} spelling rule(s) for {}", replaced, lang);
        }
        output
    }
}

fn table(language: &str, rules: Vec<OrthographicRule>) -> OrthographyTable {
    OrthographyTable {
        language: language.to_string(),
        rules,
    }
}

/// Built-in spelling tables for the languages the pipeline targets
pub fn builtin_tables() -> Vec<OrthographyTable> {
    let rule = OrthographicRule::new;

    vec![
        table("yo", vec![rule("sh", "ṣ")]),
        table(
            "fon",
            vec![rule("dh", "ɖ"), rule("ny", "ɲ"), rule("ng", "ŋ"), rule("sh", "ʃ")],
        ),
        table(
            "ee",
            vec![
                rule("dh", "ɖ"),
                rule("ny", "ɲ"),
                rule("ng", "ŋ"),
                rule("f", "ƒ").in_context(RuleContext::BetweenVowels),
            ],
        ),
        table("dindi", vec![rule("dh", "ɖ"), rule("ng", "ŋ"), rule("ny", "ɲ")]),
    ]
}
