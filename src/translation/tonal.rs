/*!
 * Tone restoration for tonal target languages.
 *
 * Two passes over the translated text:
 *
 * 1. Lexicon pass: known words get their tone marks, but only on nuclei that
 *    carry no mark yet.
 * 2. Sandhi pass: contextual rules rewrite tones that the lexicon pass just
 *    assigned, reading neighbours from a pre-sandhi snapshot.
 *
 * Every assigned tone (MID included) is written as a combining mark, and marked
 * nuclei are fixed points, so applying the adapter twice is a no-op.
 */

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::language_utils::canonical_language_code;

/// A lexical tone, written as a combining diacritic after the vowel nucleus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tone {
    High,
    Low,
    Mid,
    Rising,
    Falling,
}

impl Tone {
    /// Combining diacritic for this tone
    pub fn mark(self) -> char {
        match self {
            Self::High => '\u{0301}',
            Self::Low => '\u{0300}',
            Self::Mid => '\u{0304}',
            Self::Rising => '\u{030C}',
            Self::Falling => '\u{0302}',
        }
    }

    pub fn from_mark(c: char) -> Option<Self> {
        match c {
            '\u{0301}' => Some(Self::High),
            '\u{0300}' => Some(Self::Low),
            '\u{0304}' => Some(Self::Mid),
            '\u{030C}' => Some(Self::Rising),
            '\u{0302}' => Some(Self::Falling),
            _ => None,
        }
    }
}

/// What a rule position accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToneClass {
    High,
    Low,
    Mid,
    Rising,
    Falling,
    /// Any present syllable, marked or not
    Any,
    /// No syllable: text edge or a punctuation gap
    Boundary,
}

impl ToneClass {
    fn matches_tone(self, tone: Option<Tone>) -> bool {
        match self {
            Self::Any => true,
            Self::Boundary => false,
            Self::High => tone == Some(Tone::High),
            Self::Low => tone == Some(Tone::Low),
            Self::Mid => tone == Some(Tone::Mid),
            Self::Rising => tone == Some(Tone::Rising),
            Self::Falling => tone == Some(Tone::Falling),
        }
    }
}

fn default_across_words() -> bool {
    true
}

/// A sandhi rule: rewrite the focus tone given its neighbours
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneRule {
    pub name: String,
    /// Tone class the focus syllable must carry
    pub pattern: ToneClass,
    /// Constraint on the preceding syllable; `None` accepts anything
    #[serde(default)]
    pub preceding_tone_class: Option<ToneClass>,
    /// Constraint on the following syllable; `None` accepts anything
    #[serde(default)]
    pub following_tone_class: Option<ToneClass>,
    pub result_tone: Tone,
    #[serde(default)]
    pub priority: i32,
    /// Context syllables must belong to a different word than the focus
    #[serde(default = "default_across_words")]
    pub across_words: bool,
}

impl ToneRule {
    pub fn new(name: impl Into<String>, pattern: ToneClass, result_tone: Tone) -> Self {
        Self {
            name: name.into(),
            pattern,
            preceding_tone_class: None,
            following_tone_class: None,
            result_tone,
            priority: 0,
            across_words: true,
        }
    }

    pub fn after(mut self, class: ToneClass) -> Self {
        self.preceding_tone_class = Some(class);
        self
    }

    pub fn before(mut self, class: ToneClass) -> Self {
        self.following_tone_class = Some(class);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    fn side_matches(&self, class: Option<ToneClass>, neighbour: Neighbour) -> bool {
        match (class, neighbour) {
            (None, _) => true,
            (Some(ToneClass::Boundary), Neighbour::Edge) => true,
            (Some(_), Neighbour::Edge) => false,
            (Some(class), Neighbour::Syllable { tone, same_word }) => {
                !(self.across_words && same_word) && class.matches_tone(tone)
            }
        }
    }

    fn matches(&self, focus: Option<Tone>, preceding: Neighbour, following: Neighbour) -> bool {
        self.pattern.matches_tone(focus)
            && self.side_matches(self.preceding_tone_class, preceding)
            && self.side_matches(self.following_tone_class, following)
    }
}

/// Lexicon entry; empty `tone_marks` means "read the tones off `word`"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneLexiconEntry {
    pub word: String,
    #[serde(default)]
    pub tone_marks: Vec<Tone>,
}

impl ToneLexiconEntry {
    pub fn new(word: impl Into<String>, tone_marks: &[Tone]) -> Self {
        Self {
            word: word.into(),
            tone_marks: tone_marks.to_vec(),
        }
    }

    /// Tones for the entry, deriving them from the word's marks when not given.
    /// Unmarked nuclei derive as MID.
    fn tones(&self) -> Vec<Tone> {
        if !self.tone_marks.is_empty() {
            return self.tone_marks.clone();
        }
        let chars: Vec<char> = self.word.chars().collect();
        scan_nuclei(&chars)
            .iter()
            .map(|n| n.tone.unwrap_or(Tone::Mid))
            .collect()
    }
}

/// Tone data for one language, as stored in the JSON data directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneTable {
    pub language: String,
    #[serde(default)]
    pub words: Vec<ToneLexiconEntry>,
    #[serde(default)]
    pub rules: Vec<ToneRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Neighbour {
    Edge,
    Syllable { tone: Option<Tone>, same_word: bool },
}

const PLAIN_VOWELS: &str = "aeiouɛɔẹọAEIOUƐƆẸỌ";

/// Base vowel and tone of a precomposed toned vowel
fn decompose_toned_vowel(c: char) -> Option<(char, Tone)> {
    let decomposed = match c {
        'á' => ('a', Tone::High),
        'à' => ('a', Tone::Low),
        'ā' => ('a', Tone::Mid),
        'ǎ' => ('a', Tone::Rising),
        'â' => ('a', Tone::Falling),
        'é' => ('e', Tone::High),
        'è' => ('e', Tone::Low),
        'ē' => ('e', Tone::Mid),
        'ě' => ('e', Tone::Rising),
        'ê' => ('e', Tone::Falling),
        'í' => ('i', Tone::High),
        'ì' => ('i', Tone::Low),
        'ī' => ('i', Tone::Mid),
        'ǐ' => ('i', Tone::Rising),
        'î' => ('i', Tone::Falling),
        'ó' => ('o', Tone::High),
        'ò' => ('o', Tone::Low),
        'ō' => ('o', Tone::Mid),
        'ǒ' => ('o', Tone::Rising),
        'ô' => ('o', Tone::Falling),
        'ú' => ('u', Tone::High),
        'ù' => ('u', Tone::Low),
        'ū' => ('u', Tone::Mid),
        'ǔ' => ('u', Tone::Rising),
        'û' => ('u', Tone::Falling),
        'Á' => ('A', Tone::High),
        'À' => ('A', Tone::Low),
        'Ā' => ('A', Tone::Mid),
        'Ǎ' => ('A', Tone::Rising),
        'Â' => ('A', Tone::Falling),
        'É' => ('E', Tone::High),
        'È' => ('E', Tone::Low),
        'Ē' => ('E', Tone::Mid),
        'Ě' => ('E', Tone::Rising),
        'Ê' => ('E', Tone::Falling),
        'Í' => ('I', Tone::High),
        'Ì' => ('I', Tone::Low),
        'Ī' => ('I', Tone::Mid),
        'Ǐ' => ('I', Tone::Rising),
        'Î' => ('I', Tone::Falling),
        'Ó' => ('O', Tone::High),
        'Ò' => ('O', Tone::Low),
        'Ō' => ('O', Tone::Mid),
        'Ǒ' => ('O', Tone::Rising),
        'Ô' => ('O', Tone::Falling),
        'Ú' => ('U', Tone::High),
        'Ù' => ('U', Tone::Low),
        'Ū' => ('U', Tone::Mid),
        'Ǔ' => ('U', Tone::Rising),
        'Û' => ('U', Tone::Falling),
        _ => return None,
    };
    Some(decomposed)
}

fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036F}').contains(&c)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || is_combining_mark(c)
}

fn is_nucleus_start(c: char) -> bool {
    PLAIN_VOWELS.contains(c) || decompose_toned_vowel(c).is_some()
}

#[derive(Debug, Clone)]
struct Nucleus {
    /// Char index where a tone mark would be inserted
    insert_at: usize,
    word: usize,
    tone: Option<Tone>,
    derived: bool,
    /// Punctuation separates this nucleus from the previous one
    gap_before: bool,
}

/// Nuclei in `chars`, grouped into words
fn scan_nuclei(chars: &[char]) -> Vec<Nucleus> {
    let mut nuclei = Vec::new();
    let mut word = 0;
    let mut in_word = false;
    let mut gap = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if !is_word_char(c) {
            if in_word {
                word += 1;
                in_word = false;
            }
            if !c.is_whitespace() {
                gap = true;
            }
            i += 1;
            continue;
        }
        in_word = true;
        if !is_nucleus_start(c) {
            i += 1;
            continue;
        }

        let mut tone = decompose_toned_vowel(c).map(|(_, t)| t);
        let mut end = i + 1;
        while end < chars.len() && is_combining_mark(chars[end]) {
            if let Some(t) = Tone::from_mark(chars[end]) {
                tone = Some(t);
            }
            end += 1;
        }
        nuclei.push(Nucleus {
            insert_at: end,
            word,
            tone,
            derived: false,
            gap_before: gap,
        });
        gap = false;
        i = end;
    }
    nuclei
}

/// Lower-cased word with tone marks removed, the lexicon lookup key
fn lexicon_key(word: &str) -> String {
    word.chars()
        .filter(|&c| Tone::from_mark(c).is_none())
        .map(|c| decompose_toned_vowel(c).map(|(base, _)| base).unwrap_or(c))
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Default, Clone)]
struct CompiledTable {
    lexicon: HashMap<String, Vec<Tone>>,
    /// Sorted by priority, highest first
    rules: Vec<ToneRule>,
}

impl CompiledTable {
    fn merge(&mut self, table: ToneTable) {
        for entry in table.words {
            let tones = entry.tones();
            if tones.is_empty() {
                warn!("Skipping tone lexicon entry '{}' without vowel nuclei", entry.word);
                continue;
            }
            self.lexicon.insert(lexicon_key(&entry.word), tones);
        }
        self.rules.extend(table.rules);
        // Stable sort keeps declaration order among equal priorities
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }
}

/// Restores tone marks in translated text for languages it has tables for
#[derive(Debug, Default, Clone)]
pub struct TonalAdapter {
    tables: HashMap<String, CompiledTable>,
}

impl TonalAdapter {
    /// Adapter without any tables; every language passes through
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter preloaded with Yoruba, Fon, Ewe and Dindi
    pub fn with_builtin_tables() -> Self {
        Self::from_tables(builtin_tables())
    }

    pub fn from_tables(tables: impl IntoIterator<Item = ToneTable>) -> Self {
        let mut adapter = Self::new();
        for table in tables {
            adapter.add_table(table);
        }
        adapter
    }

    /// Merge a table into the adapter; later words override earlier ones
    pub fn add_table(&mut self, table: ToneTable) {
        let language = canonical_language_code(&table.language);
        self.tables.entry(language).or_default().merge(table);
    }

    /// Load every `*.json` tone table in `dir`
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;
        let entries = fs::read_dir(dir).with_context(|| format!("Failed to read tone data directory {:?}", dir))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
            let table: ToneTable =
                serde_json::from_str(&content).with_context(|| format!("Invalid tone table {:?}", path))?;
            info!(
                "Loaded tone table for {} ({} words, {} rules)",
                table.language,
                table.words.len(),
                table.rules.len()
            );
            self.add_table(table);
            loaded += 1;
        }
        Ok(loaded)
    }

    pub fn supports(&self, lang: &str) -> bool {
        self.tables.contains_key(&canonical_language_code(lang))
    }

    pub fn languages(&self) -> Vec<String> {
        let mut langs: Vec<String> = self.tables.keys().cloned().collect();
        langs.sort();
        langs
    }

    /// Apply lexicon tones and sandhi rules for `lang`
    pub fn apply_tones(&self, text: &str, lang: &str) -> String {
        let Some(table) = self.tables.get(&canonical_language_code(lang)) else {
            return text.to_string();
        };
        if text.trim().is_empty() {
            return text.to_string();
        }

        let chars: Vec<char> = text.chars().collect();
        let mut nuclei = scan_nuclei(&chars);
        if nuclei.is_empty() {
            return text.to_string();
        }

        self.lexicon_pass(table, &chars, &mut nuclei);
        let rewritten = self.sandhi_pass(table, &mut nuclei);

        let mut marks: HashMap<usize, char> = HashMap::new();
        for nucleus in nuclei.iter().filter(|n| n.derived) {
            if let Some(tone) = nucleus.tone {
                marks.insert(nucleus.insert_at, tone.mark());
            }
        }
        if marks.is_empty() {
            return text.to_string();
        }

        let mut output = String::with_capacity(text.len() + marks.len() * 2);
        for (index, c) in chars.iter().enumerate() {
            if let Some(mark) = marks.get(&index) {
                output.push(*mark);
            }
            output.push(*c);
        }
        if let Some(mark) = marks.get(&chars.len()) {
            output.push(*mark);
        }

        debug!(
            "Applied {} tone mark(s) for {}, {} changed by sandhi",
            marks.len(),
            lang,
            rewritten
        );
        output
    }

    fn lexicon_pass(&self, table: &CompiledTable, chars: &[char], nuclei: &mut [Nucleus]) {
        let mut start = 0;
        while start < nuclei.len() {
            let word = nuclei[start].word;
            let end = nuclei[start..]
                .iter()
                .position(|n| n.word != word)
                .map(|offset| start + offset)
                .unwrap_or(nuclei.len());

            let text = word_text(chars, nuclei[start].insert_at);
            if let Some(tones) = table.lexicon.get(&lexicon_key(&text)) {
                if tones.len() == end - start {
                    for (nucleus, tone) in nuclei[start..end].iter_mut().zip(tones) {
                        if nucleus.tone.is_none() {
                            nucleus.tone = Some(*tone);
                            nucleus.derived = true;
                        }
                    }
                }
            }
            start = end;
        }
    }

    fn sandhi_pass(&self, table: &CompiledTable, nuclei: &mut [Nucleus]) -> usize {
        if table.rules.is_empty() {
            return 0;
        }
        let snapshot: Vec<Option<Tone>> = nuclei.iter().map(|n| n.tone).collect();
        let mut rewritten = 0;

        for i in 0..nuclei.len() {
            if !nuclei[i].derived {
                continue;
            }
            let preceding = if i == 0 || nuclei[i].gap_before {
                Neighbour::Edge
            } else {
                Neighbour::Syllable {
                    tone: snapshot[i - 1],
                    same_word: nuclei[i - 1].word == nuclei[i].word,
                }
            };
            let following = if i + 1 >= nuclei.len() || nuclei[i + 1].gap_before {
                Neighbour::Edge
            } else {
                Neighbour::Syllable {
                    tone: snapshot[i + 1],
                    same_word: nuclei[i + 1].word == nuclei[i].word,
                }
            };

            if let Some(rule) = table.rules.iter().find(|r| r.matches(snapshot[i], preceding, following)) {
                if nuclei[i].tone != Some(rule.result_tone) {
                    debug!("Sandhi rule '{}' applied", rule.name);
                    nuclei[i].tone = Some(rule.result_tone);
                    rewritten += 1;
                }
            }
        }
        rewritten
    }
}

/// The whole word containing the char just before `insert_at`
fn word_text(chars: &[char], insert_at: usize) -> String {
    let anchor = insert_at.saturating_sub(1);
    let mut start = anchor;
    while start > 0 && is_word_char(chars[start - 1]) {
        start -= 1;
    }
    let mut end = anchor;
    while end < chars.len() && is_word_char(chars[end]) {
        end += 1;
    }
    chars[start..end].iter().collect()
}

fn table(language: &str, words: &[(&str, &[Tone])], rules: Vec<ToneRule>) -> ToneTable {
    ToneTable {
        language: language.to_string(),
        words: words.iter().map(|(w, t)| ToneLexiconEntry::new(*w, t)).collect(),
        rules,
    }
}

/// Built-in tables for the tonal languages the pipeline targets
pub fn builtin_tables() -> Vec<ToneTable> {
    use Tone::{High, Low, Mid};

    vec![
        table(
            "yo",
            &[
                ("mo", &[Mid]),
                ("ó", &[High]),
                ("a", &[Mid]),
                ("ẹ", &[Mid]),
                ("wọ́n", &[High]),
                ("jẹ", &[Mid]),
                ("lọ", &[Mid]),
                ("wá", &[High]),
                ("sọ", &[Mid]),
                ("rí", &[High]),
                ("ilé", &[Mid, High]),
                ("ọmọ", &[Mid, Mid]),
                ("obì", &[Mid, Low]),
                ("àgbà", &[Low, Low]),
                ("ti", &[Mid]),
                ("yóò", &[High, Low]),
                ("dára", &[Mid, Mid]),
                ("pupa", &[Mid, Mid]),
                ("funfun", &[Mid, Mid]),
            ],
            vec![ToneRule::new("high-low sequence", ToneClass::High, Mid).before(ToneClass::Low)],
        ),
        table(
            "fon",
            &[
                ("un", &[Mid]),
                ("à", &[Low]),
                ("é", &[High]),
                ("mí", &[High]),
                ("yé", &[High]),
                ("ɖu", &[Mid]),
                ("yi", &[Mid]),
                ("wá", &[High]),
                ("ɖɔ", &[Mid]),
                ("xwé", &[High]),
                ("vi", &[Mid]),
                ("àzɔ̀n", &[Low, Low]),
                ("kò", &[Low]),
                ("ná", &[High]),
            ],
            vec![ToneRule::new("tone assimilation", ToneClass::Low, Mid).before(ToneClass::High)],
        ),
        table(
            "ee",
            &[
                ("me", &[Mid]),
                ("nè", &[Low]),
                ("é", &[High]),
                ("ɖu", &[Mid]),
                ("yi", &[Mid]),
                ("va", &[Mid]),
                ("aƒe", &[Mid, Mid]),
                ("ame", &[Mid, Mid]),
            ],
            vec![ToneRule::new("downstep", ToneClass::High, Mid).after(ToneClass::High)],
        ),
        table(
            "dindi",
            &[
                ("ay", &[Mid]),
                ("ni", &[Mid]),
                ("a", &[Mid]),
                ("tɛ", &[Mid]),
                ("koy", &[Mid]),
            ],
            Vec::new(),
        ),
    ]
}
