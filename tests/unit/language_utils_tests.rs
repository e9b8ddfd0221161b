/*!
 * Tests for language code handling
 */

use wikitranslate::language_utils::{
    canonical_language_code, language_codes_match, language_display_name, normalize_to_part1_or_part3,
};

#[test]
fn test_canonicalLanguageCode_withPart3Code_shouldPreferPart1() {
    assert_eq!(canonical_language_code("yor"), "yo");
    assert_eq!(canonical_language_code("ewe"), "ee");
    assert_eq!(canonical_language_code("eng"), "en");
    assert_eq!(canonical_language_code("FRA"), "fr");
}

#[test]
fn test_canonicalLanguageCode_withBibliographicCode_shouldMapToTerminological() {
    assert_eq!(canonical_language_code("fre"), "fr");
    assert_eq!(canonical_language_code("ger"), "de");
}

#[test]
fn test_canonicalLanguageCode_withoutPart1_shouldKeepPart3() {
    assert_eq!(canonical_language_code("fon"), "fon");
}

#[test]
fn test_canonicalLanguageCode_withEnglishName_shouldResolve() {
    assert_eq!(canonical_language_code("Yoruba"), "yo");
    assert_eq!(canonical_language_code("french"), "fr");
}

#[test]
fn test_canonicalLanguageCode_withUnknownTag_shouldLowercaseAndTrim() {
    assert_eq!(canonical_language_code("  Xyzlang "), "xyzlang");
}

#[test]
fn test_normalizeToPart1OrPart3_withInvalidCode_shouldFail() {
    assert!(normalize_to_part1_or_part3("xx").is_err());
    assert!(normalize_to_part1_or_part3("").is_err());
}

#[test]
fn test_languageCodesMatch_acrossCodeForms_shouldMatch() {
    assert!(language_codes_match("yo", "yor"));
    assert!(language_codes_match("ee", "Ewe"));
    assert!(!language_codes_match("en", "fr"));
}

#[test]
fn test_languageDisplayName_shouldFallBackToCapitalizedTag() {
    assert_eq!(language_display_name("yo"), "Yoruba");
    assert_eq!(language_display_name("en"), "English");
    assert_eq!(language_display_name("xyzlang"), "Xyzlang");
}
