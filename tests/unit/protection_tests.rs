/*!
 * Tests for the term protection codec
 */

use std::sync::Arc;

use wikitranslate::translation::glossary::{GlossaryEntry, Match};
use wikitranslate::translation::protection::{placeholder_spans, protect, restore, strip_placeholders};

fn matched(start: usize, end: usize, target: &str) -> Match {
    Match {
        start,
        end,
        entry: Arc::new(GlossaryEntry::new("x", target, "en", "fon")),
    }
}

#[test]
fn test_protectThenRestore_withoutMatches_shouldBeIdentity() {
    for text in ["", "plain text", "ẹ kú àárọ̀", "__TERM_abcdef_0_00__ looks like a token"] {
        let (protected, mapping) = protect(text, &[]).into_parts();
        assert_eq!(protected, text);
        assert_eq!(restore(&protected, mapping).unwrap(), text);
    }
}

#[test]
fn test_protect_shouldEmitEachPlaceholderExactlyOnce() {
    let text = "CPU, RAM and CPU again";
    let matches = [matched(0, 3, "UCP"), matched(5, 8, "MVA"), matched(13, 16, "UCP")];
    let (protected, mapping) = protect(text, &matches).into_parts();

    assert_eq!(mapping.len(), 3);
    assert_eq!(placeholder_spans(&protected).len(), 3);
    for binding in mapping.bindings() {
        assert_eq!(protected.matches(binding.token.as_str()).count(), 1);
    }
    assert!(protected.starts_with("__TERM_"));
    assert!(protected.contains(", "));
    assert!(protected.contains(" and "));
    assert!(protected.ends_with(" again"));
}

#[test]
fn test_restore_withReorderedPlaceholders_shouldFollowTranslatedOrder() {
    let (protected, mapping) = protect("CPU GPU", &[matched(0, 3, "UCP"), matched(4, 7, "UGP")]).into_parts();
    let tokens: Vec<&str> = protected.split(' ').collect();
    let reordered = format!("{} et {}", tokens[1], tokens[0]);

    assert_eq!(restore(&reordered, mapping).unwrap(), "UGP et UCP");
}

#[test]
fn test_restore_withForeignToken_shouldStripIt() {
    let (protected, mapping) = protect("CPU", &[matched(0, 3, "UCP")]).into_parts();
    let foreign = if mapping.nonce() == "000000" { "111111" } else { "000000" };
    let translated = format!("{} __TERM_{}_0_00__ chaud", protected, foreign);

    assert_eq!(restore(&translated, mapping).unwrap(), "UCP chaud");
}

#[test]
fn test_stripPlaceholders_shouldRemoveOnlyTokens() {
    let (protected, _) = protect("the CPU runs", &[matched(4, 7, "UCP")]).into_parts();
    assert_eq!(strip_placeholders(&protected), "the  runs");
}

#[test]
fn test_restore_withDroppedPlaceholder_shouldKeepSurroundingWhitespace() {
    let (protected, mapping) = protect("CPU  and\tGPU ", &[matched(0, 3, "UCP"), matched(9, 12, "UGP")]).into_parts();
    let dropped = mapping.bindings()[1].token.clone();
    let translated = protected.replace(&dropped, "");

    let mismatch = restore(&translated, mapping).unwrap_err();
    assert_eq!(mismatch.missing, vec![dropped]);
    assert_eq!(mismatch.degraded, "UCP  and\t ");
}

#[test]
fn test_restore_withTruncatedPlaceholder_shouldOnlyRemoveItsPadding() {
    let (protected, mapping) = protect("CPU  then GPU now", &[matched(0, 3, "UCP"), matched(10, 13, "UGP")]).into_parts();
    let second = mapping.bindings()[1].token.clone();
    let truncated = protected.replace(&second, &second[..second.len() - 5]);

    let mismatch = restore(&truncated, mapping).unwrap_err();
    assert_eq!(mismatch.degraded, "UCP  then now");
}
