use once_cell::sync::Lazy;
use regex::Regex;

static CARD_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[0-9]{9}\b").expect("valid card number regex"));

/// Returns the leftmost nine-digit run with word-boundary semantics. Digits
/// glued to letters or underscores never match. Later candidates are ignored.
pub fn extract_card_number(text: &str) -> Option<String> {
    CARD_NUMBER
        .find_iter(text)
        .find(|candidate| !touches_digit(text, candidate.start(), candidate.end()))
        .map(|candidate| candidate.as_str().to_string())
}

/// Rejects a match that is a slice of a longer digit run in any script.
fn touches_digit(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    [before, after]
        .into_iter()
        .flatten()
        .any(char::is_numeric)
}
