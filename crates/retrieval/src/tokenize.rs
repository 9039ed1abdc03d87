use once_cell::sync::Lazy;
use regex::Regex;

static CLEANER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{Latin}\p{Nd}\s]+").expect("valid tokenizer regex"));

const STOPWORDS: &[&str] = &[
    "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how", "if",
    "in", "is", "it", "me", "my", "of", "on", "or", "the", "to", "what", "when", "where", "with",
    "you", "your",
];

pub fn tokenize(input: &str) -> Vec<String> {
    let normalized = CLEANER.replace_all(input, " ").to_lowercase();

    normalized
        .split_whitespace()
        .filter(|token| token.chars().count() > 1)
        .filter(|token| !STOPWORDS.contains(token))
        .map(|token| token.to_string())
        .collect()
}
