use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static DOTTED_LEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.{2,}\s*\d+$").expect("valid dotted leader regex"));
static TRAILING_PAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+\d+$").expect("valid trailing page regex"));
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid digits regex"));

const TOC_LINE_THRESHOLD: usize = 5;

/// Page separator used by text exports of the guide.
pub const PAGE_BREAK: char = '\u{000C}';

pub fn split_pages(raw: &str) -> Vec<String> {
    raw.split(PAGE_BREAK).map(ToString::to_string).collect()
}

/// `Title ........ 12` or `Title    12`.
pub fn is_toc_line(line: &str) -> bool {
    let line = line.trim();
    DOTTED_LEADER.is_match(line) || TRAILING_PAGE.is_match(line)
}

pub fn is_toc_page(text: &str) -> bool {
    text.lines().filter(|line| is_toc_line(line)).count() >= TOC_LINE_THRESHOLD
}

/// Removes the running footer from every page.
///
/// The last non-empty line of a page is treated as footer when, with digits
/// masked, the same line closes at least half of the pages. Single-page
/// documents are returned unchanged.
pub fn strip_running_footers(pages: &[String]) -> Vec<String> {
    if pages.len() < 2 {
        return pages.to_vec();
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for page in pages {
        if let Some(last) = last_line(page) {
            *counts.entry(mask_digits(last)).or_default() += 1;
        }
    }

    let threshold = pages.len().div_ceil(2).max(2);
    pages
        .iter()
        .map(|page| match last_line(page) {
            Some(last) if counts.get(&mask_digits(last)).copied().unwrap_or(0) >= threshold => {
                debug!(footer = last.trim(), "removing running footer");
                let cut = page.rfind(last).unwrap_or(page.len());
                page[..cut].trim_end().to_string()
            }
            _ => page.clone(),
        })
        .collect()
}

fn last_line(page: &str) -> Option<&str> {
    page.lines().rev().find(|line| !line.trim().is_empty())
}

fn mask_digits(line: &str) -> String {
    DIGITS.replace_all(line.trim(), "#").into_owned()
}
