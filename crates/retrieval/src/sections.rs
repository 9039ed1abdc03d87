use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::clean::is_toc_page;

static CONTENTS_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bContents\b").expect("valid contents regex"));
static DOTTED_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)\.{2,}\s*(\d+)$").expect("valid toc entry regex"));
static SPACED_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)\s+(\d+)$").expect("valid toc entry regex"));

const TOC_SCAN_PAGES: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KnowledgeBaseError {
    #[error("table of contents page not found")]
    TocNotFound,
    #[error("table of contents on page {page} has no entries")]
    EmptyToc { page: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub title: String,
    pub page: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideSection {
    pub title: String,
    pub start_page: usize,
    pub end_page: usize,
    pub text: String,
}

/// Index of the contents page: the first page naming "Contents", else the
/// first TOC-shaped page near the front of the document.
pub fn find_toc_page(pages: &[String]) -> Option<usize> {
    pages
        .iter()
        .position(|page| CONTENTS_WORD.is_match(page))
        .or_else(|| {
            pages
                .iter()
                .take(TOC_SCAN_PAGES)
                .position(|page| is_toc_page(page))
        })
}

pub fn parse_toc_entries(toc_text: &str) -> Vec<TocEntry> {
    toc_text
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            DOTTED_ENTRY
                .captures(line)
                .or_else(|| SPACED_ENTRY.captures(line))
        })
        .filter_map(|captures| {
            let title = captures.get(1)?.as_str().trim().trim_end_matches('.').trim();
            let page = captures.get(2)?.as_str().parse::<usize>().ok()?;
            (!title.is_empty()).then(|| TocEntry {
                title: title.to_string(),
                page,
            })
        })
        .collect()
}

/// Slices pages into sections using the table of contents. Page numbers in
/// the TOC are 1-based physical pages; a section runs until the page before
/// the next entry starts, or to the end of the document.
pub fn extract_sections(pages: &[String]) -> Result<Vec<GuideSection>, KnowledgeBaseError> {
    let toc_index = find_toc_page(pages).ok_or(KnowledgeBaseError::TocNotFound)?;
    let entries = parse_toc_entries(&pages[toc_index]);
    if entries.is_empty() {
        return Err(KnowledgeBaseError::EmptyToc {
            page: toc_index + 1,
        });
    }

    let page_count = pages.len();
    let mut sections = Vec::with_capacity(entries.len());

    for (idx, entry) in entries.iter().enumerate() {
        if entry.page == 0 || entry.page > page_count {
            warn!(title = %entry.title, page = entry.page, page_count, "toc entry out of range");
            continue;
        }

        let start_idx = entry.page - 1;
        let end_idx = match entries.get(idx + 1) {
            Some(next) => next
                .page
                .saturating_sub(2)
                .min(page_count - 1)
                .max(start_idx),
            None => page_count - 1,
        };

        let text = pages[start_idx..=end_idx]
            .iter()
            .map(|page| page.trim())
            .collect::<Vec<_>>()
            .join("\n\n");

        info!(
            title = %entry.title,
            start_page = start_idx + 1,
            end_page = end_idx + 1,
            "extracted guide section"
        );

        sections.push(GuideSection {
            title: entry.title.clone(),
            start_page: start_idx + 1,
            end_page: end_idx + 1,
            text: text.trim().to_string(),
        });
    }

    Ok(sections)
}
