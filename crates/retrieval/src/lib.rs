mod chunking;
pub mod clean;
mod embedding;
pub mod sections;
mod tokenize;

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use cardassist_core::{KnowledgeDoc, RetrievedChunk};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

pub use chunking::chunk_document;
pub use embedding::{EmbeddingModel, HashedTokenEmbedder};
pub use sections::{extract_sections, GuideSection, KnowledgeBaseError, TocEntry};
pub use tokenize::tokenize;

use crate::clean::{split_pages, strip_running_footers};
use crate::embedding::cosine_similarity;

const MAX_CHUNK_CHARS: usize = 420;
const KEYWORD_WEIGHT: f32 = 0.65;
const VECTOR_WEIGHT: f32 = 0.35;

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^#\s+(.+)$").expect("valid heading regex"));

/// Retrieval collaborator consumed by the knowledge answerer.
pub trait Retriever: Send + Sync {
    /// Matched passages, one `"<section title>  <text>"` line each. Empty when
    /// nothing relevant was found.
    fn search(&self, query: &str) -> String;
}

#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub title: String,
    pub source_path: String,
    pub text: String,
    pub keywords: HashSet<String>,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalStats {
    pub docs_loaded: usize,
    pub chunks_loaded: usize,
    pub vector_enabled: bool,
    pub embedding_model: Option<&'static str>,
}

/// Hybrid keyword/vector index over the card guide. Only obtainable by
/// building it, so searches never hit an unbuilt index.
#[derive(Clone)]
pub struct KnowledgeIndex {
    docs: Vec<KnowledgeDoc>,
    chunks: Vec<IndexedChunk>,
    embedder: Option<Arc<dyn EmbeddingModel>>,
}

impl KnowledgeIndex {
    pub fn from_kb_dir(
        path: impl AsRef<Path>,
        embedder: Option<Arc<dyn EmbeddingModel>>,
    ) -> Result<Self> {
        let docs = load_docs(path.as_ref())?;
        Ok(Self::from_docs(docs, embedder))
    }

    pub fn from_docs(docs: Vec<KnowledgeDoc>, embedder: Option<Arc<dyn EmbeddingModel>>) -> Self {
        let mut chunks = Vec::new();

        for doc in &docs {
            for (idx, chunk) in chunk_document(&doc.body, MAX_CHUNK_CHARS)
                .into_iter()
                .enumerate()
            {
                let keywords = tokenize(&format!("{} {}", doc.title, chunk))
                    .into_iter()
                    .collect::<HashSet<_>>();
                let embedding = embedder.as_ref().map(|model| model.embed(&chunk));

                chunks.push(IndexedChunk {
                    chunk_id: format!("{}::{}", doc.id, idx),
                    doc_id: doc.id.clone(),
                    title: doc.title.clone(),
                    source_path: doc.source_path.clone(),
                    text: chunk,
                    keywords,
                    embedding,
                });
            }
        }

        info!(
            docs = docs.len(),
            chunks = chunks.len(),
            vector_enabled = embedder.is_some(),
            "knowledge index built"
        );

        Self {
            docs,
            chunks,
            embedder,
        }
    }

    pub fn stats(&self) -> RetrievalStats {
        RetrievalStats {
            docs_loaded: self.docs.len(),
            chunks_loaded: self.chunks.len(),
            vector_enabled: self.embedder.is_some(),
            embedding_model: self.embedder.as_ref().map(|model| model.model_name()),
        }
    }

    /// Ranked chunks with a positive score. Keyword overlap always counts;
    /// vector similarity only refines chunks sharing at least one keyword.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<RetrievedChunk> {
        let query_tokens = tokenize(query).into_iter().collect::<HashSet<_>>();
        let query_embedding = self.embedder.as_ref().map(|model| model.embed(query));

        let mut scored = self
            .chunks
            .iter()
            .filter_map(|chunk| {
                let keyword_score = keyword_score(&query_tokens, &chunk.keywords);
                if keyword_score <= 0.0 {
                    return None;
                }

                let score = match (&query_embedding, &chunk.embedding) {
                    (Some(q), Some(c)) => {
                        (KEYWORD_WEIGHT * keyword_score)
                            + (VECTOR_WEIGHT * cosine_similarity(q, c).max(0.0))
                    }
                    _ => keyword_score,
                };

                Some((score, chunk))
            })
            .collect::<Vec<_>>();

        scored.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(Ordering::Equal));
        debug!(query, candidates = scored.len(), top_k, "knowledge search");

        scored
            .into_iter()
            .take(top_k)
            .map(|(score, chunk)| RetrievedChunk {
                chunk_id: chunk.chunk_id.clone(),
                doc_id: chunk.doc_id.clone(),
                title: chunk.title.clone(),
                text: chunk.text.clone(),
                snippet: snippet(&chunk.text, 220),
                score,
                source_path: chunk.source_path.clone(),
            })
            .collect()
    }

    pub fn list_docs(&self) -> &[KnowledgeDoc] {
        &self.docs
    }
}

/// [`Retriever`] over a shared index returning the top `top_k` passages.
#[derive(Clone)]
pub struct PassageRetriever {
    index: Arc<KnowledgeIndex>,
    top_k: usize,
}

impl PassageRetriever {
    pub fn new(index: Arc<KnowledgeIndex>, top_k: usize) -> Self {
        Self {
            index,
            top_k: top_k.max(1),
        }
    }

    pub fn index(&self) -> &KnowledgeIndex {
        &self.index
    }
}

impl Retriever for PassageRetriever {
    fn search(&self, query: &str) -> String {
        let hits = self.index.search(query, self.top_k);
        for (rank, hit) in hits.iter().enumerate() {
            debug!(rank = rank + 1, section = %hit.title, chunk = %hit.chunk_id, score = hit.score, "retrieved passage");
        }
        format_passages(&hits)
    }
}

pub fn format_passages(hits: &[RetrievedChunk]) -> String {
    hits.iter()
        .map(|hit| format!("{}  {}\n", hit.title, hit.text))
        .collect()
}

fn load_docs(root: &Path) -> Result<Vec<KnowledgeDoc>> {
    let mut docs = Vec::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
    {
        let path = entry.path();
        let extension = path.extension().and_then(|ext| ext.to_str());
        if !matches!(extension, Some("md") | Some("json") | Some("txt")) {
            continue;
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading knowledge document: {}", path.display()))?;
        let rel_path = path
            .strip_prefix(root)
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| path.to_string_lossy().to_string());
        let fallback_title = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("untitled")
            .replace(['-', '_'], " ");

        match extension {
            Some("txt") => docs.extend(guide_docs(&raw, &rel_path, &fallback_title)),
            Some("json") => {
                let body = serde_json::from_str::<serde_json::Value>(&raw)
                    .map(|value| json_to_search_text(&value))
                    .unwrap_or(raw);
                docs.push(whole_doc(body, &rel_path, fallback_title));
            }
            _ => {
                let title = HEADING
                    .captures(&raw)
                    .and_then(|captures| captures.get(1))
                    .map(|value| value.as_str().trim().to_string())
                    .unwrap_or(fallback_title);
                docs.push(whole_doc(raw, &rel_path, title));
            }
        }
    }

    Ok(docs)
}

/// Splits a paged text export into one document per TOC section, or keeps it
/// whole when it has no usable table of contents.
fn guide_docs(raw: &str, rel_path: &str, fallback_title: &str) -> Vec<KnowledgeDoc> {
    let pages = strip_running_footers(&split_pages(raw));

    match extract_sections(&pages) {
        Ok(sections) if !sections.is_empty() => sections
            .into_iter()
            .enumerate()
            .map(|(idx, section)| KnowledgeDoc {
                id: format!("{}#{}", rel_path.replace('/', "::"), idx),
                title: section.title,
                source_path: rel_path.to_string(),
                start_page: Some(section.start_page),
                end_page: Some(section.end_page),
                body: section.text,
            })
            .collect(),
        Ok(_) | Err(_) => {
            info!(source = rel_path, "no table of contents, indexing guide as one document");
            vec![whole_doc(
                pages.join("\n\n"),
                rel_path,
                fallback_title.to_string(),
            )]
        }
    }
}

fn whole_doc(body: String, rel_path: &str, title: String) -> KnowledgeDoc {
    KnowledgeDoc {
        id: rel_path.replace('/', "::"),
        title,
        source_path: rel_path.to_string(),
        start_page: None,
        end_page: None,
        body,
    }
}

fn json_to_search_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::Bool(v) => v.to_string(),
        serde_json::Value::Number(v) => v.to_string(),
        serde_json::Value::String(v) => v.clone(),
        serde_json::Value::Array(values) => values
            .iter()
            .map(json_to_search_text)
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"),
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{} {}", k, json_to_search_text(v)))
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

fn keyword_score(query_tokens: &HashSet<String>, doc_tokens: &HashSet<String>) -> f32 {
    if query_tokens.is_empty() || doc_tokens.is_empty() {
        return 0.0;
    }

    let overlap = query_tokens
        .iter()
        .filter(|token| doc_tokens.contains(*token))
        .count() as f32;

    overlap / query_tokens.len() as f32
}

fn snippet(input: &str, max_chars: usize) -> String {
    let compact = input.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.chars().count() <= max_chars {
        compact
    } else {
        compact.chars().take(max_chars).collect::<String>() + "..."
    }
}
